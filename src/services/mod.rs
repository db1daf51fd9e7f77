pub mod cost_basis;
pub mod portfolio;
pub mod price_impact;
pub mod sqlite_store;
pub mod trading;
pub mod validator;

pub use cost_basis::weighted_average_cost;
pub use price_impact::{FixedStepImpact, PriceImpactModel};
pub use sqlite_store::SqliteStore;
pub use trading::{ExecutionConfig, TradingError, TradingService};
pub use validator::validate_order;
