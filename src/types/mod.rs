pub mod portfolio;
pub mod trading;

pub use portfolio::*;
pub use trading::*;
