use crate::services::{ExecutionConfig, FixedStepImpact};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::env;

/// Reference price settings.
#[derive(Debug, Clone)]
pub struct PricingConfig {
    /// Fractional price move per executed trade (0.001 = 0.1%).
    pub impact_step: Decimal,
    /// Decimal places kept on reference prices.
    pub price_scale: u32,
}

impl Default for PricingConfig {
    fn default() -> Self {
        Self {
            impact_step: dec!(0.001),
            price_scale: 4,
        }
    }
}

/// Application configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// Server host address.
    pub host: String,
    /// Server port.
    pub port: u16,
    /// SQLite database file (`:memory:` for an in-memory database).
    pub database_path: String,
    /// Cash credited to newly opened portfolios.
    pub starting_cash_balance: Decimal,
    /// Lifetime of a pending limit order, in hours.
    pub limit_order_ttl_hours: i64,
    /// Days of value history returned with a portfolio.
    pub chart_history_days: usize,
    /// Reference price settings.
    pub pricing: PricingConfig,
}

fn parsed_var<T: std::str::FromStr>(name: &str, default: T) -> T {
    env::var(name)
        .ok()
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Self {
        let defaults = PricingConfig::default();

        Self {
            host: env::var("HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
            port: parsed_var("PORT", 3003),
            database_path: env::var("DATABASE_PATH").unwrap_or_else(|_| "trading.db".to_string()),
            starting_cash_balance: parsed_var("STARTING_CASH_BALANCE", dec!(10000.00)),
            limit_order_ttl_hours: parsed_var("LIMIT_ORDER_TTL_HOURS", 24),
            chart_history_days: parsed_var("CHART_HISTORY_DAYS", 30),
            pricing: PricingConfig {
                impact_step: parsed_var("PRICE_IMPACT_STEP", defaults.impact_step),
                price_scale: parsed_var("PRICE_SCALE", defaults.price_scale),
            },
        }
    }

    /// Ledger settings handed to the trading service.
    pub fn execution_config(&self) -> ExecutionConfig {
        ExecutionConfig {
            starting_cash_balance: self.starting_cash_balance,
            limit_order_ttl_hours: self.limit_order_ttl_hours,
            chart_history_days: self.chart_history_days,
        }
    }

    /// Reference price model built from the pricing settings.
    pub fn price_model(&self) -> FixedStepImpact {
        FixedStepImpact::new(self.pricing.impact_step, self.pricing.price_scale)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::from_env()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::OrderAction;
    use crate::services::PriceImpactModel;

    fn test_config() -> Config {
        Config {
            host: "127.0.0.1".to_string(),
            port: 3003,
            database_path: ":memory:".to_string(),
            starting_cash_balance: dec!(500.00),
            limit_order_ttl_hours: 2,
            chart_history_days: 7,
            pricing: PricingConfig::default(),
        }
    }

    #[test]
    fn test_pricing_defaults() {
        let pricing = PricingConfig::default();
        assert_eq!(pricing.impact_step, dec!(0.001));
        assert_eq!(pricing.price_scale, 4);
    }

    #[test]
    fn test_execution_config_mirrors_settings() {
        let exec = test_config().execution_config();
        assert_eq!(exec.starting_cash_balance, dec!(500.00));
        assert_eq!(exec.limit_order_ttl_hours, 2);
        assert_eq!(exec.chart_history_days, 7);
    }

    #[test]
    fn test_price_model_uses_pricing_settings() {
        let mut config = test_config();
        config.pricing = PricingConfig {
            impact_step: dec!(0.1),
            price_scale: 2,
        };
        let model = config.price_model();
        assert_eq!(model.next_price(dec!(10), OrderAction::Buy, dec!(1)), Some(dec!(11)));
    }

    #[test]
    fn test_parsed_var_falls_back_on_garbage() {
        std::env::set_var("TEAM_TRADING_TEST_GARBAGE", "not-a-number");
        assert_eq!(parsed_var("TEAM_TRADING_TEST_GARBAGE", 24i64), 24);
        std::env::set_var("TEAM_TRADING_TEST_GARBAGE", " 48 ");
        assert_eq!(parsed_var("TEAM_TRADING_TEST_GARBAGE", 24i64), 48);
        std::env::remove_var("TEAM_TRADING_TEST_GARBAGE");
    }
}
