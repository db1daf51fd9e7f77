//! Reference price updates driven by trade flow.
//!
//! The execution engine only knows the `PriceImpactModel` trait; the fixed
//! step model is a placeholder for a real pricing engine.

use crate::types::OrderAction;
use rust_decimal::{Decimal, RoundingStrategy};

/// Computes a team's next reference price after an executed trade.
///
/// `None` means the next price cannot be represented; the trade is rejected.
pub trait PriceImpactModel: Send + Sync {
    fn next_price(&self, current: Decimal, action: OrderAction, shares: Decimal) -> Option<Decimal>;
}

/// Moves the price by a fixed fraction per trade, regardless of size:
/// `price × (1 + step)` on buys and `price × (1 − step)` on sells.
#[derive(Debug, Clone)]
pub struct FixedStepImpact {
    step: Decimal,
    scale: u32,
}

impl FixedStepImpact {
    /// `step` is a fraction (0.001 = 0.1%); results are rounded to `scale` places.
    pub fn new(step: Decimal, scale: u32) -> Self {
        Self { step, scale }
    }
}

impl Default for FixedStepImpact {
    fn default() -> Self {
        Self::new(Decimal::new(1, 3), 4)
    }
}

impl PriceImpactModel for FixedStepImpact {
    fn next_price(&self, current: Decimal, action: OrderAction, _shares: Decimal) -> Option<Decimal> {
        let factor = match action {
            OrderAction::Buy => Decimal::ONE.checked_add(self.step)?,
            OrderAction::Sell => Decimal::ONE.checked_sub(self.step)?,
        };
        current
            .checked_mul(factor)
            .map(|price| price.round_dp_with_strategy(self.scale, RoundingStrategy::MidpointAwayFromZero))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_buy_nudges_up() {
        let model = FixedStepImpact::default();
        assert_eq!(model.next_price(dec!(10.00), OrderAction::Buy, dec!(50)), Some(dec!(10.01)));
    }

    #[test]
    fn test_sell_nudges_down() {
        let model = FixedStepImpact::default();
        // 10.01 × 0.999 = 9.99999, rounded to four places
        assert_eq!(model.next_price(dec!(10.01), OrderAction::Sell, dec!(20)), Some(dec!(10)));
        assert_eq!(model.next_price(dec!(20.00), OrderAction::Sell, dec!(1)), Some(dec!(19.98)));
    }

    #[test]
    fn test_size_does_not_matter() {
        let model = FixedStepImpact::default();
        assert_eq!(
            model.next_price(dec!(10.00), OrderAction::Buy, dec!(1)),
            model.next_price(dec!(10.00), OrderAction::Buy, dec!(10000))
        );
    }

    #[test]
    fn test_custom_step_and_scale() {
        let model = FixedStepImpact::new(dec!(0.05), 2);
        assert_eq!(model.next_price(dec!(3.33), OrderAction::Buy, dec!(1)), Some(dec!(3.50)));
    }

    #[test]
    fn test_unrepresentable_price_is_none() {
        let model = FixedStepImpact::default();
        assert_eq!(model.next_price(Decimal::MAX, OrderAction::Buy, dec!(1)), None);
        assert!(model.next_price(Decimal::MAX, OrderAction::Sell, dec!(1)).is_some());
    }
}
