//! Weighted-average cost basis.

use rust_decimal::Decimal;

/// Average cost per share after buying `new_shares` for a total of `new_cost`
/// on top of `existing_shares` held at `existing_avg`.
///
/// Returns `existing_avg` when the combined share count is not positive, and
/// `None` when any intermediate amount overflows.
pub fn weighted_average_cost(
    existing_shares: Decimal,
    existing_avg: Decimal,
    new_shares: Decimal,
    new_cost: Decimal,
) -> Option<Decimal> {
    let total_shares = existing_shares.checked_add(new_shares)?;
    if total_shares <= Decimal::ZERO {
        return Some(existing_avg);
    }
    existing_avg
        .checked_mul(existing_shares)?
        .checked_add(new_cost)?
        .checked_div(total_shares)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_first_purchase_uses_purchase_price() {
        assert_eq!(
            weighted_average_cost(Decimal::ZERO, Decimal::ZERO, dec!(50), dec!(500.00)),
            Some(dec!(10))
        );
    }

    #[test]
    fn test_equal_lots_average() {
        // 50 @ 10.00 then 50 @ 12.00
        assert_eq!(
            weighted_average_cost(dec!(50), dec!(10.00), dec!(50), dec!(600.00)),
            Some(dec!(11))
        );
    }

    #[test]
    fn test_uneven_lots_average() {
        // 30 @ 10.00 then 10 @ 14.00 -> (300 + 140) / 40
        assert_eq!(
            weighted_average_cost(dec!(30), dec!(10.00), dec!(10), dec!(140.00)),
            Some(dec!(11))
        );
    }

    #[test]
    fn test_fractional_result_is_exact_to_precision() {
        // 1 @ 10 then 2 @ 11 -> 32 / 3
        let avg = weighted_average_cost(dec!(1), dec!(10), dec!(2), dec!(22)).unwrap();
        assert_eq!(avg.round_dp(8), dec!(10.66666667));
    }

    #[test]
    fn test_zero_total_keeps_existing_average() {
        assert_eq!(
            weighted_average_cost(Decimal::ZERO, dec!(7.5), Decimal::ZERO, Decimal::ZERO),
            Some(dec!(7.5))
        );
    }

    #[test]
    fn test_overflow_is_none() {
        assert_eq!(
            weighted_average_cost(Decimal::MAX, dec!(2), dec!(1), dec!(1)),
            None
        );
        assert_eq!(
            weighted_average_cost(dec!(1), dec!(1), dec!(1), Decimal::MAX),
            None
        );
    }
}
