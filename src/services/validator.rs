//! Structural validation of order requests.
//!
//! Runs before any state is read; a failure here guarantees no mutation.

use crate::services::TradingError;
use crate::types::{OrderAction, OrderKind, OrderType, PlaceOrderRequest, ValidatedOrder};
use rust_decimal::Decimal;

/// Check an order request and convert it into a typed order.
pub fn validate_order(request: &PlaceOrderRequest) -> Result<ValidatedOrder, TradingError> {
    let team_id = request
        .team_id
        .as_deref()
        .map(str::trim)
        .filter(|id| !id.is_empty());

    let (Some(team_id), Some(order_type), Some(action), Some(shares)) = (
        team_id,
        request.order_type.as_deref(),
        request.action.as_deref(),
        request.shares,
    ) else {
        return Err(invalid("Missing required fields"));
    };

    let order_type = OrderType::parse(order_type).ok_or_else(|| invalid("Invalid order type"))?;
    let action = OrderAction::parse(action).ok_or_else(|| invalid("Invalid action"))?;

    if shares <= Decimal::ZERO {
        return Err(invalid("Shares must be greater than 0"));
    }

    let kind = match order_type {
        OrderType::Market => OrderKind::Market,
        OrderType::Limit => match request.price {
            Some(price) if price > Decimal::ZERO => {
                if shares.checked_mul(price).is_none() {
                    return Err(TradingError::overflow("Order value"));
                }
                OrderKind::Limit { price }
            }
            Some(_) => return Err(invalid("Price must be greater than 0")),
            None => return Err(invalid("Price is required for limit orders")),
        },
    };

    let client_order_id = request
        .client_order_id
        .as_deref()
        .map(str::trim)
        .filter(|id| !id.is_empty())
        .map(str::to_string);

    Ok(ValidatedOrder {
        team_id: team_id.to_string(),
        kind,
        action,
        shares,
        client_order_id,
    })
}

fn invalid(message: &str) -> TradingError {
    TradingError::Validation(message.to_string())
}
