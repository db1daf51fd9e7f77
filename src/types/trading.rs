//! Trading Types
//!
//! Orders, ledger transactions and the request/response shapes of order placement.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

// =============================================================================
// Enums
// =============================================================================

/// Order type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderType {
    /// Execute immediately against the team's reference price
    Market,
    /// Stored with a target price; never matched
    Limit,
}

impl OrderType {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderType::Market => "market",
            OrderType::Limit => "limit",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "market" => Some(OrderType::Market),
            "limit" => Some(OrderType::Limit),
            _ => None,
        }
    }
}

impl std::fmt::Display for OrderType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Order action (buy or sell).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderAction {
    Buy,
    Sell,
}

impl OrderAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderAction::Buy => "buy",
            OrderAction::Sell => "sell",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "buy" => Some(OrderAction::Buy),
            "sell" => Some(OrderAction::Sell),
            _ => None,
        }
    }
}

impl std::fmt::Display for OrderAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Order status.
///
/// Transitions only ever leave `Pending`; every other status is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    /// Accepted and waiting (limit orders stay here)
    Pending,
    /// Filled against the reference price
    Executed,
    Cancelled,
    Expired,
}

impl OrderStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::Pending => "pending",
            OrderStatus::Executed => "executed",
            OrderStatus::Cancelled => "cancelled",
            OrderStatus::Expired => "expired",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(OrderStatus::Pending),
            "executed" => Some(OrderStatus::Executed),
            "cancelled" => Some(OrderStatus::Cancelled),
            "expired" => Some(OrderStatus::Expired),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, OrderStatus::Pending)
    }

    /// Whether moving from `self` to `next` is allowed.
    pub fn can_transition_to(&self, next: OrderStatus) -> bool {
        matches!(
            (self, next),
            (
                OrderStatus::Pending,
                OrderStatus::Executed | OrderStatus::Cancelled | OrderStatus::Expired
            )
        )
    }
}

impl std::fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// =============================================================================
// Order
// =============================================================================

/// A buy or sell order for shares of one team.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Order {
    pub order_id: String,
    pub user_id: String,
    pub team_id: String,
    pub order_type: OrderType,
    pub action: OrderAction,
    #[serde(with = "rust_decimal::serde::float")]
    pub shares: Decimal,
    /// Reference price snapshot (market) or target price (limit)
    #[serde(with = "rust_decimal::serde::float")]
    pub price: Decimal,
    pub status: OrderStatus,
    /// Caller-supplied deduplication key
    #[serde(skip_serializing_if = "Option::is_none")]
    pub client_order_id: Option<String>,
    /// When the order was placed (ms)
    pub placed_at: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub executed_at: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<i64>,
}

impl Order {
    /// Create a pending market order priced at the reference price snapshot.
    pub fn market(
        user_id: String,
        team_id: String,
        action: OrderAction,
        shares: Decimal,
        price: Decimal,
    ) -> Self {
        Self {
            order_id: uuid::Uuid::new_v4().to_string(),
            user_id,
            team_id,
            order_type: OrderType::Market,
            action,
            shares,
            price,
            status: OrderStatus::Pending,
            client_order_id: None,
            placed_at: chrono::Utc::now().timestamp_millis(),
            executed_at: None,
            expires_at: None,
        }
    }

    /// Create a pending limit order that expires `ttl_ms` after placement.
    pub fn limit(
        user_id: String,
        team_id: String,
        action: OrderAction,
        shares: Decimal,
        price: Decimal,
        ttl_ms: i64,
    ) -> Self {
        let placed_at = chrono::Utc::now().timestamp_millis();
        Self {
            order_id: uuid::Uuid::new_v4().to_string(),
            user_id,
            team_id,
            order_type: OrderType::Limit,
            action,
            shares,
            price,
            status: OrderStatus::Pending,
            client_order_id: None,
            placed_at,
            executed_at: None,
            expires_at: Some(placed_at + ttl_ms),
        }
    }

    pub fn with_client_order_id(mut self, client_order_id: Option<String>) -> Self {
        self.client_order_id = client_order_id;
        self
    }

    /// Notional value: shares × price, or `None` when it overflows.
    pub fn notional(&self) -> Option<Decimal> {
        self.shares.checked_mul(self.price)
    }

    /// Move the order to `next`, refusing anything but a pending → terminal step.
    pub fn transition(&mut self, next: OrderStatus, at: i64) -> Result<(), OrderStatus> {
        if !self.status.can_transition_to(next) {
            return Err(self.status);
        }
        self.status = next;
        if next == OrderStatus::Executed {
            self.executed_at = Some(at);
        }
        Ok(())
    }
}

// =============================================================================
// Transaction (ledger entry)
// =============================================================================

/// Immutable record of an executed trade.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Transaction {
    pub transaction_id: String,
    pub order_id: String,
    pub user_id: String,
    pub team_id: String,
    pub action: OrderAction,
    #[serde(with = "rust_decimal::serde::float")]
    pub shares: Decimal,
    #[serde(with = "rust_decimal::serde::float")]
    pub price_per_share: Decimal,
    #[serde(with = "rust_decimal::serde::float")]
    pub total_amount: Decimal,
    #[serde(with = "rust_decimal::serde::float")]
    pub fee_amount: Decimal,
    pub executed_at: i64,
}

impl Transaction {
    /// Ledger entry for filling `order` in full at its price. Fees are always zero.
    pub fn for_order(order: &Order, executed_at: i64) -> Option<Self> {
        Some(Self {
            transaction_id: uuid::Uuid::new_v4().to_string(),
            order_id: order.order_id.clone(),
            user_id: order.user_id.clone(),
            team_id: order.team_id.clone(),
            action: order.action,
            shares: order.shares,
            price_per_share: order.price,
            total_amount: order.notional()?,
            fee_amount: Decimal::ZERO,
            executed_at,
        })
    }
}

// =============================================================================
// Requests / Responses
// =============================================================================

/// Raw order placement body.
///
/// Enum-like fields stay as strings so unknown values reach the validator
/// instead of failing deserialization.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlaceOrderRequest {
    #[serde(default)]
    pub team_id: Option<String>,
    #[serde(default)]
    pub order_type: Option<String>,
    #[serde(default)]
    pub action: Option<String>,
    #[serde(default)]
    pub shares: Option<Decimal>,
    #[serde(default)]
    pub price: Option<Decimal>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_order_id: Option<String>,
}

/// Market or limit, with the limit price only where it exists.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrderKind {
    Market,
    Limit { price: Decimal },
}

impl OrderKind {
    pub fn order_type(&self) -> OrderType {
        match self {
            OrderKind::Market => OrderType::Market,
            OrderKind::Limit { .. } => OrderType::Limit,
        }
    }
}

/// An order request that passed structural validation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidatedOrder {
    pub team_id: String,
    pub kind: OrderKind,
    pub action: OrderAction,
    pub shares: Decimal,
    pub client_order_id: Option<String>,
}

/// Result of placing an order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderResult {
    pub order_id: String,
    pub status: OrderStatus,
    #[serde(with = "rust_decimal::serde::float")]
    pub estimated_total: Decimal,
    pub message: String,
}

impl OrderResult {
    /// `None` when the order's notional value overflows.
    pub fn from_order(order: &Order) -> Option<Self> {
        let message = match (order.order_type, order.status) {
            (OrderType::Market, OrderStatus::Executed) => "Market order executed successfully",
            (OrderType::Limit, OrderStatus::Pending) => {
                "Limit order placed successfully; matching is not yet supported"
            }
            _ => "Order recorded",
        };
        Some(Self {
            order_id: order.order_id.clone(),
            status: order.status,
            estimated_total: order.notional()?,
            message: message.to_string(),
        })
    }
}
