//! Trading Service
//!
//! Handles order placement against the ledger:
//! - Market orders execute immediately at the team's reference price
//! - Limit orders are stored as pending with an expiry and never matched
//! - Portfolio opening and the team reference-price mirror
//!
//! Every order runs inside one SQLite transaction. Balance, holding and price
//! writes are compare-and-set against the values read earlier in the same
//! transaction; a guard miss aborts the order with `TradingError::Conflict`.

use crate::services::cost_basis::weighted_average_cost;
use crate::services::price_impact::{FixedStepImpact, PriceImpactModel};
use crate::services::sqlite_store::{self, SqliteStore};
use crate::services::validator::validate_order;
use crate::types::{
    Holding, Order, OrderAction, OrderKind, OrderResult, OrderStatus, PlaceOrderRequest,
    Portfolio, Team, Transaction, UpsertTeamRequest,
};
use rusqlite::{Connection, ErrorCode};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info, warn};

/// Decimal places kept for average purchase prices.
const AVERAGE_PRICE_SCALE: u32 = 8;

/// Trading service errors.
#[derive(Debug, Error)]
pub enum TradingError {
    #[error("{0}")]
    Validation(String),

    #[error("Team not found: {0}")]
    TeamNotFound(String),

    #[error("Portfolio not found")]
    PortfolioNotFound(String),

    #[error("Order not found: {0}")]
    OrderNotFound(String),

    #[error("Trading is currently restricted for this team")]
    TradingRestricted(String),

    #[error("Not enough shares to complete this sale: need {needed}, have {available}")]
    InsufficientShares { needed: Decimal, available: Decimal },

    #[error("Not enough funds to complete this purchase: need {needed}, have {available}")]
    InsufficientFunds { needed: Decimal, available: Decimal },

    #[error("Order conflicted with a concurrent update: {0}")]
    Conflict(String),

    #[error("Database error: {0}")]
    DatabaseError(String),
}

impl TradingError {
    /// An amount that does not fit in a `Decimal`.
    pub fn overflow(what: &str) -> Self {
        TradingError::Validation(format!("{what} is too large"))
    }
}

impl From<rusqlite::Error> for TradingError {
    fn from(e: rusqlite::Error) -> Self {
        TradingError::DatabaseError(e.to_string())
    }
}

/// Uniqueness violations on insert mean another writer got there first.
fn conflict_on_constraint(e: rusqlite::Error, what: &str) -> TradingError {
    match e.sqlite_error_code() {
        Some(ErrorCode::ConstraintViolation) => TradingError::Conflict(what.to_string()),
        _ => e.into(),
    }
}

/// Ledger and intake settings.
#[derive(Debug, Clone)]
pub struct ExecutionConfig {
    /// Cash credited to a newly opened portfolio
    pub starting_cash_balance: Decimal,
    /// Lifetime stamped on limit orders
    pub limit_order_ttl_hours: i64,
    /// Number of daily values returned for charting
    pub chart_history_days: usize,
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        Self {
            starting_cash_balance: dec!(10000.00),
            limit_order_ttl_hours: 24,
            chart_history_days: 30,
        }
    }
}

/// Order execution and ledger service.
#[derive(Clone)]
pub struct TradingService {
    /// SQLite store for persistence
    pub(crate) sqlite: Arc<SqliteStore>,
    /// Execution configuration
    pub(crate) config: ExecutionConfig,
    /// Reference price update rule
    price_model: Arc<dyn PriceImpactModel>,
}

impl TradingService {
    /// Create a new trading service.
    pub fn new(sqlite: Arc<SqliteStore>) -> Self {
        Self::with_config(sqlite, ExecutionConfig::default())
    }

    /// Create a new trading service with custom execution config.
    pub fn with_config(sqlite: Arc<SqliteStore>, config: ExecutionConfig) -> Self {
        Self {
            sqlite,
            config,
            price_model: Arc::new(FixedStepImpact::default()),
        }
    }

    /// Replace the reference price model.
    pub fn with_price_model(mut self, price_model: Arc<dyn PriceImpactModel>) -> Self {
        self.price_model = price_model;
        self
    }

    pub fn store(&self) -> &Arc<SqliteStore> {
        &self.sqlite
    }

    pub fn config(&self) -> &ExecutionConfig {
        &self.config
    }

    // ==========================================================================
    // Portfolios & Teams
    // ==========================================================================

    /// Open the user's portfolio if it does not exist yet.
    ///
    /// Returns the portfolio and whether it was created by this call.
    pub fn open_portfolio(&self, user_id: &str) -> Result<(Portfolio, bool), TradingError> {
        let candidate = Portfolio::new(user_id.to_string(), self.config.starting_cash_balance);
        let (portfolio, created) = self.sqlite.transaction(|tx| {
            let created = sqlite_store::insert_portfolio_if_absent(tx, &candidate)?;
            let portfolio = sqlite_store::find_portfolio_by_user(tx, user_id)?
                .ok_or_else(|| TradingError::PortfolioNotFound(user_id.to_string()))?;
            Ok::<_, TradingError>((portfolio, created))
        })?;

        if created {
            info!("Opened portfolio {} for user {}", portfolio.portfolio_id, user_id);
        }
        Ok((portfolio, created))
    }

    /// Insert or replace a team's directory entry, including its reference price.
    pub fn upsert_team(&self, team_id: &str, request: UpsertTeamRequest) -> Result<Team, TradingError> {
        let team_id = team_id.trim();
        if team_id.is_empty() || request.name.trim().is_empty() {
            return Err(TradingError::Validation(
                "Team id and name are required".to_string(),
            ));
        }
        if request.current_share_price <= Decimal::ZERO {
            return Err(TradingError::Validation(
                "Share price must be greater than 0".to_string(),
            ));
        }

        let team = Team {
            team_id: team_id.to_string(),
            name: request.name.trim().to_string(),
            current_share_price: request.current_share_price,
            trading_status: request.trading_status,
            updated_at: chrono::Utc::now().timestamp_millis(),
        };
        self.sqlite.upsert_team(&team)?;
        debug!(
            "Team {} now {} at {}",
            team.team_id, team.trading_status, team.current_share_price
        );
        Ok(team)
    }

    pub fn get_team(&self, team_id: &str) -> Result<Team, TradingError> {
        self.sqlite
            .get_team(team_id)?
            .ok_or_else(|| TradingError::TeamNotFound(team_id.to_string()))
    }

    // ==========================================================================
    // Order Placement
    // ==========================================================================

    /// Validate a raw request and route it to market execution or limit intake.
    pub fn place_order(
        &self,
        user_id: &str,
        request: &PlaceOrderRequest,
    ) -> Result<OrderResult, TradingError> {
        let order = validate_order(request)?;
        match order.kind {
            OrderKind::Market => self.execute_market(
                user_id,
                &order.team_id,
                order.action,
                order.shares,
                order.client_order_id,
            ),
            OrderKind::Limit { price } => self.intake_limit(
                user_id,
                &order.team_id,
                order.action,
                order.shares,
                price,
                order.client_order_id,
            ),
        }
    }

    /// Execute a market order at the team's current reference price.
    pub fn place_market_order(
        &self,
        user_id: &str,
        team_id: &str,
        action: OrderAction,
        shares: Decimal,
    ) -> Result<OrderResult, TradingError> {
        self.execute_market(user_id, team_id, action, shares, None)
    }

    /// Store a limit order as pending. It is never matched.
    pub fn place_limit_order(
        &self,
        user_id: &str,
        team_id: &str,
        action: OrderAction,
        shares: Decimal,
        price: Decimal,
    ) -> Result<OrderResult, TradingError> {
        self.intake_limit(user_id, team_id, action, shares, price, None)
    }

    fn execute_market(
        &self,
        user_id: &str,
        team_id: &str,
        action: OrderAction,
        shares: Decimal,
        client_order_id: Option<String>,
    ) -> Result<OrderResult, TradingError> {
        let (result, replayed) = self
            .sqlite
            .transaction(|tx| {
                self.execute_market_in(tx, user_id, team_id, action, shares, client_order_id)
            })
            .map_err(|e| rejected(user_id, team_id, e))?;

        if !replayed {
            if let Err(e) = self.snapshot_daily_value(user_id) {
                debug!("Failed to record daily value for {}: {}", user_id, e);
            }
        }
        Ok(result)
    }

    /// Market execution steps; runs inside the caller's transaction.
    fn execute_market_in(
        &self,
        tx: &Connection,
        user_id: &str,
        team_id: &str,
        action: OrderAction,
        shares: Decimal,
        client_order_id: Option<String>,
    ) -> Result<(OrderResult, bool), TradingError> {
        if let Some(result) = replay(tx, user_id, client_order_id.as_deref())? {
            return Ok((result, true));
        }

        // Checks: no writes before this point
        let team = tradable_team(tx, team_id)?;
        let portfolio = sqlite_store::find_portfolio_by_user(tx, user_id)?
            .ok_or_else(|| TradingError::PortfolioNotFound(user_id.to_string()))?;
        let holding = sqlite_store::find_holding(tx, &portfolio.portfolio_id, team_id)?;

        let price = team.current_share_price;
        let estimated_total = price
            .checked_mul(shares)
            .ok_or_else(|| TradingError::overflow("Order value"))?;
        match action {
            OrderAction::Sell => ensure_shares(holding.as_ref(), shares)?,
            OrderAction::Buy => {
                if portfolio.cash_balance < estimated_total {
                    return Err(TradingError::InsufficientFunds {
                        needed: estimated_total,
                        available: portfolio.cash_balance,
                    });
                }
            }
        }

        let now = chrono::Utc::now().timestamp_millis();
        let mut order = Order::market(user_id.to_string(), team_id.to_string(), action, shares, price)
            .with_client_order_id(client_order_id);
        order.placed_at = now;
        let entry = Transaction::for_order(&order, now)
            .ok_or_else(|| TradingError::overflow("Order value"))?;

        // Every amount is computed before the first write
        let new_cash = match action {
            OrderAction::Buy => portfolio.cash_balance.checked_sub(entry.total_amount),
            OrderAction::Sell => portfolio.cash_balance.checked_add(entry.total_amount),
        }
        .ok_or_else(|| TradingError::overflow("Cash balance"))?;
        if new_cash < Decimal::ZERO {
            return Err(TradingError::InsufficientFunds {
                needed: entry.total_amount,
                available: portfolio.cash_balance,
            });
        }
        let change = plan_holding(&portfolio.portfolio_id, holding, &order, now)?;
        let next_price = self
            .price_model
            .next_price(price, action, shares)
            .ok_or_else(|| TradingError::overflow("Share price"))?;

        // Writes
        sqlite_store::insert_order(tx, &order)
            .map_err(|e| conflict_on_constraint(e, "duplicate client order id"))?;
        sqlite_store::insert_transaction(tx, &entry)?;
        let from = order.status;
        order
            .transition(OrderStatus::Executed, now)
            .map_err(|status| TradingError::Conflict(format!("order is already {status}")))?;
        if !sqlite_store::update_order_status(tx, &order, from, now)? {
            return Err(TradingError::Conflict("order status changed".to_string()));
        }
        if !sqlite_store::update_cash_balance(
            tx,
            &portfolio.portfolio_id,
            portfolio.cash_balance,
            new_cash,
            now,
        )? {
            return Err(TradingError::Conflict("cash balance changed".to_string()));
        }
        apply_holding(tx, change)?;
        if !sqlite_store::update_team_price(tx, team_id, price, next_price, now)? {
            return Err(TradingError::Conflict("reference price changed".to_string()));
        }

        info!(
            "Executed order {}: {} {} {} @ {} (cash {} -> {}, price -> {})",
            order.order_id,
            action,
            shares,
            team_id,
            price,
            portfolio.cash_balance,
            new_cash,
            next_price
        );
        let result = OrderResult::from_order(&order)
            .ok_or_else(|| TradingError::overflow("Order value"))?;
        Ok((result, false))
    }

    fn intake_limit(
        &self,
        user_id: &str,
        team_id: &str,
        action: OrderAction,
        shares: Decimal,
        price: Decimal,
        client_order_id: Option<String>,
    ) -> Result<OrderResult, TradingError> {
        let ttl_ms = self.config.limit_order_ttl_hours * 60 * 60 * 1000;

        self.sqlite
            .transaction(|tx| -> Result<_, TradingError> {
                if let Some(result) = replay(tx, user_id, client_order_id.as_deref())? {
                    return Ok(result);
                }

                tradable_team(tx, team_id)?;
                let portfolio = sqlite_store::find_portfolio_by_user(tx, user_id)?
                    .ok_or_else(|| TradingError::PortfolioNotFound(user_id.to_string()))?;
                if action == OrderAction::Sell {
                    let holding = sqlite_store::find_holding(tx, &portfolio.portfolio_id, team_id)?;
                    ensure_shares(holding.as_ref(), shares)?;
                }
                // Funds are not reserved or checked against the limit price.

                let order = Order::limit(
                    user_id.to_string(),
                    team_id.to_string(),
                    action,
                    shares,
                    price,
                    ttl_ms,
                )
                .with_client_order_id(client_order_id);
                let result = OrderResult::from_order(&order)
                    .ok_or_else(|| TradingError::overflow("Order value"))?;
                sqlite_store::insert_order(tx, &order)
                    .map_err(|e| conflict_on_constraint(e, "duplicate client order id"))?;

                info!(
                    "Queued limit order {}: {} {} {} @ {} (expires {:?})",
                    order.order_id, action, shares, team_id, price, order.expires_at
                );
                Ok(result)
            })
            .map_err(|e| rejected(user_id, team_id, e))
    }

    // ==========================================================================
    // Order & Ledger Queries
    // ==========================================================================

    /// Get one of the user's orders.
    pub fn get_order(&self, user_id: &str, order_id: &str) -> Result<Order, TradingError> {
        self.sqlite
            .get_order(order_id)?
            .filter(|order| order.user_id == user_id)
            .ok_or_else(|| TradingError::OrderNotFound(order_id.to_string()))
    }

    pub fn get_orders(
        &self,
        user_id: &str,
        status: Option<OrderStatus>,
        limit: usize,
    ) -> Result<Vec<Order>, TradingError> {
        Ok(self.sqlite.get_user_orders(user_id, status, limit)?)
    }

    pub fn get_transactions(&self, user_id: &str, limit: usize) -> Result<Vec<Transaction>, TradingError> {
        Ok(self.sqlite.get_user_transactions(user_id, limit)?)
    }
}

// =============================================================================
// Transaction steps
// =============================================================================

/// Result of an earlier order carrying the same client order id.
fn replay(
    conn: &Connection,
    user_id: &str,
    client_order_id: Option<&str>,
) -> Result<Option<OrderResult>, TradingError> {
    let Some(client_order_id) = client_order_id else {
        return Ok(None);
    };
    let existing = sqlite_store::find_order_by_client_id(conn, user_id, client_order_id)?;
    if let Some(ref order) = existing {
        info!(
            "Replaying order {} for client order id {}",
            order.order_id, client_order_id
        );
    }
    existing
        .as_ref()
        .map(|order| OrderResult::from_order(order).ok_or_else(|| TradingError::overflow("Order value")))
        .transpose()
}

fn tradable_team(conn: &Connection, team_id: &str) -> Result<Team, TradingError> {
    let team = sqlite_store::find_team(conn, team_id)?
        .ok_or_else(|| TradingError::TeamNotFound(team_id.to_string()))?;
    if !team.trading_status.is_active() {
        return Err(TradingError::TradingRestricted(team_id.to_string()));
    }
    Ok(team)
}

fn ensure_shares(holding: Option<&Holding>, shares: Decimal) -> Result<(), TradingError> {
    let available = holding.map(|h| h.shares).unwrap_or(Decimal::ZERO);
    if available < shares {
        return Err(TradingError::InsufficientShares {
            needed: shares,
            available,
        });
    }
    Ok(())
}

/// Holding write produced by an executed order.
enum HoldingChange {
    Insert(Holding),
    Update { holding: Holding, previous_shares: Decimal },
    Delete { holding_id: String, previous_shares: Decimal },
}

/// Merge an executed order into the portfolio's holding for its team.
fn plan_holding(
    portfolio_id: &str,
    existing: Option<Holding>,
    order: &Order,
    now: i64,
) -> Result<HoldingChange, TradingError> {
    let too_large = || TradingError::overflow("Holding value");
    let total = order.notional().ok_or_else(too_large)?;

    match (order.action, existing) {
        (OrderAction::Buy, None) => Ok(HoldingChange::Insert(Holding {
            holding_id: uuid::Uuid::new_v4().to_string(),
            portfolio_id: portfolio_id.to_string(),
            team_id: order.team_id.clone(),
            shares: order.shares,
            average_purchase_price: order.price,
            current_value: total,
            created_at: now,
            updated_at: now,
        })),
        (OrderAction::Buy, Some(mut holding)) => {
            let previous_shares = holding.shares;
            holding.shares = previous_shares.checked_add(order.shares).ok_or_else(too_large)?;
            holding.average_purchase_price = weighted_average_cost(
                previous_shares,
                holding.average_purchase_price,
                order.shares,
                total,
            )
            .ok_or_else(|| TradingError::overflow("Average cost"))?
            .round_dp(AVERAGE_PRICE_SCALE);
            holding.current_value = holding.shares.checked_mul(order.price).ok_or_else(too_large)?;
            holding.updated_at = now;
            Ok(HoldingChange::Update { holding, previous_shares })
        }
        (OrderAction::Sell, Some(mut holding)) => {
            let previous_shares = holding.shares;
            let remaining = previous_shares.checked_sub(order.shares).ok_or_else(too_large)?;
            if remaining < Decimal::ZERO {
                return Err(TradingError::InsufficientShares {
                    needed: order.shares,
                    available: previous_shares,
                });
            }
            if remaining.is_zero() {
                return Ok(HoldingChange::Delete {
                    holding_id: holding.holding_id,
                    previous_shares,
                });
            }
            holding.shares = remaining;
            holding.current_value = remaining.checked_mul(order.price).ok_or_else(too_large)?;
            holding.updated_at = now;
            Ok(HoldingChange::Update { holding, previous_shares })
        }
        (OrderAction::Sell, None) => Err(TradingError::InsufficientShares {
            needed: order.shares,
            available: Decimal::ZERO,
        }),
    }
}

fn apply_holding(conn: &Connection, change: HoldingChange) -> Result<(), TradingError> {
    let written = match change {
        HoldingChange::Insert(holding) => {
            sqlite_store::insert_holding(conn, &holding)
                .map_err(|e| conflict_on_constraint(e, "holding created concurrently"))?;
            true
        }
        HoldingChange::Update { holding, previous_shares } => {
            sqlite_store::update_holding(conn, &holding, previous_shares)?
        }
        HoldingChange::Delete { holding_id, previous_shares } => {
            sqlite_store::delete_holding(conn, &holding_id, previous_shares)?
        }
    };
    if !written {
        return Err(TradingError::Conflict("holding changed".to_string()));
    }
    Ok(())
}

/// Log a failed order; internal errors are logged at the HTTP boundary instead.
fn rejected(user_id: &str, team_id: &str, error: TradingError) -> TradingError {
    match &error {
        TradingError::Conflict(_) => {
            warn!("Order by {} on {} rolled back: {}", user_id, team_id, error)
        }
        TradingError::DatabaseError(_) => {}
        _ => debug!("Order by {} on {} rejected: {}", user_id, team_id, error),
    }
    error
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::TradingStatus;

    fn create_test_service() -> TradingService {
        let sqlite = Arc::new(SqliteStore::new_in_memory().unwrap());
        let service = TradingService::with_config(
            sqlite,
            ExecutionConfig {
                starting_cash_balance: dec!(1000.00),
                ..ExecutionConfig::default()
            },
        );
        service
            .upsert_team(
                "team-1",
                UpsertTeamRequest {
                    name: "Rovers".to_string(),
                    current_share_price: dec!(10.00),
                    trading_status: TradingStatus::Active,
                },
            )
            .unwrap();
        service.open_portfolio("user-1").unwrap();
        service
    }

    fn cash(service: &TradingService) -> Decimal {
        service
            .sqlite
            .get_portfolio_by_user("user-1")
            .unwrap()
            .unwrap()
            .cash_balance
    }

    #[test]
    fn test_open_portfolio_is_idempotent() {
        let service = create_test_service();
        let (portfolio, created) = service.open_portfolio("user-1").unwrap();
        assert!(!created);
        assert_eq!(portfolio.cash_balance, dec!(1000.00));

        let (other, created) = service.open_portfolio("user-2").unwrap();
        assert!(created);
        assert_ne!(other.portfolio_id, portfolio.portfolio_id);
    }

    #[test]
    fn test_market_buy_executes() {
        let service = create_test_service();
        let result = service
            .place_market_order("user-1", "team-1", OrderAction::Buy, dec!(50))
            .unwrap();

        assert_eq!(result.status, OrderStatus::Executed);
        assert_eq!(result.estimated_total, dec!(500.00));
        assert_eq!(cash(&service), dec!(500.00));

        let order = service.get_order("user-1", &result.order_id).unwrap();
        assert_eq!(order.price, dec!(10.00));
        assert!(order.executed_at.is_some());
    }

    #[test]
    fn test_sell_without_holding_is_rejected() {
        let service = create_test_service();
        let err = service
            .place_market_order("user-1", "team-1", OrderAction::Sell, dec!(1))
            .unwrap_err();
        assert!(matches!(err, TradingError::InsufficientShares { .. }));
        assert!(service.get_orders("user-1", None, 10).unwrap().is_empty());
    }

    #[test]
    fn test_restricted_team_is_rejected() {
        let service = create_test_service();
        service
            .upsert_team(
                "team-2",
                UpsertTeamRequest {
                    name: "Wanderers".to_string(),
                    current_share_price: dec!(5),
                    trading_status: TradingStatus::Suspended,
                },
            )
            .unwrap();
        let err = service
            .place_market_order("user-1", "team-2", OrderAction::Buy, dec!(1))
            .unwrap_err();
        assert!(matches!(err, TradingError::TradingRestricted(_)));
    }

    #[test]
    fn test_custom_price_model_is_used() {
        struct Flat;
        impl PriceImpactModel for Flat {
            fn next_price(&self, current: Decimal, _: OrderAction, _: Decimal) -> Option<Decimal> {
                Some(current)
            }
        }

        let service = create_test_service().with_price_model(Arc::new(Flat));
        service
            .place_market_order("user-1", "team-1", OrderAction::Buy, dec!(1))
            .unwrap();
        assert_eq!(service.get_team("team-1").unwrap().current_share_price, dec!(10.00));
    }

    #[test]
    fn test_upsert_team_rejects_non_positive_price() {
        let service = create_test_service();
        let err = service
            .upsert_team(
                "team-3",
                UpsertTeamRequest {
                    name: "City".to_string(),
                    current_share_price: Decimal::ZERO,
                    trading_status: TradingStatus::Active,
                },
            )
            .unwrap_err();
        assert!(matches!(err, TradingError::Validation(_)));
        assert!(matches!(
            service.get_team("team-3").unwrap_err(),
            TradingError::TeamNotFound(_)
        ));
    }

    #[test]
    fn test_oversized_market_buy_is_rejected_before_writes() {
        let service = create_test_service();
        let err = service
            .place_market_order("user-1", "team-1", OrderAction::Buy, Decimal::MAX)
            .unwrap_err();
        assert!(matches!(err, TradingError::Validation(ref m) if m.contains("too large")));
        assert_eq!(cash(&service), dec!(1000.00));
        assert!(service.get_orders("user-1", None, 10).unwrap().is_empty());
    }

    #[test]
    fn test_unrepresentable_next_price_rolls_back() {
        struct Explode;
        impl PriceImpactModel for Explode {
            fn next_price(&self, _: Decimal, _: OrderAction, _: Decimal) -> Option<Decimal> {
                None
            }
        }

        let service = create_test_service().with_price_model(Arc::new(Explode));
        let err = service
            .place_market_order("user-1", "team-1", OrderAction::Buy, dec!(1))
            .unwrap_err();
        assert!(matches!(err, TradingError::Validation(_)));
        assert_eq!(cash(&service), dec!(1000.00));
        assert!(service.get_transactions("user-1", 10).unwrap().is_empty());
    }

    #[test]
    fn test_get_order_hides_other_users_orders() {
        let service = create_test_service();
        let result = service
            .place_market_order("user-1", "team-1", OrderAction::Buy, dec!(1))
            .unwrap();
        assert!(matches!(
            service.get_order("user-2", &result.order_id).unwrap_err(),
            TradingError::OrderNotFound(_)
        ));
    }
}
