//! Orders API
//!
//! - POST /orders - Place a market or limit order
//! - GET /orders - List the caller's orders (`status`, `limit` filters)
//! - GET /orders/:id - Get one of the caller's orders
//! - GET /transactions - List the caller's ledger entries

use axum::{
    extract::{rejection::JsonRejection, rejection::QueryRejection, Path, Query, State},
    http::StatusCode,
    routing::get,
    Json, Router,
};
use serde::Deserialize;

use crate::api::identity::UserId;
use crate::api::ApiResponse;
use crate::error::{AppError, Result};
use crate::types::{Order, OrderResult, OrderStatus, PlaceOrderRequest, Transaction};
use crate::AppState;

/// Rows returned by list endpoints when no limit is given.
const DEFAULT_LIST_LIMIT: usize = 100;
/// Upper bound on `limit` for list endpoints.
const MAX_LIST_LIMIT: usize = 1000;

/// Create orders router.
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/orders", get(list_orders).post(place_order))
        .route("/orders/:id", get(get_order))
        .route("/transactions", get(list_transactions))
}

#[derive(Debug, Default, Deserialize)]
pub struct ListOrdersQuery {
    pub status: Option<String>,
    pub limit: Option<usize>,
}

#[derive(Debug, Default, Deserialize)]
pub struct ListTransactionsQuery {
    pub limit: Option<usize>,
}

fn list_limit(limit: Option<usize>) -> usize {
    limit.unwrap_or(DEFAULT_LIST_LIMIT).clamp(1, MAX_LIST_LIMIT)
}

fn parse_status(status: Option<&str>) -> Result<Option<OrderStatus>> {
    match status.map(str::trim).filter(|s| !s.is_empty()) {
        None => Ok(None),
        Some(raw) => OrderStatus::parse(raw)
            .map(Some)
            .ok_or_else(|| AppError::Validation(format!("Invalid order status: {raw}"))),
    }
}

/// POST /orders
///
/// Market orders execute immediately; limit orders are stored as pending.
async fn place_order(
    State(state): State<AppState>,
    UserId(user_id): UserId,
    body: std::result::Result<Json<PlaceOrderRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<OrderResult>)> {
    let Json(request) = body.map_err(|e| AppError::Validation(e.body_text()))?;
    let result = state.trading_service.place_order(&user_id, &request)?;
    Ok((StatusCode::CREATED, Json(result)))
}

/// GET /orders
async fn list_orders(
    State(state): State<AppState>,
    UserId(user_id): UserId,
    query: std::result::Result<Query<ListOrdersQuery>, QueryRejection>,
) -> Result<Json<ApiResponse<Vec<Order>>>> {
    let Query(query) = query.map_err(|e| AppError::Validation(e.body_text()))?;
    let status = parse_status(query.status.as_deref())?;
    let orders = state
        .trading_service
        .get_orders(&user_id, status, list_limit(query.limit))?;
    Ok(Json(ApiResponse { data: orders }))
}

/// GET /orders/:id
async fn get_order(
    State(state): State<AppState>,
    UserId(user_id): UserId,
    Path(id): Path<String>,
) -> Result<Json<Order>> {
    Ok(Json(state.trading_service.get_order(&user_id, &id)?))
}

/// GET /transactions
async fn list_transactions(
    State(state): State<AppState>,
    UserId(user_id): UserId,
    query: std::result::Result<Query<ListTransactionsQuery>, QueryRejection>,
) -> Result<Json<ApiResponse<Vec<Transaction>>>> {
    let Query(query) = query.map_err(|e| AppError::Validation(e.body_text()))?;
    let transactions = state
        .trading_service
        .get_transactions(&user_id, list_limit(query.limit))?;
    Ok(Json(ApiResponse { data: transactions }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_list_limit_defaults_and_clamps() {
        assert_eq!(list_limit(None), DEFAULT_LIST_LIMIT);
        assert_eq!(list_limit(Some(0)), 1);
        assert_eq!(list_limit(Some(25)), 25);
        assert_eq!(list_limit(Some(1_000_000)), MAX_LIST_LIMIT);
    }

    #[test]
    fn test_parse_status() {
        assert_eq!(parse_status(None).unwrap(), None);
        assert_eq!(parse_status(Some("")).unwrap(), None);
        assert_eq!(parse_status(Some("pending")).unwrap(), Some(OrderStatus::Pending));
        assert!(matches!(parse_status(Some("open")), Err(AppError::Validation(_))));
    }

    #[test]
    fn test_query_deserialization() {
        let query: ListOrdersQuery = serde_urlencoded::from_str("status=executed&limit=5").unwrap();
        assert_eq!(query.status.as_deref(), Some("executed"));
        assert_eq!(query.limit, Some(5));

        let query: ListTransactionsQuery = serde_urlencoded::from_str("").unwrap();
        assert_eq!(query.limit, None);
    }
}
