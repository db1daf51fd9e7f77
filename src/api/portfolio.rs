//! Portfolio API
//!
//! - GET /portfolio - Valued holdings, performance and chart history
//! - POST /portfolio - Open the caller's portfolio

use axum::{extract::State, http::StatusCode, routing::get, Json, Router};

use crate::api::identity::UserId;
use crate::error::Result;
use crate::types::{Portfolio, PortfolioView};
use crate::AppState;

pub fn router() -> Router<AppState> {
    Router::new().route("/portfolio", get(get_portfolio).post(open_portfolio))
}

async fn get_portfolio(
    State(state): State<AppState>,
    UserId(user_id): UserId,
) -> Result<Json<PortfolioView>> {
    Ok(Json(state.trading_service.get_portfolio(&user_id)?))
}

/// 201 when the portfolio was created, 200 when it already existed.
async fn open_portfolio(
    State(state): State<AppState>,
    UserId(user_id): UserId,
) -> Result<(StatusCode, Json<Portfolio>)> {
    let (portfolio, created) = state.trading_service.open_portfolio(&user_id)?;
    let status = if created {
        StatusCode::CREATED
    } else {
        StatusCode::OK
    };
    Ok((status, Json(portfolio)))
}
