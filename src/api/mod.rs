pub mod health;
pub mod identity;
pub mod orders;
pub mod portfolio;
pub mod teams;

use crate::AppState;
use axum::Router;
use serde::Serialize;

/// Envelope for list responses.
#[derive(Debug, Serialize)]
pub struct ApiResponse<T> {
    pub data: T,
}

/// Create the API router.
pub fn router() -> Router<AppState> {
    Router::new()
        .merge(health::router())
        .merge(orders::router())
        .merge(portfolio::router())
        .nest("/teams", teams::router())
}
