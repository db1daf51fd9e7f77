//! Team Trading - order execution and portfolio ledger for a team share market

pub mod api;
pub mod config;
pub mod error;
pub mod services;
pub mod types;

use axum::Router;
use config::Config;
use services::TradingService;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

/// Application state shared across handlers.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub trading_service: Arc<TradingService>,
}

/// Build the HTTP application with its middleware stack.
pub fn app(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .merge(api::router())
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

// Re-export commonly used types
pub use services::{SqliteStore, TradingError};
pub use types::*;
