use crate::services::TradingError;
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;
use tracing::error;

/// Message returned for failures the caller cannot act on.
const INTERNAL_MESSAGE: &str = "An error occurred while processing the request";

/// Application error types.
#[derive(Error, Debug)]
pub enum AppError {
    #[error("{0}")]
    Validation(String),

    #[error("{0}")]
    Unauthorized(String),

    #[error(transparent)]
    Trading(#[from] TradingError),
}

impl AppError {
    /// HTTP status and stable machine-readable code for this error.
    pub fn status_and_code(&self) -> (StatusCode, &'static str) {
        match self {
            AppError::Validation(_) => (StatusCode::BAD_REQUEST, "INVALID_INPUT"),
            AppError::Unauthorized(_) => (StatusCode::UNAUTHORIZED, "UNAUTHORIZED"),
            AppError::Trading(e) => match e {
                TradingError::Validation(_) => (StatusCode::BAD_REQUEST, "INVALID_INPUT"),
                TradingError::TeamNotFound(_) => (StatusCode::NOT_FOUND, "TEAM_NOT_FOUND"),
                TradingError::PortfolioNotFound(_) => {
                    (StatusCode::NOT_FOUND, "PORTFOLIO_NOT_FOUND")
                }
                TradingError::OrderNotFound(_) => (StatusCode::NOT_FOUND, "ORDER_NOT_FOUND"),
                TradingError::TradingRestricted(_) => {
                    (StatusCode::FORBIDDEN, "TRADING_RESTRICTED")
                }
                TradingError::InsufficientShares { .. } => {
                    (StatusCode::FORBIDDEN, "INSUFFICIENT_SHARES")
                }
                TradingError::InsufficientFunds { .. } => {
                    (StatusCode::FORBIDDEN, "INSUFFICIENT_FUNDS")
                }
                TradingError::Conflict(_) => (StatusCode::CONFLICT, "CONFLICT"),
                TradingError::DatabaseError(_) => {
                    (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_SERVER_ERROR")
                }
            },
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code) = self.status_and_code();

        let message = if status == StatusCode::INTERNAL_SERVER_ERROR {
            error!("Request failed: {}", self);
            INTERNAL_MESSAGE.to_string()
        } else {
            self.to_string()
        };

        let body = Json(json!({
            "code": code,
            "message": message,
        }));

        (status, body).into_response()
    }
}

pub type Result<T> = std::result::Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_trading_errors_map_to_codes() {
        let cases = [
            (TradingError::Validation("bad".into()), 400, "INVALID_INPUT"),
            (TradingError::TeamNotFound("t".into()), 404, "TEAM_NOT_FOUND"),
            (TradingError::PortfolioNotFound("u".into()), 404, "PORTFOLIO_NOT_FOUND"),
            (TradingError::OrderNotFound("o".into()), 404, "ORDER_NOT_FOUND"),
            (TradingError::TradingRestricted("t".into()), 403, "TRADING_RESTRICTED"),
            (
                TradingError::InsufficientFunds {
                    needed: dec!(10),
                    available: dec!(1),
                },
                403,
                "INSUFFICIENT_FUNDS",
            ),
            (TradingError::Conflict("c".into()), 409, "CONFLICT"),
            (TradingError::DatabaseError("d".into()), 500, "INTERNAL_SERVER_ERROR"),
        ];

        for (err, status, code) in cases {
            let (s, c) = AppError::from(err).status_and_code();
            assert_eq!(s.as_u16(), status);
            assert_eq!(c, code);
        }
    }

    #[test]
    fn test_unauthorized() {
        let (status, code) = AppError::Unauthorized("User ID is required".into()).status_and_code();
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(code, "UNAUTHORIZED");
    }

    #[test]
    fn test_internal_error_response_hides_detail() {
        let response = AppError::Trading(TradingError::DatabaseError("disk I/O".into())).into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
