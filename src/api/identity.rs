//! Caller identity.
//!
//! Authentication happens upstream; the gateway forwards the verified user id
//! in the `x-user-id` header and this service trusts it as-is.

use axum::{extract::FromRequestParts, http::request::Parts};

use crate::error::AppError;

/// Header carrying the authenticated user id.
pub const USER_ID_HEADER: &str = "x-user-id";

/// Extractor for the calling user's id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserId(pub String);

#[axum::async_trait]
impl<S> FromRequestParts<S> for UserId
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .headers
            .get(USER_ID_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|id| !id.is_empty())
            .map(|id| UserId(id.to_string()))
            .ok_or_else(|| AppError::Unauthorized("User ID is required".to_string()))
    }
}
