//! Team directory mirror
//!
//! - GET /teams/:team_id - Current reference price and trading status
//! - PUT /teams/:team_id - Insert or replace a team entry

use axum::{
    extract::{rejection::JsonRejection, Path, State},
    routing::get,
    Json, Router,
};

use crate::error::{AppError, Result};
use crate::types::{Team, UpsertTeamRequest};
use crate::AppState;

pub fn router() -> Router<AppState> {
    Router::new().route("/:team_id", get(get_team).put(upsert_team))
}

async fn get_team(State(state): State<AppState>, Path(team_id): Path<String>) -> Result<Json<Team>> {
    Ok(Json(state.trading_service.get_team(&team_id)?))
}

async fn upsert_team(
    State(state): State<AppState>,
    Path(team_id): Path<String>,
    body: std::result::Result<Json<UpsertTeamRequest>, JsonRejection>,
) -> Result<Json<Team>> {
    let Json(request) = body.map_err(|e| AppError::Validation(e.body_text()))?;
    Ok(Json(state.trading_service.upsert_team(&team_id, request)?))
}
