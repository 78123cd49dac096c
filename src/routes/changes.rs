//! Change polling routes.
//!
//! Clients poll `/api/changes?since=` with the last global timestamp they
//! saw. `since` may be integer milliseconds or a timestamp string.

use axum::extract::{Query, State};
use axum::response::Json;
use model::ChangeSet;
use serde::{Deserialize, Serialize};

use crate::routes::ApiError;
use crate::services::changes;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct SinceQuery {
    pub since: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct LastUpdateResponse {
    pub last_update: i64,
}

/// `GET /api/changes?since=` — everything after `since` (all history if absent).
pub async fn since(State(state): State<AppState>, Query(query): Query<SinceQuery>) -> Result<Json<ChangeSet>, ApiError> {
    let set = match query.since.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
        Some(raw) => changes::changes_since_raw(&state.pool, raw).await?,
        None => changes::changes_since(&state.pool, 0).await?,
    };
    Ok(Json(set))
}

/// `GET /api/changes/last-update`
pub async fn last_update(State(state): State<AppState>) -> Result<Json<LastUpdateResponse>, ApiError> {
    let last_update = changes::global_last_update(&state.pool).await?;
    Ok(Json(LastUpdateResponse { last_update }))
}
