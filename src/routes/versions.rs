//! Version snapshot routes.

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::Json;
use model::Entity;
use serde::Deserialize;
use uuid::Uuid;

use crate::routes::entities::ParentQuery;
use crate::routes::{ApiError, EditingUser, parse_kind};
use crate::services::version::{self, EntityVersion, Version};
use crate::state::AppState;

#[derive(Debug, Default, Deserialize)]
pub struct CreateVersionBody {
    #[serde(default)]
    pub description: Option<String>,
}

/// `GET /api/versions` — newest first.
pub async fn list(State(state): State<AppState>) -> Result<Json<Vec<Version>>, ApiError> {
    Ok(Json(version::list_versions(&state.pool).await?))
}

/// `POST /api/versions` — snapshot every entity.
pub async fn create(
    State(state): State<AppState>,
    EditingUser(user): EditingUser,
    Json(body): Json<CreateVersionBody>,
) -> Result<(StatusCode, Json<Version>), ApiError> {
    let created = version::create_version(&state.pool, &user, body.description.as_deref()).await?;
    Ok((StatusCode::CREATED, Json(created)))
}

/// `GET /api/versions/:version_id/entities/:kind?parent_id=`
pub async fn list_entities(
    State(state): State<AppState>,
    Path((version_id, kind)): Path<(Uuid, String)>,
    Query(query): Query<ParentQuery>,
) -> Result<Json<Vec<Entity>>, ApiError> {
    let kind = parse_kind(&kind)?;
    Ok(Json(version::list_versioned_entities(&state.pool, version_id, kind, query.parent_id).await?))
}

/// `GET /api/versions/:version_id/entities/:kind/:id`
pub async fn get_entity(
    State(state): State<AppState>,
    Path((version_id, kind, id)): Path<(Uuid, String, Uuid)>,
) -> Result<Json<Entity>, ApiError> {
    let kind = parse_kind(&kind)?;
    Ok(Json(version::get_versioned_entity(&state.pool, version_id, kind, id).await?))
}

/// `GET /api/entities/:kind/:id/versions` — the entity across all snapshots.
pub async fn entity_history(
    State(state): State<AppState>,
    Path((kind, id)): Path<(String, Uuid)>,
) -> Result<Json<Vec<EntityVersion>>, ApiError> {
    let kind = parse_kind(&kind)?;
    Ok(Json(version::entity_versions(&state.pool, kind, id).await?))
}
