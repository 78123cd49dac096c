//! Entity CRUD, hierarchy and clipboard routes.

use std::collections::BTreeMap;

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::http::header::{CONTENT_DISPOSITION, CONTENT_TYPE};
use axum::response::{IntoResponse, Json, Response};
use model::Entity;
use serde::Deserialize;
use serde_json::Value;
use uuid::Uuid;

use crate::routes::{ApiError, EditingUser, parse_kind};
use crate::services::entity::{self, Removed};
use crate::services::hierarchy::{self, Hierarchy, HierarchyDocument, InsertSummary};
use crate::services::sequence::{self, SequenceGroup};
use crate::state::AppState;

#[derive(Debug, Default, Deserialize)]
pub struct ParentQuery {
    pub parent_id: Option<Uuid>,
}

#[derive(Debug, Default, Deserialize)]
pub struct CreateBody {
    #[serde(default)]
    pub parent_id: Option<Uuid>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateBody {
    pub last_known_updated_at: i64,
    #[serde(default)]
    pub fields: BTreeMap<String, Value>,
}

// =============================================================================
// CRUD
// =============================================================================

/// `GET /api/entities/:kind?parent_id=` — children of a parent, or all lines.
pub async fn list(
    State(state): State<AppState>,
    Path(kind): Path<String>,
    Query(query): Query<ParentQuery>,
) -> Result<Json<Vec<Entity>>, ApiError> {
    let kind = parse_kind(&kind)?;
    Ok(Json(entity::list_entities(&state.pool, kind, query.parent_id).await?))
}

/// `POST /api/entities/:kind` — create an empty entity.
pub async fn create(
    State(state): State<AppState>,
    EditingUser(user): EditingUser,
    Path(kind): Path<String>,
    Json(body): Json<CreateBody>,
) -> Result<(StatusCode, Json<Entity>), ApiError> {
    let kind = parse_kind(&kind)?;
    let created = entity::create_entity(&state.pool, &user, kind, body.parent_id).await?;
    Ok((StatusCode::CREATED, Json(created)))
}

/// `GET /api/entities/:kind/:id`
pub async fn get_one(
    State(state): State<AppState>,
    Path((kind, id)): Path<(String, Uuid)>,
) -> Result<Json<Entity>, ApiError> {
    let kind = parse_kind(&kind)?;
    Ok(Json(entity::get_entity(&state.pool, kind, id).await?))
}

/// `PATCH /api/entities/:kind/:id` — field edits guarded by the last seen `updated_at`.
pub async fn update(
    State(state): State<AppState>,
    EditingUser(user): EditingUser,
    Path((kind, id)): Path<(String, Uuid)>,
    Json(body): Json<UpdateBody>,
) -> Result<Json<Entity>, ApiError> {
    let kind = parse_kind(&kind)?;
    let updated = entity::update_entity(&state.pool, &user, kind, id, body.last_known_updated_at, &body.fields).await?;
    Ok(Json(updated))
}

/// `DELETE /api/entities/:kind/:id` — removes the entity and its subtree.
pub async fn delete(
    State(state): State<AppState>,
    EditingUser(user): EditingUser,
    Path((kind, id)): Path<(String, Uuid)>,
) -> Result<Json<Vec<Removed>>, ApiError> {
    let kind = parse_kind(&kind)?;
    Ok(Json(entity::delete_entity(&state.pool, &user, kind, id).await?))
}

// =============================================================================
// HIERARCHY
// =============================================================================

/// `GET /api/entities/:kind/:id/tree`
pub async fn tree(
    State(state): State<AppState>,
    Path((kind, id)): Path<(String, Uuid)>,
) -> Result<Json<Hierarchy>, ApiError> {
    let kind = parse_kind(&kind)?;
    Ok(Json(hierarchy::load_tree(&state.pool, kind, id).await?))
}

/// `GET /api/entities/:kind/:id/export` — download the subtree as a JSON document.
pub async fn export(
    State(state): State<AppState>,
    Path((kind, id)): Path<(String, Uuid)>,
) -> Result<Response, ApiError> {
    let kind = parse_kind(&kind)?;
    let doc = hierarchy::export_document(&state.pool, kind, id).await?;
    let body = serde_json::to_vec_pretty(&doc).map_err(|e| ApiError {
        status: StatusCode::INTERNAL_SERVER_ERROR,
        code: "E_SERIALIZE",
        message: e.to_string(),
    })?;
    let filename = format!("{kind}-{id}.json");

    Ok((
        [
            (CONTENT_TYPE, "application/json; charset=utf-8".to_owned()),
            (CONTENT_DISPOSITION, format!("attachment; filename=\"{filename}\"")),
        ],
        body,
    )
        .into_response())
}

/// `POST /api/import` — insert an exported document with its original ids.
pub async fn import(
    State(state): State<AppState>,
    EditingUser(user): EditingUser,
    Json(doc): Json<HierarchyDocument>,
) -> Result<(StatusCode, Json<InsertSummary>), ApiError> {
    let summary = hierarchy::import_document(&state.pool, &user, &doc).await?;
    Ok((StatusCode::CREATED, Json(summary)))
}

/// `POST /api/entities/:kind/paste?parent_id=` — paste a clipboard subtree as a copy.
pub async fn paste(
    State(state): State<AppState>,
    EditingUser(user): EditingUser,
    Path(kind): Path<String>,
    Query(query): Query<ParentQuery>,
    Json(clipboard): Json<Value>,
) -> Result<(StatusCode, Json<InsertSummary>), ApiError> {
    let kind = parse_kind(&kind)?;
    let node = hierarchy::parse_clipboard(clipboard)?;
    let summary = hierarchy::paste_document(&state.pool, &user, kind, query.parent_id, &node).await?;
    Ok((StatusCode::CREATED, Json(summary)))
}

/// `GET /api/stations/:id/sequence-groups`
pub async fn sequence_groups(
    State(state): State<AppState>,
    Path(station_id): Path<Uuid>,
) -> Result<Json<Vec<SequenceGroup>>, ApiError> {
    Ok(Json(sequence::sequence_groups(&state.pool, station_id).await?))
}

#[cfg(test)]
#[path = "entities_test.rs"]
mod tests;
