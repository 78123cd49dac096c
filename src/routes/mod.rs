//! Router assembly.
//!
//! SYSTEM CONTEXT
//! ==============
//! Binds the JSON API under `/api` plus a `/healthz` health check. Every handler
//! maps its service error to a status code and a `{code, message}` body so
//! the CLI can show both the machine code and the human text.

pub mod changes;
pub mod entities;
pub mod versions;

use axum::extract::{FromRef, FromRequestParts, Path};
use axum::http::StatusCode;
use axum::http::request::Parts;
use axum::response::{IntoResponse, Json, Response};
use axum::routing::{get, post};
use axum::Router;
use model::i18n::{self, Locale};
use model::{EntityKind, ModelError};
use serde::Serialize;
use std::collections::BTreeMap;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::error::ErrorCode;
use crate::services::changes::ChangeError;
use crate::services::entity::EntityError;
use crate::services::hierarchy::HierarchyError;
use crate::services::version::VersionError;
use crate::state::AppState;

/// Header carrying the editing user's name on mutating requests.
pub const USER_HEADER: &str = "x-cep-user";

pub fn app(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/healthz", get(healthz))
        .route("/api/entities/{kind}", get(entities::list).post(entities::create))
        .route("/api/entities/{kind}/paste", post(entities::paste))
        .route(
            "/api/entities/{kind}/{id}",
            get(entities::get_one).patch(entities::update).delete(entities::delete),
        )
        .route("/api/entities/{kind}/{id}/tree", get(entities::tree))
        .route("/api/entities/{kind}/{id}/export", get(entities::export))
        .route("/api/entities/{kind}/{id}/versions", get(versions::entity_history))
        .route("/api/import", post(entities::import))
        .route("/api/changes", get(changes::since))
        .route("/api/changes/last-update", get(changes::last_update))
        .route("/api/versions", get(versions::list).post(versions::create))
        .route("/api/versions/{version_id}/entities/{kind}", get(versions::list_entities))
        .route("/api/versions/{version_id}/entities/{kind}/{id}", get(versions::get_entity))
        .route("/api/stations/{id}/sequence-groups", get(entities::sequence_groups))
        .route("/api/i18n/{locale}", get(dictionary))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn healthz() -> StatusCode {
    StatusCode::OK
}

/// `GET /api/i18n/:locale` — label table for a locale.
async fn dictionary(Path(locale): Path<String>) -> Result<Json<BTreeMap<&'static str, &'static str>>, ApiError> {
    let locale: Locale = locale.parse().map_err(|e: ModelError| ApiError::new(StatusCode::BAD_REQUEST, &e))?;
    Ok(Json(i18n::dictionary(locale).iter().copied().collect()))
}

// =============================================================================
// EXTRACTORS
// =============================================================================

/// Editing user taken from the `x-cep-user` header (UTF-8, not just ASCII).
pub struct EditingUser(pub String);

impl<S> FromRequestParts<S> for EditingUser
where
    AppState: FromRef<S>,
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let user = parts
            .headers
            .get(USER_HEADER)
            .and_then(|value| std::str::from_utf8(value.as_bytes()).ok())
            .map(str::trim)
            .unwrap_or_default();
        if user.is_empty() {
            return Err(ApiError::from(EntityError::UserRequired));
        }
        Ok(Self(user.to_owned()))
    }
}

pub(crate) fn parse_kind(raw: &str) -> Result<EntityKind, ApiError> {
    Ok(raw.parse::<EntityKind>()?)
}

// =============================================================================
// ERRORS
// =============================================================================

#[derive(Debug, Serialize)]
struct ErrorBody {
    code: &'static str,
    message: String,
}

/// Status plus the `{code, message}` body sent for a failed request.
#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub code: &'static str,
    pub message: String,
}

impl ApiError {
    fn new(status: StatusCode, err: &(impl ErrorCode + std::fmt::Display)) -> Self {
        if status.is_server_error() {
            tracing::warn!(code = err.error_code(), error = %err, "request failed");
        }
        Self { status, code: err.error_code(), message: err.to_string() }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(ErrorBody { code: self.code, message: self.message })).into_response()
    }
}

pub(crate) fn model_error_to_status(err: &ModelError) -> StatusCode {
    match err {
        ModelError::UnknownKind(_) | ModelError::UnknownField { .. } => StatusCode::BAD_REQUEST,
        ModelError::InvalidValue { .. } => StatusCode::UNPROCESSABLE_ENTITY,
    }
}

pub(crate) fn entity_error_to_status(err: &EntityError) -> StatusCode {
    match err {
        EntityError::Model(e) => model_error_to_status(e),
        EntityError::NotFound(_) => StatusCode::NOT_FOUND,
        EntityError::ParentRequired(_) | EntityError::UnexpectedParent(_) => StatusCode::BAD_REQUEST,
        EntityError::ParentNotFound(_) => StatusCode::UNPROCESSABLE_ENTITY,
        EntityError::UserRequired => StatusCode::UNAUTHORIZED,
        EntityError::Conflict { .. } => StatusCode::CONFLICT,
        EntityError::Database(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

pub(crate) fn change_error_to_status(err: &ChangeError) -> StatusCode {
    match err {
        ChangeError::Timestamp(_) => StatusCode::BAD_REQUEST,
        ChangeError::Corrupt { .. } | ChangeError::Database(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

pub(crate) fn hierarchy_error_to_status(err: &HierarchyError) -> StatusCode {
    match err {
        HierarchyError::Entity(e) => entity_error_to_status(e),
        HierarchyError::AlreadyExists(_) => StatusCode::CONFLICT,
        HierarchyError::KindMismatch { .. } | HierarchyError::InvalidDocument(_) => StatusCode::BAD_REQUEST,
        HierarchyError::UnexpectedChild { .. } => StatusCode::UNPROCESSABLE_ENTITY,
        HierarchyError::Change(e) => change_error_to_status(e),
        HierarchyError::Database(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

pub(crate) fn version_error_to_status(err: &VersionError) -> StatusCode {
    match err {
        VersionError::Entity(e) => entity_error_to_status(e),
        VersionError::NotFound(_) => StatusCode::NOT_FOUND,
        VersionError::Corrupt(_) | VersionError::Database(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl From<ModelError> for ApiError {
    fn from(err: ModelError) -> Self {
        Self::new(model_error_to_status(&err), &err)
    }
}

impl From<EntityError> for ApiError {
    fn from(err: EntityError) -> Self {
        Self::new(entity_error_to_status(&err), &err)
    }
}

impl From<ChangeError> for ApiError {
    fn from(err: ChangeError) -> Self {
        Self::new(change_error_to_status(&err), &err)
    }
}

impl From<HierarchyError> for ApiError {
    fn from(err: HierarchyError) -> Self {
        Self::new(hierarchy_error_to_status(&err), &err)
    }
}

impl From<VersionError> for ApiError {
    fn from(err: VersionError) -> Self {
        Self::new(version_error_to_status(&err), &err)
    }
}

#[cfg(test)]
#[path = "test_support.rs"]
pub(crate) mod test_support;

#[cfg(test)]
#[path = "mod_test.rs"]
mod tests;
