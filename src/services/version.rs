//! Version service — named snapshots of every entity and per-entity history.
//!
//! A version copies all four tables into `entity_history` under a new
//! version id. Snapshots are immutable; later edits only touch the live
//! tables.

use std::collections::BTreeMap;

use model::{Entity, EntityKind, timestamp};
use serde::Serialize;
use serde_json::Value;
use sqlx::SqlitePool;
use uuid::Uuid;

use crate::error::ErrorCode;
use crate::services::entity::{self, EntityError};

// =============================================================================
// TYPES
// =============================================================================

#[derive(Debug, thiserror::Error)]
pub enum VersionError {
    #[error(transparent)]
    Entity(#[from] EntityError),
    #[error("version not found: {0}")]
    NotFound(Uuid),
    #[error("corrupt history row: {0}")]
    Corrupt(String),
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

impl ErrorCode for VersionError {
    fn error_code(&self) -> &'static str {
        match self {
            Self::Entity(e) => e.error_code(),
            Self::NotFound(_) => "E_VERSION_NOT_FOUND",
            Self::Corrupt(_) => "E_CORRUPT_HISTORY",
            Self::Database(_) => "E_DATABASE",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Version {
    pub version_id: Uuid,
    pub created_at: i64,
    pub created_by: Option<String>,
    pub description: Option<String>,
}

/// One appearance of an entity in the version history.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct EntityVersion {
    pub number: usize,
    pub version_id: Uuid,
    pub version_created_at: i64,
    pub version_created_by: Option<String>,
    pub updated_at: i64,
    pub updated_by: Option<String>,
}

type HistoryRow = (Uuid, Option<Uuid>, i64, i64, Option<String>, Option<String>, String);

const HISTORY_COLUMNS: &str = "id, parent_id, created_at, updated_at, created_by, updated_by, fields";

// =============================================================================
// SNAPSHOTS
// =============================================================================

/// Snapshot every entity into a new version.
///
/// # Errors
///
/// Returns `UserRequired` (wrapped) for a blank user, or a database error.
pub async fn create_version(pool: &SqlitePool, user: &str, description: Option<&str>) -> Result<Version, VersionError> {
    let user = entity::require_user(user)?;
    let version = Version {
        version_id: Uuid::new_v4(),
        created_at: timestamp::now_ms(),
        created_by: Some(user.to_owned()),
        description: description.map(str::trim).filter(|d| !d.is_empty()).map(str::to_owned),
    };

    let mut tx = pool.begin().await?;
    sqlx::query("INSERT INTO versions (version_id, created_at, created_by, description) VALUES (?, ?, ?, ?)")
        .bind(version.version_id)
        .bind(version.created_at)
        .bind(version.created_by.as_deref())
        .bind(version.description.as_deref())
        .execute(&mut *tx)
        .await?;

    let mut count = 0_usize;
    for kind in EntityKind::ALL {
        for row in entity::fetch_entities(&mut tx, kind, None).await? {
            let fields = serde_json::to_string(&row.fields).map_err(|e| VersionError::Corrupt(e.to_string()))?;
            sqlx::query(
                "INSERT INTO entity_history \
                 (version_id, entity_kind, id, parent_id, created_at, updated_at, created_by, updated_by, fields) \
                 VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)",
            )
            .bind(version.version_id)
            .bind(kind.as_str())
            .bind(row.id)
            .bind(row.parent_id)
            .bind(row.created_at)
            .bind(row.updated_at)
            .bind(row.created_by.as_deref())
            .bind(row.updated_by.as_deref())
            .bind(fields)
            .execute(&mut *tx)
            .await?;
            count += 1;
        }
    }
    tx.commit().await?;

    tracing::info!(version_id = %version.version_id, user, entities = count, "version created");
    Ok(version)
}

/// All versions, newest first.
///
/// # Errors
///
/// Returns a database error if the query fails.
pub async fn list_versions(pool: &SqlitePool) -> Result<Vec<Version>, VersionError> {
    let rows = sqlx::query_as::<_, (Uuid, i64, Option<String>, Option<String>)>(
        "SELECT version_id, created_at, created_by, description FROM versions ORDER BY created_at DESC, rowid DESC",
    )
    .fetch_all(pool)
    .await?;

    Ok(rows
        .into_iter()
        .map(|(version_id, created_at, created_by, description)| Version { version_id, created_at, created_by, description })
        .collect())
}

// =============================================================================
// HISTORY READS
// =============================================================================

/// An entity as it was captured in `version_id`.
///
/// # Errors
///
/// Returns `NotFound` for an unknown version and a wrapped entity
/// `NotFound` when the entity is absent from that version.
pub async fn get_versioned_entity(pool: &SqlitePool, version_id: Uuid, kind: EntityKind, id: Uuid) -> Result<Entity, VersionError> {
    ensure_version(pool, version_id).await?;
    let sql = format!("SELECT {HISTORY_COLUMNS} FROM entity_history WHERE version_id = ? AND entity_kind = ? AND id = ?");
    let row = sqlx::query_as::<_, HistoryRow>(&sql)
        .bind(version_id)
        .bind(kind.as_str())
        .bind(id)
        .fetch_optional(pool)
        .await?
        .ok_or(EntityError::NotFound(id))?;
    history_to_entity(kind, row)
}

/// Entities of a kind in `version_id`, with the same parent rule as live lists.
///
/// # Errors
///
/// Returns `NotFound` for an unknown version and parent-shape errors.
pub async fn list_versioned_entities(
    pool: &SqlitePool,
    version_id: Uuid,
    kind: EntityKind,
    parent_id: Option<Uuid>,
) -> Result<Vec<Entity>, VersionError> {
    entity::check_parent_shape(kind, parent_id)?;
    ensure_version(pool, version_id).await?;

    let mut sql = format!("SELECT {HISTORY_COLUMNS} FROM entity_history WHERE version_id = ? AND entity_kind = ?");
    if parent_id.is_some() {
        sql.push_str(" AND parent_id = ?");
    }
    sql.push_str(" ORDER BY created_at, history_id");

    let mut query = sqlx::query_as::<_, HistoryRow>(&sql).bind(version_id).bind(kind.as_str());
    if let Some(parent_id) = parent_id {
        query = query.bind(parent_id);
    }
    let rows = query.fetch_all(pool).await?;
    rows.into_iter().map(|row| history_to_entity(kind, row)).collect()
}

/// Every version that captured this entity, oldest first, numbered from 1.
///
/// # Errors
///
/// Returns a database error if the query fails.
pub async fn entity_versions(pool: &SqlitePool, kind: EntityKind, id: Uuid) -> Result<Vec<EntityVersion>, VersionError> {
    let rows = sqlx::query_as::<_, (Uuid, i64, Option<String>, i64, Option<String>)>(
        "SELECT v.version_id, v.created_at, v.created_by, h.updated_at, h.updated_by \
         FROM entity_history h JOIN versions v ON v.version_id = h.version_id \
         WHERE h.entity_kind = ? AND h.id = ? \
         ORDER BY v.created_at, h.history_id",
    )
    .bind(kind.as_str())
    .bind(id)
    .fetch_all(pool)
    .await?;

    Ok(rows
        .into_iter()
        .enumerate()
        .map(|(index, (version_id, version_created_at, version_created_by, updated_at, updated_by))| EntityVersion {
            number: index + 1,
            version_id,
            version_created_at,
            version_created_by,
            updated_at,
            updated_by,
        })
        .collect())
}

async fn ensure_version(pool: &SqlitePool, version_id: Uuid) -> Result<(), VersionError> {
    let row = sqlx::query("SELECT 1 FROM versions WHERE version_id = ?")
        .bind(version_id)
        .fetch_optional(pool)
        .await?;
    row.map(|_| ()).ok_or(VersionError::NotFound(version_id))
}

fn history_to_entity(kind: EntityKind, row: HistoryRow) -> Result<Entity, VersionError> {
    let (id, parent_id, created_at, updated_at, created_by, updated_by, raw_fields) = row;
    let fields: BTreeMap<String, Value> =
        serde_json::from_str(&raw_fields).map_err(|e| VersionError::Corrupt(format!("{id}: {e}")))?;
    Ok(Entity { id, kind, parent_id, created_at, updated_at, created_by, updated_by, fields })
}

#[cfg(test)]
#[path = "version_test.rs"]
mod tests;
