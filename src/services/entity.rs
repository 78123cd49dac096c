//! Entity service — the string-keyed CRUD dispatcher over the four tables.
//!
//! DESIGN
//! ======
//! Callers name the table with an [`EntityKind`] (parsed from the request's
//! entity-type string). SQL text is assembled only from the kind's table
//! name and its static field catalog; request data is always bound.
//!
//! Every mutation is one transaction: bump the global timestamp, write the
//! row(s), append change-log entries. Updates carry stale-write protection:
//! a client passes the `updated_at` it last saw and the write is rejected
//! if the row has moved on since.

use std::collections::BTreeMap;

use model::{ChangeOp, Entity, EntityKind, FieldType, ModelError};
use serde::Serialize;
use serde_json::Value;
use sqlx::sqlite::SqliteRow;
use sqlx::{QueryBuilder, Row, Sqlite, SqliteConnection, SqlitePool};
use uuid::Uuid;

use crate::error::ErrorCode;
use crate::services::changes;

// =============================================================================
// TYPES
// =============================================================================

#[derive(Debug, thiserror::Error)]
pub enum EntityError {
    #[error(transparent)]
    Model(#[from] ModelError),
    #[error("entity not found: {0}")]
    NotFound(Uuid),
    #[error("a parent id is required for {0}")]
    ParentRequired(EntityKind),
    #[error("parent not found: {0}")]
    ParentNotFound(Uuid),
    #[error("{0} entities have no parent")]
    UnexpectedParent(EntityKind),
    #[error("user name is required")]
    UserRequired,
    #[error("conflict: entity updated at {current}, client last saw {last_known}")]
    Conflict { current: i64, last_known: i64 },
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

impl ErrorCode for EntityError {
    fn error_code(&self) -> &'static str {
        match self {
            Self::Model(e) => e.error_code(),
            Self::NotFound(_) => "E_ENTITY_NOT_FOUND",
            Self::ParentRequired(_) => "E_PARENT_REQUIRED",
            Self::ParentNotFound(_) => "E_PARENT_NOT_FOUND",
            Self::UnexpectedParent(_) => "E_UNEXPECTED_PARENT",
            Self::UserRequired => "E_USER_REQUIRED",
            Self::Conflict { .. } => "E_CONFLICT",
            Self::Database(_) => "E_DATABASE",
        }
    }
}

static NULL: Value = Value::Null;

/// One entity removed by a delete, root or descendant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Removed {
    pub kind: EntityKind,
    pub id: Uuid,
}

// =============================================================================
// READ
// =============================================================================

/// Fetch one entity.
///
/// # Errors
///
/// Returns `NotFound` if no row has this id.
pub async fn get_entity(pool: &SqlitePool, kind: EntityKind, id: Uuid) -> Result<Entity, EntityError> {
    let mut conn = pool.acquire().await?;
    fetch_entity(&mut conn, kind, id).await?.ok_or(EntityError::NotFound(id))
}

/// List entities of a kind, oldest first. Non-line kinds are listed per parent.
///
/// # Errors
///
/// Returns `ParentRequired` when a non-line kind is listed without a parent.
pub async fn list_entities(pool: &SqlitePool, kind: EntityKind, parent_id: Option<Uuid>) -> Result<Vec<Entity>, EntityError> {
    check_parent_shape(kind, parent_id)?;
    let mut conn = pool.acquire().await?;
    Ok(fetch_entities(&mut conn, kind, parent_id).await?)
}

pub(crate) async fn fetch_entity(conn: &mut SqliteConnection, kind: EntityKind, id: Uuid) -> Result<Option<Entity>, sqlx::Error> {
    let sql = format!("SELECT {} FROM {} WHERE id = ?", select_columns(kind), kind.table());
    let row = sqlx::query(&sql).bind(id).fetch_optional(&mut *conn).await?;
    row.map(|row| entity_from_row(kind, &row)).transpose()
}

/// Rows of `kind`, optionally restricted to one parent, ordered by creation.
pub(crate) async fn fetch_entities(
    conn: &mut SqliteConnection,
    kind: EntityKind,
    parent_id: Option<Uuid>,
) -> Result<Vec<Entity>, sqlx::Error> {
    let mut sql = format!("SELECT {} FROM {}", select_columns(kind), kind.table());
    if parent_id.is_some() {
        sql.push_str(" WHERE parent_id = ?");
    }
    sql.push_str(" ORDER BY created_at, rowid");

    let mut query = sqlx::query(&sql);
    if let Some(parent_id) = parent_id {
        query = query.bind(parent_id);
    }
    let rows = query.fetch_all(&mut *conn).await?;
    rows.iter().map(|row| entity_from_row(kind, row)).collect()
}

pub(crate) async fn exists(conn: &mut SqliteConnection, kind: EntityKind, id: Uuid) -> Result<bool, sqlx::Error> {
    let sql = format!("SELECT 1 FROM {} WHERE id = ?", kind.table());
    let row = sqlx::query(&sql).bind(id).fetch_optional(&mut *conn).await?;
    Ok(row.is_some())
}

// =============================================================================
// CREATE
// =============================================================================

/// Create an empty entity under `parent_id`.
///
/// # Errors
///
/// Returns `UserRequired`, `ParentRequired`, `UnexpectedParent`, or
/// `ParentNotFound` for invalid requests.
pub async fn create_entity(
    pool: &SqlitePool,
    user: &str,
    kind: EntityKind,
    parent_id: Option<Uuid>,
) -> Result<Entity, EntityError> {
    let user = require_user(user)?;
    check_parent_shape(kind, parent_id)?;

    let mut tx = pool.begin().await?;
    if let (Some(parent_kind), Some(parent_id)) = (kind.parent(), parent_id) {
        if !exists(&mut tx, parent_kind, parent_id).await? {
            return Err(EntityError::ParentNotFound(parent_id));
        }
    }

    let now = changes::bump_global(&mut tx).await?;
    let entity = Entity {
        id: Uuid::new_v4(),
        kind,
        parent_id,
        created_at: now,
        updated_at: now,
        created_by: Some(user.to_owned()),
        updated_by: Some(user.to_owned()),
        fields: kind.fields().iter().map(|spec| (spec.name.to_owned(), Value::Null)).collect(),
    };
    insert_entity(&mut tx, &entity).await?;
    changes::append(&mut tx, &changes::entry(kind, entity.id, ChangeOp::Create, now, user)).await?;
    tx.commit().await?;

    tracing::info!(id = %entity.id, %kind, user, "entity created");
    Ok(entity)
}

/// Insert a complete entity row as-is (ids and audit columns included).
pub(crate) async fn insert_entity(conn: &mut SqliteConnection, entity: &Entity) -> Result<(), sqlx::Error> {
    let kind = entity.kind;
    let mut qb = QueryBuilder::<Sqlite>::new(format!("INSERT INTO {} (id, ", kind.table()));
    if kind.parent().is_some() {
        qb.push("parent_id, ");
    }
    qb.push("created_at, updated_at, created_by, updated_by");
    for spec in kind.fields() {
        qb.push(", ").push(spec.name);
    }
    qb.push(") VALUES (");

    let mut values = qb.separated(", ");
    values.push_bind(entity.id);
    if kind.parent().is_some() {
        values.push_bind(entity.parent_id);
    }
    values.push_bind(entity.created_at);
    values.push_bind(entity.updated_at);
    values.push_bind(entity.created_by.clone());
    values.push_bind(entity.updated_by.clone());
    for spec in kind.fields() {
        let value = entity.fields.get(spec.name).unwrap_or(&NULL);
        match spec.kind {
            FieldType::Text => values.push_bind(value.as_str().map(str::to_owned)),
            FieldType::Integer => values.push_bind(value.as_i64()),
        };
    }
    values.push_unseparated(")");

    qb.build().execute(&mut *conn).await?;
    Ok(())
}

// =============================================================================
// UPDATE
// =============================================================================

/// Apply field updates with stale-write protection.
///
/// Values are validated against the field catalog; empty strings are
/// stored as NULL. Fields whose value is unchanged are skipped, and an
/// update that changes nothing returns the current row untouched.
///
/// # Errors
///
/// Returns `Conflict` if the row was updated after `last_known_updated_at`,
/// `NotFound` if it does not exist, and `Model` for invalid fields.
pub async fn update_entity(
    pool: &SqlitePool,
    user: &str,
    kind: EntityKind,
    id: Uuid,
    last_known_updated_at: i64,
    fields: &BTreeMap<String, Value>,
) -> Result<Entity, EntityError> {
    let user = require_user(user)?;
    let mut normalized = BTreeMap::new();
    for (field, value) in fields {
        normalized.insert(field.clone(), model::validate_field(kind, field, value)?);
    }

    let mut tx = pool.begin().await?;
    let mut entity = fetch_entity(&mut tx, kind, id).await?.ok_or(EntityError::NotFound(id))?;
    if entity.updated_at > last_known_updated_at {
        tracing::warn!(%id, %kind, current = entity.updated_at, last_known_updated_at, "stale update rejected");
        return Err(EntityError::Conflict { current: entity.updated_at, last_known: last_known_updated_at });
    }

    normalized.retain(|field, value| entity.fields.get(field).unwrap_or(&NULL) != &*value);
    if normalized.is_empty() {
        return Ok(entity);
    }

    let now = changes::bump_global(&mut tx).await?;

    let mut qb = QueryBuilder::<Sqlite>::new(format!("UPDATE {} SET updated_at = ", kind.table()));
    qb.push_bind(now).push(", updated_by = ").push_bind(user.to_owned());
    for (field, value) in &normalized {
        qb.push(", ").push(field.as_str()).push(" = ");
        match value {
            Value::Number(n) => qb.push_bind(n.as_i64()),
            Value::String(s) => qb.push_bind(s.clone()),
            _ => qb.push_bind(Option::<String>::None),
        };
    }
    qb.push(" WHERE id = ").push_bind(id);
    qb.build().execute(&mut *tx).await?;

    let mut change = changes::entry(kind, id, ChangeOp::Update, now, user);
    change.changed_fields.clone_from(&normalized);
    changes::append(&mut tx, &change).await?;
    tx.commit().await?;

    tracing::info!(%id, %kind, user, fields = normalized.len(), "entity updated");

    entity.updated_at = now;
    entity.updated_by = Some(user.to_owned());
    entity.fields.extend(normalized);
    Ok(entity)
}

// =============================================================================
// DELETE
// =============================================================================

/// Delete an entity and, by cascade, all of its descendants.
///
/// # Errors
///
/// Returns `NotFound` if the entity does not exist.
pub async fn delete_entity(pool: &SqlitePool, user: &str, kind: EntityKind, id: Uuid) -> Result<Vec<Removed>, EntityError> {
    let user = require_user(user)?;
    let mut tx = pool.begin().await?;

    if !exists(&mut tx, kind, id).await? {
        return Err(EntityError::NotFound(id));
    }
    let removed = collect_subtree(&mut tx, kind, id).await?;

    let sql = format!("DELETE FROM {} WHERE id = ?", kind.table());
    let result = sqlx::query(&sql).bind(id).execute(&mut *tx).await?;
    if result.rows_affected() == 0 {
        return Err(EntityError::NotFound(id));
    }

    let now = changes::bump_global(&mut tx).await?;
    for item in &removed {
        changes::append(&mut tx, &changes::entry(item.kind, item.id, ChangeOp::Delete, now, user)).await?;
    }
    tx.commit().await?;

    tracing::info!(%id, %kind, user, removed = removed.len(), "entity deleted");
    Ok(removed)
}

/// The entity itself followed by all descendants, level by level.
async fn collect_subtree(conn: &mut SqliteConnection, kind: EntityKind, id: Uuid) -> Result<Vec<Removed>, sqlx::Error> {
    let mut removed = vec![Removed { kind, id }];
    let mut frontier = vec![id];
    let mut level = kind;

    while let Some(child) = level.child() {
        let sql = format!("SELECT id FROM {} WHERE parent_id = ?", child.table());
        let mut next = Vec::new();
        for parent_id in &frontier {
            let ids = sqlx::query_as::<_, (Uuid,)>(&sql).bind(*parent_id).fetch_all(&mut *conn).await?;
            next.extend(ids.into_iter().map(|(id,)| id));
        }
        removed.extend(next.iter().map(|id| Removed { kind: child, id: *id }));
        frontier = next;
        level = child;
    }

    Ok(removed)
}

// =============================================================================
// HELPERS
// =============================================================================

pub(crate) fn require_user(user: &str) -> Result<&str, EntityError> {
    let user = user.trim();
    if user.is_empty() { Err(EntityError::UserRequired) } else { Ok(user) }
}

pub(crate) fn check_parent_shape(kind: EntityKind, parent_id: Option<Uuid>) -> Result<(), EntityError> {
    match (kind.parent(), parent_id) {
        (None, Some(_)) => Err(EntityError::UnexpectedParent(kind)),
        (Some(_), None) => Err(EntityError::ParentRequired(kind)),
        _ => Ok(()),
    }
}

fn select_columns(kind: EntityKind) -> String {
    let mut columns = vec!["id", "created_at", "updated_at", "created_by", "updated_by"];
    if kind.parent().is_some() {
        columns.push("parent_id");
    }
    columns.extend(kind.fields().iter().map(|spec| spec.name));
    columns.join(", ")
}

fn entity_from_row(kind: EntityKind, row: &SqliteRow) -> Result<Entity, sqlx::Error> {
    let parent_id = if kind.parent().is_some() { row.try_get::<Option<Uuid>, _>("parent_id")? } else { None };

    let mut fields = BTreeMap::new();
    for spec in kind.fields() {
        let value = match spec.kind {
            FieldType::Text => row.try_get::<Option<String>, _>(spec.name)?.map_or(Value::Null, Value::String),
            FieldType::Integer => row.try_get::<Option<i64>, _>(spec.name)?.map_or(Value::Null, Value::from),
        };
        fields.insert(spec.name.to_owned(), value);
    }

    Ok(Entity {
        id: row.try_get("id")?,
        kind,
        parent_id,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
        created_by: row.try_get("created_by")?,
        updated_by: row.try_get("updated_by")?,
        fields,
    })
}

#[cfg(test)]
#[path = "entity_test.rs"]
mod tests;
