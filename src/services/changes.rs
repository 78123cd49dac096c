//! Change log service — global last-update timestamp and change sets.
//!
//! DESIGN
//! ======
//! Every mutation runs inside a transaction that first calls
//! [`bump_global`] and then [`append`]s one log row per touched entity.
//! `bump_global` hands out strictly increasing millisecond timestamps
//! (`max(now, last + 1)`), so no two changes share a time and clients can
//! ask for "everything after T" with a plain `>` comparison.

use std::collections::BTreeMap;

use model::timestamp::{self, TimestampError};
use model::{ChangeEntry, ChangeOp, ChangeSet, EntityKind};
use serde_json::Value;
use sqlx::{SqliteConnection, SqlitePool};
use uuid::Uuid;

const GLOBAL_STATE_KEY: &str = "global_state";

// =============================================================================
// TYPES
// =============================================================================

#[derive(Debug, thiserror::Error)]
pub enum ChangeError {
    #[error(transparent)]
    Timestamp(#[from] TimestampError),
    #[error("corrupt change log row {seq}: {reason}")]
    Corrupt { seq: i64, reason: String },
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

impl crate::error::ErrorCode for ChangeError {
    fn error_code(&self) -> &'static str {
        match self {
            Self::Timestamp(e) => crate::error::ErrorCode::error_code(e),
            Self::Corrupt { .. } => "E_CORRUPT_CHANGE_LOG",
            Self::Database(_) => "E_DATABASE",
        }
    }
}

type ChangeRow = (i64, Uuid, String, String, i64, Option<String>, Option<String>, Option<String>);

// =============================================================================
// WRITE SIDE
// =============================================================================

/// Advance the global timestamp and return the new value.
///
/// # Errors
///
/// Returns a database error if the metadata row cannot be read or written.
pub async fn bump_global(conn: &mut SqliteConnection) -> Result<i64, sqlx::Error> {
    let last = sqlx::query_as::<_, (i64,)>("SELECT last_update FROM app_metadata WHERE config_key = ?")
        .bind(GLOBAL_STATE_KEY)
        .fetch_optional(&mut *conn)
        .await?
        .map_or(0, |(ts,)| ts);
    let next = timestamp::now_ms().max(last.saturating_add(1));

    sqlx::query(
        "INSERT INTO app_metadata (config_key, last_update) VALUES (?, ?) \
         ON CONFLICT(config_key) DO UPDATE SET last_update = excluded.last_update",
    )
    .bind(GLOBAL_STATE_KEY)
    .bind(next)
    .execute(&mut *conn)
    .await?;

    Ok(next)
}

/// Append one change-log row.
///
/// # Errors
///
/// Returns a database error if the insert fails.
pub async fn append(conn: &mut SqliteConnection, entry: &ChangeEntry) -> Result<(), sqlx::Error> {
    let changed_fields = if entry.changed_fields.is_empty() {
        None
    } else {
        Some(serde_json::to_string(&entry.changed_fields).map_err(|e| sqlx::Error::Encode(Box::new(e)))?)
    };

    sqlx::query(
        "INSERT INTO entity_change_log \
         (entity_id, entity_kind, operation, changed_at, changed_by, changed_fields, description) \
         VALUES (?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(entry.entity_id)
    .bind(entry.kind.as_str())
    .bind(entry.op.as_str())
    .bind(entry.changed_at)
    .bind(entry.changed_by.as_deref())
    .bind(changed_fields)
    .bind(entry.description.as_deref())
    .execute(&mut *conn)
    .await?;

    Ok(())
}

/// Shorthand for a change entry without field payload.
#[must_use]
pub fn entry(kind: EntityKind, entity_id: Uuid, op: ChangeOp, changed_at: i64, user: &str) -> ChangeEntry {
    ChangeEntry {
        kind,
        entity_id,
        op,
        changed_at,
        changed_by: Some(user.to_owned()),
        changed_fields: BTreeMap::new(),
        description: None,
    }
}

// =============================================================================
// READ SIDE
// =============================================================================

/// Current global last-update timestamp (ms).
///
/// # Errors
///
/// Returns a database error if the query fails.
pub async fn global_last_update(pool: &SqlitePool) -> Result<i64, ChangeError> {
    let row = sqlx::query_as::<_, (i64,)>("SELECT last_update FROM app_metadata WHERE config_key = ?")
        .bind(GLOBAL_STATE_KEY)
        .fetch_optional(pool)
        .await?;
    Ok(row.map_or(0, |(ts,)| ts))
}

/// Every change strictly after `since`, folded into a [`ChangeSet`].
///
/// # Errors
///
/// Returns an error if the log cannot be read or holds an unparseable row.
pub async fn changes_since(pool: &SqlitePool, since: i64) -> Result<ChangeSet, ChangeError> {
    let mut tx = pool.begin().await?;

    let global = sqlx::query_as::<_, (i64,)>("SELECT last_update FROM app_metadata WHERE config_key = ?")
        .bind(GLOBAL_STATE_KEY)
        .fetch_optional(&mut *tx)
        .await?
        .map_or(0, |(ts,)| ts);

    let rows = sqlx::query_as::<_, ChangeRow>(
        "SELECT seq, entity_id, entity_kind, operation, changed_at, changed_by, changed_fields, description \
         FROM entity_change_log WHERE changed_at > ? ORDER BY changed_at, seq",
    )
    .bind(since)
    .fetch_all(&mut *tx)
    .await?;

    tx.commit().await?;

    let entries = rows.into_iter().map(row_to_entry).collect::<Result<Vec<_>, _>>()?;
    tracing::debug!(since, count = entries.len(), "change set assembled");

    Ok(ChangeSet::from_entries(global, entries))
}

/// [`changes_since`] with a client-supplied timestamp string.
///
/// # Errors
///
/// Returns [`ChangeError::Timestamp`] if `raw` is not a recognized format.
pub async fn changes_since_raw(pool: &SqlitePool, raw: &str) -> Result<ChangeSet, ChangeError> {
    let since = timestamp::parse_flexible(raw)?;
    changes_since(pool, since).await
}

fn row_to_entry(row: ChangeRow) -> Result<ChangeEntry, ChangeError> {
    let (seq, entity_id, kind, op, changed_at, changed_by, changed_fields, description) = row;
    let corrupt = |reason: String| ChangeError::Corrupt { seq, reason };

    let kind = kind.parse::<EntityKind>().map_err(|e| corrupt(e.to_string()))?;
    let op = op.parse::<ChangeOp>().map_err(|e| corrupt(e.to_string()))?;
    let changed_fields = match changed_fields {
        Some(raw) => serde_json::from_str::<BTreeMap<String, Value>>(&raw).map_err(|e| corrupt(e.to_string()))?,
        None => BTreeMap::new(),
    };

    Ok(ChangeEntry { kind, entity_id, op, changed_at, changed_by, changed_fields, description })
}

#[cfg(test)]
#[path = "changes_test.rs"]
mod tests;
