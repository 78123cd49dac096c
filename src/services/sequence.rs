//! Sequence-group view of a station's operations.
//!
//! Operations of every tool under a station are grouped by
//! `sequence_group`. Groups sort by name with the unnamed group last;
//! inside a group operations sort by `sequence` (unset last), then by
//! creation time.

use model::{Entity, EntityKind};
use serde::Serialize;
use sqlx::SqlitePool;
use uuid::Uuid;

use crate::services::entity::{self, EntityError};

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct SequenceGroup {
    /// Empty for operations without a group.
    pub name: String,
    pub operations: Vec<Entity>,
}

/// Group the operations below `station_id` by sequence group.
///
/// # Errors
///
/// Returns `NotFound` if the station does not exist.
pub async fn sequence_groups(pool: &SqlitePool, station_id: Uuid) -> Result<Vec<SequenceGroup>, EntityError> {
    let mut conn = pool.acquire().await?;
    if !entity::exists(&mut conn, EntityKind::Station, station_id).await? {
        return Err(EntityError::NotFound(station_id));
    }

    let mut operations = Vec::new();
    for tool in entity::fetch_entities(&mut conn, EntityKind::Tool, Some(station_id)).await? {
        operations.extend(entity::fetch_entities(&mut conn, EntityKind::Operation, Some(tool.id)).await?);
    }

    Ok(group_operations(operations))
}

fn group_operations(mut operations: Vec<Entity>) -> Vec<SequenceGroup> {
    operations.sort_by(|a, b| {
        let group_a = group_name(a);
        let group_b = group_name(b);
        (group_a.is_empty(), group_a)
            .cmp(&(group_b.is_empty(), group_b))
            .then_with(|| sequence_key(a).cmp(&sequence_key(b)))
            .then_with(|| a.created_at.cmp(&b.created_at))
    });

    let mut groups: Vec<SequenceGroup> = Vec::new();
    for op in operations {
        let name = group_name(&op);
        match groups.last_mut() {
            Some(group) if group.name == name => group.operations.push(op),
            _ => groups.push(SequenceGroup { name, operations: vec![op] }),
        }
    }
    groups
}

fn group_name(op: &Entity) -> String {
    op.field_text("sequence_group").map(|s| s.trim().to_owned()).unwrap_or_default()
}

/// `(unset, value)` so unset sequences sort after every number.
fn sequence_key(op: &Entity) -> (bool, i64) {
    match op.fields.get("sequence").and_then(serde_json::Value::as_i64) {
        Some(seq) => (false, seq),
        None => (true, 0),
    }
}

#[cfg(test)]
#[path = "sequence_test.rs"]
mod tests;
