//! Change-set wire types shared by the change log and draft reconciliation.
//!
//! DESIGN
//! ======
//! The server records one `ChangeEntry` per mutation. Clients ask for the
//! entries after their last sync and receive them folded into a `ChangeSet`:
//! updates of one entity merge (latest value wins), a delete cancels any
//! create or update seen earlier in the same window.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::{EntityKind, ModelError};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeOp {
    Create,
    Update,
    Delete,
    SystemEvent,
}

impl ChangeOp {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Create => "create",
            Self::Update => "update",
            Self::Delete => "delete",
            Self::SystemEvent => "system_event",
        }
    }
}

impl fmt::Display for ChangeOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ChangeOp {
    type Err = ModelError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw {
            "create" => Ok(Self::Create),
            "update" => Ok(Self::Update),
            "delete" => Ok(Self::Delete),
            "system_event" => Ok(Self::SystemEvent),
            other => Err(ModelError::InvalidValue { field: "operation".into(), reason: format!("unknown change op {other}") }),
        }
    }
}

/// One row of the server change log.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ChangeEntry {
    pub kind: EntityKind,
    pub entity_id: Uuid,
    pub op: ChangeOp,
    pub changed_at: i64,
    pub changed_by: Option<String>,
    #[serde(default)]
    pub changed_fields: BTreeMap<String, Value>,
    pub description: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct UpdatedEntity {
    pub id: Uuid,
    #[serde(default)]
    pub changed_fields: BTreeMap<String, Value>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SystemEvent {
    pub kind: EntityKind,
    pub id: Uuid,
    pub description: String,
}

/// Everything that changed after a client's last sync.
///
/// Map keys are entity kind names (`"line"`, `"station"`, ...).
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ChangeSet {
    pub new_global_last_updated_at: i64,
    #[serde(default)]
    pub created: BTreeMap<String, Vec<Uuid>>,
    #[serde(default)]
    pub updated: BTreeMap<String, Vec<UpdatedEntity>>,
    #[serde(default)]
    pub deleted: BTreeMap<String, Vec<Uuid>>,
    #[serde(default)]
    pub system_events: Vec<SystemEvent>,
}

impl ChangeSet {
    /// Fold change-log entries (in log order) into a change set.
    pub fn from_entries(new_global_last_updated_at: i64, entries: impl IntoIterator<Item = ChangeEntry>) -> Self {
        let mut set = Self { new_global_last_updated_at, ..Self::default() };

        for entry in entries {
            let key = entry.kind.as_str().to_owned();
            let id = entry.entity_id;
            match entry.op {
                ChangeOp::Create => {
                    let ids = set.created.entry(key).or_default();
                    if !ids.contains(&id) {
                        ids.push(id);
                    }
                }
                ChangeOp::Update => {
                    let list = set.updated.entry(key).or_default();
                    if let Some(existing) = list.iter_mut().find(|u| u.id == id) {
                        existing.changed_fields.extend(entry.changed_fields);
                    } else {
                        list.push(UpdatedEntity { id, changed_fields: entry.changed_fields });
                    }
                }
                ChangeOp::Delete => {
                    if let Some(ids) = set.created.get_mut(&key) {
                        ids.retain(|c| *c != id);
                    }
                    if let Some(list) = set.updated.get_mut(&key) {
                        list.retain(|u| u.id != id);
                    }
                    let ids = set.deleted.entry(key).or_default();
                    if !ids.contains(&id) {
                        ids.push(id);
                    }
                }
                ChangeOp::SystemEvent => set.system_events.push(SystemEvent {
                    kind: entry.kind,
                    id,
                    description: entry.description.unwrap_or_default(),
                }),
            }
        }

        set.created.retain(|_, ids| !ids.is_empty());
        set.updated.retain(|_, list| !list.is_empty());
        set
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.created.is_empty() && self.updated.is_empty() && self.deleted.is_empty() && self.system_events.is_empty()
    }

    #[must_use]
    pub fn updated_entity(&self, kind: EntityKind, id: Uuid) -> Option<&UpdatedEntity> {
        self.updated.get(kind.as_str())?.iter().find(|u| u.id == id)
    }

    #[must_use]
    pub fn is_deleted(&self, id: Uuid) -> bool {
        self.deleted.values().any(|ids| ids.contains(&id))
    }
}

#[cfg(test)]
#[path = "changes_test.rs"]
mod tests;
