//! Local drafts and draft-conflict reconciliation.
//!
//! DESIGN
//! ======
//! A draft is the set of unsubmitted field edits for one entity, cached on
//! the client. On sync the client fetches the server change set since its
//! last sync and reconciles:
//!
//! - drafts of deleted entities are dropped,
//! - a changed field that is also edited locally is a conflict,
//! - drafts of updated entities are rebased onto the new sync point, so the
//!   user is warned once and a later submit overwrites the server value.
//!
//! Submitting sends only the draft fields whose value differs from the
//! server snapshot.

use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::path::Path;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::changes::ChangeSet;
use crate::i18n::{Locale, translate};
use crate::{Entity, EntityKind, ModelError, value_text};

// =============================================================================
// TYPES
// =============================================================================

#[derive(Debug, thiserror::Error)]
pub enum DraftError {
    #[error("draft file error: {0}")]
    Io(#[from] std::io::Error),
    #[error("draft file is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error(transparent)]
    Model(#[from] ModelError),
    #[error("no draft for entity {0}")]
    NoDraft(Uuid),
    #[error("draft for {id} is a {existing}, not a {requested}")]
    KindMismatch { id: Uuid, existing: EntityKind, requested: EntityKind },
}

/// Unsubmitted edits of one entity.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Draft {
    pub kind: EntityKind,
    /// Server `updated_at` the edits were made against.
    pub base_updated_at: i64,
    #[serde(default)]
    pub fields: BTreeMap<String, String>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DraftStore {
    pub last_sync: Option<i64>,
    #[serde(default)]
    pub drafts: BTreeMap<Uuid, Draft>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DraftConflict {
    pub kind: EntityKind,
    pub entity_id: Uuid,
    pub entity_name: String,
    pub field: String,
    pub server_value: Option<String>,
    pub draft_value: String,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReconcileReport {
    /// True when the server had nothing newer than the last sync.
    pub unchanged: bool,
    pub dropped: Vec<Uuid>,
    pub conflicts: Vec<DraftConflict>,
}

// =============================================================================
// STORE
// =============================================================================

impl DraftStore {
    /// Load a store from disk; a missing file is an empty store.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be read or parsed.
    pub fn load(path: &Path) -> Result<Self, DraftError> {
        match std::fs::read_to_string(path) {
            Ok(raw) => Ok(serde_json::from_str(&raw)?),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Self::default()),
            Err(e) => Err(e.into()),
        }
    }

    /// Write the store as pretty JSON.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be written.
    pub fn save(&self, path: &Path) -> Result<(), DraftError> {
        let raw = serde_json::to_string_pretty(self)?;
        std::fs::write(path, raw)?;
        Ok(())
    }

    /// Record a field edit. The first edit of an entity fixes the draft's
    /// base timestamp.
    ///
    /// # Errors
    ///
    /// Returns an error for unknown fields, invalid values, or an existing
    /// draft of another kind under the same id.
    pub fn set_field(
        &mut self,
        kind: EntityKind,
        id: Uuid,
        field: &str,
        value: String,
        base_updated_at: i64,
    ) -> Result<(), DraftError> {
        kind.field(field)?.normalize(&Value::String(value.clone()))?;

        let draft = self
            .drafts
            .entry(id)
            .or_insert_with(|| Draft { kind, base_updated_at, fields: BTreeMap::new() });
        if draft.kind != kind {
            return Err(DraftError::KindMismatch { id, existing: draft.kind, requested: kind });
        }
        draft.fields.insert(field.to_owned(), value);
        Ok(())
    }

    #[must_use]
    pub fn get(&self, id: Uuid) -> Option<&Draft> {
        self.drafts.get(&id)
    }

    pub fn discard(&mut self, id: Uuid) -> Option<Draft> {
        self.drafts.remove(&id)
    }

    /// Draft fields whose value differs from the server snapshot.
    ///
    /// # Errors
    ///
    /// Returns [`DraftError::NoDraft`] when the entity has no draft.
    pub fn pending_updates(&self, id: Uuid, server: &Entity) -> Result<BTreeMap<String, String>, DraftError> {
        let draft = self.get(id).ok_or(DraftError::NoDraft(id))?;
        Ok(draft
            .fields
            .iter()
            .filter(|(field, value)| server.field_text(field).unwrap_or_default() != **value)
            .map(|(field, value)| (field.clone(), value.clone()))
            .collect())
    }

    /// Updated entities with a draft whose display name cannot be derived
    /// locally; callers resolve these before [`DraftStore::reconcile`].
    #[must_use]
    pub fn entities_needing_names(&self, changes: &ChangeSet) -> Vec<(EntityKind, Uuid)> {
        self.drafts
            .iter()
            .filter(|(_, draft)| !draft.fields.contains_key("name"))
            .filter_map(|(id, draft)| {
                let updated = changes.updated_entity(draft.kind, *id)?;
                let has_conflict = updated.changed_fields.keys().any(|f| draft.fields.contains_key(f));
                (has_conflict && !updated.changed_fields.contains_key("name")).then_some((draft.kind, *id))
            })
            .collect()
    }

    /// Reconcile local drafts against the server changes since `last_sync`.
    pub fn reconcile(&mut self, changes: &ChangeSet, names: &BTreeMap<Uuid, String>) -> ReconcileReport {
        if self.last_sync == Some(changes.new_global_last_updated_at) {
            return ReconcileReport { unchanged: true, ..ReconcileReport::default() };
        }

        let mut report = ReconcileReport::default();

        let deleted: Vec<Uuid> = self.drafts.keys().copied().filter(|id| changes.is_deleted(*id)).collect();
        for id in deleted {
            self.drafts.remove(&id);
            report.dropped.push(id);
        }

        for (id, draft) in &mut self.drafts {
            let Some(updated) = changes.updated_entity(draft.kind, *id) else {
                continue;
            };

            let entity_name = draft
                .fields
                .get("name")
                .cloned()
                .or_else(|| updated.changed_fields.get("name").and_then(value_text))
                .or_else(|| names.get(id).cloned())
                .unwrap_or_else(|| id.to_string());

            for (field, server_value) in &updated.changed_fields {
                let Some(draft_value) = draft.fields.get(field) else {
                    continue;
                };
                report.conflicts.push(DraftConflict {
                    kind: draft.kind,
                    entity_id: *id,
                    entity_name: entity_name.clone(),
                    field: field.clone(),
                    server_value: value_text(server_value),
                    draft_value: draft_value.clone(),
                });
            }

            draft.base_updated_at = changes.new_global_last_updated_at;
        }

        self.last_sync = Some(changes.new_global_last_updated_at);
        report
    }
}

// =============================================================================
// REPORT
// =============================================================================

impl ReconcileReport {
    #[must_use]
    pub fn has_conflicts(&self) -> bool {
        !self.conflicts.is_empty()
    }

    /// Dialog text: one heading per entity, then `Field: server value`.
    #[must_use]
    pub fn render(&self, locale: Locale) -> String {
        let mut out = String::new();

        if !self.dropped.is_empty() {
            let line = translate(locale, "draft_conflicts.dropped").replace("{count}", &self.dropped.len().to_string());
            let _ = writeln!(out, "{line}");
        }

        if self.conflicts.is_empty() {
            let _ = writeln!(out, "{}", translate(locale, "draft_conflicts.none"));
            return out;
        }

        let _ = writeln!(out, "{}", translate(locale, "draft_conflicts.title"));
        let _ = writeln!(out, "{}", translate(locale, "draft_conflicts.description"));

        let mut current: Option<Uuid> = None;
        for conflict in &self.conflicts {
            if current != Some(conflict.entity_id) {
                current = Some(conflict.entity_id);
                let _ = writeln!(out, "{} {}:", translate(locale, conflict.kind.as_str()), conflict.entity_name);
            }
            let value = conflict.server_value.as_deref().unwrap_or("-");
            let _ = writeln!(out, "  {}: {value}", translate(locale, &conflict.field));
        }
        out
    }
}

#[cfg(test)]
#[path = "draft_test.rs"]
mod tests;
