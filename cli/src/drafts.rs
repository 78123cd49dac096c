//! Draft commands: local edits, sync with conflict report, submit.
//!
//! DESIGN
//! ======
//! The draft file is loaded, mutated and saved once per command. `sync`
//! asks the server for the change set since the store's last sync and lets
//! `DraftStore::reconcile` decide what conflicts. `submit` sends only the
//! fields that still differ from the server, guarded by the draft's base
//! timestamp.

use std::collections::BTreeMap;
use std::path::Path;

use model::draft::DraftStore;
use model::i18n::Locale;
use model::{ChangeSet, EntityKind};
use serde_json::{Map, Value};
use uuid::Uuid;

use crate::api::{CliContext, CliError, print_json};

pub async fn set(ctx: &CliContext, path: &Path, kind: EntityKind, id: Uuid, field: &str, value: String) -> Result<(), CliError> {
    let mut store = DraftStore::load(path)?;
    let base = match store.get(id) {
        Some(draft) => draft.base_updated_at,
        None => ctx.entity(kind, id).await?.updated_at,
    };
    store.set_field(kind, id, field, value, base)?;
    store.save(path)?;
    eprintln!("draft saved for {kind} {id}");
    Ok(())
}

pub fn show(path: &Path, id: Option<Uuid>) -> Result<(), CliError> {
    let store = DraftStore::load(path)?;
    let value = match id {
        Some(id) => serde_json::to_value(store.get(id))?,
        None => serde_json::to_value(&store)?,
    };
    print_json(&value)
}

pub fn discard(path: &Path, id: Uuid) -> Result<(), CliError> {
    let mut store = DraftStore::load(path)?;
    if store.discard(id).is_none() {
        return Err(model::draft::DraftError::NoDraft(id).into());
    }
    store.save(path)?;
    eprintln!("draft discarded for {id}");
    Ok(())
}

/// Send the differing draft fields and clear the draft on success.
pub async fn submit(ctx: &CliContext, path: &Path, id: Uuid) -> Result<(), CliError> {
    let mut store = DraftStore::load(path)?;
    let draft = store.get(id).cloned().ok_or(model::draft::DraftError::NoDraft(id))?;
    let server = ctx.entity(draft.kind, id).await?;
    let pending = store.pending_updates(id, &server)?;

    if pending.is_empty() {
        eprintln!("draft matches the server; nothing to submit");
    } else {
        let path_uri = format!("/api/entities/{}/{id}", draft.kind);
        let body = submit_body(draft.base_updated_at, &pending);
        match ctx.request(reqwest::Method::PATCH, &path_uri, Some(body)).await {
            Ok(updated) => print_json(&updated)?,
            Err(err) if err.is_conflict() => {
                eprintln!("{id} changed on the server since the draft was made; run `draft sync` first");
                return Err(err);
            }
            Err(err) => return Err(err),
        }
    }

    store.discard(id);
    store.save(path)?;
    Ok(())
}

/// Fetch server changes since the last sync and print the conflict report.
pub async fn sync(ctx: &CliContext, path: &Path, locale: Locale) -> Result<(), CliError> {
    let mut store = DraftStore::load(path)?;
    let since = sync_point(&store);
    let changes: ChangeSet = serde_json::from_value(ctx.get_query("/api/changes", &[("since", since.to_string().as_str())]).await?)?;

    let mut names = BTreeMap::new();
    for (kind, id) in store.entities_needing_names(&changes) {
        match ctx.entity(kind, id).await {
            Ok(entity) => {
                if let Some(name) = entity.name() {
                    names.insert(id, name.to_owned());
                }
            }
            Err(err) => eprintln!("could not resolve name of {kind} {id}: {err}"),
        }
    }

    let report = store.reconcile(&changes, &names);
    if !report.unchanged {
        print!("{}", report.render(locale));
    }
    store.save(path)?;
    Ok(())
}

/// Where to resume polling: the last sync, else the oldest draft base.
pub(crate) fn sync_point(store: &DraftStore) -> i64 {
    store
        .last_sync
        .or_else(|| store.drafts.values().map(|d| d.base_updated_at).min())
        .unwrap_or(0)
}

pub(crate) fn submit_body(base_updated_at: i64, pending: &BTreeMap<String, String>) -> Value {
    let fields: Map<String, Value> = pending.iter().map(|(k, v)| (k.clone(), Value::String(v.clone()))).collect();
    serde_json::json!({ "last_known_updated_at": base_updated_at, "fields": fields })
}

#[cfg(test)]
#[path = "drafts_test.rs"]
mod tests;
