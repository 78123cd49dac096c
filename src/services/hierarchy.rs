//! Hierarchy service — subtree loading, JSON export/import, clipboard paste.
//!
//! DESIGN
//! ======
//! A subtree is loaded level by level (one query per parent) and assembled
//! bottom-up into [`TreeNode`]s. The same node shape is the export format
//! and the clipboard format:
//!
//! - import keeps every id and refuses to overwrite existing rows,
//! - paste deep-copies under a new parent with fresh ids.
//!
//! Both run in one transaction and log a `system_event` for the root plus a
//! `create` per inserted entity, so syncing clients see the new rows.
//!
//! Clipboard payloads produced by older exports may lack `kind` tags; those
//! are filled in from the distinguishing field names before parsing.

use std::collections::{BTreeMap, HashSet};

use model::timestamp;
use model::{ChangeOp, Entity, EntityKind};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sqlx::{SqliteConnection, SqlitePool};
use uuid::Uuid;

use crate::error::ErrorCode;
use crate::services::changes;
use crate::services::entity::{self, EntityError};

pub const DOCUMENT_FORMAT: &str = "cep-hierarchy";
pub const DOCUMENT_VERSION: u32 = 1;

static NULL: Value = Value::Null;

// =============================================================================
// TYPES
// =============================================================================

#[derive(Debug, thiserror::Error)]
pub enum HierarchyError {
    #[error(transparent)]
    Entity(#[from] EntityError),
    #[error("entity already exists: {0}")]
    AlreadyExists(Uuid),
    #[error("clipboard holds a {found}, expected a {expected}")]
    KindMismatch { expected: EntityKind, found: EntityKind },
    #[error("a {parent} cannot contain a {child}")]
    UnexpectedChild { parent: EntityKind, child: EntityKind },
    #[error("invalid hierarchy document: {0}")]
    InvalidDocument(String),
    #[error(transparent)]
    Change(#[from] changes::ChangeError),
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

impl ErrorCode for HierarchyError {
    fn error_code(&self) -> &'static str {
        match self {
            Self::Entity(e) => e.error_code(),
            Self::AlreadyExists(_) => "E_ALREADY_EXISTS",
            Self::KindMismatch { .. } => "E_KIND_MISMATCH",
            Self::UnexpectedChild { .. } => "E_UNEXPECTED_CHILD",
            Self::InvalidDocument(_) => "E_INVALID_DOCUMENT",
            Self::Change(e) => e.error_code(),
            Self::Database(_) => "E_DATABASE",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TreeNode {
    #[serde(flatten)]
    pub entity: Entity,
    #[serde(default)]
    pub children: Vec<TreeNode>,
}

impl TreeNode {
    fn count(&self) -> usize {
        1 + self.children.iter().map(TreeNode::count).sum::<usize>()
    }
}

/// A subtree plus the chain of ancestors above it (root-most first).
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Hierarchy {
    pub root: TreeNode,
    pub ancestors: Vec<Entity>,
    pub global_last_updated_at: i64,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct HierarchyDocument {
    pub format: String,
    pub version: u32,
    pub exported_at: String,
    pub root: TreeNode,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct InsertSummary {
    pub root_id: Uuid,
    pub inserted: usize,
}

// =============================================================================
// LOAD / EXPORT
// =============================================================================

/// Load an entity with all descendants and its ancestors.
///
/// # Errors
///
/// Returns `NotFound` (wrapped) if the root does not exist.
pub async fn load_tree(pool: &SqlitePool, kind: EntityKind, id: Uuid) -> Result<Hierarchy, HierarchyError> {
    let mut conn = pool.acquire().await?;
    let root = entity::fetch_entity(&mut conn, kind, id).await?.ok_or(EntityError::NotFound(id))?;

    let mut ancestors = Vec::new();
    let mut cursor = (kind.parent(), root.parent_id);
    while let (Some(parent_kind), Some(parent_id)) = cursor {
        let Some(parent) = entity::fetch_entity(&mut conn, parent_kind, parent_id).await? else {
            break;
        };
        cursor = (parent_kind.parent(), parent.parent_id);
        ancestors.push(parent);
    }
    ancestors.reverse();

    let root = load_subtree(&mut conn, root).await?;
    drop(conn);
    let global_last_updated_at = changes::global_last_update(pool).await?;

    Ok(Hierarchy { root, ancestors, global_last_updated_at })
}

/// Export a subtree as a self-describing JSON document.
///
/// # Errors
///
/// Returns `NotFound` (wrapped) if the root does not exist.
pub async fn export_document(pool: &SqlitePool, kind: EntityKind, id: Uuid) -> Result<HierarchyDocument, HierarchyError> {
    let mut conn = pool.acquire().await?;
    let root = entity::fetch_entity(&mut conn, kind, id).await?.ok_or(EntityError::NotFound(id))?;
    let root = load_subtree(&mut conn, root).await?;

    tracing::info!(%id, %kind, entities = root.count(), "hierarchy exported");
    Ok(HierarchyDocument {
        format: DOCUMENT_FORMAT.to_owned(),
        version: DOCUMENT_VERSION,
        exported_at: timestamp::format_rfc3339(timestamp::now_ms()),
        root,
    })
}

async fn load_subtree(conn: &mut SqliteConnection, root: Entity) -> Result<TreeNode, sqlx::Error> {
    let mut kind = root.kind;
    let mut levels = vec![vec![root]];

    while let Some(child_kind) = kind.child() {
        let parent_ids: Vec<Uuid> = levels.last().map(|l| l.iter().map(|e| e.id).collect()).unwrap_or_default();
        let mut next = Vec::new();
        for parent_id in parent_ids {
            next.extend(entity::fetch_entities(conn, child_kind, Some(parent_id)).await?);
        }
        if next.is_empty() {
            break;
        }
        levels.push(next);
        kind = child_kind;
    }

    let mut below: Vec<TreeNode> = Vec::new();
    for level in levels.into_iter().rev() {
        let mut nodes = Vec::with_capacity(level.len());
        for entity in level {
            let (children, rest): (Vec<_>, Vec<_>) =
                below.into_iter().partition(|node| node.entity.parent_id == Some(entity.id));
            below = rest;
            nodes.push(TreeNode { entity, children });
        }
        below = nodes;
    }

    below.pop().ok_or(sqlx::Error::RowNotFound)
}

// =============================================================================
// IMPORT / PASTE
// =============================================================================

/// Insert an exported document keeping every original id.
///
/// # Errors
///
/// Returns `AlreadyExists` if any id is taken, `UnexpectedChild` for a
/// broken chain, and parent errors for a missing or misplaced root parent.
pub async fn import_document(pool: &SqlitePool, user: &str, doc: &HierarchyDocument) -> Result<InsertSummary, HierarchyError> {
    let user = entity::require_user(user)?;
    if doc.format != DOCUMENT_FORMAT || doc.version != DOCUMENT_VERSION {
        return Err(HierarchyError::InvalidDocument(format!("unsupported format {} v{}", doc.format, doc.version)));
    }

    let mut rows = Vec::new();
    flatten_validated(&doc.root, &mut rows)?;
    let mut seen = HashSet::new();
    if let Some(dup) = rows.iter().find(|e| !seen.insert(e.id)) {
        return Err(HierarchyError::InvalidDocument(format!("duplicate id {}", dup.id)));
    }

    let mut tx = pool.begin().await?;
    check_root_parent(&mut tx, doc.root.entity.kind, doc.root.entity.parent_id).await?;
    for row in &rows {
        if entity::exists(&mut tx, row.kind, row.id).await? {
            return Err(HierarchyError::AlreadyExists(row.id));
        }
    }

    let now = changes::bump_global(&mut tx).await?;
    for row in &rows {
        entity::insert_entity(&mut tx, row).await?;
        changes::append(&mut tx, &changes::entry(row.kind, row.id, ChangeOp::Create, now, user)).await?;
    }
    let root = &doc.root.entity;
    let mut event = changes::entry(root.kind, root.id, ChangeOp::SystemEvent, now, user);
    event.description = Some(format!("imported {} entities", rows.len()));
    changes::append(&mut tx, &event).await?;
    tx.commit().await?;

    tracing::info!(root_id = %root.id, kind = %root.kind, user, entities = rows.len(), "hierarchy imported");
    Ok(InsertSummary { root_id: root.id, inserted: rows.len() })
}

/// Paste a clipboard subtree under `parent_id` with fresh ids.
///
/// # Errors
///
/// Returns `KindMismatch` if the clipboard root is not `expected`, and the
/// usual parent errors for `parent_id`.
pub async fn paste_document(
    pool: &SqlitePool,
    user: &str,
    expected: EntityKind,
    parent_id: Option<Uuid>,
    clipboard: &TreeNode,
) -> Result<InsertSummary, HierarchyError> {
    let user = entity::require_user(user)?;
    let found = clipboard.entity.kind;
    if found != expected {
        return Err(HierarchyError::KindMismatch { expected, found });
    }

    let mut source = Vec::new();
    flatten_validated(clipboard, &mut source)?;

    let mut tx = pool.begin().await?;
    check_root_parent(&mut tx, expected, parent_id).await?;

    let now = changes::bump_global(&mut tx).await?;
    let mut id_map: BTreeMap<Uuid, Uuid> = BTreeMap::new();
    let mut rows = Vec::with_capacity(source.len());
    for (index, original) in source.into_iter().enumerate() {
        let new_id = Uuid::new_v4();
        let new_parent = if index == 0 { parent_id } else { original.parent_id.and_then(|p| id_map.get(&p).copied()) };
        id_map.insert(original.id, new_id);
        rows.push(Entity {
            id: new_id,
            parent_id: new_parent,
            created_at: now,
            updated_at: now,
            created_by: Some(user.to_owned()),
            updated_by: Some(user.to_owned()),
            ..original
        });
    }

    for row in &rows {
        entity::insert_entity(&mut tx, row).await?;
        changes::append(&mut tx, &changes::entry(row.kind, row.id, ChangeOp::Create, now, user)).await?;
    }
    let root_id = rows[0].id;
    let mut event = changes::entry(expected, root_id, ChangeOp::SystemEvent, now, user);
    event.description = Some(format!("pasted copy of {}", clipboard.entity.id));
    changes::append(&mut tx, &event).await?;
    tx.commit().await?;

    tracing::info!(%root_id, kind = %expected, user, entities = rows.len(), "hierarchy pasted");
    Ok(InsertSummary { root_id, inserted: rows.len() })
}

/// Pre-order flattening with chain and field validation. Child `parent_id`s
/// are rewritten to point at their enclosing node.
fn flatten_validated(node: &TreeNode, out: &mut Vec<Entity>) -> Result<(), HierarchyError> {
    let mut entity = node.entity.clone();
    let kind = entity.kind;

    let mut fields = BTreeMap::new();
    for spec in kind.fields() {
        let value = entity.fields.get(spec.name).unwrap_or(&NULL);
        fields.insert(spec.name.to_owned(), spec.normalize(value).map_err(EntityError::from)?);
    }
    if let Some(unknown) = entity.fields.keys().find(|k| kind.field(k).is_err()) {
        return Err(EntityError::from(model::ModelError::UnknownField { kind, field: unknown.clone() }).into());
    }
    entity.fields = fields;
    let id = entity.id;
    out.push(entity);

    for child in &node.children {
        if kind.child() != Some(child.entity.kind) {
            return Err(HierarchyError::UnexpectedChild { parent: kind, child: child.entity.kind });
        }
        let start = out.len();
        flatten_validated(child, out)?;
        out[start].parent_id = Some(id);
    }
    Ok(())
}

async fn check_root_parent(conn: &mut SqliteConnection, kind: EntityKind, parent_id: Option<Uuid>) -> Result<(), HierarchyError> {
    match (kind.parent(), parent_id) {
        (None, None) => Ok(()),
        (None, Some(_)) => Err(EntityError::UnexpectedParent(kind).into()),
        (Some(_), None) => Err(EntityError::ParentRequired(kind).into()),
        (Some(parent_kind), Some(parent_id)) => {
            if entity::exists(conn, parent_kind, parent_id).await? {
                Ok(())
            } else {
                Err(EntityError::ParentNotFound(parent_id).into())
            }
        }
    }
}

// =============================================================================
// CLIPBOARD PARSING
// =============================================================================

/// Guess the kind of an untagged clipboard node from its field names.
#[must_use]
pub fn detect_kind(node: &Value) -> Option<EntityKind> {
    if let Some(kind) = node.get("kind").and_then(Value::as_str).and_then(|k| k.parse().ok()) {
        return Some(kind);
    }
    let has = |key: &str| node.get(key).is_some() || node.get("fields").and_then(|f| f.get(key)).is_some();
    if has("assembly_area") {
        Some(EntityKind::Line)
    } else if has("station_type") || has("serial_or_parallel") {
        Some(EntityKind::Station)
    } else if has("tool_class") || has("ip_address_device") {
        Some(EntityKind::Tool)
    } else if has("decision_criteria") || has("sequence_group") {
        Some(EntityKind::Operation)
    } else {
        None
    }
}

/// Parse clipboard JSON: an exported document or a bare node.
///
/// # Errors
///
/// Returns `InvalidDocument` if the payload has no recognizable node shape.
pub fn parse_clipboard(mut value: Value) -> Result<TreeNode, HierarchyError> {
    if let Some(root) = value.get_mut("root").map(Value::take) {
        value = root;
    }
    tag_kinds(&mut value, None)?;
    serde_json::from_value(value).map_err(|e| HierarchyError::InvalidDocument(e.to_string()))
}

fn tag_kinds(node: &mut Value, parent: Option<EntityKind>) -> Result<(), HierarchyError> {
    let kind = detect_kind(node)
        .or_else(|| parent.and_then(EntityKind::child))
        .ok_or_else(|| HierarchyError::InvalidDocument("cannot determine entity type".into()))?;
    let Some(map) = node.as_object_mut() else {
        return Err(HierarchyError::InvalidDocument("node is not an object".into()));
    };
    map.entry("kind").or_insert_with(|| Value::String(kind.as_str().to_owned()));
    if let Some(Value::Array(children)) = map.get_mut("children") {
        for child in children {
            tag_kinds(child, Some(kind))?;
        }
    }
    Ok(())
}

#[cfg(test)]
#[path = "hierarchy_test.rs"]
mod tests;
