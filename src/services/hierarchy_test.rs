use super::*;
use crate::state::test_helpers::{self, TEST_USER};
use serde_json::json;

#[tokio::test]
async fn load_tree_nests_children_and_lists_ancestors() {
    let state = test_helpers::test_app_state().await;
    let chain = test_helpers::seed_chain(&state).await;
    let second_tool = test_helpers::seed(&state, EntityKind::Tool, Some(chain.station.id), json!({"name": "Camera"})).await;

    let tree = load_tree(&state.pool, EntityKind::Station, chain.station.id).await.unwrap();
    assert_eq!(tree.root.entity.id, chain.station.id);
    assert_eq!(tree.root.children.len(), 2);
    assert_eq!(tree.root.children[0].entity.id, chain.tool.id);
    assert_eq!(tree.root.children[0].children[0].entity.id, chain.operation.id);
    assert_eq!(tree.root.children[1].entity.id, second_tool.id);
    assert!(tree.root.children[1].children.is_empty());

    let ancestor_ids: Vec<Uuid> = tree.ancestors.iter().map(|e| e.id).collect();
    assert_eq!(ancestor_ids, vec![chain.line.id]);
    assert!(tree.global_last_updated_at >= second_tool.updated_at);
}

#[tokio::test]
async fn operation_tree_has_full_ancestor_chain() {
    let state = test_helpers::test_app_state().await;
    let chain = test_helpers::seed_chain(&state).await;

    let tree = load_tree(&state.pool, EntityKind::Operation, chain.operation.id).await.unwrap();
    let kinds: Vec<EntityKind> = tree.ancestors.iter().map(|e| e.kind).collect();
    assert_eq!(kinds, vec![EntityKind::Line, EntityKind::Station, EntityKind::Tool]);
    assert!(tree.root.children.is_empty());
}

#[tokio::test]
async fn export_then_import_restores_same_ids() {
    let state = test_helpers::test_app_state().await;
    let chain = test_helpers::seed_chain(&state).await;
    let doc = export_document(&state.pool, EntityKind::Line, chain.line.id).await.unwrap();
    assert_eq!(doc.format, DOCUMENT_FORMAT);

    // Round-trip through text the way a file export would.
    let text = serde_json::to_string_pretty(&doc).unwrap();
    let doc: HierarchyDocument = serde_json::from_str(&text).unwrap();

    let fresh = test_helpers::test_app_state().await;
    let summary = import_document(&fresh.pool, "importer", &doc).await.unwrap();
    assert_eq!(summary, InsertSummary { root_id: chain.line.id, inserted: 4 });

    let op = entity::get_entity(&fresh.pool, EntityKind::Operation, chain.operation.id).await.unwrap();
    assert_eq!(op, chain.operation);
}

#[tokio::test]
async fn import_refuses_existing_ids() {
    let state = test_helpers::test_app_state().await;
    let chain = test_helpers::seed_chain(&state).await;
    let doc = export_document(&state.pool, EntityKind::Line, chain.line.id).await.unwrap();

    let err = import_document(&state.pool, TEST_USER, &doc).await.unwrap_err();
    assert!(matches!(err, HierarchyError::AlreadyExists(id) if id == chain.line.id));
}

#[tokio::test]
async fn import_rejects_broken_chain() {
    let state = test_helpers::test_app_state().await;
    let chain = test_helpers::seed_chain(&state).await;
    let mut doc = export_document(&state.pool, EntityKind::Line, chain.line.id).await.unwrap();
    // Put the operation directly under the line.
    let op = doc.root.children[0].children[0].children[0].clone();
    doc.root.children.push(op);

    let fresh = test_helpers::test_app_state().await;
    let err = import_document(&fresh.pool, TEST_USER, &doc).await.unwrap_err();
    assert!(matches!(err, HierarchyError::UnexpectedChild { parent: EntityKind::Line, child: EntityKind::Operation }));
}

#[tokio::test]
async fn paste_copies_subtree_with_fresh_ids() {
    let state = test_helpers::test_app_state().await;
    let chain = test_helpers::seed_chain(&state).await;
    let target = test_helpers::seed(&state, EntityKind::Station, Some(chain.line.id), json!({"name": "Target"})).await;

    let clipboard = load_tree(&state.pool, EntityKind::Tool, chain.tool.id).await.unwrap().root;
    let summary = paste_document(&state.pool, "paster", EntityKind::Tool, Some(target.id), &clipboard).await.unwrap();
    assert_eq!(summary.inserted, 2);
    assert_ne!(summary.root_id, chain.tool.id);

    let copy = load_tree(&state.pool, EntityKind::Tool, summary.root_id).await.unwrap();
    assert_eq!(copy.root.entity.parent_id, Some(target.id));
    assert_eq!(copy.root.entity.fields, chain.tool.fields);
    assert_eq!(copy.root.entity.created_by.as_deref(), Some("paster"));
    let op_copy = &copy.root.children[0].entity;
    assert_ne!(op_copy.id, chain.operation.id);
    assert_eq!(op_copy.fields["name"], "Tighten M6");

    // The original is untouched.
    let original = load_tree(&state.pool, EntityKind::Tool, chain.tool.id).await.unwrap();
    assert_eq!(original.root.children[0].entity.id, chain.operation.id);
}

#[tokio::test]
async fn paste_rejects_kind_mismatch() {
    let state = test_helpers::test_app_state().await;
    let chain = test_helpers::seed_chain(&state).await;
    let clipboard = load_tree(&state.pool, EntityKind::Operation, chain.operation.id).await.unwrap().root;

    let err = paste_document(&state.pool, TEST_USER, EntityKind::Tool, Some(chain.station.id), &clipboard)
        .await
        .unwrap_err();
    assert!(matches!(err, HierarchyError::KindMismatch { expected: EntityKind::Tool, found: EntityKind::Operation }));
}

#[tokio::test]
async fn paste_logs_creates_and_system_event() {
    let state = test_helpers::test_app_state().await;
    let chain = test_helpers::seed_chain(&state).await;
    let clipboard = load_tree(&state.pool, EntityKind::Operation, chain.operation.id).await.unwrap().root;
    let checkpoint = changes::global_last_update(&state.pool).await.unwrap();

    let summary = paste_document(&state.pool, TEST_USER, EntityKind::Operation, Some(chain.tool.id), &clipboard)
        .await
        .unwrap();

    let set = changes::changes_since(&state.pool, checkpoint).await.unwrap();
    assert_eq!(set.created["operation"], vec![summary.root_id]);
    assert_eq!(set.system_events.len(), 1);
    assert_eq!(set.system_events[0].id, summary.root_id);
}

#[test]
fn detect_kind_uses_tag_then_distinguishing_fields() {
    assert_eq!(detect_kind(&json!({"kind": "Station"})), Some(EntityKind::Station));
    assert_eq!(detect_kind(&json!({"fields": {"assembly_area": "A1"}})), Some(EntityKind::Line));
    assert_eq!(detect_kind(&json!({"tool_class": "x"})), Some(EntityKind::Tool));
    assert_eq!(detect_kind(&json!({"fields": {"sequence_group": "G"}})), Some(EntityKind::Operation));
    assert_eq!(detect_kind(&json!({"fields": {"name": "?"}})), None);
}

#[tokio::test]
async fn parse_clipboard_fills_missing_kind_tags() {
    let state = test_helpers::test_app_state().await;
    let chain = test_helpers::seed_chain(&state).await;
    let doc = export_document(&state.pool, EntityKind::Tool, chain.tool.id).await.unwrap();

    let mut value = serde_json::to_value(&doc).unwrap();
    value["root"].as_object_mut().unwrap().remove("kind");
    value["root"]["children"][0].as_object_mut().unwrap().remove("kind");

    let node = parse_clipboard(value).unwrap();
    assert_eq!(node.entity.kind, EntityKind::Tool);
    assert_eq!(node.children[0].entity.kind, EntityKind::Operation);

    assert!(matches!(parse_clipboard(json!([1, 2])), Err(HierarchyError::InvalidDocument(_))));
}
