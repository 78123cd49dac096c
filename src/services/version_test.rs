use super::*;
use crate::state::test_helpers::{self, TEST_USER};
use serde_json::json;

#[tokio::test]
async fn snapshot_is_unaffected_by_later_edits() {
    let state = test_helpers::test_app_state().await;
    let chain = test_helpers::seed_chain(&state).await;

    let version = create_version(&state.pool, TEST_USER, Some("release 1")).await.unwrap();
    assert_eq!(version.description.as_deref(), Some("release 1"));

    entity::update_entity(
        &state.pool,
        TEST_USER,
        EntityKind::Tool,
        chain.tool.id,
        chain.tool.updated_at,
        &BTreeMap::from([("name".to_owned(), json!("Renamed"))]),
    )
    .await
    .unwrap();

    let old = get_versioned_entity(&state.pool, version.version_id, EntityKind::Tool, chain.tool.id).await.unwrap();
    assert_eq!(old, chain.tool);
    let live = entity::get_entity(&state.pool, EntityKind::Tool, chain.tool.id).await.unwrap();
    assert_eq!(live.fields["name"], "Renamed");
}

#[tokio::test]
async fn versioned_lists_follow_parent_rule() {
    let state = test_helpers::test_app_state().await;
    let chain = test_helpers::seed_chain(&state).await;
    let version = create_version(&state.pool, TEST_USER, None).await.unwrap();

    let lines = list_versioned_entities(&state.pool, version.version_id, EntityKind::Line, None).await.unwrap();
    assert_eq!(lines.len(), 1);

    let ops = list_versioned_entities(&state.pool, version.version_id, EntityKind::Operation, Some(chain.tool.id))
        .await
        .unwrap();
    assert_eq!(ops, vec![chain.operation.clone()]);

    let err = list_versioned_entities(&state.pool, version.version_id, EntityKind::Operation, None).await.unwrap_err();
    assert!(matches!(err, VersionError::Entity(EntityError::ParentRequired(_))));
}

#[tokio::test]
async fn unknown_version_and_missing_entity_are_distinct() {
    let state = test_helpers::test_app_state().await;
    let chain = test_helpers::seed_chain(&state).await;
    let version = create_version(&state.pool, TEST_USER, None).await.unwrap();

    let err = get_versioned_entity(&state.pool, Uuid::new_v4(), EntityKind::Line, chain.line.id).await.unwrap_err();
    assert!(matches!(err, VersionError::NotFound(_)));

    let later = test_helpers::seed(&state, EntityKind::Line, None, json!({})).await;
    let err = get_versioned_entity(&state.pool, version.version_id, EntityKind::Line, later.id).await.unwrap_err();
    assert!(matches!(err, VersionError::Entity(EntityError::NotFound(id)) if id == later.id));
}

#[tokio::test]
async fn entity_history_is_numbered_oldest_first() {
    let state = test_helpers::test_app_state().await;
    let line = test_helpers::seed(&state, EntityKind::Line, None, json!({"name": "L"})).await;

    let v1 = create_version(&state.pool, "anna", None).await.unwrap();
    let edited = entity::update_entity(
        &state.pool,
        "bob",
        EntityKind::Line,
        line.id,
        line.updated_at,
        &BTreeMap::from([("comment".to_owned(), json!("later"))]),
    )
    .await
    .unwrap();
    let v2 = create_version(&state.pool, "anna", None).await.unwrap();

    let history = entity_versions(&state.pool, EntityKind::Line, line.id).await.unwrap();
    assert_eq!(history.len(), 2);
    assert_eq!((history[0].number, history[0].version_id), (1, v1.version_id));
    assert_eq!((history[1].number, history[1].version_id), (2, v2.version_id));
    assert_eq!(history[1].updated_by.as_deref(), Some("bob"));
    assert_eq!(history[1].updated_at, edited.updated_at);

    let versions = list_versions(&state.pool).await.unwrap();
    assert_eq!(versions.len(), 2);
}

#[tokio::test]
async fn blank_description_is_dropped() {
    let state = test_helpers::test_app_state().await;
    let version = create_version(&state.pool, TEST_USER, Some("   ")).await.unwrap();
    assert_eq!(version.description, None);
    assert!(matches!(create_version(&state.pool, "", None).await, Err(VersionError::Entity(EntityError::UserRequired))));
}
