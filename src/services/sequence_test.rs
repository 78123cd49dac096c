use super::*;
use crate::state::test_helpers;
use serde_json::json;

#[tokio::test]
async fn groups_sorted_by_name_with_blank_last() {
    let state = test_helpers::test_app_state().await;
    let chain = test_helpers::seed_chain(&state).await;
    let tool = chain.tool.id;
    let second_tool = test_helpers::seed(&state, EntityKind::Tool, Some(chain.station.id), json!({})).await.id;

    let late = test_helpers::seed(&state, EntityKind::Operation, Some(second_tool), json!({"sequence_group": "G1", "sequence": 30})).await;
    let early = test_helpers::seed(&state, EntityKind::Operation, Some(tool), json!({"sequence_group": "G1", "sequence": 5})).await;
    let unset = test_helpers::seed(&state, EntityKind::Operation, Some(tool), json!({"sequence_group": "G1"})).await;
    let first_group = test_helpers::seed(&state, EntityKind::Operation, Some(tool), json!({"sequence_group": "A0", "sequence": 1})).await;
    let loose = test_helpers::seed(&state, EntityKind::Operation, Some(tool), json!({"sequence": 1})).await;

    let groups = sequence_groups(&state.pool, chain.station.id).await.unwrap();
    let names: Vec<&str> = groups.iter().map(|g| g.name.as_str()).collect();
    assert_eq!(names, vec!["A0", "G1", ""]);

    let g1: Vec<Uuid> = groups[1].operations.iter().map(|o| o.id).collect();
    assert_eq!(g1, vec![early.id, chain.operation.id, late.id, unset.id]);
    assert_eq!(groups[0].operations[0].id, first_group.id);
    assert_eq!(groups[2].operations[0].id, loose.id);
}

#[tokio::test]
async fn station_without_operations_has_no_groups() {
    let state = test_helpers::test_app_state().await;
    let line = test_helpers::seed(&state, EntityKind::Line, None, json!({})).await;
    let station = test_helpers::seed(&state, EntityKind::Station, Some(line.id), json!({})).await;

    assert!(sequence_groups(&state.pool, station.id).await.unwrap().is_empty());
}

#[tokio::test]
async fn missing_station_is_not_found() {
    let state = test_helpers::test_app_state().await;
    let err = sequence_groups(&state.pool, Uuid::new_v4()).await.unwrap_err();
    assert!(matches!(err, EntityError::NotFound(_)));
}
