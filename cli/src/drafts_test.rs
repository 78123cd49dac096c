use super::*;

#[test]
fn sync_point_prefers_last_sync_then_oldest_draft() {
    let mut store = DraftStore::default();
    assert_eq!(sync_point(&store), 0);

    let a = Uuid::new_v4();
    let b = Uuid::new_v4();
    store.set_field(EntityKind::Line, a, "name", "A".to_owned(), 500).unwrap();
    store.set_field(EntityKind::Line, b, "name", "B".to_owned(), 200).unwrap();
    assert_eq!(sync_point(&store), 200);

    store.last_sync = Some(900);
    assert_eq!(sync_point(&store), 900);
}

#[test]
fn submit_body_carries_base_and_string_fields() {
    let pending = BTreeMap::from([("comment".to_owned(), "new".to_owned()), ("sequence".to_owned(), "20".to_owned())]);
    let body = submit_body(1234, &pending);
    assert_eq!(body["last_known_updated_at"], 1234);
    assert_eq!(body["fields"]["comment"], "new");
    assert_eq!(body["fields"]["sequence"], "20");
}

#[test]
fn discard_without_draft_fails() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("drafts.json");
    let err = discard(&path, Uuid::new_v4()).unwrap_err();
    assert!(matches!(err, CliError::Draft(model::draft::DraftError::NoDraft(_))));
}
