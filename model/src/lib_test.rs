use super::*;
use serde_json::json;

#[test]
fn kind_parses_case_insensitively_and_plural() {
    assert_eq!("Line".parse::<EntityKind>().unwrap(), EntityKind::Line);
    assert_eq!(" stations ".parse::<EntityKind>().unwrap(), EntityKind::Station);
    assert_eq!("TOOL".parse::<EntityKind>().unwrap(), EntityKind::Tool);
    assert_eq!("operations".parse::<EntityKind>().unwrap(), EntityKind::Operation);
}

#[test]
fn unknown_kind_is_generic_error() {
    let err = "widget".parse::<EntityKind>().unwrap_err();
    assert_eq!(err, ModelError::UnknownKind("widget".into()));
    assert_eq!(err.to_string(), "unknown entity type: widget");
}

#[test]
fn chain_links_parent_and_child() {
    for kind in EntityKind::ALL {
        if let Some(child) = kind.child() {
            assert_eq!(child.parent(), Some(kind));
        }
    }
    assert_eq!(EntityKind::Line.parent(), None);
    assert_eq!(EntityKind::Operation.child(), None);
}

#[test]
fn every_kind_carries_common_fields() {
    for kind in EntityKind::ALL {
        for common in ["name", "comment", "status_color"] {
            assert!(kind.field(common).is_ok(), "{kind} lacks {common}");
        }
    }
}

#[test]
fn field_lookup_rejects_foreign_field() {
    let err = EntityKind::Line.field("tool_class").unwrap_err();
    assert!(matches!(err, ModelError::UnknownField { kind: EntityKind::Line, .. }));
}

#[test]
fn empty_string_normalizes_to_null() {
    let value = validate_field(EntityKind::Station, "comment", &json!("")).unwrap();
    assert_eq!(value, Value::Null);
}

#[test]
fn assembly_area_limited_to_three_chars() {
    assert_eq!(validate_field(EntityKind::Line, "assembly_area", &json!("A12")).unwrap(), json!("A12"));
    let err = validate_field(EntityKind::Line, "assembly_area", &json!("A123")).unwrap_err();
    assert!(matches!(err, ModelError::InvalidValue { .. }));
}

#[test]
fn sequence_accepts_numeric_strings() {
    assert_eq!(validate_field(EntityKind::Operation, "sequence", &json!(" 40 ")).unwrap(), json!(40));
    assert_eq!(validate_field(EntityKind::Operation, "sequence", &json!(7)).unwrap(), json!(7));
    assert!(validate_field(EntityKind::Operation, "sequence", &json!("x")).is_err());
    assert!(validate_field(EntityKind::Operation, "sequence", &json!(1.5)).is_err());
}

#[test]
fn text_fields_stringify_numbers() {
    assert_eq!(validate_field(EntityKind::Tool, "sps_db_no_send", &json!(12)).unwrap(), json!("12"));
}

#[test]
fn entity_serializes_with_lowercase_kind() {
    let entity = Entity {
        id: Uuid::nil(),
        kind: EntityKind::Tool,
        parent_id: None,
        created_at: 1,
        updated_at: 2,
        created_by: Some("anna".into()),
        updated_by: None,
        fields: BTreeMap::from([("name".to_owned(), json!("Nutrunner"))]),
    };
    let value = serde_json::to_value(&entity).unwrap();
    assert_eq!(value["kind"], "tool");
    assert_eq!(entity.name(), Some("Nutrunner"));
    assert_eq!(entity.field_text("comment"), None);
}
