use super::*;
use serde_json::json;

#[test]
fn strip_domain_removes_windows_prefix() {
    assert_eq!(strip_domain("PLANT\\jdoe"), "jdoe");
    assert_eq!(strip_domain("jdoe"), "jdoe");
    assert_eq!(strip_domain("A\\B\\jdoe "), "jdoe");
}

#[test]
fn parse_assignment_splits_on_first_equals() {
    assert_eq!(parse_assignment("name=Station 10").unwrap(), ("name".to_owned(), "Station 10".to_owned()));
    assert_eq!(parse_assignment("comment=a=b").unwrap(), ("comment".to_owned(), "a=b".to_owned()));
    assert_eq!(parse_assignment("comment=").unwrap(), ("comment".to_owned(), String::new()));
    assert!(matches!(parse_assignment("name"), Err(CliError::InvalidAssignment(_))));
    assert!(matches!(parse_assignment("=x"), Err(CliError::InvalidAssignment(_))));
}

#[test]
fn url_joins_without_double_slash() {
    let ctx = CliContext::new("http://localhost:3000/".to_owned(), "tester".to_owned());
    assert_eq!(ctx.url("/healthz"), "http://localhost:3000/healthz");
}

#[test]
fn server_error_reads_code_and_message() {
    let err = server_error(409, &json!({"code": "E_CONFLICT", "message": "conflict"}));
    assert!(err.is_conflict());
    assert_eq!(err.to_string(), "server returned HTTP 409 (E_CONFLICT): conflict");

    let err = server_error(502, &serde_json::Value::Null);
    assert!(matches!(err, CliError::ServerError { ref code, .. } if code == "E_HTTP"));
    assert!(!err.is_conflict());
}

#[test]
fn json_files_round_trip_through_disk() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("clip.json");
    let path = path.to_str().unwrap();

    write_json(path, &json!({"kind": "tool", "children": []})).unwrap();
    assert_eq!(read_json(path).unwrap()["kind"], "tool");
}

#[test]
fn query_values_are_percent_encoded() {
    let ctx = CliContext::new("http://localhost:3000".to_owned(), String::new());
    let request = ctx
        .build(reqwest::Method::GET, "/api/changes", &[("since", "a&b#c%d ü+")], None)
        .build()
        .unwrap();
    assert_eq!(request.url().path(), "/api/changes");
    assert_eq!(request.url().query(), Some("since=a%26b%23c%25d+%C3%BC%2B"));
    assert!(request.headers().get(USER_HEADER).is_none());
}

#[test]
fn user_header_carries_utf8_bytes() {
    let ctx = CliContext::new("http://localhost:3000".to_owned(), "Jürgen Müller".to_owned());
    let request = ctx.build(reqwest::Method::GET, "/api/versions", &[], None).build().unwrap();
    assert_eq!(request.url().query(), None);
    assert_eq!(request.headers()[USER_HEADER].as_bytes(), "Jürgen Müller".as_bytes());
}
