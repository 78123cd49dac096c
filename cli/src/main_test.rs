use super::*;

#[test]
fn parses_entity_update_with_repeated_set() {
    let cli = Cli::try_parse_from([
        "cep-cli",
        "--user",
        "anna",
        "entity",
        "update",
        "Stations",
        "00000000-0000-0000-0000-000000000001",
        "--set",
        "name=S 20",
        "--set",
        "comment=",
    ])
    .unwrap();

    assert_eq!(cli.user.as_deref(), Some("anna"));
    let Command::Entity(EntityCommand { command: EntitySubcommand::Update { kind, assignments, last_known, .. } }) = cli.command else {
        panic!("expected entity update");
    };
    assert_eq!(kind, EntityKind::Station);
    assert_eq!(assignments, vec!["name=S 20".to_owned(), "comment=".to_owned()]);
    assert_eq!(last_known, None);
}

#[test]
fn rejects_unknown_kind() {
    let result = Cli::try_parse_from(["cep-cli", "tree", "robot", "00000000-0000-0000-0000-000000000001"]);
    assert!(result.is_err());
}

#[test]
fn version_show_id_conflicts_with_parent() {
    let id = "00000000-0000-0000-0000-000000000001";
    let result = Cli::try_parse_from(["cep-cli", "version", "show", id, "tool", "--parent", id, "--id", id]);
    assert!(result.is_err());
}

#[test]
fn draft_defaults_apply() {
    let cli = Cli::try_parse_from(["cep-cli", "draft", "sync"]).unwrap();
    assert!(matches!(cli.command, Command::Draft(DraftCommand { command: DraftSubcommand::Sync })));
}

#[test]
fn parent_query_appends_id() {
    assert_eq!(parent_query(None), "");
    assert_eq!(parent_query(Some(Uuid::nil())), format!("?parent_id={}", Uuid::nil()));
}

#[test]
fn mutations_need_a_user() {
    let ctx = CliContext::new("http://localhost".to_owned(), String::new());
    assert!(matches!(require_user(&ctx), Err(CliError::MissingUser)));
}

#[test]
fn history_renders_localized_lines() {
    let history = serde_json::json!([
        {"number": 1, "updated_by": "anna", "updated_at": 1_709_618_828_123_i64},
        {"number": 2, "updated_by": null, "updated_at": 1_709_618_828_123_i64},
    ]);
    assert_eq!(
        render_history(Locale::De, &history),
        "Version 1 von anna am 05.03.2024 06:07\nVersion 2 von - am 05.03.2024 06:07\n"
    );
}

#[tokio::test]
async fn ping_uses_the_shared_client_and_user_header() {
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let server = tokio::spawn(async move {
        let (mut socket, _) = listener.accept().await.unwrap();
        let mut buf = vec![0_u8; 4096];
        let n = socket.read(&mut buf).await.unwrap();
        socket
            .write_all(b"HTTP/1.1 200 OK\r\ncontent-length: 0\r\nconnection: close\r\n\r\n")
            .await
            .unwrap();
        buf.truncate(n);
        buf
    });

    let ctx = CliContext::new(format!("http://{addr}"), "Jürgen Müller".to_owned());
    run_ping(&ctx).await.unwrap();

    let request = server.await.unwrap();
    assert!(request.starts_with(b"GET /healthz "));
    let header = "x-cep-user: Jürgen Müller".as_bytes();
    assert!(request.windows(header.len()).any(|w| w == header));
}
