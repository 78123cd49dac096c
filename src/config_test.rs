use std::collections::HashMap;

use super::*;

fn config_from(pairs: &[(&str, &str)]) -> Result<AppConfig, ConfigError> {
    let env: HashMap<String, String> = pairs.iter().map(|(k, v)| ((*k).to_owned(), (*v).to_owned())).collect();
    AppConfig::from_lookup(|key| env.get(key).cloned())
}

#[test]
fn defaults_apply_when_env_is_empty() {
    let cfg = config_from(&[]).unwrap();
    assert_eq!(cfg.database_url, DEFAULT_DATABASE_URL);
    assert_eq!(cfg.port, DEFAULT_PORT);
    assert_eq!(cfg.db_max_connections, DEFAULT_DB_MAX_CONNECTIONS);
    assert_eq!(cfg.listen_addr(), "0.0.0.0:3000");
}

#[test]
fn overrides_are_parsed() {
    let cfg = config_from(&[
        ("DATABASE_URL", "sqlite:///var/lib/cep/cep.db"),
        ("PORT", " 8080 "),
        ("DB_MAX_CONNECTIONS", "2"),
        ("CEP_BIND_ADDR", "127.0.0.1"),
    ])
    .unwrap();
    assert_eq!(cfg.database_url, "sqlite:///var/lib/cep/cep.db");
    assert_eq!(cfg.listen_addr(), "127.0.0.1:8080");
    assert_eq!(cfg.db_max_connections, 2);
}

#[test]
fn blank_database_url_falls_back_to_default() {
    let cfg = config_from(&[("DATABASE_URL", "  ")]).unwrap();
    assert_eq!(cfg.database_url, DEFAULT_DATABASE_URL);
}

#[test]
fn invalid_port_is_rejected() {
    let err = config_from(&[("PORT", "eighty")]).unwrap_err();
    assert_eq!(err, ConfigError::Invalid { key: "PORT", value: "eighty".into() });
}

#[test]
fn zero_connections_is_rejected() {
    assert!(matches!(config_from(&[("DB_MAX_CONNECTIONS", "0")]), Err(ConfigError::Invalid { .. })));
}

#[test]
fn non_sqlite_url_is_rejected() {
    let err = config_from(&[("DATABASE_URL", "postgres://localhost/cep")]).unwrap_err();
    assert!(matches!(err, ConfigError::UnsupportedDatabase(_)));
}
