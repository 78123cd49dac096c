//! HTTP plumbing shared by every command.

use std::io::Read as _;

use model::draft::DraftError;
use model::{Entity, EntityKind, ModelError};
use serde_json::Value;
use uuid::Uuid;

/// Header the server reads the editing user from.
pub const USER_HEADER: &str = "x-cep-user";

#[derive(Debug, thiserror::Error)]
pub enum CliError {
    #[error("http request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("server returned HTTP {status} ({code}): {message}")]
    ServerError { status: u16, code: String, message: String },
    #[error("invalid JSON payload: {0}")]
    InvalidJson(#[from] serde_json::Error),
    #[error("file error: {0}")]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Draft(#[from] DraftError),
    #[error(transparent)]
    Model(#[from] ModelError),
    #[error("expected field=value, got `{0}`")]
    InvalidAssignment(String),
    #[error("missing expected field `{0}`")]
    MissingField(&'static str),
    #[error("no user name; pass --user or set CEP_USER")]
    MissingUser,
}

impl CliError {
    /// True when the server rejected a write because the entity moved on.
    #[must_use]
    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::ServerError { status: 409, .. })
    }
}

#[derive(Debug, Clone)]
pub struct CliContext {
    pub base_url: String,
    pub user: String,
    client: reqwest::Client,
}

impl CliContext {
    #[must_use]
    pub fn new(base_url: String, user: String) -> Self {
        Self { base_url, user, client: reqwest::Client::new() }
    }

    #[must_use]
    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url.trim_end_matches('/'), path)
    }

    /// Request on the shared client with the user header, query pairs
    /// encoded by reqwest, and an optional JSON body.
    pub(crate) fn build(&self, method: reqwest::Method, path: &str, query: &[(&str, &str)], body: Option<&Value>) -> reqwest::RequestBuilder {
        let mut request = self.client.request(method, self.url(path));
        if !query.is_empty() {
            request = request.query(query);
        }
        if !self.user.is_empty() {
            request = request.header(USER_HEADER, &self.user);
        }
        if let Some(json) = body {
            request = request.json(json);
        }
        request
    }

    /// Send a JSON request and decode the JSON reply.
    ///
    /// # Errors
    ///
    /// Returns [`CliError::ServerError`] with the server's `{code, message}`
    /// for any non-success status.
    pub async fn request(&self, method: reqwest::Method, path: &str, body: Option<Value>) -> Result<Value, CliError> {
        send(self.build(method, path, &[], body.as_ref())).await
    }

    pub async fn get(&self, path: &str) -> Result<Value, CliError> {
        self.get_query(path, &[]).await
    }

    pub async fn get_query(&self, path: &str, query: &[(&str, &str)]) -> Result<Value, CliError> {
        send(self.build(reqwest::Method::GET, path, query, None)).await
    }

    /// Fetch one live entity.
    ///
    /// # Errors
    ///
    /// Returns the server error, or `InvalidJson` if the reply is not an entity.
    pub async fn entity(&self, kind: EntityKind, id: Uuid) -> Result<Entity, CliError> {
        let value = self.get(&format!("/api/entities/{kind}/{id}")).await?;
        Ok(serde_json::from_value(value)?)
    }
}

/// Empty or non-JSON replies decode as `Null`.
async fn send(request: reqwest::RequestBuilder) -> Result<Value, CliError> {
    let response = request.send().await?;
    let status = response.status();
    let value = response.json::<Value>().await.unwrap_or(Value::Null);

    if !status.is_success() {
        return Err(server_error(status.as_u16(), &value));
    }
    Ok(value)
}

pub(crate) fn server_error(status: u16, body: &Value) -> CliError {
    let text = |key: &str| body.get(key).and_then(Value::as_str).map(str::to_owned);
    CliError::ServerError {
        status,
        code: text("code").unwrap_or_else(|| "E_HTTP".to_owned()),
        message: text("message").unwrap_or_else(|| body.to_string()),
    }
}

pub fn print_json(value: &Value) -> Result<(), CliError> {
    let rendered = serde_json::to_string_pretty(value)?;
    println!("{rendered}");
    Ok(())
}

/// Read JSON from a file path, or stdin for `-`.
pub fn read_json(path: &str) -> Result<Value, CliError> {
    let raw = if path == "-" {
        let mut raw = String::new();
        std::io::stdin().read_to_string(&mut raw)?;
        raw
    } else {
        std::fs::read_to_string(path)?
    };
    Ok(serde_json::from_str(&raw)?)
}

/// Write pretty JSON to a file path, or stdout for `-`.
pub fn write_json(path: &str, value: &Value) -> Result<(), CliError> {
    if path == "-" {
        return print_json(value);
    }
    std::fs::write(path, serde_json::to_string_pretty(value)?)?;
    eprintln!("wrote {path}");
    Ok(())
}

/// Split `field=value`; the value may itself contain `=`.
pub fn parse_assignment(raw: &str) -> Result<(String, String), CliError> {
    let (field, value) = raw.split_once('=').ok_or_else(|| CliError::InvalidAssignment(raw.to_owned()))?;
    let field = field.trim();
    if field.is_empty() {
        return Err(CliError::InvalidAssignment(raw.to_owned()));
    }
    Ok((field.to_owned(), value.to_owned()))
}

/// Login name without any `DOMAIN\` prefix.
#[must_use]
pub fn strip_domain(raw: &str) -> &str {
    raw.rsplit_once('\\').map_or(raw, |(_, name)| name).trim()
}

/// The platform user (`USERNAME` on Windows, `USER` elsewhere).
#[must_use]
pub fn platform_user_name() -> Option<String> {
    ["USERNAME", "USER"]
        .iter()
        .filter_map(|key| std::env::var(key).ok())
        .map(|raw| strip_domain(&raw).to_owned())
        .find(|name| !name.is_empty())
}

#[cfg(test)]
#[path = "api_test.rs"]
mod tests;
