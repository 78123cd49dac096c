mod api;
mod drafts;

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};
use model::EntityKind;
use model::i18n::{self, Locale};
use model::timestamp;
use serde_json::{Map, Value};
use uuid::Uuid;

use crate::api::{CliContext, CliError, parse_assignment, print_json, read_json, write_json};

#[derive(Parser, Debug)]
#[command(name = "cep-cli", about = "Manufacturing configuration editor CLI")]
struct Cli {
    #[arg(long, env = "CEP_BASE_URL", default_value = "http://127.0.0.1:3000")]
    base_url: String,

    /// Editing user; defaults to the platform login without its domain.
    #[arg(long, env = "CEP_USER")]
    user: Option<String>,

    #[arg(long, env = "CEP_DRAFTS", default_value = ".cep-drafts.json")]
    drafts: PathBuf,

    #[arg(long, env = "CEP_LANG", default_value = "en")]
    lang: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    Ping,
    Entity(EntityCommand),
    /// Print an entity with its descendants and ancestors.
    Tree { kind: EntityKind, id: Uuid },
    /// Write an export document (`-` for stdout).
    Export {
        kind: EntityKind,
        id: Uuid,
        #[arg(long, default_value = "-")]
        output: String,
    },
    /// Insert an export document keeping its ids.
    Import {
        #[arg(default_value = "-")]
        input: String,
    },
    /// Copy a subtree to a clipboard file (`-` for stdout).
    Copy {
        kind: EntityKind,
        id: Uuid,
        #[arg(long, default_value = "-")]
        clipboard: String,
    },
    /// Paste a clipboard subtree as a copy under `--parent`.
    Paste {
        kind: EntityKind,
        #[arg(long)]
        parent: Option<Uuid>,
        #[arg(long, default_value = "-")]
        clipboard: String,
    },
    /// Changes after `--since` (milliseconds or a timestamp).
    Changes {
        #[arg(long)]
        since: Option<String>,
    },
    Version(VersionCommand),
    /// Operations of a station grouped by sequence group.
    Sequence { station_id: Uuid },
    Draft(DraftCommand),
}

#[derive(Args, Debug)]
struct EntityCommand {
    #[command(subcommand)]
    command: EntitySubcommand,
}

#[derive(Subcommand, Debug)]
enum EntitySubcommand {
    List {
        kind: EntityKind,
        #[arg(long)]
        parent: Option<Uuid>,
    },
    Get {
        kind: EntityKind,
        id: Uuid,
    },
    Create {
        kind: EntityKind,
        #[arg(long)]
        parent: Option<Uuid>,
    },
    /// Update fields directly, e.g. `--set name="Station 20"`.
    Update {
        kind: EntityKind,
        id: Uuid,
        #[arg(long = "set", required = true)]
        assignments: Vec<String>,
        /// `updated_at` the edit is based on; defaults to the current value.
        #[arg(long)]
        last_known: Option<i64>,
    },
    Delete {
        kind: EntityKind,
        id: Uuid,
    },
}

#[derive(Args, Debug)]
struct VersionCommand {
    #[command(subcommand)]
    command: VersionSubcommand,
}

#[derive(Subcommand, Debug)]
enum VersionSubcommand {
    Create {
        #[arg(long)]
        description: Option<String>,
    },
    List,
    /// Entities of a kind as captured in a version.
    Show {
        version_id: Uuid,
        kind: EntityKind,
        #[arg(long, conflicts_with = "id")]
        parent: Option<Uuid>,
        #[arg(long)]
        id: Option<Uuid>,
    },
    /// Every version that captured an entity.
    History { kind: EntityKind, id: Uuid },
}

#[derive(Args, Debug)]
struct DraftCommand {
    #[command(subcommand)]
    command: DraftSubcommand,
}

#[derive(Subcommand, Debug)]
enum DraftSubcommand {
    Set {
        kind: EntityKind,
        id: Uuid,
        /// `field=value`
        assignment: String,
    },
    Show {
        id: Option<Uuid>,
    },
    Discard {
        id: Uuid,
    },
    Submit {
        id: Uuid,
    },
    Sync,
}

#[tokio::main]
async fn main() -> Result<(), CliError> {
    let cli = Cli::parse();
    let locale: Locale = cli.lang.parse()?;
    let user = cli.user.or_else(api::platform_user_name).unwrap_or_default();
    let ctx = CliContext::new(cli.base_url, user);

    match cli.command {
        Command::Ping => run_ping(&ctx).await,
        Command::Entity(entity) => run_entity(&ctx, entity).await,
        Command::Tree { kind, id } => print_json(&ctx.get(&format!("/api/entities/{kind}/{id}/tree")).await?),
        Command::Export { kind, id, output } => {
            let doc = ctx.get(&format!("/api/entities/{kind}/{id}/export")).await?;
            write_json(&output, &doc)
        }
        Command::Import { input } => {
            let doc = read_json(&input)?;
            let summary = mutate(&ctx, reqwest::Method::POST, "/api/import", Some(doc)).await?;
            print_json(&summary)
        }
        Command::Copy { kind, id, clipboard } => {
            let tree = ctx.get(&format!("/api/entities/{kind}/{id}/tree")).await?;
            let root = tree.get("root").cloned().ok_or(CliError::MissingField("root"))?;
            write_json(&clipboard, &root)
        }
        Command::Paste { kind, parent, clipboard } => {
            let payload = read_json(&clipboard)?;
            let path = format!("/api/entities/{kind}/paste{}", parent_query(parent));
            let summary = mutate(&ctx, reqwest::Method::POST, &path, Some(payload)).await?;
            print_json(&summary)
        }
        Command::Changes { since } => {
            let query: Vec<(&str, &str)> = since.as_deref().map(|since| ("since", since)).into_iter().collect();
            print_json(&ctx.get_query("/api/changes", &query).await?)
        }
        Command::Version(version) => run_version(&ctx, locale, version).await,
        Command::Sequence { station_id } => {
            print_json(&ctx.get(&format!("/api/stations/{station_id}/sequence-groups")).await?)
        }
        Command::Draft(draft) => run_draft(&ctx, &cli.drafts, locale, draft).await,
    }
}

async fn run_ping(ctx: &CliContext) -> Result<(), CliError> {
    ctx.get("/healthz").await?;
    println!("ok");
    Ok(())
}

async fn run_entity(ctx: &CliContext, entity: EntityCommand) -> Result<(), CliError> {
    match entity.command {
        EntitySubcommand::List { kind, parent } => {
            print_json(&ctx.get(&format!("/api/entities/{kind}{}", parent_query(parent))).await?)
        }
        EntitySubcommand::Get { kind, id } => print_json(&ctx.get(&format!("/api/entities/{kind}/{id}")).await?),
        EntitySubcommand::Create { kind, parent } => {
            let body = serde_json::json!({ "parent_id": parent });
            print_json(&mutate(ctx, reqwest::Method::POST, &format!("/api/entities/{kind}"), Some(body)).await?)
        }
        EntitySubcommand::Update { kind, id, assignments, last_known } => {
            let mut fields = Map::new();
            for raw in &assignments {
                let (field, value) = parse_assignment(raw)?;
                fields.insert(field, Value::String(value));
            }
            let last_known = match last_known {
                Some(ts) => ts,
                None => ctx.entity(kind, id).await?.updated_at,
            };
            let body = serde_json::json!({ "last_known_updated_at": last_known, "fields": fields });
            print_json(&mutate(ctx, reqwest::Method::PATCH, &format!("/api/entities/{kind}/{id}"), Some(body)).await?)
        }
        EntitySubcommand::Delete { kind, id } => {
            print_json(&mutate(ctx, reqwest::Method::DELETE, &format!("/api/entities/{kind}/{id}"), None).await?)
        }
    }
}

async fn run_version(ctx: &CliContext, locale: Locale, version: VersionCommand) -> Result<(), CliError> {
    match version.command {
        VersionSubcommand::Create { description } => {
            let body = serde_json::json!({ "description": description });
            print_json(&mutate(ctx, reqwest::Method::POST, "/api/versions", Some(body)).await?)
        }
        VersionSubcommand::List => print_json(&ctx.get("/api/versions").await?),
        VersionSubcommand::Show { version_id, kind, parent, id } => {
            let path = match id {
                Some(id) => format!("/api/versions/{version_id}/entities/{kind}/{id}"),
                None => format!("/api/versions/{version_id}/entities/{kind}{}", parent_query(parent)),
            };
            print_json(&ctx.get(&path).await?)
        }
        VersionSubcommand::History { kind, id } => {
            let history = ctx.get(&format!("/api/entities/{kind}/{id}/versions")).await?;
            print!("{}", render_history(locale, &history));
            Ok(())
        }
    }
}

/// One localized line per version, e.g. `Version 2 by anna at 05.03.2024 06:07`.
fn render_history(locale: Locale, history: &Value) -> String {
    let template = i18n::translate(locale, "version.entry");
    let mut out = String::new();
    for entry in history.as_array().into_iter().flatten() {
        let number = entry.get("number").and_then(Value::as_u64).unwrap_or_default();
        let user = entry.get("updated_by").and_then(Value::as_str).unwrap_or("-");
        let time = entry.get("updated_at").and_then(Value::as_i64).map_or_else(|| "-".to_owned(), timestamp::format_display);
        out.push_str(&template.replace("{number}", &number.to_string()).replace("{user}", user).replace("{time}", &time));
        out.push('\n');
    }
    out
}

async fn run_draft(ctx: &CliContext, path: &std::path::Path, locale: Locale, draft: DraftCommand) -> Result<(), CliError> {
    match draft.command {
        DraftSubcommand::Set { kind, id, assignment } => {
            let (field, value) = parse_assignment(&assignment)?;
            drafts::set(ctx, path, kind, id, &field, value).await
        }
        DraftSubcommand::Show { id } => drafts::show(path, id),
        DraftSubcommand::Discard { id } => drafts::discard(path, id),
        DraftSubcommand::Submit { id } => {
            require_user(ctx)?;
            drafts::submit(ctx, path, id).await
        }
        DraftSubcommand::Sync => drafts::sync(ctx, path, locale).await,
    }
}

/// Mutating request; the server refuses these without a user.
async fn mutate(ctx: &CliContext, method: reqwest::Method, path: &str, body: Option<Value>) -> Result<Value, CliError> {
    require_user(ctx)?;
    ctx.request(method, path, body).await
}

fn require_user(ctx: &CliContext) -> Result<(), CliError> {
    if ctx.user.trim().is_empty() {
        return Err(CliError::MissingUser);
    }
    Ok(())
}

fn parent_query(parent: Option<Uuid>) -> String {
    parent.map(|id| format!("?parent_id={id}")).unwrap_or_default()
}

#[cfg(test)]
#[path = "main_test.rs"]
mod tests;
