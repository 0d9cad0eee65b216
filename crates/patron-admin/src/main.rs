//! `patron` administration binary.
//!
//! Reads `config.toml` (or the path given with `--config`), opens the SQLite
//! customer store, runs one command and prints its result as JSON.

use std::path::PathBuf;

use anyhow::Context as _;
use clap::{Parser, Subcommand};
use patron_admin::{AdminConfig, CustomerCommand};
use patron_core::customer::Actor;
use patron_store_sqlite::SqliteStore;
use tracing::level_filters::LevelFilter;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(author, version, about = "Patron customer store administration")]
struct Cli {
  /// Path to the TOML configuration file.
  #[arg(short, long, default_value = "config.toml")]
  config: PathBuf,

  /// Name recorded on writes; overrides `actor` from the config.
  #[arg(long)]
  actor: Option<String>,

  #[command(subcommand)]
  command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
  #[command(flatten)]
  Customer(CustomerCommand),
  /// Check the active-identity index against the customer table.
  Verify,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
  // Logs go to stderr; stdout carries the JSON result.
  tracing_subscriber::fmt()
    .with_env_filter(
      EnvFilter::builder()
        .with_default_directive(LevelFilter::INFO.into())
        .from_env_lossy(),
    )
    .with_writer(std::io::stderr)
    .init();

  let cli = Cli::parse();
  let cfg = AdminConfig::load(&cli.config)?;
  let actor = Actor::new(cli.actor.unwrap_or_else(|| cfg.actor.clone()));

  let store_path = cfg.resolved_store_path();
  if let Some(parent) = store_path.parent()
    && !parent.as_os_str().is_empty()
  {
    std::fs::create_dir_all(parent)
      .with_context(|| format!("failed to create {parent:?}"))?;
  }
  let store = SqliteStore::open(&store_path, cfg.identity_fields.clone())
    .await
    .with_context(|| format!("failed to open store at {store_path:?}"))?;

  match cli.command {
    Command::Customer(command) => {
      let output = patron_admin::run(&store, actor, command).await?;
      println!("{}", serde_json::to_string_pretty(&output)?);
    }
    Command::Verify => {
      let divergences = store.verify_index().await?;
      println!("{}", serde_json::to_string_pretty(&divergences)?);
      if !divergences.is_empty() {
        anyhow::bail!("{} index divergence(s) found", divergences.len());
      }
    }
  }

  Ok(())
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn parses_create_with_global_flags() {
    let cli = Cli::try_parse_from([
      "patron",
      "--actor",
      "ops",
      "create",
      "--phone",
      "+1 555 0100",
      "--email",
      "ada@example.com",
      "--national-id",
      "AB123",
      "--attributes",
      r#"{"tier":"gold"}"#,
    ])
    .unwrap();
    assert_eq!(cli.actor.as_deref(), Some("ops"));
    assert_eq!(cli.config, PathBuf::from("config.toml"));
    let Command::Customer(CustomerCommand::Create(args)) = cli.command else {
      panic!("expected create");
    };
    assert_eq!(args.identity.national_id, "AB123");
    assert_eq!(args.attributes.unwrap()["tier"], "gold");
  }

  #[test]
  fn create_requires_every_identifying_field() {
    let parsed = Cli::try_parse_from(["patron", "create", "--phone", "1", "--email", "a@b"]);
    assert!(parsed.is_err());
  }

  #[test]
  fn parses_verify_and_purge() {
    let cli = Cli::try_parse_from(["patron", "verify"]).unwrap();
    assert!(matches!(cli.command, Command::Verify));

    let id = uuid::Uuid::new_v4();
    let raw = id.to_string();
    let cli = Cli::try_parse_from(["patron", "purge", raw.as_str(), "--yes"]).unwrap();
    assert!(matches!(
      cli.command,
      Command::Customer(CustomerCommand::Purge { id: parsed, yes: true }) if parsed == id
    ));
  }

  #[test]
  fn rejects_non_uuid_ids() {
    assert!(Cli::try_parse_from(["patron", "get", "not-a-uuid"]).is_err());
  }
}
