//! Configuration for the `patron` binary.
//!
//! Values come from an optional TOML file, then `PATRON_*` environment
//! variables, later sources overriding earlier ones.

use std::path::{Path, PathBuf};

use anyhow::Context as _;
use patron_core::identity::IdentityScope;
use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct AdminConfig {
  /// SQLite database file. A leading `~/` is expanded.
  #[serde(default = "default_store_path")]
  pub store_path:      PathBuf,
  /// Recorded as `created_by` / `updated_by` unless `--actor` is given.
  #[serde(default = "default_actor")]
  pub actor:           String,
  /// Fields that compose the identity key.
  #[serde(default)]
  pub identity_fields: IdentityScope,
}

fn default_store_path() -> PathBuf { PathBuf::from("~/.local/share/patron/patron.db") }

fn default_actor() -> String { "admin".to_string() }

impl AdminConfig {
  /// Load from `path` (skipped if absent) and the environment.
  pub fn load(path: &Path) -> anyhow::Result<Self> {
    let settings = config::Config::builder()
      .add_source(config::File::from(path).required(false))
      .add_source(
        config::Environment::with_prefix("PATRON")
          .try_parsing(true)
          .list_separator(",")
          .with_list_parse_key("identity_fields"),
      )
      .build()
      .context("failed to read config file")?;

    settings
      .try_deserialize()
      .context("failed to deserialise AdminConfig")
  }

  /// [`Self::store_path`] with `~` expanded.
  pub fn resolved_store_path(&self) -> PathBuf { expand_tilde(&self.store_path) }
}

/// Expand a leading `~` to the user's home directory.
pub fn expand_tilde(path: &Path) -> PathBuf {
  let s = path.to_string_lossy();
  if let Some(rest) = s.strip_prefix("~/")
    && let Ok(home) = std::env::var("HOME")
  {
    return PathBuf::from(home).join(rest);
  }
  path.to_path_buf()
}
