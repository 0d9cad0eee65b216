//! Error type for `patron-store-sqlite`.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
  #[error(transparent)]
  Core(#[from] patron_core::Error),

  #[error("database error: {0}")]
  Database(#[from] tokio_rusqlite::Error),

  #[error("json error: {0}")]
  Json(#[from] serde_json::Error),

  #[error("uuid parse error: {0}")]
  Uuid(#[from] uuid::Error),

  #[error("date/time parse error: {0}")]
  DateParse(String),

  #[error("unexpected column value: {0}")]
  Decode(String),

  /// The store was initialised with a different identity scope. Digests in
  /// `active_identities` would no longer match, so opening is refused.
  #[error(
    "store identity scope is {stored:?} but configuration asks for {configured:?}"
  )]
  ScopeMismatch { stored: String, configured: String },
}

impl From<rusqlite::Error> for Error {
  fn from(e: rusqlite::Error) -> Self { Self::Database(e.into()) }
}

impl patron_core::StoreError for Error {
  fn as_domain(&self) -> Option<&patron_core::Error> {
    match self {
      Self::Core(e) => Some(e),
      _ => None,
    }
  }
}

impl From<patron_core::Conflict> for Error {
  fn from(c: patron_core::Conflict) -> Self { Self::Core(c.into()) }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
