//! Error types for `patron-core`.

use thiserror::Error;
use uuid::Uuid;

use crate::identity::IdentityKey;

/// An identity collision: `key` is already held by an active customer.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("identity conflict on {key}{}", holder_suffix(.holder))]
pub struct Conflict {
  pub key:    IdentityKey,
  /// The active customer currently holding `key`, when it could be looked up.
  pub holder: Option<Uuid>,
}

fn holder_suffix(holder: &Option<Uuid>) -> String {
  match holder {
    Some(id) => format!(" (held by customer {id})"),
    None => String::new(),
  }
}

#[derive(Debug, Error)]
pub enum Error {
  #[error("customer not found: {0}")]
  CustomerNotFound(Uuid),

  #[error(transparent)]
  Conflict(#[from] Conflict),

  #[error("identity scope must name at least one field")]
  EmptyIdentityScope,

  #[error("serialization error: {0}")]
  Serialization(#[from] serde_json::Error),
}

impl Error {
  pub fn is_not_found(&self) -> bool {
    matches!(self, Self::CustomerNotFound(_))
  }

  pub fn as_conflict(&self) -> Option<&Conflict> {
    match self {
      Self::Conflict(c) => Some(c),
      _ => None,
    }
  }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Implemented by every backend error so callers can tell the two domain
/// failures (not-found, conflict) apart from infrastructure errors without
/// naming the backend.
pub trait StoreError: std::error::Error + Send + Sync + 'static {
  /// The domain error wrapped by this value, if any. Infrastructure errors
  /// return `None`.
  fn as_domain(&self) -> Option<&Error>;

  fn is_not_found(&self) -> bool {
    self.as_domain().is_some_and(Error::is_not_found)
  }

  fn as_conflict(&self) -> Option<&Conflict> {
    self.as_domain().and_then(Error::as_conflict)
  }
}

impl StoreError for Error {
  fn as_domain(&self) -> Option<&Error> { Some(self) }
}
