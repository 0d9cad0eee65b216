//! Identity keys: the comparable value derived from a customer's identifying
//! fields.
//!
//! Two customers collide iff their keys are equal. Comparison is exact:
//! case-sensitive and whitespace-preserving. Which fields participate is
//! decided by an [`IdentityScope`], not hard-coded.

use std::fmt;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use strum::{AsRefStr, Display, EnumIter, EnumString, IntoEnumIterator as _};

use crate::{Error, Result};

// ─── Fields ──────────────────────────────────────────────────────────────────

/// An identifying attribute of a customer.
///
/// Declaration order is the canonical component order of an [`IdentityKey`].
#[derive(
  Debug,
  Clone,
  Copy,
  PartialEq,
  Eq,
  PartialOrd,
  Ord,
  Hash,
  Serialize,
  Deserialize,
  AsRefStr,
  Display,
  EnumIter,
  EnumString,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum IdentityField {
  Phone,
  Email,
  NationalId,
}

/// The identifying attributes of a customer. Values are stored exactly as
/// given; format validation happens before they reach the store.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Identity {
  pub phone:       String,
  pub email:       String,
  pub national_id: String,
}

impl Identity {
  pub fn new(
    phone: impl Into<String>,
    email: impl Into<String>,
    national_id: impl Into<String>,
  ) -> Self {
    Self {
      phone:       phone.into(),
      email:       email.into(),
      national_id: national_id.into(),
    }
  }

  pub fn field(&self, field: IdentityField) -> &str {
    match field {
      IdentityField::Phone => &self.phone,
      IdentityField::Email => &self.email,
      IdentityField::NationalId => &self.national_id,
    }
  }
}

// ─── Scope ───────────────────────────────────────────────────────────────────

/// The set of fields that compose an [`IdentityKey`]. Always non-empty,
/// sorted, and free of duplicates.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "Vec<IdentityField>", into = "Vec<IdentityField>")]
pub struct IdentityScope {
  fields: Vec<IdentityField>,
}

impl IdentityScope {
  pub fn new(fields: impl IntoIterator<Item = IdentityField>) -> Result<Self> {
    let mut fields: Vec<_> = fields.into_iter().collect();
    fields.sort();
    fields.dedup();
    if fields.is_empty() {
      return Err(Error::EmptyIdentityScope);
    }
    Ok(Self { fields })
  }

  pub fn fields(&self) -> &[IdentityField] { &self.fields }

  /// Comma-separated field names, e.g. `phone,email,national_id`.
  pub fn describe(&self) -> String {
    self
      .fields
      .iter()
      .map(AsRef::<str>::as_ref)
      .collect::<Vec<_>>()
      .join(",")
  }
}

/// The full `(phone, email, national_id)` triple.
impl Default for IdentityScope {
  fn default() -> Self {
    Self {
      fields: IdentityField::iter().collect(),
    }
  }
}

impl TryFrom<Vec<IdentityField>> for IdentityScope {
  type Error = Error;

  fn try_from(fields: Vec<IdentityField>) -> Result<Self> { Self::new(fields) }
}

impl From<IdentityScope> for Vec<IdentityField> {
  fn from(scope: IdentityScope) -> Self { scope.fields }
}

// ─── Key ─────────────────────────────────────────────────────────────────────

/// The derived, comparable identity of a customer under a given scope.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct IdentityKey {
  components: Vec<(IdentityField, String)>,
}

impl IdentityKey {
  pub fn derive(identity: &Identity, scope: &IdentityScope) -> Self {
    let components = scope
      .fields()
      .iter()
      .map(|&f| (f, identity.field(f).to_owned()))
      .collect();
    Self { components }
  }

  pub fn components(&self) -> &[(IdentityField, String)] { &self.components }

  /// Lowercase hex SHA-256 over a length-prefixed encoding of the
  /// components. Equal keys produce equal digests and the encoding is
  /// unambiguous, so distinct keys produce distinct preimages.
  pub fn digest(&self) -> String {
    let mut hasher = Sha256::new();
    for (field, value) in &self.components {
      let tag: &str = field.as_ref();
      hasher.update((tag.len() as u64).to_le_bytes());
      hasher.update(tag.as_bytes());
      hasher.update((value.len() as u64).to_le_bytes());
      hasher.update(value.as_bytes());
    }
    hex::encode(hasher.finalize())
  }
}

impl fmt::Display for IdentityKey {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    for (i, (field, value)) in self.components.iter().enumerate() {
      if i > 0 {
        f.write_str(", ")?;
      }
      write!(f, "{field}={value:?}")?;
    }
    Ok(())
  }
}
