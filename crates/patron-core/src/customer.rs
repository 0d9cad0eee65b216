//! Customer records and their audit history.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::identity::{Identity, IdentityKey, IdentityScope};

// ─── Attribution ─────────────────────────────────────────────────────────────

/// Opaque reference to whoever performed an operation.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Actor(pub String);

impl Actor {
  pub fn new(name: impl Into<String>) -> Self { Self(name.into()) }

  pub fn as_str(&self) -> &str { &self.0 }
}

impl fmt::Display for Actor {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(&self.0)
  }
}

// ─── Customer ────────────────────────────────────────────────────────────────

/// A customer record. Soft-deleted customers are retained with
/// `is_active == false`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Customer {
  pub customer_id: Uuid,
  /// Fixed at creation.
  pub identity:    Identity,
  pub first_name:  Option<String>,
  pub last_name:   Option<String>,
  /// Descriptive payload (address, notes, preferences); never inspected.
  pub attributes:  serde_json::Value,
  pub is_active:   bool,
  pub created_by:  Actor,
  pub updated_by:  Actor,
  pub created_at:  DateTime<Utc>,
  /// Never moves backwards for a given record.
  pub updated_at:  DateTime<Utc>,
}

impl Customer {
  pub fn identity_key(&self, scope: &IdentityScope) -> IdentityKey {
    IdentityKey::derive(&self.identity, scope)
  }

  /// Build a freshly-created, active record from `input`.
  pub fn from_new(input: NewCustomer) -> Self {
    let now = Utc::now();
    Self {
      customer_id: Uuid::new_v4(),
      identity:    input.identity,
      first_name:  input.first_name,
      last_name:   input.last_name,
      attributes:  input.attributes,
      is_active:   true,
      updated_by:  input.created_by.clone(),
      created_by:  input.created_by,
      created_at:  now,
      updated_at:  now,
    }
  }

  /// Flip the lifecycle flag and stamp attribution.
  pub fn mark(&mut self, active: bool, actor: &Actor) {
    self.is_active = active;
    self.updated_by = actor.clone();
    self.updated_at = next_timestamp(self.updated_at);
  }
}

/// The current time, clamped so it never precedes `previous`.
pub fn next_timestamp(previous: DateTime<Utc>) -> DateTime<Utc> {
  Utc::now().max(previous)
}

// ─── NewCustomer ─────────────────────────────────────────────────────────────

/// Input to [`crate::store::CustomerStore::create`]. The id and timestamps
/// are always assigned by the store.
#[derive(Debug, Clone)]
pub struct NewCustomer {
  pub identity:   Identity,
  pub first_name: Option<String>,
  pub last_name:  Option<String>,
  pub attributes: serde_json::Value,
  pub created_by: Actor,
}

impl NewCustomer {
  /// Convenience constructor with no names and an empty attribute object.
  pub fn new(identity: Identity, created_by: Actor) -> Self {
    Self {
      identity,
      first_name: None,
      last_name: None,
      attributes: serde_json::Value::Object(Default::default()),
      created_by,
    }
  }
}

// ─── History ─────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
  Created,
  SoftDeleted,
  Restored,
}

/// An append-only record of a lifecycle transition that changed state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LifecycleEvent {
  pub event_id:    Uuid,
  pub customer_id: Uuid,
  pub kind:        EventKind,
  pub actor:       Actor,
  pub recorded_at: DateTime<Utc>,
}

impl LifecycleEvent {
  pub fn new(customer: &Customer, kind: EventKind) -> Self {
    Self {
      event_id:    Uuid::new_v4(),
      customer_id: customer.customer_id,
      kind,
      actor:       customer.updated_by.clone(),
      recorded_at: customer.updated_at,
    }
  }
}
