//! The active-identity index: which identity keys are currently held by an
//! active customer.
//!
//! The index is a derived structure. Its content must always equal the set
//! of keys of active customers; the store that owns it updates both in the
//! same critical section.

use std::collections::{HashMap, hash_map::Entry};

use uuid::Uuid;

use crate::{error::Conflict, identity::IdentityKey};

#[derive(Debug, Clone, Default)]
pub struct ActiveIdentityIndex {
  holders: HashMap<IdentityKey, Uuid>,
}

impl ActiveIdentityIndex {
  pub fn new() -> Self { Self::default() }

  /// Associate `key` with `owner`.
  ///
  /// Fails if a different owner already holds the key. Re-reserving a key
  /// for its current owner succeeds without change.
  pub fn reserve(&mut self, key: IdentityKey, owner: Uuid) -> Result<(), Conflict> {
    match self.holders.entry(key) {
      Entry::Occupied(e) if *e.get() == owner => Ok(()),
      Entry::Occupied(e) => Err(Conflict {
        key:    e.key().clone(),
        holder: Some(*e.get()),
      }),
      Entry::Vacant(e) => {
        e.insert(owner);
        Ok(())
      }
    }
  }

  /// Drop the association for `key` if `owner` holds it. Returns whether
  /// anything was removed.
  pub fn release(&mut self, key: &IdentityKey, owner: Uuid) -> bool {
    match self.holders.get(key) {
      Some(holder) if *holder == owner => {
        self.holders.remove(key);
        true
      }
      _ => false,
    }
  }

  pub fn holder(&self, key: &IdentityKey) -> Option<Uuid> {
    self.holders.get(key).copied()
  }

  pub fn len(&self) -> usize { self.holders.len() }

  pub fn is_empty(&self) -> bool { self.holders.is_empty() }

  pub fn iter(&self) -> impl Iterator<Item = (&IdentityKey, Uuid)> {
    self.holders.iter().map(|(k, v)| (k, *v))
  }
}
