//! The `CustomerStore` trait.
//!
//! Implemented by [`crate::memory::MemoryStore`] and by storage backends
//! (e.g. `patron-store-sqlite`). Callers such as the admin binary depend on
//! this abstraction, not on a concrete backend.

use std::future::Future;

use uuid::Uuid;

use crate::{
  customer::{Actor, Customer, LifecycleEvent, NewCustomer},
  error::StoreError,
  identity::{Identity, IdentityScope},
};

/// Abstraction over a customer store backend.
///
/// Identifying fields are unique among active customers only. Every
/// operation either fully succeeds or leaves no observable change; conflicts
/// and unknown ids surface through [`StoreError::as_domain`], storage
/// failures pass through as the backend's own error variants.
///
/// All methods return `Send` futures so the trait can be used in
/// multi-threaded async runtimes.
pub trait CustomerStore: Send + Sync {
  type Error: StoreError;

  /// The fields that compose identity keys in this store.
  fn scope(&self) -> &IdentityScope;

  // ── Writes ────────────────────────────────────────────────────────────

  /// Persist a new active customer. Fails with a conflict if an active
  /// customer already holds the same identity key; nothing is stored then.
  fn create(
    &self,
    input: NewCustomer,
  ) -> impl Future<Output = Result<Customer, Self::Error>> + Send + '_;

  /// Mark a customer inactive and free its identity key. Soft-deleting an
  /// inactive customer succeeds without change.
  fn soft_delete(
    &self,
    id: Uuid,
    actor: Actor,
  ) -> impl Future<Output = Result<Customer, Self::Error>> + Send + '_;

  /// Reactivate a soft-deleted customer, re-checking identity uniqueness
  /// against whatever became active in the meantime. Restoring an active
  /// customer succeeds without change.
  fn restore(
    &self,
    id: Uuid,
    actor: Actor,
  ) -> impl Future<Output = Result<Customer, Self::Error>> + Send + '_;

  /// Permanently remove a customer and its history, releasing its identity
  /// key if it was active.
  fn hard_delete(
    &self,
    id: Uuid,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + '_;

  // ── Reads ─────────────────────────────────────────────────────────────

  /// Retrieve a customer in any state. Returns `None` if not found.
  fn get(
    &self,
    id: Uuid,
  ) -> impl Future<Output = Result<Option<Customer>, Self::Error>> + Send + '_;

  /// List customers oldest first; inactive ones only when asked.
  fn list(
    &self,
    include_inactive: bool,
  ) -> impl Future<Output = Result<Vec<Customer>, Self::Error>> + Send + '_;

  /// The active customer whose identity key matches `identity`, if any.
  fn find_active_by_identity(
    &self,
    identity: Identity,
  ) -> impl Future<Output = Result<Option<Customer>, Self::Error>> + Send + '_;

  /// Every state-changing transition recorded for a customer, oldest first.
  fn history(
    &self,
    id: Uuid,
  ) -> impl Future<Output = Result<Vec<LifecycleEvent>, Self::Error>> + Send + '_;
}
