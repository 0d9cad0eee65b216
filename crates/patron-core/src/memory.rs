//! [`MemoryStore`], an in-process [`CustomerStore`] built on
//! [`ActiveIdentityIndex`].
//!
//! Records, history, and the index share a single mutex, so every operation
//! is one critical section and concurrent reservations of the same key
//! resolve to exactly one winner.

use std::{collections::HashMap, sync::Arc};

use parking_lot::Mutex;
use uuid::Uuid;

use crate::{
  Error, Result,
  customer::{Actor, Customer, LifecycleEvent, NewCustomer},
  identity::{Identity, IdentityKey, IdentityScope},
  index::ActiveIdentityIndex,
  store::CustomerStore,
  transition::{Operation, StepExecutor, Transition},
};

#[derive(Debug, Default)]
struct State {
  customers: HashMap<Uuid, Customer>,
  events:    HashMap<Uuid, Vec<LifecycleEvent>>,
  index:     ActiveIdentityIndex,
}

/// Clones share the same state.
#[derive(Debug, Clone)]
pub struct MemoryStore {
  scope: IdentityScope,
  state: Arc<Mutex<State>>,
}

impl Default for MemoryStore {
  fn default() -> Self { Self::new(IdentityScope::default()) }
}

impl MemoryStore {
  pub fn new(scope: IdentityScope) -> Self {
    Self {
      scope,
      state: Arc::new(Mutex::new(State::default())),
    }
  }

  /// Snapshot of the active-identity index.
  pub fn active_keys(&self) -> Vec<(IdentityKey, Uuid)> {
    let state = self.state.lock();
    state.index.iter().map(|(k, id)| (k.clone(), id)).collect()
  }

  fn run(
    &self,
    plan: Transition,
    state: &mut State,
    record: Customer,
    actor: Actor,
  ) -> Result<Customer> {
    let id = record.customer_id;
    let mut txn = MemoryTxn {
      key: record.identity_key(&self.scope),
      state,
      record,
      actor,
    };

    if let Err(err) = plan.apply(&mut txn) {
      if let Error::Conflict(c) = &err {
        tracing::warn!(
          customer_id = %id,
          holder = ?c.holder,
          identity = %c.key.digest(),
          "identity key already held by an active customer"
        );
      }
      return Err(err);
    }

    let MemoryTxn {
      state,
      record,
      actor,
      ..
    } = txn;

    if let Some(kind) = plan.event_kind() {
      state
        .events
        .entry(id)
        .or_default()
        .push(LifecycleEvent::new(&record, kind));
    }

    if plan.is_noop() {
      tracing::debug!(customer_id = %id, operation = ?plan.operation(), "no change");
    } else {
      tracing::info!(
        customer_id = %id,
        actor = %actor,
        operation = ?plan.operation(),
        "customer transition applied"
      );
    }

    Ok(record)
  }

  fn transition(&self, operation: Operation, id: Uuid, actor: Actor) -> Result<Customer> {
    let mut state = self.state.lock();
    let current = state.customers.get(&id).cloned();
    let plan = Transition::plan(operation, id, current.as_ref())?;
    let record = current.ok_or(Error::CustomerNotFound(id))?;
    self.run(plan, &mut state, record, actor)
  }
}

// ─── Step executor ───────────────────────────────────────────────────────────

struct MemoryTxn<'a> {
  state:  &'a mut State,
  key:    IdentityKey,
  record: Customer,
  actor:  Actor,
}

impl MemoryTxn<'_> {
  fn store_record(&mut self) {
    self
      .state
      .customers
      .insert(self.record.customer_id, self.record.clone());
  }
}

impl StepExecutor for MemoryTxn<'_> {
  type Error = Error;

  fn reserve(&mut self) -> Result<()> {
    self
      .state
      .index
      .reserve(self.key.clone(), self.record.customer_id)?;
    Ok(())
  }

  fn release(&mut self) -> Result<()> {
    self.state.index.release(&self.key, self.record.customer_id);
    Ok(())
  }

  fn insert(&mut self) -> Result<()> {
    self.store_record();
    Ok(())
  }

  fn activate(&mut self) -> Result<()> {
    self.record.mark(true, &self.actor);
    self.store_record();
    Ok(())
  }

  fn deactivate(&mut self) -> Result<()> {
    self.record.mark(false, &self.actor);
    self.store_record();
    Ok(())
  }

  fn remove(&mut self) -> Result<()> {
    let id = self.record.customer_id;
    self.state.customers.remove(&id);
    self.state.events.remove(&id);
    Ok(())
  }
}

// ─── CustomerStore impl ──────────────────────────────────────────────────────

impl CustomerStore for MemoryStore {
  type Error = Error;

  fn scope(&self) -> &IdentityScope { &self.scope }

  async fn create(&self, input: NewCustomer) -> Result<Customer> {
    let record = Customer::from_new(input);
    let actor = record.created_by.clone();
    let plan = Transition::plan(Operation::Create, record.customer_id, None)?;

    let mut state = self.state.lock();
    self.run(plan, &mut state, record, actor)
  }

  async fn soft_delete(&self, id: Uuid, actor: Actor) -> Result<Customer> {
    self.transition(Operation::SoftDelete, id, actor)
  }

  async fn restore(&self, id: Uuid, actor: Actor) -> Result<Customer> {
    self.transition(Operation::Restore, id, actor)
  }

  async fn hard_delete(&self, id: Uuid) -> Result<()> {
    let mut state = self.state.lock();
    let current = state.customers.get(&id).cloned();
    let plan = Transition::plan(Operation::HardDelete, id, current.as_ref())?;
    let record = current.ok_or(Error::CustomerNotFound(id))?;
    let actor = record.updated_by.clone();
    self.run(plan, &mut state, record, actor)?;
    Ok(())
  }

  async fn get(&self, id: Uuid) -> Result<Option<Customer>> {
    Ok(self.state.lock().customers.get(&id).cloned())
  }

  async fn list(&self, include_inactive: bool) -> Result<Vec<Customer>> {
    let state = self.state.lock();
    let mut customers: Vec<Customer> = state
      .customers
      .values()
      .filter(|c| include_inactive || c.is_active)
      .cloned()
      .collect();
    customers.sort_by_key(|c| (c.created_at, c.customer_id));
    Ok(customers)
  }

  async fn find_active_by_identity(&self, identity: Identity) -> Result<Option<Customer>> {
    let key = IdentityKey::derive(&identity, &self.scope);
    let state = self.state.lock();
    Ok(
      state
        .index
        .holder(&key)
        .and_then(|id| state.customers.get(&id))
        .cloned(),
    )
  }

  async fn history(&self, id: Uuid) -> Result<Vec<LifecycleEvent>> {
    let state = self.state.lock();
    if !state.customers.contains_key(&id) {
      return Err(Error::CustomerNotFound(id));
    }
    Ok(state.events.get(&id).cloned().unwrap_or_default())
  }
}

#[cfg(test)]
mod tests {
  use std::collections::HashSet;

  use super::*;
  use crate::{customer::EventKind, identity::IdentityField};

  fn identity() -> Identity {
    Identity::new("+15550100", "jane@example.com", "ID-42")
  }

  fn new_customer(identity: Identity) -> NewCustomer {
    NewCustomer::new(identity, Actor::new("clerk"))
  }

  fn actor() -> Actor { Actor::new("manager") }

  /// Active keys in the index equal the keys of active customers, and no two
  /// active customers share a key.
  async fn assert_consistent(s: &MemoryStore) {
    let active = s.list(false).await.unwrap();
    let keys: HashSet<_> = active.iter().map(|c| c.identity_key(s.scope())).collect();
    assert_eq!(keys.len(), active.len(), "two active customers share a key");

    let mut expected: Vec<_> = active
      .iter()
      .map(|c| (c.identity_key(s.scope()).digest(), c.customer_id))
      .collect();
    let mut indexed: Vec<_> = s
      .active_keys()
      .into_iter()
      .map(|(k, id)| (k.digest(), id))
      .collect();
    expected.sort();
    indexed.sort();
    assert_eq!(expected, indexed);
  }

  #[tokio::test]
  async fn create_reserves_identity() {
    let s = MemoryStore::default();
    let c = s.create(new_customer(identity())).await.unwrap();

    assert!(c.is_active);
    let found = s.find_active_by_identity(identity()).await.unwrap();
    assert_eq!(found.map(|f| f.customer_id), Some(c.customer_id));
    assert_consistent(&s).await;
  }

  #[tokio::test]
  async fn create_collision_leaves_no_record() {
    let s = MemoryStore::default();
    let c1 = s.create(new_customer(identity())).await.unwrap();

    let err = s.create(new_customer(identity())).await.unwrap_err();
    let conflict = err.as_conflict().expect("conflict");
    assert_eq!(conflict.holder, Some(c1.customer_id));

    assert_eq!(s.list(true).await.unwrap().len(), 1);
    assert_consistent(&s).await;
  }

  #[tokio::test]
  async fn soft_delete_is_idempotent() {
    let s = MemoryStore::default();
    let c = s.create(new_customer(identity())).await.unwrap();

    let once = s.soft_delete(c.customer_id, actor()).await.unwrap();
    assert!(!once.is_active);
    assert_eq!(once.updated_by, actor());

    let twice = s.soft_delete(c.customer_id, Actor::new("other")).await.unwrap();
    assert_eq!(twice, once);
    assert!(s.find_active_by_identity(identity()).await.unwrap().is_none());

    let kinds: Vec<_> = s
      .history(c.customer_id)
      .await
      .unwrap()
      .into_iter()
      .map(|e| e.kind)
      .collect();
    assert_eq!(kinds, vec![EventKind::Created, EventKind::SoftDeleted]);
  }

  #[tokio::test]
  async fn restore_active_is_noop() {
    let s = MemoryStore::default();
    let c = s.create(new_customer(identity())).await.unwrap();
    let restored = s.restore(c.customer_id, actor()).await.unwrap();
    assert_eq!(restored, c);
  }

  #[tokio::test]
  async fn unknown_id_is_not_found() {
    let s = MemoryStore::default();
    let id = Uuid::new_v4();
    assert!(s.soft_delete(id, actor()).await.unwrap_err().is_not_found());
    assert!(s.restore(id, actor()).await.unwrap_err().is_not_found());
    assert!(s.hard_delete(id).await.unwrap_err().is_not_found());
    assert!(s.history(id).await.unwrap_err().is_not_found());
    assert!(s.get(id).await.unwrap().is_none());
  }

  #[tokio::test]
  async fn reuse_conflict_and_restore_scenario() {
    let s = MemoryStore::default();

    // Key reuse after soft-delete.
    let c1 = s.create(new_customer(identity())).await.unwrap();
    s.soft_delete(c1.customer_id, actor()).await.unwrap();
    let c2 = s.create(new_customer(identity())).await.unwrap();
    assert_ne!(c1.customer_id, c2.customer_id);
    assert_eq!(s.list(true).await.unwrap().len(), 2);
    assert_consistent(&s).await;

    // Restore conflict.
    let err = s.restore(c1.customer_id, actor()).await.unwrap_err();
    let conflict = err.as_conflict().expect("conflict");
    assert_eq!(conflict.holder, Some(c2.customer_id));
    assert_eq!(conflict.key, c1.identity_key(s.scope()));
    assert!(!s.get(c1.customer_id).await.unwrap().unwrap().is_active);
    let holder = s.find_active_by_identity(identity()).await.unwrap().unwrap();
    assert_eq!(holder.customer_id, c2.customer_id);
    assert_consistent(&s).await;

    // Restore succeeds once the key is free again.
    s.soft_delete(c2.customer_id, actor()).await.unwrap();
    let restored = s.restore(c1.customer_id, actor()).await.unwrap();
    assert!(restored.is_active);
    assert!(restored.updated_at >= c1.updated_at);
    let holder = s.find_active_by_identity(identity()).await.unwrap().unwrap();
    assert_eq!(holder.customer_id, c1.customer_id);
    assert_consistent(&s).await;
  }

  #[tokio::test]
  async fn hard_delete_releases_key_and_history() {
    let s = MemoryStore::default();
    let c = s.create(new_customer(identity())).await.unwrap();
    s.hard_delete(c.customer_id).await.unwrap();

    assert!(s.get(c.customer_id).await.unwrap().is_none());
    assert!(s.active_keys().is_empty());
    s.create(new_customer(identity())).await.unwrap();
    assert_consistent(&s).await;
  }

  #[tokio::test]
  async fn narrower_scope_collides_on_fewer_fields() {
    let s = MemoryStore::new(IdentityScope::new([IdentityField::Email]).unwrap());
    s.create(new_customer(identity())).await.unwrap();

    let mut other = identity();
    other.phone = "+15550199".into();
    let err = s.create(new_customer(other)).await.unwrap_err();
    assert!(err.as_conflict().is_some());
  }

  #[tokio::test]
  async fn invariant_holds_over_mixed_operations() {
    let s = MemoryStore::default();
    let identities: Vec<_> = (0..3)
      .map(|i| Identity::new(format!("+1555010{i}"), "x@example.com", "N"))
      .collect();

    let mut ids = Vec::new();
    for step in 0..120usize {
      let identity = identities[step % identities.len()].clone();
      match step % 5 {
        0 | 3 => {
          if let Ok(c) = s.create(new_customer(identity)).await {
            ids.push(c.customer_id);
          }
        }
        1 if !ids.is_empty() => {
          let id = ids[(step * 7) % ids.len()];
          s.soft_delete(id, actor()).await.unwrap();
        }
        2 if !ids.is_empty() => {
          let id = ids[(step * 3) % ids.len()];
          let _ = s.restore(id, actor()).await;
        }
        4 if ids.len() > 4 => {
          let id = ids.remove(step % ids.len());
          s.hard_delete(id).await.unwrap();
        }
        _ => {}
      }
      assert_consistent(&s).await;
    }
  }

  #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
  async fn concurrent_creates_have_one_winner() {
    for _ in 0..20 {
      let s = MemoryStore::default();
      let a = tokio::spawn({
        let s = s.clone();
        async move { s.create(new_customer(identity())).await }
      });
      let b = tokio::spawn({
        let s = s.clone();
        async move { s.create(new_customer(identity())).await }
      });
      let (a, b) = (a.await.unwrap(), b.await.unwrap());

      assert!(a.is_ok() != b.is_ok(), "exactly one create must win");
      let loser = if a.is_ok() { b } else { a };
      assert!(loser.unwrap_err().as_conflict().is_some());
      assert_eq!(s.list(true).await.unwrap().len(), 1);
    }
  }
}
