//! The lifecycle protocol shared by every backend.
//!
//! A [`Transition`] is the ordered list of [`Step`]s an operation performs
//! against the index and the record set. Identity reservation always precedes
//! activation and release always precedes deactivation or removal, so at no
//! point can two active records share a key. Backends implement
//! [`StepExecutor`] inside their own atomic unit and call
//! [`Transition::apply`]; they never sequence the steps themselves.

use uuid::Uuid;

use crate::{
  Error, Result,
  customer::{Customer, EventKind},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
  Create,
  SoftDelete,
  Restore,
  HardDelete,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
  /// Claim the record's identity key in the active-identity index.
  Reserve,
  /// Give the record's identity key back.
  Release,
  /// Persist a new, active record.
  Insert,
  Activate,
  Deactivate,
  /// Permanently delete the record.
  Remove,
}

const CREATE: &[Step] = &[Step::Reserve, Step::Insert];
const SOFT_DELETE: &[Step] = &[Step::Release, Step::Deactivate];
const RESTORE: &[Step] = &[Step::Reserve, Step::Activate];
const REMOVE_ACTIVE: &[Step] = &[Step::Release, Step::Remove];
const REMOVE_INACTIVE: &[Step] = &[Step::Remove];
const NOTHING: &[Step] = &[];

/// Applies individual steps to a backend. Only [`StepExecutor::reserve`] is
/// expected to fail for domain reasons; every plan puts it first so a
/// conflict never follows a mutation.
pub trait StepExecutor {
  type Error;

  fn reserve(&mut self) -> Result<(), Self::Error>;
  fn release(&mut self) -> Result<(), Self::Error>;
  fn insert(&mut self) -> Result<(), Self::Error>;
  fn activate(&mut self) -> Result<(), Self::Error>;
  fn deactivate(&mut self) -> Result<(), Self::Error>;
  fn remove(&mut self) -> Result<(), Self::Error>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Transition {
  operation: Operation,
  steps:     &'static [Step],
}

impl Transition {
  /// Plan `operation` against the current state of record `id`.
  ///
  /// `current` is ignored for [`Operation::Create`]; for every other
  /// operation a missing record is [`Error::CustomerNotFound`].
  pub fn plan(
    operation: Operation,
    id: Uuid,
    current: Option<&Customer>,
  ) -> Result<Self> {
    let steps = match (operation, current) {
      (Operation::Create, _) => CREATE,
      (_, None) => return Err(Error::CustomerNotFound(id)),
      (Operation::SoftDelete, Some(c)) if c.is_active => SOFT_DELETE,
      (Operation::SoftDelete, Some(_)) => NOTHING,
      (Operation::Restore, Some(c)) if c.is_active => NOTHING,
      (Operation::Restore, Some(_)) => RESTORE,
      (Operation::HardDelete, Some(c)) if c.is_active => REMOVE_ACTIVE,
      (Operation::HardDelete, Some(_)) => REMOVE_INACTIVE,
    };
    Ok(Self { operation, steps })
  }

  pub fn operation(&self) -> Operation { self.operation }

  pub fn steps(&self) -> &'static [Step] { self.steps }

  pub fn is_noop(&self) -> bool { self.steps.is_empty() }

  /// The history entry this transition records, if it changes state and the
  /// record survives it.
  pub fn event_kind(&self) -> Option<EventKind> {
    if self.is_noop() {
      return None;
    }
    match self.operation {
      Operation::Create => Some(EventKind::Created),
      Operation::SoftDelete => Some(EventKind::SoftDeleted),
      Operation::Restore => Some(EventKind::Restored),
      Operation::HardDelete => None,
    }
  }

  /// Run every step in order, stopping at the first failure.
  pub fn apply<E: StepExecutor>(&self, exec: &mut E) -> Result<(), E::Error> {
    for step in self.steps {
      match step {
        Step::Reserve => exec.reserve()?,
        Step::Release => exec.release()?,
        Step::Insert => exec.insert()?,
        Step::Activate => exec.activate()?,
        Step::Deactivate => exec.deactivate()?,
        Step::Remove => exec.remove()?,
      }
    }
    Ok(())
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::{
    customer::{Actor, NewCustomer},
    identity::Identity,
  };

  fn customer(active: bool) -> Customer {
    let mut c = Customer::from_new(NewCustomer::new(
      Identity::new("1", "a@example.com", "N"),
      Actor::new("test"),
    ));
    c.is_active = active;
    c
  }

  fn steps(op: Operation, current: Option<&Customer>) -> &'static [Step] {
    Transition::plan(op, Uuid::new_v4(), current).unwrap().steps()
  }

  #[test]
  fn reserve_precedes_activation() {
    assert_eq!(steps(Operation::Create, None), &[Step::Reserve, Step::Insert]);
    assert_eq!(steps(Operation::Restore, Some(&customer(false))), &[
      Step::Reserve,
      Step::Activate
    ]);
  }

  #[test]
  fn release_precedes_deactivation_and_removal() {
    assert_eq!(steps(Operation::SoftDelete, Some(&customer(true))), &[
      Step::Release,
      Step::Deactivate
    ]);
    assert_eq!(steps(Operation::HardDelete, Some(&customer(true))), &[
      Step::Release,
      Step::Remove
    ]);
    assert_eq!(steps(Operation::HardDelete, Some(&customer(false))), &[
      Step::Remove
    ]);
  }

  #[test]
  fn repeated_transitions_are_noops() {
    let t = Transition::plan(
      Operation::SoftDelete,
      Uuid::new_v4(),
      Some(&customer(false)),
    )
    .unwrap();
    assert!(t.is_noop());
    assert_eq!(t.event_kind(), None);

    let t =
      Transition::plan(Operation::Restore, Uuid::new_v4(), Some(&customer(true)))
        .unwrap();
    assert!(t.is_noop());
  }

  #[test]
  fn missing_record_is_not_found() {
    let id = Uuid::new_v4();
    for op in [Operation::SoftDelete, Operation::Restore, Operation::HardDelete] {
      let err = Transition::plan(op, id, None).unwrap_err();
      assert!(matches!(err, Error::CustomerNotFound(got) if got == id));
    }
  }

  #[derive(Default)]
  struct Recorder {
    seen:         Vec<Step>,
    fail_reserve: bool,
  }

  impl StepExecutor for Recorder {
    type Error = &'static str;

    fn reserve(&mut self) -> Result<(), Self::Error> {
      if self.fail_reserve {
        return Err("conflict");
      }
      self.seen.push(Step::Reserve);
      Ok(())
    }

    fn release(&mut self) -> Result<(), Self::Error> {
      self.seen.push(Step::Release);
      Ok(())
    }

    fn insert(&mut self) -> Result<(), Self::Error> {
      self.seen.push(Step::Insert);
      Ok(())
    }

    fn activate(&mut self) -> Result<(), Self::Error> {
      self.seen.push(Step::Activate);
      Ok(())
    }

    fn deactivate(&mut self) -> Result<(), Self::Error> {
      self.seen.push(Step::Deactivate);
      Ok(())
    }

    fn remove(&mut self) -> Result<(), Self::Error> {
      self.seen.push(Step::Remove);
      Ok(())
    }
  }

  #[test]
  fn apply_runs_steps_in_order() {
    let t =
      Transition::plan(Operation::Restore, Uuid::new_v4(), Some(&customer(false)))
        .unwrap();
    let mut rec = Recorder::default();
    t.apply(&mut rec).unwrap();
    assert_eq!(rec.seen, vec![Step::Reserve, Step::Activate]);
    assert_eq!(t.event_kind(), Some(EventKind::Restored));
  }

  #[test]
  fn failed_reserve_stops_before_mutation() {
    let t = Transition::plan(Operation::Create, Uuid::new_v4(), None).unwrap();
    let mut rec = Recorder {
      fail_reserve: true,
      ..Default::default()
    };
    assert_eq!(t.apply(&mut rec), Err("conflict"));
    assert!(rec.seen.is_empty());
  }
}
