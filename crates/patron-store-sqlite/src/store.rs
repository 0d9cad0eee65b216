//! [`SqliteStore`], the SQLite implementation of [`CustomerStore`].

use std::path::Path;

use rusqlite::{Connection, OptionalExtension as _, TransactionBehavior};
use uuid::Uuid;

use patron_core::{
  customer::{Actor, Customer, LifecycleEvent, NewCustomer},
  identity::{Identity, IdentityKey, IdentityScope},
  store::CustomerStore,
  transition::{Operation, StepExecutor, Transition},
};

use crate::{
  Error, Result,
  encode::{
    CUSTOMER_COLUMNS, RawCustomer, RawEvent, encode_dt, encode_event_kind,
    encode_uuid,
  },
  identities::{self, Divergence},
  schema::{SCHEMA, SCOPE_KEY},
};

// ─── Store ───────────────────────────────────────────────────────────────────

/// A Patron customer store backed by a single SQLite file.
///
/// Clones share one connection.
#[derive(Clone)]
pub struct SqliteStore {
  pub(crate) conn: tokio_rusqlite::Connection,
  scope:           IdentityScope,
}

/// What a write transaction is asked to do.
enum Request {
  Create(Customer),
  Existing {
    operation: Operation,
    id:        Uuid,
    /// Attribution for the change; hard deletes have none.
    actor:     Option<Actor>,
  },
}

impl SqliteStore {
  /// Open (or create) a store at `path` and run schema initialisation.
  ///
  /// The identity scope is pinned the first time a file is opened; later
  /// opens with a different scope fail with [`Error::ScopeMismatch`].
  pub async fn open(path: impl AsRef<Path>, scope: IdentityScope) -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open(path).await?;
    let store = Self { conn, scope };
    store.init_schema().await?;
    Ok(store)
  }

  /// Open an in-memory store, for tests.
  pub async fn open_in_memory(scope: IdentityScope) -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open_in_memory().await?;
    let store = Self { conn, scope };
    store.init_schema().await?;
    Ok(store)
  }

  async fn init_schema(&self) -> Result<()> {
    let configured = self.scope.describe();
    let wanted = configured.clone();

    let stored: String = self
      .conn
      .call(move |conn| {
        conn.execute_batch(SCHEMA)?;
        conn.execute(
          "INSERT OR IGNORE INTO store_meta (key, value) VALUES (?1, ?2)",
          rusqlite::params![SCOPE_KEY, wanted],
        )?;
        Ok(conn.query_row(
          "SELECT value FROM store_meta WHERE key = ?1",
          rusqlite::params![SCOPE_KEY],
          |r| r.get(0),
        )?)
      })
      .await?;

    if stored != configured {
      return Err(Error::ScopeMismatch { stored, configured });
    }
    Ok(())
  }

  /// Run one write request in an `IMMEDIATE` transaction.
  ///
  /// Domain failures roll the transaction back and come back as the inner
  /// `Err`; the outer error is reserved for the connection itself.
  async fn write(&self, request: Request) -> Result<(Transition, Customer)> {
    let scope = self.scope.clone();
    let outcome = self
      .conn
      .call(move |conn| Ok(write_tx(conn, &scope, request)))
      .await?;

    match &outcome {
      Ok((plan, record)) if plan.is_noop() => {
        tracing::debug!(
          customer_id = %record.customer_id,
          operation = ?plan.operation(),
          "no change"
        );
      }
      Ok((plan, record)) => {
        tracing::info!(
          customer_id = %record.customer_id,
          actor = %record.updated_by,
          operation = ?plan.operation(),
          "customer transition applied"
        );
      }
      Err(Error::Core(patron_core::Error::Conflict(c))) => {
        tracing::warn!(
          holder = ?c.holder,
          identity = %c.key.digest(),
          "identity key already held by an active customer"
        );
      }
      Err(_) => {}
    }

    outcome
  }

  /// Report every disagreement between the active-identity table and the
  /// active customers. An empty result means the index is consistent.
  pub async fn verify_index(&self) -> Result<Vec<Divergence>> {
    let mut out = self
      .conn
      .call(|conn| Ok(identities::divergences(conn)))
      .await??;

    let scope = self.scope.clone();
    let stale = self
      .conn
      .call(move |conn| Ok(stale_digests(conn, &scope)))
      .await??;
    out.extend(stale);

    for d in &out {
      tracing::error!(divergence = ?d, "active-identity index diverges from customers");
    }
    Ok(out)
  }
}

// ─── Transaction body ────────────────────────────────────────────────────────

fn write_tx(
  conn: &mut Connection,
  scope: &IdentityScope,
  request: Request,
) -> Result<(Transition, Customer)> {
  let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

  let (plan, record, actor) = match request {
    Request::Create(record) => {
      let plan = Transition::plan(Operation::Create, record.customer_id, None)?;
      let actor = record.created_by.clone();
      (plan, record, actor)
    }
    Request::Existing {
      operation,
      id,
      actor,
    } => {
      let current = select_customer(&tx, id)?;
      let plan = Transition::plan(operation, id, current.as_ref())?;
      let record = current.ok_or(patron_core::Error::CustomerNotFound(id))?;
      let actor = actor.unwrap_or_else(|| record.updated_by.clone());
      (plan, record, actor)
    }
  };

  let mut exec = SqlTxn {
    conn: &*tx,
    key: record.identity_key(scope),
    record,
    actor,
  };
  plan.apply(&mut exec)?;
  let record = exec.record;

  if let Some(kind) = plan.event_kind() {
    insert_event(&tx, &LifecycleEvent::new(&record, kind))?;
  }

  tx.commit()?;
  Ok((plan, record))
}

struct SqlTxn<'a> {
  conn:   &'a Connection,
  key:    IdentityKey,
  record: Customer,
  actor:  Actor,
}

impl SqlTxn<'_> {
  fn set_active(&mut self, active: bool) -> Result<()> {
    self.record.mark(active, &self.actor);
    self.conn.execute(
      "UPDATE customers
       SET is_active = ?1, updated_by = ?2, updated_at = ?3
       WHERE customer_id = ?4",
      rusqlite::params![
        self.record.is_active,
        self.record.updated_by.as_str(),
        encode_dt(self.record.updated_at),
        encode_uuid(self.record.customer_id),
      ],
    )?;
    Ok(())
  }
}

impl StepExecutor for SqlTxn<'_> {
  type Error = Error;

  fn reserve(&mut self) -> Result<()> {
    identities::reserve(self.conn, &self.key, self.record.customer_id)
  }

  fn release(&mut self) -> Result<()> {
    identities::release(self.conn, &self.key, self.record.customer_id)?;
    Ok(())
  }

  fn insert(&mut self) -> Result<()> {
    let c = &self.record;
    self.conn.execute(
      "INSERT INTO customers (
         customer_id, phone, email, national_id, identity_digest,
         first_name, last_name, attributes, is_active,
         created_by, updated_by, created_at, updated_at
       ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)",
      rusqlite::params![
        encode_uuid(c.customer_id),
        c.identity.phone,
        c.identity.email,
        c.identity.national_id,
        self.key.digest(),
        c.first_name,
        c.last_name,
        c.attributes.to_string(),
        c.is_active,
        c.created_by.as_str(),
        c.updated_by.as_str(),
        encode_dt(c.created_at),
        encode_dt(c.updated_at),
      ],
    )?;
    Ok(())
  }

  fn activate(&mut self) -> Result<()> { self.set_active(true) }

  fn deactivate(&mut self) -> Result<()> { self.set_active(false) }

  fn remove(&mut self) -> Result<()> {
    self.conn.execute(
      "DELETE FROM customers WHERE customer_id = ?1",
      rusqlite::params![encode_uuid(self.record.customer_id)],
    )?;
    Ok(())
  }
}

// ─── Row helpers ─────────────────────────────────────────────────────────────

fn select_customer(conn: &Connection, id: Uuid) -> Result<Option<Customer>> {
  let raw = conn
    .query_row(
      &format!("SELECT {CUSTOMER_COLUMNS} FROM customers c WHERE c.customer_id = ?1"),
      rusqlite::params![encode_uuid(id)],
      RawCustomer::from_row,
    )
    .optional()?;
  raw.map(RawCustomer::into_customer).transpose()
}

fn insert_event(conn: &Connection, event: &LifecycleEvent) -> Result<()> {
  conn.execute(
    "INSERT INTO customer_events (event_id, customer_id, kind, actor, recorded_at)
     VALUES (?1, ?2, ?3, ?4, ?5)",
    rusqlite::params![
      encode_uuid(event.event_id),
      encode_uuid(event.customer_id),
      encode_event_kind(event.kind),
      event.actor.as_str(),
      encode_dt(event.recorded_at),
    ],
  )?;
  Ok(())
}

fn stale_digests(conn: &Connection, scope: &IdentityScope) -> Result<Vec<Divergence>> {
  let mut stmt = conn.prepare(&format!(
    "SELECT {CUSTOMER_COLUMNS}, c.identity_digest FROM customers c"
  ))?;
  let rows = stmt
    .query_map([], |row| {
      Ok((RawCustomer::from_row(row)?, row.get::<_, String>(12)?))
    })?
    .collect::<rusqlite::Result<Vec<_>>>()?;

  let mut out = Vec::new();
  for (raw, stored) in rows {
    let customer = raw.into_customer()?;
    let derived = customer.identity_key(scope).digest();
    if derived != stored {
      out.push(Divergence::StaleDigest {
        customer_id: customer.customer_id,
        stored,
        derived,
      });
    }
  }
  Ok(out)
}

// ─── CustomerStore impl ──────────────────────────────────────────────────────

impl CustomerStore for SqliteStore {
  type Error = Error;

  fn scope(&self) -> &IdentityScope { &self.scope }

  // ── Writes ────────────────────────────────────────────────────────────────

  async fn create(&self, input: NewCustomer) -> Result<Customer> {
    let (_, customer) = self.write(Request::Create(Customer::from_new(input))).await?;
    Ok(customer)
  }

  async fn soft_delete(&self, id: Uuid, actor: Actor) -> Result<Customer> {
    let (_, customer) = self
      .write(Request::Existing {
        operation: Operation::SoftDelete,
        id,
        actor: Some(actor),
      })
      .await?;
    Ok(customer)
  }

  async fn restore(&self, id: Uuid, actor: Actor) -> Result<Customer> {
    let (_, customer) = self
      .write(Request::Existing {
        operation: Operation::Restore,
        id,
        actor: Some(actor),
      })
      .await?;
    Ok(customer)
  }

  async fn hard_delete(&self, id: Uuid) -> Result<()> {
    self
      .write(Request::Existing {
        operation: Operation::HardDelete,
        id,
        actor: None,
      })
      .await?;
    Ok(())
  }

  // ── Reads ─────────────────────────────────────────────────────────────────

  async fn get(&self, id: Uuid) -> Result<Option<Customer>> {
    self.conn.call(move |conn| Ok(select_customer(conn, id))).await?
  }

  async fn list(&self, include_inactive: bool) -> Result<Vec<Customer>> {
    let raws: Vec<RawCustomer> = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(&format!(
          "SELECT {CUSTOMER_COLUMNS} FROM customers c
           WHERE ?1 OR c.is_active = 1
           ORDER BY c.created_at, c.customer_id"
        ))?;
        let rows = stmt
          .query_map(rusqlite::params![include_inactive], RawCustomer::from_row)?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    raws.into_iter().map(RawCustomer::into_customer).collect()
  }

  async fn find_active_by_identity(&self, identity: Identity) -> Result<Option<Customer>> {
    let digest = IdentityKey::derive(&identity, &self.scope).digest();

    let raw: Option<RawCustomer> = self
      .conn
      .call(move |conn| {
        Ok(
          conn
            .query_row(
              &format!(
                "SELECT {CUSTOMER_COLUMNS}
                 FROM active_identities a
                 JOIN customers c ON c.customer_id = a.customer_id
                 WHERE a.identity_digest = ?1 AND c.is_active = 1"
              ),
              rusqlite::params![digest],
              RawCustomer::from_row,
            )
            .optional()?,
        )
      })
      .await?;

    raw.map(RawCustomer::into_customer).transpose()
  }

  async fn history(&self, id: Uuid) -> Result<Vec<LifecycleEvent>> {
    let id_str = encode_uuid(id);

    let raws: Option<Vec<RawEvent>> = self
      .conn
      .call(move |conn| {
        let exists = conn
          .query_row(
            "SELECT 1 FROM customers WHERE customer_id = ?1",
            rusqlite::params![id_str],
            |_| Ok(true),
          )
          .optional()?
          .unwrap_or(false);
        if !exists {
          return Ok(None);
        }

        let mut stmt = conn.prepare(
          "SELECT event_id, customer_id, kind, actor, recorded_at
           FROM customer_events
           WHERE customer_id = ?1
           ORDER BY recorded_at, rowid",
        )?;
        let rows = stmt
          .query_map(rusqlite::params![id_str], RawEvent::from_row)?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(Some(rows))
      })
      .await?;

    let raws = raws.ok_or(patron_core::Error::CustomerNotFound(id))?;
    raws.into_iter().map(RawEvent::into_event).collect()
  }
}
