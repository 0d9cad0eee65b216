//! Operations on the `active_identities` table.
//!
//! These run on the connection of an open transaction; callers commit or
//! roll back together with the matching change to `customers`.

use rusqlite::{Connection, OptionalExtension as _};
use serde::Serialize;
use uuid::Uuid;

use patron_core::{Conflict, identity::IdentityKey};

use crate::{
  Result,
  encode::{decode_uuid, encode_uuid},
};

/// The active customer holding `digest`, if any.
pub fn holder(conn: &Connection, digest: &str) -> Result<Option<Uuid>> {
  let raw: Option<String> = conn
    .query_row(
      "SELECT customer_id FROM active_identities WHERE identity_digest = ?1",
      rusqlite::params![digest],
      |r| r.get(0),
    )
    .optional()?;
  raw.as_deref().map(decode_uuid).transpose()
}

/// Check-then-insert. Callers hold an `IMMEDIATE` transaction, so no other
/// writer can slip in between the check and the insert.
pub fn reserve(conn: &Connection, key: &IdentityKey, owner: Uuid) -> Result<()> {
  let digest = key.digest();
  match holder(conn, &digest)? {
    Some(current) if current == owner => Ok(()),
    Some(current) => Err(
      Conflict {
        key:    key.clone(),
        holder: Some(current),
      }
      .into(),
    ),
    None => {
      conn.execute(
        "INSERT INTO active_identities (identity_digest, customer_id) VALUES (?1, ?2)",
        rusqlite::params![digest, encode_uuid(owner)],
      )?;
      Ok(())
    }
  }
}

/// Remove the row for `key` only if `owner` holds it.
pub fn release(conn: &Connection, key: &IdentityKey, owner: Uuid) -> Result<bool> {
  let removed = conn.execute(
    "DELETE FROM active_identities WHERE identity_digest = ?1 AND customer_id = ?2",
    rusqlite::params![key.digest(), encode_uuid(owner)],
  )?;
  Ok(removed > 0)
}

// ─── Consistency ─────────────────────────────────────────────────────────────

/// A disagreement between `active_identities` and the active customers.
/// Any divergence is a bug or an out-of-band edit, never a normal state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Divergence {
  /// An active customer whose identity is not in the index.
  Missing {
    customer_id:     Uuid,
    identity_digest: String,
  },
  /// An index row whose owner is inactive or gone.
  Orphaned {
    customer_id:     Uuid,
    identity_digest: String,
  },
  /// An index row owned by an active customer under a different digest.
  Mismatched {
    customer_id: Uuid,
    indexed:     String,
    actual:      String,
  },
  /// A customer whose stored digest no longer matches its identifying
  /// fields under the store's scope.
  StaleDigest {
    customer_id: Uuid,
    stored:      String,
    derived:     String,
  },
}

fn pairs(conn: &Connection, sql: &str) -> Result<Vec<(String, String)>> {
  let mut stmt = conn.prepare(sql)?;
  let rows = stmt
    .query_map([], |r| Ok((r.get(0)?, r.get(1)?)))?
    .collect::<rusqlite::Result<Vec<_>>>()?;
  Ok(rows)
}

/// Index-level divergences. [`Divergence::StaleDigest`] needs the scope and
/// is computed by the store.
pub fn divergences(conn: &Connection) -> Result<Vec<Divergence>> {
  let mut out = Vec::new();

  for (id, digest) in pairs(
    conn,
    "SELECT c.customer_id, c.identity_digest
     FROM customers c
     LEFT JOIN active_identities a ON a.customer_id = c.customer_id
     WHERE c.is_active = 1 AND a.customer_id IS NULL",
  )? {
    out.push(Divergence::Missing {
      customer_id:     decode_uuid(&id)?,
      identity_digest: digest,
    });
  }

  for (id, digest) in pairs(
    conn,
    "SELECT a.customer_id, a.identity_digest
     FROM active_identities a
     LEFT JOIN customers c ON c.customer_id = a.customer_id
     WHERE c.customer_id IS NULL OR c.is_active = 0",
  )? {
    out.push(Divergence::Orphaned {
      customer_id:     decode_uuid(&id)?,
      identity_digest: digest,
    });
  }

  let mut stmt = conn.prepare(
    "SELECT c.customer_id, a.identity_digest, c.identity_digest
     FROM active_identities a
     JOIN customers c ON c.customer_id = a.customer_id
     WHERE c.is_active = 1 AND a.identity_digest != c.identity_digest",
  )?;
  let rows = stmt
    .query_map([], |r| {
      Ok((r.get::<_, String>(0)?, r.get::<_, String>(1)?, r.get::<_, String>(2)?))
    })?
    .collect::<rusqlite::Result<Vec<_>>>()?;
  for (id, indexed, actual) in rows {
    out.push(Divergence::Mismatched {
      customer_id: decode_uuid(&id)?,
      indexed,
      actual,
    });
  }

  Ok(out)
}
