//! Encoding and decoding helpers between Rust domain types and the plain-text
//! representations stored in SQLite columns.
//!
//! Timestamps are RFC 3339 strings in UTC, UUIDs hyphenated lowercase
//! strings, and the attribute payload compact JSON.

use chrono::{DateTime, SecondsFormat, Utc};
use patron_core::{
  customer::{Actor, Customer, EventKind, LifecycleEvent},
  identity::Identity,
};
use uuid::Uuid;

use crate::{Error, Result};

// ─── Uuid ─────────────────────────────────────────────────────────────────────

pub fn encode_uuid(id: Uuid) -> String { id.hyphenated().to_string() }

pub fn decode_uuid(s: &str) -> Result<Uuid> { Ok(Uuid::parse_str(s)?) }

// ─── DateTime<Utc> ────────────────────────────────────────────────────────────

/// Fixed-width nanosecond precision, so text order is chronological order.
pub fn encode_dt(dt: DateTime<Utc>) -> String {
  dt.to_rfc3339_opts(SecondsFormat::Nanos, true)
}

pub fn decode_dt(s: &str) -> Result<DateTime<Utc>> {
  DateTime::parse_from_rfc3339(s)
    .map(|dt| dt.with_timezone(&Utc))
    .map_err(|e| Error::DateParse(e.to_string()))
}

// ─── EventKind ────────────────────────────────────────────────────────────────

pub fn encode_event_kind(k: EventKind) -> &'static str {
  match k {
    EventKind::Created => "created",
    EventKind::SoftDeleted => "soft_deleted",
    EventKind::Restored => "restored",
  }
}

pub fn decode_event_kind(s: &str) -> Result<EventKind> {
  match s {
    "created" => Ok(EventKind::Created),
    "soft_deleted" => Ok(EventKind::SoftDeleted),
    "restored" => Ok(EventKind::Restored),
    other => Err(Error::Decode(format!("unknown event kind: {other:?}"))),
  }
}

// ─── Row types ───────────────────────────────────────────────────────────────

/// Column list matching [`RawCustomer::from_row`], prefixed for joins.
pub const CUSTOMER_COLUMNS: &str = "
  c.customer_id, c.phone, c.email, c.national_id, c.first_name, c.last_name,
  c.attributes, c.is_active, c.created_by, c.updated_by, c.created_at,
  c.updated_at";

/// Raw values read directly from a `customers` row.
pub struct RawCustomer {
  pub customer_id: String,
  pub phone:       String,
  pub email:       String,
  pub national_id: String,
  pub first_name:  Option<String>,
  pub last_name:   Option<String>,
  pub attributes:  String,
  pub is_active:   bool,
  pub created_by:  String,
  pub updated_by:  String,
  pub created_at:  String,
  pub updated_at:  String,
}

impl RawCustomer {
  pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      customer_id: row.get(0)?,
      phone:       row.get(1)?,
      email:       row.get(2)?,
      national_id: row.get(3)?,
      first_name:  row.get(4)?,
      last_name:   row.get(5)?,
      attributes:  row.get(6)?,
      is_active:   row.get(7)?,
      created_by:  row.get(8)?,
      updated_by:  row.get(9)?,
      created_at:  row.get(10)?,
      updated_at:  row.get(11)?,
    })
  }

  pub fn into_customer(self) -> Result<Customer> {
    Ok(Customer {
      customer_id: decode_uuid(&self.customer_id)?,
      identity:    Identity {
        phone:       self.phone,
        email:       self.email,
        national_id: self.national_id,
      },
      first_name:  self.first_name,
      last_name:   self.last_name,
      attributes:  serde_json::from_str(&self.attributes)?,
      is_active:   self.is_active,
      created_by:  Actor(self.created_by),
      updated_by:  Actor(self.updated_by),
      created_at:  decode_dt(&self.created_at)?,
      updated_at:  decode_dt(&self.updated_at)?,
    })
  }
}

/// Raw values read directly from a `customer_events` row.
pub struct RawEvent {
  pub event_id:    String,
  pub customer_id: String,
  pub kind:        String,
  pub actor:       String,
  pub recorded_at: String,
}

impl RawEvent {
  pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      event_id:    row.get(0)?,
      customer_id: row.get(1)?,
      kind:        row.get(2)?,
      actor:       row.get(3)?,
      recorded_at: row.get(4)?,
    })
  }

  pub fn into_event(self) -> Result<LifecycleEvent> {
    Ok(LifecycleEvent {
      event_id:    decode_uuid(&self.event_id)?,
      customer_id: decode_uuid(&self.customer_id)?,
      kind:        decode_event_kind(&self.kind)?,
      actor:       Actor(self.actor),
      recorded_at: decode_dt(&self.recorded_at)?,
    })
  }
}

#[cfg(test)]
mod tests {
  use chrono::TimeZone;

  use super::*;

  #[test]
  fn timestamps_sort_as_text() {
    let whole = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap();
    let later = whole + chrono::Duration::nanoseconds(1_500);
    assert!(encode_dt(whole) < encode_dt(later));
    assert_eq!(decode_dt(&encode_dt(later)).unwrap(), later);
  }

  #[test]
  fn unknown_event_kind_is_rejected() {
    assert!(matches!(decode_event_kind("merged"), Err(Error::Decode(_))));
  }
}
