//! SQLite backend for the Patron customer store.
//!
//! Wraps [`tokio_rusqlite`] so all database access runs on a dedicated thread
//! without blocking the async runtime. Every lifecycle operation runs in one
//! `IMMEDIATE` transaction; the active-identity index is a table updated in
//! that same transaction, and a partial unique index on `customers` rejects
//! two active rows with the same identity even outside this crate.

mod encode;
mod identities;
mod schema;
mod store;

pub mod error;

pub use error::{Error, Result};
pub use identities::Divergence;
pub use store::SqliteStore;
