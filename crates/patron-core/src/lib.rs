//! Core types and trait definitions for the Patron customer store.
//!
//! Owns the identity rules: identity-key derivation, the active-identity
//! index, and the lifecycle protocol every backend follows. This crate is
//! free of database dependencies; [`memory::MemoryStore`] is a complete
//! in-process backend.

// We intentionally use native `async fn` in traits (stabilised in Rust 1.75).
// Suppress the advisory lint about `Send` bounds on the returned futures.
#![allow(async_fn_in_trait)]

pub mod customer;
pub mod error;
pub mod identity;
pub mod index;
pub mod memory;
pub mod store;
pub mod transition;

pub use error::{Conflict, Error, Result, StoreError};
