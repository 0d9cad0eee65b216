//! Administrative commands for the Patron customer store.
//!
//! Every command goes through [`patron_core::store::CustomerStore`]; nothing
//! here writes to storage directly.

pub mod commands;
pub mod config;

pub use commands::{CustomerCommand, run};
pub use config::AdminConfig;
