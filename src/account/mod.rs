//! Account management module
//!
//! PostgreSQL-backed insert/select helpers for user accounts. Balances are
//! only ever mutated by the Transfer Engine.

pub mod models;
pub mod repository;

// Re-export commonly used types
pub use models::{Account, NewAccount};
pub use repository::AccountRepository;

// Re-export Database from top-level db module
pub use crate::db::Database;
