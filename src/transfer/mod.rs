//! Transfer Engine
//!
//! Atomic balance moves between two accounts in one store transaction.
//!
//! # Architecture
//!
//! The engine talks to the store only through the [`StoreGateway`] /
//! [`StoreSession`] traits:
//! - **PostgreSQL** ([`PgGateway`]) for production
//! - **Memory** ([`MemoryGateway`]) for deterministic tests
//!
//! # State Machine
//!
//! ```text
//! STARTED → LOCKING → VALIDATED → MUTATING → COMMITTED
//!                 (any non-terminal) → ABORTED
//! ```
//!
//! # Safety Invariants
//!
//! 1. **All-or-Nothing**: both balances and the audit row commit together or not at all
//! 2. **Identity Lock Order**: rows are locked lowest id first, never by role
//! 3. **Validate-Before-Access**: bad amounts and self-transfers never open a session
//! 4. **Rollback-Before-Return**: no failure leaves a transaction open

pub mod engine;
pub mod error;
pub mod gateway;
pub mod memory;
pub mod postgres;
pub mod state;
pub mod types;

// Re-exports for convenience
pub use engine::TransferEngine;
pub use error::{StoreError, TransferError};
pub use gateway::{StoreGateway, StoreSession};
pub use memory::MemoryGateway;
pub use postgres::PgGateway;
pub use state::TransferState;
pub use types::{AccountId, Side, TransferId, TransferReceipt, TransferRecord, TransferRequest};
