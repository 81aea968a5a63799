//! Store Gateway
//!
//! The engine's only view of the store. A gateway hands out transactional
//! sessions; everything a transfer reads or writes goes through one session
//! and becomes visible to others only on `commit`.
//!
//! Dropping a session without calling `commit` MUST discard its writes and
//! release its locks, the same as `rollback`. The engine relies on this when
//! a transfer deadline cancels an in-flight attempt.

use async_trait::async_trait;
use rust_decimal::Decimal;

use super::error::StoreError;
use super::types::{AccountId, TransferRecord};
use crate::account::Account;

/// Source of transactional sessions (normally a connection pool)
#[async_trait]
pub trait StoreGateway: Send + Sync {
    type Session: StoreSession;

    /// Get gateway name for logging
    fn name(&self) -> &'static str;

    /// Open a transactional session
    async fn begin(&self) -> Result<Self::Session, StoreError>;
}

/// One open transaction
#[async_trait]
pub trait StoreSession: Send + Sized {
    /// Read a row and hold an exclusive lock on it until the session ends.
    ///
    /// Blocks while another session holds the lock. `Ok(None)` when no row
    /// has this identity.
    async fn lock_account(&mut self, id: AccountId) -> Result<Option<Account>, StoreError>;

    /// `balance = balance + delta` for one row, only if the result stays
    /// non-negative.
    ///
    /// Returns the new balance, or `None` when no row matched (unknown id or
    /// the guard rejected the update).
    async fn adjust_balance(
        &mut self,
        id: AccountId,
        delta: Decimal,
    ) -> Result<Option<Decimal>, StoreError>;

    /// Append an audit row for this transfer
    async fn record_transfer(&mut self, record: &TransferRecord) -> Result<(), StoreError>;

    /// Make every write of this session durable and visible atomically
    async fn commit(self) -> Result<(), StoreError>;

    /// Discard every write of this session and release its locks
    async fn rollback(self) -> Result<(), StoreError>;
}
