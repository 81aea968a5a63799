//! Transfer Error Types
//!
//! `TransferError` is what callers of the engine see. `StoreError` is what
//! a Store Gateway reports; the engine classifies it by the step it failed in.

use rust_decimal::Decimal;
use thiserror::Error;

use super::types::{AccountId, Side};
use crate::money::MoneyError;

/// Transfer failure reasons
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransferError {
    // === Validation Errors (no store access) ===
    #[error("Amount must be greater than zero")]
    InvalidAmount,

    #[error("Amount precision exceeds {max} decimals")]
    PrecisionOverflow { max: u32 },

    #[error("Source and destination account cannot be the same")]
    SameAccount,

    // === Account Errors ===
    #[error("{side} account {account_id} not found")]
    AccountNotFound { side: Side, account_id: AccountId },

    #[error("Insufficient balance: available {available}, requested {requested}")]
    InsufficientBalance {
        available: Decimal,
        requested: Decimal,
    },

    #[error("Destination balance would overflow")]
    Overflow,

    // === Store Errors ===
    #[error("Cannot reach store: {0}")]
    ConnectionFailure(String),

    #[error("Commit failed: {0}")]
    CommitFailure(String),

    #[error("Transfer deadline exceeded")]
    Timeout,

    #[error("Database error: {0}")]
    Database(String),
}

impl TransferError {
    /// Stable error code for logs and API responses
    pub fn code(&self) -> &'static str {
        match self {
            TransferError::InvalidAmount => "INVALID_AMOUNT",
            TransferError::PrecisionOverflow { .. } => "PRECISION_OVERFLOW",
            TransferError::SameAccount => "SAME_ACCOUNT",
            TransferError::AccountNotFound { .. } => "ACCOUNT_NOT_FOUND",
            TransferError::InsufficientBalance { .. } => "INSUFFICIENT_BALANCE",
            TransferError::Overflow => "OVERFLOW",
            TransferError::ConnectionFailure(_) => "CONNECTION_FAILURE",
            TransferError::CommitFailure(_) => "COMMIT_FAILURE",
            TransferError::Timeout => "TIMEOUT",
            TransferError::Database(_) => "DATABASE_ERROR",
        }
    }

    /// Whether retrying the identical transfer later can succeed.
    ///
    /// Input errors and business-rule rejections need the input or a balance
    /// to change first.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            TransferError::ConnectionFailure(_)
                | TransferError::CommitFailure(_)
                | TransferError::Timeout
                | TransferError::Database(_)
        )
    }
}

impl From<MoneyError> for TransferError {
    fn from(e: MoneyError) -> Self {
        match e {
            MoneyError::PrecisionOverflow { max, .. } => TransferError::PrecisionOverflow { max },
            MoneyError::Overflow => TransferError::Overflow,
            MoneyError::InvalidAmount | MoneyError::InvalidFormat(_) => {
                TransferError::InvalidAmount
            }
        }
    }
}

/// Errors reported by a Store Gateway
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// Store unreachable or pool exhausted
    #[error("store unavailable: {0}")]
    Unavailable(String),

    /// Serialization failure or deadlock detected by the store
    #[error("conflict: {0}")]
    Conflict(String),

    /// Lock wait or statement exceeded the session deadline
    #[error("timed out: {0}")]
    Timeout(String),

    #[error("statement failed: {0}")]
    Statement(String),
}

/// PostgreSQL SQLSTATE codes with a dedicated classification
mod sqlstate {
    pub const SERIALIZATION_FAILURE: &str = "40001";
    pub const DEADLOCK_DETECTED: &str = "40P01";
    pub const LOCK_NOT_AVAILABLE: &str = "55P03";
    pub const QUERY_CANCELED: &str = "57014";
}

impl From<sqlx::Error> for StoreError {
    fn from(e: sqlx::Error) -> Self {
        match &e {
            sqlx::Error::Io(_)
            | sqlx::Error::Tls(_)
            | sqlx::Error::PoolTimedOut
            | sqlx::Error::PoolClosed
            | sqlx::Error::WorkerCrashed => StoreError::Unavailable(e.to_string()),
            sqlx::Error::Database(db) => match db.code().as_deref() {
                Some(sqlstate::SERIALIZATION_FAILURE) | Some(sqlstate::DEADLOCK_DETECTED) => {
                    StoreError::Conflict(e.to_string())
                }
                Some(sqlstate::LOCK_NOT_AVAILABLE) | Some(sqlstate::QUERY_CANCELED) => {
                    StoreError::Timeout(e.to_string())
                }
                _ => StoreError::Statement(e.to_string()),
            },
            _ => StoreError::Statement(e.to_string()),
        }
    }
}

impl From<StoreError> for TransferError {
    /// Classification for a failure in the middle of a session
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::Unavailable(msg) => TransferError::ConnectionFailure(msg),
            StoreError::Timeout(_) => TransferError::Timeout,
            StoreError::Conflict(msg) | StoreError::Statement(msg) => TransferError::Database(msg),
        }
    }
}
