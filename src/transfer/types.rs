//! Transfer Core Types

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Store-assigned account identity (`users.id`)
pub type AccountId = i64;

/// Transfer ID - ULID-based unique identifier
///
/// Sortable by creation time, generated without coordination.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TransferId(ulid::Ulid);

impl TransferId {
    /// Generate a new unique TransferId
    pub fn new() -> Self {
        Self(ulid::Ulid::new())
    }

    /// Get the inner ULID value
    pub fn inner(&self) -> ulid::Ulid {
        self.0
    }
}

impl Default for TransferId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for TransferId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for TransferId {
    type Err = ulid::DecodeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(ulid::Ulid::from_string(s)?))
    }
}

/// Which leg of a transfer an account plays
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Side {
    Source,
    Destination,
}

impl Side {
    pub fn as_str(&self) -> &'static str {
        match self {
            Side::Source => "source",
            Side::Destination => "destination",
        }
    }
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Caller's request: move `amount` from `from` to `to`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferRequest {
    pub from: AccountId,
    pub to: AccountId,
    pub amount: Decimal,
}

impl TransferRequest {
    pub fn new(from: AccountId, to: AccountId, amount: Decimal) -> Self {
        Self { from, to, amount }
    }

    /// Row lock acquisition order: ascending identity, independent of role.
    ///
    /// Every transfer touching the same pair locks it in the same order, so
    /// `A -> B` and `B -> A` running together cannot deadlock.
    pub fn lock_order(&self) -> [AccountId; 2] {
        if self.from <= self.to {
            [self.from, self.to]
        } else {
            [self.to, self.from]
        }
    }

    /// Role of `id` in this request
    pub fn side_of(&self, id: AccountId) -> Side {
        if id == self.from {
            Side::Source
        } else {
            Side::Destination
        }
    }
}

/// Immutable audit row, written in the same transaction as the balance moves
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferRecord {
    pub transfer_id: TransferId,
    pub from: AccountId,
    pub to: AccountId,
    pub amount: Decimal,
    pub created_at: DateTime<Utc>,
}

/// Confirmation of a committed transfer
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferReceipt {
    pub transfer_id: TransferId,
    pub from: AccountId,
    pub to: AccountId,
    pub amount: Decimal,
    /// Source balance after commit
    pub from_balance: Decimal,
    /// Destination balance after commit
    pub to_balance: Decimal,
    pub created_at: DateTime<Utc>,
}
