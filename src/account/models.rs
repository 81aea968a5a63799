//! Data models for user accounts

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use crate::transfer::types::AccountId;

/// User account row
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct Account {
    pub id: AccountId,
    pub name: String,
    pub email: String,
    pub balance: Decimal,
}

/// Account to be inserted; the store assigns the identity
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewAccount {
    pub name: String,
    pub email: String,
    pub balance: Decimal,
}

impl NewAccount {
    pub fn new(name: impl Into<String>, email: impl Into<String>, balance: Decimal) -> Self {
        Self {
            name: name.into(),
            email: email.into(),
            balance,
        }
    }

    /// Attach a store-assigned identity
    pub fn with_id(self, id: AccountId) -> Account {
        Account {
            id,
            name: self.name,
            email: self.email,
            balance: self.balance,
        }
    }
}
