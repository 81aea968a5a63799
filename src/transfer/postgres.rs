//! PostgreSQL Store Gateway
//!
//! Each session is one `sqlx` transaction on a pooled connection. Row locks
//! are `SELECT ... FOR UPDATE`; the server-side deadline is set per
//! transaction with `set_config(..., is_local => true)`, so it ends with the
//! transaction and never leaks into the pooled connection.

use async_trait::async_trait;
use rust_decimal::Decimal;
use sqlx::{PgPool, Postgres, Transaction};
use std::time::Duration;
use tracing::debug;

use super::error::StoreError;
use super::gateway::{StoreGateway, StoreSession};
use super::types::{AccountId, TransferRecord};
use crate::account::Account;
use crate::config::TransferConfig;

/// Gateway over a shared connection pool
#[derive(Clone)]
pub struct PgGateway {
    pool: PgPool,
    lock_timeout: Duration,
    statement_timeout: Duration,
}

impl PgGateway {
    pub fn new(pool: PgPool, config: &TransferConfig) -> Self {
        Self {
            pool,
            lock_timeout: config.lock_timeout(),
            statement_timeout: config.timeout(),
        }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait]
impl StoreGateway for PgGateway {
    type Session = PgSession;

    fn name(&self) -> &'static str {
        "PostgreSQL"
    }

    async fn begin(&self) -> Result<PgSession, StoreError> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            "SELECT set_config('lock_timeout', $1, true), set_config('statement_timeout', $2, true)",
        )
        .bind(self.lock_timeout.as_millis().to_string())
        .bind(self.statement_timeout.as_millis().to_string())
        .execute(&mut *tx)
        .await?;

        Ok(PgSession { tx })
    }
}

/// One open PostgreSQL transaction. Dropping it rolls back.
pub struct PgSession {
    tx: Transaction<'static, Postgres>,
}

#[async_trait]
impl StoreSession for PgSession {
    async fn lock_account(&mut self, id: AccountId) -> Result<Option<Account>, StoreError> {
        let account: Option<Account> = sqlx::query_as(
            r#"SELECT id, name, email, balance FROM users WHERE id = $1 FOR UPDATE"#,
        )
        .bind(id)
        .fetch_optional(&mut *self.tx)
        .await?;

        debug!(account_id = id, found = account.is_some(), "Row locked");
        Ok(account)
    }

    async fn adjust_balance(
        &mut self,
        id: AccountId,
        delta: Decimal,
    ) -> Result<Option<Decimal>, StoreError> {
        let balance: Option<Decimal> = sqlx::query_scalar(
            r#"
            UPDATE users SET balance = balance + $1
            WHERE id = $2 AND balance + $1 >= 0
            RETURNING balance
            "#,
        )
        .bind(delta)
        .bind(id)
        .fetch_optional(&mut *self.tx)
        .await?;

        Ok(balance)
    }

    async fn record_transfer(&mut self, record: &TransferRecord) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO transfers (transfer_id, from_user_id, to_user_id, amount, created_at)
            VALUES ($1, $2, $3, $4, $5)
            "#,
        )
        .bind(record.transfer_id.to_string())
        .bind(record.from)
        .bind(record.to)
        .bind(record.amount)
        .bind(record.created_at)
        .execute(&mut *self.tx)
        .await?;

        Ok(())
    }

    async fn commit(self) -> Result<(), StoreError> {
        self.tx.commit().await?;
        Ok(())
    }

    async fn rollback(self) -> Result<(), StoreError> {
        self.tx.rollback().await?;
        Ok(())
    }
}
