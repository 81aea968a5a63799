//! Repository layer for account rows

use super::models::{Account, NewAccount};
use crate::transfer::types::AccountId;
use sqlx::{PgPool, Row};

/// Account repository for insert/select
pub struct AccountRepository;

impl AccountRepository {
    /// Insert a new account, returning its store-assigned id
    ///
    /// Fails with a unique-violation database error when the email is taken.
    pub async fn create(pool: &PgPool, account: &NewAccount) -> Result<AccountId, sqlx::Error> {
        let row = sqlx::query(
            r#"INSERT INTO users (name, email, balance) VALUES ($1, $2, $3) RETURNING id"#,
        )
        .bind(&account.name)
        .bind(&account.email)
        .bind(account.balance)
        .fetch_one(pool)
        .await?;

        let id: AccountId = row.get("id");
        tracing::info!(account_id = id, name = %account.name, "Account created");
        Ok(id)
    }

    /// List all accounts ordered by id
    pub async fn list_all(pool: &PgPool) -> Result<Vec<Account>, sqlx::Error> {
        let rows: Vec<Account> =
            sqlx::query_as(r#"SELECT id, name, email, balance FROM users ORDER BY id"#)
                .fetch_all(pool)
                .await?;

        Ok(rows)
    }

    /// Get account by id (no lock)
    pub async fn get_by_id(pool: &PgPool, id: AccountId) -> Result<Option<Account>, sqlx::Error> {
        let row: Option<Account> =
            sqlx::query_as(r#"SELECT id, name, email, balance FROM users WHERE id = $1"#)
                .bind(id)
                .fetch_optional(pool)
                .await?;

        Ok(row)
    }

    /// Get account by email
    pub async fn get_by_email(pool: &PgPool, email: &str) -> Result<Option<Account>, sqlx::Error> {
        let row: Option<Account> =
            sqlx::query_as(r#"SELECT id, name, email, balance FROM users WHERE email = $1"#)
                .bind(email)
                .fetch_optional(pool)
                .await?;

        Ok(row)
    }
}
