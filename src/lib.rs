//! minledger - Minimal Ledger
//!
//! User accounts with fixed-point balances and atomic transfers between them,
//! backed by PostgreSQL.
//!
//! # Modules
//!
//! - [`transfer`] - Transfer Engine and the Store Gateway it runs on
//! - [`account`] - Account models and insert/select helpers
//! - [`money`] - Fixed-point amount parsing and validation
//! - [`db`] - Bounded PostgreSQL connection pool
//! - [`config`] - YAML configuration
//! - [`logging`] - Tracing subscriber setup
//!
//! # Example
//!
//! ```
//! use minledger::account::NewAccount;
//! use minledger::config::TransferConfig;
//! use minledger::transfer::{MemoryGateway, TransferEngine};
//! use rust_decimal::Decimal;
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() {
//! let gateway = MemoryGateway::new();
//! let from = gateway.insert(NewAccount::new("Zhamilya", "z@example.com", Decimal::from(5000))).unwrap();
//! let to = gateway.insert(NewAccount::new("Assel", "a@example.com", Decimal::from(3500))).unwrap();
//!
//! let engine = TransferEngine::new(gateway.clone(), &TransferConfig::default());
//! engine.transfer(from, to, Decimal::from(500)).await.unwrap();
//!
//! assert_eq!(gateway.balance(from).await, Some(Decimal::from(4500)));
//! # }
//! ```

pub mod account;
pub mod config;
pub mod db;
pub mod logging;
pub mod money;
pub mod transfer;

// Convenient re-exports at crate root
pub use account::{Account, AccountRepository, NewAccount};
pub use config::AppConfig;
pub use db::Database;
pub use transfer::{
    AccountId, MemoryGateway, PgGateway, Side, StoreGateway, StoreSession, TransferEngine,
    TransferError, TransferReceipt,
};
