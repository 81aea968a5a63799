//! In-memory Store Gateway
//!
//! Same contract as the PostgreSQL gateway, backed by a map of rows. Each
//! row sits behind a `tokio::sync::Mutex`, so `lock_account` blocks exactly
//! like `SELECT ... FOR UPDATE` does. Writes are staged in the session and
//! applied on commit while the row locks are still held.
//!
//! Used by tests and by anything that needs a deterministic store. Fault
//! injection (`set_fail_begin`, `fail_next_record`, `fail_next_commit`), a
//! per-lock delay (`set_lock_delay`) and a lock wait limit
//! (`set_lock_timeout`) exercise the engine's failure and contention paths.

use async_trait::async_trait;
use rust_decimal::Decimal;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicI64, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::{Mutex as RowLock, OwnedMutexGuard};

use super::error::StoreError;
use super::gateway::{StoreGateway, StoreSession};
use super::types::{AccountId, TransferRecord};
use crate::account::{Account, NewAccount};

#[derive(Default)]
struct Table {
    rows: BTreeMap<AccountId, Arc<RowLock<Account>>>,
    emails: HashSet<String>,
}

#[derive(Default)]
struct MemoryStore {
    table: Mutex<Table>,
    transfers: Mutex<Vec<TransferRecord>>,
    next_id: AtomicI64,
    begin_count: AtomicUsize,
    fail_begin: AtomicBool,
    fail_record: AtomicBool,
    fail_commit: AtomicBool,
    lock_delay_ms: AtomicU64,
    /// 0 waits forever
    lock_timeout_ms: AtomicU64,
}

impl MemoryStore {
    fn row(&self, id: AccountId) -> Option<Arc<RowLock<Account>>> {
        self.table.lock().unwrap().rows.get(&id).cloned()
    }
}

/// Cloneable handle; clones share the same rows
#[derive(Clone, Default)]
pub struct MemoryGateway {
    store: Arc<MemoryStore>,
}

impl MemoryGateway {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert an account, assigning the next identity (starting at 1).
    ///
    /// Rejects a duplicate email the way a unique constraint would.
    pub fn insert(&self, account: NewAccount) -> Result<AccountId, StoreError> {
        let mut table = self.store.table.lock().unwrap();
        if !table.emails.insert(account.email.clone()) {
            return Err(StoreError::Statement(format!(
                "duplicate key value violates unique constraint: email {}",
                account.email
            )));
        }

        let id = self.store.next_id.fetch_add(1, Ordering::SeqCst) + 1;
        table.rows.insert(id, Arc::new(RowLock::new(account.with_id(id))));
        Ok(id)
    }

    /// Committed balance of `id`; waits for any session holding its lock
    pub async fn balance(&self, id: AccountId) -> Option<Decimal> {
        let row = self.store.row(id)?;
        let account = row.lock().await;
        Some(account.balance)
    }

    /// Committed snapshot of every account, ordered by id
    pub async fn accounts(&self) -> Vec<Account> {
        let rows: Vec<_> = self.store.table.lock().unwrap().rows.values().cloned().collect();
        let mut accounts = Vec::with_capacity(rows.len());
        for row in rows {
            accounts.push(row.lock().await.clone());
        }
        accounts
    }

    /// Committed audit rows in commit order
    pub fn transfers(&self) -> Vec<TransferRecord> {
        self.store.transfers.lock().unwrap().clone()
    }

    /// Number of sessions opened so far
    pub fn begin_count(&self) -> usize {
        self.store.begin_count.load(Ordering::SeqCst)
    }

    pub fn set_fail_begin(&self, fail: bool) {
        self.store.fail_begin.store(fail, Ordering::SeqCst);
    }

    /// Make the next audit insert fail (one-shot)
    pub fn fail_next_record(&self) {
        self.store.fail_record.store(true, Ordering::SeqCst);
    }

    /// Make the next commit fail (one-shot)
    pub fn fail_next_commit(&self) {
        self.store.fail_commit.store(true, Ordering::SeqCst);
    }

    /// Sleep after every lock acquisition, widening contention windows
    pub fn set_lock_delay(&self, delay: Duration) {
        self.store
            .lock_delay_ms
            .store(delay.as_millis() as u64, Ordering::SeqCst);
    }

    /// Give up on a row lock after `timeout`, like PostgreSQL `lock_timeout`
    pub fn set_lock_timeout(&self, timeout: Duration) {
        self.store
            .lock_timeout_ms
            .store(timeout.as_millis() as u64, Ordering::SeqCst);
    }
}

#[async_trait]
impl StoreGateway for MemoryGateway {
    type Session = MemorySession;

    fn name(&self) -> &'static str {
        "Memory"
    }

    async fn begin(&self) -> Result<MemorySession, StoreError> {
        self.store.begin_count.fetch_add(1, Ordering::SeqCst);
        if self.store.fail_begin.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("Mock begin failure".to_string()));
        }

        Ok(MemorySession {
            store: Arc::clone(&self.store),
            locked: HashMap::new(),
            staged: HashMap::new(),
            records: Vec::new(),
        })
    }
}

/// Open in-memory transaction. Dropping it releases locks and discards writes.
pub struct MemorySession {
    store: Arc<MemoryStore>,
    locked: HashMap<AccountId, OwnedMutexGuard<Account>>,
    staged: HashMap<AccountId, Decimal>,
    records: Vec<TransferRecord>,
}

impl MemorySession {
    /// Row as this session sees it (staged writes applied)
    fn view(&self, id: AccountId) -> Option<Account> {
        let guard = self.locked.get(&id)?;
        let mut account = (**guard).clone();
        if let Some(balance) = self.staged.get(&id) {
            account.balance = *balance;
        }
        Some(account)
    }
}

#[async_trait]
impl StoreSession for MemorySession {
    async fn lock_account(&mut self, id: AccountId) -> Result<Option<Account>, StoreError> {
        if self.locked.contains_key(&id) {
            return Ok(self.view(id));
        }

        let Some(row) = self.store.row(id) else {
            return Ok(None);
        };
        let limit = self.store.lock_timeout_ms.load(Ordering::SeqCst);
        let guard = if limit > 0 {
            tokio::time::timeout(Duration::from_millis(limit), row.lock_owned())
                .await
                .map_err(|_| {
                    StoreError::Timeout(format!(
                        "canceling statement due to lock timeout on row {}",
                        id
                    ))
                })?
        } else {
            row.lock_owned().await
        };
        self.locked.insert(id, guard);

        let delay = self.store.lock_delay_ms.load(Ordering::SeqCst);
        if delay > 0 {
            tokio::time::sleep(Duration::from_millis(delay)).await;
        }

        Ok(self.view(id))
    }

    async fn adjust_balance(
        &mut self,
        id: AccountId,
        delta: Decimal,
    ) -> Result<Option<Decimal>, StoreError> {
        let Some(current) = self.view(id) else {
            if self.store.row(id).is_none() {
                return Ok(None);
            }
            return Err(StoreError::Statement(format!(
                "row {} updated without holding its lock",
                id
            )));
        };

        let updated = current
            .balance
            .checked_add(delta)
            .ok_or_else(|| StoreError::Statement("numeric field overflow".to_string()))?;
        if updated < Decimal::ZERO {
            return Ok(None);
        }

        self.staged.insert(id, updated);
        Ok(Some(updated))
    }

    async fn record_transfer(&mut self, record: &TransferRecord) -> Result<(), StoreError> {
        if self.store.fail_record.swap(false, Ordering::SeqCst) {
            return Err(StoreError::Statement("Mock record failure".to_string()));
        }
        self.records.push(record.clone());
        Ok(())
    }

    async fn commit(mut self) -> Result<(), StoreError> {
        if self.store.fail_commit.swap(false, Ordering::SeqCst) {
            return Err(StoreError::Conflict("Mock commit failure".to_string()));
        }

        for (id, balance) in self.staged.drain() {
            if let Some(guard) = self.locked.get_mut(&id) {
                guard.balance = balance;
            }
        }
        self.store
            .transfers
            .lock()
            .unwrap()
            .append(&mut self.records);
        Ok(())
    }

    async fn rollback(self) -> Result<(), StoreError> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn gateway_with(balances: &[Decimal]) -> (MemoryGateway, Vec<AccountId>) {
        let gateway = MemoryGateway::new();
        let ids = balances
            .iter()
            .enumerate()
            .map(|(i, balance)| {
                gateway
                    .insert(NewAccount::new(
                        format!("user{}", i),
                        format!("user{}@example.com", i),
                        *balance,
                    ))
                    .unwrap()
            })
            .collect();
        (gateway, ids)
    }

    #[test]
    fn test_insert_assigns_sequential_ids() {
        let (_, ids) = gateway_with(&[dec!(1), dec!(2), dec!(3)]);
        assert_eq!(ids, vec![1, 2, 3]);
    }

    #[test]
    fn test_insert_rejects_duplicate_email() {
        let gateway = MemoryGateway::new();
        gateway
            .insert(NewAccount::new("a", "same@example.com", dec!(0)))
            .unwrap();
        let result = gateway.insert(NewAccount::new("b", "same@example.com", dec!(0)));
        assert!(matches!(result, Err(StoreError::Statement(_))));
    }

    #[tokio::test]
    async fn test_lock_unknown_row_is_none() {
        let (gateway, _) = gateway_with(&[dec!(1)]);
        let mut session = gateway.begin().await.unwrap();
        assert!(session.lock_account(99).await.unwrap().is_none());
        assert_eq!(session.adjust_balance(99, dec!(1)).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_commit_applies_staged_writes() {
        let (gateway, ids) = gateway_with(&[dec!(100)]);
        let mut session = gateway.begin().await.unwrap();
        session.lock_account(ids[0]).await.unwrap();

        let updated = session.adjust_balance(ids[0], dec!(-40)).await.unwrap();
        assert_eq!(updated, Some(dec!(60)));
        session.commit().await.unwrap();

        assert_eq!(gateway.balance(ids[0]).await, Some(dec!(60)));
    }

    #[tokio::test]
    async fn test_rollback_and_drop_discard_writes() {
        let (gateway, ids) = gateway_with(&[dec!(100)]);

        let mut session = gateway.begin().await.unwrap();
        session.lock_account(ids[0]).await.unwrap();
        session.adjust_balance(ids[0], dec!(-40)).await.unwrap();
        session.rollback().await.unwrap();
        assert_eq!(gateway.balance(ids[0]).await, Some(dec!(100)));

        let mut session = gateway.begin().await.unwrap();
        session.lock_account(ids[0]).await.unwrap();
        session.adjust_balance(ids[0], dec!(-40)).await.unwrap();
        drop(session);
        assert_eq!(gateway.balance(ids[0]).await, Some(dec!(100)));
    }

    #[tokio::test]
    async fn test_guard_rejects_negative_balance() {
        let (gateway, ids) = gateway_with(&[dec!(10)]);
        let mut session = gateway.begin().await.unwrap();
        session.lock_account(ids[0]).await.unwrap();
        assert_eq!(session.adjust_balance(ids[0], dec!(-10.01)).await.unwrap(), None);
        assert_eq!(
            session.adjust_balance(ids[0], dec!(-10)).await.unwrap(),
            Some(dec!(0))
        );
    }

    #[tokio::test]
    async fn test_update_without_lock_is_error() {
        let (gateway, ids) = gateway_with(&[dec!(10)]);
        let mut session = gateway.begin().await.unwrap();
        let result = session.adjust_balance(ids[0], dec!(1)).await;
        assert!(matches!(result, Err(StoreError::Statement(_))));
    }

    #[tokio::test]
    async fn test_lock_blocks_other_session_until_release() {
        let (gateway, ids) = gateway_with(&[dec!(10)]);
        let id = ids[0];

        let mut first = gateway.begin().await.unwrap();
        first.lock_account(id).await.unwrap();

        let contender = gateway.clone();
        let handle = tokio::spawn(async move {
            let mut second = contender.begin().await.unwrap();
            second.lock_account(id).await.unwrap().map(|a| a.balance)
        });

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!handle.is_finished(), "second session must wait for the lock");

        first.adjust_balance(id, dec!(5)).await.unwrap();
        first.commit().await.unwrap();

        assert_eq!(handle.await.unwrap(), Some(dec!(15)));
    }

    #[tokio::test]
    async fn test_fail_next_commit_is_one_shot() {
        let (gateway, ids) = gateway_with(&[dec!(10)]);
        gateway.fail_next_commit();

        let mut session = gateway.begin().await.unwrap();
        session.lock_account(ids[0]).await.unwrap();
        session.adjust_balance(ids[0], dec!(1)).await.unwrap();
        assert!(matches!(
            session.commit().await,
            Err(StoreError::Conflict(_))
        ));
        assert_eq!(gateway.balance(ids[0]).await, Some(dec!(10)));

        let session = gateway.begin().await.unwrap();
        assert!(session.commit().await.is_ok());
    }

    #[tokio::test]
    async fn test_lock_timeout_gives_up() {
        let (gateway, ids) = gateway_with(&[dec!(10)]);
        gateway.set_lock_timeout(Duration::from_millis(20));

        let mut first = gateway.begin().await.unwrap();
        first.lock_account(ids[0]).await.unwrap();

        let mut second = gateway.begin().await.unwrap();
        let result = second.lock_account(ids[0]).await;
        assert!(matches!(result, Err(StoreError::Timeout(_))));
    }

    #[tokio::test]
    async fn test_fail_next_record_is_one_shot() {
        let (gateway, ids) = gateway_with(&[dec!(10), dec!(0)]);
        gateway.fail_next_record();
        let record = TransferRecord {
            transfer_id: crate::transfer::TransferId::new(),
            from: ids[0],
            to: ids[1],
            amount: dec!(1),
            created_at: chrono::Utc::now(),
        };

        let mut session = gateway.begin().await.unwrap();
        assert!(session.record_transfer(&record).await.is_err());
        assert!(session.record_transfer(&record).await.is_ok());
    }
}
