//! Transfer Engine
//!
//! Moves a positive amount between two accounts inside one store session.
//! Either both balances change and the audit row is written, or nothing is.

use chrono::Utc;
use std::time::Duration;
use tracing::{debug, info, warn};

use super::error::TransferError;
use super::gateway::{StoreGateway, StoreSession};
use super::state::TransferState;
use super::types::{AccountId, Side, TransferId, TransferReceipt, TransferRecord, TransferRequest};
use crate::config::TransferConfig;
use crate::money;
use rust_decimal::Decimal;

/// State tracker for one transfer call
struct Attempt {
    transfer_id: TransferId,
    state: TransferState,
}

impl Attempt {
    fn new(transfer_id: TransferId) -> Self {
        Self {
            transfer_id,
            state: TransferState::Started,
        }
    }

    fn advance(&mut self, next: TransferState) {
        debug_assert!(
            self.state.can_transition_to(next),
            "illegal transition {} -> {}",
            self.state,
            next
        );
        debug!(
            transfer_id = %self.transfer_id,
            from = %self.state,
            to = %next,
            "Transfer state"
        );
        self.state = next;
    }
}

/// Executes transfers against a [`StoreGateway`]
pub struct TransferEngine<G: StoreGateway> {
    gateway: G,
    timeout: Duration,
}

impl<G: StoreGateway> TransferEngine<G> {
    pub fn new(gateway: G, config: &TransferConfig) -> Self {
        Self {
            gateway,
            timeout: config.timeout(),
        }
    }

    pub fn gateway(&self) -> &G {
        &self.gateway
    }

    /// Move `amount` from `from` to `to` atomically.
    ///
    /// Input is validated before the store is touched. Every failure after
    /// the session opens is rolled back before this returns.
    ///
    /// The deadline covers everything up to commit: when it passes, the
    /// in-flight session is dropped, which rolls it back. `commit` itself
    /// runs outside the deadline, since abandoning it would leave the
    /// outcome unknown; the store's own statement timeout bounds it.
    pub async fn transfer(
        &self,
        from: AccountId,
        to: AccountId,
        amount: Decimal,
    ) -> Result<TransferReceipt, TransferError> {
        let request = Self::validate(TransferRequest::new(from, to, amount))?;
        let mut attempt = Attempt::new(TransferId::new());
        self.run(&mut attempt, &request).await
    }

    fn validate(request: TransferRequest) -> Result<TransferRequest, TransferError> {
        let amount = money::validate_amount(request.amount)?;
        if request.from == request.to {
            return Err(TransferError::SameAccount);
        }
        Ok(TransferRequest { amount, ..request })
    }

    async fn run(
        &self,
        attempt: &mut Attempt,
        request: &TransferRequest,
    ) -> Result<TransferReceipt, TransferError> {
        let transfer_id = attempt.transfer_id;

        let prepared = tokio::time::timeout(self.timeout, self.prepare(attempt, request)).await;
        let (session, receipt) = match prepared {
            Ok(result) => result?,
            Err(_) => {
                if !attempt.state.is_terminal() {
                    attempt.advance(TransferState::Aborted);
                }
                warn!(
                    transfer_id = %transfer_id,
                    from = request.from,
                    to = request.to,
                    timeout_ms = self.timeout.as_millis() as u64,
                    "Transfer deadline exceeded, session rolled back"
                );
                return Err(TransferError::Timeout);
            }
        };

        if let Err(e) = session.commit().await {
            attempt.advance(TransferState::Aborted);
            warn!(transfer_id = %transfer_id, error = %e, "Commit failed");
            return Err(TransferError::CommitFailure(e.to_string()));
        }
        attempt.advance(TransferState::Committed);

        info!(
            transfer_id = %transfer_id,
            from = request.from,
            to = request.to,
            amount = %request.amount,
            "Transfer committed"
        );
        Ok(receipt)
    }

    /// Open a session and stage every write; the session is returned uncommitted
    async fn prepare(
        &self,
        attempt: &mut Attempt,
        request: &TransferRequest,
    ) -> Result<(G::Session, TransferReceipt), TransferError> {
        let transfer_id = attempt.transfer_id;

        let mut session = match self.gateway.begin().await {
            Ok(session) => session,
            Err(e) => {
                attempt.advance(TransferState::Aborted);
                warn!(
                    transfer_id = %transfer_id,
                    gateway = self.gateway.name(),
                    error = %e,
                    "Failed to open session"
                );
                return Err(TransferError::ConnectionFailure(e.to_string()));
            }
        };

        match Self::apply(&mut session, attempt, request).await {
            Ok(receipt) => Ok((session, receipt)),
            Err(e) => {
                if let Err(rb) = session.rollback().await {
                    // The session is gone either way; the store discards its writes
                    warn!(transfer_id = %transfer_id, error = %rb, "Rollback failed");
                }
                attempt.advance(TransferState::Aborted);
                info!(
                    transfer_id = %transfer_id,
                    from = request.from,
                    to = request.to,
                    amount = %request.amount,
                    code = e.code(),
                    "Transfer aborted"
                );
                Err(e)
            }
        }
    }

    async fn apply(
        session: &mut G::Session,
        attempt: &mut Attempt,
        request: &TransferRequest,
    ) -> Result<TransferReceipt, TransferError> {
        attempt.advance(TransferState::Locking);

        let mut source = None;
        let mut destination = None;
        for id in request.lock_order() {
            let row = session.lock_account(id).await?;
            match request.side_of(id) {
                Side::Source => source = row,
                Side::Destination => destination = row,
            }
        }

        let source = source.ok_or(TransferError::AccountNotFound {
            side: Side::Source,
            account_id: request.from,
        })?;
        let destination = destination.ok_or(TransferError::AccountNotFound {
            side: Side::Destination,
            account_id: request.to,
        })?;

        let insufficient = || TransferError::InsufficientBalance {
            available: source.balance,
            requested: request.amount,
        };
        if source.balance < request.amount {
            return Err(insufficient());
        }
        if destination.balance.checked_add(request.amount).is_none() {
            return Err(TransferError::Overflow);
        }
        attempt.advance(TransferState::Validated);

        attempt.advance(TransferState::Mutating);
        let from_balance = session
            .adjust_balance(request.from, -request.amount)
            .await?
            .ok_or_else(insufficient)?;
        let to_balance = session
            .adjust_balance(request.to, request.amount)
            .await?
            .ok_or(TransferError::AccountNotFound {
                side: Side::Destination,
                account_id: request.to,
            })?;

        let record = TransferRecord {
            transfer_id: attempt.transfer_id,
            from: request.from,
            to: request.to,
            amount: request.amount,
            created_at: Utc::now(),
        };
        session.record_transfer(&record).await?;

        Ok(TransferReceipt {
            transfer_id: record.transfer_id,
            from: record.from,
            to: record.to,
            amount: record.amount,
            from_balance,
            to_balance,
            created_at: record.created_at,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::account::{Account, NewAccount};
    use crate::transfer::error::StoreError;
    use crate::transfer::memory::{MemoryGateway, MemorySession};
    use async_trait::async_trait;
    use rust_decimal_macros::dec;

    /// Memory store with scripted misbehaviour the store itself never shows
    struct ScriptedGateway {
        inner: MemoryGateway,
        /// Sleep after a successful commit
        commit_delay: Duration,
        /// Credit updates match no row
        miss_credit: bool,
    }

    struct ScriptedSession {
        inner: MemorySession,
        commit_delay: Duration,
        miss_credit: bool,
    }

    #[async_trait]
    impl StoreGateway for ScriptedGateway {
        type Session = ScriptedSession;

        fn name(&self) -> &'static str {
            "Scripted"
        }

        async fn begin(&self) -> Result<ScriptedSession, StoreError> {
            Ok(ScriptedSession {
                inner: self.inner.begin().await?,
                commit_delay: self.commit_delay,
                miss_credit: self.miss_credit,
            })
        }
    }

    #[async_trait]
    impl StoreSession for ScriptedSession {
        async fn lock_account(&mut self, id: AccountId) -> Result<Option<Account>, StoreError> {
            self.inner.lock_account(id).await
        }

        async fn adjust_balance(
            &mut self,
            id: AccountId,
            delta: Decimal,
        ) -> Result<Option<Decimal>, StoreError> {
            if self.miss_credit && delta > Decimal::ZERO {
                return Ok(None);
            }
            self.inner.adjust_balance(id, delta).await
        }

        async fn record_transfer(&mut self, record: &TransferRecord) -> Result<(), StoreError> {
            self.inner.record_transfer(record).await
        }

        async fn commit(self) -> Result<(), StoreError> {
            self.inner.commit().await?;
            tokio::time::sleep(self.commit_delay).await;
            Ok(())
        }

        async fn rollback(self) -> Result<(), StoreError> {
            self.inner.rollback().await
        }
    }

    fn pair(a: Decimal, b: Decimal) -> (MemoryGateway, AccountId, AccountId) {
        let gateway = MemoryGateway::new();
        let x = gateway.insert(NewAccount::new("A", "a@x", a)).unwrap();
        let y = gateway.insert(NewAccount::new("B", "b@x", b)).unwrap();
        (gateway, x, y)
    }

    async fn setup() -> (TransferEngine<MemoryGateway>, AccountId, AccountId) {
        let gateway = MemoryGateway::new();
        let a = gateway
            .insert(NewAccount::new("Zhamilya", "z_kozhagulova@kbtu.kz", dec!(5000)))
            .unwrap();
        let b = gateway
            .insert(NewAccount::new("Assel", "a_derbisova@nu.edu.kz", dec!(3500)))
            .unwrap();
        (
            TransferEngine::new(gateway, &TransferConfig::default()),
            a,
            b,
        )
    }

    #[tokio::test]
    async fn test_transfer_success_returns_receipt() {
        let (engine, a, b) = setup().await;

        let receipt = engine.transfer(a, b, dec!(500)).await.unwrap();
        assert_eq!(receipt.from, a);
        assert_eq!(receipt.to, b);
        assert_eq!(receipt.amount, dec!(500));
        assert_eq!(receipt.from_balance, dec!(4500));
        assert_eq!(receipt.to_balance, dec!(4000));
    }

    #[tokio::test]
    async fn test_invalid_amount_never_opens_session() {
        let (engine, a, b) = setup().await;

        for amount in [dec!(0), dec!(-1), dec!(-0.01)] {
            let err = engine.transfer(a, b, amount).await.unwrap_err();
            assert_eq!(err, TransferError::InvalidAmount);
        }
        assert_eq!(engine.gateway().begin_count(), 0);
    }

    #[tokio::test]
    async fn test_precision_overflow_rejected() {
        let (engine, a, b) = setup().await;

        let err = engine.transfer(a, b, dec!(0.001)).await.unwrap_err();
        assert_eq!(err, TransferError::PrecisionOverflow { max: 2 });
        assert_eq!(engine.gateway().begin_count(), 0);
    }

    #[tokio::test]
    async fn test_self_transfer_rejected() {
        let (engine, a, _) = setup().await;

        let err = engine.transfer(a, a, dec!(1)).await.unwrap_err();
        assert_eq!(err, TransferError::SameAccount);
        assert_eq!(engine.gateway().begin_count(), 0);
    }

    #[tokio::test]
    async fn test_begin_failure_is_connection_failure() {
        let (engine, a, b) = setup().await;
        engine.gateway().set_fail_begin(true);

        let err = engine.transfer(a, b, dec!(1)).await.unwrap_err();
        assert!(matches!(err, TransferError::ConnectionFailure(_)));
        assert!(err.is_retryable());
    }

    #[tokio::test]
    async fn test_deadline_rolls_back() {
        let gateway = MemoryGateway::new();
        let a = gateway.insert(NewAccount::new("A", "a@x", dec!(10))).unwrap();
        let b = gateway.insert(NewAccount::new("B", "b@x", dec!(0))).unwrap();
        let engine = TransferEngine::new(
            gateway.clone(),
            &TransferConfig {
                timeout_ms: 50,
                lock_timeout_ms: 50,
            },
        );

        // Hold b's row lock in another session so the engine blocks on it
        let mut blocker = gateway.begin().await.unwrap();
        blocker.lock_account(b).await.unwrap();

        let err = engine.transfer(a, b, dec!(5)).await.unwrap_err();
        assert_eq!(err, TransferError::Timeout);

        blocker.rollback().await.unwrap();
        assert_eq!(gateway.balance(a).await, Some(dec!(10)));
        assert_eq!(gateway.balance(b).await, Some(dec!(0)));
    }

    #[tokio::test]
    async fn test_slow_commit_is_not_reported_as_timeout() {
        let (memory, a, b) = pair(dec!(10), dec!(0));
        let engine = TransferEngine::new(
            ScriptedGateway {
                inner: memory.clone(),
                commit_delay: Duration::from_millis(200),
                miss_credit: false,
            },
            &TransferConfig {
                timeout_ms: 50,
                lock_timeout_ms: 50,
            },
        );

        let receipt = engine.transfer(a, b, dec!(10)).await.unwrap();
        assert_eq!(receipt.from_balance, dec!(0));
        assert_eq!(memory.balance(a).await, Some(dec!(0)));
        assert_eq!(memory.balance(b).await, Some(dec!(10)));
        assert_eq!(memory.transfers().len(), 1);
    }

    #[tokio::test]
    async fn test_record_failure_rolls_back_staged_debit_and_credit() {
        let (gateway, a, b) = pair(dec!(100), dec!(50));
        let engine = TransferEngine::new(gateway.clone(), &TransferConfig::default());
        gateway.fail_next_record();

        let mut attempt = Attempt::new(TransferId::new());
        let request = TransferRequest::new(a, b, dec!(30));
        let err = engine.run(&mut attempt, &request).await.unwrap_err();

        assert!(matches!(err, TransferError::Database(_)));
        assert_eq!(attempt.state, TransferState::Aborted);
        assert_eq!(gateway.balance(a).await, Some(dec!(100)));
        assert_eq!(gateway.balance(b).await, Some(dec!(50)));
        assert!(gateway.transfers().is_empty());
    }

    #[tokio::test]
    async fn test_successful_attempt_ends_committed() {
        let (gateway, a, b) = pair(dec!(100), dec!(0));
        let engine = TransferEngine::new(gateway, &TransferConfig::default());

        let mut attempt = Attempt::new(TransferId::new());
        let request = TransferRequest::new(a, b, dec!(1));
        engine.run(&mut attempt, &request).await.unwrap();
        assert_eq!(attempt.state, TransferState::Committed);
    }

    #[tokio::test]
    async fn test_destination_overflow_rejected_without_mutation() {
        let (gateway, a, b) = pair(dec!(100), Decimal::MAX);
        let engine = TransferEngine::new(gateway.clone(), &TransferConfig::default());

        let err = engine.transfer(a, b, dec!(1)).await.unwrap_err();
        assert_eq!(err, TransferError::Overflow);
        assert_eq!(gateway.balance(a).await, Some(dec!(100)));
        assert_eq!(gateway.balance(b).await, Some(Decimal::MAX));
        assert!(gateway.transfers().is_empty());
    }

    #[tokio::test]
    async fn test_credit_matching_no_row_reports_destination() {
        let (memory, a, b) = pair(dec!(100), dec!(0));
        let engine = TransferEngine::new(
            ScriptedGateway {
                inner: memory.clone(),
                commit_delay: Duration::ZERO,
                miss_credit: true,
            },
            &TransferConfig::default(),
        );

        let err = engine.transfer(a, b, dec!(40)).await.unwrap_err();
        assert_eq!(
            err,
            TransferError::AccountNotFound {
                side: Side::Destination,
                account_id: b
            }
        );
        assert_eq!(memory.balance(a).await, Some(dec!(100)));
        assert!(memory.transfers().is_empty());
    }

    #[tokio::test]
    async fn test_lock_timeout_mid_session_maps_to_timeout() {
        let (gateway, a, b) = pair(dec!(10), dec!(0));
        gateway.set_lock_timeout(Duration::from_millis(20));
        let engine = TransferEngine::new(gateway.clone(), &TransferConfig::default());

        let mut blocker = gateway.begin().await.unwrap();
        blocker.lock_account(b).await.unwrap();

        let err = engine.transfer(a, b, dec!(5)).await.unwrap_err();
        assert_eq!(err, TransferError::Timeout);
        assert!(err.is_retryable());

        blocker.rollback().await.unwrap();
        assert_eq!(gateway.balance(a).await, Some(dec!(10)));
        assert_eq!(gateway.balance(b).await, Some(dec!(0)));
    }
}
