//! Point ledger: per-user balances with an append-only transaction history,
//! serialized per user through the key lock registry.

pub mod config;
pub mod http;
pub mod locks;
pub mod observability;
pub mod state_file;
pub mod store;

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use locks::{KeyLockGuard, KeyLockRegistry};
use observability::{Observability, ObservabilitySnapshot};
use store::{BalanceStore, HistoryStore};

pub use config::LedgerConfig;
pub use http::LedgerHttpState;
pub use state_file::{AccountRecord, LedgerStateFile};
pub use store::{MemoryBalanceStore, MemoryHistoryStore};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserBalance {
    pub id: i64,
    pub amount: i64,
    pub updated_at_ms: u64,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum TransactionKind {
    Charge,
    Use,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionRecord {
    pub id: u64,
    pub user_id: i64,
    pub amount: i64,
    pub kind: TransactionKind,
    pub ts_ms: u64,
}

#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("user not found: {id}")]
    UserNotFound { id: i64 },
    #[error("invalid amount: {amount} (accepted per-operation range is 1..={max})")]
    InvalidAmount { amount: i64, max: i64 },
    #[error("insufficient balance: requested {requested}, available {available}")]
    InsufficientBalance { requested: i64, available: i64 },
    #[error("lock wait for user {id} timed out after {waited_ms}ms")]
    LockTimeout { id: i64, waited_ms: u64 },
}

pub trait Clock: Send + Sync {
    fn now_epoch_millis(&self) -> u64;
}

#[derive(Debug, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_epoch_millis(&self) -> u64 {
        std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .map(|now| now.as_millis() as u64)
            .unwrap_or(0)
    }
}

/// The four ledger operations plus account seeding. Every operation runs its
/// whole body (lookup, validation, mutation, history append, persist) while
/// holding the user's exclusive lock, so operations on one user are totally
/// ordered and operations on different users never contend.
pub struct PointLedger {
    config: LedgerConfig,
    locks: KeyLockRegistry,
    balances: Arc<dyn BalanceStore>,
    records: Arc<dyn HistoryStore>,
    clock: Arc<dyn Clock>,
    observability: Observability,
}

impl PointLedger {
    pub fn new(
        config: LedgerConfig,
        balances: Arc<dyn BalanceStore>,
        records: Arc<dyn HistoryStore>,
    ) -> Self {
        Self::with_clock(config, balances, records, Arc::new(SystemClock))
    }

    pub fn with_clock(
        config: LedgerConfig,
        balances: Arc<dyn BalanceStore>,
        records: Arc<dyn HistoryStore>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            config,
            locks: KeyLockRegistry::new(),
            balances,
            records,
            clock,
            observability: Observability::default(),
        }
    }

    pub fn observability(&self) -> ObservabilitySnapshot {
        self.observability.snapshot()
    }

    pub fn locks(&self) -> &KeyLockRegistry {
        &self.locks
    }

    pub async fn charge(&self, id: i64, amount: i64) -> Result<UserBalance, LedgerError> {
        self.observability.record_charge();
        let _guard = self.acquire(id).await?;

        let current = self.lookup(id).await?;
        self.validate_amount(amount)?;

        let now = self.clock.now_epoch_millis();
        let updated = current.amount.saturating_add(amount);
        self.records
            .append(id, amount, TransactionKind::Charge, now)
            .await;
        let persisted = self.balances.put(id, updated, now).await;
        tracing::debug!(user = id, amount, balance = persisted.amount, "charged points");
        Ok(persisted)
    }

    pub async fn use_points(&self, id: i64, amount: i64) -> Result<UserBalance, LedgerError> {
        self.observability.record_use();
        let _guard = self.acquire(id).await?;

        let current = self.lookup(id).await?;
        self.validate_amount(amount)?;
        if amount > current.amount {
            self.observability.record_rejected();
            return Err(LedgerError::InsufficientBalance {
                requested: amount,
                available: current.amount,
            });
        }

        let now = self.clock.now_epoch_millis();
        let updated = current.amount - amount;
        self.records
            .append(id, amount, TransactionKind::Use, now)
            .await;
        let persisted = self.balances.put(id, updated, now).await;
        tracing::debug!(user = id, amount, balance = persisted.amount, "used points");
        Ok(persisted)
    }

    /// Reads still take the user's lock so a balance is never observed
    /// between the history append and the persist of a mutation.
    pub async fn balance(&self, id: i64) -> Result<UserBalance, LedgerError> {
        self.observability.record_query();
        let _guard = self.acquire(id).await?;
        self.lookup(id).await
    }

    pub async fn history(&self, id: i64) -> Result<Vec<TransactionRecord>, LedgerError> {
        self.observability.record_history();
        let _guard = self.acquire(id).await?;
        self.lookup(id).await?;
        Ok(self.records.list_all(id).await)
    }

    /// Create or reset an account. Writes the balance under the user's lock
    /// but appends no history record; seeding is a fixture concern, not a
    /// ledger transaction.
    pub async fn seed_account(&self, id: i64, amount: i64) -> Result<UserBalance, LedgerError> {
        if amount < 0 {
            return Err(LedgerError::InvalidAmount {
                amount,
                max: self.config.max_amount,
            });
        }
        let _guard = self.acquire(id).await?;
        let now = self.clock.now_epoch_millis();
        let seeded = self.balances.put(id, amount, now).await;
        tracing::info!(user = id, amount, "account seeded");
        Ok(seeded)
    }

    async fn acquire(&self, id: i64) -> Result<KeyLockGuard, LedgerError> {
        let timeout = Duration::from_millis(self.config.lock_timeout_ms);
        match self.locks.acquire(id, timeout).await {
            Ok(guard) => Ok(guard),
            Err(err) => {
                self.observability.record_lock_timeout();
                tracing::warn!(user = id, "lock wait timed out");
                Err(err)
            }
        }
    }

    async fn lookup(&self, id: i64) -> Result<UserBalance, LedgerError> {
        match self.balances.get(id).await {
            Some(balance) => Ok(balance),
            None => {
                self.observability.record_rejected();
                Err(LedgerError::UserNotFound { id })
            }
        }
    }

    fn validate_amount(&self, amount: i64) -> Result<(), LedgerError> {
        let max = self.config.max_amount;
        if amount <= 0 || amount > max {
            self.observability.record_rejected();
            return Err(LedgerError::InvalidAmount { amount, max });
        }
        Ok(())
    }
}
