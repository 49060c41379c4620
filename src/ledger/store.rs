use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::Mutex;

use super::{TransactionKind, TransactionRecord, UserBalance};

/// Key-value table of current balances. Implementations are internally safe
/// for concurrent access; callers mutating a balance are expected to hold
/// that user's key lock.
#[async_trait]
pub trait BalanceStore: Send + Sync {
    async fn get(&self, id: i64) -> Option<UserBalance>;
    async fn put(&self, id: i64, amount: i64, updated_at_ms: u64) -> UserBalance;
}

/// Append-only transaction log, ordered per user by insertion.
#[async_trait]
pub trait HistoryStore: Send + Sync {
    async fn append(
        &self,
        user_id: i64,
        amount: i64,
        kind: TransactionKind,
        ts_ms: u64,
    ) -> TransactionRecord;
    async fn list_all(&self, user_id: i64) -> Vec<TransactionRecord>;
}

#[derive(Debug, Default)]
pub struct MemoryBalanceStore {
    rows: Mutex<HashMap<i64, UserBalance>>,
}

impl MemoryBalanceStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl BalanceStore for MemoryBalanceStore {
    async fn get(&self, id: i64) -> Option<UserBalance> {
        self.rows.lock().await.get(&id).copied()
    }

    async fn put(&self, id: i64, amount: i64, updated_at_ms: u64) -> UserBalance {
        let row = UserBalance {
            id,
            amount,
            updated_at_ms,
        };
        self.rows.lock().await.insert(id, row);
        row
    }
}

#[derive(Debug, Default)]
pub struct MemoryHistoryStore {
    state: Mutex<HistoryState>,
}

#[derive(Debug, Default)]
struct HistoryState {
    rows: HashMap<i64, Vec<TransactionRecord>>,
    next_id: u64,
}

impl MemoryHistoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl HistoryStore for MemoryHistoryStore {
    async fn append(
        &self,
        user_id: i64,
        amount: i64,
        kind: TransactionKind,
        ts_ms: u64,
    ) -> TransactionRecord {
        let mut state = self.state.lock().await;
        state.next_id += 1;
        let record = TransactionRecord {
            id: state.next_id,
            user_id,
            amount,
            kind,
            ts_ms,
        };
        state.rows.entry(user_id).or_default().push(record);
        record
    }

    async fn list_all(&self, user_id: i64) -> Vec<TransactionRecord> {
        self.state
            .lock()
            .await
            .rows
            .get(&user_id)
            .cloned()
            .unwrap_or_default()
    }
}
