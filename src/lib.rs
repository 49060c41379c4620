mod error;
pub mod ledger;

pub use error::{Result, TallyError};
pub use ledger::config::LedgerConfig;
pub use ledger::http::LedgerHttpState;
pub use ledger::locks::{KeyLockGuard, KeyLockRegistry};
pub use ledger::observability::ObservabilitySnapshot;
pub use ledger::state_file::{AccountRecord, LedgerStateFile, StateFileError};
pub use ledger::store::{BalanceStore, HistoryStore, MemoryBalanceStore, MemoryHistoryStore};
pub use ledger::{
    Clock, LedgerError, PointLedger, SystemClock, TransactionKind, TransactionRecord, UserBalance,
};
