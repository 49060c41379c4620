use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct ObservabilitySnapshot {
    pub requests: u64,
    pub charges: u64,
    pub uses: u64,
    pub queries: u64,
    pub histories: u64,
    pub rejected: u64,
    pub lock_timeouts: u64,
}

/// Operation counters. Atomics so recording never contends: handlers for
/// different users must not meet on a shared counter lock.
#[derive(Debug, Default)]
pub struct Observability {
    requests: AtomicU64,
    charges: AtomicU64,
    uses: AtomicU64,
    queries: AtomicU64,
    histories: AtomicU64,
    rejected: AtomicU64,
    lock_timeouts: AtomicU64,
}

impl Observability {
    pub fn record_charge(&self) {
        self.requests.fetch_add(1, Ordering::Relaxed);
        self.charges.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_use(&self) {
        self.requests.fetch_add(1, Ordering::Relaxed);
        self.uses.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_query(&self) {
        self.requests.fetch_add(1, Ordering::Relaxed);
        self.queries.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_history(&self) {
        self.requests.fetch_add(1, Ordering::Relaxed);
        self.histories.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_rejected(&self) {
        self.rejected.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_lock_timeout(&self) {
        self.lock_timeouts.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> ObservabilitySnapshot {
        ObservabilitySnapshot {
            requests: self.requests.load(Ordering::Relaxed),
            charges: self.charges.load(Ordering::Relaxed),
            uses: self.uses.load(Ordering::Relaxed),
            queries: self.queries.load(Ordering::Relaxed),
            histories: self.histories.load(Ordering::Relaxed),
            rejected: self.rejected.load(Ordering::Relaxed),
            lock_timeouts: self.lock_timeouts.load(Ordering::Relaxed),
        }
    }
}
