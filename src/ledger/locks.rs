use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use tokio::sync::{Mutex as KeyMutex, OwnedMutexGuard};

use super::LedgerError;

/// Hands out one exclusive lock per user id: callers naming the same id get
/// the same lock, callers naming different ids never contend. The tokio
/// mutex grants waiters in FIFO arrival order, so no caller starves while
/// others re-acquire the same key.
///
/// Entries are reference-counted by `waiters`. Registration (lookup-or-create
/// plus the count increment) and eviction (zero check plus removal) both run
/// under the one map guard, so an entry with a registered waiter can never be
/// evicted out from under it.
#[derive(Clone, Debug, Default)]
pub struct KeyLockRegistry {
    entries: Arc<Mutex<HashMap<i64, KeyLockEntry>>>,
}

#[derive(Debug)]
struct KeyLockEntry {
    mutex: Arc<KeyMutex<()>>,
    waiters: usize,
}

impl KeyLockRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register intent on `key` and wait for its lock, up to `timeout`. On
    /// timeout the registration is rolled back and no mutex was acquired.
    pub async fn acquire(
        &self,
        key: i64,
        timeout: Duration,
    ) -> Result<KeyLockGuard, LedgerError> {
        let mutex = self.register(key);
        match tokio::time::timeout(timeout, mutex.lock_owned()).await {
            Ok(guard) => Ok(KeyLockGuard {
                key,
                guard: Some(guard),
                registry: self.clone(),
            }),
            Err(_) => {
                self.unregister(key);
                Err(LedgerError::LockTimeout {
                    id: key,
                    waited_ms: timeout.as_millis() as u64,
                })
            }
        }
    }

    /// Remove the entry for `key` iff nothing holds or awaits it. Advisory:
    /// release already evicts idle entries, this only exists for opportunistic
    /// sweeps.
    pub fn try_reclaim(&self, key: i64) -> bool {
        let mut entries = self.lock_entries();
        match entries.get(&key) {
            Some(entry) if entry.waiters == 0 => {
                entries.remove(&key);
                true
            }
            _ => false,
        }
    }

    pub fn len(&self) -> usize {
        self.lock_entries().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn register(&self, key: i64) -> Arc<KeyMutex<()>> {
        let mut entries = self.lock_entries();
        let entry = entries.entry(key).or_insert_with(|| KeyLockEntry {
            mutex: Arc::new(KeyMutex::new(())),
            waiters: 0,
        });
        entry.waiters += 1;
        Arc::clone(&entry.mutex)
    }

    fn unregister(&self, key: i64) {
        let mut entries = self.lock_entries();
        if let Some(entry) = entries.get_mut(&key) {
            entry.waiters = entry.waiters.saturating_sub(1);
            if entry.waiters == 0 {
                entries.remove(&key);
            }
        }
    }

    fn lock_entries(&self) -> std::sync::MutexGuard<'_, HashMap<i64, KeyLockEntry>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Exclusive access to one key. Dropping the guard releases the mutex and
/// then unregisters the waiter, on every exit path of the critical section.
#[derive(Debug)]
pub struct KeyLockGuard {
    key: i64,
    guard: Option<OwnedMutexGuard<()>>,
    registry: KeyLockRegistry,
}

impl Drop for KeyLockGuard {
    fn drop(&mut self) {
        // Release the mutex before the waiter count drops: the count must
        // never read zero while the lock is still held.
        self.guard.take();
        self.registry.unregister(self.key);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const WAIT: Duration = Duration::from_secs(1);
    const SHORT_WAIT: Duration = Duration::from_millis(20);

    #[tokio::test]
    async fn idle_entries_are_evicted_on_last_release() {
        let registry = KeyLockRegistry::new();
        let guard = registry.acquire(7, WAIT).await.unwrap();
        assert_eq!(registry.len(), 1);
        assert!(!registry.try_reclaim(7));
        drop(guard);
        assert!(registry.is_empty());
        assert!(!registry.try_reclaim(7));
    }

    #[tokio::test]
    async fn timeout_leaves_no_waiter_registered() {
        let registry = KeyLockRegistry::new();
        let held = registry.acquire(1, WAIT).await.unwrap();

        let err = registry.acquire(1, SHORT_WAIT).await.unwrap_err();
        assert!(matches!(err, LedgerError::LockTimeout { id: 1, .. }));

        // Only the holder keeps the entry alive.
        assert_eq!(registry.len(), 1);
        drop(held);
        assert!(registry.is_empty());
    }

    #[tokio::test]
    async fn distinct_keys_do_not_block_each_other() {
        let registry = KeyLockRegistry::new();
        let _held = registry.acquire(1, WAIT).await.unwrap();
        assert!(registry.acquire(2, SHORT_WAIT).await.is_ok());
    }

    #[tokio::test]
    async fn same_key_waiters_are_served_in_turn() {
        let registry = KeyLockRegistry::new();
        let first = registry.acquire(5, WAIT).await.unwrap();

        let second = {
            let registry = registry.clone();
            tokio::spawn(async move { registry.acquire(5, WAIT).await })
        };
        tokio::task::yield_now().await;
        drop(first);

        assert!(second.await.unwrap().is_ok());
        assert!(registry.is_empty());
    }
}
