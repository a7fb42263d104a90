//! # Per-Negotiation Locks
//!
//! Serializes mutations of one negotiation inside this process.
//!
//! ## Lock Scope
//! ```text
//! record_installment(N1) ──► acquire("N1") ──► tx ──► commit ──► audit ──► release
//! record_installment(N1) ──► acquire("N1") ·········waits·········────────► runs
//! add_source(N2)         ──► acquire("N2") ──► runs concurrently with N1
//! ```
//!
//! The guard is handed to the detached audit write and released only after
//! it, so audit records of one negotiation land in mutation order. Reads
//! never take a lock.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::debug;

use crate::error::{LedgerError, LedgerResult};

/// Idle entries are pruned once the registry grows past this size.
const PRUNE_THRESHOLD: usize = 1024;

/// Registry of async mutexes keyed by negotiation id.
#[derive(Debug, Clone)]
pub struct NegotiationLocks {
    locks: Arc<Mutex<HashMap<String, Arc<Mutex<()>>>>>,
    timeout: Duration,
}

/// Exclusive access to one negotiation. Released on drop.
#[derive(Debug)]
pub struct NegotiationGuard {
    key: String,
    _guard: OwnedMutexGuard<()>,
}

impl NegotiationGuard {
    pub fn key(&self) -> &str {
        &self.key
    }
}

impl NegotiationLocks {
    pub fn new(timeout: Duration) -> Self {
        NegotiationLocks {
            locks: Arc::new(Mutex::new(HashMap::new())),
            timeout,
        }
    }

    /// Waits for exclusive access to `key`.
    ///
    /// ## Errors
    /// `ConcurrencyConflict` when the lock is not free within the timeout.
    /// The retry policy treats it like any other contention.
    pub async fn acquire(&self, key: &str) -> LedgerResult<NegotiationGuard> {
        let lock = {
            let mut locks = self.locks.lock().await;
            if locks.len() > PRUNE_THRESHOLD {
                locks.retain(|_, l| Arc::strong_count(l) > 1);
            }
            locks.entry(key.to_string()).or_default().clone()
        };

        match tokio::time::timeout(self.timeout, lock.lock_owned()).await {
            Ok(guard) => {
                debug!(key = %key, "Negotiation lock acquired");
                Ok(NegotiationGuard {
                    key: key.to_string(),
                    _guard: guard,
                })
            }
            Err(_) => Err(LedgerError::ConcurrencyConflict {
                operation: format!("lock {key}"),
                attempts: 1,
                reason: format!("lock not acquired within {} ms", self.timeout.as_millis()),
            }),
        }
    }

    /// Number of keys currently tracked.
    pub async fn len(&self) -> usize {
        self.locks.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_same_key_is_exclusive() {
        let locks = NegotiationLocks::new(Duration::from_millis(50));
        let guard = locks.acquire("n1").await.unwrap();
        assert_eq!(guard.key(), "n1");

        let second = locks.acquire("n1").await;
        assert!(matches!(second, Err(LedgerError::ConcurrencyConflict { .. })));
        assert!(second.unwrap_err().is_retryable());

        drop(guard);
        assert!(locks.acquire("n1").await.is_ok());
    }

    #[tokio::test]
    async fn test_different_keys_do_not_block() {
        let locks = NegotiationLocks::new(Duration::from_millis(50));
        let _a = locks.acquire("n1").await.unwrap();
        let _b = locks.acquire("n2").await.unwrap();
        assert_eq!(locks.len().await, 2);
    }

    #[tokio::test]
    async fn test_waiter_gets_lock_after_release() {
        let locks = NegotiationLocks::new(Duration::from_secs(5));
        let guard = locks.acquire("n1").await.unwrap();

        let waiter = {
            let locks = locks.clone();
            tokio::spawn(async move { locks.acquire("n1").await.map(|_| ()) })
        };
        tokio::time::sleep(Duration::from_millis(10)).await;
        drop(guard);

        assert!(waiter.await.unwrap().is_ok());
    }
}
