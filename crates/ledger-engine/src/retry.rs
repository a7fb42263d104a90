//! # Bounded Retry
//!
//! Re-runs a mutation attempt on transient contention.
//!
//! ## Policy
//! ```text
//! attempt 1 ──► Ok ─────────────────────────────────► return
//!     │
//!     ├── NotFound / Validation / Conflict ─────────► return verbatim
//!     │
//!     └── busy / version / lock timeout ──► backoff ──► attempt 2 ──► ...
//!                                                        │
//!                         after max_attempts ────────────┴──► ConcurrencyConflict
//!
//! A reference-code uniqueness race is retried once only.
//! ```
//!
//! Every attempt runs its own transaction, so a failed attempt leaves no
//! partial writes behind.

use backoff::backoff::Backoff;
use backoff::ExponentialBackoff;
use std::future::Future;
use std::time::Duration;
use tracing::{debug, error, warn};

use crate::config::ConcurrencySettings;
use crate::error::{LedgerError, LedgerResult};

#[derive(Debug, Clone)]
pub struct RetryPolicy {
    max_attempts: u32,
    initial_backoff: Duration,
    max_backoff: Duration,
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, initial_backoff: Duration, max_backoff: Duration) -> Self {
        RetryPolicy {
            max_attempts: max_attempts.max(1),
            initial_backoff,
            max_backoff,
        }
    }

    pub fn from_settings(settings: &ConcurrencySettings) -> Self {
        Self::new(
            settings.max_attempts,
            settings.initial_backoff(),
            settings.max_backoff(),
        )
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Runs `attempt` until it succeeds, fails for good, or the budget is spent.
    pub async fn run<T, F, Fut>(&self, operation: &str, mut attempt: F) -> LedgerResult<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = LedgerResult<T>>,
    {
        let mut backoff = self.create_backoff();
        let mut unique_violations = 0u32;
        let mut attempts = 0u32;

        loop {
            attempts += 1;

            let err = match attempt().await {
                Ok(value) => {
                    if attempts > 1 {
                        debug!(operation, attempts, "Succeeded after retry");
                    }
                    return Ok(value);
                }
                Err(e) if !e.is_retryable() => return Err(e),
                Err(e) => e,
            };

            if err.is_unique_violation() {
                unique_violations += 1;
            }
            if attempts >= self.max_attempts || unique_violations > 1 {
                error!(operation, attempts, error = %err, "Retries exhausted");
                return Err(LedgerError::ConcurrencyConflict {
                    operation: operation.to_string(),
                    attempts,
                    reason: err.to_string(),
                });
            }

            let wait = backoff.next_backoff().unwrap_or(self.max_backoff);
            warn!(operation, attempt = attempts, ?wait, error = %err, "Retrying after contention");
            tokio::time::sleep(wait).await;
        }
    }

    fn create_backoff(&self) -> ExponentialBackoff {
        ExponentialBackoff {
            initial_interval: self.initial_backoff,
            max_interval: self.max_backoff,
            multiplier: 2.0,
            max_elapsed_time: None,
            ..Default::default()
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_settings(&ConcurrencySettings::default())
    }
}
