//! Bounded retry with linear backoff for transiently locked databases.
//!
//! # Invariants
//! - An operation runs at most `max_attempts` times; the last error is
//!   returned unchanged.
//! - Only errors classified as transient are retried.

use log::warn;
use rusqlite::ErrorCode;
use std::thread;
use std::time::Duration;

const DEFAULT_MAX_ATTEMPTS: u32 = 6;
const DEFAULT_BASE_DELAY: Duration = Duration::from_millis(200);

/// Retry budget for store operations.
///
/// Attempt `n` (1-based) that fails transiently waits `base_delay * n` before
/// attempt `n + 1`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            base_delay: DEFAULT_BASE_DELAY,
        }
    }
}

impl RetryPolicy {
    /// Delay applied after the given failed attempt.
    pub fn delay_after(&self, attempt: u32) -> Duration {
        self.base_delay.saturating_mul(attempt)
    }

    /// Runs `op`, retrying while `is_transient` accepts the error.
    pub fn run<T, E>(
        &self,
        operation: &str,
        mut op: impl FnMut() -> Result<T, E>,
        is_transient: impl Fn(&E) -> bool,
    ) -> Result<T, E> {
        let max_attempts = self.max_attempts.max(1);
        let mut attempt = 1;
        loop {
            match op() {
                Ok(value) => return Ok(value),
                Err(err) if attempt < max_attempts && is_transient(&err) => {
                    let delay = self.delay_after(attempt);
                    warn!(
                        "event=db_retry module=db status=retry operation={} attempt={} max_attempts={} delay_ms={}",
                        operation,
                        attempt,
                        max_attempts,
                        delay.as_millis()
                    );
                    thread::sleep(delay);
                    attempt += 1;
                }
                Err(err) => return Err(err),
            }
        }
    }
}

/// Classifies SQLite failures that are worth retrying.
pub fn is_transient_sqlite(err: &rusqlite::Error) -> bool {
    match err {
        rusqlite::Error::SqliteFailure(inner, _) => matches!(
            inner.code,
            ErrorCode::DatabaseBusy | ErrorCode::DatabaseLocked | ErrorCode::SystemIoFailure
        ),
        _ => false,
    }
}
