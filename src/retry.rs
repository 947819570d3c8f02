//! The retry envelope: bounded exponential backoff around a sync pass.
//!
//! Connectivity and lock-contention failures are worth retrying; auth,
//! corruption, and logic errors are terminal on the first attempt. The
//! classification lives on [`GitError::is_retryable`] so this module only
//! decides *when* to run again, never *why* something failed.

use std::time::Duration;

use crate::git::{GitError, GitErrorKind};
use crate::shutdown::Shutdown;

/// Backoff configuration. Defaults: 3 attempts, 1s initial delay, 30s cap,
/// doubling per attempt.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// `None` means retry forever (until cancelled).
    pub max_attempts: Option<u32>,
    pub initial_delay: Duration,
    pub max_delay: Duration,
    pub backoff_multiplier: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: Some(3),
            initial_delay: Duration::from_millis(1000),
            max_delay: Duration::from_millis(30_000),
            backoff_multiplier: 2.0,
        }
    }
}

impl RetryPolicy {
    /// Delay before the retry following attempt `attempt` (1-based).
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let factor = self.backoff_multiplier.powi(attempt.saturating_sub(1) as i32);
        let delay = self.initial_delay.as_secs_f64() * factor;
        Duration::from_secs_f64(delay.min(self.max_delay.as_secs_f64()))
    }

    fn attempts_exhausted(&self, attempt: u32) -> bool {
        match self.max_attempts {
            Some(max) => attempt >= max,
            None => false,
        }
    }
}

/// Error surfaced after the envelope gives up.
#[derive(Debug)]
pub struct SyncError {
    pub message: String,
    pub attempts: u32,
    pub cause: GitError,
}

impl std::fmt::Display for SyncError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} (after {} attempt{}): {}",
            self.message,
            self.attempts,
            if self.attempts == 1 { "" } else { "s" },
            self.cause
        )
    }
}

impl std::error::Error for SyncError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.cause)
    }
}

/// Run `operation` with bounded exponential backoff.
///
/// Retries only on retryable errors, sleeping cancellably between attempts.
/// Cancellation surfaces as a terminal error rather than another retry.
pub fn with_retry<T>(
    policy: &RetryPolicy,
    shutdown: &Shutdown,
    mut operation: impl FnMut() -> Result<T, GitError>,
) -> Result<T, SyncError> {
    let mut attempt: u32 = 0;

    loop {
        attempt += 1;

        if shutdown.is_cancelled() {
            return Err(cancelled(attempt - 1));
        }

        let error = match operation() {
            Ok(value) => return Ok(value),
            Err(error) => error,
        };

        if !error.is_retryable() || policy.attempts_exhausted(attempt) {
            log::error!("❌ Error during worktree synchronization after all retry attempts:");
            log::error!("   {error}");
            return Err(SyncError {
                message: "worktree synchronization failed".to_string(),
                attempts: attempt,
                cause: error,
            });
        }

        log::warn!("⚠️  Sync attempt {attempt} failed: {error}");
        log::info!("🔄 Retrying synchronization...");

        if shutdown.sleep(policy.delay_for(attempt)) {
            return Err(cancelled(attempt));
        }
    }
}

/// Retry a non-critical operation (e.g. prune) on its own: failures are
/// logged and swallowed so they never fail the pass.
pub fn best_effort(
    policy: &RetryPolicy,
    shutdown: &Shutdown,
    what: &str,
    operation: impl FnMut() -> Result<(), GitError>,
) {
    if let Err(e) = with_retry(policy, shutdown, operation) {
        log::warn!("Non-critical operation '{what}' failed: {e}");
    }
}

fn cancelled(attempts: u32) -> SyncError {
    SyncError {
        message: "worktree synchronization cancelled".to_string(),
        attempts,
        cause: GitError::new(GitErrorKind::Other, "sync cancelled"),
    }
}
