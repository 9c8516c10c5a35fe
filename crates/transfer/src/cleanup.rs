//! Removal of staged entries once a transfer has been reassembled.

use std::time::Duration;

use crate::TransferError;
use crate::store::{StagingKey, StagingStore, TransferKey};

/// Blocks the current thread between removal attempts.
pub trait Sleeper: Send + Sync {
    fn sleep(&self, duration: Duration);
}

/// [`Sleeper`] backed by [`std::thread::sleep`].
#[derive(Debug, Clone, Copy, Default)]
pub struct ThreadSleeper;

impl Sleeper for ThreadSleeper {
    fn sleep(&self, duration: Duration) {
        std::thread::sleep(duration);
    }
}

/// How often a failed removal is attempted and how long to wait between
/// attempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 2,
            backoff: Duration::from_secs(1),
        }
    }
}

impl RetryPolicy {
    /// Runs `op` until it succeeds or the attempts are used up, sleeping
    /// `backoff` between attempts. Returns the last error.
    pub fn retry<T>(
        &self,
        sleeper: &dyn Sleeper,
        mut op: impl FnMut(u32) -> Result<T, TransferError>,
    ) -> Result<T, TransferError> {
        let attempts = self.max_attempts.max(1);
        let mut attempt = 1;
        loop {
            match op(attempt) {
                Ok(value) => return Ok(value),
                Err(e) if attempt >= attempts => return Err(e),
                Err(e) => {
                    tracing::warn!(attempt, error = %e, "attempt failed, retrying");
                    sleeper.sleep(self.backoff);
                    attempt += 1;
                }
            }
        }
    }
}

/// Result of [`cleanup_transfer`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CleanupReport {
    pub removed: usize,
    /// Entries still staged after all attempts; the dead-letter sweeper
    /// picks them up eventually.
    pub left_behind: Vec<String>,
}

impl CleanupReport {
    pub fn is_clean(&self) -> bool {
        self.left_behind.is_empty()
    }
}

/// Removes chunks `1..=max_part` and the completion record of `transfer`.
///
/// An entry that is already gone counts as removed. Failures are logged
/// and reported, never returned: the artifact has been written by the
/// time cleanup runs.
pub fn cleanup_transfer<S: StagingStore + ?Sized>(
    store: &S,
    policy: &RetryPolicy,
    sleeper: &dyn Sleeper,
    transfer: &TransferKey,
    max_part: u32,
) -> CleanupReport {
    let mut report = CleanupReport::default();
    let keys = (1..=max_part)
        .map(|part| transfer.chunk(part))
        .chain(std::iter::once(transfer.completion()));

    for key in keys {
        match remove_entry(store, policy, sleeper, &key) {
            Ok(()) => report.removed += 1,
            Err(e) => {
                tracing::error!(entry = %key, error = %e, "failed to remove staged entry");
                report.left_behind.push(key.file_name());
            }
        }
    }

    tracing::debug!(
        transfer = %transfer,
        removed = report.removed,
        left_behind = report.left_behind.len(),
        "staging cleanup finished"
    );
    report
}

fn remove_entry<S: StagingStore + ?Sized>(
    store: &S,
    policy: &RetryPolicy,
    sleeper: &dyn Sleeper,
    key: &StagingKey,
) -> Result<(), TransferError> {
    policy.retry(sleeper, |_| match store.remove(key) {
        Err(e) if e.is_not_found() => Ok(()),
        other => other,
    })
}
