//! Admission control for inbound connections.
//!
//! A counting permit pool with RAII permits. The acceptor only ever uses the
//! non-blocking [`AdmissionController::try_acquire`]; [`AdmissionController::acquire`]
//! waits for a slot and exists for callers that would rather queue.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde::Deserialize;
use tokio::sync::Notify;

/// Configuration for the admission pool.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AdmissionConfig {
    pub max_connections: usize,
}

impl Default for AdmissionConfig {
    fn default() -> Self {
        // 80% of a 1024 descriptor limit.
        Self { max_connections: 819 }
    }
}

/// Result of waiting for every permit to come back.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DrainResult {
    Complete,
    Timeout { remaining: usize },
}

/// Process-wide connection slot pool with atomic counting.
pub struct AdmissionController {
    used: AtomicUsize,
    max: usize,
    released: Notify,
}

impl AdmissionController {
    pub fn new(config: AdmissionConfig) -> Self {
        Self {
            used: AtomicUsize::new(0),
            max: config.max_connections,
            released: Notify::new(),
        }
    }

    /// Try to take a slot without waiting. `None` means the pool is exhausted.
    pub fn try_acquire(self: &Arc<Self>) -> Option<Permit> {
        loop {
            let current = self.used.load(Ordering::Relaxed);
            if current >= self.max {
                return None;
            }

            if self
                .used
                .compare_exchange(current, current + 1, Ordering::SeqCst, Ordering::Relaxed)
                .is_ok()
            {
                return Some(Permit {
                    pool: Arc::clone(self),
                });
            }
        }
    }

    /// Wait until a slot frees up, then take it.
    pub async fn acquire(self: &Arc<Self>) -> Permit {
        loop {
            let notified = self.released.notified();
            tokio::pin!(notified);
            // Register before checking so a release between the check and
            // the await is not lost.
            notified.as_mut().enable();

            if let Some(permit) = self.try_acquire() {
                return permit;
            }
            notified.await;
        }
    }

    /// Number of permits currently held.
    pub fn used(&self) -> usize {
        self.used.load(Ordering::SeqCst)
    }

    /// Configured pool size.
    pub fn max(&self) -> usize {
        self.max
    }

    pub fn available(&self) -> usize {
        self.max.saturating_sub(self.used())
    }

    /// Wait for every outstanding permit to be released, up to `timeout`.
    pub async fn drain(&self, timeout: Duration) -> DrainResult {
        let deadline = tokio::time::Instant::now() + timeout;

        loop {
            let notified = self.released.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            let count = self.used();
            if count == 0 {
                return DrainResult::Complete;
            }

            tokio::select! {
                _ = notified => continue,
                _ = tokio::time::sleep_until(deadline) => {
                    let remaining = self.used();
                    if remaining == 0 {
                        return DrainResult::Complete;
                    }
                    return DrainResult::Timeout { remaining };
                }
            }
        }
    }

    fn release(&self) {
        let previous = self.used.fetch_sub(1, Ordering::SeqCst);
        debug_assert!(previous > 0, "permit released twice");
        self.released.notify_waiters();
    }
}

/// One occupied connection slot. Dropping it gives the slot back.
pub struct Permit {
    pool: Arc<AdmissionController>,
}

impl Permit {
    /// Give the slot back now. Same as dropping the permit.
    pub fn release(self) {
        drop(self);
    }
}

impl std::fmt::Debug for Permit {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Permit")
            .field("used", &self.pool.used())
            .field("max", &self.pool.max)
            .finish()
    }
}

impl Drop for Permit {
    fn drop(&mut self) {
        self.pool.release();
    }
}
