//! Deferred retry queue for transient failures.
//!
//! Failed notes with a transient category (rate limiting, timeouts,
//! network) are retried in the background with exponential backoff. The
//! queue deduplicates by note id: one outstanding retry task per note,
//! no matter how many times the scheduler reports the same failure.
//!
//! Retries are best-effort. Exhaustion is recorded in metrics and the
//! note stays in the store with its error fields set, eligible for the
//! next batch once its backoff history no longer matters.

use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures::future::BoxFuture;
use tokio::time::sleep;
use tracing::{debug, info, warn};
use uuid::Uuid;

use echonote_core::{defaults, ErrorCategory};

use crate::metrics::MetricsCollector;

/// Backoff and eligibility policy for deferred retries.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Maximum retry attempts before giving up.
    pub max_attempts: u32,
    /// Base delay, doubled per attempt.
    pub base_delay: Duration,
    /// Cap applied to the computed backoff.
    pub max_delay: Duration,
}

impl RetryPolicy {
    /// Backoff before retry attempt `attempt` (0-based).
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let factor = 2u32.checked_pow(attempt).unwrap_or(u32::MAX);
        self.base_delay
            .checked_mul(factor)
            .unwrap_or(self.max_delay)
            .min(self.max_delay)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: defaults::RETRY_MAX_ATTEMPTS,
            base_delay: Duration::from_millis(defaults::RETRY_BASE_DELAY_MS),
            max_delay: Duration::from_millis(defaults::RETRY_MAX_DELAY_MS),
        }
    }
}

/// One deferred retry operation. Returns `Ok(())` when the note no longer
/// needs retrying (processed, or picked up by someone else), or the
/// failure's category and message otherwise.
pub type RetryOperation =
    Box<dyn Fn() -> BoxFuture<'static, std::result::Result<(), (ErrorCategory, String)>> + Send + Sync>;

/// Background retry queue with per-note deduplication.
pub struct RetryQueue {
    outstanding: Arc<Mutex<HashSet<Uuid>>>,
    metrics: Arc<MetricsCollector>,
}

impl RetryQueue {
    pub fn new(metrics: Arc<MetricsCollector>) -> Self {
        Self {
            outstanding: Arc::new(Mutex::new(HashSet::new())),
            metrics,
        }
    }

    /// Schedule a background retry for `note_id`.
    ///
    /// Returns `false` without scheduling anything if a retry for this
    /// note is already outstanding, or if the category is not transient.
    pub fn enqueue(
        &self,
        note_id: Uuid,
        category: ErrorCategory,
        policy: RetryPolicy,
        op: RetryOperation,
    ) -> bool {
        if !category.is_transient() {
            debug!(
                subsystem = "pipeline",
                component = "retry_queue",
                note_id = %note_id,
                category = %category,
                "Category is not transient; not scheduling retry"
            );
            return false;
        }
        {
            let Ok(mut guard) = self.outstanding.lock() else {
                return false;
            };
            if !guard.insert(note_id) {
                debug!(
                    subsystem = "pipeline",
                    component = "retry_queue",
                    note_id = %note_id,
                    "Retry already outstanding; deduplicated"
                );
                return false;
            }
        }

        info!(
            subsystem = "pipeline",
            component = "retry_queue",
            note_id = %note_id,
            category = %category,
            max_attempts = policy.max_attempts,
            "Scheduling deferred retries"
        );

        let outstanding = Arc::clone(&self.outstanding);
        let metrics = Arc::clone(&self.metrics);
        tokio::spawn(async move {
            run_retries(note_id, category, policy, op, outstanding, metrics).await;
        });
        true
    }

    /// Cancel an outstanding retry. The background task observes the
    /// removal before its next attempt and stops.
    pub fn cancel(&self, note_id: Uuid) -> bool {
        self.outstanding
            .lock()
            .map(|mut g| g.remove(&note_id))
            .unwrap_or(false)
    }

    /// Whether a retry for this note is currently outstanding.
    pub fn is_outstanding(&self, note_id: Uuid) -> bool {
        self.outstanding
            .lock()
            .map(|g| g.contains(&note_id))
            .unwrap_or(false)
    }

    /// Number of notes with an outstanding retry.
    pub fn outstanding_count(&self) -> usize {
        self.outstanding.lock().map(|g| g.len()).unwrap_or(0)
    }
}

async fn run_retries(
    note_id: Uuid,
    initial_category: ErrorCategory,
    policy: RetryPolicy,
    op: RetryOperation,
    outstanding: Arc<Mutex<HashSet<Uuid>>>,
    metrics: Arc<MetricsCollector>,
) {
    let mut last_category = initial_category;

    for attempt in 0..policy.max_attempts {
        sleep(policy.delay_for(attempt)).await;

        // Cancelled while sleeping.
        let still_wanted = outstanding
            .lock()
            .map(|g| g.contains(&note_id))
            .unwrap_or(false);
        if !still_wanted {
            debug!(
                subsystem = "pipeline",
                component = "retry_queue",
                note_id = %note_id,
                attempt,
                "Retry cancelled"
            );
            return;
        }

        match op().await {
            Ok(()) => {
                info!(
                    subsystem = "pipeline",
                    component = "retry_queue",
                    note_id = %note_id,
                    attempt,
                    "Deferred retry succeeded"
                );
                remove(&outstanding, note_id);
                return;
            }
            Err((category, message)) => {
                last_category = category;
                if !category.is_transient() {
                    warn!(
                        subsystem = "pipeline",
                        component = "retry_queue",
                        note_id = %note_id,
                        attempt,
                        category = %category,
                        error = %message,
                        "Failure became non-transient; abandoning retries"
                    );
                    remove(&outstanding, note_id);
                    metrics.retry_exhausted(category);
                    return;
                }
                debug!(
                    subsystem = "pipeline",
                    component = "retry_queue",
                    note_id = %note_id,
                    attempt,
                    category = %category,
                    error = %message,
                    "Deferred retry failed"
                );
            }
        }
    }

    warn!(
        subsystem = "pipeline",
        component = "retry_queue",
        note_id = %note_id,
        max_attempts = policy.max_attempts,
        category = %last_category,
        "Retries exhausted; note remains failed until the next batch"
    );
    remove(&outstanding, note_id);
    metrics.retry_exhausted(last_category);
}

fn remove(outstanding: &Arc<Mutex<HashSet<Uuid>>>, note_id: Uuid) {
    if let Ok(mut guard) = outstanding.lock() {
        guard.remove(&note_id);
    }
}
