//! Batch scheduler: sweep, select, order, and drain eligible notes.
//!
//! One batch runs sequentially under a wall-clock budget sized for
//! serverless-style execution caps. Concurrency across processes is the
//! lease's job; within this process an `AtomicBool` guards against
//! overlapping batch runs (a second trigger reports `already_running`
//! instead of queueing).

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::time::{sleep, Instant};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use echonote_core::{defaults, BatchReport, ErrorCategory, Note, NoteRepository, ProcessingOutcome};

use crate::breaker::CircuitBreaker;
use crate::metrics::MetricsCollector;
use crate::pipeline::NoteProcessor;
use crate::retry::{RetryOperation, RetryPolicy, RetryQueue};

/// Batch scheduling knobs.
#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    /// Hard cap on candidates per batch, regardless of the requested size.
    pub max_batch_size: usize,
    /// Wall-clock budget for one batch run.
    pub budget: Duration,
    /// Inter-note delay while external services look healthy.
    pub delay_normal: Duration,
    /// Inter-note delay under elevated failures.
    pub delay_elevated: Duration,
    /// Inter-note delay while the circuit breaker is open.
    pub delay_open: Duration,
    /// Consecutive breaker failures considered elevated.
    pub elevated_failure_threshold: u32,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            max_batch_size: defaults::BATCH_MAX_SIZE,
            budget: Duration::from_secs(defaults::BATCH_BUDGET_SECS),
            delay_normal: Duration::from_millis(defaults::DELAY_NORMAL_MS),
            delay_elevated: Duration::from_millis(defaults::DELAY_ELEVATED_MS),
            delay_open: Duration::from_millis(defaults::DELAY_OPEN_MS),
            elevated_failure_threshold: defaults::ELEVATED_FAILURE_THRESHOLD,
        }
    }
}

impl SchedulerConfig {
    /// Build from environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Some(size) = defaults::env_parse::<usize>(defaults::ENV_BATCH_MAX_SIZE) {
            config.max_batch_size = size.max(1);
        }
        if let Some(secs) = defaults::env_parse::<u64>(defaults::ENV_BATCH_BUDGET_SECS) {
            config.budget = Duration::from_secs(secs);
        }
        config
    }
}

/// Order batch candidates by priority.
///
/// Fewest attempts first (fresh notes ahead of retries), then oldest
/// recording first for fairness, then shortest expected processing time
/// so quick wins land before the budget runs out. Notes without an
/// estimate sort last within their tier.
pub fn sort_candidates(notes: &mut [Note]) {
    notes.sort_by(|a, b| {
        a.attempts
            .cmp(&b.attempts)
            .then_with(|| a.recorded_at.cmp(&b.recorded_at))
            .then_with(|| {
                let a_cost = a.expected_duration_secs.unwrap_or(i32::MAX);
                let b_cost = b.expected_duration_secs.unwrap_or(i32::MAX);
                a_cost.cmp(&b_cost)
            })
    });
}

/// Drives batch runs over the note repository.
pub struct BatchScheduler {
    notes: Arc<dyn NoteRepository>,
    processor: Arc<NoteProcessor>,
    breaker: Arc<CircuitBreaker>,
    retries: Arc<RetryQueue>,
    metrics: Arc<MetricsCollector>,
    config: SchedulerConfig,
    retry_policy: RetryPolicy,
    batch_running: AtomicBool,
}

impl BatchScheduler {
    pub fn new(
        notes: Arc<dyn NoteRepository>,
        processor: Arc<NoteProcessor>,
        breaker: Arc<CircuitBreaker>,
        retries: Arc<RetryQueue>,
        metrics: Arc<MetricsCollector>,
        config: SchedulerConfig,
    ) -> Self {
        Self {
            notes,
            processor,
            breaker,
            retries,
            metrics,
            config,
            retry_policy: RetryPolicy::default(),
            batch_running: AtomicBool::new(false),
        }
    }

    /// Override the retry policy handed to the retry queue.
    pub fn with_retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.retry_policy = policy;
        self
    }

    /// Whether a batch is currently running in this process.
    pub fn is_batch_running(&self) -> bool {
        self.batch_running.load(Ordering::SeqCst)
    }

    /// Run one batch of up to `requested` notes.
    ///
    /// Returns immediately with `already_running` set if another batch is
    /// in flight in this process.
    pub async fn process_batch(&self, requested: usize) -> BatchReport {
        if self
            .batch_running
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            warn!(
                subsystem = "pipeline",
                component = "scheduler",
                op = "process_batch",
                "Batch already running; refusing overlap"
            );
            return BatchReport {
                processed: 0,
                failed: 0,
                skipped: 0,
                errors: Vec::new(),
                timed_out: false,
                already_running: true,
                metrics: self.metrics.summary(),
            };
        }

        let report = self.run_batch(requested).await;
        self.batch_running.store(false, Ordering::SeqCst);
        report
    }

    async fn run_batch(&self, requested: usize) -> BatchReport {
        let deadline = Instant::now() + self.config.budget;
        let limit = requested.clamp(1, self.config.max_batch_size);
        let lease_timeout = self.processor.lease_timeout();

        let mut report = BatchReport {
            processed: 0,
            failed: 0,
            skipped: 0,
            errors: Vec::new(),
            timed_out: false,
            already_running: false,
            metrics: self.metrics.summary(),
        };

        // Reclaim leases from crashed workers before selecting, so their
        // notes are eligible this cycle rather than next.
        match self.notes.sweep_abandoned(lease_timeout).await {
            Ok(0) => {}
            Ok(swept) => {
                warn!(
                    subsystem = "pipeline",
                    component = "scheduler",
                    op = "sweep",
                    swept_count = swept,
                    "Reclaimed abandoned leases"
                );
            }
            Err(e) => {
                // Sweeping is an optimization; selection still works.
                error!(
                    subsystem = "pipeline",
                    component = "scheduler",
                    op = "sweep",
                    error = %e,
                    "Sweep failed; continuing with selection"
                );
            }
        }

        let mut candidates = match self.notes.fetch_eligible(limit as i64, lease_timeout).await {
            Ok(candidates) => candidates,
            Err(e) => {
                error!(
                    subsystem = "pipeline",
                    component = "scheduler",
                    op = "process_batch",
                    error = %e,
                    "Failed to fetch batch candidates"
                );
                report.errors.push(format!("candidate selection: {e}"));
                report.metrics = self.metrics.summary();
                return report;
            }
        };
        sort_candidates(&mut candidates);

        info!(
            subsystem = "pipeline",
            component = "scheduler",
            op = "process_batch",
            candidate_count = candidates.len(),
            budget_secs = self.config.budget.as_secs(),
            "Starting batch"
        );

        let total = candidates.len();
        for (index, note) in candidates.into_iter().enumerate() {
            if Instant::now() >= deadline {
                report.timed_out = true;
                warn!(
                    subsystem = "pipeline",
                    component = "scheduler",
                    op = "process_batch",
                    remaining = total - index,
                    "Budget exhausted; leaving remaining candidates for the next batch"
                );
                break;
            }

            let outcome = self.processor.process(note.id, false).await;
            match &outcome {
                ProcessingOutcome::Completed { .. } | ProcessingOutcome::AlreadyProcessed { .. } => {
                    report.processed += 1;
                }
                ProcessingOutcome::TranscribedOnly {
                    category, message, ..
                } => {
                    report.processed += 1;
                    report
                        .errors
                        .push(format!("{} [{category}] {message} (transcribed)", note.id));
                }
                ProcessingOutcome::Skipped { .. } => {
                    report.skipped += 1;
                }
                ProcessingOutcome::Failed {
                    category, message, ..
                } => {
                    report.failed += 1;
                    report
                        .errors
                        .push(format!("{} [{category}] {message}", note.id));
                }
            }

            if let Some(category) = outcome.category() {
                if category.is_transient() {
                    self.schedule_retry(note.id, category);
                }
            }

            if index + 1 < total {
                let delay = self.adaptive_delay();
                let remaining = deadline.saturating_duration_since(Instant::now());
                sleep(delay.min(remaining)).await;
            }
        }

        report.metrics = self.metrics.summary();
        info!(
            subsystem = "pipeline",
            component = "scheduler",
            op = "process_batch",
            processed = report.processed,
            failed = report.failed,
            skipped = report.skipped,
            timed_out = report.timed_out,
            "Batch finished"
        );
        report
    }

    /// Hand a transient failure to the retry queue. The deferred run goes
    /// back through the full pipeline, so a lease held by another worker
    /// ends the retry cleanly.
    fn schedule_retry(&self, note_id: Uuid, category: ErrorCategory) {
        let processor = Arc::clone(&self.processor);
        let op: RetryOperation = Box::new(move || {
            let processor = Arc::clone(&processor);
            Box::pin(async move {
                match processor.process(note_id, false).await {
                    ProcessingOutcome::Completed { .. }
                    | ProcessingOutcome::AlreadyProcessed { .. }
                    | ProcessingOutcome::Skipped { .. } => Ok(()),
                    ProcessingOutcome::TranscribedOnly {
                        category, message, ..
                    }
                    | ProcessingOutcome::Failed {
                        category, message, ..
                    } => Err((category, message)),
                }
            })
        });
        self.retries
            .enqueue(note_id, category, self.retry_policy.clone(), op);
    }

    /// Pick the inter-note delay from the breaker's current state.
    fn adaptive_delay(&self) -> Duration {
        let snapshot = self.breaker.snapshot();
        if snapshot.open {
            self.config.delay_open
        } else if snapshot.consecutive_failures >= self.config.elevated_failure_threshold {
            debug!(
                subsystem = "pipeline",
                component = "scheduler",
                consecutive_failures = snapshot.consecutive_failures,
                "Elevated failures; slowing batch"
            );
            self.config.delay_elevated
        } else {
            self.config.delay_normal
        }
    }
}
