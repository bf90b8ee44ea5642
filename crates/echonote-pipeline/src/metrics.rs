//! In-process metrics for pipeline runs.
//!
//! Two layers: a bounded window of per-note records (stage timings, final
//! category) for recent-history inspection, and a rolling summary that
//! resets on a fixed cadence so counters and the error breakdown cannot
//! grow without bound in a long-lived process.

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;
use uuid::Uuid;

use echonote_core::{defaults, ErrorCategory, MetricsSummary};

/// Per-note record of one pipeline run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessingRecord {
    pub note_id: Uuid,
    /// Attempt count at the time the run started (0 = fresh).
    pub attempt: i32,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    /// Per-stage wall-clock durations, milliseconds. Keys are the stage
    /// names: "fetch", "transcription", "analysis", "saving".
    pub stage_durations_ms: HashMap<String, u64>,
    /// Stage currently executing, while the run is in flight.
    pub current_stage: Option<String>,
    pub success: Option<bool>,
    pub category: Option<ErrorCategory>,
}

struct Inner {
    epoch_started_at: DateTime<Utc>,
    total_processed: u64,
    succeeded: u64,
    failed: u64,
    total_duration_ms: u64,
    error_breakdown: HashMap<ErrorCategory, u64>,
    in_flight: HashMap<Uuid, ProcessingRecord>,
    recent: VecDeque<ProcessingRecord>,
}

impl Inner {
    fn reset_epoch(&mut self, now: DateTime<Utc>) {
        self.epoch_started_at = now;
        self.total_processed = 0;
        self.succeeded = 0;
        self.failed = 0;
        self.total_duration_ms = 0;
        self.error_breakdown.clear();
    }
}

/// Collects per-note and rolling summary metrics for the pipeline.
pub struct MetricsCollector {
    inner: Mutex<Inner>,
    window: usize,
    reset_after: Duration,
}

impl MetricsCollector {
    pub fn new() -> Self {
        Self::with_window(defaults::METRICS_WINDOW)
    }

    pub fn with_window(window: usize) -> Self {
        Self {
            inner: Mutex::new(Inner {
                epoch_started_at: Utc::now(),
                total_processed: 0,
                succeeded: 0,
                failed: 0,
                total_duration_ms: 0,
                error_breakdown: HashMap::new(),
                in_flight: HashMap::new(),
                recent: VecDeque::with_capacity(window),
            }),
            window,
            reset_after: Duration::seconds(defaults::SUMMARY_RESET_SECS),
        }
    }

    /// Begin tracking a run. Called once the lease is held.
    pub fn run_started(&self, note_id: Uuid, attempt: i32) {
        let record = ProcessingRecord {
            note_id,
            attempt,
            started_at: Utc::now(),
            finished_at: None,
            stage_durations_ms: HashMap::new(),
            current_stage: None,
            success: None,
            category: None,
        };
        if let Ok(mut inner) = self.inner.lock() {
            inner.in_flight.insert(note_id, record);
        }
    }

    /// Mark which stage a run has entered.
    pub fn stage_started(&self, note_id: Uuid, stage: &str) {
        if let Ok(mut inner) = self.inner.lock() {
            if let Some(record) = inner.in_flight.get_mut(&note_id) {
                record.current_stage = Some(stage.to_string());
            }
        }
    }

    /// Record how long one stage of a run took.
    pub fn stage_completed(&self, note_id: Uuid, stage: &str, duration_ms: u64) {
        if let Ok(mut inner) = self.inner.lock() {
            if let Some(record) = inner.in_flight.get_mut(&note_id) {
                record
                    .stage_durations_ms
                    .insert(stage.to_string(), duration_ms);
            }
        }
    }

    /// Finish a run and fold it into the rolling summary.
    pub fn run_finished(&self, note_id: Uuid, success: bool, category: Option<ErrorCategory>) {
        let now = Utc::now();
        let Ok(mut inner) = self.inner.lock() else {
            return;
        };

        if now - inner.epoch_started_at > self.reset_after {
            debug!(
                subsystem = "pipeline",
                component = "metrics",
                total_processed = inner.total_processed,
                "Summary epoch elapsed; resetting counters"
            );
            inner.reset_epoch(now);
        }

        let Some(mut record) = inner.in_flight.remove(&note_id) else {
            return;
        };
        record.finished_at = Some(now);
        record.current_stage = None;
        record.success = Some(success);
        record.category = category;

        let duration_ms = (now - record.started_at).num_milliseconds().max(0) as u64;
        inner.total_processed += 1;
        inner.total_duration_ms += duration_ms;
        if success {
            inner.succeeded += 1;
        } else {
            inner.failed += 1;
        }
        if let Some(cat) = category {
            *inner.error_breakdown.entry(cat).or_insert(0) += 1;
        }

        if inner.recent.len() >= self.window {
            inner.recent.pop_front();
        }
        inner.recent.push_back(record);
    }

    /// Drop an in-flight record without counting it (lease lost, note gone).
    pub fn run_discarded(&self, note_id: Uuid) {
        if let Ok(mut inner) = self.inner.lock() {
            inner.in_flight.remove(&note_id);
        }
    }

    /// Tally a retry-queue exhaustion in the error breakdown. The failed
    /// runs themselves were already counted as they happened.
    pub fn retry_exhausted(&self, category: ErrorCategory) {
        if let Ok(mut inner) = self.inner.lock() {
            *inner.error_breakdown.entry(category).or_insert(0) += 1;
        }
    }

    /// Number of runs currently in flight.
    pub fn in_flight_count(&self) -> usize {
        self.inner.lock().map(|i| i.in_flight.len()).unwrap_or(0)
    }

    /// Recently completed per-note records, oldest first.
    pub fn recent(&self) -> Vec<ProcessingRecord> {
        self.inner
            .lock()
            .map(|i| i.recent.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Rolling summary for the current epoch.
    pub fn summary(&self) -> MetricsSummary {
        let Ok(inner) = self.inner.lock() else {
            return MetricsSummary {
                total_processed: 0,
                succeeded: 0,
                failed: 0,
                avg_duration_ms: 0.0,
                success_rate: 0.0,
                error_breakdown: HashMap::new(),
                epoch_started_at: Utc::now(),
            };
        };
        let avg = if inner.total_processed > 0 {
            inner.total_duration_ms as f64 / inner.total_processed as f64
        } else {
            0.0
        };
        let rate = if inner.total_processed > 0 {
            inner.succeeded as f64 / inner.total_processed as f64
        } else {
            0.0
        };
        MetricsSummary {
            total_processed: inner.total_processed,
            succeeded: inner.succeeded,
            failed: inner.failed,
            avg_duration_ms: avg,
            success_rate: rate,
            error_breakdown: inner
                .error_breakdown
                .iter()
                .map(|(k, v)| (k.as_str().to_string(), *v))
                .collect(),
            epoch_started_at: inner.epoch_started_at,
        }
    }
}

impl Default for MetricsCollector {
    fn default() -> Self {
        Self::new()
    }
}
