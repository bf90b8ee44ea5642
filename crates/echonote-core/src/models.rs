//! Core data models for the note processing pipeline.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::collections::HashMap;
use uuid::Uuid;

use crate::ErrorCategory;

/// A user-submitted recording pending (or holding) transcription and analysis.
///
/// Status is derived from timestamps rather than stored as an enum column:
/// the lease is `lock_started_at` plus a timeout, completion is
/// `completed_at`, failure is a recorded error with no live lease.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Note {
    pub id: Uuid,
    /// Owner of the recording; scopes knowledge-context lookups.
    pub owner_id: Uuid,
    /// Reference to the stored audio object (path or object key).
    pub audio_ref: String,
    /// MIME type recorded at upload time, if known.
    pub mime_type: Option<String>,
    /// Transcribed text; persisted as partial progress before analysis.
    pub transcription: Option<String>,
    /// Structured analysis output.
    pub analysis: Option<JsonValue>,
    /// Number of failed processing cycles so far.
    pub attempts: i32,
    pub last_error_category: Option<ErrorCategory>,
    pub last_error_message: Option<String>,
    /// When the audio was recorded; used for fairness ordering.
    pub recorded_at: DateTime<Utc>,
    /// Estimated processing cost in seconds; ordering tie-breaker.
    pub expected_duration_secs: Option<i32>,
    /// Lease start; the lease expires at `lock_started_at + lease_timeout`.
    pub lock_started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

/// Derived lifecycle state of a note.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NoteStatus {
    Pending,
    Locked,
    Completed,
    Failed,
}

impl Note {
    /// Derive the lifecycle status at `now` given the configured lease timeout.
    pub fn status_at(&self, now: DateTime<Utc>, lease_timeout: Duration) -> NoteStatus {
        if self.completed_at.is_some() {
            return NoteStatus::Completed;
        }
        if let Some(started) = self.lock_started_at {
            if started + lease_timeout > now {
                return NoteStatus::Locked;
            }
        }
        // An expired lease is reclaimable; the note is pending (or failed)
        // from the scheduler's point of view.
        if self.last_error_category.is_some() {
            NoteStatus::Failed
        } else {
            NoteStatus::Pending
        }
    }

    /// Derive the lifecycle status at the current instant.
    pub fn status(&self, lease_timeout: Duration) -> NoteStatus {
        self.status_at(Utc::now(), lease_timeout)
    }

    /// Whether a fresh lease could be taken at `now`.
    pub fn is_leasable_at(&self, now: DateTime<Utc>, lease_timeout: Duration) -> bool {
        !matches!(
            self.status_at(now, lease_timeout),
            NoteStatus::Completed | NoteStatus::Locked
        )
    }
}

/// Audio bytes plus their detected MIME type, as loaded from storage.
#[derive(Debug, Clone)]
pub struct AudioObject {
    pub bytes: Vec<u8>,
    pub mime_type: String,
}

/// Outcome of one pipeline run over one note.
///
/// The pipeline never signals control flow with errors; every run ends in
/// exactly one of these, and the scheduler pattern-matches on it.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum ProcessingOutcome {
    /// Transcription and analysis persisted, lease released.
    Completed { note_id: Uuid },
    /// The note was already completed; nothing was called.
    AlreadyProcessed { note_id: Uuid },
    /// Lost the lease race; expected under concurrency, not an error.
    Skipped { note_id: Uuid },
    /// Transcription persisted but analysis failed. Reported as a warning
    /// since the transcript is independently useful; the note remains
    /// retryable and the next run goes straight to analysis.
    TranscribedOnly {
        note_id: Uuid,
        category: ErrorCategory,
        message: String,
    },
    /// Hard failure; lease released with the recorded category.
    Failed {
        note_id: Uuid,
        category: ErrorCategory,
        message: String,
    },
}

impl ProcessingOutcome {
    /// The failure category, if this outcome carries one.
    pub fn category(&self) -> Option<ErrorCategory> {
        match self {
            Self::TranscribedOnly { category, .. } | Self::Failed { category, .. } => {
                Some(*category)
            }
            _ => None,
        }
    }

    /// True for outcomes the caller should count as success (including the
    /// transcription-only warning).
    pub fn is_success(&self) -> bool {
        matches!(
            self,
            Self::Completed { .. } | Self::AlreadyProcessed { .. } | Self::TranscribedOnly { .. }
        )
    }
}

/// Read-only view of circuit breaker state for health reporting and
/// adaptive delay tuning.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BreakerSnapshot {
    pub open: bool,
    pub consecutive_failures: u32,
    /// Seconds until a trial call is allowed, when open.
    pub retry_after_secs: Option<u64>,
    pub failure_histogram: HashMap<String, u64>,
}

/// Rolling process-wide processing statistics.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsSummary {
    pub total_processed: u64,
    pub succeeded: u64,
    pub failed: u64,
    /// Rolling average of end-to-end durations, milliseconds.
    pub avg_duration_ms: f64,
    /// succeeded / total, 0.0 when nothing processed yet.
    pub success_rate: f64,
    pub error_breakdown: HashMap<String, u64>,
    pub epoch_started_at: DateTime<Utc>,
}

/// Aggregate result of one batch run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchReport {
    pub processed: usize,
    pub failed: usize,
    /// Notes skipped because another worker held the lease.
    pub skipped: usize,
    pub errors: Vec<String>,
    /// True when the wall-clock budget ran out before the candidate list did.
    pub timed_out: bool,
    /// True when this process was already running a batch (overlap guard).
    pub already_running: bool,
    pub metrics: MetricsSummary,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_note() -> Note {
        Note {
            id: Uuid::new_v4(),
            owner_id: Uuid::new_v4(),
            audio_ref: "notes/a1.ogg".to_string(),
            mime_type: Some("audio/ogg".to_string()),
            transcription: None,
            analysis: None,
            attempts: 0,
            last_error_category: None,
            last_error_message: None,
            recorded_at: Utc::now(),
            expected_duration_secs: Some(60),
            lock_started_at: None,
            completed_at: None,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn test_status_pending() {
        let note = sample_note();
        assert_eq!(note.status(Duration::minutes(15)), NoteStatus::Pending);
    }

    #[test]
    fn test_status_locked_while_lease_unexpired() {
        let mut note = sample_note();
        let now = Utc::now();
        note.lock_started_at = Some(now - Duration::minutes(5));
        assert_eq!(
            note.status_at(now, Duration::minutes(15)),
            NoteStatus::Locked
        );
    }

    #[test]
    fn test_status_lease_expired_is_reclaimable() {
        let mut note = sample_note();
        let now = Utc::now();
        note.lock_started_at = Some(now - Duration::minutes(20));
        assert_eq!(
            note.status_at(now, Duration::minutes(15)),
            NoteStatus::Pending
        );
        assert!(note.is_leasable_at(now, Duration::minutes(15)));
    }

    #[test]
    fn test_status_completed_wins_over_lease() {
        let mut note = sample_note();
        let now = Utc::now();
        note.completed_at = Some(now);
        note.lock_started_at = Some(now);
        assert_eq!(
            note.status_at(now, Duration::minutes(15)),
            NoteStatus::Completed
        );
        assert!(!note.is_leasable_at(now, Duration::minutes(15)));
    }

    #[test]
    fn test_status_failed_after_error_recorded() {
        let mut note = sample_note();
        note.last_error_category = Some(ErrorCategory::Analysis);
        note.last_error_message = Some("model refused".to_string());
        assert_eq!(note.status(Duration::minutes(15)), NoteStatus::Failed);
    }

    #[test]
    fn test_outcome_success_classification() {
        let id = Uuid::new_v4();
        assert!(ProcessingOutcome::Completed { note_id: id }.is_success());
        assert!(ProcessingOutcome::AlreadyProcessed { note_id: id }.is_success());
        assert!(ProcessingOutcome::TranscribedOnly {
            note_id: id,
            category: ErrorCategory::Analysis,
            message: "x".into()
        }
        .is_success());
        assert!(!ProcessingOutcome::Failed {
            note_id: id,
            category: ErrorCategory::Storage,
            message: "x".into()
        }
        .is_success());
        assert!(!ProcessingOutcome::Skipped { note_id: id }.is_success());
    }

    #[test]
    fn test_outcome_serde_tagging() {
        let outcome = ProcessingOutcome::Failed {
            note_id: Uuid::nil(),
            category: ErrorCategory::RateLimit,
            message: "429".to_string(),
        };
        let json = serde_json::to_value(&outcome).unwrap();
        assert_eq!(json["outcome"], "failed");
        assert_eq!(json["category"], "rate_limit");
    }

    #[test]
    fn test_note_serde_round_trip() {
        let note = sample_note();
        let json = serde_json::to_string(&note).unwrap();
        let back: Note = serde_json::from_str(&json).unwrap();
        assert_eq!(back.id, note.id);
        assert_eq!(back.audio_ref, note.audio_ref);
        assert_eq!(back.expected_duration_secs, Some(60));
    }
}
