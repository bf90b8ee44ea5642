//! Per-note processing pipeline.
//!
//! `NoteProcessor::process` runs one note through fetch, transcription,
//! analysis, and saving, and always resolves to a [`ProcessingOutcome`].
//! Failures never propagate as `Err` out of `process`: the outcome enum
//! is the control flow, and the scheduler pattern-matches on it.
//!
//! The processor owns lease acquisition so that single-note requests and
//! batch runs share one code path; losing the lease race surfaces as
//! `Skipped`, never as an error.

use std::sync::Arc;
use std::time::Instant;

use chrono::Duration;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use echonote_core::{
    defaults, detect_media_kind, AudioStore, ErrorCategory, KnowledgeRepository, MediaKind, Note,
    NoteRepository, ProcessingOutcome,
};
use echonote_inference::{AnalysisBackend, TranscriptionBackend};

use crate::breaker::CircuitBreaker;
use crate::metrics::MetricsCollector;

/// Failure inside the staged section of a run, after the lease is held.
struct StageFailure {
    stage: &'static str,
    category: ErrorCategory,
    message: String,
    /// True once a transcription is persisted (this run or a prior one);
    /// decides between the hard failure and the transcribed-only warning.
    transcribed: bool,
}

impl StageFailure {
    fn from_error(stage: &'static str, e: &echonote_core::Error, transcribed: bool) -> Self {
        Self {
            stage,
            category: ErrorCategory::from_error(e),
            message: e.to_string(),
            transcribed,
        }
    }
}

/// Runs single notes through the full pipeline.
pub struct NoteProcessor {
    notes: Arc<dyn NoteRepository>,
    knowledge: Arc<dyn KnowledgeRepository>,
    audio: Arc<dyn AudioStore>,
    transcriber: Arc<dyn TranscriptionBackend>,
    analyzer: Arc<dyn AnalysisBackend>,
    breaker: Arc<CircuitBreaker>,
    metrics: Arc<MetricsCollector>,
    lease_timeout: Duration,
}

impl NoteProcessor {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        notes: Arc<dyn NoteRepository>,
        knowledge: Arc<dyn KnowledgeRepository>,
        audio: Arc<dyn AudioStore>,
        transcriber: Arc<dyn TranscriptionBackend>,
        analyzer: Arc<dyn AnalysisBackend>,
        breaker: Arc<CircuitBreaker>,
        metrics: Arc<MetricsCollector>,
    ) -> Self {
        Self {
            notes,
            knowledge,
            audio,
            transcriber,
            analyzer,
            breaker,
            metrics,
            lease_timeout: Duration::minutes(defaults::LEASE_TIMEOUT_MINUTES),
        }
    }

    /// Override the lease timeout.
    pub fn with_lease_timeout(mut self, lease_timeout: Duration) -> Self {
        self.lease_timeout = lease_timeout;
        self
    }

    pub fn lease_timeout(&self) -> Duration {
        self.lease_timeout
    }

    /// Process one note end to end.
    ///
    /// `force` reprocesses a completed note from scratch. Without it, a
    /// completed note short-circuits before any lease or service call.
    pub async fn process(&self, note_id: Uuid, force: bool) -> ProcessingOutcome {
        let note = match self.notes.get(note_id).await {
            Ok(Some(note)) => note,
            Ok(None) => {
                warn!(
                    subsystem = "pipeline",
                    component = "processor",
                    note_id = %note_id,
                    "Note not found"
                );
                return ProcessingOutcome::Failed {
                    note_id,
                    category: ErrorCategory::NoteFetch,
                    message: format!("note {note_id} not found"),
                };
            }
            Err(e) => {
                error!(
                    subsystem = "pipeline",
                    component = "processor",
                    note_id = %note_id,
                    error = %e,
                    "Failed to load note"
                );
                return ProcessingOutcome::Failed {
                    note_id,
                    category: ErrorCategory::from_error(&e),
                    message: e.to_string(),
                };
            }
        };

        if note.completed_at.is_some() && !force {
            debug!(
                subsystem = "pipeline",
                component = "processor",
                note_id = %note_id,
                "Note already processed"
            );
            return ProcessingOutcome::AlreadyProcessed { note_id };
        }

        // A forced run must reopen a completed note, which the normal
        // lease conditional refuses; both paths still lose cleanly to a
        // live lease.
        let acquired = if force {
            self.notes
                .acquire_lock_for_reprocess(note_id, self.lease_timeout)
                .await
        } else {
            self.notes.acquire_lock(note_id, self.lease_timeout).await
        };
        match acquired {
            Ok(true) => {}
            Ok(false) => {
                debug!(
                    subsystem = "pipeline",
                    component = "processor",
                    note_id = %note_id,
                    "Lost the lease race; skipping"
                );
                return ProcessingOutcome::Skipped { note_id };
            }
            Err(e) => {
                error!(
                    subsystem = "pipeline",
                    component = "processor",
                    note_id = %note_id,
                    error = %e,
                    "Lease acquisition errored"
                );
                return ProcessingOutcome::Failed {
                    note_id,
                    category: ErrorCategory::LockAcquisition,
                    message: e.to_string(),
                };
            }
        }

        self.metrics.run_started(note_id, note.attempts);
        let started = Instant::now();

        match self.run_stages(&note, force).await {
            Ok(()) => {
                self.metrics.run_finished(note_id, true, None);
                info!(
                    subsystem = "pipeline",
                    component = "processor",
                    op = "process",
                    note_id = %note_id,
                    owner_id = %note.owner_id,
                    attempt = note.attempts,
                    duration_ms = started.elapsed().as_millis() as u64,
                    success = true,
                    "Note processed"
                );
                ProcessingOutcome::Completed { note_id }
            }
            Err(failure) => {
                if let Err(e) = self
                    .notes
                    .release_lock_with_error(note_id, failure.category, &failure.message)
                    .await
                {
                    // The lease will expire and be swept; do not mask the
                    // original failure.
                    error!(
                        subsystem = "pipeline",
                        component = "processor",
                        note_id = %note_id,
                        error = %e,
                        "Failed to release lease after error"
                    );
                }
                self.metrics
                    .run_finished(note_id, failure.transcribed, Some(failure.category));

                if failure.transcribed {
                    warn!(
                        subsystem = "pipeline",
                        component = "processor",
                        op = "process",
                        note_id = %note_id,
                        stage = failure.stage,
                        category = %failure.category,
                        error = %failure.message,
                        duration_ms = started.elapsed().as_millis() as u64,
                        "Transcription persisted but the run did not complete"
                    );
                    ProcessingOutcome::TranscribedOnly {
                        note_id,
                        category: failure.category,
                        message: failure.message,
                    }
                } else {
                    warn!(
                        subsystem = "pipeline",
                        component = "processor",
                        op = "process",
                        note_id = %note_id,
                        stage = failure.stage,
                        category = %failure.category,
                        error = %failure.message,
                        duration_ms = started.elapsed().as_millis() as u64,
                        success = false,
                        "Note processing failed"
                    );
                    ProcessingOutcome::Failed {
                        note_id,
                        category: failure.category,
                        message: failure.message,
                    }
                }
            }
        }
    }

    /// The staged section of a run: everything that happens while the
    /// lease is held.
    async fn run_stages(&self, note: &Note, force: bool) -> Result<(), StageFailure> {
        // Stage: transcription. A persisted transcription from an earlier
        // partial run is reused so retries go straight to analysis.
        let transcription = match (&note.transcription, force) {
            (Some(text), false) => {
                debug!(
                    subsystem = "pipeline",
                    component = "processor",
                    note_id = %note.id,
                    stage = "transcription",
                    "Reusing persisted transcription"
                );
                text.clone()
            }
            _ => self.transcribe(note).await?,
        };

        // Owner context is best-effort; analysis without it is still worth
        // having.
        let context = match self.knowledge.context_for(note.owner_id).await {
            Ok(context) => context,
            Err(e) => {
                warn!(
                    subsystem = "pipeline",
                    component = "processor",
                    note_id = %note.id,
                    owner_id = %note.owner_id,
                    error = %e,
                    "Knowledge context unavailable; analyzing without it"
                );
                String::new()
            }
        };

        // Stage: analysis. The clock starts here so context assembly
        // latency does not pollute the analysis stage duration.
        self.metrics.stage_started(note.id, "analysis");
        let stage_start = Instant::now();
        let analysis = self
            .breaker
            .execute(|| self.analyzer.analyze(&transcription, &context))
            .await
            .map_err(|e| StageFailure::from_error("analysis", &e, true))?;
        self.metrics.stage_completed(
            note.id,
            "analysis",
            stage_start.elapsed().as_millis() as u64,
        );

        // Stage: saving.
        self.metrics.stage_started(note.id, "saving");
        let stage_start = Instant::now();
        self.notes
            .persist_result(note.id, &transcription, &analysis.to_value())
            .await
            .map_err(|e| StageFailure::from_error("saving", &e, true))?;
        self.metrics
            .stage_completed(note.id, "saving", stage_start.elapsed().as_millis() as u64);

        // Folding insights into owner knowledge is best-effort: the note
        // is already completed.
        if let Some(insights) = &analysis.insights {
            if let Err(e) = self.knowledge.fold_insights(note.owner_id, insights).await {
                warn!(
                    subsystem = "pipeline",
                    component = "processor",
                    note_id = %note.id,
                    owner_id = %note.owner_id,
                    error = %e,
                    "Failed to fold insights into owner knowledge"
                );
            }
        }

        Ok(())
    }

    /// Fetch audio, validate the media kind, transcribe, and persist the
    /// transcript as partial progress.
    async fn transcribe(&self, note: &Note) -> Result<String, StageFailure> {
        self.metrics.stage_started(note.id, "fetch");
        let stage_start = Instant::now();
        let audio = self
            .audio
            .fetch(&note.audio_ref)
            .await
            .map_err(|e| StageFailure::from_error("fetch", &e, false))?;
        self.metrics
            .stage_completed(note.id, "fetch", stage_start.elapsed().as_millis() as u64);

        if detect_media_kind(&audio.mime_type) == MediaKind::Other {
            return Err(StageFailure {
                stage: "transcription",
                category: ErrorCategory::MediaProcessing,
                message: format!("unprocessable media type: {}", audio.mime_type),
                transcribed: false,
            });
        }

        self.metrics.stage_started(note.id, "transcription");
        let stage_start = Instant::now();
        let result = self
            .breaker
            .execute(|| self.transcriber.transcribe(&audio.bytes, &audio.mime_type, None))
            .await
            .map_err(|e| StageFailure::from_error("transcription", &e, false))?;

        self.notes
            .persist_transcription(note.id, &result.full_text)
            .await
            .map_err(|e| StageFailure::from_error("saving", &e, false))?;
        self.metrics.stage_completed(
            note.id,
            "transcription",
            stage_start.elapsed().as_millis() as u64,
        );

        debug!(
            subsystem = "pipeline",
            component = "processor",
            note_id = %note.id,
            stage = "transcription",
            duration_ms = stage_start.elapsed().as_millis() as u64,
            "Transcription persisted"
        );
        Ok(result.full_text)
    }
}
