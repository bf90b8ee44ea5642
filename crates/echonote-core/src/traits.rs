//! Repository and storage traits implemented by the database layer and by
//! in-memory fixtures in tests.

use async_trait::async_trait;
use chrono::Duration;
use serde_json::Value as JsonValue;
use uuid::Uuid;

use crate::{AudioObject, ErrorCategory, Note, Result};

/// Persistence seam for notes and their processing leases.
///
/// Multiple independent processes race over the same repository; the only
/// cross-process synchronization primitive is `acquire_lock`, which must be
/// a single conditional update against the source of truth. Implementations
/// must never expose unconditional writes to the lease fields.
#[async_trait]
pub trait NoteRepository: Send + Sync {
    /// Load one note by id.
    async fn get(&self, note_id: Uuid) -> Result<Option<Note>>;

    /// Fetch up to `limit` candidates that are not completed and hold no
    /// unexpired lease. Ordering is the scheduler's job.
    async fn fetch_eligible(&self, limit: i64, lease_timeout: Duration) -> Result<Vec<Note>>;

    /// Take the processing lease.
    ///
    /// Succeeds only if the note exists, is not completed, and has no
    /// unexpired lease. Returns `false` on a lost race or a completed
    /// note; losing the race is expected under concurrency and must be
    /// treated as "skip this cycle", not retried immediately.
    async fn acquire_lock(&self, note_id: Uuid, lease_timeout: Duration) -> Result<bool>;

    /// Take the processing lease for a forced reprocess, admitting
    /// completed notes.
    ///
    /// Same single conditional update as `acquire_lock`, but a completed
    /// note qualifies and its `completed_at` is cleared atomically with
    /// the lease. A live lease held by another worker still wins the
    /// race: `false` means skip, exactly as for `acquire_lock`.
    async fn acquire_lock_for_reprocess(
        &self,
        note_id: Uuid,
        lease_timeout: Duration,
    ) -> Result<bool>;

    /// Clear the lease. Idempotent.
    async fn release_lock(&self, note_id: Uuid) -> Result<()>;

    /// Clear the lease, increment `attempts`, and record the error.
    ///
    /// Idempotent, and must not propagate internal failures: a note must
    /// never stay leased in memory because error bookkeeping failed. On
    /// internal failure the implementation logs and returns `Ok(())`;
    /// the underlying lease then expires and is swept.
    async fn release_lock_with_error(
        &self,
        note_id: Uuid,
        category: ErrorCategory,
        message: &str,
    ) -> Result<()>;

    /// Clear leases older than `timeout`, returning the count reclaimed.
    /// Runs before every batch selection so crashed workers cannot starve
    /// their notes.
    async fn sweep_abandoned(&self, timeout: Duration) -> Result<u64>;

    /// Persist the transcription as partial progress, before analysis runs.
    async fn persist_transcription(&self, note_id: Uuid, text: &str) -> Result<()>;

    /// Persist the full result and mark the note completed, releasing the
    /// lease and clearing any prior error fields.
    async fn persist_result(
        &self,
        note_id: Uuid,
        transcription: &str,
        analysis: &JsonValue,
    ) -> Result<()>;
}

/// Accumulated per-owner knowledge used as analysis context.
#[async_trait]
pub trait KnowledgeRepository: Send + Sync {
    /// Assemble the context string passed to the analysis call.
    async fn context_for(&self, owner_id: Uuid) -> Result<String>;

    /// Fold select analysis outputs back into the owner's knowledge.
    /// Best-effort from the pipeline's point of view.
    async fn fold_insights(&self, owner_id: Uuid, insights: &JsonValue) -> Result<()>;
}

/// Raw audio object storage (external collaborator).
#[async_trait]
pub trait AudioStore: Send + Sync {
    /// Load the audio bytes and their MIME type for a stored reference.
    async fn fetch(&self, audio_ref: &str) -> Result<AudioObject>;
}
