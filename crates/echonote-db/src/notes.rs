//! Note repository implementation.
//!
//! The processing lease lives on the note row itself (`lock_started_at`);
//! expiry is derived as `lock_started_at + lease_timeout`. Every lease
//! mutation is a single conditional UPDATE so that concurrent callers in
//! different processes race safely: `rows_affected() == 0` means the race
//! was lost (or the note is already completed), never an error.

use async_trait::async_trait;
use chrono::{Duration, Utc};
use serde_json::Value as JsonValue;
use sqlx::{Pool, Postgres, Row};
use tracing::{debug, error, warn};
use uuid::Uuid;

use echonote_core::{Error, ErrorCategory, Note, NoteRepository, Result};

use crate::capabilities::DbCapabilities;

/// PostgreSQL implementation of [`NoteRepository`].
#[derive(Clone)]
pub struct PgNoteRepository {
    pool: Pool<Postgres>,
    capabilities: DbCapabilities,
}

impl PgNoteRepository {
    /// Create a new repository over the given pool and resolved capabilities.
    pub fn new(pool: Pool<Postgres>, capabilities: DbCapabilities) -> Self {
        Self { pool, capabilities }
    }

    /// Column list for SELECT/RETURNING. When the optional duration column
    /// is absent the descriptor substitutes NULL so row parsing is uniform.
    fn columns(&self) -> &'static str {
        if self.capabilities.expected_duration {
            "id, owner_id, audio_ref, mime_type, transcription, analysis, attempts,
             last_error_category, last_error_message, recorded_at, expected_duration_secs,
             lock_started_at, completed_at, created_at"
        } else {
            "id, owner_id, audio_ref, mime_type, transcription, analysis, attempts,
             last_error_category, last_error_message, recorded_at,
             NULL::integer AS expected_duration_secs,
             lock_started_at, completed_at, created_at"
        }
    }

    /// Parse a note row into a Note struct.
    fn parse_note_row(row: sqlx::postgres::PgRow) -> Note {
        let category: Option<String> = row.get("last_error_category");
        Note {
            id: row.get("id"),
            owner_id: row.get("owner_id"),
            audio_ref: row.get("audio_ref"),
            mime_type: row.get("mime_type"),
            transcription: row.get("transcription"),
            analysis: row.get("analysis"),
            attempts: row.get("attempts"),
            last_error_category: category.as_deref().map(ErrorCategory::parse),
            last_error_message: row.get("last_error_message"),
            recorded_at: row.get("recorded_at"),
            expected_duration_secs: row.get("expected_duration_secs"),
            lock_started_at: row.get("lock_started_at"),
            completed_at: row.get("completed_at"),
            created_at: row.get("created_at"),
        }
    }
}

#[async_trait]
impl NoteRepository for PgNoteRepository {
    async fn get(&self, note_id: Uuid) -> Result<Option<Note>> {
        let query = format!("SELECT {} FROM note WHERE id = $1", self.columns());
        let row = sqlx::query(&query)
            .bind(note_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(Error::Database)?;

        Ok(row.map(Self::parse_note_row))
    }

    async fn fetch_eligible(&self, limit: i64, lease_timeout: Duration) -> Result<Vec<Note>> {
        let cutoff = Utc::now() - lease_timeout;
        let query = format!(
            "SELECT {} FROM note
             WHERE completed_at IS NULL
               AND (lock_started_at IS NULL OR lock_started_at < $1)
             ORDER BY recorded_at ASC
             LIMIT $2",
            self.columns()
        );

        let rows = sqlx::query(&query)
            .bind(cutoff)
            .bind(limit)
            .fetch_all(&self.pool)
            .await
            .map_err(Error::Database)?;

        Ok(rows.into_iter().map(Self::parse_note_row).collect())
    }

    async fn acquire_lock(&self, note_id: Uuid, lease_timeout: Duration) -> Result<bool> {
        let now = Utc::now();
        let cutoff = now - lease_timeout;

        // One conditional UPDATE against the source of truth. Either we
        // take the lease (no unexpired lease, not completed) or the row
        // count says somebody else holds it.
        let result = sqlx::query(
            "UPDATE note
             SET lock_started_at = $1
             WHERE id = $2
               AND completed_at IS NULL
               AND (lock_started_at IS NULL OR lock_started_at < $3)",
        )
        .bind(now)
        .bind(note_id)
        .bind(cutoff)
        .execute(&self.pool)
        .await
        .map_err(Error::Database)?;

        let acquired = result.rows_affected() == 1;
        debug!(
            subsystem = "db",
            component = "notes",
            op = "acquire_lock",
            note_id = %note_id,
            success = acquired,
            "Lease acquisition attempted"
        );
        Ok(acquired)
    }

    async fn acquire_lock_for_reprocess(
        &self,
        note_id: Uuid,
        lease_timeout: Duration,
    ) -> Result<bool> {
        let now = Utc::now();
        let cutoff = now - lease_timeout;

        // Completion does not block a forced run, but a live lease still
        // does; clearing completed_at rides the same conditional UPDATE
        // so no other worker can observe a half-reopened note.
        let result = sqlx::query(
            "UPDATE note
             SET lock_started_at = $1,
                 completed_at = NULL
             WHERE id = $2
               AND (lock_started_at IS NULL OR lock_started_at < $3)",
        )
        .bind(now)
        .bind(note_id)
        .bind(cutoff)
        .execute(&self.pool)
        .await
        .map_err(Error::Database)?;

        let acquired = result.rows_affected() == 1;
        debug!(
            subsystem = "db",
            component = "notes",
            op = "acquire_lock_for_reprocess",
            note_id = %note_id,
            success = acquired,
            "Forced lease acquisition attempted"
        );
        Ok(acquired)
    }

    async fn release_lock(&self, note_id: Uuid) -> Result<()> {
        sqlx::query("UPDATE note SET lock_started_at = NULL WHERE id = $1")
            .bind(note_id)
            .execute(&self.pool)
            .await
            .map_err(Error::Database)?;
        Ok(())
    }

    async fn release_lock_with_error(
        &self,
        note_id: Uuid,
        category: ErrorCategory,
        message: &str,
    ) -> Result<()> {
        let result = sqlx::query(
            "UPDATE note
             SET lock_started_at = NULL,
                 attempts = attempts + 1,
                 last_error_category = $1,
                 last_error_message = $2
             WHERE id = $3",
        )
        .bind(category.as_str())
        .bind(message)
        .bind(note_id)
        .execute(&self.pool)
        .await;

        // Must not propagate: a bookkeeping failure would otherwise leave
        // the caller believing the note is still leased. The row's lease
        // expires and gets swept if this write was lost.
        if let Err(e) = result {
            error!(
                subsystem = "db",
                component = "notes",
                op = "release_lock_with_error",
                note_id = %note_id,
                category = category.as_str(),
                error = %e,
                "Failed to record processing error; lease left to expire"
            );
        }
        Ok(())
    }

    async fn sweep_abandoned(&self, timeout: Duration) -> Result<u64> {
        let cutoff = Utc::now() - timeout;

        let result = sqlx::query(
            "UPDATE note
             SET lock_started_at = NULL
             WHERE completed_at IS NULL
               AND lock_started_at IS NOT NULL
               AND lock_started_at < $1",
        )
        .bind(cutoff)
        .execute(&self.pool)
        .await
        .map_err(Error::Database)?;

        let swept = result.rows_affected();
        if swept > 0 {
            warn!(
                subsystem = "db",
                component = "notes",
                op = "sweep",
                swept_count = swept,
                "Reclaimed abandoned processing leases"
            );
        }
        Ok(swept)
    }

    async fn persist_transcription(&self, note_id: Uuid, text: &str) -> Result<()> {
        let result = sqlx::query("UPDATE note SET transcription = $1 WHERE id = $2")
            .bind(text)
            .bind(note_id)
            .execute(&self.pool)
            .await
            .map_err(Error::Database)?;

        if result.rows_affected() == 0 {
            return Err(Error::NoteNotFound(note_id));
        }
        Ok(())
    }

    async fn persist_result(
        &self,
        note_id: Uuid,
        transcription: &str,
        analysis: &JsonValue,
    ) -> Result<()> {
        let result = sqlx::query(
            "UPDATE note
             SET transcription = $1,
                 analysis = $2,
                 completed_at = $3,
                 lock_started_at = NULL,
                 last_error_category = NULL,
                 last_error_message = NULL
             WHERE id = $4",
        )
        .bind(transcription)
        .bind(analysis)
        .bind(Utc::now())
        .bind(note_id)
        .execute(&self.pool)
        .await
        .map_err(Error::Database)?;

        if result.rows_affected() == 0 {
            return Err(Error::NoteNotFound(note_id));
        }
        Ok(())
    }
}
