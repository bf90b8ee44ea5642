//! Startup capability detection for optional schema surfaces.
//!
//! Older deployments may lack the `expected_duration_secs` column or the
//! `owner_knowledge` table. Their presence is probed ONCE at startup and
//! carried as a descriptor; repositories branch on the descriptor instead
//! of re-querying `information_schema` per operation. Absence degrades the
//! ordering tie-break and knowledge folding, never correctness.

use sqlx::{Pool, Postgres};
use tracing::info;

use echonote_core::{Error, Result};

/// Optional schema surfaces resolved at startup.
#[derive(Debug, Clone, Copy)]
pub struct DbCapabilities {
    /// `note.expected_duration_secs` column exists.
    pub expected_duration: bool,
    /// `owner_knowledge` table exists.
    pub owner_knowledge: bool,
}

impl DbCapabilities {
    /// Assume everything is present (in-memory fixtures, fresh schemas).
    pub fn full() -> Self {
        Self {
            expected_duration: true,
            owner_knowledge: true,
        }
    }

    /// Probe the connected database once.
    pub async fn detect(pool: &Pool<Postgres>) -> Result<Self> {
        let expected_duration: bool = sqlx::query_scalar(
            "SELECT EXISTS (
                 SELECT 1 FROM information_schema.columns
                 WHERE table_name = 'note' AND column_name = 'expected_duration_secs'
             )",
        )
        .fetch_one(pool)
        .await
        .map_err(Error::Database)?;

        let owner_knowledge: bool = sqlx::query_scalar(
            "SELECT EXISTS (
                 SELECT 1 FROM information_schema.tables
                 WHERE table_name = 'owner_knowledge'
             )",
        )
        .fetch_one(pool)
        .await
        .map_err(Error::Database)?;

        let caps = Self {
            expected_duration,
            owner_knowledge,
        };

        info!(
            subsystem = "db",
            component = "capabilities",
            expected_duration = caps.expected_duration,
            owner_knowledge = caps.owner_knowledge,
            "Database capabilities resolved"
        );

        Ok(caps)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_full_capabilities() {
        let caps = DbCapabilities::full();
        assert!(caps.expected_duration);
        assert!(caps.owner_knowledge);
    }
}
