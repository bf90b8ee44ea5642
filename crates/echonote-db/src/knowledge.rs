//! Owner knowledge repository.
//!
//! Accumulated knowledge is one row per owner: a free-text context blob
//! plus a JSONB insights document that analysis outputs are folded into.

use async_trait::async_trait;
use serde_json::Value as JsonValue;
use sqlx::{Pool, Postgres, Row};
use tracing::debug;
use uuid::Uuid;

use echonote_core::{Error, KnowledgeRepository, Result};

use crate::capabilities::DbCapabilities;

/// PostgreSQL implementation of [`KnowledgeRepository`].
#[derive(Clone)]
pub struct PgKnowledgeRepository {
    pool: Pool<Postgres>,
    capabilities: DbCapabilities,
}

impl PgKnowledgeRepository {
    pub fn new(pool: Pool<Postgres>, capabilities: DbCapabilities) -> Self {
        Self { pool, capabilities }
    }
}

#[async_trait]
impl KnowledgeRepository for PgKnowledgeRepository {
    async fn context_for(&self, owner_id: Uuid) -> Result<String> {
        if !self.capabilities.owner_knowledge {
            return Ok(String::new());
        }

        let row = sqlx::query("SELECT context, insights FROM owner_knowledge WHERE owner_id = $1")
            .bind(owner_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(Error::Database)?;

        let Some(row) = row else {
            return Ok(String::new());
        };

        let context: Option<String> = row.get("context");
        let insights: Option<JsonValue> = row.get("insights");

        let mut parts = Vec::new();
        if let Some(ctx) = context.filter(|c| !c.is_empty()) {
            parts.push(ctx);
        }
        if let Some(insights) = insights {
            if !insights.is_null() {
                parts.push(format!("Prior insights: {}", insights));
            }
        }
        Ok(parts.join("\n\n"))
    }

    async fn fold_insights(&self, owner_id: Uuid, insights: &JsonValue) -> Result<()> {
        if !self.capabilities.owner_knowledge {
            debug!(
                subsystem = "db",
                component = "knowledge",
                owner_id = %owner_id,
                "owner_knowledge table absent; insights not folded"
            );
            return Ok(());
        }

        sqlx::query(
            "INSERT INTO owner_knowledge (owner_id, insights, updated_at)
             VALUES ($1, $2, NOW())
             ON CONFLICT (owner_id)
             DO UPDATE SET insights = COALESCE(owner_knowledge.insights, '{}'::jsonb) || $2,
                           updated_at = NOW()",
        )
        .bind(owner_id)
        .bind(insights)
        .execute(&self.pool)
        .await
        .map_err(Error::Database)?;

        Ok(())
    }
}
