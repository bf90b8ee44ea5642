//! # echonote-db
//!
//! PostgreSQL persistence layer for echonote.
//!
//! This crate provides:
//! - Connection pool management
//! - The note repository with atomic lease operations
//! - The per-owner knowledge repository
//! - A filesystem audio object store
//! - One-shot database capability detection
//!
//! ## Example
//!
//! ```rust,ignore
//! use echonote_db::Database;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let db = Database::connect("postgres://localhost/echonote").await?;
//!     let swept = db.notes.sweep_abandoned(chrono::Duration::minutes(15)).await?;
//!     println!("reclaimed {swept} leases");
//!     Ok(())
//! }
//! ```

pub mod audio;
pub mod capabilities;
pub mod knowledge;
pub mod notes;
pub mod pool;

// Re-export core types
pub use echonote_core::*;

pub use audio::FsAudioStore;
pub use capabilities::DbCapabilities;
pub use knowledge::PgKnowledgeRepository;
pub use notes::PgNoteRepository;
pub use pool::{create_pool, create_pool_with_config, PoolConfig};

use echonote_core::Result;

/// Combined database context with all repositories.
#[derive(Clone)]
pub struct Database {
    /// The underlying connection pool.
    pub pool: sqlx::Pool<sqlx::Postgres>,
    /// Capabilities resolved once at connect time.
    pub capabilities: DbCapabilities,
    /// Note repository with lease operations.
    pub notes: PgNoteRepository,
    /// Per-owner accumulated knowledge.
    pub knowledge: PgKnowledgeRepository,
}

impl Database {
    /// Create a Database from an existing pool, probing capabilities once.
    pub async fn from_pool(pool: sqlx::Pool<sqlx::Postgres>) -> Result<Self> {
        let capabilities = DbCapabilities::detect(&pool).await?;
        Ok(Self {
            notes: PgNoteRepository::new(pool.clone(), capabilities),
            knowledge: PgKnowledgeRepository::new(pool.clone(), capabilities),
            capabilities,
            pool,
        })
    }

    /// Connect to the given URL with default pool configuration.
    pub async fn connect(url: &str) -> Result<Self> {
        let pool = create_pool(url).await?;
        Self::from_pool(pool).await
    }

    /// Connect with custom pool configuration.
    pub async fn connect_with_config(url: &str, config: PoolConfig) -> Result<Self> {
        let pool = create_pool_with_config(url, config).await?;
        Self::from_pool(pool).await
    }

    /// Run pending migrations.
    #[cfg(feature = "migrations")]
    pub async fn migrate(&self) -> Result<()> {
        sqlx::migrate!("../../migrations")
            .run(&self.pool)
            .await
            .map_err(|e| Error::Database(sqlx::Error::Migrate(Box::new(e))))?;
        Ok(())
    }

    /// Get the underlying connection pool.
    pub fn pool(&self) -> &sqlx::Pool<sqlx::Postgres> {
        &self.pool
    }
}
