//! # echonote-core
//!
//! Core types, traits, and abstractions shared across the echonote
//! workspace:
//!
//! - The `Error` enum and `Result` alias
//! - The failure taxonomy (`ErrorCategory`) and keyword categorization
//! - Note data model with derived lifecycle status
//! - Repository traits (`NoteRepository`, `KnowledgeRepository`,
//!   `AudioStore`) implemented by the database layer and test fixtures
//! - Centralized defaults and structured-logging field constants

pub mod category;
pub mod defaults;
pub mod error;
pub mod logging;
pub mod media;
pub mod models;
pub mod traits;

pub use category::ErrorCategory;
pub use error::{Error, Result};
pub use media::{detect_media_kind, extension_for_mime, MediaKind};
pub use models::{
    AudioObject, BatchReport, BreakerSnapshot, MetricsSummary, Note, NoteStatus, ProcessingOutcome,
};
pub use traits::{AudioStore, KnowledgeRepository, NoteRepository};
