//! # echonote-pipeline
//!
//! Orchestration layer for note processing:
//!
//! - [`NoteProcessor`] — runs one note through fetch, transcription,
//!   analysis, and saving, resolving to a [`ProcessingOutcome`]
//! - [`BatchScheduler`] — sweeps, selects, orders, and drains eligible
//!   notes under a wall-clock budget
//! - [`CircuitBreaker`] — shared breaker over the external AI services
//! - [`RetryQueue`] — deferred background retries for transient failures
//! - [`MetricsCollector`] — per-note records and a rolling summary
//!
//! Cross-process coordination happens entirely through the database
//! lease; everything in this crate is per-process state.

pub mod breaker;
pub mod metrics;
pub mod pipeline;
pub mod retry;
pub mod scheduler;

pub use breaker::{BreakerConfig, CircuitBreaker};
pub use metrics::{MetricsCollector, ProcessingRecord};
pub use pipeline::NoteProcessor;
pub use retry::{RetryOperation, RetryPolicy, RetryQueue};
pub use scheduler::{sort_candidates, BatchScheduler, SchedulerConfig};

pub use echonote_core::ProcessingOutcome;
