//! # echonote-inference
//!
//! Clients for the external AI services the pipeline depends on:
//!
//! - [`TranscriptionBackend`] — audio-to-text (OpenAI-compatible Whisper)
//! - [`AnalysisBackend`] — transcript + owner context to structured
//!   analysis (OpenAI-compatible chat completion)
//!
//! Both services are black boxes reachable over request/response HTTP;
//! resilience (circuit breaking, retries) is layered on by
//! `echonote-pipeline`, not here.

pub mod analysis;
pub mod transcription;

pub use analysis::{AnalysisBackend, ChatAnalysisBackend, NoteAnalysis};
pub use transcription::{
    TranscriptionBackend, TranscriptionResult, TranscriptionSegment, WhisperBackend,
};
