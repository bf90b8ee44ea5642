//! Error categorization for the note processing pipeline.
//!
//! Every failure is assigned one category. The category decides retry
//! eligibility, feeds the circuit breaker's failure histogram, drives the
//! scheduler's adaptive delay, and maps to status codes at the API
//! boundary.

use serde::{Deserialize, Serialize};

use crate::Error;

/// Category assigned to a processing failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    /// Lost the lease race (expected outcome, not an error).
    LockAcquisition,
    /// The note record could not be loaded.
    NoteFetch,
    /// An external call exceeded its deadline.
    Timeout,
    /// The transcription service failed.
    Transcription,
    /// The analysis service failed.
    Analysis,
    /// Audio bytes could not be read from storage.
    Storage,
    /// The stored payload is not a processable media kind.
    MediaProcessing,
    /// Connection-level network failure.
    Network,
    /// The external service applied rate limiting.
    RateLimit,
    /// Authentication or authorization was rejected.
    Auth,
    /// The external service reported quota exhaustion.
    Quota,
    /// Short-circuited by an open circuit breaker.
    CircuitBreaker,
    /// Local resource exhaustion (memory, file handles).
    Resource,
    /// The input failed validation.
    Validation,
    /// Required configuration is missing or invalid.
    Configuration,
    /// Anything that matched no known pattern.
    Unknown,
}

impl ErrorCategory {
    /// Stable string form used for persistence and log fields.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::LockAcquisition => "lock_acquisition",
            Self::NoteFetch => "note_fetch",
            Self::Timeout => "timeout",
            Self::Transcription => "transcription",
            Self::Analysis => "analysis",
            Self::Storage => "storage",
            Self::MediaProcessing => "media_processing",
            Self::Network => "network",
            Self::RateLimit => "rate_limit",
            Self::Auth => "auth",
            Self::Quota => "quota",
            Self::CircuitBreaker => "circuit_breaker",
            Self::Resource => "resource",
            Self::Validation => "validation",
            Self::Configuration => "configuration",
            Self::Unknown => "unknown",
        }
    }

    /// Parse the stable string form. Unknown strings fall back to `Unknown`.
    pub fn parse(s: &str) -> Self {
        match s {
            "lock_acquisition" => Self::LockAcquisition,
            "note_fetch" => Self::NoteFetch,
            "timeout" => Self::Timeout,
            "transcription" => Self::Transcription,
            "analysis" => Self::Analysis,
            "storage" => Self::Storage,
            "media_processing" => Self::MediaProcessing,
            "network" => Self::Network,
            "rate_limit" => Self::RateLimit,
            "auth" => Self::Auth,
            "quota" => Self::Quota,
            "circuit_breaker" => Self::CircuitBreaker,
            "resource" => Self::Resource,
            "validation" => Self::Validation,
            "configuration" => Self::Configuration,
            _ => Self::Unknown,
        }
    }

    /// Whether the retry queue may re-attempt failures of this category.
    ///
    /// Only failures that plausibly resolve on their own qualify.
    /// Validation, auth, and configuration failures need a human.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::RateLimit | Self::Timeout | Self::Network)
    }

    /// Categorize an arbitrary error message by keyword.
    ///
    /// Pattern order matters: more specific signals (rate limiting, auth)
    /// are checked before generic ones (network, timeout).
    pub fn from_message(message: &str) -> Self {
        let msg = message.to_lowercase();

        if msg.contains("rate limit") || msg.contains("429") || msg.contains("too many requests") {
            Self::RateLimit
        } else if msg.contains("quota") || msg.contains("insufficient_quota") {
            Self::Quota
        } else if msg.contains("unauthorized")
            || msg.contains("401")
            || msg.contains("403")
            || msg.contains("api key")
            || msg.contains("forbidden")
        {
            Self::Auth
        } else if msg.contains("circuit open") || msg.contains("circuit breaker") {
            Self::CircuitBreaker
        } else if msg.contains("timeout") || msg.contains("timed out") || msg.contains("deadline") {
            Self::Timeout
        } else if msg.contains("connection")
            || msg.contains("network")
            || msg.contains("dns")
            || msg.contains("unreachable")
        {
            Self::Network
        } else if msg.contains("transcri") {
            Self::Transcription
        } else if msg.contains("analy") {
            Self::Analysis
        } else if msg.contains("media") || msg.contains("codec") || msg.contains("demux") {
            Self::MediaProcessing
        } else if msg.contains("storage") || msg.contains("no such file") || msg.contains("bucket")
        {
            Self::Storage
        } else if msg.contains("memory") || msg.contains("resource") {
            Self::Resource
        } else if msg.contains("validat") || msg.contains("invalid input") {
            Self::Validation
        } else if msg.contains("config") || msg.contains("missing env") {
            Self::Configuration
        } else if msg.contains("not found") {
            Self::NoteFetch
        } else {
            Self::Unknown
        }
    }

    /// Categorize a typed pipeline error.
    ///
    /// Typed variants map directly; string-carrying variants fall back to
    /// message inspection so service error bodies still categorize well.
    pub fn from_error(error: &Error) -> Self {
        match error {
            Error::CircuitOpen { .. } => Self::CircuitBreaker,
            Error::Timeout(_) => Self::Timeout,
            Error::NoteNotFound(_) => Self::NoteFetch,
            Error::Storage(_) | Error::Io(_) => Self::Storage,
            Error::Media(_) => Self::MediaProcessing,
            Error::InvalidInput(_) => Self::Validation,
            Error::Config(_) => Self::Configuration,
            Error::Transcription(msg) => {
                let inner = Self::from_message(msg);
                if inner.is_transient() || inner == Self::Auth || inner == Self::Quota {
                    inner
                } else {
                    Self::Transcription
                }
            }
            Error::Analysis(msg) => {
                let inner = Self::from_message(msg);
                if inner.is_transient() || inner == Self::Auth || inner == Self::Quota {
                    inner
                } else {
                    Self::Analysis
                }
            }
            Error::Request(msg) => {
                let inner = Self::from_message(msg);
                if inner == Self::Unknown {
                    Self::Network
                } else {
                    inner
                }
            }
            Error::Database(_) => Self::Storage,
            _ => Self::from_message(&error.to_string()),
        }
    }
}

impl std::fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
