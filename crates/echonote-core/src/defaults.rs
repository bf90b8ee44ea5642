//! Centralized default constants for the echonote pipeline.
//!
//! **This module is the single source of truth** for all shared default
//! values. All crates reference these constants instead of defining their
//! own magic numbers.
//!
//! Organized by domain area. When adding new constants, place them in the
//! appropriate section and document the rationale for the chosen value.

// =============================================================================
// PROCESSING LEASE
// =============================================================================

/// Default lease timeout in minutes. Long enough for a slow transcription
/// of a long recording, short enough that a crashed worker does not block
/// its note for more than one or two batch cycles.
pub const LEASE_TIMEOUT_MINUTES: i64 = 15;

// =============================================================================
// CIRCUIT BREAKER
// =============================================================================

/// Consecutive failures before the breaker opens.
pub const BREAKER_THRESHOLD: u32 = 5;

/// Cool-down in seconds while the breaker is open.
pub const BREAKER_COOL_DOWN_SECS: u64 = 30;

// =============================================================================
// RETRY QUEUE
// =============================================================================

/// Maximum deferred retry attempts per note.
pub const RETRY_MAX_ATTEMPTS: u32 = 3;

/// Base backoff delay in milliseconds (doubled per attempt).
pub const RETRY_BASE_DELAY_MS: u64 = 2_000;

/// Backoff cap in milliseconds.
pub const RETRY_MAX_DELAY_MS: u64 = 60_000;

// =============================================================================
// BATCH SCHEDULER
// =============================================================================

/// Upper bound on candidates per batch, regardless of the requested size.
pub const BATCH_MAX_SIZE: usize = 20;

/// Wall-clock budget for one batch run in seconds (serverless-style limit,
/// kept under typical 10-minute execution caps).
pub const BATCH_BUDGET_SECS: u64 = 540;

/// Inter-note delay when the external services look healthy, milliseconds.
pub const DELAY_NORMAL_MS: u64 = 500;

/// Inter-note delay under elevated failures, milliseconds.
pub const DELAY_ELEVATED_MS: u64 = 2_000;

/// Inter-note delay while the circuit breaker is open, milliseconds.
pub const DELAY_OPEN_MS: u64 = 5_000;

/// Consecutive breaker failures considered "elevated" for delay tuning.
pub const ELEVATED_FAILURE_THRESHOLD: u32 = 2;

// =============================================================================
// METRICS
// =============================================================================

/// How many completed per-note metric records are retained for observability.
pub const METRICS_WINDOW: usize = 100;

/// Rolling summary reset cadence in seconds (bounds memory).
pub const SUMMARY_RESET_SECS: i64 = 3_600;

// =============================================================================
// AI SERVICES
// =============================================================================

/// Timeout for transcription requests in seconds (long audio).
pub const TRANSCRIBE_TIMEOUT_SECS: u64 = 300;

/// Timeout for analysis requests in seconds.
pub const ANALYZE_TIMEOUT_SECS: u64 = 120;

/// Default transcription model name.
pub const DEFAULT_WHISPER_MODEL: &str = "whisper-1";

/// Default analysis model name.
pub const DEFAULT_ANALYSIS_MODEL: &str = "gpt-4o-mini";

// =============================================================================
// SERVER
// =============================================================================

/// Default HTTP server port.
pub const SERVER_PORT: u16 = 3000;

// =============================================================================
// ENVIRONMENT VARIABLE NAMES
// =============================================================================

pub const ENV_DATABASE_URL: &str = "DATABASE_URL";
pub const ENV_AUDIO_STORE_PATH: &str = "AUDIO_STORE_PATH";
pub const ENV_WHISPER_BASE_URL: &str = "WHISPER_BASE_URL";
pub const ENV_WHISPER_MODEL: &str = "WHISPER_MODEL";
pub const ENV_ANALYSIS_BASE_URL: &str = "ANALYSIS_BASE_URL";
pub const ENV_ANALYSIS_API_KEY: &str = "ANALYSIS_API_KEY";
pub const ENV_ANALYSIS_MODEL: &str = "ANALYSIS_MODEL";
pub const ENV_LEASE_TIMEOUT_MINUTES: &str = "LEASE_TIMEOUT_MINUTES";
pub const ENV_BREAKER_THRESHOLD: &str = "BREAKER_THRESHOLD";
pub const ENV_BREAKER_COOL_DOWN_SECS: &str = "BREAKER_COOL_DOWN_SECS";
pub const ENV_BATCH_MAX_SIZE: &str = "BATCH_MAX_SIZE";
pub const ENV_BATCH_BUDGET_SECS: &str = "BATCH_BUDGET_SECS";
pub const ENV_SERVER_PORT: &str = "PORT";

/// Parse an environment override for one of the `ENV_*` variables above,
/// warning (not failing) on garbage so a typo degrades to the default.
pub fn env_parse<T: std::str::FromStr>(name: &str) -> Option<T> {
    let raw = std::env::var(name).ok()?;
    match raw.parse() {
        Ok(value) => Some(value),
        Err(_) => {
            tracing::warn!(
                subsystem = "config",
                env_var = name,
                value = %raw,
                "Unparseable environment override; using default"
            );
            None
        }
    }
}
