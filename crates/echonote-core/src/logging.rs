//! Structured logging schema and field name constants for echonote.
//!
//! All crates use these constants for consistent structured logging fields
//! so log aggregation tools can query by standardized names across every
//! subsystem.
//!
//! ## Log Level Contract
//!
//! | Level | Usage |
//! |-------|-------|
//! | ERROR | Degraded service, requires operator attention |
//! | WARN  | Recoverable issue, automatic fallback applied |
//! | INFO  | Lifecycle events (startup, shutdown), operation completions |
//! | DEBUG | Decision points, intermediate values, config choices |
//! | TRACE | Per-item iteration, high-volume data |

// ─── Identity fields ───────────────────────────────────────────────────────

/// Subsystem originating the log event.
/// Values: "api", "db", "inference", "pipeline"
pub const SUBSYSTEM: &str = "subsystem";

/// Component within a subsystem.
/// Examples: "scheduler", "breaker", "retry_queue", "pool", "whisper"
pub const COMPONENT: &str = "component";

/// Logical operation name.
/// Examples: "process", "process_batch", "acquire_lock", "sweep"
pub const OPERATION: &str = "op";

// ─── Entity fields ─────────────────────────────────────────────────────────

/// Note UUID being operated on.
pub const NOTE_ID: &str = "note_id";

/// Owner UUID of the note.
pub const OWNER_ID: &str = "owner_id";

/// Pipeline stage: "fetch", "transcription", "analysis", "saving".
pub const STAGE: &str = "stage";

/// Error category assigned to a failure.
pub const CATEGORY: &str = "category";

/// Processing attempt number (0 = fresh).
pub const ATTEMPT: &str = "attempt";

// ─── Measurement fields ────────────────────────────────────────────────────

/// Wall-clock duration in milliseconds.
pub const DURATION_MS: &str = "duration_ms";

/// Number of batch candidates selected.
pub const CANDIDATE_COUNT: &str = "candidate_count";

/// Number of abandoned leases reclaimed by a sweep.
pub const SWEPT_COUNT: &str = "swept_count";

/// Consecutive failures tracked by the circuit breaker.
pub const CONSECUTIVE_FAILURES: &str = "consecutive_failures";

// ─── Database fields ───────────────────────────────────────────────────────

/// Number of active connections in the pool.
pub const POOL_SIZE: &str = "pool_size";

/// Number of idle connections in the pool.
pub const POOL_IDLE: &str = "pool_idle";

// ─── Inference fields ──────────────────────────────────────────────────────

/// Model name used for a service call.
pub const MODEL: &str = "model";

// ─── Outcome fields ────────────────────────────────────────────────────────

/// Boolean success/failure indicator.
pub const SUCCESS: &str = "success";

/// Error message when an operation fails.
pub const ERROR_MSG: &str = "error";
