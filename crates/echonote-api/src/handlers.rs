//! HTTP handlers: thin wrappers over the pipeline crate.

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::info;
use uuid::Uuid;

use echonote_core::{defaults, BatchReport, ErrorCategory, ProcessingOutcome};

use crate::state::AppState;

#[derive(Debug, Deserialize, Default)]
pub struct ProcessParams {
    /// Reprocess a completed note from scratch.
    #[serde(default)]
    pub force: bool,
}

/// Outcome payload with an explicit warning flag for partial success.
#[derive(Debug, Serialize)]
pub struct ProcessResponse {
    #[serde(flatten)]
    pub outcome: ProcessingOutcome,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub warning: bool,
}

/// POST /notes/{id}/process
pub async fn process_note(
    State(state): State<AppState>,
    Path(note_id): Path<Uuid>,
    Query(params): Query<ProcessParams>,
) -> Response {
    let outcome = state.processor.process(note_id, params.force).await;
    let status = status_for_outcome(&outcome);
    let warning = matches!(outcome, ProcessingOutcome::TranscribedOnly { .. });
    (status, Json(ProcessResponse { outcome, warning })).into_response()
}

#[derive(Debug, Deserialize, Default)]
pub struct BatchRequest {
    /// Requested batch size; clamped to the configured maximum.
    pub batch_size: Option<usize>,
}

/// POST /batch
pub async fn process_batch(
    State(state): State<AppState>,
    body: Option<Json<BatchRequest>>,
) -> Response {
    let requested = body
        .map(|Json(b)| b)
        .unwrap_or_default()
        .batch_size
        .unwrap_or(defaults::BATCH_MAX_SIZE);

    info!(
        subsystem = "api",
        op = "process_batch",
        requested,
        "Batch trigger received"
    );
    let report: BatchReport = state.scheduler.process_batch(requested).await;
    let status = if report.already_running {
        StatusCode::CONFLICT
    } else {
        StatusCode::OK
    };
    (status, Json(report)).into_response()
}

/// GET /health — liveness only.
pub async fn health() -> Response {
    Json(json!({ "status": "ok" })).into_response()
}

/// GET /health/pipeline — breaker, in-flight, retries, rolling summary.
pub async fn pipeline_health(State(state): State<AppState>) -> Response {
    let snapshot = state.breaker.snapshot();
    Json(json!({
        "breaker": snapshot,
        "in_flight": state.metrics.in_flight_count(),
        "retries_outstanding": state.retries.outstanding_count(),
        "batch_running": state.scheduler.is_batch_running(),
        "metrics": state.metrics.summary(),
    }))
    .into_response()
}

/// Map a pipeline outcome to an HTTP status.
///
/// Skips are 409 (someone else holds the lease). Failures split into
/// caller problems (4xx) and upstream problems (502/503); an open
/// breaker and rate limiting are 503 so clients back off.
fn status_for_outcome(outcome: &ProcessingOutcome) -> StatusCode {
    match outcome {
        ProcessingOutcome::Completed { .. }
        | ProcessingOutcome::AlreadyProcessed { .. }
        | ProcessingOutcome::TranscribedOnly { .. } => StatusCode::OK,
        ProcessingOutcome::Skipped { .. } => StatusCode::CONFLICT,
        ProcessingOutcome::Failed { category, .. } => match category {
            ErrorCategory::NoteFetch => StatusCode::NOT_FOUND,
            ErrorCategory::Validation
            | ErrorCategory::MediaProcessing
            | ErrorCategory::Configuration => StatusCode::UNPROCESSABLE_ENTITY,
            ErrorCategory::CircuitBreaker
            | ErrorCategory::RateLimit
            | ErrorCategory::Quota
            | ErrorCategory::LockAcquisition => StatusCode::SERVICE_UNAVAILABLE,
            _ => StatusCode::BAD_GATEWAY,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn failed(category: ErrorCategory) -> ProcessingOutcome {
        ProcessingOutcome::Failed {
            note_id: Uuid::nil(),
            category,
            message: "x".to_string(),
        }
    }

    #[test]
    fn test_success_outcomes_are_ok() {
        let id = Uuid::nil();
        assert_eq!(
            status_for_outcome(&ProcessingOutcome::Completed { note_id: id }),
            StatusCode::OK
        );
        assert_eq!(
            status_for_outcome(&ProcessingOutcome::AlreadyProcessed { note_id: id }),
            StatusCode::OK
        );
        assert_eq!(
            status_for_outcome(&ProcessingOutcome::TranscribedOnly {
                note_id: id,
                category: ErrorCategory::Analysis,
                message: "x".to_string()
            }),
            StatusCode::OK
        );
    }

    #[test]
    fn test_skip_is_conflict() {
        assert_eq!(
            status_for_outcome(&ProcessingOutcome::Skipped { note_id: Uuid::nil() }),
            StatusCode::CONFLICT
        );
    }

    #[test]
    fn test_failures_map_by_category() {
        assert_eq!(
            status_for_outcome(&failed(ErrorCategory::NoteFetch)),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            status_for_outcome(&failed(ErrorCategory::MediaProcessing)),
            StatusCode::UNPROCESSABLE_ENTITY
        );
        assert_eq!(
            status_for_outcome(&failed(ErrorCategory::CircuitBreaker)),
            StatusCode::SERVICE_UNAVAILABLE
        );
        assert_eq!(
            status_for_outcome(&failed(ErrorCategory::RateLimit)),
            StatusCode::SERVICE_UNAVAILABLE
        );
        assert_eq!(
            status_for_outcome(&failed(ErrorCategory::Transcription)),
            StatusCode::BAD_GATEWAY
        );
        assert_eq!(
            status_for_outcome(&failed(ErrorCategory::Unknown)),
            StatusCode::BAD_GATEWAY
        );
    }

    #[test]
    fn test_warning_flag_serialization() {
        let response = ProcessResponse {
            outcome: ProcessingOutcome::TranscribedOnly {
                note_id: Uuid::nil(),
                category: ErrorCategory::Analysis,
                message: "model down".to_string(),
            },
            warning: true,
        };
        let json = serde_json::to_value(&response).unwrap();
        assert_eq!(json["outcome"], "transcribed_only");
        assert_eq!(json["warning"], true);

        let response = ProcessResponse {
            outcome: ProcessingOutcome::Completed {
                note_id: Uuid::nil(),
            },
            warning: false,
        };
        let json = serde_json::to_value(&response).unwrap();
        assert!(json.get("warning").is_none());
    }
}
