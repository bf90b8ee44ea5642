//! Shared application state for the API server.

use std::sync::Arc;

use echonote_pipeline::{
    BatchScheduler, CircuitBreaker, MetricsCollector, NoteProcessor, RetryQueue,
};

/// Everything the handlers need, behind `Arc`s so state clones are cheap.
#[derive(Clone)]
pub struct AppState {
    pub processor: Arc<NoteProcessor>,
    pub scheduler: Arc<BatchScheduler>,
    pub breaker: Arc<CircuitBreaker>,
    pub retries: Arc<RetryQueue>,
    pub metrics: Arc<MetricsCollector>,
}
