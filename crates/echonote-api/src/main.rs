//! echonote-api - HTTP API server for the echonote processing pipeline.

mod handlers;
mod state;

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::http::Request;
use axum::routing::{get, post};
use axum::Router;
use tower_http::cors::CorsLayer;
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::request_id::{
    MakeRequestId, PropagateRequestIdLayer, RequestId, SetRequestIdLayer,
};
use tower_http::trace::TraceLayer;
use tracing::{info, warn};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use uuid::Uuid;

use echonote_core::defaults;
use echonote_db::{Database, FsAudioStore};
use echonote_inference::{
    AnalysisBackend, ChatAnalysisBackend, TranscriptionBackend, WhisperBackend,
};
use echonote_pipeline::{
    BatchScheduler, BreakerConfig, CircuitBreaker, MetricsCollector, NoteProcessor, RetryQueue,
    SchedulerConfig,
};

use state::AppState;

/// Time-ordered UUIDv7 request correlation IDs; they sort chronologically,
/// which makes log correlation across services straightforward.
#[derive(Clone, Default)]
struct MakeRequestUuidV7;

impl MakeRequestId for MakeRequestUuidV7 {
    fn make_request_id<B>(&mut self, _request: &Request<B>) -> Option<RequestId> {
        let id = Uuid::now_v7().to_string().parse().ok()?;
        Some(RequestId::new(id))
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Database
    let database_url = std::env::var(defaults::ENV_DATABASE_URL)
        .map_err(|_| anyhow::anyhow!("{} must be set", defaults::ENV_DATABASE_URL))?;
    let db = Database::connect(&database_url).await?;
    db.migrate().await?;
    info!(
        subsystem = "api",
        expected_duration = db.capabilities.expected_duration,
        owner_knowledge = db.capabilities.owner_knowledge,
        "Database ready"
    );

    // Audio storage
    let audio_path = std::env::var(defaults::ENV_AUDIO_STORE_PATH)
        .map_err(|_| anyhow::anyhow!("{} must be set", defaults::ENV_AUDIO_STORE_PATH))?;
    let audio = Arc::new(FsAudioStore::new(audio_path));

    // AI service backends
    let transcriber = WhisperBackend::from_env()
        .ok_or_else(|| anyhow::anyhow!("{} must be set", defaults::ENV_WHISPER_BASE_URL))?;
    let analyzer = ChatAnalysisBackend::from_env()
        .ok_or_else(|| anyhow::anyhow!("{} must be set", defaults::ENV_ANALYSIS_BASE_URL))?;
    info!(
        subsystem = "api",
        whisper_model = transcriber.model_name(),
        analysis_model = analyzer.model_name(),
        "AI backends configured"
    );

    // Pipeline wiring
    let breaker = Arc::new(CircuitBreaker::new(BreakerConfig {
        threshold: defaults::env_parse(defaults::ENV_BREAKER_THRESHOLD)
            .unwrap_or(defaults::BREAKER_THRESHOLD),
        cool_down: Duration::from_secs(
            defaults::env_parse(defaults::ENV_BREAKER_COOL_DOWN_SECS)
                .unwrap_or(defaults::BREAKER_COOL_DOWN_SECS),
        ),
    }));
    let metrics = Arc::new(MetricsCollector::new());
    let retries = Arc::new(RetryQueue::new(metrics.clone()));

    let lease_minutes = defaults::env_parse(defaults::ENV_LEASE_TIMEOUT_MINUTES)
        .unwrap_or(defaults::LEASE_TIMEOUT_MINUTES);
    let processor = Arc::new(
        NoteProcessor::new(
            Arc::new(db.notes.clone()),
            Arc::new(db.knowledge.clone()),
            audio,
            Arc::new(transcriber),
            Arc::new(analyzer),
            breaker.clone(),
            metrics.clone(),
        )
        .with_lease_timeout(chrono::Duration::minutes(lease_minutes)),
    );

    let scheduler = Arc::new(BatchScheduler::new(
        Arc::new(db.notes.clone()),
        processor.clone(),
        breaker.clone(),
        retries.clone(),
        metrics.clone(),
        SchedulerConfig::from_env(),
    ));

    let app_state = AppState {
        processor,
        scheduler,
        breaker,
        retries,
        metrics,
    };

    let app = Router::new()
        .route("/health", get(handlers::health))
        .route("/health/pipeline", get(handlers::pipeline_health))
        .route("/notes/:id/process", post(handlers::process_note))
        .route("/batch", post(handlers::process_batch))
        .layer(PropagateRequestIdLayer::x_request_id())
        .layer(TraceLayer::new_for_http())
        .layer(SetRequestIdLayer::x_request_id(MakeRequestUuidV7))
        .layer(CorsLayer::permissive())
        .layer(RequestBodyLimitLayer::new(64 * 1024))
        .with_state(app_state);

    let port: u16 = defaults::env_parse(defaults::ENV_SERVER_PORT).unwrap_or(defaults::SERVER_PORT);
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    info!(subsystem = "api", %addr, "Starting server");
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(subsystem = "api", error = %e, "Failed to install shutdown handler");
        return;
    }
    info!(subsystem = "api", "Shutdown signal received");
}
