//! Circuit breaker shared by all external service calls in the pipeline.
//!
//! One breaker instance guards both the transcription and analysis
//! services: the common failure mode (the AI gateway going down) takes
//! both out at once, and a shared breaker stops the batch from burning
//! its wall-clock budget on calls that cannot succeed.
//!
//! State machine: closed until `threshold` *consecutive* failures, then
//! open for `cool_down`. After the cool-down one trial call is allowed
//! through; success closes the breaker, failure re-opens it for another
//! cool-down. Open-breaker short-circuits are reported as their own
//! category and never counted as service failures.

use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use tokio::time::Instant;
use tracing::{debug, warn};

use echonote_core::{BreakerSnapshot, Error, ErrorCategory, Result};

/// Circuit breaker tuning knobs.
#[derive(Debug, Clone)]
pub struct BreakerConfig {
    /// Consecutive failures before the breaker opens.
    pub threshold: u32,
    /// How long the breaker stays open before allowing a trial call.
    pub cool_down: Duration,
}

impl Default for BreakerConfig {
    fn default() -> Self {
        Self {
            threshold: echonote_core::defaults::BREAKER_THRESHOLD,
            cool_down: Duration::from_secs(echonote_core::defaults::BREAKER_COOL_DOWN_SECS),
        }
    }
}

/// Consecutive-failure circuit breaker with a per-category failure
/// histogram.
pub struct CircuitBreaker {
    config: BreakerConfig,
    consecutive_failures: AtomicU32,
    /// Instant of the failure that most recently opened (or kept open)
    /// the breaker. Only meaningful while the failure count is at or
    /// above the threshold.
    last_failure_at: Mutex<Option<Instant>>,
    /// Running tally of failure categories, independent of open/closed
    /// transitions. Diagnostics only.
    histogram: Mutex<HashMap<ErrorCategory, u64>>,
}

impl CircuitBreaker {
    pub fn new(config: BreakerConfig) -> Self {
        Self {
            config,
            consecutive_failures: AtomicU32::new(0),
            last_failure_at: Mutex::new(None),
            histogram: Mutex::new(HashMap::new()),
        }
    }

    /// Run `op` through the breaker.
    ///
    /// When open, returns [`Error::CircuitOpen`] without invoking `op`;
    /// the short-circuit is tallied under `circuit_breaker` in the
    /// histogram but does not touch the consecutive-failure count.
    pub async fn execute<T, F, Fut>(&self, op: F) -> Result<T>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        if let Some(remaining) = self.open_remaining() {
            self.tally(ErrorCategory::CircuitBreaker);
            debug!(
                subsystem = "pipeline",
                component = "breaker",
                retry_after_secs = remaining.as_secs(),
                "Circuit open; short-circuiting call"
            );
            return Err(Error::CircuitOpen {
                retry_after_secs: remaining.as_secs().max(1),
            });
        }

        match op().await {
            Ok(value) => {
                self.record_success();
                Ok(value)
            }
            Err(e) => {
                self.record_failure(ErrorCategory::from_error(&e));
                Err(e)
            }
        }
    }

    /// Remaining cool-down if the breaker is currently open.
    ///
    /// Once the cool-down has elapsed this returns `None` while leaving
    /// the failure count in place: the next call is the trial call, and
    /// its failure immediately re-opens the breaker.
    fn open_remaining(&self) -> Option<Duration> {
        if self.consecutive_failures.load(Ordering::SeqCst) < self.config.threshold {
            return None;
        }
        let guard = self.last_failure_at.lock().ok()?;
        let opened = (*guard)?;
        let elapsed = opened.elapsed();
        if elapsed < self.config.cool_down {
            Some(self.config.cool_down - elapsed)
        } else {
            None
        }
    }

    /// Whether a call made right now would be short-circuited.
    pub fn is_open(&self) -> bool {
        self.open_remaining().is_some()
    }

    fn record_success(&self) {
        let prior = self.consecutive_failures.swap(0, Ordering::SeqCst);
        if prior >= self.config.threshold {
            debug!(
                subsystem = "pipeline",
                component = "breaker",
                "Trial call succeeded; circuit closed"
            );
        }
        if let Ok(mut guard) = self.last_failure_at.lock() {
            *guard = None;
        }
    }

    fn record_failure(&self, category: ErrorCategory) {
        self.tally(category);
        let failures = self.consecutive_failures.fetch_add(1, Ordering::SeqCst) + 1;
        if failures >= self.config.threshold {
            if let Ok(mut guard) = self.last_failure_at.lock() {
                *guard = Some(Instant::now());
            }
            if failures == self.config.threshold {
                warn!(
                    subsystem = "pipeline",
                    component = "breaker",
                    consecutive_failures = failures,
                    category = %category,
                    cool_down_secs = self.config.cool_down.as_secs(),
                    "Failure threshold reached; circuit opened"
                );
            }
        }
    }

    fn tally(&self, category: ErrorCategory) {
        if let Ok(mut guard) = self.histogram.lock() {
            *guard.entry(category).or_insert(0) += 1;
        }
    }

    /// Current consecutive failure count.
    pub fn consecutive_failures(&self) -> u32 {
        self.consecutive_failures.load(Ordering::SeqCst)
    }

    /// Point-in-time view for health reporting and delay tuning.
    pub fn snapshot(&self) -> BreakerSnapshot {
        let remaining = self.open_remaining();
        let histogram = self
            .histogram
            .lock()
            .map(|guard| {
                guard
                    .iter()
                    .map(|(k, v)| (k.as_str().to_string(), *v))
                    .collect()
            })
            .unwrap_or_default();
        BreakerSnapshot {
            open: remaining.is_some(),
            consecutive_failures: self.consecutive_failures.load(Ordering::SeqCst),
            retry_after_secs: remaining.map(|d| d.as_secs().max(1)),
            failure_histogram: histogram,
        }
    }
}

impl Default for CircuitBreaker {
    fn default() -> Self {
        Self::new(BreakerConfig::default())
    }
}
