//! Exponential backoff with a failure-window circuit breaker, adapted from
//! the bridge's Telegram retry handler. Generalized from `BridgeError` to
//! `TelegramError` and trimmed of the bot-specific rate-limiter hookup —
//! the Ingestor's own rate limiter (`ingest::rate_limit`) wraps calls
//! separately instead of being threaded through here.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use rand::Rng;
use tokio::sync::RwLock;
use tracing::{debug, error, warn};

use super::client::TelegramError;

#[derive(Debug, Clone)]
pub struct RetryConfig {
    pub max_attempts: usize,
    pub initial_delay_ms: u64,
    pub max_delay_secs: u64,
    pub backoff_factor: f64,
    pub jitter_range: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        // Initial 2s, max 60s, cap 6 attempts per dialog before
        // surfacing ErrDialogFailed for that dialog only.
        Self {
            max_attempts: 6,
            initial_delay_ms: 2000,
            max_delay_secs: 60,
            backoff_factor: 2.0,
            jitter_range: 0.1,
        }
    }
}

#[derive(Debug, Clone)]
pub struct CircuitBreakerConfig {
    pub failure_threshold: usize,
    pub failure_window_secs: u64,
    pub recovery_timeout_secs: u64,
    pub success_threshold: usize,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            failure_window_secs: 60,
            recovery_timeout_secs: 30,
            success_threshold: 3,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
enum CircuitState {
    Closed,
    Open { opened_at: Instant },
    HalfOpen { successful_calls: usize },
}

struct FailureWindow {
    failures: Vec<Instant>,
    window: Duration,
}

impl FailureWindow {
    fn new(window: Duration) -> Self {
        Self { failures: Vec::new(), window }
    }

    fn add(&mut self, now: Instant) {
        self.failures.push(now);
        self.prune(now);
    }

    fn prune(&mut self, now: Instant) {
        self.failures.retain(|t| now.duration_since(*t) <= self.window);
    }

    fn count(&mut self, now: Instant) -> usize {
        self.prune(now);
        self.failures.len()
    }
}

struct CircuitBreaker {
    config: CircuitBreakerConfig,
    state: RwLock<CircuitState>,
    window: RwLock<FailureWindow>,
}

impl CircuitBreaker {
    fn new(config: CircuitBreakerConfig) -> Self {
        let window = Duration::from_secs(config.failure_window_secs);
        Self {
            state: RwLock::new(CircuitState::Closed),
            window: RwLock::new(FailureWindow::new(window)),
            config,
        }
    }

    async fn can_execute(&self) -> bool {
        let state = self.state.read().await;
        match &*state {
            CircuitState::Closed => true,
            CircuitState::Open { opened_at } => {
                Instant::now().duration_since(*opened_at) >= Duration::from_secs(self.config.recovery_timeout_secs)
            }
            CircuitState::HalfOpen { .. } => true,
        }
    }

    async fn try_half_open(&self) {
        let mut state = self.state.write().await;
        if matches!(&*state, CircuitState::Open { .. }) {
            debug!("circuit breaker entering half-open");
            *state = CircuitState::HalfOpen { successful_calls: 0 };
        }
    }

    async fn record_success(&self) {
        let mut state = self.state.write().await;
        match &mut *state {
            CircuitState::Closed => self.window.write().await.failures.clear(),
            CircuitState::Open { .. } => warn!("recorded success while circuit breaker is open"),
            CircuitState::HalfOpen { successful_calls } => {
                *successful_calls += 1;
                if *successful_calls >= self.config.success_threshold {
                    *state = CircuitState::Closed;
                    self.window.write().await.failures.clear();
                }
            }
        }
    }

    async fn record_failure(&self) {
        let now = Instant::now();
        self.window.write().await.add(now);
        let mut state = self.state.write().await;
        match &*state {
            CircuitState::Closed => {
                if self.window.write().await.count(now) >= self.config.failure_threshold {
                    *state = CircuitState::Open { opened_at: now };
                }
            }
            CircuitState::HalfOpen { .. } => *state = CircuitState::Open { opened_at: now },
            CircuitState::Open { .. } => {}
        }
    }
}

/// Wraps `TelegramClient` calls with exponential backoff and a circuit
/// breaker, mirroring the bridge's `RetryHandler` but generic over the
/// Ingestor's own error type.
#[derive(Clone)]
pub struct RetryHandler {
    retry: RetryConfig,
    breaker: Arc<CircuitBreaker>,
    flood_wait_seconds: Arc<AtomicU64>,
}

impl RetryHandler {
    pub fn new() -> Self {
        Self::with_config(RetryConfig::default(), CircuitBreakerConfig::default())
    }

    pub fn with_config(retry: RetryConfig, breaker: CircuitBreakerConfig) -> Self {
        Self {
            retry,
            breaker: Arc::new(CircuitBreaker::new(breaker)),
            flood_wait_seconds: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Cumulative seconds slept honoring a Telegram `FLOOD_WAIT` response
    /// since the last call, reset to zero on read.
    pub fn take_flood_wait_seconds(&self) -> u64 {
        self.flood_wait_seconds.swap(0, Ordering::Relaxed)
    }

    fn delay_for(&self, attempt: usize) -> Duration {
        let base_ms = (self.retry.initial_delay_ms as f64) * self.retry.backoff_factor.powi(attempt as i32);
        let capped_ms = base_ms.min((self.retry.max_delay_secs * 1000) as f64);
        let jitter = 1.0 + rand::thread_rng().gen_range(-self.retry.jitter_range..=self.retry.jitter_range);
        Duration::from_millis((capped_ms * jitter).max(0.0) as u64)
    }

    pub async fn execute<T, F, Fut>(&self, mut operation: F) -> Result<T, TelegramError>
    where
        F: FnMut() -> Fut,
        Fut: std::future::Future<Output = Result<T, TelegramError>>,
    {
        for attempt in 0..self.retry.max_attempts {
            if !self.breaker.can_execute().await {
                self.breaker.try_half_open().await;
                if !self.breaker.can_execute().await {
                    return Err(TelegramError::Transport("circuit breaker open".into()));
                }
            }

            match operation().await {
                Ok(value) => {
                    self.breaker.record_success().await;
                    return Ok(value);
                }
                Err(err) => {
                    self.breaker.record_failure().await;
                    if !err.is_retryable() {
                        return Err(err);
                    }
                    if attempt + 1 == self.retry.max_attempts {
                        error!(attempts = self.retry.max_attempts, "retries exhausted");
                        return Err(err);
                    }
                    // A flood-wait is the API telling us exactly how long to
                    // back off; honor that instead of our own backoff curve.
                    let delay = match &err {
                        TelegramError::FloodWait(secs) => {
                            let secs = (*secs).max(0) as u64;
                            self.flood_wait_seconds.fetch_add(secs, Ordering::Relaxed);
                            Duration::from_secs(secs)
                        }
                        _ => self.delay_for(attempt),
                    };
                    warn!(attempt = attempt + 1, delay_ms = delay.as_millis() as u64, %err, "retrying after failure");
                    tokio::time::sleep(delay).await;
                }
            }
        }
        unreachable!("loop always returns")
    }
}

impl Default for RetryHandler {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[tokio::test]
    async fn retries_a_retryable_error_then_succeeds() {
        let handler = RetryHandler::with_config(
            RetryConfig { initial_delay_ms: 1, max_delay_secs: 1, ..Default::default() },
            CircuitBreakerConfig::default(),
        );
        let attempts = AtomicUsize::new(0);
        let result = handler
            .execute(|| async {
                if attempts.fetch_add(1, Ordering::SeqCst) < 2 {
                    Err(TelegramError::FloodWait(1))
                } else {
                    Ok(42)
                }
            })
            .await;
        assert_eq!(result.unwrap(), 42);
        assert_eq!(attempts.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn does_not_retry_a_non_retryable_error() {
        let handler = RetryHandler::new();
        let attempts = AtomicUsize::new(0);
        let result: Result<(), TelegramError> = handler
            .execute(|| async {
                attempts.fetch_add(1, Ordering::SeqCst);
                Err(TelegramError::AuthRequired)
            })
            .await;
        assert!(result.is_err());
        assert_eq!(attempts.load(Ordering::SeqCst), 1);
    }
}
