//! Per-provider circuit breaker.
//!
//! The provider runner keeps one breaker per AI provider and treats an open
//! breaker as "provider unavailable": the provider is skipped without a call
//! until the recovery timeout has passed.
//!
//! ```text
//! CLOSED --[N tripping failures]--> OPEN --[recovery timeout]--> HALF_OPEN
//!   ^                                 ^                              |
//!   |                                 +--------[probe fails]---------+
//!   +-----------------------[M probes succeed]-----------------------+
//! ```

use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use crate::error::AppError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

impl std::fmt::Display for CircuitState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CircuitState::Closed => write!(f, "closed"),
            CircuitState::Open => write!(f, "open"),
            CircuitState::HalfOpen => write!(f, "half-open"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct CircuitBreakerConfig {
    /// Consecutive tripping failures before the circuit opens.
    pub failure_threshold: u32,
    /// Successful probes in half-open needed to close again.
    pub success_threshold: u32,
    pub recovery_timeout: Duration,
    /// Recovery timeout multiplier applied when a rate limit opens the circuit.
    pub rate_limit_backoff_multiplier: f32,
    pub max_recovery_timeout: Duration,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            success_threshold: 1,
            recovery_timeout: Duration::from_secs(30),
            rate_limit_backoff_multiplier: 2.0,
            max_recovery_timeout: Duration::from_secs(300),
        }
    }
}

#[derive(Debug)]
struct BreakerState {
    state: CircuitState,
    consecutive_failures: u32,
    probe_successes: u32,
    opened_at: Option<Instant>,
    recovery_timeout: Duration,
    last_error: Option<String>,
}

/// Thread-safe breaker; clones share state.
#[derive(Clone)]
pub struct CircuitBreaker {
    name: String,
    config: CircuitBreakerConfig,
    inner: Arc<Mutex<BreakerState>>,
}

impl CircuitBreaker {
    pub fn new(name: impl Into<String>, config: CircuitBreakerConfig) -> Self {
        let inner = BreakerState {
            state: CircuitState::Closed,
            consecutive_failures: 0,
            probe_successes: 0,
            opened_at: None,
            recovery_timeout: config.recovery_timeout,
            last_error: None,
        };
        Self {
            name: name.into(),
            config,
            inner: Arc::new(Mutex::new(inner)),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    fn lock(&self) -> MutexGuard<'_, BreakerState> {
        self.inner.lock().unwrap_or_else(|poisoned| {
            tracing::warn!(circuit = %self.name, "Recovered from poisoned mutex");
            poisoned.into_inner()
        })
    }

    /// Current state, moving Open to HalfOpen once the timeout elapsed.
    pub fn state(&self) -> CircuitState {
        let mut inner = self.lock();
        self.refresh(&mut inner);
        inner.state
    }

    /// False while the circuit is open.
    pub fn is_available(&self) -> bool {
        self.state() != CircuitState::Open
    }

    /// Time until an open circuit admits a probe.
    pub fn retry_after(&self) -> Option<Duration> {
        let mut inner = self.lock();
        self.refresh(&mut inner);
        match (inner.state, inner.opened_at) {
            (CircuitState::Open, Some(opened)) => {
                Some(inner.recovery_timeout.saturating_sub(opened.elapsed()))
            }
            _ => None,
        }
    }

    pub fn last_error(&self) -> Option<String> {
        self.lock().last_error.clone()
    }

    pub fn record_success(&self) {
        let mut inner = self.lock();
        self.refresh(&mut inner);
        match inner.state {
            CircuitState::HalfOpen => {
                inner.probe_successes += 1;
                if inner.probe_successes >= self.config.success_threshold {
                    tracing::info!(circuit = %self.name, "Circuit breaker closed");
                    inner.state = CircuitState::Closed;
                    inner.consecutive_failures = 0;
                    inner.probe_successes = 0;
                    inner.opened_at = None;
                    inner.last_error = None;
                    inner.recovery_timeout = self.config.recovery_timeout;
                }
            }
            CircuitState::Closed => inner.consecutive_failures = 0,
            CircuitState::Open => {}
        }
    }

    /// Count a failure. Errors that do not trip the circuit only update
    /// the last-error message.
    pub fn record_failure(&self, error: &AppError) {
        let mut inner = self.lock();
        self.refresh(&mut inner);
        inner.last_error = Some(error.to_string());
        if !error.should_trip_circuit() {
            return;
        }

        match inner.state {
            CircuitState::Closed => {
                inner.consecutive_failures += 1;
                if inner.consecutive_failures >= self.config.failure_threshold {
                    tracing::warn!(
                        circuit = %self.name,
                        failures = inner.consecutive_failures,
                        error = %error,
                        "Circuit breaker opened"
                    );
                    self.open(&mut inner, error.is_rate_limit());
                }
            }
            CircuitState::HalfOpen => {
                tracing::warn!(circuit = %self.name, error = %error, "Probe failed, reopening circuit");
                self.open(&mut inner, error.is_rate_limit());
            }
            CircuitState::Open => {}
        }
    }

    pub fn reset(&self) {
        let mut inner = self.lock();
        inner.state = CircuitState::Closed;
        inner.consecutive_failures = 0;
        inner.probe_successes = 0;
        inner.opened_at = None;
        inner.last_error = None;
        inner.recovery_timeout = self.config.recovery_timeout;
    }

    fn open(&self, inner: &mut BreakerState, rate_limited: bool) {
        inner.state = CircuitState::Open;
        inner.opened_at = Some(Instant::now());
        inner.probe_successes = 0;
        if rate_limited {
            let extended = inner
                .recovery_timeout
                .mul_f32(self.config.rate_limit_backoff_multiplier);
            inner.recovery_timeout = extended.min(self.config.max_recovery_timeout);
        }
    }

    fn refresh(&self, inner: &mut BreakerState) {
        if inner.state == CircuitState::Open
            && let Some(opened) = inner.opened_at
            && opened.elapsed() >= inner.recovery_timeout
        {
            tracing::debug!(circuit = %self.name, "Circuit breaker half-open");
            inner.state = CircuitState::HalfOpen;
            inner.probe_successes = 0;
        }
    }
}
