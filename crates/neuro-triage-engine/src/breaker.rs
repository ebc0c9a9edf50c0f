//! Circuit breaker for external dependency calls.
//!
//! Prevents cascading failures by tracking consecutive failures and
//! temporarily failing fast instead of calling an unhealthy dependency.
//!
//! States and transitions:
//! - **Closed**: calls pass through; success resets the failure counter,
//!   reaching `failure_threshold` consecutive failures opens the circuit.
//! - **Open**: calls fail immediately with [`Error::BreakerOpen`] until
//!   `timeout` has elapsed since the last failure, at which point the breaker
//!   moves to half-open and admits exactly one probe call.
//! - **HalfOpen**: `success_threshold` consecutive successes close the
//!   circuit; any failure reopens it immediately.
//!
//! One instance exists per protected dependency and is shared across all
//! cases; every transition happens under a single lock and is logged.

use neuro_triage_core::{Error, Result};
use std::future::Future;
use std::sync::Mutex;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// State of a circuit breaker
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BreakerState {
    /// Requests flow normally
    Closed,
    /// Requests are blocked
    Open,
    /// Testing whether the dependency has recovered
    HalfOpen,
}

impl std::fmt::Display for BreakerState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Closed => f.write_str("closed"),
            Self::Open => f.write_str("open"),
            Self::HalfOpen => f.write_str("half-open"),
        }
    }
}

/// Breaker tuning per protected dependency
#[derive(Debug, Clone)]
pub struct BreakerConfig {
    /// Consecutive failures before opening
    pub failure_threshold: u32,
    /// Consecutive half-open successes before closing
    pub success_threshold: u32,
    /// How long the circuit stays open before admitting a probe
    pub timeout: Duration,
}

impl Default for BreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 3,
            success_threshold: 2,
            timeout: Duration::from_secs(30),
        }
    }
}

#[derive(Debug)]
struct BreakerInner {
    state: BreakerState,
    consecutive_failures: u32,
    consecutive_successes: u32,
    last_failure: Option<Instant>,
}

/// Three-state resilience wrapper shared across all callers of one
/// protected dependency
#[derive(Debug)]
pub struct CircuitBreaker {
    name: String,
    config: BreakerConfig,
    inner: Mutex<BreakerInner>,
}

impl CircuitBreaker {
    /// Create a breaker for a named dependency
    pub fn new(name: impl Into<String>, config: BreakerConfig) -> Self {
        let name = name.into();
        info!(
            breaker = %name,
            failure_threshold = config.failure_threshold,
            success_threshold = config.success_threshold,
            timeout_secs = config.timeout.as_secs(),
            "Circuit breaker initialized"
        );
        Self {
            name,
            config,
            inner: Mutex::new(BreakerInner {
                state: BreakerState::Closed,
                consecutive_failures: 0,
                consecutive_successes: 0,
                last_failure: None,
            }),
        }
    }

    /// Name of the protected dependency
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Current state (after applying any pending open-to-half-open timeout)
    pub fn state(&self) -> BreakerState {
        let inner = self.inner.lock().unwrap();
        // Reported state reflects whether a probe would currently be admitted
        if inner.state == BreakerState::Open && self.timeout_elapsed(&inner) {
            return BreakerState::HalfOpen;
        }
        inner.state
    }

    /// Execute an operation under breaker protection.
    ///
    /// The operation future is never polled when the circuit is open and the
    /// recovery timeout has not elapsed: the call fails fast with
    /// [`Error::BreakerOpen`] and the wrapped operation does not run.
    pub async fn call<T, Fut>(&self, op: Fut) -> Result<T>
    where
        Fut: Future<Output = Result<T>>,
    {
        self.acquire()?;
        match op.await {
            Ok(value) => {
                self.on_success();
                Ok(value)
            }
            Err(err) => {
                self.on_failure();
                Err(err)
            }
        }
    }

    /// Admit or reject a call; transitions open to half-open after timeout
    fn acquire(&self) -> Result<()> {
        let mut inner = self.inner.lock().unwrap();
        match inner.state {
            BreakerState::Closed | BreakerState::HalfOpen => Ok(()),
            BreakerState::Open => {
                if self.timeout_elapsed(&inner) {
                    info!(breaker = %self.name, "Admitting probe call (open -> half-open)");
                    self.transition(&mut inner, BreakerState::HalfOpen);
                    Ok(())
                } else {
                    debug!(breaker = %self.name, "Failing fast, circuit open");
                    ::metrics::counter!(
                        "triage_breaker_rejections_total",
                        "breaker" => self.name.clone()
                    )
                    .increment(1);
                    Err(Error::BreakerOpen(self.name.clone()))
                }
            }
        }
    }

    fn on_success(&self) {
        let mut inner = self.inner.lock().unwrap();
        match inner.state {
            BreakerState::Closed => {
                inner.consecutive_failures = 0;
            }
            BreakerState::HalfOpen => {
                inner.consecutive_successes += 1;
                if inner.consecutive_successes >= self.config.success_threshold {
                    info!(
                        breaker = %self.name,
                        successes = inner.consecutive_successes,
                        "Dependency recovered (half-open -> closed)"
                    );
                    self.transition(&mut inner, BreakerState::Closed);
                }
            }
            BreakerState::Open => {
                // A call admitted just before a concurrent failure reopened
                // the circuit; the success does not change open state.
                debug!(breaker = %self.name, "Success recorded while open, ignored");
            }
        }
    }

    fn on_failure(&self) {
        let mut inner = self.inner.lock().unwrap();
        inner.last_failure = Some(Instant::now());
        match inner.state {
            BreakerState::Closed => {
                inner.consecutive_failures += 1;
                if inner.consecutive_failures >= self.config.failure_threshold {
                    warn!(
                        breaker = %self.name,
                        failures = inner.consecutive_failures,
                        "Failure threshold reached (closed -> open)"
                    );
                    self.transition(&mut inner, BreakerState::Open);
                }
            }
            BreakerState::HalfOpen => {
                warn!(breaker = %self.name, "Probe failed (half-open -> open)");
                self.transition(&mut inner, BreakerState::Open);
            }
            BreakerState::Open => {}
        }
    }

    fn timeout_elapsed(&self, inner: &BreakerInner) -> bool {
        inner
            .last_failure
            .map(|at| at.elapsed() >= self.config.timeout)
            .unwrap_or(true)
    }

    fn transition(&self, inner: &mut BreakerInner, next: BreakerState) {
        let previous = inner.state;
        inner.state = next;
        match next {
            BreakerState::Closed => {
                inner.consecutive_failures = 0;
                inner.consecutive_successes = 0;
            }
            BreakerState::Open => {
                inner.consecutive_successes = 0;
            }
            BreakerState::HalfOpen => {
                inner.consecutive_successes = 0;
            }
        }
        ::metrics::counter!(
            "triage_breaker_transitions_total",
            "breaker" => self.name.clone(),
            "from" => previous.to_string(),
            "to" => next.to_string()
        )
        .increment(1);
    }
}
