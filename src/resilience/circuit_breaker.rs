//! Circuit breaker guarding calls into one external dependency.
//!
//! `Closed` counts consecutive failures and opens at `failure_threshold`.
//! `Open` rejects calls without running them until `half_open_time` has
//! passed, then lets calls through as `HalfOpen`. In `HalfOpen` a single
//! failure reopens the circuit and `success_threshold` consecutive
//! successes close it.

use crate::config::CircuitBreakerConfig;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::fmt;
use std::time::{Duration, Instant};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

impl fmt::Display for CircuitState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Closed => write!(f, "closed"),
            Self::Open => write!(f, "open"),
            Self::HalfOpen => write!(f, "half-open"),
        }
    }
}

/// Error from a call through the breaker
#[derive(Debug)]
pub enum CircuitError<E> {
    /// Rejected without invoking the operation
    Open { name: String, retry_after: Duration },
    /// The operation ran and failed
    Inner(E),
}

impl<E> CircuitError<E> {
    pub fn is_open(&self) -> bool {
        matches!(self, Self::Open { .. })
    }

    pub fn into_inner(self) -> Option<E> {
        match self {
            Self::Inner(error) => Some(error),
            Self::Open { .. } => None,
        }
    }
}

impl<E: fmt::Display> fmt::Display for CircuitError<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Open { name, retry_after } => write!(
                f,
                "Circuit '{}' is open, retry in {}ms",
                name,
                retry_after.as_millis()
            ),
            Self::Inner(error) => write!(f, "{error}"),
        }
    }
}

impl<E: fmt::Debug + fmt::Display> std::error::Error for CircuitError<E> {}

#[derive(Debug, Clone, PartialEq)]
pub struct CircuitStats {
    pub state: CircuitState,
    pub consecutive_failures: u32,
    pub consecutive_successes: u32,
    /// Calls recorded within the monitoring window
    pub window_calls: usize,
    pub window_failures: usize,
    /// Share of successful calls in the window; 1.0 when there were none
    pub success_rate: f64,
    /// Calls rejected while open, over the breaker's lifetime
    pub rejected: u64,
}

#[derive(Debug)]
struct Inner {
    state: CircuitState,
    consecutive_failures: u32,
    consecutive_successes: u32,
    opened_at: Option<Instant>,
    outcomes: VecDeque<(Instant, bool)>,
    rejected: u64,
}

#[derive(Debug)]
pub struct CircuitBreaker {
    name: String,
    config: CircuitBreakerConfig,
    inner: Mutex<Inner>,
}

impl CircuitBreaker {
    pub fn new(name: impl Into<String>, config: CircuitBreakerConfig) -> Self {
        Self {
            name: name.into(),
            config,
            inner: Mutex::new(Inner {
                state: CircuitState::Closed,
                consecutive_failures: 0,
                consecutive_successes: 0,
                opened_at: None,
                outcomes: VecDeque::new(),
                rejected: 0,
            }),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Run `op` unless the circuit is open.
    pub fn call<T, E, F>(&self, op: F) -> Result<T, CircuitError<E>>
    where
        F: FnOnce() -> Result<T, E>,
    {
        self.try_acquire()?;
        match op() {
            Ok(value) => {
                self.record_success();
                Ok(value)
            }
            Err(error) => {
                self.record_failure();
                Err(CircuitError::Inner(error))
            }
        }
    }

    fn try_acquire<E>(&self) -> Result<(), CircuitError<E>> {
        let mut inner = self.inner.lock();
        self.refresh(&mut inner);
        if inner.state != CircuitState::Open {
            return Ok(());
        }

        inner.rejected += 1;
        let elapsed = inner.opened_at.map(|at| at.elapsed()).unwrap_or_default();
        Err(CircuitError::Open {
            name: self.name.clone(),
            retry_after: self.config.half_open_time().saturating_sub(elapsed),
        })
    }

    /// Apply the time-based `Open -> HalfOpen` transition.
    fn refresh(&self, inner: &mut Inner) {
        if inner.state == CircuitState::Open
            && inner
                .opened_at
                .is_some_and(|at| at.elapsed() >= self.config.half_open_time())
        {
            inner.state = CircuitState::HalfOpen;
            inner.consecutive_successes = 0;
            tracing::info!(circuit = %self.name, "Circuit breaker moved to half-open");
        }
    }

    pub fn record_success(&self) {
        let mut inner = self.inner.lock();
        self.push_outcome(&mut inner, true);
        inner.consecutive_failures = 0;

        match inner.state {
            CircuitState::Closed => {}
            CircuitState::HalfOpen => {
                inner.consecutive_successes += 1;
                if inner.consecutive_successes >= self.config.success_threshold {
                    inner.state = CircuitState::Closed;
                    inner.consecutive_successes = 0;
                    inner.opened_at = None;
                    tracing::info!(circuit = %self.name, "Circuit breaker closed after recovery");
                }
            }
            // A call admitted before the circuit opened finished late.
            CircuitState::Open => {}
        }
    }

    pub fn record_failure(&self) {
        let mut inner = self.inner.lock();
        self.push_outcome(&mut inner, false);
        inner.consecutive_successes = 0;

        match inner.state {
            CircuitState::Closed => {
                inner.consecutive_failures += 1;
                if inner.consecutive_failures >= self.config.failure_threshold {
                    inner.state = CircuitState::Open;
                    inner.opened_at = Some(Instant::now());
                    tracing::warn!(
                        circuit = %self.name,
                        failures = inner.consecutive_failures,
                        threshold = self.config.failure_threshold,
                        "Circuit breaker opened"
                    );
                }
            }
            CircuitState::HalfOpen => {
                inner.state = CircuitState::Open;
                inner.opened_at = Some(Instant::now());
                tracing::warn!(circuit = %self.name, "Circuit breaker reopened from half-open");
            }
            CircuitState::Open => {}
        }
    }

    fn push_outcome(&self, inner: &mut Inner, success: bool) {
        let now = Instant::now();
        inner.outcomes.push_back((now, success));
        Self::prune(inner, now, self.config.monitoring_window());
    }

    fn prune(inner: &mut Inner, now: Instant, window: Duration) {
        while inner
            .outcomes
            .front()
            .is_some_and(|(at, _)| now.duration_since(*at) > window)
        {
            inner.outcomes.pop_front();
        }
    }

    pub fn state(&self) -> CircuitState {
        let mut inner = self.inner.lock();
        self.refresh(&mut inner);
        inner.state
    }

    pub fn stats(&self) -> CircuitStats {
        let mut inner = self.inner.lock();
        self.refresh(&mut inner);
        Self::prune(&mut inner, Instant::now(), self.config.monitoring_window());

        let window_calls = inner.outcomes.len();
        let window_failures = inner.outcomes.iter().filter(|(_, ok)| !ok).count();
        let success_rate = if window_calls == 0 {
            1.0
        } else {
            (window_calls - window_failures) as f64 / window_calls as f64
        };

        CircuitStats {
            state: inner.state,
            consecutive_failures: inner.consecutive_failures,
            consecutive_successes: inner.consecutive_successes,
            window_calls,
            window_failures,
            success_rate,
            rejected: inner.rejected,
        }
    }

    pub fn reset(&self) {
        let mut inner = self.inner.lock();
        inner.state = CircuitState::Closed;
        inner.consecutive_failures = 0;
        inner.consecutive_successes = 0;
        inner.opened_at = None;
        tracing::info!(circuit = %self.name, "Circuit breaker reset");
    }

    pub fn force_open(&self) {
        let mut inner = self.inner.lock();
        inner.state = CircuitState::Open;
        inner.opened_at = Some(Instant::now());
        tracing::warn!(circuit = %self.name, "Circuit breaker forced open");
    }
}
