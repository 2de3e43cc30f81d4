//! Retry with exponential backoff and jitter.

use crate::config::RetryConfig;
use crate::errors::TaskError;
use rand::Rng;
use std::fmt;
use std::io;
use std::thread;
use std::time::Duration;

/// Connection-level error codes considered transient
pub const RETRYABLE_CODES: &[&str] = &[
    "ECONNRESET",
    "ETIMEDOUT",
    "ECONNREFUSED",
    "EPIPE",
    "ENOTFOUND",
    "EAI_AGAIN",
];

/// HTTP statuses considered transient
pub const RETRYABLE_STATUSES: &[u16] = &[429, 502, 503, 504];

const RETRYABLE_MESSAGES: &[&str] = &["network", "socket hang up"];

/// Errors that can describe themselves to the default retry condition.
pub trait Transient {
    /// Symbolic error code such as `ECONNRESET`
    fn code(&self) -> Option<&str> {
        None
    }

    /// HTTP status, for errors coming from an HTTP backend
    fn status(&self) -> Option<u16> {
        None
    }

    fn message(&self) -> String;
}

/// The default retry condition.
pub fn is_retryable<E: Transient + ?Sized>(error: &E) -> bool {
    if error.code().is_some_and(|c| RETRYABLE_CODES.contains(&c)) {
        return true;
    }
    if error.status().is_some_and(|s| RETRYABLE_STATUSES.contains(&s)) {
        return true;
    }
    let message = error.message().to_lowercase();
    RETRYABLE_MESSAGES.iter().any(|m| message.contains(m))
        || RETRYABLE_CODES
            .iter()
            .any(|code| message.contains(&code.to_lowercase()))
}

fn io_code(kind: io::ErrorKind) -> Option<&'static str> {
    match kind {
        io::ErrorKind::ConnectionReset | io::ErrorKind::ConnectionAborted => Some("ECONNRESET"),
        io::ErrorKind::TimedOut => Some("ETIMEDOUT"),
        io::ErrorKind::ConnectionRefused => Some("ECONNREFUSED"),
        io::ErrorKind::BrokenPipe => Some("EPIPE"),
        _ => None,
    }
}

impl Transient for io::Error {
    fn code(&self) -> Option<&str> {
        io_code(self.kind())
    }

    fn message(&self) -> String {
        self.to_string()
    }
}

impl Transient for anyhow::Error {
    fn code(&self) -> Option<&str> {
        self.chain()
            .find_map(|cause| cause.downcast_ref::<io::Error>())
            .and_then(|e| io_code(e.kind()))
    }

    fn message(&self) -> String {
        format!("{self:#}")
    }
}

impl Transient for TaskError {
    fn code(&self) -> Option<&str> {
        match self {
            Self::Timeout(_) => Some("ETIMEDOUT"),
            _ => None,
        }
    }

    fn message(&self) -> String {
        self.to_string()
    }
}

impl Transient for String {
    fn message(&self) -> String {
        self.clone()
    }
}

impl Transient for &str {
    fn message(&self) -> String {
        self.to_string()
    }
}

/// Why a retried operation gave up
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryStopReason {
    /// Every allowed attempt failed
    Exhausted,
    /// The last error did not match the retry condition
    NotRetryable,
}

impl fmt::Display for RetryStopReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Exhausted => write!(f, "retries exhausted"),
            Self::NotRetryable => write!(f, "error is not retryable"),
        }
    }
}

/// Structured failure returned instead of the last error alone
#[derive(Debug, Clone, PartialEq)]
pub struct RetryFailure<E> {
    pub attempts: u32,
    pub last_error: E,
    pub reason: RetryStopReason,
}

impl<E: fmt::Display> fmt::Display for RetryFailure<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} after {} attempt(s): {}",
            self.reason, self.attempts, self.last_error
        )
    }
}

impl<E: fmt::Debug + fmt::Display> std::error::Error for RetryFailure<E> {}

#[derive(Debug, Clone, Default)]
pub struct RetryPolicy {
    config: RetryConfig,
}

impl RetryPolicy {
    pub fn new(config: RetryConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &RetryConfig {
        &self.config
    }

    /// Jittered delay before retry number `retry` (0-indexed)
    pub fn delay_for(&self, retry: u32) -> Duration {
        let base = self.config.backoff_for_attempt(retry).as_secs_f64();
        let jitter = self.config.jitter_factor.clamp(0.0, 1.0);
        let factor = if jitter > 0.0 {
            1.0 + rand::thread_rng().gen_range(-jitter..=jitter)
        } else {
            1.0
        };
        Duration::from_secs_f64((base * factor).max(0.0))
    }

    /// Run `op` with the default retry condition.
    ///
    /// `op` receives the 1-based attempt number.
    pub fn execute<T, E, F>(&self, op: F) -> Result<T, RetryFailure<E>>
    where
        E: Transient,
        F: FnMut(u32) -> Result<T, E>,
    {
        self.execute_if(op, |error, _| is_retryable(error))
    }

    /// Run `op`, retrying while `should_retry(error, attempt)` holds.
    pub fn execute_if<T, E, F, C>(&self, mut op: F, should_retry: C) -> Result<T, RetryFailure<E>>
    where
        F: FnMut(u32) -> Result<T, E>,
        C: Fn(&E, u32) -> bool,
    {
        let mut attempt = 1;
        loop {
            let error = match op(attempt) {
                Ok(value) => return Ok(value),
                Err(error) => error,
            };

            let retries_done = attempt - 1;
            if !self.config.should_retry(retries_done) {
                return Err(RetryFailure {
                    attempts: attempt,
                    last_error: error,
                    reason: RetryStopReason::Exhausted,
                });
            }
            if !should_retry(&error, attempt) {
                return Err(RetryFailure {
                    attempts: attempt,
                    last_error: error,
                    reason: RetryStopReason::NotRetryable,
                });
            }

            let delay = self.delay_for(retries_done);
            tracing::debug!(attempt, delay_ms = delay.as_millis() as u64, "Retrying after failure");
            thread::sleep(delay);
            attempt += 1;
        }
    }
}
