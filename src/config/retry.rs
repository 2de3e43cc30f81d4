//! Retry configuration for calls into unreliable dependencies.
//!
//! # Configuration Example
//!
//! ```toml
//! [retry]
//! enabled = true
//! max_retries = 3
//! initial_delay_ms = 100
//! backoff_multiplier = 2.0
//! max_delay_ms = 10000
//! jitter_factor = 0.2
//! ```
//!
//! Delays follow exponential backoff: `initial_delay * multiplier^attempt`,
//! capped at `max_delay`, then randomized by `jitter_factor` in both
//! directions (0.2 means +/- 20%).

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Retry configuration for resilient operations.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Enable automatic retries (default: true)
    #[serde(default = "default_enabled")]
    pub enabled: bool,

    /// Maximum number of retries after the first attempt (default: 3)
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Delay before the first retry in milliseconds (default: 100)
    #[serde(default = "default_initial_delay_ms")]
    pub initial_delay_ms: u64,

    /// Growth factor applied per attempt (default: 2.0)
    #[serde(default = "default_backoff_multiplier")]
    pub backoff_multiplier: f64,

    /// Upper bound for a single delay in milliseconds (default: 10000)
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,

    /// Symmetric jitter applied to each delay (default: 0.2 = 20%)
    ///
    /// Spreads out retries from many callers that failed at the same moment.
    #[serde(default = "default_jitter_factor")]
    pub jitter_factor: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            enabled: default_enabled(),
            max_retries: default_max_retries(),
            initial_delay_ms: default_initial_delay_ms(),
            backoff_multiplier: default_backoff_multiplier(),
            max_delay_ms: default_max_delay_ms(),
            jitter_factor: default_jitter_factor(),
        }
    }
}

impl RetryConfig {
    /// Create a retry config with retries disabled.
    pub fn disabled() -> Self {
        Self {
            enabled: false,
            ..Default::default()
        }
    }

    pub fn initial_delay(&self) -> Duration {
        Duration::from_millis(self.initial_delay_ms)
    }

    pub fn max_delay(&self) -> Duration {
        Duration::from_millis(self.max_delay_ms)
    }

    /// Backoff delay before retry number `attempt` (0-indexed), without jitter.
    pub fn backoff_for_attempt(&self, attempt: u32) -> Duration {
        let exponent = attempt.min(i32::MAX as u32) as i32;
        let delay_ms = self.initial_delay_ms as f64 * self.backoff_multiplier.powi(exponent);
        let capped = delay_ms.min(self.max_delay_ms as f64).max(0.0);
        Duration::from_millis(capped as u64)
    }

    /// Range a jittered delay may fall into for the given attempt.
    pub fn jitter_bounds(&self, attempt: u32) -> (Duration, Duration) {
        let base = self.backoff_for_attempt(attempt).as_millis() as f64;
        let spread = base * self.jitter_factor.clamp(0.0, 1.0);
        (
            Duration::from_millis((base - spread).max(0.0) as u64),
            Duration::from_millis((base + spread) as u64),
        )
    }

    /// Whether another attempt is allowed after `retries_done` retries.
    pub fn should_retry(&self, retries_done: u32) -> bool {
        self.enabled && retries_done < self.max_retries
    }

    pub(crate) fn problems(&self) -> Vec<String> {
        let mut problems = Vec::new();
        if self.backoff_multiplier < 1.0 {
            problems.push(format!(
                "retry.backoff_multiplier must be >= 1.0, got {}",
                self.backoff_multiplier
            ));
        }
        if !(0.0..=1.0).contains(&self.jitter_factor) {
            problems.push(format!(
                "retry.jitter_factor must be within [0, 1], got {}",
                self.jitter_factor
            ));
        }
        if self.max_delay_ms < self.initial_delay_ms {
            problems.push("retry.max_delay_ms must not be below retry.initial_delay_ms".into());
        }
        problems
    }
}

// Default value functions for serde
fn default_enabled() -> bool {
    true
}

fn default_max_retries() -> u32 {
    3
}

fn default_initial_delay_ms() -> u64 {
    100
}

fn default_backoff_multiplier() -> f64 {
    2.0
}

fn default_max_delay_ms() -> u64 {
    10_000
}

fn default_jitter_factor() -> f64 {
    0.2
}
