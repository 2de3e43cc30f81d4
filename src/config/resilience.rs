use serde::{Deserialize, Serialize};
use std::time::Duration;

fn default_failure_threshold() -> u32 {
    5
}

fn default_success_threshold() -> u32 {
    2
}

fn default_half_open_time_ms() -> u64 {
    30_000
}

fn default_monitoring_window_ms() -> u64 {
    60_000
}

/// Circuit breaker thresholds.
///
/// ```toml
/// [circuit_breaker]
/// failure_threshold = 5
/// success_threshold = 2
/// half_open_time_ms = 30000
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CircuitBreakerConfig {
    /// Consecutive failures that open the circuit
    #[serde(default = "default_failure_threshold")]
    pub failure_threshold: u32,

    /// Consecutive half-open successes that close the circuit
    #[serde(default = "default_success_threshold")]
    pub success_threshold: u32,

    /// Time the circuit stays open before a probe call is allowed
    #[serde(default = "default_half_open_time_ms")]
    pub half_open_time_ms: u64,

    /// Rolling window used for the reported success rate
    #[serde(default = "default_monitoring_window_ms")]
    pub monitoring_window_ms: u64,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: default_failure_threshold(),
            success_threshold: default_success_threshold(),
            half_open_time_ms: default_half_open_time_ms(),
            monitoring_window_ms: default_monitoring_window_ms(),
        }
    }
}

impl CircuitBreakerConfig {
    pub fn half_open_time(&self) -> Duration {
        Duration::from_millis(self.half_open_time_ms)
    }

    pub fn monitoring_window(&self) -> Duration {
        Duration::from_millis(self.monitoring_window_ms)
    }

    pub(crate) fn problems(&self) -> Vec<String> {
        let mut problems = Vec::new();
        if self.failure_threshold == 0 {
            problems.push("circuit_breaker.failure_threshold must be at least 1".to_string());
        }
        if self.success_threshold == 0 {
            problems.push("circuit_breaker.success_threshold must be at least 1".to_string());
        }
        problems
    }
}

fn default_max_concurrent() -> usize {
    10
}

fn default_max_queue() -> usize {
    100
}

fn default_queue_timeout_ms() -> u64 {
    30_000
}

/// Bulkhead limits.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BulkheadConfig {
    /// Concurrent executions allowed
    #[serde(default = "default_max_concurrent")]
    pub max_concurrent: usize,

    /// Callers allowed to wait for a slot
    #[serde(default = "default_max_queue")]
    pub max_queue: usize,

    /// Longest a queued caller waits before giving up
    #[serde(default = "default_queue_timeout_ms")]
    pub queue_timeout_ms: u64,
}

impl Default for BulkheadConfig {
    fn default() -> Self {
        Self {
            max_concurrent: default_max_concurrent(),
            max_queue: default_max_queue(),
            queue_timeout_ms: default_queue_timeout_ms(),
        }
    }
}

impl BulkheadConfig {
    pub fn queue_timeout(&self) -> Duration {
        Duration::from_millis(self.queue_timeout_ms)
    }

    pub(crate) fn problems(&self) -> Vec<String> {
        if self.max_concurrent == 0 {
            vec!["bulkhead.max_concurrent must be at least 1".to_string()]
        } else {
            Vec::new()
        }
    }
}
