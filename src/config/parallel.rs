//! Scheduler configuration: worker pool size, timeouts and batching.

use serde::{Deserialize, Serialize};
use std::time::Duration;

fn default_max_workers() -> usize {
    4
}

fn default_task_timeout_ms() -> u64 {
    30_000
}

fn default_batch_size() -> usize {
    10
}

fn default_parallel() -> bool {
    true
}

fn default_max_restarts() -> u32 {
    5
}

fn default_restart_window_ms() -> u64 {
    60_000
}

fn default_restart_backoff_ms() -> u64 {
    1_000
}

/// Configuration for the worker pool and task dispatch.
///
/// # Example
///
/// ```rust
/// use vigil::config::SchedulerConfig;
///
/// let config = SchedulerConfig {
///     max_workers: 8,
///     ..Default::default()
/// };
/// assert_eq!(config.max_workers, 8);
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SchedulerConfig {
    /// Number of pooled workers (default: 4). Fixed for the pool's lifetime.
    #[serde(default = "default_max_workers")]
    pub max_workers: usize,

    /// How long a caller waits for a task result (default: 30s)
    ///
    /// This is a soft timeout: the worker keeps running the task.
    #[serde(default = "default_task_timeout_ms")]
    pub task_timeout_ms: u64,

    /// Chunk size used when tasks are processed sequentially (default: 10)
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,

    /// Submit all tasks at once (default: true)
    ///
    /// When disabled, tasks run through `batch_size`-sized chunks one after
    /// another.
    #[serde(default = "default_parallel")]
    pub parallel: bool,

    /// Respawns allowed per slot within `restart_window_ms` before the
    /// supervisor starts delaying them (default: 5)
    #[serde(default = "default_max_restarts")]
    pub max_restarts: u32,

    /// Window over which respawns are counted (default: 60s)
    #[serde(default = "default_restart_window_ms")]
    pub restart_window_ms: u64,

    /// Delay applied to a respawn once the budget is spent (default: 1s)
    #[serde(default = "default_restart_backoff_ms")]
    pub restart_backoff_ms: u64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            max_workers: default_max_workers(),
            task_timeout_ms: default_task_timeout_ms(),
            batch_size: default_batch_size(),
            parallel: default_parallel(),
            max_restarts: default_max_restarts(),
            restart_window_ms: default_restart_window_ms(),
            restart_backoff_ms: default_restart_backoff_ms(),
        }
    }
}

impl SchedulerConfig {
    /// Create a config that processes tasks in sequential chunks.
    pub fn sequential() -> Self {
        Self {
            parallel: false,
            ..Default::default()
        }
    }

    pub fn task_timeout(&self) -> Duration {
        Duration::from_millis(self.task_timeout_ms)
    }

    pub fn restart_window(&self) -> Duration {
        Duration::from_millis(self.restart_window_ms)
    }

    pub fn restart_backoff(&self) -> Duration {
        Duration::from_millis(self.restart_backoff_ms)
    }

    /// Get the effective batch size (never zero).
    pub fn effective_batch_size(&self) -> usize {
        self.batch_size.max(1)
    }

    pub(crate) fn problems(&self) -> Vec<String> {
        let mut problems = Vec::new();
        if self.max_workers == 0 {
            problems.push("scheduler.max_workers must be at least 1".to_string());
        }
        if self.task_timeout_ms == 0 {
            problems.push("scheduler.task_timeout_ms must be greater than 0".to_string());
        }
        problems
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scheduler_config_default() {
        let config = SchedulerConfig::default();
        assert_eq!(config.max_workers, 4);
        assert!(config.parallel);
        assert_eq!(config.task_timeout(), Duration::from_secs(30));
    }

    #[test]
    fn test_sequential_config() {
        let config = SchedulerConfig::sequential();
        assert!(!config.parallel);
        assert_eq!(config.max_workers, 4);
    }

    #[test]
    fn test_effective_batch_size_never_zero() {
        let config = SchedulerConfig {
            batch_size: 0,
            ..Default::default()
        };
        assert_eq!(config.effective_batch_size(), 1);
    }

    #[test]
    fn test_zero_workers_is_a_problem() {
        let config = SchedulerConfig {
            max_workers: 0,
            ..Default::default()
        };
        assert_eq!(config.problems().len(), 1);
    }
}
