use serde::{Deserialize, Serialize};

use super::cache::CacheConfig;
use super::parallel::SchedulerConfig;
use super::reducer::ReducerConfig;
use super::resilience::{BulkheadConfig, CircuitBreakerConfig};
use super::retry::RetryConfig;
use crate::errors::{Error, Result};

fn default_secrets_analyzer() -> String {
    "secrets".to_string()
}

/// Root configuration structure for vigil
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VigilConfig {
    /// Worker pool and dispatch configuration
    #[serde(default)]
    pub scheduler: SchedulerConfig,

    /// Incremental cache configuration
    #[serde(default)]
    pub cache: CacheConfig,

    /// False-positive reduction configuration
    #[serde(default)]
    pub reducer: ReducerConfig,

    /// Retry policy for unreliable analyzer backends
    #[serde(default)]
    pub retry: RetryConfig,

    /// Circuit breaker for unreliable analyzer backends
    #[serde(default)]
    pub circuit_breaker: CircuitBreakerConfig,

    /// Concurrency limits for unreliable analyzer backends
    #[serde(default)]
    pub bulkhead: BulkheadConfig,

    /// Analyzer id used by secrets-only scans
    #[serde(default = "default_secrets_analyzer")]
    pub secrets_analyzer: String,
}

impl Default for VigilConfig {
    fn default() -> Self {
        Self {
            scheduler: SchedulerConfig::default(),
            cache: CacheConfig::default(),
            reducer: ReducerConfig::default(),
            retry: RetryConfig::default(),
            circuit_breaker: CircuitBreakerConfig::default(),
            bulkhead: BulkheadConfig::default(),
            secrets_analyzer: default_secrets_analyzer(),
        }
    }
}

impl VigilConfig {
    /// Collect every problem in the configuration.
    pub fn problems(&self) -> Vec<String> {
        let mut problems = Vec::new();
        problems.extend(self.scheduler.problems());
        problems.extend(self.cache.problems());
        problems.extend(self.reducer.problems());
        problems.extend(self.retry.problems());
        problems.extend(self.circuit_breaker.problems());
        problems.extend(self.bulkhead.problems());
        if self.secrets_analyzer.trim().is_empty() {
            problems.push("secrets_analyzer must not be empty".to_string());
        }
        problems
    }

    /// Validate the configuration, reporting all problems at once.
    pub fn validate(&self) -> Result<()> {
        let problems = self.problems();
        if problems.is_empty() {
            Ok(())
        } else {
            Err(Error::config(problems.join("; ")))
        }
    }
}
