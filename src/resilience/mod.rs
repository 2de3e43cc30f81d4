//! Resilience primitives for calls into unreliable dependencies.
//!
//! Each primitive reports failure as a structured `Result` error so callers
//! can branch on why a call did not go through.

mod bulkhead;
mod circuit_breaker;
mod retry;

pub use bulkhead::{Bulkhead, BulkheadError, BulkheadStats};
pub use circuit_breaker::{CircuitBreaker, CircuitError, CircuitState, CircuitStats};
pub use retry::{
    is_retryable, RetryFailure, RetryPolicy, RetryStopReason, Transient, RETRYABLE_CODES,
    RETRYABLE_STATUSES,
};

use crate::config::{BulkheadConfig, CircuitBreakerConfig, RetryConfig};
use crate::core::SourceFile;
use crate::registry::{AnalysisContext, AnalysisOutput, Analyzer};
use dashmap::DashMap;
use std::sync::Arc;

/// One circuit breaker per named external dependency.
#[derive(Debug, Default)]
pub struct BreakerRegistry {
    config: CircuitBreakerConfig,
    breakers: DashMap<String, Arc<CircuitBreaker>>,
}

impl BreakerRegistry {
    pub fn new(config: CircuitBreakerConfig) -> Self {
        Self {
            config,
            breakers: DashMap::new(),
        }
    }

    /// The breaker for `name`, created with the registry's config on first use
    pub fn breaker(&self, name: &str) -> Arc<CircuitBreaker> {
        self.breakers
            .entry(name.to_string())
            .or_insert_with(|| Arc::new(CircuitBreaker::new(name, self.config.clone())))
            .clone()
    }

    pub fn get(&self, name: &str) -> Option<Arc<CircuitBreaker>> {
        self.breakers.get(name).map(|b| Arc::clone(b.value()))
    }

    /// Stats of every breaker, sorted by name
    pub fn stats(&self) -> Vec<(String, CircuitStats)> {
        let mut stats: Vec<_> = self
            .breakers
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().stats()))
            .collect();
        stats.sort_by(|a, b| a.0.cmp(&b.0));
        stats
    }

    pub fn open_circuits(&self) -> Vec<String> {
        self.stats()
            .into_iter()
            .filter(|(_, s)| s.state == CircuitState::Open)
            .map(|(name, _)| name)
            .collect()
    }

    pub fn reset_all(&self) {
        for entry in self.breakers.iter() {
            entry.value().reset();
        }
    }
}

/// Wraps an analyzer with a bulkhead, a circuit breaker and retries.
///
/// The bulkhead is outermost. Retries run inside the breaker, so a whole
/// retried call counts as one breaker outcome.
pub struct ResilientAnalyzer {
    inner: Arc<dyn Analyzer>,
    retry: RetryPolicy,
    breaker: Arc<CircuitBreaker>,
    bulkhead: Option<Arc<Bulkhead>>,
}

impl ResilientAnalyzer {
    pub fn new(inner: Arc<dyn Analyzer>, breaker: Arc<CircuitBreaker>) -> Self {
        Self {
            inner,
            retry: RetryPolicy::new(RetryConfig::default()),
            breaker,
            bulkhead: None,
        }
    }

    pub fn with_retry(mut self, config: RetryConfig) -> Self {
        self.retry = RetryPolicy::new(config);
        self
    }

    pub fn with_bulkhead(mut self, bulkhead: Arc<Bulkhead>) -> Self {
        self.bulkhead = Some(bulkhead);
        self
    }

    /// Convenience constructor that builds every layer from config
    pub fn from_config(
        inner: Arc<dyn Analyzer>,
        breakers: &BreakerRegistry,
        dependency: &str,
        retry: RetryConfig,
        bulkhead: BulkheadConfig,
    ) -> Self {
        Self::new(inner, breakers.breaker(dependency))
            .with_retry(retry)
            .with_bulkhead(Arc::new(Bulkhead::new(dependency, bulkhead)))
    }

    fn guarded(&self, files: &[SourceFile], ctx: &AnalysisContext) -> anyhow::Result<AnalysisOutput> {
        let outcome = self
            .breaker
            .call(|| self.retry.execute(|_| self.inner.analyze(files, ctx)));

        match outcome {
            Ok(output) => Ok(output),
            Err(CircuitError::Inner(failure)) => {
                let context = format!("{} after {} attempt(s)", failure.reason, failure.attempts);
                Err(failure.last_error.context(context))
            }
            Err(open) => Err(anyhow::anyhow!("{open}")),
        }
    }
}

impl Analyzer for ResilientAnalyzer {
    fn analyze(&self, files: &[SourceFile], ctx: &AnalysisContext) -> anyhow::Result<AnalysisOutput> {
        match &self.bulkhead {
            Some(bulkhead) => bulkhead.execute(|| self.guarded(files, ctx))?,
            None => self.guarded(files, ctx),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::AnalyzerOptions;
    use std::sync::atomic::{AtomicU32, Ordering};

    struct Flaky {
        calls: AtomicU32,
        failures_before_success: u32,
        message: &'static str,
    }

    impl Analyzer for Flaky {
        fn analyze(&self, _files: &[SourceFile], _ctx: &AnalysisContext) -> anyhow::Result<AnalysisOutput> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            if call <= self.failures_before_success {
                anyhow::bail!(self.message);
            }
            Ok(AnalysisOutput::default().with_stat("calls", call as u64))
        }
    }

    fn fast_retry() -> RetryConfig {
        RetryConfig {
            max_retries: 2,
            initial_delay_ms: 1,
            max_delay_ms: 2,
            ..Default::default()
        }
    }

    fn ctx() -> AnalysisContext {
        AnalysisContext::new("remote", AnalyzerOptions::new())
    }

    #[test]
    fn test_breaker_registry_shares_instances() {
        let registry = BreakerRegistry::new(CircuitBreakerConfig::default());
        let a = registry.breaker("semgrep");
        let b = registry.breaker("semgrep");
        assert!(Arc::ptr_eq(&a, &b));

        a.force_open();
        assert_eq!(registry.open_circuits(), vec!["semgrep".to_string()]);
        registry.reset_all();
        assert!(registry.open_circuits().is_empty());
    }

    #[test]
    fn test_transient_failures_are_retried() {
        let flaky = Arc::new(Flaky {
            calls: AtomicU32::new(0),
            failures_before_success: 2,
            message: "socket hang up",
        });
        let breakers = BreakerRegistry::default();
        let analyzer = ResilientAnalyzer::new(flaky.clone(), breakers.breaker("remote")).with_retry(fast_retry());

        let output = analyzer.analyze(&[], &ctx()).unwrap();
        assert_eq!(output.stats["calls"], 3);
        assert_eq!(breakers.breaker("remote").state(), CircuitState::Closed);
    }

    #[test]
    fn test_open_circuit_short_circuits() {
        let flaky = Arc::new(Flaky {
            calls: AtomicU32::new(0),
            failures_before_success: 0,
            message: "",
        });
        let breakers = BreakerRegistry::default();
        breakers.breaker("remote").force_open();
        let analyzer = ResilientAnalyzer::new(flaky.clone(), breakers.breaker("remote"));

        let error = analyzer.analyze(&[], &ctx()).unwrap_err();
        assert!(error.to_string().contains("is open"));
        assert_eq!(flaky.calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_permanent_failure_reports_reason() {
        let flaky = Arc::new(Flaky {
            calls: AtomicU32::new(0),
            failures_before_success: u32::MAX,
            message: "invalid rule file",
        });
        let analyzer = ResilientAnalyzer::from_config(
            flaky.clone(),
            &BreakerRegistry::default(),
            "remote",
            fast_retry(),
            BulkheadConfig::default(),
        );

        let error = analyzer.analyze(&[], &ctx()).unwrap_err();
        assert_eq!(
            format!("{error:#}"),
            "error is not retryable after 1 attempt(s): invalid rule file"
        );
        assert_eq!(flaky.calls.load(Ordering::SeqCst), 1);
    }
}
