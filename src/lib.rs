//! Concurrent analysis pipeline for source scanners.
//!
//! Pluggable analyzers are registered in an [`AnalyzerRegistry`], run over
//! files by a supervised worker pool ([`Scheduler`]), short-circuited by a
//! content-addressed [`IncrementalCache`] and filtered by a multi-signal
//! [`FalsePositiveReducer`]. [`Orchestrator`] ties them together:
//!
//! ```no_run
//! use std::sync::Arc;
//! use vigil::{AnalyzeOptions, AnalyzerRegistry, FeedbackHistory, Orchestrator, SourceFile};
//!
//! # fn main() -> vigil::Result<()> {
//! let registry = Arc::new(AnalyzerRegistry::new());
//! let orchestrator = Orchestrator::new(registry, vigil::config::load_config())?;
//! let files = vec![SourceFile::new("src/app.js", "el.innerHTML = name")];
//! let report = orchestrator.analyze(&files, &AnalyzeOptions::default(), &FeedbackHistory::new());
//! println!("{}", report.statistics);
//! # Ok(())
//! # }
//! ```

pub mod cache;
pub mod config;
pub mod core;
pub mod errors;
pub mod events;
pub mod observability;
pub mod orchestrator;
pub mod reducer;
pub mod registry;
pub mod resilience;
pub mod scheduler;

pub use crate::cache::{CacheLookup, CacheStats, CachedAnalysis, IncrementalCache};
pub use crate::config::VigilConfig;
pub use crate::core::{
    AnalyzerOptions, Category, Issue, Severity, SourceFile, SuppressedIssue, Task, TaskId,
    TaskOutput, TaskResult,
};
pub use crate::errors::{Error, Result, TaskError};
pub use crate::events::{EventBus, PipelineEvent};
pub use crate::orchestrator::{AnalysisReport, AnalyzeOptions, Orchestrator, ScanStatistics};
pub use crate::reducer::{FalsePositiveReducer, FeedbackHistory, Reduction, ScanContext};
pub use crate::registry::{
    AnalysisContext, AnalysisOutput, Analyzer, AnalyzerDescriptor, AnalyzerRegistry,
    FileAnalyzer, Isolation, PerFile,
};
pub use crate::resilience::{
    Bulkhead, BreakerRegistry, CircuitBreaker, CircuitState, ResilientAnalyzer, RetryPolicy,
};
pub use crate::scheduler::{ProcessOptions, Scheduler, Settled, TaskHandle, WorkerPool};
