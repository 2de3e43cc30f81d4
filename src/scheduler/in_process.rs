//! In-process execution on the rayon pool.
//!
//! Used for trusted analyzers and by [`AnalyzerRegistry::execute_analyzers`].
//! There is no supervisor here: a panicking analyzer is caught and reported
//! as a failure of that one invocation.

use super::executor::TaskExecutor;
use crate::core::{AnalyzerOptions, SourceFile, Task, TaskOutput};
use crate::errors::TaskError;
use crate::events::PipelineEvent;
use crate::observability::panic_message;
use crate::registry::{AnalyzerBatch, AnalyzerRegistry, AnalyzerRun, ResolvedAnalyzer};
use rayon::prelude::*;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::time::Instant;

/// Run batches one after another; analyzers inside a batch run concurrently.
///
/// Results follow batch order, then the order of ids within each batch.
pub fn run_batches(
    registry: &AnalyzerRegistry,
    batches: &[AnalyzerBatch],
    files: &[SourceFile],
    options: &AnalyzerOptions,
) -> Vec<AnalyzerRun> {
    let mut runs = Vec::new();
    for batch in batches {
        tracing::debug!(analyzers = ?batch.analyzer_ids, blocking = batch.blocking, "Running analyzer batch");
        let batch_runs: Vec<AnalyzerRun> = batch
            .analyzer_ids
            .par_iter()
            .map(|id| match registry.resolve(id) {
                Some(resolved) => {
                    let matching: Vec<SourceFile> = files
                        .iter()
                        .filter(|f| registry.applies_to(id, &f.path))
                        .cloned()
                        .collect();
                    run_analyzer(registry, &resolved, &matching, options)
                }
                None => AnalyzerRun::failed(
                    id,
                    TaskError::UnknownAnalyzer(id.clone()).to_string(),
                    Default::default(),
                ),
            })
            .collect();
        runs.extend(batch_runs);
    }
    runs
}

/// Invoke one analyzer over `files`, timing it and isolating failures.
///
/// An analyzer with no matching files is not invoked and reports success.
pub fn run_analyzer(
    registry: &AnalyzerRegistry,
    resolved: &ResolvedAnalyzer,
    files: &[SourceFile],
    options: &AnalyzerOptions,
) -> AnalyzerRun {
    let id = resolved.descriptor.id.as_str();
    let started = Instant::now();

    if files.is_empty() {
        return AnalyzerRun {
            analyzer_id: id.to_string(),
            success: true,
            issues: Vec::new(),
            stats: Default::default(),
            duration: started.elapsed(),
            error: None,
        };
    }

    let events = registry.events();
    events.emit(PipelineEvent::AnalyzerStarted {
        analyzer_id: id.to_string(),
        files: files.len(),
    });

    let ctx = resolved.context(options);
    let outcome = catch_unwind(AssertUnwindSafe(|| resolved.analyzer.analyze(files, &ctx)));
    let duration = started.elapsed();

    let error = match outcome {
        Ok(Ok(output)) => {
            let mut issues = output.issues;
            for issue in issues.iter_mut().filter(|i| i.analyzer.is_empty()) {
                issue.analyzer = id.to_string();
            }
            tracing::debug!(analyzer = id, issues = issues.len(), ?duration, "Analyzer completed");
            events.emit(PipelineEvent::AnalyzerCompleted {
                analyzer_id: id.to_string(),
                issues: issues.len(),
                duration,
            });
            return AnalyzerRun {
                analyzer_id: id.to_string(),
                success: true,
                issues,
                stats: output.stats,
                duration,
                error: None,
            };
        }
        Ok(Err(e)) => format!("{e:#}"),
        Err(payload) => format!("analyzer panicked: {}", panic_message(payload.as_ref())),
    };

    tracing::warn!(analyzer = id, error = %error, "Analyzer failed");
    events.emit(PipelineEvent::AnalyzerFailed {
        analyzer_id: id.to_string(),
        error: error.clone(),
    });
    AnalyzerRun::failed(id, error, duration)
}

/// Execute a single task on the calling thread, converting a panic into a
/// task failure instead of a crash.
pub fn run_task(executor: &dyn TaskExecutor, task: &Task) -> Result<TaskOutput, TaskError> {
    catch_unwind(AssertUnwindSafe(|| executor.execute(task))).unwrap_or_else(|payload| {
        Err(TaskError::Analyzer(format!(
            "analyzer panicked: {}",
            panic_message(payload.as_ref())
        )))
    })
}
