//! Turning a task into analyzer output.

use crate::core::{Task, TaskOutput};
use crate::errors::TaskError;
use crate::registry::{AnalysisOutput, AnalyzerRegistry};
use std::sync::Arc;
use std::time::Instant;

/// Runs one task to completion on the calling thread.
///
/// Implementations may panic; the pool treats a panic as a worker crash.
pub trait TaskExecutor: Send + Sync {
    fn execute(&self, task: &Task) -> Result<TaskOutput, TaskError>;
}

impl<F> TaskExecutor for F
where
    F: Fn(&Task) -> Result<TaskOutput, TaskError> + Send + Sync,
{
    fn execute(&self, task: &Task) -> Result<TaskOutput, TaskError> {
        self(task)
    }
}

/// Executes tasks against the analyzers of a registry.
///
/// The analyzer is resolved when the task starts, so disabling an analyzer
/// fails its queued tasks with [`TaskError::UnknownAnalyzer`].
pub struct RegistryExecutor {
    registry: Arc<AnalyzerRegistry>,
}

impl RegistryExecutor {
    pub fn new(registry: Arc<AnalyzerRegistry>) -> Self {
        Self { registry }
    }
}

impl TaskExecutor for RegistryExecutor {
    fn execute(&self, task: &Task) -> Result<TaskOutput, TaskError> {
        let resolved = self
            .registry
            .resolve(&task.analyzer_id)
            .filter(|r| r.descriptor.enabled)
            .ok_or_else(|| TaskError::UnknownAnalyzer(task.analyzer_id.clone()))?;

        let ctx = resolved.context(&task.options);
        let started = Instant::now();
        let output = resolved
            .analyzer
            .analyze(std::slice::from_ref(&task.file), &ctx)
            .map_err(|e| TaskError::Analyzer(format!("{e:#}")))?;

        Ok(into_task_output(output, task, started))
    }
}

/// Stamp analyzer id and file onto issues that left them empty.
pub(crate) fn into_task_output(output: AnalysisOutput, task: &Task, started: Instant) -> TaskOutput {
    let AnalysisOutput { mut issues, stats } = output;
    for issue in &mut issues {
        if issue.analyzer.is_empty() {
            issue.analyzer = task.analyzer_id.clone();
        }
        if issue.file.is_empty() {
            issue.file = task.file.path.clone();
        }
    }
    TaskOutput {
        issues,
        stats,
        duration: started.elapsed(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{AnalyzerOptions, Issue, Severity, SourceFile};
    use crate::registry::{AnalysisContext, Analyzer, AnalyzerDescriptor};

    struct Echo;

    impl Analyzer for Echo {
        fn analyze(&self, _files: &[SourceFile], ctx: &AnalysisContext) -> anyhow::Result<AnalysisOutput> {
            if ctx.option_bool("fail").unwrap_or(false) {
                anyhow::bail!("asked to fail");
            }
            Ok(vec![Issue::new("echo", Severity::Info, "hello")].into())
        }
    }

    fn executor() -> RegistryExecutor {
        let registry = AnalyzerRegistry::new();
        registry
            .register(AnalyzerDescriptor::new("echo"), Arc::new(Echo), AnalyzerOptions::new())
            .unwrap();
        RegistryExecutor::new(Arc::new(registry))
    }

    #[test]
    fn test_issues_are_stamped_with_task_identity() {
        let task = Task::new("echo", SourceFile::new("src/a.js", ""));
        let output = executor().execute(&task).unwrap();
        assert_eq!(output.issues[0].analyzer, "echo");
        assert_eq!(output.issues[0].file, "src/a.js");
    }

    #[test]
    fn test_unknown_and_disabled_analyzers() {
        let executor = executor();
        let missing = Task::new("ghost", SourceFile::new("a.js", ""));
        assert_eq!(
            executor.execute(&missing).unwrap_err(),
            TaskError::UnknownAnalyzer("ghost".into())
        );

        executor.registry.disable("echo").unwrap();
        let disabled = Task::new("echo", SourceFile::new("a.js", ""));
        assert!(matches!(
            executor.execute(&disabled),
            Err(TaskError::UnknownAnalyzer(_))
        ));
    }

    #[test]
    fn test_analyzer_error_is_reported() {
        let mut options = AnalyzerOptions::new();
        options.insert("fail".into(), serde_json::json!(true));
        let task = Task::new("echo", SourceFile::new("a.js", "")).with_options(options);
        assert_eq!(
            executor().execute(&task).unwrap_err(),
            TaskError::Analyzer("asked to fail".into())
        );
    }
}
