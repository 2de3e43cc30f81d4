use super::{Issue, SourceFile};
use crate::errors::TaskError;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

/// Free-form per-analyzer options, as configured in the registry
pub type AnalyzerOptions = serde_json::Map<String, serde_json::Value>;

/// Counters an analyzer may report alongside its issues
pub type AnalyzerStats = BTreeMap<String, u64>;

static NEXT_TASK_ID: AtomicU64 = AtomicU64::new(1);

/// Correlation id for a task and its result
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TaskId(u64);

impl TaskId {
    pub fn next() -> Self {
        Self(NEXT_TASK_ID.fetch_add(1, Ordering::Relaxed))
    }

    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "task-{}", self.0)
    }
}

/// One (analyzer, file) unit of scheduled work. Consumed exactly once.
#[derive(Debug, Clone)]
pub struct Task {
    pub id: TaskId,
    pub analyzer_id: String,
    pub file: SourceFile,
    pub options: AnalyzerOptions,
}

impl Task {
    pub fn new(analyzer_id: impl Into<String>, file: SourceFile) -> Self {
        Self {
            id: TaskId::next(),
            analyzer_id: analyzer_id.into(),
            file,
            options: AnalyzerOptions::new(),
        }
    }

    pub fn with_options(mut self, options: AnalyzerOptions) -> Self {
        self.options = options;
        self
    }
}

/// Successful output of a task
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TaskOutput {
    pub issues: Vec<Issue>,
    pub stats: AnalyzerStats,
    pub duration: Duration,
}

/// Result of a task, produced by exactly one worker (or by the supervisor
/// on the worker's behalf when it crashed)
#[derive(Debug, Clone)]
pub struct TaskResult {
    pub task_id: TaskId,
    pub worker_id: Option<usize>,
    pub analyzer_id: String,
    pub path: String,
    pub outcome: Result<TaskOutput, TaskError>,
}

impl TaskResult {
    pub fn is_success(&self) -> bool {
        self.outcome.is_ok()
    }

    pub fn issue_count(&self) -> usize {
        self.outcome.as_ref().map(|o| o.issues.len()).unwrap_or(0)
    }
}
