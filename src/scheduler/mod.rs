//! Task scheduling.
//!
//! [`Scheduler`] is the single entry point for running tasks. Each task is
//! routed by its analyzer's [`Isolation`]: pooled analyzers run on the
//! supervised [`WorkerPool`], in-process analyzers run directly on rayon.
//! Both backends resolve a task to exactly one [`TaskResult`].

mod executor;
mod handle;
pub mod in_process;
mod pool;
mod settled;

pub use executor::{RegistryExecutor, TaskExecutor};
pub use handle::TaskHandle;
pub use pool::{PoolStats, WorkerPool};
pub use settled::Settled;

use crate::config::SchedulerConfig;
use crate::core::{Task, TaskOutput, TaskResult};
use crate::errors::{Result, TaskError};
use crate::events::EventBus;
use crate::registry::{AnalyzerRegistry, Isolation};
use std::sync::Arc;
use std::time::Duration;

/// How a task list is processed
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessOptions {
    /// Soft per-task timeout, counted from submission
    pub timeout: Option<Duration>,
    /// Chunk size in sequential mode
    pub batch_size: usize,
    /// Submit everything at once instead of chunk by chunk
    pub parallel: bool,
}

impl Default for ProcessOptions {
    fn default() -> Self {
        Self::from(&SchedulerConfig::default())
    }
}

impl From<&SchedulerConfig> for ProcessOptions {
    fn from(config: &SchedulerConfig) -> Self {
        Self {
            timeout: Some(config.task_timeout()),
            batch_size: config.effective_batch_size(),
            parallel: config.parallel,
        }
    }
}

pub struct Scheduler {
    pool: WorkerPool,
    executor: Arc<RegistryExecutor>,
    registry: Arc<AnalyzerRegistry>,
    config: SchedulerConfig,
}

impl Scheduler {
    pub fn new(
        registry: Arc<AnalyzerRegistry>,
        config: SchedulerConfig,
        events: EventBus,
    ) -> Result<Self> {
        let executor = Arc::new(RegistryExecutor::new(Arc::clone(&registry)));
        let pool = WorkerPool::new(&config, executor.clone(), events)?;
        Ok(Self {
            pool,
            executor,
            registry,
            config,
        })
    }

    pub fn config(&self) -> &SchedulerConfig {
        &self.config
    }

    /// Default processing options derived from the scheduler config
    pub fn process_options(&self) -> ProcessOptions {
        ProcessOptions::from(&self.config)
    }

    /// Submit one task. Never blocks.
    pub fn submit(&self, task: Task) -> TaskHandle {
        let isolation = self
            .registry
            .descriptor(&task.analyzer_id)
            .map(|d| d.isolation)
            .unwrap_or_default();

        match isolation {
            Isolation::Pooled => self.pool.submit(task),
            Isolation::InProcess => {
                let (reply, handle) = handle::task_channel(&task);
                let executor = Arc::clone(&self.executor);
                rayon::spawn(move || {
                    let outcome = in_process::run_task(executor.as_ref(), &task);
                    reply.send(None, outcome);
                });
                handle
            }
        }
    }

    /// Submit one task and wait for it, failing with
    /// [`TaskError::Timeout`] after `timeout`.
    pub fn submit_task(&self, task: Task, timeout: Option<Duration>) -> std::result::Result<TaskOutput, TaskError> {
        self.submit(task).wait(timeout).outcome
    }

    /// Run every task and settle each one, in submission order.
    pub fn process(&self, tasks: Vec<Task>, options: &ProcessOptions) -> Vec<Settled<TaskOutput>> {
        self.process_results(tasks, options)
            .into_iter()
            .map(|r| Settled::from(r.outcome))
            .collect()
    }

    /// Like [`process`](Self::process) but keeps task identity with each
    /// outcome.
    pub fn process_results(&self, tasks: Vec<Task>, options: &ProcessOptions) -> Vec<TaskResult> {
        if options.parallel {
            let handles: Vec<TaskHandle> = tasks.into_iter().map(|t| self.submit(t)).collect();
            return handles.into_iter().map(|h| h.wait(options.timeout)).collect();
        }

        let chunk = options.batch_size.max(1);
        let mut results = Vec::with_capacity(tasks.len());
        let mut tasks = tasks.into_iter().peekable();
        while tasks.peek().is_some() {
            let handles: Vec<TaskHandle> = tasks.by_ref().take(chunk).map(|t| self.submit(t)).collect();
            results.extend(handles.into_iter().map(|h| h.wait(options.timeout)));
        }
        results
    }

    pub fn stats(&self) -> PoolStats {
        self.pool.stats()
    }

    pub fn shutdown(&self) {
        self.pool.shutdown();
    }
}

impl std::fmt::Debug for Scheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Scheduler")
            .field("pool", &self.pool)
            .field("config", &self.config)
            .finish()
    }
}
