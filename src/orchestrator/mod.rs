//! End-to-end scans.
//!
//! The orchestrator turns a list of files into tasks, skips files the cache
//! already covers, runs the rest on the scheduler batch by batch, and hands
//! the aggregated issues to the false-positive reducer. Per-task failures
//! only show up in the statistics; a scan itself never fails.

mod statistics;

pub use statistics::{AnalyzerStatistics, ScanStatistics};

use crate::cache::{CacheLookup, IncrementalCache};
use crate::config::VigilConfig;
use crate::core::{Issue, SourceFile, SuppressedIssue, Task, TaskResult};
use crate::errors::Result;
use crate::events::{EventBus, PipelineEvent};
use crate::reducer::{FalsePositiveReducer, FeedbackHistory, ScanContext};
use crate::registry::{AnalyzerBatch, AnalyzerRegistry};
use crate::scheduler::{PoolStats, ProcessOptions, Scheduler};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

#[derive(Debug, Clone, PartialEq)]
pub struct AnalyzeOptions {
    /// Analyzer ids to run; `None` runs every enabled analyzer
    pub analyzers: Option<Vec<String>>,
    pub parallel: bool,
    pub reduce_false_positives: bool,
    /// Per-task timeout; `None` uses `scheduler.task_timeout_ms`
    pub timeout: Option<Duration>,
    pub use_cache: bool,
    /// Re-analyze files even when the cache holds valid results
    pub force: bool,
    pub scan_context: ScanContext,
}

impl Default for AnalyzeOptions {
    fn default() -> Self {
        Self {
            analyzers: None,
            parallel: true,
            reduce_false_positives: true,
            timeout: None,
            use_cache: true,
            force: false,
            scan_context: ScanContext::default(),
        }
    }
}

impl AnalyzeOptions {
    pub fn with_analyzers<S: Into<String>>(mut self, ids: impl IntoIterator<Item = S>) -> Self {
        self.analyzers = Some(ids.into_iter().map(Into::into).collect());
        self
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct AnalysisReport {
    pub issues: Vec<Issue>,
    pub suppressed: Vec<SuppressedIssue>,
    pub statistics: ScanStatistics,
}

impl AnalysisReport {
    /// Order issues by file, line, column and analyzer
    pub fn sort_by_location(&mut self) {
        fn key(issue: &Issue) -> (&str, usize, usize, &str) {
            (&issue.file, issue.line, issue.column, &issue.analyzer)
        }
        self.issues.sort_by(|a, b| key(a).cmp(&key(b)));
        self.suppressed.sort_by(|a, b| key(&a.issue).cmp(&key(&b.issue)));
    }

    pub fn has_failures(&self) -> bool {
        self.statistics.tasks_failed > 0
    }
}

/// A file that needs fresh analysis, with what its tasks produced so far
struct PendingFile<'a> {
    file: &'a SourceFile,
    analyzers: Vec<String>,
    issues: Vec<Issue>,
    failed: bool,
}

pub struct Orchestrator {
    registry: Arc<AnalyzerRegistry>,
    scheduler: Scheduler,
    cache: Option<Arc<IncrementalCache>>,
    reducer: FalsePositiveReducer,
    events: EventBus,
    config: VigilConfig,
}

impl Orchestrator {
    /// Validate `config` and start the worker pool.
    ///
    /// Events go to the registry's bus so analyzer and scan events share
    /// one stream.
    pub fn new(registry: Arc<AnalyzerRegistry>, config: VigilConfig) -> Result<Self> {
        config.validate()?;
        let events = registry.events().clone();
        let scheduler = Scheduler::new(
            Arc::clone(&registry),
            config.scheduler.clone(),
            events.clone(),
        )?;
        let reducer = FalsePositiveReducer::new(config.reducer.clone())?;
        let cache = config
            .cache
            .enabled
            .then(|| Arc::new(IncrementalCache::open(config.cache.clone())));

        Ok(Self {
            registry,
            scheduler,
            cache,
            reducer,
            events,
            config,
        })
    }

    /// Replace the cache, e.g. to share one between orchestrators
    pub fn with_cache(mut self, cache: Arc<IncrementalCache>) -> Self {
        self.cache = Some(cache);
        self
    }

    pub fn without_cache(mut self) -> Self {
        self.cache = None;
        self
    }

    pub fn registry(&self) -> &Arc<AnalyzerRegistry> {
        &self.registry
    }

    pub fn cache(&self) -> Option<&Arc<IncrementalCache>> {
        self.cache.as_ref()
    }

    pub fn events(&self) -> &EventBus {
        &self.events
    }

    pub fn config(&self) -> &VigilConfig {
        &self.config
    }

    pub fn pool_stats(&self) -> PoolStats {
        self.scheduler.stats()
    }

    /// Run the requested analyzers over `files`.
    ///
    /// Each file is paired with every requested, enabled analyzer whose
    /// patterns match it.
    pub fn analyze(
        &self,
        files: &[SourceFile],
        options: &AnalyzeOptions,
        history: &FeedbackHistory,
    ) -> AnalysisReport {
        let batches = self.registry.plan(options.analyzers.as_deref());
        let registry = &self.registry;
        self.scan(files, &batches, options, history, |id, path| {
            registry.applies_to(id, path)
        })
    }

    /// Run only the secrets analyzer, once per file, regardless of patterns.
    ///
    /// `options.analyzers` is ignored.
    pub fn scan_secrets(
        &self,
        files: &[SourceFile],
        options: &AnalyzeOptions,
        history: &FeedbackHistory,
    ) -> AnalysisReport {
        let batches = [AnalyzerBatch {
            analyzer_ids: vec![self.config.secrets_analyzer.clone()],
            blocking: false,
        }];
        self.scan(files, &batches, options, history, |_, _| true)
    }

    pub fn shutdown(&self) {
        self.scheduler.shutdown();
    }

    fn scan(
        &self,
        files: &[SourceFile],
        batches: &[AnalyzerBatch],
        options: &AnalyzeOptions,
        history: &FeedbackHistory,
        applies: impl Fn(&str, &str) -> bool,
    ) -> AnalysisReport {
        let started = Instant::now();
        let span = tracing::info_span!("scan", files = files.len());
        let _enter = span.enter();

        let cache = self.cache.as_deref().filter(|_| options.use_cache);
        let mut statistics = ScanStatistics::new(files.len());
        let mut issues = Vec::new();

        let mut pending = Vec::new();
        for file in files {
            let analyzers: Vec<String> = batches
                .iter()
                .flat_map(|b| &b.analyzer_ids)
                .filter(|id| applies(id, &file.path))
                .cloned()
                .collect();
            if analyzers.is_empty() {
                continue;
            }

            let cached = cache
                .filter(|_| !options.force)
                .and_then(|c| cached_issues(c, file, &analyzers));
            match cached {
                Some(cached) => {
                    statistics.files_cached += 1;
                    issues.extend(cached);
                }
                None => pending.push(PendingFile {
                    file,
                    analyzers,
                    issues: Vec::new(),
                    failed: false,
                }),
            }
        }
        statistics.files_analyzed = pending.len();

        // Each task carries the index of the pending file it belongs to.
        let task_batches: Vec<Vec<(usize, Task)>> = batches
            .iter()
            .map(|batch| {
                pending
                    .iter()
                    .enumerate()
                    .flat_map(|(i, p)| {
                        batch
                            .analyzer_ids
                            .iter()
                            .filter(move |id| p.analyzers.contains(*id))
                            .map(move |id| (i, Task::new(id.clone(), p.file.clone())))
                    })
                    .collect::<Vec<_>>()
            })
            .filter(|tasks| !tasks.is_empty())
            .collect();
        statistics.tasks_total = task_batches.iter().map(Vec::len).sum();

        tracing::info!(
            files = files.len(),
            cached = statistics.files_cached,
            tasks = statistics.tasks_total,
            "Starting scan"
        );
        self.events.emit(PipelineEvent::ScanStarted {
            files: files.len(),
            tasks: statistics.tasks_total,
        });

        let process = ProcessOptions {
            timeout: options
                .timeout
                .or_else(|| Some(self.config.scheduler.task_timeout())),
            batch_size: self.config.scheduler.effective_batch_size(),
            parallel: options.parallel,
        };
        let mut completed = 0;
        for batch in task_batches {
            let (owners, tasks): (Vec<usize>, Vec<Task>) = batch.into_iter().unzip();
            let mut runs = BatchRuns::start(&tasks, &self.events);
            let results = self.scheduler.process_results(tasks, &process);
            for (owner, result) in owners.into_iter().zip(results) {
                completed += 1;
                statistics.record(&result);
                runs.record(&result, &self.events);
                match result.outcome {
                    Ok(output) => pending[owner].issues.extend(output.issues),
                    Err(_) => pending[owner].failed = true,
                }
                self.events.emit(PipelineEvent::ScanProgress {
                    completed,
                    total: statistics.tasks_total,
                });
            }
            runs.finish(&self.events);
        }

        for p in pending {
            if let Some(cache) = cache {
                if p.failed {
                    tracing::debug!(path = %p.file.path, "Task failed, keeping previous cache entry");
                } else {
                    cache.save_entry(
                        &p.file.path,
                        &p.file.content,
                        p.issues.clone(),
                        p.analyzers.iter().cloned(),
                    );
                }
            }
            issues.extend(p.issues);
        }

        statistics.issues_found = issues.len();
        let (issues, suppressed) = if options.reduce_false_positives {
            let reduction = self.reducer.reduce(issues, &options.scan_context, history);
            statistics.suppressed_by_reason = reduction.stats.by_reason;
            (reduction.issues, reduction.suppressed)
        } else {
            (issues, Vec::new())
        };
        statistics.issues_suppressed = suppressed.len();

        if self.events.subscriber_count() > 0 {
            for issue in &issues {
                self.events
                    .emit(PipelineEvent::IssueFound(Box::new(issue.clone())));
            }
        }

        statistics.duration = started.elapsed();
        self.events.emit(PipelineEvent::ScanCompleted {
            issues: issues.len(),
            suppressed: suppressed.len(),
            failed_tasks: statistics.tasks_failed,
            duration: statistics.duration,
        });
        tracing::info!(
            issues = issues.len(),
            suppressed = suppressed.len(),
            failed = statistics.tasks_failed,
            duration = ?statistics.duration,
            "Scan complete"
        );

        AnalysisReport {
            issues,
            suppressed,
            statistics,
        }
    }
}

/// Cached issues for `file` if its content is unchanged and the entry holds
/// results for every analyzer in `analyzers`.
fn cached_issues(cache: &IncrementalCache, file: &SourceFile, analyzers: &[String]) -> Option<Vec<Issue>> {
    match cache.get_covering_result(&file.path, &file.content, analyzers) {
        CacheLookup::Hit { issues } => Some(issues),
        CacheLookup::Miss { .. } => None,
    }
}

#[derive(Default)]
struct BatchRun {
    issues: usize,
    failed: bool,
}

/// Analyzer lifecycle events for one batch of pooled tasks.
///
/// Every analyzer in the batch gets one start event. Each failed task is
/// reported on its own; analyzers whose tasks all succeeded get one
/// completion event once the batch is done.
struct BatchRuns {
    started: Instant,
    runs: BTreeMap<String, BatchRun>,
}

impl BatchRuns {
    fn start(tasks: &[Task], events: &EventBus) -> Self {
        let mut files: BTreeMap<&str, usize> = BTreeMap::new();
        for task in tasks {
            *files.entry(task.analyzer_id.as_str()).or_default() += 1;
        }
        for (id, files) in &files {
            events.emit(PipelineEvent::AnalyzerStarted {
                analyzer_id: id.to_string(),
                files: *files,
            });
        }

        Self {
            started: Instant::now(),
            runs: files
                .into_keys()
                .map(|id| (id.to_string(), BatchRun::default()))
                .collect(),
        }
    }

    fn record(&mut self, result: &TaskResult, events: &EventBus) {
        let run = self.runs.entry(result.analyzer_id.clone()).or_default();
        match &result.outcome {
            Ok(output) => run.issues += output.issues.len(),
            Err(error) => {
                run.failed = true;
                events.emit(PipelineEvent::AnalyzerFailed {
                    analyzer_id: result.analyzer_id.clone(),
                    error: format!("{}: {error}", result.path),
                });
            }
        }
    }

    fn finish(self, events: &EventBus) {
        let duration = self.started.elapsed();
        for (analyzer_id, run) in self.runs.into_iter().filter(|(_, run)| !run.failed) {
            events.emit(PipelineEvent::AnalyzerCompleted {
                analyzer_id,
                issues: run.issues,
                duration,
            });
        }
    }
}

impl std::fmt::Debug for Orchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Orchestrator")
            .field("registry", &self.registry)
            .field("scheduler", &self.scheduler)
            .field("cached", &self.cache.is_some())
            .finish()
    }
}
