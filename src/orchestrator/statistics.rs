//! Per-scan counters.

use crate::core::TaskResult;
use crate::observability::truncate;
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;

/// Errors kept per analyzer; later ones are only counted
const MAX_ERRORS_PER_ANALYZER: usize = 20;
const MAX_ERROR_LEN: usize = 200;

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct AnalyzerStatistics {
    pub tasks: usize,
    pub failures: usize,
    pub issues: usize,
    pub errors: Vec<String>,
}

/// Counters for one `analyze` call.
///
/// `tasks_failed` includes timed-out tasks; `tasks_timed_out` breaks them
/// out.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ScanStatistics {
    pub files_total: usize,
    pub files_analyzed: usize,
    pub files_cached: usize,
    pub tasks_total: usize,
    pub tasks_completed: usize,
    pub tasks_failed: usize,
    pub tasks_timed_out: usize,
    pub issues_found: usize,
    pub issues_suppressed: usize,
    pub suppressed_by_reason: BTreeMap<String, usize>,
    pub per_analyzer: BTreeMap<String, AnalyzerStatistics>,
    pub duration: Duration,
}

impl ScanStatistics {
    pub fn new(files_total: usize) -> Self {
        Self {
            files_total,
            ..Default::default()
        }
    }

    /// Account for one finished task
    pub fn record(&mut self, result: &TaskResult) {
        let analyzer = self
            .per_analyzer
            .entry(result.analyzer_id.clone())
            .or_default();
        analyzer.tasks += 1;

        match &result.outcome {
            Ok(output) => {
                self.tasks_completed += 1;
                analyzer.issues += output.issues.len();
            }
            Err(error) => {
                self.tasks_failed += 1;
                if error.is_timeout() {
                    self.tasks_timed_out += 1;
                }
                analyzer.failures += 1;
                if analyzer.errors.len() < MAX_ERRORS_PER_ANALYZER {
                    analyzer.errors.push(truncate(
                        &format!("{}: {}", result.path, error),
                        MAX_ERROR_LEN,
                    ));
                }
            }
        }
    }

    /// Tasks that produced output, as a fraction of tasks run
    pub fn success_rate(&self) -> f64 {
        let finished = self.tasks_completed + self.tasks_failed;
        if finished == 0 {
            1.0
        } else {
            self.tasks_completed as f64 / finished as f64
        }
    }
}

impl fmt::Display for ScanStatistics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "Files: {} total, {} analyzed, {} from cache",
            self.files_total, self.files_analyzed, self.files_cached
        )?;
        writeln!(
            f,
            "Tasks: {} total, {} completed, {} failed ({} timed out)",
            self.tasks_total, self.tasks_completed, self.tasks_failed, self.tasks_timed_out
        )?;
        write!(
            f,
            "Issues: {} found, {} suppressed in {:.2?}",
            self.issues_found, self.issues_suppressed, self.duration
        )
    }
}
