//! Grouping of analyzers into ordered execution batches.

use super::AnalyzerDescriptor;
use crate::core::{AnalyzerStats, Issue};
use std::time::Duration;

/// Analyzers that may run at the same time.
///
/// Batches run strictly one after another; analyzers inside a batch run
/// concurrently. A blocking analyzer always forms a batch of its own.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnalyzerBatch {
    pub analyzer_ids: Vec<String>,
    pub blocking: bool,
}

impl AnalyzerBatch {
    pub fn len(&self) -> usize {
        self.analyzer_ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.analyzer_ids.is_empty()
    }

    pub fn contains(&self, analyzer_id: &str) -> bool {
        self.analyzer_ids.iter().any(|id| id == analyzer_id)
    }
}

/// Split analyzers, already in execution order, into batches.
///
/// Consecutive non-blocking analyzers are merged; each blocking analyzer
/// becomes a singleton batch and closes the batch before it.
pub fn plan_batches(ordered: &[AnalyzerDescriptor]) -> Vec<AnalyzerBatch> {
    let mut batches = Vec::new();
    let mut current: Vec<String> = Vec::new();

    for descriptor in ordered {
        if descriptor.blocking {
            if !current.is_empty() {
                batches.push(AnalyzerBatch {
                    analyzer_ids: std::mem::take(&mut current),
                    blocking: false,
                });
            }
            batches.push(AnalyzerBatch {
                analyzer_ids: vec![descriptor.id.clone()],
                blocking: true,
            });
        } else {
            current.push(descriptor.id.clone());
        }
    }

    if !current.is_empty() {
        batches.push(AnalyzerBatch {
            analyzer_ids: current,
            blocking: false,
        });
    }

    batches
}

/// Outcome of running one analyzer over a set of files in-process
#[derive(Debug, Clone, PartialEq)]
pub struct AnalyzerRun {
    pub analyzer_id: String,
    pub success: bool,
    pub issues: Vec<Issue>,
    pub stats: AnalyzerStats,
    pub duration: Duration,
    pub error: Option<String>,
}

impl AnalyzerRun {
    pub(crate) fn failed(analyzer_id: &str, error: impl Into<String>, duration: Duration) -> Self {
        Self {
            analyzer_id: analyzer_id.to_string(),
            success: false,
            issues: Vec::new(),
            stats: AnalyzerStats::new(),
            duration,
            error: Some(error.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn descriptor(id: &str, blocking: bool) -> AnalyzerDescriptor {
        AnalyzerDescriptor::new(id).blocking(blocking)
    }

    fn ids(batches: &[AnalyzerBatch]) -> Vec<Vec<&str>> {
        batches
            .iter()
            .map(|b| b.analyzer_ids.iter().map(String::as_str).collect())
            .collect()
    }

    #[test]
    fn test_non_blocking_analyzers_merge() {
        let batches = plan_batches(&[descriptor("a", false), descriptor("b", false)]);
        assert_eq!(ids(&batches), vec![vec!["a", "b"]]);
        assert!(!batches[0].blocking);
    }

    #[test]
    fn test_blocking_analyzer_splits_batches() {
        let batches = plan_batches(&[
            descriptor("a", false),
            descriptor("b", false),
            descriptor("lock", true),
            descriptor("c", false),
        ]);
        assert_eq!(ids(&batches), vec![vec!["a", "b"], vec!["lock"], vec!["c"]]);
        assert!(batches[1].blocking);
    }

    #[test]
    fn test_consecutive_blocking_analyzers_stay_separate() {
        let batches = plan_batches(&[descriptor("x", true), descriptor("y", true)]);
        assert_eq!(ids(&batches), vec![vec!["x"], vec!["y"]]);
    }

    #[test]
    fn test_empty_plan() {
        assert!(plan_batches(&[]).is_empty());
    }
}
