//! False-positive reduction.
//!
//! Every issue is scored by four independent signals. An issue is
//! suppressed when any signal flags it; the first flagging signal in the
//! order pattern, context, history, code-pattern explains why. Nothing is
//! dropped: the kept and suppressed lists together cover the input.

mod confidence;
mod history;
mod signals;

pub use confidence::{calculate_confidence, ConfidenceSignal, SignalSet, SignalSource};
pub use history::{FeedbackCounts, FeedbackHistory};
pub use signals::ScanContext;

use crate::config::ReducerConfig;
use crate::core::{Issue, SuppressedIssue};
use crate::errors::{Error, Result};
use regex::Regex;
use signals::ContextMatcher;
use std::collections::{BTreeMap, HashSet};

/// Suppression reason for repeated reports of one finding
pub const DUPLICATE_REASON: &str = "duplicate";

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ReductionStats {
    pub total: usize,
    pub kept: usize,
    pub suppressed: usize,
    /// Suppressions per deciding signal (`pattern`, `context`, `history`,
    /// `code_pattern`, `duplicate`)
    pub by_reason: BTreeMap<String, usize>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Reduction {
    pub issues: Vec<Issue>,
    pub suppressed: Vec<SuppressedIssue>,
    pub stats: ReductionStats,
}

/// Verdict for a single issue
#[derive(Debug, Clone, PartialEq)]
pub struct Evaluation {
    pub signals: SignalSet,
    pub confidence: f64,
}

impl Evaluation {
    pub fn suppression(&self) -> Option<&ConfidenceSignal> {
        self.signals.first_flagged()
    }
}

#[derive(Debug, Clone, Default)]
pub struct FalsePositiveReducer {
    config: ReducerConfig,
    extra_patterns: Vec<Regex>,
}

impl FalsePositiveReducer {
    pub fn new(config: ReducerConfig) -> Result<Self> {
        config
            .weights
            .validate()
            .map_err(|e| Error::config(format!("reducer.weights: {e}")))?;
        let extra_patterns = config
            .extra_noise_patterns
            .iter()
            .map(|p| Regex::new(p))
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(Self {
            config,
            extra_patterns,
        })
    }

    pub fn config(&self) -> &ReducerConfig {
        &self.config
    }

    /// Run all four signals for one issue
    pub fn evaluate(&self, issue: &Issue, context: &ScanContext, history: &FeedbackHistory) -> Evaluation {
        self.evaluate_with(issue, &ContextMatcher::new(context), history)
    }

    fn evaluate_with(&self, issue: &Issue, context: &ContextMatcher, history: &FeedbackHistory) -> Evaluation {
        let signals = SignalSet {
            pattern: signals::pattern_signal(issue, &self.config, &self.extra_patterns),
            context: signals::context_signal(issue, context, &self.config),
            history: signals::history_signal(issue, history, &self.config),
            code_pattern: signals::code_pattern_signal(issue, &self.config),
        };
        let confidence = calculate_confidence(&signals, &self.config.weights);
        Evaluation {
            signals,
            confidence,
        }
    }

    /// Split `issues` into kept and suppressed, attaching confidence.
    ///
    /// Input order is preserved within both lists.
    pub fn reduce(&self, issues: Vec<Issue>, context: &ScanContext, history: &FeedbackHistory) -> Reduction {
        let total = issues.len();
        if !self.config.enabled {
            return Reduction {
                stats: ReductionStats {
                    total,
                    kept: total,
                    ..Default::default()
                },
                issues,
                suppressed: Vec::new(),
            };
        }

        let matcher = ContextMatcher::new(context);
        let mut seen = HashSet::new();
        let mut reduction = Reduction::default();

        for mut issue in issues {
            if self.config.deduplicate && !seen.insert((issue.fingerprint(), issue.file.clone())) {
                reduction.push_suppressed(issue, DUPLICATE_REASON.to_string(), DUPLICATE_REASON);
                continue;
            }

            let evaluation = self.evaluate_with(&issue, &matcher, history);
            issue.confidence = evaluation.confidence;
            match evaluation.suppression() {
                Some(signal) => {
                    let reason = signal
                        .reason
                        .clone()
                        .unwrap_or_else(|| signal.source.to_string());
                    reduction.push_suppressed(issue, reason, signal.source.as_str());
                }
                None => reduction.issues.push(issue),
            }
        }

        reduction.stats.total = total;
        reduction.stats.kept = reduction.issues.len();
        reduction.stats.suppressed = reduction.suppressed.len();
        tracing::debug!(
            total,
            kept = reduction.stats.kept,
            suppressed = reduction.stats.suppressed,
            "False-positive reduction complete"
        );
        reduction
    }
}

impl Reduction {
    fn push_suppressed(&mut self, issue: Issue, reason: String, source: &str) {
        *self.stats.by_reason.entry(source.to_string()).or_insert(0) += 1;
        self.suppressed.push(SuppressedIssue { issue, reason });
    }
}
