//! Signal values and the weighted confidence blend.

use crate::config::SignalWeights;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum SignalSource {
    Pattern,
    Context,
    History,
    CodePattern,
}

impl SignalSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pattern => "pattern",
            Self::Context => "context",
            Self::History => "history",
            Self::CodePattern => "code_pattern",
        }
    }
}

impl fmt::Display for SignalSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One evaluator's verdict on an issue.
///
/// `confidence` is how sure the evaluator is that the issue is noise. A
/// signal that does not flag may still carry doubt (the history signal
/// reports its rate this way).
#[derive(Debug, Clone, PartialEq)]
pub struct ConfidenceSignal {
    pub source: SignalSource,
    pub is_false_positive: bool,
    pub confidence: f64,
    pub reason: Option<String>,
}

impl ConfidenceSignal {
    pub fn clear(source: SignalSource) -> Self {
        Self {
            source,
            is_false_positive: false,
            confidence: 0.0,
            reason: None,
        }
    }

    pub fn flagged(source: SignalSource, confidence: f64, reason: impl Into<String>) -> Self {
        Self {
            source,
            is_false_positive: true,
            confidence: confidence.clamp(0.0, 1.0),
            reason: Some(reason.into()),
        }
    }

    pub fn doubt(source: SignalSource, confidence: f64) -> Self {
        Self {
            source,
            is_false_positive: false,
            confidence: confidence.clamp(0.0, 1.0),
            reason: None,
        }
    }
}

/// The four signals evaluated for one issue
#[derive(Debug, Clone, PartialEq)]
pub struct SignalSet {
    pub pattern: ConfidenceSignal,
    pub context: ConfidenceSignal,
    pub history: ConfidenceSignal,
    pub code_pattern: ConfidenceSignal,
}

impl SignalSet {
    /// Signals in decision order
    pub fn iter(&self) -> impl Iterator<Item = &ConfidenceSignal> {
        [&self.pattern, &self.context, &self.history, &self.code_pattern].into_iter()
    }

    /// First flagging signal in decision order
    pub fn first_flagged(&self) -> Option<&ConfidenceSignal> {
        self.iter().find(|s| s.is_false_positive)
    }

    pub fn is_false_positive(&self) -> bool {
        self.first_flagged().is_some()
    }
}

/// Blend signal doubts into a confidence that the issue is genuine.
///
/// `Σ wᵢ·(1 − cᵢ)`, clamped to `[0, 1]`.
pub fn calculate_confidence(signals: &SignalSet, weights: &SignalWeights) -> f64 {
    let blended = weights.pattern * (1.0 - signals.pattern.confidence)
        + weights.context * (1.0 - signals.context.confidence)
        + weights.history * (1.0 - signals.history.confidence)
        + weights.code_pattern * (1.0 - signals.code_pattern.confidence);
    if blended.is_nan() {
        return 0.0;
    }
    blended.clamp(0.0, 1.0)
}
