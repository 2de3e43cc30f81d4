//! False-positive reducer configuration.

use serde::{Deserialize, Serialize};

/// Weights of the four signals in the confidence blend. Must sum to 1.0.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SignalWeights {
    #[serde(default = "default_pattern_weight")]
    pub pattern: f64,
    #[serde(default = "default_context_weight")]
    pub context: f64,
    #[serde(default = "default_history_weight")]
    pub history: f64,
    #[serde(default = "default_code_pattern_weight")]
    pub code_pattern: f64,
}

pub fn default_pattern_weight() -> f64 {
    0.2
}

pub fn default_context_weight() -> f64 {
    0.25
}

pub fn default_history_weight() -> f64 {
    0.35
}

pub fn default_code_pattern_weight() -> f64 {
    0.2
}

impl Default for SignalWeights {
    fn default() -> Self {
        Self {
            pattern: default_pattern_weight(),
            context: default_context_weight(),
            history: default_history_weight(),
            code_pattern: default_code_pattern_weight(),
        }
    }
}

impl SignalWeights {
    pub fn sum(&self) -> f64 {
        self.pattern + self.context + self.history + self.code_pattern
    }

    pub fn validate(&self) -> Result<(), String> {
        let all = [self.pattern, self.context, self.history, self.code_pattern];
        if all.iter().any(|w| !(0.0..=1.0).contains(w)) {
            return Err("signal weights must each be within [0, 1]".into());
        }
        if (self.sum() - 1.0).abs() > 0.001 {
            return Err(format!("signal weights must sum to 1.0, got {:.3}", self.sum()));
        }
        Ok(())
    }
}

fn default_enabled() -> bool {
    true
}

fn default_history_threshold() -> f64 {
    0.8
}

fn default_history_confidence_cap() -> f64 {
    0.95
}

fn default_min_history_samples() -> u32 {
    1
}

fn default_pattern_confidence() -> f64 {
    0.9
}

fn default_test_file_confidence() -> f64 {
    0.85
}

fn default_excluded_path_confidence() -> f64 {
    0.95
}

fn default_code_pattern_confidence() -> f64 {
    0.7
}

fn default_deduplicate() -> bool {
    true
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReducerConfig {
    #[serde(default = "default_enabled")]
    pub enabled: bool,

    #[serde(default)]
    pub weights: SignalWeights,

    /// Historical false-positive rate above which an issue is suppressed
    #[serde(default = "default_history_threshold")]
    pub history_threshold: f64,

    /// Upper bound on the confidence the history signal reports
    #[serde(default = "default_history_confidence_cap")]
    pub history_confidence_cap: f64,

    /// Feedback observations needed before the history signal may flag
    #[serde(default = "default_min_history_samples")]
    pub min_history_samples: u32,

    #[serde(default = "default_pattern_confidence")]
    pub pattern_confidence: f64,

    #[serde(default = "default_test_file_confidence")]
    pub test_file_confidence: f64,

    #[serde(default = "default_excluded_path_confidence")]
    pub excluded_path_confidence: f64,

    #[serde(default = "default_code_pattern_confidence")]
    pub code_pattern_confidence: f64,

    /// Suppress repeated reports of the same finding in the same file
    #[serde(default = "default_deduplicate")]
    pub deduplicate: bool,

    /// Additional noisy-substring regexes for the pattern signal
    #[serde(default)]
    pub extra_noise_patterns: Vec<String>,
}

impl Default for ReducerConfig {
    fn default() -> Self {
        Self {
            enabled: default_enabled(),
            weights: SignalWeights::default(),
            history_threshold: default_history_threshold(),
            history_confidence_cap: default_history_confidence_cap(),
            min_history_samples: default_min_history_samples(),
            pattern_confidence: default_pattern_confidence(),
            test_file_confidence: default_test_file_confidence(),
            excluded_path_confidence: default_excluded_path_confidence(),
            code_pattern_confidence: default_code_pattern_confidence(),
            deduplicate: default_deduplicate(),
            extra_noise_patterns: Vec::new(),
        }
    }
}

impl ReducerConfig {
    pub(crate) fn problems(&self) -> Vec<String> {
        let mut problems = Vec::new();
        if let Err(e) = self.weights.validate() {
            problems.push(format!("reducer.weights: {e}"));
        }
        let confidences = [
            ("history_threshold", self.history_threshold),
            ("history_confidence_cap", self.history_confidence_cap),
            ("pattern_confidence", self.pattern_confidence),
            ("test_file_confidence", self.test_file_confidence),
            ("excluded_path_confidence", self.excluded_path_confidence),
            ("code_pattern_confidence", self.code_pattern_confidence),
        ];
        for (name, value) in confidences {
            if !(0.0..=1.0).contains(&value) {
                problems.push(format!("reducer.{name} must be within [0, 1], got {value}"));
            }
        }
        problems.extend(
            self.extra_noise_patterns
                .iter()
                .filter(|p| regex::Regex::new(p).is_err())
                .map(|p| format!("reducer.extra_noise_patterns: invalid regex '{p}'")),
        );
        problems
    }
}
