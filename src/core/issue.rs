use serde::{Deserialize, Serialize};
use std::fmt;
use xxhash_rust::xxh64::xxh64;

/// Issue severity, ordered from most to least severe
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Critical,
    High,
    Medium,
    Low,
    Info,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Critical => "critical",
            Self::High => "high",
            Self::Medium => "medium",
            Self::Low => "low",
            Self::Info => "info",
        };
        write!(f, "{label}")
    }
}

/// Category tag for analyzers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    Security,
    Secrets,
    Quality,
    Performance,
    Correctness,
    Maintainability,
}

/// A single finding reported by an analyzer.
///
/// `line` and `column` are 1-based; zero means the analyzer did not report a
/// position.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Issue {
    pub analyzer: String,
    #[serde(rename = "type")]
    pub issue_type: String,
    pub severity: Severity,
    pub message: String,
    pub file: String,
    #[serde(default)]
    pub line: usize,
    #[serde(default)]
    pub column: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub snippet: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub suggestion: Option<String>,
    #[serde(default = "default_confidence")]
    pub confidence: f64,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
}

fn default_confidence() -> f64 {
    1.0
}

impl Issue {
    pub fn new(
        issue_type: impl Into<String>,
        severity: Severity,
        message: impl Into<String>,
    ) -> Self {
        Self {
            analyzer: String::new(),
            issue_type: issue_type.into(),
            severity,
            message: message.into(),
            file: String::new(),
            line: 0,
            column: 0,
            snippet: None,
            suggestion: None,
            confidence: default_confidence(),
            tags: Vec::new(),
        }
    }

    pub fn in_file(mut self, file: impl Into<String>) -> Self {
        self.file = file.into();
        self
    }

    pub fn at(mut self, line: usize, column: usize) -> Self {
        self.line = line;
        self.column = column;
        self
    }

    pub fn from_analyzer(mut self, analyzer: impl Into<String>) -> Self {
        self.analyzer = analyzer.into();
        self
    }

    pub fn with_snippet(mut self, snippet: impl Into<String>) -> Self {
        self.snippet = Some(snippet.into());
        self
    }

    pub fn with_suggestion(mut self, suggestion: impl Into<String>) -> Self {
        self.suggestion = Some(suggestion.into());
        self
    }

    pub fn with_confidence(mut self, confidence: f64) -> Self {
        self.confidence = confidence.clamp(0.0, 1.0);
        self
    }

    pub fn with_tag(mut self, tag: impl Into<String>) -> Self {
        self.tags.push(tag.into());
        self
    }

    /// Stable identity of an issue within one file.
    ///
    /// Two reports of the same finding hash equally even if their confidence,
    /// snippet or suggestion differ.
    pub fn fingerprint(&self) -> u64 {
        let key = format!(
            "{}\u{1f}{}\u{1f}{}\u{1f}{}\u{1f}{}\u{1f}{}",
            self.analyzer, self.issue_type, self.file, self.line, self.column, self.message
        );
        xxh64(key.as_bytes(), 0)
    }

    /// Key used by the feedback history: analyzer, type and file
    pub fn history_key(&self) -> String {
        format!("{}:{}:{}", self.analyzer, self.issue_type, self.file)
    }
}

/// An issue the false-positive reducer decided to hide, with the reason
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SuppressedIssue {
    pub issue: Issue,
    pub reason: String,
}
