//! The four false-positive signal evaluators.

use super::confidence::{ConfidenceSignal, SignalSource};
use super::history::FeedbackHistory;
use crate::config::ReducerConfig;
use crate::core::Issue;
use crate::registry::FilePattern;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

/// Noisy substrings: environment access, test and mock markers, explicit
/// disable comments. Matched against message and snippet.
static NOISE_PATTERNS: Lazy<Vec<(&'static str, Regex)>> = Lazy::new(|| {
    [
        ("environment variable access", r"process\.env|std::env::var|os\.environ|getenv\(|ENV\["),
        ("test or mock marker", r"(?i)\b(mock|stub|fake|dummy|fixture)s?\b"),
        (
            "disable comment",
            r"(?i)eslint-disable|nosec|noqa|nolint|#\[allow\(|@suppress|vigil-ignore",
        ),
    ]
    .into_iter()
    .filter_map(|(label, pattern)| Regex::new(pattern).ok().map(|re| (label, re)))
    .collect()
});

/// Benign snippet shapes that commonly trip security analyzers.
static BENIGN_CODE_PATTERNS: Lazy<Vec<(&'static str, Regex)>> = Lazy::new(|| {
    [
        ("URL encoding", r"encodeURIComponent|encodeURI\(|urlencode|quote_plus|percent_encode"),
        ("safe DOM API", r"\.textContent\b|\.innerText\b|createTextNode|setAttribute\("),
        ("HTTPS literal", r#"["'`]https://"#),
        (
            "configuration value",
            r"(?i)\b(config|settings|options|defaults)\s*(\.|\[|=|:)",
        ),
    ]
    .into_iter()
    .filter_map(|(label, pattern)| Regex::new(pattern).ok().map(|re| (label, re)))
    .collect()
});

/// Caller knowledge about the scanned tree
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ScanContext {
    /// Test files, as exact paths or glob patterns
    #[serde(default)]
    pub test_files: Vec<String>,
    /// Excluded locations: exact paths, directory prefixes or glob patterns
    #[serde(default)]
    pub excluded_paths: Vec<String>,
}

impl ScanContext {
    pub fn with_test_files<S: Into<String>>(mut self, files: impl IntoIterator<Item = S>) -> Self {
        self.test_files.extend(files.into_iter().map(Into::into));
        self
    }

    pub fn with_excluded_paths<S: Into<String>>(mut self, paths: impl IntoIterator<Item = S>) -> Self {
        self.excluded_paths.extend(paths.into_iter().map(Into::into));
        self
    }
}

/// [`ScanContext`] compiled once per reduction.
pub(crate) struct ContextMatcher {
    test_files: Vec<PathMatcher>,
    excluded: Vec<PathMatcher>,
}

enum PathMatcher {
    Exact(String),
    Prefix(String),
    Glob(FilePattern),
}

impl PathMatcher {
    fn for_file(entry: &str) -> Self {
        Self::glob_or(entry, || Self::Exact(normalize(entry)))
    }

    fn for_location(entry: &str) -> Self {
        Self::glob_or(entry, || {
            let normalized = normalize(entry);
            Self::Prefix(normalized.trim_end_matches('/').to_string())
        })
    }

    fn glob_or(entry: &str, fallback: impl FnOnce() -> Self) -> Self {
        if entry.contains(['*', '?', '{']) {
            if let Ok(pattern) = FilePattern::new(entry) {
                return Self::Glob(pattern);
            }
        }
        fallback()
    }

    fn matches(&self, path: &str) -> bool {
        match self {
            Self::Exact(exact) => normalize(path) == *exact,
            Self::Prefix(prefix) => {
                let path = normalize(path);
                path == *prefix
                    || path
                        .strip_prefix(prefix.as_str())
                        .is_some_and(|rest| rest.starts_with('/'))
            }
            Self::Glob(pattern) => pattern.is_match(path),
        }
    }
}

fn normalize(path: &str) -> String {
    let forward = path.replace('\\', "/");
    forward.strip_prefix("./").unwrap_or(&forward).to_string()
}

impl ContextMatcher {
    pub fn new(context: &ScanContext) -> Self {
        Self {
            test_files: context.test_files.iter().map(|e| PathMatcher::for_file(e)).collect(),
            excluded: context
                .excluded_paths
                .iter()
                .map(|e| PathMatcher::for_location(e))
                .collect(),
        }
    }

    fn is_test_file(&self, path: &str) -> bool {
        self.test_files.iter().any(|m| m.matches(path))
    }

    fn is_excluded(&self, path: &str) -> bool {
        self.excluded.iter().any(|m| m.matches(path))
    }
}

pub(crate) fn pattern_signal(issue: &Issue, config: &ReducerConfig, extra: &[Regex]) -> ConfidenceSignal {
    let haystacks = [Some(issue.message.as_str()), issue.snippet.as_deref()];
    for text in haystacks.into_iter().flatten() {
        if let Some((label, _)) = NOISE_PATTERNS.iter().find(|(_, re)| re.is_match(text)) {
            return ConfidenceSignal::flagged(
                SignalSource::Pattern,
                config.pattern_confidence,
                format!("noisy pattern: {label}"),
            );
        }
        if let Some(re) = extra.iter().find(|re| re.is_match(text)) {
            return ConfidenceSignal::flagged(
                SignalSource::Pattern,
                config.pattern_confidence,
                format!("noisy pattern: {}", re.as_str()),
            );
        }
    }
    ConfidenceSignal::clear(SignalSource::Pattern)
}

pub(crate) fn context_signal(issue: &Issue, context: &ContextMatcher, config: &ReducerConfig) -> ConfidenceSignal {
    if context.is_excluded(&issue.file) {
        return ConfidenceSignal::flagged(
            SignalSource::Context,
            config.excluded_path_confidence,
            "excluded path",
        );
    }
    if context.is_test_file(&issue.file) {
        return ConfidenceSignal::flagged(SignalSource::Context, config.test_file_confidence, "test file");
    }
    ConfidenceSignal::clear(SignalSource::Context)
}

pub(crate) fn history_signal(issue: &Issue, history: &FeedbackHistory, config: &ReducerConfig) -> ConfidenceSignal {
    let Some(counts) = history.counts(issue) else {
        return ConfidenceSignal::clear(SignalSource::History);
    };
    let rate = counts.rate();
    if rate > config.history_threshold && counts.total >= config.min_history_samples {
        ConfidenceSignal::flagged(
            SignalSource::History,
            rate.min(config.history_confidence_cap),
            format!(
                "historical false-positive rate {:.0}% over {} reports",
                rate * 100.0,
                counts.total
            ),
        )
    } else {
        ConfidenceSignal::doubt(SignalSource::History, rate.min(config.history_confidence_cap))
    }
}

pub(crate) fn code_pattern_signal(issue: &Issue, config: &ReducerConfig) -> ConfidenceSignal {
    let Some(snippet) = issue.snippet.as_deref() else {
        return ConfidenceSignal::clear(SignalSource::CodePattern);
    };
    match BENIGN_CODE_PATTERNS.iter().find(|(_, re)| re.is_match(snippet)) {
        Some((label, _)) => ConfidenceSignal::flagged(
            SignalSource::CodePattern,
            config.code_pattern_confidence,
            format!("benign code pattern: {label}"),
        ),
        None => ConfidenceSignal::clear(SignalSource::CodePattern),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::Severity;

    fn issue() -> Issue {
        Issue::new("xss", Severity::High, "unsanitized output")
            .in_file("src/view.js")
            .from_analyzer("security")
    }

    #[test]
    fn test_pattern_signal_env_access() {
        let config = ReducerConfig::default();
        let flagged = pattern_signal(&issue().with_snippet("const key = process.env.API_KEY"), &config, &[]);
        assert!(flagged.is_false_positive);
        assert_eq!(flagged.confidence, 0.9);
        assert!(!pattern_signal(&issue(), &config, &[]).is_false_positive);
    }

    #[test]
    fn test_pattern_signal_extra_patterns() {
        let extra = vec![Regex::new("generated by protoc").unwrap()];
        let signal = pattern_signal(
            &issue().with_snippet("// generated by protoc"),
            &ReducerConfig::default(),
            &extra,
        );
        assert!(signal.is_false_positive);
    }

    #[test]
    fn test_context_signal_matches_lists() {
        let config = ReducerConfig::default();
        let context = ContextMatcher::new(
            &ScanContext::default()
                .with_test_files(["src/view.js", "**/*.spec.js"])
                .with_excluded_paths(["vendor"]),
        );

        let test_file = context_signal(&issue(), &context, &config);
        assert_eq!(test_file.reason.as_deref(), Some("test file"));
        assert_eq!(test_file.confidence, 0.85);

        let spec = context_signal(&issue().in_file("a/b.spec.js"), &context, &config);
        assert!(spec.is_false_positive);

        let vendored = context_signal(&issue().in_file("vendor/lib.js"), &context, &config);
        assert_eq!(vendored.confidence, 0.95);

        let lookalike = context_signal(&issue().in_file("vendored/lib.js"), &context, &config);
        assert!(!lookalike.is_false_positive);
    }

    #[test]
    fn test_history_signal_threshold_and_cap() {
        let config = ReducerConfig::default();
        let mut history = FeedbackHistory::new();
        for _ in 0..10 {
            history.record_feedback(&issue(), true);
        }
        let flagged = history_signal(&issue(), &history, &config);
        assert!(flagged.is_false_positive);
        assert_eq!(flagged.confidence, 0.95);

        let mut mixed = FeedbackHistory::new();
        mixed.record_feedback(&issue(), true);
        mixed.record_feedback(&issue(), false);
        let doubt = history_signal(&issue(), &mixed, &config);
        assert!(!doubt.is_false_positive);
        assert_eq!(doubt.confidence, 0.5);
    }

    #[test]
    fn test_history_signal_respects_min_samples() {
        let config = ReducerConfig {
            min_history_samples: 3,
            ..Default::default()
        };
        let mut history = FeedbackHistory::new();
        history.record_feedback(&issue(), true);
        assert!(!history_signal(&issue(), &history, &config).is_false_positive);
    }

    #[test]
    fn test_code_pattern_signal() {
        let config = ReducerConfig::default();
        let safe = code_pattern_signal(&issue().with_snippet("el.textContent = name"), &config);
        assert_eq!(safe.reason.as_deref(), Some("benign code pattern: safe DOM API"));
        assert_eq!(safe.confidence, 0.7);

        let https = code_pattern_signal(&issue().with_snippet("fetch('https://api.example.com')"), &config);
        assert!(https.is_false_positive);

        let risky = code_pattern_signal(&issue().with_snippet("el.innerHTML = name"), &config);
        assert!(!risky.is_false_positive);
    }
}
