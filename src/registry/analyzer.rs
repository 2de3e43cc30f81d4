//! The analyzer capability and its adapters.
//!
//! Every analyzer implements [`Analyzer`], which receives a batch of files.
//! Analyzers that naturally work one file at a time implement
//! [`FileAnalyzer`] instead and are wrapped in [`PerFile`].

use crate::core::{AnalyzerOptions, AnalyzerStats, Issue, SourceFile};
use anyhow::Result;

/// Per-invocation context handed to an analyzer
#[derive(Debug, Clone, Default)]
pub struct AnalysisContext {
    pub analyzer_id: String,
    /// Registry options overlaid with scan-level options
    pub options: AnalyzerOptions,
}

impl AnalysisContext {
    pub fn new(analyzer_id: impl Into<String>, options: AnalyzerOptions) -> Self {
        Self {
            analyzer_id: analyzer_id.into(),
            options,
        }
    }

    pub fn option_str(&self, key: &str) -> Option<&str> {
        self.options.get(key).and_then(|v| v.as_str())
    }

    pub fn option_bool(&self, key: &str) -> Option<bool> {
        self.options.get(key).and_then(|v| v.as_bool())
    }

    pub fn option_u64(&self, key: &str) -> Option<u64> {
        self.options.get(key).and_then(|v| v.as_u64())
    }
}

/// What an analyzer reports for one invocation
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AnalysisOutput {
    pub issues: Vec<Issue>,
    pub stats: AnalyzerStats,
}

impl AnalysisOutput {
    pub fn with_stat(mut self, key: impl Into<String>, value: u64) -> Self {
        self.stats.insert(key.into(), value);
        self
    }

    fn absorb(&mut self, other: AnalysisOutput) {
        self.issues.extend(other.issues);
        for (key, value) in other.stats {
            *self.stats.entry(key).or_insert(0) += value;
        }
    }
}

impl From<Vec<Issue>> for AnalysisOutput {
    fn from(issues: Vec<Issue>) -> Self {
        Self {
            issues,
            stats: AnalyzerStats::new(),
        }
    }
}

pub trait Analyzer: Send + Sync {
    fn analyze(&self, files: &[SourceFile], ctx: &AnalysisContext) -> Result<AnalysisOutput>;
}

pub trait FileAnalyzer: Send + Sync {
    fn analyze_file(&self, path: &str, content: &str, ctx: &AnalysisContext)
        -> Result<AnalysisOutput>;
}

/// Adapts a single-file analyzer to [`Analyzer`].
///
/// Files are analyzed in order; the first failing file fails the call.
/// Issues without a file are attributed to the file being analyzed.
pub struct PerFile<A>(pub A);

impl<A: FileAnalyzer> Analyzer for PerFile<A> {
    fn analyze(&self, files: &[SourceFile], ctx: &AnalysisContext) -> Result<AnalysisOutput> {
        let mut combined = AnalysisOutput::default();
        for file in files {
            let mut output = self.0.analyze_file(&file.path, &file.content, ctx)?;
            for issue in output.issues.iter_mut().filter(|i| i.file.is_empty()) {
                issue.file = file.path.clone();
            }
            combined.absorb(output);
        }
        Ok(combined)
    }
}

impl<T: Analyzer + ?Sized> Analyzer for std::sync::Arc<T> {
    fn analyze(&self, files: &[SourceFile], ctx: &AnalysisContext) -> Result<AnalysisOutput> {
        (**self).analyze(files, ctx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::Severity;

    struct TodoFinder;

    impl FileAnalyzer for TodoFinder {
        fn analyze_file(
            &self,
            _path: &str,
            content: &str,
            _ctx: &AnalysisContext,
        ) -> Result<AnalysisOutput> {
            let issues = content
                .lines()
                .enumerate()
                .filter(|(_, line)| line.contains("TODO"))
                .map(|(i, _)| Issue::new("todo", Severity::Info, "unresolved TODO").at(i + 1, 1))
                .collect::<Vec<_>>();
            Ok(AnalysisOutput::from(issues).with_stat("lines", content.lines().count() as u64))
        }
    }

    #[test]
    fn test_per_file_adapter_attributes_files() {
        let analyzer = PerFile(TodoFinder);
        let files = vec![
            SourceFile::new("a.rs", "// TODO one\nfn a() {}"),
            SourceFile::new("b.rs", "fn b() {}\n// TODO two\n// TODO three"),
        ];

        let output = analyzer
            .analyze(&files, &AnalysisContext::new("todo", AnalyzerOptions::new()))
            .unwrap();

        assert_eq!(output.issues.len(), 3);
        assert_eq!(output.issues[0].file, "a.rs");
        assert_eq!(output.issues[2].file, "b.rs");
        assert_eq!(output.issues[2].line, 3);
        assert_eq!(output.stats["lines"], 5);
    }

    #[test]
    fn test_context_option_accessors() {
        let mut options = AnalyzerOptions::new();
        options.insert("strict".into(), serde_json::json!(true));
        options.insert("max".into(), serde_json::json!(12));
        options.insert("profile".into(), serde_json::json!("ci"));
        let ctx = AnalysisContext::new("x", options);

        assert_eq!(ctx.option_bool("strict"), Some(true));
        assert_eq!(ctx.option_u64("max"), Some(12));
        assert_eq!(ctx.option_str("profile"), Some("ci"));
        assert_eq!(ctx.option_str("missing"), None);
    }
}
