use crate::core::Category;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Where an analyzer's tasks execute.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Isolation {
    /// On a supervised pool worker, with soft timeouts and crash recovery
    #[default]
    Pooled,
    /// Directly on the caller's rayon pool. For trusted, fast analyzers.
    InProcess,
}

/// Static description of an analyzer.
///
/// Identity (`id`) is fixed at registration; everything else can be changed
/// through the registry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalyzerDescriptor {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub categories: BTreeSet<Category>,
    #[serde(default)]
    pub file_patterns: Vec<String>,
    /// Lower runs first
    #[serde(default)]
    pub priority: i32,
    /// Must not run concurrently with other analyzers
    #[serde(default)]
    pub blocking: bool,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    #[serde(default)]
    pub isolation: Isolation,
}

fn default_enabled() -> bool {
    true
}

impl AnalyzerDescriptor {
    pub fn new(id: impl Into<String>) -> Self {
        let id = id.into();
        Self {
            name: id.clone(),
            id,
            categories: BTreeSet::new(),
            file_patterns: Vec::new(),
            priority: 0,
            blocking: false,
            enabled: true,
            isolation: Isolation::default(),
        }
    }

    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn category(mut self, category: Category) -> Self {
        self.categories.insert(category);
        self
    }

    pub fn pattern(mut self, pattern: impl Into<String>) -> Self {
        self.file_patterns.push(pattern.into());
        self
    }

    pub fn priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    pub fn blocking(mut self, blocking: bool) -> Self {
        self.blocking = blocking;
        self
    }

    pub fn enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    pub fn isolation(mut self, isolation: Isolation) -> Self {
        self.isolation = isolation;
        self
    }

    pub fn in_process(self) -> Self {
        self.isolation(Isolation::InProcess)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_defaults() {
        let descriptor = AnalyzerDescriptor::new("eslint");
        assert_eq!(descriptor.name, "eslint");
        assert!(descriptor.enabled);
        assert!(!descriptor.blocking);
        assert_eq!(descriptor.isolation, Isolation::Pooled);
    }

    #[test]
    fn test_deserialize_with_defaults() {
        let descriptor: AnalyzerDescriptor = serde_json::from_str(
            r#"{"id": "semgrep", "name": "Semgrep", "categories": ["security"], "isolation": "in_process"}"#,
        )
        .unwrap();
        assert!(descriptor.enabled);
        assert!(descriptor.categories.contains(&Category::Security));
        assert_eq!(descriptor.isolation, Isolation::InProcess);
    }
}
