//! Analyzer registry: descriptors, file matching and batch planning.
//!
//! The registry owns every registered analyzer together with its
//! descriptor, compiled file patterns and configured options. Mutations
//! (`enable`, `disable`, `configure`) only change registry state; tasks
//! already handed to the scheduler keep the snapshot they were built from.

mod analyzer;
mod batch;
mod descriptor;
pub mod pattern;

pub use analyzer::{AnalysisContext, AnalysisOutput, Analyzer, FileAnalyzer, PerFile};
pub use batch::{plan_batches, AnalyzerBatch, AnalyzerRun};
pub use descriptor::{AnalyzerDescriptor, Isolation};
pub use pattern::{FilePattern, PatternSet};

use crate::core::{AnalyzerOptions, Category, SourceFile};
use crate::errors::{Error, Result};
use crate::events::EventBus;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

struct RegisteredAnalyzer {
    descriptor: AnalyzerDescriptor,
    patterns: PatternSet,
    analyzer: Arc<dyn Analyzer>,
    options: AnalyzerOptions,
    seq: u64,
}

/// Snapshot of a registered analyzer, detached from the registry lock
#[derive(Clone)]
pub struct ResolvedAnalyzer {
    pub descriptor: AnalyzerDescriptor,
    pub analyzer: Arc<dyn Analyzer>,
    pub options: AnalyzerOptions,
}

impl ResolvedAnalyzer {
    /// Build the analyzer context: registry options overlaid by `overrides`.
    pub fn context(&self, overrides: &AnalyzerOptions) -> AnalysisContext {
        let mut options = self.options.clone();
        options.extend(overrides.iter().map(|(k, v)| (k.clone(), v.clone())));
        AnalysisContext::new(self.descriptor.id.clone(), options)
    }
}

impl std::fmt::Debug for ResolvedAnalyzer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResolvedAnalyzer")
            .field("descriptor", &self.descriptor)
            .field("options", &self.options)
            .finish()
    }
}

#[derive(Default)]
pub struct AnalyzerRegistry {
    entries: RwLock<HashMap<String, RegisteredAnalyzer>>,
    next_seq: AtomicU64,
    events: EventBus,
}

impl AnalyzerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a registry that reports analyzer lifecycle events on `events`
    pub fn with_events(events: EventBus) -> Self {
        Self {
            events,
            ..Default::default()
        }
    }

    pub fn events(&self) -> &EventBus {
        &self.events
    }

    /// Register an analyzer and return its id.
    ///
    /// Re-registering an existing id replaces the previous analyzer and logs
    /// a warning. Invalid file patterns are rejected.
    pub fn register(
        &self,
        descriptor: AnalyzerDescriptor,
        analyzer: Arc<dyn Analyzer>,
        options: AnalyzerOptions,
    ) -> Result<String> {
        if descriptor.id.trim().is_empty() {
            return Err(Error::config("analyzer id must not be empty"));
        }
        let patterns = PatternSet::new(&descriptor.file_patterns)?;
        let id = descriptor.id.clone();
        let seq = self.next_seq.fetch_add(1, Ordering::Relaxed);

        let previous = self.entries.write().insert(
            id.clone(),
            RegisteredAnalyzer {
                descriptor,
                patterns,
                analyzer,
                options,
                seq,
            },
        );

        if previous.is_some() {
            tracing::warn!(analyzer = %id, "Analyzer already registered, overwriting");
        } else {
            tracing::debug!(analyzer = %id, "Registered analyzer");
        }
        Ok(id)
    }

    /// Remove an analyzer. Returns whether it was registered.
    pub fn unregister(&self, id: &str) -> bool {
        self.entries.write().remove(id).is_some()
    }

    pub fn enable(&self, id: &str) -> Result<()> {
        self.set_enabled(id, true)
    }

    pub fn disable(&self, id: &str) -> Result<()> {
        self.set_enabled(id, false)
    }

    fn set_enabled(&self, id: &str, enabled: bool) -> Result<()> {
        let mut entries = self.entries.write();
        let entry = entries
            .get_mut(id)
            .ok_or_else(|| Error::UnknownAnalyzer(id.to_string()))?;
        entry.descriptor.enabled = enabled;
        tracing::debug!(analyzer = %id, enabled, "Analyzer toggled");
        Ok(())
    }

    /// Merge `options` into the analyzer's configured options.
    pub fn configure(&self, id: &str, options: AnalyzerOptions) -> Result<()> {
        let mut entries = self.entries.write();
        let entry = entries
            .get_mut(id)
            .ok_or_else(|| Error::UnknownAnalyzer(id.to_string()))?;
        entry.options.extend(options);
        Ok(())
    }

    pub fn contains(&self, id: &str) -> bool {
        self.entries.read().contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    pub fn descriptor(&self, id: &str) -> Option<AnalyzerDescriptor> {
        self.entries.read().get(id).map(|e| e.descriptor.clone())
    }

    pub fn resolve(&self, id: &str) -> Option<ResolvedAnalyzer> {
        self.entries.read().get(id).map(|e| ResolvedAnalyzer {
            descriptor: e.descriptor.clone(),
            analyzer: Arc::clone(&e.analyzer),
            options: e.options.clone(),
        })
    }

    /// All descriptors in execution order (priority, then registration order)
    pub fn list(&self) -> Vec<AnalyzerDescriptor> {
        self.ordered(|_| true)
    }

    pub fn enabled_analyzers(&self) -> Vec<AnalyzerDescriptor> {
        self.ordered(|e| e.descriptor.enabled)
    }

    pub fn analyzers_by_category(&self, category: Category) -> Vec<AnalyzerDescriptor> {
        self.ordered(|e| e.descriptor.enabled && e.descriptor.categories.contains(&category))
    }

    /// Enabled analyzers whose file patterns match `path`, lowest priority first.
    pub fn analyzers_for_file(&self, path: &str) -> Vec<AnalyzerDescriptor> {
        self.ordered(|e| e.descriptor.enabled && e.patterns.is_match(path))
    }

    /// Whether `id` is enabled and applies to `path`.
    pub fn applies_to(&self, id: &str, path: &str) -> bool {
        self.entries
            .read()
            .get(id)
            .map(|e| e.descriptor.enabled && e.patterns.is_match(path))
            .unwrap_or(false)
    }

    fn ordered(&self, keep: impl Fn(&RegisteredAnalyzer) -> bool) -> Vec<AnalyzerDescriptor> {
        let entries = self.entries.read();
        let mut selected: Vec<&RegisteredAnalyzer> = entries.values().filter(|e| keep(e)).collect();
        selected.sort_by_key(|e| (e.descriptor.priority, e.seq));
        selected.into_iter().map(|e| e.descriptor.clone()).collect()
    }

    /// Order the requested analyzers and group them into batches.
    ///
    /// Unknown and disabled ids are skipped. Passing `None` plans every
    /// enabled analyzer.
    pub fn plan(&self, ids: Option<&[String]>) -> Vec<AnalyzerBatch> {
        let selected: Vec<AnalyzerDescriptor> = match ids {
            None => self.enabled_analyzers(),
            Some(ids) => {
                for id in ids.iter().filter(|id| !self.contains(id)) {
                    tracing::warn!(analyzer = %id, "Requested analyzer is not registered");
                }
                self.enabled_analyzers()
                    .into_iter()
                    .filter(|d| ids.contains(&d.id))
                    .collect()
            }
        };
        plan_batches(&selected)
    }

    /// Run analyzers in-process over `files`, batch by batch.
    ///
    /// Each analyzer only sees the files its patterns match. One analyzer
    /// failing or panicking yields a failed [`AnalyzerRun`] and never aborts
    /// the batch.
    pub fn execute_analyzers(
        &self,
        ids: &[String],
        files: &[SourceFile],
        options: &AnalyzerOptions,
    ) -> Vec<AnalyzerRun> {
        let batches = self.plan(Some(ids));
        crate::scheduler::in_process::run_batches(self, &batches, files, options)
    }
}

impl std::fmt::Debug for AnalyzerRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AnalyzerRegistry")
            .field("analyzers", &self.list().iter().map(|d| &d.id).collect::<Vec<_>>())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{Issue, Severity};

    struct Fixed(&'static str);

    impl Analyzer for Fixed {
        fn analyze(&self, files: &[SourceFile], _ctx: &AnalysisContext) -> anyhow::Result<AnalysisOutput> {
            Ok(files
                .iter()
                .map(|f| Issue::new(self.0, Severity::Low, "found").in_file(f.path.clone()))
                .collect::<Vec<_>>()
                .into())
        }
    }

    fn register(registry: &AnalyzerRegistry, descriptor: AnalyzerDescriptor) {
        registry
            .register(descriptor, Arc::new(Fixed("x")), AnalyzerOptions::new())
            .unwrap();
    }

    #[test]
    fn test_analyzers_for_file_sorted_by_priority() {
        let registry = AnalyzerRegistry::new();
        register(&registry, AnalyzerDescriptor::new("late").pattern("**/*.js").priority(10));
        register(&registry, AnalyzerDescriptor::new("early").pattern("**/*.js").priority(1));
        register(&registry, AnalyzerDescriptor::new("python").pattern("**/*.py"));

        let ids: Vec<_> = registry
            .analyzers_for_file("src/app.js")
            .into_iter()
            .map(|d| d.id)
            .collect();
        assert_eq!(ids, vec!["early", "late"]);
    }

    #[test]
    fn test_disabled_analyzers_do_not_match() {
        let registry = AnalyzerRegistry::new();
        register(&registry, AnalyzerDescriptor::new("a").pattern("**/*.js"));
        registry.disable("a").unwrap();
        assert!(registry.analyzers_for_file("x.js").is_empty());

        registry.enable("a").unwrap();
        assert_eq!(registry.analyzers_for_file("x.js").len(), 1);
    }

    #[test]
    fn test_unknown_id_errors() {
        let registry = AnalyzerRegistry::new();
        assert!(matches!(registry.enable("nope"), Err(Error::UnknownAnalyzer(_))));
        assert!(matches!(
            registry.configure("nope", AnalyzerOptions::new()),
            Err(Error::UnknownAnalyzer(_))
        ));
    }

    #[test]
    fn test_duplicate_registration_overwrites() {
        let registry = AnalyzerRegistry::new();
        register(&registry, AnalyzerDescriptor::new("a").named("First"));
        register(&registry, AnalyzerDescriptor::new("a").named("Second"));

        assert_eq!(registry.len(), 1);
        assert_eq!(registry.descriptor("a").unwrap().name, "Second");
    }

    #[test]
    fn test_invalid_pattern_rejected() {
        let registry = AnalyzerRegistry::new();
        let result = registry.register(
            AnalyzerDescriptor::new("bad").pattern("*.{js"),
            Arc::new(Fixed("x")),
            AnalyzerOptions::new(),
        );
        assert!(matches!(result, Err(Error::InvalidPattern { .. })));
        assert!(registry.is_empty());
    }

    #[test]
    fn test_configure_merges_options() {
        let registry = AnalyzerRegistry::new();
        let mut initial = AnalyzerOptions::new();
        initial.insert("level".into(), serde_json::json!("strict"));
        initial.insert("max".into(), serde_json::json!(3));
        registry
            .register(AnalyzerDescriptor::new("a"), Arc::new(Fixed("x")), initial)
            .unwrap();

        let mut update = AnalyzerOptions::new();
        update.insert("max".into(), serde_json::json!(9));
        registry.configure("a", update).unwrap();

        let resolved = registry.resolve("a").unwrap();
        assert_eq!(resolved.options["level"], "strict");
        assert_eq!(resolved.options["max"], 9);
    }

    #[test]
    fn test_context_overrides_registry_options() {
        let registry = AnalyzerRegistry::new();
        let mut initial = AnalyzerOptions::new();
        initial.insert("mode".into(), serde_json::json!("fast"));
        registry
            .register(AnalyzerDescriptor::new("a"), Arc::new(Fixed("x")), initial)
            .unwrap();

        let mut overrides = AnalyzerOptions::new();
        overrides.insert("mode".into(), serde_json::json!("deep"));
        let ctx = registry.resolve("a").unwrap().context(&overrides);
        assert_eq!(ctx.option_str("mode"), Some("deep"));
        assert_eq!(ctx.analyzer_id, "a");
    }

    #[test]
    fn test_plan_skips_unknown_and_disabled() {
        let registry = AnalyzerRegistry::new();
        register(&registry, AnalyzerDescriptor::new("a").priority(2));
        register(&registry, AnalyzerDescriptor::new("b").priority(1).blocking(true));
        register(&registry, AnalyzerDescriptor::new("c").enabled(false));

        let plan = registry.plan(Some(&["a".into(), "b".into(), "c".into(), "ghost".into()]));
        assert_eq!(
            plan,
            vec![
                AnalyzerBatch {
                    analyzer_ids: vec!["b".into()],
                    blocking: true
                },
                AnalyzerBatch {
                    analyzer_ids: vec!["a".into()],
                    blocking: false
                },
            ]
        );
    }

    #[test]
    fn test_analyzers_by_category() {
        let registry = AnalyzerRegistry::new();
        register(&registry, AnalyzerDescriptor::new("sec").category(Category::Security));
        register(&registry, AnalyzerDescriptor::new("perf").category(Category::Performance));

        let found = registry.analyzers_by_category(Category::Security);
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].id, "sec");
    }
}
