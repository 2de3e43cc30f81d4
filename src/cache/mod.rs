//! Incremental, content-addressed analysis cache.
//!
//! One entry per file path, valid while the file's sha256 matches. Entries
//! live in memory and, when persistence is enabled, are written through to
//! a [`DiskStore`]. Disk problems never fail an analysis: they are logged
//! and the lookup is treated as a miss.

mod diff;
mod entry;
mod location;
mod store;

pub use diff::{diff_issues, IssueDiff};
pub use entry::{content_hash, CacheEntry};
pub use location::{resolve_cache_dir, CacheDirSource, CACHE_DIR_ENV_VAR};
pub use store::DiskStore;

use crate::config::CacheConfig;
use crate::core::Issue;
use dashmap::DashMap;
use parking_lot::{Mutex, RwLock};
use regex::Regex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Result of a cache lookup
#[derive(Debug, Clone, PartialEq)]
pub enum CacheLookup {
    Hit {
        issues: Vec<Issue>,
    },
    Miss {
        /// An entry exists but was computed for different content
        is_stale: bool,
        /// Issues of the stale entry, empty when there was none
        previous_issues: Vec<Issue>,
    },
}

impl CacheLookup {
    pub fn is_hit(&self) -> bool {
        matches!(self, Self::Hit { .. })
    }
}

/// Output of [`IncrementalCache::analyze_with_cache`]
#[derive(Debug, Clone, PartialEq)]
pub struct CachedAnalysis {
    pub issues: Vec<Issue>,
    pub is_cached: bool,
    /// Present when the analyzer actually ran
    pub diff: Option<IssueDiff>,
}

/// Cache statistics
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CacheStats {
    pub entries: usize,
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
    pub hit_rate: f64,
}

impl std::fmt::Display for CacheStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Cache Stats: {} entries, {} hits, {} misses, {} evictions, {:.1}% hit rate",
            self.entries,
            self.hits,
            self.misses,
            self.evictions,
            self.hit_rate * 100.0
        )
    }
}

#[derive(Debug)]
struct Stored {
    entry: CacheEntry,
    /// Insertion order, breaks ties between equal timestamps
    seq: u64,
}

#[derive(Debug)]
pub struct IncrementalCache {
    config: CacheConfig,
    entries: RwLock<HashMap<String, Stored>>,
    store: Option<DiskStore>,
    path_locks: DashMap<String, Arc<Mutex<()>>>,
    next_seq: AtomicU64,
    hits: AtomicU64,
    misses: AtomicU64,
    evictions: AtomicU64,
}

impl IncrementalCache {
    /// Memory-only cache, regardless of `config.persist`
    pub fn in_memory(config: CacheConfig) -> Self {
        Self {
            config,
            entries: RwLock::new(HashMap::new()),
            store: None,
            path_locks: DashMap::new(),
            next_seq: AtomicU64::new(0),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            evictions: AtomicU64::new(0),
        }
    }

    /// Open a cache per `config`, loading persisted entries when enabled.
    ///
    /// An unusable cache directory downgrades to a memory-only cache.
    pub fn open(config: CacheConfig) -> Self {
        if !config.persist {
            return Self::in_memory(config);
        }

        let (dir, source) = resolve_cache_dir(config.directory.as_deref());
        match DiskStore::open(&dir) {
            Ok(store) => {
                tracing::debug!(dir = %dir.display(), ?source, "Using persistent cache");
                Self::with_store(config, store)
            }
            Err(e) => {
                tracing::warn!(error = %e, "Cache directory unavailable, caching in memory only");
                Self::in_memory(config)
            }
        }
    }

    /// Cache backed by an explicit store
    pub fn with_store(config: CacheConfig, store: DiskStore) -> Self {
        let mut loaded = store.load_all();
        loaded.sort_by(|a, b| a.written_at.cmp(&b.written_at));

        let cache = Self {
            store: Some(store),
            ..Self::in_memory(config)
        };
        {
            let mut entries = cache.entries.write();
            for entry in loaded {
                let seq = cache.next_seq.fetch_add(1, Ordering::Relaxed);
                entries.insert(entry.file_path.clone(), Stored { entry, seq });
            }
        }
        cache.evict_if_needed();
        tracing::debug!(entries = cache.len(), "Loaded cache entries");
        cache
    }

    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    pub fn is_persistent(&self) -> bool {
        self.store.is_some()
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    /// Current entry for `path`, valid or not
    pub fn entry(&self, path: &str) -> Option<CacheEntry> {
        self.entries.read().get(path).map(|s| s.entry.clone())
    }

    /// Look up `path` and check it against `content`.
    pub fn get_cached_result(&self, path: &str, content: &str) -> CacheLookup {
        self.lookup(path, content, None)
    }

    /// Like [`get_cached_result`](Self::get_cached_result), but an entry
    /// without results for every analyzer in `analyzers` is a stale miss.
    ///
    /// Hit issues are limited to those analyzers.
    pub fn get_covering_result(&self, path: &str, content: &str, analyzers: &[String]) -> CacheLookup {
        self.lookup(path, content, Some(analyzers))
    }

    fn lookup(&self, path: &str, content: &str, analyzers: Option<&[String]>) -> CacheLookup {
        let lookup = match self.entries.read().get(path) {
            Some(stored) if stored.entry.matches(content) => match analyzers {
                None => CacheLookup::Hit {
                    issues: stored.entry.issues.clone(),
                },
                Some(ids) if stored.entry.covers(ids) => CacheLookup::Hit {
                    issues: stored
                        .entry
                        .issues
                        .iter()
                        .filter(|i| ids.contains(&i.analyzer))
                        .cloned()
                        .collect(),
                },
                Some(_) => CacheLookup::Miss {
                    is_stale: true,
                    previous_issues: stored.entry.issues.clone(),
                },
            },
            Some(stored) => CacheLookup::Miss {
                is_stale: true,
                previous_issues: stored.entry.issues.clone(),
            },
            None => CacheLookup::Miss {
                is_stale: false,
                previous_issues: Vec::new(),
            },
        };

        if lookup.is_hit() {
            self.hits.fetch_add(1, Ordering::Relaxed);
        } else {
            self.misses.fetch_add(1, Ordering::Relaxed);
        }
        lookup
    }

    /// Record results for `path` computed from `content`.
    pub fn save_entry(
        &self,
        path: &str,
        content: &str,
        issues: Vec<Issue>,
        analyzers: impl IntoIterator<Item = String>,
    ) {
        let entry = CacheEntry::new(path, content, issues, analyzers);
        if let Some(store) = &self.store {
            if let Err(e) = store.write(&entry) {
                tracing::warn!(path, error = %e, "Failed to persist cache entry");
            }
        }

        let seq = self.next_seq.fetch_add(1, Ordering::Relaxed);
        self.entries
            .write()
            .insert(path.to_string(), Stored { entry, seq });
        self.evict_if_needed();
    }

    /// Return cached issues for unchanged content, otherwise run `analyze`,
    /// store its issues and diff them against the previous entry.
    ///
    /// Analyzer errors are returned as-is and leave the cache untouched.
    pub fn analyze_with_cache<F, E>(
        &self,
        path: &str,
        content: &str,
        analyzers: &[String],
        force: bool,
        analyze: F,
    ) -> Result<CachedAnalysis, E>
    where
        F: FnOnce() -> Result<Vec<Issue>, E>,
    {
        let lock = self
            .config
            .serialize_same_path
            .then(|| self.path_lock(path));
        let _guard = lock.as_deref().map(|l| l.lock());

        let previous = match self.get_cached_result(path, content) {
            CacheLookup::Hit { issues } if !force => {
                return Ok(CachedAnalysis {
                    issues,
                    is_cached: true,
                    diff: None,
                })
            }
            CacheLookup::Hit { issues } => issues,
            CacheLookup::Miss {
                previous_issues, ..
            } => previous_issues,
        };

        let issues = analyze()?;
        let diff = diff_issues(&previous, &issues);
        self.save_entry(path, content, issues.clone(), analyzers.iter().cloned());

        Ok(CachedAnalysis {
            issues,
            is_cached: false,
            diff: Some(diff),
        })
    }

    fn path_lock(&self, path: &str) -> Arc<Mutex<()>> {
        self.path_locks
            .entry(path.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    /// Forget the lock for `path` unless a caller still holds it.
    ///
    /// Cloning happens under the map's shard lock, so a count of one means
    /// no `analyze_with_cache` call can be using or acquiring it.
    fn release_path_lock(&self, path: &str) {
        self.path_locks
            .remove_if(path, |_, lock| Arc::strong_count(lock) == 1);
    }

    /// Drop the entry for `path`. Returns whether one existed.
    pub fn invalidate(&self, path: &str) -> bool {
        let removed = self.entries.write().remove(path).is_some();
        if removed {
            self.remove_from_store(path);
        }
        removed
    }

    /// Drop every entry whose path matches `pattern`; returns how many.
    pub fn invalidate_pattern(&self, pattern: &Regex) -> usize {
        let removed: Vec<String> = {
            let mut entries = self.entries.write();
            let matching: Vec<String> = entries
                .keys()
                .filter(|path| pattern.is_match(path))
                .cloned()
                .collect();
            for path in &matching {
                entries.remove(path);
            }
            matching
        };
        for path in &removed {
            self.remove_from_store(path);
        }
        removed.len()
    }

    pub fn clear(&self) {
        self.entries.write().clear();
        self.path_locks.retain(|_, lock| Arc::strong_count(lock) > 1);
        self.hits.store(0, Ordering::Relaxed);
        self.misses.store(0, Ordering::Relaxed);
        if let Some(store) = &self.store {
            if let Err(e) = store.clear() {
                tracing::warn!(error = %e, "Failed to clear persistent cache");
            }
        }
    }

    /// Drop entries written more than `max_age` ago; returns how many.
    pub fn prune_older_than(&self, max_age: Duration) -> usize {
        let max_age = chrono::Duration::from_std(max_age).unwrap_or(chrono::Duration::MAX);
        let cutoff = chrono::Utc::now()
            .checked_sub_signed(max_age)
            .unwrap_or(chrono::DateTime::<chrono::Utc>::MIN_UTC);

        let expired: Vec<String> = self
            .entries
            .read()
            .iter()
            .filter(|(_, stored)| stored.entry.written_at < cutoff)
            .map(|(path, _)| path.clone())
            .collect();
        expired.iter().filter(|path| self.invalidate(path)).count()
    }

    pub fn stats(&self) -> CacheStats {
        let hits = self.hits.load(Ordering::Relaxed);
        let misses = self.misses.load(Ordering::Relaxed);
        CacheStats {
            entries: self.len(),
            hits,
            misses,
            evictions: self.evictions.load(Ordering::Relaxed),
            hit_rate: if hits + misses > 0 {
                hits as f64 / (hits + misses) as f64
            } else {
                0.0
            },
        }
    }

    /// Once over capacity, evict oldest entries down to the retention mark.
    fn evict_if_needed(&self) {
        let evicted: Vec<String> = {
            let mut entries = self.entries.write();
            if entries.len() <= self.config.max_entries {
                return;
            }
            let keep = self.config.retained_after_eviction();
            let mut by_age: Vec<(chrono::DateTime<chrono::Utc>, u64, String)> = entries
                .iter()
                .map(|(path, s)| (s.entry.written_at, s.seq, path.clone()))
                .collect();
            by_age.sort();

            let excess = entries.len().saturating_sub(keep);
            let evicted: Vec<String> = by_age.into_iter().take(excess).map(|(_, _, p)| p).collect();
            for path in &evicted {
                entries.remove(path);
            }
            evicted
        };

        self.evictions
            .fetch_add(evicted.len() as u64, Ordering::Relaxed);
        tracing::debug!(evicted = evicted.len(), "Evicted cache entries");
        for path in &evicted {
            self.release_path_lock(path);
            self.remove_from_store(path);
        }
    }

    fn remove_from_store(&self, path: &str) {
        if let Some(store) = &self.store {
            if let Err(e) = store.remove(path) {
                tracing::warn!(path, error = %e, "Failed to remove persisted cache entry");
            }
        }
    }
}
