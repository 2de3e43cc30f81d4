use serde::{Deserialize, Serialize};
use std::path::PathBuf;

fn default_enabled() -> bool {
    true
}

fn default_max_entries() -> usize {
    1000
}

fn default_eviction_ratio() -> f64 {
    0.2
}

fn default_serialize_same_path() -> bool {
    true
}

/// Incremental cache configuration.
///
/// ```toml
/// [cache]
/// max_entries = 1000
/// persist = true
/// directory = "/var/cache/vigil"
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CacheConfig {
    /// Use the cache at all (default: true)
    #[serde(default = "default_enabled")]
    pub enabled: bool,

    /// Hard cap on cached files (default: 1000)
    #[serde(default = "default_max_entries")]
    pub max_entries: usize,

    /// Fraction of the cap evicted in one pass once it is exceeded (default: 0.2)
    #[serde(default = "default_eviction_ratio")]
    pub eviction_ratio: f64,

    /// Write entries to disk (default: false)
    #[serde(default)]
    pub persist: bool,

    /// Cache directory; resolved from the environment when unset
    #[serde(default)]
    pub directory: Option<PathBuf>,

    /// Serialize concurrent analysis of the same path (default: true)
    #[serde(default = "default_serialize_same_path")]
    pub serialize_same_path: bool,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: default_enabled(),
            max_entries: default_max_entries(),
            eviction_ratio: default_eviction_ratio(),
            persist: false,
            directory: None,
            serialize_same_path: default_serialize_same_path(),
        }
    }
}

impl CacheConfig {
    pub fn with_max_entries(max_entries: usize) -> Self {
        Self {
            max_entries,
            ..Default::default()
        }
    }

    /// Entry count kept after an eviction pass: `ceil((1 - ratio) * max)`.
    pub fn retained_after_eviction(&self) -> usize {
        let keep = (1.0 - self.eviction_ratio.clamp(0.0, 1.0)) * self.max_entries as f64;
        // Round first so 0.8 * 10 is 8, not 9 from float noise.
        let rounded = (keep * 1e9).round() / 1e9;
        rounded.ceil() as usize
    }

    pub(crate) fn problems(&self) -> Vec<String> {
        let mut problems = Vec::new();
        if self.max_entries == 0 {
            problems.push("cache.max_entries must be at least 1".to_string());
        }
        if !(self.eviction_ratio > 0.0 && self.eviction_ratio <= 1.0) {
            problems.push(format!(
                "cache.eviction_ratio must be within (0, 1], got {}",
                self.eviction_ratio
            ));
        }
        problems
    }
}
