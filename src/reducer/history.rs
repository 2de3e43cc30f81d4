//! Learned false-positive rates from user feedback.
//!
//! Counters are keyed by `analyzer:type:file`. The store is owned by the
//! caller and passed to the reducer explicitly; persisting it across runs is
//! done through [`FeedbackHistory::export`] / [`FeedbackHistory::import`]
//! or the file helpers.

use crate::core::Issue;
use crate::errors::Result;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeedbackCounts {
    pub total: u32,
    pub false_positives: u32,
}

impl FeedbackCounts {
    pub fn rate(&self) -> f64 {
        if self.total == 0 {
            0.0
        } else {
            self.false_positives as f64 / self.total as f64
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FeedbackHistory {
    #[serde(default)]
    entries: BTreeMap<String, FeedbackCounts>,
}

impl FeedbackHistory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a user verdict on `issue`
    pub fn record_feedback(&mut self, issue: &Issue, is_false_positive: bool) {
        let counts = self.entries.entry(issue.history_key()).or_default();
        counts.total = counts.total.saturating_add(1);
        if is_false_positive {
            counts.false_positives = counts.false_positives.saturating_add(1);
        }
    }

    pub fn counts(&self, issue: &Issue) -> Option<FeedbackCounts> {
        self.entries.get(&issue.history_key()).copied()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Snapshot of all counters, keyed by `analyzer:type:file`
    pub fn export(&self) -> BTreeMap<String, FeedbackCounts> {
        self.entries.clone()
    }

    /// Merge counters into this history, adding to existing keys
    pub fn import(&mut self, counters: BTreeMap<String, FeedbackCounts>) {
        for (key, incoming) in counters {
            let counts = self.entries.entry(key).or_default();
            counts.total = counts.total.saturating_add(incoming.total);
            counts.false_positives = counts.false_positives.saturating_add(incoming.false_positives);
        }
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, self.to_json()?)?;
        Ok(())
    }

    /// Load a saved history; a missing file yields an empty history
    pub fn load(path: &Path) -> Result<Self> {
        match fs::read_to_string(path) {
            Ok(json) => Self::from_json(&json),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Self::new()),
            Err(e) => Err(e.into()),
        }
    }
}
