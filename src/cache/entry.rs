use crate::core::Issue;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeSet;

/// Cached analysis result for one file.
///
/// The entry is valid for exactly the content whose hash it records.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheEntry {
    pub file_path: String,
    /// Hex sha256 of the analyzed content
    pub content_hash: String,
    pub written_at: DateTime<Utc>,
    pub issues: Vec<Issue>,
    /// Analyzers whose findings are included in `issues`
    #[serde(default)]
    pub analyzers: BTreeSet<String>,
}

impl CacheEntry {
    pub fn new(
        file_path: impl Into<String>,
        content: &str,
        issues: Vec<Issue>,
        analyzers: impl IntoIterator<Item = String>,
    ) -> Self {
        Self {
            file_path: file_path.into(),
            content_hash: content_hash(content),
            written_at: Utc::now(),
            issues,
            analyzers: analyzers.into_iter().collect(),
        }
    }

    pub fn matches(&self, content: &str) -> bool {
        self.content_hash == content_hash(content)
    }

    /// Whether the entry holds results for every analyzer in `required`
    pub fn covers<'a>(&self, required: impl IntoIterator<Item = &'a String>) -> bool {
        required.into_iter().all(|id| self.analyzers.contains(id))
    }
}

/// Calculate the SHA-256 hash of content as lowercase hex
pub fn content_hash(content: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(content.as_bytes());
    format!("{:x}", hasher.finalize())
}
