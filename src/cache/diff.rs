use crate::core::Issue;
use std::collections::HashSet;

/// What changed between two analyses of the same file
#[derive(Debug, Clone, Default, PartialEq)]
pub struct IssueDiff {
    pub added: Vec<Issue>,
    pub removed: Vec<Issue>,
    pub unchanged: Vec<Issue>,
}

impl IssueDiff {
    pub fn has_changes(&self) -> bool {
        !self.added.is_empty() || !self.removed.is_empty()
    }
}

/// Three-way diff keyed by issue fingerprint.
///
/// `added` and `unchanged` carry the current issues, `removed` the previous
/// ones.
pub fn diff_issues(previous: &[Issue], current: &[Issue]) -> IssueDiff {
    let before: HashSet<u64> = previous.iter().map(Issue::fingerprint).collect();
    let after: HashSet<u64> = current.iter().map(Issue::fingerprint).collect();

    let (unchanged, added): (Vec<Issue>, Vec<Issue>) = current
        .iter()
        .cloned()
        .partition(|issue| before.contains(&issue.fingerprint()));
    let removed = previous
        .iter()
        .filter(|issue| !after.contains(&issue.fingerprint()))
        .cloned()
        .collect();

    IssueDiff {
        added,
        removed,
        unchanged,
    }
}
