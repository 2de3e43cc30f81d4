//! Glob-style file patterns compiled to anchored regular expressions.
//!
//! - `**/` matches zero or more whole directories
//! - `**` anywhere else matches any run of characters, separators included
//! - `*` matches within a single path segment
//! - `?` matches one non-separator character
//! - `{a,b}` matches either alternative
//!
//! Everything else, `.` in particular, is matched literally. Paths are
//! normalized to forward slashes before matching.

use crate::errors::{Error, Result};
use regex::Regex;
use std::fmt;

#[derive(Clone)]
pub struct FilePattern {
    source: String,
    regex: Regex,
}

impl FilePattern {
    pub fn new(pattern: &str) -> Result<Self> {
        let translated = glob_to_regex(pattern)?;
        let regex = Regex::new(&translated)
            .map_err(|e| Error::invalid_pattern(pattern, e.to_string()))?;
        Ok(Self {
            source: pattern.to_string(),
            regex,
        })
    }

    pub fn as_str(&self) -> &str {
        &self.source
    }

    pub fn is_match(&self, path: &str) -> bool {
        let normalized = normalize_path(path);
        self.regex.is_match(&normalized)
    }
}

impl fmt::Debug for FilePattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("FilePattern").field(&self.source).finish()
    }
}

/// A set of patterns; a path matches if any pattern matches.
///
/// An empty set matches every path.
#[derive(Debug, Clone, Default)]
pub struct PatternSet {
    patterns: Vec<FilePattern>,
}

impl PatternSet {
    pub fn new<S: AsRef<str>>(patterns: &[S]) -> Result<Self> {
        let patterns = patterns
            .iter()
            .map(|p| FilePattern::new(p.as_ref()))
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { patterns })
    }

    pub fn is_match(&self, path: &str) -> bool {
        self.patterns.is_empty() || self.patterns.iter().any(|p| p.is_match(path))
    }

    /// Like [`is_match`](Self::is_match), but an empty set matches nothing.
    pub fn matches_any(&self, path: &str) -> bool {
        self.patterns.iter().any(|p| p.is_match(path))
    }

    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }

    pub fn len(&self) -> usize {
        self.patterns.len()
    }
}

fn normalize_path(path: &str) -> String {
    let forward = path.replace('\\', "/");
    forward
        .strip_prefix("./")
        .map(str::to_string)
        .unwrap_or(forward)
}

/// Translate a glob into an anchored regex source string.
pub fn glob_to_regex(pattern: &str) -> Result<String> {
    if pattern.trim().is_empty() {
        return Err(Error::invalid_pattern(pattern, "pattern is empty"));
    }

    let chars: Vec<char> = normalize_path(pattern).chars().collect();
    let mut out = String::with_capacity(chars.len() * 2 + 2);
    let mut in_group = false;
    let mut i = 0;

    out.push('^');
    while i < chars.len() {
        match chars[i] {
            '*' if chars.get(i + 1) == Some(&'*') => {
                if chars.get(i + 2) == Some(&'*') {
                    return Err(Error::invalid_pattern(pattern, "'***' is not a valid wildcard"));
                }
                if chars.get(i + 2) == Some(&'/') {
                    out.push_str("(?:.*/)?");
                    i += 3;
                } else {
                    out.push_str(".*");
                    i += 2;
                }
                continue;
            }
            '*' => out.push_str("[^/]*"),
            '?' => out.push_str("[^/]"),
            '{' if in_group => {
                return Err(Error::invalid_pattern(pattern, "nested '{' is not supported"));
            }
            '{' => {
                in_group = true;
                out.push_str("(?:");
            }
            '}' if in_group => {
                in_group = false;
                out.push(')');
            }
            ',' if in_group => out.push('|'),
            '}' => return Err(Error::invalid_pattern(pattern, "unmatched '}'")),
            c => out.push_str(&regex::escape(&c.to_string())),
        }
        i += 1;
    }

    if in_group {
        return Err(Error::invalid_pattern(pattern, "unclosed '{'"));
    }
    out.push('$');
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn matches(pattern: &str, path: &str) -> bool {
        FilePattern::new(pattern).unwrap().is_match(path)
    }

    #[test]
    fn test_double_star_matches_any_depth() {
        assert!(matches("**/*.js", "app.js"));
        assert!(matches("**/*.js", "src/app.js"));
        assert!(matches("**/*.js", "src/deep/nested/app.js"));
        assert!(!matches("**/*.js", "src/app.jsx"));
    }

    #[test]
    fn test_single_star_stays_in_segment() {
        assert!(matches("src/*.rs", "src/lib.rs"));
        assert!(!matches("src/*.rs", "src/core/mod.rs"));
        assert!(!matches("*.rs", "src/lib.rs"));
    }

    #[test]
    fn test_dot_is_literal() {
        assert!(matches("*.ts", "index.ts"));
        assert!(!matches("*.ts", "indexxts"));
    }

    #[test]
    fn test_brace_alternatives() {
        assert!(matches("**/*.{js,ts}", "src/a.ts"));
        assert!(matches("**/*.{js,ts}", "src/a.js"));
        assert!(!matches("**/*.{js,ts}", "src/a.py"));
    }

    #[test]
    fn test_question_mark() {
        assert!(matches("file?.txt", "file1.txt"));
        assert!(!matches("file?.txt", "file10.txt"));
        assert!(!matches("a?b", "a/b"));
    }

    #[test]
    fn test_middle_double_star() {
        assert!(matches("src/**/test_*.py", "src/test_a.py"));
        assert!(matches("src/**/test_*.py", "src/pkg/sub/test_a.py"));
        assert!(!matches("src/**/test_*.py", "lib/test_a.py"));
    }

    #[test]
    fn test_windows_separators_normalized() {
        assert!(matches("src/**/*.rs", "src\\core\\mod.rs"));
        assert!(matches("src/*.rs", "./src/main.rs"));
    }

    #[test]
    fn test_invalid_patterns() {
        assert!(FilePattern::new("").is_err());
        assert!(FilePattern::new("*.{js,ts").is_err());
        assert!(FilePattern::new("*.js}").is_err());
        assert!(FilePattern::new("***/x").is_err());
        assert!(FilePattern::new("{a,{b,c}}").is_err());
    }

    #[test]
    fn test_empty_pattern_set_matches_everything() {
        let set = PatternSet::new::<&str>(&[]).unwrap();
        assert!(set.is_match("anything/at/all.c"));
        assert!(!set.matches_any("anything/at/all.c"));
    }

    #[test]
    fn test_pattern_set_any() {
        let set = PatternSet::new(&["**/*.py", "**/*.rb"]).unwrap();
        assert!(set.is_match("a/b.rb"));
        assert!(!set.is_match("a/b.go"));
        assert_eq!(set.len(), 2);
    }

    proptest! {
        #[test]
        fn prop_literal_patterns_match_only_themselves(name in "[a-z]{1,8}\\.[a-z]{1,3}") {
            let pattern = FilePattern::new(&name).unwrap();
            prop_assert!(pattern.is_match(&name));
            let prefixed = format!("x{}", name);
            prop_assert!(!pattern.is_match(&prefixed));
        }

        #[test]
        fn prop_recursive_extension_glob(dirs in proptest::collection::vec("[a-z]{1,5}", 0..4), stem in "[a-z]{1,6}") {
            let mut path = dirs.join("/");
            if !path.is_empty() {
                path.push('/');
            }
            path.push_str(&stem);
            path.push_str(".rs");
            prop_assert!(FilePattern::new("**/*.rs").unwrap().is_match(&path));
        }
    }
}
