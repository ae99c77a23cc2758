//! Ignore-rule filtering for workspace sync
//!
//! Wraps the `ignore` crate's gitignore matcher. Rules come from a single
//! top-level `.gitignore` at the sync root; when no such file exists,
//! nothing is filtered.

use std::path::Path;

use ignore::gitignore::{Gitignore, GitignoreBuilder};

use super::SyncError;

/// Name of the ignore-pattern file read once per sync call.
pub const IGNORE_FILE: &str = ".gitignore";

/// Decides whether a path is excluded from sync.
///
/// Queried for directories (to prune traversal entirely) and for
/// individual files (to skip single uploads). Matching semantics are the
/// standard gitignore grammar: globs, negation, directory anchors.
pub struct IgnoreFilter {
    matcher: Option<Gitignore>,
}

impl IgnoreFilter {
    /// Build the filter from `<root>/.gitignore` if it exists.
    pub fn load(root: &Path) -> Result<Self, SyncError> {
        let ignore_file = root.join(IGNORE_FILE);
        if !ignore_file.is_file() {
            return Ok(Self { matcher: None });
        }

        let mut builder = GitignoreBuilder::new(root);
        if let Some(err) = builder.add(&ignore_file) {
            return Err(SyncError::IgnoreRules(err));
        }
        Ok(Self {
            matcher: Some(builder.build()?),
        })
    }

    /// Filter that never ignores anything.
    pub fn empty() -> Self {
        Self { matcher: None }
    }

    /// Whether `rel_path` (relative to the sync root) is excluded.
    pub fn should_ignore(&self, rel_path: &Path, is_dir: bool) -> bool {
        match &self.matcher {
            Some(matcher) => matcher.matched(rel_path, is_dir).is_ignore(),
            None => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn filter_with_rules(rules: &str) -> (TempDir, IgnoreFilter) {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join(IGNORE_FILE), rules).unwrap();
        let filter = IgnoreFilter::load(dir.path()).unwrap();
        (dir, filter)
    }

    #[test]
    fn test_no_ignore_file_filters_nothing() {
        let dir = TempDir::new().unwrap();
        let filter = IgnoreFilter::load(dir.path()).unwrap();
        assert!(!filter.should_ignore(Path::new("anything.txt"), false));
        assert!(!filter.should_ignore(Path::new("target"), true));
    }

    #[test]
    fn test_glob_pattern_matches_files() {
        let (_dir, filter) = filter_with_rules("*.log\n");
        assert!(filter.should_ignore(Path::new("debug.log"), false));
        assert!(filter.should_ignore(Path::new("sub/debug.log"), false));
        assert!(!filter.should_ignore(Path::new("debug.txt"), false));
    }

    #[test]
    fn test_directory_pattern_prunes() {
        let (_dir, filter) = filter_with_rules("target/\n");
        assert!(filter.should_ignore(Path::new("target"), true));
        assert!(!filter.should_ignore(Path::new("target"), false));
    }

    #[test]
    fn test_negation_pattern() {
        let (_dir, filter) = filter_with_rules("*.log\n!keep.log\n");
        assert!(filter.should_ignore(Path::new("debug.log"), false));
        assert!(!filter.should_ignore(Path::new("keep.log"), false));
    }

    #[test]
    fn test_empty_filter() {
        let filter = IgnoreFilter::empty();
        assert!(!filter.should_ignore(Path::new("x"), false));
    }
}
