//! Ignore-file pattern parsing and matching.

use std::path::Path;

/// The name of the store's metadata directory, always excluded from
/// snapshots of the repository root regardless of user patterns.
pub const STORE_DIR_NAME: &str = ".store";

/// Patterns that apply to every snapshot on top of whatever the ignore file
/// at the snapshot root contributes: VCS metadata, OS noise, build caches,
/// common credential filenames, and the store directory itself.
pub fn default_patterns() -> Vec<Pattern> {
    [
        ".git/", ".hg/", ".svn/", ".store/", "node_modules/", "target/", "__pycache__/", ".venv/", ".DS_Store",
        "Thumbs.db", "*.pyc", ".env", "*.pem", "*.key", "id_rsa", "id_ed25519",
    ]
    .iter()
    .map(|p| Pattern::parse(p))
    .collect()
}

/// One parsed line of an ignore file.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Pattern {
    glob: String,
    dir_only: bool,
    negate: bool,
    anchored: bool,
}

impl Pattern {
    /// Parses a single non-empty, non-comment ignore-file line.
    #[must_use]
    pub fn parse(line: &str) -> Self {
        let mut s = line;
        let negate = s.starts_with('!');
        if negate {
            s = &s[1..];
        }
        let dir_only = s.ends_with('/');
        if dir_only {
            s = &s[..s.len() - 1];
        }
        let anchored = s.contains('/');
        Self {
            glob: s.to_owned(),
            dir_only,
            negate,
            anchored,
        }
    }

    /// Whether this pattern matches `rel_path` (forward-slash separated,
    /// relative to the snapshot root), given whether the entry is a
    /// directory.
    #[must_use]
    pub fn matches(&self, rel_path: &str, is_dir: bool) -> bool {
        if self.dir_only && !is_dir {
            return false;
        }
        let candidate = if self.anchored {
            rel_path
        } else {
            rel_path.rsplit('/').next().unwrap_or(rel_path)
        };
        glob_match(&self.glob, candidate)
    }

    #[must_use]
    pub const fn is_negation(&self) -> bool {
        self.negate
    }
}

/// Parses an ignore file's contents into patterns, skipping empty lines and
/// `#`-comments.
#[must_use]
pub fn parse_ignore_file(contents: &str) -> Vec<Pattern> {
    contents
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .map(Pattern::parse)
        .collect()
}

/// Evaluates whether `rel_path` should be excluded from a snapshot, walking
/// `patterns` in order so a later negation pattern can re-include something
/// an earlier pattern excluded.
#[must_use]
pub fn is_ignored(patterns: &[Pattern], rel_path: &str, is_dir: bool) -> bool {
    let mut ignored = false;
    for pattern in patterns {
        if pattern.matches(rel_path, is_dir) {
            ignored = !pattern.is_negation();
        }
    }
    ignored
}

fn glob_match(pattern: &str, candidate: &str) -> bool {
    glob::Pattern::new(pattern).is_ok_and(|p| p.matches(candidate))
}

/// Loads the ignore file at `root`'s well-known name (`.storeignore`), if
/// present, combined with [`default_patterns`].
pub fn load_patterns(root: &Path) -> std::io::Result<Vec<Pattern>> {
    let mut patterns = default_patterns();
    let ignore_path = root.join(".storeignore");
    if ignore_path.exists() {
        let contents = std::fs::read_to_string(&ignore_path)?;
        patterns.extend(parse_ignore_file(&contents));
    }
    Ok(patterns)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn comment_and_blank_lines_are_skipped() {
        let patterns = parse_ignore_file("# comment\n\n*.log\n");
        assert_eq!(patterns.len(), 1);
    }

    #[test]
    fn dir_only_pattern_does_not_match_files() {
        let p = Pattern::parse("build/");
        assert!(p.matches("build", true));
        assert!(!p.matches("build", false));
    }

    #[test]
    fn unanchored_pattern_matches_basename_anywhere() {
        let p = Pattern::parse("*.pyc");
        assert!(p.matches("a/b/c.pyc", false));
    }

    #[test]
    fn anchored_pattern_matches_full_relative_path() {
        let p = Pattern::parse("src/gen/out.rs");
        assert!(p.matches("src/gen/out.rs", false));
        assert!(!p.matches("other/out.rs", false));
    }

    #[test]
    fn negation_re_includes() {
        let patterns = parse_ignore_file("*.log\n!important.log\n");
        assert!(is_ignored(&patterns, "debug.log", false));
        assert!(!is_ignored(&patterns, "important.log", false));
    }

    #[test]
    fn later_pattern_wins() {
        let patterns = parse_ignore_file("!keep.txt\nkeep.txt\n");
        assert!(is_ignored(&patterns, "keep.txt", false));
    }

    #[test]
    fn default_patterns_exclude_store_dir() {
        let patterns = default_patterns();
        assert!(is_ignored(&patterns, ".store", true));
    }
}
