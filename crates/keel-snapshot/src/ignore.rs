use globset::{Glob, GlobSet, GlobSetBuilder};
use tracing::warn;

/// Directory name of the local checkpoint store, always excluded from
/// snapshots to keep the store from snapshotting itself.
pub const STORE_DIR_NAME: &str = ".keel";

/// Conservative matcher used when a glob pattern fails to compile: the
/// literal text before the first `*` must prefix the candidate and the text
/// after the last `*` must suffix it. A pattern with no `*` matches only
/// exactly.
#[derive(Clone, Debug)]
struct FallbackPattern {
    prefix: String,
    suffix: String,
    exact: bool,
}

impl FallbackPattern {
    fn new(pattern: &str) -> Self {
        match (pattern.find('*'), pattern.rfind('*')) {
            (Some(first), Some(last)) => Self {
                prefix: pattern[..first].to_string(),
                suffix: pattern[last + 1..].to_string(),
                exact: false,
            },
            _ => Self {
                prefix: pattern.to_string(),
                suffix: String::new(),
                exact: true,
            },
        }
    }

    fn matches(&self, candidate: &str) -> bool {
        if self.exact {
            return candidate == self.prefix;
        }
        candidate.len() >= self.prefix.len() + self.suffix.len()
            && candidate.starts_with(&self.prefix)
            && candidate.ends_with(&self.suffix)
    }
}

/// Gitignore-style pattern set.
///
/// Patterns support `*`, `**`, brace expansion, and `!` negation; a
/// negated match always wins over a positive one. Each pattern is tested
/// against both the entry's name and its path relative to the snapshot
/// root, so `node_modules` excludes that directory at any depth while
/// `build/cache` only excludes that exact path. Malformed patterns degrade
/// to a prefix/suffix matcher rather than aborting the scan.
#[derive(Debug)]
pub struct IgnoreMatcher {
    skip: GlobSet,
    keep: GlobSet,
    skip_fallback: Vec<FallbackPattern>,
    keep_fallback: Vec<FallbackPattern>,
}

impl IgnoreMatcher {
    pub fn new(patterns: &[String]) -> Self {
        let mut skip = GlobSetBuilder::new();
        let mut keep = GlobSetBuilder::new();
        let mut skip_fallback = Vec::new();
        let mut keep_fallback = Vec::new();

        for raw in patterns {
            let raw = raw.trim();
            if raw.is_empty() || raw.starts_with('#') {
                continue;
            }
            let (negated, pattern) = match raw.strip_prefix('!') {
                Some(rest) => (true, rest),
                None => (false, raw),
            };
            match Glob::new(pattern) {
                Ok(glob) => {
                    if negated {
                        keep.add(glob);
                    } else {
                        skip.add(glob);
                    }
                }
                Err(error) => {
                    warn!(pattern, %error, "malformed ignore pattern, using prefix/suffix match");
                    if negated {
                        keep_fallback.push(FallbackPattern::new(pattern));
                    } else {
                        skip_fallback.push(FallbackPattern::new(pattern));
                    }
                }
            }
        }

        // GlobSetBuilder::build only fails on malformed globs, which were
        // already filtered above; an empty set is the safe fallback.
        Self {
            skip: skip.build().unwrap_or_else(|_| GlobSet::empty()),
            keep: keep.build().unwrap_or_else(|_| GlobSet::empty()),
            skip_fallback,
            keep_fallback,
        }
    }

    /// Whether an entry should be excluded from the snapshot.
    ///
    /// `rel_path` is the path relative to the snapshot root using `/`
    /// separators; `name` is the final component.
    pub fn is_ignored(&self, rel_path: &str, name: &str) -> bool {
        if name == STORE_DIR_NAME {
            return true;
        }
        if self.matches(&self.keep, &self.keep_fallback, rel_path, name) {
            return false;
        }
        self.matches(&self.skip, &self.skip_fallback, rel_path, name)
    }

    fn matches(
        &self,
        set: &GlobSet,
        fallback: &[FallbackPattern],
        rel_path: &str,
        name: &str,
    ) -> bool {
        set.is_match(rel_path)
            || set.is_match(name)
            || fallback
                .iter()
                .any(|p| p.matches(rel_path) || p.matches(name))
    }
}
