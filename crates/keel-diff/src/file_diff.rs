//! Line-level diff of file contents, via the `similar` crate's Myers
//! implementation.

use similar::{ChangeTag, TextDiff};

/// A single line within a hunk.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum DiffLine {
    /// Unchanged context line.
    Context(String),
    Added(String),
    Removed(String),
}

/// A contiguous run of changes with surrounding context.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DiffHunk {
    /// 1-based starting line in the old content.
    pub old_start: usize,
    pub old_count: usize,
    /// 1-based starting line in the new content.
    pub new_start: usize,
    pub new_count: usize,
    pub lines: Vec<DiffLine>,
}

/// The diff between two versions of a file's content.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FileDiff {
    pub hunks: Vec<DiffHunk>,
    /// Content was not valid UTF-8 on at least one side; hunks contain a
    /// synthetic byte-count summary instead of lines.
    pub binary: bool,
}

impl FileDiff {
    /// `true` when both sides are identical.
    pub fn is_empty(&self) -> bool {
        self.hunks.is_empty()
    }

    pub fn additions(&self) -> usize {
        self.count(|l| matches!(l, DiffLine::Added(_)))
    }

    pub fn deletions(&self) -> usize {
        self.count(|l| matches!(l, DiffLine::Removed(_)))
    }

    fn count(&self, pred: impl Fn(&DiffLine) -> bool) -> usize {
        self.hunks.iter().flat_map(|h| &h.lines).filter(|l| pred(l)).count()
    }

    /// Render in unified-diff format with `---`/`+++` labels.
    pub fn to_unified(&self, old_label: &str, new_label: &str) -> String {
        let mut out = String::new();
        if self.is_empty() {
            return out;
        }
        out.push_str(&format!("--- {old_label}\n+++ {new_label}\n"));
        for hunk in &self.hunks {
            out.push_str(&format!(
                "@@ -{},{} +{},{} @@\n",
                hunk.old_start, hunk.old_count, hunk.new_start, hunk.new_count
            ));
            for line in &hunk.lines {
                match line {
                    DiffLine::Context(text) => out.push_str(&format!(" {text}\n")),
                    DiffLine::Added(text) => out.push_str(&format!("+{text}\n")),
                    DiffLine::Removed(text) => out.push_str(&format!("-{text}\n")),
                }
            }
        }
        out
    }
}

/// Number of context lines kept around each change.
const CONTEXT_LINES: usize = 3;

/// Diff two byte buffers as line-oriented text.
///
/// Content that is not valid UTF-8 on either side is treated as binary and
/// summarized rather than diffed line by line.
pub fn diff_contents(old: &[u8], new: &[u8]) -> FileDiff {
    let (Ok(old_text), Ok(new_text)) = (std::str::from_utf8(old), std::str::from_utf8(new))
    else {
        return binary_summary(old, new);
    };
    if old_text == new_text {
        return FileDiff {
            hunks: Vec::new(),
            binary: false,
        };
    }

    let text_diff = TextDiff::from_lines(old_text, new_text);
    let mut hunks = Vec::new();

    for group in text_diff.grouped_ops(CONTEXT_LINES) {
        let Some(first) = group.first() else { continue };
        let old_start = first.old_range().start + 1;
        let new_start = first.new_range().start + 1;
        let mut old_count = 0;
        let mut new_count = 0;
        let mut lines = Vec::new();

        for op in &group {
            for change in text_diff.iter_changes(op) {
                let text = change.value().trim_end_matches('\n').to_string();
                match change.tag() {
                    ChangeTag::Equal => {
                        old_count += 1;
                        new_count += 1;
                        lines.push(DiffLine::Context(text));
                    }
                    ChangeTag::Delete => {
                        old_count += 1;
                        lines.push(DiffLine::Removed(text));
                    }
                    ChangeTag::Insert => {
                        new_count += 1;
                        lines.push(DiffLine::Added(text));
                    }
                }
            }
        }

        hunks.push(DiffHunk {
            old_start,
            old_count,
            new_start,
            new_count,
            lines,
        });
    }

    FileDiff {
        hunks,
        binary: false,
    }
}

fn binary_summary(old: &[u8], new: &[u8]) -> FileDiff {
    if old == new {
        return FileDiff {
            hunks: Vec::new(),
            binary: true,
        };
    }
    let mut lines = Vec::new();
    if !old.is_empty() {
        lines.push(DiffLine::Removed(format!("(binary, {} bytes)", old.len())));
    }
    if !new.is_empty() {
        lines.push(DiffLine::Added(format!("(binary, {} bytes)", new.len())));
    }
    FileDiff {
        hunks: vec![DiffHunk {
            old_start: 1,
            old_count: usize::from(!old.is_empty()),
            new_start: 1,
            new_count: usize::from(!new.is_empty()),
            lines,
        }],
        binary: true,
    }
}
