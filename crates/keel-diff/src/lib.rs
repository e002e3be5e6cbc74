//! Diffing between checkpoints.
//!
//! Two layers: [`tree_diff`] compares stored trees recursively and reports
//! added, deleted, modified, and mode-changed files by path; [`file_diff`]
//! compares two blobs line by line and can render the result as a unified
//! diff.

pub mod error;
pub mod file_diff;
pub mod tree_diff;

pub use error::{DiffError, DiffResult};
pub use file_diff::{diff_contents, DiffHunk, DiffLine, FileDiff};
pub use tree_diff::{diff_trees, TreeChange, TreeDiff};
