use std::fs;
use std::path::Path;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use keel_store::{ObjectStore, TreeEntry};
use keel_types::{EntryMode, ObjectId};

use crate::error::{SnapshotError, SnapshotResult};
use crate::ignore::IgnoreMatcher;

/// Tuning for directory capture.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct SnapshotConfig {
    /// Gitignore-style patterns for entries to exclude.
    pub ignore_patterns: Vec<String>,
    /// Files larger than this are skipped with a warning (default: 100 MiB).
    pub max_file_size: u64,
}

impl Default for SnapshotConfig {
    fn default() -> Self {
        Self {
            ignore_patterns: Vec::new(),
            max_file_size: 100 * 1024 * 1024,
        }
    }
}

/// Result of one directory capture.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TreeSummary {
    /// Root tree object.
    pub root: ObjectId,
    /// Files stored as blobs.
    pub file_count: u64,
    /// Sum of stored file sizes in bytes.
    pub total_size: u64,
    /// Entries skipped because they were unreadable or oversized
    /// (ignored entries are not counted).
    pub skipped: u64,
}

/// Captures a live directory into a graph of tree and blob objects.
///
/// Capture is depth-first and bottom-up: blobs and subtrees are stored
/// before the tree that references them, so a crash mid-capture leaves
/// only unreferenced objects behind. Per-entry failures (unreadable file,
/// oversized file) are skipped with a warning; a partial tree is a valid
/// tree.
pub struct TreeBuilder {
    store: Arc<dyn ObjectStore>,
    matcher: IgnoreMatcher,
    max_file_size: u64,
}

impl TreeBuilder {
    pub fn new(store: Arc<dyn ObjectStore>, config: &SnapshotConfig) -> Self {
        Self {
            store,
            matcher: IgnoreMatcher::new(&config.ignore_patterns),
            max_file_size: config.max_file_size,
        }
    }

    /// Capture `root` and everything under it, returning the root tree.
    ///
    /// The root tree always exists, even when the directory is empty or
    /// fully ignored; empty subdirectories below it are omitted from their
    /// parent rather than stored as empty trees.
    pub fn build_tree(&self, root: &Path) -> SnapshotResult<TreeSummary> {
        if !root.is_dir() {
            return Err(SnapshotError::InvalidRoot(root.display().to_string()));
        }
        let mut summary = TreeSummary {
            root: ObjectId::null(),
            file_count: 0,
            total_size: 0,
            skipped: 0,
        };
        summary.root = match self.capture_dir(root, "", &mut summary)? {
            Some((id, _)) => id,
            None => self.store.write_tree(Vec::new())?,
        };
        debug!(root = %root.display(), files = summary.file_count,
               bytes = summary.total_size, skipped = summary.skipped, "captured tree");
        Ok(summary)
    }

    /// Capture one directory; `None` means it contributed no entries and
    /// should be omitted from its parent.
    fn capture_dir(
        &self,
        dir: &Path,
        rel: &str,
        summary: &mut TreeSummary,
    ) -> SnapshotResult<Option<(ObjectId, u64)>> {
        let reader = match fs::read_dir(dir) {
            Ok(r) => r,
            Err(error) => {
                warn!(path = %dir.display(), %error, "skipping unreadable directory");
                summary.skipped += 1;
                return Ok(None);
            }
        };

        let mut entries = Vec::new();
        for dirent in reader {
            let dirent = match dirent {
                Ok(d) => d,
                Err(error) => {
                    warn!(path = %dir.display(), %error, "skipping unreadable entry");
                    summary.skipped += 1;
                    continue;
                }
            };
            let name = dirent.file_name().to_string_lossy().into_owned();
            let rel_path = if rel.is_empty() {
                name.clone()
            } else {
                format!("{rel}/{name}")
            };
            if self.matcher.is_ignored(&rel_path, &name) {
                continue;
            }

            let path = dirent.path();
            let meta = match fs::symlink_metadata(&path) {
                Ok(m) => m,
                Err(error) => {
                    warn!(path = %path.display(), %error, "skipping unreadable entry");
                    summary.skipped += 1;
                    continue;
                }
            };

            if meta.is_dir() {
                if let Some((id, size)) = self.capture_dir(&path, &rel_path, summary)? {
                    entries.push(TreeEntry::new(EntryMode::Directory, name, id, size));
                }
            } else if meta.file_type().is_symlink() {
                if let Some(entry) = self.capture_symlink(&path, name, summary)? {
                    entries.push(entry);
                }
            } else if meta.is_file() {
                if let Some(entry) = self.capture_file(&path, name, &meta, summary)? {
                    entries.push(entry);
                }
            }
            // Sockets, fifos and other special files are not snapshot
            // material; they are silently left out.
        }

        if entries.is_empty() {
            return Ok(None);
        }
        let size: u64 = entries.iter().map(|e| e.size).sum();
        let id = self.store.write_tree(entries)?;
        Ok(Some((id, size)))
    }

    fn capture_file(
        &self,
        path: &Path,
        name: String,
        meta: &fs::Metadata,
        summary: &mut TreeSummary,
    ) -> SnapshotResult<Option<TreeEntry>> {
        if meta.len() > self.max_file_size {
            warn!(path = %path.display(), size = meta.len(),
                  limit = self.max_file_size, "skipping oversized file");
            summary.skipped += 1;
            return Ok(None);
        }
        let content = match fs::read(path) {
            Ok(c) => c,
            Err(error) => {
                warn!(path = %path.display(), %error, "skipping unreadable file");
                summary.skipped += 1;
                return Ok(None);
            }
        };
        let size = content.len() as u64;
        let id = self.store.write_blob(content)?;
        summary.file_count += 1;
        summary.total_size += size;
        let mode = EntryMode::from_posix(false, false, permissions(meta));
        Ok(Some(TreeEntry::new(mode, name, id, size)))
    }

    /// Symlinks are stored as blobs holding the link target path.
    fn capture_symlink(
        &self,
        path: &Path,
        name: String,
        summary: &mut TreeSummary,
    ) -> SnapshotResult<Option<TreeEntry>> {
        let target = match fs::read_link(path) {
            Ok(t) => t,
            Err(error) => {
                warn!(path = %path.display(), %error, "skipping unreadable symlink");
                summary.skipped += 1;
                return Ok(None);
            }
        };
        let content = target.to_string_lossy().into_owned().into_bytes();
        let size = content.len() as u64;
        let id = self.store.write_blob(content)?;
        summary.file_count += 1;
        summary.total_size += size;
        Ok(Some(TreeEntry::new(EntryMode::Symlink, name, id, size)))
    }
}

#[cfg(unix)]
fn permissions(meta: &fs::Metadata) -> u32 {
    use std::os::unix::fs::PermissionsExt;
    meta.permissions().mode()
}

#[cfg(not(unix))]
fn permissions(_meta: &fs::Metadata) -> u32 {
    0o644
}
