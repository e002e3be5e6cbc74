use keel_store::Commit;
use keel_types::{EntryMode, ObjectId};

/// Metadata for one checkpoint, as returned by history and info queries.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CheckpointInfo {
    /// Commit object id; this is the checkpoint's identity.
    pub id: ObjectId,
    /// Root tree of the captured directory state.
    pub tree: ObjectId,
    /// Previous checkpoint, absent for the first one.
    pub parent: Option<ObjectId>,
    pub author: String,
    /// RFC 3339 creation time.
    pub timestamp: String,
    pub message: String,
}

impl CheckpointInfo {
    pub(crate) fn from_commit(id: ObjectId, commit: Commit) -> Self {
        Self {
            id,
            tree: commit.tree,
            parent: commit.parent,
            author: commit.author,
            timestamp: commit.timestamp,
            message: commit.message,
        }
    }
}

/// One tracked file inside a checkpoint.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FileEntry {
    /// Path relative to the project root, `/`-separated.
    pub path: String,
    pub id: ObjectId,
    pub mode: EntryMode,
    pub size: u64,
}

/// What a checkout or reset touched in the working directory.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct RestoreSummary {
    /// Files written (added or overwritten).
    pub written: u64,
    /// Files removed because the checkpoint does not contain them.
    pub removed: u64,
}

/// Garbage collection audit.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct GcReport {
    /// Objects examined.
    pub scanned: u64,
    /// Objects reachable from the checkpoint history.
    pub live: u64,
    /// Unreachable objects removed.
    pub deleted: u64,
    /// Live objects whose content no longer matches their hash.
    pub corrupt: u64,
}

/// Store statistics together with checkpoint count.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct StorageReport {
    pub stats: keel_store::StoreStats,
    pub checkpoint_count: u64,
}
