use keel_types::ObjectId;

use crate::error::{StoreError, StoreResult};
use crate::object::{Blob, Commit, StorageObject, Tree, TreeEntry};

/// Aggregate statistics over a store's objects.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct StoreStats {
    /// Total number of objects.
    pub total_objects: u64,
    /// Number of blob objects.
    pub blob_count: u64,
    /// Number of tree objects.
    pub tree_count: u64,
    /// Number of commit objects.
    pub commit_count: u64,
    /// Sum of decompressed object sizes in bytes.
    pub total_size: u64,
    /// Stored (compressed) bytes divided by decompressed bytes.
    /// 1.0 for an empty store.
    pub compression_ratio: f64,
}

/// Content-addressed object store.
///
/// All implementations must satisfy these invariants:
/// - Objects are immutable once written. Content-addressing guarantees this:
///   the same data always produces the same ID.
/// - Writes are idempotent: storing content that already exists returns the
///   existing ID without rewriting.
/// - Concurrent reads are always safe (objects are immutable).
/// - A missing object is `Ok(None)`, never an error; corruption is always
///   an error and never silently recovered.
pub trait ObjectStore: Send + Sync {
    /// Read an object by its content-addressed ID.
    ///
    /// Returns `Ok(None)` if the object does not exist.
    /// Returns `Err` on I/O failure or data corruption.
    fn read(&self, id: &ObjectId) -> StoreResult<Option<StorageObject>>;

    /// Write an object and return its content-addressed ID.
    ///
    /// If the object already exists, this is a no-op (idempotent).
    fn write(&self, object: &StorageObject) -> StoreResult<ObjectId>;

    /// Check whether an object exists in the store.
    fn exists(&self, id: &ObjectId) -> StoreResult<bool>;

    /// Delete an object by ID. Returns `true` if the object existed.
    ///
    /// This is intended for garbage collection only. Deletion of
    /// referenced objects can corrupt the store.
    fn delete(&self, id: &ObjectId) -> StoreResult<bool>;

    /// Enumerate the IDs of all stored objects.
    fn list(&self) -> StoreResult<Vec<ObjectId>>;

    /// Aggregate statistics over all stored objects.
    fn stats(&self) -> StoreResult<StoreStats>;

    /// Store raw file content as a blob; returns its ID.
    fn write_blob(&self, content: Vec<u8>) -> StoreResult<ObjectId> {
        self.write(&StorageObject::Blob(Blob::new(content)))
    }

    /// Store a directory listing; entries are sorted canonically.
    fn write_tree(&self, entries: Vec<TreeEntry>) -> StoreResult<ObjectId> {
        self.write(&StorageObject::Tree(Tree::new(entries)))
    }

    /// Store a checkpoint commit; returns its ID.
    fn write_commit(&self, commit: Commit) -> StoreResult<ObjectId> {
        self.write(&StorageObject::Commit(commit))
    }

    /// Recompute the content hash of a stored object and compare it with
    /// its address. Used by garbage collection to audit for corruption.
    ///
    /// Returns `Ok(None)` if the object does not exist, `Ok(Some(()))` if
    /// it verifies, and [`StoreError::HashMismatch`] if it does not.
    fn verify_object(&self, id: &ObjectId) -> StoreResult<Option<()>> {
        let Some(object) = self.read(id)? else {
            return Ok(None);
        };
        let computed = object.id();
        if computed != *id {
            return Err(StoreError::HashMismatch {
                expected: *id,
                computed,
            });
        }
        Ok(Some(()))
    }
}
