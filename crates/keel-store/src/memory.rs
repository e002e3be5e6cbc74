use std::collections::HashMap;
use std::sync::RwLock;

use keel_types::ObjectId;

use crate::error::{StoreError, StoreResult};
use crate::object::{ObjectKind, StorageObject};
use crate::traits::{ObjectStore, StoreStats};

/// In-memory, HashMap-based object store.
///
/// Intended for tests and embedding. All objects are held in memory behind a
/// `RwLock` for safe concurrent access. Objects are cloned on read/write.
pub struct InMemoryObjectStore {
    objects: RwLock<HashMap<ObjectId, StorageObject>>,
}

impl InMemoryObjectStore {
    /// Create a new empty in-memory store.
    pub fn new() -> Self {
        Self {
            objects: RwLock::new(HashMap::new()),
        }
    }

    /// Number of objects currently stored.
    pub fn len(&self) -> usize {
        self.objects.read().expect("lock poisoned").len()
    }

    /// Returns `true` if the store is empty.
    pub fn is_empty(&self) -> bool {
        self.objects.read().expect("lock poisoned").is_empty()
    }

    /// Remove all objects from the store.
    pub fn clear(&self) {
        self.objects.write().expect("lock poisoned").clear();
    }
}

impl Default for InMemoryObjectStore {
    fn default() -> Self {
        Self::new()
    }
}

impl ObjectStore for InMemoryObjectStore {
    fn read(&self, id: &ObjectId) -> StoreResult<Option<StorageObject>> {
        let map = self.objects.read().expect("lock poisoned");
        Ok(map.get(id).cloned())
    }

    fn write(&self, object: &StorageObject) -> StoreResult<ObjectId> {
        let id = object.id();
        if id.is_null() {
            return Err(StoreError::NullObjectId);
        }
        let mut map = self.objects.write().expect("lock poisoned");
        // Idempotent: if already present, skip (content-addressing
        // guarantees the same ID always maps to the same content).
        map.entry(id).or_insert_with(|| object.clone());
        Ok(id)
    }

    fn exists(&self, id: &ObjectId) -> StoreResult<bool> {
        let map = self.objects.read().expect("lock poisoned");
        Ok(map.contains_key(id))
    }

    fn delete(&self, id: &ObjectId) -> StoreResult<bool> {
        let mut map = self.objects.write().expect("lock poisoned");
        Ok(map.remove(id).is_some())
    }

    fn list(&self) -> StoreResult<Vec<ObjectId>> {
        let map = self.objects.read().expect("lock poisoned");
        let mut ids: Vec<ObjectId> = map.keys().copied().collect();
        ids.sort();
        Ok(ids)
    }

    fn stats(&self) -> StoreResult<StoreStats> {
        let map = self.objects.read().expect("lock poisoned");
        let mut stats = StoreStats {
            compression_ratio: 1.0,
            ..StoreStats::default()
        };
        for object in map.values() {
            stats.total_objects += 1;
            stats.total_size += object.size();
            match object.kind() {
                ObjectKind::Blob => stats.blob_count += 1,
                ObjectKind::Tree => stats.tree_count += 1,
                ObjectKind::Commit => stats.commit_count += 1,
            }
        }
        Ok(stats)
    }
}

impl std::fmt::Debug for InMemoryObjectStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InMemoryObjectStore")
            .field("object_count", &self.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::object::{Blob, Commit, Tree, TreeEntry};
    use keel_types::EntryMode;

    fn make_blob(content: &[u8]) -> StorageObject {
        StorageObject::Blob(Blob::new(content.to_vec()))
    }

    #[test]
    fn write_then_read() {
        let store = InMemoryObjectStore::new();
        let id = store.write(&make_blob(b"hello")).unwrap();
        let read = store.read(&id).unwrap().unwrap();
        assert_eq!(read.into_blob().unwrap().content, b"hello");
    }

    #[test]
    fn read_missing_is_none() {
        let store = InMemoryObjectStore::new();
        assert!(store.read(&ObjectId::from_hash([9; 32])).unwrap().is_none());
    }

    #[test]
    fn write_is_idempotent() {
        let store = InMemoryObjectStore::new();
        let id1 = store.write(&make_blob(b"same")).unwrap();
        let id2 = store.write(&make_blob(b"same")).unwrap();
        assert_eq!(id1, id2);
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn exists_and_delete() {
        let store = InMemoryObjectStore::new();
        let id = store.write(&make_blob(b"x")).unwrap();
        assert!(store.exists(&id).unwrap());
        assert!(store.delete(&id).unwrap());
        assert!(!store.exists(&id).unwrap());
        assert!(!store.delete(&id).unwrap());
    }

    #[test]
    fn list_is_sorted() {
        let store = InMemoryObjectStore::new();
        store.write(&make_blob(b"a")).unwrap();
        store.write(&make_blob(b"b")).unwrap();
        store.write(&make_blob(b"c")).unwrap();
        let ids = store.list().unwrap();
        assert_eq!(ids.len(), 3);
        assert!(ids.windows(2).all(|w| w[0] < w[1]));
    }

    #[test]
    fn stats_count_kinds() {
        let store = InMemoryObjectStore::new();
        let blob_id = store.write_blob(b"content".to_vec()).unwrap();
        let tree_id = store
            .write_tree(vec![TreeEntry::new(EntryMode::Regular, "f", blob_id, 7)])
            .unwrap();
        store
            .write_commit(Commit {
                tree: tree_id,
                parent: None,
                author: "t".into(),
                timestamp: "now".into(),
                message: "m".into(),
            })
            .unwrap();

        let stats = store.stats().unwrap();
        assert_eq!(stats.total_objects, 3);
        assert_eq!(stats.blob_count, 1);
        assert_eq!(stats.tree_count, 1);
        assert_eq!(stats.commit_count, 1);
        assert!(stats.total_size > 0);
    }

    #[test]
    fn verify_object_detects_intact() {
        let store = InMemoryObjectStore::new();
        let id = store.write(&make_blob(b"verified")).unwrap();
        assert!(store.verify_object(&id).unwrap().is_some());
        assert!(store
            .verify_object(&ObjectId::from_hash([7; 32]))
            .unwrap()
            .is_none());
    }

    #[test]
    fn empty_tree_is_storable_but_distinct() {
        // The builder never persists empty trees; the store itself does
        // not enforce that invariant.
        let store = InMemoryObjectStore::new();
        let id = store.write(&StorageObject::Tree(Tree::empty())).unwrap();
        assert!(store.exists(&id).unwrap());
    }
}
