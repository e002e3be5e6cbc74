//! Property tests for the content-addressing invariants.

use keel_store::{Blob, FsObjectStore, ObjectStore, StorageObject};
use proptest::prelude::*;

proptest! {
    #[test]
    fn identical_content_identical_address(content in proptest::collection::vec(any::<u8>(), 0..2048)) {
        let a = StorageObject::Blob(Blob::new(content.clone()));
        let b = StorageObject::Blob(Blob::new(content));
        prop_assert_eq!(a.id(), b.id());
    }

    #[test]
    fn distinct_content_distinct_address(
        c1 in proptest::collection::vec(any::<u8>(), 0..1024),
        c2 in proptest::collection::vec(any::<u8>(), 0..1024),
    ) {
        prop_assume!(c1 != c2);
        let a = StorageObject::Blob(Blob::new(c1));
        let b = StorageObject::Blob(Blob::new(c2));
        prop_assert_ne!(a.id(), b.id());
    }

    #[test]
    fn serialize_decode_roundtrip(content in proptest::collection::vec(any::<u8>(), 0..2048)) {
        let object = StorageObject::Blob(Blob::new(content.clone()));
        let decoded = StorageObject::decode(object.id(), &object.serialize()).unwrap();
        prop_assert_eq!(decoded.into_blob().unwrap().content, content);
    }
}

#[test]
fn second_store_of_same_bytes_leaves_disk_unchanged() {
    let dir = tempfile::tempdir().unwrap();
    let store = FsObjectStore::open(dir.path()).unwrap();

    let id1 = store.write_blob(b"stable bytes".to_vec()).unwrap();
    let count_files = || {
        walk_files(store.objects_dir()).len()
    };
    let before = count_files();
    let id2 = store.write_blob(b"stable bytes".to_vec()).unwrap();

    assert_eq!(id1, id2);
    assert_eq!(count_files(), before);
}

fn walk_files(dir: &std::path::Path) -> Vec<std::path::PathBuf> {
    let mut files = Vec::new();
    let mut stack = vec![dir.to_path_buf()];
    while let Some(current) = stack.pop() {
        for entry in std::fs::read_dir(&current).unwrap() {
            let entry = entry.unwrap();
            let path = entry.path();
            if path.is_dir() {
                stack.push(path);
            } else {
                files.push(path);
            }
        }
    }
    files
}
