//! Filesystem object store: gzip-compressed objects in a two-level
//! hash-prefix directory layout, written atomically via temp-file rename.
//!
//! On-disk layout:
//! ```text
//! <base>/objects/<first 2 hex chars>/<remaining 62 hex chars>
//! ```
//! Each object file is the gzip of `"<type> <body-length>\0<body>"`; the
//! same uncompressed bytes are the SHA-256 preimage of the object's address.

use std::fs::{self, File};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use keel_types::ObjectId;
use tracing::{debug, warn};

use crate::error::{StoreError, StoreResult};
use crate::object::{ObjectKind, StorageObject};
use crate::traits::{ObjectStore, StoreStats};

/// How long a cached object listing stays fresh.
const LIST_CACHE_TTL: Duration = Duration::from_secs(5);

/// A cached result of enumerating the objects directory.
struct ListCache {
    taken_at: Instant,
    ids: Vec<ObjectId>,
}

/// Filesystem-backed content-addressed object store.
///
/// Writes are atomic: the object is written to a `*.tmp.<timestamp>`
/// sibling and renamed over the final path. Concurrent writers of the same
/// content race harmlessly to identical final bytes; writers of different
/// content never share a path because the path is derived from content.
///
/// The object-listing cache (5 s TTL) is advisory only: every write path
/// re-checks existence on disk before writing.
pub struct FsObjectStore {
    objects_dir: PathBuf,
    list_cache: Mutex<Option<ListCache>>,
}

impl FsObjectStore {
    /// Open (or create) an object store rooted at `base_dir`.
    ///
    /// Objects live under `<base_dir>/objects/`.
    pub fn open(base_dir: &Path) -> StoreResult<Self> {
        let objects_dir = base_dir.join("objects");
        fs::create_dir_all(&objects_dir)?;
        Ok(Self {
            objects_dir,
            list_cache: Mutex::new(None),
        })
    }

    /// The objects directory this store reads and writes.
    pub fn objects_dir(&self) -> &Path {
        &self.objects_dir
    }

    /// Derive the fanout path for an object ID.
    fn object_path(&self, id: &ObjectId) -> PathBuf {
        let hex = id.to_hex();
        self.objects_dir.join(&hex[..2]).join(&hex[2..])
    }

    /// Read and decompress the raw serialized bytes of an object file.
    ///
    /// Returns `Ok(None)` if the file does not exist. Decompression
    /// failures are classified as corruption, not I/O.
    fn read_raw(&self, id: &ObjectId) -> StoreResult<Option<Vec<u8>>> {
        let path = self.object_path(id);
        let file = match File::open(&path) {
            Ok(f) => f,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        let mut decoder = GzDecoder::new(file);
        let mut bytes = Vec::new();
        decoder
            .read_to_end(&mut bytes)
            .map_err(|e| StoreError::CorruptObject {
                id: *id,
                reason: format!("decompression failed: {e}"),
            })?;
        Ok(Some(bytes))
    }

    /// Atomically write compressed bytes to the object's final path.
    ///
    /// Writes to `<path>.tmp.<nanos>` then renames. On failure the temp
    /// file is unlinked best-effort.
    fn write_atomic(&self, path: &Path, compressed: &[u8]) -> StoreResult<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let nanos = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_nanos();
        let tmp = path.with_extension(format!("tmp.{nanos}"));

        let result = (|| -> StoreResult<()> {
            let mut file = File::create(&tmp)?;
            file.write_all(compressed)?;
            file.sync_all()?;
            fs::rename(&tmp, path)?;
            Ok(())
        })();

        if result.is_err() {
            if let Err(e) = fs::remove_file(&tmp) {
                if e.kind() != std::io::ErrorKind::NotFound {
                    warn!(tmp = %tmp.display(), error = %e, "failed to unlink temp object file");
                }
            }
        }
        result
    }

    /// Invalidate the object-listing cache.
    fn invalidate_list_cache(&self) {
        *self.list_cache.lock().expect("cache mutex poisoned") = None;
    }

    /// Enumerate the fanout directories on disk.
    fn scan_objects(&self) -> StoreResult<Vec<ObjectId>> {
        let mut ids = Vec::new();
        for prefix_entry in fs::read_dir(&self.objects_dir)? {
            let prefix_entry = prefix_entry?;
            if !prefix_entry.file_type()?.is_dir() {
                continue;
            }
            let prefix = prefix_entry.file_name();
            let Some(prefix) = prefix.to_str() else {
                continue;
            };
            if prefix.len() != 2 {
                continue;
            }
            for object_entry in fs::read_dir(prefix_entry.path())? {
                let object_entry = object_entry?;
                let name = object_entry.file_name();
                let Some(name) = name.to_str() else {
                    continue;
                };
                // Skip in-flight temp files and anything else that is not
                // a 62-hex-char remainder.
                match ObjectId::from_hex(&format!("{prefix}{name}")) {
                    Ok(id) => ids.push(id),
                    Err(_) => continue,
                }
            }
        }
        ids.sort();
        Ok(ids)
    }
}

impl ObjectStore for FsObjectStore {
    fn read(&self, id: &ObjectId) -> StoreResult<Option<StorageObject>> {
        let Some(bytes) = self.read_raw(id)? else {
            return Ok(None);
        };
        Ok(Some(StorageObject::decode(*id, &bytes)?))
    }

    fn write(&self, object: &StorageObject) -> StoreResult<ObjectId> {
        let id = object.id();
        if id.is_null() {
            return Err(StoreError::NullObjectId);
        }
        let path = self.object_path(&id);

        // Dedup: if the object file already exists, return the existing
        // hash without rewriting or recompressing.
        if path.exists() {
            debug!(id = %id.short_hex(), "object already stored, skipping write");
            return Ok(id);
        }

        let serialized = object.serialize();
        let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(&serialized)?;
        let compressed = encoder.finish()?;

        self.write_atomic(&path, &compressed)?;
        self.invalidate_list_cache();
        debug!(
            id = %id.short_hex(),
            kind = %object.kind(),
            size = serialized.len(),
            compressed = compressed.len(),
            "object stored"
        );
        Ok(id)
    }

    fn exists(&self, id: &ObjectId) -> StoreResult<bool> {
        Ok(self.object_path(id).exists())
    }

    fn delete(&self, id: &ObjectId) -> StoreResult<bool> {
        let path = self.object_path(id);
        match fs::remove_file(&path) {
            Ok(()) => {
                self.invalidate_list_cache();
                Ok(true)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    fn list(&self) -> StoreResult<Vec<ObjectId>> {
        {
            let cache = self.list_cache.lock().expect("cache mutex poisoned");
            if let Some(cached) = cache.as_ref() {
                if cached.taken_at.elapsed() < LIST_CACHE_TTL {
                    return Ok(cached.ids.clone());
                }
            }
        }

        let ids = self.scan_objects()?;
        let mut cache = self.list_cache.lock().expect("cache mutex poisoned");
        *cache = Some(ListCache {
            taken_at: Instant::now(),
            ids: ids.clone(),
        });
        Ok(ids)
    }

    fn stats(&self) -> StoreResult<StoreStats> {
        let ids = self.list()?;
        let mut stats = StoreStats::default();
        let mut compressed_total: u64 = 0;

        for id in &ids {
            let path = self.object_path(id);
            let compressed_size = match fs::metadata(&path) {
                Ok(meta) => meta.len(),
                // Raced with a concurrent delete; skip.
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => continue,
                Err(e) => return Err(e.into()),
            };
            let bytes = match self.read_raw(id)? {
                Some(b) => b,
                None => continue,
            };
            // Per-entry corruption is warn-and-skip during aggregation;
            // readObject on the same hash still reports it as a hard error.
            let object = match StorageObject::decode(*id, &bytes) {
                Ok(o) => o,
                Err(e) => {
                    warn!(id = %id.short_hex(), error = %e, "skipping corrupt object in stats");
                    continue;
                }
            };
            stats.total_objects += 1;
            stats.total_size += object.size();
            compressed_total += compressed_size;
            match object.kind() {
                ObjectKind::Blob => stats.blob_count += 1,
                ObjectKind::Tree => stats.tree_count += 1,
                ObjectKind::Commit => stats.commit_count += 1,
            }
        }

        stats.compression_ratio = if stats.total_size == 0 {
            1.0
        } else {
            compressed_total as f64 / stats.total_size as f64
        };
        Ok(stats)
    }
}

impl std::fmt::Debug for FsObjectStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FsObjectStore")
            .field("objects_dir", &self.objects_dir)
            .finish()
    }
}
