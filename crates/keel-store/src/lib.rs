//! Content-addressed object storage for the Keel checkpoint engine.
//!
//! This crate implements a hash-keyed object store analogous to git's
//! `.git/objects/` directory. Every piece of checkpoint data -- file
//! contents, directory listings, commits -- is stored as an immutable
//! object identified by the SHA-256 hash of its serialized form
//! (`"<type> <body-length>\0<body>"`).
//!
//! # Object Types
//!
//! - [`Blob`] -- raw file content (binary-safe)
//! - [`Tree`] -- directory listing mapping names to object references
//! - [`Commit`] -- checkpoint metadata with linear (single-parent) history
//!
//! # Storage Backends
//!
//! All backends implement the [`ObjectStore`] trait:
//!
//! - [`InMemoryObjectStore`] -- `HashMap`-based store for tests and embedding
//! - [`FsObjectStore`] -- gzip-compressed fanout directory layout with
//!   atomic temp-file-rename writes
//!
//! # Design Rules
//!
//! 1. Objects are immutable once written (content-addressing guarantees this).
//! 2. Writes are idempotent: existing content is never rewritten.
//! 3. A missing object is `Ok(None)`; corruption is always a hard error.
//! 4. Atomic rename is the sole write-ordering primitive.

pub mod error;
pub mod fs;
pub mod memory;
pub mod object;
pub mod traits;

// Re-export primary types at crate root for ergonomic imports.
pub use error::{StoreError, StoreResult};
pub use fs::FsObjectStore;
pub use memory::InMemoryObjectStore;
pub use object::{Blob, Commit, ObjectKind, StorageObject, Tree, TreeEntry};
pub use traits::{ObjectStore, StoreStats};
