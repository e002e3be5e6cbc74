//! The Keel checkpoint engine.
//!
//! Ties the lower layers together into the operation surface a desktop
//! tool calls: create a checkpoint of a project directory, browse history,
//! inspect and diff files, restore earlier states, and garbage-collect the
//! object store. Persistent state lives under `<project>/.keel`.
//!
//! Mutating operations are journaled ([`keel_txn`]) so a crash rolls back
//! cleanly, and retried ([`keel_retry`]) so transient filesystem errors do
//! not fail a checkpoint.

pub mod checkpoint;
pub mod config;
pub mod error;
pub mod manager;

pub use checkpoint::{CheckpointInfo, FileEntry, GcReport, RestoreSummary, StorageReport};
pub use config::{AuthorConfig, EngineConfig};
pub use error::{EngineError, EngineResult};
pub use manager::CheckpointManager;
