//! Directory capture: turn a live project directory into tree and blob
//! objects in the store.
//!
//! [`TreeBuilder`] walks a directory depth-first, storing file contents as
//! blobs and directory listings as trees, honoring gitignore-style exclude
//! patterns. Capture is forgiving by design: unreadable or oversized
//! entries are skipped with a warning and empty directories vanish from
//! their parent, so the resulting tree reflects what could actually be
//! tracked.

pub mod builder;
pub mod error;
pub mod ignore;

pub use builder::{SnapshotConfig, TreeBuilder, TreeSummary};
pub use error::{SnapshotError, SnapshotResult};
pub use ignore::IgnoreMatcher;
