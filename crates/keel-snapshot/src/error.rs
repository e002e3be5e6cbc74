use thiserror::Error;

/// Errors produced while capturing a directory tree.
#[derive(Debug, Error)]
pub enum SnapshotError {
    /// The snapshot root itself is missing or not a directory. Problems
    /// below the root are skipped with a warning instead.
    #[error("snapshot root {0} is not a readable directory")]
    InvalidRoot(String),

    #[error(transparent)]
    Store(#[from] keel_store::StoreError),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

pub type SnapshotResult<T> = Result<T, SnapshotError>;
