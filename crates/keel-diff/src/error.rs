use keel_types::ObjectId;

/// Errors that can occur while computing diffs.
#[derive(Debug, thiserror::Error)]
pub enum DiffError {
    /// An object referenced by a tree was missing from the store.
    #[error("object not found: {0}")]
    ObjectNotFound(ObjectId),

    #[error(transparent)]
    Store(#[from] keel_store::StoreError),
}

pub type DiffResult<T> = Result<T, DiffError>;
