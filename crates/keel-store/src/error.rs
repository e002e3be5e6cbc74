use keel_types::ObjectId;

/// Errors from object store operations.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// The object data is malformed: bad header, missing NUL delimiter,
    /// or a declared size that does not match the actual body length.
    /// Always a hard error, never retried.
    #[error("corrupt object {id}: {reason}")]
    CorruptObject { id: ObjectId, reason: String },

    /// Content hash mismatch on verification (data corruption).
    #[error("hash mismatch for {expected}: computed {computed}")]
    HashMismatch {
        expected: ObjectId,
        computed: ObjectId,
    },

    /// The record being decoded is not the expected object kind.
    #[error("object kind mismatch: expected {expected}, got {actual}")]
    KindMismatch {
        expected: &'static str,
        actual: &'static str,
    },

    /// I/O error from the underlying storage backend.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Attempted to write a null object ID.
    #[error("cannot store object with null ID")]
    NullObjectId,
}

/// Result alias for store operations.
pub type StoreResult<T> = Result<T, StoreError>;
