use std::time::Duration;

use keel_retry::RetryError;
use keel_types::ObjectId;
use thiserror::Error;

/// Errors surfaced by checkpoint operations.
#[derive(Debug, Error)]
pub enum EngineError {
    /// No checkpoint with this id exists.
    #[error("checkpoint not found: {0}")]
    CheckpointNotFound(ObjectId),

    /// No checkpoints have been created yet.
    #[error("no checkpoints exist for this project")]
    EmptyHistory,

    /// An object referenced by hash does not exist in the store.
    #[error("object not found: {0}")]
    ObjectNotFound(ObjectId),

    /// Deleting anything but the newest checkpoint would break the linear
    /// history.
    #[error("checkpoint {0} is not the latest; only the latest checkpoint can be deleted")]
    NotLatest(ObjectId),

    /// The requested path does not exist in the checkpoint's tree.
    #[error("path '{path}' not found in checkpoint {checkpoint}")]
    PathNotFound { path: String, checkpoint: ObjectId },

    /// The HEAD ref file held something other than a checkpoint hash.
    #[error("invalid HEAD ref: {0}")]
    InvalidHead(String),

    /// Retries were exhausted without success.
    #[error("operation '{name}' failed after {attempts} attempts: {source}")]
    RetryExhausted {
        name: String,
        attempts: u32,
        #[source]
        source: Box<EngineError>,
    },

    /// The circuit breaker rejected the operation without running it.
    #[error("operation rejected, circuit open for '{key}' (retry in {cooldown_remaining:?})")]
    CircuitOpen {
        key: String,
        cooldown_remaining: Duration,
    },

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error(transparent)]
    Types(#[from] keel_types::TypeError),

    #[error(transparent)]
    Store(#[from] keel_store::StoreError),

    #[error(transparent)]
    Snapshot(#[from] keel_snapshot::SnapshotError),

    #[error(transparent)]
    Txn(#[from] keel_txn::TxnError),

    #[error(transparent)]
    Diff(#[from] keel_diff::DiffError),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl EngineError {
    /// Collapse a retry-layer error into an engine error. Non-retryable
    /// failures pass through untouched so callers see the original cause.
    pub(crate) fn from_retry(err: RetryError<EngineError>) -> Self {
        match err {
            RetryError::NonRetryable { cause, .. } => cause,
            RetryError::Exhausted {
                name,
                attempts,
                cause,
            } => Self::RetryExhausted {
                name,
                attempts,
                source: Box::new(cause),
            },
            RetryError::CircuitOpen {
                key,
                cooldown_remaining,
            } => Self::CircuitOpen {
                key,
                cooldown_remaining,
            },
        }
    }
}

pub type EngineResult<T> = Result<T, EngineError>;
