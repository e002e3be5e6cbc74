use thiserror::Error;

/// Errors produced by the transaction layer.
#[derive(Debug, Error)]
pub enum TxnError {
    /// Operation attempted against a transaction in the wrong state.
    #[error("transaction {id} is {state}, expected {expected}")]
    InvalidState {
        id: String,
        state: String,
        expected: String,
    },

    /// No journal entry exists for the given transaction id.
    #[error("unknown transaction: {0}")]
    UnknownTransaction(String),

    /// A journal file could not be parsed.
    #[error("corrupt journal entry at {path}: {reason}")]
    CorruptJournal { path: String, reason: String },

    /// One or more operations failed to roll back. The transaction is still
    /// marked rolled-back; the listed operations need manual attention.
    #[error("rollback of transaction {id} left {failures:?} unreverted")]
    RollbackIncomplete { id: String, failures: Vec<String> },

    #[error("journal serialization failed: {0}")]
    Serde(#[from] serde_json::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

pub type TxnResult<T> = Result<T, TxnError>;
