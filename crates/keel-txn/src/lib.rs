//! Journaled transactions for multi-step checkpoint operations.
//!
//! A checkpoint touches many files; a crash partway through must not leave
//! the store half-written. Every mutating step is recorded in a per-
//! transaction JSON journal before or alongside the change, with enough
//! prior state to undo it. On failure the journal replays in reverse; on
//! startup [`TransactionManager::recover`] rolls back anything a previous
//! process left unfinished.

pub mod error;
pub mod manager;
pub mod types;

pub use error::{TxnError, TxnResult};
pub use manager::{CleanupHandle, RecoveryReport, TransactionManager, TxnConfig};
pub use types::{RollbackData, TransactionOperation, TransactionSnapshot, TransactionState};
