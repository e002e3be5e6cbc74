use std::time::Duration;

use thiserror::Error;

/// Errors from retried operations.
///
/// `E` is the wrapped operation's own error type.
#[derive(Debug, Error)]
pub enum RetryError<E: std::fmt::Display> {
    /// Every attempt failed with a retryable error and the attempt budget
    /// is exhausted.
    #[error("operation '{name}' failed after {attempts} attempts: {cause}")]
    Exhausted {
        name: String,
        attempts: u32,
        cause: E,
    },

    /// The operation failed with an error outside the transient pattern
    /// set; retrying stopped immediately.
    #[error("operation '{name}' failed with non-retryable error on attempt {attempts}: {cause}")]
    NonRetryable {
        name: String,
        attempts: u32,
        cause: E,
    },

    /// The circuit breaker for this operation key is open; the operation
    /// was not invoked at all.
    #[error("circuit breaker open for '{key}'; retry after {cooldown_remaining:?}")]
    CircuitOpen {
        key: String,
        cooldown_remaining: Duration,
    },
}

impl<E: std::fmt::Display> RetryError<E> {
    /// The underlying operation error, if the operation ran at all.
    pub fn source_error(&self) -> Option<&E> {
        match self {
            Self::Exhausted { cause, .. } | Self::NonRetryable { cause, .. } => Some(cause),
            Self::CircuitOpen { .. } => None,
        }
    }
}

/// Result alias for retried operations.
pub type RetryResult<T, E> = Result<T, RetryError<E>>;
