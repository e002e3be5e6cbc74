//! Retry orchestration for checkpoint operations.
//!
//! Filesystem and storage calls inside a checkpoint engine fail transiently
//! under load (busy files, descriptor exhaustion, slow disks). This crate
//! wraps such calls in exponential backoff with jitter, classifies errors
//! as transient or permanent by message pattern, and guards each operation
//! key with a circuit breaker so a persistently failing resource fails fast
//! instead of burning full retry cycles.
//!
//! The entry point is [`RetryManager::execute`].

pub mod backoff;
pub mod breaker;
pub mod error;
pub mod manager;

pub use backoff::RetryOptions;
pub use breaker::{BreakerConfig, BreakerState, CircuitBreaker};
pub use error::{RetryError, RetryResult};
pub use manager::{
    MetricsReport, OperationMetric, RetryManager, RetryOutcome, DEFAULT_TRANSIENT_PATTERNS,
};
