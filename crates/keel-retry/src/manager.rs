use std::collections::{HashMap, VecDeque};
use std::future::Future;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use tracing::{debug, warn};

use crate::backoff::{delay_for_attempt, jittered, RetryOptions};
use crate::breaker::{BreakerConfig, BreakerState, CircuitBreaker};
use crate::error::{RetryError, RetryResult};

/// Error message substrings treated as transient by default.
///
/// These match the OS/network failure signatures a checkpoint operation can
/// reasonably survive by waiting: file busy, descriptor exhaustion, timeouts
/// and the like. Corruption and state-violation errors deliberately do not
/// match any of these.
pub const DEFAULT_TRANSIENT_PATTERNS: &[&str] = &[
    "ebusy",
    "enoent",
    "emfile",
    "eagain",
    "etimedout",
    "eio",
    "network",
    "timeout",
    "temporary",
];

/// The outcome of a successfully retried operation.
#[derive(Clone, Copy, Debug)]
pub struct RetryOutcome<T> {
    /// The operation's result.
    pub result: T,
    /// Attempts made, including the successful one.
    pub attempts: u32,
    /// Wall time across all attempts and backoff sleeps.
    pub total_time: Duration,
    /// `true` if more than one attempt was needed.
    pub had_retries: bool,
}

/// One entry in the bounded performance-metrics ring.
#[derive(Clone, Debug)]
pub struct OperationMetric {
    pub name: String,
    pub attempts: u32,
    pub total_time: Duration,
    pub success: bool,
}

/// Aggregate view over the metrics ring.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct MetricsReport {
    pub operations: u64,
    pub successes: u64,
    pub success_rate: f64,
    pub average_attempts: f64,
    pub average_duration: Duration,
}

/// Maximum retained metric entries.
const METRICS_CAP: usize = 1000;

/// Retry service: exponential backoff with jitter plus a per-key circuit
/// breaker.
///
/// One `RetryManager` is an explicitly owned service object -- callers
/// construct and inject it rather than sharing a process global, so tests
/// get isolated breaker state. Breaker keys are `name` or `name-{context}`
/// when the caller supplies a context; the manager itself takes no position
/// on whether contexts carry project identity (see DESIGN.md).
pub struct RetryManager {
    breaker_config: BreakerConfig,
    breakers: Mutex<HashMap<String, CircuitBreaker>>,
    metrics: Mutex<VecDeque<OperationMetric>>,
    transient_patterns: Vec<String>,
}

impl RetryManager {
    /// Create a manager with default breaker tuning and transient patterns.
    pub fn new() -> Self {
        Self::with_breaker_config(BreakerConfig::default())
    }

    /// Create a manager with custom breaker tuning (tests shrink the
    /// cooldown).
    pub fn with_breaker_config(breaker_config: BreakerConfig) -> Self {
        Self {
            breaker_config,
            breakers: Mutex::new(HashMap::new()),
            metrics: Mutex::new(VecDeque::new()),
            transient_patterns: DEFAULT_TRANSIENT_PATTERNS
                .iter()
                .map(|s| s.to_string())
                .collect(),
        }
    }

    /// Replace the transient-error pattern set.
    pub fn with_transient_patterns(mut self, patterns: Vec<String>) -> Self {
        self.transient_patterns = patterns.into_iter().map(|p| p.to_lowercase()).collect();
        self
    }

    /// Whether an error matches the transient pattern set.
    pub fn is_retryable_error(&self, error: &impl std::fmt::Display) -> bool {
        let message = error.to_string().to_lowercase();
        self.transient_patterns.iter().any(|p| message.contains(p))
    }

    /// Run `operation` with retry, backoff, and circuit breaking.
    ///
    /// The breaker key is `name`, or `name-{context}` when a context is
    /// supplied. If the key's breaker is open and its cooldown has not
    /// elapsed, this fails immediately without invoking `operation` at all.
    pub async fn execute<T, E, F, Fut>(
        &self,
        name: &str,
        context: Option<&str>,
        options: &RetryOptions,
        mut operation: F,
    ) -> RetryResult<RetryOutcome<T>, E>
    where
        E: std::fmt::Display,
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let key = match context {
            Some(ctx) => format!("{name}-{ctx}"),
            None => name.to_string(),
        };

        if let Some(remaining) = self.check_breaker(&key) {
            warn!(key = %key, remaining = ?remaining, "circuit open, failing fast");
            return Err(RetryError::CircuitOpen {
                key,
                cooldown_remaining: remaining,
            });
        }

        let started = Instant::now();
        let max_attempts = options.max_attempts.max(1);
        let mut attempt = 1u32;

        loop {
            match operation().await {
                Ok(result) => {
                    self.record_breaker_success(&key);
                    let total_time = started.elapsed();
                    self.push_metric(OperationMetric {
                        name: name.to_string(),
                        attempts: attempt,
                        total_time,
                        success: true,
                    });
                    return Ok(RetryOutcome {
                        result,
                        attempts: attempt,
                        total_time,
                        had_retries: attempt > 1,
                    });
                }
                Err(error) => {
                    self.record_breaker_failure(&key);
                    let retryable = self.is_retryable_error(&error);

                    if !retryable {
                        self.push_metric(OperationMetric {
                            name: name.to_string(),
                            attempts: attempt,
                            total_time: started.elapsed(),
                            success: false,
                        });
                        return Err(RetryError::NonRetryable {
                            name: name.to_string(),
                            attempts: attempt,
                            cause: error,
                        });
                    }
                    if attempt >= max_attempts {
                        self.push_metric(OperationMetric {
                            name: name.to_string(),
                            attempts: attempt,
                            total_time: started.elapsed(),
                            success: false,
                        });
                        return Err(RetryError::Exhausted {
                            name: name.to_string(),
                            attempts: attempt,
                            cause: error,
                        });
                    }

                    let mut delay = delay_for_attempt(options, attempt);
                    if options.jitter {
                        delay = jittered(delay);
                    }
                    debug!(
                        operation = name,
                        attempt,
                        delay = ?delay,
                        error = %error,
                        "transient failure, retrying"
                    );
                    if !delay.is_zero() {
                        tokio::time::sleep(delay).await;
                    }
                    attempt += 1;
                }
            }
        }
    }

    /// Returns the remaining cooldown if the key's breaker rejects entry.
    fn check_breaker(&self, key: &str) -> Option<Duration> {
        let mut breakers = self.breakers.lock().expect("breaker mutex poisoned");
        let breaker = breakers.entry(key.to_string()).or_default();
        match breaker.state() {
            BreakerState::Open => breaker.cooldown_remaining().or(Some(Duration::ZERO)),
            BreakerState::Closed => None,
            // Half-open admits exactly one caller as the trial; anyone
            // racing it fails fast until the trial resolves.
            BreakerState::HalfOpen => {
                if breaker.begin_trial() {
                    None
                } else {
                    Some(Duration::ZERO)
                }
            }
        }
    }

    fn record_breaker_success(&self, key: &str) {
        let mut breakers = self.breakers.lock().expect("breaker mutex poisoned");
        breakers.entry(key.to_string()).or_default().record_success();
    }

    fn record_breaker_failure(&self, key: &str) {
        let mut breakers = self.breakers.lock().expect("breaker mutex poisoned");
        let breaker = breakers.entry(key.to_string()).or_default();
        breaker.record_failure(&self.breaker_config);
        if breaker.state() == BreakerState::Open {
            warn!(key, failures = breaker.failures(), "circuit breaker opened");
        }
    }

    fn push_metric(&self, metric: OperationMetric) {
        let mut ring = self.metrics.lock().expect("metrics mutex poisoned");
        if ring.len() == METRICS_CAP {
            ring.pop_front();
        }
        ring.push_back(metric);
    }

    /// Snapshot of the raw metrics ring (oldest first).
    pub fn metrics(&self) -> Vec<OperationMetric> {
        self.metrics
            .lock()
            .expect("metrics mutex poisoned")
            .iter()
            .cloned()
            .collect()
    }

    /// Aggregate report over the metrics ring.
    pub fn metrics_report(&self) -> MetricsReport {
        let ring = self.metrics.lock().expect("metrics mutex poisoned");
        let operations = ring.len() as u64;
        if operations == 0 {
            return MetricsReport::default();
        }
        let successes = ring.iter().filter(|m| m.success).count() as u64;
        let total_attempts: u64 = ring.iter().map(|m| m.attempts as u64).sum();
        let total_duration: Duration = ring.iter().map(|m| m.total_time).sum();
        MetricsReport {
            operations,
            successes,
            success_rate: successes as f64 / operations as f64,
            average_attempts: total_attempts as f64 / operations as f64,
            average_duration: total_duration / operations as u32,
        }
    }
}

impl Default for RetryManager {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for RetryManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let breakers = self.breakers.lock().expect("breaker mutex poisoned").len();
        f.debug_struct("RetryManager")
            .field("breaker_keys", &breakers)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    fn fast_manager() -> RetryManager {
        RetryManager::with_breaker_config(BreakerConfig {
            failure_threshold: 5,
            cooldown: Duration::from_millis(50),
        })
    }

    #[tokio::test]
    async fn success_on_first_attempt() {
        let manager = fast_manager();
        let outcome = manager
            .execute("op", None, &RetryOptions::immediate(3), || async {
                Ok::<_, String>(42)
            })
            .await
            .unwrap();
        assert_eq!(outcome.result, 42);
        assert_eq!(outcome.attempts, 1);
        assert!(!outcome.had_retries);
    }

    #[tokio::test]
    async fn retries_transient_errors_until_success() {
        let manager = fast_manager();
        let calls = Arc::new(AtomicU32::new(0));
        let calls_in = calls.clone();

        let outcome = manager
            .execute("flaky", None, &RetryOptions::immediate(5), move || {
                let calls = calls_in.clone();
                async move {
                    if calls.fetch_add(1, Ordering::SeqCst) < 2 {
                        Err("EBUSY: resource busy".to_string())
                    } else {
                        Ok("done")
                    }
                }
            })
            .await
            .unwrap();

        assert_eq!(outcome.result, "done");
        assert_eq!(outcome.attempts, 3);
        assert!(outcome.had_retries);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn exhaustion_reports_attempt_count() {
        let manager = fast_manager();
        let err = manager
            .execute("always-busy", None, &RetryOptions::immediate(3), || async {
                Err::<(), _>("ETIMEDOUT: timed out".to_string())
            })
            .await
            .unwrap_err();
        match err {
            RetryError::Exhausted { attempts, .. } => assert_eq!(attempts, 3),
            other => panic!("expected Exhausted, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn non_retryable_stops_immediately() {
        let manager = fast_manager();
        let calls = Arc::new(AtomicU32::new(0));
        let calls_in = calls.clone();

        let err = manager
            .execute("corrupt", None, &RetryOptions::immediate(5), move || {
                let calls = calls_in.clone();
                async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Err::<(), _>("corrupt object deadbeef: size mismatch".to_string())
                }
            })
            .await
            .unwrap_err();

        assert!(matches!(err, RetryError::NonRetryable { attempts: 1, .. }));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn breaker_fails_fast_after_threshold() {
        let manager = fast_manager();
        // Five failing calls (one attempt each) trip the breaker.
        for _ in 0..5 {
            let _ = manager
                .execute("doomed", None, &RetryOptions::immediate(1), || async {
                    Err::<(), _>("EIO: input/output error".to_string())
                })
                .await;
        }

        let calls = Arc::new(AtomicU32::new(0));
        let calls_in = calls.clone();
        let err = manager
            .execute("doomed", None, &RetryOptions::immediate(1), move || {
                let calls = calls_in.clone();
                async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Ok::<_, String>(())
                }
            })
            .await
            .unwrap_err();

        // The sixth call must fail without invoking the operation.
        assert!(matches!(err, RetryError::CircuitOpen { .. }));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn breaker_recovers_after_cooldown() {
        let manager = fast_manager();
        for _ in 0..5 {
            let _ = manager
                .execute("recovering", None, &RetryOptions::immediate(1), || async {
                    Err::<(), _>("EAGAIN: try again".to_string())
                })
                .await;
        }
        tokio::time::sleep(Duration::from_millis(60)).await;

        // Half-open admits one trial; success closes the breaker.
        let outcome = manager
            .execute("recovering", None, &RetryOptions::immediate(1), || async {
                Ok::<_, String>("back")
            })
            .await
            .unwrap();
        assert_eq!(outcome.result, "back");

        // Fully closed again.
        let outcome = manager
            .execute("recovering", None, &RetryOptions::immediate(1), || async {
                Ok::<_, String>("still up")
            })
            .await
            .unwrap();
        assert_eq!(outcome.result, "still up");
    }

    #[tokio::test]
    async fn half_open_admits_one_concurrent_trial() {
        let manager = Arc::new(fast_manager());
        for _ in 0..5 {
            let _ = manager
                .execute("latched", None, &RetryOptions::immediate(1), || async {
                    Err::<(), _>("EIO: input/output error".to_string())
                })
                .await;
        }
        tokio::time::sleep(Duration::from_millis(60)).await;

        // Park the first half-open caller inside its operation.
        let (entered_tx, entered_rx) = tokio::sync::oneshot::channel::<()>();
        let (release_tx, release_rx) = tokio::sync::oneshot::channel::<()>();
        let entered_tx = Arc::new(std::sync::Mutex::new(Some(entered_tx)));
        let release_rx = Arc::new(tokio::sync::Mutex::new(Some(release_rx)));
        let trial_manager = manager.clone();
        let trial = tokio::spawn(async move {
            trial_manager
                .execute("latched", None, &RetryOptions::immediate(1), move || {
                    let entered_tx = entered_tx.clone();
                    let release_rx = release_rx.clone();
                    async move {
                        if let Some(tx) = entered_tx.lock().unwrap().take() {
                            let _ = tx.send(());
                        }
                        if let Some(rx) = release_rx.lock().await.take() {
                            let _ = rx.await;
                        }
                        Ok::<_, String>("trial")
                    }
                })
                .await
        });
        entered_rx.await.unwrap();

        // While the trial is in flight, other callers fail fast.
        let err = manager
            .execute("latched", None, &RetryOptions::immediate(1), || async {
                Ok::<_, String>("second")
            })
            .await
            .unwrap_err();
        assert!(matches!(err, RetryError::CircuitOpen { .. }));

        release_tx.send(()).unwrap();
        let outcome = trial.await.unwrap().unwrap();
        assert_eq!(outcome.result, "trial");

        // The trial's success closed the breaker for everyone.
        let outcome = manager
            .execute("latched", None, &RetryOptions::immediate(1), || async {
                Ok::<_, String>("after")
            })
            .await
            .unwrap();
        assert_eq!(outcome.result, "after");
    }

    #[tokio::test]
    async fn context_scopes_breaker_keys() {
        let manager = fast_manager();
        for _ in 0..5 {
            let _ = manager
                .execute("shared-op", Some("/project/a"), &RetryOptions::immediate(1), || async {
                    Err::<(), _>("EBUSY".to_string())
                })
                .await;
        }

        // Same operation name under a different context is unaffected.
        let outcome = manager
            .execute("shared-op", Some("/project/b"), &RetryOptions::immediate(1), || async {
                Ok::<_, String>(1)
            })
            .await
            .unwrap();
        assert_eq!(outcome.result, 1);

        // The tripped context fails fast.
        let err = manager
            .execute("shared-op", Some("/project/a"), &RetryOptions::immediate(1), || async {
                Ok::<_, String>(1)
            })
            .await
            .unwrap_err();
        assert!(matches!(err, RetryError::CircuitOpen { .. }));
    }

    #[tokio::test]
    async fn metrics_ring_is_bounded() {
        let manager = fast_manager();
        for _ in 0..(METRICS_CAP + 50) {
            let _ = manager
                .execute("noisy", None, &RetryOptions::immediate(1), || async {
                    Ok::<_, String>(())
                })
                .await;
        }
        assert_eq!(manager.metrics().len(), METRICS_CAP);
    }

    #[tokio::test]
    async fn metrics_report_aggregates() {
        let manager = fast_manager();
        let _ = manager
            .execute("mixed", None, &RetryOptions::immediate(1), || async {
                Ok::<_, String>(())
            })
            .await;
        let _ = manager
            .execute("mixed", None, &RetryOptions::immediate(1), || async {
                Err::<(), _>("EBUSY".to_string())
            })
            .await;

        let report = manager.metrics_report();
        assert_eq!(report.operations, 2);
        assert_eq!(report.successes, 1);
        assert!((report.success_rate - 0.5).abs() < f64::EPSILON);
    }

    #[test]
    fn default_patterns_classify() {
        let manager = RetryManager::new();
        assert!(manager.is_retryable_error(&"EBUSY: resource busy"));
        assert!(manager.is_retryable_error(&"connection timeout"));
        assert!(manager.is_retryable_error(&"temporary failure in name resolution"));
        assert!(!manager.is_retryable_error(&"corrupt object: size mismatch"));
        assert!(!manager.is_retryable_error(&"permission denied"));
    }
}
