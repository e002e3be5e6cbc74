use std::time::{Duration, Instant};

/// Circuit breaker state for one operation key.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BreakerState {
    /// Operations flow normally.
    Closed,
    /// Operations fail fast until the cooldown elapses.
    Open,
    /// One trial operation is allowed through.
    HalfOpen,
}

/// Breaker tuning knobs.
#[derive(Clone, Copy, Debug)]
pub struct BreakerConfig {
    /// Consecutive failures before the breaker opens.
    pub failure_threshold: u32,
    /// How long an open breaker rejects before allowing a trial.
    pub cooldown: Duration,
}

impl Default for BreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            cooldown: Duration::from_secs(60),
        }
    }
}

/// Per-key circuit breaker.
///
/// Transitions: `Closed -> Open` after `failure_threshold` consecutive
/// failures; `Open -> HalfOpen` once the cooldown elapses (exactly one
/// trial); trial success resets to `Closed` with the failure count zeroed;
/// trial failure returns to `Open` with a fresh cooldown.
#[derive(Debug)]
pub struct CircuitBreaker {
    state: BreakerState,
    failures: u32,
    last_failure: Option<Instant>,
    next_attempt: Option<Instant>,
    trial_in_flight: bool,
}

impl CircuitBreaker {
    pub fn new() -> Self {
        Self {
            state: BreakerState::Closed,
            failures: 0,
            last_failure: None,
            next_attempt: None,
            trial_in_flight: false,
        }
    }

    /// Current state (transitioning `Open -> HalfOpen` if the cooldown
    /// has elapsed).
    pub fn state(&mut self) -> BreakerState {
        if self.state == BreakerState::Open {
            if let Some(next) = self.next_attempt {
                if Instant::now() >= next {
                    self.state = BreakerState::HalfOpen;
                }
            }
        }
        self.state
    }

    /// Remaining cooldown if the breaker is rejecting, else `None`.
    pub fn cooldown_remaining(&self) -> Option<Duration> {
        match self.state {
            BreakerState::Open => self
                .next_attempt
                .map(|next| next.saturating_duration_since(Instant::now())),
            _ => None,
        }
    }

    /// Consecutive failure count.
    pub fn failures(&self) -> u32 {
        self.failures
    }

    /// Claim the half-open trial slot.
    ///
    /// Returns `false` if the breaker is not half-open or another caller
    /// already holds the slot, so concurrent callers during half-open
    /// still see exactly one trial go through.
    pub fn begin_trial(&mut self) -> bool {
        if self.state == BreakerState::HalfOpen && !self.trial_in_flight {
            self.trial_in_flight = true;
            true
        } else {
            false
        }
    }

    /// Record a successful operation: any state resets to `Closed`.
    pub fn record_success(&mut self) {
        self.state = BreakerState::Closed;
        self.failures = 0;
        self.last_failure = None;
        self.next_attempt = None;
        self.trial_in_flight = false;
    }

    /// Record a failed operation.
    pub fn record_failure(&mut self, config: &BreakerConfig) {
        self.failures += 1;
        self.last_failure = Some(Instant::now());
        self.trial_in_flight = false;
        match self.state {
            // A failed half-open trial reopens with a fresh cooldown.
            BreakerState::HalfOpen => {
                self.state = BreakerState::Open;
                self.next_attempt = Some(Instant::now() + config.cooldown);
            }
            BreakerState::Closed if self.failures >= config.failure_threshold => {
                self.state = BreakerState::Open;
                self.next_attempt = Some(Instant::now() + config.cooldown);
            }
            _ => {}
        }
    }
}

impl Default for CircuitBreaker {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fast_config() -> BreakerConfig {
        BreakerConfig {
            failure_threshold: 5,
            cooldown: Duration::from_millis(20),
        }
    }

    #[test]
    fn stays_closed_below_threshold() {
        let config = fast_config();
        let mut breaker = CircuitBreaker::new();
        for _ in 0..4 {
            breaker.record_failure(&config);
        }
        assert_eq!(breaker.state(), BreakerState::Closed);
    }

    #[test]
    fn opens_at_threshold() {
        let config = fast_config();
        let mut breaker = CircuitBreaker::new();
        for _ in 0..5 {
            breaker.record_failure(&config);
        }
        assert_eq!(breaker.state(), BreakerState::Open);
        assert!(breaker.cooldown_remaining().is_some());
    }

    #[test]
    fn half_open_after_cooldown() {
        let config = fast_config();
        let mut breaker = CircuitBreaker::new();
        for _ in 0..5 {
            breaker.record_failure(&config);
        }
        std::thread::sleep(Duration::from_millis(25));
        assert_eq!(breaker.state(), BreakerState::HalfOpen);
    }

    #[test]
    fn trial_success_closes_and_zeroes() {
        let config = fast_config();
        let mut breaker = CircuitBreaker::new();
        for _ in 0..5 {
            breaker.record_failure(&config);
        }
        std::thread::sleep(Duration::from_millis(25));
        assert_eq!(breaker.state(), BreakerState::HalfOpen);
        breaker.record_success();
        assert_eq!(breaker.state(), BreakerState::Closed);
        assert_eq!(breaker.failures(), 0);
    }

    #[test]
    fn trial_failure_reopens() {
        let config = fast_config();
        let mut breaker = CircuitBreaker::new();
        for _ in 0..5 {
            breaker.record_failure(&config);
        }
        std::thread::sleep(Duration::from_millis(25));
        assert_eq!(breaker.state(), BreakerState::HalfOpen);
        breaker.record_failure(&config);
        assert_eq!(breaker.state(), BreakerState::Open);
        assert!(breaker.cooldown_remaining().unwrap() > Duration::ZERO);
    }

    #[test]
    fn half_open_trial_slot_is_exclusive() {
        let config = fast_config();
        let mut breaker = CircuitBreaker::new();
        for _ in 0..5 {
            breaker.record_failure(&config);
        }
        std::thread::sleep(Duration::from_millis(25));
        assert_eq!(breaker.state(), BreakerState::HalfOpen);
        assert!(breaker.begin_trial());
        assert!(!breaker.begin_trial());
        breaker.record_success();
        assert_eq!(breaker.state(), BreakerState::Closed);
        // Closed breakers hand out no trial slot.
        assert!(!breaker.begin_trial());
    }

    #[test]
    fn failed_trial_frees_the_slot_for_the_next_cooldown() {
        let config = fast_config();
        let mut breaker = CircuitBreaker::new();
        for _ in 0..5 {
            breaker.record_failure(&config);
        }
        std::thread::sleep(Duration::from_millis(25));
        assert_eq!(breaker.state(), BreakerState::HalfOpen);
        assert!(breaker.begin_trial());
        breaker.record_failure(&config);
        assert_eq!(breaker.state(), BreakerState::Open);
        std::thread::sleep(Duration::from_millis(25));
        assert_eq!(breaker.state(), BreakerState::HalfOpen);
        assert!(breaker.begin_trial());
    }

    #[test]
    fn success_resets_failure_streak() {
        let config = fast_config();
        let mut breaker = CircuitBreaker::new();
        for _ in 0..4 {
            breaker.record_failure(&config);
        }
        breaker.record_success();
        for _ in 0..4 {
            breaker.record_failure(&config);
        }
        // 4 + 4 with a success in between never reaches 5 consecutive.
        assert_eq!(breaker.state(), BreakerState::Closed);
    }
}
