//! Circuit Breaker: per-bidder Closed/Open/HalfOpen state
//! machine gating outbound calls.
//!
//! State-change callbacks run under a hard time budget: the
//! invocation path races the callback against a short timer on a
//! spawned task and abandons it on timeout rather than blocking the
//! caller or leaking an unbounded worker.

use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::warn;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BreakerState {
    Closed,
    Open,
    HalfOpen,
}

struct BidderBreaker {
    state: BreakerState,
    failures: u32,
    successes_in_half_open: u32,
    window_start: Instant,
    opened_at: Instant,
    open_duration: Duration,
}

impl BidderBreaker {
    fn new(base_open_duration: Duration) -> Self {
        let now = Instant::now();
        Self {
            state: BreakerState::Closed,
            failures: 0,
            successes_in_half_open: 0,
            window_start: now,
            opened_at: now,
            open_duration: base_open_duration,
        }
    }
}

pub type StateChangeCallback = Arc<dyn Fn(&str, BreakerState, BreakerState) + Send + Sync>;

pub struct CircuitBreaker {
    bidders: Mutex<HashMap<String, BidderBreaker>>,
    failure_threshold: u32,
    failure_window: Duration,
    base_open_duration: Duration,
    half_open_max_probes: u32,
    on_state_change: Option<StateChangeCallback>,
    callback_timeout: Duration,
}

impl CircuitBreaker {
    pub fn new(
        failure_threshold: u32,
        failure_window: Duration,
        open_duration: Duration,
        half_open_max_probes: u32,
    ) -> Self {
        Self {
            bidders: Mutex::new(HashMap::new()),
            failure_threshold,
            failure_window,
            base_open_duration: open_duration,
            half_open_max_probes,
            on_state_change: None,
            callback_timeout: Duration::from_secs(2),
        }
    }

    pub fn with_state_change_callback(mut self, cb: StateChangeCallback) -> Self {
        self.on_state_change = Some(cb);
        self
    }

    /// Call before attempting a bidder call. `true` means proceed.
    pub fn permit(&self, bidder_code: &str) -> bool {
        let mut bidders = self.bidders.lock();
        let entry = bidders
            .entry(bidder_code.to_string())
            .or_insert_with(|| BidderBreaker::new(self.base_open_duration));

        match entry.state {
            BreakerState::Closed => true,
            BreakerState::Open => {
                if entry.opened_at.elapsed() >= entry.open_duration {
                    let from = entry.state;
                    entry.state = BreakerState::HalfOpen;
                    entry.successes_in_half_open = 0;
                    self.notify(bidder_code, from, entry.state);
                    true
                } else {
                    false
                }
            }
            BreakerState::HalfOpen => entry.successes_in_half_open < self.half_open_max_probes,
        }
    }

    pub fn record_success(&self, bidder_code: &str) {
        let mut bidders = self.bidders.lock();
        let entry = bidders
            .entry(bidder_code.to_string())
            .or_insert_with(|| BidderBreaker::new(self.base_open_duration));

        match entry.state {
            BreakerState::Closed => {
                entry.failures = 0;
            }
            BreakerState::HalfOpen => {
                entry.successes_in_half_open += 1;
                if entry.successes_in_half_open >= self.half_open_max_probes {
                    let from = entry.state;
                    entry.state = BreakerState::Closed;
                    entry.failures = 0;
                    entry.open_duration = self.base_open_duration;
                    self.notify(bidder_code, from, entry.state);
                }
            }
            BreakerState::Open => {}
        }
    }

    pub fn record_failure(&self, bidder_code: &str) {
        let mut bidders = self.bidders.lock();
        let entry = bidders
            .entry(bidder_code.to_string())
            .or_insert_with(|| BidderBreaker::new(self.base_open_duration));

        match entry.state {
            BreakerState::Closed => {
                if entry.window_start.elapsed() > self.failure_window {
                    entry.window_start = Instant::now();
                    entry.failures = 0;
                }
                entry.failures += 1;
                if entry.failures >= self.failure_threshold {
                    self.open(entry, bidder_code, BreakerState::Closed);
                }
            }
            BreakerState::HalfOpen => {
                entry.open_duration = (entry.open_duration * 2).min(Duration::from_secs(300));
                self.open(entry, bidder_code, BreakerState::HalfOpen);
            }
            BreakerState::Open => {}
        }
    }

    fn open(&self, entry: &mut BidderBreaker, bidder_code: &str, from: BreakerState) {
        entry.state = BreakerState::Open;
        entry.opened_at = Instant::now();
        entry.failures = 0;
        self.notify(bidder_code, from, BreakerState::Open);
    }

    /// Bidder codes currently tripped open, for the `/health/ready`
    /// circuit breaker summary.
    pub fn open_bidders(&self) -> Vec<String> {
        self.bidders
            .lock()
            .iter()
            .filter(|(_, b)| b.state == BreakerState::Open)
            .map(|(code, _)| code.clone())
            .collect()
    }

    fn notify(&self, bidder_code: &str, from: BreakerState, to: BreakerState) {
        let Some(cb) = self.on_state_change.clone() else {
            return;
        };
        let bidder_code = bidder_code.to_string();
        let timeout = self.callback_timeout;

        tokio::spawn(async move {
            let task = tokio::task::spawn_blocking(move || cb(&bidder_code, from, to));
            if tokio::time::timeout(timeout, task).await.is_err() {
                warn!("circuit breaker state-change callback exceeded its time budget, abandoning");
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn opens_after_threshold_failures() {
        let breaker = CircuitBreaker::new(3, Duration::from_secs(30), Duration::from_secs(30), 1);
        assert!(breaker.permit("x"));
        breaker.record_failure("x");
        breaker.record_failure("x");
        assert!(breaker.permit("x"));
        breaker.record_failure("x");
        assert!(!breaker.permit("x"));
    }

    #[test]
    fn half_open_success_closes_breaker() {
        let breaker = CircuitBreaker::new(1, Duration::from_secs(30), Duration::from_millis(1), 1);
        breaker.record_failure("x");
        assert!(!breaker.permit("x"));
        std::thread::sleep(Duration::from_millis(5));
        assert!(breaker.permit("x"));
        breaker.record_success("x");
        assert!(breaker.permit("x"));
        breaker.record_failure("x");
        assert!(!breaker.permit("x"));
    }

    #[test]
    fn half_open_failure_reopens_with_doubled_timeout() {
        let breaker = CircuitBreaker::new(1, Duration::from_secs(30), Duration::from_millis(1), 1);
        breaker.record_failure("x");
        std::thread::sleep(Duration::from_millis(5));
        assert!(breaker.permit("x"));
        breaker.record_failure("x");
        assert!(!breaker.permit("x"));
    }
}
