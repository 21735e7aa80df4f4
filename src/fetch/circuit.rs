//! Per-endpoint circuit breaker.
//!
//! Closed counts failures over a rolling window; crossing the
//! threshold opens the circuit for the current open duration. When
//! that elapses a single probe is allowed through (HalfOpen); a
//! successful probe closes the circuit and resets the count, a failed
//! probe re-opens it and doubles the open duration up to the cap.

use log::{debug, info, warn};
use std::time::{Duration, Instant};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

/// Outcome of asking the breaker whether a call may proceed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitDecision {
    /// Normal operation, retries allowed
    Proceed,
    /// Open duration elapsed: exactly one probe, no retries
    Probe,
    /// Failing fast, do not touch the network
    FastFail,
}

#[derive(Debug, Clone)]
pub struct CircuitBreaker {
    failure_threshold: u32,
    failure_window: Duration,
    open_base: Duration,
    open_max: Duration,
    state: CircuitState,
    failures: Vec<Instant>,
    last_failure_time: Option<Instant>,
    opened_at: Option<Instant>,
    open_duration: Duration,
    probe_in_flight: bool,
}

impl CircuitBreaker {
    pub fn new(
        failure_threshold: u32,
        failure_window: Duration,
        open_base: Duration,
        open_max: Duration,
    ) -> Self {
        Self {
            failure_threshold,
            failure_window,
            open_base,
            open_max,
            state: CircuitState::Closed,
            failures: Vec::new(),
            last_failure_time: None,
            opened_at: None,
            open_duration: open_base,
            probe_in_flight: false,
        }
    }

    pub fn state(&self) -> CircuitState {
        self.state
    }

    /// Failures currently inside the rolling window.
    pub fn failure_count(&self) -> u32 {
        let window = self.failure_window;
        self.failures
            .iter()
            .filter(|at| at.elapsed() < window)
            .count() as u32
    }

    pub fn last_failure_time(&self) -> Option<Instant> {
        self.last_failure_time
    }

    /// Gate a call. Mutates state for the Open -> HalfOpen transition
    /// and reserves the probe slot so only one probe runs at a time.
    pub fn try_acquire(&mut self, endpoint_id: &str) -> CircuitDecision {
        match self.state {
            CircuitState::Closed => CircuitDecision::Proceed,
            CircuitState::Open => {
                let elapsed = self
                    .opened_at
                    .map(|at| at.elapsed())
                    .unwrap_or(Duration::MAX);
                if elapsed >= self.open_duration {
                    self.state = CircuitState::HalfOpen;
                    self.probe_in_flight = true;
                    info!(
                        "Circuit for {} half-open after {:?}, probing",
                        endpoint_id, self.open_duration
                    );
                    CircuitDecision::Probe
                } else {
                    debug!(
                        "Circuit for {} open, failing fast ({:?} remaining)",
                        endpoint_id,
                        self.open_duration.saturating_sub(elapsed)
                    );
                    CircuitDecision::FastFail
                }
            }
            CircuitState::HalfOpen => {
                if self.probe_in_flight {
                    CircuitDecision::FastFail
                } else {
                    self.probe_in_flight = true;
                    CircuitDecision::Probe
                }
            }
        }
    }

    pub fn record_success(&mut self, endpoint_id: &str) {
        if self.state != CircuitState::Closed {
            info!("Circuit for {} closed after successful probe", endpoint_id);
        }
        self.state = CircuitState::Closed;
        self.failures.clear();
        self.last_failure_time = None;
        self.opened_at = None;
        self.open_duration = self.open_base;
        self.probe_in_flight = false;
    }

    pub fn record_failure(&mut self, endpoint_id: &str) {
        let now = Instant::now();
        self.last_failure_time = Some(now);

        if self.state == CircuitState::HalfOpen {
            // Probe failed: re-open and double the cooldown
            self.probe_in_flight = false;
            self.state = CircuitState::Open;
            self.opened_at = Some(now);
            self.open_duration = (self.open_duration * 2).min(self.open_max);
            warn!(
                "Circuit for {} probe failed, re-opened for {:?}",
                endpoint_id, self.open_duration
            );
            return;
        }

        self.failures.push(now);
        let window = self.failure_window;
        self.failures.retain(|at| at.elapsed() < window);

        if self.state == CircuitState::Closed
            && self.failures.len() as u32 >= self.failure_threshold
        {
            self.state = CircuitState::Open;
            self.opened_at = Some(now);
            self.open_duration = self.open_base;
            warn!(
                "Circuit for {} OPENED after {} failures in window",
                endpoint_id,
                self.failures.len()
            );
        } else {
            debug!(
                "Circuit for {}: failure recorded ({}/{})",
                endpoint_id,
                self.failures.len(),
                self.failure_threshold
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn breaker() -> CircuitBreaker {
        CircuitBreaker::new(
            5,
            Duration::from_secs(60),
            Duration::from_millis(40),
            Duration::from_millis(160),
        )
    }

    #[test]
    fn opens_at_threshold() {
        let mut cb = breaker();
        for _ in 0..4 {
            cb.record_failure("scores");
            assert_eq!(cb.state(), CircuitState::Closed);
        }
        cb.record_failure("scores");
        assert_eq!(cb.state(), CircuitState::Open);
        assert_eq!(cb.try_acquire("scores"), CircuitDecision::FastFail);
    }

    #[test]
    fn half_opens_after_cooldown_with_single_probe() {
        let mut cb = breaker();
        for _ in 0..5 {
            cb.record_failure("scores");
        }
        std::thread::sleep(Duration::from_millis(60));
        assert_eq!(cb.try_acquire("scores"), CircuitDecision::Probe);
        // A second caller while the probe is in flight is blocked
        assert_eq!(cb.try_acquire("scores"), CircuitDecision::FastFail);
    }

    #[test]
    fn successful_probe_closes_and_resets_count() {
        let mut cb = breaker();
        for _ in 0..5 {
            cb.record_failure("scores");
        }
        std::thread::sleep(Duration::from_millis(60));
        assert_eq!(cb.try_acquire("scores"), CircuitDecision::Probe);
        cb.record_success("scores");
        assert_eq!(cb.state(), CircuitState::Closed);
        assert_eq!(cb.failure_count(), 0);
        assert_eq!(cb.try_acquire("scores"), CircuitDecision::Proceed);
    }

    #[test]
    fn failed_probe_doubles_open_duration_up_to_cap() {
        let mut cb = breaker();
        for _ in 0..5 {
            cb.record_failure("scores");
        }
        assert_eq!(cb.open_duration, Duration::from_millis(40));

        std::thread::sleep(Duration::from_millis(60));
        assert_eq!(cb.try_acquire("scores"), CircuitDecision::Probe);
        cb.record_failure("scores");
        assert_eq!(cb.state(), CircuitState::Open);
        assert_eq!(cb.open_duration, Duration::from_millis(80));

        std::thread::sleep(Duration::from_millis(100));
        assert_eq!(cb.try_acquire("scores"), CircuitDecision::Probe);
        cb.record_failure("scores");
        assert_eq!(cb.open_duration, Duration::from_millis(160));

        std::thread::sleep(Duration::from_millis(180));
        assert_eq!(cb.try_acquire("scores"), CircuitDecision::Probe);
        cb.record_failure("scores");
        // Capped
        assert_eq!(cb.open_duration, Duration::from_millis(160));
    }

    #[test]
    fn failures_age_out_of_rolling_window() {
        let mut cb = CircuitBreaker::new(
            5,
            Duration::from_millis(30),
            Duration::from_millis(40),
            Duration::from_millis(160),
        );
        for _ in 0..4 {
            cb.record_failure("scores");
        }
        std::thread::sleep(Duration::from_millis(50));
        assert_eq!(cb.failure_count(), 0);
        // Stale failures no longer contribute toward the threshold
        cb.record_failure("scores");
        assert_eq!(cb.state(), CircuitState::Closed);
    }
}
