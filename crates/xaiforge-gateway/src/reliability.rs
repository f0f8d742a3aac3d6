//! Retry backoff and circuit breaking

use std::time::{Duration, Instant};

use rand::Rng;
use serde::{Deserialize, Serialize};

/// Exponential backoff with uniform jitter:
/// `min(max_delay, base · 2^(attempt-1)) + U(0, jitter)`.
#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
pub struct RetryPolicy {
    #[serde(default = "RetryPolicy::default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "RetryPolicy::default_base_delay_s")]
    pub base_delay_s: f64,
    #[serde(default = "RetryPolicy::default_max_delay_s")]
    pub max_delay_s: f64,
    #[serde(default = "RetryPolicy::default_jitter")]
    pub jitter: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: Self::default_max_attempts(),
            base_delay_s: Self::default_base_delay_s(),
            max_delay_s: Self::default_max_delay_s(),
            jitter: Self::default_jitter(),
        }
    }
}

impl RetryPolicy {
    fn default_max_attempts() -> u32 {
        3
    }
    fn default_base_delay_s() -> f64 {
        0.2
    }
    fn default_max_delay_s() -> f64 {
        2.0
    }
    fn default_jitter() -> f64 {
        0.1
    }

    pub fn backoff(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(31);
        let raw = self
            .max_delay_s
            .min(self.base_delay_s * f64::from(1u32 << exponent));
        let jitter = if self.jitter > 0.0 {
            rand::thread_rng().gen_range(0.0..self.jitter)
        } else {
            0.0
        };
        Duration::from_secs_f64(raw + jitter)
    }
}

/// Opens after `failure_threshold` consecutive failures; a call is let
/// through again once `reset_timeout` has elapsed, and a success closes the
/// breaker and zeroes the counter.
#[derive(Debug)]
pub struct CircuitBreaker {
    failure_threshold: u32,
    reset_timeout: Duration,
    failures: u32,
    opened_at: Option<Instant>,
}

impl CircuitBreaker {
    pub fn new(failure_threshold: u32, reset_timeout: Duration) -> Self {
        Self {
            failure_threshold,
            reset_timeout,
            failures: 0,
            opened_at: None,
        }
    }

    pub fn record_success(&mut self) {
        self.failures = 0;
        self.opened_at = None;
    }

    pub fn record_failure(&mut self) {
        self.failures += 1;
        if self.failures >= self.failure_threshold {
            self.opened_at.get_or_insert_with(Instant::now);
        }
    }

    pub fn allow(&mut self) -> bool {
        match self.opened_at {
            None => true,
            Some(opened_at) => {
                if opened_at.elapsed() >= self.reset_timeout {
                    self.failures = 0;
                    self.opened_at = None;
                    true
                } else {
                    false
                }
            }
        }
    }

    pub fn is_open(&self) -> bool {
        self.opened_at.is_some()
    }
}
