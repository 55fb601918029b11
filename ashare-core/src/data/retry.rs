//! Capped retry with fixed or exponential backoff.
//!
//! The provider rate-limits per minute, so a failed request waits out the
//! backoff on the calling thread before the same request is sent again.

use super::provider::{DataError, ErrorClass};
use std::time::Duration;
use thiserror::Error;
use tracing::warn;

/// Delay growth between attempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backoff {
    /// Same delay before every retry.
    Fixed,
    /// Delay doubles per retry, capped at `max_delay`.
    Exponential { max_delay: Duration },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts including the first one. Zero behaves like one.
    pub max_attempts: u32,
    pub delay: Duration,
    pub backoff: Backoff,
}

/// Why a retried operation gave up.
#[derive(Debug, Error)]
pub enum RetryError {
    #[error("gave up after {attempts} attempts: {last}")]
    Exhausted { attempts: u32, last: DataError },

    #[error(transparent)]
    Aborted(DataError),
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 30,
            delay: Duration::from_secs(10),
            backoff: Backoff::Fixed,
        }
    }
}

impl RetryPolicy {
    pub fn fixed(max_attempts: u32, delay: Duration) -> Self {
        Self {
            max_attempts,
            delay,
            backoff: Backoff::Fixed,
        }
    }

    /// Policy that retries immediately. Used by tests.
    pub fn immediate(max_attempts: u32) -> Self {
        Self::fixed(max_attempts, Duration::ZERO)
    }

    /// Delay before retry number `retry` (1-based).
    pub fn delay_for(&self, retry: u32) -> Duration {
        match self.backoff {
            Backoff::Fixed => self.delay,
            Backoff::Exponential { max_delay } => {
                let factor = 2u32.saturating_pow(retry.saturating_sub(1));
                self.delay.saturating_mul(factor).min(max_delay)
            }
        }
    }

    /// Run `op` until it succeeds, fails non-transiently, or attempts run out.
    pub fn run<T, F>(&self, label: &str, mut op: F) -> Result<T, RetryError>
    where
        F: FnMut() -> Result<T, DataError>,
    {
        let max_attempts = self.max_attempts.max(1);
        let mut attempt = 0;

        loop {
            attempt += 1;
            match op() {
                Ok(value) => return Ok(value),
                Err(e) if e.class() != ErrorClass::Transient => return Err(RetryError::Aborted(e)),
                Err(e) if attempt >= max_attempts => {
                    return Err(RetryError::Exhausted {
                        attempts: attempt,
                        last: e,
                    })
                }
                Err(e) => {
                    let delay = self.delay_for(attempt);
                    warn!(
                        %label,
                        attempt,
                        max_attempts,
                        delay_secs = delay.as_secs_f64(),
                        error = %e,
                        "request failed, retrying"
                    );
                    std::thread::sleep(delay);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn succeeds_after_transient_failures() {
        let policy = RetryPolicy::immediate(5);
        let mut calls = 0;
        let result = policy.run("t", || {
            calls += 1;
            if calls < 4 {
                Err(DataError::Timeout("slow".into()))
            } else {
                Ok(calls)
            }
        });
        assert_eq!(result.unwrap(), 4);
    }

    #[test]
    fn exhaustion_reports_attempts_and_last_error() {
        let policy = RetryPolicy::immediate(3);
        let mut calls = 0;
        let result: Result<(), _> = policy.run("t", || {
            calls += 1;
            Err(DataError::NetworkUnreachable(format!("try {calls}")))
        });
        match result {
            Err(RetryError::Exhausted { attempts, last }) => {
                assert_eq!(attempts, 3);
                assert!(last.to_string().contains("try 3"));
            }
            other => panic!("expected exhaustion, got {other:?}"),
        }
        assert_eq!(calls, 3);
    }

    #[test]
    fn fatal_errors_are_not_retried() {
        let policy = RetryPolicy::immediate(10);
        let mut calls = 0;
        let result: Result<(), _> = policy.run("t", || {
            calls += 1;
            Err(DataError::AuthenticationRequired("bad token".into()))
        });
        assert!(matches!(result, Err(RetryError::Aborted(_))));
        assert_eq!(calls, 1);
    }

    #[test]
    fn zero_attempts_still_tries_once() {
        let policy = RetryPolicy::immediate(0);
        let mut calls = 0;
        let _ = policy.run("t", || {
            calls += 1;
            Err::<(), _>(DataError::Timeout("x".into()))
        });
        assert_eq!(calls, 1);
    }

    #[test]
    fn exponential_backoff_is_capped() {
        let policy = RetryPolicy {
            max_attempts: 10,
            delay: Duration::from_secs(10),
            backoff: Backoff::Exponential {
                max_delay: Duration::from_secs(60),
            },
        };
        assert_eq!(policy.delay_for(1), Duration::from_secs(10));
        assert_eq!(policy.delay_for(2), Duration::from_secs(20));
        assert_eq!(policy.delay_for(3), Duration::from_secs(40));
        assert_eq!(policy.delay_for(4), Duration::from_secs(60));
        assert_eq!(policy.delay_for(30), Duration::from_secs(60));
    }

    #[test]
    fn fixed_backoff_is_constant() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.delay_for(1), Duration::from_secs(10));
        assert_eq!(policy.delay_for(7), Duration::from_secs(10));
    }
}
