//! Bounded retry of device operations.
//!
//! The AT engine never retries on its own; stations that want a second
//! attempt wrap the operation in a [`RetryPolicy`].

use std::time::Duration;

use tracing::warn;

use crate::error::{DutError, Result};

/// How many times to attempt an operation and how long to wait in between.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, including the first. Zero behaves as one.
    pub max_attempts: u32,
    /// Pause between attempts.
    pub delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 2,
            delay: Duration::ZERO,
        }
    }
}

impl RetryPolicy {
    /// A policy that makes exactly one attempt.
    pub fn once() -> Self {
        Self {
            max_attempts: 1,
            delay: Duration::ZERO,
        }
    }

    /// A policy allowing `retries` further attempts after the first.
    pub fn with_retries(retries: u32) -> Self {
        Self {
            max_attempts: retries.saturating_add(1),
            ..Self::default()
        }
    }

    /// Run `op` until it succeeds, fails with a non-retryable error, or
    /// attempts are exhausted. `op` receives the 1-based attempt number.
    ///
    /// The last error is returned when every attempt fails.
    pub fn run<T, F>(&self, mut op: F) -> Result<T>
    where
        F: FnMut(u32) -> Result<T>,
    {
        let attempts = self.max_attempts.max(1);
        let mut attempt = 1;
        loop {
            match op(attempt) {
                Ok(value) => return Ok(value),
                Err(err) if attempt < attempts && is_retryable(&err) => {
                    warn!(attempt, max_attempts = attempts, error = %err, "retrying");
                    if !self.delay.is_zero() {
                        std::thread::sleep(self.delay);
                    }
                    attempt += 1;
                }
                Err(err) => return Err(err),
            }
        }
    }
}

fn is_retryable(err: &DutError) -> bool {
    !matches!(
        err,
        DutError::Config(_) | DutError::Io(_) | DutError::Json(_) | DutError::AuthenticationFailed
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_success_short_circuits() {
        let mut calls = 0;
        let out = RetryPolicy::with_retries(3)
            .run(|_| {
                calls += 1;
                Ok::<_, DutError>(7)
            })
            .unwrap();
        assert_eq!(out, 7);
        assert_eq!(calls, 1);
    }

    #[test]
    fn retries_until_success() {
        let mut seen = Vec::new();
        let out = RetryPolicy::with_retries(2)
            .run(|attempt| {
                seen.push(attempt);
                if attempt < 3 {
                    Err(DutError::InvalidResponse("garbled".into()))
                } else {
                    Ok("done")
                }
            })
            .unwrap();
        assert_eq!(out, "done");
        assert_eq!(seen, vec![1, 2, 3]);
    }

    #[test]
    fn exhaustion_returns_last_error() {
        let err = RetryPolicy::with_retries(1)
            .run(|attempt| Err::<(), _>(DutError::MissingValue(format!("attempt {attempt}"))))
            .unwrap_err();
        assert_eq!(err.to_string(), "attempt 2");
    }

    #[test]
    fn config_errors_are_not_retried() {
        let mut calls = 0;
        let err = RetryPolicy::with_retries(5)
            .run(|_| {
                calls += 1;
                Err::<(), _>(DutError::Config("bad newline".into()))
            })
            .unwrap_err();
        assert!(matches!(err, DutError::Config(_)));
        assert_eq!(calls, 1);
    }

    #[test]
    fn failed_authentication_is_not_retried() {
        let mut calls = 0;
        let err = RetryPolicy::with_retries(3)
            .run(|_| {
                calls += 1;
                Err::<(), _>(DutError::AuthenticationFailed)
            })
            .unwrap_err();
        assert!(err.is_rejected());
        assert_eq!(calls, 1);
    }

    #[test]
    fn zero_attempts_still_runs_once() {
        let policy = RetryPolicy {
            max_attempts: 0,
            delay: Duration::ZERO,
        };
        let mut calls = 0;
        let _ = policy.run(|_| {
            calls += 1;
            Err::<(), _>(DutError::MissingValue("x".into()))
        });
        assert_eq!(calls, 1);
    }
}
