// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Bounded retry with an injectable sleeper.
//!
//! `RetryPolicy::run` calls the operation up to `max_attempts` times and waits
//! `delay` between attempts, never after the last one. Only errors for which
//! [`GateError::is_retryable`] holds are retried.

use async_trait::async_trait;
use std::future::Future;
use std::sync::Mutex;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::warn;

use crate::domain::config::RetrySettings;
use crate::domain::error::GateError;

/// Suspends the current invocation between retry attempts.
#[async_trait]
pub trait Sleeper: Send + Sync {
    /// # Errors
    ///
    /// `Cancelled` when the wait is interrupted.
    async fn sleep(&self, duration: Duration) -> Result<(), GateError>;
}

/// Real-time sleeper interrupted by a cancellation token (shutdown or
/// invocation deadline).
#[derive(Clone, Default)]
pub struct TokioSleeper {
    cancel: CancellationToken,
}

impl TokioSleeper {
    pub fn new(cancel: CancellationToken) -> Self {
        Self { cancel }
    }
}

#[async_trait]
impl Sleeper for TokioSleeper {
    async fn sleep(&self, duration: Duration) -> Result<(), GateError> {
        tokio::select! {
            _ = tokio::time::sleep(duration) => Ok(()),
            _ = self.cancel.cancelled() => {
                Err(GateError::Cancelled("waiting to retry".to_string()))
            }
        }
    }
}

/// Returns immediately and remembers every requested wait.
#[derive(Default)]
pub struct RecordingSleeper {
    waits: Mutex<Vec<Duration>>,
}

impl RecordingSleeper {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn waits(&self) -> Vec<Duration> {
        self.waits.lock().map(|w| w.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl Sleeper for RecordingSleeper {
    async fn sleep(&self, duration: Duration) -> Result<(), GateError> {
        if let Ok(mut waits) = self.waits.lock() {
            waits.push(duration);
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    max_attempts: u32,
    delay: Duration,
}

/// Result of a retried operation and the number of attempts it took.
#[derive(Debug)]
pub struct Retried<T> {
    pub result: Result<T, GateError>,
    pub attempts: u32,
}

impl RetryPolicy {
    /// `max_attempts` below one is treated as one.
    pub fn new(max_attempts: u32, delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            delay,
        }
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    pub fn delay(&self) -> Duration {
        self.delay
    }

    pub async fn run<T, F, Fut>(&self, sleeper: &dyn Sleeper, mut operation: F) -> Retried<T>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, GateError>>,
    {
        let mut attempt = 1;
        loop {
            match operation(attempt).await {
                Ok(value) => {
                    return Retried {
                        result: Ok(value),
                        attempts: attempt,
                    }
                }
                Err(e) if e.is_retryable() && attempt < self.max_attempts => {
                    warn!(
                        attempt,
                        max_attempts = self.max_attempts,
                        delay_secs = self.delay.as_secs_f64(),
                        error = %e,
                        "Attempt failed, waiting before retry"
                    );
                    if let Err(cancelled) = sleeper.sleep(self.delay).await {
                        return Retried {
                            result: Err(cancelled),
                            attempts: attempt,
                        };
                    }
                    attempt += 1;
                }
                Err(e) => {
                    return Retried {
                        result: Err(e),
                        attempts: attempt,
                    }
                }
            }
        }
    }
}

impl From<&RetrySettings> for RetryPolicy {
    fn from(settings: &RetrySettings) -> Self {
        Self::new(settings.max_attempts, settings.delay)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from(&RetrySettings::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn pending(attempt: u32) -> GateError {
        GateError::ApprovalPending {
            pipeline: "p".into(),
            attempts: attempt,
            last_error: None,
        }
    }

    #[tokio::test]
    async fn test_exhaustion_waits_between_attempts_only() {
        let sleeper = RecordingSleeper::new();
        let policy = RetryPolicy::new(3, Duration::from_secs(60));

        let outcome: Retried<()> = policy.run(&sleeper, |attempt| async move { Err(pending(attempt)) }).await;

        assert_eq!(outcome.attempts, 3);
        assert!(matches!(outcome.result, Err(GateError::ApprovalPending { attempts: 3, .. })));
        assert_eq!(sleeper.waits(), vec![Duration::from_secs(60); 2]);
    }

    #[tokio::test]
    async fn test_success_on_second_attempt() {
        let sleeper = RecordingSleeper::new();
        let policy = RetryPolicy::new(3, Duration::from_millis(5));

        let outcome = policy
            .run(&sleeper, |attempt| async move {
                if attempt < 2 {
                    Err(pending(attempt))
                } else {
                    Ok("token")
                }
            })
            .await;

        assert_eq!(outcome.result.unwrap(), "token");
        assert_eq!(outcome.attempts, 2);
        assert_eq!(sleeper.waits().len(), 1);
    }

    #[tokio::test]
    async fn test_non_retryable_error_stops_immediately() {
        let sleeper = RecordingSleeper::new();
        let calls = AtomicU32::new(0);
        let policy = RetryPolicy::new(5, Duration::from_secs(1));

        let outcome: Retried<()> = policy
            .run(&sleeper, |_| {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err(GateError::ApprovalStageMissing { pipeline: "p".into() }) }
            })
            .await;

        assert!(matches!(outcome.result, Err(GateError::ApprovalStageMissing { .. })));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(sleeper.waits().is_empty());
    }

    #[tokio::test]
    async fn test_zero_attempts_still_tries_once() {
        let policy = RetryPolicy::new(0, Duration::ZERO);
        assert_eq!(policy.max_attempts(), 1);
    }

    #[tokio::test]
    async fn test_cancelled_wait_aborts() {
        let cancel = CancellationToken::new();
        cancel.cancel();
        let sleeper = TokioSleeper::new(cancel);
        let policy = RetryPolicy::new(3, Duration::from_secs(3600));

        let outcome: Retried<()> = policy.run(&sleeper, |attempt| async move { Err(pending(attempt)) }).await;
        assert!(matches!(outcome.result, Err(GateError::Cancelled(_))));
        assert_eq!(outcome.attempts, 1);
    }
}
