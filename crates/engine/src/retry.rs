//! Outbound retry wrapper for calls made directly to the orchestration engine.
//!
//! Job-failure reporting does not go through here; it has its own one-shot
//! fallback in [`crate::handler`].

use std::future::Future;
use std::time::Duration;

use taxonomy::{ClassifiedError, TransportError};
use tracing::{debug, warn};

use crate::{BackoffConfig, CallContext, Interrupt, RetryError};

/// `min(base * 2^attempt, max)`, without overflowing for any `attempt`.
pub fn backoff_delay(base: Duration, max: Duration, attempt: u32) -> Duration {
    2u32.checked_pow(attempt)
        .and_then(|factor| base.checked_mul(factor))
        .map_or(max, |delay| delay.min(max))
}

/// Attempt counter of a single outbound call.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct BackoffState {
    attempt: u32,
}

impl BackoffState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Index of the current attempt, starting at 0.
    pub fn attempt(&self) -> u32 {
        self.attempt
    }

    /// Whether another attempt fits in the budget.
    pub fn can_retry(&self, config: &BackoffConfig) -> bool {
        self.attempt < config.max_retries
    }

    /// Delay to sleep before the next attempt; advances the counter.
    pub fn next_delay(&mut self, config: &BackoffConfig) -> Duration {
        let delay = config.delay_for(self.attempt);
        self.attempt = self.attempt.saturating_add(1);
        delay
    }
}

/// Run `op` until it succeeds, fails permanently, runs out of retries, or
/// `ctx` ends.
///
/// Only transient failures (see [`TransportError::is_transient`]) are
/// retried. Between attempts the wrapper sleeps `config.delay_for(attempt)`;
/// the sleep, like each attempt, returns early when `ctx` is cancelled or
/// its deadline passes.
///
/// # Errors
/// - [`RetryError::Rejected`] for a non-transient failure.
/// - [`RetryError::Exhausted`] when `config.max_retries` retries all failed;
///   the classified error is marked non-retryable.
/// - [`RetryError::Cancelled`] / [`RetryError::DeadlineElapsed`] when `ctx` ends.
pub async fn execute_with_retry<F, Fut, T>(
    operation: &str,
    mut op: F,
    config: &BackoffConfig,
    ctx: &CallContext,
) -> Result<T, RetryError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, TransportError>>,
{
    let mut backoff = BackoffState::new();

    loop {
        // Ended before this attempt started: only count the calls already made.
        if let Some(interrupt) = ctx.interrupted() {
            return Err(interrupted(operation, interrupt, backoff.attempt()));
        }
        let attempts = backoff.attempt() + 1;

        let err = match ctx.run(op()).await {
            Ok(Ok(value)) => {
                if attempts > 1 {
                    debug!("{operation} succeeded on attempt {attempts}");
                }
                return Ok(value);
            }
            Ok(Err(err)) => err,
            Err(interrupt) => return Err(interrupted(operation, interrupt, attempts)),
        };

        if !err.is_transient() {
            warn!("{operation} failed permanently on attempt {attempts}: {err}");
            return Err(RetryError::Rejected {
                attempts,
                source: ClassifiedError::from(err),
            });
        }

        if !backoff.can_retry(config) {
            warn!(
                "{operation} still failing after {attempts} attempt(s), giving up: {err}"
            );
            return Err(RetryError::Exhausted {
                attempts,
                source: ClassifiedError::from(err).non_retryable(),
            });
        }

        let delay = backoff.next_delay(config);
        warn!(
            "{operation} transient failure (attempt {}/{}), retrying in {:?}: {}",
            attempts,
            config.max_retries + 1,
            delay,
            err
        );

        if let Err(interrupt) = ctx.sleep(delay).await {
            return Err(interrupted(operation, interrupt, attempts));
        }
    }
}

fn interrupted(operation: &str, interrupt: Interrupt, attempts: u32) -> RetryError {
    let source = interrupt.classify(operation).non_retryable();
    match interrupt {
        Interrupt::Cancelled => RetryError::Cancelled { attempts, source },
        Interrupt::DeadlineElapsed => RetryError::DeadlineElapsed { attempts, source },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    use proptest::prelude::*;
    use taxonomy::{ErrorKind, TransportErrorKind};
    use tokio::time::Instant;

    fn config(max_retries: u32) -> BackoffConfig {
        BackoffConfig {
            max_retries,
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(10),
        }
    }

    #[test]
    fn delay_sequence_doubles_then_caps() {
        let delays: Vec<u64> = config(7).schedule().map(|d| d.as_secs()).collect();
        assert_eq!(delays, vec![1, 2, 4, 8, 10, 10, 10]);
    }

    #[test]
    fn huge_attempt_numbers_do_not_overflow() {
        let cfg = config(0);
        assert_eq!(cfg.delay_for(31), Duration::from_secs(10));
        assert_eq!(cfg.delay_for(32), Duration::from_secs(10));
        assert_eq!(cfg.delay_for(u32::MAX), Duration::from_secs(10));
        assert_eq!(
            backoff_delay(Duration::MAX, Duration::MAX, 1),
            Duration::MAX
        );
    }

    #[tokio::test(start_paused = true)]
    async fn succeeds_after_transient_failures() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = calls.clone();

        let start = Instant::now();
        let result = execute_with_retry(
            "topology",
            || {
                let n = counter.fetch_add(1, Ordering::SeqCst) + 1;
                async move {
                    if n <= 3 {
                        Err(TransportError::from_message("connection refused"))
                    } else {
                        Ok(n)
                    }
                }
            },
            &config(5),
            &CallContext::new(),
        )
        .await;

        assert_eq!(result.unwrap(), 4);
        assert_eq!(calls.load(Ordering::SeqCst), 4);
        // Slept 1s + 2s + 4s between the four attempts.
        assert_eq!(start.elapsed(), Duration::from_secs(7));
    }

    #[tokio::test(start_paused = true)]
    async fn permanent_failure_is_not_retried() {
        let calls = AtomicU32::new(0);
        let result: Result<(), _> = execute_with_retry(
            "publish message",
            || {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err(TransportError::new(TransportErrorKind::NotFound, "no such job")) }
            },
            &config(5),
            &CallContext::new(),
        )
        .await;

        let err = result.unwrap_err();
        assert!(matches!(err, RetryError::Rejected { attempts: 1, .. }));
        assert_eq!(err.classified().kind(), &ErrorKind::ResourceNotFound);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn exhausted_budget_returns_non_retryable_error() {
        let calls = AtomicU32::new(0);
        let result: Result<(), _> = execute_with_retry(
            "topology",
            || {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err(TransportError::from_message("context deadline exceeded")) }
            },
            &config(2),
            &CallContext::new(),
        )
        .await;

        let err = result.unwrap_err();
        assert!(matches!(err, RetryError::Exhausted { attempts: 3, .. }));
        assert_eq!(err.classified().kind(), &ErrorKind::TimeoutError);
        assert!(!err.classified().is_retryable());
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn cancellation_during_backoff_returns_promptly() {
        let ctx = CallContext::new();
        let remote = ctx.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(100)).await;
            remote.cancel();
        });

        let long_backoff = BackoffConfig {
            max_retries: 5,
            base_delay: Duration::from_secs(30),
            max_delay: Duration::from_secs(60),
        };

        let start = Instant::now();
        let result: Result<(), _> = execute_with_retry(
            "topology",
            || async { Err(TransportError::from_message("unavailable")) },
            &long_backoff,
            &ctx,
        )
        .await;

        let err = result.unwrap_err();
        assert!(matches!(err, RetryError::Cancelled { attempts: 1, .. }));
        assert_eq!(err.classified().kind(), &ErrorKind::OperationCancelled);
        assert!(start.elapsed() < Duration::from_secs(1));
    }

    #[tokio::test(start_paused = true)]
    async fn deadline_during_backoff_returns_timeout() {
        let ctx = CallContext::with_timeout(Duration::from_millis(1500));
        let result: Result<(), _> = execute_with_retry(
            "topology",
            || async { Err(TransportError::from_message("connection reset by peer")) },
            &config(5),
            &ctx,
        )
        .await;

        let err = result.unwrap_err();
        // Attempt 1 fails, 1s sleep, attempt 2 fails, deadline hits during the 2s sleep.
        assert!(matches!(err, RetryError::DeadlineElapsed { attempts: 2, .. }));
        assert_eq!(err.classified().kind(), &ErrorKind::TimeoutError);
        assert!(!err.classified().is_retryable());
    }

    #[tokio::test]
    async fn already_cancelled_context_makes_no_attempt() {
        let ctx = CallContext::new();
        ctx.cancel();

        let calls = AtomicU32::new(0);
        let result: Result<(), _> = execute_with_retry(
            "topology",
            || {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Ok(()) }
            },
            &config(5),
            &ctx,
        )
        .await;

        let err = result.unwrap_err();
        assert!(err.is_interrupted());
        assert!(matches!(err, RetryError::Cancelled { attempts: 0, .. }));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn normalize_recovers_classified_error_from_retry_error() {
        let err = RetryError::Exhausted {
            attempts: 6,
            source: ClassifiedError::external_service("gateway", "unavailable").non_retryable(),
        };
        let classified = taxonomy::normalize(err);
        assert_eq!(classified.kind(), &ErrorKind::ExternalServiceError);
        assert!(!classified.is_retryable());
    }

    proptest! {
        #[test]
        fn delay_never_exceeds_cap(base_ms in 1u64..5_000, max_ms in 1u64..60_000, attempt in 0u32..200) {
            let delay = backoff_delay(
                Duration::from_millis(base_ms),
                Duration::from_millis(max_ms),
                attempt,
            );
            prop_assert!(delay <= Duration::from_millis(max_ms));
        }
    }
}
