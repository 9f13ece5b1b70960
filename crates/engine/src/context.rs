//! Cancellation and deadline scope for the calls made while handling a job.

use std::fmt;
use std::future::Future;
use std::time::Duration;

use taxonomy::ClassifiedError;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

/// Why a call was cut short.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Interrupt {
    Cancelled,
    DeadlineElapsed,
}

impl Interrupt {
    /// Classify the interruption of `operation`.
    pub fn classify(self, operation: &str) -> ClassifiedError {
        match self {
            Self::Cancelled => ClassifiedError::cancelled(operation),
            Self::DeadlineElapsed => ClassifiedError::timeout(operation),
        }
    }
}

impl fmt::Display for Interrupt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Cancelled => f.write_str("cancelled"),
            Self::DeadlineElapsed => f.write_str("deadline elapsed"),
        }
    }
}

/// A cancellation token plus an optional deadline.
///
/// Cloning shares the token: cancelling any clone cancels them all.
#[derive(Debug, Clone)]
pub struct CallContext {
    cancel: CancellationToken,
    deadline: Option<Instant>,
}

impl Default for CallContext {
    fn default() -> Self {
        Self::new()
    }
}

impl CallContext {
    /// A context that is never interrupted unless cancelled.
    pub fn new() -> Self {
        Self {
            cancel: CancellationToken::new(),
            deadline: None,
        }
    }

    /// A context that expires `timeout` from now.
    pub fn with_timeout(timeout: Duration) -> Self {
        Self::new().with_deadline(Instant::now() + timeout)
    }

    /// Tighten the deadline. A later deadline than the current one is ignored.
    pub fn with_deadline(mut self, deadline: Instant) -> Self {
        self.deadline = Some(match self.deadline {
            Some(current) => current.min(deadline),
            None => deadline,
        });
        self
    }

    /// A context cancelled together with this one, but cancellable on its own.
    pub fn child(&self) -> Self {
        Self {
            cancel: self.cancel.child_token(),
            deadline: self.deadline,
        }
    }

    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn token(&self) -> &CancellationToken {
        &self.cancel
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Whether the context is already over, and why.
    pub fn interrupted(&self) -> Option<Interrupt> {
        if self.cancel.is_cancelled() {
            Some(Interrupt::Cancelled)
        } else if self.deadline.is_some_and(|d| Instant::now() >= d) {
            Some(Interrupt::DeadlineElapsed)
        } else {
            None
        }
    }

    /// Drive `fut` until it finishes or the context ends, whichever is first.
    pub async fn run<F: Future>(&self, fut: F) -> Result<F::Output, Interrupt> {
        let deadline = async {
            match self.deadline {
                Some(deadline) => tokio::time::sleep_until(deadline).await,
                None => std::future::pending::<()>().await,
            }
        };

        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => Err(Interrupt::Cancelled),
            _ = deadline => Err(Interrupt::DeadlineElapsed),
            out = fut => Ok(out),
        }
    }

    /// Sleep for `duration` unless the context ends first.
    pub async fn sleep(&self, duration: Duration) -> Result<(), Interrupt> {
        self.run(tokio::time::sleep(duration)).await
    }
}
