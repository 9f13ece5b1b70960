//! Engine-level error types.

use taxonomy::ClassifiedError;
use thiserror::Error;

/// Why the outbound retry wrapper gave up on an engine call.
///
/// Every variant carries the classified failure as its source, so
/// [`taxonomy::normalize`] recovers it from anywhere in an error chain.
#[derive(Debug, Error)]
pub enum RetryError {
    /// The failure was not transient; retrying would not help.
    #[error("engine call failed permanently after {attempts} attempt(s)")]
    Rejected {
        attempts: u32,
        #[source]
        source: ClassifiedError,
    },

    /// Every allowed attempt failed transiently.
    #[error("engine call still failing after {attempts} attempt(s)")]
    Exhausted {
        attempts: u32,
        #[source]
        source: ClassifiedError,
    },

    /// The caller cancelled while the call was in flight or backing off.
    #[error("engine call cancelled after {attempts} attempt(s)")]
    Cancelled {
        attempts: u32,
        #[source]
        source: ClassifiedError,
    },

    /// The caller's deadline passed while the call was in flight or backing off.
    #[error("engine call deadline elapsed after {attempts} attempt(s)")]
    DeadlineElapsed {
        attempts: u32,
        #[source]
        source: ClassifiedError,
    },
}

impl RetryError {
    /// Number of calls actually made; 0 if the context ended before the first.
    pub fn attempts(&self) -> u32 {
        match self {
            Self::Rejected { attempts, .. }
            | Self::Exhausted { attempts, .. }
            | Self::Cancelled { attempts, .. }
            | Self::DeadlineElapsed { attempts, .. } => *attempts,
        }
    }

    pub fn classified(&self) -> &ClassifiedError {
        match self {
            Self::Rejected { source, .. }
            | Self::Exhausted { source, .. }
            | Self::Cancelled { source, .. }
            | Self::DeadlineElapsed { source, .. } => source,
        }
    }

    pub fn is_interrupted(&self) -> bool {
        matches!(self, Self::Cancelled { .. } | Self::DeadlineElapsed { .. })
    }
}

impl From<RetryError> for ClassifiedError {
    fn from(err: RetryError) -> Self {
        match err {
            RetryError::Rejected { source, .. }
            | RetryError::Exhausted { source, .. }
            | RetryError::Cancelled { source, .. }
            | RetryError::DeadlineElapsed { source, .. } => source,
        }
    }
}
