//! Retry policy table.
//!
//! The single source of truth for how many times a failure of a given kind is
//! worth re-attempting. A classified error's own `retryable` flag only decides
//! whether retries apply at all; the count always comes from here.

use serde::Serialize;

use crate::ErrorKind;

/// Retry tiers, from most to least forgiving.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RetryTier {
    /// Connection loss, failed query/search/insert execution, downstream API failures.
    Transient,
    /// Timeouts on query, search and intent-classification calls.
    Timeout,
    /// The timeout kind whose escalation belongs to a workflow boundary event.
    BoundaryTimeout,
    /// Validation, business rules, not-found, duplicates and anything unrecognised.
    Never,
}

impl RetryTier {
    pub const fn retries(self) -> u32 {
        match self {
            Self::Transient => 3,
            Self::Timeout => 2,
            Self::BoundaryTimeout => 1,
            Self::Never => 0,
        }
    }
}

/// Which tier a kind belongs to. Total over the kind enumeration.
pub fn tier_for(kind: &ErrorKind) -> RetryTier {
    match kind {
        ErrorKind::DatabaseConnectionFailed
        | ErrorKind::QueryExecutionFailed
        | ErrorKind::SearchExecutionFailed
        | ErrorKind::InsertFailed
        | ErrorKind::NotificationFailed
        | ErrorKind::ExternalServiceError
        | ErrorKind::IdentityProviderUnavailable
        | ErrorKind::LlmSynthesisFailed => RetryTier::Transient,

        ErrorKind::QueryTimeout
        | ErrorKind::SearchTimeout
        | ErrorKind::IntentClassificationTimeout
        | ErrorKind::TimeoutError => RetryTier::Timeout,

        ErrorKind::LlmTimeout => RetryTier::BoundaryTimeout,

        _ => RetryTier::Never,
    }
}

/// Recommended number of retries for `kind`, independent of any job state.
pub fn retry_count_for(kind: &ErrorKind) -> u32 {
    tier_for(kind).retries()
}

pub fn is_retryable(kind: &ErrorKind) -> bool {
    retry_count_for(kind) > 0
}
