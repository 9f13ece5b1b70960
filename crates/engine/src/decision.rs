//! Failure decision: retry the job, or raise a named error on the workflow.
//!
//! Runs to completion synchronously for each failed job and holds no state
//! between jobs:
//! 1. normalize the raw error,
//! 2. convert it into the engine's error payload,
//! 3. grant `min(job remaining, policy)` retries if both are positive,
//! 4. otherwise raise a terminal error.

use serde::Serialize;
use taxonomy::{normalize, to_protocol_error_with, ClassifiedError, ProtocolError};

/// What the engine should be told about a failed job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum Action {
    /// Fail the job and let the engine re-attempt it `retries` more times.
    RequestRetry { error: ProtocolError, retries: u32 },
    /// Raise `error.code` on the workflow instance; no further attempts.
    RaiseTerminal { error: ProtocolError },
}

impl Action {
    pub fn protocol_error(&self) -> &ProtocolError {
        match self {
            Self::RequestRetry { error, .. } | Self::RaiseTerminal { error } => error,
        }
    }

    /// Retries granted by this action; zero for a terminal error.
    pub fn retries(&self) -> u32 {
        match self {
            Self::RequestRetry { retries, .. } => *retries,
            Self::RaiseTerminal { .. } => 0,
        }
    }

    pub fn is_retry(&self) -> bool {
        matches!(self, Self::RequestRetry { .. })
    }
}

/// The classified failure together with the action chosen for it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Decision {
    pub classified: ClassifiedError,
    pub action: Action,
}

/// Retries to grant a job: never more than the engine or the policy allows.
pub fn retries_to_grant(job_remaining_retries: u32, policy_retries: u32) -> u32 {
    job_remaining_retries.min(policy_retries)
}

/// Decide what to do about `raw_error` for a job with
/// `job_remaining_retries` retries left.
pub fn decide<E>(raw_error: E, job_remaining_retries: u32) -> Decision
where
    E: Into<anyhow::Error>,
{
    decide_with(raw_error, job_remaining_retries, std::iter::empty::<(String, String)>())
}

/// Like [`decide`], merging business variables into the error payload.
pub fn decide_with<E, I, K, V>(raw_error: E, job_remaining_retries: u32, business: I) -> Decision
where
    E: Into<anyhow::Error>,
    I: IntoIterator<Item = (K, V)>,
    K: Into<String>,
    V: Into<String>,
{
    let classified = normalize(raw_error);
    let error = to_protocol_error_with(&classified, business);

    let action = if error.retries > 0 && job_remaining_retries > 0 {
        let retries = retries_to_grant(job_remaining_retries, error.retries);
        Action::RequestRetry { error, retries }
    } else {
        Action::RaiseTerminal { error }
    };

    Decision { classified, action }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use taxonomy::ErrorKind;

    #[test]
    fn retryable_kind_with_budget_requests_policy_retries() {
        let decision = decide(ClassifiedError::database_connection_failed("refused"), 5);
        match decision.action {
            Action::RequestRetry { retries, ref error } => {
                assert_eq!(retries, 3);
                assert_eq!(error.code, "DATABASE_UNAVAILABLE");
            }
            other => panic!("expected retry, got {other:?}"),
        }
    }

    #[test]
    fn job_budget_caps_granted_retries() {
        let decision = decide(ClassifiedError::database_connection_failed("refused"), 1);
        assert_eq!(decision.action.retries(), 1);
        assert!(decision.action.is_retry());
    }

    #[test]
    fn non_retryable_kind_is_terminal_regardless_of_budget() {
        for remaining in [0, 1, 3, 100] {
            let decision = decide(ClassifiedError::subscription_invalid("sub-9"), remaining);
            assert!(matches!(decision.action, Action::RaiseTerminal { .. }));
            assert_eq!(decision.action.protocol_error().code, "INVALID_SUBSCRIPTION");
        }
    }

    #[test]
    fn retryable_kind_without_budget_is_terminal() {
        let decision = decide(ClassifiedError::llm_timeout("no answer in 60s"), 0);
        assert!(matches!(decision.action, Action::RaiseTerminal { .. }));
        assert_eq!(decision.action.protocol_error().retries, 1);
    }

    #[test]
    fn unclassified_error_is_internal_and_terminal() {
        let raw = std::io::Error::new(std::io::ErrorKind::Other, "unexpected EOF in mapper");
        let decision = decide(raw, 3);
        assert_eq!(decision.classified.kind(), &ErrorKind::InternalError);
        assert!(!decision.classified.is_retryable());
        assert!(matches!(decision.action, Action::RaiseTerminal { .. }));
        assert_eq!(decision.action.protocol_error().code, "INTERNAL_ERROR");
    }

    #[test]
    fn kind_parsed_from_a_string_decides_like_the_typed_kind() {
        let typed = decide(ClassifiedError::database_connection_failed("x"), 5);
        let parsed: ErrorKind = "DATABASE_CONNECTION_FAILED".parse().unwrap();
        let deserialized: ErrorKind =
            serde_json::from_value(serde_json::json!("DATABASE_CONNECTION_FAILED")).unwrap();

        for kind in [ErrorKind::custom("DATABASE_CONNECTION_FAILED"), parsed, deserialized] {
            let decision = decide(ClassifiedError::new(kind, "x"), 5);
            assert_eq!(decision.action.protocol_error().code, "DATABASE_UNAVAILABLE");
            assert_eq!(decision.action.retries(), typed.action.retries());
            assert!(decision.action.is_retry());
        }
    }

    #[test]
    fn downgraded_error_is_terminal() {
        let err = ClassifiedError::query_timeout("sales").non_retryable();
        assert!(!decide(err, 3).action.is_retry());
    }

    #[test]
    fn business_variables_reach_the_payload() {
        let decision = decide_with(
            ClassifiedError::duplicate_contact("a@example.com"),
            3,
            [("crmContactId", "c-77")],
        );
        let vars = &decision.action.protocol_error().variables;
        assert_eq!(vars["crmContactId"], "c-77");
        assert_eq!(vars["originalErrorCode"], "DUPLICATE_CONTACT");
    }

    #[test]
    fn action_serialises_with_tag() {
        let decision = decide(ClassifiedError::search_timeout("index slow"), 4);
        let json = serde_json::to_value(&decision.action).unwrap();
        assert_eq!(json["action"], "request_retry");
        assert_eq!(json["retries"], 2);
        assert_eq!(json["error"]["code"], "SEARCH_TIMEOUT");
    }

    proptest! {
        #[test]
        fn granted_retries_are_bounded(remaining in 0u32..50, policy in 0u32..4) {
            let granted = retries_to_grant(remaining, policy);
            prop_assert!(granted <= remaining);
            prop_assert!(granted <= policy);
            prop_assert_eq!(granted, remaining.min(policy));
        }

        #[test]
        fn decision_matches_budget(idx in 0usize..ErrorKind::known().len(), remaining in 0u32..10) {
            let kind = ErrorKind::known()[idx].clone();
            let decision = decide(ClassifiedError::new(kind, "x"), remaining);
            let policy = decision.action.protocol_error().retries;
            if policy > 0 && remaining > 0 {
                prop_assert_eq!(decision.action.retries(), remaining.min(policy));
            } else {
                prop_assert!(!decision.action.is_retry());
            }
        }
    }
}
