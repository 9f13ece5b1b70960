//! Conversion of classified errors into the engine's error-reporting shape.

use std::collections::BTreeMap;

use chrono::SecondsFormat;
use serde::Serialize;

use crate::{ClassifiedError, ErrorKind};

/// Variable holding the internal kind string.
pub const ORIGINAL_ERROR_CODE: &str = "originalErrorCode";
/// Variable holding the RFC3339 time the error was classified.
pub const TIMESTAMP: &str = "timestamp";
/// Variable holding the error category.
pub const ERROR_CATEGORY: &str = "errorCategory";

const RESERVED_VARIABLES: [&str; 3] = [ORIGINAL_ERROR_CODE, TIMESTAMP, ERROR_CATEGORY];

/// The error payload reported to the orchestration engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProtocolError {
    /// Stable code the workflow branches on.
    pub code: String,
    pub message: String,
    pub detail: String,
    pub retryable: bool,
    /// Zero whenever `retryable` is false.
    pub retries: u32,
    /// Variables the engine exposes to the workflow.
    pub variables: BTreeMap<String, String>,
}

/// External code for a kind, if it has one.
///
/// Kinds without an entry are reported under their own kind string.
pub fn external_code_for(kind: &ErrorKind) -> Option<&'static str> {
    let code = match kind {
        ErrorKind::AuthenticationError => "AUTH_FAILED",
        ErrorKind::AuthorizationDenied => "ACCESS_DENIED",
        ErrorKind::SubscriptionInvalid => "INVALID_SUBSCRIPTION",
        ErrorKind::OAuthExchangeFailed => "OAUTH_FAILED",
        ErrorKind::TokenExpired => "TOKEN_EXPIRED",
        ErrorKind::ValidationFailed => "INVALID_INPUT",
        ErrorKind::BusinessRuleViolation => "BUSINESS_RULE_VIOLATION",
        ErrorKind::UnsupportedQueryType => "UNSUPPORTED_QUERY",
        ErrorKind::ResourceNotFound => "NOT_FOUND",
        ErrorKind::UserNotFound => "USER_NOT_FOUND",
        ErrorKind::ContactNotFound => "CONTACT_NOT_FOUND",
        ErrorKind::DuplicateContact => "DUPLICATE_CONTACT",
        ErrorKind::DuplicateRecord => "DUPLICATE_RECORD",
        ErrorKind::DatabaseConnectionFailed => "DATABASE_UNAVAILABLE",
        ErrorKind::QueryExecutionFailed => "QUERY_FAILED",
        ErrorKind::SearchExecutionFailed => "SEARCH_FAILED",
        ErrorKind::InsertFailed => "INSERT_FAILED",
        ErrorKind::NotificationFailed => "NOTIFICATION_FAILED",
        ErrorKind::ExternalServiceError => "EXTERNAL_SERVICE_ERROR",
        ErrorKind::IdentityProviderUnavailable => "IDP_UNAVAILABLE",
        ErrorKind::QueryTimeout => "QUERY_TIMEOUT",
        ErrorKind::SearchTimeout => "SEARCH_TIMEOUT",
        ErrorKind::TimeoutError => "TIMEOUT",
        ErrorKind::LlmTimeout => "LLM_TIMEOUT",
        ErrorKind::OperationCancelled => "CANCELLED",
        ErrorKind::InternalError => "INTERNAL_ERROR",
        ErrorKind::LlmSynthesisFailed
        | ErrorKind::IntentClassificationTimeout
        | ErrorKind::Custom(_) => return None,
    };
    Some(code)
}

/// Convert a classified error with no extra business variables.
pub fn to_protocol_error(err: &ClassifiedError) -> ProtocolError {
    to_protocol_error_with(err, std::iter::empty::<(String, String)>())
}

/// Convert a classified error, merging caller-supplied variables.
///
/// Precedence, lowest first: the error's metadata, then `business`, then the
/// reserved variables, which can never be overwritten. The output depends
/// only on the inputs: the timestamp is the error's own creation time.
pub fn to_protocol_error_with<I, K, V>(err: &ClassifiedError, business: I) -> ProtocolError
where
    I: IntoIterator<Item = (K, V)>,
    K: Into<String>,
    V: Into<String>,
{
    let kind = err.kind();
    let code = external_code_for(kind).unwrap_or(kind.as_str()).to_owned();

    let mut variables = err.metadata().clone();
    for (key, value) in business {
        variables.insert(key.into(), value.into());
    }
    for reserved in RESERVED_VARIABLES {
        variables.remove(reserved);
    }
    variables.insert(ORIGINAL_ERROR_CODE.to_owned(), kind.as_str().to_owned());
    variables.insert(
        TIMESTAMP.to_owned(),
        err.created_at().to_rfc3339_opts(SecondsFormat::Millis, true),
    );
    variables.insert(ERROR_CATEGORY.to_owned(), kind.category().as_str().to_owned());

    ProtocolError {
        code,
        message: err.message().to_owned(),
        detail: err.detail().to_owned(),
        retryable: err.is_retryable(),
        retries: err.retry_count(),
        variables,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use proptest::prelude::*;

    fn fixed_time() -> chrono::DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 1, 12, 30, 0).unwrap()
    }

    #[test]
    fn mapped_kind_uses_external_code() {
        let err = ClassifiedError::database_connection_failed("refused").at(fixed_time());
        let protocol = to_protocol_error(&err);

        assert_eq!(protocol.code, "DATABASE_UNAVAILABLE");
        assert!(protocol.retryable);
        assert_eq!(protocol.retries, 3);
        assert_eq!(protocol.variables[ORIGINAL_ERROR_CODE], "DATABASE_CONNECTION_FAILED");
        assert_eq!(protocol.variables[TIMESTAMP], "2024-03-01T12:30:00.000Z");
        assert_eq!(protocol.variables[ERROR_CATEGORY], "transient");
    }

    #[test]
    fn unmapped_kind_falls_back_to_kind_string() {
        let err = ClassifiedError::llm_synthesis_failed("empty completion");
        assert_eq!(to_protocol_error(&err).code, "LLM_SYNTHESIS_FAILED");

        let custom = ClassifiedError::new(ErrorKind::custom("CRM_QUOTA_EXCEEDED"), "quota");
        let protocol = to_protocol_error(&custom);
        assert_eq!(protocol.code, "CRM_QUOTA_EXCEEDED");
        assert_eq!(protocol.retries, 0);
    }

    #[test]
    fn business_variables_cannot_overwrite_reserved_keys() {
        let err = ClassifiedError::contact_not_found("c-1").at(fixed_time());
        let protocol = to_protocol_error_with(
            &err,
            [
                (ORIGINAL_ERROR_CODE, "spoofed"),
                (TIMESTAMP, "yesterday"),
                (ERROR_CATEGORY, "spoofed"),
                ("crmId", "77"),
            ],
        );

        assert_eq!(protocol.variables[ORIGINAL_ERROR_CODE], "CONTACT_NOT_FOUND");
        assert_eq!(protocol.variables[TIMESTAMP], "2024-03-01T12:30:00.000Z");
        assert_eq!(protocol.variables[ERROR_CATEGORY], "not_found");
        assert_eq!(protocol.variables["crmId"], "77");
        assert_eq!(protocol.variables["contactId"], "c-1");
    }

    #[test]
    fn business_variables_override_metadata() {
        let err = ClassifiedError::user_not_found("u-1");
        let protocol = to_protocol_error_with(&err, [("userId", "u-2")]);
        assert_eq!(protocol.variables["userId"], "u-2");
    }

    #[test]
    fn conversion_is_deterministic_for_fixed_input() {
        let err = ClassifiedError::query_timeout("sales");
        assert_eq!(to_protocol_error(&err), to_protocol_error(&err));
    }

    proptest! {
        #[test]
        fn not_retryable_means_zero_retries(idx in 0usize..ErrorKind::known().len(), downgrade: bool) {
            let mut err = ClassifiedError::new(ErrorKind::known()[idx].clone(), "x");
            if downgrade {
                err = err.non_retryable();
            }
            let protocol = to_protocol_error(&err);
            prop_assert_eq!(protocol.retryable, err.is_retryable());
            if !protocol.retryable {
                prop_assert_eq!(protocol.retries, 0);
            }
        }
    }
}
