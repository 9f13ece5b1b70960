//! The vocabulary of classified error kinds.
//!
//! Every failure a worker can report is tagged with exactly one [`ErrorKind`].
//! The wire representation is the SCREAMING_SNAKE_CASE string returned by
//! [`ErrorKind::as_str`]; strings this build does not know parse into
//! [`ErrorKind::Custom`] so newer workers can report kinds older ones ignore.

use std::convert::Infallible;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

// ---------------------------------------------------------------------------
// ErrorCategory
// ---------------------------------------------------------------------------

/// Coarse grouping of kinds, used for logging and for the `errorCategory`
/// variable handed to the workflow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    Authentication,
    Validation,
    NotFound,
    Conflict,
    Transient,
    Timeout,
    Cancelled,
    Internal,
}

impl ErrorCategory {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Authentication => "authentication",
            Self::Validation => "validation",
            Self::NotFound => "not_found",
            Self::Conflict => "conflict",
            Self::Transient => "transient",
            Self::Timeout => "timeout",
            Self::Cancelled => "cancelled",
            Self::Internal => "internal",
        }
    }
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// ErrorKind
// ---------------------------------------------------------------------------

/// Identifier of a classified failure.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    // ------ Authentication / authorization ------
    AuthenticationError,
    AuthorizationDenied,
    SubscriptionInvalid,
    OAuthExchangeFailed,
    TokenExpired,

    // ------ Validation / business rules ------
    ValidationFailed,
    BusinessRuleViolation,
    UnsupportedQueryType,

    // ------ Not found ------
    ResourceNotFound,
    UserNotFound,
    ContactNotFound,

    // ------ Duplicates ------
    DuplicateContact,
    DuplicateRecord,

    // ------ Transient technical failures ------
    DatabaseConnectionFailed,
    QueryExecutionFailed,
    SearchExecutionFailed,
    InsertFailed,
    NotificationFailed,
    ExternalServiceError,
    IdentityProviderUnavailable,
    LlmSynthesisFailed,

    // ------ Timeouts ------
    QueryTimeout,
    SearchTimeout,
    IntentClassificationTimeout,
    TimeoutError,
    /// Timeout whose escalation is modelled by a boundary event in the workflow.
    LlmTimeout,

    // ------ Everything else ------
    OperationCancelled,
    InternalError,

    /// A kind this build does not know. Only built by parsing, so a known kind
    /// string never ends up here.
    Custom(CustomKind),
}

/// Name of a kind unknown to this build.
///
/// The field is private: the only way in is [`ErrorKind::custom`] (or
/// `FromStr`/`Deserialize`), which resolve known names first.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CustomKind(String);

impl CustomKind {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

static KNOWN_KINDS: [ErrorKind; 28] = [
    ErrorKind::AuthenticationError,
    ErrorKind::AuthorizationDenied,
    ErrorKind::SubscriptionInvalid,
    ErrorKind::OAuthExchangeFailed,
    ErrorKind::TokenExpired,
    ErrorKind::ValidationFailed,
    ErrorKind::BusinessRuleViolation,
    ErrorKind::UnsupportedQueryType,
    ErrorKind::ResourceNotFound,
    ErrorKind::UserNotFound,
    ErrorKind::ContactNotFound,
    ErrorKind::DuplicateContact,
    ErrorKind::DuplicateRecord,
    ErrorKind::DatabaseConnectionFailed,
    ErrorKind::QueryExecutionFailed,
    ErrorKind::SearchExecutionFailed,
    ErrorKind::InsertFailed,
    ErrorKind::NotificationFailed,
    ErrorKind::ExternalServiceError,
    ErrorKind::IdentityProviderUnavailable,
    ErrorKind::LlmSynthesisFailed,
    ErrorKind::QueryTimeout,
    ErrorKind::SearchTimeout,
    ErrorKind::IntentClassificationTimeout,
    ErrorKind::TimeoutError,
    ErrorKind::LlmTimeout,
    ErrorKind::OperationCancelled,
    ErrorKind::InternalError,
];

impl ErrorKind {
    /// Every kind known to this build, in declaration order.
    pub fn known() -> &'static [ErrorKind] {
        &KNOWN_KINDS
    }

    /// Build a kind from its wire string, resolving known names first.
    pub fn custom(name: impl AsRef<str>) -> Self {
        match name.as_ref().parse() {
            Ok(kind) => kind,
            Err(never) => match never {},
        }
    }

    /// Stable wire identifier, e.g. `DATABASE_CONNECTION_FAILED`.
    pub fn as_str(&self) -> &str {
        match self {
            Self::AuthenticationError => "AUTHENTICATION_ERROR",
            Self::AuthorizationDenied => "AUTHORIZATION_DENIED",
            Self::SubscriptionInvalid => "SUBSCRIPTION_INVALID",
            Self::OAuthExchangeFailed => "OAUTH_EXCHANGE_FAILED",
            Self::TokenExpired => "TOKEN_EXPIRED",
            Self::ValidationFailed => "VALIDATION_FAILED",
            Self::BusinessRuleViolation => "BUSINESS_RULE_VIOLATION",
            Self::UnsupportedQueryType => "UNSUPPORTED_QUERY_TYPE",
            Self::ResourceNotFound => "RESOURCE_NOT_FOUND",
            Self::UserNotFound => "USER_NOT_FOUND",
            Self::ContactNotFound => "CONTACT_NOT_FOUND",
            Self::DuplicateContact => "DUPLICATE_CONTACT",
            Self::DuplicateRecord => "DUPLICATE_RECORD",
            Self::DatabaseConnectionFailed => "DATABASE_CONNECTION_FAILED",
            Self::QueryExecutionFailed => "QUERY_EXECUTION_FAILED",
            Self::SearchExecutionFailed => "SEARCH_EXECUTION_FAILED",
            Self::InsertFailed => "INSERT_FAILED",
            Self::NotificationFailed => "NOTIFICATION_FAILED",
            Self::ExternalServiceError => "EXTERNAL_SERVICE_ERROR",
            Self::IdentityProviderUnavailable => "IDENTITY_PROVIDER_UNAVAILABLE",
            Self::LlmSynthesisFailed => "LLM_SYNTHESIS_FAILED",
            Self::QueryTimeout => "QUERY_TIMEOUT",
            Self::SearchTimeout => "SEARCH_TIMEOUT",
            Self::IntentClassificationTimeout => "INTENT_CLASSIFICATION_TIMEOUT",
            Self::TimeoutError => "TIMEOUT_ERROR",
            Self::LlmTimeout => "LLM_TIMEOUT",
            Self::OperationCancelled => "OPERATION_CANCELLED",
            Self::InternalError => "INTERNAL_ERROR",
            Self::Custom(custom) => custom.as_str(),
        }
    }

    /// Fixed human-readable summary shown for this kind.
    pub fn message(&self) -> &'static str {
        match self {
            Self::AuthenticationError => "Authentication failed",
            Self::AuthorizationDenied => "Access to the requested resource was denied",
            Self::SubscriptionInvalid => "The subscription is invalid or inactive",
            Self::OAuthExchangeFailed => "OAuth authorization code exchange failed",
            Self::TokenExpired => "The access token has expired",
            Self::ValidationFailed => "Input validation failed",
            Self::BusinessRuleViolation => "A business rule was violated",
            Self::UnsupportedQueryType => "The requested query type is not supported",
            Self::ResourceNotFound => "The requested resource was not found",
            Self::UserNotFound => "The user was not found in the identity provider",
            Self::ContactNotFound => "The contact was not found in the CRM",
            Self::DuplicateContact => "A contact with the same identity already exists",
            Self::DuplicateRecord => "The record already exists",
            Self::DatabaseConnectionFailed => "Could not connect to the database",
            Self::QueryExecutionFailed => "Database query execution failed",
            Self::SearchExecutionFailed => "Search execution failed",
            Self::InsertFailed => "Failed to insert the record",
            Self::NotificationFailed => "Failed to deliver the notification",
            Self::ExternalServiceError => "An external service call failed",
            Self::IdentityProviderUnavailable => "The identity provider is unavailable",
            Self::LlmSynthesisFailed => "Answer synthesis by the language model failed",
            Self::QueryTimeout => "Database query timed out",
            Self::SearchTimeout => "Search timed out",
            Self::IntentClassificationTimeout => "Intent classification timed out",
            Self::TimeoutError => "The operation timed out",
            Self::LlmTimeout => "The language model call timed out",
            Self::OperationCancelled => "The operation was cancelled",
            Self::InternalError | Self::Custom(_) => "An internal error occurred",
        }
    }

    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::AuthenticationError
            | Self::AuthorizationDenied
            | Self::SubscriptionInvalid
            | Self::OAuthExchangeFailed
            | Self::TokenExpired => ErrorCategory::Authentication,

            Self::ValidationFailed | Self::BusinessRuleViolation | Self::UnsupportedQueryType => {
                ErrorCategory::Validation
            }

            Self::ResourceNotFound | Self::UserNotFound | Self::ContactNotFound => {
                ErrorCategory::NotFound
            }

            Self::DuplicateContact | Self::DuplicateRecord => ErrorCategory::Conflict,

            Self::DatabaseConnectionFailed
            | Self::QueryExecutionFailed
            | Self::SearchExecutionFailed
            | Self::InsertFailed
            | Self::NotificationFailed
            | Self::ExternalServiceError
            | Self::IdentityProviderUnavailable
            | Self::LlmSynthesisFailed => ErrorCategory::Transient,

            Self::QueryTimeout
            | Self::SearchTimeout
            | Self::IntentClassificationTimeout
            | Self::TimeoutError
            | Self::LlmTimeout => ErrorCategory::Timeout,

            Self::OperationCancelled => ErrorCategory::Cancelled,
            Self::InternalError | Self::Custom(_) => ErrorCategory::Internal,
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

impl FromStr for ErrorKind {
    type Err = Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let kind = KNOWN_KINDS
            .iter()
            .find(|known| known.as_str() == s)
            .cloned()
            .unwrap_or_else(|| Self::Custom(CustomKind(s.to_owned())));
        Ok(kind)
    }
}

impl Serialize for ErrorKind {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for ErrorKind {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let name = String::deserialize(deserializer)?;
        Ok(Self::custom(name))
    }
}
