//! The canonical classified error and its constructor catalog.

use std::collections::BTreeMap;
use std::fmt::Display;

use chrono::{DateTime, Utc};
use serde::Serialize;
use thiserror::Error;

use crate::{policy, ErrorKind, TransportError};

/// A failure that has been given a kind.
///
/// Retryability is derived from the retry policy of the kind and can only be
/// lowered afterwards (see [`ClassifiedError::non_retryable`]), so a
/// retryable error always has a policy count greater than zero.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize)]
#[error("{kind}: {message}")]
#[serde(rename_all = "camelCase")]
pub struct ClassifiedError {
    kind: ErrorKind,
    message: String,
    detail: String,
    retryable: bool,
    metadata: BTreeMap<String, String>,
    created_at: DateTime<Utc>,
}

impl ClassifiedError {
    /// Classify a failure as `kind`, with the kind's fixed message.
    pub fn new(kind: ErrorKind, detail: impl Into<String>) -> Self {
        Self {
            retryable: policy::is_retryable(&kind),
            message: kind.message().to_owned(),
            detail: detail.into(),
            metadata: BTreeMap::new(),
            created_at: Utc::now(),
            kind,
        }
    }

    /// Mark this error as not worth retrying regardless of its kind, e.g.
    /// because attempts were already exhausted upstream.
    pub fn non_retryable(mut self) -> Self {
        self.retryable = false;
        self
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    /// Override the construction time. Useful when replaying a failure that
    /// was observed earlier.
    pub fn at(mut self, created_at: DateTime<Utc>) -> Self {
        self.created_at = created_at;
        self
    }

    pub fn kind(&self) -> &ErrorKind {
        &self.kind
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn detail(&self) -> &str {
        &self.detail
    }

    pub fn is_retryable(&self) -> bool {
        self.retryable
    }

    pub fn metadata(&self) -> &BTreeMap<String, String> {
        &self.metadata
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Number of retries this error is worth: zero when not retryable,
    /// otherwise the policy count for its kind.
    pub fn retry_count(&self) -> u32 {
        if self.retryable {
            policy::retry_count_for(&self.kind)
        } else {
            0
        }
    }
}

// ---------------------------------------------------------------------------
// Constructor catalog
// ---------------------------------------------------------------------------

impl ClassifiedError {
    // ------ Authentication / authorization ------

    pub fn authentication(detail: impl Into<String>) -> Self {
        Self::new(ErrorKind::AuthenticationError, detail)
    }

    pub fn authorization_denied(resource: impl Display) -> Self {
        Self::new(ErrorKind::AuthorizationDenied, format!("access denied to {resource}"))
            .with_metadata("resource", resource.to_string())
    }

    pub fn subscription_invalid(subscription_id: impl Display) -> Self {
        Self::new(
            ErrorKind::SubscriptionInvalid,
            format!("subscription '{subscription_id}' is invalid or inactive"),
        )
        .with_metadata("subscriptionId", subscription_id.to_string())
    }

    pub fn oauth_exchange_failed(provider: impl Display, cause: impl Display) -> Self {
        Self::new(
            ErrorKind::OAuthExchangeFailed,
            format!("code exchange with {provider} failed: {cause}"),
        )
        .with_metadata("provider", provider.to_string())
    }

    pub fn token_expired(detail: impl Into<String>) -> Self {
        Self::new(ErrorKind::TokenExpired, detail)
    }

    // ------ Validation / business rules ------

    /// Turn the field-level messages of an input validator into one error.
    ///
    /// Each field becomes a `field.<name>` metadata entry.
    pub fn validation_failed<I, F, M>(field_errors: I) -> Self
    where
        I: IntoIterator<Item = (F, M)>,
        F: Into<String>,
        M: Into<String>,
    {
        let mut fields = BTreeMap::new();
        for (field, message) in field_errors {
            fields.insert(field.into(), message.into());
        }

        let detail = fields
            .iter()
            .map(|(field, message)| format!("{field}: {message}"))
            .collect::<Vec<_>>()
            .join("; ");

        let mut err = Self::new(ErrorKind::ValidationFailed, detail);
        for (field, message) in fields {
            err.metadata.insert(format!("field.{field}"), message);
        }
        err
    }

    pub fn business_rule_violation(rule: impl Into<String>) -> Self {
        Self::new(ErrorKind::BusinessRuleViolation, rule)
    }

    pub fn unsupported_query_type(query_type: impl Display) -> Self {
        Self::new(
            ErrorKind::UnsupportedQueryType,
            format!("query type '{query_type}' is not supported"),
        )
        .with_metadata("queryType", query_type.to_string())
    }

    // ------ Not found ------

    pub fn resource_not_found(resource: impl Display) -> Self {
        Self::new(ErrorKind::ResourceNotFound, format!("{resource} not found"))
    }

    pub fn user_not_found(user_id: impl Display) -> Self {
        Self::new(ErrorKind::UserNotFound, format!("user '{user_id}' not found"))
            .with_metadata("userId", user_id.to_string())
    }

    pub fn contact_not_found(contact_id: impl Display) -> Self {
        Self::new(ErrorKind::ContactNotFound, format!("contact '{contact_id}' not found"))
            .with_metadata("contactId", contact_id.to_string())
    }

    // ------ Duplicates ------

    pub fn duplicate_contact(email: impl Display) -> Self {
        Self::new(
            ErrorKind::DuplicateContact,
            format!("a contact with email '{email}' already exists"),
        )
    }

    pub fn duplicate_record(detail: impl Into<String>) -> Self {
        Self::new(ErrorKind::DuplicateRecord, detail)
    }

    // ------ Transient technical failures ------

    pub fn database_connection_failed(cause: impl Display) -> Self {
        Self::new(ErrorKind::DatabaseConnectionFailed, cause.to_string())
    }

    pub fn query_execution_failed(query_type: impl Display, cause: impl Display) -> Self {
        Self::new(
            ErrorKind::QueryExecutionFailed,
            format!("{query_type} query failed: {cause}"),
        )
        .with_metadata("queryType", query_type.to_string())
    }

    pub fn search_execution_failed(cause: impl Display) -> Self {
        Self::new(ErrorKind::SearchExecutionFailed, cause.to_string())
    }

    pub fn insert_failed(table: impl Display, cause: impl Display) -> Self {
        Self::new(ErrorKind::InsertFailed, format!("insert into {table} failed: {cause}"))
    }

    pub fn notification_failed(channel: impl Display, cause: impl Display) -> Self {
        Self::new(
            ErrorKind::NotificationFailed,
            format!("{channel} notification failed: {cause}"),
        )
    }

    pub fn external_service(service: impl Display, cause: impl Display) -> Self {
        Self::new(ErrorKind::ExternalServiceError, format!("{service}: {cause}"))
            .with_metadata("service", service.to_string())
    }

    pub fn identity_provider_unavailable(cause: impl Display) -> Self {
        Self::new(ErrorKind::IdentityProviderUnavailable, cause.to_string())
    }

    pub fn llm_synthesis_failed(cause: impl Display) -> Self {
        Self::new(ErrorKind::LlmSynthesisFailed, cause.to_string())
    }

    // ------ Timeouts ------

    pub fn query_timeout(query_type: impl Display) -> Self {
        Self::new(ErrorKind::QueryTimeout, format!("{query_type} query timed out"))
            .with_metadata("queryType", query_type.to_string())
    }

    pub fn search_timeout(detail: impl Into<String>) -> Self {
        Self::new(ErrorKind::SearchTimeout, detail)
    }

    pub fn intent_classification_timeout(detail: impl Into<String>) -> Self {
        Self::new(ErrorKind::IntentClassificationTimeout, detail)
    }

    pub fn timeout(operation: impl Display) -> Self {
        Self::new(ErrorKind::TimeoutError, format!("{operation} timed out"))
    }

    pub fn llm_timeout(detail: impl Into<String>) -> Self {
        Self::new(ErrorKind::LlmTimeout, detail)
    }

    // ------ Everything else ------

    pub fn cancelled(operation: impl Display) -> Self {
        Self::new(ErrorKind::OperationCancelled, format!("{operation} was cancelled"))
    }

    /// The catch-all. Never retryable.
    pub fn internal(detail: impl Into<String>) -> Self {
        Self::new(ErrorKind::InternalError, detail).non_retryable()
    }
}

// ---------------------------------------------------------------------------
// Normalisation
// ---------------------------------------------------------------------------

/// Coerce any failure into a [`ClassifiedError`].
///
/// An error that already is (or wraps, anywhere in its source chain) a
/// classified error is returned unchanged. Tagged transport failures are
/// classified by their tag. Anything else becomes a non-retryable
/// `INTERNAL_ERROR` carrying the original error text as detail.
pub fn normalize<E>(err: E) -> ClassifiedError
where
    E: Into<anyhow::Error>,
{
    let err = err.into();
    let err = match err.downcast::<ClassifiedError>() {
        Ok(classified) => return classified,
        Err(other) => other,
    };

    if let Some(classified) = err.chain().find_map(|e| e.downcast_ref::<ClassifiedError>()) {
        return classified.clone();
    }
    if let Some(transport) = err.chain().find_map(|e| e.downcast_ref::<TransportError>()) {
        return ClassifiedError::from(transport.clone());
    }

    ClassifiedError::internal(format!("{err:#}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Context;
    use proptest::prelude::*;

    #[test]
    fn retryable_follows_policy() {
        assert!(ClassifiedError::database_connection_failed("refused").is_retryable());
        assert!(ClassifiedError::llm_timeout("30s elapsed").is_retryable());
        assert!(!ClassifiedError::subscription_invalid("sub-1").is_retryable());
        assert!(!ClassifiedError::duplicate_contact("a@b.c").is_retryable());
    }

    #[test]
    fn non_retryable_forces_zero_retries() {
        let err = ClassifiedError::query_timeout("sales").non_retryable();
        assert!(!err.is_retryable());
        assert_eq!(err.retry_count(), 0);
    }

    #[test]
    fn message_is_fixed_per_kind() {
        let a = ClassifiedError::query_timeout("sales");
        let b = ClassifiedError::query_timeout("inventory");
        assert_eq!(a.message(), b.message());
        assert_ne!(a.detail(), b.detail());
    }

    #[test]
    fn validation_failed_collects_fields() {
        let err = ClassifiedError::validation_failed([
            ("email", "is required"),
            ("age", "must be positive"),
        ]);
        assert_eq!(err.kind(), &ErrorKind::ValidationFailed);
        assert_eq!(err.detail(), "age: must be positive; email: is required");
        assert_eq!(err.metadata()["field.email"], "is required");
        assert!(!err.is_retryable());
    }

    #[test]
    fn normalize_returns_classified_error_unchanged() {
        let original = ClassifiedError::contact_not_found("c-42");
        let normalized = normalize(original.clone());
        assert_eq!(normalized, original);
    }

    #[test]
    fn normalize_finds_classified_error_behind_context() {
        let original = ClassifiedError::insert_failed("contacts", "deadlock");
        let wrapped = Err::<(), _>(original.clone())
            .context("creating contact")
            .unwrap_err();
        assert_eq!(normalize(wrapped), original);
    }

    #[test]
    fn unclassified_error_becomes_internal() {
        let raw = anyhow::anyhow!("index out of range").context("mapping CRM fields");
        let err = normalize(raw);
        assert_eq!(err.kind(), &ErrorKind::InternalError);
        assert!(!err.is_retryable());
        assert_eq!(err.detail(), "mapping CRM fields: index out of range");
    }

    #[test]
    fn transport_errors_are_classified_by_tag() {
        let err = normalize(TransportError::from_message("connection refused"));
        assert_eq!(err.kind(), &ErrorKind::ExternalServiceError);
        assert!(err.is_retryable());
    }

    proptest! {
        #[test]
        fn normalize_is_idempotent(text in ".{0,40}") {
            let once = normalize(anyhow::anyhow!(text));
            let twice = normalize(once.clone());
            prop_assert_eq!(once, twice);
        }

        #[test]
        fn non_retryable_errors_have_no_retries(idx in 0usize..ErrorKind::known().len(), downgrade: bool) {
            let mut err = ClassifiedError::new(ErrorKind::known()[idx].clone(), "detail");
            if downgrade {
                err = err.non_retryable();
            }
            if !err.is_retryable() {
                prop_assert_eq!(err.retry_count(), 0);
            } else {
                prop_assert!(err.retry_count() > 0);
            }
        }
    }
}
