//! Tagged failures of calls made to the orchestration engine.
//!
//! Transports that expose status codes should build a [`TransportError`]
//! with the matching [`TransportErrorKind`] directly. Transports that only
//! give back text go through [`TransportError::from_message`], which sniffs
//! the text once, at the boundary, so nothing downstream has to.

use std::fmt;
use std::io;

use serde::Serialize;
use thiserror::Error;

use crate::{ClassifiedError, ErrorKind};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TransportErrorKind {
    Unavailable,
    DeadlineExceeded,
    NotFound,
    AlreadyExists,
    PermissionDenied,
    Other,
}

impl TransportErrorKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Unavailable => "unavailable",
            Self::DeadlineExceeded => "deadline_exceeded",
            Self::NotFound => "not_found",
            Self::AlreadyExists => "already_exists",
            Self::PermissionDenied => "permission_denied",
            Self::Other => "other",
        }
    }
}

impl fmt::Display for TransportErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Substrings that mark a failure as transient, with the tag they imply.
/// Matched against lowercased text; the unspaced forms catch gRPC status
/// names such as `code = DeadlineExceeded`.
const TRANSIENT_SIGNATURES: &[(&str, TransportErrorKind)] = &[
    ("deadline exceeded", TransportErrorKind::DeadlineExceeded),
    ("deadlineexceeded", TransportErrorKind::DeadlineExceeded),
    ("timed out", TransportErrorKind::DeadlineExceeded),
    ("timeout", TransportErrorKind::DeadlineExceeded),
    ("connection refused", TransportErrorKind::Unavailable),
    ("connection reset", TransportErrorKind::Unavailable),
    ("unavailable", TransportErrorKind::Unavailable),
    ("unreachable", TransportErrorKind::Unavailable),
    ("broken pipe", TransportErrorKind::Unavailable),
];

const PERMANENT_SIGNATURES: &[(&str, TransportErrorKind)] = &[
    ("not found", TransportErrorKind::NotFound),
    ("notfound", TransportErrorKind::NotFound),
    ("already exists", TransportErrorKind::AlreadyExists),
    ("alreadyexists", TransportErrorKind::AlreadyExists),
    ("permission denied", TransportErrorKind::PermissionDenied),
    ("permissiondenied", TransportErrorKind::PermissionDenied),
    ("unauthenticated", TransportErrorKind::PermissionDenied),
    ("unauthorized", TransportErrorKind::PermissionDenied),
];

/// A failed call to the engine's command interface.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{kind}: {message}")]
pub struct TransportError {
    pub kind: TransportErrorKind,
    pub message: String,
}

impl TransportError {
    pub fn new(kind: TransportErrorKind, message: impl Into<String>) -> Self {
        Self { kind, message: message.into() }
    }

    /// Tag an untyped failure by matching its text against known signatures.
    pub fn from_message(message: impl Into<String>) -> Self {
        let message = message.into();
        let lower = message.to_lowercase();

        let kind = TRANSIENT_SIGNATURES
            .iter()
            .chain(PERMANENT_SIGNATURES)
            .find(|(signature, _)| lower.contains(signature))
            .map(|&(_, kind)| kind)
            .unwrap_or(TransportErrorKind::Other);

        Self { kind, message }
    }

    /// Whether the same call may succeed if simply tried again.
    pub fn is_transient(&self) -> bool {
        matches!(
            self.kind,
            TransportErrorKind::Unavailable | TransportErrorKind::DeadlineExceeded
        )
    }

    /// The classified kind this failure maps to.
    pub fn classified_kind(&self) -> ErrorKind {
        match self.kind {
            TransportErrorKind::Unavailable | TransportErrorKind::Other => {
                ErrorKind::ExternalServiceError
            }
            TransportErrorKind::DeadlineExceeded => ErrorKind::TimeoutError,
            TransportErrorKind::NotFound => ErrorKind::ResourceNotFound,
            TransportErrorKind::AlreadyExists => ErrorKind::BusinessRuleViolation,
            TransportErrorKind::PermissionDenied => ErrorKind::AuthenticationError,
        }
    }
}

impl From<TransportError> for ClassifiedError {
    fn from(err: TransportError) -> Self {
        ClassifiedError::new(err.classified_kind(), err.message)
            .with_metadata("transportKind", err.kind.as_str())
    }
}

impl From<io::Error> for TransportError {
    fn from(err: io::Error) -> Self {
        let kind = match err.kind() {
            io::ErrorKind::ConnectionRefused
            | io::ErrorKind::ConnectionReset
            | io::ErrorKind::ConnectionAborted
            | io::ErrorKind::NotConnected
            | io::ErrorKind::BrokenPipe
            | io::ErrorKind::AddrNotAvailable => TransportErrorKind::Unavailable,
            io::ErrorKind::TimedOut => TransportErrorKind::DeadlineExceeded,
            io::ErrorKind::NotFound => TransportErrorKind::NotFound,
            io::ErrorKind::AlreadyExists => TransportErrorKind::AlreadyExists,
            io::ErrorKind::PermissionDenied => TransportErrorKind::PermissionDenied,
            // Unstable kinds such as HostUnreachable only show up in the text.
            _ => return Self::from_message(err.to_string()),
        };
        Self::new(kind, err.to_string())
    }
}
