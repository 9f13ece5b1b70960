//! Job-client error type.

use taxonomy::TransportError;
use thiserror::Error;

/// Errors returned by a [`JobClient`](crate::JobClient) command.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ClientError {
    /// The command never reached the engine, or the connection broke.
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    /// The engine received the command and refused it.
    #[error("engine rejected command for job {job_key}: {reason}")]
    Rejected { job_key: i64, reason: String },

    /// The variables document could not be built or was refused.
    #[error("invalid variables: {0}")]
    InvalidVariables(String),
}
