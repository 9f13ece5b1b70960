//! `taxonomy` crate — the vocabulary of job failures.
//!
//! Pure data and lookup tables, safe to use from any number of job handlers
//! at once:
//! - [`ErrorKind`] / [`ClassifiedError`] and the constructor catalog,
//! - [`normalize`], which coerces any error into a classified one,
//! - the retry policy table ([`policy`]),
//! - conversion into the engine's error payload ([`protocol`]),
//! - tagged failures of engine calls ([`TransportError`]).

pub mod error;
pub mod kind;
pub mod policy;
pub mod protocol;
pub mod transport;

pub use error::{normalize, ClassifiedError};
pub use kind::{CustomKind, ErrorCategory, ErrorKind};
pub use policy::{retry_count_for, RetryTier};
pub use protocol::{to_protocol_error, to_protocol_error_with, ProtocolError};
pub use transport::{TransportError, TransportErrorKind};
