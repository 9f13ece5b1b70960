//! `jobs` crate — the contracts a failure handler needs from the engine side.
//!
//! A [`Job`] is the record the orchestration engine hands a worker; a
//! [`JobClient`] is the command interface used to report back. How jobs are
//! fetched and how workers register is somebody else's business.

pub mod error;
pub mod mock;
pub mod traits;

pub use error::ClientError;
pub use traits::{Job, JobClient};
