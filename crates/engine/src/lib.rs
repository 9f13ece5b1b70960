//! `engine` crate — what happens between "a job failed" and "the engine knows".
//!
//! - [`decision`]: classify a failure and choose retry or terminal error.
//! - [`handler`]: log the decision and deliver it through a [`jobs::JobClient`].
//! - [`retry`]: bounded, cancellable exponential backoff for direct engine calls.

pub mod config;
pub mod context;
pub mod decision;
pub mod error;
pub mod handler;
pub mod retry;

pub use config::BackoffConfig;
pub use context::{CallContext, Interrupt};
pub use decision::{decide, decide_with, retries_to_grant, Action, Decision};
pub use error::RetryError;
pub use handler::{run_job, DeliveryOutcome, FailureHandler, FailureRecord, HandledFailure, JobOutcome};
pub use retry::{backoff_delay, execute_with_retry, BackoffState};
