//! The job record and the `JobClient` trait.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::ClientError;

/// A unit of work dispatched by the orchestration engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Job {
    /// Unique key of this job, used in every command about it.
    pub key: i64,
    /// Task type the worker subscribed to, e.g. `crm-create-contact`.
    #[serde(rename = "type")]
    pub job_type: String,
    /// Key of the workflow instance that owns the job.
    pub process_instance_key: i64,
    /// Retries the engine still allows for this job.
    pub retries: i32,
    /// Input variables of the job.
    #[serde(default)]
    pub variables: Value,
}

impl Job {
    /// Convenience constructor for testing.
    pub fn new(key: i64, job_type: impl Into<String>, process_instance_key: i64, retries: i32) -> Self {
        Self {
            key,
            job_type: job_type.into(),
            process_instance_key,
            retries,
            variables: Value::Null,
        }
    }

    /// Remaining retries, with negative engine values read as none left.
    pub fn remaining_retries(&self) -> u32 {
        u32::try_from(self.retries).unwrap_or(0)
    }
}

/// Commands a worker sends to the engine about a job.
///
/// `variables`, when present, is a JSON object the engine merges into the
/// workflow instance.
#[async_trait]
pub trait JobClient: Send + Sync {
    /// Report success.
    async fn complete_job(&self, job_key: i64, variables: Option<Value>) -> Result<(), ClientError>;

    /// Report a failure and let the engine re-attempt the job `retries` more times.
    async fn request_retry(
        &self,
        job_key: i64,
        retries: u32,
        error_message: &str,
        variables: Option<Value>,
    ) -> Result<(), ClientError>;

    /// Raise a named error on the workflow instance; the job is not retried.
    async fn raise_terminal(
        &self,
        job_key: i64,
        error_code: &str,
        error_message: &str,
        variables: Option<Value>,
    ) -> Result<(), ClientError>;
}
