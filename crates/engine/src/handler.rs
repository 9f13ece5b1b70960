//! Failure handler — decides, logs, and delivers the decision for a failed job.
//!
//! `FailureHandler` is the single place where an [`Action`] turns into a job
//! client command:
//! 1. [`decide`](crate::decision::decide) what to do,
//! 2. log one [`FailureRecord`] (always, even if delivery fails later),
//! 3. send the command with the error variables,
//! 4. on failure, send it once more without variables,
//! 5. on failure again, log and give up; the engine's job timeout takes over.

use std::future::Future;
use std::sync::Arc;

use jobs::{ClientError, Job, JobClient};
use serde::Serialize;
use serde_json::Value;
use taxonomy::{ErrorCategory, TransportError, TransportErrorKind};
use tracing::{error, info, warn};

use crate::decision::{decide_with, Action, Decision};
use crate::{CallContext, Interrupt};

// ---------------------------------------------------------------------------
// Outcome types
// ---------------------------------------------------------------------------

/// The audit record logged for every failed job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FailureRecord {
    pub job_key: i64,
    pub job_type: String,
    pub process_instance_key: i64,
    pub error_kind: String,
    pub error_code: String,
    pub message: String,
    pub detail: String,
    pub retryable: bool,
    pub retries: u32,
    pub category: ErrorCategory,
}

impl FailureRecord {
    fn new(job: &Job, decision: &Decision) -> Self {
        let error = decision.action.protocol_error();
        Self {
            job_key: job.key,
            job_type: job.job_type.clone(),
            process_instance_key: job.process_instance_key,
            error_kind: decision.classified.kind().to_string(),
            error_code: error.code.clone(),
            message: error.message.clone(),
            detail: error.detail.clone(),
            retryable: error.retryable,
            retries: error.retries,
            category: decision.classified.kind().category(),
        }
    }
}

/// How far the decision got towards the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DeliveryOutcome {
    Delivered,
    /// The first send failed; the bare command without variables went through.
    DeliveredWithoutVariables,
    /// Both sends failed. Nothing more can be done from a job handler.
    Undelivered,
}

/// Everything the handler did about one failed job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HandledFailure {
    pub action: Action,
    pub record: FailureRecord,
    pub delivery: DeliveryOutcome,
}

/// Result of [`run_job`].
#[derive(Debug, Clone, PartialEq)]
pub enum JobOutcome {
    Completed,
    /// The business logic succeeded but the completion could not be reported.
    CompletionUndelivered(ClientError),
    Failed(HandledFailure),
}

// ---------------------------------------------------------------------------
// FailureHandler
// ---------------------------------------------------------------------------

/// Turns job failures into engine commands.
///
/// Holds no per-job state; share one handler across all job handlers.
#[derive(Clone)]
pub struct FailureHandler {
    client: Arc<dyn JobClient>,
}

impl FailureHandler {
    pub fn new(client: Arc<dyn JobClient>) -> Self {
        Self { client }
    }

    pub fn client(&self) -> &Arc<dyn JobClient> {
        &self.client
    }

    /// Handle a failure of `job`.
    ///
    /// Never fails: delivery problems are logged and reported in
    /// [`HandledFailure::delivery`].
    pub async fn handle<E>(&self, job: &Job, err: E, ctx: &CallContext) -> HandledFailure
    where
        E: Into<anyhow::Error>,
    {
        self.handle_with(job, err, std::iter::empty::<(String, String)>(), ctx)
            .await
    }

    /// Like [`handle`](Self::handle), merging business variables into the payload.
    pub async fn handle_with<E, I, K, V>(
        &self,
        job: &Job,
        err: E,
        business: I,
        ctx: &CallContext,
    ) -> HandledFailure
    where
        E: Into<anyhow::Error>,
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let decision = decide_with(err, job.remaining_retries(), business);
        let record = FailureRecord::new(job, &decision);
        log_failure(&record, &decision.action);

        let delivery = self.deliver(job, &decision.action, ctx).await;

        HandledFailure {
            action: decision.action,
            record,
            delivery,
        }
    }

    async fn deliver(&self, job: &Job, action: &Action, ctx: &CallContext) -> DeliveryOutcome {
        if let Some(interrupt) = ctx.interrupted() {
            warn!(
                job_key = job.key,
                "job context already {interrupt}; reporting failure best-effort"
            );
        }

        let first = match serde_json::to_value(&action.protocol_error().variables) {
            Ok(variables) => self.send(job, action, Some(variables), ctx).await,
            Err(e) => Err(ClientError::InvalidVariables(e.to_string())),
        };

        let first_err = match first {
            Ok(()) => return DeliveryOutcome::Delivered,
            Err(e) => e,
        };
        warn!(
            job_key = job.key,
            "failed to report job failure with variables, retrying without: {first_err}"
        );

        match self.send(job, action, None, ctx).await {
            Ok(()) => DeliveryOutcome::DeliveredWithoutVariables,
            Err(e) => {
                error!(
                    job_key = job.key,
                    job_type = %job.job_type,
                    "failed to report job failure, leaving it to the engine job timeout: {e}"
                );
                DeliveryOutcome::Undelivered
            }
        }
    }

    async fn send(
        &self,
        job: &Job,
        action: &Action,
        variables: Option<Value>,
        ctx: &CallContext,
    ) -> Result<(), ClientError> {
        let command = async {
            match action {
                Action::RequestRetry { error, retries } => {
                    self.client
                        .request_retry(job.key, *retries, &error.message, variables)
                        .await
                }
                Action::RaiseTerminal { error } => {
                    self.client
                        .raise_terminal(job.key, &error.code, &error.message, variables)
                        .await
                }
            }
        };
        bounded(command, ctx).await
    }
}

// ---------------------------------------------------------------------------
// run_job
// ---------------------------------------------------------------------------

/// Run `work` for `job` and report the outcome to the engine.
///
/// `work` is bounded by `ctx`; running out of time counts as a failure of the
/// job like any other.
pub async fn run_job<W, Fut, E>(
    handler: &FailureHandler,
    job: &Job,
    ctx: &CallContext,
    work: W,
) -> JobOutcome
where
    W: FnOnce(Job) -> Fut,
    Fut: Future<Output = Result<Value, E>>,
    E: Into<anyhow::Error>,
{
    let result = match ctx.run(work(job.clone())).await {
        Ok(Ok(output)) => Ok(output),
        Ok(Err(e)) => Err(e.into()),
        Err(interrupt) => Err(anyhow::Error::new(interrupt.classify(&job.job_type))),
    };

    match result {
        Ok(output) => {
            let variables = (!output.is_null()).then_some(output);
            match bounded(handler.client().complete_job(job.key, variables), ctx).await {
                Ok(()) => {
                    info!(job_key = job.key, job_type = %job.job_type, "job completed");
                    JobOutcome::Completed
                }
                Err(e) => {
                    error!(job_key = job.key, job_type = %job.job_type, "failed to complete job: {e}");
                    JobOutcome::CompletionUndelivered(e)
                }
            }
        }
        Err(e) => JobOutcome::Failed(handler.handle(job, e, ctx).await),
    }
}

// ---------------------------------------------------------------------------
// Internal helpers
// ---------------------------------------------------------------------------

/// Bound an engine command by `ctx`, unless `ctx` is already over, in which
/// case the command still gets its one shot.
async fn bounded<F>(command: F, ctx: &CallContext) -> Result<(), ClientError>
where
    F: Future<Output = Result<(), ClientError>>,
{
    if ctx.interrupted().is_some() {
        return command.await;
    }
    match ctx.run(command).await {
        Ok(result) => result,
        Err(interrupt) => Err(ClientError::Transport(interrupt_transport_error(interrupt))),
    }
}

fn interrupt_transport_error(interrupt: Interrupt) -> TransportError {
    let kind = match interrupt {
        Interrupt::Cancelled => TransportErrorKind::Other,
        Interrupt::DeadlineElapsed => TransportErrorKind::DeadlineExceeded,
    };
    TransportError::new(kind, format!("job context {interrupt}"))
}

fn log_failure(record: &FailureRecord, action: &Action) {
    match action {
        Action::RequestRetry { retries, .. } => warn!(
            job_key = record.job_key,
            job_type = %record.job_type,
            process_instance_key = record.process_instance_key,
            error_kind = %record.error_kind,
            error_code = %record.error_code,
            error_message = %record.message,
            error_detail = %record.detail,
            retryable = record.retryable,
            retries = record.retries,
            granted = *retries,
            category = %record.category,
            "job failed; requesting retry"
        ),
        Action::RaiseTerminal { .. } => error!(
            job_key = record.job_key,
            job_type = %record.job_type,
            process_instance_key = record.process_instance_key,
            error_kind = %record.error_kind,
            error_code = %record.error_code,
            error_message = %record.message,
            error_detail = %record.detail,
            retryable = record.retryable,
            retries = record.retries,
            category = %record.category,
            "job failed; raising terminal error"
        ),
    }
}
