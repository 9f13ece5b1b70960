//! `MockJobClient` — a test double for `JobClient`.
//!
//! Records every command it receives and answers with a behaviour chosen at
//! construction time, so tests can exercise delivery fallbacks without an
//! engine.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde_json::Value;

use crate::{ClientError, JobClient};

/// Behaviour injected into `MockJobClient` at construction time.
#[derive(Debug, Clone)]
pub enum MockBehaviour {
    /// Accept every command.
    Accept,
    /// Refuse commands that carry variables, accept the rest.
    RejectVariables(ClientError),
    /// Refuse every command.
    FailAlways(ClientError),
}

/// A command seen by the mock, in call order.
#[derive(Debug, Clone, PartialEq)]
pub enum RecordedCall {
    Complete {
        job_key: i64,
        variables: Option<Value>,
    },
    RequestRetry {
        job_key: i64,
        retries: u32,
        error_message: String,
        variables: Option<Value>,
    },
    RaiseTerminal {
        job_key: i64,
        error_code: String,
        error_message: String,
        variables: Option<Value>,
    },
}

impl RecordedCall {
    pub fn variables(&self) -> Option<&Value> {
        match self {
            Self::Complete { variables, .. }
            | Self::RequestRetry { variables, .. }
            | Self::RaiseTerminal { variables, .. } => variables.as_ref(),
        }
    }
}

pub struct MockJobClient {
    pub behaviour: MockBehaviour,
    pub calls: Arc<Mutex<Vec<RecordedCall>>>,
}

impl MockJobClient {
    /// Create a mock that accepts every command.
    pub fn accepting() -> Self {
        Self::with_behaviour(MockBehaviour::Accept)
    }

    /// Create a mock that refuses commands carrying variables.
    pub fn rejecting_variables(err: ClientError) -> Self {
        Self::with_behaviour(MockBehaviour::RejectVariables(err))
    }

    /// Create a mock that refuses every command.
    pub fn failing(err: ClientError) -> Self {
        Self::with_behaviour(MockBehaviour::FailAlways(err))
    }

    pub fn with_behaviour(behaviour: MockBehaviour) -> Self {
        Self {
            behaviour,
            calls: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Every command received so far.
    pub fn calls(&self) -> Vec<RecordedCall> {
        self.calls.lock().unwrap().clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    fn record(&self, call: RecordedCall) -> Result<(), ClientError> {
        let has_variables = call.variables().is_some();
        self.calls.lock().unwrap().push(call);

        match &self.behaviour {
            MockBehaviour::Accept => Ok(()),
            MockBehaviour::RejectVariables(err) if has_variables => Err(err.clone()),
            MockBehaviour::RejectVariables(_) => Ok(()),
            MockBehaviour::FailAlways(err) => Err(err.clone()),
        }
    }
}

#[async_trait]
impl JobClient for MockJobClient {
    async fn complete_job(&self, job_key: i64, variables: Option<Value>) -> Result<(), ClientError> {
        self.record(RecordedCall::Complete { job_key, variables })
    }

    async fn request_retry(
        &self,
        job_key: i64,
        retries: u32,
        error_message: &str,
        variables: Option<Value>,
    ) -> Result<(), ClientError> {
        self.record(RecordedCall::RequestRetry {
            job_key,
            retries,
            error_message: error_message.to_owned(),
            variables,
        })
    }

    async fn raise_terminal(
        &self,
        job_key: i64,
        error_code: &str,
        error_message: &str,
        variables: Option<Value>,
    ) -> Result<(), ClientError> {
        self.record(RecordedCall::RaiseTerminal {
            job_key,
            error_code: error_code.to_owned(),
            error_message: error_message.to_owned(),
            variables,
        })
    }
}
