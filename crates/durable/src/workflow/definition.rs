//! Workflow trait definition

use async_trait::async_trait;
use serde::{de::DeserializeOwned, Serialize};

use super::WorkflowContext;
use crate::activity::ActivityError;
use crate::error_reasons;
use crate::session::SessionError;

/// Error type for workflow failures
#[derive(Debug, Clone, Serialize, serde::Deserialize, PartialEq, Eq)]
pub struct WorkflowError {
    /// Error message
    pub message: String,

    /// Error code for programmatic handling
    pub code: Option<String>,

    /// Whether the run may be re-run under its workflow retry policy
    pub retryable: bool,
}

impl WorkflowError {
    /// Create a new workflow error
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            code: None,
            retryable: false,
        }
    }

    /// Create a retryable error
    pub fn retryable(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            code: None,
            retryable: true,
        }
    }

    /// Error for a run that observed cancellation
    pub fn cancelled(reason: impl Into<String>) -> Self {
        Self::new(reason).with_code(error_reasons::CANCELLED)
    }

    /// Set the error code
    pub fn with_code(mut self, code: impl Into<String>) -> Self {
        self.code = Some(code.into());
        self
    }

    /// Check whether the error carries the given code
    pub fn has_code(&self, code: &str) -> bool {
        self.code.as_deref() == Some(code)
    }

    /// Check if this error was caused by cancellation
    pub fn is_cancelled(&self) -> bool {
        self.has_code(error_reasons::CANCELLED)
    }
}

impl std::fmt::Display for WorkflowError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for WorkflowError {}

impl From<ActivityError> for WorkflowError {
    fn from(err: ActivityError) -> Self {
        Self {
            message: err.message,
            code: err.reason,
            retryable: err.retryable,
        }
    }
}

impl From<SessionError> for WorkflowError {
    fn from(err: SessionError) -> Self {
        Self::new(err.to_string()).with_code(err.reason())
    }
}

impl From<WorkflowError> for ActivityError {
    fn from(err: WorkflowError) -> Self {
        let error = if err.retryable {
            ActivityError::retryable(err.message)
        } else {
            ActivityError::non_retryable(err.message)
        };
        match err.code {
            Some(code) => error.with_reason(code),
            None => error,
        }
    }
}

/// How a run ended successfully
#[derive(Debug, Clone, PartialEq)]
pub enum WorkflowOutcome<I, O> {
    /// The workflow is done
    Completed(O),
    /// Close this run and start a fresh one with the given input
    ContinueAsNew(I),
}

/// Result of one run of a workflow
pub type WorkflowResult<W> = Result<
    WorkflowOutcome<<W as Workflow>::Input, <W as Workflow>::Output>,
    WorkflowError,
>;

/// A workflow is an orchestration program run by the executor
///
/// Each call to [`run`](Workflow::run) is one physical run. Returning
/// [`WorkflowOutcome::ContinueAsNew`] ends the run and starts a fresh run of
/// the same logical workflow with the given input, so a perpetual loop never
/// accumulates an unbounded history.
///
/// Workflows suspend only through the [`WorkflowContext`]: activity calls,
/// timers, session setup and child starts. All of them observe cancellation.
///
/// # Example
///
/// ```ignore
/// use affinity_durable::prelude::*;
///
/// struct Poller;
///
/// #[async_trait]
/// impl Workflow for Poller {
///     const TYPE: &'static str = "poller";
///     type Input = ();
///     type Output = ();
///
///     async fn run(&self, ctx: &WorkflowContext, _input: ()) -> WorkflowResult<Self> {
///         ctx.execute_activity("poll", json!({}), &ActivityOptions::default()).await?;
///         Ok(WorkflowOutcome::ContinueAsNew(()))
///     }
/// }
/// ```
#[async_trait]
pub trait Workflow: Send + Sync + 'static {
    /// Unique type identifier for this workflow
    ///
    /// This is used to look up the workflow in the registry.
    const TYPE: &'static str;

    /// Input type for starting a run
    type Input: Serialize + DeserializeOwned + Send + Sync + Clone;

    /// Output type when workflow completes successfully
    type Output: Serialize + DeserializeOwned + Send;

    /// Execute one run
    async fn run(&self, ctx: &WorkflowContext, input: Self::Input) -> WorkflowResult<Self>;
}
