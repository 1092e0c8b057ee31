//! Activity, child workflow and run options

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::reliability::{duration_millis, option_duration_millis, RetryPolicy};

/// Options for activity execution
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ActivityOptions {
    /// Retry policy for this activity
    pub retry_policy: RetryPolicy,

    /// Maximum time to wait for a worker slot
    #[serde(with = "duration_millis")]
    pub schedule_to_start_timeout: Duration,

    /// Maximum time for a single attempt (from start to completion)
    #[serde(with = "duration_millis")]
    pub start_to_close_timeout: Duration,
}

impl Default for ActivityOptions {
    fn default() -> Self {
        Self {
            retry_policy: RetryPolicy::default(),
            schedule_to_start_timeout: Duration::from_secs(60),
            start_to_close_timeout: Duration::from_secs(300),
        }
    }
}

impl ActivityOptions {
    /// Create options with a specific retry policy
    pub fn with_retry(mut self, policy: RetryPolicy) -> Self {
        self.retry_policy = policy;
        self
    }

    /// Set the schedule-to-start timeout
    pub fn with_schedule_to_start_timeout(mut self, timeout: Duration) -> Self {
        self.schedule_to_start_timeout = timeout;
        self
    }

    /// Set the start-to-close timeout
    pub fn with_start_to_close_timeout(mut self, timeout: Duration) -> Self {
        self.start_to_close_timeout = timeout;
        self
    }
}

/// What happens to a child when its parent run closes
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ParentClosePolicy {
    /// The child keeps running on its own
    #[default]
    Abandon,
    /// The child is cancelled when the parent run closes
    RequestCancel,
}

/// Options for starting a run
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct WorkflowOptions {
    /// Upper bound for a single run; `None` uses the executor default
    #[serde(default, with = "option_duration_millis")]
    pub execution_timeout: Option<Duration>,

    /// Re-run a failed run with the same input according to this policy
    #[serde(default)]
    pub retry_policy: Option<RetryPolicy>,
}

impl WorkflowOptions {
    /// Set the execution timeout
    pub fn with_execution_timeout(mut self, timeout: Duration) -> Self {
        self.execution_timeout = Some(timeout);
        self
    }

    /// Set the run retry policy
    pub fn with_retry(mut self, policy: RetryPolicy) -> Self {
        self.retry_policy = Some(policy);
        self
    }
}

/// Options for starting a child workflow
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ChildWorkflowOptions {
    /// Logical ID of the child; defaults to `<workflow type>_<uuid>`
    #[serde(default)]
    pub workflow_id: Option<String>,

    /// Execution budget of each child run
    #[serde(default, with = "option_duration_millis")]
    pub execution_timeout: Option<Duration>,

    /// Re-run the child on failure according to this policy
    #[serde(default)]
    pub retry_policy: Option<RetryPolicy>,

    #[serde(default)]
    pub parent_close_policy: ParentClosePolicy,
}

impl ChildWorkflowOptions {
    /// Set the child's workflow ID
    pub fn with_workflow_id(mut self, workflow_id: impl Into<String>) -> Self {
        self.workflow_id = Some(workflow_id.into());
        self
    }

    /// Set the execution timeout
    pub fn with_execution_timeout(mut self, timeout: Duration) -> Self {
        self.execution_timeout = Some(timeout);
        self
    }

    /// Set the child retry policy
    pub fn with_retry(mut self, policy: RetryPolicy) -> Self {
        self.retry_policy = Some(policy);
        self
    }

    /// Set the parent close policy
    pub fn with_parent_close_policy(mut self, policy: ParentClosePolicy) -> Self {
        self.parent_close_policy = policy;
        self
    }

    pub(crate) fn run_options(&self) -> WorkflowOptions {
        WorkflowOptions {
            execution_timeout: self.execution_timeout,
            retry_policy: self.retry_policy.clone(),
        }
    }
}
