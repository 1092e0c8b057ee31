//! Workflow events for persistence

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{ActivityOptions, WorkflowError};
use crate::activity::ActivityError;
use crate::reliability::TimeoutType;

/// Events in a run's history
///
/// These events form the append-only log for one physical run. They are
/// used for auditing and debugging; a continue-as-new starts a fresh
/// history under the new run id.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum WorkflowEvent {
    // =========================================================================
    // Workflow Lifecycle Events
    // =========================================================================
    /// Run was started with the given input
    WorkflowStarted {
        /// The input provided when starting the run
        input: serde_json::Value,

        /// Attempt of this run under the run retry policy (1-based)
        attempt: u32,
    },

    /// Workflow completed successfully
    WorkflowCompleted {
        /// The result value
        result: serde_json::Value,
    },

    /// Workflow failed with an error
    WorkflowFailed {
        /// Error details
        error: WorkflowError,
    },

    /// Workflow was cancelled
    WorkflowCancelled {
        /// Reason for cancellation
        reason: String,
    },

    /// Run ended and a fresh run took over the logical workflow
    WorkflowContinuedAsNew {
        /// Run that replaces this one
        next_run_id: Uuid,
    },

    // =========================================================================
    // Activity Lifecycle Events
    // =========================================================================
    /// Activity was scheduled for execution
    ActivityScheduled {
        /// Unique activity identifier within the run
        activity_id: String,

        /// Type of activity to execute
        activity_type: String,

        /// Input for the activity
        input: serde_json::Value,

        /// Execution options
        options: ActivityOptions,
    },

    /// Activity attempt started on a worker
    ActivityStarted {
        /// Activity identifier
        activity_id: String,

        /// Current attempt number (1-based)
        attempt: u32,

        /// ID of the worker executing the activity
        worker_id: String,

        /// Session the attempt ran in, if any
        session_id: Option<Uuid>,
    },

    /// Activity completed successfully
    ActivityCompleted {
        /// Activity identifier
        activity_id: String,

        /// Result returned by the activity
        result: serde_json::Value,
    },

    /// Activity attempt failed (may or may not retry)
    ActivityFailed {
        /// Activity identifier
        activity_id: String,

        /// Attempt that failed
        attempt: u32,

        /// Error details
        error: ActivityError,

        /// Backoff before the next attempt, if one follows
        retry_delay_ms: Option<u64>,
    },

    /// Activity attempt timed out
    ActivityTimedOut {
        /// Activity identifier
        activity_id: String,

        /// Attempt that timed out
        attempt: u32,

        /// Type of timeout that occurred
        timeout_type: TimeoutType,
    },

    /// Activity was cancelled
    ActivityCancelled {
        /// Activity identifier
        activity_id: String,

        /// Reason for cancellation
        reason: String,
    },

    // =========================================================================
    // Timer Events
    // =========================================================================
    /// Timer was started
    TimerStarted {
        /// Timer identifier
        timer_id: String,

        /// Duration in milliseconds
        duration_ms: u64,
    },

    /// Timer fired (duration elapsed)
    TimerFired {
        /// Timer identifier
        timer_id: String,
    },

    // =========================================================================
    // Session Events
    // =========================================================================
    /// A session was bound to a worker
    SessionCreated {
        session_id: Uuid,
        worker_id: String,
        /// Whether the session continues an earlier chain
        recreated: bool,
    },

    /// Session binding was released
    SessionCompleted { session_id: Uuid },

    /// Session failed (worker lost or deadline passed)
    SessionFailed { session_id: Uuid, reason: String },

    // =========================================================================
    // Child Workflow Events
    // =========================================================================
    /// Child workflow was accepted
    ChildWorkflowStarted {
        /// Child workflow ID
        workflow_id: String,

        /// First run of the child
        run_id: Uuid,

        /// Type of the child workflow
        workflow_type: String,
    },
}

impl WorkflowEvent {
    /// Get the activity_id if this is an activity-related event
    pub fn activity_id(&self) -> Option<&str> {
        match self {
            Self::ActivityScheduled { activity_id, .. }
            | Self::ActivityStarted { activity_id, .. }
            | Self::ActivityCompleted { activity_id, .. }
            | Self::ActivityFailed { activity_id, .. }
            | Self::ActivityTimedOut { activity_id, .. }
            | Self::ActivityCancelled { activity_id, .. } => Some(activity_id),
            _ => None,
        }
    }

    /// Check if this event closes the run
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::WorkflowCompleted { .. }
                | Self::WorkflowFailed { .. }
                | Self::WorkflowCancelled { .. }
                | Self::WorkflowContinuedAsNew { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_workflow_event_serialization() {
        let event = WorkflowEvent::WorkflowStarted {
            input: json!({"image_address": "https://images.example/x.jpg"}),
            attempt: 1,
        };

        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains("\"type\":\"workflow_started\""));

        let parsed: WorkflowEvent = serde_json::from_str(&json).unwrap();
        assert_eq!(event, parsed);
    }

    #[test]
    fn test_activity_id_extraction() {
        let event = WorkflowEvent::ActivityStarted {
            activity_id: "downloadImageActivity-1".to_string(),
            attempt: 1,
            worker_id: "worker-1".to_string(),
            session_id: None,
        };
        assert_eq!(event.activity_id(), Some("downloadImageActivity-1"));

        let event = WorkflowEvent::SessionCompleted {
            session_id: Uuid::now_v7(),
        };
        assert_eq!(event.activity_id(), None);
    }

    #[test]
    fn test_is_terminal() {
        assert!(WorkflowEvent::WorkflowCompleted { result: json!({}) }.is_terminal());
        assert!(WorkflowEvent::WorkflowFailed {
            error: WorkflowError::new("error")
        }
        .is_terminal());
        assert!(WorkflowEvent::WorkflowContinuedAsNew {
            next_run_id: Uuid::now_v7()
        }
        .is_terminal());

        assert!(!WorkflowEvent::TimerFired {
            timer_id: "timer-1".to_string()
        }
        .is_terminal());
    }
}
