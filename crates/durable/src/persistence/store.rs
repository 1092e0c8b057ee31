//! WorkflowEventStore trait definition

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::workflow::{WorkflowError, WorkflowEvent};

/// Error type for store operations
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// Run not found
    #[error("run not found: {0}")]
    RunNotFound(Uuid),

    /// A run with this ID already exists
    #[error("run already exists: {0}")]
    DuplicateRun(Uuid),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(String),
}

/// Status of a physical run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkflowStatus {
    /// Run is executing
    Running,

    /// Workflow completed successfully
    Completed,

    /// Run failed
    Failed,

    /// Run was cancelled
    Cancelled,

    /// Run closed and handed over to a fresh run
    ContinuedAsNew,
}

impl WorkflowStatus {
    /// Check if the run is closed
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Running)
    }
}

impl std::fmt::Display for WorkflowStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Running => write!(f, "running"),
            Self::Completed => write!(f, "completed"),
            Self::Failed => write!(f, "failed"),
            Self::Cancelled => write!(f, "cancelled"),
            Self::ContinuedAsNew => write!(f, "continued_as_new"),
        }
    }
}

/// Run that started a child workflow
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ParentRun {
    pub workflow_id: String,
    pub run_id: Uuid,
}

/// Definition of a run to be recorded
#[derive(Debug, Clone)]
pub struct NewRun {
    pub workflow_id: String,
    pub run_id: Uuid,
    pub workflow_type: String,
    pub input: serde_json::Value,
    pub parent: Option<ParentRun>,
    /// Attempt under the run retry policy (1-based)
    pub attempt: u32,
    /// Run this one continues, for continue-as-new and retries
    pub continued_from: Option<Uuid>,
}

/// Run record
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RunInfo {
    pub workflow_id: String,
    pub run_id: Uuid,
    pub workflow_type: String,
    pub status: WorkflowStatus,
    pub input: serde_json::Value,
    pub result: Option<serde_json::Value>,
    pub error: Option<WorkflowError>,
    pub parent: Option<ParentRun>,
    pub attempt: u32,
    pub continued_from: Option<Uuid>,
    pub started_at: DateTime<Utc>,
    pub closed_at: Option<DateTime<Utc>>,
}

/// Store for run records and their event histories
///
/// Implementations must be thread-safe and support concurrent access.
#[async_trait]
pub trait WorkflowEventStore: Send + Sync + 'static {
    /// Record a new run in `Running` state
    async fn create_run(&self, run: NewRun) -> Result<(), StoreError>;

    /// Append an event to a run's history
    ///
    /// Returns the sequence number of the appended event.
    async fn append_event(&self, run_id: Uuid, event: WorkflowEvent) -> Result<i32, StoreError>;

    /// Load a run's history in sequence order
    async fn load_events(&self, run_id: Uuid) -> Result<Vec<(i32, WorkflowEvent)>, StoreError>;

    /// Close or update a run
    async fn update_run_status(
        &self,
        run_id: Uuid,
        status: WorkflowStatus,
        result: Option<serde_json::Value>,
        error: Option<WorkflowError>,
    ) -> Result<(), StoreError>;

    /// Get a run record
    async fn get_run(&self, run_id: Uuid) -> Result<RunInfo, StoreError>;

    /// All runs of a logical workflow, oldest first
    async fn list_runs(&self, workflow_id: &str) -> Result<Vec<RunInfo>, StoreError>;
}
