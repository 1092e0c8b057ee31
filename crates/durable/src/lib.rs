//! # Durable Orchestration Core
//!
//! An in-process workflow host for long-running orchestrations whose
//! activities need worker affinity.
//!
//! ## Features
//!
//! - **Continue-as-new**: perpetual workflows recycle into fresh runs so their history stays bounded
//! - **Child workflows**: independent identity and lifetime, linked by a parent-close policy
//! - **Sessions**: pin a chain of activities to one worker and rebind it elsewhere with a recreate token
//! - **Automatic retries**: exponential backoff bounded by attempts and total duration
//! - **Run history**: every run keeps an append-only event log and a run record
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                      WorkflowExecutor                        │
//! │  (driver loop per workflow ID: runs, continues, retries)    │
//! └─────────────────────────────────────────────────────────────┘
//!               │                               │
//!               ▼                               ▼
//! ┌───────────────────────────┐   ┌───────────────────────────┐
//! │     WorkflowEventStore    │   │      SessionManager        │
//! │  (run records, history)   │   │  (worker leases, tokens)   │
//! └───────────────────────────┘   └───────────────────────────┘
//!                                               │
//!                                               ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                        WorkerPool                            │
//! │  (activity registries, concurrency slots, reachability)     │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Example
//!
//! ```ignore
//! use affinity_durable::prelude::*;
//!
//! struct Pipeline;
//!
//! #[async_trait]
//! impl Workflow for Pipeline {
//!     const TYPE: &'static str = "pipeline";
//!     type Input = String;
//!     type Output = String;
//!
//!     async fn run(&self, ctx: &WorkflowContext, input: String) -> WorkflowResult<Self> {
//!         let options = ActivityOptions::default();
//!         let mut session = ctx.create_session(&SessionOptions::default()).await?;
//!
//!         let result = ctx.execute_in::<Download>(&mut session, input, &options).await;
//!         ctx.complete_session(session).await;
//!
//!         Ok(WorkflowOutcome::Completed(result?))
//!     }
//! }
//! ```

pub mod activity;
pub mod engine;
pub mod error_reasons;
pub mod persistence;
pub mod reliability;
pub mod session;
pub mod worker;
pub mod workflow;

/// Prelude for common imports
pub mod prelude {
    pub use async_trait::async_trait;

    pub use crate::activity::{Activity, ActivityContext, ActivityError, ActivityRegistry};
    pub use crate::engine::{ExecutorConfig, ExecutorError, WorkflowExecutor, WorkflowRegistry};
    pub use crate::persistence::{
        InMemoryWorkflowEventStore, RunInfo, StoreError, WorkflowEventStore, WorkflowStatus,
    };
    pub use crate::reliability::RetryPolicy;
    pub use crate::session::{RecreateToken, Session, SessionError, SessionOptions};
    pub use crate::worker::{PollerConfig, Worker, WorkerConfig, WorkerPool};
    pub use crate::workflow::{
        ActivityOptions, ChildWorkflowOptions, ParentClosePolicy, Workflow, WorkflowContext,
        WorkflowError, WorkflowEvent, WorkflowOptions, WorkflowOutcome, WorkflowResult,
    };
}

// Re-export key types at crate root
pub use activity::{Activity, ActivityContext, ActivityError, ActivityRegistry, RegistryError};
pub use engine::{ExecutorConfig, ExecutorError, WorkflowExecutor, WorkflowRegistry};
pub use persistence::{
    InMemoryWorkflowEventStore, RunInfo, StoreError, WorkflowEventStore, WorkflowStatus,
};
pub use reliability::{RetryPolicy, TimeoutError, TimeoutType};
pub use session::{
    RecreateToken, Session, SessionError, SessionInfo, SessionManager, SessionOptions,
    SessionState,
};
pub use worker::{PollerConfig, Worker, WorkerConfig, WorkerPool};
pub use workflow::{
    ActivityOptions, ChildWorkflowHandle, ChildWorkflowOptions, ParentClosePolicy, Workflow,
    WorkflowContext, WorkflowError, WorkflowEvent, WorkflowOptions, WorkflowOutcome,
    WorkflowResult,
};
