//! Workflow execution engine
//!
//! The engine module provides the `WorkflowExecutor`, which drives workflow
//! runs to completion, and the `WorkflowRegistry` it dispatches through.

mod executor;
mod registry;

pub(crate) use executor::StartRequest;
pub use executor::{ExecutorConfig, ExecutorError, WorkflowExecutor};
pub use registry::{AnyWorkflow, WorkflowRegistry};
