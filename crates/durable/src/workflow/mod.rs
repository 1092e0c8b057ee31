//! Workflow abstractions and types
//!
//! This module contains the core workflow primitives:
//! - [`Workflow`] trait for defining workflows as async functions
//! - [`WorkflowContext`] for activities, timers, sessions and child workflows
//! - [`WorkflowEvent`] enum for recorded history
//! - Options for activities, runs and child workflows

mod context;
mod definition;
mod event;
mod options;

pub use context::{ChildWorkflowHandle, WorkflowContext};
pub use definition::{Workflow, WorkflowError, WorkflowOutcome, WorkflowResult};
pub use event::WorkflowEvent;
pub use options::{ActivityOptions, ChildWorkflowOptions, ParentClosePolicy, WorkflowOptions};
