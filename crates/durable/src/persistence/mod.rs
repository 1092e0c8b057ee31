//! Persistence layer for run records and event histories

mod memory;
mod store;

pub use memory::InMemoryWorkflowEventStore;
pub use store::{NewRun, ParentRun, RunInfo, StoreError, WorkflowEventStore, WorkflowStatus};
