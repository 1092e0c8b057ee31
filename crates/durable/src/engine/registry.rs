//! Workflow registry for type-erased workflow dispatch
//!
//! The registry maps workflow type names to workflow implementations so the
//! executor can start runs (including children and continuations) from a
//! type name and JSON input without knowing the concrete type.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use tracing::info;

use crate::error_reasons;
use crate::workflow::{Workflow, WorkflowContext, WorkflowError, WorkflowOutcome};

/// Type-erased workflow interface
///
/// All inputs and outputs are JSON.
#[async_trait]
pub trait AnyWorkflow: Send + Sync {
    /// Get the workflow type identifier
    fn workflow_type(&self) -> &'static str;

    /// Execute one run
    async fn run(
        &self,
        ctx: &WorkflowContext,
        input: Value,
    ) -> Result<WorkflowOutcome<Value, Value>, WorkflowError>;
}

/// Wrapper to implement AnyWorkflow for any Workflow
struct WorkflowWrapper<W: Workflow> {
    inner: W,
}

fn payload_error(message: String) -> WorkflowError {
    WorkflowError::new(message).with_code(error_reasons::INVALID_PAYLOAD)
}

#[async_trait]
impl<W: Workflow> AnyWorkflow for WorkflowWrapper<W> {
    fn workflow_type(&self) -> &'static str {
        W::TYPE
    }

    async fn run(
        &self,
        ctx: &WorkflowContext,
        input: Value,
    ) -> Result<WorkflowOutcome<Value, Value>, WorkflowError> {
        let input: W::Input = serde_json::from_value(input)
            .map_err(|e| payload_error(format!("invalid input for {}: {}", W::TYPE, e)))?;

        match self.inner.run(ctx, input).await? {
            WorkflowOutcome::Completed(output) => serde_json::to_value(output)
                .map(WorkflowOutcome::Completed)
                .map_err(|e| payload_error(format!("invalid output from {}: {}", W::TYPE, e))),
            WorkflowOutcome::ContinueAsNew(next) => serde_json::to_value(next)
                .map(WorkflowOutcome::ContinueAsNew)
                .map_err(|e| payload_error(format!("invalid input for {}: {}", W::TYPE, e))),
        }
    }
}

/// Registry of workflows, keyed by type name
pub struct WorkflowRegistry {
    workflows: HashMap<String, Arc<dyn AnyWorkflow>>,
}

impl Default for WorkflowRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl WorkflowRegistry {
    /// Create a new empty registry
    pub fn new() -> Self {
        Self {
            workflows: HashMap::new(),
        }
    }

    /// Register a workflow under `W::TYPE`
    ///
    /// Registering a type again replaces the previous instance.
    pub fn register<W: Workflow>(&mut self, workflow: W) {
        self.workflows
            .insert(W::TYPE.to_string(), Arc::new(WorkflowWrapper { inner: workflow }));
        info!(workflow_type = W::TYPE, "registered workflow type");
    }

    /// Look up a workflow by type
    pub fn get(&self, workflow_type: &str) -> Option<Arc<dyn AnyWorkflow>> {
        self.workflows.get(workflow_type).cloned()
    }

    /// Check if a workflow type is registered
    pub fn contains(&self, workflow_type: &str) -> bool {
        self.workflows.contains_key(workflow_type)
    }

    /// Get the number of registered workflow types
    pub fn len(&self) -> usize {
        self.workflows.len()
    }

    /// Check if registry is empty
    pub fn is_empty(&self) -> bool {
        self.workflows.is_empty()
    }

    /// Get all registered workflow types
    pub fn workflow_types(&self) -> impl Iterator<Item = &str> {
        self.workflows.keys().map(|s| s.as_str())
    }
}

impl fmt::Debug for WorkflowRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WorkflowRegistry")
            .field("workflow_types", &self.workflows.keys().collect::<Vec<_>>())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::workflow::WorkflowResult;

    struct Noop;

    #[async_trait]
    impl Workflow for Noop {
        const TYPE: &'static str = "noop";
        type Input = ();
        type Output = ();

        async fn run(&self, _ctx: &WorkflowContext, _input: ()) -> WorkflowResult<Self> {
            Ok(WorkflowOutcome::Completed(()))
        }
    }

    #[test]
    fn test_register_and_lookup() {
        let mut registry = WorkflowRegistry::new();
        registry.register(Noop);

        assert!(registry.contains("noop"));
        assert_eq!(registry.len(), 1);
        assert_eq!(registry.get("noop").unwrap().workflow_type(), "noop");
        assert!(registry.get("missing").is_none());
    }

    #[test]
    fn test_registry_debug() {
        let mut registry = WorkflowRegistry::new();
        registry.register(Noop);

        let debug_str = format!("{:?}", registry);
        assert!(debug_str.contains("noop"));
    }
}
