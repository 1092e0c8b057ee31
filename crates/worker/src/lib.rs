pub mod activities;
pub mod config;
pub mod telemetry;
pub mod workflows;

use std::sync::Arc;

use affinity_durable::{
    ActivityRegistry, ExecutorConfig, InMemoryWorkflowEventStore, Worker, WorkerPool,
    WorkflowExecutor, WorkflowRegistry,
};
use tracing::info;

// Re-export main types
pub use config::{ImageWorkflowConfig, WorkerConfig, NON_RETRYABLE_REASON};
pub use workflows::{
    ImageFinderWorkflow, ImageProcessingInput, ImageProcessingOutput, ImageProcessingWorkflow,
    FINDER_WORKFLOW_ID,
};

/// Register the image workflows
pub fn register_workflows(registry: &mut WorkflowRegistry, config: &ImageWorkflowConfig) {
    registry.register(ImageFinderWorkflow::new(config.clone()));
    registry.register(ImageProcessingWorkflow::new(config.clone()));
}

/// Build an executor hosting the configured workers and the image workflows
pub fn build_executor(
    config: &WorkerConfig,
    workflow_config: &ImageWorkflowConfig,
) -> anyhow::Result<WorkflowExecutor> {
    let workers = config
        .worker_ids()
        .into_iter()
        .map(|worker_id| {
            let mut activities = ActivityRegistry::new();
            activities::register_activities(&mut activities, config)?;
            Ok::<_, anyhow::Error>(Worker::new(
                config.process_config(&worker_id),
                activities,
            ))
        })
        .collect::<anyhow::Result<Vec<_>>>()?;

    let mut registry = WorkflowRegistry::new();
    register_workflows(&mut registry, workflow_config);

    // The finder closes a run every cycle, so retention must be bounded
    let store = InMemoryWorkflowEventStore::new().with_max_closed_runs(config.max_retained_runs);
    let executor_config =
        ExecutorConfig::default().with_max_session_records(config.max_retained_runs);

    info!(
        workers = workers.len(),
        workflows = registry.len(),
        max_retained_runs = config.max_retained_runs,
        "image worker host ready"
    );
    Ok(WorkflowExecutor::with_config(
        Arc::new(store),
        registry,
        WorkerPool::new(workers),
        executor_config,
    ))
}
