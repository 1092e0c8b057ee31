use affinity_durable::WorkflowOptions;
use affinity_worker::telemetry::{init_telemetry, TelemetryConfig};
use affinity_worker::{
    build_executor, ImageFinderWorkflow, ImageWorkflowConfig, WorkerConfig, FINDER_WORKFLOW_ID,
};
use anyhow::{Context, Result};

#[tokio::main]
async fn main() -> Result<()> {
    // A missing .env file is fine
    let _ = dotenvy::dotenv();

    // Configure via environment variables:
    // - RUST_LOG or LOG_LEVEL: Log filter (default: "affinity_worker=debug,affinity_durable=info")
    init_telemetry(TelemetryConfig::from_env());

    tracing::info!("affinity-worker starting...");

    let config = WorkerConfig::from_env();
    tracing::info!(
        worker_id = %config.worker_id,
        worker_count = config.worker_count,
        max_concurrent_activities = config.max_concurrent_activities,
        image_source_url = %config.image_source_url,
        "Starting image workers"
    );

    let executor = build_executor(&config, &ImageWorkflowConfig::default())
        .context("Failed to build worker host")?;

    executor
        .start_workflow::<ImageFinderWorkflow>(FINDER_WORKFLOW_ID, (), WorkflowOptions::default())
        .await
        .context("Failed to start finder workflow")?;

    // The finder never completes on its own
    tokio::select! {
        result = executor.wait_for_completion(FINDER_WORKFLOW_ID) => {
            let run = result.context("Failed to wait for finder workflow")?;
            tracing::warn!(status = %run.status, "Finder workflow stopped unexpectedly");
        }
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("Received shutdown signal");
            executor
                .cancel_workflow(FINDER_WORKFLOW_ID, "worker shutdown")
                .await
                .context("Failed to cancel finder workflow")?;
            let run = executor
                .wait_for_completion(FINDER_WORKFLOW_ID)
                .await
                .context("Failed to wait for finder workflow")?;
            tracing::info!(run_id = %run.run_id, status = %run.status, "Finder workflow stopped");
        }
    }

    tracing::info!("Worker shutdown complete");
    Ok(())
}
