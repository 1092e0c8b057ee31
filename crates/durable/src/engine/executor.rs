//! Workflow executor
//!
//! The `WorkflowExecutor` is responsible for:
//! - Starting workflows and child workflows under a logical workflow ID
//! - Driving runs, including continue-as-new and run-level retries
//! - Closing runs and recording their terminal events
//! - Delivering cancellation to the current run of a workflow

use std::sync::Arc;
use std::time::Duration;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use parking_lot::Mutex;
use serde_json::Value;
use tokio::sync::watch;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

use crate::error_reasons;
use crate::persistence::{
    NewRun, ParentRun, RunInfo, StoreError, WorkflowEventStore, WorkflowStatus,
};
use crate::session::SessionManager;
use crate::worker::WorkerPool;
use crate::workflow::{
    Workflow, WorkflowContext, WorkflowError, WorkflowEvent, WorkflowOptions, WorkflowOutcome,
};

use super::registry::{AnyWorkflow, WorkflowRegistry};

/// Configuration for the workflow executor
#[derive(Debug, Clone)]
pub struct ExecutorConfig {
    /// Maximum events per run (for safety)
    pub max_events_per_run: usize,

    /// Execution timeout for runs that do not set their own
    pub default_execution_timeout: Option<Duration>,

    /// How long a cancelled run may keep going before it is dropped
    pub cancellation_grace: Duration,

    /// Records of released sessions to keep (unbounded if `None`)
    pub max_session_records: Option<usize>,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            max_events_per_run: 10_000,
            default_execution_timeout: None,
            cancellation_grace: Duration::from_secs(10),
            max_session_records: None,
        }
    }
}

impl ExecutorConfig {
    /// Set the per-run event limit
    pub fn with_max_events_per_run(mut self, max: usize) -> Self {
        self.max_events_per_run = max;
        self
    }

    /// Set the default execution timeout
    pub fn with_default_execution_timeout(mut self, timeout: Duration) -> Self {
        self.default_execution_timeout = Some(timeout);
        self
    }

    /// Set the cancellation grace period
    pub fn with_cancellation_grace(mut self, grace: Duration) -> Self {
        self.cancellation_grace = grace;
        self
    }

    /// Cap the records kept for released sessions
    pub fn with_max_session_records(mut self, max: usize) -> Self {
        self.max_session_records = Some(max);
        self
    }
}

/// Errors from executor operations
#[derive(Debug, thiserror::Error)]
pub enum ExecutorError {
    /// Store error
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    /// No workflow registered under this type
    #[error("unknown workflow type: {0}")]
    UnknownWorkflow(String),

    /// The workflow ID already has an active run
    #[error("workflow {workflow_id} is already running (run {run_id})")]
    WorkflowAlreadyRunning { workflow_id: String, run_id: Uuid },

    /// No run was ever recorded for this workflow ID
    #[error("workflow not found: {0}")]
    WorkflowNotFound(String),

    /// The workflow exists but has no active run
    #[error("workflow {0} is not running")]
    WorkflowNotRunning(String),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Everything needed to start the first run of a workflow
pub(crate) struct StartRequest {
    pub workflow_type: String,
    pub workflow_id: String,
    pub input: Value,
    pub options: WorkflowOptions,
    pub parent: Option<ParentRun>,
    pub cancel: CancellationToken,
}

struct RunningWorkflow {
    run_id: Uuid,
    cancel: CancellationToken,
    cancel_reason: Arc<Mutex<Option<String>>>,
    done: watch::Receiver<bool>,
}

/// How a single run ended
enum RunOutcome {
    Completed(Value),
    ContinueAsNew(Value),
    Failed(WorkflowError),
    Cancelled(String),
}

/// Identity of the run being driven
struct RunSpec {
    workflow_id: String,
    workflow_type: String,
    run_id: Uuid,
    attempt: u32,
}

struct ExecutorInner {
    store: Arc<dyn WorkflowEventStore>,
    registry: WorkflowRegistry,
    pool: WorkerPool,
    sessions: SessionManager,
    config: ExecutorConfig,
    running: DashMap<String, RunningWorkflow>,
}

/// Workflow executor
///
/// Runs each workflow as a driver loop on the tokio runtime. A workflow has a
/// stable logical ID; every continue-as-new or retry closes the current run
/// and starts a fresh one with a new run ID and an empty history. At most one
/// run per workflow ID is active at a time.
///
/// # Example
///
/// ```ignore
/// use affinity_durable::prelude::*;
///
/// let mut registry = WorkflowRegistry::new();
/// registry.register(MyWorkflow);
///
/// let executor = WorkflowExecutor::new(Arc::new(InMemoryWorkflowEventStore::new()), registry, pool);
/// executor.start_workflow::<MyWorkflow>("my-workflow", input, WorkflowOptions::default()).await?;
///
/// let run = executor.wait_for_completion("my-workflow").await?;
/// ```
#[derive(Clone)]
pub struct WorkflowExecutor {
    inner: Arc<ExecutorInner>,
}

impl WorkflowExecutor {
    /// Create a new executor
    pub fn new(
        store: Arc<dyn WorkflowEventStore>,
        registry: WorkflowRegistry,
        pool: WorkerPool,
    ) -> Self {
        Self::with_config(store, registry, pool, ExecutorConfig::default())
    }

    /// Create a new executor with custom config
    pub fn with_config(
        store: Arc<dyn WorkflowEventStore>,
        registry: WorkflowRegistry,
        pool: WorkerPool,
        config: ExecutorConfig,
    ) -> Self {
        let sessions = match config.max_session_records {
            Some(max) => SessionManager::with_record_limit(pool.clone(), max),
            None => SessionManager::new(pool.clone()),
        };
        Self {
            inner: Arc::new(ExecutorInner {
                store,
                registry,
                pool,
                sessions,
                config,
                running: DashMap::new(),
            }),
        }
    }

    /// Get a reference to the store
    pub fn store(&self) -> &Arc<dyn WorkflowEventStore> {
        &self.inner.store
    }

    /// Get the worker pool
    pub fn pool(&self) -> &WorkerPool {
        &self.inner.pool
    }

    /// Get the session manager
    pub fn sessions(&self) -> &SessionManager {
        &self.inner.sessions
    }

    /// Get the executor configuration
    pub fn config(&self) -> &ExecutorConfig {
        &self.inner.config
    }

    /// Get the workflow registry
    pub fn registry(&self) -> &WorkflowRegistry {
        &self.inner.registry
    }

    /// Start a workflow under a logical ID
    ///
    /// Returns the ID of the first run. Fails if the ID already has an
    /// active run.
    #[instrument(skip(self, input, options), fields(workflow_type = W::TYPE))]
    pub async fn start_workflow<W: Workflow>(
        &self,
        workflow_id: &str,
        input: W::Input,
        options: WorkflowOptions,
    ) -> Result<Uuid, ExecutorError> {
        let input = serde_json::to_value(&input)?;
        self.start_run(StartRequest {
            workflow_type: W::TYPE.to_string(),
            workflow_id: workflow_id.to_string(),
            input,
            options,
            parent: None,
            cancel: CancellationToken::new(),
        })
        .await
    }

    pub(crate) async fn start_run(&self, request: StartRequest) -> Result<Uuid, ExecutorError> {
        let workflow = self
            .inner
            .registry
            .get(&request.workflow_type)
            .ok_or_else(|| ExecutorError::UnknownWorkflow(request.workflow_type.clone()))?;

        let run_id = Uuid::now_v7();
        let (done_tx, done_rx) = watch::channel(false);
        let cancel_reason = Arc::new(Mutex::new(None));

        match self.inner.running.entry(request.workflow_id.clone()) {
            Entry::Occupied(entry) => {
                return Err(ExecutorError::WorkflowAlreadyRunning {
                    workflow_id: request.workflow_id,
                    run_id: entry.get().run_id,
                });
            }
            Entry::Vacant(entry) => {
                entry.insert(RunningWorkflow {
                    run_id,
                    cancel: request.cancel.clone(),
                    cancel_reason: cancel_reason.clone(),
                    done: done_rx,
                });
            }
        }

        let created = self
            .inner
            .store
            .create_run(NewRun {
                workflow_id: request.workflow_id.clone(),
                run_id,
                workflow_type: request.workflow_type.clone(),
                input: request.input.clone(),
                parent: request.parent.clone(),
                attempt: 1,
                continued_from: None,
            })
            .await;
        if let Err(e) = created {
            self.inner.running.remove(&request.workflow_id);
            return Err(e.into());
        }

        info!(
            workflow_id = %request.workflow_id,
            %run_id,
            workflow_type = %request.workflow_type,
            "starting new workflow"
        );

        let executor = self.clone();
        tokio::spawn(async move {
            let workflow_id = request.workflow_id.clone();
            executor
                .drive(workflow, request, run_id, cancel_reason)
                .await;
            executor.inner.running.remove(&workflow_id);
            done_tx.send_replace(true);
        });

        Ok(run_id)
    }

    /// Drive a workflow until a run closes without a successor
    async fn drive(
        &self,
        workflow: Arc<dyn AnyWorkflow>,
        request: StartRequest,
        first_run: Uuid,
        cancel_reason: Arc<Mutex<Option<String>>>,
    ) {
        let StartRequest {
            workflow_type,
            workflow_id,
            mut input,
            options,
            parent,
            cancel,
        } = request;

        let mut spec = RunSpec {
            workflow_id,
            workflow_type,
            run_id: first_run,
            attempt: 1,
        };
        let mut retry_started = Instant::now();

        loop {
            let outcome = self
                .run_once(
                    workflow.as_ref(),
                    &spec,
                    input.clone(),
                    &options,
                    &cancel,
                    &cancel_reason,
                )
                .await;
            let next_run = Uuid::now_v7();

            match outcome {
                RunOutcome::Completed(result) => {
                    self.close_run(
                        spec.run_id,
                        WorkflowStatus::Completed,
                        Some(result.clone()),
                        None,
                        WorkflowEvent::WorkflowCompleted { result },
                    )
                    .await;
                    info!(workflow_id = %spec.workflow_id, run_id = %spec.run_id, "workflow completed");
                    return;
                }
                RunOutcome::Cancelled(reason) => {
                    self.close_run(
                        spec.run_id,
                        WorkflowStatus::Cancelled,
                        None,
                        Some(WorkflowError::cancelled(reason.clone())),
                        WorkflowEvent::WorkflowCancelled { reason },
                    )
                    .await;
                    info!(workflow_id = %spec.workflow_id, run_id = %spec.run_id, "workflow cancelled");
                    return;
                }
                RunOutcome::ContinueAsNew(next_input) => {
                    self.close_run(
                        spec.run_id,
                        WorkflowStatus::ContinuedAsNew,
                        None,
                        None,
                        WorkflowEvent::WorkflowContinuedAsNew {
                            next_run_id: next_run,
                        },
                    )
                    .await;
                    debug!(
                        workflow_id = %spec.workflow_id,
                        run_id = %spec.run_id,
                        %next_run,
                        "workflow continued as new"
                    );
                    input = next_input;
                    spec.attempt = 1;
                    retry_started = Instant::now();
                }
                RunOutcome::Failed(error) => {
                    // Only retryable failures are re-run, and never after cancellation
                    let delay = if error.is_cancelled() || !error.retryable {
                        None
                    } else {
                        options.retry_policy.as_ref().and_then(|policy| {
                            policy.next_retry(
                                spec.attempt,
                                retry_started.elapsed(),
                                error.code.as_deref(),
                            )
                        })
                    };

                    self.close_run(
                        spec.run_id,
                        WorkflowStatus::Failed,
                        None,
                        Some(error.clone()),
                        WorkflowEvent::WorkflowFailed {
                            error: error.clone(),
                        },
                    )
                    .await;

                    let Some(delay) = delay else {
                        warn!(
                            workflow_id = %spec.workflow_id,
                            run_id = %spec.run_id,
                            error = %error,
                            "workflow failed"
                        );
                        return;
                    };

                    warn!(
                        workflow_id = %spec.workflow_id,
                        run_id = %spec.run_id,
                        attempt = spec.attempt,
                        delay_ms = delay.as_millis() as u64,
                        error = %error,
                        "workflow run failed, retrying"
                    );
                    tokio::select! {
                        _ = tokio::time::sleep(delay) => {}
                        _ = cancel.cancelled() => return,
                    }
                    spec.attempt += 1;
                }
            }

            let created = self
                .inner
                .store
                .create_run(NewRun {
                    workflow_id: spec.workflow_id.clone(),
                    run_id: next_run,
                    workflow_type: spec.workflow_type.clone(),
                    input: input.clone(),
                    parent: parent.clone(),
                    attempt: spec.attempt,
                    continued_from: Some(spec.run_id),
                })
                .await;
            if let Err(e) = created {
                error!(
                    workflow_id = %spec.workflow_id,
                    previous_run_id = %spec.run_id,
                    error = %e,
                    "failed to create next run"
                );
                return;
            }

            if let Some(mut running) = self.inner.running.get_mut(&spec.workflow_id) {
                running.run_id = next_run;
            }
            spec.run_id = next_run;
        }
    }

    /// Execute one run and classify how it ended
    async fn run_once(
        &self,
        workflow: &dyn AnyWorkflow,
        spec: &RunSpec,
        input: Value,
        options: &WorkflowOptions,
        cancel: &CancellationToken,
        cancel_reason: &Mutex<Option<String>>,
    ) -> RunOutcome {
        // Children started with RequestCancel hang off this token
        let run_token = cancel.child_token();
        let ctx = WorkflowContext::new(
            self.clone(),
            spec.workflow_id.clone(),
            spec.run_id,
            spec.workflow_type.clone(),
            spec.attempt,
            run_token.clone(),
        );

        let started = ctx
            .record(WorkflowEvent::WorkflowStarted {
                input: input.clone(),
                attempt: spec.attempt,
            })
            .await;
        if let Err(e) = started {
            return RunOutcome::Failed(e);
        }
        debug!(workflow_id = %spec.workflow_id, run_id = %spec.run_id, attempt = spec.attempt, "run started");

        let timeout = options
            .execution_timeout
            .or(self.inner.config.default_execution_timeout);
        let execution = async {
            match timeout {
                Some(limit) => tokio::time::timeout(limit, workflow.run(&ctx, input))
                    .await
                    .unwrap_or_else(|_| {
                        Err(WorkflowError::new(format!(
                            "run exceeded its execution timeout of {:?}",
                            limit
                        ))
                        .with_code(error_reasons::TIMEOUT_EXECUTION))
                    }),
                None => workflow.run(&ctx, input).await,
            }
        };
        let grace = self.inner.config.cancellation_grace;
        let abandoned = async {
            cancel.cancelled().await;
            tokio::time::sleep(grace).await;
        };

        let result = tokio::select! {
            result = execution => result,
            _ = abandoned => Err(WorkflowError::cancelled(
                "run did not stop within the cancellation grace period",
            )),
        };
        run_token.cancel();

        let cancelled = cancel.is_cancelled();
        let reason = || {
            cancel_reason
                .lock()
                .clone()
                .unwrap_or_else(|| "cancelled".to_string())
        };

        match result {
            Ok(WorkflowOutcome::Completed(output)) => RunOutcome::Completed(output),
            Ok(WorkflowOutcome::ContinueAsNew(_)) if cancelled => RunOutcome::Cancelled(reason()),
            Ok(WorkflowOutcome::ContinueAsNew(next)) => RunOutcome::ContinueAsNew(next),
            Err(_) if cancelled => RunOutcome::Cancelled(reason()),
            Err(error) => RunOutcome::Failed(error),
        }
    }

    /// Record the terminal event and status of a run
    async fn close_run(
        &self,
        run_id: Uuid,
        status: WorkflowStatus,
        result: Option<Value>,
        error: Option<WorkflowError>,
        event: WorkflowEvent,
    ) {
        // Terminal events bypass the history limit so every run closes
        if let Err(e) = self.inner.store.append_event(run_id, event).await {
            error!(%run_id, error = %e, "failed to record terminal event");
        }
        if let Err(e) = self
            .inner
            .store
            .update_run_status(run_id, status, result, error)
            .await
        {
            error!(%run_id, %status, error = %e, "failed to close run");
        }
    }

    /// Request cancellation of a workflow's current run
    ///
    /// The run observes cancellation at its next suspension point. In-flight
    /// activities are cancelled and open sessions are released.
    #[instrument(skip(self))]
    pub async fn cancel_workflow(&self, workflow_id: &str, reason: &str) -> Result<(), ExecutorError> {
        let running = self
            .inner
            .running
            .get(workflow_id)
            .map(|r| (r.cancel.clone(), r.cancel_reason.clone()));

        match running {
            Some((cancel, cancel_reason)) => {
                cancel_reason.lock().get_or_insert_with(|| reason.to_string());
                cancel.cancel();
                info!(%workflow_id, %reason, "cancellation requested");
                Ok(())
            }
            None => {
                if self.inner.store.list_runs(workflow_id).await?.is_empty() {
                    Err(ExecutorError::WorkflowNotFound(workflow_id.to_string()))
                } else {
                    Err(ExecutorError::WorkflowNotRunning(workflow_id.to_string()))
                }
            }
        }
    }

    /// Wait until the workflow has no active run, then describe its last run
    pub async fn wait_for_completion(&self, workflow_id: &str) -> Result<RunInfo, ExecutorError> {
        let done = self
            .inner
            .running
            .get(workflow_id)
            .map(|r| r.done.clone());
        if let Some(mut done) = done {
            let _ = done.wait_for(|done| *done).await;
        }
        self.describe(workflow_id).await
    }

    /// Latest run of a workflow
    pub async fn describe(&self, workflow_id: &str) -> Result<RunInfo, ExecutorError> {
        self.inner
            .store
            .list_runs(workflow_id)
            .await?
            .pop()
            .ok_or_else(|| ExecutorError::WorkflowNotFound(workflow_id.to_string()))
    }

    /// All runs of a workflow, oldest first
    pub async fn list_runs(&self, workflow_id: &str) -> Result<Vec<RunInfo>, ExecutorError> {
        Ok(self.inner.store.list_runs(workflow_id).await?)
    }

    /// Get a run record
    pub async fn get_run(&self, run_id: Uuid) -> Result<RunInfo, ExecutorError> {
        Ok(self.inner.store.get_run(run_id).await?)
    }

    /// History of a run, in order
    pub async fn history(&self, run_id: Uuid) -> Result<Vec<WorkflowEvent>, ExecutorError> {
        Ok(self
            .inner
            .store
            .load_events(run_id)
            .await?
            .into_iter()
            .map(|(_, event)| event)
            .collect())
    }

    /// Check if the workflow has an active run
    pub fn is_running(&self, workflow_id: &str) -> bool {
        self.inner.running.contains_key(workflow_id)
    }

    /// ID of the workflow's active run
    pub fn current_run_id(&self, workflow_id: &str) -> Option<Uuid> {
        self.inner.running.get(workflow_id).map(|r| r.run_id)
    }
}

impl std::fmt::Debug for WorkflowExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkflowExecutor")
            .field("registry", &self.inner.registry)
            .field("config", &self.inner.config)
            .field("running", &self.inner.running.len())
            .finish()
    }
}
