//! Workflow execution context
//!
//! The context is the only way a workflow suspends: activity calls, timers,
//! session setup and child starts all go through it, get recorded in the
//! run's history and observe cancellation.

use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::{
    ActivityOptions, ChildWorkflowOptions, ParentClosePolicy, Workflow, WorkflowError,
    WorkflowEvent,
};
use crate::activity::{Activity, ActivityContext, ActivityError, RegistryError};
use crate::engine::{StartRequest, WorkflowExecutor};
use crate::error_reasons;
use crate::persistence::ParentRun;
use crate::reliability::{enforce, TimeoutError, TimeoutType};
use crate::session::{RecreateToken, Session, SessionOptions, SessionState};
use crate::worker::Worker;

/// Identity of a started child workflow
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ChildWorkflowHandle {
    /// Logical ID of the child
    pub workflow_id: String,

    /// First run of the child
    pub run_id: Uuid,
}

/// Context handed to [`Workflow::run`]
pub struct WorkflowContext {
    workflow_id: String,
    run_id: Uuid,
    workflow_type: String,
    attempt: u32,
    executor: WorkflowExecutor,
    cancel: CancellationToken,
    sequence: AtomicU32,
    events: AtomicUsize,
}

impl WorkflowContext {
    pub(crate) fn new(
        executor: WorkflowExecutor,
        workflow_id: impl Into<String>,
        run_id: Uuid,
        workflow_type: impl Into<String>,
        attempt: u32,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            workflow_id: workflow_id.into(),
            run_id,
            workflow_type: workflow_type.into(),
            attempt,
            executor,
            cancel,
            sequence: AtomicU32::new(0),
            events: AtomicUsize::new(0),
        }
    }

    /// Logical workflow ID, stable across continue-as-new
    pub fn workflow_id(&self) -> &str {
        &self.workflow_id
    }

    /// Physical run ID
    pub fn run_id(&self) -> Uuid {
        self.run_id
    }

    /// Workflow type
    pub fn workflow_type(&self) -> &str {
        &self.workflow_type
    }

    /// Attempt of this run under the run retry policy (1-based)
    pub fn attempt(&self) -> u32 {
        self.attempt
    }

    /// Check if cancellation was requested
    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Resolves when cancellation is requested
    pub async fn cancelled(&self) {
        self.cancel.cancelled().await
    }

    /// Append an event to the run's history
    pub(crate) async fn record(&self, event: WorkflowEvent) -> Result<(), WorkflowError> {
        let limit = self.executor.config().max_events_per_run;
        let count = self.events.fetch_add(1, Ordering::Relaxed) + 1;
        if count > limit {
            return Err(WorkflowError::new(format!(
                "run {} exceeded its history limit of {} events",
                self.run_id, limit
            ))
            .with_code(error_reasons::HISTORY_LIMIT_EXCEEDED));
        }

        self.executor
            .store()
            .append_event(self.run_id, event)
            .await
            .map_err(|e| WorkflowError::retryable(format!("failed to record event: {}", e)))?;
        Ok(())
    }

    fn next_id(&self, prefix: &str) -> String {
        let seq = self.sequence.fetch_add(1, Ordering::Relaxed) + 1;
        format!("{}-{}", prefix, seq)
    }

    // =========================================================================
    // Activities
    // =========================================================================

    /// Execute an activity on any worker that registered it
    pub async fn execute_activity(
        &self,
        activity_type: &str,
        input: Value,
        options: &ActivityOptions,
    ) -> Result<Value, ActivityError> {
        self.run_activity(activity_type, input, options, None).await
    }

    /// Execute a typed activity on any worker that registered it
    pub async fn execute<A: Activity>(
        &self,
        input: A::Input,
        options: &ActivityOptions,
    ) -> Result<A::Output, ActivityError> {
        let output = self
            .execute_activity(A::TYPE, encode_input::<A>(input)?, options)
            .await?;
        decode_output::<A>(output)
    }

    /// Execute an activity on the session's worker
    pub async fn execute_activity_in(
        &self,
        session: &mut Session,
        activity_type: &str,
        input: Value,
        options: &ActivityOptions,
    ) -> Result<Value, ActivityError> {
        self.run_activity(activity_type, input, options, Some(session))
            .await
    }

    /// Execute a typed activity on the session's worker
    pub async fn execute_in<A: Activity>(
        &self,
        session: &mut Session,
        input: A::Input,
        options: &ActivityOptions,
    ) -> Result<A::Output, ActivityError> {
        let output = self
            .execute_activity_in(session, A::TYPE, encode_input::<A>(input)?, options)
            .await?;
        decode_output::<A>(output)
    }

    /// Schedule an activity and drive its retry loop
    async fn run_activity(
        &self,
        activity_type: &str,
        input: Value,
        options: &ActivityOptions,
        mut session: Option<&mut Session>,
    ) -> Result<Value, ActivityError> {
        let activity_id = self.next_id(activity_type);
        let policy = &options.retry_policy;

        self.record(WorkflowEvent::ActivityScheduled {
            activity_id: activity_id.clone(),
            activity_type: activity_type.to_string(),
            input: input.clone(),
            options: options.clone(),
        })
        .await?;
        debug!(
            workflow_id = %self.workflow_id,
            run_id = %self.run_id,
            activity_id = %activity_id,
            "Activity scheduled"
        );

        let started = Instant::now();
        let mut attempt = 0;

        loop {
            attempt += 1;

            let result = {
                let execution = match session.as_deref_mut() {
                    Some(session) => futures::future::Either::Left(self.attempt_in_session(
                        session,
                        &activity_id,
                        activity_type,
                        &input,
                        options,
                        attempt,
                    )),
                    None => futures::future::Either::Right(self.attempt_on_pool(
                        &activity_id,
                        activity_type,
                        &input,
                        options,
                        attempt,
                    )),
                };

                tokio::select! {
                    result = execution => result,
                    _ = self.cancel.cancelled() => Err(ActivityError::cancelled()),
                }
            };

            if let Some(session) = session.as_deref_mut() {
                session.end_activity();
            }

            let error = match result {
                Ok(output) => {
                    self.record(WorkflowEvent::ActivityCompleted {
                        activity_id: activity_id.clone(),
                        result: output.clone(),
                    })
                    .await?;
                    debug!(activity_id = %activity_id, attempt, "Activity completed");
                    return Ok(output);
                }
                Err(error) => error,
            };

            if error.is_cancelled() || self.is_cancelled() {
                return Err(self.activity_cancelled(&activity_id).await);
            }

            let delay = if error.retryable {
                policy.next_retry(attempt, started.elapsed(), error.reason.as_deref())
            } else {
                None
            };

            self.record(WorkflowEvent::ActivityFailed {
                activity_id: activity_id.clone(),
                attempt,
                error: error.clone(),
                retry_delay_ms: delay.map(|d| d.as_millis() as u64),
            })
            .await?;

            let Some(delay) = delay else {
                warn!(
                    workflow_id = %self.workflow_id,
                    activity_id = %activity_id,
                    attempt,
                    error = %error,
                    "Activity failed, no retries left"
                );
                return Err(error);
            };

            warn!(
                workflow_id = %self.workflow_id,
                activity_id = %activity_id,
                attempt,
                delay_ms = delay.as_millis() as u64,
                error = %error,
                "Activity attempt failed, retrying"
            );

            tokio::select! {
                _ = tokio::time::sleep(delay) => {}
                _ = self.cancel.cancelled() => {
                    return Err(self.activity_cancelled(&activity_id).await);
                }
            }
        }
    }

    async fn activity_cancelled(&self, activity_id: &str) -> ActivityError {
        // Best effort: the run is closing anyway
        let _ = self
            .record(WorkflowEvent::ActivityCancelled {
                activity_id: activity_id.to_string(),
                reason: "workflow cancelled".to_string(),
            })
            .await;
        ActivityError::cancelled()
    }

    /// One attempt on any worker from the pool
    async fn attempt_on_pool(
        &self,
        activity_id: &str,
        activity_type: &str,
        input: &Value,
        options: &ActivityOptions,
        attempt: u32,
    ) -> Result<Value, ActivityError> {
        let claimed = self
            .executor
            .pool()
            .claim_activity_slot(activity_type, options.schedule_to_start_timeout)
            .await;
        let (worker, _slot) = match claimed {
            Ok(claimed) => claimed,
            Err(error) => {
                if error.has_reason(error_reasons::TIMEOUT_SCHEDULE_TO_START) {
                    self.record_timeout(activity_id, attempt, TimeoutType::ScheduleToStart)
                        .await?;
                }
                return Err(error);
            }
        };

        self.record(WorkflowEvent::ActivityStarted {
            activity_id: activity_id.to_string(),
            attempt,
            worker_id: worker.id().to_string(),
            session_id: None,
        })
        .await?;

        let ctx = self.activity_context(activity_id, attempt, options, &worker);
        let outcome = tokio::select! {
            outcome = enforce(
                TimeoutType::StartToClose,
                options.start_to_close_timeout,
                worker.invoke(activity_type, &ctx, input.clone()),
            ) => outcome,
            _ = worker.unreachable_for(Duration::ZERO) => {
                return Err(ActivityError::retryable(format!(
                    "worker {} became unreachable",
                    worker.id()
                ))
                .with_reason(error_reasons::WORKER_LOST));
            }
        };

        self.finish_attempt(activity_id, attempt, outcome).await
    }

    /// One attempt on the session's worker
    async fn attempt_in_session(
        &self,
        session: &mut Session,
        activity_id: &str,
        activity_type: &str,
        input: &Value,
        options: &ActivityOptions,
        attempt: u32,
    ) -> Result<Value, ActivityError> {
        if let Err(error) = session.begin_activity().await {
            self.record_session_failure(session).await;
            return Err(error.into());
        }

        let worker = session.worker().clone();
        if !worker.handles(activity_type) {
            return Err(RegistryError::UnknownActivity(activity_type.to_string()).into());
        }

        let claimed = worker
            .claim_activity_slot(
                self.executor.pool().poller(),
                options.schedule_to_start_timeout,
            )
            .await;
        let _slot = match claimed {
            Ok(slot) => slot,
            Err(timeout) => {
                self.record_timeout(activity_id, attempt, timeout.timeout_type())
                    .await?;
                return Err(timeout.into());
            }
        };

        self.record(WorkflowEvent::ActivityStarted {
            activity_id: activity_id.to_string(),
            attempt,
            worker_id: worker.id().to_string(),
            session_id: Some(session.id()),
        })
        .await?;

        let ctx = self
            .activity_context(activity_id, attempt, options, &worker)
            .with_session(session.info().clone());
        let outcome = tokio::select! {
            outcome = enforce(
                TimeoutType::StartToClose,
                options.start_to_close_timeout,
                worker.invoke(activity_type, &ctx, input.clone()),
            ) => Ok(outcome),
            error = session.watch() => Err(error),
        };

        match outcome {
            Ok(outcome) => self.finish_attempt(activity_id, attempt, outcome).await,
            Err(error) => {
                let error = session.fail(error);
                self.record_session_failure(session).await;
                Err(error.into())
            }
        }
    }

    async fn finish_attempt(
        &self,
        activity_id: &str,
        attempt: u32,
        outcome: Result<Result<Value, ActivityError>, TimeoutError>,
    ) -> Result<Value, ActivityError> {
        match outcome {
            Ok(result) => result,
            Err(timeout) => {
                self.record_timeout(activity_id, attempt, timeout.timeout_type())
                    .await?;
                Err(timeout.into())
            }
        }
    }

    async fn record_timeout(
        &self,
        activity_id: &str,
        attempt: u32,
        timeout_type: TimeoutType,
    ) -> Result<(), WorkflowError> {
        self.record(WorkflowEvent::ActivityTimedOut {
            activity_id: activity_id.to_string(),
            attempt,
            timeout_type,
        })
        .await
    }

    async fn record_session_failure(&self, session: &Session) {
        if session.state() != SessionState::Failed {
            return;
        }
        let reason = session
            .failure()
            .map(|e| e.reason())
            .unwrap_or(error_reasons::SESSION_LOST);
        let _ = self
            .record(WorkflowEvent::SessionFailed {
                session_id: session.id(),
                reason: reason.to_string(),
            })
            .await;
    }

    fn activity_context(
        &self,
        activity_id: &str,
        attempt: u32,
        options: &ActivityOptions,
        worker: &Worker,
    ) -> ActivityContext {
        ActivityContext::new(
            &self.workflow_id,
            self.run_id,
            activity_id,
            attempt,
            options.retry_policy.max_attempts,
        )
        .with_worker(worker.id())
        .with_cancellation(self.cancel.child_token())
    }

    // =========================================================================
    // Timers
    // =========================================================================

    /// Sleep without blocking the executor
    pub async fn sleep(&self, duration: Duration) -> Result<(), WorkflowError> {
        let timer_id = self.next_id("timer");
        self.record(WorkflowEvent::TimerStarted {
            timer_id: timer_id.clone(),
            duration_ms: duration.as_millis() as u64,
        })
        .await?;

        tokio::select! {
            _ = tokio::time::sleep(duration) => {}
            _ = self.cancel.cancelled() => {
                return Err(WorkflowError::cancelled("cancelled while sleeping"));
            }
        }

        self.record(WorkflowEvent::TimerFired { timer_id }).await
    }

    // =========================================================================
    // Sessions
    // =========================================================================

    /// Bind a new session
    pub async fn create_session(&self, options: &SessionOptions) -> Result<Session, WorkflowError> {
        let created = tokio::select! {
            created = self.executor.sessions().create(options) => created?,
            _ = self.cancel.cancelled() => {
                return Err(WorkflowError::cancelled("cancelled while creating session"));
            }
        };
        self.session_created(created, false).await
    }

    /// Bind a session continuing the chain captured by `token`
    pub async fn recreate_session(
        &self,
        token: &RecreateToken,
        options: &SessionOptions,
    ) -> Result<Session, WorkflowError> {
        let recreated = tokio::select! {
            recreated = self.executor.sessions().recreate(token, options) => recreated?,
            _ = self.cancel.cancelled() => {
                return Err(WorkflowError::cancelled("cancelled while recreating session"));
            }
        };
        self.session_created(recreated, true).await
    }

    async fn session_created(
        &self,
        session: Session,
        recreated: bool,
    ) -> Result<Session, WorkflowError> {
        self.record(WorkflowEvent::SessionCreated {
            session_id: session.id(),
            worker_id: session.worker_id().to_string(),
            recreated,
        })
        .await?;
        Ok(session)
    }

    /// Release the session's worker binding
    ///
    /// Call on every exit path of the chain, including failures.
    pub async fn complete_session(&self, session: Session) {
        let session_id = session.id();
        self.executor.sessions().complete(session);

        if let Err(e) = self
            .record(WorkflowEvent::SessionCompleted { session_id })
            .await
        {
            warn!(session_id = %session_id, error = %e, "Failed to record session completion");
        }
    }

    // =========================================================================
    // Child workflows
    // =========================================================================

    /// Start a child workflow and wait only until it is accepted
    pub async fn start_child_workflow<W: Workflow>(
        &self,
        input: W::Input,
        options: &ChildWorkflowOptions,
    ) -> Result<ChildWorkflowHandle, WorkflowError> {
        if self.is_cancelled() {
            return Err(WorkflowError::cancelled("cancelled before starting child"));
        }

        let input = serde_json::to_value(&input).map_err(|e| {
            WorkflowError::new(format!("invalid input for {}: {}", W::TYPE, e))
                .with_code(error_reasons::INVALID_PAYLOAD)
        })?;
        let workflow_id = options
            .workflow_id
            .clone()
            .unwrap_or_else(|| format!("{}_{}", W::TYPE, Uuid::now_v7()));
        let cancel = match options.parent_close_policy {
            ParentClosePolicy::Abandon => CancellationToken::new(),
            ParentClosePolicy::RequestCancel => self.cancel.child_token(),
        };

        let run_id = self
            .executor
            .start_run(StartRequest {
                workflow_type: W::TYPE.to_string(),
                workflow_id: workflow_id.clone(),
                input,
                options: options.run_options(),
                parent: Some(ParentRun {
                    workflow_id: self.workflow_id.clone(),
                    run_id: self.run_id,
                }),
                cancel,
            })
            .await
            .map_err(|e| {
                WorkflowError::new(format!("failed to start child workflow: {}", e))
                    .with_code(error_reasons::CHILD_START_FAILED)
            })?;

        self.record(WorkflowEvent::ChildWorkflowStarted {
            workflow_id: workflow_id.clone(),
            run_id,
            workflow_type: W::TYPE.to_string(),
        })
        .await?;

        info!(
            workflow_id = %self.workflow_id,
            child_workflow_id = %workflow_id,
            child_run_id = %run_id,
            "Child workflow started"
        );
        Ok(ChildWorkflowHandle {
            workflow_id,
            run_id,
        })
    }
}

impl std::fmt::Debug for WorkflowContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkflowContext")
            .field("workflow_id", &self.workflow_id)
            .field("run_id", &self.run_id)
            .field("workflow_type", &self.workflow_type)
            .field("attempt", &self.attempt)
            .finish()
    }
}

fn encode_input<A: Activity>(input: A::Input) -> Result<Value, ActivityError> {
    serde_json::to_value(input).map_err(|e| {
        ActivityError::non_retryable(format!("invalid input for {}: {}", A::TYPE, e))
            .with_reason(error_reasons::INVALID_PAYLOAD)
    })
}

fn decode_output<A: Activity>(output: Value) -> Result<A::Output, ActivityError> {
    serde_json::from_value(output).map_err(|e| {
        ActivityError::non_retryable(format!("invalid output from {}: {}", A::TYPE, e))
            .with_reason(error_reasons::INVALID_PAYLOAD)
    })
}
