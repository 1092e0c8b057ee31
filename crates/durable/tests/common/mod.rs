//! Shared fixtures for executor integration tests

#![allow(dead_code)]

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use affinity_durable::prelude::*;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Build a worker with the given activity registry
pub fn worker(id: &str, activities: ActivityRegistry) -> Worker {
    Worker::new(WorkerConfig::new(id), activities)
}

/// Build an executor over an in-memory store
pub fn executor(
    workers: Vec<Worker>,
    registry: WorkflowRegistry,
) -> (Arc<InMemoryWorkflowEventStore>, WorkflowExecutor) {
    executor_with_config(workers, registry, ExecutorConfig::default())
}

pub fn executor_with_config(
    workers: Vec<Worker>,
    registry: WorkflowRegistry,
    config: ExecutorConfig,
) -> (Arc<InMemoryWorkflowEventStore>, WorkflowExecutor) {
    let store = Arc::new(InMemoryWorkflowEventStore::new());
    let executor = WorkflowExecutor::with_config(
        store.clone(),
        registry,
        WorkerPool::new(workers),
        config,
    );
    (store, executor)
}

/// Invocation counter shared between a test and its activities
#[derive(Clone, Default)]
pub struct Counter(Arc<AtomicU32>);

impl Counter {
    pub fn bump(&self) -> u32 {
        self.0.fetch_add(1, Ordering::SeqCst) + 1
    }

    pub fn get(&self) -> u32 {
        self.0.load(Ordering::SeqCst)
    }
}

/// Input of [`CallActivity`]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CallInput {
    pub activity: String,
    pub input: Value,
    pub options: ActivityOptions,
}

impl CallInput {
    pub fn new(activity: &str, options: ActivityOptions) -> Self {
        Self {
            activity: activity.to_string(),
            input: Value::Null,
            options,
        }
    }
}

/// Runs one activity outside any session and returns its output
pub struct CallActivity;

#[async_trait]
impl Workflow for CallActivity {
    const TYPE: &'static str = "call_activity";
    type Input = CallInput;
    type Output = Value;

    async fn run(&self, ctx: &WorkflowContext, input: CallInput) -> WorkflowResult<Self> {
        let output = ctx
            .execute_activity(&input.activity, input.input, &input.options)
            .await?;
        Ok(WorkflowOutcome::Completed(output))
    }
}

/// Sleeps for the given number of seconds
pub struct Sleep;

#[async_trait]
impl Workflow for Sleep {
    const TYPE: &'static str = "sleep";
    type Input = u64;
    type Output = ();

    async fn run(&self, ctx: &WorkflowContext, secs: u64) -> WorkflowResult<Self> {
        ctx.sleep(Duration::from_secs(secs)).await?;
        Ok(WorkflowOutcome::Completed(()))
    }
}

/// Activity options with a fixed-interval retry policy
pub fn fixed_retry(interval_secs: u64, max_attempts: u32) -> ActivityOptions {
    ActivityOptions::default().with_retry(RetryPolicy::fixed(
        Duration::from_secs(interval_secs),
        max_attempts,
    ))
}

/// Count events of a run's history matching `predicate`
pub async fn count_events(
    executor: &WorkflowExecutor,
    run_id: uuid::Uuid,
    predicate: impl Fn(&WorkflowEvent) -> bool,
) -> usize {
    executor
        .history(run_id)
        .await
        .unwrap()
        .iter()
        .filter(|e| predicate(e))
        .count()
}
