//! Activity retry and timeout behaviour, end to end through the executor
//!
//! All tests run on paused time so backoff delays are exact.

mod common;

use std::time::Duration;

use affinity_durable::error_reasons;
use affinity_durable::prelude::*;
use affinity_durable::TimeoutType;
use serde_json::json;
use tokio::time::Instant;

use common::{count_events, executor, worker, CallActivity, CallInput, Counter};

fn registry() -> WorkflowRegistry {
    let mut registry = WorkflowRegistry::new();
    registry.register(CallActivity);
    registry
}

fn failing_worker(counter: &Counter, error: ActivityError) -> Worker {
    let mut activities = ActivityRegistry::new();
    let counter = counter.clone();
    activities
        .register_fn("flaky", move |_ctx, _input| {
            let counter = counter.clone();
            let error = error.clone();
            async move {
                counter.bump();
                Err(error)
            }
        })
        .unwrap();
    worker("w-1", activities)
}

fn exponential(max_attempts: u32) -> ActivityOptions {
    ActivityOptions::default().with_retry(
        RetryPolicy::exponential()
            .with_initial_interval(Duration::from_secs(1))
            .with_backoff_coefficient(2.0)
            .with_max_interval(Duration::from_secs(600))
            .with_max_attempts(max_attempts)
            .with_non_retriable_reason("non-retryable error"),
    )
}

#[test_log::test(tokio::test(start_paused = true))]
async fn test_all_failing_activity_runs_exactly_max_attempts() {
    let counter = Counter::default();
    let (_, executor) = executor(
        vec![failing_worker(&counter, ActivityError::retryable("boom"))],
        registry(),
    );

    let start = Instant::now();
    let run_id = executor
        .start_workflow::<CallActivity>(
            "retry",
            CallInput::new("flaky", exponential(5)),
            WorkflowOptions::default(),
        )
        .await
        .unwrap();
    let run = executor.wait_for_completion("retry").await.unwrap();

    assert_eq!(counter.get(), 5);
    assert_eq!(run.status, WorkflowStatus::Failed);
    assert_eq!(run.error.unwrap().message, "boom");
    // 1 + 2 + 4 + 8 seconds of backoff
    assert_eq!(start.elapsed(), Duration::from_secs(15));

    let delays: Vec<Option<u64>> = executor
        .history(run_id)
        .await
        .unwrap()
        .into_iter()
        .filter_map(|e| match e {
            WorkflowEvent::ActivityFailed { retry_delay_ms, .. } => Some(retry_delay_ms),
            _ => None,
        })
        .collect();
    assert_eq!(
        delays,
        vec![Some(1000), Some(2000), Some(4000), Some(8000), None]
    );
}

#[test_log::test(tokio::test(start_paused = true))]
async fn test_backoff_is_capped_by_max_interval() {
    let counter = Counter::default();
    let (_, executor) = executor(
        vec![failing_worker(&counter, ActivityError::retryable("boom"))],
        registry(),
    );

    let options = ActivityOptions::default().with_retry(
        RetryPolicy::exponential()
            .with_initial_interval(Duration::from_secs(1))
            .with_max_interval(Duration::from_secs(3))
            .with_max_attempts(5),
    );

    let start = Instant::now();
    executor
        .start_workflow::<CallActivity>(
            "capped",
            CallInput::new("flaky", options),
            WorkflowOptions::default(),
        )
        .await
        .unwrap();
    executor.wait_for_completion("capped").await.unwrap();

    assert_eq!(counter.get(), 5);
    // 1 + 2 + 3 + 3
    assert_eq!(start.elapsed(), Duration::from_secs(9));
}

#[test_log::test(tokio::test(start_paused = true))]
async fn test_non_retriable_reason_invokes_once() {
    let counter = Counter::default();
    let error = ActivityError::retryable("bad image").with_reason("non-retryable error");
    let (_, executor) = executor(vec![failing_worker(&counter, error)], registry());

    executor
        .start_workflow::<CallActivity>(
            "non-retriable",
            CallInput::new("flaky", exponential(10)),
            WorkflowOptions::default(),
        )
        .await
        .unwrap();
    let run = executor.wait_for_completion("non-retriable").await.unwrap();

    assert_eq!(counter.get(), 1);
    assert_eq!(run.status, WorkflowStatus::Failed);
    assert!(run.error.unwrap().has_code("non-retryable error"));
}

#[test_log::test(tokio::test(start_paused = true))]
async fn test_non_retryable_error_invokes_once() {
    let counter = Counter::default();
    let (_, executor) = executor(
        vec![failing_worker(
            &counter,
            ActivityError::non_retryable("invalid input"),
        )],
        registry(),
    );

    executor
        .start_workflow::<CallActivity>(
            "non-retryable",
            CallInput::new("flaky", exponential(10)),
            WorkflowOptions::default(),
        )
        .await
        .unwrap();
    executor.wait_for_completion("non-retryable").await.unwrap();

    assert_eq!(counter.get(), 1);
}

#[test_log::test(tokio::test(start_paused = true))]
async fn test_total_duration_bounds_unlimited_attempts() {
    let counter = Counter::default();
    let (_, executor) = executor(
        vec![failing_worker(&counter, ActivityError::retryable("boom"))],
        registry(),
    );

    let options = ActivityOptions::default().with_retry(
        RetryPolicy::exponential()
            .with_initial_interval(Duration::from_secs(1))
            .with_max_attempts(0)
            .with_max_total_duration(Duration::from_secs(10)),
    );

    let start = Instant::now();
    executor
        .start_workflow::<CallActivity>(
            "bounded",
            CallInput::new("flaky", options),
            WorkflowOptions::default(),
        )
        .await
        .unwrap();
    executor.wait_for_completion("bounded").await.unwrap();

    // Retries at 1s, 3s and 7s; the next one would start at 15s
    assert_eq!(counter.get(), 4);
    assert!(start.elapsed() <= Duration::from_secs(10));
}

#[test_log::test(tokio::test(start_paused = true))]
async fn test_succeeds_after_transient_failures() {
    let counter = Counter::default();
    let mut activities = ActivityRegistry::new();
    let calls = counter.clone();
    activities
        .register_fn("flaky", move |_ctx, _input| {
            let calls = calls.clone();
            async move {
                if calls.bump() < 3 {
                    Err(ActivityError::retryable("not yet"))
                } else {
                    Ok(json!("done"))
                }
            }
        })
        .unwrap();
    let (_, executor) = executor(vec![worker("w-1", activities)], registry());

    executor
        .start_workflow::<CallActivity>(
            "eventually",
            CallInput::new("flaky", exponential(5)),
            WorkflowOptions::default(),
        )
        .await
        .unwrap();
    let run = executor.wait_for_completion("eventually").await.unwrap();

    assert_eq!(counter.get(), 3);
    assert_eq!(run.status, WorkflowStatus::Completed);
    assert_eq!(run.result, Some(json!("done")));
}

#[test_log::test(tokio::test(start_paused = true))]
async fn test_schedule_to_start_timeout_is_retried() {
    let mut activities = ActivityRegistry::new();
    activities
        .register_fn("echo", |_ctx, input| async move { Ok(input) })
        .unwrap();
    let unreachable = worker("w-1", activities);
    unreachable.disconnect();
    let (_, executor) = executor(vec![unreachable], registry());

    let options = ActivityOptions::default()
        .with_schedule_to_start_timeout(Duration::from_secs(5))
        .with_retry(RetryPolicy::fixed(Duration::from_secs(1), 3));

    let start = Instant::now();
    let run_id = executor
        .start_workflow::<CallActivity>(
            "queued",
            CallInput::new("echo", options),
            WorkflowOptions::default(),
        )
        .await
        .unwrap();
    let run = executor.wait_for_completion("queued").await.unwrap();

    assert_eq!(run.status, WorkflowStatus::Failed);
    assert!(run
        .error
        .unwrap()
        .has_code(error_reasons::TIMEOUT_SCHEDULE_TO_START));
    assert_eq!(start.elapsed(), Duration::from_secs(3 * 5 + 2));

    let timeouts = count_events(&executor, run_id, |e| {
        matches!(
            e,
            WorkflowEvent::ActivityTimedOut {
                timeout_type: TimeoutType::ScheduleToStart,
                ..
            }
        )
    })
    .await;
    assert_eq!(timeouts, 3);
}

#[test_log::test(tokio::test(start_paused = true))]
async fn test_start_to_close_timeout_is_retried() {
    let counter = Counter::default();
    let mut activities = ActivityRegistry::new();
    let calls = counter.clone();
    activities
        .register_fn("slow", move |_ctx, _input| {
            let calls = calls.clone();
            async move {
                calls.bump();
                tokio::time::sleep(Duration::from_secs(60)).await;
                Ok(json!(null))
            }
        })
        .unwrap();
    let (_, executor) = executor(vec![worker("w-1", activities)], registry());

    let options = ActivityOptions::default()
        .with_start_to_close_timeout(Duration::from_secs(2))
        .with_retry(RetryPolicy::fixed(Duration::from_secs(1), 2));

    let run_id = executor
        .start_workflow::<CallActivity>(
            "slow",
            CallInput::new("slow", options),
            WorkflowOptions::default(),
        )
        .await
        .unwrap();
    let run = executor.wait_for_completion("slow").await.unwrap();

    assert_eq!(counter.get(), 2);
    assert!(run
        .error
        .unwrap()
        .has_code(error_reasons::TIMEOUT_START_TO_CLOSE));

    let timeouts = count_events(&executor, run_id, |e| {
        matches!(
            e,
            WorkflowEvent::ActivityTimedOut {
                timeout_type: TimeoutType::StartToClose,
                ..
            }
        )
    })
    .await;
    assert_eq!(timeouts, 2);
}

#[test_log::test(tokio::test(start_paused = true))]
async fn test_unknown_activity_fails_without_retry() {
    let (_, executor) = executor(vec![worker("w-1", ActivityRegistry::new())], registry());

    let start = Instant::now();
    executor
        .start_workflow::<CallActivity>(
            "unknown",
            CallInput::new("missing", exponential(5)),
            WorkflowOptions::default(),
        )
        .await
        .unwrap();
    let run = executor.wait_for_completion("unknown").await.unwrap();

    assert_eq!(start.elapsed(), Duration::ZERO);
    assert!(run.error.unwrap().has_code(error_reasons::UNKNOWN_ACTIVITY));
}

#[test_log::test(tokio::test(start_paused = true))]
async fn test_lost_worker_is_retried_elsewhere() {
    let counter = Counter::default();
    let build = |id: &str| {
        let mut activities = ActivityRegistry::new();
        let calls = counter.clone();
        activities
            .register_fn("work", move |ctx: ActivityContext, _input| {
                let calls = calls.clone();
                async move {
                    calls.bump();
                    tokio::time::sleep(Duration::from_secs(10)).await;
                    Ok(json!(ctx.worker_id))
                }
            })
            .unwrap();
        worker(id, activities)
    };
    let first = build("w-1");
    let second = build("w-2");
    let (_, executor) = executor(vec![first.clone(), second], registry());

    executor
        .start_workflow::<CallActivity>(
            "failover",
            CallInput::new("work", fixed_retry_options()),
            WorkflowOptions::default(),
        )
        .await
        .unwrap();

    tokio::time::sleep(Duration::from_secs(5)).await;
    first.disconnect();

    let run = executor.wait_for_completion("failover").await.unwrap();
    assert_eq!(run.status, WorkflowStatus::Completed);
    assert_eq!(run.result, Some(json!("w-2")));
    assert_eq!(counter.get(), 2);
}

fn fixed_retry_options() -> ActivityOptions {
    common::fixed_retry(1, 3)
}
