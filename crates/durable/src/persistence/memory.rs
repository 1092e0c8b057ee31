//! In-memory implementation of WorkflowEventStore

use std::collections::{HashMap, VecDeque};

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::RwLock;
use uuid::Uuid;

use super::store::*;
use crate::workflow::{WorkflowError, WorkflowEvent};

struct RunState {
    info: RunInfo,
    events: Vec<WorkflowEvent>,
}

#[derive(Default)]
struct Inner {
    runs: HashMap<Uuid, RunState>,
    // Run IDs per logical workflow, in creation order
    by_workflow: HashMap<String, Vec<Uuid>>,
    // Closed run IDs, in close order
    closed: VecDeque<Uuid>,
}

impl Inner {
    fn evict(&mut self, run_id: Uuid) {
        let Some(run) = self.runs.remove(&run_id) else {
            return;
        };
        let workflow_id = run.info.workflow_id;
        if let Some(ids) = self.by_workflow.get_mut(&workflow_id) {
            ids.retain(|id| *id != run_id);
            if ids.is_empty() {
                self.by_workflow.remove(&workflow_id);
            }
        }
    }
}

/// In-memory implementation of WorkflowEventStore
///
/// Keeps every run by default. A perpetual workflow closes a run per cycle,
/// so long-lived hosts should bound retention with
/// [`with_max_closed_runs`](Self::with_max_closed_runs): the oldest closed
/// runs and their histories are dropped first. Running runs are never
/// evicted.
///
/// # Example
///
/// ```
/// use affinity_durable::InMemoryWorkflowEventStore;
///
/// let store = InMemoryWorkflowEventStore::new().with_max_closed_runs(1_000);
/// assert_eq!(store.run_count(), 0);
/// ```
#[derive(Default)]
pub struct InMemoryWorkflowEventStore {
    inner: RwLock<Inner>,
    max_closed_runs: Option<usize>,
}

impl InMemoryWorkflowEventStore {
    /// Create a new in-memory store
    pub fn new() -> Self {
        Self::default()
    }

    /// Keep at most `max` closed runs (at least one)
    pub fn with_max_closed_runs(mut self, max: usize) -> Self {
        self.max_closed_runs = Some(max.max(1));
        self
    }

    /// Get the number of closed runs still retained
    pub fn closed_count(&self) -> usize {
        self.inner.read().closed.len()
    }

    /// Get the number of retained history events across all runs
    pub fn event_count(&self) -> usize {
        self.inner.read().runs.values().map(|r| r.events.len()).sum()
    }

    /// Get the number of recorded runs
    pub fn run_count(&self) -> usize {
        self.inner.read().runs.len()
    }

    /// Get the number of runs currently in `Running` state
    pub fn running_count(&self) -> usize {
        self.inner
            .read()
            .runs
            .values()
            .filter(|r| r.info.status == WorkflowStatus::Running)
            .count()
    }

    /// Runs of every workflow of the given type, oldest first
    pub fn runs_of_type(&self, workflow_type: &str) -> Vec<RunInfo> {
        let mut runs: Vec<_> = self
            .inner
            .read()
            .runs
            .values()
            .filter(|r| r.info.workflow_type == workflow_type)
            .map(|r| r.info.clone())
            .collect();
        runs.sort_by_key(|r| r.run_id);
        runs
    }

    /// Clear all data
    pub fn clear(&self) {
        let mut inner = self.inner.write();
        inner.runs.clear();
        inner.by_workflow.clear();
        inner.closed.clear();
    }
}

#[async_trait]
impl WorkflowEventStore for InMemoryWorkflowEventStore {
    async fn create_run(&self, run: NewRun) -> Result<(), StoreError> {
        let mut inner = self.inner.write();
        if inner.runs.contains_key(&run.run_id) {
            return Err(StoreError::DuplicateRun(run.run_id));
        }

        inner
            .by_workflow
            .entry(run.workflow_id.clone())
            .or_default()
            .push(run.run_id);
        inner.runs.insert(
            run.run_id,
            RunState {
                info: RunInfo {
                    workflow_id: run.workflow_id,
                    run_id: run.run_id,
                    workflow_type: run.workflow_type,
                    status: WorkflowStatus::Running,
                    input: run.input,
                    result: None,
                    error: None,
                    parent: run.parent,
                    attempt: run.attempt,
                    continued_from: run.continued_from,
                    started_at: Utc::now(),
                    closed_at: None,
                },
                events: vec![],
            },
        );
        Ok(())
    }

    async fn append_event(&self, run_id: Uuid, event: WorkflowEvent) -> Result<i32, StoreError> {
        let mut inner = self.inner.write();
        let run = inner
            .runs
            .get_mut(&run_id)
            .ok_or(StoreError::RunNotFound(run_id))?;

        run.events.push(event);
        Ok(run.events.len() as i32 - 1)
    }

    async fn load_events(&self, run_id: Uuid) -> Result<Vec<(i32, WorkflowEvent)>, StoreError> {
        let inner = self.inner.read();
        let run = inner
            .runs
            .get(&run_id)
            .ok_or(StoreError::RunNotFound(run_id))?;

        Ok(run
            .events
            .iter()
            .enumerate()
            .map(|(i, e)| (i as i32, e.clone()))
            .collect())
    }

    async fn update_run_status(
        &self,
        run_id: Uuid,
        status: WorkflowStatus,
        result: Option<serde_json::Value>,
        error: Option<WorkflowError>,
    ) -> Result<(), StoreError> {
        let mut inner = self.inner.write();
        let run = inner
            .runs
            .get_mut(&run_id)
            .ok_or(StoreError::RunNotFound(run_id))?;

        let newly_closed = status.is_terminal() && !run.info.status.is_terminal();
        run.info.status = status;
        run.info.result = result;
        run.info.error = error;
        if status.is_terminal() {
            run.info.closed_at = Some(Utc::now());
        }

        if newly_closed {
            inner.closed.push_back(run_id);
            if let Some(max) = self.max_closed_runs {
                while inner.closed.len() > max {
                    if let Some(oldest) = inner.closed.pop_front() {
                        inner.evict(oldest);
                    }
                }
            }
        }
        Ok(())
    }

    async fn get_run(&self, run_id: Uuid) -> Result<RunInfo, StoreError> {
        let inner = self.inner.read();
        inner
            .runs
            .get(&run_id)
            .map(|r| r.info.clone())
            .ok_or(StoreError::RunNotFound(run_id))
    }

    async fn list_runs(&self, workflow_id: &str) -> Result<Vec<RunInfo>, StoreError> {
        let inner = self.inner.read();
        Ok(inner
            .by_workflow
            .get(workflow_id)
            .map(|ids| {
                ids.iter()
                    .filter_map(|id| inner.runs.get(id))
                    .map(|r| r.info.clone())
                    .collect()
            })
            .unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn new_run(workflow_id: &str) -> NewRun {
        NewRun {
            workflow_id: workflow_id.to_string(),
            run_id: Uuid::now_v7(),
            workflow_type: "test".to_string(),
            input: json!({}),
            parent: None,
            attempt: 1,
            continued_from: None,
        }
    }

    #[tokio::test]
    async fn test_create_and_get_run() {
        let store = InMemoryWorkflowEventStore::new();
        let run = new_run("wf-1");
        let run_id = run.run_id;

        store.create_run(run).await.unwrap();

        let info = store.get_run(run_id).await.unwrap();
        assert_eq!(info.workflow_id, "wf-1");
        assert_eq!(info.status, WorkflowStatus::Running);
        assert!(info.closed_at.is_none());
    }

    #[tokio::test]
    async fn test_duplicate_run() {
        let store = InMemoryWorkflowEventStore::new();
        let run = new_run("wf-1");

        store.create_run(run.clone()).await.unwrap();
        let result = store.create_run(run).await;
        assert!(matches!(result, Err(StoreError::DuplicateRun(_))));
    }

    #[tokio::test]
    async fn test_append_and_load_events() {
        let store = InMemoryWorkflowEventStore::new();
        let run = new_run("wf-1");
        let run_id = run.run_id;
        store.create_run(run).await.unwrap();

        let seq = store
            .append_event(
                run_id,
                WorkflowEvent::WorkflowStarted {
                    input: json!({}),
                    attempt: 1,
                },
            )
            .await
            .unwrap();
        assert_eq!(seq, 0);

        let seq = store
            .append_event(
                run_id,
                WorkflowEvent::TimerStarted {
                    timer_id: "timer-1".to_string(),
                    duration_ms: 1000,
                },
            )
            .await
            .unwrap();
        assert_eq!(seq, 1);

        let events = store.load_events(run_id).await.unwrap();
        assert_eq!(events.len(), 2);
        assert_eq!(events[1].0, 1);
    }

    #[tokio::test]
    async fn test_append_to_unknown_run() {
        let store = InMemoryWorkflowEventStore::new();
        let result = store
            .append_event(
                Uuid::now_v7(),
                WorkflowEvent::TimerFired {
                    timer_id: "t".to_string(),
                },
            )
            .await;
        assert!(matches!(result, Err(StoreError::RunNotFound(_))));
    }

    #[tokio::test]
    async fn test_update_status_closes_run() {
        let store = InMemoryWorkflowEventStore::new();
        let run = new_run("wf-1");
        let run_id = run.run_id;
        store.create_run(run).await.unwrap();

        store
            .update_run_status(
                run_id,
                WorkflowStatus::Failed,
                None,
                Some(WorkflowError::new("boom")),
            )
            .await
            .unwrap();

        let info = store.get_run(run_id).await.unwrap();
        assert_eq!(info.status, WorkflowStatus::Failed);
        assert_eq!(info.error, Some(WorkflowError::new("boom")));
        assert!(info.closed_at.is_some());
        assert_eq!(store.running_count(), 0);
    }

    #[tokio::test]
    async fn test_list_runs_in_creation_order() {
        let store = InMemoryWorkflowEventStore::new();
        let first = new_run("wf-1");
        let second = new_run("wf-1");
        let (first_id, second_id) = (first.run_id, second.run_id);

        store.create_run(first).await.unwrap();
        store.create_run(second).await.unwrap();
        store.create_run(new_run("wf-2")).await.unwrap();

        let runs = store.list_runs("wf-1").await.unwrap();
        assert_eq!(
            runs.iter().map(|r| r.run_id).collect::<Vec<_>>(),
            vec![first_id, second_id]
        );
        assert!(store.list_runs("missing").await.unwrap().is_empty());
        assert_eq!(store.runs_of_type("test").len(), 3);
    }

    async fn close(store: &InMemoryWorkflowEventStore, run_id: Uuid) {
        store
            .update_run_status(run_id, WorkflowStatus::ContinuedAsNew, None, None)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_closed_runs_are_evicted_oldest_first() {
        let store = InMemoryWorkflowEventStore::new().with_max_closed_runs(2);
        let runs: Vec<_> = (0..4).map(|_| new_run("wf-1")).collect();
        let ids: Vec<_> = runs.iter().map(|r| r.run_id).collect();
        for run in runs {
            store.create_run(run).await.unwrap();
        }
        store
            .append_event(
                ids[0],
                WorkflowEvent::TimerFired {
                    timer_id: "t".to_string(),
                },
            )
            .await
            .unwrap();

        for id in &ids[..3] {
            close(&store, *id).await;
        }

        // The running run is kept; only two closed runs remain
        assert_eq!(store.run_count(), 3);
        assert_eq!(store.closed_count(), 2);
        assert_eq!(store.event_count(), 0);
        assert!(matches!(
            store.get_run(ids[0]).await,
            Err(StoreError::RunNotFound(_))
        ));
        assert_eq!(
            store
                .list_runs("wf-1")
                .await
                .unwrap()
                .iter()
                .map(|r| r.run_id)
                .collect::<Vec<_>>(),
            ids[1..].to_vec()
        );
    }

    #[tokio::test]
    async fn test_closing_twice_counts_once() {
        let store = InMemoryWorkflowEventStore::new().with_max_closed_runs(1);
        let first = new_run("wf-1");
        let first_id = first.run_id;
        store.create_run(first).await.unwrap();

        close(&store, first_id).await;
        close(&store, first_id).await;

        assert_eq!(store.closed_count(), 1);
        assert!(store.get_run(first_id).await.is_ok());
    }
}
