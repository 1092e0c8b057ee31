//! Worker pool
//!
//! The pool is the set of worker processes the executor dispatches to. It is
//! assembled once at startup; claiming a slot polls the workers round-robin
//! and backs off while none is free.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::OwnedSemaphorePermit;
use tracing::debug;

use super::poller::{PollerConfig, SlotPoller};
use super::process::Worker;
use crate::activity::{ActivityError, RegistryError};
use crate::reliability::{enforce, TimeoutType};

#[derive(Default)]
struct PoolInner {
    workers: Vec<Worker>,
    poller: PollerConfig,
    cursor: AtomicUsize,
}

/// Set of workers available for dispatch
#[derive(Clone, Default)]
pub struct WorkerPool {
    inner: Arc<PoolInner>,
}

impl WorkerPool {
    /// Create a pool from its workers
    pub fn new(workers: Vec<Worker>) -> Self {
        Self {
            inner: Arc::new(PoolInner {
                workers,
                ..Default::default()
            }),
        }
    }

    /// Use a custom slot polling configuration
    pub fn with_poller(self, poller: PollerConfig) -> Self {
        Self {
            inner: Arc::new(PoolInner {
                workers: self.inner.workers.clone(),
                poller,
                cursor: AtomicUsize::new(0),
            }),
        }
    }

    /// All workers in the pool
    pub fn workers(&self) -> &[Worker] {
        &self.inner.workers
    }

    /// Look up a worker by identity
    pub fn get(&self, worker_id: &str) -> Option<&Worker> {
        self.inner.workers.iter().find(|w| w.id() == worker_id)
    }

    /// Number of workers
    pub fn len(&self) -> usize {
        self.inner.workers.len()
    }

    /// Check if the pool has no workers
    pub fn is_empty(&self) -> bool {
        self.inner.workers.is_empty()
    }

    /// Check if any worker registered the named activity
    pub fn handles(&self, activity_type: &str) -> bool {
        self.inner.workers.iter().any(|w| w.handles(activity_type))
    }

    pub(crate) fn poller(&self) -> &PollerConfig {
        &self.inner.poller
    }

    /// Workers in round-robin order, starting after the last pick
    fn rotation(&self) -> impl Iterator<Item = &Worker> {
        let len = self.inner.workers.len();
        let start = if len == 0 {
            0
        } else {
            self.inner.cursor.fetch_add(1, Ordering::Relaxed) % len
        };
        self.inner
            .workers
            .iter()
            .cycle()
            .skip(start)
            .take(len)
    }

    /// Claim an activity slot on any worker that handles `activity_type`
    ///
    /// Fails immediately if no worker registered the activity, and with a
    /// schedule-to-start timeout if no slot frees up in time.
    pub(crate) async fn claim_activity_slot(
        &self,
        activity_type: &str,
        timeout: Duration,
    ) -> Result<(Worker, OwnedSemaphorePermit), ActivityError> {
        if !self.handles(activity_type) {
            return Err(RegistryError::UnknownActivity(activity_type.to_string()).into());
        }

        let claimed = enforce(TimeoutType::ScheduleToStart, timeout, async {
            let mut poller = SlotPoller::new(self.poller());
            loop {
                let found = self
                    .rotation()
                    .filter(|w| w.handles(activity_type))
                    .find_map(|w| w.try_claim_activity_slot().map(|p| (w.clone(), p)));
                if let Some(claimed) = found {
                    return claimed;
                }
                poller.wait().await;
            }
        })
        .await?;

        debug!(
            activity_type,
            worker_id = %claimed.0.id(),
            "Claimed activity slot"
        );
        Ok(claimed)
    }

    /// Claim a session slot, trying `preferred` first on every poll
    ///
    /// Returns `None` if no worker accepts the binding within `timeout`.
    pub(crate) async fn claim_session_slot(
        &self,
        preferred: Option<&str>,
        timeout: Duration,
    ) -> Option<(Worker, OwnedSemaphorePermit)> {
        let preferred = preferred.and_then(|id| self.get(id));

        tokio::time::timeout(timeout, async {
            let mut poller = SlotPoller::new(self.poller());
            loop {
                if let Some(worker) = preferred {
                    if let Some(permit) = worker.try_claim_session_slot() {
                        return (worker.clone(), permit);
                    }
                }

                let found = self
                    .rotation()
                    .find_map(|w| w.try_claim_session_slot().map(|p| (w.clone(), p)));
                if let Some(claimed) = found {
                    return claimed;
                }
                poller.wait().await;
            }
        })
        .await
        .ok()
    }
}

impl std::fmt::Debug for WorkerPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkerPool")
            .field("workers", &self.inner.workers)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::activity::ActivityRegistry;
    use crate::error_reasons;
    use crate::worker::WorkerConfig;

    fn worker(id: &str, activity: &str) -> Worker {
        let mut activities = ActivityRegistry::new();
        activities
            .register_fn(activity, |_ctx, input| async move { Ok(input) })
            .unwrap();
        Worker::new(
            WorkerConfig::new(id)
                .with_max_concurrent_activities(1)
                .with_max_concurrent_sessions(1),
            activities,
        )
    }

    #[tokio::test]
    async fn test_claim_routes_by_activity_name() {
        let pool = WorkerPool::new(vec![worker("w-1", "a"), worker("w-2", "b")]);

        let (w, _permit) = pool
            .claim_activity_slot("b", Duration::from_secs(1))
            .await
            .unwrap();
        assert_eq!(w.id(), "w-2");
    }

    #[tokio::test]
    async fn test_claim_unknown_activity_fails_fast() {
        let pool = WorkerPool::new(vec![worker("w-1", "a")]);

        let error = pool
            .claim_activity_slot("missing", Duration::from_secs(1))
            .await
            .unwrap_err();
        assert!(error.has_reason(error_reasons::UNKNOWN_ACTIVITY));
        assert!(!error.retryable);
    }

    #[tokio::test(start_paused = true)]
    async fn test_claim_times_out_when_saturated() {
        let pool = WorkerPool::new(vec![worker("w-1", "a")]);
        let _held = pool
            .claim_activity_slot("a", Duration::from_secs(1))
            .await
            .unwrap();

        let error = pool
            .claim_activity_slot("a", Duration::from_secs(1))
            .await
            .unwrap_err();
        assert!(error.has_reason(error_reasons::TIMEOUT_SCHEDULE_TO_START));
        assert!(error.retryable);
    }

    #[tokio::test(start_paused = true)]
    async fn test_session_slot_prefers_requested_worker() {
        let pool = WorkerPool::new(vec![worker("w-1", "a"), worker("w-2", "a")]);

        let (w, _permit) = pool
            .claim_session_slot(Some("w-2"), Duration::from_secs(1))
            .await
            .unwrap();
        assert_eq!(w.id(), "w-2");
    }

    #[tokio::test(start_paused = true)]
    async fn test_session_slot_falls_back_when_preferred_is_down() {
        let pool = WorkerPool::new(vec![worker("w-1", "a"), worker("w-2", "a")]);
        pool.get("w-2").unwrap().disconnect();

        let (w, _permit) = pool
            .claim_session_slot(Some("w-2"), Duration::from_secs(1))
            .await
            .unwrap();
        assert_eq!(w.id(), "w-1");
    }

    #[tokio::test(start_paused = true)]
    async fn test_session_slot_times_out() {
        let pool = WorkerPool::new(vec![worker("w-1", "a")]);
        let _held = pool.claim_session_slot(None, Duration::from_secs(1)).await;

        let claimed = pool.claim_session_slot(None, Duration::from_secs(1)).await;
        assert!(claimed.is_none());
    }
}
