//! A single worker process
//!
//! A worker owns an activity registry, a bounded number of activity slots
//! and session slots, and a reachability flag. Taking a worker offline
//! (`disconnect`) simulates a host crash or partition: sessions bound to it
//! fail once it stays unreachable past their liveness threshold.

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::{watch, OwnedSemaphorePermit, Semaphore};
use tracing::{info, warn};
use uuid::Uuid;

use super::poller::{PollerConfig, SlotPoller};
use crate::activity::{ActivityContext, ActivityError, ActivityRegistry};
use crate::reliability::{enforce, TimeoutError, TimeoutType};

/// Worker configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerConfig {
    /// Unique worker identity (generated if not provided)
    pub worker_id: String,

    /// Maximum concurrent activity executions
    pub max_concurrent_activities: usize,

    /// Maximum concurrently bound sessions
    pub max_concurrent_sessions: usize,

    /// Whether this worker accepts session bindings
    pub enable_sessions: bool,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            worker_id: format!("worker-{}", Uuid::now_v7()),
            max_concurrent_activities: 10,
            max_concurrent_sessions: 10,
            enable_sessions: true,
        }
    }
}

impl WorkerConfig {
    /// Create a configuration with the given identity
    pub fn new(worker_id: impl Into<String>) -> Self {
        Self {
            worker_id: worker_id.into(),
            ..Default::default()
        }
    }

    /// Set maximum concurrent activities
    pub fn with_max_concurrent_activities(mut self, max: usize) -> Self {
        self.max_concurrent_activities = max.max(1);
        self
    }

    /// Set maximum concurrent sessions
    pub fn with_max_concurrent_sessions(mut self, max: usize) -> Self {
        self.max_concurrent_sessions = max;
        self
    }

    /// Disable session bindings on this worker
    pub fn without_sessions(mut self) -> Self {
        self.enable_sessions = false;
        self
    }
}

struct WorkerInner {
    config: WorkerConfig,
    activities: ActivityRegistry,
    activity_slots: Arc<Semaphore>,
    session_slots: Arc<Semaphore>,
    reachable: watch::Sender<bool>,
}

/// Handle to one worker process
///
/// Cloning the handle is cheap; all clones refer to the same worker.
#[derive(Clone)]
pub struct Worker {
    inner: Arc<WorkerInner>,
}

impl Worker {
    /// Create a worker with its activity registry
    pub fn new(config: WorkerConfig, activities: ActivityRegistry) -> Self {
        let (reachable, _) = watch::channel(true);

        info!(
            worker_id = %config.worker_id,
            activity_types = ?activities.activity_types().collect::<Vec<_>>(),
            max_concurrent_activities = config.max_concurrent_activities,
            max_concurrent_sessions = config.max_concurrent_sessions,
            "Worker registered"
        );

        Self {
            inner: Arc::new(WorkerInner {
                activity_slots: Arc::new(Semaphore::new(config.max_concurrent_activities)),
                session_slots: Arc::new(Semaphore::new(config.max_concurrent_sessions)),
                config,
                activities,
                reachable,
            }),
        }
    }

    /// Worker identity
    pub fn id(&self) -> &str {
        &self.inner.config.worker_id
    }

    /// Worker configuration
    pub fn config(&self) -> &WorkerConfig {
        &self.inner.config
    }

    /// Check if this worker registered the named activity
    pub fn handles(&self, activity_type: &str) -> bool {
        self.inner.activities.contains(activity_type)
    }

    /// Check if this worker accepts sessions
    pub fn supports_sessions(&self) -> bool {
        self.inner.config.enable_sessions && self.inner.config.max_concurrent_sessions > 0
    }

    /// Check if the worker is currently reachable
    pub fn is_reachable(&self) -> bool {
        *self.inner.reachable.borrow()
    }

    /// Take the worker offline
    pub fn disconnect(&self) {
        if self.inner.reachable.send_replace(false) {
            warn!(worker_id = %self.id(), "Worker unreachable");
        }
    }

    /// Bring the worker back online
    pub fn reconnect(&self) {
        if !self.inner.reachable.send_replace(true) {
            info!(worker_id = %self.id(), "Worker reachable again");
        }
    }

    /// Free activity slots
    pub fn available_activity_slots(&self) -> usize {
        self.inner.activity_slots.available_permits()
    }

    /// Free session slots
    pub fn available_session_slots(&self) -> usize {
        self.inner.session_slots.available_permits()
    }

    pub(crate) fn try_claim_activity_slot(&self) -> Option<OwnedSemaphorePermit> {
        if !self.is_reachable() {
            return None;
        }
        self.inner.activity_slots.clone().try_acquire_owned().ok()
    }

    pub(crate) fn try_claim_session_slot(&self) -> Option<OwnedSemaphorePermit> {
        if !self.is_reachable() || !self.supports_sessions() {
            return None;
        }
        self.inner.session_slots.clone().try_acquire_owned().ok()
    }

    /// Claim an activity slot on this worker, waiting at most `timeout`
    pub(crate) async fn claim_activity_slot(
        &self,
        poller: &PollerConfig,
        timeout: Duration,
    ) -> Result<OwnedSemaphorePermit, TimeoutError> {
        enforce(TimeoutType::ScheduleToStart, timeout, async {
            let mut poller = SlotPoller::new(poller);
            loop {
                if let Some(permit) = self.try_claim_activity_slot() {
                    return permit;
                }
                poller.wait().await;
            }
        })
        .await
    }

    /// Resolves once the worker is reachable
    pub(crate) async fn wait_reachable(&self) {
        let mut rx = self.inner.reachable.subscribe();
        let _ = rx.wait_for(|reachable| *reachable).await;
    }

    /// Resolves once the worker has been continuously unreachable for `threshold`
    pub(crate) async fn unreachable_for(&self, threshold: Duration) {
        let mut rx = self.inner.reachable.subscribe();
        loop {
            let went_down = rx.wait_for(|reachable| !*reachable).await.is_ok();
            if !went_down {
                return std::future::pending().await;
            }

            let came_back = tokio::time::timeout(threshold, rx.wait_for(|reachable| *reachable))
                .await
                .is_ok();
            if !came_back {
                return;
            }
        }
    }

    /// Execute an activity on this worker
    pub async fn invoke(
        &self,
        activity_type: &str,
        ctx: &ActivityContext,
        input: Value,
    ) -> Result<Value, ActivityError> {
        self.inner.activities.invoke(activity_type, ctx, input).await
    }
}

impl std::fmt::Debug for Worker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Worker")
            .field("worker_id", &self.id())
            .field("reachable", &self.is_reachable())
            .field("activities", &self.inner.activities)
            .finish()
    }
}
