//! Session manager
//!
//! Creates, recreates and tears down sessions. The manager keeps a record of
//! every session it issued so a chain's lifecycle stays inspectable after
//! the handle is gone. Records of released sessions can be capped with
//! [`SessionManager::with_record_limit`].

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::{info, instrument};
use uuid::Uuid;

use super::token::SessionLineage;
use super::{RecreateToken, Session, SessionError, SessionInfo, SessionState};
use crate::reliability::duration_millis;
use crate::worker::WorkerPool;

/// Session timeouts
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SessionOptions {
    /// How long to wait for a worker to accept the binding
    #[serde(with = "duration_millis")]
    pub creation_timeout: Duration,

    /// How long the chain may run once bound
    #[serde(with = "duration_millis")]
    pub execution_timeout: Duration,

    /// How long the bound worker may stay unreachable before the session fails
    #[serde(with = "duration_millis")]
    pub heartbeat_timeout: Duration,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            creation_timeout: Duration::from_secs(60),
            execution_timeout: Duration::from_secs(60),
            heartbeat_timeout: Duration::from_secs(20),
        }
    }
}

impl SessionOptions {
    /// Create session options with defaults
    pub fn new() -> Self {
        Self::default()
    }

    /// Set creation timeout
    pub fn with_creation_timeout(mut self, timeout: Duration) -> Self {
        self.creation_timeout = timeout;
        self
    }

    /// Set execution timeout
    pub fn with_execution_timeout(mut self, timeout: Duration) -> Self {
        self.execution_timeout = timeout;
        self
    }

    /// Set the liveness threshold
    pub fn with_heartbeat_timeout(mut self, timeout: Duration) -> Self {
        self.heartbeat_timeout = timeout;
        self
    }
}

/// Lifecycle record of an issued session
#[derive(Debug, Clone, Serialize)]
pub struct SessionRecord {
    pub session_id: Uuid,
    pub root_session_id: Uuid,
    pub generation: u32,
    pub worker_id: String,
    pub state: SessionState,
    /// Every state the session went through, in order
    pub history: Vec<SessionState>,
    /// Number of times the binding was released (at most one)
    pub releases: u32,
    pub created_at: DateTime<Utc>,
    pub released_at: Option<DateTime<Utc>>,
}

struct ManagerInner {
    pool: WorkerPool,
    records: DashMap<Uuid, SessionRecord>,
    // Released session IDs, oldest first
    released: Mutex<VecDeque<Uuid>>,
    max_released: Option<usize>,
}

/// Creates and tears down session bindings
#[derive(Clone)]
pub struct SessionManager {
    inner: Arc<ManagerInner>,
}

impl SessionManager {
    /// Create a manager over a worker pool
    pub fn new(pool: WorkerPool) -> Self {
        Self::build(pool, None)
    }

    /// Create a manager that keeps at most `max` records of released sessions
    ///
    /// Records of bound sessions are always kept.
    pub fn with_record_limit(pool: WorkerPool, max: usize) -> Self {
        Self::build(pool, Some(max))
    }

    fn build(pool: WorkerPool, max_released: Option<usize>) -> Self {
        Self {
            inner: Arc::new(ManagerInner {
                pool,
                records: DashMap::new(),
                released: Mutex::new(VecDeque::new()),
                max_released,
            }),
        }
    }

    /// Worker pool sessions are bound from
    pub fn pool(&self) -> &WorkerPool {
        &self.inner.pool
    }

    /// Bind a new session to any worker that accepts it
    #[instrument(skip(self, options))]
    pub async fn create(&self, options: &SessionOptions) -> Result<Session, SessionError> {
        self.bind(None, options).await
    }

    /// Bind a session continuing the chain captured by `token`
    ///
    /// The worker that held the previous session is preferred; any reachable
    /// worker is used otherwise. Activities interrupted mid-chain are re-run
    /// by the caller, so they must be safe to repeat.
    #[instrument(skip(self, token, options))]
    pub async fn recreate(
        &self,
        token: &RecreateToken,
        options: &SessionOptions,
    ) -> Result<Session, SessionError> {
        let lineage = token.lineage()?;
        self.bind(Some(lineage), options).await
    }

    /// Release the session's worker binding
    ///
    /// Safe on every exit path of a chain, including failed and empty ones.
    pub fn complete(&self, mut session: Session) {
        if session.release() {
            info!(
                session_id = %session.id(),
                worker_id = %session.worker_id(),
                state = %session.state(),
                "Session completed"
            );
        }
    }

    async fn bind(
        &self,
        previous: Option<SessionLineage>,
        options: &SessionOptions,
    ) -> Result<Session, SessionError> {
        let preferred = previous.as_ref().map(|l| l.worker_id.as_str());
        let session_id = Uuid::now_v7();
        let created_at = Utc::now();

        let (root_session_id, generation) = match &previous {
            Some(lineage) => (lineage.root_session_id, lineage.generation + 1),
            None => (session_id, 0),
        };

        self.inner.records.insert(
            session_id,
            SessionRecord {
                session_id,
                root_session_id,
                generation,
                worker_id: String::new(),
                state: SessionState::Created,
                history: vec![SessionState::Created],
                releases: 0,
                created_at,
                released_at: None,
            },
        );

        let Some((worker, lease)) = self
            .inner
            .pool
            .claim_session_slot(preferred, options.creation_timeout)
            .await
        else {
            self.inner.records.remove(&session_id);
            return Err(SessionError::CreationTimeout {
                timeout: options.creation_timeout,
            });
        };

        let lineage = SessionLineage::new(root_session_id, session_id, worker.id(), generation);
        let recreate_token = RecreateToken::issue(&lineage)?;

        if let Some(mut record) = self.inner.records.get_mut(&session_id) {
            record.worker_id = worker.id().to_string();
        }
        self.record_state(session_id, SessionState::Bound);

        info!(
            session_id = %session_id,
            root_session_id = %root_session_id,
            generation,
            worker_id = %worker.id(),
            previous_worker = ?preferred,
            "Session bound"
        );

        let info = SessionInfo {
            session_id,
            root_session_id,
            generation,
            worker_id: worker.id().to_string(),
            created_at,
            recreate_token,
        };
        Ok(Session::bound(
            info,
            worker,
            lease,
            options.clone(),
            self.clone(),
        ))
    }

    /// Lifecycle record of a session
    pub fn record(&self, session_id: Uuid) -> Option<SessionRecord> {
        self.inner.records.get(&session_id).map(|r| r.clone())
    }

    /// Records of every session issued, oldest first
    pub fn records(&self) -> Vec<SessionRecord> {
        let mut records: Vec<_> = self.inner.records.iter().map(|r| r.clone()).collect();
        records.sort_by_key(|r| r.session_id);
        records
    }

    pub(crate) fn record_state(&self, session_id: Uuid, state: SessionState) {
        if let Some(mut record) = self.inner.records.get_mut(&session_id) {
            record.state = state;
            record.history.push(state);
        }
    }

    pub(crate) fn record_release(&self, session_id: Uuid) {
        match self.inner.records.get_mut(&session_id) {
            Some(mut record) => {
                record.releases += 1;
                record.released_at = Some(Utc::now());
            }
            None => return,
        }

        let Some(max) = self.inner.max_released else {
            return;
        };
        let mut released = self.inner.released.lock();
        released.push_back(session_id);
        while released.len() > max {
            if let Some(oldest) = released.pop_front() {
                self.inner.records.remove(&oldest);
            }
        }
    }
}

impl std::fmt::Debug for SessionManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionManager")
            .field("pool", &self.inner.pool)
            .field("sessions", &self.inner.records.len())
            .finish()
    }
}
