//! Session handle

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::OwnedSemaphorePermit;
use tokio::time::Instant;
use tracing::{debug, warn};
use uuid::Uuid;

use super::{RecreateToken, SessionError, SessionManager, SessionOptions, SessionState};
use crate::worker::Worker;

/// Session information visible to activities
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SessionInfo {
    /// Session ID
    pub session_id: Uuid,

    /// First session of the chain this one continues
    pub root_session_id: Uuid,

    /// Number of recreations since the root session
    pub generation: u32,

    /// Worker the session is bound to
    pub worker_id: String,

    /// When the binding was accepted
    pub created_at: DateTime<Utc>,

    /// Token for rebinding the chain after a failure
    pub recreate_token: RecreateToken,
}

/// A lease binding a chain of activities to one worker
///
/// A `Session` is not `Clone`: activities are issued through `&mut Session`,
/// so one chain owns it at a time. Pass it to
/// [`SessionManager::complete`] when the chain is done; dropping it without
/// completing still releases the binding.
pub struct Session {
    info: SessionInfo,
    worker: Worker,
    options: SessionOptions,
    deadline: Instant,
    state: SessionState,
    failure: Option<SessionError>,
    lease: Option<OwnedSemaphorePermit>,
    manager: SessionManager,
}

impl Session {
    pub(crate) fn bound(
        info: SessionInfo,
        worker: Worker,
        lease: OwnedSemaphorePermit,
        options: SessionOptions,
        manager: SessionManager,
    ) -> Self {
        Self {
            info,
            worker,
            deadline: Instant::now() + options.execution_timeout,
            options,
            state: SessionState::Bound,
            failure: None,
            lease: Some(lease),
            manager,
        }
    }

    /// Session ID
    pub fn id(&self) -> Uuid {
        self.info.session_id
    }

    /// Session information
    pub fn info(&self) -> &SessionInfo {
        &self.info
    }

    /// Identity of the bound worker
    pub fn worker_id(&self) -> &str {
        &self.info.worker_id
    }

    /// Current lifecycle state
    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Token for resuming this chain elsewhere
    pub fn recreate_token(&self) -> &RecreateToken {
        &self.info.recreate_token
    }

    /// Options the session was created with
    pub fn options(&self) -> &SessionOptions {
        &self.options
    }

    /// Failure that moved the session to `Failed`, if any
    pub fn failure(&self) -> Option<&SessionError> {
        self.failure.as_ref()
    }

    pub(crate) fn worker(&self) -> &Worker {
        &self.worker
    }

    /// Mark the session active for the next activity
    ///
    /// Fails if the session is closed, past its execution deadline, or its
    /// worker stays unreachable for the heartbeat threshold.
    pub(crate) async fn begin_activity(&mut self) -> Result<(), SessionError> {
        if let Some(error) = &self.failure {
            return Err(error.clone());
        }
        self.transition(SessionState::Active)?;

        if Instant::now() >= self.deadline {
            let error = self.expired_error();
            return Err(self.fail(error));
        }

        if !self.worker.is_reachable() {
            let recovered = tokio::time::timeout(
                self.options.heartbeat_timeout,
                self.worker.wait_reachable(),
            )
            .await
            .is_ok();
            if !recovered {
                let error = self.lost_error();
                return Err(self.fail(error));
            }
        }

        Ok(())
    }

    /// Return to idle after an activity finished
    pub(crate) fn end_activity(&mut self) {
        if self.state == SessionState::Active {
            self.set_state(SessionState::Idle);
        }
    }

    /// Resolves with the error that ends the session while an activity runs
    pub(crate) async fn watch(&self) -> SessionError {
        tokio::select! {
            _ = self.worker.unreachable_for(self.options.heartbeat_timeout) => self.lost_error(),
            _ = tokio::time::sleep_until(self.deadline) => self.expired_error(),
        }
    }

    /// Move to `Failed`
    pub(crate) fn fail(&mut self, error: SessionError) -> SessionError {
        if self.state.can_transition_to(SessionState::Failed) {
            self.set_state(SessionState::Failed);
        }
        warn!(
            session_id = %self.id(),
            worker_id = %self.worker_id(),
            error = %error,
            "Session failed"
        );
        self.failure = Some(error.clone());
        error
    }

    /// Release the worker binding; returns false if already released
    pub(crate) fn release(&mut self) -> bool {
        let Some(lease) = self.lease.take() else {
            return false;
        };
        drop(lease);

        if self.state == SessionState::Active {
            self.set_state(SessionState::Idle);
        }
        if self.state.can_transition_to(SessionState::Completed) {
            self.set_state(SessionState::Completed);
        }
        self.manager.record_release(self.id());
        debug!(session_id = %self.id(), state = %self.state, "Session binding released");
        true
    }

    fn transition(&mut self, next: SessionState) -> Result<(), SessionError> {
        if !self.state.can_transition_to(next) {
            return Err(SessionError::Closed {
                session_id: self.id(),
                state: self.state,
            });
        }
        self.set_state(next);
        Ok(())
    }

    fn set_state(&mut self, next: SessionState) {
        self.state = next;
        self.manager.record_state(self.id(), next);
    }

    fn lost_error(&self) -> SessionError {
        SessionError::Lost {
            session_id: self.id(),
            worker_id: self.worker_id().to_string(),
        }
    }

    fn expired_error(&self) -> SessionError {
        SessionError::Expired {
            session_id: self.id(),
            timeout: self.options.execution_timeout,
        }
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        if self.release() {
            warn!(
                session_id = %self.id(),
                "Session dropped without complete, binding released"
            );
        }
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("session_id", &self.id())
            .field("worker_id", &self.worker_id())
            .field("state", &self.state)
            .field("released", &self.lease.is_none())
            .finish()
    }
}
