//! Sticky sessions
//!
//! A session is a lease binding a chain of activities to one worker, so
//! activities sharing local state (a downloaded file) run on the same host.
//! If the host is lost the chain is resumed elsewhere with the session's
//! [`RecreateToken`].
//!
//! ```ignore
//! let mut session = ctx.create_session(&options).await?;
//! let result = async {
//!     let path = ctx.execute_in::<DownloadImage>(&mut session, url, &activity).await?;
//!     ctx.execute_in::<CalcChecksum>(&mut session, path, &activity).await
//! }
//! .await;
//! ctx.complete_session(session).await;
//! ```

mod handle;
mod manager;
mod state;
mod token;

use std::time::Duration;

use thiserror::Error;
use uuid::Uuid;

use crate::activity::ActivityError;
use crate::error_reasons;

pub use handle::{Session, SessionInfo};
pub use manager::{SessionManager, SessionOptions, SessionRecord};
pub use state::SessionState;
pub use token::{RecreateToken, SessionLineage};

/// Session errors
#[derive(Debug, Clone, Error, PartialEq)]
pub enum SessionError {
    /// No worker accepted the binding in time
    #[error("no worker accepted the session within {timeout:?}")]
    CreationTimeout { timeout: Duration },

    /// The bound worker became unreachable past the liveness threshold
    #[error("session {session_id} lost its worker {worker_id}")]
    Lost { session_id: Uuid, worker_id: String },

    /// The session outlived its execution timeout
    #[error("session {session_id} exceeded its execution timeout of {timeout:?}")]
    Expired { session_id: Uuid, timeout: Duration },

    /// The recreate token could not be decoded
    #[error("invalid recreate token: {0}")]
    InvalidToken(String),

    /// The session can no longer run activities
    #[error("session {session_id} is {state}")]
    Closed {
        session_id: Uuid,
        state: SessionState,
    },
}

impl SessionError {
    /// Failure reason for this error
    pub fn reason(&self) -> &'static str {
        match self {
            Self::CreationTimeout { .. } => error_reasons::SESSION_CREATION_TIMEOUT,
            Self::Lost { .. } => error_reasons::SESSION_LOST,
            Self::Expired { .. } => error_reasons::SESSION_EXPIRED,
            Self::InvalidToken(_) => error_reasons::INVALID_RECREATE_TOKEN,
            Self::Closed { .. } => error_reasons::SESSION_CLOSED,
        }
    }
}

impl From<SessionError> for ActivityError {
    fn from(err: SessionError) -> Self {
        ActivityError::non_retryable(err.to_string()).with_reason(err.reason())
    }
}
