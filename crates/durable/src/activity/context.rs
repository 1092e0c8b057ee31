//! Activity execution context

use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::session::SessionInfo;

/// Context provided to activities during execution
///
/// The context provides:
/// - Information about the current execution attempt
/// - The session the activity is bound to, if any
/// - Cancellation detection
///
/// # Example
///
/// ```ignore
/// async fn execute(&self, ctx: &ActivityContext, input: Input) -> Result<Output, ActivityError> {
///     tokio::select! {
///         result = do_work(input) => result,
///         _ = ctx.cancelled() => Err(ActivityError::cancelled()),
///     }
/// }
/// ```
#[derive(Debug, Clone)]
pub struct ActivityContext {
    /// Unique execution attempt ID
    pub attempt_id: Uuid,

    /// Current attempt number (1-based)
    pub attempt: u32,

    /// Maximum attempts allowed (0 = unlimited)
    pub max_attempts: u32,

    /// Logical workflow ID that owns this activity
    pub workflow_id: String,

    /// Physical run of the owning workflow
    pub run_id: Uuid,

    /// Activity ID within the run
    pub activity_id: String,

    /// Identity of the worker executing this attempt
    pub worker_id: String,

    /// Session this activity is pinned to, if any
    pub session: Option<SessionInfo>,

    cancel: CancellationToken,
}

impl ActivityContext {
    /// Create a new activity context
    pub fn new(
        workflow_id: impl Into<String>,
        run_id: Uuid,
        activity_id: impl Into<String>,
        attempt: u32,
        max_attempts: u32,
    ) -> Self {
        Self {
            attempt_id: Uuid::now_v7(),
            attempt,
            max_attempts,
            workflow_id: workflow_id.into(),
            run_id,
            activity_id: activity_id.into(),
            worker_id: String::new(),
            session: None,
            cancel: CancellationToken::new(),
        }
    }

    /// Record the executing worker
    pub fn with_worker(mut self, worker_id: impl Into<String>) -> Self {
        self.worker_id = worker_id.into();
        self
    }

    /// Attach session information
    pub fn with_session(mut self, session: SessionInfo) -> Self {
        self.session = Some(session);
        self
    }

    /// Use the given token for cancellation
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    /// Get a handle that can be used to cancel this activity
    pub fn cancellation_handle(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Check if cancellation was requested
    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Resolves when cancellation is requested
    pub async fn cancelled(&self) {
        self.cancel.cancelled().await
    }

    /// Check if this is the last retry attempt
    pub fn is_last_attempt(&self) -> bool {
        self.max_attempts != 0 && self.attempt >= self.max_attempts
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_activity_context_creation() {
        let run_id = Uuid::now_v7();
        let ctx = ActivityContext::new("image_finder", run_id, "step-1", 1, 3).with_worker("w-1");

        assert_eq!(ctx.workflow_id, "image_finder");
        assert_eq!(ctx.run_id, run_id);
        assert_eq!(ctx.activity_id, "step-1");
        assert_eq!(ctx.worker_id, "w-1");
        assert_eq!(ctx.attempt, 1);
        assert!(ctx.session.is_none());
        assert!(!ctx.is_cancelled());
        assert!(!ctx.is_last_attempt());
    }

    #[test]
    fn test_is_last_attempt() {
        let ctx = ActivityContext::new("wf", Uuid::now_v7(), "step-1", 3, 3);
        assert!(ctx.is_last_attempt());

        let ctx = ActivityContext::new("wf", Uuid::now_v7(), "step-1", 2, 3);
        assert!(!ctx.is_last_attempt());

        // Unlimited attempts never reach a last attempt
        let ctx = ActivityContext::new("wf", Uuid::now_v7(), "step-1", 99, 0);
        assert!(!ctx.is_last_attempt());
    }

    #[tokio::test]
    async fn test_cancellation() {
        let ctx = ActivityContext::new("wf", Uuid::now_v7(), "step-1", 1, 3);
        let handle = ctx.cancellation_handle();

        assert!(!ctx.is_cancelled());

        handle.cancel();

        assert!(ctx.is_cancelled());
        ctx.cancelled().await;
    }
}
