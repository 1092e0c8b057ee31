//! Well-known failure reasons
//!
//! Reasons are the string tags matched against
//! [`RetryPolicy::non_retriable_error_reasons`](crate::RetryPolicy) and
//! carried in [`ActivityError::reason`](crate::ActivityError) /
//! [`WorkflowError::code`](crate::WorkflowError).

/// Activity waited too long for a worker slot
pub const TIMEOUT_SCHEDULE_TO_START: &str = "timeout:schedule_to_start";

/// Activity ran longer than its start-to-close timeout
pub const TIMEOUT_START_TO_CLOSE: &str = "timeout:start_to_close";

/// Workflow run exceeded its execution timeout
pub const TIMEOUT_EXECUTION: &str = "timeout:execution";

/// No worker has the requested activity registered
pub const UNKNOWN_ACTIVITY: &str = "unknown_activity";

/// Activity input or output failed to (de)serialize
pub const INVALID_PAYLOAD: &str = "invalid_payload";

/// A non-session activity's worker became unreachable mid-execution
pub const WORKER_LOST: &str = "worker_lost";

/// The session's bound worker became unreachable
pub const SESSION_LOST: &str = "session_lost";

/// The session outlived its execution timeout
pub const SESSION_EXPIRED: &str = "session_expired";

/// The session was already completed or failed
pub const SESSION_CLOSED: &str = "session_closed";

/// No worker accepted the session binding in time
pub const SESSION_CREATION_TIMEOUT: &str = "session_creation_timeout";

/// The recreate token could not be decoded
pub const INVALID_RECREATE_TOKEN: &str = "invalid_recreate_token";

/// External cancellation was observed
pub const CANCELLED: &str = "cancelled";

/// Run history grew past the configured event limit
pub const HISTORY_LIMIT_EXCEEDED: &str = "history_limit_exceeded";

/// Child workflow could not be started
pub const CHILD_START_FAILED: &str = "child_start_failed";
