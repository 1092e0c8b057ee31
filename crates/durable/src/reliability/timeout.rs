//! Activity timeout enforcement
//!
//! Every activity attempt is bounded by two independent timeouts:
//! schedule-to-start (queued too long before a worker slot frees up) and
//! start-to-close (the worker took too long to finish). Both are retriable
//! failures from the retry policy's point of view.

use std::future::Future;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::activity::ActivityError;
use crate::error_reasons;

/// Types of timeouts that can occur
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TimeoutType {
    /// Activity was not picked up within schedule_to_start_timeout
    ScheduleToStart,

    /// Activity did not complete within start_to_close_timeout
    StartToClose,
}

impl TimeoutType {
    /// Failure reason attached to activity errors of this type
    pub fn reason(&self) -> &'static str {
        match self {
            Self::ScheduleToStart => error_reasons::TIMEOUT_SCHEDULE_TO_START,
            Self::StartToClose => error_reasons::TIMEOUT_START_TO_CLOSE,
        }
    }
}

impl std::fmt::Display for TimeoutType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::ScheduleToStart => write!(f, "schedule_to_start"),
            Self::StartToClose => write!(f, "start_to_close"),
        }
    }
}

/// Timeout-related errors
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TimeoutError {
    /// Activity exceeded schedule-to-start timeout
    #[error("activity timed out waiting to start (limit {limit:?})")]
    ScheduleToStart { limit: Duration },

    /// Activity exceeded start-to-close timeout
    #[error("activity execution timed out (limit {limit:?})")]
    StartToClose { limit: Duration },
}

impl TimeoutError {
    /// Build the error for a timeout type
    pub fn new(timeout_type: TimeoutType, limit: Duration) -> Self {
        match timeout_type {
            TimeoutType::ScheduleToStart => Self::ScheduleToStart { limit },
            TimeoutType::StartToClose => Self::StartToClose { limit },
        }
    }

    /// Which timeout fired
    pub fn timeout_type(&self) -> TimeoutType {
        match self {
            Self::ScheduleToStart { .. } => TimeoutType::ScheduleToStart,
            Self::StartToClose { .. } => TimeoutType::StartToClose,
        }
    }
}

impl From<TimeoutError> for ActivityError {
    fn from(err: TimeoutError) -> Self {
        ActivityError::retryable(err.to_string()).with_reason(err.timeout_type().reason())
    }
}

/// Run `future`, failing with a timeout error of `timeout_type` after `limit`
pub async fn enforce<F>(
    timeout_type: TimeoutType,
    limit: Duration,
    future: F,
) -> Result<F::Output, TimeoutError>
where
    F: Future,
{
    tokio::time::timeout(limit, future)
        .await
        .map_err(|_| TimeoutError::new(timeout_type, limit))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_enforce_completes_in_time() {
        let result = enforce(TimeoutType::StartToClose, Duration::from_secs(5), async {
            tokio::time::sleep(Duration::from_secs(1)).await;
            42
        })
        .await;

        assert_eq!(result, Ok(42));
    }

    #[tokio::test(start_paused = true)]
    async fn test_enforce_start_to_close_timeout() {
        let result = enforce(TimeoutType::StartToClose, Duration::from_secs(5), async {
            tokio::time::sleep(Duration::from_secs(60)).await;
        })
        .await;

        assert_eq!(
            result,
            Err(TimeoutError::StartToClose {
                limit: Duration::from_secs(5)
            })
        );
    }

    #[test]
    fn test_timeout_becomes_retryable_activity_error() {
        let error: ActivityError =
            TimeoutError::new(TimeoutType::ScheduleToStart, Duration::from_secs(60)).into();

        assert!(error.retryable);
        assert_eq!(
            error.reason.as_deref(),
            Some(error_reasons::TIMEOUT_SCHEDULE_TO_START)
        );
    }
}
