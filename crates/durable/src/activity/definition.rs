//! Activity trait definition

use async_trait::async_trait;
use serde::{de::DeserializeOwned, Deserialize, Serialize};

use super::ActivityContext;
use crate::error_reasons;

/// Error type for activity failures
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ActivityError {
    /// Error message
    pub message: String,

    /// Failure reason tag, matched against the retry policy's
    /// non-retriable reasons
    pub reason: Option<String>,

    /// Whether this error is retryable
    ///
    /// Non-retryable errors will immediately fail the activity
    /// without further retry attempts.
    pub retryable: bool,

    /// Additional error details (for debugging)
    pub details: Option<serde_json::Value>,
}

impl ActivityError {
    /// Create a new retryable error
    pub fn retryable(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            reason: None,
            retryable: true,
            details: None,
        }
    }

    /// Create a non-retryable error
    pub fn non_retryable(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            reason: None,
            retryable: false,
            details: None,
        }
    }

    /// Error reported when an in-flight activity observes cancellation
    pub fn cancelled() -> Self {
        Self::non_retryable("activity cancelled").with_reason(error_reasons::CANCELLED)
    }

    /// Set the failure reason
    pub fn with_reason(mut self, reason: impl Into<String>) -> Self {
        self.reason = Some(reason.into());
        self
    }

    /// Add error details
    pub fn with_details(mut self, details: serde_json::Value) -> Self {
        self.details = Some(details);
        self
    }

    /// Check whether the failure carries the given reason
    pub fn has_reason(&self, reason: &str) -> bool {
        self.reason.as_deref() == Some(reason)
    }

    /// Check if this error was caused by cancellation
    pub fn is_cancelled(&self) -> bool {
        self.has_reason(error_reasons::CANCELLED)
    }
}

impl std::fmt::Display for ActivityError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.reason {
            Some(reason) => write!(f, "{} ({})", self.message, reason),
            None => write!(f, "{}", self.message),
        }
    }
}

impl std::error::Error for ActivityError {}

impl From<anyhow::Error> for ActivityError {
    fn from(err: anyhow::Error) -> Self {
        Self::retryable(format!("{:#}", err))
    }
}

impl From<std::io::Error> for ActivityError {
    fn from(err: std::io::Error) -> Self {
        Self::retryable(err.to_string())
    }
}

/// An activity is a unit of work that may fail and be retried
///
/// Activities are the building blocks of workflows. They represent
/// discrete operations that:
/// - Are executed by workers outside the workflow
/// - Are dispatched by name through an [`ActivityRegistry`](super::ActivityRegistry)
/// - May be invoked more than once for the same logical step
/// - Own no session state of their own
///
/// # Example
///
/// ```ignore
/// use affinity_durable::prelude::*;
///
/// struct CalcChecksum;
///
/// #[async_trait]
/// impl Activity for CalcChecksum {
///     const TYPE: &'static str = "calcChecksumActivity";
///     type Input = String;
///     type Output = String;
///
///     async fn execute(
///         &self,
///         ctx: &ActivityContext,
///         path: Self::Input,
///     ) -> Result<Self::Output, ActivityError> {
///         // Hash the file...
///         Ok(digest)
///     }
/// }
/// ```
#[async_trait]
pub trait Activity: Send + Sync + 'static {
    /// Unique name for this activity
    ///
    /// This is the key used to look up the activity in the registry.
    const TYPE: &'static str;

    /// Input type for the activity
    type Input: Serialize + DeserializeOwned + Send;

    /// Output type for the activity
    type Output: Serialize + DeserializeOwned + Send;

    /// Execute the activity
    ///
    /// # Errors
    ///
    /// Return `ActivityError::retryable()` for transient failures that should be retried.
    /// Return `ActivityError::non_retryable()` for permanent failures.
    async fn execute(
        &self,
        ctx: &ActivityContext,
        input: Self::Input,
    ) -> Result<Self::Output, ActivityError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_activity_error_retryable() {
        let error = ActivityError::retryable("timeout");
        assert!(error.retryable);
        assert_eq!(error.to_string(), "timeout");
    }

    #[test]
    fn test_activity_error_non_retryable() {
        let error = ActivityError::non_retryable("invalid input");
        assert!(!error.retryable);
    }

    #[test]
    fn test_activity_error_with_reason() {
        let error = ActivityError::retryable("connection failed").with_reason("CONNECTION_ERROR");

        assert_eq!(error.reason, Some("CONNECTION_ERROR".to_string()));
        assert!(error.has_reason("CONNECTION_ERROR"));
        assert_eq!(error.to_string(), "connection failed (CONNECTION_ERROR)");
    }

    #[test]
    fn test_cancelled_error() {
        let error = ActivityError::cancelled();
        assert!(error.is_cancelled());
        assert!(!error.retryable);
    }

    #[test]
    fn test_activity_error_serialization() {
        let error = ActivityError::retryable("test error")
            .with_reason("TEST")
            .with_details(serde_json::json!({"key": "value"}));

        let json = serde_json::to_string(&error).unwrap();
        let parsed: ActivityError = serde_json::from_str(&json).unwrap();

        assert_eq!(error, parsed);
    }
}
