//! Retry policy implementation

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Configuration for activity retries
///
/// One policy shape is used for every scheduled operation: top-level
/// activities, activities inside a session and whole child workflow runs.
/// Policies are immutable values; share them by reference or clone.
///
/// # Example
///
/// ```
/// use affinity_durable::RetryPolicy;
/// use std::time::Duration;
///
/// let policy = RetryPolicy::exponential()
///     .with_max_attempts(5)
///     .with_initial_interval(Duration::from_secs(1))
///     .with_max_interval(Duration::from_secs(600));
///
/// // Wait ~1s after the first failure, then 2s, 4s, 8s
/// assert_eq!(policy.backoff_after(1), Duration::from_secs(1));
/// assert_eq!(policy.backoff_after(4), Duration::from_secs(8));
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RetryPolicy {
    /// Delay before the first retry
    #[serde(with = "duration_millis")]
    pub initial_interval: Duration,

    /// Backoff multiplier (>= 1.0)
    pub backoff_coefficient: f64,

    /// Upper bound for a single backoff delay
    #[serde(with = "duration_millis")]
    pub max_interval: Duration,

    /// Upper bound for the whole retry sequence, measured from the first attempt
    ///
    /// `None` means unbounded.
    #[serde(default, with = "option_duration_millis")]
    pub max_total_duration: Option<Duration>,

    /// Maximum number of attempts (including the first one)
    ///
    /// `0` means unlimited; only `max_total_duration` bounds the sequence.
    pub max_attempts: u32,

    /// Failure reasons that abort immediately without retrying
    #[serde(default)]
    pub non_retriable_error_reasons: Vec<String>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::exponential()
    }
}

impl RetryPolicy {
    /// Create an exponential backoff retry policy with sensible defaults
    ///
    /// - 5 max attempts
    /// - 1 second initial interval
    /// - 60 second max interval
    /// - 2x backoff coefficient
    /// - no total duration bound
    pub fn exponential() -> Self {
        Self {
            initial_interval: Duration::from_secs(1),
            backoff_coefficient: 2.0,
            max_interval: Duration::from_secs(60),
            max_total_duration: None,
            max_attempts: 5,
            non_retriable_error_reasons: vec![],
        }
    }

    /// Create a policy that never retries
    pub fn no_retry() -> Self {
        Self {
            initial_interval: Duration::ZERO,
            backoff_coefficient: 1.0,
            max_interval: Duration::ZERO,
            max_total_duration: None,
            max_attempts: 1,
            non_retriable_error_reasons: vec![],
        }
    }

    /// Create a policy with fixed intervals (no backoff)
    pub fn fixed(interval: Duration, max_attempts: u32) -> Self {
        Self {
            initial_interval: interval,
            backoff_coefficient: 1.0,
            max_interval: interval,
            max_total_duration: None,
            max_attempts,
            non_retriable_error_reasons: vec![],
        }
    }

    /// Set the maximum number of attempts (`0` = unlimited)
    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts;
        self
    }

    /// Set the initial retry interval
    pub fn with_initial_interval(mut self, interval: Duration) -> Self {
        self.initial_interval = interval;
        self
    }

    /// Set the maximum retry interval
    pub fn with_max_interval(mut self, interval: Duration) -> Self {
        self.max_interval = interval;
        self
    }

    /// Bound the total time spent retrying
    pub fn with_max_total_duration(mut self, duration: Duration) -> Self {
        self.max_total_duration = Some(duration);
        self
    }

    /// Set the backoff coefficient, clamped to at least 1.0
    pub fn with_backoff_coefficient(mut self, coefficient: f64) -> Self {
        self.backoff_coefficient = coefficient.max(1.0);
        self
    }

    /// Add a non-retriable failure reason
    pub fn with_non_retriable_reason(mut self, reason: impl Into<String>) -> Self {
        self.non_retriable_error_reasons.push(reason.into());
        self
    }

    /// Delay to wait after the given attempt (1-based) failed
    ///
    /// `min(initial_interval * backoff_coefficient^(attempt-1), max_interval)`
    pub fn backoff_after(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(i32::MAX as u32) as i32;
        let coefficient = self.backoff_coefficient.max(1.0);
        let base = self.initial_interval.as_secs_f64() * coefficient.powi(exponent);
        let capped = base.min(self.max_interval.as_secs_f64());

        if capped.is_finite() && capped > 0.0 {
            Duration::from_secs_f64(capped)
        } else if capped > 0.0 {
            self.max_interval
        } else {
            Duration::ZERO
        }
    }

    /// Check if a failure reason may be retried
    pub fn should_retry(&self, reason: Option<&str>) -> bool {
        match reason {
            Some(reason) => !self
                .non_retriable_error_reasons
                .iter()
                .any(|r| r == reason),
            None => true,
        }
    }

    /// Check if another attempt may follow `current_attempt`
    pub fn has_attempts_remaining(&self, current_attempt: u32) -> bool {
        self.max_attempts == 0 || current_attempt < self.max_attempts
    }

    /// Check if a retry starting after `elapsed` would exceed the total budget
    pub fn is_expired(&self, elapsed: Duration) -> bool {
        self.max_total_duration
            .map(|limit| elapsed > limit)
            .unwrap_or(false)
    }

    /// Decide whether to retry after a failed attempt
    ///
    /// Returns the backoff delay when another attempt is allowed.
    pub fn next_retry(
        &self,
        attempt: u32,
        elapsed: Duration,
        reason: Option<&str>,
    ) -> Option<Duration> {
        if !self.should_retry(reason) || !self.has_attempts_remaining(attempt) {
            return None;
        }

        let delay = self.backoff_after(attempt);
        if self.is_expired(elapsed + delay) {
            return None;
        }

        Some(delay)
    }
}

/// Serde support for Duration as milliseconds
pub(crate) mod duration_millis {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        (duration.as_millis() as u64).serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let millis = u64::deserialize(deserializer)?;
        Ok(Duration::from_millis(millis))
    }
}

/// Serde support for Option<Duration> as milliseconds
pub(crate) mod option_duration_millis {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Option<Duration>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match duration {
            Some(d) => (d.as_millis() as u64).serialize(serializer),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<Duration>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let millis: Option<u64> = Option::deserialize(deserializer)?;
        Ok(millis.map(Duration::from_millis))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exponential_defaults() {
        let policy = RetryPolicy::exponential();
        assert_eq!(policy.max_attempts, 5);
        assert_eq!(policy.initial_interval, Duration::from_secs(1));
        assert_eq!(policy.backoff_coefficient, 2.0);
        assert_eq!(policy.max_total_duration, None);
    }

    #[test]
    fn test_no_retry() {
        let policy = RetryPolicy::no_retry();
        assert_eq!(policy.max_attempts, 1);
        assert!(!policy.has_attempts_remaining(1));
        assert_eq!(policy.next_retry(1, Duration::ZERO, None), None);
    }

    #[test]
    fn test_fixed_interval() {
        let policy = RetryPolicy::fixed(Duration::from_secs(5), 3);

        assert_eq!(policy.backoff_after(1), Duration::from_secs(5));
        assert_eq!(policy.backoff_after(2), Duration::from_secs(5));
    }

    #[test]
    fn test_backoff_after() {
        let policy = RetryPolicy::exponential();

        assert_eq!(policy.backoff_after(1), Duration::from_secs(1));
        assert_eq!(policy.backoff_after(2), Duration::from_secs(2));
        assert_eq!(policy.backoff_after(3), Duration::from_secs(4));
        assert_eq!(policy.backoff_after(4), Duration::from_secs(8));
    }

    #[test]
    fn test_max_interval_cap() {
        let policy = RetryPolicy::exponential().with_max_interval(Duration::from_secs(5));

        assert_eq!(policy.backoff_after(10), Duration::from_secs(5));
        // Huge exponents must not overflow
        assert_eq!(policy.backoff_after(u32::MAX), Duration::from_secs(5));
    }

    #[test]
    fn test_backoff_coefficient_clamped() {
        let policy = RetryPolicy::exponential().with_backoff_coefficient(0.5);
        assert_eq!(policy.backoff_coefficient, 1.0);
        assert_eq!(policy.backoff_after(3), Duration::from_secs(1));
    }

    #[test]
    fn test_non_retriable_reasons() {
        let policy = RetryPolicy::exponential()
            .with_non_retriable_reason("non-retryable error")
            .with_non_retriable_reason("NOT_FOUND");

        assert!(!policy.should_retry(Some("non-retryable error")));
        assert!(!policy.should_retry(Some("NOT_FOUND")));
        assert!(policy.should_retry(Some("random error")));
        assert!(policy.should_retry(None));
        assert_eq!(
            policy.next_retry(1, Duration::ZERO, Some("NOT_FOUND")),
            None
        );
    }

    #[test]
    fn test_has_attempts_remaining() {
        let policy = RetryPolicy::exponential().with_max_attempts(3);

        assert!(policy.has_attempts_remaining(1));
        assert!(policy.has_attempts_remaining(2));
        assert!(!policy.has_attempts_remaining(3));
    }

    #[test]
    fn test_unlimited_attempts_bounded_by_total_duration() {
        let policy = RetryPolicy::fixed(Duration::from_secs(10), 0)
            .with_max_total_duration(Duration::from_secs(25));

        assert!(policy.has_attempts_remaining(1_000));
        assert_eq!(
            policy.next_retry(7, Duration::from_secs(10), None),
            Some(Duration::from_secs(10))
        );
        // A retry at 30s would start past the 25s budget
        assert_eq!(policy.next_retry(8, Duration::from_secs(20), None), None);
    }

    #[test]
    fn test_serialization() {
        let policy = RetryPolicy::exponential()
            .with_max_attempts(10)
            .with_max_total_duration(Duration::from_secs(600))
            .with_non_retriable_reason("TEST");

        let json = serde_json::to_string(&policy).unwrap();
        assert!(json.contains("\"max_total_duration\":600000"));

        let parsed: RetryPolicy = serde_json::from_str(&json).unwrap();
        assert_eq!(policy, parsed);
    }
}
