// Worker configuration
// Decision: Environment variables with typed defaults, no config files
// Decision: Per-call-site policies live in ImageWorkflowConfig, not in workflow code

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use affinity_durable::{ActivityOptions, ChildWorkflowOptions, RetryPolicy, SessionOptions};
use serde::{Deserialize, Serialize};

/// Failure reason the image activities never retry
pub const NON_RETRYABLE_REASON: &str = "non-retryable error";

// =============================================================================
// Worker configuration
// =============================================================================

/// Configuration for the worker processes hosted by this binary
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Worker ID prefix; each hosted worker gets `<id>-<n>`
    pub worker_id: String,
    /// Number of worker processes to host
    pub worker_count: usize,
    /// Maximum concurrent activities per worker
    pub max_concurrent_activities: usize,
    /// Maximum concurrent sessions per worker
    pub max_concurrent_sessions: usize,
    /// Delay injected before every activity
    pub artificial_activity_delay: Duration,
    /// Fail roughly half of all activity attempts
    pub artificial_activity_random_errors: bool,
    /// URL that redirects to a random image
    pub image_source_url: String,
    /// Directory downloaded images are written to
    pub download_dir: PathBuf,
    /// Closed runs and released session records kept in memory
    pub max_retained_runs: usize,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            worker_id: "worker".to_string(),
            worker_count: 2,
            max_concurrent_activities: 10,
            max_concurrent_sessions: 10,
            artificial_activity_delay: Duration::ZERO,
            artificial_activity_random_errors: false,
            image_source_url: "https://source.unsplash.com/random/800x600".to_string(),
            download_dir: std::env::temp_dir().join("affinity-images"),
            max_retained_runs: 1_000,
        }
    }
}

impl WorkerConfig {
    /// Create configuration from environment variables
    pub fn from_env() -> Self {
        let defaults = Self::default();

        Self {
            worker_id: std::env::var("WORKER_ID").unwrap_or(defaults.worker_id),
            worker_count: env_parse("WORKER_COUNT")
                .unwrap_or(defaults.worker_count)
                .max(1),
            max_concurrent_activities: env_parse("MAX_CONCURRENT_ACTIVITIES")
                .unwrap_or(defaults.max_concurrent_activities),
            max_concurrent_sessions: env_parse("MAX_CONCURRENT_SESSIONS")
                .unwrap_or(defaults.max_concurrent_sessions),
            artificial_activity_delay: env_parse("ARTIFICIAL_ACTIVITY_DELAY_MS")
                .map(Duration::from_millis)
                .unwrap_or(defaults.artificial_activity_delay),
            artificial_activity_random_errors: std::env::var("ARTIFICIAL_ACTIVITY_RANDOM_ERRORS")
                .map(|v| v.to_lowercase() == "true" || v == "1")
                .unwrap_or(defaults.artificial_activity_random_errors),
            image_source_url: std::env::var("IMAGE_SOURCE_URL")
                .unwrap_or(defaults.image_source_url),
            download_dir: std::env::var("DOWNLOAD_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.download_dir),
            max_retained_runs: env_parse("MAX_RETAINED_RUNS")
                .unwrap_or(defaults.max_retained_runs),
        }
    }

    /// IDs of the hosted workers
    pub fn worker_ids(&self) -> Vec<String> {
        (1..=self.worker_count)
            .map(|n| format!("{}-{}", self.worker_id, n))
            .collect()
    }

    /// Process configuration for one hosted worker
    pub fn process_config(&self, worker_id: &str) -> affinity_durable::WorkerConfig {
        affinity_durable::WorkerConfig::new(worker_id)
            .with_max_concurrent_activities(self.max_concurrent_activities)
            .with_max_concurrent_sessions(self.max_concurrent_sessions)
    }
}

fn env_parse<T: FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|s| s.parse().ok())
}

// =============================================================================
// Workflow configuration
// =============================================================================

/// Timeouts and policies used by the image workflows
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ImageWorkflowConfig {
    /// Options for every activity call, inside a session or not
    pub activity_options: ActivityOptions,
    /// Options for processing sessions
    pub session_options: SessionOptions,
    /// Options for processing children started by the finder
    pub child_options: ChildWorkflowOptions,
    /// Continue a failed processing chain with its recreate token instead
    /// of failing the child
    pub resume_on_failure: bool,
}

impl Default for ImageWorkflowConfig {
    fn default() -> Self {
        let retry_policy = Self::retry_policy();

        Self {
            activity_options: ActivityOptions::default()
                .with_schedule_to_start_timeout(Duration::from_secs(60))
                .with_start_to_close_timeout(Duration::from_secs(60))
                .with_retry(retry_policy.clone()),
            session_options: SessionOptions::default()
                .with_creation_timeout(Duration::from_secs(60))
                .with_execution_timeout(Duration::from_secs(60)),
            child_options: ChildWorkflowOptions::default()
                .with_execution_timeout(Duration::from_secs(60 * 60))
                .with_retry(retry_policy),
            resume_on_failure: false,
        }
    }
}

impl ImageWorkflowConfig {
    /// Retry policy shared by activities and processing children
    pub fn retry_policy() -> RetryPolicy {
        RetryPolicy::exponential()
            .with_initial_interval(Duration::from_secs(1))
            .with_backoff_coefficient(2.0)
            .with_max_interval(Duration::from_secs(10 * 60))
            .with_max_total_duration(Duration::from_secs(10 * 60))
            .with_max_attempts(5)
            .with_non_retriable_reason(NON_RETRYABLE_REASON)
    }

    /// Set the activity options
    pub fn with_activity_options(mut self, options: ActivityOptions) -> Self {
        self.activity_options = options;
        self
    }

    /// Set the session options
    pub fn with_session_options(mut self, options: SessionOptions) -> Self {
        self.session_options = options;
        self
    }

    /// Set the child workflow options
    pub fn with_child_options(mut self, options: ChildWorkflowOptions) -> Self {
        self.child_options = options;
        self
    }

    /// Continue failed processing chains with their recreate token
    pub fn with_resume_on_failure(mut self, resume: bool) -> Self {
        self.resume_on_failure = resume;
        self
    }
}
