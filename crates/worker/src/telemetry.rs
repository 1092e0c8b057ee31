// Logging bootstrap
//
// Console logging through tracing-subscriber with an EnvFilter.

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

/// Default filter when neither `RUST_LOG` nor `LOG_LEVEL` is set
pub const DEFAULT_LOG_FILTER: &str = "affinity_worker=debug,affinity_durable=info";

/// Configuration for logging
#[derive(Debug, Clone)]
pub struct TelemetryConfig {
    /// Service name, attached to the startup log line
    pub service_name: String,
    /// Log filter (e.g., "info", "affinity_durable=debug")
    pub log_filter: Option<String>,
    /// Whether to include the event target in log lines
    pub with_target: bool,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            service_name: "affinity-worker".to_string(),
            log_filter: None,
            with_target: true,
        }
    }
}

impl TelemetryConfig {
    /// Create configuration from environment variables
    ///
    /// Environment variables:
    /// - `SERVICE_NAME`: Service name (default: "affinity-worker")
    /// - `RUST_LOG`: Full log filter
    /// - `LOG_LEVEL`: Level applied to the worker crate when `RUST_LOG` is unset
    pub fn from_env() -> Self {
        Self {
            service_name: std::env::var("SERVICE_NAME")
                .unwrap_or_else(|_| "affinity-worker".to_string()),
            log_filter: std::env::var("RUST_LOG").ok().or_else(|| {
                std::env::var("LOG_LEVEL")
                    .ok()
                    .map(|level| format!("affinity_worker={},affinity_durable=info", level))
            }),
            with_target: true,
        }
    }

    fn filter(&self) -> EnvFilter {
        self.log_filter
            .as_ref()
            .and_then(|f| EnvFilter::try_new(f).ok())
            .unwrap_or_else(|| EnvFilter::new(DEFAULT_LOG_FILTER))
    }
}

/// Initialize console logging with the given configuration
///
/// Must be called at most once per process.
pub fn init_telemetry(config: TelemetryConfig) {
    let console_layer = tracing_subscriber::fmt::layer()
        .with_target(config.with_target)
        .with_filter(config.filter());

    tracing_subscriber::registry().with(console_layer).init();

    tracing::debug!(service_name = %config.service_name, "logging initialized");
}
