//! Reliability patterns for durable execution
//!
//! This module provides:
//! - [`RetryPolicy`] - Configurable retry with exponential backoff
//! - [`TimeoutType`] / [`enforce`] - Schedule-to-start and start-to-close bounds

mod retry;
mod timeout;

pub(crate) use retry::{duration_millis, option_duration_millis};
pub use retry::RetryPolicy;
pub use timeout::{enforce, TimeoutError, TimeoutType};
