//! Worker processes and slot dispatch
//!
//! This module provides:
//! - [`Worker`] - One worker process: activity registry, bounded slots, reachability
//! - [`WorkerPool`] - The set of workers the executor dispatches to
//! - [`PollerConfig`] - Slot polling with exponential backoff
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                       WorkerPool                             │
//! │  (round-robin slot claims, session affinity preference)     │
//! └──────┬──────────────────────┬──────────────────────┬────────┘
//!        ▼                      ▼                      ▼
//! ┌─────────────┐        ┌─────────────┐        ┌─────────────┐
//! │  Worker A   │        │  Worker B   │        │  Worker C   │
//! │ activities  │        │ activities  │        │ activities  │
//! │ sessions    │        │ sessions    │        │ sessions    │
//! └─────────────┘        └─────────────┘        └─────────────┘
//! ```
//!
//! # Example
//!
//! ```ignore
//! use affinity_durable::worker::{Worker, WorkerConfig, WorkerPool};
//!
//! let mut activities = ActivityRegistry::new();
//! activities.register(DownloadImage::new(client, dir))?;
//!
//! let worker = Worker::new(
//!     WorkerConfig::new("image-worker-1").with_max_concurrent_sessions(4),
//!     activities,
//! );
//! let pool = WorkerPool::new(vec![worker]);
//! ```

mod poller;
mod pool;
mod process;

pub use poller::PollerConfig;
pub use pool::WorkerPool;
pub use process::{Worker, WorkerConfig};
