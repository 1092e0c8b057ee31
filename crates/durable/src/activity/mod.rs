//! Activity abstractions
//!
//! Activities are units of work that are executed by workers. They:
//! - Are dispatched by name through an [`ActivityRegistry`]
//! - May fail and be retried according to the retry policy
//! - Support cancellation via tokens

mod context;
mod definition;
mod registry;

pub use context::ActivityContext;
pub use definition::{Activity, ActivityError};
pub use registry::{ActivityRegistry, AnyActivity, RegistryError};
