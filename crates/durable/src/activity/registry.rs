//! Activity registry for dispatch by name
//!
//! Workers resolve activities by their registered name rather than by direct
//! reference, so a scheduled invocation stays valid across restarts and can be
//! executed by any worker that registered the same name. The registry is
//! populated once at startup and treated as read-only afterwards.

use std::any::TypeId;
use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use super::{Activity, ActivityContext, ActivityError};
use crate::error_reasons;

/// Type-erased activity interface
///
/// All inputs and outputs are JSON values.
#[async_trait]
pub trait AnyActivity: Send + Sync {
    /// Get the activity name
    fn activity_type(&self) -> &str;

    /// Invoke the activity with a JSON input
    async fn invoke(&self, ctx: &ActivityContext, input: Value) -> Result<Value, ActivityError>;
}

/// Wrapper to implement AnyActivity for any Activity
struct ActivityWrapper<A: Activity> {
    inner: A,
}

#[async_trait]
impl<A: Activity> AnyActivity for ActivityWrapper<A> {
    fn activity_type(&self) -> &str {
        A::TYPE
    }

    async fn invoke(&self, ctx: &ActivityContext, input: Value) -> Result<Value, ActivityError> {
        let typed_input: A::Input = serde_json::from_value(input).map_err(|e| {
            ActivityError::non_retryable(format!("invalid input for {}: {}", A::TYPE, e))
                .with_reason(error_reasons::INVALID_PAYLOAD)
        })?;

        let output = self.inner.execute(ctx, typed_input).await?;

        serde_json::to_value(output).map_err(|e| {
            ActivityError::non_retryable(format!("invalid output from {}: {}", A::TYPE, e))
                .with_reason(error_reasons::INVALID_PAYLOAD)
        })
    }
}

/// Wrapper to implement AnyActivity for a closure
struct FnActivity<F> {
    name: String,
    handler: F,
}

#[async_trait]
impl<F, Fut> AnyActivity for FnActivity<F>
where
    F: Fn(ActivityContext, Value) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Value, ActivityError>> + Send + 'static,
{
    fn activity_type(&self) -> &str {
        &self.name
    }

    async fn invoke(&self, ctx: &ActivityContext, input: Value) -> Result<Value, ActivityError> {
        (self.handler)(ctx.clone(), input).await
    }
}

struct Registration {
    handler: Arc<dyn AnyActivity>,
    // Identity of the registered callable, used to tell a repeated
    // registration apart from a conflicting one
    identity: TypeId,
}

/// Registry of activities, keyed by name
///
/// # Example
///
/// ```ignore
/// let mut registry = ActivityRegistry::new();
/// registry.register(FindRandomImage::new(client))?;
/// registry.register_fn("echo", |_ctx, input| async move { Ok(input) })?;
/// ```
pub struct ActivityRegistry {
    activities: HashMap<String, Registration>,
}

impl Default for ActivityRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl ActivityRegistry {
    /// Create a new empty registry
    pub fn new() -> Self {
        Self {
            activities: HashMap::new(),
        }
    }

    /// Register a typed activity under `A::TYPE`
    ///
    /// Registering the same activity type twice is a no-op; registering a
    /// different callable under a taken name fails.
    pub fn register<A: Activity>(&mut self, activity: A) -> Result<(), RegistryError> {
        self.insert(
            A::TYPE,
            TypeId::of::<A>(),
            Arc::new(ActivityWrapper { inner: activity }),
        )
    }

    /// Register a closure taking and returning JSON values
    pub fn register_fn<F, Fut>(
        &mut self,
        name: impl Into<String>,
        handler: F,
    ) -> Result<(), RegistryError>
    where
        F: Fn(ActivityContext, Value) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Value, ActivityError>> + Send + 'static,
    {
        let name = name.into();
        let key = name.clone();
        self.insert(
            &key,
            TypeId::of::<F>(),
            Arc::new(FnActivity { name, handler }),
        )
    }

    fn insert(
        &mut self,
        name: &str,
        identity: TypeId,
        handler: Arc<dyn AnyActivity>,
    ) -> Result<(), RegistryError> {
        if let Some(existing) = self.activities.get(name) {
            if existing.identity == identity {
                return Ok(());
            }
            return Err(RegistryError::Conflict(name.to_string()));
        }

        self.activities
            .insert(name.to_string(), Registration { handler, identity });
        Ok(())
    }

    /// Check if an activity name is registered
    pub fn contains(&self, name: &str) -> bool {
        self.activities.contains_key(name)
    }

    /// Look up an activity by name
    pub fn get(&self, name: &str) -> Result<Arc<dyn AnyActivity>, RegistryError> {
        self.activities
            .get(name)
            .map(|r| r.handler.clone())
            .ok_or_else(|| RegistryError::UnknownActivity(name.to_string()))
    }

    /// Invoke an activity by name
    pub async fn invoke(
        &self,
        name: &str,
        ctx: &ActivityContext,
        input: Value,
    ) -> Result<Value, ActivityError> {
        let activity = self.get(name)?;
        activity.invoke(ctx, input).await
    }

    /// Get the number of registered activities
    pub fn len(&self) -> usize {
        self.activities.len()
    }

    /// Check if registry is empty
    pub fn is_empty(&self) -> bool {
        self.activities.is_empty()
    }

    /// Get all registered activity names
    pub fn activity_types(&self) -> impl Iterator<Item = &str> {
        self.activities.keys().map(|s| s.as_str())
    }
}

impl fmt::Debug for ActivityRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ActivityRegistry")
            .field("activity_types", &self.activities.keys().collect::<Vec<_>>())
            .finish()
    }
}

/// Errors from registry operations
#[derive(Debug, Clone, thiserror::Error, PartialEq, Eq)]
pub enum RegistryError {
    /// A different callable is already registered under this name
    #[error("activity {0} is already registered with a different implementation")]
    Conflict(String),

    /// Activity name not registered
    #[error("unknown activity: {0}")]
    UnknownActivity(String),
}

impl From<RegistryError> for ActivityError {
    fn from(err: RegistryError) -> Self {
        match err {
            RegistryError::UnknownActivity(_) => ActivityError::non_retryable(err.to_string())
                .with_reason(error_reasons::UNKNOWN_ACTIVITY),
            RegistryError::Conflict(_) => ActivityError::non_retryable(err.to_string()),
        }
    }
}
