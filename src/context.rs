//! Operation context, read options and the clock collaborator.

use chrono::{DateTime, Utc};
use std::sync::{Arc, Mutex};
use uuid::Uuid;

/// Context carried through every provisioning operation.
///
/// Provides request tracking for logging. The optional task identifier links
/// the operation to the (external) activity that triggered it.
#[derive(Debug, Clone)]
pub struct OperationContext {
    /// Unique identifier for this request
    pub request_id: String,
    /// Identifier of the task/activity on whose behalf we run
    pub task_id: Option<String>,
}

impl OperationContext {
    /// Create a new context with a specific request ID.
    pub fn new(request_id: impl Into<String>) -> Self {
        Self {
            request_id: request_id.into(),
            task_id: None,
        }
    }

    /// Create a new context with a generated request ID.
    pub fn with_generated_id() -> Self {
        Self::new(Uuid::new_v4().to_string())
    }

    /// Attach a task identifier.
    pub fn with_task(mut self, task_id: impl Into<String>) -> Self {
        self.task_id = Some(task_id.into());
        self
    }
}

impl Default for OperationContext {
    fn default() -> Self {
        Self::with_generated_id()
    }
}

/// Options controlling how a resource is read.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReadOptions {
    /// Do not contact the connector; completion is partial and never cached.
    pub no_fetch: bool,
    /// The caller promises not to mutate the returned definition.
    pub readonly: bool,
}

impl ReadOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Options for a read that must not touch the connector.
    pub fn no_fetch() -> Self {
        Self {
            no_fetch: true,
            readonly: false,
        }
    }

    pub fn with_readonly(mut self, readonly: bool) -> Self {
        self.readonly = readonly;
        self
    }

    pub fn with_no_fetch(mut self, no_fetch: bool) -> Self {
        self.no_fetch = no_fetch;
        self
    }
}

/// Source of the current time.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// Wall clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Clock frozen at a settable instant. Used by tests and benchmarks.
#[derive(Debug, Clone)]
pub struct FixedClock {
    instant: Arc<Mutex<DateTime<Utc>>>,
}

impl FixedClock {
    pub fn new(instant: DateTime<Utc>) -> Self {
        Self {
            instant: Arc::new(Mutex::new(instant)),
        }
    }

    /// Move the clock to another instant.
    pub fn set(&self, instant: DateTime<Utc>) {
        let mut guard = match self.instant.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        *guard = instant;
    }
}

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        match self.instant.lock() {
            Ok(guard) => *guard,
            Err(poisoned) => *poisoned.into_inner(),
        }
    }
}
