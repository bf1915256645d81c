//! Resource lifecycle management for tool loading.
//!
//! A `ResourceStack` collects teardown actions for every external handle
//! opened while tools are loaded (child processes, HTTP sessions) and runs
//! them in reverse registration order exactly once, either on `close()` or
//! when the stack is dropped.

use std::fmt;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;

use thiserror::Error;

use crate::error::Result;

/// A resource with an explicit exit step, registered via `ResourceStack::enter`.
pub trait Scoped: Send + Sync {
    /// Label used in logs and teardown failure reports
    fn scope_label(&self) -> String;

    /// Release the resource. Called exactly once by the owning stack.
    fn exit(&self) -> Result<()>;
}

/// A single failed teardown action.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TeardownFailure {
    pub label: String,
    pub message: String,
}

impl fmt::Display for TeardownFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.label, self.message)
    }
}

/// Aggregate of every teardown failure from one `close()`.
#[derive(Debug, Clone, Error)]
#[error("{} teardown action(s) failed: {}", .failures.len(), join_failures(.failures))]
pub struct TeardownError {
    pub failures: Vec<TeardownFailure>,
}

fn join_failures(failures: &[TeardownFailure]) -> String {
    failures
        .iter()
        .map(|f| f.to_string())
        .collect::<Vec<_>>()
        .join("; ")
}

type TeardownAction = Box<dyn FnOnce() -> Result<()> + Send>;

struct Entry {
    label: String,
    action: TeardownAction,
}

/// Stack of teardown actions with guaranteed reverse-order release.
#[derive(Default)]
pub struct ResourceStack {
    entries: Vec<Entry>,
}

impl fmt::Debug for ResourceStack {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResourceStack")
            .field("labels", &self.labels())
            .finish()
    }
}

impl ResourceStack {
    /// Create an empty stack
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a zero-argument teardown action.
    pub fn callback<F>(&mut self, label: impl Into<String>, action: F)
    where
        F: FnOnce() -> Result<()> + Send + 'static,
    {
        let label = label.into();
        log::debug!("Registered teardown action '{}'", label);
        self.entries.push(Entry {
            label,
            action: Box::new(action),
        });
    }

    /// Register a scoped resource; its `exit` runs at teardown.
    ///
    /// Returns the same handle so callers can keep using the resource.
    pub fn enter<R: Scoped + 'static>(&mut self, resource: Arc<R>) -> Arc<R> {
        let label = resource.scope_label();
        let held = Arc::clone(&resource);
        self.callback(label, move || held.exit());
        resource
    }

    /// Number of pending teardown actions
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether no teardown actions are pending
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Labels of pending actions, in registration order
    pub fn labels(&self) -> Vec<&str> {
        self.entries.iter().map(|e| e.label.as_str()).collect()
    }

    /// Run every pending action and report all failures at once.
    pub fn close(mut self) -> std::result::Result<(), TeardownError> {
        let failures = self.unwind();
        if failures.is_empty() {
            Ok(())
        } else {
            Err(TeardownError { failures })
        }
    }

    fn unwind(&mut self) -> Vec<TeardownFailure> {
        let mut failures = Vec::new();
        while let Some(Entry { label, action }) = self.entries.pop() {
            log::debug!("Running teardown action '{}'", label);
            match catch_unwind(AssertUnwindSafe(action)) {
                Ok(Ok(())) => {}
                Ok(Err(e)) => failures.push(TeardownFailure {
                    label,
                    message: e.to_string(),
                }),
                Err(panic) => failures.push(TeardownFailure {
                    label,
                    message: format!("panicked: {}", panic_message(panic.as_ref())),
                }),
            }
        }
        failures
    }
}

impl Drop for ResourceStack {
    fn drop(&mut self) {
        if self.entries.is_empty() {
            return;
        }
        for failure in self.unwind() {
            log::error!("Teardown failed during drop: {}", failure);
        }
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
