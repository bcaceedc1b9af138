//! Error types for scheduler operations.

use thiserror::Error;

use crate::core::task::{TaskId, TaskStatus};

/// Errors produced by scheduler components.
#[derive(Debug, Error)]
pub enum SchedulerError {
    /// Unknown group, task, or a log that was never produced.
    #[error("not found: {0}")]
    NotFound(String),
    /// Operation violates the task state machine.
    #[error("conflict: task {id} is {status}")]
    Conflict {
        /// Task the operation targeted.
        id: TaskId,
        /// Status the task holds, left untouched by the rejected operation.
        status: TaskStatus,
    },
    /// Request rejected before any state was changed.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
    /// Backend-specific failure with context.
    #[error("backend error: {0}")]
    Backend(String),
}

impl SchedulerError {
    /// Shorthand for a missing task within a group.
    pub fn task_not_found(group: &str, id: &TaskId) -> Self {
        Self::NotFound(format!("task {id} in group {group}"))
    }

    /// Returns true for state machine violations.
    pub const fn is_conflict(&self) -> bool {
        matches!(self, Self::Conflict { .. })
    }
}

impl From<std::io::Error> for SchedulerError {
    fn from(err: std::io::Error) -> Self {
        Self::Backend(err.to_string())
    }
}

impl From<serde_json::Error> for SchedulerError {
    fn from(err: serde_json::Error) -> Self {
        Self::Backend(err.to_string())
    }
}

/// Application-facing result using anyhow for higher-level contexts.
pub type AppResult<T> = Result<T, anyhow::Error>;
