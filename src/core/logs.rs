//! Task log storage abstraction.

use std::sync::Arc;

use crate::core::task::TaskId;
use crate::core::SchedulerError;

/// Append-only storage for output captured while tasks run.
pub trait LogStore: Send + Sync {
    /// Create an empty log for a task that has just started.
    fn open(&self, group: &str, id: &TaskId) -> Result<(), SchedulerError>;

    /// Append a chunk of output.
    fn append(&self, group: &str, id: &TaskId, chunk: &str) -> Result<(), SchedulerError>;

    /// Full captured output. `NotFound` if the task never started.
    fn read(&self, group: &str, id: &TaskId) -> Result<String, SchedulerError>;
}

/// Handle given to executors for writing a single task's log.
#[derive(Clone)]
pub struct TaskLogWriter {
    store: Arc<dyn LogStore>,
    group: String,
    id: TaskId,
}

impl TaskLogWriter {
    /// Bind a writer to one task.
    pub fn new(store: Arc<dyn LogStore>, group: impl Into<String>, id: TaskId) -> Self {
        Self {
            store,
            group: group.into(),
            id,
        }
    }

    /// Append output. Failures are logged and swallowed so that a broken log
    /// backend never fails the task itself.
    pub fn write(&self, chunk: &str) {
        if let Err(e) = self.store.append(&self.group, &self.id, chunk) {
            tracing::warn!("failed to append log for task {}: {}", self.id, e);
        }
    }

    /// Append output followed by a newline.
    pub fn write_line(&self, line: &str) {
        self.write(&format!("{line}\n"));
    }
}

impl std::fmt::Debug for TaskLogWriter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskLogWriter")
            .field("group", &self.group)
            .field("id", &self.id)
            .finish_non_exhaustive()
    }
}
