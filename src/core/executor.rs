//! Task execution trait and invocation contract.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::core::logs::TaskLogWriter;
use crate::core::task::TaskId;

/// Everything an executor needs to run one task.
#[derive(Debug, Clone)]
pub struct Invocation {
    /// Task being run.
    pub task_id: TaskId,
    /// Owning group.
    pub group: String,
    /// Image naming the unit of work.
    pub image: String,
    /// Opaque payload.
    pub payload: String,
    /// Group environment plus `TASK_ID` and `TASK_GROUP`.
    pub env_vars: HashMap<String, String>,
    /// Run time limit enforced by the scheduler.
    pub timeout: Duration,
    /// Sink for captured output.
    pub log: TaskLogWriter,
}

/// Result reported by an executor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExecutionResult {
    /// The unit of work exited cleanly.
    Success,
    /// The unit of work exited with a non-zero code.
    BadExit {
        /// Exit code, `-1` when the process was terminated by a signal.
        code: i32,
    },
    /// The unit of work could not be run or was torn down.
    Killed(String),
}

/// Capability that runs a task's unit of work to completion.
///
/// The scheduler wraps every call in the task's timeout and races it against
/// `cancel`. Executors should watch `cancel` and stop promptly once it fires;
/// whatever they return afterwards is ignored if the task is already terminal.
///
/// # Example
///
/// ```rust,ignore
/// use async_trait::async_trait;
/// use prometheus_group_scheduler::core::{ExecutionResult, Invocation, TaskExecutor};
/// use tokio_util::sync::CancellationToken;
///
/// #[derive(Clone)]
/// struct Echo;
///
/// #[async_trait]
/// impl TaskExecutor for Echo {
///     async fn execute(&self, inv: Invocation, _cancel: CancellationToken) -> ExecutionResult {
///         inv.log.write(&inv.payload);
///         ExecutionResult::Success
///     }
/// }
/// ```
#[async_trait]
pub trait TaskExecutor: Send + Sync + Clone + 'static {
    /// Run the invocation and report how it ended.
    async fn execute(&self, invocation: Invocation, cancel: CancellationToken) -> ExecutionResult;
}
