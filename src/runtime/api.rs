//! API-facing request/response models and handlers.
//!
//! Handlers are transport-agnostic: they take deserialised requests, call the
//! scheduler and return serialisable records. [`status_code`] maps errors onto
//! HTTP-equivalent codes for whatever transport exposes them.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::core::{
    Group, GroupConfig, ListQuery, Scheduler, SchedulerError, Spawn, Task, TaskExecutor, TaskId,
    TaskPage, TaskSpec,
};

/// Batch submission payload.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SubmitRequest {
    /// Tasks to create, validated as a whole.
    pub tasks: Vec<TaskSpec>,
}

/// Created task records, in submission order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubmitResponse {
    /// Created tasks with their ids and initial status.
    pub tasks: Vec<Task>,
}

/// Listing filter and pagination window.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ListTasksRequest {
    /// Only tasks created strictly after this instant.
    #[serde(default)]
    pub created_after: Option<DateTime<Utc>>,
    /// Cursor returned by the previous page.
    #[serde(default)]
    pub cursor: Option<String>,
    /// Page size; the configured default when absent.
    #[serde(default)]
    pub n: Option<usize>,
}

/// Captured output of a task.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskLogResponse {
    /// Task identifier.
    pub task_id: TaskId,
    /// Raw log text.
    pub log: String,
}

/// Error body returned to API clients.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorResponse {
    /// HTTP-equivalent status code.
    pub code: u16,
    /// Human-readable message.
    pub error: String,
}

/// Health response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Health {
    /// Healthy flag.
    pub ok: bool,
}

/// HTTP-equivalent status code for an error.
pub const fn status_code(err: &SchedulerError) -> u16 {
    match err {
        SchedulerError::NotFound(_) => 404,
        SchedulerError::Conflict { .. } => 409,
        SchedulerError::InvalidArgument(_) => 400,
        SchedulerError::Backend(_) => 500,
    }
}

/// Error body for an error.
pub fn error_response(err: &SchedulerError) -> ErrorResponse {
    ErrorResponse {
        code: status_code(err),
        error: err.to_string(),
    }
}

/// Create or replace a group.
pub fn upsert_group<E, S>(
    scheduler: &Scheduler<E, S>,
    name: &str,
    config: GroupConfig,
) -> Result<Group, SchedulerError>
where
    E: TaskExecutor,
    S: Spawn + Send + Sync + 'static,
{
    scheduler.upsert_group(name, config)
}

/// Fetch a group's configuration.
pub fn get_group<E, S>(scheduler: &Scheduler<E, S>, name: &str) -> Result<Group, SchedulerError>
where
    E: TaskExecutor,
    S: Spawn + Send + Sync + 'static,
{
    scheduler.group(name)
}

/// Submit a batch of tasks into a group.
pub fn submit_tasks<E, S>(
    scheduler: &Scheduler<E, S>,
    group: &str,
    req: SubmitRequest,
) -> Result<SubmitResponse, SchedulerError>
where
    E: TaskExecutor,
    S: Spawn + Send + Sync + 'static,
{
    let tasks = scheduler.submit(group, req.tasks)?;
    Ok(SubmitResponse { tasks })
}

/// Fetch one task.
pub fn get_task<E, S>(
    scheduler: &Scheduler<E, S>,
    group: &str,
    id: &str,
) -> Result<Task, SchedulerError>
where
    E: TaskExecutor,
    S: Spawn + Send + Sync + 'static,
{
    scheduler.task(group, &TaskId::from(id))
}

/// List a group's tasks, newest first.
pub fn list_tasks<E, S>(
    scheduler: &Scheduler<E, S>,
    group: &str,
    req: ListTasksRequest,
) -> Result<TaskPage, SchedulerError>
where
    E: TaskExecutor,
    S: Spawn + Send + Sync + 'static,
{
    scheduler.list_tasks(
        group,
        ListQuery {
            created_after: req.created_after,
            cursor: req.cursor,
            n: req.n.unwrap_or(0),
        },
    )
}

/// Fetch a task's captured output.
pub fn get_task_log<E, S>(
    scheduler: &Scheduler<E, S>,
    group: &str,
    id: &str,
) -> Result<TaskLogResponse, SchedulerError>
where
    E: TaskExecutor,
    S: Spawn + Send + Sync + 'static,
{
    let task_id = TaskId::from(id);
    let log = scheduler.task_log(group, &task_id)?;
    Ok(TaskLogResponse { task_id, log })
}

/// Cancel a task.
pub fn cancel_task<E, S>(
    scheduler: &Scheduler<E, S>,
    group: &str,
    id: &str,
) -> Result<Task, SchedulerError>
where
    E: TaskExecutor,
    S: Spawn + Send + Sync + 'static,
{
    scheduler.cancel(group, &TaskId::from(id))
}

/// Return a health payload.
pub const fn health() -> Health {
    Health { ok: true }
}
