//! Runtime adapters and API surface.

pub mod api;
pub mod tokio_spawner;

pub use api::{
    cancel_task, error_response, get_group, get_task, get_task_log, health, list_tasks,
    status_code, submit_tasks, upsert_group, ErrorResponse, Health, ListTasksRequest, SubmitRequest,
    SubmitResponse, TaskLogResponse,
};
pub use tokio_spawner::TokioSpawner;
