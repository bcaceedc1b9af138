//! Tests for the tokio spawner and API handlers

use async_trait::async_trait;
use prometheus_group_scheduler::builders::SchedulerBuilder;
use prometheus_group_scheduler::config::SchedulerConfig;
use prometheus_group_scheduler::core::{
    ExecutionResult, GroupConfig, Invocation, Scheduler, SchedulerError, Spawn, TaskExecutor,
    TaskId, TaskSpec, TaskStatus,
};
use prometheus_group_scheduler::runtime::api::{self, ListTasksRequest, SubmitRequest};
use prometheus_group_scheduler::runtime::tokio_spawner::TokioSpawner;
use tokio_util::sync::CancellationToken;

#[derive(Clone)]
struct NoopExecutor;

#[async_trait]
impl TaskExecutor for NoopExecutor {
    async fn execute(&self, _invocation: Invocation, _cancel: CancellationToken) -> ExecutionResult {
        ExecutionResult::Success
    }
}

fn scheduler() -> Scheduler<NoopExecutor, TokioSpawner> {
    SchedulerBuilder::new(SchedulerConfig::default(), NoopExecutor, TokioSpawner::current())
        .build()
        .unwrap()
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_tokio_spawner_spawn() {
    let spawner = TokioSpawner::new(tokio::runtime::Handle::current());

    let (tx, rx) = tokio::sync::oneshot::channel();
    spawner.spawn(async move {
        tx.send(123).unwrap();
    });

    let result = rx.await.expect("oneshot result");
    assert_eq!(result, 123);
}

#[test]
fn test_status_codes() {
    let conflict = SchedulerError::Conflict {
        id: TaskId::from("t"),
        status: TaskStatus::Success,
    };
    assert_eq!(api::status_code(&SchedulerError::NotFound("x".into())), 404);
    assert_eq!(api::status_code(&conflict), 409);
    assert_eq!(api::status_code(&SchedulerError::InvalidArgument("x".into())), 400);
    assert_eq!(api::status_code(&SchedulerError::Backend("x".into())), 500);

    let body = api::error_response(&conflict);
    assert_eq!(body.code, 409);
    assert_eq!(body.error, "conflict: task t is success");
}

#[tokio::test]
async fn test_handlers_round_trip_through_scheduler() {
    let scheduler = scheduler();
    let group = api::upsert_group(
        &scheduler,
        "api",
        GroupConfig {
            image: Some("noop".into()),
            ..GroupConfig::default()
        },
    )
    .unwrap();
    assert_eq!(api::get_group(&scheduler, "api").unwrap(), group);

    let request: SubmitRequest =
        serde_json::from_str(r#"{ "tasks": [ { "priority": 2, "delay": 60 }, {} ] }"#).unwrap();
    let created = api::submit_tasks(&scheduler, "api", request).unwrap();
    assert_eq!(created.tasks.len(), 2);
    assert_eq!(created.tasks[0].status, TaskStatus::Delayed);

    let id = created.tasks[0].id.to_string();
    assert_eq!(api::get_task(&scheduler, "api", &id).unwrap().id.as_str(), id);

    let page = api::list_tasks(&scheduler, "api", ListTasksRequest::default()).unwrap();
    assert_eq!(page.tasks.len(), 2);

    let cancelled = api::cancel_task(&scheduler, "api", &id).unwrap();
    assert_eq!(cancelled.status, TaskStatus::Cancelled);
    let err = api::cancel_task(&scheduler, "api", &id).unwrap_err();
    assert_eq!(api::status_code(&err), 409);

    let err = api::get_task_log(&scheduler, "api", &id).unwrap_err();
    assert_eq!(api::status_code(&err), 404);
}

#[tokio::test]
async fn test_submit_rejects_out_of_range_priority() {
    let parsed = serde_json::from_str::<SubmitRequest>(r#"{ "tasks": [ { "priority": 3 } ] }"#);
    assert!(parsed.is_err());

    let scheduler = scheduler();
    let err = api::submit_tasks(
        &scheduler,
        "api",
        SubmitRequest {
            tasks: vec![TaskSpec::new("noop").with_timeout(100_000)],
        },
    )
    .unwrap_err();
    assert_eq!(api::status_code(&err), 400);
}

#[test]
fn test_health() {
    assert!(api::health().ok);
    assert_eq!(serde_json::to_string(&api::health()).unwrap(), r#"{"ok":true}"#);
}
