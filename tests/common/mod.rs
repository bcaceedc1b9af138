//! Shared fixtures for scheduler integration tests.

#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;

use prometheus_group_scheduler::builders::SchedulerBuilder;
use prometheus_group_scheduler::config::SchedulerConfig;
use prometheus_group_scheduler::core::{
    ExecutionResult, InMemoryAuditSink, Invocation, Scheduler, Task, TaskExecutor, TaskId,
};
use prometheus_group_scheduler::runtime::TokioSpawner;

/// Executor whose behaviour is picked by the task image:
///
/// - `hello`: logs `hello world`
/// - `echo`: logs the payload
/// - `env`: logs `TASK_ID`, `TASK_GROUP` and `GREETING`
/// - `fail`: exits with code 1
/// - `sleeper`: sleeps for `payload` seconds, stopping early on cancel
/// - `worker`: sleeps one second while tracking concurrency and start order
#[derive(Clone, Default)]
pub struct TestExecutor {
    active: Arc<AtomicUsize>,
    max_active: Arc<AtomicUsize>,
    started: Arc<Mutex<Vec<TaskId>>>,
}

impl TestExecutor {
    /// Highest number of `worker` tasks observed running at once.
    pub fn max_active(&self) -> usize {
        self.max_active.load(Ordering::SeqCst)
    }

    /// Task ids in the order their unit of work began.
    pub fn started(&self) -> Vec<TaskId> {
        self.started.lock().clone()
    }
}

#[async_trait]
impl TaskExecutor for TestExecutor {
    async fn execute(&self, inv: Invocation, cancel: CancellationToken) -> ExecutionResult {
        self.started.lock().push(inv.task_id.clone());
        match inv.image.as_str() {
            "hello" => {
                inv.log.write_line("hello world");
                ExecutionResult::Success
            }
            "echo" => {
                inv.log.write(&inv.payload);
                ExecutionResult::Success
            }
            "env" => {
                for key in ["TASK_ID", "TASK_GROUP", "GREETING"] {
                    let value = inv.env_vars.get(key).cloned().unwrap_or_default();
                    inv.log.write_line(&format!("{key}={value}"));
                }
                ExecutionResult::Success
            }
            "fail" => {
                inv.log.write_line("boom");
                ExecutionResult::BadExit { code: 1 }
            }
            "sleeper" => {
                let secs: u64 = inv.payload.trim().parse().unwrap_or(1);
                tokio::select! {
                    () = tokio::time::sleep(Duration::from_secs(secs)) => {
                        inv.log.write_line("woke up");
                        ExecutionResult::Success
                    }
                    () = cancel.cancelled() => ExecutionResult::Killed("cancelled".into()),
                }
            }
            "worker" => {
                let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
                self.max_active.fetch_max(now, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_secs(1)).await;
                self.active.fetch_sub(1, Ordering::SeqCst);
                ExecutionResult::Success
            }
            other => ExecutionResult::Killed(format!("unknown image {other}")),
        }
    }
}

/// Running scheduler plus the handles tests inspect.
pub struct Harness {
    pub scheduler: Scheduler<TestExecutor, TokioSpawner>,
    pub executor: TestExecutor,
    pub audit: InMemoryAuditSink,
}

impl Drop for Harness {
    fn drop(&mut self) {
        self.scheduler.shutdown();
    }
}

/// Build and start a scheduler with in-memory backends.
pub fn start() -> Harness {
    start_with(SchedulerConfig::default())
}

/// Build and start a scheduler from the given configuration.
pub fn start_with(config: SchedulerConfig) -> Harness {
    let executor = TestExecutor::default();
    let audit = InMemoryAuditSink::new(10_000);
    let scheduler = SchedulerBuilder::new(config, executor.clone(), TokioSpawner::current())
        .with_audit(Arc::new(audit.clone()))
        .build()
        .expect("scheduler builds");
    scheduler.start();
    Harness {
        scheduler,
        executor,
        audit,
    }
}

/// Poll until the task reaches a terminal status.
pub async fn wait_for_completion(
    scheduler: &Scheduler<TestExecutor, TokioSpawner>,
    group: &str,
    id: &TaskId,
) -> Task {
    for _ in 0..10_000 {
        let task = scheduler.task(group, id).expect("task exists");
        if task.status.is_terminal() {
            return task;
        }
        tokio::time::sleep(Duration::from_millis(100)).await;
    }
    panic!("task {id} did not finish");
}

/// Poll until the task has started running.
pub async fn wait_for_running(
    scheduler: &Scheduler<TestExecutor, TokioSpawner>,
    group: &str,
    id: &TaskId,
) -> Task {
    for _ in 0..10_000 {
        let task = scheduler.task(group, id).expect("task exists");
        if task.started_at.is_some() {
            return task;
        }
        tokio::time::sleep(Duration::from_millis(100)).await;
    }
    panic!("task {id} never started");
}

/// Follow `retry_at` links from `id` until the chain ends, waiting for each
/// link to finish.
pub async fn wait_for_chain(
    scheduler: &Scheduler<TestExecutor, TokioSpawner>,
    group: &str,
    id: &TaskId,
) -> Vec<Task> {
    let mut chain = Vec::new();
    let mut next = Some(id.clone());
    while let Some(id) = next {
        let mut task = wait_for_completion(scheduler, group, &id).await;
        // The successor link is written right after the failure is recorded.
        if task.max_retries > 0 && task.retry_at.is_none() {
            tokio::time::sleep(Duration::from_millis(100)).await;
            task = scheduler.task(group, &id).expect("task exists");
        }
        next = task.retry_at.clone();
        chain.push(task);
    }
    chain
}
