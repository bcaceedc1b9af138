//! Group-scoped scheduler: admission loop, dispatch, completion, retries and
//! cancellation.
//!
//! The scheduler loop wakes on submissions, freed slots, cancellations and
//! delay expiry. Each pass visits every group independently:
//!
//! 1. promote delayed tasks whose delay has elapsed,
//! 2. while the group has a free concurrency slot (CAS on the running count),
//!    take the highest-priority, oldest queued task and move it to `running`
//!    (CAS on the task status),
//! 3. dispatch it to the executor under its timeout and a cancellation token.
//!
//! Completion re-checks the stored status through the same CAS, so late
//! results for tasks that were cancelled meanwhile are dropped silently.

use std::collections::HashMap;
use std::any::Any;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use futures::FutureExt;
use parking_lot::Mutex;
use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;

use crate::core::audit::{build_audit_event, AuditAction, AuditSink};
use crate::core::executor::{ExecutionResult, Invocation, TaskExecutor};
use crate::core::group::{validate_group_name, Group, GroupConfig, GroupRegistry};
use crate::core::logs::{LogStore, TaskLogWriter};
use crate::core::store::{ListQuery, TaskPage, TaskStore};
use crate::core::task::{
    Outcome, Reason, Task, TaskId, TaskSpec, TaskStatus, Transition, DEFAULT_TIMEOUT_SECS,
};
use crate::core::SchedulerError;
use crate::util::clock::Clock;

/// Abstraction for spawning task execution on a runtime.
pub trait Spawn {
    /// Spawn an async task that returns a future.
    fn spawn<F>(&self, fut: F)
    where
        F: Future<Output = ()> + Send + 'static;
}

/// Limits and defaults enforced by the scheduler.
#[derive(Debug, Clone)]
pub struct SchedulerLimits {
    /// Longest the loop sleeps without a wake event.
    pub poll_interval: Duration,
    /// Timeout for tasks that do not set one (seconds).
    pub default_timeout_secs: u64,
    /// Largest accepted timeout (seconds).
    pub max_timeout_secs: u64,
    /// Largest accepted delay or retry delay (seconds).
    pub max_delay_secs: u64,
    /// Largest accepted retry budget.
    pub max_retries: u32,
    /// Page size used when a listing does not ask for one.
    pub default_page_size: usize,
    /// Upper bound on listing page size.
    pub max_page_size: usize,
}

impl Default for SchedulerLimits {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(1),
            default_timeout_secs: DEFAULT_TIMEOUT_SECS,
            max_timeout_secs: 86_400,
            max_delay_secs: 604_800,
            max_retries: 25,
            default_page_size: 30,
            max_page_size: 100,
        }
    }
}

/// Components a scheduler is assembled from.
pub struct SchedulerParts<E, S> {
    /// Limits and defaults.
    pub limits: SchedulerLimits,
    /// Task and group persistence.
    pub store: Arc<dyn TaskStore>,
    /// Captured task output.
    pub logs: Arc<dyn LogStore>,
    /// Runs units of work.
    pub executor: E,
    /// Runtime used for the loop and task execution.
    pub spawner: S,
    /// Time source for timestamps and delays.
    pub clock: Arc<dyn Clock>,
    /// Optional lifecycle audit trail.
    pub audit: Option<Arc<dyn AuditSink>>,
}

/// How a dispatched run ended, before it is mapped onto the task record.
enum RunOutcome {
    Finished(ExecutionResult),
    TimedOut,
    Interrupted,
    Panicked,
}

struct Shared<E, S> {
    limits: SchedulerLimits,
    store: Arc<dyn TaskStore>,
    logs: Arc<dyn LogStore>,
    groups: GroupRegistry,
    executor: E,
    spawner: S,
    clock: Arc<dyn Clock>,
    audit: Option<Arc<dyn AuditSink>>,
    /// Cancellation tokens of dispatched tasks.
    in_flight: Mutex<HashMap<TaskId, CancellationToken>>,
    wake: Notify,
    shutdown: CancellationToken,
    started: AtomicBool,
}

/// Group-scoped task scheduler. Cheap to clone; clones share state.
pub struct Scheduler<E, S> {
    shared: Arc<Shared<E, S>>,
}

impl<E, S> Clone for Scheduler<E, S> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<E, S> Scheduler<E, S>
where
    E: TaskExecutor,
    S: Spawn + Send + Sync + 'static,
{
    /// Assemble a scheduler, loading persisted groups into the registry.
    /// The loop does not run until [`Scheduler::start`] is called.
    pub fn from_parts(parts: SchedulerParts<E, S>) -> Result<Self, SchedulerError> {
        let groups = GroupRegistry::new();
        for group in parts.store.load_groups()? {
            groups.upsert(&group.name, group.config);
        }
        for name in parts.store.groups() {
            groups.ensure(&name);
        }

        Ok(Self {
            shared: Arc::new(Shared {
                limits: parts.limits,
                store: parts.store,
                logs: parts.logs,
                groups,
                executor: parts.executor,
                spawner: parts.spawner,
                clock: parts.clock,
                audit: parts.audit,
                in_flight: Mutex::new(HashMap::new()),
                wake: Notify::new(),
                shutdown: CancellationToken::new(),
                started: AtomicBool::new(false),
            }),
        })
    }

    /// Spawn the scheduling loop. Calling it again is a no-op.
    pub fn start(&self) {
        if self.shared.started.swap(true, Ordering::AcqRel) {
            tracing::warn!("scheduler already started");
            return;
        }
        let shared = Arc::clone(&self.shared);
        self.shared.spawner.spawn(shared.run_loop());
    }

    /// Stop the loop and signal every running task to stop. Tasks torn down
    /// this way end as `error` with reason `killed`.
    pub fn shutdown(&self) {
        tracing::info!("scheduler shutting down");
        self.shared.shutdown.cancel();
    }

    /// Create or replace a group's configuration.
    pub fn upsert_group(&self, name: &str, config: GroupConfig) -> Result<Group, SchedulerError> {
        validate_group_name(name)?;
        config.validate().map_err(SchedulerError::InvalidArgument)?;
        let group = self.shared.groups.upsert(name, config);
        self.shared.store.save_group(&group)?;
        tracing::info!(
            "group {} configured (max_concurrency {:?})",
            name,
            group.config.max_concurrency
        );
        // A raised ceiling may admit waiting tasks.
        self.shared.wake.notify_one();
        Ok(group)
    }

    /// Look up a group's configuration.
    pub fn group(&self, name: &str) -> Result<Group, SchedulerError> {
        self.shared.groups.get(name)
    }

    /// Submit tasks into a group, creating the group on first use. The batch
    /// is validated as a whole before anything is stored.
    pub fn submit(&self, group: &str, specs: Vec<TaskSpec>) -> Result<Vec<Task>, SchedulerError> {
        validate_group_name(group)?;
        if specs.is_empty() {
            return Err(SchedulerError::InvalidArgument("no tasks submitted".into()));
        }

        let config = self
            .shared
            .groups
            .get(group)
            .map(|g| g.config)
            .unwrap_or_default();
        let now = self.shared.clock.now();
        let tasks = specs
            .iter()
            .map(|spec| self.shared.build_task(group, &config, spec, now))
            .collect::<Result<Vec<_>, _>>()?;

        let (created_group, created) = self.shared.groups.ensure(group);
        if created {
            self.shared.store.save_group(&created_group)?;
            tracing::info!("group {} created on first submission", group);
        }

        for task in &tasks {
            self.shared.store.insert(task.clone())?;
            self.shared
                .audit(group, &task.id, AuditAction::Submit, None);
            tracing::debug!(
                "task {} stored in group {} as {}",
                task.id,
                group,
                task.status
            );
        }
        tracing::info!("{} task(s) submitted to group {}", tasks.len(), group);

        self.shared.wake.notify_one();
        Ok(tasks)
    }

    /// Fetch a task by id within its group.
    pub fn task(&self, group: &str, id: &TaskId) -> Result<Task, SchedulerError> {
        self.shared.store.get(group, id)
    }

    /// List a group's tasks, newest first. `query.n == 0` selects the default
    /// page size; larger requests are clamped to the maximum.
    pub fn list_tasks(&self, group: &str, mut query: ListQuery) -> Result<TaskPage, SchedulerError> {
        self.shared.groups.get(group)?;
        let limits = &self.shared.limits;
        query.n = match query.n {
            0 => limits.default_page_size,
            n => n.min(limits.max_page_size),
        };
        match self.shared.store.list(group, &query) {
            // Known group without any task yet.
            Err(SchedulerError::NotFound(_)) => Ok(TaskPage {
                tasks: Vec::new(),
                cursor: None,
            }),
            other => other,
        }
    }

    /// Output captured for a task. `NotFound` if it never started.
    pub fn task_log(&self, group: &str, id: &TaskId) -> Result<String, SchedulerError> {
        self.shared.store.get(group, id)?;
        self.shared.logs.read(group, id)
    }

    /// Cancel a task. Pending tasks never run; running tasks are marked
    /// cancelled immediately and their executor is signalled to stop.
    pub fn cancel(&self, group: &str, id: &TaskId) -> Result<Task, SchedulerError> {
        let now = self.shared.clock.now();
        let task = self
            .shared
            .store
            .update(group, id, &Transition::Cancel { at: now })?;

        if let Some(token) = self.shared.in_flight.lock().get(id) {
            token.cancel();
            tracing::debug!("signalled running task {} to stop", id);
        }
        self.shared.audit(group, id, AuditAction::Cancel, None);
        tracing::info!("task {} cancelled in group {}", id, group);

        self.shared.wake.notify_one();
        Ok(task)
    }

    /// Live number of running tasks in a group.
    pub fn running_count(&self, group: &str) -> u32 {
        self.shared.groups.running(group)
    }

    /// Fail tasks left `running` by a previous process and retry them per
    /// their policy. Returns how many were recovered.
    pub fn recover(&self) -> Result<usize, SchedulerError> {
        let mut orphans = self.shared.store.running()?;
        orphans.retain(|task| !self.shared.in_flight.lock().contains_key(&task.id));
        for task in &orphans {
            tracing::warn!(
                "task {} in group {} was running when the scheduler stopped",
                task.id,
                task.group_name
            );
            self.shared
                .audit(&task.group_name, &task.id, AuditAction::Recover, None);
            self.shared.complete(task, Outcome::Error(Reason::Killed));
        }
        Ok(orphans.len())
    }

    /// Run one admission pass over every group. Returns the earliest instant a
    /// delayed task becomes eligible, if any.
    pub fn schedule_pass(&self) -> Option<DateTime<Utc>> {
        self.shared.schedule_pass()
    }
}

impl<E, S> Shared<E, S>
where
    E: TaskExecutor,
    S: Spawn + Send + Sync + 'static,
{
    async fn run_loop(self: Arc<Self>) {
        tracing::info!("scheduler loop started");
        loop {
            let next_due = self.schedule_pass();
            let mut wait = self.limits.poll_interval;
            if let Some(due) = next_due {
                let until = (due - self.clock.now()).to_std().unwrap_or(Duration::ZERO);
                wait = wait.min(until);
            }
            tokio::select! {
                () = self.shutdown.cancelled() => break,
                () = self.wake.notified() => {}
                () = tokio::time::sleep(wait) => {}
            }
        }
        tracing::info!("scheduler loop stopped");
    }

    fn schedule_pass(self: &Arc<Self>) -> Option<DateTime<Utc>> {
        let now = self.clock.now();
        let mut next_due: Option<DateTime<Utc>> = None;
        for group in self.store.groups() {
            match self.store.promote_due(&group, now) {
                Ok(promoted) => {
                    for id in promoted {
                        tracing::debug!("task {} in group {} is now queued", id, group);
                        self.audit(&group, &id, AuditAction::Promote, None);
                    }
                }
                Err(e) => {
                    tracing::error!("failed to promote delayed tasks in group {}: {}", group, e);
                }
            }
            self.admit_group(&group);
            if let Some(due) = self.store.next_due(&group) {
                next_due = Some(next_due.map_or(due, |d| d.min(due)));
            }
        }
        next_due
    }

    /// Admit queued tasks while the group has free slots.
    fn admit_group(self: &Arc<Self>, group: &str) {
        while !self.shutdown.is_cancelled() {
            if !self.groups.increment_running(group) {
                tracing::trace!("group {} at its concurrency ceiling", group);
                return;
            }
            let candidate = match self.store.peek_ready(group) {
                Ok(Some(task)) => task,
                Ok(None) => {
                    self.groups.decrement_running(group);
                    return;
                }
                Err(e) => {
                    tracing::error!("failed to read ready queue of group {}: {}", group, e);
                    self.groups.decrement_running(group);
                    return;
                }
            };

            let now = self.clock.now();
            match self
                .store
                .update(group, &candidate.id, &Transition::Admit { at: now })
            {
                Ok(task) => self.dispatch(task),
                Err(e) if e.is_conflict() => {
                    tracing::debug!("task {} changed before admission: {}", candidate.id, e);
                    self.groups.decrement_running(group);
                }
                Err(e) => {
                    tracing::error!("failed to admit task {}: {}", candidate.id, e);
                    self.groups.decrement_running(group);
                    return;
                }
            }
        }
    }

    /// Hand an admitted task to the executor.
    fn dispatch(self: &Arc<Self>, task: Task) {
        let token = self.shutdown.child_token();
        self.in_flight
            .lock()
            .insert(task.id.clone(), token.clone());
        // A cancel may have landed between admission and token registration.
        if matches!(
            self.store.get(&task.group_name, &task.id),
            Ok(current) if current.status == TaskStatus::Cancelled
        ) {
            token.cancel();
        }

        if let Err(e) = self.logs.open(&task.group_name, &task.id) {
            tracing::warn!("failed to open log for task {}: {}", task.id, e);
        }

        let mut env_vars = self
            .groups
            .get(&task.group_name)
            .map(|g| g.config.env_vars)
            .unwrap_or_default();
        env_vars.insert("TASK_ID".into(), task.id.to_string());
        env_vars.insert("TASK_GROUP".into(), task.group_name.clone());

        let invocation = Invocation {
            task_id: task.id.clone(),
            group: task.group_name.clone(),
            image: task.image.clone(),
            payload: task.payload.clone(),
            env_vars,
            timeout: Duration::from_secs(task.timeout),
            log: TaskLogWriter::new(Arc::clone(&self.logs), task.group_name.clone(), task.id.clone()),
        };

        self.audit(&task.group_name, &task.id, AuditAction::Admit, None);
        tracing::info!(
            "task {} admitted in group {} (priority {}, running {})",
            task.id,
            task.group_name,
            u8::from(task.priority),
            self.groups.running(&task.group_name)
        );

        let shared = Arc::clone(self);
        self.spawner.spawn(async move {
            let outcome = shared.run(invocation, token).await;
            shared.on_task_finished(&task, outcome);
        });
    }

    async fn run(&self, invocation: Invocation, token: CancellationToken) -> RunOutcome {
        let timeout = invocation.timeout;
        let task_id = invocation.task_id.clone();
        tracing::debug!("executing task {}", task_id);

        let execution =
            AssertUnwindSafe(self.executor.execute(invocation, token.clone())).catch_unwind();
        tokio::select! {
            biased;
            () = token.cancelled() => RunOutcome::Interrupted,
            result = tokio::time::timeout(timeout, execution) => {
                match result {
                    Ok(Ok(result)) => RunOutcome::Finished(result),
                    Ok(Err(panic)) => {
                        token.cancel();
                        tracing::error!(
                            "executor panicked on task {}: {}",
                            task_id,
                            panic_message(panic.as_ref())
                        );
                        RunOutcome::Panicked
                    }
                    Err(_) => {
                        token.cancel();
                        tracing::warn!("task {} timed out after {:?}", task_id, timeout);
                        RunOutcome::TimedOut
                    }
                }
            }
        }
    }

    fn on_task_finished(&self, task: &Task, outcome: RunOutcome) {
        self.in_flight.lock().remove(&task.id);

        let outcome = match outcome {
            RunOutcome::Finished(ExecutionResult::Success) => Outcome::Success,
            RunOutcome::Finished(ExecutionResult::BadExit { code }) => {
                tracing::debug!("task {} exited with code {}", task.id, code);
                Outcome::Error(Reason::BadExit)
            }
            RunOutcome::Finished(ExecutionResult::Killed(why)) => {
                tracing::warn!("task {} was killed: {}", task.id, why);
                Outcome::Error(Reason::Killed)
            }
            RunOutcome::TimedOut => Outcome::Error(Reason::Timeout),
            RunOutcome::Interrupted | RunOutcome::Panicked => Outcome::Error(Reason::Killed),
        };
        self.complete(task, outcome);

        // Release only after the status left `running`.
        self.groups.decrement_running(&task.group_name);
        self.wake.notify_one();
    }

    /// Record a terminal outcome unless the task already reached one.
    fn complete(&self, task: &Task, outcome: Outcome) {
        let transition = Transition::Complete {
            outcome,
            at: self.clock.now(),
        };
        match self.store.update(&task.group_name, &task.id, &transition) {
            Ok(done) => {
                tracing::info!("task {} finished as {}", done.id, done.status);
                self.audit(
                    &done.group_name,
                    &done.id,
                    AuditAction::Complete,
                    done.reason.map(|r| format!("{r:?}")),
                );
                if done.status == TaskStatus::Error {
                    self.schedule_retry(&done);
                }
            }
            Err(e) if e.is_conflict() => {
                tracing::debug!("dropping late completion for task {}: {}", task.id, e);
            }
            Err(e) => {
                tracing::error!("failed to record completion of task {}: {}", task.id, e);
            }
        }
    }

    /// Spawn the successor of a failed task if it has retries left.
    fn schedule_retry(&self, failed: &Task) {
        if failed.max_retries == 0 || failed.retry_at.is_some() {
            return;
        }
        let successor = failed.retry_successor(self.clock.now());
        let successor_id = match self.store.insert(successor) {
            Ok(id) => id,
            Err(e) => {
                tracing::error!("failed to store retry of task {}: {}", failed.id, e);
                return;
            }
        };
        let link = Transition::LinkRetry {
            successor: successor_id.clone(),
        };
        match self.store.update(&failed.group_name, &failed.id, &link) {
            Ok(_) => {
                self.audit(
                    &failed.group_name,
                    &failed.id,
                    AuditAction::Retry,
                    Some(successor_id.to_string()),
                );
                tracing::info!(
                    "task {} will retry as {} in {}s ({} retries left)",
                    failed.id,
                    successor_id,
                    failed.retries_delay,
                    failed.max_retries - 1
                );
            }
            Err(e) => {
                tracing::error!("failed to link retry of task {}: {}", failed.id, e);
            }
        }
    }

    fn build_task(
        &self,
        group: &str,
        config: &GroupConfig,
        spec: &TaskSpec,
        now: DateTime<Utc>,
    ) -> Result<Task, SchedulerError> {
        let limits = &self.limits;
        let image = spec
            .image
            .clone()
            .or_else(|| config.image.clone())
            .filter(|image| !image.is_empty())
            .ok_or_else(|| {
                SchedulerError::InvalidArgument(format!(
                    "task has no image and group {group} has no default"
                ))
            })?;

        let timeout = spec.timeout.unwrap_or(limits.default_timeout_secs);
        if timeout == 0 || timeout > limits.max_timeout_secs {
            return Err(SchedulerError::InvalidArgument(format!(
                "timeout must be between 1 and {} seconds",
                limits.max_timeout_secs
            )));
        }
        let delay = spec.delay.unwrap_or(0);
        let retries_delay = spec.retries_delay.unwrap_or(0);
        if delay > limits.max_delay_secs || retries_delay > limits.max_delay_secs {
            return Err(SchedulerError::InvalidArgument(format!(
                "delays must not exceed {} seconds",
                limits.max_delay_secs
            )));
        }
        let max_retries = spec.max_retries.unwrap_or(0);
        if max_retries > limits.max_retries {
            return Err(SchedulerError::InvalidArgument(format!(
                "max_retries must not exceed {}",
                limits.max_retries
            )));
        }

        Ok(Task::new(group, image, now)
            .with_payload(spec.payload.clone().unwrap_or_default())
            .with_priority(spec.priority.unwrap_or_default())
            .with_timeout(timeout)
            .with_retries(max_retries, retries_delay)
            .with_delay(delay))
    }

    fn audit(&self, group: &str, id: &TaskId, action: AuditAction, detail: Option<String>) {
        if let Some(sink) = &self.audit {
            sink.record(build_audit_event(id, group, action, self.clock.now(), detail));
        }
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> &str {
    panic
        .downcast_ref::<&str>()
        .copied()
        .or_else(|| panic.downcast_ref::<String>().map(String::as_str))
        .unwrap_or("non-string panic payload")
}
