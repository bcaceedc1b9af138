//! In-memory task store with per-group locking and priority-aware ready queues.
//!
//! Every mutation is computed on a copy of the record and handed to a commit
//! hook before it becomes visible. The journaled store uses that hook to write
//! ahead; a failing hook leaves the shard untouched.

use std::cmp::Ordering;
use std::collections::{BTreeSet, HashMap};
use std::ops::Bound;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::{Mutex, RwLock};

use crate::core::group::Group;
use crate::core::store::{ListQuery, TaskPage, TaskStore};
use crate::core::task::{Priority, Task, TaskId, TaskStatus, Transition};
use crate::core::SchedulerError;

/// Orders tasks by creation time; `seq` breaks ties between equal timestamps.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
struct CreatedKey {
    created_at: DateTime<Utc>,
    seq: usize,
}

impl CreatedKey {
    fn of(task: &Task, seq: usize) -> Self {
        Self {
            created_at: task.created_at,
            seq,
        }
    }
}

/// Orders queued tasks by priority (highest first), oldest first within a
/// priority.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct ReadyKey {
    priority: Priority,
    created: CreatedKey,
}

impl PartialOrd for ReadyKey {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for ReadyKey {
    fn cmp(&self, other: &Self) -> Ordering {
        match other.priority.cmp(&self.priority) {
            Ordering::Equal => self.created.cmp(&other.created),
            other => other,
        }
    }
}

/// Orders delayed tasks by the instant they become eligible.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
struct DueKey {
    due_at: DateTime<Utc>,
    seq: usize,
}

#[derive(Default)]
struct Queues {
    ready: BTreeSet<ReadyKey>,
    delayed: BTreeSet<DueKey>,
}

impl Queues {
    fn index(&mut self, task: &Task, seq: usize) {
        match task.status {
            TaskStatus::Queued => {
                self.ready.insert(ReadyKey {
                    priority: task.priority,
                    created: CreatedKey::of(task, seq),
                });
            }
            TaskStatus::Delayed => {
                self.delayed.insert(DueKey {
                    due_at: task.due_at(),
                    seq,
                });
            }
            _ => {}
        }
    }

    fn unindex(&mut self, task: &Task, seq: usize) {
        match task.status {
            TaskStatus::Queued => {
                self.ready.remove(&ReadyKey {
                    priority: task.priority,
                    created: CreatedKey::of(task, seq),
                });
            }
            TaskStatus::Delayed => {
                self.delayed.remove(&DueKey {
                    due_at: task.due_at(),
                    seq,
                });
            }
            _ => {}
        }
    }
}

struct Entry {
    seq: usize,
    task: Task,
}

/// All tasks of one group. `slots[seq]` is the id stored under `seq`.
#[derive(Default)]
struct GroupTasks {
    slots: Vec<TaskId>,
    tasks: HashMap<TaskId, Entry>,
    created: BTreeSet<CreatedKey>,
    queues: Queues,
}

impl GroupTasks {
    fn push<F>(&mut self, task: Task, commit: F) -> Result<TaskId, SchedulerError>
    where
        F: FnOnce(&Task) -> Result<(), SchedulerError>,
    {
        if self.tasks.contains_key(&task.id) {
            return Err(SchedulerError::InvalidArgument(format!(
                "duplicate task id {}",
                task.id
            )));
        }
        commit(&task)?;
        let id = task.id.clone();
        self.store_new(task);
        Ok(id)
    }

    fn store_new(&mut self, task: Task) {
        let seq = self.slots.len();
        self.queues.index(&task, seq);
        self.created.insert(CreatedKey::of(&task, seq));
        self.slots.push(task.id.clone());
        self.tasks.insert(task.id.clone(), Entry { seq, task });
    }

    fn replace(&mut self, task: Task) {
        if let Some(entry) = self.tasks.get_mut(&task.id) {
            self.queues.unindex(&entry.task, entry.seq);
            self.created.remove(&CreatedKey::of(&entry.task, entry.seq));
            self.queues.index(&task, entry.seq);
            self.created.insert(CreatedKey::of(&task, entry.seq));
            entry.task = task;
        } else {
            self.store_new(task);
        }
    }

    fn update<F>(
        &mut self,
        group: &str,
        id: &TaskId,
        transition: &Transition,
        commit: F,
    ) -> Result<Task, SchedulerError>
    where
        F: FnOnce(&Task) -> Result<(), SchedulerError>,
    {
        let entry = self
            .tasks
            .get_mut(id)
            .ok_or_else(|| SchedulerError::task_not_found(group, id))?;
        let mut next = entry.task.clone();
        next.apply(transition)?;
        commit(&next)?;
        self.queues.unindex(&entry.task, entry.seq);
        self.queues.index(&next, entry.seq);
        entry.task = next;
        Ok(entry.task.clone())
    }

    fn list(&self, query: &ListQuery) -> Result<TaskPage, SchedulerError> {
        if query.n == 0 {
            return Err(SchedulerError::InvalidArgument(
                "page size must be greater than 0".into(),
            ));
        }
        let upper = match query.cursor.as_deref() {
            Some(cursor) => {
                let entry = self.tasks.get(&TaskId::from(cursor)).ok_or_else(|| {
                    SchedulerError::InvalidArgument(format!("unknown cursor {cursor}"))
                })?;
                Bound::Excluded(CreatedKey::of(&entry.task, entry.seq))
            }
            None => Bound::Unbounded,
        };

        let mut matching = self
            .created
            .range((Bound::Unbounded, upper))
            .rev()
            .filter_map(|key| self.slots.get(key.seq))
            .filter_map(|id| self.tasks.get(id))
            .map(|entry| &entry.task)
            .filter(|task| {
                query
                    .created_after
                    .is_none_or(|after| task.created_at > after)
            });
        let tasks: Vec<Task> = matching.by_ref().take(query.n).cloned().collect();
        let cursor = if matching.next().is_some() {
            tasks.last().map(|task| task.id.to_string())
        } else {
            None
        };
        Ok(TaskPage { tasks, cursor })
    }

    fn promote_due<F>(
        &mut self,
        now: DateTime<Utc>,
        mut commit: F,
    ) -> Result<Vec<TaskId>, SchedulerError>
    where
        F: FnMut(&Task) -> Result<(), SchedulerError>,
    {
        let mut promoted = Vec::new();
        loop {
            let due = match self.queues.delayed.first() {
                Some(key) if key.due_at <= now => *key,
                _ => break,
            };
            let Some(entry) = self
                .slots
                .get(due.seq)
                .and_then(|id| self.tasks.get_mut(id))
            else {
                self.queues.delayed.remove(&due);
                continue;
            };
            let mut next = entry.task.clone();
            if let Err(e) = next.apply(&Transition::Promote) {
                tracing::warn!("skipping promotion of task {}: {}", next.id, e);
                self.queues.delayed.remove(&due);
                continue;
            }
            commit(&next)?;
            self.queues.delayed.remove(&due);
            self.queues.index(&next, entry.seq);
            promoted.push(next.id.clone());
            entry.task = next;
        }
        Ok(promoted)
    }

    fn peek_ready(&self) -> Option<Task> {
        let key = self.queues.ready.first()?;
        let id = self.slots.get(key.created.seq)?;
        self.tasks.get(id).map(|entry| entry.task.clone())
    }
}

/// In-memory task store. Each group's tasks sit behind their own mutex, so
/// operations on different groups never contend.
#[derive(Default)]
pub struct InMemoryTaskStore {
    groups: RwLock<HashMap<String, Arc<Mutex<GroupTasks>>>>,
    configs: RwLock<HashMap<String, Group>>,
}

impl InMemoryTaskStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    fn shard(&self, group: &str) -> Option<Arc<Mutex<GroupTasks>>> {
        self.groups.read().get(group).cloned()
    }

    fn shard_or_create(&self, group: &str) -> Arc<Mutex<GroupTasks>> {
        if let Some(shard) = self.shard(group) {
            return shard;
        }
        Arc::clone(self.groups.write().entry(group.to_owned()).or_default())
    }

    /// Insert or overwrite a record verbatim. Used when replaying a journal.
    pub(crate) fn restore(&self, task: Task) {
        self.shard_or_create(&task.group_name).lock().replace(task);
    }

    /// Insert, running `commit` under the shard lock before the task becomes
    /// visible.
    pub(crate) fn insert_with<F>(&self, task: Task, commit: F) -> Result<TaskId, SchedulerError>
    where
        F: FnOnce(&Task) -> Result<(), SchedulerError>,
    {
        let shard = self.shard_or_create(&task.group_name);
        let mut tasks = shard.lock();
        tasks.push(task, commit)
    }

    /// Apply a transition, running `commit` on the new record before it
    /// replaces the stored one.
    pub(crate) fn update_with<F>(
        &self,
        group: &str,
        id: &TaskId,
        transition: &Transition,
        commit: F,
    ) -> Result<Task, SchedulerError>
    where
        F: FnOnce(&Task) -> Result<(), SchedulerError>,
    {
        let shard = self
            .shard(group)
            .ok_or_else(|| SchedulerError::task_not_found(group, id))?;
        let mut tasks = shard.lock();
        tasks.update(group, id, transition, commit)
    }

    /// Promote due tasks, committing each promotion before applying it. Stops
    /// at the first failed commit.
    pub(crate) fn promote_due_with<F>(
        &self,
        group: &str,
        now: DateTime<Utc>,
        commit: F,
    ) -> Result<Vec<TaskId>, SchedulerError>
    where
        F: FnMut(&Task) -> Result<(), SchedulerError>,
    {
        match self.shard(group) {
            Some(shard) => shard.lock().promote_due(now, commit),
            None => Ok(Vec::new()),
        }
    }
}

impl TaskStore for InMemoryTaskStore {
    fn insert(&self, task: Task) -> Result<TaskId, SchedulerError> {
        self.insert_with(task, |_| Ok(()))
    }

    fn get(&self, group: &str, id: &TaskId) -> Result<Task, SchedulerError> {
        self.shard(group)
            .and_then(|shard| shard.lock().tasks.get(id).map(|entry| entry.task.clone()))
            .ok_or_else(|| SchedulerError::task_not_found(group, id))
    }

    fn list(&self, group: &str, query: &ListQuery) -> Result<TaskPage, SchedulerError> {
        match self.shard(group) {
            Some(shard) => shard.lock().list(query),
            None => Err(SchedulerError::NotFound(format!("group {group}"))),
        }
    }

    fn update(
        &self,
        group: &str,
        id: &TaskId,
        transition: &Transition,
    ) -> Result<Task, SchedulerError> {
        self.update_with(group, id, transition, |_| Ok(()))
    }

    fn promote_due(&self, group: &str, now: DateTime<Utc>) -> Result<Vec<TaskId>, SchedulerError> {
        self.promote_due_with(group, now, |_| Ok(()))
    }

    fn peek_ready(&self, group: &str) -> Result<Option<Task>, SchedulerError> {
        Ok(self.shard(group).and_then(|shard| shard.lock().peek_ready()))
    }

    fn next_due(&self, group: &str) -> Option<DateTime<Utc>> {
        self.shard(group)
            .and_then(|shard| shard.lock().queues.delayed.first().map(|key| key.due_at))
    }

    fn groups(&self) -> Vec<String> {
        let mut names: Vec<String> = self.groups.read().keys().cloned().collect();
        names.sort();
        names
    }

    fn running(&self) -> Result<Vec<Task>, SchedulerError> {
        let shards: Vec<_> = self.groups.read().values().cloned().collect();
        let mut running = Vec::new();
        for shard in shards {
            let tasks = shard.lock();
            running.extend(
                tasks
                    .tasks
                    .values()
                    .filter(|entry| entry.task.status == TaskStatus::Running)
                    .map(|entry| entry.task.clone()),
            );
        }
        Ok(running)
    }

    fn save_group(&self, group: &Group) -> Result<(), SchedulerError> {
        self.configs.write().insert(group.name.clone(), group.clone());
        Ok(())
    }

    fn load_groups(&self) -> Result<Vec<Group>, SchedulerError> {
        let mut groups: Vec<Group> = self.configs.read().values().cloned().collect();
        groups.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(groups)
    }
}
