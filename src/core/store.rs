//! Task store abstraction.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::core::group::Group;
use crate::core::task::{Task, TaskId, Transition};
use crate::core::SchedulerError;

/// Filter and pagination window for listing a group's tasks.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListQuery {
    /// Only tasks created strictly after this instant.
    #[serde(default)]
    pub created_after: Option<DateTime<Utc>>,
    /// Id of the last task of the previous page.
    #[serde(default)]
    pub cursor: Option<String>,
    /// Page size.
    pub n: usize,
}

/// One page of a group listing, newest first.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskPage {
    /// Tasks on this page.
    pub tasks: Vec<Task>,
    /// Cursor for the next page; `None` once the listing is exhausted.
    pub cursor: Option<String>,
}

/// Durable record of tasks and groups.
///
/// Implementations serialise mutations per group only: every `update` is an
/// atomic compare-and-set on the task's status, expressed as a [`Transition`]
/// that the stored record must accept.
pub trait TaskStore: Send + Sync {
    /// Persist a new task and return its id.
    fn insert(&self, task: Task) -> Result<TaskId, SchedulerError>;

    /// Point lookup of a task within its group.
    fn get(&self, group: &str, id: &TaskId) -> Result<Task, SchedulerError>;

    /// Group-scoped listing in descending creation order.
    fn list(&self, group: &str, query: &ListQuery) -> Result<TaskPage, SchedulerError>;

    /// Apply a transition atomically, returning the updated task. Fails with
    /// `Conflict` and leaves the record untouched if the transition is not
    /// allowed from the stored status.
    fn update(&self, group: &str, id: &TaskId, transition: &Transition)
        -> Result<Task, SchedulerError>;

    /// Move every delayed task whose delay has elapsed to `queued`.
    fn promote_due(&self, group: &str, now: DateTime<Utc>) -> Result<Vec<TaskId>, SchedulerError>;

    /// Highest-priority, oldest queued task of the group.
    fn peek_ready(&self, group: &str) -> Result<Option<Task>, SchedulerError>;

    /// Earliest instant a delayed task of the group becomes eligible.
    fn next_due(&self, group: &str) -> Option<DateTime<Utc>>;

    /// Names of groups that hold at least one task.
    fn groups(&self) -> Vec<String>;

    /// Every task currently marked running, across groups.
    fn running(&self) -> Result<Vec<Task>, SchedulerError>;

    /// Persist a group's configuration.
    fn save_group(&self, group: &Group) -> Result<(), SchedulerError>;

    /// Load all persisted group configurations.
    fn load_groups(&self) -> Result<Vec<Group>, SchedulerError>;
}
