//! Task records and the lifecycle state machine.
//!
//! A task moves through `delayed -> queued -> running -> {success, error, cancelled}`.
//! Every mutation goes through [`Task::apply`], which rejects any step that would
//! leave a terminal status or skip backwards, and fills the lifecycle timestamps
//! exactly once.

use std::fmt;

use chrono::{DateTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};

use crate::core::SchedulerError;

/// Opaque task identifier, assigned at creation.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaskId(String);

impl TaskId {
    /// Generate a fresh random identifier.
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().simple().to_string())
    }

    /// Borrow the identifier as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for TaskId {
    fn from(value: &str) -> Self {
        Self(value.to_owned())
    }
}

impl From<String> for TaskId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

/// Scheduling priority. Higher values are admitted first.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize,
)]
#[serde(try_from = "u8", into = "u8")]
pub enum Priority {
    /// Priority 0.
    #[default]
    Low = 0,
    /// Priority 1.
    Normal = 1,
    /// Priority 2.
    High = 2,
}

impl TryFrom<u8> for Priority {
    type Error = String;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(Self::Low),
            1 => Ok(Self::Normal),
            2 => Ok(Self::High),
            other => Err(format!("priority must be 0, 1 or 2, got {other}")),
        }
    }
}

impl From<Priority> for u8 {
    fn from(priority: Priority) -> Self {
        priority as Self
    }
}

/// Lifecycle status of a task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    /// Waiting for its delay to elapse.
    Delayed,
    /// Eligible, waiting for a concurrency slot.
    Queued,
    /// Admitted and handed to the executor.
    Running,
    /// Finished cleanly.
    Success,
    /// Finished with a failure; see [`Reason`].
    Error,
    /// Stopped on client request.
    Cancelled,
}

impl TaskStatus {
    /// Terminal statuses accept no further transitions.
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Success | Self::Error | Self::Cancelled)
    }

    /// Position in the lifecycle lattice.
    pub(crate) const fn rank(self) -> u8 {
        match self {
            Self::Delayed => 0,
            Self::Queued => 1,
            Self::Running => 2,
            Self::Success | Self::Error | Self::Cancelled => 3,
        }
    }

    /// Wire name of the status.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Delayed => "delayed",
            Self::Queued => "queued",
            Self::Running => "running",
            Self::Success => "success",
            Self::Error => "error",
            Self::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why a task ended in `error`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Reason {
    /// The unit of work exited non-zero.
    BadExit,
    /// The unit of work ran past its timeout.
    Timeout,
    /// The unit of work could not run or was torn down by the scheduler.
    Killed,
}

/// Terminal result recorded by the completion handler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Outcome {
    /// Finished cleanly.
    Success,
    /// Failed with a reason.
    Error(Reason),
}

/// A single state machine step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Transition {
    /// `delayed -> queued` once the delay has elapsed.
    Promote,
    /// `queued -> running`.
    Admit {
        /// Admission time.
        at: DateTime<Utc>,
    },
    /// `running -> success | error`.
    Complete {
        /// Result of the run.
        outcome: Outcome,
        /// Completion time.
        at: DateTime<Utc>,
    },
    /// `delayed | queued | running -> cancelled`.
    Cancel {
        /// Cancellation time.
        at: DateTime<Utc>,
    },
    /// Record the successor spawned for a failed task.
    LinkRetry {
        /// Identifier of the successor.
        successor: TaskId,
    },
}

/// Client-supplied fields for a new task. Omitted fields fall back to group
/// and scheduler defaults.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskSpec {
    /// Image to run; defaults to the group image.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
    /// Opaque payload handed to the executor.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<String>,
    /// Priority 0-2, default 0.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub priority: Option<Priority>,
    /// Seconds after creation before the task is eligible.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub delay: Option<u64>,
    /// Maximum run time in seconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout: Option<u64>,
    /// Automatic retries allowed on failure.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_retries: Option<u32>,
    /// Seconds to wait before each retry runs.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retries_delay: Option<u64>,
}

impl TaskSpec {
    /// Spec running the given image.
    pub fn new(image: impl Into<String>) -> Self {
        Self {
            image: Some(image.into()),
            ..Self::default()
        }
    }

    /// Set the payload.
    #[must_use]
    pub fn with_payload(mut self, payload: impl Into<String>) -> Self {
        self.payload = Some(payload.into());
        self
    }

    /// Set the priority.
    #[must_use]
    pub const fn with_priority(mut self, priority: Priority) -> Self {
        self.priority = Some(priority);
        self
    }

    /// Set the delay in seconds.
    #[must_use]
    pub const fn with_delay(mut self, secs: u64) -> Self {
        self.delay = Some(secs);
        self
    }

    /// Set the timeout in seconds.
    #[must_use]
    pub const fn with_timeout(mut self, secs: u64) -> Self {
        self.timeout = Some(secs);
        self
    }

    /// Set the retry budget and spacing.
    #[must_use]
    pub const fn with_retries(mut self, max_retries: u32, retries_delay: u64) -> Self {
        self.max_retries = Some(max_retries);
        self.retries_delay = Some(retries_delay);
        self
    }
}

/// Lifecycle record of one submitted unit of work.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Task {
    /// Unique identifier.
    pub id: TaskId,
    /// Owning group.
    pub group_name: String,
    /// Image to run.
    pub image: String,
    /// Opaque payload.
    #[serde(default)]
    pub payload: String,
    /// Scheduling priority.
    pub priority: Priority,
    /// Delay in seconds before eligibility.
    pub delay: u64,
    /// Maximum run time in seconds.
    pub timeout: u64,
    /// Remaining automatic retries.
    pub max_retries: u32,
    /// Seconds between a failure and its retry becoming eligible.
    pub retries_delay: u64,
    /// Task this one retries.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retry_of: Option<TaskId>,
    /// Successor spawned when this task failed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retry_at: Option<TaskId>,
    /// Current status.
    pub status: TaskStatus,
    /// Failure reason, only set on `error`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<Reason>,
    /// Submission time.
    pub created_at: DateTime<Utc>,
    /// Admission time.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    /// Time the task reached a terminal status.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
}

/// Default run time limit, in seconds, for tasks built without one.
pub const DEFAULT_TIMEOUT_SECS: u64 = 3600;

impl Task {
    /// New queued task with default priority, no delay and no retries.
    pub fn new(
        group_name: impl Into<String>,
        image: impl Into<String>,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: TaskId::generate(),
            group_name: group_name.into(),
            image: image.into(),
            payload: String::new(),
            priority: Priority::Low,
            delay: 0,
            timeout: DEFAULT_TIMEOUT_SECS,
            max_retries: 0,
            retries_delay: 0,
            retry_of: None,
            retry_at: None,
            status: TaskStatus::Queued,
            reason: None,
            created_at,
            started_at: None,
            completed_at: None,
        }
    }

    /// Set the payload.
    #[must_use]
    pub fn with_payload(mut self, payload: impl Into<String>) -> Self {
        self.payload = payload.into();
        self
    }

    /// Set the priority.
    #[must_use]
    pub const fn with_priority(mut self, priority: Priority) -> Self {
        self.priority = priority;
        self
    }

    /// Set the delay; a non-zero delay starts the task as `delayed`.
    #[must_use]
    pub const fn with_delay(mut self, secs: u64) -> Self {
        self.delay = secs;
        self.status = if secs == 0 {
            TaskStatus::Queued
        } else {
            TaskStatus::Delayed
        };
        self
    }

    /// Set the timeout.
    #[must_use]
    pub const fn with_timeout(mut self, secs: u64) -> Self {
        self.timeout = secs;
        self
    }

    /// Set the retry budget and spacing.
    #[must_use]
    pub const fn with_retries(mut self, max_retries: u32, retries_delay: u64) -> Self {
        self.max_retries = max_retries;
        self.retries_delay = retries_delay;
        self
    }

    /// Build the retry of a failed task: same image and payload, one less retry,
    /// delayed by `retries_delay`.
    pub fn retry_successor(&self, created_at: DateTime<Utc>) -> Self {
        let mut successor = Self::new(self.group_name.clone(), self.image.clone(), created_at)
            .with_payload(self.payload.clone())
            .with_priority(self.priority)
            .with_timeout(self.timeout)
            .with_retries(self.max_retries.saturating_sub(1), self.retries_delay)
            .with_delay(self.retries_delay);
        successor.retry_of = Some(self.id.clone());
        successor
    }

    /// Instant the delay elapses.
    pub fn due_at(&self) -> DateTime<Utc> {
        i64::try_from(self.delay)
            .ok()
            .and_then(TimeDelta::try_seconds)
            .and_then(|delay| self.created_at.checked_add_signed(delay))
            .unwrap_or(DateTime::<Utc>::MAX_UTC)
    }

    /// Lifecycle progress; strictly increases with every accepted transition.
    pub(crate) const fn progress(&self) -> (u8, bool) {
        (self.status.rank(), self.retry_at.is_some())
    }

    /// Apply a transition, rejecting it without side effects when the state
    /// machine forbids it.
    pub fn apply(&mut self, transition: &Transition) -> Result<(), SchedulerError> {
        match (transition, self.status) {
            (Transition::Promote, TaskStatus::Delayed) => {
                self.status = TaskStatus::Queued;
            }
            (Transition::Admit { at }, TaskStatus::Queued) => {
                self.status = TaskStatus::Running;
                self.started_at = Some((*at).max(self.created_at));
            }
            (Transition::Complete { outcome, at }, TaskStatus::Running) => {
                let floor = self.started_at.unwrap_or(self.created_at);
                self.completed_at = Some((*at).max(floor));
                match outcome {
                    Outcome::Success => self.status = TaskStatus::Success,
                    Outcome::Error(reason) => {
                        self.status = TaskStatus::Error;
                        self.reason = Some(*reason);
                    }
                }
            }
            (
                Transition::Cancel { at },
                TaskStatus::Delayed | TaskStatus::Queued | TaskStatus::Running,
            ) => {
                let floor = self.started_at.unwrap_or(self.created_at);
                self.status = TaskStatus::Cancelled;
                self.completed_at = Some((*at).max(floor));
            }
            (Transition::LinkRetry { successor }, TaskStatus::Error) if self.retry_at.is_none() => {
                self.retry_at = Some(successor.clone());
            }
            (_, status) => {
                return Err(SchedulerError::Conflict {
                    id: self.id.clone(),
                    status,
                });
            }
        }
        Ok(())
    }
}
