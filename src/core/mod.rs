//! Core scheduling abstractions: tasks, groups, storage seams and the scheduler.

pub mod audit;
pub mod error;
pub mod executor;
pub mod group;
pub mod logs;
pub mod scheduler;
pub mod store;
pub mod task;

pub use audit::{build_audit_event, AuditAction, AuditEvent, AuditSink, InMemoryAuditSink};
pub use error::{AppResult, SchedulerError};
pub use executor::{ExecutionResult, Invocation, TaskExecutor};
pub use group::{validate_group_name, Group, GroupConfig, GroupRegistry};
pub use logs::{LogStore, TaskLogWriter};
pub use scheduler::{Scheduler, SchedulerLimits, SchedulerParts, Spawn};
pub use store::{ListQuery, TaskPage, TaskStore};
pub use task::{Outcome, Priority, Reason, Task, TaskId, TaskSpec, TaskStatus, Transition};
