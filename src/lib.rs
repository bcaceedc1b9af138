//! # Prometheus Group Scheduler
//!
//! A group-scoped task scheduler for delayed, prioritised, retryable units of
//! work with per-group concurrency ceilings.
//!
//! Clients submit batches of tasks into named groups. Each task moves through
//! a small lifecycle:
//!
//! ```text
//! delayed ──▶ queued ──▶ running ──▶ success | error
//!    └───────────┴──────────┴──────▶ cancelled
//! ```
//!
//! ## Key Features
//!
//! - **Group isolation**: every group has its own queue, default image,
//!   environment and optional `max_concurrency` ceiling
//! - **Priorities**: three levels, FIFO within a level
//! - **Delays and retries**: failed tasks spawn a delayed successor while
//!   their retry budget lasts, linked through `retry_of` / `retry_at`
//! - **Timeouts and cancellation**: every run races its timeout and a
//!   cancellation token; late results never overwrite a terminal status
//! - **Pluggable backends**: task store, log store, executor and audit sink
//!   sit behind traits with in-memory and file implementations
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use prometheus_group_scheduler::builders::SchedulerBuilder;
//! use prometheus_group_scheduler::config::SchedulerConfig;
//! use prometheus_group_scheduler::core::{GroupConfig, TaskSpec};
//! use prometheus_group_scheduler::infra::ProcessExecutor;
//! use prometheus_group_scheduler::runtime::TokioSpawner;
//!
//! let scheduler = SchedulerBuilder::new(
//!     SchedulerConfig::default(),
//!     ProcessExecutor::new(),
//!     TokioSpawner::current(),
//! )
//! .build()?;
//! scheduler.start();
//!
//! scheduler.upsert_group("reports", GroupConfig {
//!     image: Some("/usr/local/bin/render-report".into()),
//!     max_concurrency: Some(2),
//!     ..GroupConfig::default()
//! })?;
//! let tasks = scheduler.submit("reports", vec![TaskSpec::default().with_delay(60)])?;
//! ```
//!
//! See `tests/` for complete lifecycle scenarios.

#![deny(missing_docs)]
#![deny(unsafe_code)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

/// Core scheduling abstractions: tasks, groups, storage seams and the scheduler.
pub mod core;
/// Configuration models for limits, backends, and groups.
pub mod config;
/// Builders to construct a scheduler from configuration.
pub mod builders;
/// Infrastructure adapters for task stores, log stores, and executors.
pub mod infra;
/// Runtime adapters and API surface.
pub mod runtime;
/// Shared utilities.
pub mod util;
