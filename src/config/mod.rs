//! Configuration models for limits, backends, and groups.

pub mod scheduler;

pub use scheduler::{LogBackendConfig, SchedulerConfig, StoreBackendConfig};
