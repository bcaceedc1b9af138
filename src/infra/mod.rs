//! Infrastructure adapters for task storage, log storage, and execution.

pub mod executor;
pub mod logs;
pub mod store;

pub use executor::ProcessExecutor;
pub use logs::{FileLogStore, InMemoryLogStore};
pub use store::{FileTaskStore, InMemoryTaskStore};
