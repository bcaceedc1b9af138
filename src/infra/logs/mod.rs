//! Task log backends.

pub mod file;
pub mod memory;

pub use file::FileLogStore;
pub use memory::InMemoryLogStore;
