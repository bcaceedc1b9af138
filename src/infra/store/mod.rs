//! Task store backends.

pub mod file;
pub mod memory;

pub use file::FileTaskStore;
pub use memory::InMemoryTaskStore;
