//! In-memory log backend.

use std::collections::HashMap;

use parking_lot::RwLock;

use crate::core::logs::LogStore;
use crate::core::task::TaskId;
use crate::core::SchedulerError;

/// Simple in-memory log store for development/testing.
#[derive(Default)]
pub struct InMemoryLogStore {
    logs: RwLock<HashMap<(String, TaskId), String>>,
}

impl InMemoryLogStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    fn key(group: &str, id: &TaskId) -> (String, TaskId) {
        (group.to_owned(), id.clone())
    }
}

impl LogStore for InMemoryLogStore {
    fn open(&self, group: &str, id: &TaskId) -> Result<(), SchedulerError> {
        self.logs.write().entry(Self::key(group, id)).or_default();
        Ok(())
    }

    fn append(&self, group: &str, id: &TaskId, chunk: &str) -> Result<(), SchedulerError> {
        match self.logs.write().get_mut(&Self::key(group, id)) {
            Some(log) => {
                log.push_str(chunk);
                Ok(())
            }
            None => Err(SchedulerError::NotFound(format!("log for task {id}"))),
        }
    }

    fn read(&self, group: &str, id: &TaskId) -> Result<String, SchedulerError> {
        self.logs
            .read()
            .get(&Self::key(group, id))
            .cloned()
            .ok_or_else(|| SchedulerError::NotFound(format!("log for task {id}")))
    }
}
