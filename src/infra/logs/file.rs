//! File-backed log backend: one file per task under `<dir>/<group>/<id>.log`.

use std::fs::{create_dir_all, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

use crate::core::logs::LogStore;
use crate::core::task::TaskId;
use crate::core::SchedulerError;

/// Log store writing plain text files.
pub struct FileLogStore {
    path: PathBuf,
}

impl FileLogStore {
    /// Create a store rooted at `path`.
    pub fn new(path: impl AsRef<Path>) -> Result<Self, SchedulerError> {
        let path = path.as_ref().to_path_buf();
        create_dir_all(&path)?;
        Ok(Self { path })
    }

    fn file_path(&self, group: &str, id: &TaskId) -> Result<PathBuf, SchedulerError> {
        // Ids come from clients on lookups; never let them escape the root.
        let safe = |part: &str| {
            !part.is_empty() && !part.contains(['/', '\\']) && part != "." && part != ".."
        };
        if !safe(group) || !safe(id.as_str()) {
            return Err(SchedulerError::NotFound(format!("log for task {id}")));
        }
        Ok(self.path.join(group).join(format!("{id}.log")))
    }
}

impl LogStore for FileLogStore {
    fn open(&self, group: &str, id: &TaskId) -> Result<(), SchedulerError> {
        let file_path = self.file_path(group, id)?;
        create_dir_all(self.path.join(group))?;
        OpenOptions::new()
            .create(true)
            .append(true)
            .open(file_path)?;
        Ok(())
    }

    fn append(&self, group: &str, id: &TaskId, chunk: &str) -> Result<(), SchedulerError> {
        let file_path = self.file_path(group, id)?;
        let mut file = match OpenOptions::new().append(true).open(file_path) {
            Ok(file) => file,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                return Err(SchedulerError::NotFound(format!("log for task {id}")));
            }
            Err(e) => return Err(e.into()),
        };
        file.write_all(chunk.as_bytes())?;
        Ok(())
    }

    fn read(&self, group: &str, id: &TaskId) -> Result<String, SchedulerError> {
        let file_path = self.file_path(group, id)?;
        match std::fs::read_to_string(file_path) {
            Ok(log) => Ok(log),
            Err(e) if e.kind() == ErrorKind::NotFound => {
                Err(SchedulerError::NotFound(format!("log for task {id}")))
            }
            Err(e) => Err(e.into()),
        }
    }
}
