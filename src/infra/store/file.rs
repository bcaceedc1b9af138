//! File-backed task store.
//!
//! Every mutation appends the full resulting record to a JSON lines journal
//! before it becomes visible in memory; a failed append leaves the store as it
//! was. Because each accepted transition strictly advances a task's lifecycle,
//! replay keeps the most advanced record per task regardless of the order in
//! which concurrent writers reached the file. The journal is compacted on open.

use std::collections::HashMap;
use std::fs::{create_dir_all, File, OpenOptions};
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::core::group::Group;
use crate::core::store::{ListQuery, TaskPage, TaskStore};
use crate::core::task::{Task, TaskId, Transition};
use crate::core::SchedulerError;
use crate::infra::store::memory::InMemoryTaskStore;

const JOURNAL_FILE: &str = "tasks.jsonl";

#[derive(Debug, Serialize, Deserialize)]
#[serde(tag = "kind", content = "record", rename_all = "snake_case")]
enum JournalRecord {
    Task(Task),
    Group(Group),
}

/// Task store persisted to a JSON lines journal, indexed in memory.
pub struct FileTaskStore {
    path: PathBuf,
    journal: Mutex<Box<dyn Write + Send>>,
    inner: InMemoryTaskStore,
}

impl FileTaskStore {
    /// Open (or create) a store under `dir`, replaying any existing journal.
    pub fn open(dir: impl AsRef<Path>) -> Result<Self, SchedulerError> {
        let dir = dir.as_ref();
        create_dir_all(dir)?;
        let path = dir.join(JOURNAL_FILE);

        let (tasks, groups) = Self::replay(&path)?;
        let inner = InMemoryTaskStore::new();
        for task in &tasks {
            inner.restore(task.clone());
        }
        for group in &groups {
            inner.save_group(group)?;
        }
        Self::compact(&path, &tasks, &groups)?;
        tracing::info!(
            "opened task journal {} ({} tasks, {} groups)",
            path.display(),
            tasks.len(),
            groups.len()
        );

        let journal = OpenOptions::new().create(true).append(true).open(&path)?;
        Ok(Self {
            path,
            journal: Mutex::new(Box::new(journal)),
            inner,
        })
    }

    /// Location of the journal file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read the journal, keeping the most advanced record per task and the
    /// latest record per group. Tasks come back ordered by creation time.
    fn replay(path: &Path) -> Result<(Vec<Task>, Vec<Group>), SchedulerError> {
        if !path.exists() {
            return Ok((Vec::new(), Vec::new()));
        }
        let reader = BufReader::new(File::open(path)?);
        let mut order: Vec<TaskId> = Vec::new();
        let mut tasks: HashMap<TaskId, Task> = HashMap::new();
        let mut groups: HashMap<String, Group> = HashMap::new();

        for (lineno, line) in reader.lines().enumerate() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            let record: JournalRecord = match serde_json::from_str(&line) {
                Ok(record) => record,
                Err(e) => {
                    // A torn final write is expected after a crash.
                    tracing::warn!(
                        "skipping unreadable journal line {} in {}: {}",
                        lineno + 1,
                        path.display(),
                        e
                    );
                    continue;
                }
            };
            match record {
                JournalRecord::Task(task) => match tasks.get_mut(&task.id) {
                    Some(known) if task.progress() >= known.progress() => *known = task,
                    Some(_) => {}
                    None => {
                        order.push(task.id.clone());
                        tasks.insert(task.id.clone(), task);
                    }
                },
                JournalRecord::Group(group) => {
                    groups.insert(group.name.clone(), group);
                }
            }
        }

        let mut tasks: Vec<Task> = order
            .into_iter()
            .filter_map(|id| tasks.remove(&id))
            .collect();
        tasks.sort_by_key(|task| task.created_at);
        let mut groups: Vec<Group> = groups.into_values().collect();
        groups.sort_by(|a, b| a.name.cmp(&b.name));
        Ok((tasks, groups))
    }

    fn compact(path: &Path, tasks: &[Task], groups: &[Group]) -> Result<(), SchedulerError> {
        let tmp = path.with_extension("jsonl.tmp");
        {
            let mut writer = BufWriter::new(
                OpenOptions::new()
                    .create(true)
                    .write(true)
                    .truncate(true)
                    .open(&tmp)?,
            );
            for group in groups {
                let line = serde_json::to_string(&JournalRecord::Group(group.clone()))?;
                writeln!(writer, "{line}")?;
            }
            for task in tasks {
                let line = serde_json::to_string(&JournalRecord::Task(task.clone()))?;
                writeln!(writer, "{line}")?;
            }
            writer.flush()?;
        }
        std::fs::rename(&tmp, path)?;
        Ok(())
    }

    fn append_task(&self, task: &Task) -> Result<(), SchedulerError> {
        self.append(&JournalRecord::Task(task.clone()))
    }

    fn append(&self, record: &JournalRecord) -> Result<(), SchedulerError> {
        let line = serde_json::to_string(record)?;
        let mut journal = self.journal.lock();
        writeln!(journal, "{line}")?;
        journal.flush()?;
        Ok(())
    }
}

impl TaskStore for FileTaskStore {
    fn insert(&self, task: Task) -> Result<TaskId, SchedulerError> {
        self.inner.insert_with(task, |task| self.append_task(task))
    }

    fn get(&self, group: &str, id: &TaskId) -> Result<Task, SchedulerError> {
        self.inner.get(group, id)
    }

    fn list(&self, group: &str, query: &ListQuery) -> Result<TaskPage, SchedulerError> {
        self.inner.list(group, query)
    }

    fn update(
        &self,
        group: &str,
        id: &TaskId,
        transition: &Transition,
    ) -> Result<Task, SchedulerError> {
        self.inner
            .update_with(group, id, transition, |task| self.append_task(task))
    }

    fn promote_due(&self, group: &str, now: DateTime<Utc>) -> Result<Vec<TaskId>, SchedulerError> {
        self.inner
            .promote_due_with(group, now, |task| self.append_task(task))
    }

    fn peek_ready(&self, group: &str) -> Result<Option<Task>, SchedulerError> {
        self.inner.peek_ready(group)
    }

    fn next_due(&self, group: &str) -> Option<DateTime<Utc>> {
        self.inner.next_due(group)
    }

    fn groups(&self) -> Vec<String> {
        self.inner.groups()
    }

    fn running(&self) -> Result<Vec<Task>, SchedulerError> {
        self.inner.running()
    }

    fn save_group(&self, group: &Group) -> Result<(), SchedulerError> {
        self.append(&JournalRecord::Group(group.clone()))?;
        self.inner.save_group(group)
    }

    fn load_groups(&self) -> Result<Vec<Group>, SchedulerError> {
        self.inner.load_groups()
    }
}
