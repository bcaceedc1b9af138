//! Tests for log stores behind the shared trait

use std::sync::Arc;

use prometheus_group_scheduler::core::{LogStore, SchedulerError, TaskId, TaskLogWriter};
use prometheus_group_scheduler::infra::{FileLogStore, InMemoryLogStore};

fn exercise(store: Arc<dyn LogStore>) {
    let id = TaskId::from("task-1");
    assert!(matches!(
        store.read("g", &id),
        Err(SchedulerError::NotFound(_))
    ));

    store.open("g", &id).unwrap();
    assert_eq!(store.read("g", &id).unwrap(), "");

    let writer = TaskLogWriter::new(Arc::clone(&store), "g", id.clone());
    writer.write("partial ");
    writer.write_line("line");
    assert_eq!(store.read("g", &id).unwrap(), "partial line\n");

    // Same id in another group is a different log.
    assert!(store.read("other", &id).is_err());
}

#[test]
fn test_in_memory_log_store() {
    exercise(Arc::new(InMemoryLogStore::new()));
}

#[test]
fn test_file_log_store() {
    let dir = tempfile::tempdir().unwrap();
    exercise(Arc::new(FileLogStore::new(dir.path()).unwrap()));
    assert!(dir.path().join("g").join("task-1.log").exists());
}

#[test]
fn test_writer_swallows_append_failures() {
    let store: Arc<dyn LogStore> = Arc::new(InMemoryLogStore::new());
    let writer = TaskLogWriter::new(Arc::clone(&store), "g", TaskId::from("never-opened"));
    writer.write_line("dropped");
    assert!(store.read("g", &TaskId::from("never-opened")).is_err());
}
