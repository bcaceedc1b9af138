//! Tests for builder modules

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::DateTime;
use prometheus_group_scheduler::builders::SchedulerBuilder;
use prometheus_group_scheduler::config::{SchedulerConfig, StoreBackendConfig};
use prometheus_group_scheduler::core::{
    ExecutionResult, GroupConfig, InMemoryAuditSink, Invocation, SchedulerError, TaskExecutor,
    TaskSpec, TaskStore,
};
use prometheus_group_scheduler::infra::InMemoryTaskStore;
use prometheus_group_scheduler::runtime::TokioSpawner;
use prometheus_group_scheduler::util::ManualClock;
use tokio_util::sync::CancellationToken;

#[derive(Clone)]
struct NoopExecutor;

#[async_trait]
impl TaskExecutor for NoopExecutor {
    async fn execute(&self, _invocation: Invocation, _cancel: CancellationToken) -> ExecutionResult {
        ExecutionResult::Success
    }
}

fn seeded_config() -> SchedulerConfig {
    SchedulerConfig {
        groups: BTreeMap::from([(
            "seeded".to_string(),
            GroupConfig {
                image: Some("noop".into()),
                max_concurrency: Some(2),
                ..GroupConfig::default()
            },
        )]),
        ..SchedulerConfig::default()
    }
}

#[tokio::test]
async fn test_builder_seeds_configured_groups() {
    let builder = SchedulerBuilder::new(seeded_config(), NoopExecutor, TokioSpawner::current());
    assert_eq!(builder.config().groups.len(), 1);

    let scheduler = builder.build().unwrap();
    let group = scheduler.group("seeded").unwrap();
    assert_eq!(group.config.max_concurrency, Some(2));
    assert_eq!(scheduler.running_count("seeded"), 0);
}

#[tokio::test]
async fn test_builder_rejects_invalid_config() {
    let config = SchedulerConfig {
        poll_interval_ms: 0,
        ..SchedulerConfig::default()
    };
    let result = SchedulerBuilder::new(config, NoopExecutor, TokioSpawner::current()).build();
    assert!(matches!(result, Err(SchedulerError::InvalidArgument(_))));
}

#[tokio::test]
async fn test_builder_overrides_store_clock_and_audit() {
    let store = Arc::new(InMemoryTaskStore::new());
    let start = DateTime::from_timestamp(1_700_000_000, 0).unwrap();
    let audit = InMemoryAuditSink::new(8);

    let scheduler = SchedulerBuilder::new(seeded_config(), NoopExecutor, TokioSpawner::current())
        .with_store(store.clone())
        .with_clock(Arc::new(ManualClock::starting_at(start)))
        .with_audit(Arc::new(audit.clone()))
        .build()
        .unwrap();

    let tasks = scheduler.submit("seeded", vec![TaskSpec::default()]).unwrap();
    assert_eq!(tasks[0].created_at, start);
    assert_eq!(store.get("seeded", &tasks[0].id).unwrap(), tasks[0]);
    assert_eq!(audit.events().len(), 1);
}

#[tokio::test]
async fn test_builder_opens_file_store() {
    let dir = tempfile::tempdir().unwrap();
    let config = SchedulerConfig {
        store: StoreBackendConfig::File {
            path: dir.path().to_path_buf(),
        },
        ..seeded_config()
    };
    let scheduler = SchedulerBuilder::new(config, NoopExecutor, TokioSpawner::current())
        .build()
        .unwrap();
    scheduler.submit("seeded", vec![TaskSpec::default()]).unwrap();
    assert!(dir.path().join("tasks.jsonl").exists());
}
