//! Tests for configuration validation

use std::collections::BTreeMap;

use prometheus_group_scheduler::config::{LogBackendConfig, SchedulerConfig, StoreBackendConfig};
use prometheus_group_scheduler::core::GroupConfig;

#[test]
fn test_default_config_is_valid() {
    let config = SchedulerConfig::default();
    assert!(config.validate().is_ok());
    assert_eq!(config.poll_interval_ms, 1_000);
    assert_eq!(config.default_timeout_secs, 3_600);
    assert_eq!(config.max_retries_limit, 25);
    assert_eq!(config.store, StoreBackendConfig::InMemory);
}

#[test]
fn test_config_invalid_poll_interval() {
    let invalid = SchedulerConfig {
        poll_interval_ms: 0,
        ..SchedulerConfig::default()
    };
    assert!(invalid.validate().is_err());
}

#[test]
fn test_config_invalid_timeout() {
    let invalid = SchedulerConfig {
        default_timeout_secs: 0,
        ..SchedulerConfig::default()
    };
    assert!(invalid.validate().is_err());
}

#[test]
fn test_config_invalid_page_size() {
    let invalid = SchedulerConfig {
        max_page_size: 0,
        ..SchedulerConfig::default()
    };
    assert!(invalid.validate().is_err());
}

#[test]
fn test_config_rejects_bad_groups() {
    let zero_slots = SchedulerConfig {
        groups: BTreeMap::from([(
            "g".to_string(),
            GroupConfig {
                max_concurrency: Some(0),
                ..GroupConfig::default()
            },
        )]),
        ..SchedulerConfig::default()
    };
    assert!(zero_slots.validate().is_err());

    let bad_name = SchedulerConfig {
        groups: BTreeMap::from([("no/slashes".to_string(), GroupConfig::default())]),
        ..SchedulerConfig::default()
    };
    assert!(bad_name.validate().is_err());
}

#[test]
fn test_scheduler_config_from_json() {
    let json = r#"{
        "default_timeout_secs": 60,
        "store": { "file": { "path": "/tmp/tasks" } },
        "logs": "in_memory",
        "groups": {
            "reports": {
                "image": "render",
                "env_vars": { "REGION": "eu" },
                "max_concurrency": 4
            }
        }
    }"#;

    let config = SchedulerConfig::from_json_str(json).unwrap();
    assert_eq!(config.default_timeout_secs, 60);
    assert_eq!(config.logs, LogBackendConfig::InMemory);
    assert_eq!(config.groups["reports"].env_vars["REGION"], "eu");
}

#[test]
fn test_scheduler_config_from_json_rejects_garbage() {
    assert!(SchedulerConfig::from_json_str("{ not json").is_err());
    assert!(SchedulerConfig::from_json_str(r#"{ "poll_interval_ms": 0 }"#).is_err());
}

#[test]
fn test_scheduler_config_from_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("scheduler.json");
    std::fs::write(&path, r#"{ "max_page_size": 50 }"#).unwrap();

    let config = SchedulerConfig::from_file(&path).unwrap();
    assert_eq!(config.max_page_size, 50);
    assert!(SchedulerConfig::from_file(dir.path().join("missing.json")).is_err());
}

#[test]
fn test_scheduler_config_from_env() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("scheduler.json");
    std::fs::write(&path, r#"{ "default_page_size": 7 }"#).unwrap();

    std::env::set_var("SCHEDULER_CONFIG", &path);
    std::env::set_var("SCHEDULER_POLL_INTERVAL_MS", "250");
    let config = SchedulerConfig::from_env();
    std::env::remove_var("SCHEDULER_CONFIG");
    std::env::remove_var("SCHEDULER_POLL_INTERVAL_MS");

    let config = config.unwrap();
    assert_eq!(config.default_page_size, 7);
    assert_eq!(config.poll_interval_ms, 250);
}
