//! Tests for utility functions and shared task types

use std::time::Duration;

use chrono::DateTime;
use prometheus_group_scheduler::core::{Priority, Task, TaskId, TaskStatus};
use prometheus_group_scheduler::util::{init_tracing, Clock, ManualClock, MonotonicClock};

#[test]
fn test_priority_ordering() {
    assert!(Priority::High > Priority::Normal);
    assert!(Priority::Normal > Priority::Low);
    assert_eq!(Priority::default(), Priority::Low);
}

#[test]
fn test_priority_wire_format() {
    assert_eq!(serde_json::to_string(&Priority::High).unwrap(), "2");
    assert_eq!(
        serde_json::from_str::<Priority>("1").unwrap(),
        Priority::Normal
    );
    assert!(serde_json::from_str::<Priority>("3").is_err());
}

#[test]
fn test_task_id() {
    let id = TaskId::generate();
    assert!(!id.as_str().is_empty());
    assert_ne!(id, TaskId::generate());
    assert_eq!(TaskId::from("abc").to_string(), "abc");
}

#[test]
fn test_task_wire_format() {
    let created = DateTime::from_timestamp(1_700_000_000, 0).unwrap();
    let task = Task::new("g", "img", created).with_delay(10);
    let json = serde_json::to_value(&task).unwrap();
    assert_eq!(json["status"], "delayed");
    assert_eq!(json["group_name"], "g");
    assert!(json.get("reason").is_none());
    assert_eq!(task.status, TaskStatus::Delayed);
}

#[test]
fn test_manual_clock() {
    let start = DateTime::from_timestamp(1_700_000_000, 0).unwrap();
    let clock = ManualClock::starting_at(start);
    clock.advance(Duration::from_millis(1_500));
    assert_eq!((clock.now() - start).num_milliseconds(), 1_500);
}

#[tokio::test(start_paused = true)]
async fn test_monotonic_clock_never_goes_backwards() {
    let clock = MonotonicClock::default();
    let mut last = clock.now();
    for _ in 0..5 {
        tokio::time::sleep(Duration::from_millis(10)).await;
        let now = clock.now();
        assert!(now >= last);
        last = now;
    }
}

#[test]
fn test_init_tracing_is_idempotent() {
    init_tracing();
    init_tracing();
    tracing::info!("tracing initialised twice without panicking");
}
