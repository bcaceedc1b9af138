//! Tests for audit sink

use chrono::Utc;
use prometheus_group_scheduler::core::{
    build_audit_event, AuditAction, AuditSink, InMemoryAuditSink, TaskId,
};

#[test]
fn test_in_memory_audit_sink() {
    let sink = InMemoryAuditSink::new(10);
    let task = TaskId::from("task1");

    let event = build_audit_event(
        &task,
        "group1",
        AuditAction::Submit,
        Utc::now(),
        Some("payload".to_string()),
    );

    sink.record(event.clone());
    assert_eq!(sink.events().len(), 1);

    let events = sink.events();
    assert_eq!(events[0], event);
    assert_eq!(events[0].task_id, task);
    assert_eq!(events[0].action, AuditAction::Submit);
}

#[test]
fn test_audit_sink_overflow() {
    let sink = InMemoryAuditSink::new(2);
    let now = Utc::now();

    for id in ["task1", "task2", "task3"] {
        sink.record(build_audit_event(
            &TaskId::from(id),
            "group1",
            AuditAction::Submit,
            now,
            None,
        ));
    }

    let events = sink.events();
    assert_eq!(events.len(), 2);
    assert_eq!(events[0].task_id, TaskId::from("task2")); // First one popped
    assert_eq!(events[1].task_id, TaskId::from("task3"));
}

#[test]
fn test_actions_for_filters_by_task_and_clones_share_buffer() {
    let sink = InMemoryAuditSink::new(16);
    let observer = sink.clone();
    let a = TaskId::from("a");
    let b = TaskId::from("b");
    let now = Utc::now();

    sink.record(build_audit_event(&a, "g", AuditAction::Submit, now, None));
    sink.record(build_audit_event(&b, "g", AuditAction::Submit, now, None));
    sink.record(build_audit_event(&a, "g", AuditAction::Cancel, now, None));

    assert_eq!(
        observer.actions_for(&a),
        vec![AuditAction::Submit, AuditAction::Cancel]
    );
    assert_eq!(observer.actions_for(&b), vec![AuditAction::Submit]);
}

#[test]
fn test_build_audit_event() {
    let now = Utc::now();
    let event = build_audit_event(
        &TaskId::from("task1"),
        "group1",
        AuditAction::Retry,
        now,
        Some("successor".to_string()),
    );

    assert!(!event.event_id.is_empty());
    assert_eq!(event.group, "group1");
    assert_eq!(event.action.to_string(), "retry");
    assert_eq!(event.detail, Some("successor".to_string()));
    assert_eq!(event.created_at, now);
    let json = serde_json::to_value(&event).unwrap();
    assert_eq!(json["action"], "retry");
}
