//! Tests for error types

use prometheus_group_scheduler::core::{AppResult, SchedulerError, TaskId, TaskStatus};

#[test]
fn test_not_found_error() {
    let err = SchedulerError::task_not_found("reports", &TaskId::from("t1"));
    assert_eq!(format!("{}", err), "not found: task t1 in group reports");
}

#[test]
fn test_conflict_error() {
    let err = SchedulerError::Conflict {
        id: TaskId::from("t1"),
        status: TaskStatus::Cancelled,
    };
    assert_eq!(format!("{}", err), "conflict: task t1 is cancelled");
    assert!(err.is_conflict());
}

#[test]
fn test_invalid_argument_error() {
    let err = SchedulerError::InvalidArgument("bad cursor".to_string());
    assert_eq!(format!("{}", err), "invalid argument: bad cursor");
    assert!(!err.is_conflict());
}

#[test]
fn test_backend_error() {
    let err = SchedulerError::Backend("connection failed".to_string());
    assert_eq!(format!("{}", err), "backend error: connection failed");
}

#[test]
fn test_io_error_maps_to_backend() {
    let io = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied");
    let err: SchedulerError = io.into();
    assert!(matches!(err, SchedulerError::Backend(_)));
}

#[test]
fn test_app_result_wraps_scheduler_errors() {
    fn lookup() -> AppResult<()> {
        let missing: Result<(), SchedulerError> = Err(SchedulerError::NotFound("group x".into()));
        missing?;
        Ok(())
    }
    let err = lookup().unwrap_err();
    assert!(matches!(
        err.downcast_ref::<SchedulerError>(),
        Some(SchedulerError::NotFound(_))
    ));
}
