//! Tests for error types

use kube_queue::core::SchedulerError;

#[test]
fn test_duplicate_key_error() {
    let err = SchedulerError::DuplicateKey("ns/job".to_string());
    assert_eq!(format!("{err}"), "duplicate key: ns/job");
}

#[test]
fn test_empty_error() {
    assert_eq!(format!("{}", SchedulerError::Empty), "heap is empty");
}

#[test]
fn test_not_found_is_distinguishable() {
    assert!(SchedulerError::NotFound("ns/job".into()).is_not_found());
    assert!(!SchedulerError::Client("timeout".into()).is_not_found());
    assert!(!SchedulerError::Empty.is_not_found());
}

#[test]
fn test_backend_error() {
    let err = SchedulerError::Backend("connection failed".to_string());
    assert_eq!(format!("{err}"), "backend error: connection failed");
}

#[test]
fn test_key_parse_error() {
    let err = SchedulerError::KeyParse("a/b".to_string());
    assert_eq!(format!("{err}"), "failed to parse key: a/b");
}

#[test]
fn test_converts_into_anyhow() {
    fn fails() -> kube_queue::core::AppResult<()> {
        Err(SchedulerError::Config("no multi-queue sort plugin enabled".into()).into())
    }
    let err = fails().unwrap_err();
    assert!(err.to_string().contains("multi-queue sort"));
    assert!(err.downcast_ref::<SchedulerError>().is_some());
}
