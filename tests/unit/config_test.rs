//! Tests for configuration validation

use std::collections::HashMap;
use std::time::Duration;

use kube_queue::config::SchedulerConfig;
use kube_queue::core::QueueSpec;

#[test]
fn test_defaults_are_valid() {
    let cfg = SchedulerConfig::default();
    assert!(cfg.validate().is_ok());
    assert_eq!(cfg.initial_backoff_ms, 1_000);
    assert_eq!(cfg.max_backoff_ms, 4_000);
    assert_eq!(cfg.flush_interval_ms, 1_000);
    assert_eq!(cfg.plugins, vec!["Priority", "ResourceQuota"]);
    assert!(cfg.max_inflight_confirmations >= 4);
}

#[test]
fn test_zero_initial_backoff_rejected() {
    let cfg = SchedulerConfig {
        initial_backoff_ms: 0,
        ..SchedulerConfig::default()
    };
    assert!(cfg.validate().is_err());
}

#[test]
fn test_max_below_initial_rejected() {
    let cfg = SchedulerConfig {
        initial_backoff_ms: 5_000,
        max_backoff_ms: 1_000,
        ..SchedulerConfig::default()
    };
    assert!(cfg.validate().unwrap_err().contains("max_backoff_ms"));
}

#[test]
fn test_zero_concurrency_rejected() {
    let cfg = SchedulerConfig {
        max_inflight_confirmations: 0,
        ..SchedulerConfig::default()
    };
    assert!(cfg.validate().is_err());
}

#[test]
fn test_empty_plugins_rejected() {
    let cfg = SchedulerConfig {
        plugins: Vec::new(),
        ..SchedulerConfig::default()
    };
    assert!(cfg.validate().is_err());
}

#[test]
fn test_duplicate_queue_names_rejected() {
    let cfg = SchedulerConfig {
        queues: vec![QueueSpec::new("team-a", 1), QueueSpec::new("team-a", 2)],
        ..SchedulerConfig::default()
    };
    assert!(cfg.validate().unwrap_err().contains("team-a"));
}

#[test]
fn test_from_json_str_applies_defaults() {
    let cfg = SchedulerConfig::from_json_str(
        r#"{
            "max_backoff_ms": 8000,
            "queues": [{"name": "team-a", "priority": 10}],
            "extensions": {"TFJob": "unix:///run/tf.sock"}
        }"#,
    )
    .unwrap();
    assert_eq!(cfg.initial_backoff_ms, 1_000);
    assert_eq!(cfg.max_backoff_ms, 8_000);
    assert_eq!(cfg.queues[0].queue_policy, "Priority");
    assert_eq!(cfg.extensions["TFJob"], "unix:///run/tf.sock");
}

#[test]
fn test_from_json_str_rejects_garbage_and_invalid() {
    assert!(SchedulerConfig::from_json_str("not json")
        .unwrap_err()
        .starts_with("parse error"));
    assert!(SchedulerConfig::from_json_str(r#"{"flush_interval_ms": 0}"#).is_err());
}

#[test]
fn test_from_lookup_overrides() {
    let mut vars = HashMap::new();
    vars.insert("KUBE_QUEUE_INITIAL_BACKOFF_MS", "200");
    vars.insert("KUBE_QUEUE_MAX_BACKOFF_MS", "800");
    vars.insert("KUBE_QUEUE_PLUGINS", "Priority, ResourceQuota ,");
    vars.insert("KUBE_QUEUE_MAX_INFLIGHT_CONFIRMATIONS", "3");

    let cfg = SchedulerConfig::from_lookup(|k| vars.get(k).map(|v| (*v).to_string())).unwrap();
    assert_eq!(cfg.initial_backoff_ms, 200);
    assert_eq!(cfg.max_backoff_ms, 800);
    assert_eq!(cfg.plugins, vec!["Priority", "ResourceQuota"]);
    assert_eq!(cfg.max_inflight_confirmations, 3);

    let options = cfg.queue_options();
    assert_eq!(options.backoff.initial, Duration::from_millis(200));
    assert_eq!(options.backoff.max, Duration::from_millis(800));
}

#[test]
fn test_from_lookup_rejects_bad_number() {
    let err = SchedulerConfig::from_lookup(|k| {
        (k == "KUBE_QUEUE_IDLE_INTERVAL_MS").then(|| "soon".to_string())
    })
    .unwrap_err();
    assert!(err.contains("KUBE_QUEUE_IDLE_INTERVAL_MS"));
}
