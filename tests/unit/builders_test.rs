//! Tests for builder modules

use std::collections::HashMap;
use std::sync::Arc;

use kube_queue::builders::SchedulerBuilder;
use kube_queue::config::SchedulerConfig;
use kube_queue::core::{QueueSpec, ReleaseHandler, SchedulerError};
use kube_queue::infra::{InMemoryQuotaLister, InMemoryUnitStore, RecordingReleaseHandler};
use kube_queue::runtime::TokioSpawner;
use parking_lot::Mutex;

fn builder(config: SchedulerConfig) -> SchedulerBuilder<TokioSpawner> {
    SchedulerBuilder::new(config, TokioSpawner::current().unwrap())
        .unit_client(Arc::new(InMemoryUnitStore::new()))
        .quota_lister(Arc::new(InMemoryQuotaLister::new()))
}

#[tokio::test]
async fn test_build_registers_configured_queues() {
    let config = SchedulerConfig {
        queues: vec![QueueSpec::new("team-a", 10), QueueSpec::new("team-b", 5)],
        max_inflight_confirmations: 3,
        ..SchedulerConfig::default()
    };
    let parts = builder(config).build().unwrap();
    assert_eq!(parts.scheduler.queues().names(), vec!["team-a", "team-b"]);
    assert_eq!(parts.scheduler.dispatcher().limit(), 3);
    assert_eq!(parts.controller.queues().len(), 2);
}

#[tokio::test]
async fn test_missing_client_is_config_error() {
    let result = SchedulerBuilder::new(SchedulerConfig::default(), TokioSpawner::current().unwrap())
        .quota_lister(Arc::new(InMemoryQuotaLister::new()))
        .build();
    assert!(matches!(result, Err(SchedulerError::Config(_))));
}

#[tokio::test]
async fn test_unknown_plugin_is_fatal() {
    let config = SchedulerConfig {
        plugins: vec!["Priority".into(), "Gang".into()],
        ..SchedulerConfig::default()
    };
    let err = builder(config).build().unwrap_err();
    assert!(err.to_string().contains("Gang"));
}

#[tokio::test]
async fn test_missing_multi_queue_sort_is_fatal() {
    let config = SchedulerConfig {
        plugins: vec!["ResourceQuota".into()],
        ..SchedulerConfig::default()
    };
    let err = builder(config).build().unwrap_err();
    assert!(err.to_string().contains("multi-queue sort"));
}

#[tokio::test]
async fn test_unknown_queue_policy_is_fatal() {
    let mut spec = QueueSpec::new("team-a", 1);
    spec.queue_policy = "Fair".into();
    let config = SchedulerConfig {
        queues: vec![spec],
        ..SchedulerConfig::default()
    };
    assert!(matches!(builder(config).build(), Err(SchedulerError::Config(_))));

    let config = SchedulerConfig {
        default_queue_policy: "Fair".into(),
        ..SchedulerConfig::default()
    };
    assert!(builder(config).build().is_err());
}

#[tokio::test]
async fn test_invalid_config_is_rejected_before_wiring() {
    let config = SchedulerConfig {
        flush_interval_ms: 0,
        ..SchedulerConfig::default()
    };
    let err = builder(config).build().unwrap_err();
    assert!(err.to_string().contains("config invalid"));
}

fn with_extensions() -> SchedulerConfig {
    SchedulerConfig {
        extensions: HashMap::from([("TFJob".to_string(), "tf-operator:8080".to_string())]),
        ..SchedulerConfig::default()
    }
}

#[tokio::test]
async fn test_extensions_without_connector_are_rejected() {
    let err = builder(with_extensions()).build().unwrap_err();
    assert!(matches!(err, SchedulerError::Config(ref m) if m.contains("extensions")));
}

#[tokio::test]
async fn test_extensions_are_connected_per_job_type() {
    let connected = Arc::new(Mutex::new(Vec::new()));
    let seen = Arc::clone(&connected);
    let parts = builder(with_extensions())
        .release_connector(move |job_type, address| {
            seen.lock().push((job_type.to_string(), address.to_string()));
            Ok(Arc::new(RecordingReleaseHandler::new()) as Arc<dyn ReleaseHandler>)
        })
        .build()
        .unwrap();

    assert_eq!(
        *connected.lock(),
        vec![("TFJob".to_string(), "tf-operator:8080".to_string())]
    );
    let router = parts.scheduler.release_router().unwrap();
    assert!(router.handler_for("TFJob").is_some());
    assert!(router.handler_for("PyTorchJob").is_none());
}

#[tokio::test]
async fn test_connector_failure_is_returned() {
    let err = builder(with_extensions())
        .release_connector(|_, address| {
            Err(SchedulerError::Client(format!("cannot reach {address}")))
        })
        .build()
        .unwrap_err();
    assert!(err.to_string().contains("tf-operator:8080"));
}
