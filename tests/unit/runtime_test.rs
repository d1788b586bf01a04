//! Tests for the tokio spawner and the event API

use std::sync::Arc;

use kube_queue::core::{Controller, Spawn};
use kube_queue::core::{QueueSpec, QueueUnit, UnitPhase};
use kube_queue::runtime::{
    apply_queue_event, apply_unit_event, health, list_queues, EventAck, QueueEvent, UnitEvent,
};
use kube_queue::runtime::tokio_spawner::TokioSpawner;

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_tokio_spawner_spawn() {
    let spawner = TokioSpawner::new(tokio::runtime::Handle::current());

    let (tx, rx) = tokio::sync::oneshot::channel();
    spawner.spawn(async move {
        tx.send(123).unwrap();
    });

    let result = rx.await.expect("oneshot result");
    assert_eq!(result, 123);
}

#[test]
fn test_current_outside_runtime_fails() {
    assert!(TokioSpawner::current().is_err());
}

fn controller() -> Controller {
    let parts = kube_queue::builders::SchedulerBuilder::new(
        kube_queue::config::SchedulerConfig::default(),
        TokioSpawner::current().unwrap(),
    )
    .unit_client(Arc::new(kube_queue::infra::InMemoryUnitStore::new()))
    .quota_lister(Arc::new(kube_queue::infra::InMemoryQuotaLister::new()))
    .build()
    .unwrap();
    parts.controller
}

#[tokio::test]
async fn test_unit_events_route_to_queue() {
    let controller = controller();
    let ack = apply_queue_event(
        &controller,
        QueueEvent::Added {
            queue: QueueSpec::new("team-a", 1),
        },
    );
    assert_eq!(ack, EventAck::accepted());

    let unit = QueueUnit::new("team-a", "job", "TFJob").with_queue("team-a");
    let ack = apply_unit_event(&controller, UnitEvent::Added { unit: unit.clone() }).await;
    assert!(ack.ok);

    let dup = apply_unit_event(&controller, UnitEvent::Added { unit: unit.clone() }).await;
    assert!(!dup.ok);
    assert!(dup.reason.unwrap().contains("duplicate key"));

    let snapshot = list_queues(&controller);
    assert_eq!(snapshot[0].ready, 1);

    let ack = apply_unit_event(&controller, UnitEvent::Deleted { unit }).await;
    assert!(ack.ok);
    assert_eq!(list_queues(&controller)[0].ready, 0);
}

#[tokio::test]
async fn test_unit_for_unknown_queue_is_rejected() {
    let controller = controller();
    let unit = QueueUnit::new("ns", "job", "TFJob").with_queue("nowhere");
    let ack = apply_unit_event(&controller, UnitEvent::Added { unit }).await;
    assert!(!ack.ok);
    assert!(ack.reason.unwrap().contains("nowhere"));
}

#[tokio::test]
async fn test_queue_events() {
    let controller = controller();
    let spec = QueueSpec::new("team-a", 1);
    assert!(apply_queue_event(&controller, QueueEvent::Added { queue: spec.clone() }).ok);
    let ack = apply_queue_event(
        &controller,
        QueueEvent::Updated {
            old: spec,
            new: QueueSpec::new("team-a", 9),
        },
    );
    assert!(ack.ok);
    assert_eq!(list_queues(&controller)[0].priority, 9);

    assert!(apply_queue_event(&controller, QueueEvent::Deleted { name: "team-a".into() }).ok);
    assert!(!apply_queue_event(&controller, QueueEvent::Deleted { name: "team-a".into() }).ok);
}

#[test]
fn test_event_wire_format() {
    let json = r#"{"type":"added","unit":{
        "namespace":"ns","name":"a","job_type":"TFJob","phase":"Dequeued"
    }}"#;
    let event: UnitEvent = serde_json::from_str(json).unwrap();
    match event {
        UnitEvent::Added { unit } => assert_eq!(unit.phase, UnitPhase::Dequeued),
        other => panic!("unexpected {other:?}"),
    }
    let ack = serde_json::to_string(&EventAck::rejected("nope")).unwrap();
    assert_eq!(ack, r#"{"ok":false,"reason":"nope"}"#);
    assert!(health().ok);
}
