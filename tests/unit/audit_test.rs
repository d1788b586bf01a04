//! Tests for audit sinks

use kube_queue::core::{
    build_audit_event, AuditAction, AuditSink, InMemoryAuditSink, TracingAuditSink,
};

#[test]
fn test_in_memory_sink_is_bounded() {
    let sink = InMemoryAuditSink::new(2);
    sink.record(build_audit_event("ns/a", "ns", AuditAction::Enqueue, None));
    sink.record(build_audit_event("ns/a", "ns", AuditAction::Backoff, Some("no room".into())));
    sink.record(build_audit_event("ns/a", "ns", AuditAction::Dequeue, None));

    let events = sink.events();
    assert_eq!(events.len(), 2);
    assert_eq!(events[0].action, AuditAction::Backoff);
    assert_eq!(events[0].message.as_deref(), Some("no room"));
    assert_eq!(events[1].action, AuditAction::Dequeue);
}

#[test]
fn test_events_have_unique_ids() {
    let a = build_audit_event("ns/a", "ns", AuditAction::Enqueue, None);
    let b = build_audit_event("ns/a", "ns", AuditAction::Enqueue, None);
    assert_ne!(a.event_id, b.event_id);
    assert!(a.created_at_ms > 0);
}

#[test]
fn test_events_for_filters_by_unit() {
    let sink = InMemoryAuditSink::new(16);
    sink.record(build_audit_event("ns/a", "ns", AuditAction::Enqueue, None));
    sink.record(build_audit_event("ns/b", "ns", AuditAction::Enqueue, None));
    sink.record(build_audit_event("ns/a", "ns", AuditAction::Discard, None));
    let actions: Vec<AuditAction> = sink.events_for("ns/a").iter().map(|e| e.action).collect();
    assert_eq!(actions, vec![AuditAction::Enqueue, AuditAction::Discard]);
}

#[test]
fn test_action_serializes_snake_case() {
    let event = build_audit_event("ns/a", "ns", AuditAction::Backoff, None);
    let json = serde_json::to_string(&event).unwrap();
    assert!(json.contains("\"action\":\"backoff\""));
    assert_eq!(AuditAction::Release.to_string(), "release");
}

#[test]
fn test_tracing_sink_accepts_events() {
    TracingAuditSink.record(build_audit_event("ns/a", "ns", AuditAction::Release, None));
}
