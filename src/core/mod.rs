//! Core scheduling abstractions and reservation accounting.

pub mod audit;
pub mod client;
pub mod controller;
pub mod dispatch;
pub mod error;
pub mod framework;
pub mod heap;
pub mod multi_queue;
pub mod permission;
pub mod quantity;
pub mod queue;
pub mod release;
pub mod scheduler;
pub mod unit;

pub use audit::{
    build_audit_event, AuditAction, AuditEvent, AuditSink, InMemoryAuditSink, TracingAuditSink,
};
pub use client::{QuotaLister, ResourceQuota, UnitClient};
pub use controller::Controller;
pub use dispatch::{BoundedDispatcher, Spawn};
pub use error::{AppResult, SchedulerError};
pub use framework::{
    Code, FilterPlugin, Framework, MultiQueueSortPlugin, Plugin, PluginFactory, PluginHandle,
    QueueLessFn, QueueSortPlugin, Registry, ReservePlugin, Status,
};
pub use heap::Heap;
pub use multi_queue::MultiSchedulingQueue;
pub use permission::PermissionCounter;
pub use quantity::{Quantity, ResourceList};
pub use queue::{BackoffPolicy, QueueOptions, SchedulingQueue};
pub use release::{ReleaseHandler, ReleaseRouter};
pub use scheduler::{CycleOutcome, Scheduler, DEQUEUE_MESSAGE};
pub use unit::{
    QueueInfo, QueueSpec, QueueUnit, QueueUnitInfo, UnitKey, UnitPhase, DEFAULT_PRIORITY,
    DEFAULT_QUEUE_NAME, KEY_SEPARATOR,
};
