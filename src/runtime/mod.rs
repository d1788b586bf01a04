//! Runtime adapters and the event API surface.

pub mod api;
pub mod tokio_spawner;

pub use api::{
    apply_queue_event, apply_unit_event, health, list_queues, EventAck, QueueEvent,
    QueueSnapshot, UnitEvent,
};
pub use tokio_spawner::TokioSpawner;
