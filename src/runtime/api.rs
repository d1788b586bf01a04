//! Request/response models of the unit and queue feeds.
//!
//! A feed delivers added, updated and deleted events. These functions route
//! them onto a [`Controller`] and answer with an [`EventAck`]; framing and
//! transport belong to the caller.

use serde::{Deserialize, Serialize};

use crate::core::{Controller, QueueSpec, QueueUnit};

/// Change to a unit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum UnitEvent {
    /// A unit appeared.
    Added {
        /// The unit.
        unit: QueueUnit,
    },
    /// A unit changed.
    Updated {
        /// Previous state.
        old: QueueUnit,
        /// New state.
        new: QueueUnit,
    },
    /// A unit disappeared.
    Deleted {
        /// Last known state.
        unit: QueueUnit,
    },
}

/// Change to a queue definition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum QueueEvent {
    /// A queue was defined.
    Added {
        /// The definition.
        queue: QueueSpec,
    },
    /// A definition changed.
    Updated {
        /// Previous definition.
        old: QueueSpec,
        /// New definition.
        new: QueueSpec,
    },
    /// A queue was removed.
    Deleted {
        /// Queue name.
        name: String,
    },
}

/// Answer to one event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventAck {
    /// Whether the event was applied.
    pub ok: bool,
    /// Why it was not, when it was not.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

impl EventAck {
    /// Applied.
    #[must_use]
    pub const fn accepted() -> Self {
        Self {
            ok: true,
            reason: None,
        }
    }

    /// Not applied, with a reason.
    pub fn rejected(reason: impl Into<String>) -> Self {
        Self {
            ok: false,
            reason: Some(reason.into()),
        }
    }
}

/// Queue snapshot data for listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueSnapshot {
    /// Queue name.
    pub name: String,
    /// Cross-queue priority.
    pub priority: i32,
    /// Sort policy.
    pub queue_policy: String,
    /// Units ready to schedule.
    pub ready: usize,
    /// Units in backoff.
    pub backing_off: usize,
}

/// Health response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Health {
    /// Healthy flag.
    pub ok: bool,
}

/// Route a unit event.
pub async fn apply_unit_event(controller: &Controller, event: UnitEvent) -> EventAck {
    let result = match event {
        UnitEvent::Added { unit } => controller.add_unit(unit).await,
        UnitEvent::Updated { old, new } => controller.update_unit(&old, new).await,
        UnitEvent::Deleted { unit } => {
            controller.delete_unit(&unit).await;
            Ok(())
        }
    };
    result.map_or_else(|e| EventAck::rejected(e.to_string()), |()| EventAck::accepted())
}

/// Route a queue event.
pub fn apply_queue_event(controller: &Controller, event: QueueEvent) -> EventAck {
    let result = match event {
        QueueEvent::Added { queue } => controller.add_queue(queue),
        QueueEvent::Updated { old, new } => controller.update_queue(&old, new),
        QueueEvent::Deleted { name } => {
            if controller.delete_queue(&name) {
                Ok(())
            } else {
                return EventAck::rejected(format!("queue {name} not found"));
            }
        }
    };
    result.map_or_else(|e| EventAck::rejected(e.to_string()), |()| EventAck::accepted())
}

/// Queues in visiting order with their sizes.
#[must_use]
pub fn list_queues(controller: &Controller) -> Vec<QueueSnapshot> {
    controller
        .queues()
        .sorted_queue()
        .iter()
        .map(|queue| QueueSnapshot {
            name: queue.name().to_string(),
            priority: queue.info().priority,
            queue_policy: queue.info().spec.queue_policy.clone(),
            ready: queue.length(),
            backing_off: queue.backoff_len(),
        })
        .collect()
}

/// Return a health payload.
#[must_use]
pub const fn health() -> Health {
    Health { ok: true }
}
