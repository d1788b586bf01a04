//! Narrow interfaces to the external systems the scheduler talks to.
//!
//! The object store owning the units, and the quota source, live outside this
//! crate. Implementations must be safe for concurrent use by the scheduler
//! loop and every in-flight confirmation task.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::quantity::ResourceList;
use super::{QueueUnit, SchedulerError};

/// Read/update access to the system of record for units.
#[async_trait]
pub trait UnitClient: Send + Sync {
    /// Fetch the current representation of a unit.
    ///
    /// Must return [`SchedulerError::NotFound`] when the unit is gone.
    async fn get(&self, namespace: &str, name: &str) -> Result<QueueUnit, SchedulerError>;

    /// Persist an updated unit.
    async fn update(&self, unit: &QueueUnit) -> Result<(), SchedulerError>;
}

/// A hard resource limit defined for a namespace.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceQuota {
    /// Quota object name.
    pub name: String,
    /// Namespace the quota applies to.
    pub namespace: String,
    /// Hard limits per resource type; `None` when the quota has no hard section.
    #[serde(default)]
    pub hard: Option<ResourceList>,
}

impl ResourceQuota {
    /// Quota with the given hard limits.
    pub fn new(name: impl Into<String>, namespace: impl Into<String>, hard: ResourceList) -> Self {
        Self {
            name: name.into(),
            namespace: namespace.into(),
            hard: Some(hard),
        }
    }
}

/// Read-only source of quota definitions.
#[async_trait]
pub trait QuotaLister: Send + Sync {
    /// Every quota object defined in `namespace`.
    async fn list(&self, namespace: &str) -> Result<Vec<ResourceQuota>, SchedulerError>;
}
