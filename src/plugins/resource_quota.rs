//! Quota-aware admission: filter against namespace quotas and keep a ledger
//! of resources reserved for admitted but not yet confirmed units.
//!
//! Resource types requested by a unit but absent from the selected quota are
//! not checked.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use tracing::{debug, warn};

use crate::core::client::{QuotaLister, ResourceQuota};
use crate::core::quantity::{add_resources, sub_resources, Quantity, ResourceList};
use crate::core::{FilterPlugin, Plugin, QueueUnitInfo, ReservePlugin, SchedulerError, Status};

/// Registry name of the resource quota plugin.
pub const NAME: &str = "ResourceQuota";

#[derive(Debug, Default)]
struct Ledger {
    /// namespace -> cumulative reserved quantities
    reserved: HashMap<String, ResourceList>,
    /// unit keys currently holding a reservation
    records: HashSet<String>,
}

/// Filter + reserve plugin backed by namespace quotas.
pub struct ResourceQuotaPlugin {
    quotas: Arc<dyn QuotaLister>,
    ledger: Mutex<Ledger>,
}

impl std::fmt::Debug for ResourceQuotaPlugin {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResourceQuotaPlugin")
            .field("ledger", &*self.ledger.lock())
            .finish_non_exhaustive()
    }
}

impl ResourceQuotaPlugin {
    /// Create a plugin with an empty ledger.
    pub fn new(quotas: Arc<dyn QuotaLister>) -> Self {
        Self {
            quotas,
            ledger: Mutex::new(Ledger::default()),
        }
    }

    /// Reserved quantity of `resource` in `namespace`, zero if none.
    #[must_use]
    pub fn reserved_by_resource_name(&self, namespace: &str, resource: &str) -> Quantity {
        self.ledger
            .lock()
            .reserved
            .get(namespace)
            .and_then(|list| list.get(resource))
            .copied()
            .unwrap_or_default()
    }

    /// Snapshot of everything reserved in `namespace`.
    #[must_use]
    pub fn reserved_for(&self, namespace: &str) -> ResourceList {
        self.ledger
            .lock()
            .reserved
            .get(namespace)
            .cloned()
            .unwrap_or_default()
    }

    /// Whether the unit with this `namespace/name` key holds a reservation.
    #[must_use]
    pub fn is_reserved(&self, key: &str) -> bool {
        self.ledger.lock().records.contains(key)
    }
}

/// Pick the quota that governs `namespace`.
///
/// A single quota is used as is; among several, the one named like the
/// namespace wins.
///
/// # Errors
///
/// [`SchedulerError::NotFound`] when there is no quota, or no proper one
/// among several.
pub fn select_resource_quota<'a>(
    quotas: &'a [ResourceQuota],
    namespace: &str,
) -> Result<&'a ResourceQuota, SchedulerError> {
    match quotas {
        [] => Err(SchedulerError::NotFound(format!(
            "found 0 resource quota in ns: {namespace}, expecting more than 0"
        ))),
        [only] => Ok(only),
        many => many.iter().find(|q| q.name == namespace).ok_or_else(|| {
            SchedulerError::NotFound(format!(
                "cannot find proper resource quota in namespace {namespace}"
            ))
        }),
    }
}

impl Plugin for ResourceQuotaPlugin {
    fn name(&self) -> &str {
        NAME
    }

    fn as_filter(self: Arc<Self>) -> Option<Arc<dyn FilterPlugin>> {
        Some(self)
    }

    fn as_reserve(self: Arc<Self>) -> Option<Arc<dyn ReservePlugin>> {
        Some(self)
    }
}

#[async_trait]
impl FilterPlugin for ResourceQuotaPlugin {
    async fn filter(&self, unit: &QueueUnitInfo) -> Status {
        let namespace = unit.unit.namespace.as_str();
        let quotas = match self.quotas.list(namespace).await {
            Ok(quotas) => quotas,
            Err(e) => return Status::error(e.to_string()),
        };
        let basket = match select_resource_quota(&quotas, namespace) {
            Ok(basket) => basket,
            Err(e) => return Status::error(e.to_string()),
        };
        let Some(hard) = basket.hard.as_ref() else {
            return Status::error(format!(
                "cannot find hard limit in the status of resource quota {}",
                basket.name
            ));
        };

        let ledger = self.ledger.lock();
        let reserved = ledger.reserved.get(namespace);
        for (resource, requested) in &unit.unit.resource {
            let Some(limit) = hard.get(resource) else {
                continue;
            };
            let already = reserved
                .and_then(|list| list.get(resource))
                .copied()
                .unwrap_or_default();
            let Some(wanted) = already.checked_add(*requested) else {
                return Status::error(format!(
                    "request {requested} for {resource} overflows reserved {already} \
                     in resource quota {}",
                    basket.name
                ));
            };
            if wanted > *limit {
                return Status::error(format!(
                    "insufficient resource left for {resource} in resource quota {} \
                     reserved {wanted}/{limit}, request {requested}",
                    basket.name
                ));
            }
        }
        Status::success()
    }
}

#[async_trait]
impl ReservePlugin for ResourceQuotaPlugin {
    async fn reserve(&self, unit: &QueueUnitInfo) -> Status {
        let mut ledger = self.ledger.lock();
        if ledger.records.contains(&unit.key) {
            return Status::error(format!("queue unit {} already reserved", unit.key));
        }
        let namespace = unit.unit.namespace.clone();
        add_resources(
            ledger.reserved.entry(namespace).or_default(),
            &unit.unit.resource,
        );
        ledger.records.insert(unit.key.clone());
        debug!(unit = %unit.key, "resources reserved");
        Status::success()
    }

    async fn unreserve(&self, unit: &QueueUnitInfo) -> Status {
        let mut ledger = self.ledger.lock();
        if !ledger.records.remove(&unit.key) {
            return Status::success();
        }
        let namespace = unit.unit.namespace.as_str();
        match ledger.reserved.get_mut(namespace) {
            Some(list) => {
                sub_resources(list, &unit.unit.resource);
                if list.is_empty() {
                    ledger.reserved.remove(namespace);
                }
            }
            None => warn!(unit = %unit.key, "reservation record without namespace totals"),
        }
        debug!(unit = %unit.key, "resources released");
        Status::success()
    }
}
