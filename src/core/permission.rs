//! Per-namespace admission counter.
//!
//! Tracks registered jobs per namespace and grants permission to a job when
//! the resources already held by dequeued jobs plus its own request fit in
//! the namespace's `default` quota. Only `cpu` and `memory` are taken from
//! the quota; any other requested resource type is refused.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::warn;

use super::client::QuotaLister;
use super::quantity::{add_resources, Quantity, ResourceList};
use super::{SchedulerError, UnitPhase};

/// Name of the quota consulted for permissions.
pub const PERMISSION_QUOTA_NAME: &str = "default";

const COUNTED_RESOURCES: [&str; 2] = ["cpu", "memory"];

#[derive(Debug, Clone)]
struct JobRecord {
    name: String,
    resource: ResourceList,
    phase: UnitPhase,
}

/// Counts resources of dequeued jobs against namespace quotas.
pub struct PermissionCounter {
    quotas: Arc<dyn QuotaLister>,
    jobs: Mutex<HashMap<String, HashMap<String, JobRecord>>>,
}

impl std::fmt::Debug for PermissionCounter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PermissionCounter")
            .field("namespaces", &self.jobs.lock().len())
            .finish_non_exhaustive()
    }
}

impl PermissionCounter {
    /// Counter with no registered jobs.
    pub fn new(quotas: Arc<dyn QuotaLister>) -> Self {
        Self {
            quotas,
            jobs: Mutex::new(HashMap::new()),
        }
    }

    /// Register or replace a job.
    pub fn register_job(
        &self,
        name: impl Into<String>,
        namespace: impl Into<String>,
        id: impl Into<String>,
        resource: ResourceList,
        phase: UnitPhase,
    ) {
        self.jobs.lock().entry(namespace.into()).or_default().insert(
            id.into(),
            JobRecord {
                name: name.into(),
                resource,
                phase,
            },
        );
    }

    /// Forget a job. Unknown jobs are ignored.
    pub fn unregister_job(&self, namespace: &str, id: &str) {
        let mut jobs = self.jobs.lock();
        if let Some(set) = jobs.get_mut(namespace) {
            set.remove(id);
            if set.is_empty() {
                jobs.remove(namespace);
            }
        }
    }

    /// Count the job's resources as held from now on.
    ///
    /// Returns `false` when the job is not registered.
    pub fn mark_job_dequeued(&self, namespace: &str, id: &str) -> bool {
        self.jobs
            .lock()
            .get_mut(namespace)
            .and_then(|set| set.get_mut(id))
            .is_some_and(|job| {
                job.phase = UnitPhase::Dequeued;
                true
            })
    }

    /// Sum of resources held by dequeued jobs in `namespace`.
    #[must_use]
    pub fn reserved(&self, namespace: &str) -> ResourceList {
        let jobs = self.jobs.lock();
        let mut reserved = ResourceList::new();
        for job in jobs.get(namespace).into_iter().flat_map(HashMap::values) {
            if job.phase == UnitPhase::Dequeued {
                add_resources(&mut reserved, &job.resource);
            }
        }
        reserved
    }

    /// Whether the job may start.
    ///
    /// An unregistered job requests nothing and is granted as long as the
    /// quota exists.
    ///
    /// # Errors
    ///
    /// Whatever the quota lister returns. A missing `default` quota is a
    /// refusal, not an error.
    pub async fn if_permission_granted(
        &self,
        namespace: &str,
        id: &str,
    ) -> Result<bool, SchedulerError> {
        let quotas = self.quotas.list(namespace).await?;
        let Some(quota) = quotas.iter().find(|q| q.name == PERMISSION_QUOTA_NAME) else {
            warn!(%namespace, "failed to get default resource quota");
            return Ok(false);
        };
        let hard = quota.hard.clone().unwrap_or_default();
        let total: ResourceList = COUNTED_RESOURCES
            .iter()
            .map(|name| {
                (
                    (*name).to_string(),
                    hard.get(*name).copied().unwrap_or_default(),
                )
            })
            .collect();

        let requested = self
            .jobs
            .lock()
            .get(namespace)
            .and_then(|set| set.get(id))
            .map(|job| job.resource.clone())
            .unwrap_or_default();
        let reserved = self.reserved(namespace);
        Ok(enough_resource(&requested, &reserved, &total))
    }

    /// Registered job name, if any.
    #[must_use]
    pub fn job_name(&self, namespace: &str, id: &str) -> Option<String> {
        self.jobs
            .lock()
            .get(namespace)
            .and_then(|set| set.get(id))
            .map(|job| job.name.clone())
    }
}

fn enough_resource(request: &ResourceList, reserved: &ResourceList, quota: &ResourceList) -> bool {
    request.iter().all(|(name, wanted)| {
        // types not in the quota are prohibited
        let Some(limit) = quota.get(name) else {
            return false;
        };
        let held = reserved.get(name).copied().unwrap_or(Quantity::ZERO);
        (*limit - held - *wanted).signum() >= 0
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::client::ResourceQuota;
    use crate::core::quantity::resource_list;
    use crate::infra::InMemoryQuotaLister;

    fn counter(cpu: &str, memory: &str) -> PermissionCounter {
        let quotas = InMemoryQuotaLister::new();
        quotas.set(ResourceQuota::new(
            PERMISSION_QUOTA_NAME,
            "ns",
            resource_list([("cpu", cpu), ("memory", memory), ("pods", "10")]).unwrap(),
        ));
        PermissionCounter::new(Arc::new(quotas))
    }

    fn req(cpu: &str) -> ResourceList {
        resource_list([("cpu", cpu), ("memory", "1Gi")]).unwrap()
    }

    #[tokio::test]
    async fn test_only_dequeued_jobs_hold_resources() {
        let c = counter("4", "8Gi");
        c.register_job("a", "ns", "uid-a", req("3"), UnitPhase::Enqueued);
        c.register_job("b", "ns", "uid-b", req("2"), UnitPhase::Enqueued);
        assert!(c.if_permission_granted("ns", "uid-b").await.unwrap());

        assert!(c.mark_job_dequeued("ns", "uid-a"));
        assert!(!c.if_permission_granted("ns", "uid-b").await.unwrap());

        c.unregister_job("ns", "uid-a");
        assert!(c.if_permission_granted("ns", "uid-b").await.unwrap());
        assert_eq!(c.job_name("ns", "uid-b").as_deref(), Some("b"));
    }

    #[tokio::test]
    async fn test_resource_type_outside_counted_set_is_refused() {
        let c = counter("4", "8Gi");
        let resource = resource_list([("pods", "1")]).unwrap();
        c.register_job("a", "ns", "uid-a", resource, UnitPhase::Enqueued);
        assert!(!c.if_permission_granted("ns", "uid-a").await.unwrap());
    }

    #[tokio::test]
    async fn test_missing_default_quota_refuses() {
        let c = PermissionCounter::new(Arc::new(InMemoryQuotaLister::new()));
        c.register_job("a", "ns", "uid-a", req("1"), UnitPhase::Enqueued);
        assert!(!c.if_permission_granted("ns", "uid-a").await.unwrap());
    }

    #[test]
    fn test_register_replaces_and_reserved_sums() {
        let c = counter("4", "8Gi");
        c.register_job("a", "ns", "uid-a", req("1"), UnitPhase::Dequeued);
        c.register_job("a", "ns", "uid-a", req("2"), UnitPhase::Dequeued);
        c.register_job("b", "ns", "uid-b", req("500m"), UnitPhase::Dequeued);
        assert_eq!(c.reserved("ns")["cpu"], "2500m".parse().unwrap());
        assert!(!c.mark_job_dequeued("ns", "ghost"));
    }
}
