//! In-memory quota source.

use std::collections::HashMap;

use async_trait::async_trait;
use parking_lot::RwLock;

use crate::core::{QuotaLister, ResourceQuota, SchedulerError};

/// Quotas per namespace, editable at runtime.
#[derive(Debug, Default)]
pub struct InMemoryQuotaLister {
    quotas: RwLock<HashMap<String, Vec<ResourceQuota>>>,
}

impl InMemoryQuotaLister {
    /// Create an empty lister.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a quota, replacing one with the same name in its namespace.
    pub fn set(&self, quota: ResourceQuota) {
        let mut quotas = self.quotas.write();
        let list = quotas.entry(quota.namespace.clone()).or_default();
        match list.iter_mut().find(|q| q.name == quota.name) {
            Some(existing) => *existing = quota,
            None => list.push(quota),
        }
    }

    /// Remove a quota. Returns whether it existed.
    pub fn remove(&self, namespace: &str, name: &str) -> bool {
        let mut quotas = self.quotas.write();
        let Some(list) = quotas.get_mut(namespace) else {
            return false;
        };
        let before = list.len();
        list.retain(|q| q.name != name);
        before != list.len()
    }
}

#[async_trait]
impl QuotaLister for InMemoryQuotaLister {
    async fn list(&self, namespace: &str) -> Result<Vec<ResourceQuota>, SchedulerError> {
        Ok(self.quotas.read().get(namespace).cloned().unwrap_or_default())
    }
}
