//! In-memory unit store.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::core::{QueueUnit, SchedulerError, UnitClient};

/// Unit store keeping units in a map, with failure injection for updates.
#[derive(Debug, Default)]
pub struct InMemoryUnitStore {
    units: Mutex<HashMap<String, QueueUnit>>,
    failing_updates: AtomicUsize,
    update_calls: AtomicUsize,
}

impl InMemoryUnitStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace a unit.
    pub fn insert(&self, unit: QueueUnit) {
        self.units.lock().insert(unit.queue_key(), unit);
    }

    /// Remove a unit, returning it if it existed.
    pub fn remove(&self, namespace: &str, name: &str) -> Option<QueueUnit> {
        self.units.lock().remove(&format!("{namespace}/{name}"))
    }

    /// Current copy of a unit.
    #[must_use]
    pub fn unit(&self, namespace: &str, name: &str) -> Option<QueueUnit> {
        self.units.lock().get(&format!("{namespace}/{name}")).cloned()
    }

    /// Make the next `count` updates fail with a client error.
    pub fn fail_next_updates(&self, count: usize) {
        self.failing_updates.store(count, Ordering::SeqCst);
    }

    /// Number of update calls received, failed ones included.
    #[must_use]
    pub fn update_calls(&self) -> usize {
        self.update_calls.load(Ordering::SeqCst)
    }

    /// Number of units held.
    #[must_use]
    pub fn len(&self) -> usize {
        self.units.lock().len()
    }

    /// Whether the store is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.units.lock().is_empty()
    }
}

#[async_trait]
impl UnitClient for InMemoryUnitStore {
    async fn get(&self, namespace: &str, name: &str) -> Result<QueueUnit, SchedulerError> {
        self.unit(namespace, name)
            .ok_or_else(|| SchedulerError::NotFound(format!("{namespace}/{name}")))
    }

    async fn update(&self, unit: &QueueUnit) -> Result<(), SchedulerError> {
        self.update_calls.fetch_add(1, Ordering::SeqCst);
        let injected = self
            .failing_updates
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if injected {
            return Err(SchedulerError::Client(format!(
                "update of {} refused",
                unit.queue_key()
            )));
        }
        let mut units = self.units.lock();
        let key = unit.queue_key();
        if !units.contains_key(&key) {
            return Err(SchedulerError::NotFound(key));
        }
        units.insert(key, unit.clone());
        Ok(())
    }
}
