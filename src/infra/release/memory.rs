//! Release handler that records what it was asked to do.

use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::core::{QueueUnit, ReleaseHandler, SchedulerError};

/// Records released and dequeued unit keys; can be switched to failing.
#[derive(Debug, Default)]
pub struct RecordingReleaseHandler {
    released: Mutex<Vec<String>>,
    dequeued: Mutex<Vec<String>>,
    failing: AtomicBool,
}

impl RecordingReleaseHandler {
    /// Create a handler with nothing recorded.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every later call fail.
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// Keys of released units, in call order.
    #[must_use]
    pub fn released(&self) -> Vec<String> {
        self.released.lock().clone()
    }

    /// Keys of dequeued units, in call order.
    #[must_use]
    pub fn dequeued(&self) -> Vec<String> {
        self.dequeued.lock().clone()
    }

    fn check(&self, unit: &QueueUnit) -> Result<(), SchedulerError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(SchedulerError::Client(format!(
                "release handler refused {}",
                unit.queue_key()
            )));
        }
        Ok(())
    }
}

#[async_trait]
impl ReleaseHandler for RecordingReleaseHandler {
    async fn release(&self, unit: &QueueUnit) -> Result<(), SchedulerError> {
        self.check(unit)?;
        self.released.lock().push(unit.queue_key());
        Ok(())
    }

    async fn dequeue(&self, unit: &QueueUnit) -> Result<(), SchedulerError> {
        self.check(unit)?;
        self.dequeued.lock().push(unit.queue_key());
        Ok(())
    }
}
