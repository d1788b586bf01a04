//! Downstream release notification.
//!
//! Once a unit is admitted, the component owning the gated job for that job
//! type can be told to unblock it. Handlers are looked up by job type.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tracing::debug;

use super::{QueueUnit, SchedulerError};

/// Job-type specific endpoint that unblocks gated jobs.
#[async_trait]
pub trait ReleaseHandler: Send + Sync {
    /// Let the job behind `unit` start.
    async fn release(&self, unit: &QueueUnit) -> Result<(), SchedulerError>;

    /// Tell the handler the unit left its queue.
    async fn dequeue(&self, unit: &QueueUnit) -> Result<(), SchedulerError>;
}

/// Map from job type to its release handler.
#[derive(Clone, Default)]
pub struct ReleaseRouter {
    handlers: HashMap<String, Arc<dyn ReleaseHandler>>,
}

impl std::fmt::Debug for ReleaseRouter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut job_types: Vec<&String> = self.handlers.keys().collect();
        job_types.sort();
        f.debug_struct("ReleaseRouter")
            .field("job_types", &job_types)
            .finish()
    }
}

impl ReleaseRouter {
    /// Router with no handlers.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a router from `job type → address` pairs, creating one handler
    /// per address with `connect`.
    ///
    /// # Errors
    ///
    /// The first error returned by `connect`.
    pub fn from_extensions<F>(
        extensions: &HashMap<String, String>,
        mut connect: F,
    ) -> Result<Self, SchedulerError>
    where
        F: FnMut(&str, &str) -> Result<Arc<dyn ReleaseHandler>, SchedulerError>,
    {
        let mut router = Self::new();
        for (job_type, address) in extensions {
            router.register(job_type.clone(), connect(job_type, address)?);
        }
        Ok(router)
    }

    /// Route `job_type` to `handler`, replacing any previous handler.
    pub fn register(&mut self, job_type: impl Into<String>, handler: Arc<dyn ReleaseHandler>) {
        self.handlers.insert(job_type.into(), handler);
    }

    /// Builder-style [`Self::register`].
    #[must_use]
    pub fn with(mut self, job_type: impl Into<String>, handler: Arc<dyn ReleaseHandler>) -> Self {
        self.register(job_type, handler);
        self
    }

    /// Handler for a job type.
    #[must_use]
    pub fn handler_for(&self, job_type: &str) -> Option<Arc<dyn ReleaseHandler>> {
        self.handlers.get(job_type).cloned()
    }

    /// Whether no handler is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }

    /// Notify the handler of the unit's job type that it was dequeued.
    ///
    /// Returns `Ok(false)` when no handler serves that job type.
    ///
    /// # Errors
    ///
    /// Whatever the handler returns.
    pub async fn notify_dequeued(&self, unit: &QueueUnit) -> Result<bool, SchedulerError> {
        let Some(handler) = self.handler_for(&unit.job_type) else {
            debug!(job_type = %unit.job_type, "no release handler");
            return Ok(false);
        };
        handler.dequeue(unit).await?;
        Ok(true)
    }

    /// Ask the handler of the unit's job type to release it.
    ///
    /// # Errors
    ///
    /// [`SchedulerError::NotFound`] when no handler serves that job type,
    /// otherwise whatever the handler returns.
    pub async fn release(&self, unit: &QueueUnit) -> Result<(), SchedulerError> {
        let handler = self.handler_for(&unit.job_type).ok_or_else(|| {
            SchedulerError::NotFound(format!("release handler for {}", unit.job_type))
        })?;
        handler.release(unit).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infra::RecordingReleaseHandler;

    #[tokio::test]
    async fn test_routes_by_job_type() {
        let tf = Arc::new(RecordingReleaseHandler::new());
        let router = ReleaseRouter::new().with("TFJob", tf.clone());

        let unit = QueueUnit::new("ns", "a", "TFJob");
        assert!(router.notify_dequeued(&unit).await.unwrap());
        router.release(&unit).await.unwrap();
        assert_eq!(tf.dequeued(), vec!["ns/a".to_string()]);
        assert_eq!(tf.released(), vec!["ns/a".to_string()]);

        let other = QueueUnit::new("ns", "b", "MPIJob");
        assert!(!router.notify_dequeued(&other).await.unwrap());
        assert!(router.release(&other).await.unwrap_err().is_not_found());
    }

    #[test]
    fn test_from_extensions() {
        let mut ext = HashMap::new();
        ext.insert("TFJob".to_string(), "unix:///run/tf.sock".to_string());
        let router = ReleaseRouter::from_extensions(&ext, |_, _| {
            Ok(Arc::new(RecordingReleaseHandler::new()) as Arc<dyn ReleaseHandler>)
        })
        .unwrap();
        assert!(router.handler_for("TFJob").is_some());

        let failed = ReleaseRouter::from_extensions(&ext, |_, addr| {
            Err(SchedulerError::Client(format!("dial {addr}")))
        });
        assert!(failed.is_err());
    }
}
