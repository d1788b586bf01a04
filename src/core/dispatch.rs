//! Bounded dispatch of confirmation tasks.
//!
//! The scheduler never launches more than a fixed number of confirmation
//! tasks at once; when every slot is taken, [`BoundedDispatcher::dispatch`]
//! waits for one to free up, which applies backpressure to the loop.

use std::future::Future;
use std::sync::Arc;

use tokio::sync::Semaphore;

use super::SchedulerError;

/// Abstraction for spawning task execution on a runtime.
pub trait Spawn {
    /// Spawn an async task that returns a future.
    fn spawn<F>(&self, fut: F)
    where
        F: Future<Output = ()> + Send + 'static;
}

/// Spawns futures through `S`, at most `limit` at a time.
#[derive(Clone)]
pub struct BoundedDispatcher<S> {
    spawner: S,
    permits: Arc<Semaphore>,
    limit: u32,
}

impl<S> std::fmt::Debug for BoundedDispatcher<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BoundedDispatcher")
            .field("limit", &self.limit)
            .field("in_flight", &self.in_flight())
            .finish_non_exhaustive()
    }
}

impl<S> BoundedDispatcher<S>
where
    S: Spawn + Clone + Send + Sync + 'static,
{
    /// Dispatcher allowing `limit` concurrent tasks; zero is raised to one.
    pub fn new(spawner: S, limit: usize) -> Self {
        let limit = u32::try_from(limit.max(1)).unwrap_or(u32::MAX);
        Self {
            spawner,
            permits: Arc::new(Semaphore::new(limit as usize)),
            limit,
        }
    }

    /// Spawn `fut` once a slot is free.
    ///
    /// # Errors
    ///
    /// [`SchedulerError::Backend`] after [`Self::close`].
    pub async fn dispatch<F>(&self, fut: F) -> Result<(), SchedulerError>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let permit = Arc::clone(&self.permits)
            .acquire_owned()
            .await
            .map_err(|_| SchedulerError::Backend("dispatcher closed".to_string()))?;
        self.spawner.spawn(async move {
            fut.await;
            drop(permit);
        });
        Ok(())
    }

    /// Maximum concurrent tasks.
    #[must_use]
    pub const fn limit(&self) -> u32 {
        self.limit
    }
}

impl<S> BoundedDispatcher<S> {
    /// Tasks currently running.
    #[must_use]
    pub fn in_flight(&self) -> usize {
        (self.limit as usize).saturating_sub(self.permits.available_permits())
    }

    /// Wait until every dispatched task has finished.
    pub async fn wait_idle(&self) {
        if let Ok(all) = self.permits.acquire_many(self.limit).await {
            drop(all);
        }
    }

    /// Refuse further dispatches. Running tasks are not cancelled.
    pub fn close(&self) {
        self.permits.close();
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use super::*;
    use crate::runtime::TokioSpawner;

    #[tokio::test]
    async fn test_dispatch_respects_limit() {
        let dispatcher = BoundedDispatcher::new(TokioSpawner::current().unwrap(), 2);
        let running = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));

        for _ in 0..6 {
            let running = Arc::clone(&running);
            let peak = Arc::clone(&peak);
            dispatcher
                .dispatch(async move {
                    let now = running.fetch_add(1, Ordering::SeqCst) + 1;
                    peak.fetch_max(now, Ordering::SeqCst);
                    tokio::time::sleep(Duration::from_millis(10)).await;
                    running.fetch_sub(1, Ordering::SeqCst);
                })
                .await
                .unwrap();
        }
        dispatcher.wait_idle().await;
        assert!(peak.load(Ordering::SeqCst) <= 2);
        assert_eq!(dispatcher.in_flight(), 0);
    }

    #[tokio::test]
    async fn test_closed_dispatcher_refuses() {
        let dispatcher = BoundedDispatcher::new(TokioSpawner::current().unwrap(), 0);
        assert_eq!(dispatcher.limit(), 1);
        dispatcher.close();
        assert!(dispatcher.dispatch(async {}).await.is_err());
    }
}
