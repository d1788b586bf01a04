//! The scheduling loop.
//!
//! Each cycle visits the queues in multi-queue order and pops one unit from
//! the first queue holding a ready unit. The unit then goes through the
//! filter plugins and the reserve plugins. A unit that passes both is
//! confirmed in the system of record on a dispatched task, so a slow
//! confirmation never holds up the next cycle. Every failure lands in
//! [`Scheduler::error_func`], which puts the unit into backoff unless it no
//! longer exists.

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::audit::{build_audit_event, AuditAction, AuditSink};
use super::client::UnitClient;
use super::dispatch::{BoundedDispatcher, Spawn};
use super::framework::Framework;
use super::multi_queue::MultiSchedulingQueue;
use super::release::ReleaseRouter;
use super::{QueueUnit, QueueUnitInfo, SchedulerError, UnitPhase};
use crate::util::clock::SharedClock;

/// Message stored on a unit when it is admitted.
pub const DEQUEUE_MESSAGE: &str = "Dequeued because schedule successfully";

/// What one scheduling cycle did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleOutcome {
    /// No queue had a ready unit.
    Idle,
    /// A unit was reserved and its confirmation dispatched.
    Confirming,
    /// A unit failed filter or reserve and was handed to the retry path.
    Retrying,
}

/// Drives admission of units from the queue set.
#[derive(Clone)]
pub struct Scheduler<S> {
    multi: Arc<MultiSchedulingQueue>,
    framework: Arc<Framework>,
    client: Arc<dyn UnitClient>,
    dispatcher: BoundedDispatcher<S>,
    release: Option<Arc<ReleaseRouter>>,
    audit: Option<Arc<dyn AuditSink>>,
    clock: SharedClock,
    idle_interval: Duration,
    cancel: CancellationToken,
}

impl<S> std::fmt::Debug for Scheduler<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Scheduler")
            .field("framework", &self.framework)
            .field("dispatcher", &self.dispatcher)
            .field("idle_interval", &self.idle_interval)
            .finish_non_exhaustive()
    }
}

impl<S> Scheduler<S>
where
    S: Spawn + Clone + Send + Sync + 'static,
{
    /// Assemble a scheduler. `cancel` stops the loop; queue flush tasks
    /// should hang off the same token.
    pub fn new(
        multi: Arc<MultiSchedulingQueue>,
        framework: Arc<Framework>,
        client: Arc<dyn UnitClient>,
        dispatcher: BoundedDispatcher<S>,
        clock: SharedClock,
        idle_interval: Duration,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            multi,
            framework,
            client,
            dispatcher,
            release: None,
            audit: None,
            clock,
            idle_interval,
            cancel,
        }
    }

    /// Notify downstream handlers after each confirmed admission.
    #[must_use]
    pub fn with_release_router(mut self, router: Arc<ReleaseRouter>) -> Self {
        self.release = Some(router);
        self
    }

    /// Record every decision to `sink`.
    #[must_use]
    pub fn with_audit(mut self, sink: Arc<dyn AuditSink>) -> Self {
        self.audit = Some(sink);
        self
    }

    /// The queue set this scheduler drains.
    #[must_use]
    pub const fn queues(&self) -> &Arc<MultiSchedulingQueue> {
        &self.multi
    }

    /// The active plugins.
    #[must_use]
    pub const fn framework(&self) -> &Arc<Framework> {
        &self.framework
    }

    /// Release handlers notified after admission, if any.
    #[must_use]
    pub const fn release_router(&self) -> Option<&Arc<ReleaseRouter>> {
        self.release.as_ref()
    }

    /// The confirmation dispatcher.
    #[must_use]
    pub const fn dispatcher(&self) -> &BoundedDispatcher<S> {
        &self.dispatcher
    }

    /// Token stopping the loop.
    #[must_use]
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Ask the loop to stop. In-flight confirmations run to completion.
    pub fn stop(&self) {
        self.cancel.cancel();
    }

    /// Start queue flush tasks and run cycles until stopped.
    pub async fn run(&self) {
        self.multi.run();
        info!(queues = self.multi.len(), "scheduler started");
        while !self.cancel.is_cancelled() {
            if self.schedule_one().await == CycleOutcome::Idle {
                tokio::select! {
                    () = self.cancel.cancelled() => break,
                    () = tokio::time::sleep(self.idle_interval) => {}
                }
            }
        }
        info!(in_flight = self.dispatcher.in_flight(), "scheduler stopped");
    }

    /// Run one cycle.
    pub async fn schedule_one(&self) -> CycleOutcome {
        let Some(info) = self.pop_next() else {
            return CycleOutcome::Idle;
        };
        debug!(unit = %info.key, queue = %info.unit.queue_name(), "scheduling unit");

        let status = self.framework.run_filter_plugins(&info).await;
        if !status.is_success() {
            self.error_func(info, status.message()).await;
            return CycleOutcome::Retrying;
        }

        let status = self.framework.run_reserve_plugins_reserve(&info).await;
        if !status.is_success() {
            self.error_func(info, status.message()).await;
            return CycleOutcome::Retrying;
        }

        let this = self.clone();
        let task_info = info.clone();
        if let Err(e) = self
            .dispatcher
            .dispatch(async move { this.confirm(task_info).await })
            .await
        {
            warn!(unit = %info.key, error = %e, "confirmation not dispatched");
            self.framework.run_reserve_plugins_unreserve(&info).await;
            self.error_func(info, &e.to_string()).await;
            return CycleOutcome::Retrying;
        }
        CycleOutcome::Confirming
    }

    fn pop_next(&self) -> Option<QueueUnitInfo> {
        for queue in self.multi.sorted_queue() {
            if queue.length() == 0 {
                continue;
            }
            match queue.pop() {
                Ok(info) => return Some(info),
                Err(e) => debug!(queue = %queue.name(), error = %e, "pop failed"),
            }
        }
        None
    }

    /// Mark the unit admitted in the system of record.
    ///
    /// A unit that vanished meanwhile is released from the ledger and not
    /// retried. Any other failure releases the reservation and sends the
    /// unit to backoff.
    pub async fn confirm(&self, info: QueueUnitInfo) {
        match self.dequeue(&info.unit).await {
            Ok(admitted) => {
                info!(
                    unit = %info.key,
                    queue = %info.unit.queue_name(),
                    attempts = info.attempts,
                    "unit dequeued"
                );
                self.audit(&info, AuditAction::Dequeue, None);
                self.notify_release(&info, &admitted).await;
            }
            Err(e) if e.is_not_found() => {
                debug!(unit = %info.key, "unit gone before confirmation");
                self.framework.run_reserve_plugins_unreserve(&info).await;
                self.audit(&info, AuditAction::Discard, Some(e.to_string()));
            }
            Err(e) => {
                warn!(unit = %info.key, error = %e, "confirmation failed");
                self.framework.run_reserve_plugins_unreserve(&info).await;
                self.error_func(info, &e.to_string()).await;
            }
        }
    }

    async fn dequeue(&self, unit: &QueueUnit) -> Result<QueueUnit, SchedulerError> {
        let mut latest = self.client.get(&unit.namespace, &unit.name).await?;
        latest.phase = UnitPhase::Dequeued;
        latest.message = Some(DEQUEUE_MESSAGE.to_string());
        self.client.update(&latest).await?;
        Ok(latest)
    }

    async fn notify_release(&self, info: &QueueUnitInfo, unit: &QueueUnit) {
        let Some(router) = &self.release else {
            return;
        };
        match router.notify_dequeued(unit).await {
            Ok(true) => self.audit(info, AuditAction::Release, None),
            Ok(false) => {}
            Err(e) => warn!(
                unit = %info.key,
                job_type = %unit.job_type,
                error = %e,
                "release notification failed"
            ),
        }
    }

    /// Retry path for a unit that could not be admitted.
    ///
    /// Refreshes the unit from the system of record, counts the attempt and
    /// puts it into its queue's backoff. A unit that no longer exists, or
    /// was admitted elsewhere, is dropped.
    pub async fn error_func(&self, mut info: QueueUnitInfo, reason: &str) {
        match self.client.get(&info.unit.namespace, &info.unit.name).await {
            Ok(latest) if latest.phase == UnitPhase::Dequeued => {
                debug!(unit = %info.key, "unit already dequeued, not retried");
                self.audit(&info, AuditAction::Discard, Some(reason.to_string()));
                return;
            }
            Ok(latest) => info.replace_unit(latest),
            Err(e) if e.is_not_found() => {
                debug!(unit = %info.key, "unit gone, not retried");
                self.audit(&info, AuditAction::Discard, Some(reason.to_string()));
                return;
            }
            Err(e) => warn!(unit = %info.key, error = %e, "refresh failed, retrying cached unit"),
        }

        info.attempts = info.attempts.saturating_add(1);
        info.timestamp = self.clock.now();

        let queue_name = info.unit.queue_name().to_string();
        let Some(queue) = self.multi.get_queue_by_name(&queue_name) else {
            warn!(unit = %info.key, queue = %queue_name, "queue is gone, unit discarded");
            self.audit(&info, AuditAction::Discard, Some(reason.to_string()));
            return;
        };
        debug!(
            unit = %info.key,
            queue = %queue_name,
            attempts = info.attempts,
            %reason,
            "unit not schedulable"
        );
        let key = info.key.clone();
        let attempts = info.attempts;
        match queue.add_unschedulable_if_not_present(info) {
            Ok(()) => {
                if let Some(audit) = &self.audit {
                    audit.record(build_audit_event(
                        key,
                        queue_name,
                        AuditAction::Backoff,
                        Some(format!("attempt {attempts}: {reason}")),
                    ));
                }
            }
            Err(e) => {
                warn!(unit = %key, queue = %queue_name, error = %e, "backoff re-enqueue failed");
            }
        }
    }

    fn audit(&self, info: &QueueUnitInfo, action: AuditAction, message: Option<String>) {
        if let Some(audit) = &self.audit {
            audit.record(build_audit_event(
                &info.key,
                info.unit.queue_name(),
                action,
                message,
            ));
        }
    }
}
