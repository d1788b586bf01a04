//! Routing of unit and queue events onto the queues and the reservation
//! ledger.
//!
//! Units waiting for admission go to their queue. Units already admitted
//! (observed after a restart, or echoed back after confirmation) only touch
//! the ledger: they are reserved if not present on add and released on
//! delete.

use std::sync::Arc;

use tracing::{debug, error, info, warn};

use super::audit::{build_audit_event, AuditAction, AuditSink};
use super::framework::Framework;
use super::multi_queue::MultiSchedulingQueue;
use super::{QueueSpec, QueueUnit, QueueUnitInfo, SchedulerError, UnitPhase};
use crate::util::clock::SharedClock;

/// Event router between the unit/queue feeds and the scheduler state.
#[derive(Clone)]
pub struct Controller {
    multi: Arc<MultiSchedulingQueue>,
    framework: Arc<Framework>,
    clock: SharedClock,
    audit: Option<Arc<dyn AuditSink>>,
}

impl std::fmt::Debug for Controller {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Controller")
            .field("queues", &self.multi.names())
            .finish_non_exhaustive()
    }
}

impl Controller {
    /// Router over `multi`, reserving through `framework`.
    pub fn new(
        multi: Arc<MultiSchedulingQueue>,
        framework: Arc<Framework>,
        clock: SharedClock,
    ) -> Self {
        Self {
            multi,
            framework,
            clock,
            audit: None,
        }
    }

    /// Record enqueue events to `sink`.
    #[must_use]
    pub fn with_audit(mut self, sink: Arc<dyn AuditSink>) -> Self {
        self.audit = Some(sink);
        self
    }

    /// The queue set events are routed to.
    #[must_use]
    pub const fn queues(&self) -> &Arc<MultiSchedulingQueue> {
        &self.multi
    }

    /// A unit appeared.
    ///
    /// # Errors
    ///
    /// [`SchedulerError::NotFound`] when its queue does not exist, or the
    /// queue's insert error (duplicate key, closed queue).
    pub async fn add_unit(&self, unit: QueueUnit) -> Result<(), SchedulerError> {
        match unit.phase {
            UnitPhase::Enqueued => self.enqueue(unit),
            UnitPhase::Dequeued => {
                self.reserve_if_not_present(unit).await;
                Ok(())
            }
        }
    }

    /// A unit changed.
    ///
    /// Units still waiting are updated in place; a unit moving to another
    /// queue is moved; a phase change is handled as a delete on one side
    /// and an add on the other.
    ///
    /// # Errors
    ///
    /// Same as [`Self::add_unit`] when the unit has to be (re)inserted.
    pub async fn update_unit(&self, old: &QueueUnit, new: QueueUnit) -> Result<(), SchedulerError> {
        match (old.phase, new.phase) {
            (UnitPhase::Enqueued, UnitPhase::Enqueued) => {
                if old.queue_name() == new.queue_name() {
                    let queue = self.queue_for(&new)?;
                    if !queue.update(old, new) {
                        debug!(unit = %old.queue_key(), "update for untracked unit ignored");
                    }
                    Ok(())
                } else {
                    if let Some(previous) = self.multi.get_queue_by_name(old.queue_name()) {
                        previous.delete(old);
                    }
                    self.enqueue(new)
                }
            }
            (UnitPhase::Enqueued, UnitPhase::Dequeued) => {
                if let Some(queue) = self.multi.get_queue_by_name(old.queue_name()) {
                    queue.delete(old);
                }
                self.reserve_if_not_present(new).await;
                Ok(())
            }
            (UnitPhase::Dequeued, UnitPhase::Enqueued) => {
                self.unreserve(old.clone()).await;
                self.enqueue(new)
            }
            (UnitPhase::Dequeued, UnitPhase::Dequeued) => Ok(()),
        }
    }

    /// A unit disappeared. Unknown units are ignored.
    pub async fn delete_unit(&self, unit: &QueueUnit) {
        match unit.phase {
            UnitPhase::Enqueued => match self.multi.get_queue_by_name(unit.queue_name()) {
                Some(queue) => {
                    if queue.delete(unit) {
                        debug!(
                            unit = %unit.queue_key(),
                            queue = %unit.queue_name(),
                            "unit deleted"
                        );
                    }
                }
                None => error!(queue = %unit.queue_name(), "queue is not exist"),
            },
            UnitPhase::Dequeued => self.unreserve(unit.clone()).await,
        }
    }

    /// A queue definition appeared.
    ///
    /// # Errors
    ///
    /// [`SchedulerError::Config`] for an unknown sort policy.
    pub fn add_queue(&self, spec: QueueSpec) -> Result<(), SchedulerError> {
        self.multi.add(spec)
    }

    /// A queue definition changed.
    ///
    /// # Errors
    ///
    /// [`SchedulerError::Config`] for an unknown sort policy.
    pub fn update_queue(&self, old: &QueueSpec, new: QueueSpec) -> Result<(), SchedulerError> {
        self.multi.update(old, new)
    }

    /// A queue definition disappeared.
    pub fn delete_queue(&self, name: &str) -> bool {
        self.multi.delete(name)
    }

    fn queue_for(
        &self,
        unit: &QueueUnit,
    ) -> Result<Arc<super::queue::SchedulingQueue>, SchedulerError> {
        self.multi.get_queue_by_name(unit.queue_name()).ok_or_else(|| {
            error!(queue = %unit.queue_name(), unit = %unit.queue_key(), "queue is not exist");
            SchedulerError::NotFound(format!("queue {}", unit.queue_name()))
        })
    }

    fn enqueue(&self, unit: QueueUnit) -> Result<(), SchedulerError> {
        let queue = self.queue_for(&unit)?;
        let key = unit.queue_key();
        match queue.add(unit) {
            Ok(()) => {
                debug!(unit = %key, queue = %queue.name(), "unit enqueued");
                if let Some(audit) = &self.audit {
                    audit.record(build_audit_event(&key, queue.name(), AuditAction::Enqueue, None));
                }
                Ok(())
            }
            Err(e) => {
                warn!(unit = %key, queue = %queue.name(), error = %e, "queue add unit fail");
                Err(e)
            }
        }
    }

    async fn reserve_if_not_present(&self, unit: QueueUnit) {
        let info = QueueUnitInfo::new(unit, self.clock.now());
        let status = self.framework.run_reserve_plugins_reserve(&info).await;
        if status.is_success() {
            info!(unit = %info.key, "reservation restored for dequeued unit");
        } else {
            debug!(unit = %info.key, %status, "dequeued unit not reserved");
        }
    }

    async fn unreserve(&self, unit: QueueUnit) {
        let info = QueueUnitInfo::new(unit, self.clock.now());
        self.framework.run_reserve_plugins_unreserve(&info).await;
        debug!(unit = %info.key, "reservation released");
    }
}
