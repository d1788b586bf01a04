//! Priority scheduling queue with exponential backoff.
//!
//! Each queue owns two key-indexed heaps behind one lock:
//!
//! - `active`: units eligible for the next scheduling attempt, ordered by the
//!   queue-sort plugin selected through the queue's policy.
//! - `backoff`: units serving a penalty window after a failed attempt,
//!   ordered by the instant the window ends.
//!
//! A unit lives in at most one of the two heaps. A periodic flush task moves
//! units whose window has elapsed back into `active`.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::RwLock;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};

use super::framework::QueueLessFn;
use super::heap::Heap;
use super::{QueueInfo, QueueUnit, QueueUnitInfo, SchedulerError};
use crate::util::clock::SharedClock;

/// Capped exponential backoff.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackoffPolicy {
    /// Window after the first failed attempt.
    pub initial: Duration,
    /// Upper bound of any window.
    pub max: Duration,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            initial: Duration::from_secs(1),
            max: Duration::from_secs(4),
        }
    }
}

impl BackoffPolicy {
    /// Window for a unit that failed `attempts` times: `initial * 2^(attempts-1)`,
    /// clamped to `max`. Zero or one attempt yields `initial`.
    #[must_use]
    pub fn duration(&self, attempts: u32) -> Duration {
        let mut window = self.initial;
        for _ in 1..attempts {
            window = window.saturating_mul(2);
            if window >= self.max {
                return self.max;
            }
        }
        window.min(self.max)
    }

    /// Instant at which the unit's window ends.
    #[must_use]
    pub fn deadline(&self, info: &QueueUnitInfo) -> Instant {
        info.timestamp + self.duration(info.attempts)
    }
}

/// Tunables shared by every queue of a scheduler.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueueOptions {
    /// Retry window policy.
    pub backoff: BackoffPolicy,
    /// Period of the backoff flush task.
    pub flush_interval: Duration,
}

impl Default for QueueOptions {
    fn default() -> Self {
        Self {
            backoff: BackoffPolicy::default(),
            flush_interval: Duration::from_secs(1),
        }
    }
}

struct QueueState {
    active: Heap<QueueUnitInfo>,
    backoff: Heap<QueueUnitInfo>,
    closed: bool,
}

/// One named queue.
pub struct SchedulingQueue {
    info: QueueInfo,
    options: QueueOptions,
    clock: SharedClock,
    state: RwLock<QueueState>,
    cancel: CancellationToken,
    running: AtomicBool,
}

impl std::fmt::Debug for SchedulingQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.read();
        f.debug_struct("SchedulingQueue")
            .field("name", &self.info.name)
            .field("active", &state.active.len())
            .field("backoff", &state.backoff.len())
            .field("closed", &state.closed)
            .finish()
    }
}

fn unit_key(info: &QueueUnitInfo) -> String {
    info.key.clone()
}

impl SchedulingQueue {
    /// Create a stopped queue ordered by `less`.
    ///
    /// The flush task, once started, stops when `parent` is cancelled or
    /// the queue is closed.
    pub fn new(
        info: QueueInfo,
        less: QueueLessFn,
        options: QueueOptions,
        clock: SharedClock,
        parent: &CancellationToken,
    ) -> Self {
        let policy = options.backoff;
        let active = Heap::new(Arc::new(unit_key), less);
        let backoff = Heap::new(
            Arc::new(unit_key),
            Arc::new(move |a: &QueueUnitInfo, b: &QueueUnitInfo| {
                policy.deadline(a) < policy.deadline(b)
            }),
        );
        Self {
            info,
            options,
            clock,
            state: RwLock::new(QueueState {
                active,
                backoff,
                closed: false,
            }),
            cancel: parent.child_token(),
            running: AtomicBool::new(false),
        }
    }

    /// Queue name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.info.name
    }

    /// Descriptor handed to multi-queue sort plugins.
    #[must_use]
    pub const fn info(&self) -> &QueueInfo {
        &self.info
    }

    /// Options the queue was built with.
    #[must_use]
    pub const fn options(&self) -> QueueOptions {
        self.options
    }

    /// Insert a fresh unit into `active`.
    ///
    /// # Errors
    ///
    /// [`SchedulerError::DuplicateKey`] when the unit is already held in
    /// either heap, [`SchedulerError::QueueClosed`] after [`Self::close`].
    pub fn add(&self, unit: QueueUnit) -> Result<(), SchedulerError> {
        let info = QueueUnitInfo::new(unit, self.clock.now());
        let mut state = self.state.write();
        self.ensure_open(&state)?;
        if state.backoff.contains_key(&info.key) {
            return Err(SchedulerError::DuplicateKey(info.key));
        }
        let key = info.key.clone();
        state.active.add(info)?;
        trace!(queue = %self.info.name, unit = %key, "unit added");
        Ok(())
    }

    /// Put a unit that failed an attempt into `backoff`, keeping its
    /// attempts and timestamps. No-op when the unit is already held.
    ///
    /// # Errors
    ///
    /// [`SchedulerError::QueueClosed`] after [`Self::close`].
    pub fn add_unschedulable_if_not_present(
        &self,
        info: QueueUnitInfo,
    ) -> Result<(), SchedulerError> {
        let mut state = self.state.write();
        self.ensure_open(&state)?;
        if state.active.contains_key(&info.key) || state.backoff.contains_key(&info.key) {
            trace!(queue = %self.info.name, unit = %info.key, "unit already queued");
            return Ok(());
        }
        debug!(
            queue = %self.info.name,
            unit = %info.key,
            attempts = info.attempts,
            backoff_ms = self.options.backoff.duration(info.attempts).as_millis(),
            "unit backing off"
        );
        state.backoff.add(info)
    }

    /// Re-insert a unit into `active` keeping its bookkeeping.
    pub(crate) fn requeue_active(&self, info: QueueUnitInfo) -> Result<(), SchedulerError> {
        let mut state = self.state.write();
        self.ensure_open(&state)?;
        if state.backoff.contains_key(&info.key) {
            return Err(SchedulerError::DuplicateKey(info.key));
        }
        state.active.add(info)
    }

    /// Replace the content of a held unit in place.
    ///
    /// Returns `false` when neither heap holds `old`.
    pub fn update(&self, old: &QueueUnit, new: QueueUnit) -> bool {
        let key = old.queue_key();
        let mut state = self.state.write();
        let state = &mut *state;
        for heap in [&mut state.active, &mut state.backoff] {
            if let Some(current) = heap.get_by_key(&key) {
                let mut replaced = current.clone();
                replaced.replace_unit(new);
                if replaced.key != key {
                    // identity changed, drop the old entry and re-key
                    let _ = heap.delete_by_key(&key);
                    if let Err(e) = heap.add(replaced) {
                        warn!(queue = %self.info.name, error = %e, "re-keyed update dropped");
                        return false;
                    }
                } else if let Err(e) = heap.update(replaced) {
                    warn!(queue = %self.info.name, unit = %key, error = %e, "update failed");
                    return false;
                }
                return true;
            }
        }
        false
    }

    /// Remove a unit from whichever heap holds it.
    ///
    /// Returns `false` when it was not held.
    pub fn delete(&self, unit: &QueueUnit) -> bool {
        self.delete_by_key(&unit.queue_key())
    }

    /// Remove by `namespace/name` key.
    pub fn delete_by_key(&self, key: &str) -> bool {
        let mut state = self.state.write();
        state.active.delete_by_key(key).is_ok() || state.backoff.delete_by_key(key).is_ok()
    }

    /// Take the best ready unit.
    ///
    /// # Errors
    ///
    /// [`SchedulerError::Empty`] when no unit is ready.
    pub fn pop(&self) -> Result<QueueUnitInfo, SchedulerError> {
        self.state.write().active.pop()
    }

    /// The unit [`Self::pop`] would return, without removing it.
    #[must_use]
    pub fn top_unit(&self) -> Option<QueueUnitInfo> {
        self.state.read().active.peek().cloned()
    }

    /// Number of ready units. Units in backoff are not counted.
    #[must_use]
    pub fn length(&self) -> usize {
        self.state.read().active.len()
    }

    /// Number of units serving a backoff window.
    #[must_use]
    pub fn backoff_len(&self) -> usize {
        self.state.read().backoff.len()
    }

    /// Whether either heap holds this key.
    #[must_use]
    pub fn contains(&self, key: &str) -> bool {
        let state = self.state.read();
        state.active.contains_key(key) || state.backoff.contains_key(key)
    }

    /// Whether [`Self::close`] was called.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.state.read().closed
    }

    /// Move every unit whose backoff window has ended into `active`.
    ///
    /// Returns how many units moved.
    pub fn flush_backoff_completed(&self) -> usize {
        let now = self.clock.now();
        let policy = self.options.backoff;
        let mut state = self.state.write();
        let mut moved = 0;
        while let Some(head) = state.backoff.peek() {
            if policy.deadline(head) > now {
                break;
            }
            let Ok(info) = state.backoff.pop() else {
                break;
            };
            let key = info.key.clone();
            match state.active.add(info) {
                Ok(()) => moved += 1,
                Err(e) => warn!(
                    queue = %self.info.name,
                    unit = %key,
                    error = %e,
                    "backoff flush dropped unit"
                ),
            }
        }
        if moved > 0 {
            debug!(queue = %self.info.name, moved, "backoff completed");
        }
        moved
    }

    /// Start the periodic backoff flush on the current tokio runtime.
    ///
    /// Idempotent. Outside a runtime the queue stays stopped and a later
    /// call may start it.
    pub fn run(self: &Arc<Self>) {
        if self.running.swap(true, Ordering::AcqRel) {
            return;
        }
        let Ok(handle) = tokio::runtime::Handle::try_current() else {
            self.running.store(false, Ordering::Release);
            warn!(queue = %self.info.name, "no tokio runtime, backoff flush not started");
            return;
        };
        let queue = Arc::clone(self);
        handle.spawn(async move {
            let mut ticker = tokio::time::interval(queue.options.flush_interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    () = queue.cancel.cancelled() => break,
                    _ = ticker.tick() => {
                        queue.flush_backoff_completed();
                    }
                }
            }
            queue.running.store(false, Ordering::Release);
            debug!(queue = %queue.info.name, "backoff flush stopped");
        });
        debug!(queue = %self.info.name, "backoff flush started");
    }

    /// Stop the flush task and refuse further inserts.
    pub fn close(&self) {
        self.state.write().closed = true;
        self.cancel.cancel();
    }

    /// Move every held unit into `target`, preserving attempts and
    /// timestamps. Units ready here stay ready there; backing-off units keep
    /// backing off.
    ///
    /// Returns how many units were moved.
    pub fn drain_into(&self, target: &Self) -> usize {
        let (active, backoff) = {
            let mut state = self.state.write();
            (state.active.drain(), state.backoff.drain())
        };
        let mut moved = 0;
        for info in active {
            let key = info.key.clone();
            match target.requeue_active(info) {
                Ok(()) => moved += 1,
                Err(e) => warn!(
                    from = %self.info.name,
                    to = %target.info.name,
                    unit = %key,
                    error = %e,
                    "unit lost in migration"
                ),
            }
        }
        for info in backoff {
            let key = info.key.clone();
            match target.add_unschedulable_if_not_present(info) {
                Ok(()) => moved += 1,
                Err(e) => warn!(
                    from = %self.info.name,
                    to = %target.info.name,
                    unit = %key,
                    error = %e,
                    "unit lost in migration"
                ),
            }
        }
        moved
    }

    fn ensure_open(&self, state: &QueueState) -> Result<(), SchedulerError> {
        if state.closed {
            return Err(SchedulerError::QueueClosed(self.info.name.clone()));
        }
        Ok(())
    }
}
