//! Registry of named queues ordered by the multi-queue sort plugin.
//!
//! The registry lock only guards the name → queue map. It is never held
//! while a queue's own lock is taken, so the two lock domains stay
//! independent.

use std::cmp::Ordering as CmpOrdering;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::framework::Framework;
use super::queue::{QueueOptions, SchedulingQueue};
use super::{QueueInfo, QueueSpec, SchedulerError};
use crate::util::clock::SharedClock;

/// The set of named queues.
pub struct MultiSchedulingQueue {
    framework: Arc<Framework>,
    queues: RwLock<HashMap<String, Arc<SchedulingQueue>>>,
    options: QueueOptions,
    clock: SharedClock,
    default_policy: String,
    cancel: CancellationToken,
    running: AtomicBool,
}

impl std::fmt::Debug for MultiSchedulingQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MultiSchedulingQueue")
            .field("queues", &self.names())
            .field("default_policy", &self.default_policy)
            .finish_non_exhaustive()
    }
}

impl MultiSchedulingQueue {
    /// Empty registry.
    ///
    /// Queues whose spec names no policy use `default_policy`. Every queue's
    /// flush task is a child of `parent`.
    pub fn new(
        framework: Arc<Framework>,
        options: QueueOptions,
        clock: SharedClock,
        default_policy: impl Into<String>,
        parent: &CancellationToken,
    ) -> Self {
        Self {
            framework,
            queues: RwLock::new(HashMap::new()),
            options,
            clock,
            default_policy: default_policy.into(),
            cancel: parent.child_token(),
            running: AtomicBool::new(false),
        }
    }

    fn build(&self, spec: QueueSpec) -> Result<Arc<SchedulingQueue>, SchedulerError> {
        let policy = if spec.queue_policy.is_empty() {
            self.default_policy.clone()
        } else {
            spec.queue_policy.clone()
        };
        let less = self.framework.queue_less_fn(&policy).ok_or_else(|| {
            SchedulerError::Config(format!(
                "queue `{}` uses unknown sort policy `{policy}`",
                spec.name
            ))
        })?;
        let queue = Arc::new(SchedulingQueue::new(
            QueueInfo::from(spec),
            less,
            self.options,
            Arc::clone(&self.clock),
            &self.cancel,
        ));
        if self.running.load(Ordering::Acquire) {
            queue.run();
        }
        Ok(queue)
    }

    /// Create and register a queue. An existing queue with the same name is
    /// closed and its units discarded.
    ///
    /// # Errors
    ///
    /// [`SchedulerError::Config`] when the spec names an unknown policy.
    pub fn add(&self, spec: QueueSpec) -> Result<(), SchedulerError> {
        let name = spec.name.clone();
        let queue = self.build(spec)?;
        let replaced = self.queues.write().insert(name.clone(), queue);
        if let Some(old) = replaced {
            warn!(queue = %name, discarded = old.length() + old.backoff_len(), "queue replaced");
            old.close();
        } else {
            info!(queue = %name, "queue added");
        }
        Ok(())
    }

    /// Rebuild a queue from a new definition.
    ///
    /// Units held by the old queue are moved into the new one with their
    /// attempts and timestamps, then re-sorted under the new policy. When
    /// the old queue is unknown this behaves like [`Self::add`].
    ///
    /// # Errors
    ///
    /// [`SchedulerError::Config`] when the new spec names an unknown policy;
    /// the old queue is left untouched in that case.
    pub fn update(&self, old: &QueueSpec, new: QueueSpec) -> Result<(), SchedulerError> {
        let name = new.name.clone();
        let queue = self.build(new)?;
        let (previous, shadowed) = {
            let mut queues = self.queues.write();
            let previous = queues.remove(&old.name);
            let shadowed = queues.insert(name.clone(), Arc::clone(&queue));
            (previous, shadowed)
        };
        if let Some(shadowed) = shadowed {
            // a different queue already used the new name
            let discarded = shadowed.length() + shadowed.backoff_len();
            warn!(queue = %name, discarded, "queue shadowed");
            shadowed.close();
        }
        if let Some(previous) = previous {
            previous.close();
            let moved = previous.drain_into(&queue);
            info!(queue = %name, moved, "queue updated");
        } else {
            info!(queue = %name, "queue added on update");
        }
        Ok(())
    }

    /// Remove a queue and stop its flush task. Its units are discarded.
    ///
    /// Returns `false` when no queue has that name.
    pub fn delete(&self, name: &str) -> bool {
        let removed = self.queues.write().remove(name);
        removed.is_some_and(|queue| {
            queue.close();
            info!(queue = %name, discarded = queue.length() + queue.backoff_len(), "queue deleted");
            true
        })
    }

    /// Look a queue up by name.
    #[must_use]
    pub fn get_queue_by_name(&self, name: &str) -> Option<Arc<SchedulingQueue>> {
        self.queues.read().get(name).cloned()
    }

    /// Snapshot of all queues, first to visit first.
    ///
    /// Queues the plugin does not distinguish keep name order.
    #[must_use]
    pub fn sorted_queue(&self) -> Vec<Arc<SchedulingQueue>> {
        let mut queues: Vec<Arc<SchedulingQueue>> = self.queues.read().values().cloned().collect();
        queues.sort_by(|a, b| a.name().cmp(b.name()));
        queues.sort_by(|a, b| {
            if self.framework.multi_queue_less(a.info(), b.info()) {
                CmpOrdering::Less
            } else if self.framework.multi_queue_less(b.info(), a.info()) {
                CmpOrdering::Greater
            } else {
                CmpOrdering::Equal
            }
        });
        queues
    }

    /// Registered queue names, sorted.
    #[must_use]
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.queues.read().keys().cloned().collect();
        names.sort();
        names
    }

    /// Number of registered queues.
    #[must_use]
    pub fn len(&self) -> usize {
        self.queues.read().len()
    }

    /// Whether no queue is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.queues.read().is_empty()
    }

    /// Start every queue's flush task, and those of queues added later.
    pub fn run(&self) {
        self.running.store(true, Ordering::Release);
        let queues: Vec<_> = self.queues.read().values().cloned().collect();
        for queue in &queues {
            queue.run();
        }
        debug!(queues = queues.len(), "queues running");
    }

    /// Stop every flush task and close every queue.
    pub fn close(&self) {
        self.running.store(false, Ordering::Release);
        self.cancel.cancel();
        let queues: Vec<_> = self.queues.read().values().cloned().collect();
        for queue in queues {
            queue.close();
        }
    }
}
