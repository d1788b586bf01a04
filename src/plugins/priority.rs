//! Priority ordering for units and for queues.

use std::sync::Arc;

use crate::core::{MultiQueueSortPlugin, Plugin, QueueInfo, QueueSortPlugin, QueueUnitInfo};

/// Registry name of the priority plugin.
pub const NAME: &str = "Priority";

/// Orders units by priority (higher first, then earlier first attempt) and
/// queues by declared queue priority (higher first).
#[derive(Debug, Default, Clone, Copy)]
pub struct PriorityPlugin;

impl Plugin for PriorityPlugin {
    fn name(&self) -> &str {
        NAME
    }

    fn as_multi_queue_sort(self: Arc<Self>) -> Option<Arc<dyn MultiQueueSortPlugin>> {
        Some(self)
    }

    fn as_queue_sort(self: Arc<Self>) -> Option<Arc<dyn QueueSortPlugin>> {
        Some(self)
    }
}

impl MultiQueueSortPlugin for PriorityPlugin {
    fn multi_queue_less(&self, a: &QueueInfo, b: &QueueInfo) -> bool {
        a.priority > b.priority
    }
}

impl QueueSortPlugin for PriorityPlugin {
    fn queue_less(&self, a: &QueueUnitInfo, b: &QueueUnitInfo) -> bool {
        let p1 = a.unit.effective_priority();
        let p2 = b.unit.effective_priority();
        p1 > p2 || (p1 == p2 && a.initial_attempt_timestamp < b.initial_attempt_timestamp)
    }
}

#[cfg(test)]
mod tests {
    use std::time::{Duration, Instant};

    use super::*;
    use crate::core::{QueueSpec, QueueUnit};

    fn info(name: &str, priority: Option<i32>, first_seen: Instant) -> QueueUnitInfo {
        let mut unit = QueueUnit::new("ns", name, "TFJob");
        unit.priority = priority;
        QueueUnitInfo::new(unit, first_seen)
    }

    #[test]
    fn test_higher_priority_first() {
        let now = Instant::now();
        let qu1 = info("qu1", Some(100), now);
        let qu2 = info("qu2", Some(50), now);
        assert!(PriorityPlugin.queue_less(&qu1, &qu2));
        assert!(!PriorityPlugin.queue_less(&qu2, &qu1));
    }

    #[test]
    fn test_equal_priority_earlier_first_attempt_wins() {
        let now = Instant::now();
        let early = info("early", Some(7), now);
        let late = info("late", Some(7), now + Duration::from_millis(5));
        assert!(PriorityPlugin.queue_less(&early, &late));
        assert!(!PriorityPlugin.queue_less(&late, &early));
    }

    #[test]
    fn test_missing_priority_uses_default() {
        let now = Instant::now();
        let none = info("none", None, now);
        let negative = info("neg", Some(-1), now);
        assert!(PriorityPlugin.queue_less(&none, &negative));
        // identical priority and timestamp: neither sorts first
        let twin = info("twin", Some(0), now);
        assert!(!PriorityPlugin.queue_less(&none, &twin));
        assert!(!PriorityPlugin.queue_less(&twin, &none));
    }

    #[test]
    fn test_queue_priority() {
        let team_a = QueueInfo::from(QueueSpec::new("team-a", 10));
        let team_b = QueueInfo::from(QueueSpec::new("team-b", 5));
        assert!(PriorityPlugin.multi_queue_less(&team_a, &team_b));
        assert!(!PriorityPlugin.multi_queue_less(&team_b, &team_a));
    }
}
