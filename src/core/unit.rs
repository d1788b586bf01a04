//! Queue units, their scheduling wrapper and named queue descriptors.

use std::fmt;
use std::str::FromStr;
use std::time::Instant;

use serde::{Deserialize, Serialize};

use super::quantity::ResourceList;
use super::SchedulerError;

/// Priority used when a unit carries none.
pub const DEFAULT_PRIORITY: i32 = 0;

/// Queue a unit lands in when it names none.
pub const DEFAULT_QUEUE_NAME: &str = "default";

/// Separator between the fields of a serialized unit key.
pub const KEY_SEPARATOR: char = '/';

/// Lifecycle phase of a unit.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum UnitPhase {
    /// Waiting for admission.
    #[default]
    Enqueued,
    /// Admitted, resources reserved.
    Dequeued,
}

/// One schedulable request representing a gated job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueUnit {
    /// Namespace of the underlying job.
    pub namespace: String,
    /// Name of the underlying job.
    pub name: String,
    /// Externally assigned unique id, when known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uid: Option<String>,
    /// Which external workload kind this unit represents.
    pub job_type: String,
    /// Scheduling priority, higher first.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub priority: Option<i32>,
    /// Name of the logical queue this unit belongs to.
    #[serde(default = "default_queue_name")]
    pub queue: String,
    /// Requested resources.
    #[serde(default)]
    pub resource: ResourceList,
    /// Current lifecycle phase.
    #[serde(default)]
    pub phase: UnitPhase,
    /// Human readable note attached on phase changes.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

fn default_queue_name() -> String {
    DEFAULT_QUEUE_NAME.to_string()
}

impl QueueUnit {
    /// Create an enqueued unit with default priority in the default queue.
    pub fn new(
        namespace: impl Into<String>,
        name: impl Into<String>,
        job_type: impl Into<String>,
    ) -> Self {
        Self {
            namespace: namespace.into(),
            name: name.into(),
            uid: None,
            job_type: job_type.into(),
            priority: None,
            queue: default_queue_name(),
            resource: ResourceList::new(),
            phase: UnitPhase::Enqueued,
            message: None,
        }
    }

    /// Set the priority.
    #[must_use]
    pub const fn with_priority(mut self, priority: i32) -> Self {
        self.priority = Some(priority);
        self
    }

    /// Set the target queue.
    #[must_use]
    pub fn with_queue(mut self, queue: impl Into<String>) -> Self {
        self.queue = queue.into();
        self
    }

    /// Set the requested resources.
    #[must_use]
    pub fn with_resource(mut self, resource: ResourceList) -> Self {
        self.resource = resource;
        self
    }

    /// Set the external id.
    #[must_use]
    pub fn with_uid(mut self, uid: impl Into<String>) -> Self {
        self.uid = Some(uid.into());
        self
    }

    /// Priority with the system default applied.
    #[must_use]
    pub fn effective_priority(&self) -> i32 {
        self.priority.unwrap_or(DEFAULT_PRIORITY)
    }

    /// Queue name with the default applied to an empty name.
    #[must_use]
    pub fn queue_name(&self) -> &str {
        if self.queue.is_empty() {
            DEFAULT_QUEUE_NAME
        } else {
            &self.queue
        }
    }

    /// Key used by every queue and by the reservation ledger: `namespace/name`.
    #[must_use]
    pub fn queue_key(&self) -> String {
        format!("{}{KEY_SEPARATOR}{}", self.namespace, self.name)
    }

    /// Serializable key identifying this unit.
    #[must_use]
    pub fn unit_key(&self) -> UnitKey {
        UnitKey {
            job_type: self.job_type.clone(),
            namespace: self.namespace.clone(),
            name: self.name.clone(),
            uid: self.uid.clone(),
        }
    }

    /// Serialize to `jobType/namespace/name[/uid]`.
    #[must_use]
    pub fn serialize_key(&self) -> String {
        self.unit_key().to_string()
    }

    /// Rebuild a skeleton unit from a full four-field key.
    ///
    /// # Errors
    ///
    /// Returns [`SchedulerError::KeyParse`] when the key does not split into
    /// exactly four fields.
    pub fn deserialize_key(key: &str) -> Result<Self, SchedulerError> {
        let parsed: UnitKey = key.parse()?;
        Ok(parsed.into_unit())
    }
}

/// Identity of a unit as it travels between services.
///
/// Displayed as `jobType/namespace/name` or `jobType/namespace/name/uid`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct UnitKey {
    /// Workload kind.
    pub job_type: String,
    /// Namespace.
    pub namespace: String,
    /// Name.
    pub name: String,
    /// External id.
    pub uid: Option<String>,
}

impl UnitKey {
    /// Parse a three-field generic job key `jobType/namespace/name`.
    ///
    /// # Errors
    ///
    /// Returns [`SchedulerError::KeyParse`] unless there are exactly three fields.
    pub fn parse_job(key: &str) -> Result<Self, SchedulerError> {
        let parts: Vec<&str> = key.split(KEY_SEPARATOR).collect();
        let [job_type, namespace, name] = parts.as_slice() else {
            return Err(SchedulerError::KeyParse(key.to_string()));
        };
        Ok(Self {
            job_type: (*job_type).to_string(),
            namespace: (*namespace).to_string(),
            name: (*name).to_string(),
            uid: None,
        })
    }

    /// Skeleton unit carrying just this identity.
    #[must_use]
    pub fn into_unit(self) -> QueueUnit {
        let mut unit = QueueUnit::new(self.namespace, self.name, self.job_type);
        unit.uid = self.uid;
        unit
    }
}

impl FromStr for UnitKey {
    type Err = SchedulerError;

    /// Parse a full four-field key `jobType/namespace/name/uid`.
    fn from_str(key: &str) -> Result<Self, Self::Err> {
        let parts: Vec<&str> = key.split(KEY_SEPARATOR).collect();
        let [job_type, namespace, name, uid] = parts.as_slice() else {
            return Err(SchedulerError::KeyParse(key.to_string()));
        };
        Ok(Self {
            job_type: (*job_type).to_string(),
            namespace: (*namespace).to_string(),
            name: (*name).to_string(),
            uid: Some((*uid).to_string()),
        })
    }
}

impl fmt::Display for UnitKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}{KEY_SEPARATOR}{}{KEY_SEPARATOR}{}",
            self.job_type, self.namespace, self.name
        )?;
        if let Some(uid) = &self.uid {
            write!(f, "{KEY_SEPARATOR}{uid}")?;
        }
        Ok(())
    }
}

/// A unit together with its scheduling bookkeeping.
///
/// Owned by exactly one heap at a time; moving between the active and the
/// backoff heap moves the value.
#[derive(Debug, Clone)]
pub struct QueueUnitInfo {
    /// `namespace/name`.
    pub key: String,
    /// The wrapped unit.
    pub unit: QueueUnit,
    /// Last time the unit was inserted or retried.
    pub timestamp: Instant,
    /// Number of unsuccessful scheduling attempts so far.
    pub attempts: u32,
    /// First time the unit was ever queued.
    pub initial_attempt_timestamp: Instant,
}

impl QueueUnitInfo {
    /// Wrap a fresh unit observed at `now`.
    #[must_use]
    pub fn new(unit: QueueUnit, now: Instant) -> Self {
        Self {
            key: unit.queue_key(),
            unit,
            timestamp: now,
            attempts: 0,
            initial_attempt_timestamp: now,
        }
    }

    /// Replace the wrapped unit, keeping attempts and timestamps.
    pub fn replace_unit(&mut self, unit: QueueUnit) {
        self.key = unit.queue_key();
        self.unit = unit;
    }
}

/// Definition of a named queue as delivered by the queue feed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueSpec {
    /// Queue name; one per namespace in the default deployment.
    pub name: String,
    /// Cross-queue priority, higher first.
    #[serde(default)]
    pub priority: i32,
    /// Name of the queue-sort plugin ordering the units of this queue.
    #[serde(default = "default_queue_policy")]
    pub queue_policy: String,
}

fn default_queue_policy() -> String {
    crate::plugins::priority::NAME.to_string()
}

impl QueueSpec {
    /// Queue with the default priority policy.
    pub fn new(name: impl Into<String>, priority: i32) -> Self {
        Self {
            name: name.into(),
            priority,
            queue_policy: default_queue_policy(),
        }
    }
}

/// Read-only view of a queue handed to multi-queue sort plugins.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueInfo {
    /// Queue name.
    pub name: String,
    /// Cross-queue priority.
    pub priority: i32,
    /// The full definition.
    pub spec: QueueSpec,
}

impl From<QueueSpec> for QueueInfo {
    fn from(spec: QueueSpec) -> Self {
        Self {
            name: spec.name.clone(),
            priority: spec.priority,
            spec,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_round_trip_with_uid() {
        let unit = QueueUnit::new("team-a", "train-1", "TFJob").with_uid("abc-123");
        let key = unit.serialize_key();
        assert_eq!(key, "TFJob/team-a/train-1/abc-123");

        let back = QueueUnit::deserialize_key(&key).unwrap();
        assert_eq!(back.namespace, "team-a");
        assert_eq!(back.name, "train-1");
        assert_eq!(back.job_type, "TFJob");
        assert_eq!(back.uid.as_deref(), Some("abc-123"));
    }

    #[test]
    fn test_job_key_round_trip() {
        let unit = QueueUnit::new("ns", "job", "PyTorchJob");
        let key = unit.serialize_key();
        assert_eq!(key, "PyTorchJob/ns/job");
        let parsed = UnitKey::parse_job(&key).unwrap();
        assert_eq!(parsed, unit.unit_key());
    }

    #[test]
    fn test_malformed_keys_rejected() {
        assert!(matches!(
            QueueUnit::deserialize_key("TFJob/ns/name"),
            Err(SchedulerError::KeyParse(_))
        ));
        assert!("a/b/c/d/e".parse::<UnitKey>().is_err());
        assert!(UnitKey::parse_job("a/b").is_err());
        assert!(UnitKey::parse_job("a/b/c/d").is_err());
    }

    #[test]
    fn test_defaults() {
        let unit = QueueUnit::new("ns", "job", "TFJob");
        assert_eq!(unit.effective_priority(), DEFAULT_PRIORITY);
        assert_eq!(unit.queue_name(), DEFAULT_QUEUE_NAME);
        assert_eq!(unit.phase, UnitPhase::Enqueued);
        assert_eq!(unit.queue_key(), "ns/job");

        let json = r#"{"namespace":"ns","name":"job","job_type":"TFJob"}"#;
        let parsed: QueueUnit = serde_json::from_str(json).unwrap();
        assert_eq!(parsed, unit);
    }

    #[test]
    fn test_replace_unit_keeps_bookkeeping() {
        let now = Instant::now();
        let mut info = QueueUnitInfo::new(QueueUnit::new("ns", "a", "TFJob"), now);
        info.attempts = 3;
        info.replace_unit(QueueUnit::new("ns", "a", "TFJob").with_priority(9));
        assert_eq!(info.attempts, 3);
        assert_eq!(info.initial_attempt_timestamp, now);
        assert_eq!(info.unit.effective_priority(), 9);
    }
}
