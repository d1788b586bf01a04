//! Scheduler configuration structures.

use std::collections::{HashMap, HashSet};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::core::{BackoffPolicy, QueueOptions, QueueSpec};

/// Prefix of every environment override.
pub const ENV_PREFIX: &str = "KUBE_QUEUE_";

fn default_initial_backoff_ms() -> u64 {
    1_000
}

fn default_max_backoff_ms() -> u64 {
    4_000
}

fn default_flush_interval_ms() -> u64 {
    1_000
}

fn default_idle_interval_ms() -> u64 {
    100
}

fn default_max_inflight_confirmations() -> usize {
    num_cpus::get().max(1) * 4
}

fn default_plugins() -> Vec<String> {
    crate::plugins::default_plugins()
}

fn default_queue_policy() -> String {
    crate::plugins::priority::NAME.to_string()
}

/// Root scheduler configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// Backoff window after the first failed attempt.
    #[serde(default = "default_initial_backoff_ms")]
    pub initial_backoff_ms: u64,
    /// Largest backoff window.
    #[serde(default = "default_max_backoff_ms")]
    pub max_backoff_ms: u64,
    /// Period of each queue's backoff flush.
    #[serde(default = "default_flush_interval_ms")]
    pub flush_interval_ms: u64,
    /// Loop pause when every queue is empty.
    #[serde(default = "default_idle_interval_ms")]
    pub idle_interval_ms: u64,
    /// Concurrent confirmation calls allowed.
    #[serde(default = "default_max_inflight_confirmations")]
    pub max_inflight_confirmations: usize,
    /// Enabled plugins, in run order.
    #[serde(default = "default_plugins")]
    pub plugins: Vec<String>,
    /// Sort policy of queues that name none.
    #[serde(default = "default_queue_policy")]
    pub default_queue_policy: String,
    /// Queues registered at startup.
    #[serde(default)]
    pub queues: Vec<QueueSpec>,
    /// Job type → release handler address.
    #[serde(default)]
    pub extensions: HashMap<String, String>,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            initial_backoff_ms: default_initial_backoff_ms(),
            max_backoff_ms: default_max_backoff_ms(),
            flush_interval_ms: default_flush_interval_ms(),
            idle_interval_ms: default_idle_interval_ms(),
            max_inflight_confirmations: default_max_inflight_confirmations(),
            plugins: default_plugins(),
            default_queue_policy: default_queue_policy(),
            queues: Vec::new(),
            extensions: HashMap::new(),
        }
    }
}

impl SchedulerConfig {
    /// Validate intervals, limits, plugin list and queue names.
    pub fn validate(&self) -> Result<(), String> {
        if self.initial_backoff_ms == 0 {
            return Err("initial_backoff_ms must be greater than 0".into());
        }
        if self.max_backoff_ms < self.initial_backoff_ms {
            return Err("max_backoff_ms must not be less than initial_backoff_ms".into());
        }
        if self.flush_interval_ms == 0 {
            return Err("flush_interval_ms must be greater than 0".into());
        }
        if self.idle_interval_ms == 0 {
            return Err("idle_interval_ms must be greater than 0".into());
        }
        if self.max_inflight_confirmations == 0 {
            return Err("max_inflight_confirmations must be greater than 0".into());
        }
        if self.plugins.is_empty() {
            return Err("at least one plugin must be enabled".into());
        }
        if self.default_queue_policy.is_empty() {
            return Err("default_queue_policy must not be empty".into());
        }
        let mut seen = HashSet::new();
        for queue in &self.queues {
            if queue.name.is_empty() {
                return Err("queue names must not be empty".into());
            }
            if !seen.insert(queue.name.as_str()) {
                return Err(format!("queue `{}` defined more than once", queue.name));
            }
        }
        Ok(())
    }

    /// Parse scheduler configuration from a JSON string and validate.
    pub fn from_json_str(input: &str) -> Result<Self, String> {
        let cfg: Self = serde_json::from_str(input).map_err(|e| format!("parse error: {e}"))?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Load `.env` if present, then build from `KUBE_QUEUE_*` variables.
    ///
    /// `KUBE_QUEUE_CONFIG` may point to a JSON file used as the base; the
    /// remaining variables override single fields.
    pub fn from_env() -> Result<Self, String> {
        let _ = dotenvy::dotenv();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// [`Self::from_env`] over an arbitrary variable source.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, String>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |name: &str| lookup(&format!("{ENV_PREFIX}{name}"));

        let mut cfg = match var("CONFIG") {
            Some(path) => {
                let raw = std::fs::read_to_string(&path)
                    .map_err(|e| format!("cannot read `{path}`: {e}"))?;
                serde_json::from_str(&raw).map_err(|e| format!("parse error: {e}"))?
            }
            None => Self::default(),
        };

        if let Some(v) = var("INITIAL_BACKOFF_MS") {
            cfg.initial_backoff_ms = parse_number("INITIAL_BACKOFF_MS", &v)?;
        }
        if let Some(v) = var("MAX_BACKOFF_MS") {
            cfg.max_backoff_ms = parse_number("MAX_BACKOFF_MS", &v)?;
        }
        if let Some(v) = var("FLUSH_INTERVAL_MS") {
            cfg.flush_interval_ms = parse_number("FLUSH_INTERVAL_MS", &v)?;
        }
        if let Some(v) = var("IDLE_INTERVAL_MS") {
            cfg.idle_interval_ms = parse_number("IDLE_INTERVAL_MS", &v)?;
        }
        if let Some(v) = var("MAX_INFLIGHT_CONFIRMATIONS") {
            cfg.max_inflight_confirmations = parse_number("MAX_INFLIGHT_CONFIRMATIONS", &v)?;
        }
        if let Some(v) = var("PLUGINS") {
            cfg.plugins = v
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(String::from)
                .collect();
        }
        if let Some(v) = var("DEFAULT_QUEUE_POLICY") {
            cfg.default_queue_policy = v;
        }

        cfg.validate()?;
        Ok(cfg)
    }

    /// Queue tunables derived from this configuration.
    #[must_use]
    pub const fn queue_options(&self) -> QueueOptions {
        QueueOptions {
            backoff: BackoffPolicy {
                initial: Duration::from_millis(self.initial_backoff_ms),
                max: Duration::from_millis(self.max_backoff_ms),
            },
            flush_interval: Duration::from_millis(self.flush_interval_ms),
        }
    }

    /// Loop pause when idle.
    #[must_use]
    pub const fn idle_interval(&self) -> Duration {
        Duration::from_millis(self.idle_interval_ms)
    }
}

fn parse_number<T: std::str::FromStr>(name: &str, value: &str) -> Result<T, String>
where
    T::Err: std::fmt::Display,
{
    value
        .trim()
        .parse()
        .map_err(|e| format!("{ENV_PREFIX}{name}=`{value}` invalid: {e}"))
}
