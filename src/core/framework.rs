//! Scheduling plugin framework.
//!
//! Plugins are named objects implementing any subset of four capabilities:
//! multi-queue sort, queue sort, filter and reserve. A [`Registry`] maps
//! plugin names to constructors; [`Framework::new`] instantiates the enabled
//! ones in order and files each instance under the capabilities it exposes
//! through the `as_*` accessors of [`Plugin`]. After construction all
//! dispatch goes through plain trait-object calls.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, warn};

use super::client::QuotaLister;
use super::{QueueInfo, QueueUnitInfo, SchedulerError};

/// Outcome class of a plugin call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Code {
    /// The plugin ran and accepts the unit.
    Success,
    /// Internal plugin error or unexpected input.
    Error,
    /// The unit cannot be admitted right now.
    Unschedulable,
    /// The unit cannot be admitted and retrying will not help by itself.
    UnschedulableAndUnresolvable,
}

/// Result of a plugin call: a code plus a human readable reason.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Status {
    code: Code,
    message: String,
}

impl Status {
    /// Build a status.
    pub fn new(code: Code, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    /// Success without a message.
    #[must_use]
    pub const fn success() -> Self {
        Self {
            code: Code::Success,
            message: String::new(),
        }
    }

    /// An [`Code::Error`] status.
    pub fn error(message: impl Into<String>) -> Self {
        Self::new(Code::Error, message)
    }

    /// The code.
    #[must_use]
    pub const fn code(&self) -> Code {
        self.code
    }

    /// The reason.
    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }

    /// Whether the code is [`Code::Success`].
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.code == Code::Success
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}: {}", self.code, self.message)
    }
}

/// Base trait of every plugin.
///
/// The `as_*` accessors advertise capabilities; each returns `None` unless
/// the plugin overrides it to hand itself out as that capability.
pub trait Plugin: Send + Sync {
    /// Unique plugin name.
    fn name(&self) -> &str;

    /// Cross-queue ordering capability.
    fn as_multi_queue_sort(self: Arc<Self>) -> Option<Arc<dyn MultiQueueSortPlugin>> {
        None
    }

    /// Within-queue ordering capability.
    fn as_queue_sort(self: Arc<Self>) -> Option<Arc<dyn QueueSortPlugin>> {
        None
    }

    /// Admission predicate capability.
    fn as_filter(self: Arc<Self>) -> Option<Arc<dyn FilterPlugin>> {
        None
    }

    /// Reservation bookkeeping capability.
    fn as_reserve(self: Arc<Self>) -> Option<Arc<dyn ReservePlugin>> {
        None
    }
}

/// Total order across named queues.
pub trait MultiQueueSortPlugin: Plugin {
    /// Whether `a` should be visited before `b`.
    fn multi_queue_less(&self, a: &QueueInfo, b: &QueueInfo) -> bool;
}

/// Total order within one queue.
pub trait QueueSortPlugin: Plugin {
    /// Whether `a` should be popped before `b`.
    fn queue_less(&self, a: &QueueUnitInfo, b: &QueueUnitInfo) -> bool;
}

/// Admission predicate.
#[async_trait]
pub trait FilterPlugin: Plugin {
    /// Decide whether `unit` may be admitted now.
    async fn filter(&self, unit: &QueueUnitInfo) -> Status;
}

/// Tentative resource commitment.
#[async_trait]
pub trait ReservePlugin: Plugin {
    /// Commit resources for `unit`; must refuse a second reservation of the same unit.
    async fn reserve(&self, unit: &QueueUnitInfo) -> Status;

    /// Release whatever `unit` holds; a no-op when it holds nothing.
    async fn unreserve(&self, unit: &QueueUnitInfo) -> Status;
}

/// Comparator handed to single queues.
pub type QueueLessFn = Arc<dyn Fn(&QueueUnitInfo, &QueueUnitInfo) -> bool + Send + Sync>;

/// Shared handles a plugin constructor may use.
#[derive(Clone)]
pub struct PluginHandle {
    /// Source of namespace quotas.
    pub quotas: Arc<dyn QuotaLister>,
}

impl fmt::Debug for PluginHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PluginHandle").finish_non_exhaustive()
    }
}

/// Constructor for one plugin.
pub type PluginFactory =
    Arc<dyn Fn(&PluginHandle) -> Result<Arc<dyn Plugin>, SchedulerError> + Send + Sync>;

/// Ordered mapping from plugin name to constructor.
///
/// Built once by the process entry point and never mutated afterwards.
#[derive(Clone, Default)]
pub struct Registry {
    factories: Vec<(String, PluginFactory)>,
}

impl fmt::Debug for Registry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list()
            .entries(self.factories.iter().map(|(name, _)| name))
            .finish()
    }
}

impl Registry {
    /// Empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a constructor.
    ///
    /// # Errors
    ///
    /// [`SchedulerError::DuplicateKey`] when the name is already registered.
    pub fn register<F>(&mut self, name: impl Into<String>, factory: F) -> Result<(), SchedulerError>
    where
        F: Fn(&PluginHandle) -> Result<Arc<dyn Plugin>, SchedulerError> + Send + Sync + 'static,
    {
        let name = name.into();
        if self.contains(&name) {
            return Err(SchedulerError::DuplicateKey(name));
        }
        self.factories.push((name, Arc::new(factory)));
        Ok(())
    }

    /// Builder-style [`Registry::register`].
    ///
    /// # Errors
    ///
    /// See [`Registry::register`].
    pub fn with<F>(mut self, name: impl Into<String>, factory: F) -> Result<Self, SchedulerError>
    where
        F: Fn(&PluginHandle) -> Result<Arc<dyn Plugin>, SchedulerError> + Send + Sync + 'static,
    {
        self.register(name, factory)?;
        Ok(self)
    }

    /// Whether `name` is registered.
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.factories.iter().any(|(n, _)| n == name)
    }

    /// Registered names in registration order.
    #[must_use]
    pub fn names(&self) -> Vec<String> {
        self.factories.iter().map(|(n, _)| n.clone()).collect()
    }

    fn factory(&self, name: &str) -> Option<&PluginFactory> {
        self.factories
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, f)| f)
    }
}

/// The assembled set of active plugins.
pub struct Framework {
    multi_queue_sort: Arc<dyn MultiQueueSortPlugin>,
    queue_sort: HashMap<String, Arc<dyn QueueSortPlugin>>,
    filters: Vec<Arc<dyn FilterPlugin>>,
    reserves: Vec<Arc<dyn ReservePlugin>>,
}

impl fmt::Debug for Framework {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Framework")
            .field("multi_queue_sort", &self.multi_queue_sort.name())
            .field("queue_sort", &self.queue_sort.keys().collect::<Vec<_>>())
            .field(
                "filters",
                &self.filters.iter().map(|p| p.name()).collect::<Vec<_>>(),
            )
            .field(
                "reserves",
                &self.reserves.iter().map(|p| p.name()).collect::<Vec<_>>(),
            )
            .finish()
    }
}

impl Framework {
    /// Instantiate `enabled` plugins from `registry`, in that order.
    ///
    /// # Errors
    ///
    /// [`SchedulerError::Config`] for an unknown plugin name, a constructor
    /// failure, or when no plugin offers multi-queue sort.
    pub fn new(
        registry: &Registry,
        enabled: &[String],
        handle: &PluginHandle,
    ) -> Result<Self, SchedulerError> {
        let mut multi_queue_sort = None;
        let mut queue_sort = HashMap::new();
        let mut filters = Vec::new();
        let mut reserves = Vec::new();

        for name in enabled {
            let factory = registry
                .factory(name)
                .ok_or_else(|| SchedulerError::Config(format!("unknown plugin `{name}`")))?;
            let plugin = factory(handle)
                .map_err(|e| SchedulerError::Config(format!("plugin `{name}` failed: {e}")))?;

            if let Some(p) = plugin.clone().as_multi_queue_sort() {
                if multi_queue_sort.is_some() {
                    return Err(SchedulerError::Config(format!(
                        "plugin `{name}` is a second multi-queue sort plugin, \
                         only one may be enabled"
                    )));
                }
                multi_queue_sort = Some(p);
            }
            if let Some(p) = plugin.clone().as_queue_sort() {
                queue_sort.insert(name.clone(), p);
            }
            if let Some(p) = plugin.clone().as_filter() {
                filters.push(p);
            }
            if let Some(p) = plugin.as_reserve() {
                reserves.push(p);
            }
            debug!(plugin = %name, "plugin enabled");
        }

        let multi_queue_sort = multi_queue_sort.ok_or_else(|| {
            SchedulerError::Config("no multi-queue sort plugin enabled".to_string())
        })?;

        Ok(Self {
            multi_queue_sort,
            queue_sort,
            filters,
            reserves,
        })
    }

    /// Cross-queue comparator.
    #[must_use]
    pub fn multi_queue_less(&self, a: &QueueInfo, b: &QueueInfo) -> bool {
        self.multi_queue_sort.multi_queue_less(a, b)
    }

    /// Within-queue comparator of the queue-sort plugin called `policy`.
    #[must_use]
    pub fn queue_less_fn(&self, policy: &str) -> Option<QueueLessFn> {
        let plugin = Arc::clone(self.queue_sort.get(policy)?);
        Some(Arc::new(move |a: &QueueUnitInfo, b: &QueueUnitInfo| {
            plugin.queue_less(a, b)
        }))
    }

    /// Names of the available queue-sort policies.
    #[must_use]
    pub fn queue_sort_policies(&self) -> Vec<String> {
        let mut names: Vec<String> = self.queue_sort.keys().cloned().collect();
        names.sort();
        names
    }

    /// Run every filter in order, stopping at the first non-success.
    pub async fn run_filter_plugins(&self, unit: &QueueUnitInfo) -> Status {
        for plugin in &self.filters {
            let status = plugin.filter(unit).await;
            if !status.is_success() {
                debug!(plugin = plugin.name(), unit = %unit.key, %status, "filter rejected unit");
                return status;
            }
        }
        Status::success()
    }

    /// Run every reserve in order, stopping at the first non-success.
    ///
    /// Plugins that already succeeded are not rolled back here; the caller
    /// decides whether to run [`Framework::run_reserve_plugins_unreserve`].
    pub async fn run_reserve_plugins_reserve(&self, unit: &QueueUnitInfo) -> Status {
        for plugin in &self.reserves {
            let status = plugin.reserve(unit).await;
            if !status.is_success() {
                debug!(plugin = plugin.name(), unit = %unit.key, %status, "reserve failed");
                return status;
            }
        }
        Status::success()
    }

    /// Run every unreserve, ignoring individual failures.
    pub async fn run_reserve_plugins_unreserve(&self, unit: &QueueUnitInfo) {
        for plugin in &self.reserves {
            let status = plugin.unreserve(unit).await;
            if !status.is_success() {
                warn!(plugin = plugin.name(), unit = %unit.key, %status, "unreserve failed");
            }
        }
    }
}
