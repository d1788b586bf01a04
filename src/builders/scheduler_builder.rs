//! Builder assembling a scheduler from configuration.

use std::sync::Arc;

use anyhow::Context;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::config::SchedulerConfig;
use crate::core::{
    AppResult, AuditSink, BoundedDispatcher, Controller, Framework, MultiSchedulingQueue,
    PluginHandle, QuotaLister, Registry, ReleaseHandler, ReleaseRouter, Scheduler,
    SchedulerError, Spawn, UnitClient,
};
use crate::plugins::in_tree_registry;
use crate::util::clock::{RealClock, SharedClock};

/// Everything a running scheduler needs, wired together.
#[derive(Debug)]
pub struct SchedulerParts<S> {
    /// The admission loop.
    pub scheduler: Scheduler<S>,
    /// Event router feeding the loop's queues.
    pub controller: Controller,
}

/// Creates the release handler for one `(job type, address)` entry of the
/// configured extensions.
pub type ReleaseConnector =
    Box<dyn FnMut(&str, &str) -> Result<Arc<dyn ReleaseHandler>, SchedulerError> + Send>;

/// Builder for [`Scheduler`] and its [`Controller`].
pub struct SchedulerBuilder<S> {
    config: SchedulerConfig,
    registry: Registry,
    spawner: S,
    client: Option<Arc<dyn UnitClient>>,
    quotas: Option<Arc<dyn QuotaLister>>,
    release: Option<ReleaseRouter>,
    connector: Option<ReleaseConnector>,
    audit: Option<Arc<dyn AuditSink>>,
    clock: SharedClock,
    cancel: CancellationToken,
}

impl<S> std::fmt::Debug for SchedulerBuilder<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SchedulerBuilder")
            .field("config", &self.config)
            .field("registry", &self.registry)
            .finish_non_exhaustive()
    }
}

impl<S> SchedulerBuilder<S>
where
    S: Spawn + Clone + Send + Sync + 'static,
{
    /// Builder over the in-tree plugin registry and the wall clock.
    pub fn new(config: SchedulerConfig, spawner: S) -> Self {
        Self {
            config,
            registry: in_tree_registry(),
            spawner,
            client: None,
            quotas: None,
            release: None,
            connector: None,
            audit: None,
            clock: Arc::new(RealClock),
            cancel: CancellationToken::new(),
        }
    }

    /// Builder configured from `.env` and `KUBE_QUEUE_*` variables.
    ///
    /// # Errors
    ///
    /// Invalid or unreadable configuration.
    pub fn from_env(spawner: S) -> AppResult<Self> {
        let config = SchedulerConfig::from_env()
            .map_err(anyhow::Error::msg)
            .context("loading scheduler configuration from environment")?;
        Ok(Self::new(config, spawner))
    }

    /// Configuration in use.
    #[must_use]
    pub const fn config(&self) -> &SchedulerConfig {
        &self.config
    }

    /// Replace the plugin registry, e.g. to add out-of-tree plugins.
    #[must_use]
    pub fn registry(mut self, registry: Registry) -> Self {
        self.registry = registry;
        self
    }

    /// System of record for units.
    #[must_use]
    pub fn unit_client(mut self, client: Arc<dyn UnitClient>) -> Self {
        self.client = Some(client);
        self
    }

    /// Source of namespace quotas.
    #[must_use]
    pub fn quota_lister(mut self, quotas: Arc<dyn QuotaLister>) -> Self {
        self.quotas = Some(quotas);
        self
    }

    /// Downstream release handlers by job type.
    #[must_use]
    pub fn release_router(mut self, router: ReleaseRouter) -> Self {
        self.release = Some(router);
        self
    }

    /// Build release handlers from the configured `extensions`, one call
    /// per job type. Ignored when [`Self::release_router`] is set.
    #[must_use]
    pub fn release_connector<F>(mut self, connect: F) -> Self
    where
        F: FnMut(&str, &str) -> Result<Arc<dyn ReleaseHandler>, SchedulerError> + Send + 'static,
    {
        self.connector = Some(Box::new(connect));
        self
    }

    /// Audit sink shared by the scheduler and the controller.
    #[must_use]
    pub fn audit_sink(mut self, sink: Arc<dyn AuditSink>) -> Self {
        self.audit = Some(sink);
        self
    }

    /// Time source, a manual clock in tests.
    #[must_use]
    pub fn clock(mut self, clock: SharedClock) -> Self {
        self.clock = clock;
        self
    }

    /// Root token stopping the loop and every queue flush task.
    #[must_use]
    pub fn cancellation_token(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Validate the configuration, instantiate plugins, register the
    /// configured queues and wire the scheduler.
    ///
    /// # Errors
    ///
    /// [`SchedulerError::Config`] for an invalid configuration, a missing
    /// collaborator, an unknown plugin, a missing multi-queue sort plugin,
    /// an unknown queue policy, or extensions configured without a way to
    /// reach them. Errors from the release connector are returned as is.
    pub fn build(self) -> Result<SchedulerParts<S>, SchedulerError> {
        self.config
            .validate()
            .map_err(|e| SchedulerError::Config(format!("config invalid: {e}")))?;
        let client = self
            .client
            .ok_or_else(|| SchedulerError::Config("unit client not set".to_string()))?;
        let quotas = self
            .quotas
            .ok_or_else(|| SchedulerError::Config("quota lister not set".to_string()))?;

        let handle = PluginHandle { quotas };
        let framework = Arc::new(Framework::new(
            &self.registry,
            &self.config.plugins,
            &handle,
        )?);
        if framework.queue_less_fn(&self.config.default_queue_policy).is_none() {
            return Err(SchedulerError::Config(format!(
                "default queue policy `{}` is not an enabled queue sort plugin",
                self.config.default_queue_policy
            )));
        }

        let release = match (self.release, self.connector) {
            (Some(router), _) => Some(router),
            (None, Some(connect)) => Some(ReleaseRouter::from_extensions(
                &self.config.extensions,
                connect,
            )?),
            (None, None) if !self.config.extensions.is_empty() => {
                return Err(SchedulerError::Config(
                    "extensions configured but no release connector or router set".to_string(),
                ));
            }
            (None, None) => None,
        };

        let multi = Arc::new(MultiSchedulingQueue::new(
            Arc::clone(&framework),
            self.config.queue_options(),
            Arc::clone(&self.clock),
            self.config.default_queue_policy.clone(),
            &self.cancel,
        ));
        for spec in &self.config.queues {
            multi.add(spec.clone())?;
        }

        let dispatcher =
            BoundedDispatcher::new(self.spawner, self.config.max_inflight_confirmations);
        let mut scheduler = Scheduler::new(
            Arc::clone(&multi),
            Arc::clone(&framework),
            client,
            dispatcher,
            Arc::clone(&self.clock),
            self.config.idle_interval(),
            self.cancel,
        );
        let mut controller = Controller::new(multi, framework, self.clock);
        if let Some(router) = release {
            scheduler = scheduler.with_release_router(Arc::new(router));
        }
        if let Some(audit) = self.audit {
            scheduler = scheduler.with_audit(Arc::clone(&audit));
            controller = controller.with_audit(audit);
        }

        info!(
            plugins = ?self.config.plugins,
            queues = self.config.queues.len(),
            max_inflight = self.config.max_inflight_confirmations,
            "scheduler built"
        );
        Ok(SchedulerParts {
            scheduler,
            controller,
        })
    }
}
