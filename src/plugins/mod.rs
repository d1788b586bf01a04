//! In-tree scheduling plugins.

pub mod priority;
pub mod resource_quota;

use std::sync::Arc;

use crate::core::{Plugin, Registry};

pub use priority::PriorityPlugin;
pub use resource_quota::ResourceQuotaPlugin;

/// Registry holding every in-tree plugin, priority first.
#[must_use]
pub fn in_tree_registry() -> Registry {
    let mut registry = Registry::new();
    // names are distinct constants, registration cannot collide
    let _ = registry.register(priority::NAME, |_| {
        Ok(Arc::new(PriorityPlugin) as Arc<dyn Plugin>)
    });
    let _ = registry.register(resource_quota::NAME, |handle| {
        Ok(Arc::new(ResourceQuotaPlugin::new(Arc::clone(&handle.quotas))) as Arc<dyn Plugin>)
    });
    registry
}

/// Plugin names enabled when the configuration names none.
#[must_use]
pub fn default_plugins() -> Vec<String> {
    vec![priority::NAME.to_string(), resource_quota::NAME.to_string()]
}
