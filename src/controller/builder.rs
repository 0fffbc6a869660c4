//! Controller assembly

use std::sync::Arc;
use std::time::Duration;

use crate::error::Result;
use crate::hooks::HookManager;
use crate::informer::ConnectionInformers;
use crate::registry::{
    ResourceTypeDiscovery, ResourceTypeManager, ResourceTypeRegistry, ResourcerRegistry,
};
use crate::resourcer::{DynamicResourcer, Resourcer};
use crate::types::ResourceMeta;

use super::{ConnectionManager, ResourceController};

const DEFAULT_INFORMER_STOP_TIMEOUT: Duration = Duration::from_secs(10);

/// Builder for [`ResourceController`]
pub struct ControllerBuilder<C>
where
    C: Send + Sync + 'static,
{
    connections: Arc<dyn ConnectionManager<C>>,
    resourcers: Vec<(ResourceMeta, Arc<dyn Resourcer<C>>)>,
    dynamic_resourcers: Vec<(String, Arc<dyn DynamicResourcer<C>>)>,
    discovery: Option<Arc<dyn ResourceTypeDiscovery<C>>>,
    resource_types: Option<Arc<dyn ResourceTypeManager<C>>>,
    hooks: Option<Arc<HookManager>>,
    informers: Option<Arc<dyn ConnectionInformers<C>>>,
    informer_stop_timeout: Duration,
}

impl<C> ControllerBuilder<C>
where
    C: Send + Sync + 'static,
{
    pub fn new(connections: Arc<dyn ConnectionManager<C>>) -> Self {
        Self {
            connections,
            resourcers: Vec::new(),
            dynamic_resourcers: Vec::new(),
            discovery: None,
            resource_types: None,
            hooks: None,
            informers: None,
            informer_stop_timeout: DEFAULT_INFORMER_STOP_TIMEOUT,
        }
    }

    /// Statically register a resourcer for `meta`
    pub fn resourcer(mut self, meta: ResourceMeta, resourcer: Arc<dyn Resourcer<C>>) -> Self {
        self.resourcers.push((meta, resourcer));
        self
    }

    /// Register a fallback for keys matching `pattern`
    pub fn dynamic_resourcer(
        mut self,
        pattern: impl Into<String>,
        resourcer: Arc<dyn DynamicResourcer<C>>,
    ) -> Self {
        self.dynamic_resourcers.push((pattern.into(), resourcer));
        self
    }

    /// Discover per-connection resource types with the default type manager
    pub fn discovery(mut self, discovery: Arc<dyn ResourceTypeDiscovery<C>>) -> Self {
        self.discovery = Some(discovery);
        self
    }

    /// Replace the default resource type manager
    pub fn resource_types(mut self, resource_types: Arc<dyn ResourceTypeManager<C>>) -> Self {
        self.resource_types = Some(resource_types);
        self
    }

    pub fn hooks(mut self, hooks: Arc<HookManager>) -> Self {
        self.hooks = Some(hooks);
        self
    }

    pub fn informers(mut self, informers: Arc<dyn ConnectionInformers<C>>) -> Self {
        self.informers = Some(informers);
        self
    }

    pub fn informer_stop_timeout(mut self, timeout: Duration) -> Self {
        self.informer_stop_timeout = timeout;
        self
    }

    /// Register everything and build the controller. Fails on a duplicate
    /// resourcer key.
    pub fn build(self) -> Result<ResourceController<C>> {
        let registry = ResourcerRegistry::new();
        registry.register_resourcers_from_map(self.resourcers)?;
        for (pattern, resourcer) in self.dynamic_resourcers {
            registry.register_dynamic_resourcer(pattern, resourcer);
        }

        let resource_types: Arc<dyn ResourceTypeManager<C>> = match self.resource_types {
            Some(resource_types) => resource_types,
            None => {
                let mut types = ResourceTypeRegistry::new(registry.resource_metas());
                if let Some(discovery) = self.discovery {
                    types = types.with_discovery(discovery);
                }
                Arc::new(types)
            }
        };

        Ok(ResourceController {
            registry: Arc::new(registry),
            resource_types,
            connections: self.connections,
            hooks: self.hooks.unwrap_or_default(),
            informers: self.informers,
            informer_stop_timeout: self.informer_stop_timeout,
        })
    }
}
