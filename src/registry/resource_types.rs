//! Resource type manager
//!
//! Tracks which resource types exist: the statically registered ones, known
//! for every connection, and the ones discovered per connection when it is
//! synced.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::RwLock;
use tracing::{debug, info};

use crate::error::{Error, Result};
use crate::types::{Connection, PluginContext, ResourceMeta};

/// Contract the controller needs from the resource type manager
#[async_trait]
pub trait ResourceTypeManager<C>: Send + Sync
where
    C: Send + Sync + 'static,
{
    fn has_resource_type(&self, key: &str) -> bool;

    fn get_resource_type(&self, key: &str) -> Result<ResourceMeta>;

    /// Make a statically served type known for every connection
    fn add_static_type(&self, meta: ResourceMeta);

    /// Refresh the resource types available through `connection`
    async fn sync_connection(
        &self,
        ctx: &PluginContext,
        connection: &Connection,
        client: &C,
    ) -> Result<()>;

    /// Every resource type available for a synced connection
    fn get_connection_resource_types(&self, connection_id: &str) -> Result<Vec<ResourceMeta>>;

    /// Forget the discovered types for a connection
    fn remove_connection(&self, _connection_id: &str) {}
}

/// Backend hook for discovering resource types not known ahead of time
#[async_trait]
pub trait ResourceTypeDiscovery<C>: Send + Sync
where
    C: Send + Sync + 'static,
{
    async fn discover(
        &self,
        ctx: &PluginContext,
        connection: &Connection,
        client: &C,
    ) -> Result<Vec<ResourceMeta>>;
}

/// In-memory [`ResourceTypeManager`]
pub struct ResourceTypeRegistry<C>
where
    C: Send + Sync + 'static,
{
    static_types: RwLock<HashMap<String, ResourceMeta>>,
    connection_types: RwLock<HashMap<String, BTreeMap<String, ResourceMeta>>>,
    discovery: Option<Arc<dyn ResourceTypeDiscovery<C>>>,
}

impl<C> ResourceTypeRegistry<C>
where
    C: Send + Sync + 'static,
{
    pub fn new(static_types: impl IntoIterator<Item = ResourceMeta>) -> Self {
        Self {
            static_types: RwLock::new(
                static_types
                    .into_iter()
                    .map(|meta| (meta.key(), meta))
                    .collect(),
            ),
            connection_types: RwLock::new(HashMap::new()),
            discovery: None,
        }
    }

    pub fn with_discovery(mut self, discovery: Arc<dyn ResourceTypeDiscovery<C>>) -> Self {
        self.discovery = Some(discovery);
        self
    }
}

#[async_trait]
impl<C> ResourceTypeManager<C> for ResourceTypeRegistry<C>
where
    C: Send + Sync + 'static,
{
    fn has_resource_type(&self, key: &str) -> bool {
        self.static_types.read().contains_key(key)
            || self
                .connection_types
                .read()
                .values()
                .any(|types| types.contains_key(key))
    }

    fn get_resource_type(&self, key: &str) -> Result<ResourceMeta> {
        if let Some(meta) = self.static_types.read().get(key) {
            return Ok(meta.clone());
        }
        self.connection_types
            .read()
            .values()
            .find_map(|types| types.get(key).cloned())
            .ok_or_else(|| Error::ResourceTypeNotFound(key.to_string()))
    }

    fn add_static_type(&self, meta: ResourceMeta) {
        debug!(key = %meta.key(), "Added static resource type");
        self.static_types.write().insert(meta.key(), meta);
    }

    async fn sync_connection(
        &self,
        ctx: &PluginContext,
        connection: &Connection,
        client: &C,
    ) -> Result<()> {
        let discovered = match &self.discovery {
            Some(discovery) => discovery.discover(ctx, connection, client).await?,
            None => Vec::new(),
        };

        info!(
            connection = %connection.id,
            discovered = discovered.len(),
            "Synced resource types"
        );

        let types = discovered
            .into_iter()
            .map(|meta| (meta.key(), meta))
            .collect();
        self.connection_types
            .write()
            .insert(connection.id.clone(), types);
        Ok(())
    }

    fn get_connection_resource_types(&self, connection_id: &str) -> Result<Vec<ResourceMeta>> {
        let connection_types = self.connection_types.read();
        let discovered = connection_types
            .get(connection_id)
            .ok_or_else(|| Error::ConnectionNotFound(connection_id.to_string()))?;

        let mut merged: BTreeMap<String, ResourceMeta> = self
            .static_types
            .read()
            .iter()
            .map(|(key, meta)| (key.clone(), meta.clone()))
            .collect();
        // Static metas carry curated descriptions, keep them on collision
        for (key, meta) in discovered {
            merged.entry(key.clone()).or_insert_with(|| meta.clone());
        }
        Ok(merged.into_values().collect())
    }

    fn remove_connection(&self, connection_id: &str) {
        if self.connection_types.write().remove(connection_id).is_some() {
            debug!(connection = %connection_id, "Dropped discovered resource types");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FixedDiscovery(Vec<ResourceMeta>);

    #[async_trait]
    impl ResourceTypeDiscovery<()> for FixedDiscovery {
        async fn discover(
            &self,
            _ctx: &PluginContext,
            _connection: &Connection,
            _client: &(),
        ) -> Result<Vec<ResourceMeta>> {
            Ok(self.0.clone())
        }
    }

    fn pod() -> ResourceMeta {
        ResourceMeta::new("core", "v1", "Pod").with_description("Pods")
    }

    #[tokio::test]
    async fn discovered_types_are_scoped_to_their_connection() {
        let crd = ResourceMeta::new("example.com", "v1", "Widget");
        let discovered = vec![crd.clone(), ResourceMeta::new("core", "v1", "Pod")];
        let registry: ResourceTypeRegistry<()> =
            ResourceTypeRegistry::new([pod()]).with_discovery(Arc::new(FixedDiscovery(discovered)));

        assert!(registry.has_resource_type("core::v1::Pod"));
        assert!(!registry.has_resource_type("example.com::v1::Widget"));
        assert!(registry.get_connection_resource_types("cluster-a").is_err());

        let ctx = PluginContext::default();
        registry
            .sync_connection(&ctx, &Connection::new("cluster-a"), &())
            .await
            .unwrap();

        assert!(registry.has_resource_type("example.com::v1::Widget"));
        let types = registry.get_connection_resource_types("cluster-a").unwrap();
        assert_eq!(types.len(), 2);
        let pod_meta = types.iter().find(|m| m.kind == "Pod").unwrap();
        assert_eq!(pod_meta.description, "Pods");

        registry.remove_connection("cluster-a");
        assert!(!registry.has_resource_type("example.com::v1::Widget"));
    }

    #[test]
    fn static_types_can_be_added_later() {
        let registry: ResourceTypeRegistry<()> = ResourceTypeRegistry::new([pod()]);
        assert!(!registry.has_resource_type("apps::v1::Deployment"));

        registry.add_static_type(ResourceMeta::new("apps", "v1", "Deployment"));
        assert!(registry.has_resource_type("apps::v1::Deployment"));
        assert_eq!(
            registry.get_resource_type("apps::v1::Deployment").unwrap().kind,
            "Deployment"
        );
    }

    #[tokio::test]
    async fn unknown_type_lookup_fails() {
        let registry: ResourceTypeRegistry<()> = ResourceTypeRegistry::new([pod()]);
        let err = registry.get_resource_type("core::v1::Bogus").unwrap_err();
        assert!(err.to_string().contains("not found"));
    }
}
