//! API discovery of per-connection resource types

use async_trait::async_trait;
use kube::discovery::{verbs, Discovery};
use kube::Client;
use tracing::{debug, instrument};

use super::{resource_meta, CORE_GROUP};
use crate::error::Result;
use crate::registry::ResourceTypeDiscovery;
use crate::types::{Connection, PluginContext, ResourceMeta};

/// Discovers every listable resource the API server serves, at the
/// recommended version of each group
#[derive(Clone, Debug, Default)]
pub struct KubeDiscovery;

impl KubeDiscovery {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl ResourceTypeDiscovery<Client> for KubeDiscovery {
    #[instrument(skip(self, _ctx, connection, client), fields(connection = %connection.id))]
    async fn discover(
        &self,
        _ctx: &PluginContext,
        connection: &Connection,
        client: &Client,
    ) -> Result<Vec<ResourceMeta>> {
        let discovery = Discovery::new(client.clone()).run().await?;

        let mut metas = Vec::new();
        for group in discovery.groups() {
            let category = if group.name().is_empty() {
                CORE_GROUP
            } else {
                group.name()
            };
            for (resource, caps) in group.recommended_resources() {
                if !caps.supports_operation(verbs::LIST) {
                    continue;
                }
                metas.push(
                    resource_meta(&resource)
                        .with_description(resource.plural.clone())
                        .with_category(category),
                );
            }
        }

        debug!(count = metas.len(), "Discovered resource types");
        Ok(metas)
    }
}
