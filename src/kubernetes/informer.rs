//! Watch-based informers for a cluster connection

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use async_trait::async_trait;
use futures::stream::{self, BoxStream};
use futures::StreamExt;
use kube::api::{Api, DynamicObject};
use kube::Client;
use kube_runtime::watcher::Event;
use kube_runtime::{watcher, WatchStreamExt};
use parking_lot::Mutex;
use serde_json::Value;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::api_resource;
use crate::error::{Error, Result};
use crate::informer::{InformerChannels, InformerFactory};
use crate::types::{
    Connection, InformerAddPayload, InformerDeletePayload, InformerUpdatePayload, PluginContext,
    ResourceMeta,
};

/// Watch handle for one connection: its client and the resource types to
/// watch once started
pub struct KubeInformerHandle {
    client: Client,
    connection_id: String,
    resources: Mutex<Vec<ResourceMeta>>,
}

impl KubeInformerHandle {
    pub fn connection_id(&self) -> &str {
        &self.connection_id
    }

    pub fn resources(&self) -> Vec<ResourceMeta> {
        self.resources.lock().clone()
    }
}

/// Builds [`KubeInformerHandle`]s and runs one watcher per registered type
#[derive(Clone, Debug, Default)]
pub struct KubeInformerFactory {
    config: watcher::Config,
}

impl KubeInformerFactory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Watcher configuration used for every resource type
    pub fn with_config(config: watcher::Config) -> Self {
        Self { config }
    }
}

type WatchEvent = std::result::Result<Event<DynamicObject>, watcher::Error>;
type WatchStream = BoxStream<'static, (String, WatchEvent)>;

#[async_trait]
impl InformerFactory<Client, KubeInformerHandle> for KubeInformerFactory {
    fn create(
        &self,
        _ctx: &PluginContext,
        connection: &Connection,
        client: Arc<Client>,
    ) -> Result<KubeInformerHandle> {
        Ok(KubeInformerHandle {
            client: client.as_ref().clone(),
            connection_id: connection.id.clone(),
            resources: Mutex::new(Vec::new()),
        })
    }

    fn register_resource(
        &self,
        _ctx: &PluginContext,
        _connection: &Connection,
        handle: &KubeInformerHandle,
        meta: &ResourceMeta,
    ) -> Result<()> {
        let mut resources = handle.resources.lock();
        if !resources.iter().any(|r| r.key() == meta.key()) {
            resources.push(meta.clone());
        }
        Ok(())
    }

    async fn run(
        &self,
        handle: Arc<KubeInformerHandle>,
        cancel: CancellationToken,
        channels: InformerChannels,
    ) -> Result<()> {
        let resources = handle.resources();
        if resources.is_empty() {
            debug!(connection = %handle.connection_id, "No resource types to watch");
            cancel.cancelled().await;
            return Ok(());
        }

        let streams: Vec<WatchStream> = resources
            .iter()
            .map(|meta| {
                let api: Api<DynamicObject> =
                    Api::all_with(handle.client.clone(), &api_resource(meta));
                let key = meta.key();
                watcher(api, self.config.clone())
                    .default_backoff()
                    .map(move |event| (key.clone(), event))
                    .boxed()
            })
            .collect();
        let mut events = stream::select_all(streams);

        info!(
            connection = %handle.connection_id,
            resources = resources.len(),
            "Watching resource types"
        );

        let mut cache = ObjectCache::new(handle.connection_id.clone(), channels);
        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    debug!(connection = %handle.connection_id, "Informer cancelled");
                    break;
                }
                next = events.next() => match next {
                    Some((key, Ok(event))) => cache.apply(&key, event).await?,
                    Some((key, Err(e))) => {
                        warn!(
                            connection = %handle.connection_id,
                            key = %key,
                            error = %e,
                            "Watch error"
                        );
                    }
                    None => break,
                }
            }
        }
        Ok(())
    }
}

/// (resource type key, namespace, name)
type ObjectId = (String, String, String);

/// Last seen state of every watched object, used to turn watcher events into
/// add/update/delete payloads
struct ObjectCache {
    connection_id: String,
    channels: InformerChannels,
    objects: HashMap<ObjectId, Value>,
    /// Objects seen during an in-progress relist, per resource type key
    relisting: HashMap<String, HashSet<ObjectId>>,
}

impl ObjectCache {
    fn new(connection_id: String, channels: InformerChannels) -> Self {
        Self {
            connection_id,
            channels,
            objects: HashMap::new(),
            relisting: HashMap::new(),
        }
    }

    async fn apply(&mut self, key: &str, event: Event<DynamicObject>) -> Result<()> {
        match event {
            Event::Init => {
                self.relisting.insert(key.to_string(), HashSet::new());
            }
            Event::InitApply(object) => {
                let id = object_id(key, &object);
                if let Some(seen) = self.relisting.get_mut(key) {
                    seen.insert(id.clone());
                }
                self.upsert(id, &object).await?;
            }
            Event::InitDone => {
                // Anything not relisted was deleted while the watch was down
                let seen = self.relisting.remove(key).unwrap_or_default();
                let gone: Vec<ObjectId> = self
                    .objects
                    .keys()
                    .filter(|id| id.0 == key && !seen.contains(*id))
                    .cloned()
                    .collect();
                for id in gone {
                    if let Some(data) = self.objects.remove(&id) {
                        self.emit_delete(id, data).await?;
                    }
                }
            }
            Event::Apply(object) => {
                let id = object_id(key, &object);
                self.upsert(id, &object).await?;
            }
            Event::Delete(object) => {
                let id = object_id(key, &object);
                self.objects.remove(&id);
                let data = serde_json::to_value(&object)?;
                self.emit_delete(id, data).await?;
            }
        }
        Ok(())
    }

    async fn upsert(&mut self, id: ObjectId, object: &DynamicObject) -> Result<()> {
        let data = serde_json::to_value(object)?;
        match self.objects.insert(id.clone(), data.clone()) {
            None => {
                let (key, namespace, resource_id) = id;
                self.channels
                    .add
                    .send(InformerAddPayload {
                        key,
                        connection_id: self.connection_id.clone(),
                        resource_id,
                        namespace,
                        data,
                    })
                    .await
                    .map_err(|_| Error::EventChannelClosed("add"))
            }
            Some(old) if old == data => Ok(()),
            Some(old) => {
                let (key, namespace, resource_id) = id;
                self.channels
                    .update
                    .send(InformerUpdatePayload {
                        key,
                        connection_id: self.connection_id.clone(),
                        resource_id,
                        namespace,
                        old_data: old,
                        new_data: data,
                    })
                    .await
                    .map_err(|_| Error::EventChannelClosed("update"))
            }
        }
    }

    async fn emit_delete(&self, id: ObjectId, data: Value) -> Result<()> {
        let (key, namespace, resource_id) = id;
        self.channels
            .delete
            .send(InformerDeletePayload {
                key,
                connection_id: self.connection_id.clone(),
                resource_id,
                namespace,
                data,
            })
            .await
            .map_err(|_| Error::EventChannelClosed("delete"))
    }
}

fn object_id(key: &str, object: &DynamicObject) -> ObjectId {
    (
        key.to_string(),
        object.metadata.namespace.clone().unwrap_or_default(),
        object.metadata.name.clone().unwrap_or_default(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use kube::api::ObjectMeta;
    use serde_json::json;

    const KEY: &str = "core::v1::ConfigMap";

    fn config_map(name: &str, value: &str) -> DynamicObject {
        let resource = api_resource(&ResourceMeta::new("core", "v1", "ConfigMap"));
        let mut object = DynamicObject::new(name, &resource);
        object.metadata = ObjectMeta {
            name: Some(name.to_string()),
            namespace: Some("default".to_string()),
            ..Default::default()
        };
        object.data = json!({ "data": { "value": value } });
        object
    }

    fn cache() -> (ObjectCache, crate::informer::InformerReceivers) {
        let (channels, receivers) = InformerChannels::bounded(16);
        (ObjectCache::new("dev".to_string(), channels), receivers)
    }

    #[tokio::test]
    async fn apply_emits_add_then_update() {
        let (mut cache, mut rx) = cache();

        cache.apply(KEY, Event::Apply(config_map("a", "1"))).await.unwrap();
        let added = rx.add.recv().await.unwrap();
        assert_eq!(added.key, KEY);
        assert_eq!(added.connection_id, "dev");
        assert_eq!(added.resource_id, "a");
        assert_eq!(added.namespace, "default");

        cache.apply(KEY, Event::Apply(config_map("a", "2"))).await.unwrap();
        let updated = rx.update.recv().await.unwrap();
        assert_eq!(updated.old_data["data"]["value"], "1");
        assert_eq!(updated.new_data["data"]["value"], "2");
    }

    #[tokio::test]
    async fn unchanged_relist_is_silent_and_missing_objects_are_deleted() {
        let (mut cache, mut rx) = cache();
        cache.apply(KEY, Event::Apply(config_map("a", "1"))).await.unwrap();
        cache.apply(KEY, Event::Apply(config_map("b", "1"))).await.unwrap();
        rx.add.recv().await.unwrap();
        rx.add.recv().await.unwrap();

        cache.apply(KEY, Event::Init).await.unwrap();
        cache.apply(KEY, Event::InitApply(config_map("a", "1"))).await.unwrap();
        cache.apply(KEY, Event::InitDone).await.unwrap();

        let deleted = rx.delete.recv().await.unwrap();
        assert_eq!(deleted.resource_id, "b");
        assert!(rx.add.try_recv().is_err());
        assert!(rx.update.try_recv().is_err());
    }

    #[tokio::test]
    async fn closed_channel_is_reported() {
        let (mut cache, rx) = cache();
        drop(rx);
        let err = cache
            .apply(KEY, Event::Apply(config_map("a", "1")))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::EventChannelClosed("add")));
    }
}
