//! Shared test doubles: an in-memory backend with a fake client, resourcers
//! that record their calls, and a scripted informer factory.

#![allow(dead_code)]

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::{json, Value};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use resource_runtime::controller::ConnectionManager;
use resource_runtime::error::{Error, Result};
use resource_runtime::informer::{InformerChannels, InformerFactory};
use resource_runtime::resourcer::{DynamicResourcer, Resourcer};
use resource_runtime::types::{
    Connection, ConnectionStatus, CreateInput, CreateResult, DeleteInput, DeleteResult, FindInput,
    FindResult, GetInput, GetResult, InformerAddPayload, InformerDeletePayload,
    InformerUpdatePayload, ListInput, ListResult, OperationResult, PluginContext, ResourceMeta,
    UpdateInput, UpdateResult,
};

pub const POD: &str = "core::v1::Pod";

/// Ordered record of calls across test doubles
pub type CallLog = Arc<Mutex<Vec<String>>>;

pub fn call_log() -> CallLog {
    Arc::new(Mutex::new(Vec::new()))
}

pub fn pod_meta() -> ResourceMeta {
    ResourceMeta::new("core", "v1", "Pod").with_category("Workloads")
}

/// Client handed out by [`MockConnections`]; carries the connection it
/// belongs to so tests can check which client a resourcer received
#[derive(Debug)]
pub struct MockClient {
    pub connection_id: String,
}

// ============================================================================
// Connections
// ============================================================================

pub struct MockConnections {
    connections: Mutex<BTreeMap<String, Connection>>,
    clients: Mutex<HashMap<String, Arc<MockClient>>>,
    start_status: Mutex<HashMap<String, ConnectionStatus>>,
    log: CallLog,
}

impl MockConnections {
    pub fn new(ids: &[&str], log: CallLog) -> Self {
        Self {
            connections: Mutex::new(
                ids.iter()
                    .map(|id| (id.to_string(), Connection::new(*id)))
                    .collect(),
            ),
            clients: Mutex::new(HashMap::new()),
            start_status: Mutex::new(HashMap::new()),
            log,
        }
    }

    /// Make `start_connection` report `status` for `id` without a client
    pub fn fail_start(&self, id: &str, status: ConnectionStatus) {
        self.start_status.lock().insert(id.to_string(), status);
    }

    fn require(&self, id: &str) -> Result<Connection> {
        self.connections
            .lock()
            .get(id)
            .cloned()
            .ok_or_else(|| Error::ConnectionNotFound(id.to_string()))
    }
}

#[async_trait]
impl ConnectionManager<MockClient> for MockConnections {
    async fn load_connections(&self, _ctx: &PluginContext) -> Result<Vec<Connection>> {
        Ok(self.connections.lock().values().cloned().collect())
    }

    async fn list_connections(&self, _ctx: &PluginContext) -> Result<Vec<Connection>> {
        Ok(self.connections.lock().values().cloned().collect())
    }

    async fn get_connection(&self, _ctx: &PluginContext, id: &str) -> Result<Connection> {
        self.require(id)
    }

    async fn update_connection(
        &self,
        _ctx: &PluginContext,
        connection: Connection,
    ) -> Result<Connection> {
        self.require(&connection.id)?;
        self.connections
            .lock()
            .insert(connection.id.clone(), connection.clone());
        Ok(connection)
    }

    async fn delete_connection(&self, _ctx: &PluginContext, id: &str) -> Result<()> {
        self.log.lock().push(format!("connections.delete:{id}"));
        self.clients.lock().remove(id);
        self.connections
            .lock()
            .remove(id)
            .map(|_| ())
            .ok_or_else(|| Error::ConnectionNotFound(id.to_string()))
    }

    async fn start_connection(&self, _ctx: &PluginContext, id: &str) -> Result<ConnectionStatus> {
        self.require(id)?;
        self.log.lock().push(format!("connections.start:{id}"));
        let status = self
            .start_status
            .lock()
            .get(id)
            .copied()
            .unwrap_or(ConnectionStatus::Connected);
        if status.is_connected() {
            self.clients.lock().insert(
                id.to_string(),
                Arc::new(MockClient {
                    connection_id: id.to_string(),
                }),
            );
        }
        if let Some(connection) = self.connections.lock().get_mut(id) {
            connection.status = status;
        }
        Ok(status)
    }

    async fn stop_connection(&self, _ctx: &PluginContext, id: &str) -> Result<Connection> {
        self.log.lock().push(format!("connections.stop:{id}"));
        self.clients.lock().remove(id);
        if let Some(connection) = self.connections.lock().get_mut(id) {
            connection.status = ConnectionStatus::Unknown;
        }
        self.require(id)
    }

    async fn get_connection_client(
        &self,
        _ctx: &PluginContext,
        id: &str,
    ) -> Result<Arc<MockClient>> {
        self.log.lock().push(format!("connections.client:{id}"));
        self.require(id)?;
        self.clients
            .lock()
            .get(id)
            .cloned()
            .ok_or_else(|| Error::ConnectionNotStarted(id.to_string()))
    }

    async fn refresh_connection_client(&self, _ctx: &PluginContext, id: &str) -> Result<()> {
        self.log.lock().push(format!("connections.refresh:{id}"));
        Ok(())
    }
}

// ============================================================================
// Resourcers
// ============================================================================

/// Static pod resourcer backed by two fixed pods
pub struct PodResourcer {
    pub log: CallLog,
}

impl PodResourcer {
    fn record(&self, op: &str, client: &MockClient) {
        self.log
            .lock()
            .push(format!("pods.{op}:{}", client.connection_id));
    }
}

fn pod(name: &str, connection_id: &str) -> Value {
    json!({
        "metadata": { "name": name, "namespace": "default" },
        "connection": connection_id,
    })
}

#[async_trait]
impl Resourcer<MockClient> for PodResourcer {
    async fn get(
        &self,
        _ctx: &PluginContext,
        client: &MockClient,
        input: GetInput,
    ) -> Result<GetResult> {
        self.record("get", client);
        Ok(OperationResult::ok(pod(&input.id, &client.connection_id)))
    }

    async fn list(
        &self,
        _ctx: &PluginContext,
        client: &MockClient,
        input: ListInput,
    ) -> Result<ListResult> {
        self.record("list", client);
        let items = vec![
            pod("web-0", &client.connection_id),
            pod("web-1", &client.connection_id),
        ];
        Ok(ListResult::paged(items, input.pagination))
    }

    async fn find(
        &self,
        _ctx: &PluginContext,
        client: &MockClient,
        input: FindInput,
    ) -> Result<FindResult> {
        self.record("find", client);
        Ok(ListResult::paged(Vec::new(), input.pagination))
    }

    async fn create(
        &self,
        _ctx: &PluginContext,
        client: &MockClient,
        input: CreateInput,
    ) -> Result<CreateResult> {
        self.record("create", client);
        Ok(OperationResult::ok(input.input))
    }

    async fn update(
        &self,
        _ctx: &PluginContext,
        client: &MockClient,
        input: UpdateInput,
    ) -> Result<UpdateResult> {
        self.record("update", client);
        Ok(OperationResult::ok(input.input))
    }

    async fn delete(
        &self,
        _ctx: &PluginContext,
        client: &MockClient,
        input: DeleteInput,
    ) -> Result<DeleteResult> {
        self.record("delete", client);
        Ok(OperationResult::ok(json!({ "deleted": input.id })))
    }
}

/// Dynamic resourcer that echoes the resolved resource type
pub struct EchoResourcer {
    pub log: CallLog,
}

impl EchoResourcer {
    fn record(&self, op: &str, meta: &ResourceMeta) -> Value {
        self.log.lock().push(format!("dynamic.{op}:{}", meta.key()));
        json!({ "group": meta.group, "version": meta.version, "kind": meta.kind })
    }
}

#[async_trait]
impl DynamicResourcer<MockClient> for EchoResourcer {
    async fn get(
        &self,
        _ctx: &PluginContext,
        _client: &MockClient,
        meta: &ResourceMeta,
        _input: GetInput,
    ) -> Result<GetResult> {
        Ok(OperationResult::ok(self.record("get", meta)))
    }

    async fn list(
        &self,
        _ctx: &PluginContext,
        _client: &MockClient,
        meta: &ResourceMeta,
        input: ListInput,
    ) -> Result<ListResult> {
        let item = self.record("list", meta);
        Ok(ListResult::paged(vec![item], input.pagination))
    }

    async fn find(
        &self,
        _ctx: &PluginContext,
        _client: &MockClient,
        meta: &ResourceMeta,
        input: FindInput,
    ) -> Result<FindResult> {
        let item = self.record("find", meta);
        Ok(ListResult::paged(vec![item], input.pagination))
    }

    async fn create(
        &self,
        _ctx: &PluginContext,
        _client: &MockClient,
        meta: &ResourceMeta,
        _input: CreateInput,
    ) -> Result<CreateResult> {
        Ok(OperationResult::ok(self.record("create", meta)))
    }

    async fn update(
        &self,
        _ctx: &PluginContext,
        _client: &MockClient,
        meta: &ResourceMeta,
        _input: UpdateInput,
    ) -> Result<UpdateResult> {
        Ok(OperationResult::ok(self.record("update", meta)))
    }

    async fn delete(
        &self,
        _ctx: &PluginContext,
        _client: &MockClient,
        meta: &ResourceMeta,
        _input: DeleteInput,
    ) -> Result<DeleteResult> {
        Ok(OperationResult::ok(self.record("delete", meta)))
    }
}

// ============================================================================
// Informers
// ============================================================================

pub struct ScriptedHandle {
    pub connection_id: String,
    pub resources: Mutex<Vec<String>>,
}

/// For every registered resource type, emits an add, an update and a delete
/// of one object, then waits for cancellation
pub struct ScriptedFactory {
    pub log: CallLog,
    /// Keep running after cancellation, to exercise the stop timeout
    pub ignore_cancel: bool,
}

impl ScriptedFactory {
    pub fn new(log: CallLog) -> Self {
        Self {
            log,
            ignore_cancel: false,
        }
    }
}

#[async_trait]
impl InformerFactory<MockClient, ScriptedHandle> for ScriptedFactory {
    fn create(
        &self,
        _ctx: &PluginContext,
        connection: &Connection,
        client: Arc<MockClient>,
    ) -> Result<ScriptedHandle> {
        assert_eq!(client.connection_id, connection.id);
        Ok(ScriptedHandle {
            connection_id: connection.id.clone(),
            resources: Mutex::new(Vec::new()),
        })
    }

    fn register_resource(
        &self,
        _ctx: &PluginContext,
        _connection: &Connection,
        handle: &ScriptedHandle,
        meta: &ResourceMeta,
    ) -> Result<()> {
        handle.resources.lock().push(meta.key());
        Ok(())
    }

    async fn run(
        &self,
        handle: Arc<ScriptedHandle>,
        cancel: CancellationToken,
        channels: InformerChannels,
    ) -> Result<()> {
        let resources = handle.resources.lock().clone();
        let connection_id = handle.connection_id.clone();
        for key in resources {
            let object = json!({ "metadata": { "name": "obj" } });
            channels
                .add
                .send(InformerAddPayload {
                    key: key.clone(),
                    connection_id: connection_id.clone(),
                    resource_id: "obj".to_string(),
                    namespace: "default".to_string(),
                    data: object.clone(),
                })
                .await
                .map_err(|_| Error::EventChannelClosed("add"))?;
            channels
                .update
                .send(InformerUpdatePayload {
                    key: key.clone(),
                    connection_id: connection_id.clone(),
                    resource_id: "obj".to_string(),
                    namespace: "default".to_string(),
                    old_data: object.clone(),
                    new_data: json!({ "metadata": { "name": "obj", "generation": 2 } }),
                })
                .await
                .map_err(|_| Error::EventChannelClosed("update"))?;
            channels
                .delete
                .send(InformerDeletePayload {
                    key,
                    connection_id: connection_id.clone(),
                    resource_id: "obj".to_string(),
                    namespace: "default".to_string(),
                    data: object,
                })
                .await
                .map_err(|_| Error::EventChannelClosed("delete"))?;
        }

        if self.ignore_cancel {
            tokio::time::sleep(Duration::from_secs(3600)).await;
        } else {
            cancel.cancelled().await;
        }
        self.log.lock().push(format!("informer.exit:{connection_id}"));
        Ok(())
    }
}

/// Receive with a deadline so a missing event fails the test instead of
/// hanging it
pub async fn recv<T>(rx: &mut mpsc::Receiver<T>) -> T {
    tokio::time::timeout(Duration::from_secs(5), rx.recv())
        .await
        .expect("timed out waiting for event")
        .expect("event channel closed")
}

/// Poll `condition` until it holds or a few seconds pass
pub async fn eventually(mut condition: impl FnMut() -> bool) -> bool {
    for _ in 0..100 {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    condition()
}
