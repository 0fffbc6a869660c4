//! Resource controller
//!
//! The facade the host talks to. For every operation it resolves the
//! resourcer and connection client for the requested resource type, runs the
//! hook pipeline around the call, and reports the outcome. It also owns the
//! connection lifecycle: starting a connection syncs its resource types and
//! starts its informer, stopping one tears the informer down before the
//! client.

mod builder;
mod connection;

pub use builder::ControllerBuilder;
pub use connection::ConnectionManager;

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use crate::error::{Error, Result};
use crate::hooks::{HookManager, HookSet, OperationHooks, ALL_RESOURCES};
use crate::informer::{ConnectionInformers, InformerChannels};
use crate::metrics;
use crate::registry::{ResourceTypeManager, ResourcerLookup, ResourcerRegistry};
use crate::resourcer::{DynamicResourcer, Resourcer};
use crate::types::{
    Connection, ConnectionStatus, CreateInput, CreateResult, DeleteInput, DeleteResult,
    FindInput, FindResult, GetInput, GetResult, ListInput, ListResult, Operation, PluginContext,
    ResourceMeta, UpdateInput, UpdateResult,
};

/// The strategy chosen for a resource type
enum Handler<C>
where
    C: Send + Sync + 'static,
{
    Static(Arc<dyn Resourcer<C>>),
    Dynamic(Arc<dyn DynamicResourcer<C>>, ResourceMeta),
}

struct Resolved<C>
where
    C: Send + Sync + 'static,
{
    client: Arc<C>,
    handler: Handler<C>,
}

/// Dispatches resource operations and manages connection lifecycles
pub struct ResourceController<C>
where
    C: Send + Sync + 'static,
{
    registry: Arc<ResourcerRegistry<C>>,
    resource_types: Arc<dyn ResourceTypeManager<C>>,
    connections: Arc<dyn ConnectionManager<C>>,
    hooks: Arc<HookManager>,
    informers: Option<Arc<dyn ConnectionInformers<C>>>,
    informer_stop_timeout: Duration,
}

impl<C> ResourceController<C>
where
    C: Send + Sync + 'static,
{
    pub fn builder(connections: Arc<dyn ConnectionManager<C>>) -> ControllerBuilder<C> {
        ControllerBuilder::new(connections)
    }

    /// Register a resourcer after the controller was built. The type becomes
    /// known to the resource type manager as well.
    pub fn register_resourcer(
        &self,
        meta: ResourceMeta,
        resourcer: Arc<dyn Resourcer<C>>,
    ) -> Result<()> {
        self.registry.register_resourcers_from_map([(meta.clone(), resourcer)])?;
        self.resource_types.add_static_type(meta);
        Ok(())
    }

    pub fn hooks(&self) -> &HookManager {
        &self.hooks
    }

    // ------------------------------------------------------------------
    // Resolution
    // ------------------------------------------------------------------

    async fn resolve(&self, ctx: &PluginContext, key: &str) -> Result<Resolved<C>> {
        let known = self.resource_types.has_resource_type(key);
        if !known && !self.registry.has_dynamic_resourcers() {
            return Err(Error::ResourceTypeNotFound(key.to_string()));
        }

        let handler = match self.registry.lookup(key) {
            ResourcerLookup::Static(resourcer) => Handler::Static(resourcer),
            ResourcerLookup::Dynamic(resourcer) => {
                let meta = if known {
                    self.resource_types.get_resource_type(key)?
                } else {
                    ResourceMeta::from_key(key)?
                };
                Handler::Dynamic(resourcer, meta)
            }
            ResourcerLookup::NotFound => return Err(Error::NoResourcer(key.to_string())),
        };

        let client = self
            .connections
            .get_current_connection_client(ctx)
            .await
            .map_err(|e| Error::ClientUnavailable {
                connection: ctx.connection_id().unwrap_or("<none>").to_string(),
                source: Box::new(e),
            })?;

        Ok(Resolved { client, handler })
    }

    // ------------------------------------------------------------------
    // Resource operations
    // ------------------------------------------------------------------

    #[instrument(
        skip(self, ctx, input),
        fields(connection = ctx.connection_id().unwrap_or_default())
    )]
    pub async fn get(
        &self,
        ctx: &PluginContext,
        key: &str,
        mut input: GetInput,
    ) -> Result<GetResult> {
        let _timer = start_timer(Operation::Get);
        let result = async move {
            let resolved = self.resolve(ctx, key).await?;
            let hooks = selected_hooks(self.hooks.get(), key);
            hooks.run_pre(ctx, &mut input)?;
            let mut output = match &resolved.handler {
                Handler::Static(r) => r.get(ctx, &resolved.client, input).await?,
                Handler::Dynamic(r, meta) => r.get(ctx, &resolved.client, meta, input).await?,
            };
            hooks.run_post(ctx, &mut output)?;
            Ok::<_, Error>(output)
        }
        .await;
        record(Operation::Get, key, result)
    }

    #[instrument(
        skip(self, ctx, input),
        fields(connection = ctx.connection_id().unwrap_or_default())
    )]
    pub async fn list(
        &self,
        ctx: &PluginContext,
        key: &str,
        mut input: ListInput,
    ) -> Result<ListResult> {
        let _timer = start_timer(Operation::List);
        let result = async move {
            let resolved = self.resolve(ctx, key).await?;
            let hooks = selected_hooks(self.hooks.list(), key);
            hooks.run_pre(ctx, &mut input)?;
            let mut output = match &resolved.handler {
                Handler::Static(r) => r.list(ctx, &resolved.client, input).await?,
                Handler::Dynamic(r, meta) => r.list(ctx, &resolved.client, meta, input).await?,
            };
            hooks.run_post(ctx, &mut output)?;
            Ok::<_, Error>(output)
        }
        .await;
        record(Operation::List, key, result)
    }

    #[instrument(
        skip(self, ctx, input),
        fields(connection = ctx.connection_id().unwrap_or_default())
    )]
    pub async fn find(
        &self,
        ctx: &PluginContext,
        key: &str,
        mut input: FindInput,
    ) -> Result<FindResult> {
        let _timer = start_timer(Operation::Find);
        let result = async move {
            let resolved = self.resolve(ctx, key).await?;
            let hooks = selected_hooks(self.hooks.find(), key);
            hooks.run_pre(ctx, &mut input)?;
            let mut output = match &resolved.handler {
                Handler::Static(r) => r.find(ctx, &resolved.client, input).await?,
                Handler::Dynamic(r, meta) => r.find(ctx, &resolved.client, meta, input).await?,
            };
            hooks.run_post(ctx, &mut output)?;
            Ok::<_, Error>(output)
        }
        .await;
        record(Operation::Find, key, result)
    }

    #[instrument(
        skip(self, ctx, input),
        fields(connection = ctx.connection_id().unwrap_or_default())
    )]
    pub async fn create(
        &self,
        ctx: &PluginContext,
        key: &str,
        mut input: CreateInput,
    ) -> Result<CreateResult> {
        let _timer = start_timer(Operation::Create);
        let result = async move {
            let resolved = self.resolve(ctx, key).await?;
            let hooks = selected_hooks(self.hooks.create(), key);
            hooks.run_pre(ctx, &mut input)?;
            let mut output = match &resolved.handler {
                Handler::Static(r) => r.create(ctx, &resolved.client, input).await?,
                Handler::Dynamic(r, meta) => r.create(ctx, &resolved.client, meta, input).await?,
            };
            hooks.run_post(ctx, &mut output)?;
            Ok::<_, Error>(output)
        }
        .await;
        record(Operation::Create, key, result)
    }

    #[instrument(
        skip(self, ctx, input),
        fields(connection = ctx.connection_id().unwrap_or_default())
    )]
    pub async fn update(
        &self,
        ctx: &PluginContext,
        key: &str,
        mut input: UpdateInput,
    ) -> Result<UpdateResult> {
        let _timer = start_timer(Operation::Update);
        let result = async move {
            let resolved = self.resolve(ctx, key).await?;
            let hooks = selected_hooks(self.hooks.update(), key);
            hooks.run_pre(ctx, &mut input)?;
            let mut output = match &resolved.handler {
                Handler::Static(r) => r.update(ctx, &resolved.client, input).await?,
                Handler::Dynamic(r, meta) => r.update(ctx, &resolved.client, meta, input).await?,
            };
            hooks.run_post(ctx, &mut output)?;
            Ok::<_, Error>(output)
        }
        .await;
        record(Operation::Update, key, result)
    }

    #[instrument(
        skip(self, ctx, input),
        fields(connection = ctx.connection_id().unwrap_or_default())
    )]
    pub async fn delete(
        &self,
        ctx: &PluginContext,
        key: &str,
        mut input: DeleteInput,
    ) -> Result<DeleteResult> {
        let _timer = start_timer(Operation::Delete);
        let result = async move {
            let resolved = self.resolve(ctx, key).await?;
            let hooks = selected_hooks(self.hooks.delete(), key);
            hooks.run_pre(ctx, &mut input)?;
            let mut output = match &resolved.handler {
                Handler::Static(r) => r.delete(ctx, &resolved.client, input).await?,
                Handler::Dynamic(r, meta) => r.delete(ctx, &resolved.client, meta, input).await?,
            };
            hooks.run_post(ctx, &mut output)?;
            Ok::<_, Error>(output)
        }
        .await;
        record(Operation::Delete, key, result)
    }

    // ------------------------------------------------------------------
    // Resource types
    // ------------------------------------------------------------------

    pub fn has_resource_type(&self, key: &str) -> bool {
        self.resource_types.has_resource_type(key)
    }

    pub fn get_resource_type(&self, key: &str) -> Result<ResourceMeta> {
        self.resource_types.get_resource_type(key)
    }

    pub fn get_resource_types(&self, connection_id: &str) -> Result<Vec<ResourceMeta>> {
        self.resource_types.get_connection_resource_types(connection_id)
    }

    // ------------------------------------------------------------------
    // Connections
    // ------------------------------------------------------------------

    pub async fn load_connections(&self, ctx: &PluginContext) -> Result<Vec<Connection>> {
        let connections = self.connections.load_connections(ctx).await?;
        info!(count = connections.len(), "Loaded connections");
        Ok(connections)
    }

    pub async fn list_connections(&self, ctx: &PluginContext) -> Result<Vec<Connection>> {
        self.connections.list_connections(ctx).await
    }

    pub async fn get_connection(&self, ctx: &PluginContext, id: &str) -> Result<Connection> {
        self.connections.get_connection(ctx, id).await
    }

    pub async fn update_connection(
        &self,
        ctx: &PluginContext,
        connection: Connection,
    ) -> Result<Connection> {
        self.connections.update_connection(ctx, connection).await
    }

    /// Delete a connection, tearing down its informer first
    #[instrument(skip(self, ctx))]
    pub async fn delete_connection(&self, ctx: &PluginContext, id: &str) -> Result<()> {
        self.teardown_informer(id).await?;
        self.connections.delete_connection(ctx, id).await?;
        self.resource_types.remove_connection(id);
        info!(connection = %id, "Deleted connection");
        Ok(())
    }

    /// Start a connection: establish its client, sync its resource types and
    /// start its informer. Returns early with the status if the connection
    /// did not come up.
    #[instrument(skip(self, ctx))]
    pub async fn start_connection(
        &self,
        ctx: &PluginContext,
        id: &str,
    ) -> Result<ConnectionStatus> {
        let status = self.connections.start_connection(ctx, id).await?;
        metrics::CONNECTION_STARTS
            .with_label_values(&[status.as_str()])
            .inc();

        if !status.is_connected() {
            warn!(connection = %id, status = %status, "Connection did not come up");
            return Ok(status);
        }

        let (conn_ctx, connection, client) = self.connection_scope(ctx, id).await?;
        self.resource_types
            .sync_connection(&conn_ctx, &connection, &client)
            .await?;
        self.start_informer(&conn_ctx, &connection, client)?;

        info!(connection = %id, "Connection started");
        Ok(status)
    }

    /// Stop a connection. The informer is torn down before the client since
    /// the watch holds a reference to it.
    #[instrument(skip(self, ctx))]
    pub async fn stop_connection(&self, ctx: &PluginContext, id: &str) -> Result<Connection> {
        self.teardown_informer(id).await?;
        let connection = self.connections.stop_connection(ctx, id).await?;
        self.resource_types.remove_connection(id);
        info!(connection = %id, "Connection stopped");
        Ok(connection)
    }

    /// Stop, refresh the client, and start again
    #[instrument(skip(self, ctx))]
    pub async fn restart_connection(
        &self,
        ctx: &PluginContext,
        id: &str,
    ) -> Result<ConnectionStatus> {
        self.stop_connection(ctx, id).await?;
        self.connections.refresh_connection_client(ctx, id).await?;
        self.start_connection(ctx, id).await
    }

    /// Start the informer of an already started connection
    pub async fn start_connection_informer(&self, ctx: &PluginContext, id: &str) -> Result<()> {
        let (conn_ctx, connection, client) = self.connection_scope(ctx, id).await?;
        self.start_informer(&conn_ctx, &connection, client)
    }

    /// Stop and remove a connection's informer, leaving its client up
    pub async fn stop_connection_informer(&self, id: &str) -> Result<()> {
        self.teardown_informer(id).await
    }

    /// Run the informer fan-in until `stop` fires, forwarding events to `host`
    pub async fn listen_for_events(
        &self,
        stop: CancellationToken,
        host: InformerChannels,
    ) -> Result<()> {
        match &self.informers {
            Some(informers) => informers.run(stop, host).await,
            None => {
                debug!("No informer configured, waiting for stop");
                stop.cancelled().await;
                Ok(())
            }
        }
    }

    async fn connection_scope(
        &self,
        ctx: &PluginContext,
        id: &str,
    ) -> Result<(PluginContext, Connection, Arc<C>)> {
        let connection = self.connections.get_connection(ctx, id).await?;
        let client = self
            .connections
            .get_connection_client(ctx, id)
            .await
            .map_err(|e| Error::ClientUnavailable {
                connection: id.to_string(),
                source: Box::new(e),
            })?;
        let mut conn_ctx = ctx.clone();
        conn_ctx.connection = Some(connection.clone());
        Ok((conn_ctx, connection, client))
    }

    fn start_informer(
        &self,
        ctx: &PluginContext,
        connection: &Connection,
        client: Arc<C>,
    ) -> Result<()> {
        let Some(informers) = &self.informers else {
            return Ok(());
        };
        if informers.has_connection(&connection.id) {
            debug!(connection = %connection.id, "Informer already exists");
            return Ok(());
        }

        informers.create_connection_informer(ctx, connection, client)?;
        for meta in self
            .resource_types
            .get_connection_resource_types(&connection.id)?
        {
            informers.register_resource(ctx, connection, &meta)?;
        }
        informers.start_connection(&connection.id)
    }

    async fn teardown_informer(&self, id: &str) -> Result<()> {
        let Some(informers) = &self.informers else {
            return Ok(());
        };
        if !informers.has_connection(id) {
            return Ok(());
        }
        informers
            .stop_connection_and_wait(id, self.informer_stop_timeout)
            .await?;
        informers.remove_connection(id)
    }
}

/// Hooks registered for every resource type, followed by those for `key`
fn selected_hooks<I, O>(hooks: &OperationHooks<I, O>, key: &str) -> HookSet<I, O> {
    let global = hooks.hooks_for(ALL_RESOURCES);
    if key == ALL_RESOURCES {
        global
    } else {
        global.merge(hooks.hooks_for(key))
    }
}

fn start_timer(operation: Operation) -> prometheus::HistogramTimer {
    metrics::OPERATION_DURATION
        .with_label_values(&[operation.as_str()])
        .start_timer()
}

fn record<T>(operation: Operation, key: &str, result: Result<T>) -> Result<T> {
    match result {
        Ok(output) => {
            metrics::OPERATIONS
                .with_label_values(&[operation.as_str(), "success"])
                .inc();
            Ok(output)
        }
        Err(e) => {
            metrics::OPERATIONS
                .with_label_values(&[operation.as_str(), "error"])
                .inc();
            warn!(operation = %operation, key = %key, error = %e, "Resource operation failed");
            Err(Error::operation(operation, key, e))
        }
    }
}
