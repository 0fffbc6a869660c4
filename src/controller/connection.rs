//! Connection manager contract

use std::sync::Arc;

use async_trait::async_trait;

use crate::error::{Error, Result};
use crate::types::{Connection, ConnectionStatus, PluginContext};

/// Owns connections and their clients for one backend.
///
/// A connection has at most one live client. Implementations own credential
/// handling and client construction; the controller only asks for clients.
#[async_trait]
pub trait ConnectionManager<C>: Send + Sync
where
    C: Send + Sync + 'static,
{
    /// Discover connections from the backend's configuration source
    async fn load_connections(&self, ctx: &PluginContext) -> Result<Vec<Connection>>;

    async fn list_connections(&self, ctx: &PluginContext) -> Result<Vec<Connection>>;

    async fn get_connection(&self, ctx: &PluginContext, id: &str) -> Result<Connection>;

    async fn update_connection(
        &self,
        ctx: &PluginContext,
        connection: Connection,
    ) -> Result<Connection>;

    async fn delete_connection(&self, ctx: &PluginContext, id: &str) -> Result<()>;

    /// Establish the connection's client and report the resulting status
    async fn start_connection(&self, ctx: &PluginContext, id: &str) -> Result<ConnectionStatus>;

    /// Tear down the connection's client
    async fn stop_connection(&self, ctx: &PluginContext, id: &str) -> Result<Connection>;

    async fn get_connection_client(&self, ctx: &PluginContext, id: &str) -> Result<Arc<C>>;

    /// Rebuild the connection's client, e.g. after credentials rotate
    async fn refresh_connection_client(&self, ctx: &PluginContext, id: &str) -> Result<()>;

    /// Client for the connection carried by `ctx`
    async fn get_current_connection_client(&self, ctx: &PluginContext) -> Result<Arc<C>> {
        let id = ctx.connection_id().ok_or(Error::MissingConnection)?;
        self.get_connection_client(ctx, id).await
    }

    /// Set `ctx.connection` to the connection with the given id
    async fn inject_connection(&self, ctx: &mut PluginContext, id: &str) -> Result<()> {
        let connection = self.get_connection(ctx, id).await?;
        ctx.connection = Some(connection);
        Ok(())
    }
}
