//! Kubeconfig-backed connections

use std::collections::{BTreeMap, HashMap};
use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use kube::config::{KubeConfigOptions, Kubeconfig};
use kube::{Client, Config};
use parking_lot::RwLock;
use tracing::{debug, info, instrument, warn};

use super::status_from_error;
use crate::controller::ConnectionManager;
use crate::error::{Error, Result};
use crate::types::{Connection, ConnectionStatus, PluginContext};

/// Label set on every connection this manager produces
pub const BACKEND_LABEL: &str = "backend";

/// One connection per kubeconfig context.
///
/// Clients are only built when a connection is started, and are dropped when
/// it is stopped.
pub struct KubeConnectionManager {
    kubeconfig_path: Option<PathBuf>,
    connections: RwLock<BTreeMap<String, Connection>>,
    clients: RwLock<HashMap<String, Arc<Client>>>,
}

impl KubeConnectionManager {
    /// Manager reading `path`, or the default kubeconfig (`KUBECONFIG` or
    /// `~/.kube/config`) when `None`
    pub fn new(kubeconfig_path: Option<PathBuf>) -> Self {
        Self {
            kubeconfig_path,
            connections: RwLock::new(BTreeMap::new()),
            clients: RwLock::new(HashMap::new()),
        }
    }

    fn read_kubeconfig(&self) -> Result<Kubeconfig> {
        let kubeconfig = match &self.kubeconfig_path {
            Some(path) => Kubeconfig::read_from(path)?,
            None => Kubeconfig::read()?,
        };
        Ok(kubeconfig)
    }

    fn kubeconfig_source(&self) -> String {
        self.kubeconfig_path
            .as_ref()
            .map(|p| p.display().to_string())
            .unwrap_or_else(|| "default".to_string())
    }

    async fn build_client(&self, context: &str) -> Result<Client> {
        let kubeconfig = self.read_kubeconfig()?;
        let options = KubeConfigOptions {
            context: Some(context.to_string()),
            ..Default::default()
        };
        let config = Config::from_custom_kubeconfig(kubeconfig, &options).await?;
        Ok(Client::try_from(config)?)
    }

    fn require(&self, id: &str) -> Result<Connection> {
        self.connections
            .read()
            .get(id)
            .cloned()
            .ok_or_else(|| Error::ConnectionNotFound(id.to_string()))
    }

    fn set_status(&self, id: &str, status: ConnectionStatus) {
        if let Some(connection) = self.connections.write().get_mut(id) {
            connection.status = status;
            connection.last_refresh = Some(Utc::now());
        }
    }
}

#[async_trait]
impl ConnectionManager<Client> for KubeConnectionManager {
    #[instrument(skip(self, _ctx))]
    async fn load_connections(&self, _ctx: &PluginContext) -> Result<Vec<Connection>> {
        let kubeconfig = self.read_kubeconfig()?;
        let current = kubeconfig.current_context.clone();
        let source = self.kubeconfig_source();

        let mut connections = self.connections.write();
        let mut loaded = BTreeMap::new();
        for context in &kubeconfig.contexts {
            let mut connection = Connection::new(&context.name)
                .with_data("context", context.name.as_str())
                .with_data("kubeconfig", source.as_str())
                .with_label(BACKEND_LABEL, "kubernetes");
            if current.as_deref() == Some(context.name.as_str()) {
                connection = connection.with_label("current", "true");
            }
            // Reloading keeps the lifecycle state of known contexts
            if let Some(existing) = connections.get(&context.name) {
                connection.status = existing.status;
                connection.last_refresh = existing.last_refresh;
            }
            loaded.insert(context.name.clone(), connection);
        }

        let removed: Vec<String> = connections
            .keys()
            .filter(|id| !loaded.contains_key(*id))
            .cloned()
            .collect();
        if !removed.is_empty() {
            let mut clients = self.clients.write();
            for id in &removed {
                clients.remove(id);
            }
            debug!(removed = ?removed, "Dropped contexts no longer in kubeconfig");
        }

        *connections = loaded;
        info!(count = connections.len(), kubeconfig = %source, "Loaded kubeconfig contexts");
        Ok(connections.values().cloned().collect())
    }

    async fn list_connections(&self, _ctx: &PluginContext) -> Result<Vec<Connection>> {
        Ok(self.connections.read().values().cloned().collect())
    }

    async fn get_connection(&self, _ctx: &PluginContext, id: &str) -> Result<Connection> {
        self.require(id)
    }

    async fn update_connection(
        &self,
        _ctx: &PluginContext,
        connection: Connection,
    ) -> Result<Connection> {
        let mut connections = self.connections.write();
        let existing = connections
            .get_mut(&connection.id)
            .ok_or_else(|| Error::ConnectionNotFound(connection.id.clone()))?;
        existing.name = connection.name;
        existing.data = connection.data;
        existing.labels = connection.labels;
        if !connection.sensitive_data.is_empty() {
            existing.sensitive_data = connection.sensitive_data;
        }
        Ok(existing.clone())
    }

    async fn delete_connection(&self, _ctx: &PluginContext, id: &str) -> Result<()> {
        self.connections
            .write()
            .remove(id)
            .ok_or_else(|| Error::ConnectionNotFound(id.to_string()))?;
        self.clients.write().remove(id);
        Ok(())
    }

    /// Build a client for the context and probe the API server with it.
    ///
    /// Build and probe failures become a non-connected status rather than
    /// an error; only an unknown id is an error.
    #[instrument(skip(self, _ctx))]
    async fn start_connection(&self, _ctx: &PluginContext, id: &str) -> Result<ConnectionStatus> {
        self.require(id)?;

        let status = match self.build_client(id).await {
            Ok(client) => match client.apiserver_version().await {
                Ok(version) => {
                    info!(connection = %id, version = %version.git_version, "API server reachable");
                    self.clients.write().insert(id.to_string(), Arc::new(client));
                    ConnectionStatus::Connected
                }
                Err(e) => {
                    warn!(connection = %id, error = %e, "API server probe failed");
                    status_from_error(&e)
                }
            },
            Err(e) => {
                warn!(connection = %id, error = %e, "Failed to build client");
                ConnectionStatus::Error
            }
        };

        self.set_status(id, status);
        Ok(status)
    }

    async fn stop_connection(&self, _ctx: &PluginContext, id: &str) -> Result<Connection> {
        self.require(id)?;
        self.clients.write().remove(id);
        self.set_status(id, ConnectionStatus::Unknown);
        self.require(id)
    }

    async fn get_connection_client(&self, _ctx: &PluginContext, id: &str) -> Result<Arc<Client>> {
        self.require(id)?;
        self.clients
            .read()
            .get(id)
            .cloned()
            .ok_or_else(|| Error::ConnectionNotStarted(id.to_string()))
    }

    #[instrument(skip(self, _ctx))]
    async fn refresh_connection_client(&self, _ctx: &PluginContext, id: &str) -> Result<()> {
        self.require(id)?;
        let client = self.build_client(id).await?;
        self.clients.write().insert(id.to_string(), Arc::new(client));
        debug!(connection = %id, "Rebuilt client");
        Ok(())
    }
}
