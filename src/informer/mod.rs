//! Per-connection informers and the event fan-in
//!
//! Each started connection runs a backend-specific watch task that emits
//! add/update/delete payloads on shared channels. A single
//! [`InformerManager::run`] loop multiplexes those channels onto the
//! host-facing ones and processes start/stop commands.

mod manager;

pub use manager::{InformerManager, InformerState};

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::error::Result;
use crate::types::{
    Connection, InformerAddPayload, InformerDeletePayload, InformerUpdatePayload, PluginContext,
    ResourceMeta,
};

/// Add/update/delete senders.
///
/// Backend watch tasks emit on the manager's internal set; the host hands
/// its own set to [`InformerManager::run`] and drains the receivers.
#[derive(Clone, Debug)]
pub struct InformerChannels {
    pub add: mpsc::Sender<InformerAddPayload>,
    pub update: mpsc::Sender<InformerUpdatePayload>,
    pub delete: mpsc::Sender<InformerDeletePayload>,
}

/// Receiving halves of an [`InformerChannels`] set
#[derive(Debug)]
pub struct InformerReceivers {
    pub add: mpsc::Receiver<InformerAddPayload>,
    pub update: mpsc::Receiver<InformerUpdatePayload>,
    pub delete: mpsc::Receiver<InformerDeletePayload>,
}

impl InformerChannels {
    /// Create a channel set where each channel holds up to `buffer` events
    pub fn bounded(buffer: usize) -> (Self, InformerReceivers) {
        let buffer = buffer.max(1);
        let (add, add_rx) = mpsc::channel(buffer);
        let (update, update_rx) = mpsc::channel(buffer);
        let (delete, delete_rx) = mpsc::channel(buffer);
        (
            Self {
                add,
                update,
                delete,
            },
            InformerReceivers {
                add: add_rx,
                update: update_rx,
                delete: delete_rx,
            },
        )
    }
}

/// Backend-specific informer construction and execution.
///
/// `H` is the watch handle built from a connection's client. Resource types
/// are attached to the handle before it is started.
#[async_trait]
pub trait InformerFactory<C, H>: Send + Sync + 'static
where
    C: Send + Sync + 'static,
    H: Send + Sync + 'static,
{
    fn create(&self, ctx: &PluginContext, connection: &Connection, client: Arc<C>) -> Result<H>;

    fn register_resource(
        &self,
        ctx: &PluginContext,
        connection: &Connection,
        handle: &H,
        meta: &ResourceMeta,
    ) -> Result<()>;

    /// Watch until `cancel` fires, emitting events on `channels`.
    ///
    /// Implementations must observe `cancel`; the manager never forces a
    /// running watch to exit except through
    /// [`InformerManager::stop_connection_and_wait`].
    async fn run(
        &self,
        handle: Arc<H>,
        cancel: CancellationToken,
        channels: InformerChannels,
    ) -> Result<()>;
}

/// Handle-agnostic view of an [`InformerManager`], as used by the controller
#[async_trait]
pub trait ConnectionInformers<C>: Send + Sync
where
    C: Send + Sync + 'static,
{
    fn create_connection_informer(
        &self,
        ctx: &PluginContext,
        connection: &Connection,
        client: Arc<C>,
    ) -> Result<()>;

    fn register_resource(
        &self,
        ctx: &PluginContext,
        connection: &Connection,
        meta: &ResourceMeta,
    ) -> Result<()>;

    fn start_connection(&self, connection_id: &str) -> Result<()>;

    fn stop_connection(&self, connection_id: &str) -> Result<()>;

    async fn stop_connection_and_wait(&self, connection_id: &str, timeout: Duration)
        -> Result<()>;

    fn remove_connection(&self, connection_id: &str) -> Result<()>;

    fn has_connection(&self, connection_id: &str) -> bool;

    async fn run(&self, stop: CancellationToken, host: InformerChannels) -> Result<()>;
}
