//! Informer manager: per-connection watch entries and the fan-in loop

use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::{Mutex, RwLock};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::{ConnectionInformers, InformerChannels, InformerFactory, InformerReceivers};
use crate::error::{Error, Result};
use crate::metrics;
use crate::types::{Connection, PluginContext, ResourceMeta};

/// Lifecycle of a connection's informer entry
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum InformerState {
    /// Built and accepting resource registrations, not yet watching
    Created,
    /// Watch task spawned by the fan-in loop
    Running,
    /// Cancelled, or the watch task exited. Remove and recreate to restart.
    Stopped,
}

/// Commands name the entry generation they were issued for, so a command
/// queued before a remove and recreate never reaches the new entry
#[derive(Debug)]
enum InformerCommand {
    Start { id: String, generation: u64 },
    Stop { id: String, generation: u64 },
}

struct InformerEntry<H> {
    handle: Arc<H>,
    cancel: CancellationToken,
    state: InformerState,
    generation: u64,
    task: Option<JoinHandle<()>>,
}

type InformerMap<H> = Arc<RwLock<HashMap<String, InformerEntry<H>>>>;

struct LoopReceivers {
    commands: mpsc::UnboundedReceiver<InformerCommand>,
    events: InformerReceivers,
}

/// Owns one informer entry per connection and fans their events in.
///
/// The entry map is shared between the lifecycle methods, the fan-in loop
/// and the spawned watch tasks, and is always accessed under its lock.
pub struct InformerManager<C, H>
where
    C: Send + Sync + 'static,
    H: Send + Sync + 'static,
{
    factory: Arc<dyn InformerFactory<C, H>>,
    informers: InformerMap<H>,
    generations: AtomicU64,
    commands: mpsc::UnboundedSender<InformerCommand>,
    channels: InformerChannels,
    receivers: Mutex<Option<LoopReceivers>>,
}

impl<C, H> InformerManager<C, H>
where
    C: Send + Sync + 'static,
    H: Send + Sync + 'static,
{
    /// Create a manager whose internal event channels hold `buffer` events each
    pub fn new(factory: impl InformerFactory<C, H>, buffer: usize) -> Self {
        let (commands, commands_rx) = mpsc::unbounded_channel();
        let (channels, events) = InformerChannels::bounded(buffer);
        Self {
            factory: Arc::new(factory),
            informers: Arc::new(RwLock::new(HashMap::new())),
            generations: AtomicU64::new(0),
            commands,
            channels,
            receivers: Mutex::new(Some(LoopReceivers {
                commands: commands_rx,
                events,
            })),
        }
    }

    /// Senders feeding the fan-in loop
    pub fn channels(&self) -> InformerChannels {
        self.channels.clone()
    }

    pub fn has_connection(&self, connection_id: &str) -> bool {
        self.informers.read().contains_key(connection_id)
    }

    pub fn state(&self, connection_id: &str) -> Option<InformerState> {
        self.informers
            .read()
            .get(connection_id)
            .map(|entry| entry.state)
    }

    /// Build the watch handle for a connection. Fails if one already exists.
    pub fn create_connection_informer(
        &self,
        ctx: &PluginContext,
        connection: &Connection,
        client: Arc<C>,
    ) -> Result<()> {
        if self.has_connection(&connection.id) {
            return Err(Error::InformerExists(connection.id.clone()));
        }

        let handle = self.factory.create(ctx, connection, client)?;

        match self.informers.write().entry(connection.id.clone()) {
            Entry::Occupied(_) => Err(Error::InformerExists(connection.id.clone())),
            Entry::Vacant(vacant) => {
                vacant.insert(InformerEntry {
                    handle: Arc::new(handle),
                    cancel: CancellationToken::new(),
                    state: InformerState::Created,
                    generation: self.generations.fetch_add(1, Ordering::Relaxed),
                    task: None,
                });
                info!(connection = %connection.id, "Created connection informer");
                Ok(())
            }
        }
    }

    /// Attach a resource type to a connection's watch handle
    pub fn register_resource(
        &self,
        ctx: &PluginContext,
        connection: &Connection,
        meta: &ResourceMeta,
    ) -> Result<()> {
        let informers = self.informers.read();
        let entry = informers
            .get(&connection.id)
            .ok_or_else(|| Error::InformerNotFound(connection.id.clone()))?;
        self.factory
            .register_resource(ctx, connection, &entry.handle, meta)
    }

    /// Ask the fan-in loop to start the connection's watch task.
    /// Returns without waiting for the task to start.
    pub fn start_connection(&self, connection_id: &str) -> Result<()> {
        self.send_command(connection_id, |id, generation| InformerCommand::Start {
            id,
            generation,
        })
    }

    /// Ask the fan-in loop to cancel the connection's watch task.
    /// Returns without waiting for the task to exit.
    pub fn stop_connection(&self, connection_id: &str) -> Result<()> {
        self.send_command(connection_id, |id, generation| InformerCommand::Stop {
            id,
            generation,
        })
    }

    fn send_command(
        &self,
        connection_id: &str,
        command: impl FnOnce(String, u64) -> InformerCommand,
    ) -> Result<()> {
        let informers = self.informers.read();
        let entry = informers
            .get(connection_id)
            .ok_or_else(|| Error::InformerNotFound(connection_id.to_string()))?;
        self.commands
            .send(command(connection_id.to_string(), entry.generation))
            .map_err(|_| Error::EventChannelClosed("command"))
    }

    /// Cancel the connection's watch task and wait up to `timeout` for it to
    /// exit. A task that outlives the timeout is aborted.
    pub async fn stop_connection_and_wait(
        &self,
        connection_id: &str,
        timeout: Duration,
    ) -> Result<()> {
        let task = {
            let mut informers = self.informers.write();
            let entry = informers
                .get_mut(connection_id)
                .ok_or_else(|| Error::InformerNotFound(connection_id.to_string()))?;
            entry.cancel.cancel();
            entry.state = InformerState::Stopped;
            entry.task.take()
        };

        let Some(mut task) = task else {
            debug!(connection = %connection_id, "Informer was never started");
            return Ok(());
        };

        let outcome = tokio::time::timeout(timeout, &mut task).await;
        match outcome {
            Ok(Ok(())) => debug!(connection = %connection_id, "Informer task exited"),
            Ok(Err(e)) => {
                warn!(connection = %connection_id, error = %e, "Informer task panicked");
                metrics::ACTIVE_INFORMERS.dec();
            }
            Err(_) => {
                warn!(
                    connection = %connection_id,
                    timeout_secs = timeout.as_secs(),
                    "Informer task ignored cancellation, aborting"
                );
                task.abort();
                // An aborted task never reaches its own bookkeeping
                if let Err(e) = task.await {
                    if e.is_cancelled() {
                        metrics::ACTIVE_INFORMERS.dec();
                    }
                }
            }
        }
        Ok(())
    }

    /// Cancel and drop a connection's entry
    pub fn remove_connection(&self, connection_id: &str) -> Result<()> {
        let entry = self
            .informers
            .write()
            .remove(connection_id)
            .ok_or_else(|| Error::InformerNotFound(connection_id.to_string()))?;
        entry.cancel.cancel();
        info!(connection = %connection_id, "Removed connection informer");
        Ok(())
    }

    /// Fan-in loop. Runs until `stop` fires.
    ///
    /// Events are forwarded unchanged with a blocking send, so a host that
    /// stops draining stalls every connection's events rather than losing
    /// any. Per-connection watch tasks are not cancelled when the loop ends.
    pub async fn run(&self, stop: CancellationToken, host: InformerChannels) -> Result<()> {
        let mut receivers = self
            .receivers
            .lock()
            .take()
            .ok_or(Error::InformerAlreadyRunning)?;

        info!("Informer fan-in started");
        let result = loop {
            tokio::select! {
                _ = stop.cancelled() => break Ok(()),
                Some(command) = receivers.commands.recv() => self.handle_command(command),
                Some(event) = receivers.events.add.recv() => {
                    metrics::INFORMER_EVENTS.with_label_values(&["add"]).inc();
                    if host.add.send(event).await.is_err() {
                        break Err(Error::EventChannelClosed("add"));
                    }
                }
                Some(event) = receivers.events.update.recv() => {
                    metrics::INFORMER_EVENTS.with_label_values(&["update"]).inc();
                    if host.update.send(event).await.is_err() {
                        break Err(Error::EventChannelClosed("update"));
                    }
                }
                Some(event) = receivers.events.delete.recv() => {
                    metrics::INFORMER_EVENTS.with_label_values(&["delete"]).inc();
                    if host.delete.send(event).await.is_err() {
                        break Err(Error::EventChannelClosed("delete"));
                    }
                }
            }
        };

        *self.receivers.lock() = Some(receivers);
        match &result {
            Ok(()) => info!("Informer fan-in stopped"),
            Err(e) => error!(error = %e, "Informer fan-in aborted"),
        }
        result
    }

    fn handle_command(&self, command: InformerCommand) {
        match command {
            InformerCommand::Start { id, generation } => self.spawn_informer(id, generation),
            InformerCommand::Stop { id, generation } => {
                let mut informers = self.informers.write();
                match informers.get_mut(&id) {
                    Some(entry) if entry.generation == generation => {
                        entry.cancel.cancel();
                        entry.state = InformerState::Stopped;
                        info!(connection = %id, "Stopped connection informer");
                    }
                    _ => debug!(connection = %id, "Stop for removed informer"),
                }
            }
        }
    }

    fn spawn_informer(&self, connection_id: String, generation: u64) {
        let mut informers = self.informers.write();
        let entry = match informers.get_mut(&connection_id) {
            Some(entry) if entry.generation == generation => entry,
            _ => {
                debug!(connection = %connection_id, "Start for removed informer");
                return;
            }
        };

        match entry.state {
            InformerState::Created => {}
            InformerState::Running => {
                debug!(connection = %connection_id, "Informer already running");
                return;
            }
            InformerState::Stopped => {
                warn!(connection = %connection_id, "Informer is stopped and must be recreated");
                return;
            }
        }

        let factory = Arc::clone(&self.factory);
        let handle = Arc::clone(&entry.handle);
        let cancel = entry.cancel.clone();
        let channels = self.channels.clone();
        let informers_ref = Arc::clone(&self.informers);
        let id = connection_id.clone();

        entry.task = Some(tokio::spawn(async move {
            match factory.run(handle, cancel, channels).await {
                Ok(()) => info!(connection = %id, "Informer task exited"),
                Err(e) => error!(connection = %id, error = %e, "Informer task failed"),
            }
            if let Some(entry) = informers_ref.write().get_mut(&id) {
                // The entry may have been removed and recreated meanwhile
                if entry.generation == generation {
                    entry.state = InformerState::Stopped;
                }
            }
            metrics::ACTIVE_INFORMERS.dec();
        }));
        entry.state = InformerState::Running;
        metrics::ACTIVE_INFORMERS.inc();
        info!(connection = %connection_id, "Started connection informer");
    }
}

#[async_trait]
impl<C, H> ConnectionInformers<C> for InformerManager<C, H>
where
    C: Send + Sync + 'static,
    H: Send + Sync + 'static,
{
    fn create_connection_informer(
        &self,
        ctx: &PluginContext,
        connection: &Connection,
        client: Arc<C>,
    ) -> Result<()> {
        InformerManager::create_connection_informer(self, ctx, connection, client)
    }

    fn register_resource(
        &self,
        ctx: &PluginContext,
        connection: &Connection,
        meta: &ResourceMeta,
    ) -> Result<()> {
        InformerManager::register_resource(self, ctx, connection, meta)
    }

    fn start_connection(&self, connection_id: &str) -> Result<()> {
        InformerManager::start_connection(self, connection_id)
    }

    fn stop_connection(&self, connection_id: &str) -> Result<()> {
        InformerManager::stop_connection(self, connection_id)
    }

    async fn stop_connection_and_wait(
        &self,
        connection_id: &str,
        timeout: Duration,
    ) -> Result<()> {
        InformerManager::stop_connection_and_wait(self, connection_id, timeout).await
    }

    fn remove_connection(&self, connection_id: &str) -> Result<()> {
        InformerManager::remove_connection(self, connection_id)
    }

    fn has_connection(&self, connection_id: &str) -> bool {
        InformerManager::has_connection(self, connection_id)
    }

    async fn run(&self, stop: CancellationToken, host: InformerChannels) -> Result<()> {
        InformerManager::run(self, stop, host).await
    }
}
