//! Resource Runtime host
//!
//! Main entry point. Loads kubeconfig contexts as connections, starts them,
//! and logs the informer events they produce until shut down.

use std::sync::Arc;

use kube::Client;
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use resource_runtime::{
    config::{LogFormat, RuntimeConfig},
    informer::{InformerChannels, InformerManager, InformerReceivers},
    kubernetes::{
        KubeConnectionManager, KubeDiscovery, KubeInformerFactory, KubeInformerHandle,
        KubeResourcer,
    },
    metrics,
    types::PluginContext,
    ConnectionManager, ResourceController,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = RuntimeConfig::from_env()?;
    init_tracing(&config);

    info!("Starting Resource Runtime");

    let connections: Arc<dyn ConnectionManager<Client>> =
        Arc::new(KubeConnectionManager::new(config.kubeconfig.clone()));
    let informers: Arc<InformerManager<Client, KubeInformerHandle>> = Arc::new(
        InformerManager::new(KubeInformerFactory::new(), config.event_buffer),
    );
    let controller = Arc::new(
        ResourceController::builder(connections)
            .dynamic_resourcer("*", Arc::new(KubeResourcer::new()))
            .discovery(Arc::new(KubeDiscovery::new()))
            .informers(informers)
            .informer_stop_timeout(config.informer_stop_timeout())
            .build()?,
    );

    // Start metrics server
    let metrics_handle = tokio::spawn(metrics::serve(config.metrics_port));
    info!("Metrics server starting on port {}", config.metrics_port);

    // Event fan-in
    let stop = CancellationToken::new();
    let (host, events) = InformerChannels::bounded(config.event_buffer);
    let listener = {
        let controller = controller.clone();
        let stop = stop.clone();
        tokio::spawn(async move { controller.listen_for_events(stop, host).await })
    };
    let drain = tokio::spawn(drain_events(events));

    let ctx = PluginContext::new("startup").with_requester("system");
    let loaded = controller.load_connections(&ctx).await?;
    for connection in &loaded {
        match controller.start_connection(&ctx, &connection.id).await {
            Ok(status) => {
                info!(connection = %connection.id, status = %status, "Started connection")
            }
            Err(e) => {
                error!(connection = %connection.id, error = %e, "Failed to start connection")
            }
        }
    }

    tokio::select! {
        _ = metrics_handle => {
            error!("Metrics server exited unexpectedly");
        }
        _ = shutdown_signal() => {
            info!("Received shutdown signal, stopping runtime");
        }
    }

    let ctx = PluginContext::new("shutdown").with_requester("system");
    for connection in &loaded {
        if let Err(e) = controller.stop_connection(&ctx, &connection.id).await {
            warn!(connection = %connection.id, error = %e, "Failed to stop connection");
        }
    }

    stop.cancel();
    match listener.await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => error!(error = %e, "Informer fan-in failed"),
        Err(e) => error!(error = %e, "Informer fan-in panicked"),
    }
    drain.abort();

    info!("Resource Runtime stopped");
    Ok(())
}

/// Log every informer event until the channels close
async fn drain_events(mut events: InformerReceivers) {
    loop {
        tokio::select! {
            Some(event) = events.add.recv() => {
                info!(
                    connection = %event.connection_id,
                    key = %event.key,
                    namespace = %event.namespace,
                    id = %event.resource_id,
                    "Resource added"
                );
            }
            Some(event) = events.update.recv() => {
                info!(
                    connection = %event.connection_id,
                    key = %event.key,
                    namespace = %event.namespace,
                    id = %event.resource_id,
                    "Resource updated"
                );
            }
            Some(event) = events.delete.recv() => {
                info!(
                    connection = %event.connection_id,
                    key = %event.key,
                    namespace = %event.namespace,
                    id = %event.resource_id,
                    "Resource deleted"
                );
            }
            else => break,
        }
    }
}

/// Initialize tracing subscriber
fn init_tracing(config: &RuntimeConfig) {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.log_filter));

    let registry = tracing_subscriber::registry().with(env_filter);
    match config.log_format {
        LogFormat::Json => registry
            .with(tracing_subscriber::fmt::layer().json())
            .init(),
        LogFormat::Pretty => registry.with(tracing_subscriber::fmt::layer()).init(),
    }
}

/// Wait for shutdown signal (SIGTERM or SIGINT)
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install CTRL+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received CTRL+C signal");
        }
        _ = terminate => {
            info!("Received SIGTERM signal");
        }
    }
}
