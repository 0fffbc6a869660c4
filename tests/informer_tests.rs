//! Integration tests for the informer manager
//!
//! These tests verify the per-connection lifecycle guards, the fan-in of
//! watch events onto the host channels, and stopping with a deadline.

mod common;

use std::sync::Arc;
use std::time::Duration;

use tokio_test::{assert_err, assert_ok};
use tokio_util::sync::CancellationToken;

use resource_runtime::error::Error;
use resource_runtime::informer::{InformerChannels, InformerManager, InformerState};
use resource_runtime::types::{Connection, PluginContext};

use common::{
    call_log, eventually, pod_meta, recv, CallLog, MockClient, ScriptedFactory, ScriptedHandle,
    POD,
};

type Manager = InformerManager<MockClient, ScriptedHandle>;

fn manager(log: &CallLog) -> Arc<Manager> {
    Arc::new(InformerManager::new(ScriptedFactory::new(log.clone()), 8))
}

fn client(id: &str) -> Arc<MockClient> {
    Arc::new(MockClient {
        connection_id: id.to_string(),
    })
}

fn create(manager: &Manager, id: &str) {
    let ctx = PluginContext::default();
    let connection = Connection::new(id);
    manager
        .create_connection_informer(&ctx, &connection, client(id))
        .unwrap();
    manager
        .register_resource(&ctx, &connection, &pod_meta())
        .unwrap();
}

// ============================================================================
// Lifecycle Guards
// ============================================================================

#[tokio::test]
async fn test_duplicate_informer_is_rejected() {
    let log = call_log();
    let manager = manager(&log);
    create(&manager, "dev");

    let ctx = PluginContext::default();
    let err = manager
        .create_connection_informer(&ctx, &Connection::new("dev"), client("dev"))
        .unwrap_err();
    assert!(matches!(err, Error::InformerExists(id) if id == "dev"));
    assert_eq!(manager.state("dev"), Some(InformerState::Created));
}

#[tokio::test]
async fn test_unknown_connection_is_rejected() {
    let log = call_log();
    let manager = manager(&log);
    let ctx = PluginContext::default();

    let err = manager
        .register_resource(&ctx, &Connection::new("qa"), &pod_meta())
        .unwrap_err();
    assert!(matches!(err, Error::InformerNotFound(_)));
    assert_err!(manager.start_connection("qa"));
    assert_err!(manager.stop_connection("qa"));
    assert_err!(manager.remove_connection("qa"));
    assert_err!(
        manager
            .stop_connection_and_wait("qa", Duration::from_millis(10))
            .await
    );
}

#[tokio::test]
async fn test_second_fan_in_loop_is_rejected() {
    let log = call_log();
    let manager = manager(&log);
    let stop = CancellationToken::new();
    let (host, _events) = InformerChannels::bounded(8);

    let running = {
        let manager = manager.clone();
        let stop = stop.clone();
        let host = host.clone();
        tokio::spawn(async move { manager.run(stop, host).await })
    };
    tokio::time::sleep(Duration::from_millis(50)).await;

    let err = manager.run(stop.clone(), host.clone()).await.unwrap_err();
    assert!(matches!(err, Error::InformerAlreadyRunning));

    stop.cancel();
    assert_ok!(running.await.unwrap());

    // The loop hands its receivers back when it stops
    let again = CancellationToken::new();
    again.cancel();
    assert_ok!(manager.run(again, host).await);
}

// ============================================================================
// Fan-in
// ============================================================================

#[tokio::test]
async fn test_events_reach_the_host_unchanged() {
    let log = call_log();
    let manager = manager(&log);
    let stop = CancellationToken::new();
    let (host, mut events) = InformerChannels::bounded(8);
    let running = {
        let manager = manager.clone();
        let stop = stop.clone();
        tokio::spawn(async move { manager.run(stop, host).await })
    };

    create(&manager, "dev");
    manager.start_connection("dev").unwrap();

    let added = recv(&mut events.add).await;
    assert_eq!(added.key, POD);
    assert_eq!(added.connection_id, "dev");
    assert_eq!(added.resource_id, "obj");
    assert_eq!(added.namespace, "default");

    let updated = recv(&mut events.update).await;
    assert_eq!(updated.old_data["metadata"]["name"], "obj");
    assert_eq!(updated.new_data["metadata"]["generation"], 2);

    let deleted = recv(&mut events.delete).await;
    assert_eq!(deleted.key, POD);
    assert_eq!(deleted.connection_id, "dev");

    assert!(eventually(|| manager.state("dev") == Some(InformerState::Running)).await);

    stop.cancel();
    assert_ok!(running.await.unwrap());
}

#[tokio::test]
async fn test_events_of_several_connections_are_multiplexed() {
    let log = call_log();
    let manager = manager(&log);
    let stop = CancellationToken::new();
    let (host, mut events) = InformerChannels::bounded(8);
    let running = {
        let manager = manager.clone();
        let stop = stop.clone();
        tokio::spawn(async move { manager.run(stop, host).await })
    };

    create(&manager, "dev");
    create(&manager, "prod");
    manager.start_connection("dev").unwrap();
    manager.start_connection("prod").unwrap();

    let mut connections = vec![
        recv(&mut events.add).await.connection_id,
        recv(&mut events.add).await.connection_id,
    ];
    connections.sort();
    assert_eq!(connections, vec!["dev", "prod"]);

    stop.cancel();
    assert_ok!(running.await.unwrap());
}

#[tokio::test]
async fn test_closed_host_channel_ends_the_loop() {
    let log = call_log();
    let manager = manager(&log);
    let (host, events) = InformerChannels::bounded(8);
    drop(events);

    create(&manager, "dev");
    manager.start_connection("dev").unwrap();

    let result = tokio::time::timeout(
        Duration::from_secs(5),
        manager.run(CancellationToken::new(), host),
    )
    .await
    .expect("fan-in loop did not notice the closed host channel");
    assert!(matches!(result, Err(Error::EventChannelClosed("add"))));
}

// ============================================================================
// Stopping
// ============================================================================

#[tokio::test]
async fn test_stop_and_wait_joins_the_watch_task() {
    let log = call_log();
    let manager = manager(&log);
    let stop = CancellationToken::new();
    let (host, mut events) = InformerChannels::bounded(8);
    let running = {
        let manager = manager.clone();
        let stop = stop.clone();
        tokio::spawn(async move { manager.run(stop, host).await })
    };

    create(&manager, "dev");
    manager.start_connection("dev").unwrap();
    recv(&mut events.add).await;
    recv(&mut events.update).await;
    recv(&mut events.delete).await;

    manager
        .stop_connection_and_wait("dev", Duration::from_secs(5))
        .await
        .unwrap();
    assert_eq!(manager.state("dev"), Some(InformerState::Stopped));
    assert_eq!(*log.lock(), vec!["informer.exit:dev"]);

    // A stopped informer stays stopped until it is recreated
    manager.start_connection("dev").unwrap();
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(manager.state("dev"), Some(InformerState::Stopped));

    manager.remove_connection("dev").unwrap();
    assert!(!manager.has_connection("dev"));
    create(&manager, "dev");
    assert_eq!(manager.state("dev"), Some(InformerState::Created));

    stop.cancel();
    assert_ok!(running.await.unwrap());
}

#[tokio::test]
async fn test_stop_command_cancels_the_watch_task() {
    let log = call_log();
    let manager = manager(&log);
    let stop = CancellationToken::new();
    let (host, mut events) = InformerChannels::bounded(8);
    let running = {
        let manager = manager.clone();
        let stop = stop.clone();
        tokio::spawn(async move { manager.run(stop, host).await })
    };

    create(&manager, "dev");
    manager.start_connection("dev").unwrap();
    recv(&mut events.delete).await;

    manager.stop_connection("dev").unwrap();
    let exited = || log.lock().iter().any(|entry| entry == "informer.exit:dev");
    assert!(eventually(exited).await);
    assert_eq!(manager.state("dev"), Some(InformerState::Stopped));

    stop.cancel();
    assert_ok!(running.await.unwrap());
}

#[tokio::test]
async fn test_unresponsive_watch_task_is_aborted_after_timeout() {
    let log = call_log();
    let mut factory = ScriptedFactory::new(log.clone());
    factory.ignore_cancel = true;
    let manager: Arc<Manager> = Arc::new(InformerManager::new(factory, 8));
    let stop = CancellationToken::new();
    let (host, mut events) = InformerChannels::bounded(8);
    let running = {
        let manager = manager.clone();
        let stop = stop.clone();
        tokio::spawn(async move { manager.run(stop, host).await })
    };

    create(&manager, "dev");
    manager.start_connection("dev").unwrap();
    recv(&mut events.delete).await;

    let stopped = tokio::time::timeout(
        Duration::from_secs(5),
        manager.stop_connection_and_wait("dev", Duration::from_millis(100)),
    )
    .await
    .expect("stop did not honor its timeout");
    assert_ok!(stopped);
    assert_eq!(manager.state("dev"), Some(InformerState::Stopped));
    // Aborted before it could record a clean exit
    assert!(log.lock().is_empty());

    stop.cancel();
    assert_ok!(running.await.unwrap());
}

#[tokio::test]
async fn test_queued_stop_does_not_reach_recreated_informer() {
    let log = call_log();
    let manager = manager(&log);

    // Queued while the fan-in loop is not running yet
    create(&manager, "dev");
    manager.stop_connection("dev").unwrap();
    manager.remove_connection("dev").unwrap();
    create(&manager, "dev");
    manager.start_connection("dev").unwrap();

    let stop = CancellationToken::new();
    let (host, mut events) = InformerChannels::bounded(8);
    let running = {
        let manager = manager.clone();
        let stop = stop.clone();
        tokio::spawn(async move { manager.run(stop, host).await })
    };

    let added = recv(&mut events.add).await;
    assert_eq!(added.connection_id, "dev");
    assert_eq!(manager.state("dev"), Some(InformerState::Running));

    stop.cancel();
    assert_ok!(running.await.unwrap());
}

#[tokio::test]
async fn test_stop_before_start_returns_immediately() {
    let log = call_log();
    let manager = manager(&log);
    create(&manager, "dev");

    manager
        .stop_connection_and_wait("dev", Duration::from_secs(5))
        .await
        .unwrap();
    assert_eq!(manager.state("dev"), Some(InformerState::Stopped));
    manager.remove_connection("dev").unwrap();
}
