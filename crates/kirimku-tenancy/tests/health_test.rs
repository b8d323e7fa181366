// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Tests for the background health checker.

use std::sync::Arc;
use std::time::Duration;

use kirimku_tenancy::mock::MockConnector;
use kirimku_tenancy::{
    ConnectionManager, ConnectionState, HealthChecker, HealthCheckerConfig, HealthSource,
    OverallHealth, PoolConfig,
};

const PERIOD: Duration = Duration::from_secs(30);

async fn setup() -> (
    MockConnector,
    Arc<ConnectionManager<MockConnector>>,
    Arc<HealthChecker<MockConnector>>,
) {
    let connector = MockConnector::new();
    let manager = Arc::new(
        ConnectionManager::with_shared(connector.clone(), &PoolConfig::default())
            .await
            .unwrap(),
    );
    manager.add_tenant("t1", PoolConfig::default()).await.unwrap();
    manager.add_tenant("t2", PoolConfig::default()).await.unwrap();
    let checker = Arc::new(HealthChecker::new(
        manager.clone(),
        HealthCheckerConfig {
            period: PERIOD,
            ping_timeout: Duration::from_secs(5),
        },
    ));
    (connector, manager, checker)
}

#[tokio::test(start_paused = true)]
async fn test_loop_sweeps_immediately_and_periodically() {
    let (connector, _manager, checker) = setup().await;
    let handle = checker.spawn();

    tokio::time::sleep(Duration::from_millis(10)).await;
    let status = checker.status().await;
    assert_eq!(status.overall, OverallHealth::Healthy);
    assert_eq!(status.connections.len(), 3);
    let first_check = status.last_checked.unwrap();

    connector.pools_for("t2")[0].set_healthy(false);

    tokio::time::sleep(PERIOD).await;
    let status = checker.status().await;
    assert_eq!(status.overall, OverallHealth::Unhealthy);
    assert_eq!(status.connections["t2"].status, ConnectionState::Unhealthy);
    assert_eq!(status.connections["t1"].status, ConnectionState::Idle);
    assert!(status.last_checked.unwrap() >= first_check);

    checker.stop();
    handle.await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_slow_ping_times_out() {
    let (connector, _manager, checker) = setup().await;
    connector.pools_for("t1")[0].set_ping_delay(Duration::from_secs(60));

    let status = checker.sweep().await;
    let t1 = &status.connections["t1"];
    assert_eq!(t1.status, ConnectionState::Unhealthy);
    assert!(t1.error.as_deref().unwrap().contains("timed out"));
    assert!(t1.response_time >= Duration::from_secs(5));
    assert_eq!(status.overall, OverallHealth::Unhealthy);
}

#[tokio::test]
async fn test_closed_pool_is_disconnected() {
    let (_connector, manager, checker) = setup().await;
    manager.close().await.unwrap();

    let status = checker.sweep().await;
    // Tenants were drained; only the closed shared pool remains.
    assert_eq!(status.connections.len(), 1);
    assert_eq!(
        status.connections["shared"].status,
        ConnectionState::Disconnected
    );
    assert_eq!(status.overall, OverallHealth::Unhealthy);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_readers_never_see_partial_status() {
    let (connector, _manager, checker) = setup().await;

    let writer = {
        let checker = checker.clone();
        let connector = connector.clone();
        tokio::spawn(async move {
            for i in 0..50 {
                connector.pools_for("t1")[0].set_healthy(i % 2 == 0);
                checker.sweep().await;
            }
        })
    };

    let mut readers = Vec::new();
    for _ in 0..4 {
        let checker = checker.clone();
        readers.push(tokio::spawn(async move {
            for _ in 0..200 {
                let status = checker.status().await;
                let n = status.connections.len();
                assert!(n == 0 || n == 3, "partial status with {} entries", n);
                if n == 0 {
                    assert_eq!(status.overall, OverallHealth::Unknown);
                }
                tokio::task::yield_now().await;
            }
        }));
    }

    writer.await.unwrap();
    for reader in readers {
        reader.await.unwrap();
    }
}

#[tokio::test]
async fn test_status_is_a_copy() {
    let (_connector, _manager, checker) = setup().await;
    checker.sweep().await;

    let mut copy = checker.status().await;
    copy.connections.clear();
    copy.overall = OverallHealth::Unhealthy;

    let status = HealthSource::status(checker.as_ref()).await;
    assert_eq!(status.connections.len(), 3);
    assert_eq!(status.overall, OverallHealth::Healthy);
}

#[tokio::test]
async fn test_stop_is_idempotent() {
    let (_connector, _manager, checker) = setup().await;
    let handle = checker.spawn();

    checker.stop();
    checker.stop();
    assert!(checker.is_stopped());

    tokio::time::timeout(Duration::from_secs(5), handle)
        .await
        .expect("health checker did not stop")
        .unwrap();
}

#[tokio::test]
async fn test_stop_before_run() {
    let (_connector, _manager, checker) = setup().await;
    checker.stop();
    tokio::time::timeout(Duration::from_secs(5), checker.run())
        .await
        .expect("run should return immediately once stopped");
}
