// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Tests for the transaction runner: commit, rollback and panic release.

use std::panic::AssertUnwindSafe;

use futures::FutureExt;
use kirimku_tenancy::mock::{MockConnector, TxEvent};
use kirimku_tenancy::{
    ConnectionManager, DbError, PoolConfig, TenantContext, TenantType, run_in_tx,
};

#[derive(Debug, thiserror::Error)]
enum TestError {
    #[error(transparent)]
    Db(#[from] DbError),
    #[error("business rule violated: {0}")]
    Business(String),
}

async fn setup() -> (MockConnector, ConnectionManager<MockConnector>) {
    let connector = MockConnector::new();
    let manager = ConnectionManager::with_shared(connector.clone(), &PoolConfig::default())
        .await
        .unwrap();
    manager.add_tenant("t1", PoolConfig::default()).await.unwrap();
    (connector, manager)
}

fn events_for(connector: &MockConnector, identifier: &str) -> Vec<TxEvent> {
    connector
        .tx_log()
        .into_iter()
        .filter(|event| match event {
            TxEvent::Begin { identifier: id }
            | TxEvent::Statement { identifier: id, .. }
            | TxEvent::Commit { identifier: id }
            | TxEvent::Rollback { identifier: id }
            | TxEvent::Dropped { identifier: id } => id == identifier,
        })
        .collect()
}

#[tokio::test]
async fn test_commit_on_success() {
    let (connector, manager) = setup().await;
    let tenant = TenantContext::new("t1", "toko-1", TenantType::Database);

    let rows = run_in_tx(&manager, Some(&tenant), |tx| {
        Box::pin(async move {
            tx.execute("INSERT INTO tracking_updates VALUES (1)");
            tx.execute("INSERT INTO tracking_updates VALUES (2)");
            Ok::<_, TestError>(tx.statements().len())
        })
    })
    .await
    .unwrap();

    assert_eq!(rows, 2);
    let events = events_for(&connector, "t1");
    assert_eq!(events.len(), 4);
    assert!(matches!(events[0], TxEvent::Begin { .. }));
    assert!(matches!(events[3], TxEvent::Commit { .. }));
    assert!(events_for(&connector, "shared").is_empty());
}

#[tokio::test]
async fn test_rollback_on_error() {
    let (connector, manager) = setup().await;

    let err = run_in_tx(&manager, None, |tx| {
        Box::pin(async move {
            tx.execute("UPDATE storefronts SET name = 'x'");
            Err::<(), _>(TestError::Business("stock below zero".into()))
        })
    })
    .await
    .unwrap_err();

    assert!(matches!(err, TestError::Business(_)));
    let events = events_for(&connector, "shared");
    assert!(matches!(events.last(), Some(TxEvent::Rollback { .. })));
    assert!(!events.iter().any(|e| matches!(e, TxEvent::Commit { .. })));
}

#[tokio::test]
async fn test_rollback_and_resume_on_panic() {
    let (connector, manager) = setup().await;

    let outcome = AssertUnwindSafe(run_in_tx(&manager, None, |tx| {
        Box::pin(async move {
            tx.execute("DELETE FROM tracking_updates");
            if tx.statements().len() == 1 {
                panic!("invariant broken");
            }
            Ok::<(), TestError>(())
        })
    }))
    .catch_unwind()
    .await;

    let panic = outcome.expect_err("panic must propagate to the caller");
    assert_eq!(panic.downcast_ref::<&str>(), Some(&"invariant broken"));

    let events = events_for(&connector, "shared");
    assert!(matches!(events.last(), Some(TxEvent::Rollback { .. })));
    assert!(!events.iter().any(|e| matches!(e, TxEvent::Dropped { .. })));

    let handle = manager.get_connection(None).await.unwrap();
    assert_eq!(handle.stats().in_use, 0, "transaction resource released");
}

#[tokio::test]
async fn test_rollback_when_work_panics_before_its_future() {
    let (connector, manager) = setup().await;
    let refuse = true;

    let outcome = AssertUnwindSafe(run_in_tx(&manager, None, |_tx| {
        if refuse {
            panic!("refused before starting");
        }
        Box::pin(async move { Ok::<(), TestError>(()) })
    }))
    .catch_unwind()
    .await;

    let panic = outcome.expect_err("panic must propagate to the caller");
    assert_eq!(panic.downcast_ref::<&str>(), Some(&"refused before starting"));

    let events = events_for(&connector, "shared");
    assert!(matches!(events.first(), Some(TxEvent::Begin { .. })));
    assert!(matches!(events.last(), Some(TxEvent::Rollback { .. })));
    assert!(!events.iter().any(|e| matches!(e, TxEvent::Dropped { .. })));

    let handle = manager.get_connection(None).await.unwrap();
    assert_eq!(handle.stats().in_use, 0, "transaction resource released");
}

#[tokio::test]
async fn test_begin_failure_is_returned() {
    let (connector, manager) = setup().await;
    connector.pools_for("shared")[0].set_fail_begin(true);

    let err = run_in_tx(&manager, None, |_tx| {
        Box::pin(async move { Ok::<(), TestError>(()) })
    })
    .await
    .unwrap_err();

    assert!(matches!(err, TestError::Db(DbError::Transaction(_))));
    assert!(events_for(&connector, "shared").is_empty());
}

#[tokio::test]
async fn test_unknown_tenant_never_begins() {
    let (connector, manager) = setup().await;
    let tenant = TenantContext::new("t9", "toko-9", TenantType::Database);

    let err = run_in_tx(&manager, Some(&tenant), |_tx| {
        Box::pin(async move { Ok::<(), TestError>(()) })
    })
    .await
    .unwrap_err();

    assert!(matches!(err, TestError::Db(DbError::TenantNotConfigured(_))));
    assert!(connector.tx_log().is_empty());
}
