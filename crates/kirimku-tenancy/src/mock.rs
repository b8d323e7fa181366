// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Mock pool backend for testing.
//!
//! An in-memory connector whose pools can be made unhealthy, slow, or
//! unable to begin transactions. Every transaction event is recorded in a
//! log shared by the connector and all of its pools.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;

use crate::config::PoolConfig;
use crate::error::{DbError, Result};
use crate::pool::{ManagedPool, PoolConnector, PoolStats, TxControl};

/// A recorded transaction event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TxEvent {
    Begin { identifier: String },
    Statement { identifier: String, sql: String },
    Commit { identifier: String },
    Rollback { identifier: String },
    /// The transaction was dropped without commit or rollback.
    Dropped { identifier: String },
}

type TxLog = Arc<Mutex<Vec<TxEvent>>>;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

#[derive(Debug)]
struct MockPoolState {
    id: u64,
    identifier: String,
    config: PoolConfig,
    healthy: AtomicBool,
    closed: AtomicBool,
    fail_begin: AtomicBool,
    fail_close: AtomicBool,
    ping_delay_ms: AtomicU64,
    pings: AtomicU64,
    in_use: AtomicU64,
    log: TxLog,
}

/// In-memory pool. Clones share state.
#[derive(Debug, Clone)]
pub struct MockPool {
    state: Arc<MockPoolState>,
}

impl MockPool {
    /// Unique id of this pool instance; a recreated pool gets a new id.
    pub fn id(&self) -> u64 {
        self.state.id
    }

    pub fn identifier(&self) -> &str {
        &self.state.identifier
    }

    pub fn config(&self) -> &PoolConfig {
        &self.state.config
    }

    /// Make pings fail (`false`) or succeed (`true`).
    pub fn set_healthy(&self, healthy: bool) {
        self.state.healthy.store(healthy, Ordering::SeqCst);
    }

    /// Delay every ping, to exercise ping deadlines.
    pub fn set_ping_delay(&self, delay: Duration) {
        let millis = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX);
        self.state.ping_delay_ms.store(millis, Ordering::SeqCst);
    }

    pub fn set_fail_begin(&self, fail: bool) {
        self.state.fail_begin.store(fail, Ordering::SeqCst);
    }

    /// Make `close` report an error. The pool is still marked closed.
    pub fn set_fail_close(&self, fail: bool) {
        self.state.fail_close.store(fail, Ordering::SeqCst);
    }

    pub fn ping_count(&self) -> u64 {
        self.state.pings.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ManagedPool for MockPool {
    type Tx = MockTx;

    async fn ping(&self) -> Result<()> {
        self.state.pings.fetch_add(1, Ordering::SeqCst);
        let delay = self.state.ping_delay_ms.load(Ordering::SeqCst);
        if delay > 0 {
            tokio::time::sleep(Duration::from_millis(delay)).await;
        }
        if self.is_closed() {
            return Err(DbError::Closed);
        }
        if !self.state.healthy.load(Ordering::SeqCst) {
            return Err(DbError::Unhealthy {
                identifier: self.state.identifier.clone(),
                reason: "connection refused".to_string(),
            });
        }
        Ok(())
    }

    async fn begin(&self) -> Result<MockTx> {
        if self.is_closed() {
            return Err(DbError::Closed);
        }
        if self.state.fail_begin.load(Ordering::SeqCst) {
            return Err(DbError::Transaction("begin refused".to_string()));
        }
        self.state.in_use.fetch_add(1, Ordering::SeqCst);
        lock(&self.state.log).push(TxEvent::Begin {
            identifier: self.state.identifier.clone(),
        });
        Ok(MockTx {
            pool: self.state.clone(),
            statements: Vec::new(),
            finished: false,
        })
    }

    async fn close(&self) -> Result<()> {
        self.state.closed.store(true, Ordering::SeqCst);
        if self.state.fail_close.load(Ordering::SeqCst) {
            return Err(DbError::Unhealthy {
                identifier: self.state.identifier.clone(),
                reason: "close refused".to_string(),
            });
        }
        Ok(())
    }

    fn is_closed(&self) -> bool {
        self.state.closed.load(Ordering::SeqCst)
    }

    fn stats(&self) -> PoolStats {
        let in_use = u32::try_from(self.state.in_use.load(Ordering::SeqCst)).unwrap_or(u32::MAX);
        let open = if self.is_closed() { 0 } else { in_use.max(1) };
        PoolStats {
            open,
            in_use,
            idle: open - in_use,
            max_open_connections: self.state.config.max_open,
            ..PoolStats::default()
        }
    }
}

/// In-memory transaction.
#[derive(Debug)]
pub struct MockTx {
    pool: Arc<MockPoolState>,
    statements: Vec<String>,
    finished: bool,
}

impl MockTx {
    /// Record a statement.
    pub fn execute(&mut self, sql: &str) {
        self.statements.push(sql.to_string());
        lock(&self.pool.log).push(TxEvent::Statement {
            identifier: self.pool.identifier.clone(),
            sql: sql.to_string(),
        });
    }

    pub fn identifier(&self) -> &str {
        &self.pool.identifier
    }

    pub fn statements(&self) -> &[String] {
        &self.statements
    }

    fn finish(&mut self, event: TxEvent) {
        self.finished = true;
        self.pool.in_use.fetch_sub(1, Ordering::SeqCst);
        lock(&self.pool.log).push(event);
    }
}

#[async_trait]
impl TxControl for MockTx {
    async fn commit(mut self) -> Result<()> {
        let identifier = self.pool.identifier.clone();
        self.finish(TxEvent::Commit { identifier });
        Ok(())
    }

    async fn rollback(mut self) -> Result<()> {
        let identifier = self.pool.identifier.clone();
        self.finish(TxEvent::Rollback { identifier });
        Ok(())
    }
}

impl Drop for MockTx {
    fn drop(&mut self) {
        if !self.finished {
            let identifier = self.pool.identifier.clone();
            self.finish(TxEvent::Dropped { identifier });
        }
    }
}

/// Connector producing [`MockPool`]s.
#[derive(Debug, Clone, Default)]
pub struct MockConnector {
    next_id: Arc<AtomicU64>,
    fail_connects: Arc<AtomicBool>,
    new_pools_unhealthy: Arc<AtomicBool>,
    new_pools_ping_delay_ms: Arc<AtomicU64>,
    created: Arc<Mutex<Vec<MockPool>>>,
    log: TxLog,
}

impl MockConnector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make `connect` fail.
    pub fn set_fail_connects(&self, fail: bool) {
        self.fail_connects.store(fail, Ordering::SeqCst);
    }

    /// Make newly created pools fail their pings.
    pub fn set_new_pools_unhealthy(&self, unhealthy: bool) {
        self.new_pools_unhealthy.store(unhealthy, Ordering::SeqCst);
    }

    /// Delay the pings of newly created pools.
    pub fn set_new_pools_ping_delay(&self, delay: Duration) {
        let millis = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX);
        self.new_pools_ping_delay_ms.store(millis, Ordering::SeqCst);
    }

    /// Every pool created so far, oldest first.
    pub fn created(&self) -> Vec<MockPool> {
        lock(&self.created).clone()
    }

    /// Pools created for one identifier, oldest first.
    pub fn pools_for(&self, identifier: &str) -> Vec<MockPool> {
        lock(&self.created)
            .iter()
            .filter(|pool| pool.identifier() == identifier)
            .cloned()
            .collect()
    }

    /// Transaction events across all pools.
    pub fn tx_log(&self) -> Vec<TxEvent> {
        lock(&self.log).clone()
    }
}

#[async_trait]
impl PoolConnector for MockConnector {
    type Pool = MockPool;

    async fn connect(&self, identifier: &str, config: &PoolConfig) -> Result<MockPool> {
        if self.fail_connects.load(Ordering::SeqCst) {
            return Err(DbError::Unhealthy {
                identifier: identifier.to_string(),
                reason: "connect refused".to_string(),
            });
        }
        let pool = MockPool {
            state: Arc::new(MockPoolState {
                id: self.next_id.fetch_add(1, Ordering::SeqCst),
                identifier: identifier.to_string(),
                config: config.clone(),
                healthy: AtomicBool::new(!self.new_pools_unhealthy.load(Ordering::SeqCst)),
                closed: AtomicBool::new(false),
                fail_begin: AtomicBool::new(false),
                fail_close: AtomicBool::new(false),
                ping_delay_ms: AtomicU64::new(
                    self.new_pools_ping_delay_ms.load(Ordering::SeqCst),
                ),
                pings: AtomicU64::new(0),
                in_use: AtomicU64::new(0),
                log: self.log.clone(),
            }),
        };
        lock(&self.created).push(pool.clone());
        Ok(pool)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_mock_pool_lifecycle() {
        let connector = MockConnector::new();
        let pool = connector.connect("t1", &PoolConfig::default()).await.unwrap();
        assert!(pool.ping().await.is_ok());

        pool.set_healthy(false);
        assert!(pool.ping().await.is_err());

        pool.close().await.unwrap();
        assert!(matches!(pool.ping().await, Err(DbError::Closed)));
        assert_eq!(pool.ping_count(), 3);
    }

    #[tokio::test]
    async fn test_mock_tx_records_events() {
        let connector = MockConnector::new();
        let pool = connector.connect("t1", &PoolConfig::default()).await.unwrap();

        let mut tx = pool.begin().await.unwrap();
        tx.execute("INSERT 1");
        assert_eq!(pool.stats().in_use, 1);
        tx.commit().await.unwrap();

        drop(pool.begin().await.unwrap());

        let log = connector.tx_log();
        let t1 = || "t1".to_string();
        assert_eq!(
            log,
            vec![
                TxEvent::Begin { identifier: t1() },
                TxEvent::Statement {
                    identifier: t1(),
                    sql: "INSERT 1".to_string()
                },
                TxEvent::Commit { identifier: t1() },
                TxEvent::Begin { identifier: t1() },
                TxEvent::Dropped { identifier: t1() },
            ]
        );
        assert_eq!(pool.stats().in_use, 0);
    }
}
