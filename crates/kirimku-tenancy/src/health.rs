// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Background health checker for database pools.
//!
//! Every sweep pings a snapshot of all pools with a deadline and publishes a
//! new [`HealthStatus`]. The published status is replaced as a whole, so a
//! reader sees either the previous sweep or the next one, never a mix.
//! Failures are logged and published; they never reach request handling.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::{Notify, RwLock};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::config::DEFAULT_HEALTH_CHECK_PERIOD;
use crate::error::DbError;
use crate::manager::{ConnectionManager, DEFAULT_PING_TIMEOUT, ping_within};
use crate::pool::{ManagedPool, PoolConnector, PoolStats, serialize_millis};

/// Overall health across all pools.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum OverallHealth {
    Healthy,
    Unhealthy,
    /// No sweep has completed, or there are no pools.
    Unknown,
}

/// State of one pool at its last check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionState {
    /// Reachable with connections in use.
    Active,
    /// Reachable and idle.
    Idle,
    /// Ping failed or timed out.
    Unhealthy,
    /// Pool is closed.
    Disconnected,
}

/// Health of one pool.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConnectionHealth {
    pub status: ConnectionState,
    pub last_checked: DateTime<Utc>,
    #[serde(rename = "response_time_ms", serialize_with = "serialize_millis")]
    pub response_time: Duration,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub stats: PoolStats,
}

/// Result of the latest sweep.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HealthStatus {
    pub overall: OverallHealth,
    pub last_checked: Option<DateTime<Utc>>,
    pub connections: BTreeMap<String, ConnectionHealth>,
}

impl Default for HealthStatus {
    fn default() -> Self {
        Self {
            overall: OverallHealth::Unknown,
            last_checked: None,
            connections: BTreeMap::new(),
        }
    }
}

impl HealthStatus {
    pub fn is_unhealthy(&self) -> bool {
        self.overall == OverallHealth::Unhealthy
    }
}

/// Read access to the latest health snapshot.
#[async_trait]
pub trait HealthSource: Send + Sync {
    /// Deep copy of the latest status.
    async fn status(&self) -> HealthStatus;
}

/// Configuration for the health checker.
#[derive(Debug, Clone)]
pub struct HealthCheckerConfig {
    /// Time between sweeps.
    pub period: Duration,
    /// Deadline for each ping.
    pub ping_timeout: Duration,
}

impl Default for HealthCheckerConfig {
    fn default() -> Self {
        Self {
            period: DEFAULT_HEALTH_CHECK_PERIOD,
            ping_timeout: DEFAULT_PING_TIMEOUT,
        }
    }
}

/// Background worker that pings every pool periodically.
pub struct HealthChecker<C: PoolConnector> {
    manager: Arc<ConnectionManager<C>>,
    config: HealthCheckerConfig,
    status: RwLock<Arc<HealthStatus>>,
    shutdown: Arc<Notify>,
    stopped: AtomicBool,
}

impl<C: PoolConnector> HealthChecker<C> {
    pub fn new(manager: Arc<ConnectionManager<C>>, config: HealthCheckerConfig) -> Self {
        Self {
            manager,
            config,
            status: RwLock::new(Arc::new(HealthStatus::default())),
            shutdown: Arc::new(Notify::new()),
            stopped: AtomicBool::new(false),
        }
    }

    /// Spawn the sweep loop on the runtime.
    pub fn spawn(self: &Arc<Self>) -> JoinHandle<()> {
        let checker = Arc::clone(self);
        tokio::spawn(async move { checker.run().await })
    }

    /// Run sweeps until [`HealthChecker::stop`] is called.
    ///
    /// The first sweep runs immediately.
    pub async fn run(&self) {
        info!(
            period_secs = self.config.period.as_secs(),
            ping_timeout_secs = self.config.ping_timeout.as_secs(),
            "Health checker started"
        );

        while !self.stopped.load(Ordering::SeqCst) {
            self.sweep().await;

            tokio::select! {
                biased;

                _ = self.shutdown.notified() => {
                    info!("Health checker received shutdown signal");
                    break;
                }

                _ = tokio::time::sleep(self.config.period) => {}
            }
        }

        info!("Health checker stopped");
    }

    /// Signal the loop to stop. Safe to call more than once.
    pub fn stop(&self) {
        if !self.stopped.swap(true, Ordering::SeqCst) {
            self.shutdown.notify_one();
        }
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::SeqCst)
    }

    /// Ping every pool once and publish the result.
    pub async fn sweep(&self) -> Arc<HealthStatus> {
        let pools = self.manager.pools().await;
        let mut connections = BTreeMap::new();

        for handle in pools {
            let pool = handle.pool();
            let started = Instant::now();
            let outcome = if pool.is_closed() {
                Err(DbError::Closed)
            } else {
                ping_within(pool, self.config.ping_timeout).await
            };
            let response_time = started.elapsed();
            let stats = pool.stats();

            let (status, error) = match outcome {
                Ok(()) if stats.in_use > 0 => (ConnectionState::Active, None),
                Ok(()) => (ConnectionState::Idle, None),
                Err(DbError::Closed) => {
                    (ConnectionState::Disconnected, Some(DbError::Closed.to_string()))
                }
                Err(e) => {
                    warn!(
                        identifier = %handle.identifier(),
                        error = %e,
                        response_time_ms = response_time.as_millis() as u64,
                        "Database health check failed"
                    );
                    (ConnectionState::Unhealthy, Some(e.to_string()))
                }
            };

            connections.insert(
                handle.identifier().to_string(),
                ConnectionHealth {
                    status,
                    last_checked: Utc::now(),
                    response_time,
                    error,
                    stats,
                },
            );
        }

        let overall = if connections.is_empty() {
            OverallHealth::Unknown
        } else if connections.values().all(|c| {
            matches!(c.status, ConnectionState::Active | ConnectionState::Idle)
        }) {
            OverallHealth::Healthy
        } else {
            OverallHealth::Unhealthy
        };

        let status = Arc::new(HealthStatus {
            overall,
            last_checked: Some(Utc::now()),
            connections,
        });
        debug!(
            overall = ?status.overall,
            pools = status.connections.len(),
            "Health sweep completed"
        );

        *self.status.write().await = status.clone();
        status
    }

    /// Deep copy of the latest status.
    pub async fn status(&self) -> HealthStatus {
        let current = self.status.read().await.clone();
        current.as_ref().clone()
    }
}

#[async_trait]
impl<C: PoolConnector> HealthSource for HealthChecker<C> {
    async fn status(&self) -> HealthStatus {
        HealthChecker::status(self).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PoolConfig;
    use crate::mock::MockConnector;

    #[tokio::test]
    async fn test_status_unknown_before_first_sweep() {
        let manager = Arc::new(ConnectionManager::new(MockConnector::new()));
        let checker = HealthChecker::new(manager, HealthCheckerConfig::default());
        let status = checker.status().await;
        assert_eq!(status.overall, OverallHealth::Unknown);
        assert!(status.last_checked.is_none());
    }

    #[tokio::test]
    async fn test_empty_manager_is_unknown() {
        let manager = Arc::new(ConnectionManager::new(MockConnector::new()));
        let checker = HealthChecker::new(manager, HealthCheckerConfig::default());
        let status = checker.sweep().await;
        assert_eq!(status.overall, OverallHealth::Unknown);
        assert!(status.last_checked.is_some());
    }

    #[tokio::test]
    async fn test_sweep_reports_each_pool() {
        let connector = MockConnector::new();
        let manager = Arc::new(
            ConnectionManager::with_shared(connector.clone(), &PoolConfig::default())
                .await
                .unwrap(),
        );
        manager.add_tenant("t1", PoolConfig::default()).await.unwrap();
        let checker = HealthChecker::new(manager, HealthCheckerConfig::default());

        let status = checker.sweep().await;
        assert_eq!(status.overall, OverallHealth::Healthy);
        assert_eq!(status.connections["shared"].status, ConnectionState::Idle);
        assert_eq!(status.connections["t1"].status, ConnectionState::Idle);

        connector.pools_for("t1")[0].set_healthy(false);
        let status = checker.sweep().await;
        assert_eq!(status.overall, OverallHealth::Unhealthy);
        assert_eq!(status.connections["t1"].status, ConnectionState::Unhealthy);
        assert!(status.connections["t1"].error.is_some());
        assert_eq!(status.connections["shared"].status, ConnectionState::Idle);
    }

    #[test]
    fn test_status_serialization() {
        let status = HealthStatus::default();
        let json = serde_json::to_value(&status).unwrap();
        assert_eq!(json["overall"], "unknown");
    }
}
