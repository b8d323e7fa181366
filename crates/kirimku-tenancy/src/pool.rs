// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Pool abstraction.
//!
//! The connection manager, health checker and transaction runner only talk
//! to pools through these traits. [`crate::postgres`] implements them with
//! sqlx; [`crate::mock`] implements them in memory for tests.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Serialize, Serializer};

use crate::config::PoolConfig;
use crate::error::Result;

/// Point-in-time pool counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PoolStats {
    /// Established connections, in use or idle.
    pub open: u32,
    pub in_use: u32,
    pub idle: u32,
    /// Acquires that had to wait for a free connection.
    pub wait_count: u64,
    /// Total time spent waiting for connections.
    #[serde(rename = "wait_duration_ms", serialize_with = "serialize_millis")]
    pub wait_duration: Duration,
    /// Connections closed for exceeding the idle limit or idle time.
    pub max_idle_closed: u64,
    /// Connections closed for exceeding their lifetime.
    pub max_lifetime_closed: u64,
    pub max_open_connections: u32,
}

pub(crate) fn serialize_millis<S: Serializer>(
    duration: &Duration,
    serializer: S,
) -> std::result::Result<S::Ok, S::Error> {
    serializer.serialize_u64(u64::try_from(duration.as_millis()).unwrap_or(u64::MAX))
}

/// A transaction that must end in commit or rollback.
///
/// Dropping a transaction without finishing it releases it with a rollback.
#[async_trait]
pub trait TxControl: Send + 'static {
    async fn commit(self) -> Result<()>;
    async fn rollback(self) -> Result<()>;
}

/// A pool of database connections.
#[async_trait]
pub trait ManagedPool: Send + Sync + 'static {
    /// Transaction type produced by [`ManagedPool::begin`].
    type Tx: TxControl;

    /// Round-trip liveness check.
    async fn ping(&self) -> Result<()>;

    /// Start a transaction on a pooled connection.
    async fn begin(&self) -> Result<Self::Tx>;

    /// Close every connection. Later acquires fail.
    async fn close(&self) -> Result<()>;

    fn is_closed(&self) -> bool;

    fn stats(&self) -> PoolStats;
}

/// Creates pools from configuration.
#[async_trait]
pub trait PoolConnector: Send + Sync + 'static {
    type Pool: ManagedPool;

    /// Build a pool. `identifier` is `"shared"` or a storefront id and is used for logging.
    async fn connect(&self, identifier: &str, config: &PoolConfig) -> Result<Self::Pool>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stats_serialize_wait_in_millis() {
        let stats = PoolStats {
            open: 3,
            in_use: 1,
            idle: 2,
            wait_count: 4,
            wait_duration: Duration::from_millis(1250),
            max_idle_closed: 0,
            max_lifetime_closed: 1,
            max_open_connections: 25,
        };
        let json = serde_json::to_value(stats).unwrap();
        assert_eq!(json["wait_duration_ms"], 1250);
        assert_eq!(json["max_open_connections"], 25);
        assert!(json.get("wait_duration").is_none());
    }
}
