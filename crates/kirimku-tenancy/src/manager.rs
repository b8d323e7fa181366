// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Connection manager.
//!
//! Owns the optional shared pool and the storefront-id → pool map of
//! database-per-tenant storefronts. The map sits behind one read/write lock
//! that is held for map access only, never across a ping, connect, or close.
//!
//! A tenant pool that fails its ping on lookup is recreated once: a fresh
//! pool is connected and pinged outside the lock, swapped in under the write
//! lock if the stale pool is still current, and the stale pool is closed
//! after the lock is released. A second failure is returned to the caller.

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use tokio::sync::RwLock;
use tracing::{error, info, warn};

use crate::config::PoolConfig;
use crate::context::{TenantContext, TenantType};
use crate::error::{DbError, Result};
use crate::pool::{ManagedPool, PoolConnector, PoolStats};

/// Identifier of the shared pool.
pub const SHARED_IDENTIFIER: &str = "shared";

/// Default deadline for liveness pings.
pub const DEFAULT_PING_TIMEOUT: Duration = Duration::from_secs(5);

/// A borrowed pool for the duration of a request or transaction.
pub struct ConnectionHandle<P> {
    identifier: String,
    pool: Arc<P>,
}

impl<P> Clone for ConnectionHandle<P> {
    fn clone(&self) -> Self {
        Self {
            identifier: self.identifier.clone(),
            pool: self.pool.clone(),
        }
    }
}

impl<P: ManagedPool> ConnectionHandle<P> {
    /// `"shared"` or the storefront id.
    pub fn identifier(&self) -> &str {
        &self.identifier
    }

    pub fn is_shared(&self) -> bool {
        self.identifier == SHARED_IDENTIFIER
    }

    pub fn pool(&self) -> &P {
        &self.pool
    }

    pub fn stats(&self) -> PoolStats {
        self.pool.stats()
    }

    /// Whether two handles point at the same pool instance.
    pub fn same_pool(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.pool, &other.pool)
    }
}

impl<P> fmt::Debug for ConnectionHandle<P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionHandle")
            .field("identifier", &self.identifier)
            .finish_non_exhaustive()
    }
}

/// Result of swapping a recreated pool into the map.
enum Swap<P> {
    Replaced,
    /// Another request already replaced the stale pool.
    Superseded(Arc<P>),
    /// The tenant was removed meanwhile.
    Removed,
}

struct TenantEntry<P> {
    config: PoolConfig,
    pool: Arc<P>,
}

/// Routes requests to the shared pool or to per-tenant pools.
pub struct ConnectionManager<C: PoolConnector> {
    connector: C,
    shared: Option<Arc<C::Pool>>,
    tenants: RwLock<HashMap<String, TenantEntry<C::Pool>>>,
    ping_timeout: Duration,
    closed: AtomicBool,
}

impl<C: PoolConnector> ConnectionManager<C> {
    /// Create a manager without a shared pool.
    pub fn new(connector: C) -> Self {
        Self {
            connector,
            shared: None,
            tenants: RwLock::new(HashMap::new()),
            ping_timeout: DEFAULT_PING_TIMEOUT,
            closed: AtomicBool::new(false),
        }
    }

    /// Create a manager and connect its shared pool.
    pub async fn with_shared(connector: C, config: &PoolConfig) -> Result<Self> {
        let config = config.clone().with_defaults();
        let pool = connector.connect(SHARED_IDENTIFIER, &config).await?;
        info!(
            identifier = SHARED_IDENTIFIER,
            max_open = config.max_open,
            max_idle = config.max_idle,
            "Shared database pool created"
        );
        let mut manager = Self::new(connector);
        manager.shared = Some(Arc::new(pool));
        Ok(manager)
    }

    /// Override the ping deadline.
    pub fn with_ping_timeout(mut self, timeout: Duration) -> Self {
        self.ping_timeout = timeout;
        self
    }

    pub fn connector(&self) -> &C {
        &self.connector
    }

    /// Handle of the shared pool, if configured.
    pub fn shared(&self) -> Option<ConnectionHandle<C::Pool>> {
        self.shared.as_ref().map(|pool| ConnectionHandle {
            identifier: SHARED_IDENTIFIER.to_string(),
            pool: pool.clone(),
        })
    }

    /// Pool for a request.
    ///
    /// No tenant, `Shared` and `Schema` tenants use the shared pool; for
    /// `Schema` the caller selects the schema at statement time. `Database`
    /// tenants use their own pool, recreated once if its ping fails.
    pub async fn get_connection(
        &self,
        tenant: Option<&TenantContext>,
    ) -> Result<ConnectionHandle<C::Pool>> {
        self.ensure_open()?;

        let tenant = match tenant {
            Some(tenant) if tenant.tenant_type == TenantType::Database => tenant,
            _ => return self.shared().ok_or(DbError::NotConfigured),
        };
        let id = tenant.storefront_id.as_str();

        let (pool, config) = {
            let tenants = self.tenants.read().await;
            let entry = tenants
                .get(id)
                .ok_or_else(|| DbError::TenantNotConfigured(id.to_string()))?;
            (entry.pool.clone(), entry.config.clone())
        };

        match self.ping(&pool).await {
            Ok(()) => Ok(ConnectionHandle {
                identifier: id.to_string(),
                pool,
            }),
            Err(e) => {
                warn!(
                    storefront_id = %id,
                    error = %e,
                    "Tenant pool failed ping, recreating"
                );
                self.recreate(id, &pool, &config).await
            }
        }
    }

    async fn recreate(
        &self,
        id: &str,
        stale: &Arc<C::Pool>,
        config: &PoolConfig,
    ) -> Result<ConnectionHandle<C::Pool>> {
        let fresh = Arc::new(self.connector.connect(id, config).await?);

        if let Err(e) = self.ping(&fresh).await {
            close_quietly(id, fresh.as_ref()).await;
            return Err(DbError::Unhealthy {
                identifier: id.to_string(),
                reason: e.to_string(),
            });
        }

        let outcome = {
            let mut tenants = self.tenants.write().await;
            match tenants.get_mut(id) {
                Some(entry) if Arc::ptr_eq(&entry.pool, stale) => {
                    entry.pool = fresh.clone();
                    Swap::Replaced
                }
                Some(entry) => Swap::Superseded(entry.pool.clone()),
                None => Swap::Removed,
            }
        };

        match outcome {
            Swap::Replaced => {
                info!(storefront_id = %id, "Tenant pool recreated");
                close_quietly(id, stale.as_ref()).await;
                Ok(ConnectionHandle {
                    identifier: id.to_string(),
                    pool: fresh,
                })
            }
            Swap::Superseded(pool) => {
                close_quietly(id, fresh.as_ref()).await;
                Ok(ConnectionHandle {
                    identifier: id.to_string(),
                    pool,
                })
            }
            Swap::Removed => {
                close_quietly(id, fresh.as_ref()).await;
                Err(DbError::TenantNotConfigured(id.to_string()))
            }
        }
    }

    /// Register a database-per-tenant storefront, replacing any existing pool.
    ///
    /// The new pool must answer a ping before it is registered.
    pub async fn add_tenant(&self, id: &str, config: PoolConfig) -> Result<()> {
        self.ensure_open()?;
        if id.trim().is_empty() || id == SHARED_IDENTIFIER {
            return Err(DbError::Config(format!("invalid tenant id: {:?}", id)));
        }

        let config = config.with_defaults();
        let pool = Arc::new(self.connector.connect(id, &config).await?);
        if let Err(e) = self.ping(&pool).await {
            close_quietly(id, pool.as_ref()).await;
            return Err(e);
        }

        let previous = {
            let mut tenants = self.tenants.write().await;
            // close() flips the flag before draining under this lock.
            if self.is_closed() {
                drop(tenants);
                close_quietly(id, pool.as_ref()).await;
                return Err(DbError::Closed);
            }
            tenants.insert(
                id.to_string(),
                TenantEntry {
                    config: config.clone(),
                    pool,
                },
            )
        };

        info!(
            storefront_id = %id,
            dsn = %config.redacted_dsn(),
            replaced = previous.is_some(),
            "Tenant pool added"
        );

        if let Some(previous) = previous {
            close_quietly(id, previous.pool.as_ref()).await;
        }
        Ok(())
    }

    /// Unregister a tenant and close its pool.
    pub async fn remove_tenant(&self, id: &str) -> Result<()> {
        let entry = self
            .tenants
            .write()
            .await
            .remove(id)
            .ok_or_else(|| DbError::TenantNotConfigured(id.to_string()))?;

        info!(storefront_id = %id, "Tenant pool removed");
        entry.pool.close().await
    }

    pub async fn has_tenant(&self, id: &str) -> bool {
        self.tenants.read().await.contains_key(id)
    }

    pub async fn tenant_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.tenants.read().await.keys().cloned().collect();
        ids.sort();
        ids
    }

    /// Snapshot of every pool, shared first.
    pub async fn pools(&self) -> Vec<ConnectionHandle<C::Pool>> {
        let mut handles: Vec<ConnectionHandle<C::Pool>> = self.shared().into_iter().collect();
        let tenants = self.tenants.read().await;
        let mut ids: Vec<&String> = tenants.keys().collect();
        ids.sort();
        handles.extend(ids.into_iter().map(|id| ConnectionHandle {
            identifier: id.clone(),
            pool: tenants[id].pool.clone(),
        }));
        handles
    }

    /// Per-pool counters keyed by identifier.
    pub async fn stats(&self) -> BTreeMap<String, PoolStats> {
        self.pools()
            .await
            .into_iter()
            .map(|handle| (handle.identifier.clone(), handle.stats()))
            .collect()
    }

    pub fn ping_timeout(&self) -> Duration {
        self.ping_timeout
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Close every pool. Errors are collected and returned together.
    pub async fn close(&self) -> Result<()> {
        if self.closed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }

        let tenants: Vec<(String, TenantEntry<C::Pool>)> =
            self.tenants.write().await.drain().collect();

        let mut errors = Vec::new();
        for (id, entry) in tenants {
            if let Err(e) = entry.pool.close().await {
                error!(storefront_id = %id, error = %e, "Failed to close tenant pool");
                errors.push((id, e));
            }
        }
        if let Some(shared) = &self.shared
            && let Err(e) = shared.close().await
        {
            error!(identifier = SHARED_IDENTIFIER, error = %e, "Failed to close shared pool");
            errors.push((SHARED_IDENTIFIER.to_string(), e));
        }

        info!(failures = errors.len(), "Connection manager closed");
        if errors.is_empty() {
            Ok(())
        } else {
            Err(DbError::Close(errors))
        }
    }

    async fn ping(&self, pool: &C::Pool) -> Result<()> {
        ping_within(pool, self.ping_timeout).await
    }

    fn ensure_open(&self) -> Result<()> {
        if self.is_closed() {
            Err(DbError::Closed)
        } else {
            Ok(())
        }
    }
}

/// Ping with a deadline.
pub async fn ping_within<P: ManagedPool>(pool: &P, timeout: Duration) -> Result<()> {
    tokio::time::timeout(timeout, pool.ping())
        .await
        .map_err(|_| DbError::Timeout {
            operation: "ping",
            after: timeout,
        })?
}

async fn close_quietly<P: ManagedPool>(id: &str, pool: &P) {
    if let Err(e) = pool.close().await {
        warn!(storefront_id = %id, error = %e, "Failed to close stale pool");
    }
}
