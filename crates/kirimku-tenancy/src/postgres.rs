// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! PostgreSQL backend built on sqlx.
//!
//! Pools are created lazily: `connect` never touches the network, the
//! connection manager's first ping does. Lifetime and idle-time limits are
//! enforced when a pooled connection is handed out, `max_idle` when one is
//! returned, and both are counted in [`PoolStats`].

use std::str::FromStr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use sqlx::postgres::{PgConnectOptions, PgConnection, PgPoolOptions, PgSslMode};
use sqlx::{Connection, PgPool, Postgres, Transaction};
use tracing::{debug, warn};

use crate::config::PoolConfig;
use crate::context::{StorefrontDirectory, TenantContext, TenantType};
use crate::error::{DbError, Result};
use crate::pool::{ManagedPool, PoolConnector, PoolStats, TxControl};

#[derive(Debug, Default)]
struct Counters {
    wait_count: AtomicU64,
    wait_nanos: AtomicU64,
    max_idle_closed: AtomicU64,
    max_lifetime_closed: AtomicU64,
}

/// Creates [`PgTenantPool`]s.
#[derive(Debug, Clone, Copy, Default)]
pub struct PgConnector;

impl PgConnector {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl PoolConnector for PgConnector {
    type Pool = PgTenantPool;

    async fn connect(&self, identifier: &str, config: &PoolConfig) -> Result<PgTenantPool> {
        let pool = PgTenantPool::connect_lazy(config)?;
        debug!(
            identifier = %identifier,
            dsn = %config.redacted_dsn(),
            "Database pool configured"
        );
        Ok(pool)
    }
}

/// A sqlx pool with connection-limit accounting.
#[derive(Debug, Clone)]
pub struct PgTenantPool {
    pool: PgPool,
    counters: Arc<Counters>,
    max_open: u32,
    /// Lets the release hook read the idle count. Cleared on close.
    slot: Arc<Mutex<Option<PgPool>>>,
}

impl PgTenantPool {
    /// Build a pool without connecting.
    pub fn connect_lazy(config: &PoolConfig) -> Result<Self> {
        let config = config.clone().with_defaults();
        let options = connect_options(&config)?;
        let counters = Arc::new(Counters::default());
        let slot: Arc<Mutex<Option<PgPool>>> = Arc::new(Mutex::new(None));

        let max_lifetime = config.conn_max_lifetime;
        let max_idle_time = config.conn_max_idle_time;
        let acquire_counters = counters.clone();

        let max_idle = config.max_idle as usize;
        let release_counters = counters.clone();
        let release_slot = slot.clone();

        let pool = PgPoolOptions::new()
            .max_connections(config.max_open)
            .acquire_timeout(config.connect_timeout)
            .max_lifetime(None)
            .idle_timeout(None)
            .before_acquire(move |_conn, meta| {
                let keep = if meta.age >= max_lifetime {
                    acquire_counters
                        .max_lifetime_closed
                        .fetch_add(1, Ordering::Relaxed);
                    false
                } else if meta.idle_for >= max_idle_time {
                    acquire_counters
                        .max_idle_closed
                        .fetch_add(1, Ordering::Relaxed);
                    false
                } else {
                    true
                };
                Box::pin(async move { Ok(keep) })
            })
            .after_release(move |_conn, _meta| {
                let idle = release_slot
                    .lock()
                    .ok()
                    .and_then(|slot| slot.as_ref().map(|pool| pool.num_idle()));
                let keep = match idle {
                    Some(idle) if idle >= max_idle => {
                        release_counters
                            .max_idle_closed
                            .fetch_add(1, Ordering::Relaxed);
                        false
                    }
                    _ => true,
                };
                Box::pin(async move { Ok(keep) })
            })
            .connect_lazy_with(options);

        if let Ok(mut guard) = slot.lock() {
            *guard = Some(pool.clone());
        }

        Ok(Self {
            pool,
            counters,
            max_open: config.max_open,
            slot,
        })
    }

    /// The underlying sqlx pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    fn saturated(&self) -> bool {
        self.pool.num_idle() == 0 && self.pool.size() >= self.max_open
    }

    fn record_wait(&self, started: Instant) {
        let nanos = u64::try_from(started.elapsed().as_nanos()).unwrap_or(u64::MAX);
        self.counters.wait_count.fetch_add(1, Ordering::Relaxed);
        self.counters.wait_nanos.fetch_add(nanos, Ordering::Relaxed);
    }
}

#[async_trait]
impl ManagedPool for PgTenantPool {
    type Tx = Transaction<'static, Postgres>;

    async fn ping(&self) -> Result<()> {
        let waiting = self.saturated();
        let started = Instant::now();
        let mut conn = self.pool.acquire().await?;
        if waiting {
            self.record_wait(started);
        }
        conn.ping().await?;
        Ok(())
    }

    async fn begin(&self) -> Result<Self::Tx> {
        let waiting = self.saturated();
        let started = Instant::now();
        let tx = self.pool.begin().await?;
        if waiting {
            self.record_wait(started);
        }
        Ok(tx)
    }

    async fn close(&self) -> Result<()> {
        if let Ok(mut guard) = self.slot.lock() {
            guard.take();
        }
        self.pool.close().await;
        Ok(())
    }

    fn is_closed(&self) -> bool {
        self.pool.is_closed()
    }

    fn stats(&self) -> PoolStats {
        let open = self.pool.size();
        let idle = u32::try_from(self.pool.num_idle()).unwrap_or(u32::MAX).min(open);
        PoolStats {
            open,
            in_use: open - idle,
            idle,
            wait_count: self.counters.wait_count.load(Ordering::Relaxed),
            wait_duration: Duration::from_nanos(self.counters.wait_nanos.load(Ordering::Relaxed)),
            max_idle_closed: self.counters.max_idle_closed.load(Ordering::Relaxed),
            max_lifetime_closed: self.counters.max_lifetime_closed.load(Ordering::Relaxed),
            max_open_connections: self.max_open,
        }
    }
}

#[async_trait]
impl TxControl for Transaction<'static, Postgres> {
    async fn commit(self) -> Result<()> {
        Transaction::commit(self).await.map_err(DbError::from)
    }

    async fn rollback(self) -> Result<()> {
        Transaction::rollback(self).await.map_err(DbError::from)
    }
}

/// sqlx connect options for a pool configuration.
pub fn connect_options(config: &PoolConfig) -> Result<PgConnectOptions> {
    let ssl_mode = match config.ssl_mode.trim() {
        "" => PgSslMode::Prefer,
        mode => PgSslMode::from_str(mode)
            .map_err(|_| DbError::Config(format!("invalid sslmode: {}", mode)))?,
    };

    let mut options = PgConnectOptions::new()
        .host(&config.host)
        .port(config.port)
        .username(&config.user)
        .database(&config.dbname)
        .ssl_mode(ssl_mode);
    if !config.password.is_empty() {
        options = options.password(&config.password);
    }
    if !config.statement_timeout.is_zero() {
        options = options.options([(
            "statement_timeout",
            config.statement_timeout.as_millis().to_string(),
        )]);
    }
    Ok(options)
}

#[derive(Debug, sqlx::FromRow)]
struct StorefrontRow {
    id: String,
    slug: String,
    tenant_type: String,
}

/// Storefront directory backed by the `storefronts` table.
#[derive(Debug, Clone)]
pub struct PgStorefrontDirectory {
    pool: PgPool,
}

impl PgStorefrontDirectory {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl StorefrontDirectory for PgStorefrontDirectory {
    async fn find_by_slug(&self, slug: &str) -> Result<Option<TenantContext>> {
        let row = sqlx::query_as::<_, StorefrontRow>(
            r#"
            SELECT id::text AS id, slug, tenant_type
            FROM storefronts
            WHERE slug = $1
            "#,
        )
        .bind(slug)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|row| {
            let tenant_type = row.tenant_type.parse().unwrap_or_else(|e| {
                warn!(storefront_slug = %row.slug, error = %e, "Unknown tenant type, using shared");
                TenantType::Shared
            });
            TenantContext::new(row.id, row.slug, tenant_type)
        }))
    }
}

#[derive(Debug, sqlx::FromRow)]
struct TenantDatabaseRow {
    storefront_id: String,
    db_host: String,
    db_port: i32,
    db_user: String,
    db_password: String,
    db_name: String,
    ssl_mode: Option<String>,
    max_open_conns: Option<i32>,
    max_idle_conns: Option<i32>,
}

/// Dedicated database settings of every database-per-tenant storefront.
///
/// Limits and timeouts not stored per tenant are taken from `template`.
pub async fn load_tenant_configs(
    pool: &PgPool,
    template: &PoolConfig,
) -> Result<Vec<(String, PoolConfig)>> {
    let rows = sqlx::query_as::<_, TenantDatabaseRow>(
        r#"
        SELECT storefront_id::text AS storefront_id, db_host, db_port, db_user,
               db_password, db_name, ssl_mode, max_open_conns, max_idle_conns
        FROM tenant_databases
        ORDER BY storefront_id
        "#,
    )
    .fetch_all(pool)
    .await?;

    Ok(rows
        .into_iter()
        .map(|row| {
            let config = PoolConfig {
                host: row.db_host,
                port: u16::try_from(row.db_port).unwrap_or(0),
                user: row.db_user,
                password: row.db_password,
                dbname: row.db_name,
                ssl_mode: row.ssl_mode.unwrap_or_else(|| template.ssl_mode.clone()),
                max_open: row
                    .max_open_conns
                    .and_then(|n| u32::try_from(n).ok())
                    .unwrap_or(template.max_open),
                max_idle: row
                    .max_idle_conns
                    .and_then(|n| u32::try_from(n).ok())
                    .unwrap_or(template.max_idle),
                ..template.clone()
            };
            (row.storefront_id, config.with_defaults())
        })
        .collect())
}

/// Whether `schema` is a plain lowercase identifier.
pub fn is_valid_schema_name(schema: &str) -> bool {
    !schema.is_empty()
        && schema.len() <= 63
        && schema
            .bytes()
            .all(|b| b.is_ascii_lowercase() || b.is_ascii_digit() || b == b'_')
        && !schema.as_bytes()[0].is_ascii_digit()
}

/// Select `schema` for the rest of the current transaction.
pub async fn set_search_path(conn: &mut PgConnection, schema: &str) -> Result<()> {
    if !is_valid_schema_name(schema) {
        return Err(DbError::Config(format!("invalid schema name: {:?}", schema)));
    }
    let statement = format!(r#"SET LOCAL search_path TO "{}", public"#, schema);
    sqlx::query(&statement).execute(conn).await?;
    Ok(())
}

/// Select the tenant's schema when it has one. No-op for other tenant types.
pub async fn apply_tenant_schema(conn: &mut PgConnection, tenant: &TenantContext) -> Result<()> {
    match tenant.schema_name() {
        Some(schema) => set_search_path(conn, &schema).await,
        None => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_schema_name_validation() {
        assert!(is_valid_schema_name("storefront_toko_a"));
        assert!(!is_valid_schema_name(""));
        assert!(!is_valid_schema_name("1abc"));
        assert!(!is_valid_schema_name("toko-a"));
        assert!(!is_valid_schema_name(r#"x"; DROP TABLE y; --"#));
        assert!(!is_valid_schema_name(&"a".repeat(64)));
    }

    #[test]
    fn test_connect_options_rejects_bad_sslmode() {
        let config = PoolConfig {
            ssl_mode: "sometimes".into(),
            ..PoolConfig::default()
        };
        assert!(matches!(connect_options(&config), Err(DbError::Config(_))));
    }

    #[test]
    fn test_connect_options() {
        let config = PoolConfig {
            host: "db.internal".into(),
            port: 6432,
            dbname: "tenant_a".into(),
            ssl_mode: "disable".into(),
            ..PoolConfig::default()
        };
        let options = connect_options(&config).unwrap();
        assert_eq!(options.get_host(), "db.internal");
        assert_eq!(options.get_port(), 6432);
        assert_eq!(options.get_database(), Some("tenant_a"));
    }

    #[tokio::test]
    async fn test_lazy_pool_starts_empty() {
        let pool = PgConnector::new()
            .connect("t1", &PoolConfig::default())
            .await
            .unwrap();
        let stats = pool.stats();
        assert_eq!(stats.open, 0);
        assert_eq!(stats.in_use, 0);
        assert_eq!(stats.max_open_connections, 25);
        pool.close().await.unwrap();
        assert!(pool.is_closed());
    }
}
