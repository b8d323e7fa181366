// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Kirimku Tenancy - Multi-Tenant Database Routing
//!
//! Every request runs on behalf of at most one storefront. This crate decides
//! which database serves it and keeps those databases healthy.
//!
//! - [`TenantResolver`] turns the `X-Storefront-Slug` or `Host` header into a
//!   [`TenantContext`].
//! - [`ConnectionManager`] hands out the shared pool or the storefront's
//!   dedicated pool, recreating a dedicated pool once when it stops answering.
//! - [`HealthChecker`] pings every pool in the background and publishes a
//!   [`HealthStatus`] snapshot.
//! - [`run_in_tx`] runs a unit of work in a transaction with commit, rollback
//!   and panic handling.
//!
//! Pools are accessed through the [`ManagedPool`] and [`PoolConnector`]
//! traits. [`postgres`] implements them with sqlx; [`mock`] implements them
//! in memory for tests.
//!
//! # Example
//!
//! ```
//! use kirimku_tenancy::mock::MockConnector;
//! use kirimku_tenancy::{ConnectionManager, PoolConfig, TenantContext, TenantType};
//!
//! # tokio_test_block_on(async {
//! let manager = ConnectionManager::with_shared(MockConnector::new(), &PoolConfig::default())
//!     .await
//!     .unwrap();
//! manager.add_tenant("42", PoolConfig::default()).await.unwrap();
//!
//! let tenant = TenantContext::new("42", "toko-a", TenantType::Database);
//! let handle = manager.get_connection(Some(&tenant)).await.unwrap();
//! assert_eq!(handle.identifier(), "42");
//! # });
//! # fn tokio_test_block_on<F: std::future::Future>(f: F) -> F::Output {
//! #     tokio::runtime::Runtime::new().unwrap().block_on(f)
//! # }
//! ```

pub mod config;
pub mod context;
pub mod error;
pub mod health;
pub mod manager;
pub mod mock;
pub mod pool;
pub mod postgres;
pub mod transaction;

pub use config::{ConfigError, DbConfig, PoolConfig};
pub use context::{StaticDirectory, StorefrontDirectory, TenantContext, TenantResolver, TenantType};
pub use error::{DbError, ResolveError, Result};
pub use health::{
    ConnectionHealth, ConnectionState, HealthChecker, HealthCheckerConfig, HealthSource,
    HealthStatus, OverallHealth,
};
pub use manager::{ConnectionHandle, ConnectionManager, SHARED_IDENTIFIER};
pub use pool::{ManagedPool, PoolConnector, PoolStats, TxControl};
pub use postgres::{PgConnector, PgStorefrontDirectory, PgTenantPool};
pub use transaction::{run_in_tx, run_on_pool};
