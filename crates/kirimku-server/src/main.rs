// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Kirimku Server - Courier Webhook Service
//!
//! An HTTP server responsible for:
//! - Courier webhook ingestion (JNE, SiCepat, NinjaVan)
//! - Tenant routing to shared, schema and database-per-tenant datastores
//! - Background database health checks

use std::sync::Arc;

use anyhow::Context;
use kirimku_server::{AppState, PgTrackingSink, ServerConfig, router};
use kirimku_tenancy::postgres::load_tenant_configs;
use kirimku_tenancy::{
    ConnectionManager, DbConfig, DbError, HealthChecker, HealthCheckerConfig, PgConnector,
    PgStorefrontDirectory, PoolConfig, TenantResolver,
};
use kirimku_tracking::WebhookDispatcher;
use sqlx::PgPool;
use tracing::{error, info, warn};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "kirimku_server=info,kirimku_tenancy=info,kirimku_tracking=info".into()
            }),
        )
        .init();

    // Load .env file if present
    if let Err(e) = dotenvy::dotenv() {
        warn!("No .env file loaded: {}", e);
    }

    // Load configuration
    let config = ServerConfig::from_env()?;
    let db_config = DbConfig::from_env()?;
    config.warn_insecure();

    info!(
        http_addr = %config.http_addr,
        app_env = %config.app_env,
        database = %db_config.pool.redacted_dsn(),
        "Starting Kirimku Server"
    );

    // Shared pool
    let manager =
        Arc::new(ConnectionManager::with_shared(PgConnector::new(), &db_config.pool).await?);
    let shared_pool = manager
        .shared()
        .context("shared pool not configured")?
        .pool()
        .pool()
        .clone();

    sqlx::raw_sql(include_str!("../migrations/schema.sql"))
        .execute(&shared_pool)
        .await?;

    info!("Database schema verified");

    if config.bootstrap_tenants {
        bootstrap_tenants(&manager, &shared_pool, &db_config.pool).await;
    }

    // Background health checks
    let health = Arc::new(HealthChecker::new(
        manager.clone(),
        HealthCheckerConfig {
            period: db_config.health_check_period,
            ..HealthCheckerConfig::default()
        },
    ));
    let health_task = health.spawn();

    let mut resolver = TenantResolver::new(Arc::new(PgStorefrontDirectory::new(shared_pool)));
    if let Some(domain) = &config.tenant_base_domain {
        resolver = resolver.with_base_domain(domain.clone());
    }

    let state = AppState {
        dispatcher: Arc::new(WebhookDispatcher::new(config.webhook_secrets.clone())),
        resolver,
        sink: Arc::new(PgTrackingSink::new(manager.clone())),
        health: health.clone(),
    };

    let listener = tokio::net::TcpListener::bind(config.http_addr).await?;
    info!(addr = %config.http_addr, "HTTP server ready");

    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    // Graceful shutdown
    health.stop();
    if let Err(e) = health_task.await {
        warn!(error = %e, "Health checker task failed");
    }

    match manager.close().await {
        Ok(()) => {}
        Err(DbError::Close(failures)) => {
            for (identifier, e) in &failures {
                error!(identifier = %identifier, error = %e, "Pool failed to close");
            }
        }
        Err(e) => error!(error = %e, "Failed to close connection manager"),
    }

    info!("Kirimku Server shut down");

    Ok(())
}

/// Register every database-per-tenant storefront. A failing tenant is skipped.
async fn bootstrap_tenants(
    manager: &ConnectionManager<PgConnector>,
    shared_pool: &PgPool,
    template: &PoolConfig,
) {
    let configs = match load_tenant_configs(shared_pool, template).await {
        Ok(configs) => configs,
        Err(e) => {
            error!(error = %e, "Failed to load tenant databases");
            return;
        }
    };

    let total = configs.len();
    let mut added = 0;
    for (storefront_id, tenant_config) in configs {
        match manager.add_tenant(&storefront_id, tenant_config).await {
            Ok(()) => added += 1,
            Err(e) => warn!(
                storefront_id = %storefront_id,
                error = %e,
                "Skipping tenant database"
            ),
        }
    }

    info!(added, total, "Tenant databases registered");
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}
