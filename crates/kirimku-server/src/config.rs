// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Configuration for kirimku-server.

use std::net::SocketAddr;

use kirimku_tenancy::ConfigError;
use kirimku_tracking::WebhookSecrets;
use kirimku_tracking::update::Carrier;
use tracing::warn;

/// Server configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// HTTP listen address
    pub http_addr: SocketAddr,
    /// Deployment environment (`development`, `staging`, `production`)
    pub app_env: String,
    /// Per-carrier webhook HMAC secrets; empty disables verification
    pub webhook_secrets: WebhookSecrets,
    /// Domain whose subdomains name storefronts, e.g. `kirimku.id`
    pub tenant_base_domain: Option<String>,
    /// Load database-per-tenant pools from `tenant_databases` at startup
    pub bootstrap_tenants: bool,
}

impl ServerConfig {
    /// Load configuration from environment variables.
    ///
    /// - `HTTP_PORT` (8080)
    /// - `APP_ENV` (development)
    /// - `JNE_WEBHOOK_SECRET`, `SICEPAT_WEBHOOK_SECRET`, `NINJAVAN_WEBHOOK_SECRET` (empty)
    /// - `TENANT_BASE_DOMAIN` (unset)
    /// - `TENANT_BOOTSTRAP` (true)
    pub fn from_env() -> Result<Self, ConfigError> {
        let port: u16 = std::env::var("HTTP_PORT")
            .unwrap_or_else(|_| "8080".to_string())
            .parse()
            .map_err(|_| ConfigError::Invalid("HTTP_PORT", "must be a valid port number"))?;

        let http_addr = SocketAddr::from(([0, 0, 0, 0], port));

        let app_env = std::env::var("APP_ENV")
            .ok()
            .filter(|v| !v.trim().is_empty())
            .unwrap_or_else(|| "development".to_string());

        let webhook_secrets = WebhookSecrets {
            jne: std::env::var("JNE_WEBHOOK_SECRET").unwrap_or_default(),
            sicepat: std::env::var("SICEPAT_WEBHOOK_SECRET").unwrap_or_default(),
            ninjavan: std::env::var("NINJAVAN_WEBHOOK_SECRET").unwrap_or_default(),
        };

        let tenant_base_domain = std::env::var("TENANT_BASE_DOMAIN")
            .ok()
            .filter(|v| !v.trim().is_empty());

        let bootstrap_tenants = std::env::var("TENANT_BOOTSTRAP")
            .map(|v| v != "false" && v != "0")
            .unwrap_or(true);

        Ok(Self {
            http_addr,
            app_env,
            webhook_secrets,
            tenant_base_domain,
            bootstrap_tenants,
        })
    }

    pub fn is_production(&self) -> bool {
        self.app_env.eq_ignore_ascii_case("production")
    }

    /// Carriers whose webhooks are accepted without a signature check.
    pub fn unsigned_carriers(&self) -> Vec<Carrier> {
        Carrier::ALL
            .into_iter()
            .filter(|carrier| self.webhook_secrets.for_carrier(*carrier).is_empty())
            .collect()
    }

    /// Warn about unsigned carriers in production.
    pub fn warn_insecure(&self) {
        if !self.is_production() {
            return;
        }
        for carrier in self.unsigned_carriers() {
            warn!(
                carrier = %carrier,
                "Webhook secret is empty in production; signatures will not be verified"
            );
        }
    }
}
