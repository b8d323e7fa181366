// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Database configuration loading from environment variables.

use std::fmt::Write as _;
use std::time::Duration;

/// Default pool limits and timeouts.
pub const DEFAULT_MAX_OPEN: u32 = 25;
pub const DEFAULT_MAX_IDLE: u32 = 25;
pub const DEFAULT_CONN_MAX_LIFETIME: Duration = Duration::from_secs(300);
pub const DEFAULT_CONN_MAX_IDLE_TIME: Duration = Duration::from_secs(300);
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
pub const DEFAULT_HEALTH_CHECK_PERIOD: Duration = Duration::from_secs(30);

/// Connection parameters and limits for one pool.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PoolConfig {
    pub host: String,
    pub port: u16,
    pub user: String,
    pub password: String,
    pub dbname: String,
    /// libpq sslmode. Empty means `prefer`.
    pub ssl_mode: String,
    pub max_open: u32,
    pub max_idle: u32,
    pub conn_max_lifetime: Duration,
    pub conn_max_idle_time: Duration,
    pub connect_timeout: Duration,
    /// Zero disables the server-side statement timeout.
    pub statement_timeout: Duration,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 5432,
            user: "postgres".to_string(),
            password: String::new(),
            dbname: "kirimku".to_string(),
            ssl_mode: "prefer".to_string(),
            max_open: DEFAULT_MAX_OPEN,
            max_idle: DEFAULT_MAX_IDLE,
            conn_max_lifetime: DEFAULT_CONN_MAX_LIFETIME,
            conn_max_idle_time: DEFAULT_CONN_MAX_IDLE_TIME,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            statement_timeout: Duration::ZERO,
        }
    }
}

impl PoolConfig {
    /// Replace zero limits and blank connection fields with defaults.
    ///
    /// `max_idle` is capped at `max_open`.
    pub fn with_defaults(mut self) -> Self {
        let defaults = Self::default();
        if self.host.trim().is_empty() {
            self.host = defaults.host;
        }
        if self.port == 0 {
            self.port = defaults.port;
        }
        if self.user.trim().is_empty() {
            self.user = defaults.user;
        }
        if self.dbname.trim().is_empty() {
            self.dbname = defaults.dbname;
        }
        if self.ssl_mode.trim().is_empty() {
            self.ssl_mode = defaults.ssl_mode;
        }
        if self.max_open == 0 {
            self.max_open = defaults.max_open;
        }
        if self.max_idle == 0 {
            self.max_idle = defaults.max_idle;
        }
        self.max_idle = self.max_idle.min(self.max_open);
        if self.conn_max_lifetime.is_zero() {
            self.conn_max_lifetime = defaults.conn_max_lifetime;
        }
        if self.conn_max_idle_time.is_zero() {
            self.conn_max_idle_time = defaults.conn_max_idle_time;
        }
        if self.connect_timeout.is_zero() {
            self.connect_timeout = defaults.connect_timeout;
        }
        self
    }

    /// Key/value DSN:
    /// `host=.. port=.. user=.. password=.. dbname=.. sslmode=.. [connect_timeout=s] [statement_timeout=ms]`.
    pub fn dsn(&self) -> String {
        self.render_dsn(&self.password)
    }

    /// DSN with the password masked, for logs.
    pub fn redacted_dsn(&self) -> String {
        self.render_dsn("********")
    }

    fn render_dsn(&self, password: &str) -> String {
        let ssl_mode = match self.ssl_mode.trim() {
            "" => "prefer",
            mode => mode,
        };
        let mut dsn = format!(
            "host={} port={} user={} password={} dbname={} sslmode={}",
            quote_value(&self.host),
            self.port,
            quote_value(&self.user),
            quote_value(password),
            quote_value(&self.dbname),
            quote_value(ssl_mode),
        );
        if !self.connect_timeout.is_zero() {
            let _ = write!(dsn, " connect_timeout={}", self.connect_timeout.as_secs().max(1));
        }
        if !self.statement_timeout.is_zero() {
            let _ = write!(dsn, " statement_timeout={}", self.statement_timeout.as_millis());
        }
        dsn
    }
}

/// Quote a conninfo value when it is empty or contains spaces, quotes or backslashes.
fn quote_value(value: &str) -> String {
    let needs_quotes = value.is_empty()
        || value
            .chars()
            .any(|c| c.is_whitespace() || c == '\'' || c == '\\');
    if !needs_quotes {
        return value.to_string();
    }
    let escaped = value.replace('\\', "\\\\").replace('\'', "\\'");
    format!("'{}'", escaped)
}

/// Database configuration for the process.
#[derive(Debug, Clone)]
pub struct DbConfig {
    /// Shared pool settings. Also the template for per-tenant pools.
    pub pool: PoolConfig,
    /// Period of the background health sweep.
    pub health_check_period: Duration,
    /// Deployment environment (`development`, `staging`, `production`).
    pub app_env: String,
}

impl DbConfig {
    /// Load configuration from environment variables.
    ///
    /// Optional (with defaults):
    /// - `DB_HOST` (localhost), `DB_PORT` (5432), `DB_USER` (postgres),
    ///   `DB_PASSWORD` (empty), `DB_NAME` (kirimku), `DB_SSL_MODE` (disable)
    /// - `DB_MAX_OPEN_CONNS` (25), `DB_MAX_IDLE_CONNS` (25)
    /// - `DB_CONN_MAX_LIFETIME` (300s), `DB_MAX_IDLE_TIME` (300s)
    /// - `DB_CONNECT_TIMEOUT` (10s), `DB_STATEMENT_TIMEOUT` (0, disabled)
    /// - `DB_HEALTH_CHECK_PERIOD` (30s)
    /// - `APP_ENV` (development)
    pub fn from_env() -> Result<Self, ConfigError> {
        let port: u16 = env_or("DB_PORT", "5432")
            .parse()
            .map_err(|_| ConfigError::Invalid("DB_PORT", "must be a valid port number"))?;

        let pool = PoolConfig {
            host: env_or("DB_HOST", "localhost"),
            port,
            user: env_or("DB_USER", "postgres"),
            password: env_or("DB_PASSWORD", ""),
            dbname: env_or("DB_NAME", "kirimku"),
            ssl_mode: env_or("DB_SSL_MODE", "disable"),
            max_open: env_count("DB_MAX_OPEN_CONNS", DEFAULT_MAX_OPEN)?,
            max_idle: env_count("DB_MAX_IDLE_CONNS", DEFAULT_MAX_IDLE)?,
            conn_max_lifetime: env_duration("DB_CONN_MAX_LIFETIME", DEFAULT_CONN_MAX_LIFETIME)?,
            conn_max_idle_time: env_duration("DB_MAX_IDLE_TIME", DEFAULT_CONN_MAX_IDLE_TIME)?,
            connect_timeout: env_duration("DB_CONNECT_TIMEOUT", DEFAULT_CONNECT_TIMEOUT)?,
            statement_timeout: env_duration("DB_STATEMENT_TIMEOUT", Duration::ZERO)?,
        };

        Ok(Self {
            pool: pool.with_defaults(),
            health_check_period: env_duration(
                "DB_HEALTH_CHECK_PERIOD",
                DEFAULT_HEALTH_CHECK_PERIOD,
            )?,
            app_env: env_or("APP_ENV", "development"),
        })
    }

    /// Whether the process runs in production.
    pub fn is_production(&self) -> bool {
        self.app_env.eq_ignore_ascii_case("production")
    }
}

fn env_or(key: &str, default: &str) -> String {
    std::env::var(key)
        .ok()
        .filter(|v| !v.trim().is_empty())
        .unwrap_or_else(|| default.to_string())
}

fn env_count(key: &'static str, default: u32) -> Result<u32, ConfigError> {
    match std::env::var(key) {
        Ok(value) if !value.trim().is_empty() => value
            .trim()
            .parse()
            .map_err(|_| ConfigError::Invalid(key, "must be a non-negative integer")),
        _ => Ok(default),
    }
}

fn env_duration(key: &'static str, default: Duration) -> Result<Duration, ConfigError> {
    match std::env::var(key) {
        Ok(value) if !value.trim().is_empty() => parse_duration(&value).ok_or(
            ConfigError::Invalid(key, "must be a duration such as 300, 300s, 5m or 500ms"),
        ),
        _ => Ok(default),
    }
}

/// Parse `300` (seconds), `500ms`, `300s`, `5m` or `1h`.
pub fn parse_duration(value: &str) -> Option<Duration> {
    let value = value.trim();
    let split = value
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(value.len());
    let (amount, unit) = value.split_at(split);
    let amount: u64 = amount.parse().ok()?;
    match unit.trim() {
        "" | "s" => Some(Duration::from_secs(amount)),
        "ms" => Some(Duration::from_millis(amount)),
        "m" => Some(Duration::from_secs(amount.checked_mul(60)?)),
        "h" => Some(Duration::from_secs(amount.checked_mul(3600)?)),
        _ => None,
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// A required environment variable is missing.
    #[error("missing required environment variable: {0}")]
    Missing(&'static str),

    /// An environment variable has an invalid value.
    #[error("invalid value for {0}: {1}")]
    Invalid(&'static str, &'static str),
}
