// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Error types for tenant routing and pooled database access.

use std::time::Duration;

use thiserror::Error;

/// Errors raised by the connection manager, pools and transactions.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum DbError {
    /// No shared pool was configured.
    #[error("Shared database is not configured")]
    NotConfigured,

    /// The tenant has no dedicated pool registered.
    #[error("Tenant not configured: {0}")]
    TenantNotConfigured(String),

    /// A pool failed its liveness check and could not be recreated.
    #[error("Database {identifier} is unhealthy: {reason}")]
    Unhealthy { identifier: String, reason: String },

    /// The operation did not complete before its deadline.
    #[error("{operation} timed out after {after:?}")]
    Timeout {
        operation: &'static str,
        after: Duration,
    },

    /// Invalid pool or tenant configuration.
    #[error("Invalid database configuration: {0}")]
    Config(String),

    /// The connection manager has been closed.
    #[error("Connection manager is closed")]
    Closed,

    /// Error reported by the database driver.
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// One or more pools failed to close.
    #[error("Failed to close {} pool(s)", .0.len())]
    Close(Vec<(String, DbError)>),

    /// Transaction could not be started, committed, or rolled back.
    #[error("Transaction error: {0}")]
    Transaction(String),
}

impl DbError {
    /// Stable error code for logs and response bodies.
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::NotConfigured => "DB_NOT_CONFIGURED",
            Self::TenantNotConfigured(_) => "TENANT_NOT_CONFIGURED",
            Self::Unhealthy { .. } => "DB_UNHEALTHY",
            Self::Timeout { .. } => "TIMEOUT",
            Self::Config(_) => "DB_CONFIG_INVALID",
            Self::Closed => "DB_CLOSED",
            Self::Database(_) => "DATABASE_ERROR",
            Self::Close(_) => "DB_CLOSE_FAILED",
            Self::Transaction(_) => "TRANSACTION_ERROR",
        }
    }

    /// Whether this is a configuration problem rather than a runtime failure.
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            Self::NotConfigured | Self::TenantNotConfigured(_) | Self::Config(_)
        )
    }
}

/// Result type using [`DbError`].
pub type Result<T> = std::result::Result<T, DbError>;

/// Errors raised while resolving the tenant of a request.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ResolveError {
    /// The request named no storefront.
    #[error("Storefront slug is required")]
    MissingSlug,

    /// The slug contains characters outside `[a-z0-9-]` or is too long.
    #[error("Invalid storefront slug: {0}")]
    InvalidSlug(String),

    /// No storefront has this slug.
    #[error("Unknown storefront: {0}")]
    UnknownStorefront(String),

    /// The storefront directory could not be queried.
    #[error("Storefront lookup failed: {0}")]
    Lookup(#[from] DbError),
}

impl ResolveError {
    /// Stable error code for logs and response bodies.
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::MissingSlug => "MISSING_STOREFRONT",
            Self::InvalidSlug(_) => "INVALID_STOREFRONT",
            Self::UnknownStorefront(_) => "UNKNOWN_STOREFRONT",
            Self::Lookup(_) => "STOREFRONT_LOOKUP_FAILED",
        }
    }

    /// HTTP status the boundary should answer with.
    pub fn http_status(&self) -> u16 {
        match self {
            Self::Lookup(_) => 500,
            _ => 400,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_codes() {
        assert_eq!(DbError::NotConfigured.error_code(), "DB_NOT_CONFIGURED");
        assert_eq!(
            DbError::TenantNotConfigured("t1".into()).error_code(),
            "TENANT_NOT_CONFIGURED"
        );
        assert!(DbError::TenantNotConfigured("t1".into()).is_configuration());
        assert!(
            !DbError::Timeout {
                operation: "ping",
                after: Duration::from_secs(5)
            }
            .is_configuration()
        );
    }

    #[test]
    fn test_close_error_message_counts_pools() {
        let err = DbError::Close(vec![
            ("t1".into(), DbError::Closed),
            ("t2".into(), DbError::Closed),
        ]);
        assert_eq!(err.to_string(), "Failed to close 2 pool(s)");
    }

    #[test]
    fn test_resolve_statuses() {
        assert_eq!(ResolveError::MissingSlug.http_status(), 400);
        assert_eq!(ResolveError::InvalidSlug("A B".into()).http_status(), 400);
        assert_eq!(ResolveError::UnknownStorefront("x".into()).http_status(), 400);
        assert_eq!(ResolveError::Lookup(DbError::Closed).http_status(), 500);
    }

    #[test]
    fn test_timeout_display() {
        let err = DbError::Timeout {
            operation: "ping",
            after: Duration::from_secs(5),
        };
        assert_eq!(err.to_string(), "ping timed out after 5s");
    }
}
