// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Tenant context and resolution.
//!
//! A [`TenantContext`] tells the connection manager which datastore serves
//! a request:
//!
//! | Tenant type | Datastore |
//! |-------------|-----------|
//! | `shared` | shared pool, shared tables |
//! | `schema` | shared pool, `storefront_<slug>` schema selected by the caller |
//! | `database` | dedicated pool registered with `add_tenant` |
//!
//! The slug comes from the `X-Storefront-Slug` header or, when a base domain
//! is configured, from the first label of the `Host` header.

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{DbError, ResolveError};

/// Maximum length of a storefront slug (one DNS label).
pub const MAX_SLUG_LEN: usize = 63;

/// Isolation strategy of a tenant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TenantType {
    #[default]
    Shared,
    Schema,
    Database,
}

impl TenantType {
    pub fn as_str(&self) -> &'static str {
        match self {
            TenantType::Shared => "shared",
            TenantType::Schema => "schema",
            TenantType::Database => "database",
        }
    }
}

impl fmt::Display for TenantType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TenantType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "shared" => Ok(TenantType::Shared),
            "schema" => Ok(TenantType::Schema),
            "database" => Ok(TenantType::Database),
            other => Err(format!("unknown tenant type: {}", other)),
        }
    }
}

/// Per-request tenant description. Never persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TenantContext {
    pub storefront_id: String,
    pub storefront_slug: String,
    pub tenant_type: TenantType,
}

impl TenantContext {
    pub fn new(
        storefront_id: impl Into<String>,
        storefront_slug: impl Into<String>,
        tenant_type: TenantType,
    ) -> Self {
        Self {
            storefront_id: storefront_id.into(),
            storefront_slug: storefront_slug.into(),
            tenant_type,
        }
    }

    /// Schema holding this tenant's tables, for `Schema` tenants only.
    pub fn schema_name(&self) -> Option<String> {
        (self.tenant_type == TenantType::Schema)
            .then(|| format!("storefront_{}", self.storefront_slug.replace('-', "_")))
    }
}

/// Lookup of storefronts by slug.
#[async_trait]
pub trait StorefrontDirectory: Send + Sync {
    async fn find_by_slug(&self, slug: &str) -> Result<Option<TenantContext>, DbError>;
}

/// In-memory directory.
#[derive(Debug, Clone, Default)]
pub struct StaticDirectory {
    entries: HashMap<String, TenantContext>,
}

impl StaticDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, tenant: TenantContext) {
        self.entries.insert(tenant.storefront_slug.clone(), tenant);
    }

    pub fn with(mut self, tenant: TenantContext) -> Self {
        self.insert(tenant);
        self
    }
}

impl FromIterator<TenantContext> for StaticDirectory {
    fn from_iter<I: IntoIterator<Item = TenantContext>>(iter: I) -> Self {
        let mut directory = Self::new();
        for tenant in iter {
            directory.insert(tenant);
        }
        directory
    }
}

#[async_trait]
impl StorefrontDirectory for StaticDirectory {
    async fn find_by_slug(&self, slug: &str) -> Result<Option<TenantContext>, DbError> {
        Ok(self.entries.get(slug).cloned())
    }
}

/// Validate and lowercase a storefront slug.
pub fn normalize_slug(slug: &str) -> Result<String, ResolveError> {
    let slug = slug.trim().to_ascii_lowercase();
    let valid = !slug.is_empty()
        && slug.len() <= MAX_SLUG_LEN
        && slug
            .bytes()
            .all(|b| b.is_ascii_lowercase() || b.is_ascii_digit() || b == b'-');
    if valid {
        Ok(slug)
    } else {
        Err(ResolveError::InvalidSlug(slug))
    }
}

/// Slug of a `Host` header under `base_domain`, e.g. `toko-a` for
/// `toko-a.kirimku.id:8080` with base domain `kirimku.id`.
pub fn slug_from_host(host: &str, base_domain: &str) -> Option<String> {
    let host = host.trim().to_ascii_lowercase();
    let host = host.split(':').next().unwrap_or_default();
    let base = base_domain.trim().trim_start_matches('.').to_ascii_lowercase();
    if base.is_empty() {
        return None;
    }
    let label = host.strip_suffix(&base)?.strip_suffix('.')?;
    (!label.is_empty() && !label.contains('.')).then(|| label.to_string())
}

/// Resolves the tenant of a request from its headers.
#[derive(Clone)]
pub struct TenantResolver {
    directory: Arc<dyn StorefrontDirectory>,
    base_domain: Option<String>,
}

impl TenantResolver {
    pub fn new(directory: Arc<dyn StorefrontDirectory>) -> Self {
        Self {
            directory,
            base_domain: None,
        }
    }

    /// Derive slugs from `Host` headers under this domain.
    pub fn with_base_domain(mut self, base_domain: impl Into<String>) -> Self {
        let base_domain = base_domain.into();
        self.base_domain = (!base_domain.trim().is_empty()).then_some(base_domain);
        self
    }

    /// The slug named by the request, if any. The explicit header wins over the host.
    pub fn slug_of(&self, header_slug: Option<&str>, host: Option<&str>) -> Option<String> {
        if let Some(slug) = header_slug.filter(|s| !s.trim().is_empty()) {
            return Some(slug.to_string());
        }
        match (host, &self.base_domain) {
            (Some(host), Some(base)) => slug_from_host(host, base),
            _ => None,
        }
    }

    /// Resolve a slug to its tenant.
    pub async fn resolve_slug(&self, slug: &str) -> Result<TenantContext, ResolveError> {
        let slug = normalize_slug(slug)?;
        let tenant = self
            .directory
            .find_by_slug(&slug)
            .await?
            .ok_or_else(|| ResolveError::UnknownStorefront(slug.clone()))?;
        debug!(
            storefront_slug = %slug,
            storefront_id = %tenant.storefront_id,
            tenant_type = %tenant.tenant_type,
            "Resolved tenant"
        );
        Ok(tenant)
    }

    /// Resolve a request that must name a storefront.
    pub async fn resolve(
        &self,
        header_slug: Option<&str>,
        host: Option<&str>,
    ) -> Result<TenantContext, ResolveError> {
        let slug = self
            .slug_of(header_slug, host)
            .ok_or(ResolveError::MissingSlug)?;
        self.resolve_slug(&slug).await
    }

    /// Resolve a request that may name a storefront. `None` means shared.
    pub async fn resolve_optional(
        &self,
        header_slug: Option<&str>,
        host: Option<&str>,
    ) -> Result<Option<TenantContext>, ResolveError> {
        match self.slug_of(header_slug, host) {
            Some(slug) => self.resolve_slug(&slug).await.map(Some),
            None => Ok(None),
        }
    }
}

impl fmt::Debug for TenantResolver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TenantResolver")
            .field("base_domain", &self.base_domain)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn resolver() -> TenantResolver {
        let directory: StaticDirectory = [
            TenantContext::new("1", "toko-a", TenantType::Shared),
            TenantContext::new("2", "toko-b", TenantType::Schema),
            TenantContext::new("3", "toko-c", TenantType::Database),
        ]
        .into_iter()
        .collect();
        TenantResolver::new(Arc::new(directory)).with_base_domain("kirimku.id")
    }

    #[test]
    fn test_tenant_type_parsing() {
        assert_eq!("Database".parse::<TenantType>().unwrap(), TenantType::Database);
        assert_eq!(" schema ".parse::<TenantType>().unwrap(), TenantType::Schema);
        assert!("cluster".parse::<TenantType>().is_err());
        assert_eq!(
            serde_json::to_value(TenantType::Shared).unwrap(),
            serde_json::json!("shared")
        );
    }

    #[test]
    fn test_schema_name() {
        let ctx = TenantContext::new("2", "toko-b", TenantType::Schema);
        assert_eq!(ctx.schema_name().as_deref(), Some("storefront_toko_b"));
        let ctx = TenantContext::new("3", "toko-c", TenantType::Database);
        assert_eq!(ctx.schema_name(), None);
    }

    #[test]
    fn test_normalize_slug() {
        assert_eq!(normalize_slug(" Toko-A ").unwrap(), "toko-a");
        assert!(matches!(normalize_slug(""), Err(ResolveError::InvalidSlug(_))));
        assert!(normalize_slug("toko a").is_err());
        assert!(normalize_slug("toko_a").is_err());
        assert!(normalize_slug(&"a".repeat(64)).is_err());
        assert!(normalize_slug(&"a".repeat(63)).is_ok());
    }

    #[test]
    fn test_slug_from_host() {
        assert_eq!(
            slug_from_host("toko-a.kirimku.id", "kirimku.id").as_deref(),
            Some("toko-a")
        );
        assert_eq!(
            slug_from_host("Toko-A.Kirimku.id:8080", ".kirimku.id").as_deref(),
            Some("toko-a")
        );
        assert_eq!(slug_from_host("kirimku.id", "kirimku.id"), None);
        assert_eq!(slug_from_host("a.b.kirimku.id", "kirimku.id"), None);
        assert_eq!(slug_from_host("evilkirimku.id", "kirimku.id"), None);
        assert_eq!(slug_from_host("toko.example.com", "kirimku.id"), None);
    }

    #[tokio::test]
    async fn test_resolve_from_header_and_host() {
        let resolver = resolver();

        let ctx = resolver.resolve(Some("toko-b"), None).await.unwrap();
        assert_eq!(ctx.tenant_type, TenantType::Schema);

        let ctx = resolver
            .resolve(None, Some("toko-c.kirimku.id"))
            .await
            .unwrap();
        assert_eq!(ctx.storefront_id, "3");

        // Header wins over host.
        let ctx = resolver
            .resolve(Some("toko-a"), Some("toko-c.kirimku.id"))
            .await
            .unwrap();
        assert_eq!(ctx.storefront_id, "1");
    }

    #[tokio::test]
    async fn test_resolve_failures() {
        let resolver = resolver();
        assert!(matches!(
            resolver.resolve(None, None).await,
            Err(ResolveError::MissingSlug)
        ));
        assert!(matches!(
            resolver.resolve(Some("toko b"), None).await,
            Err(ResolveError::InvalidSlug(_))
        ));
        assert!(matches!(
            resolver.resolve(Some("toko-z"), None).await,
            Err(ResolveError::UnknownStorefront(_))
        ));
    }

    #[tokio::test]
    async fn test_resolve_optional() {
        let resolver = resolver();
        assert_eq!(resolver.resolve_optional(None, Some("localhost")).await.unwrap(), None);
        assert!(
            resolver
                .resolve_optional(Some("toko-a"), None)
                .await
                .unwrap()
                .is_some()
        );
    }
}
