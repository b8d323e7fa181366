// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Tracking sink: where normalized updates are stored.
//!
//! Updates are keyed by `(tracking_number, timestamp, status)`; storing the
//! same update twice is a no-op, so carriers may redeliver webhooks freely.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use kirimku_tenancy::postgres::set_search_path;
use kirimku_tenancy::{ConnectionManager, DbError, PgConnector, TenantContext, run_in_tx};
use kirimku_tracking::{TrackingState, TrackingUpdate};
use sqlx::types::Json;
use tokio::sync::Mutex;
use tracing::debug;

/// Destination of normalized tracking updates.
#[async_trait]
pub trait TrackingSink: Send + Sync {
    /// Store a batch atomically. Returns how many updates were new.
    async fn store(
        &self,
        tenant: Option<&TenantContext>,
        updates: &[TrackingUpdate],
    ) -> Result<u64, DbError>;
}

/// Sink writing to the `tracking_updates` table of the tenant's datastore.
pub struct PgTrackingSink {
    manager: Arc<ConnectionManager<PgConnector>>,
}

impl PgTrackingSink {
    pub fn new(manager: Arc<ConnectionManager<PgConnector>>) -> Self {
        Self { manager }
    }
}

#[async_trait]
impl TrackingSink for PgTrackingSink {
    async fn store(
        &self,
        tenant: Option<&TenantContext>,
        updates: &[TrackingUpdate],
    ) -> Result<u64, DbError> {
        if updates.is_empty() {
            return Ok(0);
        }

        let rows = updates.to_vec();
        let schema = tenant.and_then(TenantContext::schema_name);

        let inserted = run_in_tx(&self.manager, tenant, move |tx| {
            Box::pin(async move {
                if let Some(schema) = &schema {
                    set_search_path(&mut **tx, schema).await?;
                }

                let mut inserted = 0;
                for update in &rows {
                    let result = sqlx::query(
                        r#"
                        INSERT INTO tracking_updates
                            (tracking_number, courier_code, status, status_text, location, timestamp, metadata)
                        VALUES ($1, $2, $3, $4, $5, $6, $7)
                        ON CONFLICT (tracking_number, timestamp, status) DO NOTHING
                        "#,
                    )
                    .bind(&update.tracking_number)
                    .bind(update.courier_code.code())
                    .bind(update.status.as_str())
                    .bind(&update.status_text)
                    .bind(&update.location)
                    .bind(update.timestamp)
                    .bind(Json(&update.metadata))
                    .execute(&mut **tx)
                    .await?;
                    inserted += result.rows_affected();
                }
                Ok::<_, DbError>(inserted)
            })
        })
        .await?;

        debug!(
            storefront_id = tenant.map(|t| t.storefront_id.as_str()).unwrap_or("shared"),
            received = updates.len(),
            inserted,
            "Tracking updates stored"
        );
        Ok(inserted)
    }
}

/// A stored update together with the storefront it was routed to.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredUpdate {
    /// `None` for the shared datastore.
    pub storefront_id: Option<String>,
    pub update: TrackingUpdate,
}

/// In-memory sink for tests and local runs.
#[derive(Debug, Default)]
pub struct MemorySink {
    stored: Mutex<Vec<StoredUpdate>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn stored(&self) -> Vec<StoredUpdate> {
        self.stored.lock().await.clone()
    }
}

fn same_key(
    a: &TrackingUpdate,
    tracking_number: &str,
    timestamp: DateTime<Utc>,
    status: TrackingState,
) -> bool {
    a.tracking_number == tracking_number && a.timestamp == timestamp && a.status == status
}

#[async_trait]
impl TrackingSink for MemorySink {
    async fn store(
        &self,
        tenant: Option<&TenantContext>,
        updates: &[TrackingUpdate],
    ) -> Result<u64, DbError> {
        let storefront_id = tenant.map(|t| t.storefront_id.clone());
        let mut stored = self.stored.lock().await;
        let mut inserted = 0;
        for update in updates {
            let duplicate = stored.iter().any(|s| {
                s.storefront_id == storefront_id
                    && same_key(&s.update, &update.tracking_number, update.timestamp, update.status)
            });
            if !duplicate {
                stored.push(StoredUpdate {
                    storefront_id: storefront_id.clone(),
                    update: update.clone(),
                });
                inserted += 1;
            }
        }
        Ok(inserted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use kirimku_tenancy::TenantType;
    use kirimku_tracking::Carrier;

    fn update(number: &str, status: TrackingState) -> TrackingUpdate {
        TrackingUpdate::new(
            number,
            Carrier::Jne,
            status,
            Utc.with_ymd_and_hms(2024, 1, 20, 8, 30, 0).unwrap(),
        )
    }

    #[tokio::test]
    async fn test_memory_sink_is_idempotent() {
        let sink = MemorySink::new();
        let batch = vec![
            update("JNE1", TrackingState::InTransit),
            update("JNE1", TrackingState::Delivered),
        ];

        assert_eq!(sink.store(None, &batch).await.unwrap(), 2);
        assert_eq!(sink.store(None, &batch).await.unwrap(), 0);
        assert_eq!(sink.stored().await.len(), 2);
    }

    #[tokio::test]
    async fn test_memory_sink_separates_tenants() {
        let sink = MemorySink::new();
        let tenant = TenantContext::new("7", "toko-7", TenantType::Database);
        let batch = vec![update("JNE1", TrackingState::InTransit)];

        assert_eq!(sink.store(None, &batch).await.unwrap(), 1);
        assert_eq!(sink.store(Some(&tenant), &batch).await.unwrap(), 1);

        let stored = sink.stored().await;
        assert_eq!(stored[1].storefront_id.as_deref(), Some("7"));
    }
}
