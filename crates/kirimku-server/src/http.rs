// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! HTTP boundary.
//!
//! Routes:
//! - `POST /webhooks/{carrier}`: verify, normalize and store a courier webhook
//! - `GET /health`: latest database health snapshot
//!
//! The tenant of a webhook is taken from `X-Storefront-Slug` or the `Host`
//! header; a request naming no storefront is stored in the shared datastore.

use std::sync::Arc;

use axum::{
    Json, Router,
    body::Bytes,
    extract::{DefaultBodyLimit, Path, State},
    http::{HeaderMap, StatusCode, header},
    response::{IntoResponse, Response},
    routing::{get, post},
};
use kirimku_tenancy::{DbError, HealthSource, HealthStatus, ResolveError, TenantResolver};
use kirimku_tracking::update::Carrier;
use kirimku_tracking::{TrackingUpdate, WebhookDispatcher, WebhookError};
use serde::Serialize;
use tower_http::trace::TraceLayer;
use tracing::{Instrument, error, info, info_span, warn};
use uuid::Uuid;

use crate::sink::TrackingSink;

/// Maximum accepted webhook body.
pub const MAX_WEBHOOK_BODY: usize = 1024 * 1024;

/// Header naming the storefront explicitly.
pub const STOREFRONT_HEADER: &str = "x-storefront-slug";

/// Generic signature header accepted for every carrier.
pub const GENERIC_SIGNATURE_HEADER: &str = "x-signature";

/// Shared state for axum request handlers.
#[derive(Clone)]
pub struct AppState {
    pub dispatcher: Arc<WebhookDispatcher>,
    pub resolver: TenantResolver,
    pub sink: Arc<dyn TrackingSink>,
    pub health: Arc<dyn HealthSource>,
}

/// Build the application router.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/webhooks/{carrier}", post(receive_webhook))
        .route("/health", get(health))
        .layer(DefaultBodyLimit::max(MAX_WEBHOOK_BODY))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

#[derive(Debug, Serialize)]
pub struct WebhookResponse {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_code: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub received: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stored: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub updates: Option<Vec<TrackingUpdate>>,
}

/// Failure of a webhook request.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error(transparent)]
    Webhook(#[from] WebhookError),
    #[error(transparent)]
    Tenant(#[from] ResolveError),
    #[error(transparent)]
    Storage(#[from] DbError),
}

impl ApiError {
    fn status(&self) -> StatusCode {
        let code = match self {
            ApiError::Webhook(e) => e.http_status(),
            ApiError::Tenant(e) => e.http_status(),
            ApiError::Storage(_) => 500,
        };
        StatusCode::from_u16(code).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR)
    }

    fn code(&self) -> &'static str {
        match self {
            ApiError::Webhook(e) => e.error_code(),
            ApiError::Tenant(e) => e.error_code(),
            ApiError::Storage(e) => e.error_code(),
        }
    }

    /// Message safe to return to the caller.
    fn public_message(&self) -> String {
        match self {
            ApiError::Webhook(WebhookError::SignatureInvalid) => "unauthorized".to_string(),
            ApiError::Webhook(WebhookError::Internal(_)) | ApiError::Storage(_) => {
                "internal error".to_string()
            }
            ApiError::Tenant(ResolveError::Lookup(_)) => "internal error".to_string(),
            other => other.to_string(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let body = Json(WebhookResponse {
            success: false,
            error_code: Some(self.code()),
            error_message: Some(self.public_message()),
            received: None,
            stored: None,
            updates: None,
        });
        (status, body).into_response()
    }
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers
        .get(name)
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|value| !value.is_empty())
}

/// Signature from the carrier's own header, else the generic one.
fn signature_of<'a>(headers: &'a HeaderMap, carrier_code: &str) -> Option<&'a str> {
    carrier_code
        .parse::<Carrier>()
        .ok()
        .and_then(|carrier| header_str(headers, carrier.signature_header()))
        .or_else(|| header_str(headers, GENERIC_SIGNATURE_HEADER))
}

async fn receive_webhook(
    State(state): State<AppState>,
    Path(carrier): Path<String>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<WebhookResponse>, ApiError> {
    let request_id = Uuid::new_v4();
    let span = info_span!("webhook", %request_id, carrier = %carrier);

    process_webhook(&state, &carrier, &headers, &body)
        .instrument(span)
        .await
        .map(Json)
}

async fn process_webhook(
    state: &AppState,
    carrier: &str,
    headers: &HeaderMap,
    body: &[u8],
) -> Result<WebhookResponse, ApiError> {
    let signature = signature_of(headers, carrier);
    let updates = state.dispatcher.dispatch(carrier, body, signature)?;

    let tenant = state
        .resolver
        .resolve_optional(
            header_str(headers, STOREFRONT_HEADER),
            header_str(headers, header::HOST.as_str()),
        )
        .await
        .inspect_err(|e| warn!(error = %e, "Tenant resolution failed"))?;

    let stored = state
        .sink
        .store(tenant.as_ref(), &updates)
        .await
        .inspect_err(|e| {
            error!(
                error = %e,
                error_code = e.error_code(),
                "Failed to store tracking updates"
            )
        })?;

    let storefront_id = tenant
        .as_ref()
        .map(|t| t.storefront_id.as_str())
        .unwrap_or("shared");
    info!(
        received = updates.len(),
        stored,
        storefront_id = %storefront_id,
        "Webhook processed"
    );

    Ok(WebhookResponse {
        success: true,
        error_code: None,
        error_message: None,
        received: Some(updates.len()),
        stored: Some(stored),
        updates: Some(updates),
    })
}

async fn health(State(state): State<AppState>) -> (StatusCode, Json<HealthStatus>) {
    let status = state.health.status().await;
    let code = if status.is_unhealthy() {
        StatusCode::SERVICE_UNAVAILABLE
    } else {
        StatusCode::OK
    };
    (code, Json(status))
}
