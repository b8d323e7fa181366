// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Webhook dispatcher.
//!
//! Routes a raw webhook to its carrier, verifies the signature, normalizes,
//! drops placeholder history rows, and attaches latency metadata. The
//! dispatcher holds only secrets and is safe to share across requests.

use std::panic::{AssertUnwindSafe, catch_unwind};

use chrono::{DateTime, Utc};
use tracing::{debug, error, warn};

use crate::carriers::normalizer_for;
use crate::error::{Result, WebhookError};
use crate::history::drop_placeholder_events;
use crate::latency::LatencyReport;
use crate::signature::{SignatureVerdict, verify};
use crate::update::{Carrier, TrackingUpdate};

/// Per-carrier HMAC secrets. An empty secret disables verification.
#[derive(Debug, Clone, Default)]
pub struct WebhookSecrets {
    pub jne: String,
    pub sicepat: String,
    pub ninjavan: String,
}

impl WebhookSecrets {
    /// The secret configured for a carrier.
    pub fn for_carrier(&self, carrier: Carrier) -> &str {
        match carrier {
            Carrier::Jne => &self.jne,
            Carrier::Sicepat => &self.sicepat,
            Carrier::Ninjavan => &self.ninjavan,
        }
    }
}

/// Stateless per-request webhook pipeline.
#[derive(Debug, Clone, Default)]
pub struct WebhookDispatcher {
    secrets: WebhookSecrets,
}

impl WebhookDispatcher {
    pub fn new(secrets: WebhookSecrets) -> Self {
        Self { secrets }
    }

    pub fn secrets(&self) -> &WebhookSecrets {
        &self.secrets
    }

    /// Process one webhook received now.
    pub fn dispatch(
        &self,
        carrier_code: &str,
        raw: &[u8],
        signature: Option<&str>,
    ) -> Result<Vec<TrackingUpdate>> {
        self.dispatch_at(carrier_code, raw, signature, Utc::now())
    }

    /// Process one webhook received at `ingress`.
    ///
    /// Updates are returned in carrier-supplied order. An empty vector is a
    /// valid outcome when every history row was a placeholder.
    pub fn dispatch_at(
        &self,
        carrier_code: &str,
        raw: &[u8],
        signature: Option<&str>,
        ingress: DateTime<Utc>,
    ) -> Result<Vec<TrackingUpdate>> {
        let carrier: Carrier = carrier_code
            .parse()
            .map_err(|_| WebhookError::UnknownCarrier(carrier_code.to_string()))?;

        match verify(raw, signature.unwrap_or(""), self.secrets.for_carrier(carrier)) {
            SignatureVerdict::Valid => {}
            SignatureVerdict::Skipped => {
                debug!(courier = %carrier, "Webhook secret not configured, signature not verified");
            }
            SignatureVerdict::Invalid => {
                warn!(courier = %carrier, "Rejected webhook with invalid signature");
                return Err(WebhookError::SignatureInvalid);
            }
        }

        let normalizer = normalizer_for(carrier);
        let parsed = catch_unwind(AssertUnwindSafe(|| normalizer.parse(raw, ingress)))
            .map_err(|panic_info| {
                let panic_msg = if let Some(s) = panic_info.downcast_ref::<&str>() {
                    s.to_string()
                } else if let Some(s) = panic_info.downcast_ref::<String>() {
                    s.clone()
                } else {
                    "Unknown panic during normalization".to_string()
                };
                error!(courier = %carrier, error = %panic_msg, "Normalizer panicked");
                WebhookError::Internal(format!("{} normalizer panicked", carrier))
            })?
            .inspect_err(|e| {
                warn!(courier = %carrier, error = %e, error_code = e.error_code(), "Failed to normalize webhook");
            })?;

        let mut updates: Vec<TrackingUpdate> = drop_placeholder_events(parsed.events)
            .into_iter()
            .map(|event| event.update)
            .collect();

        let report = LatencyReport::measure(parsed.carrier_updated_at, ingress, Utc::now());
        for update in &mut updates {
            report.annotate(update);
        }
        report.record(carrier.code(), updates.len());

        Ok(updates)
    }
}
