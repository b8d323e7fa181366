// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Latency accounting for inbound webhooks.
//!
//! Two gauges are attached to every emitted update:
//!
//! | Key | Meaning |
//! |-----|---------|
//! | `3pl_to_in_latency_seconds` | ingress wall time minus the carrier's last-update time |
//! | `in_to_out_latency_seconds` | egress wall time minus ingress wall time |
//!
//! A negative measurement is still reported, with `<key>_invalid = true`
//! alongside it. When the carrier time is missing or unparseable the 3PL
//! gauge is omitted and only its `_invalid` flag is set; no sentinel value
//! is ever emitted.

use chrono::{DateTime, Utc};
use tracing::debug;

use crate::update::TrackingUpdate;

/// Metadata key of the carrier-to-ingress latency.
pub const THREE_PL_TO_IN: &str = "3pl_to_in_latency_seconds";
/// Metadata key of the ingress-to-egress latency.
pub const IN_TO_OUT: &str = "in_to_out_latency_seconds";

/// One latency measurement.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Latency {
    /// Elapsed seconds, millisecond resolution.
    pub seconds: f64,
}

impl Latency {
    /// Measure `later - earlier`.
    pub fn between(earlier: DateTime<Utc>, later: DateTime<Utc>) -> Self {
        Self {
            seconds: (later - earlier).num_milliseconds() as f64 / 1000.0,
        }
    }

    /// Negative latencies indicate clock skew or bad carrier data.
    pub fn is_invalid(&self) -> bool {
        self.seconds < 0.0
    }
}

/// Both gauges for one webhook.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LatencyReport {
    /// Carrier event to ingress. `None` when the carrier time was not parsed.
    pub three_pl_to_in: Option<Latency>,
    /// Ingress to egress.
    pub in_to_out: Latency,
}

impl LatencyReport {
    /// Measure a webhook that entered at `ingress` and leaves at `egress`.
    pub fn measure(
        carrier_updated_at: Option<DateTime<Utc>>,
        ingress: DateTime<Utc>,
        egress: DateTime<Utc>,
    ) -> Self {
        Self {
            three_pl_to_in: carrier_updated_at.map(|at| Latency::between(at, ingress)),
            in_to_out: Latency::between(ingress, egress),
        }
    }

    /// Attach both gauges to an update's metadata.
    pub fn annotate(&self, update: &mut TrackingUpdate) {
        match self.three_pl_to_in {
            Some(latency) => {
                update.set_meta(THREE_PL_TO_IN, latency.seconds);
                if latency.is_invalid() {
                    update.set_meta(&format!("{}_invalid", THREE_PL_TO_IN), true);
                }
            }
            None => update.set_meta(&format!("{}_invalid", THREE_PL_TO_IN), true),
        }

        update.set_meta(IN_TO_OUT, self.in_to_out.seconds);
        if self.in_to_out.is_invalid() {
            update.set_meta(&format!("{}_invalid", IN_TO_OUT), true);
        }
    }

    /// Emit the gauges as a structured log event.
    pub fn record(&self, courier: &str, updates: usize) {
        debug!(
            courier = courier,
            updates = updates,
            three_pl_to_in_latency_seconds = ?self.three_pl_to_in.map(|l| l.seconds),
            in_to_out_latency_seconds = self.in_to_out.seconds,
            "Webhook latency"
        );
    }
}
