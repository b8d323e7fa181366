// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! History-event filtering.
//!
//! Carriers emit `00:00:00` placeholders for history rows whose real time
//! they do not know. Those rows are dropped before emission; the remaining
//! rows keep the carrier-supplied order.

use tracing::info;

use crate::timestamp::ReportedTime;
use crate::update::TrackingUpdate;

/// An update together with the time exactly as the carrier reported it.
#[derive(Debug, Clone)]
pub struct CarrierEvent {
    /// The canonical update.
    pub update: TrackingUpdate,
    /// Reconciled event time.
    pub time: ReportedTime,
}

/// Drop midnight placeholders, preserving order.
///
/// Events whose time was substituted with the ingress time are never dropped.
pub fn drop_placeholder_events(events: Vec<CarrierEvent>) -> Vec<CarrierEvent> {
    events
        .into_iter()
        .filter(|event| {
            if event.time.is_midnight_placeholder() {
                info!(
                    tracking_number = %event.update.tracking_number,
                    status = %event.update.status,
                    timestamp = %event.update.timestamp,
                    "Dropping history entry with 00:00:00 timestamp"
                );
                false
            } else {
                true
            }
        })
        .collect()
}
