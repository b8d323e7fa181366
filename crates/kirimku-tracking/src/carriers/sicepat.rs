// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! SiCepat webhook dialect.
//!
//! A SiCepat webhook carries the shipment summary plus, optionally, the full
//! `shipment_histories` list. When histories are present each entry becomes
//! its own update in the order SiCepat sent them; otherwise the summary
//! becomes a single update.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{
    CarrierNormalizer, EventDraft, ParsedWebhook, StatusRules, TextRule, carrier_time,
    first_non_empty, lenient_string,
};
use crate::error::{Result, WebhookError};
use crate::history::CarrierEvent;
use crate::location::position_with_note;
use crate::state::TrackingState;
use crate::timestamp::{ReportedTime, TimestampCandidates, reconcile};
use crate::update::Carrier;

static RULES: StatusRules = StatusRules {
    codes: &[],
    texts: &[
        TextRule {
            any: &["booking", "created", "pending"],
            state: TrackingState::PickupPending,
        },
        TextRule {
            any: &["pickup", "picked", "manifest", "collected"],
            state: TrackingState::PickedUp,
        },
        TextRule {
            any: &["transit", "processing", "sorting", "shipment"],
            state: TrackingState::InTransit,
        },
        TextRule {
            any: &["delivering", "out for delivery"],
            state: TrackingState::OutForDelivery,
        },
        TextRule {
            any: &["delivered", "pod", "success", "complete"],
            state: TrackingState::Delivered,
        },
        TextRule {
            any: &["failed", "unsuccessful", "problem", "exception"],
            state: TrackingState::DeliveryFailed,
        },
        TextRule {
            any: &["returned"],
            state: TrackingState::Returned,
        },
        TextRule {
            any: &["returning", "return"],
            state: TrackingState::Returning,
        },
        TextRule {
            any: &["cancelled", "void"],
            state: TrackingState::Exception,
        },
    ],
};

/// Map SiCepat's summary and last status to a canonical state.
///
/// SiCepat has no stable code vocabulary, so only the combined text is matched.
pub fn map_status(summary_status: &str, last_status: &str) -> TrackingState {
    RULES.resolve("", &format!("{} {}", summary_status, last_status))
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct HistoryEntry {
    #[serde(deserialize_with = "lenient_string")]
    date_time: String,
    #[serde(deserialize_with = "lenient_string")]
    status: String,
    #[serde(deserialize_with = "lenient_string")]
    position: String,
    #[serde(deserialize_with = "lenient_string")]
    city: String,
    #[serde(deserialize_with = "lenient_string")]
    note: String,
    #[serde(deserialize_with = "lenient_string")]
    receiver_name: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct SicepatPayload {
    #[serde(deserialize_with = "lenient_string")]
    airwaybill_number: String,
    #[serde(deserialize_with = "lenient_string")]
    last_status: String,
    #[serde(deserialize_with = "lenient_string")]
    summary_status: String,
    #[serde(deserialize_with = "lenient_string")]
    last_update_at: String,
    #[serde(deserialize_with = "lenient_string")]
    event_date: String,
    #[serde(deserialize_with = "lenient_string")]
    event_time: String,
    #[serde(deserialize_with = "lenient_string")]
    timestamp: String,
    #[serde(deserialize_with = "lenient_string")]
    city: String,
    #[serde(deserialize_with = "lenient_string")]
    service: String,
    #[serde(deserialize_with = "lenient_string")]
    pod_receiver: String,
    #[serde(deserialize_with = "lenient_string")]
    shipper_name: String,
    #[serde(deserialize_with = "lenient_string")]
    shipper_address: String,
    #[serde(deserialize_with = "lenient_string")]
    receiver_name: String,
    #[serde(deserialize_with = "lenient_string")]
    receiver_address: String,
    shipment_histories: Option<Vec<HistoryEntry>>,
}

impl SicepatPayload {
    fn summary_time(&self, ingress: DateTime<Utc>) -> ReportedTime {
        reconcile(
            TimestampCandidates {
                primary: Some(&self.last_update_at),
                event_date: Some(&self.event_date),
                event_time: Some(&self.event_time),
                legacy: Some(&self.timestamp),
            },
            ingress,
        )
    }

    fn histories(&self) -> &[HistoryEntry] {
        self.shipment_histories.as_deref().unwrap_or_default()
    }

    fn summary_event(&self, ingress: DateTime<Utc>) -> CarrierEvent {
        let status_text =
            first_non_empty(&[&self.last_status, &self.summary_status]).unwrap_or("");
        let mut event = EventDraft {
            carrier: Carrier::Sicepat,
            tracking_number: &self.airwaybill_number,
            status: map_status(&self.summary_status, &self.last_status),
            status_text,
            original_status: status_text,
            location: self.city.clone(),
            time: self.summary_time(ingress),
        }
        .build();
        self.annotate(&mut event, &self.pod_receiver);
        event
    }

    fn history_event(
        &self,
        index: usize,
        entry: &HistoryEntry,
        ingress: DateTime<Utc>,
    ) -> CarrierEvent {
        let status_text = first_non_empty(&[&entry.status, &self.last_status, &self.summary_status])
            .unwrap_or("");
        let time = reconcile(
            TimestampCandidates {
                primary: Some(&entry.date_time),
                event_date: Some(&self.event_date),
                event_time: Some(&self.event_time),
                legacy: Some(&self.timestamp),
            },
            ingress,
        );

        let mut location = position_with_note(&entry.position, &entry.note);
        if location.is_empty() {
            location = first_non_empty(&[&entry.city, &self.city])
                .unwrap_or("")
                .to_string();
        }

        // A row without a recognizable status inherits the shipment summary.
        let status = match map_status(&entry.status, &entry.note) {
            TrackingState::Unknown => map_status(&self.summary_status, &self.last_status),
            status => status,
        };

        let mut event = EventDraft {
            carrier: Carrier::Sicepat,
            tracking_number: &self.airwaybill_number,
            status,
            status_text,
            original_status: status_text,
            location,
            time,
        }
        .build();
        event.update.set_meta("history_index", index as i64);
        let receiver = first_non_empty(&[&entry.receiver_name, &self.pod_receiver]).unwrap_or("");
        self.annotate(&mut event, receiver);
        event
    }

    fn annotate(&self, event: &mut CarrierEvent, receiver: &str) {
        event.update.set_meta_text("service", &self.service);
        event.update.set_meta_text("pod_receiver", receiver);
    }
}

/// Shipper and receiver details kept when a SiCepat payload is replayed.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ShipmentParties {
    pub shipper_name: String,
    pub shipper_address: String,
    pub receiver_name: String,
    pub receiver_address: String,
}

/// Normalizer for SiCepat webhooks.
#[derive(Debug, Default, Clone, Copy)]
pub struct SicepatNormalizer;

impl SicepatNormalizer {
    /// Extract shipment parties for the replay path.
    ///
    /// The shipper address is blanked when any history entry was manifested
    /// with status `IN`. The live normalization path never applies this rule.
    pub fn replay_details(&self, raw: &[u8]) -> Result<ShipmentParties> {
        let payload: SicepatPayload = serde_json::from_slice(raw)?;
        if payload.airwaybill_number.is_empty() {
            return Err(WebhookError::MissingTrackingNumber);
        }

        let manifested_in = payload.histories().iter().any(|entry| {
            entry.position.to_lowercase().contains("manifested")
                && entry.status.eq_ignore_ascii_case("IN")
        });

        Ok(ShipmentParties {
            shipper_name: payload.shipper_name,
            shipper_address: if manifested_in {
                String::new()
            } else {
                payload.shipper_address
            },
            receiver_name: payload.receiver_name,
            receiver_address: payload.receiver_address,
        })
    }
}

impl CarrierNormalizer for SicepatNormalizer {
    fn carrier(&self) -> Carrier {
        Carrier::Sicepat
    }

    fn parse(&self, raw: &[u8], ingress: DateTime<Utc>) -> Result<ParsedWebhook> {
        let payload: SicepatPayload = serde_json::from_slice(raw)?;
        if payload.airwaybill_number.is_empty() {
            return Err(WebhookError::MissingTrackingNumber);
        }

        let summary_time = carrier_time(&payload.summary_time(ingress));
        let histories = payload.histories();

        if histories.is_empty() {
            return Ok(ParsedWebhook {
                events: vec![payload.summary_event(ingress)],
                carrier_updated_at: summary_time,
            });
        }

        let events: Vec<CarrierEvent> = histories
            .iter()
            .enumerate()
            .map(|(index, entry)| payload.history_event(index, entry, ingress))
            .collect();

        let latest_history = events
            .iter()
            .filter(|event| !event.time.is_midnight_placeholder())
            .filter_map(|event| carrier_time(&event.time))
            .max();

        Ok(ParsedWebhook {
            carrier_updated_at: summary_time.max(latest_history),
            events,
        })
    }
}
