// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! JNE webhook dialect.
//!
//! JNE posts one status per webhook. Field names changed across API
//! generations, so every attribute goes through a fallback ladder:
//!
//! | Attribute | Fields, in order |
//! |-----------|------------------|
//! | tracking number | `airwaybill_number`, `cnote_no`, `awb` |
//! | status code | `last_status`, `status_code` |
//! | status text | `summary_status`, `status_desc`, `description`, `note` |
//! | event time | `last_update_at`, `event_date` + `event_time`, `timestamp` |

use chrono::{DateTime, Utc};
use serde::Deserialize;

use super::{
    CarrierNormalizer, EventDraft, ParsedWebhook, StatusRules, TextRule, carrier_time,
    first_non_empty, lenient_string, normalize_code,
};
use crate::error::{Result, WebhookError};
use crate::location::{join_distinct, with_office};
use crate::state::TrackingState;
use crate::timestamp::{TimestampCandidates, reconcile};
use crate::update::Carrier;

/// Proof-of-delivery codes. Any of these means delivered, whatever the text says.
const DELIVERED_CODES: [&str; 13] = [
    "D01", "D02", "D03", "D04", "D05", "D06", "D07", "D08", "D09", "D10", "D11", "D12", "DB1",
];

static RULES: StatusRules = StatusRules {
    codes: &[
        (
            &[
                "MANIFESTED",
                "PICKUPED",
                "PICKUP_COMPLETED",
                "PICKUP",
                "PICKED",
                "MANIFEST",
                "M01",
                "M02",
            ],
            TrackingState::PickedUp,
        ),
        (
            &[
                "IN_TRANSIT",
                "INTRANSIT",
                "ON_TRANSIT",
                "TRANSIT",
                "SORTING",
                "T01",
                "T02",
                "T03",
            ],
            TrackingState::InTransit,
        ),
        (
            &[
                "OUT_FOR_DELIVERY",
                "WITH_DELIVERY_COURIER",
                "DELIVERING",
                "O01",
                "O02",
            ],
            TrackingState::OutForDelivery,
        ),
        (
            &["DELIVERED", "DELIVERY_COMPLETED"],
            TrackingState::Delivered,
        ),
        (
            &[
                "DELIVERY_FAILED",
                "FAILED",
                "UNSUCCESSFUL",
                "F01",
                "F02",
                "F03",
            ],
            TrackingState::DeliveryFailed,
        ),
        (
            &["RETURN_TO_ORIGIN", "RETURNING", "RETURN", "R01", "R02"],
            TrackingState::Returning,
        ),
        (&["RETURNED", "RTO", "R03"], TrackingState::Returned),
        (
            &["CANCELLED", "VOID", "CANCEL", "C01"],
            TrackingState::Exception,
        ),
        (
            &["BOOKING", "BOOKED", "CREATED", "B01"],
            TrackingState::PickupPending,
        ),
    ],
    texts: &[
        TextRule {
            any: &["undelivered", "unsuccessful", "failed", "gagal", "tidak berhasil"],
            state: TrackingState::DeliveryFailed,
        },
        TextRule {
            any: &["returned", "dikembalikan"],
            state: TrackingState::Returned,
        },
        TextRule {
            any: &["return", "retur"],
            state: TrackingState::Returning,
        },
        TextRule {
            any: &["cancel", "dibatalkan", "batal", "void"],
            state: TrackingState::Exception,
        },
        TextRule {
            any: &["delivered", "terkirim", "diterima"],
            state: TrackingState::Delivered,
        },
        TextRule {
            any: &[
                "out for delivery",
                "with delivery courier",
                "delivering",
                "pengantaran",
                "dibawa kurir",
            ],
            state: TrackingState::OutForDelivery,
        },
        TextRule {
            any: &["transit", "perjalanan", "pengiriman", "sorting", "departed", "arrived"],
            state: TrackingState::InTransit,
        },
        TextRule {
            any: &["picked", "pickup", "pick up", "manifest", "diambil", "dijemput"],
            state: TrackingState::PickedUp,
        },
        TextRule {
            any: &["booking", "booked", "created", "dibuat"],
            state: TrackingState::PickupPending,
        },
    ],
};

/// Map a JNE status code and text to a canonical state.
pub fn map_status(code: &str, text: &str) -> TrackingState {
    if DELIVERED_CODES.contains(&normalize_code(code).as_str()) {
        return TrackingState::Delivered;
    }
    RULES.resolve(code, text)
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct JnePayload {
    #[serde(deserialize_with = "lenient_string")]
    airwaybill_number: String,
    #[serde(deserialize_with = "lenient_string")]
    cnote_no: String,
    #[serde(deserialize_with = "lenient_string")]
    awb: String,
    #[serde(deserialize_with = "lenient_string")]
    last_status: String,
    #[serde(deserialize_with = "lenient_string")]
    status_code: String,
    #[serde(deserialize_with = "lenient_string")]
    summary_status: String,
    #[serde(deserialize_with = "lenient_string")]
    status_desc: String,
    #[serde(deserialize_with = "lenient_string")]
    description: String,
    #[serde(deserialize_with = "lenient_string")]
    note: String,
    #[serde(deserialize_with = "lenient_string")]
    last_update_at: String,
    #[serde(deserialize_with = "lenient_string")]
    event_date: String,
    #[serde(deserialize_with = "lenient_string")]
    event_time: String,
    #[serde(deserialize_with = "lenient_string")]
    timestamp: String,
    #[serde(deserialize_with = "lenient_string")]
    location: String,
    #[serde(deserialize_with = "lenient_string")]
    city: String,
    #[serde(deserialize_with = "lenient_string")]
    office: String,
    #[serde(deserialize_with = "lenient_string")]
    service_code: String,
    #[serde(deserialize_with = "lenient_string")]
    pod_receiver: String,
    #[serde(deserialize_with = "lenient_string")]
    receiver_name: String,
    #[serde(deserialize_with = "lenient_string")]
    pod_date: String,
    #[serde(deserialize_with = "lenient_string")]
    origin: String,
    #[serde(deserialize_with = "lenient_string")]
    destination: String,
}

/// Normalizer for JNE webhooks.
#[derive(Debug, Default, Clone, Copy)]
pub struct JneNormalizer;

impl CarrierNormalizer for JneNormalizer {
    fn carrier(&self) -> Carrier {
        Carrier::Jne
    }

    fn parse(&self, raw: &[u8], ingress: DateTime<Utc>) -> Result<ParsedWebhook> {
        let payload: JnePayload = serde_json::from_slice(raw)?;

        let tracking_number =
            first_non_empty(&[&payload.airwaybill_number, &payload.cnote_no, &payload.awb])
                .ok_or(WebhookError::MissingTrackingNumber)?;

        let code = first_non_empty(&[&payload.last_status, &payload.status_code]).unwrap_or("");
        let status_text = first_non_empty(&[
            &payload.summary_status,
            &payload.status_desc,
            &payload.description,
            &payload.note,
        ])
        .unwrap_or("");

        let time = reconcile(
            TimestampCandidates {
                primary: Some(&payload.last_update_at),
                event_date: Some(&payload.event_date),
                event_time: Some(&payload.event_time),
                legacy: Some(&payload.timestamp),
            },
            ingress,
        );

        let location = with_office(
            &join_distinct([payload.location.as_str(), payload.city.as_str()]),
            &payload.office,
        );

        let mut event = EventDraft {
            carrier: Carrier::Jne,
            tracking_number,
            status: map_status(code, status_text),
            status_text,
            original_status: first_non_empty(&[code, status_text]).unwrap_or(""),
            location,
            time,
        }
        .build();

        let update = &mut event.update;
        update.set_meta_text("status_code", code);
        update.set_meta_text("service_code", &payload.service_code);
        update.set_meta_text(
            "pod_receiver",
            first_non_empty(&[&payload.pod_receiver, &payload.receiver_name]).unwrap_or(""),
        );
        update.set_meta_text("pod_date", &payload.pod_date);
        update.set_meta_text("origin", &payload.origin);
        update.set_meta_text("destination", &payload.destination);

        Ok(ParsedWebhook {
            carrier_updated_at: carrier_time(&time),
            events: vec![event],
        })
    }
}
