// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! NinjaVan webhook dialect.
//!
//! A NinjaVan webhook describes either one parcel (top-level `tracking_id`)
//! or a batch (`orders[]`). A batch produces exactly one update per order.

use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::Value;

use super::{
    CarrierNormalizer, EventDraft, ParsedWebhook, StatusRules, TextRule, carrier_time,
    first_non_empty, lenient_string, value_to_string,
};
use crate::error::{Result, WebhookError};
use crate::history::CarrierEvent;
use crate::location::join_distinct;
use crate::state::TrackingState;
use crate::timestamp::{ReportedTime, TimestampCandidates, reconcile};
use crate::update::Carrier;

static RULES: StatusRules = StatusRules {
    codes: &[
        (
            &[
                "PENDING_PICKUP",
                "STAGING",
                "PENDING",
                "VAN_EN_ROUTE_TO_PICKUP",
            ],
            TrackingState::PickupPending,
        ),
        (
            &["SUCCESSFUL_PICKUP", "PICKED_UP", "PICKUP_SUCCESSFUL"],
            TrackingState::PickedUp,
        ),
        (
            &[
                "EN_ROUTE_TO_SORTING_HUB",
                "ARRIVED_AT_SORTING_HUB",
                "ARRIVED_AT_ORIGIN_HUB",
                "ARRIVED_AT_TRANSIT_HUB",
                "IN_TRANSIT",
                "TRANSIT",
            ],
            TrackingState::InTransit,
        ),
        (
            &[
                "ON_VEHICLE_FOR_DELIVERY",
                "OUT_FOR_DELIVERY",
                "ARRIVED_AT_DISTRIBUTION_POINT",
            ],
            TrackingState::OutForDelivery,
        ),
        (
            &["SUCCESSFUL_DELIVERY", "DELIVERED", "COMPLETED"],
            TrackingState::Delivered,
        ),
        (
            &[
                "FIRST_ATTEMPT_DELIVERY_FAIL",
                "DELIVERY_FAIL",
                "FAILED_DELIVERY",
                "PENDING_RESCHEDULE",
            ],
            TrackingState::DeliveryFailed,
        ),
        (
            &["RETURN_TO_SENDER_TRIGGERED", "RETURNING_TO_SENDER", "RTS"],
            TrackingState::Returning,
        ),
        (&["RETURNED_TO_SENDER"], TrackingState::Returned),
        (
            &["CANCELLED", "CANCELED", "PARCEL_LOST", "PARCEL_DAMAGED"],
            TrackingState::Exception,
        ),
    ],
    texts: &[
        TextRule {
            any: &["cancel"],
            state: TrackingState::Exception,
        },
        TextRule {
            any: &["returned"],
            state: TrackingState::Returned,
        },
        TextRule {
            any: &["return"],
            state: TrackingState::Returning,
        },
        TextRule {
            any: &["fail", "unsuccessful"],
            state: TrackingState::DeliveryFailed,
        },
        TextRule {
            any: &["delivered", "successful delivery", "completed"],
            state: TrackingState::Delivered,
        },
        TextRule {
            any: &["on vehicle", "out for delivery"],
            state: TrackingState::OutForDelivery,
        },
        // "delivery" that is not "delivered" means the parcel is on its way out.
        TextRule {
            any: &["delivery"],
            state: TrackingState::OutForDelivery,
        },
        TextRule {
            any: &["pending"],
            state: TrackingState::PickupPending,
        },
        TextRule {
            any: &["picked up", "pickup", "picked"],
            state: TrackingState::PickedUp,
        },
        TextRule {
            any: &["transit", "hub", "sorting", "en-route", "en route", "arrived"],
            state: TrackingState::InTransit,
        },
    ],
};

/// Map a NinjaVan status code and message to a canonical state.
pub fn map_status(code: &str, text: &str) -> TrackingState {
    RULES.resolve(code, text)
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct NinjavanOrder {
    #[serde(deserialize_with = "lenient_string")]
    tracking_id: String,
    #[serde(deserialize_with = "lenient_string")]
    order_id: String,
    #[serde(deserialize_with = "lenient_string")]
    status: String,
    #[serde(deserialize_with = "lenient_string")]
    status_message: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct NinjavanPayload {
    #[serde(deserialize_with = "lenient_string")]
    tracking_id: String,
    #[serde(deserialize_with = "lenient_string")]
    order_id: String,
    #[serde(deserialize_with = "lenient_string")]
    status: String,
    #[serde(deserialize_with = "lenient_string")]
    status_message: String,
    #[serde(deserialize_with = "lenient_string")]
    description: String,
    #[serde(deserialize_with = "lenient_string")]
    updated_at: String,
    #[serde(deserialize_with = "lenient_string")]
    event_date: String,
    #[serde(deserialize_with = "lenient_string")]
    event_time: String,
    #[serde(deserialize_with = "lenient_string")]
    timestamp: String,
    #[serde(deserialize_with = "lenient_string")]
    location: String,
    #[serde(deserialize_with = "lenient_string")]
    hub_name: String,
    #[serde(deserialize_with = "lenient_string")]
    city: String,
    #[serde(deserialize_with = "lenient_string")]
    service_type: String,
    pod: Option<Value>,
    orders: Option<Vec<NinjavanOrder>>,
}

impl NinjavanPayload {
    fn pod_receiver(&self) -> String {
        match &self.pod {
            Some(Value::Object(pod)) => pod
                .get("name")
                .or_else(|| pod.get("receiver_name"))
                .map(value_to_string)
                .unwrap_or_default(),
            _ => String::new(),
        }
    }

    fn event(
        &self,
        tracking_number: &str,
        order_id: &str,
        code: &str,
        message: &str,
        time: ReportedTime,
    ) -> CarrierEvent {
        let status_text = first_non_empty(&[message, &self.description, code]).unwrap_or("");
        let mut event = EventDraft {
            carrier: Carrier::Ninjavan,
            tracking_number,
            status: map_status(code, status_text),
            status_text,
            original_status: first_non_empty(&[code, status_text]).unwrap_or(""),
            location: join_distinct([
                self.location.as_str(),
                self.hub_name.as_str(),
                self.city.as_str(),
            ]),
            time,
        }
        .build();

        let update = &mut event.update;
        update.set_meta_text("order_id", order_id);
        update.set_meta_text("service_type", &self.service_type);
        update.set_meta_text("pod_receiver", &self.pod_receiver());
        event
    }
}

/// Normalizer for NinjaVan webhooks.
#[derive(Debug, Default, Clone, Copy)]
pub struct NinjavanNormalizer;

impl CarrierNormalizer for NinjavanNormalizer {
    fn carrier(&self) -> Carrier {
        Carrier::Ninjavan
    }

    fn parse(&self, raw: &[u8], ingress: DateTime<Utc>) -> Result<ParsedWebhook> {
        let payload: NinjavanPayload = serde_json::from_slice(raw)?;

        let time = reconcile(
            TimestampCandidates {
                primary: Some(&payload.updated_at),
                event_date: Some(&payload.event_date),
                event_time: Some(&payload.event_time),
                legacy: Some(&payload.timestamp),
            },
            ingress,
        );

        let orders = payload.orders.as_deref().unwrap_or_default();
        let events = if orders.is_empty() {
            let tracking_number = first_non_empty(&[&payload.tracking_id, &payload.order_id])
                .ok_or(WebhookError::MissingTrackingNumber)?;
            vec![payload.event(
                tracking_number,
                &payload.order_id,
                &payload.status,
                &payload.status_message,
                time,
            )]
        } else {
            orders
                .iter()
                .map(|order| -> Result<CarrierEvent> {
                    let tracking_number = first_non_empty(&[
                        &order.tracking_id,
                        &order.order_id,
                        &payload.tracking_id,
                        &payload.order_id,
                    ])
                    .ok_or(WebhookError::MissingTrackingNumber)?;
                    let code = first_non_empty(&[&order.status, &payload.status]).unwrap_or("");
                    let message = first_non_empty(&[&order.status_message, &payload.status_message])
                        .unwrap_or("");
                    Ok(payload.event(tracking_number, &order.order_id, code, message, time))
                })
                .collect::<Result<Vec<_>>>()?
        };

        Ok(ParsedWebhook {
            events,
            carrier_updated_at: carrier_time(&time),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::update::MetadataValue;

    fn ingress() -> DateTime<Utc> {
        "2024-01-21T08:00:00Z".parse().unwrap()
    }

    #[test]
    fn test_code_table() {
        assert_eq!(map_status("Pending Pickup", ""), TrackingState::PickupPending);
        assert_eq!(map_status("SUCCESSFUL_PICKUP", ""), TrackingState::PickedUp);
        assert_eq!(map_status("ARRIVED_AT_SORTING_HUB", ""), TrackingState::InTransit);
        assert_eq!(
            map_status("ON_VEHICLE_FOR_DELIVERY", ""),
            TrackingState::OutForDelivery
        );
        assert_eq!(map_status("Successful Delivery", ""), TrackingState::Delivered);
        assert_eq!(
            map_status("FIRST_ATTEMPT_DELIVERY_FAIL", ""),
            TrackingState::DeliveryFailed
        );
        assert_eq!(map_status("RTS", ""), TrackingState::Returning);
        assert_eq!(map_status("RETURNED_TO_SENDER", ""), TrackingState::Returned);
        assert_eq!(map_status("PARCEL_LOST", ""), TrackingState::Exception);
    }

    #[test]
    fn test_delivery_without_delivered_is_out_for_delivery() {
        assert_eq!(
            map_status("", "Parcel is being prepared for delivery"),
            TrackingState::OutForDelivery
        );
        assert_eq!(map_status("", "Parcel delivered"), TrackingState::Delivered);
        assert_eq!(map_status("", "Delivery failed"), TrackingState::DeliveryFailed);
    }

    #[test]
    fn test_text_rules() {
        assert_eq!(
            map_status("", "Return to sender, returned"),
            TrackingState::Returned
        );
        assert_eq!(map_status("", "Return initiated"), TrackingState::Returning);
        assert_eq!(map_status("", "Order cancelled"), TrackingState::Exception);
        assert_eq!(map_status("", "Arrived at hub"), TrackingState::InTransit);
        assert_eq!(map_status("", "Parcel picked up"), TrackingState::PickedUp);
        assert_eq!(map_status("", "???"), TrackingState::Unknown);
    }

    #[test]
    fn test_multi_order() {
        let body = br#"{"status":"DELIVERED","orders":[{"tracking_id":"A"},{"order_id":"B"}]}"#;
        let parsed = NinjavanNormalizer.parse(body, ingress()).unwrap();
        let numbers: Vec<&str> = parsed
            .events
            .iter()
            .map(|e| e.update.tracking_number.as_str())
            .collect();
        assert_eq!(numbers, vec!["A", "B"]);
        assert!(
            parsed
                .events
                .iter()
                .all(|e| e.update.status == TrackingState::Delivered)
        );
        assert_eq!(
            parsed.events[1]
                .update
                .meta("order_id")
                .and_then(MetadataValue::as_str),
            Some("B")
        );
    }

    #[test]
    fn test_order_status_overrides_top_level() {
        let body = br#"{"status":"DELIVERED","orders":[{"tracking_id":"A","status":"RTS"},{"tracking_id":"B"}]}"#;
        let parsed = NinjavanNormalizer.parse(body, ingress()).unwrap();
        assert_eq!(parsed.events[0].update.status, TrackingState::Returning);
        assert_eq!(parsed.events[1].update.status, TrackingState::Delivered);
    }

    #[test]
    fn test_single_parcel() {
        let body = br#"{
            "tracking_id": "NV1",
            "status": "Arrived at Sorting Hub",
            "status_message": "Arrived at sorting hub",
            "updated_at": "2024-01-20T10:15:00+07:00",
            "hub_name": "Jakarta Sorting Hub",
            "city": "Jakarta",
            "service_type": "Parcel",
            "pod": {"name": "Rina"}
        }"#;
        let parsed = NinjavanNormalizer.parse(body, ingress()).unwrap();
        assert_eq!(parsed.events.len(), 1);
        let update = &parsed.events[0].update;
        assert_eq!(update.tracking_number, "NV1");
        assert_eq!(update.status, TrackingState::InTransit);
        assert_eq!(update.status_text, "Arrived at sorting hub");
        assert_eq!(update.location, "Jakarta Sorting Hub, Jakarta");
        assert_eq!(
            update.timestamp,
            "2024-01-20T03:15:00Z".parse::<DateTime<Utc>>().unwrap()
        );
        assert_eq!(
            update.meta("pod_receiver").and_then(MetadataValue::as_str),
            Some("Rina")
        );
        assert_eq!(parsed.carrier_updated_at, Some(update.timestamp));
    }

    #[test]
    fn test_order_id_fallback() {
        let parsed = NinjavanNormalizer
            .parse(br#"{"order_id":"ORD-7","status":"PENDING"}"#, ingress())
            .unwrap();
        assert_eq!(parsed.events[0].update.tracking_number, "ORD-7");
        assert_eq!(parsed.events[0].update.status, TrackingState::PickupPending);
    }

    #[test]
    fn test_missing_tracking_number() {
        let err = NinjavanNormalizer
            .parse(br#"{"status":"DELIVERED"}"#, ingress())
            .unwrap_err();
        assert!(matches!(err, WebhookError::MissingTrackingNumber));

        let err = NinjavanNormalizer
            .parse(br#"{"status":"DELIVERED","orders":[{"status":"RTS"}]}"#, ingress())
            .unwrap_err();
        assert!(matches!(err, WebhookError::MissingTrackingNumber));
    }
}
