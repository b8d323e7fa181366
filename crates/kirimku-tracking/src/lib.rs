// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Kirimku Tracking - Courier Webhook Ingestion
//!
//! Turns inbound courier webhooks into canonical [`TrackingUpdate`]s.
//!
//! # Pipeline
//!
//! ```text
//!  raw bytes + signature header
//!            │
//!            ▼
//!  ┌──────────────────┐   invalid    ┌────────────────────┐
//!  │ signature::verify├─────────────►│ SignatureInvalid   │
//!  └────────┬─────────┘              └────────────────────┘
//!           │ valid / skipped
//!           ▼
//!  ┌──────────────────┐   ┌────────────────────┐   ┌──────────────────┐
//!  │ carrier normalizer├──►│ history filter     ├──►│ latency metadata │
//!  └──────────────────┘   └────────────────────┘   └──────────────────┘
//! ```
//!
//! # Carriers
//!
//! | Code | Tracking number fields | Multi-update |
//! |------|------------------------|--------------|
//! | `jne` | `airwaybill_number`, `cnote_no`, `awb` | no |
//! | `sicepat` | `airwaybill_number` | one per `shipment_histories[]` entry |
//! | `ninjavan` | `orders[].tracking_id`, `orders[].order_id`, `tracking_id`, `order_id` | one per `orders[]` entry |
//!
//! # Example
//!
//! ```
//! use kirimku_tracking::{TrackingState, WebhookDispatcher, WebhookSecrets};
//!
//! let dispatcher = WebhookDispatcher::new(WebhookSecrets::default());
//! let body = br#"{"airwaybill_number":"JNE123","last_status":"D01","last_update_at":"2024-01-20T15:30:00Z"}"#;
//! let updates = dispatcher.dispatch("jne", body, None).unwrap();
//! assert_eq!(updates[0].status, TrackingState::Delivered);
//! ```

pub mod carriers;
pub mod dispatcher;
pub mod error;
pub mod history;
pub mod latency;
pub mod location;
pub mod signature;
pub mod state;
pub mod timestamp;
pub mod update;

pub use carriers::{CarrierNormalizer, ParsedWebhook, normalizer_for};
pub use dispatcher::{WebhookDispatcher, WebhookSecrets};
pub use error::{Result, WebhookError};
pub use latency::LatencyReport;
pub use signature::SignatureVerdict;
pub use state::TrackingState;
pub use update::{Carrier, Metadata, MetadataValue, TrackingUpdate};
