// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Canonical tracking update records.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use crate::state::TrackingState;

/// Supported couriers. The set is closed; routing is by lowercase code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Carrier {
    /// JNE Express.
    Jne,
    /// SiCepat Ekspres.
    Sicepat,
    /// Ninja Van.
    Ninjavan,
}

impl Carrier {
    /// Every supported carrier.
    pub const ALL: [Carrier; 3] = [Carrier::Jne, Carrier::Sicepat, Carrier::Ninjavan];

    /// Lowercase courier code (`jne`, `sicepat`, `ninjavan`).
    pub fn code(&self) -> &'static str {
        match self {
            Carrier::Jne => "jne",
            Carrier::Sicepat => "sicepat",
            Carrier::Ninjavan => "ninjavan",
        }
    }

    /// Value stored under `metadata["source"]`.
    pub fn source_tag(&self) -> String {
        format!("{}_webhook", self.code())
    }

    /// Name of the carrier-specific signature header.
    pub fn signature_header(&self) -> &'static str {
        match self {
            Carrier::Jne => "JNE-Signature",
            Carrier::Sicepat => "Sicepat-Signature",
            Carrier::Ninjavan => "Ninjavan-Signature",
        }
    }
}

impl fmt::Display for Carrier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

impl FromStr for Carrier {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let code = s.trim().to_ascii_lowercase();
        Carrier::ALL
            .into_iter()
            .find(|carrier| carrier.code() == code)
            .ok_or_else(|| format!("unsupported carrier: {}", s))
    }
}

/// A primitive metadata value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MetadataValue {
    /// Boolean flag.
    Bool(bool),
    /// Integer counter.
    Int(i64),
    /// Floating point measurement.
    Float(f64),
    /// Free text.
    Text(String),
}

impl MetadataValue {
    /// Text content, if this is a text value.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            MetadataValue::Text(s) => Some(s),
            _ => None,
        }
    }

    /// Numeric content, if this is a number.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            MetadataValue::Int(i) => Some(*i as f64),
            MetadataValue::Float(f) => Some(*f),
            _ => None,
        }
    }

    /// Boolean content, if this is a flag.
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            MetadataValue::Bool(b) => Some(*b),
            _ => None,
        }
    }
}

impl From<bool> for MetadataValue {
    fn from(value: bool) -> Self {
        MetadataValue::Bool(value)
    }
}

impl From<i64> for MetadataValue {
    fn from(value: i64) -> Self {
        MetadataValue::Int(value)
    }
}

impl From<f64> for MetadataValue {
    fn from(value: f64) -> Self {
        MetadataValue::Float(value)
    }
}

impl From<String> for MetadataValue {
    fn from(value: String) -> Self {
        MetadataValue::Text(value)
    }
}

impl From<&str> for MetadataValue {
    fn from(value: &str) -> Self {
        MetadataValue::Text(value.to_string())
    }
}

/// Metadata attached to every update. Keys are sorted for stable output.
pub type Metadata = BTreeMap<String, MetadataValue>;

/// One canonical event produced from an inbound webhook.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrackingUpdate {
    /// Courier-assigned tracking number (never empty).
    pub tracking_number: String,
    /// Courier that reported the event.
    pub courier_code: Carrier,
    /// Canonical state.
    pub status: TrackingState,
    /// Status text as reported by the carrier. Informational only.
    pub status_text: String,
    /// Assembled location description.
    pub location: String,
    /// Event time in UTC.
    pub timestamp: DateTime<Utc>,
    /// Original status, latency counters, POD and service fields.
    pub metadata: Metadata,
}

impl TrackingUpdate {
    /// Create an update with `metadata["source"]` already set.
    pub fn new(
        tracking_number: impl Into<String>,
        courier_code: Carrier,
        status: TrackingState,
        timestamp: DateTime<Utc>,
    ) -> Self {
        let mut metadata = Metadata::new();
        metadata.insert("source".to_string(), courier_code.source_tag().into());
        Self {
            tracking_number: tracking_number.into(),
            courier_code,
            status,
            status_text: String::new(),
            location: String::new(),
            timestamp,
            metadata,
        }
    }

    /// Insert a metadata entry.
    pub fn set_meta(&mut self, key: &str, value: impl Into<MetadataValue>) {
        self.metadata.insert(key.to_string(), value.into());
    }

    /// Insert a text metadata entry unless the value is blank.
    pub fn set_meta_text(&mut self, key: &str, value: &str) {
        let value = value.trim();
        if !value.is_empty() {
            self.set_meta(key, value);
        }
    }

    /// Look up a metadata entry.
    pub fn meta(&self, key: &str) -> Option<&MetadataValue> {
        self.metadata.get(key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_carrier_parsing_is_case_insensitive() {
        assert_eq!("JNE".parse::<Carrier>().unwrap(), Carrier::Jne);
        assert_eq!(" sicepat ".parse::<Carrier>().unwrap(), Carrier::Sicepat);
        assert_eq!("NinjaVan".parse::<Carrier>().unwrap(), Carrier::Ninjavan);
        assert!("anteraja".parse::<Carrier>().is_err());
    }

    #[test]
    fn test_new_update_sets_source() {
        let ts = Utc.with_ymd_and_hms(2024, 1, 20, 15, 30, 0).unwrap();
        let update = TrackingUpdate::new("JNE123", Carrier::Jne, TrackingState::Delivered, ts);
        assert_eq!(
            update.meta("source").and_then(MetadataValue::as_str),
            Some("jne_webhook")
        );
    }

    #[test]
    fn test_blank_text_metadata_is_skipped() {
        let ts = Utc.with_ymd_and_hms(2024, 1, 20, 15, 30, 0).unwrap();
        let mut update = TrackingUpdate::new("X", Carrier::Sicepat, TrackingState::Unknown, ts);
        update.set_meta_text("pod_receiver", "   ");
        assert!(update.meta("pod_receiver").is_none());
        update.set_meta_text("pod_receiver", " Budi ");
        assert_eq!(
            update.meta("pod_receiver").and_then(MetadataValue::as_str),
            Some("Budi")
        );
    }

    #[test]
    fn test_update_serializes_lowercase_courier() {
        let ts = Utc.with_ymd_and_hms(2024, 1, 20, 15, 30, 0).unwrap();
        let update = TrackingUpdate::new("A", Carrier::Ninjavan, TrackingState::InTransit, ts);
        let json = serde_json::to_value(&update).unwrap();
        assert_eq!(json["courier_code"], "ninjavan");
        assert_eq!(json["status"], "in_transit");
        assert_eq!(json["metadata"]["source"], "ninjavan_webhook");
    }
}
