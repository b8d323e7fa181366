// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Carrier dialect normalizers.
//!
//! Each carrier has a [`CarrierNormalizer`] that turns the raw webhook body
//! into canonical [`TrackingUpdate`]s. Status mapping is data-driven: an
//! exact code table followed by ordered text-substring rules, with
//! [`TrackingState::Unknown`] as the final default.

pub mod jne;
pub mod ninjavan;
pub mod sicepat;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer};
use serde_json::Value;
use tracing::warn;

use crate::error::Result;
use crate::history::{CarrierEvent, drop_placeholder_events};
use crate::state::TrackingState;
use crate::timestamp::{ReportedTime, TimestampSource};
use crate::update::{Carrier, TrackingUpdate};

pub use jne::JneNormalizer;
pub use ninjavan::NinjavanNormalizer;
pub use sicepat::SicepatNormalizer;

/// Result of parsing one webhook body, before history filtering.
#[derive(Debug, Clone)]
pub struct ParsedWebhook {
    /// Events in carrier-supplied order.
    pub events: Vec<CarrierEvent>,
    /// The carrier's own last-update time, when it could be parsed.
    pub carrier_updated_at: Option<DateTime<Utc>>,
}

/// A carrier dialect.
pub trait CarrierNormalizer: Send + Sync {
    /// The carrier this normalizer handles.
    fn carrier(&self) -> Carrier;

    /// Parse a raw body into events. `ingress` substitutes for missing times.
    fn parse(&self, raw: &[u8], ingress: DateTime<Utc>) -> Result<ParsedWebhook>;

    /// Parse and drop midnight placeholders.
    fn normalize(&self, raw: &[u8]) -> Result<Vec<TrackingUpdate>> {
        let parsed = self.parse(raw, Utc::now())?;
        Ok(drop_placeholder_events(parsed.events)
            .into_iter()
            .map(|event| event.update)
            .collect())
    }
}

static JNE: JneNormalizer = JneNormalizer;
static SICEPAT: SicepatNormalizer = SicepatNormalizer;
static NINJAVAN: NinjavanNormalizer = NinjavanNormalizer;

/// The normalizer for a carrier.
pub fn normalizer_for(carrier: Carrier) -> &'static dyn CarrierNormalizer {
    match carrier {
        Carrier::Jne => &JNE,
        Carrier::Sicepat => &SICEPAT,
        Carrier::Ninjavan => &NINJAVAN,
    }
}

// ============================================================================
// Status tables
// ============================================================================

/// An ordered substring rule over lowercased status text.
#[derive(Debug)]
pub(crate) struct TextRule {
    /// Matches when the text contains any of these.
    pub any: &'static [&'static str],
    /// State assigned on match.
    pub state: TrackingState,
}

/// Code table plus text rules for one carrier.
#[derive(Debug)]
pub(crate) struct StatusRules {
    pub codes: &'static [(&'static [&'static str], TrackingState)],
    pub texts: &'static [TextRule],
}

impl StatusRules {
    /// Exact match on a normalized status code.
    pub fn match_code(&self, code: &str) -> Option<TrackingState> {
        let code = normalize_code(code);
        if code.is_empty() {
            return None;
        }
        self.codes
            .iter()
            .find(|(codes, _)| codes.contains(&code.as_str()))
            .map(|(_, state)| *state)
    }

    /// First text rule that matches, in table order.
    pub fn match_text(&self, text: &str) -> Option<TrackingState> {
        let text = text.trim().to_lowercase();
        if text.is_empty() {
            return None;
        }
        self.texts
            .iter()
            .find(|rule| rule.any.iter().any(|needle| text.contains(needle)))
            .map(|rule| rule.state)
    }

    /// Code table, then text rules, then `Unknown`.
    pub fn resolve(&self, code: &str, text: &str) -> TrackingState {
        self.match_code(code)
            .or_else(|| self.match_text(text))
            .unwrap_or(TrackingState::Unknown)
    }
}

/// Uppercase, trim, and fold spaces and hyphens into underscores.
pub(crate) fn normalize_code(code: &str) -> String {
    code.trim()
        .to_ascii_uppercase()
        .chars()
        .map(|c| if c == ' ' || c == '-' { '_' } else { c })
        .collect()
}

// ============================================================================
// Field helpers
// ============================================================================

/// Accept strings, numbers, booleans, and null as a string field.
pub(crate) fn lenient_string<'de, D>(deserializer: D) -> std::result::Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    Ok(value_to_string(&value))
}

pub(crate) fn value_to_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.trim().to_string(),
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        _ => String::new(),
    }
}

/// First candidate that is not blank.
pub(crate) fn first_non_empty<'a>(candidates: &[&'a str]) -> Option<&'a str> {
    candidates
        .iter()
        .map(|c| c.trim())
        .find(|c| !c.is_empty())
}

/// Inputs for one canonical event.
pub(crate) struct EventDraft<'a> {
    pub carrier: Carrier,
    pub tracking_number: &'a str,
    pub status: TrackingState,
    pub status_text: &'a str,
    pub original_status: &'a str,
    pub location: String,
    pub time: ReportedTime,
}

impl EventDraft<'_> {
    /// Build the event with the metadata every carrier shares.
    pub fn build(self) -> CarrierEvent {
        let mut update = TrackingUpdate::new(
            self.tracking_number.trim(),
            self.carrier,
            self.status,
            self.time.utc,
        );
        update.status_text = self.status_text.trim().to_string();
        update.location = self.location;
        update.set_meta_text("original_status", self.original_status);
        update.set_meta("timestamp_source", self.time.source.as_str());

        if self.status == TrackingState::Unknown {
            warn!(
                courier = %self.carrier,
                tracking_number = %update.tracking_number,
                original_status = %self.original_status,
                status_text = %update.status_text,
                "Unmapped carrier status"
            );
            update.set_meta("unknown_status", true);
        }

        CarrierEvent {
            update,
            time: self.time,
        }
    }
}

/// The carrier time used for latency, if the payload carried one.
pub(crate) fn carrier_time(time: &ReportedTime) -> Option<DateTime<Utc>> {
    (time.source != TimestampSource::Ingress).then_some(time.utc)
}
