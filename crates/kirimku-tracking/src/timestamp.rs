// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Carrier timestamp parsing and event-time reconciliation.
//!
//! Accepted formats:
//!
//! | Format | Example |
//! |--------|---------|
//! | RFC 3339 | `2024-01-20T15:30:00Z`, `2024-01-20T15:30:00.123Z`, `2024-01-20T22:30:00+07:00` |
//! | Space separated, UTC | `2024-01-20 15:30:00` |
//!
//! The offset the carrier reported is preserved in [`ReportedTime`] so the
//! history filter can recognise local-midnight placeholders.

use chrono::{DateTime, FixedOffset, NaiveDateTime, TimeZone, Timelike, Utc};

const SPACE_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Parse a carrier timestamp, keeping the reported offset.
///
/// Naive formats are taken as UTC.
pub fn parse_reported(value: &str) -> Option<DateTime<FixedOffset>> {
    let value = value.trim();
    if value.is_empty() {
        return None;
    }

    if let Ok(dt) = DateTime::parse_from_rfc3339(value) {
        return Some(dt);
    }

    NaiveDateTime::parse_from_str(value, SPACE_FORMAT)
        .ok()
        .map(|naive| Utc.from_utc_datetime(&naive).fixed_offset())
}

/// Parse a carrier timestamp into UTC.
pub fn parse_timestamp(value: &str) -> Option<DateTime<Utc>> {
    parse_reported(value).map(|dt| dt.with_timezone(&Utc))
}

/// Compose the legacy `{event_date} {event_time}` pair.
pub fn parse_event_pair(date: &str, time: &str) -> Option<DateTime<FixedOffset>> {
    let (date, time) = (date.trim(), time.trim());
    if date.is_empty() || time.is_empty() {
        return None;
    }
    parse_reported(&format!("{} {}", date, time))
}

/// Whether a parsed time is a zero value (Unix epoch or earlier).
pub fn is_zero(dt: &DateTime<FixedOffset>) -> bool {
    dt.timestamp() <= 0
}

/// Which rung of the fallback ladder produced the event time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimestampSource {
    /// The carrier's primary last-update field.
    Carrier,
    /// The legacy `event_date` + `event_time` pair.
    EventDateTime,
    /// The legacy single `timestamp` field.
    LegacyTimestamp,
    /// No usable time in the payload; ingress time substituted.
    Ingress,
}

impl TimestampSource {
    /// Value stored under `metadata["timestamp_source"]`.
    pub fn as_str(&self) -> &'static str {
        match self {
            TimestampSource::Carrier => "carrier",
            TimestampSource::EventDateTime => "event_date_time",
            TimestampSource::LegacyTimestamp => "legacy_timestamp",
            TimestampSource::Ingress => "ingress",
        }
    }
}

/// Raw timestamp fields offered by a payload.
#[derive(Debug, Clone, Copy, Default)]
pub struct TimestampCandidates<'a> {
    /// Carrier's primary last-update field.
    pub primary: Option<&'a str>,
    /// Legacy event date (`YYYY-MM-DD`).
    pub event_date: Option<&'a str>,
    /// Legacy event time (`HH:MM:SS`).
    pub event_time: Option<&'a str>,
    /// Legacy single timestamp field.
    pub legacy: Option<&'a str>,
}

/// The reconciled event time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReportedTime {
    /// Event time in UTC.
    pub utc: DateTime<Utc>,
    /// Time as the carrier reported it. `None` for ingress substitution.
    pub reported: Option<DateTime<FixedOffset>>,
    /// Rung of the ladder that produced it.
    pub source: TimestampSource,
}

impl ReportedTime {
    /// Whether the carrier reported exactly midnight in its own offset.
    pub fn is_midnight_placeholder(&self) -> bool {
        self.reported
            .map(|dt| dt.hour() == 0 && dt.minute() == 0 && dt.second() == 0)
            .unwrap_or(false)
    }
}

/// Pick the event time using the fallback ladder:
/// primary field, event date/time pair, legacy timestamp, ingress time.
pub fn reconcile(candidates: TimestampCandidates<'_>, ingress: DateTime<Utc>) -> ReportedTime {
    let usable = |dt: Option<DateTime<FixedOffset>>| dt.filter(|dt| !is_zero(dt));

    let ladder = [
        (
            usable(candidates.primary.and_then(parse_reported)),
            TimestampSource::Carrier,
        ),
        (
            usable(match (candidates.event_date, candidates.event_time) {
                (Some(date), Some(time)) => parse_event_pair(date, time),
                _ => None,
            }),
            TimestampSource::EventDateTime,
        ),
        (
            usable(candidates.legacy.and_then(parse_reported)),
            TimestampSource::LegacyTimestamp,
        ),
    ];

    ladder
        .into_iter()
        .find_map(|(dt, source)| {
            dt.map(|dt| ReportedTime {
                utc: dt.with_timezone(&Utc),
                reported: Some(dt),
                source,
            })
        })
        .unwrap_or(ReportedTime {
            utc: ingress,
            reported: None,
            source: TimestampSource::Ingress,
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn utc(s: &str) -> DateTime<Utc> {
        DateTime::parse_from_rfc3339(s).unwrap().with_timezone(&Utc)
    }

    #[test]
    fn test_accepted_formats() {
        let expected = utc("2024-01-20T15:30:00Z");
        for input in [
            "2024-01-20T15:30:00Z",
            "2024-01-20 15:30:00",
            "2024-01-20T15:30:00.000Z",
            "2024-01-20T22:30:00+07:00",
            " 2024-01-20T15:30:00Z ",
        ] {
            assert_eq!(parse_timestamp(input), Some(expected), "input {:?}", input);
        }
    }

    #[test]
    fn test_fractional_seconds_kept() {
        let parsed = parse_timestamp("2024-01-20T15:30:00.250Z").unwrap();
        assert_eq!(parsed.timestamp_subsec_millis(), 250);
    }

    #[test]
    fn test_rejects_garbage() {
        assert_eq!(parse_timestamp(""), None);
        assert_eq!(parse_timestamp("yesterday"), None);
        assert_eq!(parse_timestamp("20/01/2024 15:30"), None);
    }

    #[test]
    fn test_reported_offset_preserved() {
        let reported = parse_reported("2024-01-20T00:00:00+07:00").unwrap();
        assert_eq!(reported.hour(), 0);
        assert_eq!(reported.with_timezone(&Utc).hour(), 17);
    }

    #[test]
    fn test_primary_wins() {
        let ingress = utc("2024-02-01T00:00:01Z");
        let picked = reconcile(
            TimestampCandidates {
                primary: Some("2024-01-20T15:30:00Z"),
                event_date: Some("2024-01-19"),
                event_time: Some("10:00:00"),
                legacy: Some("2024-01-18 10:00:00"),
            },
            ingress,
        );
        assert_eq!(picked.utc, utc("2024-01-20T15:30:00Z"));
        assert_eq!(picked.source, TimestampSource::Carrier);
    }

    #[test]
    fn test_zero_primary_falls_through() {
        let ingress = utc("2024-02-01T00:00:01Z");
        let picked = reconcile(
            TimestampCandidates {
                primary: Some("0001-01-01T00:00:00Z"),
                event_date: Some("2024-01-19"),
                event_time: Some("10:00:00"),
                legacy: None,
            },
            ingress,
        );
        assert_eq!(picked.utc, utc("2024-01-19T10:00:00Z"));
        assert_eq!(picked.source, TimestampSource::EventDateTime);
    }

    #[test]
    fn test_legacy_then_ingress() {
        let ingress = utc("2024-02-01T08:00:00Z");
        let picked = reconcile(
            TimestampCandidates {
                legacy: Some("2024-01-18 10:00:00"),
                ..Default::default()
            },
            ingress,
        );
        assert_eq!(picked.source, TimestampSource::LegacyTimestamp);

        let picked = reconcile(
            TimestampCandidates {
                primary: Some("not a time"),
                event_date: Some("2024-01-19"),
                ..Default::default()
            },
            ingress,
        );
        assert_eq!(picked.source, TimestampSource::Ingress);
        assert_eq!(picked.utc, ingress);
        assert!(picked.reported.is_none());
        assert!(!picked.is_midnight_placeholder());
    }

    #[test]
    fn test_midnight_placeholder_uses_reported_offset() {
        let ingress = utc("2024-02-01T08:00:00Z");
        let midnight = reconcile(
            TimestampCandidates {
                primary: Some("2024-01-20T00:00:00+07:00"),
                ..Default::default()
            },
            ingress,
        );
        assert!(midnight.is_midnight_placeholder());

        let utc_midnight_elsewhere = reconcile(
            TimestampCandidates {
                primary: Some("2024-01-20T07:00:00+07:00"),
                ..Default::default()
            },
            ingress,
        );
        assert!(!utc_midnight_elsewhere.is_midnight_placeholder());
    }
}
