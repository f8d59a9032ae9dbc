//! Persisted activation records and the request shapes that create them.

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{Result, WeftError};

/// A stored activation with the snapshot captured after it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NfcEvent {
    pub id: i64,
    pub timestamp: DateTime<Utc>,
    pub nfc_index: i64,
    pub texture_name: Option<String>,
    pub snapshot_data: String,
    pub created_at: DateTime<Utc>,
}

/// Record accepted for insertion. Only built through [`NfcEventPayload::validate`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewNfcEvent {
    pub timestamp: DateTime<Utc>,
    pub nfc_index: i64,
    pub texture_name: Option<String>,
    pub snapshot_data: String,
}

impl NewNfcEvent {
    /// Stored payload length in bytes.
    pub fn size(&self) -> usize {
        self.snapshot_data.len()
    }
}

/// Body of `POST /api/nfc-events` as sent by viewers. Every field is optional
/// on the wire so that incomplete bodies produce a descriptive rejection.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NfcEventPayload {
    #[serde(default)]
    pub timestamp: Option<String>,
    #[serde(default)]
    pub nfc_index: Option<i64>,
    #[serde(default)]
    pub texture_name: Option<String>,
    #[serde(default)]
    pub snapshot_data: Option<String>,
}

impl NfcEventPayload {
    pub fn validate(self, received_at: DateTime<Utc>) -> Result<NewNfcEvent> {
        let nfc_index = self
            .nfc_index
            .ok_or_else(|| WeftError::Validation("nfc_index is required".into()))?;
        if nfc_index < 0 {
            return Err(WeftError::Validation(format!(
                "nfc_index must be non-negative, got {nfc_index}"
            )));
        }
        let snapshot_data = match self.snapshot_data {
            Some(data) if !data.trim().is_empty() => data,
            _ => {
                return Err(WeftError::Validation(
                    "snapshot_data is required and must not be empty".into(),
                ))
            }
        };
        let timestamp = match self.timestamp.as_deref() {
            None | Some("") => received_at,
            Some(raw) => parse_iso8601(raw).ok_or_else(|| {
                WeftError::Validation(format!("timestamp '{raw}' is not an ISO-8601 date or time"))
            })?,
        };
        let texture_name = self.texture_name.filter(|name| !name.is_empty());

        Ok(NewNfcEvent {
            timestamp,
            nfc_index,
            texture_name,
            snapshot_data,
        })
    }
}

/// Offset-less forms accepted as UTC, extended and basic notation.
const NAIVE_DATETIME_FORMATS: [&str; 4] = [
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%dT%H:%M",
    "%Y%m%dT%H%M%S%.f",
    "%Y%m%dT%H%M%S%.fZ",
];

/// Parse the ISO-8601 variants viewers and readers send. Strings without an
/// offset are taken as UTC; a bare date means its midnight.
pub fn parse_iso8601(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return Some(ts.with_timezone(&Utc));
    }
    if let Ok(ts) = DateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f%z") {
        return Some(ts.with_timezone(&Utc));
    }
    if let Some(naive) = NAIVE_DATETIME_FORMATS
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(raw, format).ok())
    {
        return Some(naive.and_utc());
    }
    ["%Y-%m-%d", "%Y%m%d"]
        .iter()
        .find_map(|format| NaiveDate::parse_from_str(raw, format).ok())
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
}

/// Result of a successful insertion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredEvent {
    pub id: i64,
    pub size: usize,
}

/// Filter for listing stored events, most recent first.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EventQuery {
    pub limit: usize,
    pub nfc_index: Option<i64>,
}

impl EventQuery {
    pub const DEFAULT_LIMIT: usize = 50;

    pub fn latest(limit: usize) -> Self {
        Self {
            limit,
            nfc_index: None,
        }
    }
}

impl Default for EventQuery {
    fn default() -> Self {
        Self::latest(Self::DEFAULT_LIMIT)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn payload() -> NfcEventPayload {
        NfcEventPayload {
            timestamp: Some("2024-05-01T12:30:00.000Z".into()),
            nfc_index: Some(2),
            texture_name: Some("OSC_ORANGE_RED".into()),
            snapshot_data: Some("A5F0".into()),
        }
    }

    #[test]
    fn complete_payload_validates() {
        let record = payload().validate(Utc::now()).expect("valid payload");
        assert_eq!(record.nfc_index, 2);
        assert_eq!(record.size(), 4);
        assert_eq!(record.timestamp.to_rfc3339(), "2024-05-01T12:30:00+00:00");
    }

    #[test]
    fn missing_required_fields_are_rejected() {
        let mut missing_index = payload();
        missing_index.nfc_index = None;
        let err = missing_index.validate(Utc::now()).unwrap_err();
        assert!(err.is_client_error());

        let mut empty_snapshot = payload();
        empty_snapshot.snapshot_data = Some(String::new());
        assert!(empty_snapshot.validate(Utc::now()).is_err());

        let mut no_snapshot = payload();
        no_snapshot.snapshot_data = None;
        assert!(no_snapshot.validate(Utc::now()).is_err());
    }

    #[test]
    fn missing_timestamp_defaults_to_receipt_time() {
        let now = Utc::now();
        let mut p = payload();
        p.timestamp = None;
        assert_eq!(p.validate(now).unwrap().timestamp, now);

        let mut bad = payload();
        bad.timestamp = Some("yesterday".into());
        assert!(bad.validate(now).is_err());
    }

    #[test]
    fn offsetless_timestamps_are_read_as_utc() {
        let expected = "2024-05-01T12:00:00+00:00";
        for raw in [
            "2024-05-01T12:00:00",
            "2024-05-01T12:00:00.000",
            "2024-05-01T12:00",
            "20240501T120000Z",
            "20240501T120000",
            "2024-05-01T14:00:00+0200",
        ] {
            let mut p = payload();
            p.timestamp = Some(raw.into());
            let record = p.validate(Utc::now()).unwrap_or_else(|err| panic!("{raw}: {err}"));
            assert_eq!(record.timestamp.to_rfc3339(), expected, "{raw}");
        }
    }

    #[test]
    fn date_only_timestamp_is_midnight_utc() {
        let mut p = payload();
        p.timestamp = Some("2024-05-01".into());
        let record = p.validate(Utc::now()).unwrap();
        assert_eq!(record.timestamp.to_rfc3339(), "2024-05-01T00:00:00+00:00");
        assert_eq!(parse_iso8601("20240501"), Some(record.timestamp));
    }
}
