use chrono::{DateTime, SecondsFormat, Utc};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tokio::task::JoinHandle;
use tracing::{info, warn};
use weft_types::{record::StoredEvent, Result};

use crate::viewer_error;

/// Body of `POST /api/nfc-events`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SnapshotSubmission {
    pub timestamp: String,
    pub nfc_index: i64,
    pub texture_name: String,
    pub snapshot_data: String,
}

impl SnapshotSubmission {
    /// `None` when the capture produced nothing worth storing.
    pub fn new(
        nfc_index: i64,
        texture_name: impl Into<String>,
        snapshot_data: String,
        captured_at: DateTime<Utc>,
    ) -> Option<Self> {
        if snapshot_data.is_empty() {
            return None;
        }
        Some(Self {
            timestamp: captured_at.to_rfc3339_opts(SecondsFormat::Millis, true),
            nfc_index,
            texture_name: texture_name.into(),
            snapshot_data,
        })
    }
}

#[derive(Debug, Deserialize)]
struct Receipt {
    id: i64,
    size: usize,
}

#[derive(Clone)]
pub struct SnapshotSubmitter {
    client: Client,
    endpoint: String,
}

impl SnapshotSubmitter {
    pub fn new(server_url: &str) -> Self {
        Self {
            client: Client::new(),
            endpoint: format!("{}/api/nfc-events", server_url.trim_end_matches('/')),
        }
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    pub async fn submit(&self, submission: &SnapshotSubmission) -> Result<StoredEvent> {
        let response = self
            .client
            .post(&self.endpoint)
            .json(submission)
            .send()
            .await
            .map_err(|err| viewer_error(format!("snapshot upload failed: {err}")))?
            .error_for_status()
            .map_err(|err| viewer_error(format!("snapshot rejected: {err}")))?;
        let receipt: Receipt = response
            .json()
            .await
            .map_err(|err| viewer_error(format!("unreadable snapshot receipt: {err}")))?;
        Ok(StoredEvent {
            id: receipt.id,
            size: receipt.size,
        })
    }

    /// Upload on a background task. Failures are logged and never retried.
    pub fn dispatch(&self, submission: SnapshotSubmission) -> JoinHandle<()> {
        let submitter = self.clone();
        tokio::spawn(async move {
            match submitter.submit(&submission).await {
                Ok(stored) => info!(
                    id = stored.id,
                    nfc_index = submission.nfc_index,
                    size = stored.size,
                    "snapshot persisted"
                ),
                Err(err) => warn!(nfc_index = submission.nfc_index, "{err}"),
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn empty_capture_is_not_submitted() {
        let submission = SnapshotSubmission::new(1, "OSC_GREEN_PURPLE", String::new(), Utc::now());
        assert!(submission.is_none());
    }

    #[test]
    fn submission_serializes_wire_fields() {
        let at = Utc.with_ymd_and_hms(2024, 5, 1, 12, 30, 0).unwrap();
        let submission = SnapshotSubmission::new(2, "OSC_ORANGE_RED", "FFC0".into(), at).unwrap();
        let value = serde_json::to_value(&submission).unwrap();
        assert_eq!(value["timestamp"], "2024-05-01T12:30:00.000Z");
        assert_eq!(value["nfc_index"], 2);
        assert_eq!(value["texture_name"], "OSC_ORANGE_RED");
        assert_eq!(value["snapshot_data"], "FFC0");
    }

    #[test]
    fn endpoint_ignores_trailing_slash() {
        let submitter = SnapshotSubmitter::new("http://127.0.0.1:3000/");
        assert_eq!(submitter.endpoint(), "http://127.0.0.1:3000/api/nfc-events");
    }

    #[tokio::test]
    async fn unreachable_server_is_only_logged() {
        let submitter = SnapshotSubmitter::new("http://127.0.0.1:9");
        let submission =
            SnapshotSubmission::new(0, "OSC_BLUE_CYAN", "00".into(), Utc::now()).unwrap();
        submitter.dispatch(submission).await.unwrap();
    }
}
