use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexCount {
    pub nfc_index: i64,
    pub count: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TextureCount {
    pub texture_name: Option<String>,
    pub count: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct HourBucket {
    pub hour: u8,
    pub count: u64,
}

/// Aggregate view over every stored event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalyticsOverview {
    pub total_events: u64,
    pub distinct_indices: u64,
    pub distinct_textures: u64,
    pub total_snapshot_bytes: u64,
    pub average_snapshot_bytes: f64,
    pub first_event: Option<DateTime<Utc>>,
    pub last_event: Option<DateTime<Utc>>,
    pub per_index: Vec<IndexCount>,
    pub hourly: Vec<HourBucket>,
}

/// Aggregate view over the events of one tag.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NfcStats {
    pub nfc_index: i64,
    pub total_events: u64,
    pub distinct_textures: u64,
    pub total_snapshot_bytes: u64,
    pub first_seen: Option<DateTime<Utc>>,
    pub last_seen: Option<DateTime<Utc>>,
    pub textures: Vec<TextureCount>,
    pub hourly: Vec<HourBucket>,
}

/// Expand sparse `(hour, count)` rows into 24 buckets.
pub fn fill_hours(rows: impl IntoIterator<Item = (u8, u64)>) -> Vec<HourBucket> {
    let mut buckets: Vec<HourBucket> = (0..24).map(|hour| HourBucket { hour, count: 0 }).collect();
    for (hour, count) in rows {
        if let Some(bucket) = buckets.get_mut(hour as usize) {
            bucket.count += count;
        }
    }
    buckets
}
