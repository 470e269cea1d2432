use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};

/// A saved rolling-buffer segment annotated with the moments inside it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HighlightRecord {
    #[serde(default)]
    pub match_id: String,
    /// Round the segment started in; `None` when no known round contains it
    #[serde(default)]
    pub round: Option<u32>,
    /// Capture session the segment was saved for
    pub index: u64,
    /// Wall-clock start of the segment, unix milliseconds
    pub start_time_ms: u64,
    pub media_path: String,
    /// Probed (or nominal) length of the segment
    pub length_ms: u64,
    /// Event offsets from the segment start
    pub moments_ms: Vec<u64>,
}

/// Uniqueness key of a highlight record
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct HighlightKey {
    pub media_path: String,
    pub start_time_ms: u64,
}

impl HighlightRecord {
    #[must_use]
    pub fn key(&self) -> HighlightKey {
        HighlightKey {
            media_path: self.media_path.clone(),
            start_time_ms: self.start_time_ms,
        }
    }
}

/// Collapse records sharing a key, keeping the first and preserving order.
#[must_use]
pub fn dedup_highlights(records: &[HighlightRecord]) -> Vec<HighlightRecord> {
    let mut seen = HashSet::with_capacity(records.len());
    records
        .iter()
        .filter(|r| seen.insert(r.key()))
        .cloned()
        .collect()
}

/// A numbered, immutable group of highlights ready for playback
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReplayUnit {
    #[serde(default)]
    pub round_number: Option<u32>,
    pub highlights: Vec<HighlightRecord>,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ReplayState {
    pub pending_highlights: Vec<HighlightRecord>,
    /// Id the next replay will be stored under
    pub current_replay_id: u32,
    pub replays: BTreeMap<u32, ReplayUnit>,
}
