//! Persisted match and replay state
//!
//! `State` is the immutable snapshot held by [`crate::StateStore`] and
//! written to disk by [`crate::persist::Snapshotter`].

pub mod highlight;
pub mod match_info;

pub use highlight::{dedup_highlights, HighlightKey, HighlightRecord, ReplayState, ReplayUnit};
pub use match_info::{MatchEvent, MatchInfo, Round, RoundPhase};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Root snapshot
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct State {
    pub updated_at: Option<DateTime<Utc>>,
    pub match_info: MatchInfo,
    pub replay_state: ReplayState,
}
