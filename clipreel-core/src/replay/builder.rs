//! Replay creation and replay locators

use chrono::{DateTime, Utc};
use std::sync::Arc;
use tracing::info;
use url::Url;

use super::window::replay_permitted;
use crate::models::{dedup_highlights, ReplayUnit};
use crate::persist::SnapshotHandle;
use crate::{Error, Result, StateStore};

/// Packs pending highlights into numbered replays.
#[derive(Clone)]
pub struct ReplayBuilder {
    store: Arc<StateStore>,
    snapshots: SnapshotHandle,
}

impl ReplayBuilder {
    #[must_use]
    pub fn new(store: Arc<StateStore>, snapshots: SnapshotHandle) -> Self {
        Self { store, snapshots }
    }

    pub fn create_replay(&self) -> Result<u32> {
        self.create_replay_at(Utc::now())
    }

    /// Move every pending highlight into a new replay and return its id.
    ///
    /// All guards are evaluated against the same snapshot the new replay is
    /// built from; nothing is written when one of them refuses.
    pub fn create_replay_at(&self, now: DateTime<Utc>) -> Result<u32> {
        let mut created = 0;

        self.store.try_update(|cur| {
            let replay_state = &cur.replay_state;
            if replay_state.pending_highlights.is_empty() {
                return Err(Error::NothingToReplay);
            }
            if replay_state.current_replay_id == u32::MAX {
                return Err(Error::ReplayIdsExhausted);
            }
            if !replay_permitted(&cur.match_info) {
                return Err(Error::ReplayDisallowed(
                    "replay is disabled during combat phase".to_string(),
                ));
            }

            let id = replay_state.current_replay_id;
            let unit = ReplayUnit {
                round_number: cur
                    .match_info
                    .current_round
                    .or_else(|| cur.match_info.latest_round_number()),
                highlights: dedup_highlights(&replay_state.pending_highlights),
                created_at: Some(now),
            };

            let mut next = cur.clone();
            next.replay_state.replays.insert(id, unit);
            next.replay_state.pending_highlights.clear();
            next.replay_state.current_replay_id = id + 1;
            created = id;
            Ok(next)
        })?;

        self.snapshots.request_save();
        info!(replay_id = created, "Replay created");
        Ok(created)
    }

    #[must_use]
    pub fn replay(&self, id: u32) -> Option<ReplayUnit> {
        self.store.get().replay_state.replays.get(&id).cloned()
    }
}

/// Builds externally reachable stream URLs for replays.
#[derive(Debug, Clone)]
pub struct ReplayLocator {
    base: Url,
}

impl ReplayLocator {
    pub fn new(public_base_url: &str) -> Result<Self> {
        Ok(Self {
            base: Url::parse(public_base_url)?,
        })
    }

    /// `{base}/replay.ts?replay_id=<id>[&max_duration=<secs>]`
    #[must_use]
    pub fn url_for(&self, id: u32, max_duration_secs: Option<u64>) -> String {
        let mut url = self.base.clone();
        let path = format!("{}/replay.ts", url.path().trim_end_matches('/'));
        url.set_path(&path);
        url.set_query(None);

        {
            let mut query = url.query_pairs_mut();
            query.append_pair("replay_id", &id.to_string());
            if let Some(secs) = max_duration_secs {
                query.append_pair("max_duration", &secs.to_string());
            }
        }
        url.to_string()
    }
}
