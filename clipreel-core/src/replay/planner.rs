//! Timeline planning
//!
//! Turns a replay's highlights into an ordered list of source intervals that
//! fit a playback window once sequential crossfades are accounted for.

use serde::Serialize;
use std::collections::BTreeMap;
use std::time::Duration;

use crate::models::HighlightRecord;
use crate::{Error, Result};

/// Shortest clip worth cutting around a moment, in seconds
pub const MIN_CLIP_SECS: f64 = 7.5;
/// Largest share of a slot a crossfade may take
const FADE_SLOT_RATIO: f64 = 0.2;
/// Gap (in fades) under which two clips of one source are joined
const MERGE_GAP_FADES: f64 = 1.75;
const MIN_MERGE_GAP_SECS: f64 = 0.25;
/// Merged intervals this short are noise
const MIN_EMIT_SECS: f64 = 0.05;

/// One cut from a source recording
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClipInterval {
    pub source_path: String,
    pub start_sec: f64,
    pub duration_sec: f64,
    /// Wall-clock time of the moment the clip is about, unix milliseconds
    pub sort_key_ms: u64,
}

impl ClipInterval {
    #[must_use]
    pub fn end_sec(&self) -> f64 {
        self.start_sec + self.duration_sec
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Plan {
    /// Clips in playback (chronological) order
    pub clips: Vec<ClipInterval>,
    /// Playback length after crossfade overlap
    pub total_duration: Duration,
    /// Crossfade actually used, after capping against the slot length
    pub fade: Duration,
}

/// Join threshold between two clips of the same source
#[must_use]
pub fn merge_gap_secs(fade_secs: f64) -> f64 {
    (fade_secs * MERGE_GAP_FADES).max(MIN_MERGE_GAP_SECS)
}

/// Plan a replay of `highlights` that plays for roughly `window`.
pub fn build_plan(window: Duration, highlights: &[HighlightRecord], fade: Duration) -> Result<Plan> {
    if window.is_zero() {
        return Err(Error::EmptyWindow);
    }

    let total_events: usize = highlights.iter().map(|h| h.moments_ms.len()).sum();
    if total_events == 0 {
        return Err(Error::NoEvents);
    }

    let events = total_events as f64;
    let window_secs = window.as_secs_f64();
    let slot_secs = window_secs / events;
    let fade_secs = fade.as_secs_f64().min(slot_secs * FADE_SLOT_RATIO);
    // Every transition eats one fade of output, so ask for that much more.
    let clip_secs = ((window_secs + (events - 1.0) * fade_secs) / events).max(MIN_CLIP_SECS);

    let mut by_source: BTreeMap<&str, Vec<ClipInterval>> = BTreeMap::new();
    for highlight in highlights {
        let source_secs = highlight.length_ms as f64 / 1000.0;
        if source_secs <= 0.0 {
            continue;
        }

        for &moment_ms in &highlight.moments_ms {
            let moment_secs = moment_ms as f64 / 1000.0;
            let duration_sec = clip_secs.min(source_secs);
            let latest_start = (source_secs - duration_sec).max(0.0);
            let start_sec = (moment_secs - duration_sec / 2.0).clamp(0.0, latest_start);

            by_source
                .entry(highlight.media_path.as_str())
                .or_default()
                .push(ClipInterval {
                    source_path: highlight.media_path.clone(),
                    start_sec,
                    duration_sec,
                    sort_key_ms: highlight.start_time_ms.saturating_add(moment_ms),
                });
        }
    }

    let threshold = merge_gap_secs(fade_secs);
    let mut clips: Vec<ClipInterval> = by_source
        .into_values()
        .flat_map(|raw| merge_intervals(raw, threshold))
        .filter(|clip| clip.duration_sec > MIN_EMIT_SECS)
        .collect();

    if clips.is_empty() {
        return Err(Error::NoClipsProduced);
    }

    clips.sort_by(|a, b| {
        a.sort_key_ms
            .cmp(&b.sort_key_ms)
            .then_with(|| a.source_path.cmp(&b.source_path))
            .then_with(|| a.start_sec.total_cmp(&b.start_sec))
    });

    let played: f64 = clips.iter().map(|c| c.duration_sec).sum();
    let overlap = fade_secs * (clips.len() - 1) as f64;
    let total_secs = (played - overlap).max(0.0);
    let effective_fade = if fade_secs < fade.as_secs_f64() {
        Duration::from_secs_f64(fade_secs)
    } else {
        fade
    };

    Ok(Plan {
        clips,
        total_duration: Duration::from_secs_f64(total_secs),
        fade: effective_fade,
    })
}

/// Merge the clips of one source whose gap is at most `threshold`.
fn merge_intervals(mut raw: Vec<ClipInterval>, threshold: f64) -> Vec<ClipInterval> {
    raw.sort_by(|a, b| a.start_sec.total_cmp(&b.start_sec));

    let mut merged: Vec<ClipInterval> = Vec::with_capacity(raw.len());
    for clip in raw {
        match merged.last_mut() {
            Some(last) if clip.start_sec - last.end_sec() <= threshold => {
                let end = last.end_sec().max(clip.end_sec());
                last.duration_sec = end - last.start_sec;
                last.sort_key_ms = last.sort_key_ms.min(clip.sort_key_ms);
            }
            _ => merged.push(clip),
        }
    }
    merged
}
