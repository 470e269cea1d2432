//! Turning a completed buffer save into a highlight record

use chrono::{DateTime, TimeDelta, Utc};

use crate::models::{HighlightRecord, MatchInfo};

/// A save issued to the backend and not yet reported back.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingSave {
    pub session_id: u64,
    /// Wall clock at the moment the save command was issued
    pub requested_at: DateTime<Utc>,
    pub events: Vec<DateTime<Utc>>,
}

/// Place the session's events inside a saved segment of `length_ms`.
///
/// The segment is assumed to end at `requested_at`. Offsets are clamped into
/// `[0, length_ms]`, and the owning round is the one containing the segment
/// start.
#[must_use]
pub fn build_highlight(
    pending: &PendingSave,
    media_path: &str,
    length_ms: u64,
    match_info: &MatchInfo,
) -> HighlightRecord {
    let length = TimeDelta::milliseconds(i64::try_from(length_ms).unwrap_or(i64::MAX));
    let buffer_start = pending.requested_at - length;

    let moments_ms = pending
        .events
        .iter()
        .map(|event| {
            let offset = (*event - buffer_start).num_milliseconds().max(0);
            u64::try_from(offset).unwrap_or(0).min(length_ms)
        })
        .collect();

    HighlightRecord {
        match_id: match_info.match_id.clone(),
        round: match_info.round_at(buffer_start),
        index: pending.session_id,
        start_time_ms: u64::try_from(buffer_start.timestamp_millis()).unwrap_or(0),
        media_path: media_path.to_string(),
        length_ms,
        moments_ms,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{MatchEvent, MatchInfo};
    use chrono::TimeZone;

    fn at_ms(ms: i64) -> DateTime<Utc> {
        Utc.timestamp_millis_opt(1_700_000_000_000 + ms).unwrap()
    }

    #[test]
    fn test_offsets_are_relative_to_buffer_start() {
        let pending = PendingSave {
            session_id: 4,
            requested_at: at_ms(30_000),
            events: vec![at_ms(18_000), at_ms(22_500)],
        };

        let record = build_highlight(&pending, "/clips/a.mp4", 20_000, &MatchInfo::default());
        assert_eq!(record.moments_ms, vec![8_000, 12_500]);
        assert_eq!(record.start_time_ms, 1_700_000_010_000);
        assert_eq!(record.index, 4);
        assert_eq!(record.length_ms, 20_000);
    }

    #[test]
    fn test_offsets_clamped_into_segment() {
        let pending = PendingSave {
            session_id: 1,
            requested_at: at_ms(30_000),
            // Before the buffer start, and after the save was issued
            events: vec![at_ms(1_000), at_ms(31_000)],
        };

        let record = build_highlight(&pending, "a.mp4", 10_000, &MatchInfo::default());
        assert_eq!(record.moments_ms, vec![0, 10_000]);
    }

    #[test]
    fn test_round_lookup_uses_segment_start() {
        let info = MatchInfo::default()
            .apply(&MatchEvent::RoundStarted { number: 1 }, at_ms(0))
            .apply(&MatchEvent::RoundStarted { number: 2 }, at_ms(15_000));

        let pending = PendingSave {
            session_id: 1,
            requested_at: at_ms(30_000),
            events: vec![at_ms(25_000)],
        };

        // Segment starts at 10s: still round 1 even though the event is in round 2
        let record = build_highlight(&pending, "a.mp4", 20_000, &info);
        assert_eq!(record.round, Some(1));

        // No round covers a segment starting before the match
        let early = PendingSave {
            requested_at: at_ms(5_000),
            ..pending
        };
        assert_eq!(build_highlight(&early, "a.mp4", 20_000, &info).round, None);
    }
}
