//! When replays may be created and how long they may run

use chrono::{DateTime, Utc};
use std::time::Duration;

use crate::models::{MatchInfo, RoundPhase};
use crate::{Error, Result};

/// Window used when the match gives no better answer.
pub const DEFAULT_WINDOW: Duration = Duration::from_secs(30);

/// Used for the stream locator when the live window is closed or too short
/// to be worth playing.
pub const FALLBACK_STREAM_WINDOW: Duration = Duration::from_secs(15);

/// Time available for a replay at `now`.
///
/// Combat never allows a replay. A phase with a fixed length allows whatever
/// is left of it.
pub fn replay_window(match_info: &MatchInfo, now: DateTime<Utc>) -> Result<Duration> {
    let Some(round) = match_info.current() else {
        return Ok(DEFAULT_WINDOW);
    };

    if round.phase == RoundPhase::Combat {
        return Err(Error::ReplayDisallowed(
            "replay is disabled during combat phase".to_string(),
        ));
    }

    let (Some(length), Some(started_at)) = (round.phase.nominal_duration(), round.phase_started_at) else {
        return Ok(DEFAULT_WINDOW);
    };

    let elapsed = (now - started_at).to_std().unwrap_or(Duration::ZERO);
    match length.checked_sub(elapsed) {
        Some(remaining) if !remaining.is_zero() => Ok(remaining),
        _ => Err(Error::ReplayDisallowed("phase already ended".to_string())),
    }
}

/// Whether a replay may be created at all right now.
#[must_use]
pub fn replay_permitted(match_info: &MatchInfo) -> bool {
    match_info
        .current()
        .map_or(true, |round| round.phase != RoundPhase::Combat)
}

/// Whole seconds to advertise as `max_duration` on a stream locator.
#[must_use]
pub fn stream_window_secs(match_info: &MatchInfo, now: DateTime<Utc>) -> u64 {
    let window = replay_window(match_info, now).unwrap_or(Duration::ZERO);
    let window = if window <= Duration::from_secs(2) {
        FALLBACK_STREAM_WINDOW
    } else {
        window
    };
    window.as_secs_f64().round() as u64
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::MatchEvent;
    use chrono::{TimeDelta, TimeZone};

    fn t0() -> DateTime<Utc> {
        Utc.timestamp_opt(1_700_000_000, 0).unwrap()
    }

    fn in_phase(phase: RoundPhase) -> MatchInfo {
        MatchInfo::default()
            .apply(&MatchEvent::RoundStarted { number: 3 }, t0())
            .apply(&MatchEvent::PhaseChanged { phase }, t0())
    }

    #[test]
    fn test_no_round_gives_default_window() {
        assert_eq!(replay_window(&MatchInfo::default(), t0()).unwrap(), DEFAULT_WINDOW);
        assert!(replay_permitted(&MatchInfo::default()));
    }

    #[test]
    fn test_combat_disallows() {
        let info = in_phase(RoundPhase::Combat);
        assert!(matches!(replay_window(&info, t0()), Err(Error::ReplayDisallowed(_))));
        assert!(!replay_permitted(&info));
    }

    #[test]
    fn test_remaining_phase_time() {
        let info = in_phase(RoundPhase::Shopping);
        let now = t0() + TimeDelta::seconds(12);
        assert_eq!(replay_window(&info, now).unwrap(), Duration::from_secs(18));

        let later = t0() + TimeDelta::seconds(30);
        assert!(matches!(
            replay_window(&info, later),
            Err(Error::ReplayDisallowed(ref m)) if m == "phase already ended"
        ));
        // Ended phases still permit creation; only combat blocks it
        assert!(replay_permitted(&info));
    }

    #[test]
    fn test_unknown_phase_gives_default_window() {
        let info = MatchInfo::default().apply(&MatchEvent::RoundStarted { number: 1 }, t0());
        assert_eq!(replay_window(&info, t0() + TimeDelta::hours(1)).unwrap(), DEFAULT_WINDOW);
    }

    #[test]
    fn test_stream_window_secs() {
        let info = in_phase(RoundPhase::End);
        assert_eq!(stream_window_secs(&info, t0() + TimeDelta::seconds(2)), 5);
        // Less than two seconds left: fall back
        assert_eq!(stream_window_secs(&info, t0() + TimeDelta::seconds(6)), 15);
        assert_eq!(stream_window_secs(&in_phase(RoundPhase::Combat), t0()), 15);
    }
}
