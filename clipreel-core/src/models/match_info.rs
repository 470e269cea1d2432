use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Phase of a round as reported by match telemetry
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RoundPhase {
    Shopping,
    Combat,
    End,
    GameEnd,
    #[default]
    #[serde(other)]
    Unknown,
}

impl RoundPhase {
    /// Nominal length of the phase, when the game fixes one.
    #[must_use]
    pub const fn nominal_duration(self) -> Option<Duration> {
        match self {
            Self::Shopping => Some(Duration::from_secs(30)),
            Self::Combat => Some(Duration::from_secs(100)),
            Self::End | Self::GameEnd => Some(Duration::from_secs(7)),
            Self::Unknown => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Round {
    /// 1-based round number
    pub number: u32,
    pub started_at: DateTime<Utc>,
    #[serde(default)]
    pub ended_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub phase: RoundPhase,
    #[serde(default)]
    pub phase_started_at: Option<DateTime<Utc>>,
}

impl Round {
    /// `[started_at, ended_at)`; an unfinished round extends forever.
    #[must_use]
    pub fn contains(&self, at: DateTime<Utc>) -> bool {
        self.started_at <= at && self.ended_at.map_or(true, |end| end > at)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct MatchInfo {
    pub match_id: String,
    pub map: String,
    pub rounds: Vec<Round>,
    /// Number of the round currently being played
    pub current_round: Option<u32>,
}

impl MatchInfo {
    #[must_use]
    pub fn current(&self) -> Option<&Round> {
        let number = self.current_round?;
        self.rounds.iter().rev().find(|r| r.number == number)
    }

    /// The round whose interval contains `at`, if any.
    #[must_use]
    pub fn round_at(&self, at: DateTime<Utc>) -> Option<u32> {
        self.rounds.iter().find(|r| r.contains(at)).map(|r| r.number)
    }

    #[must_use]
    pub fn latest_round_number(&self) -> Option<u32> {
        self.rounds.iter().map(|r| r.number).max()
    }

    /// Apply a telemetry event, returning the updated match info.
    #[must_use]
    pub fn apply(&self, event: &MatchEvent, at: DateTime<Utc>) -> Self {
        let mut next = self.clone();
        match event {
            MatchEvent::MatchStarted { match_id, map } => {
                next = Self {
                    match_id: match_id.clone(),
                    map: map.clone().unwrap_or_default(),
                    ..Self::default()
                };
            }
            MatchEvent::RoundStarted { number } => {
                if let Some(open) = next.rounds.iter_mut().find(|r| r.ended_at.is_none()) {
                    open.ended_at = Some(at);
                }
                next.rounds.retain(|r| r.number != *number);
                next.rounds.push(Round {
                    number: *number,
                    started_at: at,
                    ended_at: None,
                    phase: RoundPhase::Unknown,
                    phase_started_at: None,
                });
                next.current_round = Some(*number);
            }
            MatchEvent::PhaseChanged { phase } => {
                let current = next.current_round;
                if let Some(round) = next
                    .rounds
                    .iter_mut()
                    .rev()
                    .find(|r| Some(r.number) == current)
                {
                    round.phase = *phase;
                    round.phase_started_at = Some(at);
                }
            }
            MatchEvent::RoundEnded => {
                let current = next.current_round;
                if let Some(round) = next
                    .rounds
                    .iter_mut()
                    .rev()
                    .find(|r| Some(r.number) == current)
                {
                    round.ended_at.get_or_insert(at);
                }
            }
        }
        next
    }
}

/// Round/phase transitions emitted by the match-event boundary
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum MatchEvent {
    MatchStarted {
        match_id: String,
        #[serde(default)]
        map: Option<String>,
    },
    RoundStarted {
        number: u32,
    },
    PhaseChanged {
        phase: RoundPhase,
    },
    RoundEnded,
}
