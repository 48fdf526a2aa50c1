use serde::{Deserialize, Serialize};

use crate::events::{DrivingEvent, EventKind, EventLog};
use crate::trip::TripState;

/// Driving score, always within 0..=100.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(from = "i64", into = "i64")]
pub struct Score(u8);

impl Score {
    pub const MAX: Score = Score(100);
    pub const MIN: Score = Score(0);

    pub fn value(&self) -> u8 {
        self.0
    }

    /// Apply a signed delta, saturating at both ends.
    pub fn apply(self, points: i32) -> Score {
        Score::from(i64::from(self.0) + i64::from(points))
    }

    pub fn band(&self) -> ScoreBand {
        match self.0 {
            85..=100 => ScoreBand::Good,
            65..=84 => ScoreBand::Fair,
            _ => ScoreBand::Poor,
        }
    }
}

impl Default for Score {
    fn default() -> Self {
        Score::MAX
    }
}

impl From<i64> for Score {
    fn from(raw: i64) -> Self {
        Score(raw.clamp(0, 100) as u8)
    }
}

impl From<Score> for i64 {
    fn from(score: Score) -> Self {
        i64::from(score.0)
    }
}

/// Coarse rating used for colouring the score
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ScoreBand {
    Good,
    Fair,
    Poor,
}

/// What happened to a `record_event` call
#[derive(Debug, Clone, PartialEq)]
pub enum RecordOutcome {
    Recorded { event: DrivingEvent, score: Score },
    /// Score-affecting event while the trip was not active
    Gated,
}

impl RecordOutcome {
    pub fn is_recorded(&self) -> bool {
        matches!(self, RecordOutcome::Recorded { .. })
    }
}

/// Owns the score and event log of the current trip.
#[derive(Debug, Clone, Default)]
pub struct ScoringEngine {
    score: Score,
    log: EventLog,
    gated_drops: u64,
}

impl ScoringEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Resume from persisted values.
    pub fn restore(score: Score, log: EventLog) -> Self {
        Self {
            score,
            log,
            gated_drops: 0,
        }
    }

    pub fn score(&self) -> Score {
        self.score
    }

    pub fn log(&self) -> &EventLog {
        &self.log
    }

    pub fn gated_drops(&self) -> u64 {
        self.gated_drops
    }

    /// Back to a fresh trip: score 100, empty log.
    pub fn reset(&mut self) {
        self.score = Score::MAX;
        self.log.clear();
    }

    pub fn record_event(
        &mut self,
        trip_state: TripState,
        kind: EventKind,
        points: i32,
        magnitude: Option<f64>,
        duration: Option<f64>,
        now: f64,
    ) -> RecordOutcome {
        if !kind.is_informational() && !trip_state.is_active() {
            self.gated_drops += 1;
            log::debug!(
                "Event {} ignored: trip not active ({:?})",
                kind.label(),
                trip_state
            );
            return RecordOutcome::Gated;
        }

        let event = DrivingEvent::new(kind, points, now)
            .with_magnitude(magnitude)
            .with_duration(duration);

        if kind.is_score_affecting() {
            self.score = self.score.apply(points);
        }
        self.log.record(event.clone());

        log::info!("Event: {}, New Score: {}", event.description(), self.score.value());
        RecordOutcome::Recorded {
            event,
            score: self.score,
        }
    }
}
