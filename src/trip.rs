use serde::{Deserialize, Serialize};

use crate::error::{MonitorError, MonitorResult};

/// Trip lifecycle state machine states
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TripState {
    /// Nothing recorded yet
    #[default]
    Idle,
    /// Detection and scoring running
    Active,
    /// Subscriptions and timers stopped, score and log kept
    Paused,
    /// Score and log frozen until the next start
    Stopped,
}

/// Explicit trip transitions
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TripTransition {
    Start,
    Pause,
    Resume,
    Stop,
}

impl TripTransition {
    pub fn name(&self) -> &'static str {
        match self {
            TripTransition::Start => "start",
            TripTransition::Pause => "pause",
            TripTransition::Resume => "resume",
            TripTransition::Stop => "stop",
        }
    }
}

impl TripState {
    /// Target state of `transition`, or the rejection reported to the caller.
    pub fn apply(self, transition: TripTransition) -> MonitorResult<TripState> {
        use TripState::*;
        use TripTransition::*;

        match (self, transition) {
            (Idle | Stopped, Start) => Ok(Active),
            (Active, Pause) => Ok(Paused),
            (Paused, Resume) => Ok(Active),
            (Active | Paused, Stop) => Ok(Stopped),
            (from, transition) => Err(MonitorError::InvalidTransition {
                operation: transition.name(),
                from,
            }),
        }
    }

    pub fn is_active(&self) -> bool {
        *self == TripState::Active
    }

    /// Active or paused: a trip is open.
    pub fn is_in_progress(&self) -> bool {
        matches!(self, TripState::Active | TripState::Paused)
    }

    /// A persisted in-progress state means the process died mid-trip; it is
    /// never resumed on load.
    pub fn recovered(self) -> TripState {
        if self.is_in_progress() {
            TripState::Stopped
        } else {
            self
        }
    }

    /// Status line shown to the driver.
    pub fn status_message(&self, score: u8) -> String {
        match self {
            TripState::Idle => "Press 'Start Trip' to begin monitoring.".to_string(),
            TripState::Active => "Trip in progress...".to_string(),
            TripState::Paused => "Trip paused. Press 'Resume' or 'Stop'.".to_string(),
            TripState::Stopped => format!(
                "Trip ended. Final Score: {}. Ready for new trip.",
                score
            ),
        }
    }
}
