use std::collections::VecDeque;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Closed set of driving event kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventKind {
    // Negative behaviours
    HarshBraking,
    RapidAcceleration,
    AggressiveLeftTurn,
    AggressiveRightTurn,
    AggressiveSpeeding,
    ProlongedSpeeding,
    SuddenLaneChange,
    PhoneUsage,

    // Positive behaviours
    SmoothDriving,
    AdherenceToSpeedLimit,
    GentleManeuver,
    MaintainingSafeDistance,
    EfficientAcceleration,

    // Trip lifecycle markers
    TripStart,
    TripEnd,
    TripPause,
    TripResume,
}

impl EventKind {
    pub const ALL: [EventKind; 17] = [
        EventKind::HarshBraking,
        EventKind::RapidAcceleration,
        EventKind::AggressiveLeftTurn,
        EventKind::AggressiveRightTurn,
        EventKind::AggressiveSpeeding,
        EventKind::ProlongedSpeeding,
        EventKind::SuddenLaneChange,
        EventKind::PhoneUsage,
        EventKind::SmoothDriving,
        EventKind::AdherenceToSpeedLimit,
        EventKind::GentleManeuver,
        EventKind::MaintainingSafeDistance,
        EventKind::EfficientAcceleration,
        EventKind::TripStart,
        EventKind::TripEnd,
        EventKind::TripPause,
        EventKind::TripResume,
    ];

    pub fn label(&self) -> &'static str {
        match self {
            EventKind::HarshBraking => "Harsh Braking",
            EventKind::RapidAcceleration => "Rapid Acceleration",
            EventKind::AggressiveLeftTurn => "Aggressive Left Turn",
            EventKind::AggressiveRightTurn => "Aggressive Right Turn",
            EventKind::AggressiveSpeeding => "Aggressive Speeding",
            EventKind::ProlongedSpeeding => "Prolonged Speeding",
            EventKind::SuddenLaneChange => "Sudden Lane Change",
            EventKind::PhoneUsage => "Phone Usage",
            EventKind::SmoothDriving => "Smooth Driving Interval",
            EventKind::AdherenceToSpeedLimit => "Speed Limit Adherence",
            EventKind::GentleManeuver => "Gentle Maneuver",
            EventKind::MaintainingSafeDistance => "Safe Following Distance",
            EventKind::EfficientAcceleration => "Efficient Acceleration",
            EventKind::TripStart => "Trip Started",
            EventKind::TripEnd => "Trip Ended",
            EventKind::TripPause => "Trip Paused",
            EventKind::TripResume => "Trip Resumed",
        }
    }

    /// Lifecycle markers: recorded regardless of trip state, never scored.
    pub fn is_informational(&self) -> bool {
        matches!(
            self,
            EventKind::TripStart | EventKind::TripEnd | EventKind::TripPause | EventKind::TripResume
        )
    }

    pub fn is_score_affecting(&self) -> bool {
        !self.is_informational()
    }
}

/// One timestamped, scored classification of driver behaviour
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DrivingEvent {
    pub id: Uuid,
    pub kind: EventKind,
    pub points: i32,
    pub timestamp: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub magnitude: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration: Option<f64>,
}

impl DrivingEvent {
    pub fn new(kind: EventKind, points: i32, timestamp: f64) -> Self {
        Self {
            id: Uuid::new_v4(),
            kind,
            points,
            timestamp,
            magnitude: None,
            duration: None,
        }
    }

    pub fn with_magnitude(mut self, magnitude: Option<f64>) -> Self {
        self.magnitude = magnitude;
        self
    }

    pub fn with_duration(mut self, duration: Option<f64>) -> Self {
        self.duration = duration;
        self
    }

    pub fn is_negative(&self) -> bool {
        self.points < 0
    }

    /// e.g. `Harsh Braking: -5 pts`
    pub fn description(&self) -> String {
        let sign = if self.points > 0 { "+" } else { "" };
        format!("{}: {}{} pts", self.kind.label(), sign, self.points)
    }
}

/// Emitted events, most recent first.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EventLog {
    events: VecDeque<DrivingEvent>,
}

impl EventLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Prepend; the newest event is always at index 0.
    pub fn record(&mut self, event: DrivingEvent) {
        self.events.push_front(event);
    }

    pub fn clear(&mut self) {
        self.events.clear();
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    pub fn latest(&self) -> Option<&DrivingEvent> {
        self.events.front()
    }

    pub fn iter(&self) -> impl DoubleEndedIterator<Item = &DrivingEvent> {
        self.events.iter()
    }

    pub fn snapshot(&self) -> Vec<DrivingEvent> {
        self.events.iter().cloned().collect()
    }

    /// Any negative-point event strictly after `cutoff`.
    pub fn has_negative_since(&self, cutoff: f64) -> bool {
        self.events
            .iter()
            .take_while(|e| e.timestamp > cutoff)
            .any(DrivingEvent::is_negative)
    }

    /// Most recent event worth surfacing to the driver: anything but the
    /// start/pause/resume markers.
    pub fn latest_notable(&self) -> Option<&DrivingEvent> {
        self.events.iter().find(|e| {
            !matches!(
                e.kind,
                EventKind::TripStart | EventKind::TripPause | EventKind::TripResume
            )
        })
    }

    pub fn count_of(&self, kind: EventKind) -> usize {
        self.events.iter().filter(|e| e.kind == kind).count()
    }
}

impl From<Vec<DrivingEvent>> for EventLog {
    fn from(events: Vec<DrivingEvent>) -> Self {
        Self {
            events: events.into(),
        }
    }
}
