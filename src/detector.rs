use crate::config::DetectorConfig;
use crate::events::{EventKind, EventLog};
use crate::samples::{AccelSample, GyroSample};
use crate::timer::{TimerKind, TimerToken, TripTimers};

/// A classified driving behaviour, not yet recorded
#[derive(Debug, Clone, PartialEq)]
pub struct Detection {
    pub kind: EventKind,
    pub points: i32,
    pub magnitude: Option<f64>,
    pub duration: Option<f64>,
}

impl Detection {
    fn new(kind: EventKind, points: i32) -> Self {
        Self {
            kind,
            points,
            magnitude: None,
            duration: None,
        }
    }

    fn magnitude(mut self, value: f64) -> Self {
        self.magnitude = Some(value);
        self
    }
}

/// Classifies samples into driving events.
///
/// Accelerometer and gyroscope samples are judged one at a time. Speed is
/// stateful: the first over-limit fix arms the prolonged-speeding one-shot,
/// and the smooth-driving repeating timer lives here as well. The detector
/// does not know the trip state; the caller gates its output.
#[derive(Debug, Clone)]
pub struct EventDetector {
    config: DetectorConfig,
    timers: TripTimers,
}

impl EventDetector {
    pub fn new(config: DetectorConfig) -> Self {
        Self {
            config,
            timers: TripTimers::new(),
        }
    }

    pub fn timers(&self) -> &TripTimers {
        &self.timers
    }

    pub fn on_acceleration(&self, sample: &AccelSample) -> Option<Detection> {
        let forward = sample.longitudinal();

        // Disjoint ranges, at most one fires
        if forward > self.config.rapid_acceleration_threshold {
            return Some(
                Detection::new(
                    EventKind::RapidAcceleration,
                    self.config.rapid_acceleration_points,
                )
                .magnitude(forward),
            );
        }
        if forward < self.config.harsh_braking_threshold {
            return Some(
                Detection::new(EventKind::HarshBraking, self.config.harsh_braking_points)
                    .magnitude(forward),
            );
        }
        None
    }

    pub fn on_rotation(&self, sample: &GyroSample) -> Option<Detection> {
        let yaw = sample.yaw_rate();
        if yaw.abs() <= self.config.aggressive_turn_threshold {
            return None;
        }

        let kind = if yaw > 0.0 {
            EventKind::AggressiveLeftTurn
        } else {
            EventKind::AggressiveRightTurn
        };
        Some(Detection::new(kind, self.config.aggressive_turn_points).magnitude(yaw))
    }

    /// Feed a speed reading (display units). Returns `AggressiveSpeeding`
    /// when a new speeding window opens.
    pub fn on_speed(&mut self, speed: f64, limit: f64, now: f64) -> Option<Detection> {
        if limit <= 0.0 {
            self.timers.speeding.cancel();
            return None;
        }

        if !self.is_speeding(speed, limit) {
            if self.timers.speeding.is_pending() {
                log::debug!("Speed back under limit, prolonged-speeding timer cancelled");
                self.timers.speeding.cancel();
            }
            return None;
        }

        if self.timers.speeding.is_pending() {
            return None;
        }

        let after = self.config.prolonged_speeding_after;
        if after > 0.0 && after.is_finite() {
            self.timers.speeding.arm_once(now, after);
        } else {
            log::warn!("Prolonged-speeding delay {} out of range, timer not started", after);
        }
        Some(
            Detection::new(
                EventKind::AggressiveSpeeding,
                self.config.aggressive_speeding_points,
            )
            .magnitude(speed - limit),
        )
    }

    /// The prolonged-speeding one-shot fired; still speeding?
    pub fn on_speeding_elapsed(&self, speed: f64, limit: f64) -> Option<Detection> {
        if limit <= 0.0 || !self.is_speeding(speed, limit) {
            return None;
        }

        let mut detection = Detection::new(
            EventKind::ProlongedSpeeding,
            self.config.prolonged_speeding_points,
        )
        .magnitude(speed - limit);
        detection.duration = Some(self.config.prolonged_speeding_after);
        Some(detection)
    }

    /// The smooth-driving interval elapsed at `now`.
    pub fn on_smooth_interval(&self, log: &EventLog, speed: f64, now: f64) -> Option<Detection> {
        let window_start = now - self.config.smooth_driving_interval;
        if log.has_negative_since(window_start) || speed <= self.config.smooth_driving_min_speed {
            return None;
        }
        Some(Detection::new(
            EventKind::SmoothDriving,
            self.config.smooth_driving_points,
        ))
    }

    pub fn start_smooth_timer(&mut self, now: f64) {
        let interval = self.config.smooth_driving_interval;
        if !(interval > 0.0 && interval.is_finite()) {
            log::warn!("Smooth-driving interval {} out of range, timer not started", interval);
            return;
        }
        self.timers
            .smooth
            .arm_repeating(now, self.config.smooth_driving_interval);
    }

    pub fn cancel_timers(&mut self) {
        self.timers.cancel_all();
    }

    pub fn cancel_timer(&mut self, kind: TimerKind) {
        self.timers.get_mut(kind).cancel();
    }

    pub fn next_deadline(&self) -> Option<f64> {
        self.timers.next_deadline()
    }

    pub fn next_due(&self, now: f64) -> Option<TimerToken> {
        self.timers.next_due(now)
    }

    /// Validate and consume a firing token.
    pub fn accept(&mut self, token: TimerToken) -> bool {
        self.timers.get_mut(token.kind).accept(token)
    }

    fn is_speeding(&self, speed: f64, limit: f64) -> bool {
        speed > limit + self.config.speeding_margin
    }
}

impl Default for EventDetector {
    fn default() -> Self {
        Self::new(DetectorConfig::default())
    }
}
