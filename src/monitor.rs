use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::clock::Clock;
use crate::config::MonitorConfig;
use crate::detector::{Detection, EventDetector};
use crate::error::{MonitorError, MonitorResult};
use crate::events::{EventKind, EventLog};
use crate::profile::UserProfile;
use crate::samples::{AccelSample, GyroSample, LocationSample, PermissionKind};
use crate::scoring::{RecordOutcome, Score, ScoringEngine};
use crate::sensors::{Permissions, SensorAvailability, SensorControl, SensorEvent};
use crate::snapshot::MonitorSnapshot;
use crate::storage::PersistenceGateway;
use crate::timer::{TimerKind, TimerToken};
use crate::trip::{TripState, TripTransition};

/// Counters for things the monitor drops on purpose
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Diagnostics {
    pub accel_samples: u64,
    pub gyro_samples: u64,
    pub location_samples: u64,
    /// Samples that arrived while the trip was not active
    pub ignored_samples: u64,
    /// Score-affecting events refused by the gate
    pub gated_drops: u64,
    /// Timer tokens that no longer matched their timer
    pub stale_timer_fires: u64,
    pub rejected_transitions: u64,
    pub save_failures: u64,
}

/// The single owner of trip state, score and event log.
///
/// Every method is a short synchronous step; callers are expected to
/// serialize access (see `runtime`).
pub struct DrivingMonitor {
    config: MonitorConfig,
    clock: Arc<dyn Clock>,
    state: TripState,
    scoring: ScoringEngine,
    detector: EventDetector,
    sensors: Box<dyn SensorControl>,
    storage: PersistenceGateway,
    profile: UserProfile,
    permissions: Permissions,
    availability: SensorAvailability,
    /// Display units
    current_speed: f64,
    /// Display units
    speed_limit: f64,
    last_location: Option<LocationSample>,
    final_score: Option<Score>,
    diagnostics: Diagnostics,
}

impl DrivingMonitor {
    /// Restore from persistence. A trip left active or paused by a previous
    /// process is closed as stopped.
    pub fn load(
        config: MonitorConfig,
        clock: Arc<dyn Clock>,
        storage: PersistenceGateway,
        sensors: Box<dyn SensorControl>,
    ) -> Self {
        let profile = storage.load_profile();
        let score = storage.load_score();
        let events = storage.load_events();
        let persisted = storage.load_trip_state();

        let state = persisted.recovered();
        if state != persisted {
            log::warn!(
                "Restarted during a {:?} trip, setting trip state to stopped",
                persisted
            );
            storage.save_trip_state(state);
        }

        let final_score = (state == TripState::Stopped).then_some(score);
        let detector = EventDetector::new(config.detector.clone());
        let speed_limit = config.default_speed_limit;

        log::info!(
            "Monitor loaded: state {:?}, score {}, {} events",
            state,
            score.value(),
            events.len()
        );

        Self {
            config,
            clock,
            state,
            scoring: ScoringEngine::restore(score, events),
            detector,
            sensors,
            storage,
            profile,
            permissions: Permissions::default(),
            availability: SensorAvailability::default(),
            current_speed: 0.0,
            speed_limit,
            last_location: None,
            final_score,
            diagnostics: Diagnostics::default(),
        }
    }

    // ---------------------------------------------------------------------
    // Trip lifecycle
    // ---------------------------------------------------------------------

    pub fn start_trip(&mut self) -> MonitorResult<()> {
        let next = self.check(TripTransition::Start)?;
        let now = self.clock.now();

        self.scoring.reset();
        self.current_speed = 0.0;
        self.last_location = None;
        self.final_score = None;
        self.detector.cancel_timers();
        self.record(EventKind::TripStart, 0, None, None, now);

        self.state = next;
        self.storage.save_trip_state(self.state);
        self.start_streams();
        self.detector.start_smooth_timer(now);

        log::info!("Trip started, score reset");
        Ok(())
    }

    pub fn pause_trip(&mut self) -> MonitorResult<()> {
        let next = self.check(TripTransition::Pause)?;
        let now = self.clock.now();

        self.state = next;
        self.record(EventKind::TripPause, 0, None, None, now);
        self.storage.save_trip_state(self.state);
        self.stop_streams();

        log::info!("Trip paused");
        Ok(())
    }

    pub fn resume_trip(&mut self) -> MonitorResult<()> {
        let next = self.check(TripTransition::Resume)?;
        let now = self.clock.now();

        self.state = next;
        self.record(EventKind::TripResume, 0, None, None, now);
        self.storage.save_trip_state(self.state);
        self.start_streams();
        self.detector.start_smooth_timer(now);

        log::info!("Trip resumed");
        Ok(())
    }

    pub fn stop_trip(&mut self) -> MonitorResult<()> {
        let next = self.check(TripTransition::Stop)?;
        let now = self.clock.now();

        self.record(EventKind::TripEnd, 0, None, None, now);
        let final_score = self.scoring.score();
        self.final_score = Some(final_score);
        self.state = next;
        self.storage.save_trip_state(self.state);
        self.stop_streams();

        self.storage
            .save_score_and_events(self.scoring.score(), self.scoring.log());
        self.storage.flush();

        log::info!("Trip stopped, final score {}", final_score.value());
        Ok(())
    }

    /// Wipe the current trip's score and events. Allowed from any state; an
    /// open trip is closed as stopped.
    pub fn reset_current_trip_data_and_score(&mut self) {
        self.scoring.reset();
        self.current_speed = 0.0;
        self.last_location = None;
        self.storage
            .save_score_and_events(self.scoring.score(), self.scoring.log());

        if self.state.is_in_progress() {
            let now = self.clock.now();
            self.stop_streams();
            self.state = TripState::Stopped;
            self.record(EventKind::TripEnd, 0, None, None, now);
            self.final_score = Some(self.scoring.score());
            self.storage.save_trip_state(self.state);
        }

        log::info!("Current trip data and score have been reset");
    }

    /// Display units; zero or less turns speed detection off.
    pub fn set_speed_limit(&mut self, limit: f64) -> MonitorResult<()> {
        if !limit.is_finite() {
            return Err(MonitorError::InvalidParameters(format!(
                "speed limit must be finite, got {}",
                limit
            )));
        }

        self.speed_limit = limit;
        if limit <= 0.0 {
            self.detector.cancel_timer(TimerKind::ProlongedSpeeding);
        }
        log::info!(
            "Speed limit set to {:.0} {}",
            limit,
            self.config.speed_unit.suffix()
        );
        Ok(())
    }

    pub fn update_profile(&mut self, profile: UserProfile) {
        self.storage.save_profile(&profile);
        self.profile = profile;
    }

    // ---------------------------------------------------------------------
    // Inbound samples and signals
    // ---------------------------------------------------------------------

    pub fn on_sensor_event(&mut self, event: SensorEvent) {
        match event {
            SensorEvent::Accel(sample) => self.on_acceleration_sample(&sample),
            SensorEvent::Gyro(sample) => self.on_rotation_sample(&sample),
            SensorEvent::Location(sample) => self.on_location_sample(&sample),
        }
    }

    pub fn on_acceleration_sample(&mut self, sample: &AccelSample) {
        if !self.accept_sample() {
            return;
        }
        self.diagnostics.accel_samples += 1;
        if let Some(detection) = self.detector.on_acceleration(sample) {
            self.record_detection(detection, self.clock.now());
        }
    }

    pub fn on_rotation_sample(&mut self, sample: &GyroSample) {
        if !self.accept_sample() {
            return;
        }
        self.diagnostics.gyro_samples += 1;
        if let Some(detection) = self.detector.on_rotation(sample) {
            self.record_detection(detection, self.clock.now());
        }
    }

    pub fn on_location_sample(&mut self, sample: &LocationSample) {
        if !self.accept_sample() {
            return;
        }
        self.diagnostics.location_samples += 1;
        self.last_location = Some(*sample);
        self.current_speed = self.config.speed_unit.from_mps(sample.valid_speed());

        let now = self.clock.now();
        if let Some(detection) = self
            .detector
            .on_speed(self.current_speed, self.speed_limit, now)
        {
            self.record_detection(detection, now);
        }
    }

    /// Revoking either permission during an active trip pauses it.
    pub fn on_permission_changed(&mut self, kind: PermissionKind, granted: bool) {
        self.permissions.set(kind, granted);

        if granted {
            if self.state.is_active() {
                self.start_streams();
            }
            return;
        }

        match self.state {
            TripState::Active => {
                log::warn!("{:?} permission revoked during an active trip, pausing", kind);
                if let Err(e) = self.pause_trip() {
                    log::warn!("Forced pause failed: {}", e);
                }
            }
            TripState::Paused => self.stop_streams(),
            _ => {}
        }
    }

    // ---------------------------------------------------------------------
    // Timers
    // ---------------------------------------------------------------------

    /// Earliest deadline the executor must wake up for.
    pub fn next_timer_deadline(&self) -> Option<f64> {
        self.detector.next_deadline()
    }

    /// Fire every timer due at `now`, oldest deadline first.
    pub fn fire_due_timers(&mut self, now: f64) -> usize {
        let mut fired = 0;
        while let Some(token) = self.detector.next_due(now) {
            if self.on_timer(token) {
                fired += 1;
            }
        }
        fired
    }

    /// Handle one timer firing. Stale tokens, and firings after the trip
    /// left the active state, are no-ops.
    pub fn on_timer(&mut self, token: TimerToken) -> bool {
        if !self.detector.accept(token) {
            self.diagnostics.stale_timer_fires += 1;
            log::debug!("Ignoring stale {:?} timer token", token.kind);
            return false;
        }

        if !self.state.is_active() {
            self.detector.cancel_timer(token.kind);
            return false;
        }

        let at = token.deadline;
        let detection = match token.kind {
            TimerKind::ProlongedSpeeding => self
                .detector
                .on_speeding_elapsed(self.current_speed, self.speed_limit),
            TimerKind::SmoothDriving => {
                self.detector
                    .on_smooth_interval(self.scoring.log(), self.current_speed, at)
            }
        };
        if let Some(detection) = detection {
            self.record_detection(detection, at);
        }
        true
    }

    // ---------------------------------------------------------------------
    // Scoring
    // ---------------------------------------------------------------------

    /// Record an event with the current time. Returns false when the gate
    /// dropped it.
    pub fn record_event(
        &mut self,
        kind: EventKind,
        points: i32,
        magnitude: Option<f64>,
        duration: Option<f64>,
    ) -> bool {
        let now = self.clock.now();
        self.record(kind, points, magnitude, duration, now)
    }

    fn record_detection(&mut self, detection: Detection, at: f64) -> bool {
        self.record(
            detection.kind,
            detection.points,
            detection.magnitude,
            detection.duration,
            at,
        )
    }

    fn record(
        &mut self,
        kind: EventKind,
        points: i32,
        magnitude: Option<f64>,
        duration: Option<f64>,
        at: f64,
    ) -> bool {
        let outcome = self
            .scoring
            .record_event(self.state, kind, points, magnitude, duration, at);
        match outcome {
            RecordOutcome::Recorded { .. } => {
                self.storage
                    .save_score_and_events(self.scoring.score(), self.scoring.log());
                true
            }
            RecordOutcome::Gated => false,
        }
    }

    // ---------------------------------------------------------------------
    // Observation
    // ---------------------------------------------------------------------

    pub fn now(&self) -> f64 {
        self.clock.now()
    }

    pub fn state(&self) -> TripState {
        self.state
    }

    pub fn score(&self) -> Score {
        self.scoring.score()
    }

    pub fn events(&self) -> &EventLog {
        self.scoring.log()
    }

    pub fn current_speed(&self) -> f64 {
        self.current_speed
    }

    pub fn speed_limit(&self) -> f64 {
        self.speed_limit
    }

    pub fn last_location(&self) -> Option<&LocationSample> {
        self.last_location.as_ref()
    }

    pub fn profile(&self) -> &UserProfile {
        &self.profile
    }

    pub fn permissions(&self) -> Permissions {
        self.permissions
    }

    pub fn sensor_availability(&self) -> SensorAvailability {
        self.availability
    }

    pub fn config(&self) -> &MonitorConfig {
        &self.config
    }

    pub fn status_message(&self) -> String {
        let score = self.final_score.unwrap_or_else(|| self.scoring.score());
        self.state.status_message(score.value())
    }

    pub fn diagnostics(&self) -> Diagnostics {
        Diagnostics {
            gated_drops: self.scoring.gated_drops(),
            save_failures: self.storage.save_failures(),
            ..self.diagnostics
        }
    }

    pub fn snapshot(&self) -> MonitorSnapshot {
        MonitorSnapshot::capture(self, self.clock.now())
    }

    // ---------------------------------------------------------------------

    fn check(&mut self, transition: TripTransition) -> MonitorResult<TripState> {
        self.state.apply(transition).map_err(|e| {
            self.diagnostics.rejected_transitions += 1;
            log::warn!("Trip cannot {} from current state: {:?}", transition.name(), self.state);
            e
        })
    }

    fn accept_sample(&mut self) -> bool {
        if self.state.is_active() {
            true
        } else {
            self.diagnostics.ignored_samples += 1;
            false
        }
    }

    fn start_streams(&mut self) {
        self.availability = self.sensors.start(self.permissions);
        if !self.availability.any() {
            log::warn!("No sensor streams available, trip runs without samples");
        }
    }

    fn stop_streams(&mut self) {
        self.sensors.stop();
        self.availability = SensorAvailability::default();
        self.detector.cancel_timers();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::config::SpeedUnit;
    use crate::storage::{MemoryStore, StoreKey};
    use approx::assert_relative_eq;
    use std::sync::Mutex;

    #[derive(Clone, Default)]
    struct RecordingSensors {
        calls: Arc<Mutex<Vec<&'static str>>>,
    }

    impl RecordingSensors {
        fn calls(&self) -> Vec<&'static str> {
            self.calls.lock().unwrap().clone()
        }
    }

    impl SensorControl for RecordingSensors {
        fn start(&mut self, permissions: Permissions) -> SensorAvailability {
            self.calls.lock().unwrap().push("start");
            SensorAvailability {
                accelerometer: permissions.motion,
                gyroscope: permissions.motion,
                location: permissions.location,
            }
        }

        fn stop(&mut self) {
            self.calls.lock().unwrap().push("stop");
        }
    }

    struct Harness {
        monitor: DrivingMonitor,
        clock: ManualClock,
        store: MemoryStore,
        sensors: RecordingSensors,
    }

    impl Harness {
        fn new() -> Self {
            Self::with_store(MemoryStore::new())
        }

        fn with_store(store: MemoryStore) -> Self {
            let clock = ManualClock::new(1_000.0);
            let sensors = RecordingSensors::default();
            let monitor = DrivingMonitor::load(
                MonitorConfig::default(),
                Arc::new(clock.clone()),
                PersistenceGateway::new(store.clone()),
                Box::new(sensors.clone()),
            );
            Self {
                monitor,
                clock,
                store,
                sensors,
            }
        }

        /// Move time forward, firing timers on the way like the executor does.
        fn advance_to(&mut self, t: f64) {
            self.monitor.fire_due_timers(t);
            self.clock.set(t);
        }

        fn speed_mph(&mut self, mph: f64) {
            let now = self.clock.now();
            let mps = SpeedUnit::Mph.to_mps(mph);
            self.monitor.on_location_sample(&LocationSample::new(mps, now));
        }

        fn count(&self, kind: EventKind) -> usize {
            self.monitor.events().count_of(kind)
        }
    }

    #[test]
    fn test_start_resets_score_and_log() {
        let mut h = Harness::new();
        h.monitor.start_trip().unwrap();
        h.monitor
            .on_acceleration_sample(&AccelSample::new(0.0, -4.0, 0.0, 0.0));
        h.monitor.stop_trip().unwrap();
        assert_eq!(h.monitor.score().value(), 95);

        h.monitor.start_trip().unwrap();
        assert_eq!(h.monitor.state(), TripState::Active);
        assert_eq!(h.monitor.score(), Score::MAX);
        assert_eq!(h.monitor.events().len(), 1);
        assert_eq!(h.monitor.events().latest().unwrap().kind, EventKind::TripStart);
    }

    #[test]
    fn test_start_while_running_is_noop() {
        let mut h = Harness::new();
        h.monitor.start_trip().unwrap();
        h.monitor
            .on_rotation_sample(&GyroSample::new(0.0, 0.0, 0.9, 0.0));
        let events_before = h.monitor.events().clone();

        let err = h.monitor.start_trip().unwrap_err();
        assert!(err.is_rejection());
        assert_eq!(h.monitor.score().value(), 97);
        assert_eq!(h.monitor.events(), &events_before);

        h.monitor.pause_trip().unwrap();
        let events_before = h.monitor.events().clone();
        assert!(h.monitor.start_trip().is_err());
        assert_eq!(h.monitor.state(), TripState::Paused);
        assert_eq!(h.monitor.events(), &events_before);
        assert_eq!(h.monitor.diagnostics().rejected_transitions, 2);
    }

    #[test]
    fn test_rejected_transitions() {
        let mut h = Harness::new();
        assert!(h.monitor.pause_trip().is_err());
        assert!(h.monitor.resume_trip().is_err());
        assert!(h.monitor.stop_trip().is_err());
        assert_eq!(h.monitor.state(), TripState::Idle);
        assert!(h.monitor.events().is_empty());
    }

    #[test]
    fn test_subscriptions_follow_active_boundaries() {
        let mut h = Harness::new();
        h.monitor.start_trip().unwrap();
        h.monitor.pause_trip().unwrap();
        h.monitor.resume_trip().unwrap();
        h.monitor.stop_trip().unwrap();
        assert_eq!(h.sensors.calls(), vec!["start", "stop", "start", "stop"]);
    }

    #[test]
    fn test_acceleration_and_turn_scoring() {
        let mut h = Harness::new();
        h.monitor.start_trip().unwrap();

        h.monitor
            .on_acceleration_sample(&AccelSample::new(0.0, 3.0, 0.0, 0.0));
        h.monitor
            .on_acceleration_sample(&AccelSample::new(0.0, -3.5, 0.0, 0.0));
        h.monitor
            .on_rotation_sample(&GyroSample::new(0.0, 0.0, -0.6, 0.0));
        h.monitor
            .on_acceleration_sample(&AccelSample::new(0.0, 1.0, 0.0, 0.0));

        assert_eq!(h.monitor.score().value(), 100 - 4 - 5 - 3);
        let latest = h.monitor.events().latest().unwrap();
        assert_eq!(latest.kind, EventKind::AggressiveRightTurn);
        assert_eq!(latest.magnitude, Some(-0.6));
    }

    #[test]
    fn test_prolonged_speeding_fires_at_ten_seconds() {
        let mut h = Harness::new();
        h.monitor.start_trip().unwrap();
        let t0 = h.clock.now();

        h.speed_mph(45.0);
        assert_eq!(h.count(EventKind::AggressiveSpeeding), 1);
        let speeding = h.monitor.events().latest().unwrap();
        assert_eq!(speeding.points, -2);
        assert_relative_eq!(speeding.magnitude.unwrap(), 15.0, epsilon = 1e-9);

        h.advance_to(t0 + 9.9);
        h.speed_mph(46.0);
        assert_eq!(h.count(EventKind::AggressiveSpeeding), 1);
        assert_eq!(h.count(EventKind::ProlongedSpeeding), 0);

        h.advance_to(t0 + 10.0);
        assert_eq!(h.count(EventKind::ProlongedSpeeding), 1);
        let prolonged = h.monitor.events().latest().unwrap();
        assert_eq!(prolonged.points, -5);
        assert_eq!(prolonged.duration, Some(10.0));
        assert_relative_eq!(prolonged.timestamp, t0 + 10.0);
        assert_relative_eq!(prolonged.magnitude.unwrap(), 16.0, epsilon = 1e-9);
        assert_eq!(h.monitor.score().value(), 93);

        // Handle cleared on fire; nothing else pending on that window
        h.advance_to(t0 + 14.0);
        assert_eq!(h.count(EventKind::ProlongedSpeeding), 1);
    }

    #[test]
    fn test_slowing_down_cancels_prolonged_speeding() {
        let mut h = Harness::new();
        h.monitor.start_trip().unwrap();
        let t0 = h.clock.now();

        h.speed_mph(45.0);
        h.advance_to(t0 + 1.0);
        h.speed_mph(20.0);

        h.advance_to(t0 + 30.0);
        assert_eq!(h.count(EventKind::ProlongedSpeeding), 0);
        assert_eq!(h.count(EventKind::AggressiveSpeeding), 1);
    }

    #[test]
    fn test_new_speeding_window_after_prolonged_fire() {
        let mut h = Harness::new();
        h.monitor.start_trip().unwrap();
        let t0 = h.clock.now();

        h.speed_mph(50.0);
        h.advance_to(t0 + 10.0);
        h.speed_mph(50.0);
        assert_eq!(h.count(EventKind::AggressiveSpeeding), 2);
    }

    #[test]
    fn test_pause_resume_drops_stale_timers() {
        let mut h = Harness::new();
        h.monitor.start_trip().unwrap();
        let t0 = h.clock.now();

        h.speed_mph(45.0);
        let stale_speeding = h.monitor.detector.next_due(f64::MAX).unwrap();
        let score = h.monitor.score();

        h.clock.set(t0 + 2.0);
        h.monitor.pause_trip().unwrap();
        h.monitor.resume_trip().unwrap();
        assert_eq!(h.monitor.score(), score);
        let kinds: Vec<_> = h.monitor.events().iter().take(2).map(|e| e.kind).collect();
        assert_eq!(kinds, vec![EventKind::TripResume, EventKind::TripPause]);

        // The token handed out before the pause can no longer fire
        assert!(!h.monitor.on_timer(stale_speeding));
        assert_eq!(h.monitor.diagnostics().stale_timer_fires, 1);

        // Old smooth deadline (t0 + 15) is gone; the new one is t0 + 17
        h.speed_mph(20.0);
        h.advance_to(t0 + 16.0);
        assert_eq!(h.count(EventKind::ProlongedSpeeding), 0);
        assert_eq!(h.count(EventKind::SmoothDriving), 0);
        assert_relative_eq!(h.monitor.next_timer_deadline().unwrap(), t0 + 17.0);
    }

    #[test]
    fn test_samples_ignored_when_not_active() {
        let mut h = Harness::new();
        h.monitor
            .on_acceleration_sample(&AccelSample::new(0.0, -5.0, 0.0, 0.0));
        assert!(h.monitor.events().is_empty());

        h.monitor.start_trip().unwrap();
        h.monitor.pause_trip().unwrap();
        let len = h.monitor.events().len();
        h.monitor
            .on_acceleration_sample(&AccelSample::new(0.0, -5.0, 0.0, 0.0));
        h.speed_mph(80.0);
        assert_eq!(h.monitor.events().len(), len);
        assert_eq!(h.monitor.score(), Score::MAX);
        assert_eq!(h.monitor.diagnostics().ignored_samples, 3);
        assert!(h.monitor.next_timer_deadline().is_none());
    }

    #[test]
    fn test_stop_freezes_score_and_log() {
        let mut h = Harness::new();
        h.monitor.start_trip().unwrap();
        h.monitor
            .on_acceleration_sample(&AccelSample::new(0.0, -3.5, 0.0, 0.0));
        h.monitor.stop_trip().unwrap();

        let frozen = h.monitor.events().clone();
        h.monitor
            .on_rotation_sample(&GyroSample::new(0.0, 0.0, 1.0, 0.0));
        h.speed_mph(90.0);
        h.advance_to(h.clock.now() + 60.0);

        assert_eq!(h.monitor.events(), &frozen);
        assert_eq!(h.monitor.score().value(), 95);
        assert_eq!(frozen.latest().unwrap().kind, EventKind::TripEnd);
        assert_eq!(
            h.monitor.status_message(),
            "Trip ended. Final Score: 95. Ready for new trip."
        );
    }

    #[test]
    fn test_gated_record_event_is_counted() {
        let mut h = Harness::new();
        assert!(!h.monitor.record_event(EventKind::PhoneUsage, -10, None, None));
        assert_eq!(h.monitor.diagnostics().gated_drops, 1);

        h.monitor.start_trip().unwrap();
        assert!(h.monitor.record_event(EventKind::PhoneUsage, -10, None, None));
        assert_eq!(h.monitor.score().value(), 90);
    }

    #[test]
    fn test_smooth_driving_once_per_window() {
        let mut h = Harness::new();
        h.monitor.start_trip().unwrap();
        let t0 = h.clock.now();
        h.speed_mph(25.0);

        h.advance_to(t0 + 14.9);
        assert_eq!(h.count(EventKind::SmoothDriving), 0);

        h.advance_to(t0 + 15.0);
        assert_eq!(h.count(EventKind::SmoothDriving), 1);

        h.advance_to(t0 + 29.0);
        assert_eq!(h.count(EventKind::SmoothDriving), 1);

        h.advance_to(t0 + 45.0);
        assert_eq!(h.count(EventKind::SmoothDriving), 3);
        assert_eq!(h.monitor.score(), Score::MAX);
    }

    #[test]
    fn test_smooth_driving_needs_clean_window_and_speed() {
        let mut h = Harness::new();
        h.monitor.start_trip().unwrap();
        let t0 = h.clock.now();

        // Parked: no bonus
        h.advance_to(t0 + 15.0);
        assert_eq!(h.count(EventKind::SmoothDriving), 0);

        h.speed_mph(30.0);
        h.clock.set(t0 + 20.0);
        h.monitor
            .on_acceleration_sample(&AccelSample::new(0.0, -3.5, 0.0, 0.0));

        // Braking at t0+20 spoils the window ending at t0+30
        h.advance_to(t0 + 30.0);
        assert_eq!(h.count(EventKind::SmoothDriving), 0);

        h.advance_to(t0 + 45.0);
        assert_eq!(h.count(EventKind::SmoothDriving), 1);
        assert_eq!(h.monitor.score().value(), 96);
    }

    #[test]
    fn test_zero_speed_limit_disables_speeding() {
        let mut h = Harness::new();
        h.monitor.start_trip().unwrap();
        h.speed_mph(45.0);
        assert!(h.monitor.detector.timers().speeding.is_pending());

        h.monitor.set_speed_limit(0.0).unwrap();
        assert!(!h.monitor.detector.timers().speeding.is_pending());
        h.speed_mph(100.0);
        assert_eq!(h.count(EventKind::AggressiveSpeeding), 1);

        assert!(h.monitor.set_speed_limit(f64::NAN).is_err());
        assert_eq!(h.monitor.speed_limit(), 0.0);
    }

    #[test]
    fn test_negative_speed_reads_as_zero() {
        let mut h = Harness::new();
        h.monitor.start_trip().unwrap();
        h.monitor
            .on_location_sample(&LocationSample::new(-1.0, 0.0));
        assert_eq!(h.monitor.current_speed(), 0.0);
        assert!(h.monitor.last_location().is_some());
    }

    #[test]
    fn test_reset_closes_open_trip() {
        let mut h = Harness::new();
        h.monitor.start_trip().unwrap();
        h.monitor
            .on_acceleration_sample(&AccelSample::new(0.0, -3.5, 0.0, 0.0));
        h.speed_mph(50.0);

        h.monitor.reset_current_trip_data_and_score();
        assert_eq!(h.monitor.state(), TripState::Stopped);
        assert_eq!(h.monitor.score(), Score::MAX);
        assert_eq!(h.monitor.events().len(), 1);
        assert_eq!(h.monitor.events().latest().unwrap().kind, EventKind::TripEnd);
        assert!(h.monitor.next_timer_deadline().is_none());
        assert_eq!(h.monitor.current_speed(), 0.0);
    }

    #[test]
    fn test_reset_when_idle_keeps_state() {
        let mut h = Harness::new();
        h.monitor.reset_current_trip_data_and_score();
        assert_eq!(h.monitor.state(), TripState::Idle);
        assert!(h.monitor.events().is_empty());
        assert!(h.store.contains(StoreKey::Score));
    }

    #[test]
    fn test_permission_revocation_pauses() {
        let mut h = Harness::new();
        h.monitor.start_trip().unwrap();
        h.monitor.on_permission_changed(PermissionKind::Location, false);
        assert_eq!(h.monitor.state(), TripState::Paused);
        assert_eq!(h.monitor.events().latest().unwrap().kind, EventKind::TripPause);

        // Resume with location still denied: motion streams only
        h.monitor.resume_trip().unwrap();
        assert!(!h.monitor.sensor_availability().location);
        assert!(h.monitor.sensor_availability().accelerometer);

        h.monitor.on_permission_changed(PermissionKind::Location, true);
        assert!(h.monitor.sensor_availability().location);

        h.monitor.on_permission_changed(PermissionKind::Motion, false);
        assert_eq!(h.monitor.state(), TripState::Paused);
    }

    #[test]
    fn test_permission_change_when_idle_keeps_state() {
        let mut h = Harness::new();
        h.monitor.on_permission_changed(PermissionKind::Motion, false);
        assert_eq!(h.monitor.state(), TripState::Idle);
        assert!(!h.monitor.permissions().motion);
    }

    #[test]
    fn test_reload_mid_trip_comes_back_stopped() {
        let store = MemoryStore::new();
        {
            let mut h = Harness::with_store(store.clone());
            h.monitor.start_trip().unwrap();
            h.monitor
                .on_acceleration_sample(&AccelSample::new(0.0, -3.5, 0.0, 0.0));
        }

        let h = Harness::with_store(store.clone());
        assert_eq!(h.monitor.state(), TripState::Stopped);
        assert_eq!(h.monitor.score().value(), 95);
        assert_eq!(h.monitor.events().len(), 2);
        assert!(h.sensors.calls().is_empty());
        assert_eq!(
            h.monitor.status_message(),
            "Trip ended. Final Score: 95. Ready for new trip."
        );

        // The correction itself was persisted
        let gateway = PersistenceGateway::new(store);
        assert_eq!(gateway.load_trip_state(), TripState::Stopped);
    }

    #[test]
    fn test_corrupt_storage_loads_defaults() {
        let store = MemoryStore::new();
        store.put_raw(StoreKey::TripState, b"\"driving\"");
        store.put_raw(StoreKey::Score, b"{oops");
        let h = Harness::with_store(store);
        assert_eq!(h.monitor.state(), TripState::Idle);
        assert_eq!(h.monitor.score(), Score::MAX);
        assert_eq!(
            h.monitor.status_message(),
            "Press 'Start Trip' to begin monitoring."
        );
    }

    #[test]
    fn test_profile_is_persisted() {
        let store = MemoryStore::new();
        let mut h = Harness::with_store(store.clone());
        h.monitor.update_profile(UserProfile {
            name: Some("Robin".to_string()),
            age: Some("41".to_string()),
            profile_image: None,
        });

        let h = Harness::with_store(store);
        assert_eq!(h.monitor.profile().display_name(), "Robin");
    }
}
