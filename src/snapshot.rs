use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

use crate::config::SpeedUnit;
use crate::events::DrivingEvent;
use crate::monitor::{Diagnostics, DrivingMonitor};
use crate::scoring::ScoreBand;
use crate::sensors::SensorAvailability;
use crate::trip::TripState;

/// Read-only view of the monitor published to observers after every command.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MonitorSnapshot {
    pub timestamp: f64,
    pub trip_state: TripState,
    pub status_message: String,
    pub score: u8,
    pub score_band: ScoreBand,
    // Speed, display units
    pub current_speed: f64,
    pub speed_limit: f64,
    pub speed_unit: SpeedUnit,
    pub driver_name: String,
    pub latest_notable: Option<DrivingEvent>,
    /// Newest first
    pub events: Vec<DrivingEvent>,
    pub sensors: SensorAvailability,
    pub diagnostics: Diagnostics,
}

impl MonitorSnapshot {
    pub fn capture(monitor: &DrivingMonitor, timestamp: f64) -> Self {
        let score = monitor.score();
        Self {
            timestamp,
            trip_state: monitor.state(),
            status_message: monitor.status_message(),
            score: score.value(),
            score_band: score.band(),
            current_speed: monitor.current_speed(),
            speed_limit: monitor.speed_limit(),
            speed_unit: monitor.config().speed_unit,
            driver_name: monitor.profile().display_name().to_string(),
            latest_notable: monitor.events().latest_notable().cloned(),
            events: monitor.events().snapshot(),
            sensors: monitor.sensor_availability(),
            diagnostics: monitor.diagnostics(),
        }
    }

    /// One-line summary for console output.
    pub fn summary(&self) -> String {
        let latest = self
            .latest_notable
            .as_ref()
            .map(DrivingEvent::description)
            .unwrap_or_else(|| "-".to_string());
        format!(
            "[{:?}] score {} ({:?}) | {:.1}/{:.0} {} | events {} | last: {}",
            self.trip_state,
            self.score,
            self.score_band,
            self.current_speed,
            self.speed_limit,
            self.speed_unit.suffix(),
            self.events.len(),
            latest
        )
    }

    pub fn save(&self, path: impl AsRef<Path>) -> std::io::Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        fs::write(path, json)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::config::MonitorConfig;
    use crate::events::EventKind;
    use crate::samples::AccelSample;
    use crate::sensors::NoSensors;
    use crate::storage::{MemoryStore, PersistenceGateway};
    use std::sync::Arc;

    fn monitor() -> DrivingMonitor {
        DrivingMonitor::load(
            MonitorConfig::default(),
            Arc::new(ManualClock::new(50.0)),
            PersistenceGateway::new(MemoryStore::new()),
            Box::new(NoSensors),
        )
    }

    #[test]
    fn test_snapshot_reflects_trip() {
        let mut monitor = monitor();
        let idle = monitor.snapshot();
        assert_eq!(idle.trip_state, TripState::Idle);
        assert_eq!(idle.score, 100);
        assert_eq!(idle.driver_name, "Driver");
        assert!(idle.latest_notable.is_none());

        monitor.start_trip().unwrap();
        monitor.on_acceleration_sample(&AccelSample::new(0.0, -3.4, 0.0, 50.0));
        monitor.pause_trip().unwrap();

        let paused = monitor.snapshot();
        assert_eq!(paused.status_message, "Trip paused. Press 'Resume' or 'Stop'.");
        assert_eq!(paused.score, 95);
        assert_eq!(paused.score_band, ScoreBand::Good);
        assert_eq!(paused.events.len(), 3);
        assert_eq!(paused.events[0].kind, EventKind::TripPause);
        // Pause marker is not notable; the braking event is
        assert_eq!(
            paused.latest_notable.as_ref().map(|e| e.kind),
            Some(EventKind::HarshBraking)
        );
        assert!(paused.summary().contains("Harsh Braking: -5 pts"));
    }

    #[test]
    fn test_snapshot_save_writes_json() {
        let dir = std::env::temp_dir().join(format!("drive_score_snapshot_{}", std::process::id()));
        fs::create_dir_all(&dir).unwrap();
        let path = dir.join("status.json");

        monitor().snapshot().save(&path).unwrap();
        let back: MonitorSnapshot =
            serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(back.trip_state, TripState::Idle);
        assert_eq!(back.speed_unit, SpeedUnit::Mph);

        fs::remove_dir_all(&dir).ok();
    }
}
