use std::process::Command;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::mpsc::Sender;
use tokio::task::JoinHandle;
use tokio::time::{interval, Duration};

use crate::clock::current_timestamp;
use crate::samples::{AccelSample, GyroSample, LocationSample, PermissionKind};

/// One sample from any stream
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum SensorEvent {
    Accel(AccelSample),
    Gyro(GyroSample),
    Location(LocationSample),
}

/// Which streams the driver has allowed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Permissions {
    pub location: bool,
    pub motion: bool,
}

impl Permissions {
    pub fn set(&mut self, kind: PermissionKind, granted: bool) {
        match kind {
            PermissionKind::Location => self.location = granted,
            PermissionKind::Motion => self.motion = granted,
        }
    }

    pub fn granted(&self, kind: PermissionKind) -> bool {
        match kind {
            PermissionKind::Location => self.location,
            PermissionKind::Motion => self.motion,
        }
    }
}

impl Default for Permissions {
    fn default() -> Self {
        Self {
            location: true,
            motion: true,
        }
    }
}

/// Streams that actually came up
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SensorAvailability {
    pub accelerometer: bool,
    pub gyroscope: bool,
    pub location: bool,
}

impl SensorAvailability {
    pub fn any(&self) -> bool {
        self.accelerometer || self.gyroscope || self.location
    }
}

/// Starts and stops the sample streams on behalf of the trip state machine.
pub trait SensorControl: Send {
    /// Start whatever `permissions` allow. Streams that cannot start are
    /// reported as unavailable, never as an error.
    fn start(&mut self, permissions: Permissions) -> SensorAvailability;

    fn stop(&mut self);
}

/// Sensor control that never produces samples; replays push samples directly.
#[derive(Debug, Default)]
pub struct NoSensors;

impl SensorControl for NoSensors {
    fn start(&mut self, _permissions: Permissions) -> SensorAvailability {
        SensorAvailability::default()
    }

    fn stop(&mut self) {}
}

/// Where the hub reads samples from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SensorSource {
    /// Probe `termux-sensor`/`termux-location`, simulate what is missing
    Auto,
    Termux,
    Simulated,
}

/// Spawns one tokio task per stream that pushes samples into `tx`.
pub struct TaskSensorHub {
    tx: Sender<SensorEvent>,
    source: SensorSource,
    tasks: Vec<JoinHandle<()>>,
}

impl TaskSensorHub {
    pub fn new(tx: Sender<SensorEvent>, source: SensorSource) -> Self {
        Self {
            tx,
            source,
            tasks: Vec::new(),
        }
    }

    pub fn running_streams(&self) -> usize {
        self.tasks.iter().filter(|t| !t.is_finished()).count()
    }

    fn use_termux(&self, detect: fn() -> bool) -> bool {
        match self.source {
            SensorSource::Termux => true,
            SensorSource::Simulated => false,
            SensorSource::Auto => detect(),
        }
    }
}

impl SensorControl for TaskSensorHub {
    fn start(&mut self, permissions: Permissions) -> SensorAvailability {
        self.stop();
        let mut availability = SensorAvailability::default();

        if permissions.motion {
            let termux = self.use_termux(|| read_linear_acceleration().is_some());
            self.tasks.push(tokio::spawn(accel_loop(self.tx.clone(), termux)));
            self.tasks.push(tokio::spawn(gyro_loop(self.tx.clone(), termux)));
            availability.accelerometer = true;
            availability.gyroscope = true;
        } else {
            log::warn!("Motion permission not granted, accelerometer and gyroscope disabled");
        }

        if permissions.location {
            let termux = self.use_termux(|| read_location().is_some());
            self.tasks.push(tokio::spawn(location_loop(self.tx.clone(), termux)));
            availability.location = true;
        } else {
            log::warn!("Location permission not granted, speed detection disabled");
        }

        log::info!("Sensor streams started: {:?}", availability);
        availability
    }

    fn stop(&mut self) {
        if self.tasks.is_empty() {
            return;
        }
        for task in self.tasks.drain(..) {
            task.abort();
        }
        log::info!("Sensor streams stopped");
    }
}

impl Drop for TaskSensorHub {
    fn drop(&mut self) {
        for task in self.tasks.drain(..) {
            task.abort();
        }
    }
}

/// Push into the channel, dropping the sample if the monitor is backed up.
/// Returns false once the receiver is gone.
fn push(tx: &Sender<SensorEvent>, event: SensorEvent, stream: &str, count: &mut u64) -> bool {
    match tx.try_send(event) {
        Ok(_) => {
            *count += 1;
            if *count % 100 == 0 {
                log::debug!("[{}] {} samples", stream, count);
            }
            true
        }
        Err(TrySendError::Closed(_)) => {
            log::debug!("[{}] Channel closed after {} samples", stream, count);
            false
        }
        Err(TrySendError::Full(_)) => true,
    }
}

async fn accel_loop(tx: Sender<SensorEvent>, termux: bool) {
    let mut interval = interval(Duration::from_millis(100)); // ~10Hz sampling
    let mut sim = SimulatedDrive::new();
    let mut count = 0u64;

    loop {
        interval.tick().await;
        let sample = termux
            .then(read_linear_acceleration)
            .flatten()
            .unwrap_or_else(|| sim.accel(current_timestamp()));
        if !push(&tx, SensorEvent::Accel(sample), "accel", &mut count) {
            break;
        }
    }
}

async fn gyro_loop(tx: Sender<SensorEvent>, termux: bool) {
    let mut interval = interval(Duration::from_millis(100)); // ~10Hz sampling
    let mut sim = SimulatedDrive::new();
    let mut count = 0u64;

    loop {
        interval.tick().await;
        let sample = termux
            .then(read_gyroscope)
            .flatten()
            .unwrap_or_else(|| sim.gyro(current_timestamp()));
        if !push(&tx, SensorEvent::Gyro(sample), "gyro", &mut count) {
            break;
        }
    }
}

async fn location_loop(tx: Sender<SensorEvent>, termux: bool) {
    let mut interval = interval(Duration::from_secs(1));
    let mut sim = SimulatedDrive::new();
    let mut count = 0u64;

    loop {
        interval.tick().await;
        let sample = termux
            .then(read_location)
            .flatten()
            .unwrap_or_else(|| sim.location(current_timestamp()));
        if !push(&tx, SensorEvent::Location(sample), "location", &mut count) {
            break;
        }
    }
}

fn read_linear_acceleration() -> Option<AccelSample> {
    let [x, y, z] = read_termux_sensor("linear_acceleration")?;
    Some(AccelSample::new(x, y, z, current_timestamp()))
}

fn read_gyroscope() -> Option<GyroSample> {
    let [x, y, z] = read_termux_sensor("gyroscope")?;
    Some(GyroSample::new(x, y, z, current_timestamp()))
}

fn read_termux_sensor(name: &str) -> Option<[f64; 3]> {
    let output = Command::new("termux-sensor")
        .args(["-n", "1", "-s", name])
        .output()
        .ok()?;
    if !output.status.success() {
        return None;
    }
    parse_sensor_values(&String::from_utf8_lossy(&output.stdout))
}

fn read_location() -> Option<LocationSample> {
    let output = Command::new("termux-location")
        .args(["-p", "gps", "-r", "last"])
        .output()
        .ok()?;
    if !output.status.success() {
        return None;
    }
    parse_location(&String::from_utf8_lossy(&output.stdout))
}

/// termux-sensor prints `{"<Sensor Name>": {"values": [x, y, z]}}`.
fn parse_sensor_values(output: &str) -> Option<[f64; 3]> {
    let json: Value = serde_json::from_str(output).ok()?;
    let values = json
        .as_object()?
        .values()
        .find_map(|sensor| sensor.get("values"))?
        .as_array()?;
    if values.len() < 3 {
        return None;
    }
    Some([
        values[0].as_f64()?,
        values[1].as_f64()?,
        values[2].as_f64()?,
    ])
}

fn parse_location(output: &str) -> Option<LocationSample> {
    let json: Value = serde_json::from_str(output).ok()?;
    let speed = json.get("speed")?.as_f64()?;
    let mut sample = LocationSample::new(speed, current_timestamp());
    if let (Some(lat), Some(lon)) = (
        json.get("latitude").and_then(Value::as_f64),
        json.get("longitude").and_then(Value::as_f64),
    ) {
        sample = sample.with_position(lat, lon);
    }
    Some(sample)
}

/// Synthetic two-minute drive cycle: pull away, cruise, speed, brake.
struct SimulatedDrive {
    start: f64,
}

impl SimulatedDrive {
    const CYCLE: f64 = 120.0;

    fn new() -> Self {
        Self {
            start: current_timestamp(),
        }
    }

    fn phase(&self, now: f64) -> f64 {
        (now - self.start).rem_euclid(Self::CYCLE)
    }

    /// m/s
    fn speed(&self, now: f64) -> f64 {
        let t = self.phase(now);
        match t {
            t if t < 10.0 => t * 1.5,
            t if t < 60.0 => 15.0 + (t * 0.3).sin(),
            t if t < 80.0 => 15.0 + (t - 60.0) * 0.4,
            t if t < 84.0 => 23.0 - (t - 80.0) * 3.5,
            _ => 9.0,
        }
    }

    fn accel(&mut self, now: f64) -> AccelSample {
        let t = self.phase(now);
        let forward = match t {
            t if t < 10.0 => 1.5,
            t if (80.0..84.0).contains(&t) => -3.5,
            _ => (t * 2.0).sin() * 0.3,
        };
        AccelSample::new((t * 1.7).sin() * 0.2, forward, (t * 0.9).cos() * 0.1, now)
    }

    fn gyro(&mut self, now: f64) -> GyroSample {
        let t = self.phase(now);
        let yaw = if (100.0..102.0).contains(&t) {
            0.55
        } else {
            (t * 0.5).sin() * 0.05
        };
        GyroSample::new(0.01, -0.01, yaw, now)
    }

    fn location(&mut self, now: f64) -> LocationSample {
        LocationSample::new(self.speed(now), now)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_termux_sensor_json() {
        let output = r#"{"LSM6DSO Linear Acceleration": {"values": [0.12, -3.4, 0.05]}}"#;
        assert_eq!(parse_sensor_values(output), Some([0.12, -3.4, 0.05]));
        assert_eq!(parse_sensor_values("{}"), None);
        assert_eq!(parse_sensor_values("not json"), None);
    }

    #[test]
    fn test_parse_location_json() {
        let output = r#"{"latitude": 37.77, "longitude": -122.41, "speed": 13.2, "accuracy": 4.0}"#;
        let fix = parse_location(output).unwrap();
        assert_eq!(fix.speed, 13.2);
        assert_eq!(fix.latitude, Some(37.77));
        assert!(parse_location(r#"{"latitude": 1.0}"#).is_none());
    }

    #[test]
    fn test_permissions() {
        let mut permissions = Permissions::default();
        assert!(permissions.granted(PermissionKind::Location));
        permissions.set(PermissionKind::Motion, false);
        assert!(!permissions.granted(PermissionKind::Motion));
        assert!(permissions.granted(PermissionKind::Location));
    }

    #[test]
    fn test_simulated_drive_has_speeding_and_braking() {
        let sim = SimulatedDrive { start: 0.0 };
        assert!(sim.speed(70.0) > 20.0);

        let mut sim = SimulatedDrive { start: 0.0 };
        assert!(sim.accel(81.0).y < -3.0);
        assert!(sim.gyro(101.0).z > 0.4);
    }

    #[tokio::test]
    async fn test_hub_starts_and_stops_streams() {
        let (tx, mut rx) = tokio::sync::mpsc::channel(64);
        let mut hub = TaskSensorHub::new(tx, SensorSource::Simulated);

        let availability = hub.start(Permissions {
            location: false,
            motion: true,
        });
        assert!(availability.accelerometer);
        assert!(!availability.location);
        assert_eq!(hub.running_streams(), 2);

        assert!(rx.recv().await.is_some());
        hub.stop();
        assert_eq!(hub.tasks.len(), 0);
    }
}
