// Driving score engine
// Trip lifecycle, event detection and a bounded 0-100 score

pub mod clock;
pub mod config;
pub mod detector;
pub mod error;
pub mod events;
pub mod monitor;
pub mod profile;
pub mod runtime;
pub mod samples;
pub mod scoring;
pub mod sensors;
pub mod snapshot;
pub mod storage;
pub mod timer;
pub mod trip;

pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{DetectorConfig, MonitorConfig, SpeedUnit};
pub use error::{MonitorError, MonitorResult};
pub use events::{DrivingEvent, EventKind, EventLog};
pub use monitor::{Diagnostics, DrivingMonitor};
pub use profile::UserProfile;
pub use runtime::{spawn_monitor, MonitorHandle};
pub use samples::{AccelSample, GyroSample, LocationSample, PermissionKind};
pub use scoring::{Score, ScoreBand};
pub use sensors::{NoSensors, SensorControl, SensorEvent, SensorSource, TaskSensorHub};
pub use snapshot::MonitorSnapshot;
pub use storage::{BackgroundStore, FileStore, MemoryStore, Persistence, PersistenceGateway};
pub use trip::TripState;
