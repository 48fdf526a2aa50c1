use serde::{Deserialize, Serialize};

/// Linear acceleration in the device frame, m/s² (gravity removed)
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AccelSample {
    pub x: f64,
    pub y: f64,
    pub z: f64,
    pub timestamp: f64,
}

impl AccelSample {
    pub fn new(x: f64, y: f64, z: f64, timestamp: f64) -> Self {
        Self { x, y, z, timestamp }
    }

    /// Forward axis for a phone mounted upright in portrait.
    pub fn longitudinal(&self) -> f64 {
        self.y
    }
}

/// Rotation rate in the device frame, rad/s
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GyroSample {
    pub x: f64,
    pub y: f64,
    pub z: f64,
    pub timestamp: f64,
}

impl GyroSample {
    pub fn new(x: f64, y: f64, z: f64, timestamp: f64) -> Self {
        Self { x, y, z, timestamp }
    }

    /// Positive is a left (counter-clockwise) turn.
    pub fn yaw_rate(&self) -> f64 {
        self.z
    }
}

/// Location fix; only the ground speed matters for scoring
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LocationSample {
    /// m/s as reported by the provider; may be negative when unknown
    pub speed: f64,
    #[serde(default)]
    pub latitude: Option<f64>,
    #[serde(default)]
    pub longitude: Option<f64>,
    pub timestamp: f64,
}

impl LocationSample {
    pub fn new(speed: f64, timestamp: f64) -> Self {
        Self {
            speed,
            latitude: None,
            longitude: None,
            timestamp,
        }
    }

    pub fn with_position(mut self, latitude: f64, longitude: f64) -> Self {
        self.latitude = Some(latitude);
        self.longitude = Some(longitude);
        self
    }

    /// Speed in m/s with invalid readings treated as standing still.
    pub fn valid_speed(&self) -> f64 {
        if self.speed.is_finite() && self.speed > 0.0 {
            self.speed
        } else {
            0.0
        }
    }
}

/// Sensor streams the monitor subscribes to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PermissionKind {
    Location,
    Motion,
}
