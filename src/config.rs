use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{MonitorError, MonitorResult};

/// Units used for displayed speed and the posted limit
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SpeedUnit {
    #[default]
    Mph,
    Kmh,
}

impl SpeedUnit {
    /// Multiplier from m/s.
    pub fn factor(&self) -> f64 {
        match self {
            SpeedUnit::Mph => 2.23694,
            SpeedUnit::Kmh => 3.6,
        }
    }

    pub fn from_mps(&self, mps: f64) -> f64 {
        mps * self.factor()
    }

    pub fn to_mps(&self, value: f64) -> f64 {
        value / self.factor()
    }

    pub fn suffix(&self) -> &'static str {
        match self {
            SpeedUnit::Mph => "mph",
            SpeedUnit::Kmh => "km/h",
        }
    }
}

/// Thresholds, points and timer periods for event detection
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectorConfig {
    /// m/s², forward axis
    pub rapid_acceleration_threshold: f64,
    /// m/s², forward axis (negative)
    pub harsh_braking_threshold: f64,
    /// rad/s, yaw axis
    pub aggressive_turn_threshold: f64,
    /// Display units over the posted limit
    pub speeding_margin: f64,
    /// Seconds
    pub prolonged_speeding_after: f64,
    /// Seconds
    pub smooth_driving_interval: f64,
    /// Display units; below this a clean interval earns nothing
    pub smooth_driving_min_speed: f64,

    pub rapid_acceleration_points: i32,
    pub harsh_braking_points: i32,
    pub aggressive_turn_points: i32,
    pub aggressive_speeding_points: i32,
    pub prolonged_speeding_points: i32,
    pub smooth_driving_points: i32,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            rapid_acceleration_threshold: 2.5,
            harsh_braking_threshold: -3.0,
            aggressive_turn_threshold: 0.4,
            speeding_margin: 10.0,
            prolonged_speeding_after: 10.0,
            smooth_driving_interval: 15.0,
            smooth_driving_min_speed: 5.0,
            rapid_acceleration_points: -4,
            harsh_braking_points: -5,
            aggressive_turn_points: -3,
            aggressive_speeding_points: -2,
            prolonged_speeding_points: -5,
            smooth_driving_points: 1,
        }
    }
}

impl DetectorConfig {
    /// Longest timer period accepted, in seconds.
    pub const MAX_TIMER_PERIOD: f64 = 86_400.0;

    /// Thresholds must be finite; timer periods finite, positive and at most
    /// a day.
    pub fn validate(&self) -> MonitorResult<()> {
        let thresholds = [
            ("rapid_acceleration_threshold", self.rapid_acceleration_threshold),
            ("harsh_braking_threshold", self.harsh_braking_threshold),
            ("aggressive_turn_threshold", self.aggressive_turn_threshold),
            ("speeding_margin", self.speeding_margin),
            ("smooth_driving_min_speed", self.smooth_driving_min_speed),
        ];
        for (name, value) in thresholds {
            if !value.is_finite() {
                return Err(MonitorError::InvalidParameters(format!(
                    "{} must be finite, got {}",
                    name, value
                )));
            }
        }

        let periods = [
            ("prolonged_speeding_after", self.prolonged_speeding_after),
            ("smooth_driving_interval", self.smooth_driving_interval),
        ];
        for (name, value) in periods {
            if !(value > 0.0 && value <= Self::MAX_TIMER_PERIOD) {
                return Err(MonitorError::InvalidParameters(format!(
                    "{} must be in (0, {}] seconds, got {}",
                    name,
                    Self::MAX_TIMER_PERIOD,
                    value
                )));
            }
        }
        Ok(())
    }
}

/// Top-level monitor configuration, loadable from JSON
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitorConfig {
    pub detector: DetectorConfig,
    pub speed_unit: SpeedUnit,
    /// Display units; 0 disables speed-based detection
    pub default_speed_limit: f64,
    pub data_dir: PathBuf,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            detector: DetectorConfig::default(),
            speed_unit: SpeedUnit::Mph,
            default_speed_limit: 30.0,
            data_dir: PathBuf::from("drive_score_data"),
        }
    }
}

impl MonitorConfig {
    pub fn load(path: &Path) -> MonitorResult<Self> {
        let text = fs::read_to_string(path)?;
        let config: MonitorConfig = serde_json::from_str(&text).map_err(|e| {
            MonitorError::InvalidParameters(format!("{}: {}", path.display(), e))
        })?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> MonitorResult<()> {
        if !self.default_speed_limit.is_finite() {
            return Err(MonitorError::InvalidParameters(format!(
                "default_speed_limit must be finite, got {}",
                self.default_speed_limit
            )));
        }
        self.detector.validate()
    }

    pub fn save(&self, path: &Path) -> MonitorResult<()> {
        let json = serde_json::to_string_pretty(self)
            .map_err(|e| MonitorError::InvalidParameters(e.to_string()))?;
        fs::write(path, json)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_unit_conversion() {
        assert_relative_eq!(SpeedUnit::Mph.from_mps(10.0), 22.3694);
        assert_relative_eq!(SpeedUnit::Kmh.from_mps(10.0), 36.0);
        assert_relative_eq!(SpeedUnit::Mph.from_mps(SpeedUnit::Mph.to_mps(45.0)), 45.0);
    }

    #[test]
    fn test_partial_config_uses_defaults() {
        let config: MonitorConfig =
            serde_json::from_str(r#"{"speed_unit": "kmh", "detector": {"speeding_margin": 15.0}}"#)
                .unwrap();
        assert_eq!(config.speed_unit, SpeedUnit::Kmh);
        assert_eq!(config.detector.speeding_margin, 15.0);
        assert_eq!(config.detector.harsh_braking_points, -5);
        assert_eq!(config.default_speed_limit, 30.0);
    }

    #[test]
    fn test_config_file_round_trip() {
        let dir = std::env::temp_dir().join(format!("drive_score_cfg_{}", std::process::id()));
        fs::create_dir_all(&dir).unwrap();
        let path = dir.join("config.json");

        let mut config = MonitorConfig::default();
        config.default_speed_limit = 55.0;
        config.save(&path).unwrap();

        let loaded = MonitorConfig::load(&path).unwrap();
        assert_eq!(loaded, config);
        let _ = fs::remove_dir_all(&dir);
    }

    #[test]
    fn test_out_of_range_timer_periods_are_rejected() {
        let dir = std::env::temp_dir().join(format!("drive_score_bad_cfg_{}", std::process::id()));
        fs::create_dir_all(&dir).unwrap();
        let path = dir.join("config.json");

        fs::write(&path, r#"{"detector": {"smooth_driving_interval": 1e300}}"#).unwrap();
        let err = MonitorConfig::load(&path).unwrap_err();
        assert!(matches!(err, MonitorError::InvalidParameters(_)));

        fs::write(&path, r#"{"detector": {"prolonged_speeding_after": 0.0}}"#).unwrap();
        assert!(MonitorConfig::load(&path).is_err());

        fs::write(&path, r#"{"detector": {"prolonged_speeding_after": -3.0}}"#).unwrap();
        assert!(MonitorConfig::load(&path).is_err());

        fs::write(&path, r#"{"detector": {"smooth_driving_interval": 30.0}}"#).unwrap();
        assert_eq!(
            MonitorConfig::load(&path).unwrap().detector.smooth_driving_interval,
            30.0
        );
        let _ = fs::remove_dir_all(&dir);
    }

    #[test]
    fn test_default_config_is_valid() {
        assert!(MonitorConfig::default().validate().is_ok());

        let mut detector = DetectorConfig::default();
        detector.smooth_driving_interval = f64::NAN;
        assert!(detector.validate().is_err());
        detector.smooth_driving_interval = DetectorConfig::MAX_TIMER_PERIOD;
        assert!(detector.validate().is_ok());
    }
}
