use std::sync::{Arc, Mutex};
use std::time::{Instant, SystemTime, UNIX_EPOCH};

/// Source of "now" for the monitor, in seconds since the UNIX epoch.
///
/// Implementations must never go backwards.
pub trait Clock: Send + Sync {
    fn now(&self) -> f64;
}

/// Wall-clock anchored at construction and advanced by a monotonic `Instant`,
/// so NTP adjustments during a trip cannot reorder events.
#[derive(Debug, Clone)]
pub struct SystemClock {
    anchor_wall: f64,
    anchor: Instant,
}

impl SystemClock {
    pub fn new() -> Self {
        Self {
            anchor_wall: current_timestamp(),
            anchor: Instant::now(),
        }
    }
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for SystemClock {
    fn now(&self) -> f64 {
        self.anchor_wall + self.anchor.elapsed().as_secs_f64()
    }
}

/// Hand-driven clock for replays and tests.
#[derive(Debug, Clone, Default)]
pub struct ManualClock {
    now: Arc<Mutex<f64>>,
}

impl ManualClock {
    pub fn new(start: f64) -> Self {
        Self {
            now: Arc::new(Mutex::new(start)),
        }
    }

    /// Move the clock to `t`. Earlier values are ignored.
    pub fn set(&self, t: f64) {
        if let Ok(mut now) = self.now.lock() {
            if t > *now {
                *now = t;
            }
        }
    }

    pub fn advance(&self, secs: f64) {
        if let Ok(mut now) = self.now.lock() {
            *now += secs.max(0.0);
        }
    }
}

impl Clock for ManualClock {
    fn now(&self) -> f64 {
        self.now.lock().map(|t| *t).unwrap_or(0.0)
    }
}

pub fn current_timestamp() -> f64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs_f64()
}
