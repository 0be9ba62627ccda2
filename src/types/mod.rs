use serde::{Deserialize, Serialize};

/// One reported position from the platform location source
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PositionFix {
    pub timestamp: f64,
    pub latitude: f64,
    pub longitude: f64,
    /// Instantaneous speed in m/s, absent when the source cannot measure it
    pub speed_mps: Option<f64>,
}

impl PositionFix {
    pub fn new(latitude: f64, longitude: f64, speed_mps: Option<f64>, timestamp: f64) -> Self {
        Self {
            timestamp,
            latitude,
            longitude,
            speed_mps,
        }
    }

    /// Speed in km/h; a missing or negative reading counts as standing still
    pub fn speed_kph(&self) -> f64 {
        self.speed_mps.unwrap_or(0.0).max(0.0) * 3.6
    }
}

/// Point sample of the current speed taken on the sampling cadence
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SpeedSample {
    pub timestamp: f64,
    pub speed_kph: f64,
}

impl SpeedSample {
    pub fn new(speed_kph: f64, timestamp: f64) -> Self {
        Self {
            timestamp,
            speed_kph: speed_kph.max(0.0),
        }
    }
}

/// Trip tracker state machine states
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TrackerState {
    /// Not subscribed to the position source
    Idle,
    /// Subscribed and accumulating distance
    Tracking,
    /// Position source failed; waits for an explicit start
    Error,
}

/// Wall-clock seconds since the Unix epoch
pub fn current_timestamp() -> f64 {
    chrono::Utc::now().timestamp_millis() as f64 / 1000.0
}
