use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

use crate::types::{current_timestamp, TrackerState};

/// Point-in-time view of the engine for displays and status files
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct TripSnapshot {
    pub timestamp: f64,
    pub state: TrackerState,
    pub speed_kph: f64,
    pub distance_km: f64,
    pub optimal_speed: bool,
    // Range (absent until a refill is recorded)
    pub total_range_km: Option<f64>,
    pub remaining_range_km: Option<f64>,
    pub remaining_fuel_liters: Option<f64>,
    // Coaching pipeline
    pub samples_buffered: usize,
    pub voice_enabled: bool,
    pub speaking: bool,
    pub analysis_in_flight: bool,
    pub last_coaching: Option<String>,
    pub error: Option<String>,
}

impl TripSnapshot {
    pub fn new() -> Self {
        Self {
            timestamp: current_timestamp(),
            state: TrackerState::Idle,
            speed_kph: 0.0,
            distance_km: 0.0,
            optimal_speed: false,
            total_range_km: None,
            remaining_range_km: None,
            remaining_fuel_liters: None,
            samples_buffered: 0,
            voice_enabled: true,
            speaking: false,
            analysis_in_flight: false,
            last_coaching: None,
            error: None,
        }
    }

    pub fn save(&self, path: &Path) -> std::io::Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        fs::write(path, json)?;
        Ok(())
    }
}

impl Default for TripSnapshot {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_save_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("live_status.json");

        let mut status = TripSnapshot::new();
        status.distance_km = 12.5;
        status.error = Some("Location Error".to_string());
        status.save(&path).unwrap();

        let text = std::fs::read_to_string(&path).unwrap();
        assert!(text.contains("\"distance_km\": 12.5"));
        assert!(text.contains("\"state\": \"Idle\""));
    }
}
