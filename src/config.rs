use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use crate::error::TripResult;

const DEFAULT_MODEL: &str = "gemini-2.5-flash";

/// Tunables for the trip engine
///
/// Every field has a default so a partial JSON file is accepted.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub overspeed_kph: f64,
    pub overspeed_confirm_secs: f64,
    pub milestone_every_km: u64,

    pub sample_interval_secs: f64,
    /// Ring buffer bound for the sampling window (1200 samples = 1 hour at 3s)
    pub sample_capacity: usize,

    pub analysis_interval_secs: f64,
    pub min_analysis_samples: usize,
    pub max_analysis_samples: usize,

    /// How often the runtime re-evaluates alert rules between fixes
    pub tick_interval_ms: u64,

    pub watch_timeout_secs: f64,
    pub high_accuracy: bool,
    pub maximum_age_secs: f64,

    pub optimal_min_kph: f64,
    pub optimal_max_kph: f64,

    pub low_fuel_liters: f64,
    pub reserve_liters: f64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            overspeed_kph: 60.0,
            overspeed_confirm_secs: 5.0,
            milestone_every_km: 10,
            sample_interval_secs: 3.0,
            sample_capacity: 1200,
            analysis_interval_secs: 120.0,
            min_analysis_samples: 5,
            max_analysis_samples: 20,
            tick_interval_ms: 250,
            watch_timeout_secs: 10.0,
            high_accuracy: true,
            maximum_age_secs: 0.0,
            optimal_min_kph: 40.0,
            optimal_max_kph: 55.0,
            low_fuel_liters: 1.0,
            reserve_liters: 1.0,
        }
    }
}

impl EngineConfig {
    /// Load from a JSON file, falling back to defaults when it does not exist
    pub fn load(path: &Path) -> TripResult<Self> {
        if !path.exists() {
            log::info!("Config {} not found, using defaults", path.display());
            return Ok(Self::default());
        }
        let text = std::fs::read_to_string(path)?;
        let config: EngineConfig = serde_json::from_str(&text)?;
        Ok(config)
    }

    pub fn overspeed_confirm(&self) -> Duration {
        Duration::from_secs_f64(self.overspeed_confirm_secs.max(0.0))
    }

    pub fn sample_interval(&self) -> Duration {
        Duration::from_secs_f64(self.sample_interval_secs.max(0.1))
    }

    pub fn analysis_interval(&self) -> Duration {
        Duration::from_secs_f64(self.analysis_interval_secs.max(1.0))
    }

    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms.max(10))
    }
}

/// Credentials and model for the coaching service, read from the environment
#[derive(Clone, Debug)]
pub struct AnalysisCredentials {
    pub api_key: Option<String>,
    pub model: String,
}

impl AnalysisCredentials {
    pub fn from_env() -> Self {
        let api_key = ["GEMINI_API_KEY", "API_KEY"].iter().find_map(|key| {
            std::env::var(key)
                .ok()
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        });
        if api_key.is_none() {
            log::warn!("GEMINI_API_KEY not set, coaching will be unavailable");
        }

        let model = std::env::var("GEMINI_MODEL").unwrap_or_else(|_| DEFAULT_MODEL.to_string());

        Self { api_key, model }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let config = EngineConfig::default();
        assert_eq!(config.milestone_every_km, 10);
        assert_eq!(config.sample_interval(), Duration::from_secs(3));
        assert_eq!(config.analysis_interval(), Duration::from_secs(120));
        assert_eq!(config.overspeed_confirm(), Duration::from_secs(5));
        assert_eq!(config.max_analysis_samples, 20);
    }

    #[test]
    fn test_partial_file_keeps_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"overspeed_kph": 80.0, "milestone_every_km": 5}}"#).unwrap();

        let config = EngineConfig::load(file.path()).unwrap();
        assert_eq!(config.overspeed_kph, 80.0);
        assert_eq!(config.milestone_every_km, 5);
        assert_eq!(config.min_analysis_samples, 5);
    }

    #[test]
    fn test_missing_file_uses_defaults() {
        let config = EngineConfig::load(Path::new("/nonexistent/ride_range.json")).unwrap();
        assert_eq!(config.overspeed_kph, 60.0);
    }

    #[test]
    fn test_malformed_file_is_storage_error() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "not json").unwrap();
        assert!(matches!(
            EngineConfig::load(file.path()),
            Err(crate::error::TripError::Storage(_))
        ));
    }
}
