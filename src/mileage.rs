use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::fs;
use std::path::Path;

use crate::error::{TripError, TripResult};

/// How many past results the history keeps
pub const HISTORY_LEN: usize = 5;

/// Real-world mileage measured from a full tank down to reserve
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct MileageResult {
    pub average_km_per_liter: f64,
    pub distance_km: f64,
    pub refilled_liters: f64,
    pub consumed_liters: f64,
    pub recorded_at: String,
}

/// Average km/l from refill to reserve
///
/// The reserve portion is still in the tank when the rider switches over,
/// so it is excluded from the fuel consumed.
pub fn reserve_average(
    refilled_liters: f64,
    distance_km: f64,
    reserve_liters: f64,
) -> TripResult<MileageResult> {
    if distance_km <= 0.0 {
        return Err(TripError::InsufficientData {
            required: 1,
            available: 0,
        });
    }
    let consumed_liters = refilled_liters - reserve_liters;
    if consumed_liters <= 0.0 {
        return Err(TripError::InvalidInput(format!(
            "refill more than {} liter(s) to calculate average before reserve",
            reserve_liters
        )));
    }

    Ok(MileageResult {
        average_km_per_liter: distance_km / consumed_liters,
        distance_km,
        refilled_liters,
        consumed_liters,
        recorded_at: chrono::Utc::now().to_rfc3339(),
    })
}

/// Most recent mileage results, newest first
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct MileageHistory {
    entries: VecDeque<MileageResult>,
}

impl MileageHistory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, result: MileageResult) {
        self.entries.push_front(result);
        self.entries.truncate(HISTORY_LEN);
    }

    pub fn entries(&self) -> impl Iterator<Item = &MileageResult> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Load from disk; a missing file is an empty history
    pub fn load(path: &Path) -> TripResult<Self> {
        if !path.exists() {
            return Ok(Self::new());
        }
        let text = fs::read_to_string(path)?;
        let mut history: MileageHistory = serde_json::from_str(&text)?;
        history.entries.truncate(HISTORY_LEN);
        Ok(history)
    }

    pub fn save(&self, path: &Path) -> TripResult<()> {
        let json = serde_json::to_string_pretty(self)?;
        fs::write(path, json)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_reserve_mode_average() {
        let result = reserve_average(6.0, 180.0, 1.0).unwrap();
        assert_relative_eq!(result.consumed_liters, 5.0);
        assert_relative_eq!(result.average_km_per_liter, 36.0);
    }

    #[test]
    fn test_refill_at_or_below_reserve_rejected() {
        assert!(matches!(
            reserve_average(1.0, 50.0, 1.0),
            Err(TripError::InvalidInput(_))
        ));
        assert!(matches!(
            reserve_average(0.5, 50.0, 1.0),
            Err(TripError::InvalidInput(_))
        ));
    }

    #[test]
    fn test_no_distance_rejected() {
        assert!(matches!(
            reserve_average(6.0, 0.0, 1.0),
            Err(TripError::InsufficientData { .. })
        ));
    }

    #[test]
    fn test_history_keeps_last_five_newest_first() {
        let mut history = MileageHistory::new();
        for km in 1..=7 {
            history.record(reserve_average(3.0, km as f64 * 10.0, 1.0).unwrap());
        }
        assert_eq!(history.len(), HISTORY_LEN);
        let distances: Vec<f64> = history.entries().map(|r| r.distance_km).collect();
        assert_eq!(distances, vec![70.0, 60.0, 50.0, 40.0, 30.0]);
    }

    #[test]
    fn test_history_persistence() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("history.json");

        assert!(MileageHistory::load(&path).unwrap().is_empty());

        let mut history = MileageHistory::new();
        history.record(reserve_average(6.0, 180.0, 1.0).unwrap());
        history.save(&path).unwrap();

        let loaded = MileageHistory::load(&path).unwrap();
        assert_eq!(loaded.len(), 1);
        assert_relative_eq!(
            loaded.entries().next().unwrap().average_km_per_liter,
            36.0
        );
    }
}
