use serde::{Deserialize, Serialize};

/// Fuel put in at the last refill and the vehicle's rated efficiency
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct FuelState {
    pub fuel_refilled_liters: f64,
    pub efficiency_km_per_liter: f64,
}

impl FuelState {
    pub fn new(fuel_refilled_liters: f64, efficiency_km_per_liter: f64) -> Self {
        Self {
            fuel_refilled_liters,
            efficiency_km_per_liter,
        }
    }
}

/// Derived range figures; never stored
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct RangeMetrics {
    pub total_range_km: f64,
    pub remaining_range_km: f64,
    pub remaining_fuel_liters: f64,
}

/// Pure range derivations
///
/// Efficiency must be positive; that is checked where the fuel state is
/// accepted, not here.
pub struct RangeEstimator;

impl RangeEstimator {
    pub fn total_range_km(fuel: &FuelState) -> f64 {
        fuel.fuel_refilled_liters * fuel.efficiency_km_per_liter
    }

    pub fn remaining_range_km(fuel: &FuelState, distance_km: f64) -> f64 {
        (Self::total_range_km(fuel) - distance_km).max(0.0)
    }

    pub fn remaining_fuel_liters(fuel: &FuelState, distance_km: f64) -> f64 {
        Self::remaining_range_km(fuel, distance_km) / fuel.efficiency_km_per_liter
    }

    pub fn metrics(fuel: &FuelState, distance_km: f64) -> RangeMetrics {
        RangeMetrics {
            total_range_km: Self::total_range_km(fuel),
            remaining_range_km: Self::remaining_range_km(fuel, distance_km),
            remaining_fuel_liters: Self::remaining_fuel_liters(fuel, distance_km),
        }
    }
}

/// One-shot detector for remaining fuel dropping below the low-fuel line
///
/// Fires once when the level crosses from at-or-above the threshold to below
/// it, and re-arms only after the level is back at or above the threshold.
#[derive(Clone, Debug)]
pub struct LowFuelWatch {
    threshold_liters: f64,
    armed: bool,
}

impl LowFuelWatch {
    pub fn new(threshold_liters: f64) -> Self {
        Self {
            threshold_liters,
            armed: false,
        }
    }

    /// Feed the current remaining fuel; true exactly once per crossing
    pub fn observe(&mut self, remaining_fuel_liters: f64) -> bool {
        if remaining_fuel_liters >= self.threshold_liters {
            self.armed = true;
            return false;
        }
        if self.armed {
            self.armed = false;
            log::info!(
                "Remaining fuel {:.2} L dropped below {:.1} L",
                remaining_fuel_liters,
                self.threshold_liters
            );
            return true;
        }
        false
    }

    /// Forget the last level, e.g. after a refill
    pub fn reset(&mut self) {
        self.armed = false;
    }
}

/// Speed range with the best fuel economy
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct SpeedBand {
    pub min_kph: f64,
    pub max_kph: f64,
}

impl SpeedBand {
    pub fn new(min_kph: f64, max_kph: f64) -> Self {
        Self { min_kph, max_kph }
    }

    pub fn contains(&self, speed_kph: f64) -> bool {
        speed_kph >= self.min_kph && speed_kph <= self.max_kph
    }
}
