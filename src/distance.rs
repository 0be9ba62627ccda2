use crate::types::PositionFix;

/// Mean Earth radius used for trip distance
pub const EARTH_RADIUS_KM: f64 = 6371.0;

/// Great-circle distance in km between two coordinates
pub fn haversine_km(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64 {
    let d_lat = (lat2 - lat1).to_radians();
    let d_lon = (lon2 - lon1).to_radians();
    let a = (d_lat / 2.0).sin().powi(2)
        + lat1.to_radians().cos() * lat2.to_radians().cos() * (d_lon / 2.0).sin().powi(2);
    let c = 2.0 * a.sqrt().atan2((1.0 - a).max(0.0).sqrt());
    EARTH_RADIUS_KM * c
}

/// Distance increments between consecutive fixes
///
/// Only coordinates are used. The reported speed is never integrated, so a
/// noisy speed reading cannot inflate the trip distance.
#[derive(Clone, Copy, Debug, Default)]
pub struct DistanceAccumulator;

impl DistanceAccumulator {
    pub fn new() -> Self {
        Self
    }

    /// Increment in km from `previous` to `current`; zero for the first fix
    pub fn add_fix(&self, previous: Option<&PositionFix>, current: &PositionFix) -> f64 {
        match previous {
            Some(prev) => haversine_km(
                prev.latitude,
                prev.longitude,
                current.latitude,
                current.longitude,
            ),
            None => 0.0,
        }
    }
}
