use serde::{Deserialize, Serialize};

use crate::distance::DistanceAccumulator;
use crate::error::{TripError, TripResult};
use crate::geo_sampler::{GeoEvent, GeoSampler, PositionSource, WatchOptions};
use crate::types::{PositionFix, TrackerState};

/// Observable state of the current trip
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TripState {
    pub state: TrackerState,
    pub current_speed_kph: f64,
    pub cumulative_distance_km: f64,
    pub last_fix: Option<PositionFix>,
    pub error: Option<TripError>,
}

impl TripState {
    fn new() -> Self {
        Self {
            state: TrackerState::Idle,
            current_speed_kph: 0.0,
            cumulative_distance_km: 0.0,
            last_fix: None,
            error: None,
        }
    }

    pub fn is_tracking(&self) -> bool {
        self.state == TrackerState::Tracking
    }
}

/// What a delivered event did to the tracker
#[derive(Debug, Clone, PartialEq)]
pub enum TrackerUpdate {
    /// Fix applied; carries the distance increment in km
    Moved { increment_km: f64 },
    /// Source failed, tracking halted
    Failed(TripError),
    /// Event arrived while not tracking
    Ignored,
}

/// Start/stop/reset state machine over a position subscription
///
/// Idle -> Tracking on `start`, Tracking -> Error on a source failure
/// (fail-stop, no retry), any -> Idle on `stop`. Distance survives `stop`
/// and is cleared only by `start` or `reset_distance`.
pub struct TripTracker<S: PositionSource> {
    sampler: GeoSampler<S>,
    accumulator: DistanceAccumulator,
    trip: TripState,
}

impl<S: PositionSource> TripTracker<S> {
    pub fn new(source: S, options: WatchOptions) -> Self {
        Self {
            sampler: GeoSampler::new(source, options),
            accumulator: DistanceAccumulator::new(),
            trip: TripState::new(),
        }
    }

    /// Begin a new trip
    ///
    /// A source without location capability moves straight to `Error`.
    pub fn start(&mut self) -> TripResult<()> {
        self.trip.last_fix = None;
        self.trip.cumulative_distance_km = 0.0;
        self.trip.current_speed_kph = 0.0;
        self.trip.error = None;

        match self.sampler.start() {
            Ok(()) => {
                self.trip.state = TrackerState::Tracking;
                log::info!("Trip tracking started");
                Ok(())
            }
            Err(e) => {
                log::warn!("Could not start tracking: {}", e);
                self.trip.state = TrackerState::Error;
                self.trip.error = Some(e.clone());
                Err(e)
            }
        }
    }

    pub fn stop(&mut self) {
        if self.sampler.stop() {
            log::info!(
                "Trip tracking stopped at {:.2} km",
                self.trip.cumulative_distance_km
            );
        }
        self.trip.state = TrackerState::Idle;
        self.trip.current_speed_kph = 0.0;
        self.trip.error = None;
    }

    /// Zero the distance without touching the subscription
    pub fn reset_distance(&mut self) {
        self.trip.cumulative_distance_km = 0.0;
        self.trip.last_fix = None;
    }

    pub fn handle_event(&mut self, event: GeoEvent) -> TrackerUpdate {
        if self.trip.state != TrackerState::Tracking {
            return TrackerUpdate::Ignored;
        }

        match event {
            GeoEvent::Fix(fix) => {
                self.trip.current_speed_kph = fix.speed_kph();
                let increment_km = self.accumulator.add_fix(self.trip.last_fix.as_ref(), &fix);
                self.trip.cumulative_distance_km += increment_km;
                self.trip.last_fix = Some(fix);
                TrackerUpdate::Moved { increment_km }
            }
            GeoEvent::Failure(error) => {
                log::warn!("Position source failed, tracking halted: {}", error);
                self.sampler.stop();
                self.trip.state = TrackerState::Error;
                self.trip.current_speed_kph = 0.0;
                self.trip.error = Some(error.clone());
                TrackerUpdate::Failed(error)
            }
        }
    }

    /// Wait for the next event from the subscription
    pub async fn next_event(&mut self) -> GeoEvent {
        self.sampler.next_event().await
    }

    /// Drain and apply every event already queued
    pub fn pump(&mut self) -> Vec<TrackerUpdate> {
        let mut updates = Vec::new();
        while let Some(event) = self.sampler.try_next() {
            updates.push(self.handle_event(event));
        }
        updates
    }

    pub fn trip(&self) -> &TripState {
        &self.trip
    }

    pub fn state(&self) -> TrackerState {
        self.trip.state
    }

    pub fn is_tracking(&self) -> bool {
        self.trip.is_tracking()
    }

    pub fn speed_kph(&self) -> f64 {
        self.trip.current_speed_kph
    }

    pub fn distance_km(&self) -> f64 {
        self.trip.cumulative_distance_km
    }

    pub fn is_subscribed(&self) -> bool {
        self.sampler.is_active()
    }

    pub fn source(&self) -> &S {
        self.sampler.source()
    }
}
