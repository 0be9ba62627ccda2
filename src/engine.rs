use tokio::time::Instant;

use crate::alerts::{Alert, AlertConfig, AlertInput, AlertScheduler};
use crate::analysis::{AnalysisLimits, CoachingOutcome};
use crate::config::EngineConfig;
use crate::error::{TripError, TripResult, DRIVE_LONGER_MESSAGE};
use crate::geo_sampler::{GeoEvent, PositionSource, WatchOptions};
use crate::live_status::TripSnapshot;
use crate::mileage::{reserve_average, MileageResult};
use crate::range::{FuelState, LowFuelWatch, RangeEstimator, RangeMetrics, SpeedBand};
use crate::sampling::SamplingWindow;
use crate::tracker::{TrackerUpdate, TripState, TripTracker};
use crate::types::{current_timestamp, PositionFix, SpeedSample};
use crate::voice::VoiceOutput;

/// Why an analysis was requested
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AnalysisTrigger {
    Periodic,
    Manual,
}

/// Something the caller should act on or display
#[derive(Clone, Debug, PartialEq)]
pub enum EngineEvent {
    Position(PositionFix),
    Spoke(String),
    /// Run the analysis gateway on `samples` and report back through
    /// [`TripEngine::complete_analysis`]
    AnalysisRequested {
        trigger: AnalysisTrigger,
        samples: Vec<SpeedSample>,
    },
    CoachingReady {
        trigger: AnalysisTrigger,
        outcome: CoachingOutcome,
    },
    /// Remaining fuel just crossed below the low-fuel line
    LowFuel(RangeMetrics),
    TrackingFailed(TripError),
    Notice(String),
}

/// Answer to a user-initiated analysis request
#[derive(Clone, Debug, PartialEq)]
pub enum ManualAnalysis {
    Dispatch(Vec<SpeedSample>),
    /// Not enough samples; show this instead of calling the gateway
    Declined(String),
    /// A request is already outstanding
    Busy,
}

/// Trip tracking, range estimation and alerting on a single thread
///
/// Every method takes the current instant explicitly and returns the events
/// it produced, so the whole pipeline can be driven deterministically.
pub struct TripEngine<S: PositionSource, V: VoiceOutput> {
    config: EngineConfig,
    limits: AnalysisLimits,
    tracker: TripTracker<S>,
    window: SamplingWindow,
    scheduler: AlertScheduler,
    voice: V,
    voice_enabled: bool,
    fuel: Option<FuelState>,
    low_fuel: LowFuelWatch,
    band: SpeedBand,
    analysis_in_flight: bool,
    last_coaching: Option<CoachingOutcome>,
}

impl<S: PositionSource, V: VoiceOutput> TripEngine<S, V> {
    pub fn new(config: EngineConfig, source: S, voice: V) -> Self {
        let tracker = TripTracker::new(source, WatchOptions::from(&config));
        let window = SamplingWindow::new(config.sample_interval(), config.sample_capacity);
        let scheduler = AlertScheduler::new(AlertConfig::from(&config));
        let low_fuel = LowFuelWatch::new(config.low_fuel_liters);
        let band = SpeedBand::new(config.optimal_min_kph, config.optimal_max_kph);
        let limits = AnalysisLimits::from(&config);

        Self {
            config,
            limits,
            tracker,
            window,
            scheduler,
            voice,
            voice_enabled: true,
            fuel: None,
            low_fuel,
            band,
            analysis_in_flight: false,
            last_coaching: None,
        }
    }

    /// Begin a new trip: distance, samples and alert cooldowns start fresh
    pub fn start(&mut self, now: Instant) -> TripResult<()> {
        if let Err(e) = self.tracker.start() {
            self.window.halt();
            self.scheduler.stand_down();
            return Err(e);
        }

        self.window.begin(now);
        self.scheduler.begin_session(now);
        if !self.voice_enabled {
            self.scheduler.stand_down();
        }
        self.low_fuel.reset();
        self.observe_fuel();
        Ok(())
    }

    pub fn stop(&mut self) {
        self.tracker.stop();
        self.window.halt();
        self.scheduler.stand_down();
    }

    pub fn reset_distance(&mut self) {
        self.tracker.reset_distance();
        self.scheduler.reset_milestones();
        self.low_fuel.reset();
        self.observe_fuel();
    }

    /// Record a refill; the trip distance restarts from the new tank
    pub fn set_fuel(&mut self, fuel: FuelState) -> TripResult<()> {
        if !(fuel.efficiency_km_per_liter > 0.0) {
            return Err(TripError::InvalidInput(format!(
                "efficiency must be positive, got {}",
                fuel.efficiency_km_per_liter
            )));
        }
        if !(fuel.fuel_refilled_liters > 0.0) {
            return Err(TripError::InvalidInput(format!(
                "refill must be positive, got {}",
                fuel.fuel_refilled_liters
            )));
        }

        log::info!(
            "Refill {:.1} L at {:.1} km/l ({:.0} km range)",
            fuel.fuel_refilled_liters,
            fuel.efficiency_km_per_liter,
            RangeEstimator::total_range_km(&fuel)
        );
        self.fuel = Some(fuel);
        self.reset_distance();
        Ok(())
    }

    pub fn set_voice_enabled(&mut self, enabled: bool, now: Instant) {
        if enabled == self.voice_enabled {
            return;
        }
        self.voice_enabled = enabled;
        if !enabled {
            self.scheduler.stand_down();
        } else if self.tracker.is_tracking() {
            self.scheduler.activate(now);
        }
    }

    pub fn on_geo_event(&mut self, event: GeoEvent, now: Instant) -> Vec<EngineEvent> {
        let mut events = Vec::new();
        match self.tracker.handle_event(event) {
            TrackerUpdate::Moved { .. } => {
                if let Some(fix) = self.tracker.trip().last_fix.clone() {
                    events.push(EngineEvent::Position(fix));
                }
                if let Some(metrics) = self.observe_fuel() {
                    events.push(EngineEvent::LowFuel(metrics));
                }
                self.evaluate_alerts(now, &mut events);
            }
            TrackerUpdate::Failed(error) => {
                self.window.halt();
                self.scheduler.stand_down();
                events.push(EngineEvent::TrackingFailed(error));
            }
            TrackerUpdate::Ignored => {}
        }
        events
    }

    /// Periodic housekeeping: take a due speed sample, re-evaluate alerts
    pub fn tick(&mut self, now: Instant) -> Vec<EngineEvent> {
        let mut events = Vec::new();
        if self.tracker.is_tracking() {
            self.window
                .poll(now, self.tracker.speed_kph(), current_timestamp());
        }
        self.evaluate_alerts(now, &mut events);
        events
    }

    fn evaluate_alerts(&mut self, now: Instant, events: &mut Vec<EngineEvent>) {
        if !self.tracker.is_tracking() || !self.voice_enabled {
            return;
        }

        let input = AlertInput {
            now,
            speed_kph: self.tracker.speed_kph(),
            distance_km: self.tracker.distance_km(),
            range: self.range(),
            speaking: self.voice.is_speaking(),
            analysis_in_flight: self.analysis_in_flight,
        };

        match self.scheduler.evaluate(input) {
            Some(Alert::Coaching) => {
                if self.window.len() < self.limits.min_samples {
                    log::debug!(
                        "Periodic coaching skipped: {} samples buffered",
                        self.window.len()
                    );
                    return;
                }
                self.analysis_in_flight = true;
                events.push(EngineEvent::AnalysisRequested {
                    trigger: AnalysisTrigger::Periodic,
                    samples: self.window.recent(self.limits.max_samples),
                });
            }
            Some(alert) => {
                if let Some(text) = alert.message() {
                    self.speak(text, events);
                }
            }
            None => {}
        }
    }

    fn speak(&mut self, text: String, events: &mut Vec<EngineEvent>) {
        if self.voice.is_speaking() {
            log::debug!("Not speaking over current utterance: {}", text);
            return;
        }
        self.voice.speak(&text);
        events.push(EngineEvent::Spoke(text));
    }

    fn observe_fuel(&mut self) -> Option<RangeMetrics> {
        let metrics = self.range()?;
        if self.low_fuel.observe(metrics.remaining_fuel_liters) {
            Some(metrics)
        } else {
            None
        }
    }

    /// User-initiated analysis; bypasses the periodic cadence
    pub fn request_analysis(&mut self) -> ManualAnalysis {
        if self.window.len() < self.limits.min_samples {
            return ManualAnalysis::Declined(DRIVE_LONGER_MESSAGE.to_string());
        }
        if self.analysis_in_flight {
            return ManualAnalysis::Busy;
        }
        self.analysis_in_flight = true;
        ManualAnalysis::Dispatch(self.window.recent(self.limits.max_samples))
    }

    /// Deliver a gateway result
    ///
    /// Periodic results are spoken only while the rules are still armed and
    /// only when they call for action; manual results are always spoken if
    /// voice is enabled and idle.
    pub fn complete_analysis(
        &mut self,
        trigger: AnalysisTrigger,
        outcome: CoachingOutcome,
    ) -> Vec<EngineEvent> {
        let mut events = Vec::new();
        self.analysis_in_flight = false;
        self.last_coaching = Some(outcome.clone());

        let announce = match trigger {
            AnalysisTrigger::Periodic => {
                self.scheduler.is_active()
                    && self.tracker.is_tracking()
                    && outcome.worth_announcing()
            }
            AnalysisTrigger::Manual => true,
        };
        if announce && self.voice_enabled {
            self.speak(outcome.message(), &mut events);
        } else if trigger == AnalysisTrigger::Periodic {
            log::debug!("Periodic coaching not announced: {}", outcome.message());
        }

        events.push(EngineEvent::CoachingReady { trigger, outcome });
        events
    }

    /// Rider switched to reserve: compute real-world mileage and end the trip
    pub fn reserve_reached(&mut self) -> TripResult<MileageResult> {
        let fuel = self
            .fuel
            .ok_or_else(|| TripError::InvalidInput("no refill recorded".to_string()))?;
        let result = reserve_average(
            fuel.fuel_refilled_liters,
            self.tracker.distance_km(),
            self.config.reserve_liters,
        )?;
        log::info!(
            "Reserve reached after {:.1} km: {:.1} km/l",
            result.distance_km,
            result.average_km_per_liter
        );
        self.stop();
        Ok(result)
    }

    /// Stop everything; call before the engine is dropped
    pub fn shutdown(&mut self) {
        self.stop();
    }

    pub fn range(&self) -> Option<RangeMetrics> {
        self.fuel
            .as_ref()
            .map(|fuel| RangeEstimator::metrics(fuel, self.tracker.distance_km()))
    }

    pub fn snapshot(&self) -> TripSnapshot {
        let trip = self.tracker.trip();
        let range = self.range();
        TripSnapshot {
            timestamp: current_timestamp(),
            state: trip.state,
            speed_kph: trip.current_speed_kph,
            distance_km: trip.cumulative_distance_km,
            optimal_speed: self.band.contains(trip.current_speed_kph),
            total_range_km: range.map(|r| r.total_range_km),
            remaining_range_km: range.map(|r| r.remaining_range_km),
            remaining_fuel_liters: range.map(|r| r.remaining_fuel_liters),
            samples_buffered: self.window.len(),
            voice_enabled: self.voice_enabled,
            speaking: self.voice.is_speaking(),
            analysis_in_flight: self.analysis_in_flight,
            last_coaching: self.last_coaching.as_ref().map(|o| o.message()),
            error: trip.error.as_ref().map(|e| e.user_message()),
        }
    }

    pub async fn next_geo_event(&mut self) -> GeoEvent {
        self.tracker.next_event().await
    }

    pub fn trip(&self) -> &TripState {
        self.tracker.trip()
    }

    pub fn tracker(&self) -> &TripTracker<S> {
        &self.tracker
    }

    pub fn window(&self) -> &SamplingWindow {
        &self.window
    }

    pub fn scheduler(&self) -> &AlertScheduler {
        &self.scheduler
    }

    pub fn voice(&self) -> &V {
        &self.voice
    }

    pub fn fuel(&self) -> Option<FuelState> {
        self.fuel
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn is_analysis_in_flight(&self) -> bool {
        self.analysis_in_flight
    }
}
