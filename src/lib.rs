//! Ride range: trip tracking, fuel range estimation and voice coaching for
//! a motorcycle rider.
//!
//! [`engine::TripEngine`] is the synchronous core. [`runtime::TripRuntime`]
//! drives it on tokio from a [`geo_sampler::PositionSource`], a periodic
//! tick and user [`runtime::Command`]s.

pub mod alerts;
pub mod analysis;
pub mod config;
pub mod dashboard;
pub mod distance;
pub mod engine;
pub mod error;
pub mod geo_sampler;
pub mod live_status;
pub mod mileage;
pub mod range;
pub mod runtime;
pub mod sampling;
pub mod storage;
pub mod tracker;
pub mod types;
pub mod voice;

pub use analysis::{AnalysisGateway, AnalysisLimits, CannedGateway, CoachingOutcome, GeminiGateway};
pub use config::{AnalysisCredentials, EngineConfig};
pub use engine::{AnalysisTrigger, EngineEvent, ManualAnalysis, TripEngine};
pub use error::{TripError, TripResult};
pub use geo_sampler::{GeoEvent, ManualSource, PositionSource, SimulatedSource, WatchOptions};
pub use live_status::TripSnapshot;
pub use range::{FuelState, RangeEstimator, RangeMetrics};
pub use runtime::{Command, RuntimeHandle, SharedSnapshot, TripRuntime};
pub use types::{PositionFix, SpeedSample, TrackerState};
pub use voice::{ConsoleVoice, ScriptedVoice, VoiceOutput};
