use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Trip engine error types
#[derive(Error, Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum TripError {
    #[error("Location permission denied: {0}")]
    PermissionDenied(String),

    #[error("Position unavailable: {0}")]
    PositionUnavailable(String),

    #[error("Location request timed out: {0}")]
    Timeout(String),

    #[error("Geolocation is not supported on this device")]
    Unsupported,

    #[error("Analysis unavailable: API key is not configured")]
    AnalysisUnavailable,

    #[error("Analysis failed: {0}")]
    AnalysisFailed(String),

    #[error("Insufficient data: need {required} samples, have {available}")]
    InsufficientData { required: usize, available: usize },

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Storage error: {0}")]
    Storage(String),
}

/// Result type for engine operations
pub type TripResult<T> = Result<T, TripError>;

pub const ANALYSIS_UNAVAILABLE_MESSAGE: &str =
    "AI feature is currently unavailable. API Key is not configured.";
pub const ANALYSIS_FAILED_MESSAGE: &str =
    "Sorry, I couldn't analyze the data right now. Please check your network connection and try again.";
pub const NEED_MORE_DATA_MESSAGE: &str =
    "Not enough driving data to analyze. Please drive for a bit longer.";
pub const DRIVE_LONGER_MESSAGE: &str =
    "Please start tracking and drive for a short while before analyzing.";

impl TripError {
    /// True for failures reported by the position source
    pub fn is_location(&self) -> bool {
        matches!(
            self,
            TripError::PermissionDenied(_)
                | TripError::PositionUnavailable(_)
                | TripError::Timeout(_)
                | TripError::Unsupported
        )
    }

    /// Text shown (or spoken) to the rider for this error
    pub fn user_message(&self) -> String {
        match self {
            TripError::AnalysisUnavailable => ANALYSIS_UNAVAILABLE_MESSAGE.to_string(),
            TripError::AnalysisFailed(_) => ANALYSIS_FAILED_MESSAGE.to_string(),
            TripError::InsufficientData { .. } => NEED_MORE_DATA_MESSAGE.to_string(),
            e if e.is_location() => format!("Location Error: {}. Press start to try again.", e),
            e => e.to_string(),
        }
    }
}

impl From<std::io::Error> for TripError {
    fn from(e: std::io::Error) -> Self {
        TripError::Storage(e.to_string())
    }
}

impl From<serde_json::Error> for TripError {
    fn from(e: serde_json::Error) -> Self {
        TripError::Storage(format!("JSON: {}", e))
    }
}
