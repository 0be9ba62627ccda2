use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use crate::config::{AnalysisCredentials, EngineConfig};
use crate::error::{TripError, TripResult};
use crate::types::SpeedSample;

/// Sample count bounds for one coaching request
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct AnalysisLimits {
    /// Fewer samples than this are never analysed
    pub min_samples: usize,
    /// Only the newest samples are sent
    pub max_samples: usize,
}

impl Default for AnalysisLimits {
    fn default() -> Self {
        Self {
            min_samples: 5,
            max_samples: 20,
        }
    }
}

impl From<&EngineConfig> for AnalysisLimits {
    fn from(config: &EngineConfig) -> Self {
        let min_samples = config.min_analysis_samples.max(1);
        Self {
            min_samples,
            max_samples: config.max_analysis_samples.max(min_samples),
        }
    }
}

impl AnalysisLimits {
    /// Newest `max_samples` samples, oldest first
    pub fn recent<'a>(&self, samples: &'a [SpeedSample]) -> &'a [SpeedSample] {
        let skip = samples.len().saturating_sub(self.max_samples);
        &samples[skip..]
    }

    /// The window to analyse, or `InsufficientData` when it is too short
    pub fn window<'a>(&self, samples: &'a [SpeedSample]) -> TripResult<&'a [SpeedSample]> {
        if samples.len() < self.min_samples {
            return Err(TripError::InsufficientData {
                required: self.min_samples,
                available: samples.len(),
            });
        }
        Ok(self.recent(samples))
    }
}

/// Result of a coaching request
///
/// The service reports whether its advice calls for any change. Unprompted
/// (periodic) advice that needs no action is not spoken.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum CoachingOutcome {
    Advice { message: String, actionable: bool },
    Fallback { reason: TripError },
}

impl CoachingOutcome {
    pub fn advice(message: impl Into<String>, actionable: bool) -> Self {
        CoachingOutcome::Advice {
            message: message.into(),
            actionable,
        }
    }

    pub fn fallback(reason: TripError) -> Self {
        CoachingOutcome::Fallback { reason }
    }

    pub fn message(&self) -> String {
        match self {
            CoachingOutcome::Advice { message, .. } => message.clone(),
            CoachingOutcome::Fallback { reason } => reason.user_message(),
        }
    }

    /// Whether a periodic result should be spoken without being asked for
    pub fn worth_announcing(&self) -> bool {
        match self {
            CoachingOutcome::Advice { actionable, .. } => *actionable,
            CoachingOutcome::Fallback { .. } => true,
        }
    }
}

/// External analysis collaborator
///
/// Never fails: credential, network and data problems come back as
/// [`CoachingOutcome::Fallback`].
#[async_trait]
pub trait AnalysisGateway: Send + Sync {
    async fn analyze(&self, samples: &[SpeedSample]) -> CoachingOutcome;
}

/// Build the coaching prompt for a window of samples
pub fn build_prompt(samples: &[SpeedSample]) -> String {
    let data = samples
        .iter()
        .map(|s| format!("Speed: {:.1} km/h", s.speed_kph))
        .collect::<Vec<_>>()
        .join(", ");

    format!(
        "You are an expert motorcycle mechanic and fuel efficiency coach.\n\
         Analyze the following driving data which consists of speed readings (in km/h) taken every few seconds.\n\
         Based on this data, provide concise, actionable suggestions to improve the rider's fuel mileage.\n\
         Focus on patterns like rapid acceleration, hard braking (inferred from rapid deceleration), and inconsistent speeds.\n\
         Keep your message under 100 words.\n\
         Respond with a JSON object {{\"actionable\": boolean, \"message\": string}} where actionable is false \
         when the riding needs no correction.\n\n\
         Driving Data:\n[{}]",
        data
    )
}

#[derive(Deserialize)]
struct StructuredAdvice {
    actionable: bool,
    message: String,
}

/// Parse the model's reply; plain text is treated as actionable advice
pub fn parse_advice(text: &str) -> CoachingOutcome {
    let trimmed = text
        .trim()
        .trim_start_matches("```json")
        .trim_start_matches("```")
        .trim_end_matches("```")
        .trim();

    match serde_json::from_str::<StructuredAdvice>(trimmed) {
        Ok(advice) => CoachingOutcome::advice(advice.message, advice.actionable),
        Err(_) => CoachingOutcome::advice(text.trim(), true),
    }
}

#[derive(Serialize)]
struct GenerateRequest {
    contents: Vec<Content>,
    #[serde(rename = "generationConfig")]
    generation_config: GenerationConfig,
}

#[derive(Serialize, Deserialize)]
struct Content {
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Serialize, Deserialize)]
struct Part {
    #[serde(default)]
    text: String,
}

#[derive(Serialize)]
struct GenerationConfig {
    temperature: f32,
    #[serde(rename = "responseMimeType")]
    response_mime_type: &'static str,
}

#[derive(Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Deserialize)]
struct Candidate {
    content: Option<Content>,
}

/// Gemini `generateContent` client
pub struct GeminiGateway {
    client: reqwest::Client,
    base_url: String,
    credentials: AnalysisCredentials,
    limits: AnalysisLimits,
}

impl GeminiGateway {
    pub fn new(credentials: AnalysisCredentials, limits: AnalysisLimits) -> TripResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .user_agent("ride_range/0.1.0")
            .build()
            .map_err(|e| TripError::AnalysisFailed(format!("HTTP client setup: {}", e)))?;

        Ok(GeminiGateway {
            client,
            base_url: "https://generativelanguage.googleapis.com/v1beta".to_string(),
            credentials,
            limits,
        })
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    async fn generate(&self, api_key: &str, prompt: String) -> Result<String, TripError> {
        let url = format!(
            "{}/models/{}:generateContent",
            self.base_url, self.credentials.model
        );
        let body = GenerateRequest {
            contents: vec![Content {
                parts: vec![Part { text: prompt }],
            }],
            generation_config: GenerationConfig {
                temperature: 0.5,
                response_mime_type: "application/json",
            },
        };

        let response = self
            .client
            .post(&url)
            .header("x-goog-api-key", api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| TripError::AnalysisFailed(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(TripError::AnalysisFailed(format!("HTTP {}", status.as_u16())));
        }

        let parsed: GenerateResponse = response
            .json()
            .await
            .map_err(|e| TripError::AnalysisFailed(format!("bad response: {}", e)))?;

        parsed
            .candidates
            .into_iter()
            .filter_map(|c| c.content)
            .flat_map(|c| c.parts)
            .map(|p| p.text)
            .find(|t| !t.trim().is_empty())
            .ok_or_else(|| TripError::AnalysisFailed("empty response".to_string()))
    }
}

#[async_trait]
impl AnalysisGateway for GeminiGateway {
    async fn analyze(&self, samples: &[SpeedSample]) -> CoachingOutcome {
        let api_key = match self.credentials.api_key.as_deref() {
            Some(key) => key,
            None => return CoachingOutcome::fallback(TripError::AnalysisUnavailable),
        };

        let window = match self.limits.window(samples) {
            Ok(window) => window,
            Err(e) => return CoachingOutcome::fallback(e),
        };

        let prompt = build_prompt(window);
        match self.generate(api_key, prompt).await {
            Ok(text) => parse_advice(&text),
            Err(e) => {
                log::warn!("Coaching request failed: {}", e);
                CoachingOutcome::fallback(e)
            }
        }
    }
}

/// Offline gateway with fixed replies
///
/// Flags erratic speed (large sample-to-sample swings) as actionable; used
/// when no API key is configured for demos and in tests.
#[derive(Default)]
pub struct CannedGateway {
    calls: AtomicUsize,
    limits: AnalysisLimits,
}

impl CannedGateway {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_limits(limits: AnalysisLimits) -> Self {
        Self {
            calls: AtomicUsize::new(0),
            limits,
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl AnalysisGateway for CannedGateway {
    async fn analyze(&self, samples: &[SpeedSample]) -> CoachingOutcome {
        self.calls.fetch_add(1, Ordering::Relaxed);
        let window = match self.limits.window(samples) {
            Ok(window) => window,
            Err(e) => return CoachingOutcome::fallback(e),
        };
        let max_swing = window
            .windows(2)
            .map(|pair| (pair[1].speed_kph - pair[0].speed_kph).abs())
            .fold(0.0, f64::max);

        if max_swing > 15.0 {
            CoachingOutcome::advice(
                "Your speed is changing sharply. Accelerate gently and hold a steady pace to save fuel.",
                true,
            )
        } else {
            CoachingOutcome::advice("Keep up the smooth driving.", false)
        }
    }
}
