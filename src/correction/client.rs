//! HTTP client for the gaze-correction service.
//!
//! One POST submits a stored artifact's public locator (or an inline
//! data URL) with fixed tuning parameters; one GET per job id polls for
//! status and, when finished, the output locator.

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info};

use crate::recorder::Artifact;

pub const CORRECTION_FUNCTION: &str = "sieve/eye-contact-correction";

#[derive(Debug, Error)]
pub enum CorrectionError {
    #[error("correction API key not configured")]
    MissingApiKey,
    #[error("correction transport error: {0}")]
    Transport(String),
    #[error("correction request rejected ({status}): {body}")]
    Rejected { status: u16, body: String },
}

/// Identifier of one remote correction job.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct JobId(pub String);

impl std::fmt::Display for JobId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Status reported by a poll. Only `Finished` and `Failed` are terminal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobStatus {
    Processing,
    Finished { output_locator: Option<String> },
    Failed { message: String },
}

impl JobStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Finished { .. } | Self::Failed { .. })
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Processing => "processing",
            Self::Finished { .. } => "finished",
            Self::Failed { .. } => "failed",
        }
    }
}

/// Fixed tuning parameters for the correction function. Defaults mirror
/// the service's recommended conservative settings.
#[derive(Debug, Clone, Serialize)]
pub struct CorrectionTuning {
    pub accuracy_boost: bool,
    pub enable_look_away: bool,
    pub look_away_offset_max: u8,
    pub look_away_interval_min: u8,
    pub look_away_interval_range: u8,
    pub split_screen_view: bool,
    pub draw_visualization: bool,
    pub eyesize_sensitivity: u8,
    pub gaze_pitch_threshold_low: u8,
    pub gaze_yaw_threshold_low: u8,
    pub head_pitch_threshold_low: u8,
    pub head_yaw_threshold_low: u8,
    pub gaze_pitch_threshold_high: u8,
    pub gaze_yaw_threshold_high: u8,
    pub head_pitch_threshold_high: u8,
    pub head_yaw_threshold_high: u8,
}

impl Default for CorrectionTuning {
    fn default() -> Self {
        Self {
            accuracy_boost: false,
            enable_look_away: false,
            look_away_offset_max: 5,
            look_away_interval_min: 3,
            look_away_interval_range: 8,
            split_screen_view: false,
            draw_visualization: false,
            eyesize_sensitivity: 3,
            gaze_pitch_threshold_low: 20,
            gaze_yaw_threshold_low: 20,
            head_pitch_threshold_low: 15,
            head_yaw_threshold_low: 25,
            gaze_pitch_threshold_high: 30,
            gaze_yaw_threshold_high: 30,
            head_pitch_threshold_high: 25,
            head_yaw_threshold_high: 30,
        }
    }
}

/// Trait for the remote correction job API.
#[async_trait]
pub trait CorrectionJobApi: Send + Sync {
    async fn submit(
        &self,
        video_url: &str,
        tuning: &CorrectionTuning,
    ) -> Result<JobId, CorrectionError>;

    async fn poll(&self, job: &JobId) -> Result<JobStatus, CorrectionError>;
}

#[derive(Serialize)]
struct SubmitRequest<'a> {
    function: &'static str,
    inputs: SubmitInputs<'a>,
}

#[derive(Serialize)]
struct SubmitInputs<'a> {
    input_video: VideoRef,
    #[serde(flatten)]
    tuning: &'a CorrectionTuning,
}

#[derive(Serialize)]
struct VideoRef {
    url: String,
}

#[derive(Debug, Deserialize)]
struct SubmitResponse {
    id: String,
}

#[derive(Debug, Deserialize)]
struct JobResponse {
    status: String,
    #[serde(default)]
    outputs: Option<Vec<JobOutput>>,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Debug, Deserialize)]
struct JobOutput {
    data: JobOutputData,
}

#[derive(Debug, Deserialize)]
struct JobOutputData {
    #[serde(default)]
    url: Option<String>,
}

#[derive(Debug)]
pub struct CorrectionClient {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
}

impl CorrectionClient {
    pub fn new(base_url: &str, api_key: Option<String>) -> Result<Self, CorrectionError> {
        let api_key = api_key.ok_or(CorrectionError::MissingApiKey)?;
        Ok(Self {
            client: reqwest::Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
        })
    }

    /// Submit an artifact that has no public locator as an inline data URL.
    pub async fn submit_inline(
        &self,
        artifact: &Artifact,
        tuning: &CorrectionTuning,
    ) -> Result<JobId, CorrectionError> {
        let data_url = format!(
            "data:{};base64,{}",
            artifact.mime_type,
            BASE64.encode(&artifact.data)
        );
        self.submit(&data_url, tuning).await
    }
}

#[async_trait]
impl CorrectionJobApi for CorrectionClient {
    async fn submit(
        &self,
        video_url: &str,
        tuning: &CorrectionTuning,
    ) -> Result<JobId, CorrectionError> {
        let request = SubmitRequest {
            function: CORRECTION_FUNCTION,
            inputs: SubmitInputs {
                input_video: VideoRef {
                    url: video_url.to_string(),
                },
                tuning,
            },
        };

        let response = self
            .client
            .post(format!("{}/push", self.base_url))
            .header("X-API-Key", &self.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| CorrectionError::Transport(e.to_string()))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| CorrectionError::Transport(e.to_string()))?;

        if !status.is_success() {
            return Err(CorrectionError::Rejected {
                status: status.as_u16(),
                body,
            });
        }

        let parsed: SubmitResponse = serde_json::from_str(&body)
            .map_err(|e| CorrectionError::Transport(format!("unexpected submit response: {e}")))?;

        info!("Correction job submitted: {}", parsed.id);
        Ok(JobId(parsed.id))
    }

    async fn poll(&self, job: &JobId) -> Result<JobStatus, CorrectionError> {
        let response = self
            .client
            .get(format!("{}/jobs/{}", self.base_url, job))
            .header("X-API-Key", &self.api_key)
            .send()
            .await
            .map_err(|e| CorrectionError::Transport(e.to_string()))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| CorrectionError::Transport(e.to_string()))?;

        if !status.is_success() {
            return Err(CorrectionError::Rejected {
                status: status.as_u16(),
                body,
            });
        }

        let parsed: JobResponse = serde_json::from_str(&body)
            .map_err(|e| CorrectionError::Transport(format!("unexpected job response: {e}")))?;

        let mapped = match parsed.status.as_str() {
            "finished" => JobStatus::Finished {
                output_locator: parsed
                    .outputs
                    .and_then(|outputs| outputs.into_iter().next())
                    .and_then(|output| output.data.url),
            },
            "failed" => JobStatus::Failed {
                message: parsed
                    .error
                    .unwrap_or_else(|| "correction job failed".to_string()),
            },
            // queued / started / processing all count as in-progress.
            other => {
                debug!("Job {} in progress ({other})", job);
                JobStatus::Processing
            }
        };

        Ok(mapped)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_tuning_matches_service_defaults() {
        let tuning = CorrectionTuning::default();
        assert!(!tuning.accuracy_boost);
        assert_eq!(tuning.eyesize_sensitivity, 3);
        assert_eq!(tuning.gaze_pitch_threshold_high, 30);
    }

    #[test]
    fn test_submit_request_shape() {
        let tuning = CorrectionTuning::default();
        let request = SubmitRequest {
            function: CORRECTION_FUNCTION,
            inputs: SubmitInputs {
                input_video: VideoRef {
                    url: "https://example.com/v.mp4".to_string(),
                },
                tuning: &tuning,
            },
        };
        let value = serde_json::to_value(&request).unwrap();
        assert_eq!(value["function"], "sieve/eye-contact-correction");
        assert_eq!(value["inputs"]["input_video"]["url"], "https://example.com/v.mp4");
        // Tuning flattens into inputs.
        assert_eq!(value["inputs"]["eyesize_sensitivity"], 3);
    }

    #[test]
    fn test_terminal_statuses() {
        assert!(!JobStatus::Processing.is_terminal());
        assert!(JobStatus::Finished {
            output_locator: None
        }
        .is_terminal());
        assert!(JobStatus::Failed {
            message: "x".to_string()
        }
        .is_terminal());
    }

    #[test]
    fn test_missing_api_key_is_fatal() {
        let err = CorrectionClient::new("https://example.com/v2", None).unwrap_err();
        assert!(matches!(err, CorrectionError::MissingApiKey));
    }
}
