//! HTTP client for the script generation stream.

use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info};

use super::protocol::LineBuffer;
use super::session::{ScriptSession, ScriptSink, SessionState};

#[derive(Debug, Error)]
pub enum ScriptStreamError {
    #[error("script stream transport error: {0}")]
    Transport(String),
    #[error("script endpoint rejected request ({status})")]
    Rejected { status: u16 },
    #[error("script generation failed: {0}")]
    Terminal(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Tone {
    Professional,
    Casual,
    Enthusiastic,
    Informative,
}

impl std::fmt::Display for Tone {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Professional => "professional",
            Self::Casual => "casual",
            Self::Enthusiastic => "enthusiastic",
            Self::Informative => "informative",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ScriptRequest {
    pub topic: String,
    /// Target speaking time in minutes.
    pub duration: u32,
    pub tone: Tone,
}

/// Result of a finished stream. `completed` is false when the stream
/// ended without a `complete` event; the accumulated text is still the
/// best available script.
#[derive(Debug, Clone)]
pub struct ScriptOutcome {
    pub script: String,
    pub script_id: Option<String>,
    pub title: Option<String>,
    pub completed: bool,
}

pub struct ScriptStreamClient {
    client: reqwest::Client,
    base_url: String,
}

impl ScriptStreamClient {
    pub fn new(base_url: &str) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    /// Open the stream and feed it through `sink` until the server
    /// completes, fails, or hangs up. Abandoning the returned future
    /// needs no cleanup; nothing outlives the call.
    pub async fn generate(
        &self,
        request: &ScriptRequest,
        sink: &mut dyn ScriptSink,
    ) -> Result<ScriptOutcome, ScriptStreamError> {
        info!(
            "Requesting script: topic={:?} duration={}min",
            request.topic, request.duration
        );

        let mut response = self
            .client
            .post(format!("{}/script/generate", self.base_url))
            .json(request)
            .send()
            .await
            .map_err(|e| ScriptStreamError::Transport(e.to_string()))?;

        if !response.status().is_success() {
            return Err(ScriptStreamError::Rejected {
                status: response.status().as_u16(),
            });
        }

        let mut buffer = LineBuffer::default();
        let mut session = ScriptSession::default();

        while let Some(bytes) = response
            .chunk()
            .await
            .map_err(|e| ScriptStreamError::Transport(e.to_string()))?
        {
            if !session.feed(&bytes, &mut buffer, sink) {
                break;
            }
        }

        // A final line may arrive without its newline.
        if !session.is_terminal() {
            if let Some(rest) = buffer.finish() {
                session.handle_line(&rest, sink);
            }
        }

        match session.state() {
            SessionState::Failed(message) => Err(ScriptStreamError::Terminal(message.clone())),
            state => {
                debug!(
                    "Script stream ended ({state:?}): {} chars",
                    session.text().len()
                );
                Ok(ScriptOutcome {
                    script: session.text().to_string(),
                    script_id: session.script_id().map(str::to_string),
                    title: session.title().map(str::to_string),
                    completed: *state == SessionState::Completed,
                })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_serialization() {
        let request = ScriptRequest {
            topic: "rust async".to_string(),
            duration: 2,
            tone: Tone::Professional,
        };
        let value = serde_json::to_value(&request).unwrap();
        assert_eq!(value["topic"], "rust async");
        assert_eq!(value["duration"], 2);
        assert_eq!(value["tone"], "professional");
    }
}
