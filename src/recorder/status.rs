//! Recording status types and shared state handle.

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;

use super::format::EncodingFormat;

/// Phase of the recording lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecordingPhase {
    Idle,
    Recording,
    Paused,
    Finalizing,
}

impl RecordingPhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Recording => "recording",
            Self::Paused => "paused",
            Self::Finalizing => "finalizing",
        }
    }
}

/// Current recording state.
#[derive(Debug, Clone)]
pub struct RecordingState {
    pub phase: RecordingPhase,
    pub session_id: Option<uuid::Uuid>,
    pub format: Option<EncodingFormat>,
    pub started_at: Option<chrono::DateTime<chrono::Utc>>,
    pub last_error: Option<String>,
    recorded: Duration,
    resumed_at: Option<Instant>,
}

impl Default for RecordingState {
    fn default() -> Self {
        Self {
            phase: RecordingPhase::Idle,
            session_id: None,
            format: None,
            started_at: None,
            last_error: None,
            recorded: Duration::ZERO,
            resumed_at: None,
        }
    }
}

impl RecordingState {
    /// Seconds spent actually recording, excluding paused spans.
    pub fn elapsed_seconds(&self) -> u64 {
        let running = self
            .resumed_at
            .map(|at| at.elapsed())
            .unwrap_or(Duration::ZERO);
        (self.recorded + running).as_secs()
    }
}

/// Shared handle between the machine, its event drain and callers.
#[derive(Clone, Default)]
pub struct RecordingStatusHandle {
    inner: Arc<Mutex<RecordingState>>,
}

impl RecordingStatusHandle {
    pub async fn get(&self) -> RecordingState {
        self.inner.lock().await.clone()
    }

    pub async fn start(&self, format: EncodingFormat) {
        let mut state = self.inner.lock().await;
        *state = RecordingState::default();
        state.phase = RecordingPhase::Recording;
        state.session_id = Some(uuid::Uuid::new_v4());
        state.format = Some(format);
        state.started_at = Some(chrono::Utc::now());
        state.resumed_at = Some(Instant::now());
    }

    pub async fn pause(&self) {
        let mut state = self.inner.lock().await;
        if let Some(at) = state.resumed_at.take() {
            state.recorded += at.elapsed();
        }
        state.phase = RecordingPhase::Paused;
    }

    pub async fn resume(&self) {
        let mut state = self.inner.lock().await;
        state.resumed_at = Some(Instant::now());
        state.phase = RecordingPhase::Recording;
    }

    pub async fn finalize(&self) {
        let mut state = self.inner.lock().await;
        if let Some(at) = state.resumed_at.take() {
            state.recorded += at.elapsed();
        }
        state.phase = RecordingPhase::Finalizing;
    }

    /// Abort back to idle, keeping the error visible.
    pub async fn set_error(&self, error: String) {
        let mut state = self.inner.lock().await;
        state.phase = RecordingPhase::Idle;
        state.resumed_at = None;
        state.last_error = Some(error);
    }

    pub async fn reset(&self) {
        let mut state = self.inner.lock().await;
        *state = RecordingState::default();
    }
}
