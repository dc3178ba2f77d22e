//! Recording lifecycle state machine.
//!
//! Idle → Recording ↔ Paused → Finalizing → Idle. The machine owns chunk
//! accumulation and the single listener surface; the encoder behind the
//! seam reports its own state, which is checked before pause/resume is
//! forwarded (controller intent can lag encoder reality).
//!
//! Callers serialize transitions themselves. The machine does not lock
//! against concurrent start/stop.

use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use super::artifact::Artifact;
use super::encoder::{EncodedChunk, EncoderEvent, EncoderState, MediaEncoder};
use super::format::{negotiate, EncodingFormat, FormatProbe};
use super::status::{RecordingPhase, RecordingStatusHandle};
use crate::mux::{CombinedStream, MuxError};
use crate::upload::{ArtifactUploader, UploadError, UploadMetadata, UploadedVideo};

#[derive(Debug, Error)]
pub enum RecorderError {
    #[error("recording stream unavailable: {0}")]
    NoStream(#[from] MuxError),
    #[error("no supported encoding format")]
    UnsupportedFormat,
    #[error("encoder fault: {0}")]
    EncoderFault(String),
    #[error("cannot {action} while {phase}")]
    Transition {
        action: &'static str,
        phase: &'static str,
    },
}

/// Observable recording events, forwarded to every registered listener.
#[derive(Debug, Clone)]
pub enum RecorderEvent {
    Started { format: EncodingFormat },
    Chunk { seq: u64, bytes: usize },
    Paused,
    Resumed,
    Error { message: String },
    Stopped { chunks: usize },
}

pub type RecorderListener = Box<dyn Fn(&RecorderEvent) + Send + Sync>;

/// Everything a finished recording leaves behind. The artifact is always
/// present and locally retrievable, whatever the upload did.
#[derive(Debug)]
pub struct StopOutcome {
    pub artifact: Artifact,
    pub local_path: Option<PathBuf>,
    pub uploaded: Result<UploadedVideo, UploadError>,
}

pub struct RecordingMachine {
    encoder: Arc<dyn MediaEncoder>,
    uploader: Arc<dyn ArtifactUploader>,
    probe: Arc<dyn FormatProbe>,
    status: RecordingStatusHandle,
    chunks: Arc<Mutex<Vec<EncodedChunk>>>,
    listeners: Arc<Mutex<Vec<RecorderListener>>>,
    drain: tokio::sync::Mutex<Option<JoinHandle<()>>>,
    output_dir: PathBuf,
    keep_local: bool,
}

impl RecordingMachine {
    pub fn new(
        encoder: Arc<dyn MediaEncoder>,
        uploader: Arc<dyn ArtifactUploader>,
        probe: Arc<dyn FormatProbe>,
        status: RecordingStatusHandle,
        output_dir: PathBuf,
    ) -> Self {
        Self {
            encoder,
            uploader,
            probe,
            status,
            chunks: Arc::new(Mutex::new(Vec::new())),
            listeners: Arc::new(Mutex::new(Vec::new())),
            drain: tokio::sync::Mutex::new(None),
            output_dir,
            keep_local: true,
        }
    }

    /// Whether to keep a local copy of finished artifacts on disk.
    pub fn with_keep_local(mut self, keep_local: bool) -> Self {
        self.keep_local = keep_local;
        self
    }

    pub fn status(&self) -> RecordingStatusHandle {
        self.status.clone()
    }

    pub fn add_listener(&self, listener: impl Fn(&RecorderEvent) + Send + Sync + 'static) {
        if let Ok(mut listeners) = self.listeners.lock() {
            listeners.push(Box::new(listener));
        }
    }

    /// Start recording the given stream. Fatal on missing stream (the
    /// caller maps mux failures) and on format negotiation failure.
    pub async fn start(&self, stream: CombinedStream) -> Result<EncodingFormat, RecorderError> {
        let phase = self.status.get().await.phase;
        if phase != RecordingPhase::Idle {
            return Err(RecorderError::Transition {
                action: "start",
                phase: phase.as_str(),
            });
        }

        let format = negotiate(&*self.probe).ok_or(RecorderError::UnsupportedFormat)?;

        // Fresh chunk sequence for this session.
        if let Ok(mut chunks) = self.chunks.lock() {
            chunks.clear();
        }

        let (tx, rx) = mpsc::unbounded_channel();
        self.encoder
            .start(stream, format, tx)
            .await
            .map_err(|e| RecorderError::EncoderFault(e.to_string()))?;

        self.status.start(format).await;

        let drain = tokio::spawn(drain_events(
            rx,
            Arc::clone(&self.chunks),
            Arc::clone(&self.listeners),
            self.status.clone(),
        ));
        *self.drain.lock().await = Some(drain);

        info!("Recording started ({format})");
        Ok(format)
    }

    pub async fn pause(&self) -> Result<(), RecorderError> {
        let phase = self.status.get().await.phase;
        if phase != RecordingPhase::Recording {
            return Err(RecorderError::Transition {
                action: "pause",
                phase: phase.as_str(),
            });
        }

        // Only forward when the encoder agrees it is recording.
        if self.encoder.state() == EncoderState::Recording {
            self.encoder
                .pause()
                .await
                .map_err(|e| RecorderError::EncoderFault(e.to_string()))?;
        } else {
            warn!(
                "Encoder state {:?} does not match pause precondition; flag only",
                self.encoder.state()
            );
        }

        self.status.pause().await;
        emit(&self.listeners, &RecorderEvent::Paused);
        info!("Recording paused");
        Ok(())
    }

    pub async fn resume(&self) -> Result<(), RecorderError> {
        let phase = self.status.get().await.phase;
        if phase != RecordingPhase::Paused {
            return Err(RecorderError::Transition {
                action: "resume",
                phase: phase.as_str(),
            });
        }

        if self.encoder.state() == EncoderState::Paused {
            self.encoder
                .resume()
                .await
                .map_err(|e| RecorderError::EncoderFault(e.to_string()))?;
        } else {
            warn!(
                "Encoder state {:?} does not match resume precondition; flag only",
                self.encoder.state()
            );
        }

        self.status.resume().await;
        emit(&self.listeners, &RecorderEvent::Resumed);
        info!("Recording resumed");
        Ok(())
    }

    /// Stop, finalize the artifact and attempt the upload. The artifact
    /// is retained locally regardless of the upload outcome; an upload
    /// failure never re-enters `Recording`.
    pub async fn stop(
        &self,
        metadata: Option<UploadMetadata>,
    ) -> Result<StopOutcome, RecorderError> {
        let state = self.status.get().await;
        if !matches!(
            state.phase,
            RecordingPhase::Recording | RecordingPhase::Paused
        ) {
            return Err(RecorderError::Transition {
                action: "stop",
                phase: state.phase.as_str(),
            });
        }

        self.status.finalize().await;

        self.encoder
            .stop()
            .await
            .map_err(|e| RecorderError::EncoderFault(e.to_string()))?;

        // Await all chunks: the drain ends on the terminal encoder event.
        if let Some(drain) = self.drain.lock().await.take() {
            let _ = drain.await;
        }

        let chunks = self
            .chunks
            .lock()
            .map(|mut c| std::mem::take(&mut *c))
            .unwrap_or_default();

        if chunks.is_empty() {
            if let Some(message) = self.status.get().await.last_error {
                self.status.reset().await;
                return Err(RecorderError::EncoderFault(message));
            }
        }

        let format = state.format.unwrap_or(super::format::PREFERENCE_ORDER[0]);
        let artifact = Artifact::from_chunks(&chunks, format);
        info!(
            "Recording finalized: {} chunks, {} bytes",
            chunks.len(),
            artifact.len()
        );

        let local_path = if self.keep_local {
            match artifact.save_to(&self.output_dir).await {
                Ok(path) => Some(path),
                Err(e) => {
                    warn!("Failed to keep local artifact copy: {e:#}");
                    None
                }
            }
        } else {
            None
        };

        let uploaded = match &local_path {
            Some(path) => {
                self.uploader
                    .upload_file(
                        path,
                        &artifact.file_name,
                        &artifact.mime_type,
                        metadata.as_ref(),
                    )
                    .await
            }
            None => self.uploader.upload_bytes(&artifact, metadata.as_ref()).await,
        };

        if let Err(e) = &uploaded {
            error!("Upload failed (artifact retained locally): {e}");
        }

        self.status.reset().await;

        Ok(StopOutcome {
            artifact,
            local_path,
            uploaded,
        })
    }
}

fn emit(listeners: &Arc<Mutex<Vec<RecorderListener>>>, event: &RecorderEvent) {
    if let Ok(listeners) = listeners.lock() {
        for listener in listeners.iter() {
            listener(event);
        }
    }
}

async fn drain_events(
    mut rx: mpsc::UnboundedReceiver<EncoderEvent>,
    chunks: Arc<Mutex<Vec<EncodedChunk>>>,
    listeners: Arc<Mutex<Vec<RecorderListener>>>,
    status: RecordingStatusHandle,
) {
    while let Some(event) = rx.recv().await {
        match event {
            EncoderEvent::Started { format } => {
                emit(&listeners, &RecorderEvent::Started { format });
            }
            EncoderEvent::Chunk(chunk) => {
                let seq = chunk.seq;
                let bytes = chunk.data.len();
                if let Ok(mut stored) = chunks.lock() {
                    // Append-only, arrival order.
                    stored.push(chunk);
                }
                emit(&listeners, &RecorderEvent::Chunk { seq, bytes });
            }
            EncoderEvent::Error(message) => {
                error!("Encoder fault, aborting recording: {message}");
                if let Ok(mut stored) = chunks.lock() {
                    stored.clear();
                }
                status.set_error(message.clone()).await;
                emit(&listeners, &RecorderEvent::Error { message });
                break;
            }
            EncoderEvent::Stopped => {
                let count = chunks.lock().map(|c| c.len()).unwrap_or(0);
                emit(&listeners, &RecorderEvent::Stopped { chunks: count });
                break;
            }
        }
    }
}
