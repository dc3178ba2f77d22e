//! Encoder seam between the recording state machine and whatever turns
//! composited frames plus audio into container bytes.

use async_trait::async_trait;
use tokio::sync::mpsc;

use super::format::EncodingFormat;
use crate::mux::CombinedStream;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EncoderState {
    Inactive,
    Recording,
    Paused,
}

/// One encoded segment in emission order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodedChunk {
    pub seq: u64,
    pub data: Vec<u8>,
}

/// Tagged encoder lifecycle events, delivered over one channel.
#[derive(Debug, Clone)]
pub enum EncoderEvent {
    Started { format: EncodingFormat },
    Chunk(EncodedChunk),
    Error(String),
    Stopped,
}

/// Trait for media encoders.
///
/// `start` takes ownership of the combined stream and the event sender;
/// the encoder emits `Started`, then zero or more `Chunk`s at its flush
/// cadence, then exactly one terminal `Stopped` (or `Error`). Callers
/// serialize transitions; implementations report their own state so the
/// machine can verify preconditions before pause/resume.
#[async_trait]
pub trait MediaEncoder: Send + Sync {
    async fn start(
        &self,
        stream: CombinedStream,
        format: EncodingFormat,
        events: mpsc::UnboundedSender<EncoderEvent>,
    ) -> anyhow::Result<()>;

    async fn pause(&self) -> anyhow::Result<()>;

    async fn resume(&self) -> anyhow::Result<()>;

    /// Request a final flush and shutdown. The terminal event arrives on
    /// the channel handed to `start`.
    async fn stop(&self) -> anyhow::Result<()>;

    fn state(&self) -> EncoderState;
}
