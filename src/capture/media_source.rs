//! Live media source abstraction.
//!
//! The acquirer owns the camera and microphone tracks. Downstream
//! consumers (compositor, recorder) borrow handles to them; only the
//! acquirer stops tracks.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use thiserror::Error;
use tokio::sync::mpsc;

use super::frame::VideoFrame;

#[derive(Debug, Error)]
pub enum AcquisitionError {
    #[error("no camera available")]
    NoCamera,
    #[error("no microphone available")]
    NoMicrophone,
    #[error("failed to open camera: {0}")]
    Camera(String),
    #[error("failed to open microphone: {0}")]
    Microphone(String),
}

/// Trait for live capture sources (camera + microphone, test doubles).
pub trait MediaSource: Send + Sync {
    /// Native video size as reported by the device, if known.
    fn native_size(&self) -> Option<(u32, u32)>;

    /// Most recent camera frame. Returns black frames while hidden,
    /// `None` before the first frame arrives or after the source stopped.
    fn latest_frame(&self) -> Option<VideoFrame>;

    /// All audio tracks carried by this source.
    fn audio_tracks(&self) -> Vec<AudioTrack>;

    fn set_muted(&self, muted: bool);

    fn is_muted(&self) -> bool;

    fn set_hidden(&self, hidden: bool);

    fn is_hidden(&self) -> bool;

    /// Stop all tracks. Only the acquirer calls this.
    fn stop_tracks(&self);
}

/// Handle to one live audio track.
///
/// Samples flow through an unbounded channel filled by the capture
/// thread. Exactly one consumer may take the receiver. A disabled
/// (muted) track keeps flowing; consumers substitute silence.
#[derive(Debug, Clone)]
pub struct AudioTrack {
    pub id: String,
    pub label: String,
    pub sample_rate: u32,
    pub channels: u16,
    enabled: Arc<AtomicBool>,
    receiver: Arc<Mutex<Option<mpsc::UnboundedReceiver<Vec<f32>>>>>,
}

impl AudioTrack {
    pub fn new(
        label: impl Into<String>,
        sample_rate: u32,
        channels: u16,
    ) -> (Self, mpsc::UnboundedSender<Vec<f32>>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let track = Self {
            id: uuid::Uuid::new_v4().to_string(),
            label: label.into(),
            sample_rate,
            channels,
            enabled: Arc::new(AtomicBool::new(true)),
            receiver: Arc::new(Mutex::new(Some(rx))),
        };
        (track, tx)
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::SeqCst)
    }

    pub fn set_enabled(&self, enabled: bool) {
        self.enabled.store(enabled, Ordering::SeqCst);
    }

    /// Take the sample receiver. Returns `None` if already taken.
    pub fn take_receiver(&self) -> Option<mpsc::UnboundedReceiver<Vec<f32>>> {
        self.receiver.lock().ok().and_then(|mut slot| slot.take())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_track_enabled_flag_is_shared_across_clones() {
        let (track, _tx) = AudioTrack::new("mic", 48000, 1);
        let clone = track.clone();
        assert!(clone.is_enabled());
        track.set_enabled(false);
        assert!(!clone.is_enabled());
    }

    #[tokio::test]
    async fn test_track_receiver_taken_once() {
        let (track, tx) = AudioTrack::new("mic", 48000, 1);
        let mut rx = track.take_receiver().expect("first take");
        assert!(track.take_receiver().is_none());

        tx.send(vec![0.5, -0.5]).unwrap();
        assert_eq!(rx.recv().await, Some(vec![0.5, -0.5]));
    }
}
