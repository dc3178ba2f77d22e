//! Stream multiplexer: attaches the live source's audio tracks onto the
//! canvas-derived video stream.
//!
//! Stateless and synchronous. Refuses to build a stream when an input
//! is missing; a recording must never silently come out video-only.

use std::sync::Arc;
use thiserror::Error;

use crate::capture::{AudioTrack, MediaSource};
use crate::compositor::CanvasHandle;

#[derive(Debug, Error)]
pub enum MuxError {
    #[error("canvas stream unavailable")]
    MissingCanvas,
    #[error("live source unavailable")]
    MissingSource,
    #[error("live source has no audio track")]
    NoAudioTrack,
}

/// One recordable stream: composited video plus every source audio track.
#[derive(Debug)]
pub struct CombinedStream {
    pub canvas: CanvasHandle,
    pub audio_tracks: Vec<AudioTrack>,
}

pub fn combine(
    canvas: Option<CanvasHandle>,
    source: Option<&Arc<dyn MediaSource>>,
) -> Result<CombinedStream, MuxError> {
    let canvas = canvas.ok_or(MuxError::MissingCanvas)?;
    let source = source.ok_or(MuxError::MissingSource)?;

    let audio_tracks = source.audio_tracks();
    if audio_tracks.is_empty() {
        return Err(MuxError::NoAudioTrack);
    }

    Ok(CombinedStream {
        canvas,
        audio_tracks,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::VideoFrame;

    struct FakeSource {
        tracks: Vec<AudioTrack>,
    }

    impl MediaSource for FakeSource {
        fn native_size(&self) -> Option<(u32, u32)> {
            Some((4, 4))
        }
        fn latest_frame(&self) -> Option<VideoFrame> {
            None
        }
        fn audio_tracks(&self) -> Vec<AudioTrack> {
            self.tracks.clone()
        }
        fn set_muted(&self, _muted: bool) {}
        fn is_muted(&self) -> bool {
            false
        }
        fn set_hidden(&self, _hidden: bool) {}
        fn is_hidden(&self) -> bool {
            false
        }
        fn stop_tracks(&self) {}
    }

    #[test]
    fn test_combine_requires_canvas() {
        let (track, _tx) = AudioTrack::new("mic", 48000, 1);
        let source: Arc<dyn MediaSource> = Arc::new(FakeSource {
            tracks: vec![track],
        });
        let err = combine(None, Some(&source)).unwrap_err();
        assert!(matches!(err, MuxError::MissingCanvas));
    }

    #[test]
    fn test_combine_requires_source() {
        let err = combine(Some(CanvasHandle::new(4, 4)), None).unwrap_err();
        assert!(matches!(err, MuxError::MissingSource));
    }

    #[test]
    fn test_combine_refuses_video_only() {
        let source: Arc<dyn MediaSource> = Arc::new(FakeSource { tracks: Vec::new() });
        let err = combine(Some(CanvasHandle::new(4, 4)), Some(&source)).unwrap_err();
        assert!(matches!(err, MuxError::NoAudioTrack));
    }

    #[test]
    fn test_combine_attaches_all_tracks() {
        let (a, _ta) = AudioTrack::new("mic", 48000, 1);
        let (b, _tb) = AudioTrack::new("aux", 44100, 2);
        let source: Arc<dyn MediaSource> = Arc::new(FakeSource { tracks: vec![a, b] });
        let stream = combine(Some(CanvasHandle::new(4, 4)), Some(&source)).unwrap();
        assert_eq!(stream.audio_tracks.len(), 2);
    }
}
