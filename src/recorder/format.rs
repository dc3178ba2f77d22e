//! Encoding format negotiation.
//!
//! A fixed preference list, ordered to trade compatibility against file
//! size: mp4 first, then webm with progressively older codecs. The first
//! entry the runtime encoder supports wins; no supported entry is a hard
//! error reported to the caller.

use std::path::PathBuf;
use std::sync::OnceLock;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Container {
    Mp4,
    Webm,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VideoCodec {
    H264,
    Vp9,
    Vp8,
}

/// A container/codec pairing. `codec: None` means "container default"
/// (the generic webm fallback).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EncodingFormat {
    pub container: Container,
    pub codec: Option<VideoCodec>,
}

/// Preference order, most compatible first.
pub const PREFERENCE_ORDER: [EncodingFormat; 5] = [
    EncodingFormat {
        container: Container::Mp4,
        codec: Some(VideoCodec::H264),
    },
    EncodingFormat {
        container: Container::Webm,
        codec: Some(VideoCodec::H264),
    },
    EncodingFormat {
        container: Container::Webm,
        codec: Some(VideoCodec::Vp9),
    },
    EncodingFormat {
        container: Container::Webm,
        codec: Some(VideoCodec::Vp8),
    },
    EncodingFormat {
        container: Container::Webm,
        codec: None,
    },
];

impl EncodingFormat {
    pub fn mime_type(&self) -> &'static str {
        match (self.container, self.codec) {
            (Container::Mp4, _) => "video/mp4",
            (Container::Webm, Some(VideoCodec::H264)) => "video/webm;codecs=h264",
            (Container::Webm, Some(VideoCodec::Vp9)) => "video/webm;codecs=vp9",
            (Container::Webm, Some(VideoCodec::Vp8)) => "video/webm;codecs=vp8",
            (Container::Webm, None) => "video/webm",
        }
    }

    pub fn extension(&self) -> &'static str {
        match self.container {
            Container::Mp4 => "mp4",
            Container::Webm => "webm",
        }
    }

    /// Name of the ffmpeg video encoder that produces this format.
    pub fn video_encoder(&self) -> &'static str {
        match self.codec {
            Some(VideoCodec::H264) => "libx264",
            Some(VideoCodec::Vp9) => "libvpx-vp9",
            Some(VideoCodec::Vp8) | None => "libvpx",
        }
    }

    pub fn audio_encoder(&self) -> &'static str {
        match self.container {
            Container::Mp4 => "aac",
            Container::Webm => "libopus",
        }
    }

    /// Whether the pairing is expressible at all. h264-in-webm exists in
    /// the preference list for parity with legacy players but no encoder
    /// produces it, so it always falls through.
    pub fn is_coherent(&self) -> bool {
        !matches!(
            (self.container, self.codec),
            (Container::Webm, Some(VideoCodec::H264))
        )
    }
}

impl std::fmt::Display for EncodingFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.mime_type())
    }
}

/// Runtime support oracle for encoding formats.
pub trait FormatProbe: Send + Sync {
    fn is_supported(&self, format: &EncodingFormat) -> bool;
}

/// Walk the preference list and return the first supported entry.
pub fn negotiate(probe: &dyn FormatProbe) -> Option<EncodingFormat> {
    for format in PREFERENCE_ORDER {
        if probe.is_supported(&format) {
            info!("Negotiated recording format: {format}");
            return Some(format);
        }
        debug!("Format not supported, falling through: {format}");
    }
    warn!("No supported recording format in preference list");
    None
}

/// Probe backed by the installed ffmpeg binary's encoder list.
pub struct FfmpegProbe {
    binary: PathBuf,
    encoders: OnceLock<String>,
}

impl FfmpegProbe {
    /// Locate ffmpeg on PATH.
    pub fn discover() -> Option<Self> {
        match which::which("ffmpeg") {
            Ok(binary) => {
                debug!("Found ffmpeg at {:?}", binary);
                Some(Self {
                    binary,
                    encoders: OnceLock::new(),
                })
            }
            Err(e) => {
                warn!("ffmpeg not found on PATH: {e}");
                None
            }
        }
    }

    pub fn binary(&self) -> &PathBuf {
        &self.binary
    }

    fn encoder_list(&self) -> &str {
        self.encoders.get_or_init(|| {
            match std::process::Command::new(&self.binary)
                .args(["-hide_banner", "-encoders"])
                .output()
            {
                Ok(output) => String::from_utf8_lossy(&output.stdout).into_owned(),
                Err(e) => {
                    warn!("Failed to list ffmpeg encoders: {e}");
                    String::new()
                }
            }
        })
    }
}

impl FormatProbe for FfmpegProbe {
    fn is_supported(&self, format: &EncodingFormat) -> bool {
        if !format.is_coherent() {
            return false;
        }
        let needle = format!(" {} ", format.video_encoder());
        self.encoder_list().contains(&needle)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    struct FixedProbe {
        supported: HashSet<&'static str>,
    }

    impl FixedProbe {
        fn new(mimes: &[&'static str]) -> Self {
            Self {
                supported: mimes.iter().copied().collect(),
            }
        }
    }

    impl FormatProbe for FixedProbe {
        fn is_supported(&self, format: &EncodingFormat) -> bool {
            self.supported.contains(format.mime_type())
        }
    }

    #[test]
    fn test_first_supported_entry_wins() {
        let probe = FixedProbe::new(&["video/webm;codecs=vp9", "video/webm"]);
        let format = negotiate(&probe).unwrap();
        assert_eq!(format.mime_type(), "video/webm;codecs=vp9");
    }

    #[test]
    fn test_mp4_preferred_when_available() {
        let probe = FixedProbe::new(&["video/webm;codecs=vp8", "video/mp4"]);
        let format = negotiate(&probe).unwrap();
        assert_eq!(format.mime_type(), "video/mp4");
    }

    #[test]
    fn test_no_support_is_none() {
        let probe = FixedProbe::new(&[]);
        assert!(negotiate(&probe).is_none());
    }

    #[test]
    fn test_negotiation_is_deterministic() {
        let probe = FixedProbe::new(&["video/webm", "video/webm;codecs=vp8"]);
        let first = negotiate(&probe).unwrap();
        for _ in 0..10 {
            assert_eq!(negotiate(&probe).unwrap(), first);
        }
        assert_eq!(first.mime_type(), "video/webm;codecs=vp8");
    }

    #[test]
    fn test_webm_h264_is_incoherent() {
        let format = EncodingFormat {
            container: Container::Webm,
            codec: Some(VideoCodec::H264),
        };
        assert!(!format.is_coherent());
        assert_eq!(format.mime_type(), "video/webm;codecs=h264");
    }

    #[test]
    fn test_extensions_match_container() {
        assert_eq!(PREFERENCE_ORDER[0].extension(), "mp4");
        assert_eq!(PREFERENCE_ORDER[4].extension(), "webm");
    }
}
