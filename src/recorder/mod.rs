pub mod artifact;
pub mod encoder;
pub mod ffmpeg;
pub mod format;
pub mod machine;
pub mod status;

pub use artifact::Artifact;
pub use encoder::{EncodedChunk, EncoderEvent, EncoderState, MediaEncoder};
pub use ffmpeg::{FfmpegEncoder, FfmpegEncoderConfig};
pub use format::{negotiate, EncodingFormat, FfmpegProbe, FormatProbe, PREFERENCE_ORDER};
pub use machine::{RecorderError, RecorderEvent, RecordingMachine, StopOutcome};
pub use status::{RecordingPhase, RecordingState, RecordingStatusHandle};
