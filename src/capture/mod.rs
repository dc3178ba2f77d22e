pub mod device_source;
pub mod frame;
pub mod media_source;

pub use device_source::{list_cameras, CameraDescriptor, DeviceSource};
pub use frame::VideoFrame;
pub use media_source::{AcquisitionError, AudioTrack, MediaSource};
