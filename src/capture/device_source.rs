//! Camera + microphone capture backed by real devices.
//!
//! The camera runs on a dedicated thread via nokhwa, publishing decoded
//! RGBA frames into a shared slot. The microphone runs on its own thread
//! via cpal so the !Send stream never crosses thread boundaries; samples
//! flow out through the track's channel.

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use nokhwa::pixel_format::RgbAFormat;
use nokhwa::utils::{ApiBackend, CameraIndex, RequestedFormat, RequestedFormatType};
use nokhwa::Camera;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{mpsc as std_mpsc, Arc, Mutex};
use std::thread::JoinHandle;
use std::time::Duration;
use tracing::{debug, error, info, warn};

use super::frame::VideoFrame;
use super::media_source::{AcquisitionError, AudioTrack, MediaSource};
use crate::config::CaptureConfig;

const CAMERA_OPEN_TIMEOUT: Duration = Duration::from_secs(10);

/// One enumerated camera device.
#[derive(Debug, Clone)]
pub struct CameraDescriptor {
    pub index: u32,
    pub name: String,
}

/// List cameras visible to the platform backend.
pub fn list_cameras() -> Vec<CameraDescriptor> {
    match nokhwa::query(ApiBackend::Auto) {
        Ok(cameras) => cameras
            .into_iter()
            .filter_map(|info| {
                let index = match info.index() {
                    CameraIndex::Index(i) => i.to_owned(),
                    CameraIndex::String(_) => return None,
                };
                Some(CameraDescriptor {
                    index,
                    name: info.human_name().to_string(),
                })
            })
            .collect(),
        Err(e) => {
            warn!("Failed to enumerate cameras: {e}");
            Vec::new()
        }
    }
}

pub struct DeviceSource {
    native_size: (u32, u32),
    latest: Arc<Mutex<Option<VideoFrame>>>,
    running: Arc<AtomicBool>,
    hidden: Arc<AtomicBool>,
    muted: Arc<AtomicBool>,
    track: AudioTrack,
    camera_thread: Mutex<Option<JoinHandle<()>>>,
    audio_thread: Mutex<Option<JoinHandle<()>>>,
}

impl DeviceSource {
    /// Open the camera and microphone. Fails fast when either device is
    /// unavailable; acquisition errors are fatal and the user retries.
    pub fn open(config: &CaptureConfig) -> Result<Self, AcquisitionError> {
        let running = Arc::new(AtomicBool::new(true));
        let latest: Arc<Mutex<Option<VideoFrame>>> = Arc::new(Mutex::new(None));

        let camera_index = CameraIndex::Index(config.camera_index.unwrap_or(0));
        let (camera_thread, native_size) =
            spawn_camera_thread(camera_index, Arc::clone(&running), Arc::clone(&latest))?;

        let (track, audio_thread) = match spawn_audio_thread(config.sample_rate, Arc::clone(&running))
        {
            Ok(pair) => pair,
            Err(e) => {
                // Camera is already streaming; tear it down before bailing.
                running.store(false, Ordering::SeqCst);
                let _ = camera_thread.join();
                return Err(e);
            }
        };

        info!(
            "Media source opened: camera {}x{}, mic @ {}Hz",
            native_size.0, native_size.1, config.sample_rate
        );

        Ok(Self {
            native_size,
            latest,
            running,
            hidden: Arc::new(AtomicBool::new(false)),
            muted: Arc::new(AtomicBool::new(false)),
            track,
            camera_thread: Mutex::new(Some(camera_thread)),
            audio_thread: Mutex::new(Some(audio_thread)),
        })
    }
}

impl MediaSource for DeviceSource {
    fn native_size(&self) -> Option<(u32, u32)> {
        Some(self.native_size)
    }

    fn latest_frame(&self) -> Option<VideoFrame> {
        if !self.running.load(Ordering::SeqCst) {
            return None;
        }
        if self.hidden.load(Ordering::SeqCst) {
            return Some(VideoFrame::black(self.native_size.0, self.native_size.1));
        }
        self.latest.lock().ok().and_then(|slot| slot.clone())
    }

    fn audio_tracks(&self) -> Vec<AudioTrack> {
        vec![self.track.clone()]
    }

    fn set_muted(&self, muted: bool) {
        self.muted.store(muted, Ordering::SeqCst);
        self.track.set_enabled(!muted);
    }

    fn is_muted(&self) -> bool {
        self.muted.load(Ordering::SeqCst)
    }

    fn set_hidden(&self, hidden: bool) {
        self.hidden.store(hidden, Ordering::SeqCst);
    }

    fn is_hidden(&self) -> bool {
        self.hidden.load(Ordering::SeqCst)
    }

    fn stop_tracks(&self) {
        if !self.running.swap(false, Ordering::SeqCst) {
            return;
        }
        if let Ok(mut slot) = self.camera_thread.lock() {
            if let Some(handle) = slot.take() {
                let _ = handle.join();
            }
        }
        if let Ok(mut slot) = self.audio_thread.lock() {
            if let Some(handle) = slot.take() {
                let _ = handle.join();
            }
        }
        info!("Media source tracks stopped");
    }
}

impl Drop for DeviceSource {
    fn drop(&mut self) {
        self.stop_tracks();
    }
}

fn spawn_camera_thread(
    index: CameraIndex,
    running: Arc<AtomicBool>,
    latest: Arc<Mutex<Option<VideoFrame>>>,
) -> Result<(JoinHandle<()>, (u32, u32)), AcquisitionError> {
    let (size_tx, size_rx) = std_mpsc::channel::<Result<(u32, u32), AcquisitionError>>();

    let thread_running = Arc::clone(&running);
    let handle = std::thread::spawn(move || {
        let format =
            RequestedFormat::new::<RgbAFormat>(RequestedFormatType::AbsoluteHighestResolution);

        let mut camera = match Camera::new(index, format) {
            Ok(camera) => camera,
            Err(e) => {
                let _ = size_tx.send(Err(AcquisitionError::Camera(e.to_string())));
                return;
            }
        };

        if let Err(e) = camera.open_stream() {
            let _ = size_tx.send(Err(AcquisitionError::Camera(e.to_string())));
            return;
        }

        let camera_format = camera.camera_format();
        let width = camera_format.resolution().width();
        let height = camera_format.resolution().height();
        let _ = size_tx.send(Ok((width, height)));

        debug!("Camera thread streaming at {width}x{height}");

        while thread_running.load(Ordering::SeqCst) {
            // frame() blocks until the camera delivers; the device paces us.
            match camera.frame() {
                Ok(buffer) => match buffer.decode_image::<RgbAFormat>() {
                    Ok(image) => {
                        let frame =
                            VideoFrame::new(image.width(), image.height(), image.into_raw());
                        if let Ok(mut slot) = latest.lock() {
                            *slot = Some(frame);
                        }
                    }
                    Err(e) => debug!("Failed to decode camera frame: {e}"),
                },
                Err(e) => debug!("Failed to capture camera frame: {e}"),
            }
        }

        if let Err(e) = camera.stop_stream() {
            warn!("Error stopping camera stream: {e}");
        }
        debug!("Camera thread stopped");
    });

    match size_rx.recv_timeout(CAMERA_OPEN_TIMEOUT) {
        Ok(Ok(size)) => Ok((handle, size)),
        Ok(Err(e)) => {
            let _ = handle.join();
            Err(e)
        }
        Err(_) => {
            running.store(false, Ordering::SeqCst);
            Err(AcquisitionError::Camera(
                "timed out waiting for camera to open".to_string(),
            ))
        }
    }
}

fn spawn_audio_thread(
    sample_rate: u32,
    running: Arc<AtomicBool>,
) -> Result<(AudioTrack, JoinHandle<()>), AcquisitionError> {
    let host = cpal::default_host();
    let device = host
        .default_input_device()
        .ok_or(AcquisitionError::NoMicrophone)?;

    let label = device.name().unwrap_or_else(|_| "microphone".to_string());
    let (track, sample_tx) = AudioTrack::new(label, sample_rate, 1);

    let stream_config = cpal::StreamConfig {
        channels: 1,
        sample_rate: cpal::SampleRate(sample_rate),
        buffer_size: cpal::BufferSize::Default,
    };

    // The cpal stream is !Send, so it lives and dies on this thread.
    let handle = std::thread::spawn(move || {
        let err_fn = |err| error!("Microphone stream error: {err}");

        let stream = match device.build_input_stream(
            &stream_config,
            move |data: &[f32], _: &cpal::InputCallbackInfo| {
                let _ = sample_tx.send(data.to_vec());
            },
            err_fn,
            None,
        ) {
            Ok(stream) => stream,
            Err(e) => {
                error!("Failed to build microphone stream: {e}");
                return;
            }
        };

        if let Err(e) = stream.play() {
            error!("Failed to start microphone stream: {e}");
            return;
        }

        while running.load(Ordering::SeqCst) {
            std::thread::sleep(Duration::from_millis(50));
        }

        drop(stream);
        debug!("Microphone thread stopped");
    });

    Ok((track, handle))
}
