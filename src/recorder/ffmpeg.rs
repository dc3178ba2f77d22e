//! ffmpeg-backed media encoder.
//!
//! Drives one ffmpeg child per recording: composited canvas frames go in
//! as rawvideo on stdin, microphone samples as f32le PCM through a FIFO
//! side input, and the fragmented container comes back on stdout, where
//! it is cut into chunks at the flush cadence. Pausing simply stops
//! feeding; frame timing is counted, not wall-clock, so the output stays
//! continuous across a pause.

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::TempDir;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::process::Command;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::encoder::{EncodedChunk, EncoderEvent, EncoderState, MediaEncoder};
use super::format::{Container, EncodingFormat};
use crate::compositor::CanvasHandle;
use crate::mux::CombinedStream;

#[derive(Debug, Clone)]
pub struct FfmpegEncoderConfig {
    pub fps: u32,
    pub flush_interval: Duration,
    pub video_bitrate: u32,
}

impl Default for FfmpegEncoderConfig {
    fn default() -> Self {
        Self {
            fps: 30,
            flush_interval: Duration::from_secs(1),
            video_bitrate: 2_500_000,
        }
    }
}

pub struct FfmpegEncoder {
    binary: PathBuf,
    config: FfmpegEncoderConfig,
    state: Arc<Mutex<EncoderState>>,
    paused: Arc<AtomicBool>,
    runtime: tokio::sync::Mutex<Option<EncoderRuntime>>,
}

struct EncoderRuntime {
    cancel: CancellationToken,
    video_task: JoinHandle<()>,
    audio_task: JoinHandle<()>,
    output_task: JoinHandle<()>,
    _workdir: TempDir,
}

impl FfmpegEncoder {
    pub fn new(binary: PathBuf, config: FfmpegEncoderConfig) -> Self {
        Self {
            binary,
            config,
            state: Arc::new(Mutex::new(EncoderState::Inactive)),
            paused: Arc::new(AtomicBool::new(false)),
            runtime: tokio::sync::Mutex::new(None),
        }
    }

    fn set_state(&self, state: EncoderState) {
        if let Ok(mut slot) = self.state.lock() {
            *slot = state;
        }
    }

    fn build_command(
        &self,
        width: u32,
        height: u32,
        sample_rate: u32,
        channels: u16,
        fifo: &PathBuf,
        format: EncodingFormat,
    ) -> Command {
        let mut cmd = Command::new(&self.binary);
        cmd.args(["-hide_banner", "-loglevel", "error"])
            .args(["-f", "rawvideo", "-pix_fmt", "rgba"])
            .arg("-video_size")
            .arg(format!("{width}x{height}"))
            .arg("-framerate")
            .arg(self.config.fps.to_string())
            .args(["-i", "pipe:0"])
            .args(["-f", "f32le"])
            .arg("-ar")
            .arg(sample_rate.to_string())
            .arg("-ac")
            .arg(channels.to_string())
            .arg("-i")
            .arg(fifo)
            .arg("-c:v")
            .arg(format.video_encoder())
            .arg("-b:v")
            .arg(self.config.video_bitrate.to_string());

        match format.container {
            Container::Mp4 => {
                // Fragmented mp4 so the container is valid as a byte
                // stream cut at arbitrary chunk boundaries.
                cmd.args(["-preset", "veryfast", "-pix_fmt", "yuv420p"])
                    .args(["-movflags", "frag_keyframe+empty_moov"])
                    .args(["-f", "mp4"]);
            }
            Container::Webm => {
                cmd.args(["-deadline", "realtime", "-cpu-used", "8"])
                    .args(["-f", "webm"]);
            }
        }

        cmd.arg("-c:a")
            .arg(format.audio_encoder())
            .arg("-shortest")
            .arg("pipe:1")
            .stdin(std::process::Stdio::piped())
            .stdout(std::process::Stdio::piped())
            .stderr(std::process::Stdio::piped());
        cmd
    }
}

#[async_trait]
impl MediaEncoder for FfmpegEncoder {
    async fn start(
        &self,
        stream: CombinedStream,
        format: EncodingFormat,
        events: mpsc::UnboundedSender<EncoderEvent>,
    ) -> Result<()> {
        let mut runtime = self.runtime.lock().await;
        if runtime.is_some() {
            bail!("encoder already started");
        }

        let track = stream
            .audio_tracks
            .first()
            .context("combined stream has no audio track")?
            .clone();
        if stream.audio_tracks.len() > 1 {
            // TODO: mix additional tracks once a second capture source exists.
            warn!(
                "Combined stream has {} audio tracks; encoding the first only",
                stream.audio_tracks.len()
            );
        }
        let sample_rx = track
            .take_receiver()
            .context("audio track receiver already taken")?;

        let workdir = tempfile::tempdir().context("Failed to create encoder workdir")?;
        let fifo = workdir.path().join("audio.pcm");
        let status = std::process::Command::new("mkfifo")
            .arg(&fifo)
            .status()
            .context("Failed to run mkfifo")?;
        if !status.success() {
            bail!("mkfifo failed for {:?}", fifo);
        }

        let canvas = stream.canvas;
        let (width, height) = (canvas.width(), canvas.height());

        let mut child = self
            .build_command(width, height, track.sample_rate, track.channels, &fifo, format)
            .spawn()
            .context("Failed to spawn ffmpeg")?;

        let stdin = child.stdin.take().context("ffmpeg stdin unavailable")?;
        let stdout = child.stdout.take().context("ffmpeg stdout unavailable")?;
        let stderr = child.stderr.take();

        info!(
            "ffmpeg encoder started: {format} {width}x{height} @ {}fps",
            self.config.fps
        );

        self.paused.store(false, Ordering::SeqCst);
        self.set_state(EncoderState::Recording);
        let _ = events.send(EncoderEvent::Started { format });

        let cancel = CancellationToken::new();

        let video_task = tokio::spawn(pump_video(
            canvas,
            stdin,
            self.config.fps,
            Arc::clone(&self.paused),
            cancel.clone(),
        ));

        let audio_task = tokio::spawn(pump_audio(
            fifo.clone(),
            sample_rx,
            track,
            Arc::clone(&self.paused),
            cancel.clone(),
        ));

        let output_task = tokio::spawn(pump_output(
            child,
            stdout,
            stderr,
            events,
            self.config.flush_interval,
            cancel.clone(),
        ));

        *runtime = Some(EncoderRuntime {
            cancel,
            video_task,
            audio_task,
            output_task,
            _workdir: workdir,
        });

        Ok(())
    }

    async fn pause(&self) -> Result<()> {
        {
            let mut state = self.state.lock().map_err(|_| anyhow::anyhow!("state poisoned"))?;
            if *state != EncoderState::Recording {
                bail!("encoder is not recording");
            }
            *state = EncoderState::Paused;
        }
        self.paused.store(true, Ordering::SeqCst);
        debug!("ffmpeg encoder paused");
        Ok(())
    }

    async fn resume(&self) -> Result<()> {
        {
            let mut state = self.state.lock().map_err(|_| anyhow::anyhow!("state poisoned"))?;
            if *state != EncoderState::Paused {
                bail!("encoder is not paused");
            }
            *state = EncoderState::Recording;
        }
        self.paused.store(false, Ordering::SeqCst);
        debug!("ffmpeg encoder resumed");
        Ok(())
    }

    async fn stop(&self) -> Result<()> {
        let runtime = self.runtime.lock().await.take();
        let Some(runtime) = runtime else {
            bail!("encoder is not running");
        };

        runtime.cancel.cancel();

        // Input pumps drop their write ends, ffmpeg finalizes, and the
        // output pump drains the remainder before emitting Stopped.
        let _ = runtime.video_task.await;
        let _ = runtime.audio_task.await;
        let _ = runtime.output_task.await;

        self.paused.store(false, Ordering::SeqCst);
        self.set_state(EncoderState::Inactive);
        info!("ffmpeg encoder stopped");
        Ok(())
    }

    fn state(&self) -> EncoderState {
        self.state
            .lock()
            .map(|s| *s)
            .unwrap_or(EncoderState::Inactive)
    }
}

async fn pump_video(
    canvas: CanvasHandle,
    mut stdin: tokio::process::ChildStdin,
    fps: u32,
    paused: Arc<AtomicBool>,
    cancel: CancellationToken,
) {
    let period = Duration::from_secs_f64(1.0 / fps.max(1) as f64);
    let mut interval = tokio::time::interval(period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = interval.tick() => {
                if paused.load(Ordering::SeqCst) {
                    continue;
                }
                let frame = canvas.snapshot();
                if let Err(e) = stdin.write_all(&frame.data).await {
                    debug!("Video pump ending: {e}");
                    break;
                }
            }
        }
    }
    // Dropping stdin sends EOF to the encoder.
    drop(stdin);
    debug!("Video pump exited");
}

async fn pump_audio(
    fifo: PathBuf,
    mut samples: mpsc::UnboundedReceiver<Vec<f32>>,
    track: crate::capture::AudioTrack,
    paused: Arc<AtomicBool>,
    cancel: CancellationToken,
) {
    // Opening the FIFO blocks until ffmpeg opens the read end.
    let mut writer = match tokio::fs::OpenOptions::new().write(true).open(&fifo).await {
        Ok(file) => file,
        Err(e) => {
            error!("Failed to open audio FIFO {:?}: {e}", fifo);
            return;
        }
    };

    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            received = samples.recv() => {
                let Some(chunk) = received else { break };
                if paused.load(Ordering::SeqCst) {
                    continue;
                }
                let bytes: Vec<u8> = if track.is_enabled() {
                    chunk.iter().flat_map(|s| s.to_le_bytes()).collect()
                } else {
                    // Muted track keeps its timeline; substitute silence.
                    vec![0u8; chunk.len() * 4]
                };
                if let Err(e) = writer.write_all(&bytes).await {
                    debug!("Audio pump ending: {e}");
                    break;
                }
            }
        }
    }
    drop(writer);
    debug!("Audio pump exited");
}

async fn pump_output(
    mut child: tokio::process::Child,
    mut stdout: tokio::process::ChildStdout,
    stderr: Option<tokio::process::ChildStderr>,
    events: mpsc::UnboundedSender<EncoderEvent>,
    flush_interval: Duration,
    cancel: CancellationToken,
) {
    let mut pending: Vec<u8> = Vec::new();
    let mut seq: u64 = 0;
    let mut read_buf = vec![0u8; 16 * 1024];
    let mut failed = false;

    let mut flush = tokio::time::interval(flush_interval);
    flush.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            read = stdout.read(&mut read_buf) => match read {
                Ok(0) => break,
                Ok(n) => pending.extend_from_slice(&read_buf[..n]),
                Err(e) => {
                    let _ = events.send(EncoderEvent::Error(format!(
                        "encoder output read failed: {e}"
                    )));
                    failed = true;
                    break;
                }
            },
            _ = flush.tick() => {
                if !pending.is_empty() {
                    let data = std::mem::take(&mut pending);
                    let _ = events.send(EncoderEvent::Chunk(EncodedChunk { seq, data }));
                    seq += 1;
                }
            }
        }
    }

    if !failed && !pending.is_empty() {
        let data = std::mem::take(&mut pending);
        let _ = events.send(EncoderEvent::Chunk(EncodedChunk { seq, data }));
    }

    let mut err_text = String::new();
    if let Some(mut stderr) = stderr {
        let _ = stderr.read_to_string(&mut err_text).await;
    }

    match child.wait().await {
        Ok(status) if status.success() => {
            if !failed {
                let _ = events.send(EncoderEvent::Stopped);
            }
        }
        Ok(status) => {
            // A clean stop also lands here when ffmpeg is cut off by EOF
            // mid-fragment; only report when we were not shutting down.
            if cancel.is_cancelled() {
                if !err_text.trim().is_empty() {
                    warn!("ffmpeg exited {status} during shutdown: {}", err_text.trim());
                }
                if !failed {
                    let _ = events.send(EncoderEvent::Stopped);
                }
            } else {
                let _ = events.send(EncoderEvent::Error(format!(
                    "ffmpeg exited with {status}: {}",
                    err_text.trim()
                )));
            }
        }
        Err(e) => {
            let _ = events.send(EncoderEvent::Error(format!(
                "failed to wait for ffmpeg: {e}"
            )));
        }
    }

    debug!("Output pump exited");
}
