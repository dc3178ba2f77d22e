//! The `record` command: camera → compositor → encoder → upload, with an
//! optional gaze-correction submission at the end.

use anyhow::{anyhow, Context, Result};
use dialoguer::{theme::ColorfulTheme, Confirm, FuzzySelect};
use indicatif::ProgressBar;
use std::io::IsTerminal;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{info, warn};

use super::RecordCliArgs;
use crate::capture::{list_cameras, DeviceSource, MediaSource};
use crate::compositor::FrameCompositor;
use crate::config::Config;
use crate::correction::{CorrectionClient, CorrectionTuning, JobOrchestrator, JobStatus};
use crate::global;
use crate::mux;
use crate::recorder::{
    FfmpegEncoder, FfmpegEncoderConfig, FfmpegProbe, RecorderError, RecordingMachine,
    RecordingPhase, RecordingStatusHandle,
};
use crate::upload::{ArtifactUploader, UploadClient, UploadMetadata, UploadedVideo};

pub async fn handle_record_command(args: RecordCliArgs) -> Result<()> {
    let config = Config::load()?;

    let mut capture = config.capture.clone();
    if let Some(camera) = args.camera {
        capture.camera_index = Some(camera);
    }
    if capture.camera_index.is_none() {
        capture.camera_index = pick_camera()?;
    }

    let source: Arc<dyn MediaSource> =
        Arc::new(DeviceSource::open(&capture).context("Camera access failed")?);

    let compositor = FrameCompositor::start(Arc::clone(&source), config.recording.refresh_rate);
    let stream = mux::combine(Some(compositor.canvas()), Some(&source))
        .map_err(RecorderError::from)
        .context("Unable to create recording stream")?;

    let probe = FfmpegProbe::discover()
        .ok_or_else(|| anyhow!("ffmpeg not found on PATH; install it to record"))?;
    let encoder = Arc::new(FfmpegEncoder::new(
        probe.binary().clone(),
        FfmpegEncoderConfig {
            fps: capture.fps,
            flush_interval: Duration::from_secs(config.recording.flush_interval_seconds.max(1)),
            video_bitrate: config.recording.video_bitrate,
        },
    ));

    let uploader = Arc::new(UploadClient::new(&config.upload.endpoint));
    let uploader_dyn: Arc<dyn ArtifactUploader> = uploader.clone();

    let output_dir = match &config.recording.output_dir {
        Some(dir) => dir.clone(),
        None => global::recordings_dir()?,
    };

    let status = RecordingStatusHandle::default();
    let machine = RecordingMachine::new(
        encoder,
        uploader_dyn,
        Arc::new(probe),
        status.clone(),
        output_dir,
    )
    .with_keep_local(config.behavior.keep_local_artifacts);

    let format = machine.start(stream).await?;
    println!("Recording ({format}). Enter = stop, p = pause/resume, m = mute, h = hide camera.");

    run_session(&machine, &compositor, &source, &status, args.duration).await?;

    let metadata = build_metadata(&args);
    let outcome = machine.stop(metadata).await?;

    compositor.stop();
    source.stop_tracks();

    if let Some(path) = &outcome.local_path {
        println!("Saved locally: {}", path.display());
    }

    let video = match &outcome.uploaded {
        Ok(video) => {
            println!("Uploaded: {} ({})", video.video_id, video.url);
            video.clone()
        }
        Err(e) => {
            println!("Upload failed: {e}");
            println!("The recording is still available locally.");
            return Ok(());
        }
    };

    maybe_submit_correction(&config, &args, &uploader, &video).await
}

fn pick_camera() -> Result<Option<u32>> {
    let cameras = list_cameras();
    if cameras.len() < 2 || !std::io::stdin().is_terminal() {
        return Ok(cameras.first().map(|c| c.index));
    }

    let names: Vec<String> = cameras
        .iter()
        .map(|c| format!("{}: {}", c.index, c.name))
        .collect();
    let pick = FuzzySelect::with_theme(&ColorfulTheme::default())
        .with_prompt("Select camera")
        .items(&names)
        .default(0)
        .interact()?;
    Ok(Some(cameras[pick].index))
}

/// Drive the session until the duration elapses or the user stops it.
async fn run_session(
    machine: &RecordingMachine,
    compositor: &FrameCompositor,
    source: &Arc<dyn MediaSource>,
    status: &RecordingStatusHandle,
    duration: Option<u64>,
) -> Result<()> {
    let pb = ProgressBar::new_spinner();
    pb.enable_steady_tick(Duration::from_millis(120));

    let stdin = BufReader::new(tokio::io::stdin());
    let mut lines = stdin.lines();
    let deadline = duration.map(|secs| tokio::time::Instant::now() + Duration::from_secs(secs));

    loop {
        let sleep_until = deadline.unwrap_or_else(|| {
            tokio::time::Instant::now() + Duration::from_secs(24 * 60 * 60)
        });

        tokio::select! {
            _ = tokio::time::sleep_until(sleep_until), if deadline.is_some() => break,
            line = lines.next_line() => {
                match line?.as_deref() {
                    Some("p") => toggle_pause(machine, compositor, status).await?,
                    Some("m") => {
                        let muted = !source.is_muted();
                        source.set_muted(muted);
                        info!("Microphone {}", if muted { "muted" } else { "unmuted" });
                    }
                    Some("h") => {
                        let hidden = !source.is_hidden();
                        source.set_hidden(hidden);
                        info!("Camera {}", if hidden { "hidden" } else { "shown" });
                    }
                    _ => break,
                }
            }
            _ = tokio::time::sleep(Duration::from_millis(500)) => {
                let state = status.get().await;
                pb.set_message(format!(
                    "{} {}s",
                    state.phase.as_str(),
                    state.elapsed_seconds()
                ));
            }
        }
    }

    pb.finish_and_clear();
    Ok(())
}

async fn toggle_pause(
    machine: &RecordingMachine,
    compositor: &FrameCompositor,
    status: &RecordingStatusHandle,
) -> Result<()> {
    match status.get().await.phase {
        RecordingPhase::Paused => {
            machine.resume().await?;
            compositor.set_paused(false);
        }
        RecordingPhase::Recording => {
            machine.pause().await?;
            compositor.set_paused(true);
        }
        phase => warn!("Ignoring pause toggle while {}", phase.as_str()),
    }
    Ok(())
}

fn build_metadata(args: &RecordCliArgs) -> Option<UploadMetadata> {
    if args.script_id.is_none() && args.topic.is_none() {
        return None;
    }
    Some(UploadMetadata {
        script_id: args.script_id.clone(),
        script_title: args.topic.clone(),
        script_topic: args.topic.clone(),
    })
}

async fn maybe_submit_correction(
    config: &Config,
    args: &RecordCliArgs,
    uploader: &UploadClient,
    video: &UploadedVideo,
) -> Result<()> {
    if args.no_correct || !config.correction.enabled {
        return Ok(());
    }

    let submit = config.behavior.auto_submit_correction
        || args.correct
        || (std::io::stdin().is_terminal()
            && Confirm::with_theme(&ColorfulTheme::default())
                .with_prompt("Submit for gaze correction?")
                .default(true)
                .interact()?);
    if !submit {
        return Ok(());
    }

    let client = match CorrectionClient::new(
        &config.correction.endpoint,
        config.correction.api_key.clone(),
    ) {
        Ok(client) => Arc::new(client),
        Err(e) => {
            println!("Skipping gaze correction: {e}");
            return Ok(());
        }
    };

    let poll_interval = Duration::from_secs(config.correction.poll_interval_seconds.max(1));
    let orchestrator = JobOrchestrator::new(client, poll_interval);

    let notify = Arc::new(tokio::sync::Notify::new());
    let waker = Arc::clone(&notify);
    orchestrator.on_refresh(move || waker.notify_one());

    let media_url = uploader.media_url(&video.url);
    let job_id = orchestrator
        .submit(&media_url, &CorrectionTuning::default())
        .await?;
    println!(
        "Correction job {job_id} submitted; polling every {}s",
        poll_interval.as_secs()
    );

    let pb = ProgressBar::new_spinner();
    pb.enable_steady_tick(Duration::from_millis(120));
    pb.set_message("waiting for gaze correction");

    while orchestrator.outstanding() > 0 {
        tokio::select! {
            _ = notify.notified() => {}
            _ = tokio::time::sleep(Duration::from_secs(1)) => {}
        }
    }
    pb.finish_and_clear();

    for job in orchestrator.jobs() {
        if job.id != job_id {
            continue;
        }
        match job.status {
            JobStatus::Finished {
                output_locator: Some(url),
            } => println!("Corrected video ready: {url}"),
            JobStatus::Finished {
                output_locator: None,
            } => println!("Correction finished but no output was returned."),
            JobStatus::Failed { message } => {
                println!("Correction failed: {message}");
                println!("Submit the recording again to retry.");
            }
            JobStatus::Processing => {}
        }
    }

    orchestrator.shutdown();
    Ok(())
}
