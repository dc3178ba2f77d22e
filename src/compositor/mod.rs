//! Frame compositor: mirrors the live camera feed onto an off-screen
//! canvas while a recording is active.
//!
//! One draw per refresh tick, cooperatively scheduled on the runtime.
//! Paused keeps the loop alive without drawing, so the canvas holds the
//! last real frame and a sampling encoder sees frozen content. Stopping
//! lets the loop exit; a tick already in flight re-checks the activity
//! flag before touching the canvas.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info};

use crate::capture::{MediaSource, VideoFrame};

pub const DEFAULT_WIDTH: u32 = 1280;
pub const DEFAULT_HEIGHT: u32 = 720;

/// Shared off-screen canvas. Dimensions are pinned at creation and never
/// re-evaluated per frame.
#[derive(Debug, Clone)]
pub struct CanvasHandle {
    inner: Arc<CanvasInner>,
}

#[derive(Debug)]
struct CanvasInner {
    width: u32,
    height: u32,
    pixels: Mutex<Vec<u8>>,
    draw_calls: AtomicU64,
}

impl CanvasHandle {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            inner: Arc::new(CanvasInner {
                width,
                height,
                pixels: Mutex::new(vec![0u8; (width * height * 4) as usize]),
                draw_calls: AtomicU64::new(0),
            }),
        }
    }

    pub fn width(&self) -> u32 {
        self.inner.width
    }

    pub fn height(&self) -> u32 {
        self.inner.height
    }

    /// Draw a horizontally mirrored copy of `frame`, scaled to the canvas.
    pub fn draw_mirrored(&self, frame: &VideoFrame) {
        if frame.width == 0 || frame.height == 0 {
            return;
        }
        if let Ok(mut pixels) = self.inner.pixels.lock() {
            mirror_scaled(frame, self.inner.width, self.inner.height, &mut pixels);
            self.inner.draw_calls.fetch_add(1, Ordering::SeqCst);
        }
    }

    /// Copy of the current canvas contents.
    pub fn snapshot(&self) -> VideoFrame {
        let pixels = self
            .inner
            .pixels
            .lock()
            .map(|p| p.clone())
            .unwrap_or_else(|_| vec![0u8; (self.inner.width * self.inner.height * 4) as usize]);
        VideoFrame::new(self.inner.width, self.inner.height, pixels)
    }

    /// Total draws since creation. Constant across a paused interval.
    pub fn draw_calls(&self) -> u64 {
        self.inner.draw_calls.load(Ordering::SeqCst)
    }
}

/// Nearest-neighbour scale of `frame` into `dst`, flipped horizontally.
fn mirror_scaled(frame: &VideoFrame, dst_width: u32, dst_height: u32, dst: &mut [u8]) {
    let (sw, sh) = (frame.width as usize, frame.height as usize);
    let (dw, dh) = (dst_width as usize, dst_height as usize);

    for dy in 0..dh {
        let sy = dy * sh / dh;
        let src_row = sy * sw * 4;
        let dst_row = dy * dw * 4;
        for dx in 0..dw {
            let sx = dx * sw / dw;
            let mirrored_sx = sw - 1 - sx;
            let src = src_row + mirrored_sx * 4;
            let dst_idx = dst_row + dx * 4;
            dst[dst_idx..dst_idx + 4].copy_from_slice(&frame.data[src..src + 4]);
        }
    }
}

pub struct FrameCompositor {
    canvas: CanvasHandle,
    active: Arc<AtomicBool>,
    paused: Arc<AtomicBool>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl FrameCompositor {
    /// Pin the canvas to the source's native size (default when unknown)
    /// and start the draw loop.
    pub fn start(source: Arc<dyn MediaSource>, refresh_rate: u32) -> Self {
        let (width, height) = source
            .native_size()
            .unwrap_or((DEFAULT_WIDTH, DEFAULT_HEIGHT));
        let canvas = CanvasHandle::new(width, height);
        let active = Arc::new(AtomicBool::new(true));
        let paused = Arc::new(AtomicBool::new(false));

        let period = Duration::from_secs_f64(1.0 / refresh_rate.max(1) as f64);
        let task = tokio::spawn(run_loop(
            canvas.clone(),
            source,
            Arc::clone(&active),
            Arc::clone(&paused),
            period,
        ));

        info!("Compositor started: canvas {width}x{height} @ {refresh_rate}Hz");

        Self {
            canvas,
            active,
            paused,
            task: Mutex::new(Some(task)),
        }
    }

    pub fn canvas(&self) -> CanvasHandle {
        self.canvas.clone()
    }

    pub fn set_paused(&self, paused: bool) {
        self.paused.store(paused, Ordering::SeqCst);
    }

    pub fn is_paused(&self) -> bool {
        self.paused.load(Ordering::SeqCst)
    }

    /// End the draw loop. Safe to call more than once.
    pub fn stop(&self) {
        self.active.store(false, Ordering::SeqCst);
        if let Ok(mut slot) = self.task.lock() {
            if let Some(task) = slot.take() {
                task.abort();
            }
        }
    }
}

impl Drop for FrameCompositor {
    fn drop(&mut self) {
        self.stop();
    }
}

async fn run_loop(
    canvas: CanvasHandle,
    source: Arc<dyn MediaSource>,
    active: Arc<AtomicBool>,
    paused: Arc<AtomicBool>,
    period: Duration,
) {
    let mut interval = tokio::time::interval(period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        interval.tick().await;

        // The flag, not the cancelled timer, guards the draw: a tick that
        // was already pending when teardown began lands here and exits.
        if !active.load(Ordering::SeqCst) {
            break;
        }

        if paused.load(Ordering::SeqCst) {
            continue;
        }

        if let Some(frame) = source.latest_frame() {
            canvas.draw_mirrored(&frame);
        }
    }

    debug!("Compositor loop exited");
}
