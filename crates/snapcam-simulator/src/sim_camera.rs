//! Simulated double-buffered camera.
//!
//! A capture thread renders moving colour bars into two RGB565 buffers in
//! turn and reports each completed buffer through the registered
//! [`FrameSink`], the way the sensor driver's DMA-complete interrupt would.

use std::sync::atomic::{AtomicBool, AtomicU16, AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use embedded_graphics::pixelcolor::Rgb565;
use embedded_graphics::pixelcolor::raw::{RawData, RawU16};
use embedded_graphics::prelude::*;
use log::{debug, warn};

use snapcam_core::camera::{CameraDevice, CameraFault, CameraInfo, CameraStatus};
use snapcam_core::frame::{FrameBuffer, FrameSink};

/// Chip id reported by the simulated sensor.
const SIM_CHIP_ID: u16 = 0x3B02;

const BARS: [Rgb565; 8] = [
    Rgb565::WHITE,
    Rgb565::YELLOW,
    Rgb565::CYAN,
    Rgb565::GREEN,
    Rgb565::MAGENTA,
    Rgb565::RED,
    Rgb565::BLUE,
    Rgb565::BLACK,
];

/// State shared with the capture thread.
struct Shared {
    running: AtomicBool,
    current_slot: AtomicU16,
    frame_count: AtomicU32,
    buffers: [Mutex<Vec<u8>>; 2],
}

pub struct SimCamera {
    width: u32,
    height: u32,
    /// Bytes per RGB565 frame
    frame_len: u32,
    frame_interval: Duration,
    shared: Arc<Shared>,
    sink: Option<FrameSink>,
    worker: Option<JoinHandle<()>>,
    started_at: Instant,
    frames_at_start: u32,
}

impl SimCamera {
    pub fn new(width: u32, height: u32, fps: u32) -> Self {
        let frame_len = width.saturating_mul(height).saturating_mul(2);
        let len = frame_len as usize;
        Self {
            width,
            height,
            frame_len,
            frame_interval: Duration::from_millis(1000 / u64::from(fps.max(1))),
            shared: Arc::new(Shared {
                running: AtomicBool::new(false),
                current_slot: AtomicU16::new(0),
                frame_count: AtomicU32::new(0),
                buffers: [Mutex::new(vec![0; len]), Mutex::new(vec![0; len])],
            }),
            sink: None,
            worker: None,
            started_at: Instant::now(),
            frames_at_start: 0,
        }
    }

    fn frame_buffer(&self, slot: u16) -> FrameBuffer {
        let addr = self.shared.buffers[slot as usize]
            .lock()
            .map(|buffer| buffer.as_ptr() as usize)
            .unwrap_or(0);
        FrameBuffer {
            slot,
            addr,
            len: self.frame_len,
        }
    }
}

/// Render colour bars shifted by the frame number.
fn render_bars(buffer: &mut [u8], width: u32, frame: u32) {
    let bar_width = (width / BARS.len() as u32).max(1);
    for (i, pixel) in buffer.chunks_exact_mut(2).enumerate() {
        let x = i as u32 % width;
        let bar = (x.wrapping_add(frame.wrapping_mul(2)) / bar_width) as usize % BARS.len();
        let raw = RawU16::from(BARS[bar]).into_inner();
        pixel.copy_from_slice(&raw.to_le_bytes());
    }
}

impl CameraDevice for SimCamera {
    fn probe(&mut self) -> Result<(), CameraFault> {
        debug!("Simulated camera found");
        Ok(())
    }

    fn init(&mut self) -> Result<(), CameraFault> {
        Ok(())
    }

    fn open(&mut self) -> Result<(), CameraFault> {
        Ok(())
    }

    fn close(&mut self) {
        self.stop();
        self.sink = None;
    }

    fn set_frame_sink(&mut self, sink: FrameSink) {
        self.sink = Some(sink);
    }

    fn start(&mut self) -> Result<(), CameraFault> {
        if self.worker.is_some() {
            return Err(CameraFault::Busy);
        }
        let Some(sink) = self.sink.clone() else {
            warn!("Simulated camera started without a frame sink");
            return Err(CameraFault::Bus);
        };

        self.shared.running.store(true, Ordering::Release);
        self.started_at = Instant::now();
        self.frames_at_start = self.shared.frame_count.load(Ordering::Relaxed);

        let shared = self.shared.clone();
        let (width, interval) = (self.width, self.frame_interval);
        let len = self.frame_len;
        let worker = std::thread::Builder::new()
            .name("sim-camera".into())
            .spawn(move || {
                let mut slot = shared.current_slot.load(Ordering::Relaxed) ^ 1;
                while shared.running.load(Ordering::Acquire) {
                    let frame = shared.frame_count.load(Ordering::Relaxed);
                    let addr = match shared.buffers[slot as usize].lock() {
                        Ok(mut buffer) => {
                            render_bars(&mut buffer, width, frame);
                            buffer.as_ptr() as usize
                        }
                        Err(_) => break,
                    };
                    shared.current_slot.store(slot, Ordering::Release);
                    shared.frame_count.fetch_add(1, Ordering::Relaxed);
                    sink.frame_ready(FrameBuffer { slot, addr, len });

                    slot ^= 1;
                    std::thread::sleep(interval);
                }
            })
            .map_err(|e| {
                warn!("Cannot spawn capture thread: {}", e);
                self.shared.running.store(false, Ordering::Release);
                CameraFault::Busy
            })?;

        self.worker = Some(worker);
        Ok(())
    }

    fn stop(&mut self) {
        self.shared.running.store(false, Ordering::Release);
        // No notification may fire once stop returns
        if let Some(worker) = self.worker.take() {
            if worker.join().is_err() {
                warn!("Capture thread panicked");
            }
        }
    }

    fn fps(&self) -> f32 {
        if !self.shared.running.load(Ordering::Acquire) {
            return 0.0;
        }
        let elapsed = self.started_at.elapsed().as_secs_f32();
        if elapsed <= 0.0 {
            return 0.0;
        }
        let frames = self
            .shared
            .frame_count
            .load(Ordering::Relaxed)
            .wrapping_sub(self.frames_at_start);
        frames as f32 / elapsed
    }

    fn status(&self) -> CameraStatus {
        CameraStatus {
            running: self.shared.running.load(Ordering::Acquire),
            fps: self.fps(),
            frame_count: self.shared.frame_count.load(Ordering::Relaxed),
            error_count: 0,
        }
    }

    fn info(&self) -> CameraInfo {
        CameraInfo {
            chip_id: SIM_CHIP_ID,
            width: self.width,
            height: self.height,
            frame_size: self.frame_len,
        }
    }

    fn current_buffer(&self) -> Option<FrameBuffer> {
        if !self.shared.running.load(Ordering::Acquire) {
            return None;
        }
        Some(self.frame_buffer(self.shared.current_slot.load(Ordering::Acquire)))
    }

    fn with_buffer<R>(&self, slot: u16, f: impl FnOnce(&[u8]) -> R) -> Option<R> {
        let buffer = self.shared.buffers.get(slot as usize)?.lock().ok()?;
        Some(f(&buffer))
    }
}

impl Drop for SimCamera {
    fn drop(&mut self) {
        self.stop();
    }
}
