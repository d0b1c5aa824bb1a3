//! Test doubles shared by the unit tests of this crate.

use alloc::vec;
use alloc::vec::Vec;
use core::convert::Infallible;

use embedded_graphics::pixelcolor::Rgb565;
use embedded_graphics::prelude::*;
use embedded_hal::delay::DelayNs;

use crate::Clock;
use crate::camera::{CameraDevice, CameraFault, CameraInfo, CameraStatus};
use crate::display::{DisplaySurface, ImageBinding, ScreenId, SurfaceId};
use crate::frame::{FrameBuffer, FrameSink};

/// Scripted double-buffered camera driver.
///
/// Frames are only produced when the test calls [`MockCamera::emit`], or once
/// on `start` when `frames_on_start` is set. Each emitted frame fills its
/// buffer with the frame number, so snapshots can be told apart.
pub struct MockCamera {
    pub width: u32,
    pub height: u32,
    buffers: [Vec<u8>; 2],
    next_slot: u16,
    last_slot: u16,
    pub sink: Option<FrameSink>,
    pub fail_probe: bool,
    pub fail_init: bool,
    pub fail_open: bool,
    pub fail_start: bool,
    /// Publish one frame as part of every successful start
    pub frames_on_start: bool,
    /// Start succeeds but the driver reports itself stopped right after
    pub dies_on_start: bool,
    /// Whether `current_buffer` answers while running
    pub direct_buffer: bool,
    pub running: bool,
    pub closed: bool,
    pub starts: u32,
    pub frame_count: u32,
}

impl MockCamera {
    pub fn new(width: u32, height: u32) -> Self {
        let len = (width * height * 2) as usize;
        Self {
            width,
            height,
            buffers: [vec![0; len], vec![0; len]],
            next_slot: 0,
            last_slot: 0,
            sink: None,
            fail_probe: false,
            fail_init: false,
            fail_open: false,
            fail_start: false,
            frames_on_start: true,
            dies_on_start: false,
            direct_buffer: true,
            running: false,
            closed: false,
            starts: 0,
            frame_count: 0,
        }
    }

    /// Fill the next buffer and notify the sink, if one is registered.
    pub fn emit(&mut self) -> FrameBuffer {
        let slot = self.next_slot;
        self.frame_count += 1;
        self.buffers[slot as usize].fill(self.frame_count as u8);
        self.last_slot = slot;
        self.next_slot ^= 1;

        let buffer = self.frame_buffer(slot);
        if let Some(sink) = &self.sink {
            sink.frame_ready(buffer);
        }
        buffer
    }

    fn frame_buffer(&self, slot: u16) -> FrameBuffer {
        FrameBuffer {
            slot,
            addr: 0x3C00_0000 + slot as usize * 0x4_0000,
            len: self.width * self.height * 2,
        }
    }
}

impl CameraDevice for MockCamera {
    fn probe(&mut self) -> Result<(), CameraFault> {
        if self.fail_probe {
            Err(CameraFault::NotFound)
        } else {
            Ok(())
        }
    }

    fn init(&mut self) -> Result<(), CameraFault> {
        if self.fail_init {
            Err(CameraFault::Bus)
        } else {
            Ok(())
        }
    }

    fn open(&mut self) -> Result<(), CameraFault> {
        if self.fail_open {
            Err(CameraFault::Busy)
        } else {
            self.closed = false;
            Ok(())
        }
    }

    fn close(&mut self) {
        self.closed = true;
        self.sink = None;
    }

    fn set_frame_sink(&mut self, sink: FrameSink) {
        self.sink = Some(sink);
    }

    fn start(&mut self) -> Result<(), CameraFault> {
        if self.fail_start {
            return Err(CameraFault::Timeout);
        }
        self.starts += 1;
        self.running = !self.dies_on_start;
        if self.frames_on_start && self.running {
            self.emit();
        }
        Ok(())
    }

    fn stop(&mut self) {
        self.running = false;
    }

    fn fps(&self) -> f32 {
        if self.running { 14.5 } else { 0.0 }
    }

    fn status(&self) -> CameraStatus {
        CameraStatus {
            running: self.running,
            fps: self.fps(),
            frame_count: self.frame_count,
            error_count: 0,
        }
    }

    fn info(&self) -> CameraInfo {
        CameraInfo {
            chip_id: 0x3B02,
            width: self.width,
            height: self.height,
            frame_size: self.width * self.height * 2,
        }
    }

    fn current_buffer(&self) -> Option<FrameBuffer> {
        (self.running && self.direct_buffer).then(|| self.frame_buffer(self.last_slot))
    }

    fn with_buffer<R>(&self, slot: u16, f: impl FnOnce(&[u8]) -> R) -> Option<R> {
        self.buffers.get(slot as usize).map(|bytes| f(bytes))
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum DisplayCall {
    LoadScreen(ScreenId),
    Bind(SurfaceId, ImageBinding),
    Unbind(SurfaceId),
    Invalidate(SurfaceId),
    Fps(f32),
}

/// Display surface that only records what it was asked to do.
#[derive(Default)]
pub struct RecordingDisplay {
    pub calls: Vec<DisplayCall>,
    pub screen: Option<ScreenId>,
    pub preview: Option<ImageBinding>,
    pub photo: Option<ImageBinding>,
}

impl RecordingDisplay {
    pub fn binding(&self, surface: SurfaceId) -> Option<ImageBinding> {
        match surface {
            SurfaceId::Preview => self.preview,
            SurfaceId::Photo => self.photo,
        }
    }
}

impl DisplaySurface for RecordingDisplay {
    fn load_screen(&mut self, screen: ScreenId) {
        self.screen = Some(screen);
        self.calls.push(DisplayCall::LoadScreen(screen));
    }

    fn bind_image(&mut self, surface: SurfaceId, binding: ImageBinding) {
        match surface {
            SurfaceId::Preview => self.preview = Some(binding),
            SurfaceId::Photo => self.photo = Some(binding),
        }
        self.calls.push(DisplayCall::Bind(surface, binding));
    }

    fn unbind(&mut self, surface: SurfaceId) {
        match surface {
            SurfaceId::Preview => self.preview = None,
            SurfaceId::Photo => self.photo = None,
        }
        self.calls.push(DisplayCall::Unbind(surface));
    }

    fn invalidate(&mut self, surface: SurfaceId) {
        self.calls.push(DisplayCall::Invalidate(surface));
    }

    fn set_fps(&mut self, fps: f32) {
        self.calls.push(DisplayCall::Fps(fps));
    }
}

/// Virtual clock: delays advance time instead of sleeping.
#[derive(Default)]
pub struct ManualClock {
    elapsed_ns: u64,
    /// Number of millisecond delays requested
    pub ms_delays: u32,
}

impl ManualClock {
    pub fn advance_ms(&mut self, ms: u64) {
        self.elapsed_ns += ms * 1_000_000;
    }
}

impl DelayNs for ManualClock {
    fn delay_ns(&mut self, ns: u32) {
        self.elapsed_ns += u64::from(ns);
    }

    fn delay_ms(&mut self, ms: u32) {
        self.ms_delays += 1;
        self.advance_ms(u64::from(ms));
    }
}

impl Clock for ManualClock {
    fn now_ms(&self) -> u64 {
        self.elapsed_ns / 1_000_000
    }
}

/// In-memory RGB565 draw target.
pub struct PixelCanvas {
    size: Size,
    pixels: Vec<Rgb565>,
}

impl PixelCanvas {
    pub fn new(size: Size) -> Self {
        Self {
            size,
            pixels: vec![Rgb565::BLACK; (size.width * size.height) as usize],
        }
    }

    pub fn pixel(&self, x: u32, y: u32) -> Option<Rgb565> {
        if x >= self.size.width || y >= self.size.height {
            return None;
        }
        self.pixels.get((y * self.size.width + x) as usize).copied()
    }
}

impl OriginDimensions for PixelCanvas {
    fn size(&self) -> Size {
        self.size
    }
}

impl DrawTarget for PixelCanvas {
    type Color = Rgb565;
    type Error = Infallible;

    fn draw_iter<I>(&mut self, pixels: I) -> Result<(), Self::Error>
    where
        I: IntoIterator<Item = Pixel<Self::Color>>,
    {
        for Pixel(point, color) in pixels {
            if point.x < 0 || point.y < 0 {
                continue;
            }
            let (x, y) = (point.x as u32, point.y as u32);
            if x < self.size.width && y < self.size.height {
                self.pixels[(y * self.size.width + x) as usize] = color;
            }
        }
        Ok(())
    }
}
