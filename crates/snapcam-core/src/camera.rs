//! Camera session: lifecycle of the camera driver collaborator.
//!
//! The sensor protocol (register setup, DMA reception, YUV to RGB565) lives
//! in the driver behind [`CameraDevice`]. The session opens the device once,
//! registers the [`FrameSink`] as its frame callback, and starts and stops
//! capture. Every start opens a new capture epoch on the [`FrameBridge`];
//! frame references from earlier epochs can no longer be read.

extern crate alloc;

use alloc::sync::Arc;
use log::{debug, error, info, warn};

use crate::error::SessionError;
use crate::frame::{FrameBridge, FrameBuffer, FrameRef, FrameSink};

/// Failure reported by the camera driver.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CameraFault {
    NotFound,
    Bus,
    Timeout,
    Busy,
}

/// Runtime counters of the driver.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CameraStatus {
    pub running: bool,
    pub fps: f32,
    pub frame_count: u32,
    pub error_count: u32,
}

/// Static description of the sensor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CameraInfo {
    pub chip_id: u16,
    pub width: u32,
    pub height: u32,
    pub frame_size: u32,
}

/// Camera driver collaborator.
///
/// Drivers must not invoke the frame sink after `stop` returns, and must keep
/// the last captured buffers intact until the next `start`.
pub trait CameraDevice {
    /// Find the device, registering it with the driver core first if needed.
    fn probe(&mut self) -> Result<(), CameraFault>;

    fn init(&mut self) -> Result<(), CameraFault>;

    fn open(&mut self) -> Result<(), CameraFault>;

    /// Release the device (deinit).
    fn close(&mut self);

    /// Register the frame-ready callback.
    fn set_frame_sink(&mut self, sink: FrameSink);

    fn start(&mut self) -> Result<(), CameraFault>;

    fn stop(&mut self);

    fn fps(&self) -> f32;

    fn status(&self) -> CameraStatus;

    fn info(&self) -> CameraInfo;

    /// The buffer the driver is currently exposing, queried directly.
    fn current_buffer(&self) -> Option<FrameBuffer>;

    /// Run `f` over the bytes of a driver buffer.
    fn with_buffer<R>(&self, slot: u16, f: impl FnOnce(&[u8]) -> R) -> Option<R>;
}

pub struct CameraSession<C> {
    device: C,
    bridge: Arc<FrameBridge>,
    open: bool,
    running: bool,
    epoch: u32,
}

impl<C: CameraDevice> CameraSession<C> {
    pub fn new(device: C, bridge: Arc<FrameBridge>) -> Self {
        let epoch = bridge.epoch();
        Self {
            device,
            bridge,
            open: false,
            running: false,
            epoch,
        }
    }

    /// Probe, init and open the device and register the frame callback.
    /// Does nothing once the session is open.
    pub fn ensure_open(&mut self) -> Result<(), SessionError> {
        if self.open {
            return Ok(());
        }

        self.device.probe().map_err(|e| {
            error!("Camera device not found: {:?}", e);
            SessionError::DeviceNotFound
        })?;

        self.device.init().map_err(|e| {
            error!("Camera init failed: {:?}", e);
            SessionError::InitFailed
        })?;

        self.device.open().map_err(|e| {
            error!("Camera open failed: {:?}", e);
            SessionError::OpenFailed
        })?;

        self.device.set_frame_sink(FrameSink::new(self.bridge.clone()));
        self.open = true;

        info!("Camera initialized successfully");
        Ok(())
    }

    /// Start capture in a fresh epoch. Returns the new epoch.
    pub fn start(&mut self) -> Result<u32, SessionError> {
        if !self.open {
            error!("Camera start requested before open");
            return Err(SessionError::StartFailed);
        }

        // Rearm before starting so the first notification lands in the new epoch
        self.epoch = self.bridge.rearm();
        self.device.start().map_err(|e| {
            error!("Camera start failed: {:?}", e);
            SessionError::StartFailed
        })?;
        self.running = true;

        debug!("Camera capture started, epoch {}", self.epoch);
        Ok(self.epoch)
    }

    /// Stop capture. Safe to call at any time, including mid-start.
    pub fn stop(&mut self) {
        if !self.open {
            return;
        }
        self.device.stop();
        if self.running {
            info!("Camera capture stopped");
        }
        self.running = false;
    }

    /// Stop and release the device.
    pub fn shutdown(&mut self) {
        self.stop();
        if self.open {
            self.device.close();
            self.open = false;
            info!("Camera closed");
        }
    }

    pub fn is_open(&self) -> bool {
        self.open
    }

    /// Liveness: started by us and still reported running by the driver.
    pub fn is_running(&self) -> bool {
        self.running && self.device.status().running
    }

    pub fn epoch(&self) -> u32 {
        self.epoch
    }

    /// Take the newest frame of the current epoch, discarding stale ones.
    pub fn consume_frame(&self) -> Option<FrameRef> {
        let frame = self.bridge.consume()?;
        if frame.epoch() != self.epoch {
            warn!(
                "Dropping frame from epoch {} (current {})",
                frame.epoch(),
                self.epoch
            );
            return None;
        }
        Some(frame)
    }

    /// Driver's current buffer as a reference of the running epoch.
    pub fn fallback_frame(&self) -> Option<FrameRef> {
        if !self.is_running() {
            return None;
        }
        self.device
            .current_buffer()
            .map(|buffer| FrameRef::new(self.epoch, buffer))
    }

    /// Read the valid bytes behind `frame`. Refuses references from an
    /// earlier epoch, whose buffers the driver may have reused.
    pub fn read_frame<R>(&self, frame: &FrameRef, f: impl FnOnce(&[u8]) -> R) -> Option<R> {
        if !self.open || frame.epoch() != self.epoch {
            return None;
        }
        let valid = frame.buffer().len as usize;
        self.device
            .with_buffer(frame.buffer().slot, |bytes| f(&bytes[..valid.min(bytes.len())]))
    }

    pub fn fps(&self) -> f32 {
        if self.open { self.device.fps() } else { 0.0 }
    }

    pub fn status(&self) -> Option<CameraStatus> {
        self.open.then(|| self.device.status())
    }

    pub fn info(&self) -> Option<CameraInfo> {
        self.open.then(|| self.device.info())
    }

    pub fn bridge(&self) -> &FrameBridge {
        &self.bridge
    }

    pub fn device(&self) -> &C {
        &self.device
    }

    pub fn device_mut(&mut self) -> &mut C {
        &mut self.device
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::MockCamera;

    fn session() -> CameraSession<MockCamera> {
        CameraSession::new(MockCamera::new(4, 2), Arc::new(FrameBridge::new()))
    }

    #[test]
    fn test_open_maps_driver_faults() {
        let mut s = session();
        s.device_mut().fail_probe = true;
        assert_eq!(s.ensure_open(), Err(SessionError::DeviceNotFound));

        s.device_mut().fail_probe = false;
        s.device_mut().fail_init = true;
        assert_eq!(s.ensure_open(), Err(SessionError::InitFailed));

        s.device_mut().fail_init = false;
        s.device_mut().fail_open = true;
        assert_eq!(s.ensure_open(), Err(SessionError::OpenFailed));
        assert!(!s.is_open());

        s.device_mut().fail_open = false;
        assert_eq!(s.ensure_open(), Ok(()));
        assert!(s.is_open());
        assert!(s.device().sink.is_some());
    }

    #[test]
    fn test_start_requires_open() {
        let mut s = session();
        assert_eq!(s.start(), Err(SessionError::StartFailed));
        assert_eq!(s.device().starts, 0);
    }

    #[test]
    fn test_stop_is_idempotent() {
        let mut s = session();
        s.stop();

        s.ensure_open().unwrap();
        s.start().unwrap();
        s.stop();
        s.stop();

        assert!(!s.is_running());
        assert!(!s.device().running);
    }

    #[test]
    fn test_restart_refuses_previous_epoch() {
        let mut s = session();
        s.device_mut().frames_on_start = false;
        s.ensure_open().unwrap();
        s.start().unwrap();
        s.device_mut().emit();
        let old = s.consume_frame().unwrap();
        assert!(s.read_frame(&old, |b| b.len()).is_some());

        s.stop();
        // Frozen buffer stays readable until the next start
        assert!(s.read_frame(&old, |b| b.len()).is_some());

        s.start().unwrap();
        assert_eq!(s.read_frame(&old, |b| b.len()), None);
        assert_eq!(s.consume_frame(), None);
    }

    #[test]
    fn test_fallback_frame_only_while_running() {
        let mut s = session();
        s.ensure_open().unwrap();
        assert_eq!(s.fallback_frame(), None);

        s.start().unwrap();
        let frame = s.fallback_frame().unwrap();
        assert_eq!(frame.epoch(), s.epoch());

        s.stop();
        assert_eq!(s.fallback_frame(), None);
    }

    #[test]
    fn test_shutdown_closes_device() {
        let mut s = session();
        s.ensure_open().unwrap();
        s.start().unwrap();

        s.shutdown();

        assert!(!s.is_open());
        assert!(s.device().closed);
        assert_eq!(s.status(), None);
    }
}
