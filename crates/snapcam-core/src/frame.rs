//! Frame handoff between the camera's notification context and the poll loop.
//!
//! The camera driver reports "buffer N is ready" from an interrupt or its own
//! thread. That report is stored in a single overwrite-on-publish slot
//! ([`embassy_sync::signal::Signal`]) so the producer never blocks and the
//! consumer only ever sees the newest complete reference. Every reference is
//! stamped with the capture epoch, which the camera session bumps on each
//! start; references from an earlier epoch are refused when read.

extern crate alloc;

use alloc::sync::Arc;
use core::cell::Cell;

use embassy_sync::blocking_mutex::Mutex;
use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::signal::Signal;

/// A driver-owned frame buffer as reported by the camera.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameBuffer {
    /// Driver buffer index
    pub slot: u16,
    /// Address of the buffer, for diagnostics only
    pub addr: usize,
    /// Valid bytes in the buffer
    pub len: u32,
}

/// Non-owning, epoch-tagged token for a driver frame buffer.
///
/// Holds no pointer: the bytes are only reachable through
/// [`CameraSession::read_frame`](crate::camera::CameraSession::read_frame),
/// which checks the epoch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameRef {
    epoch: u32,
    buffer: FrameBuffer,
}

impl FrameRef {
    pub(crate) const fn new(epoch: u32, buffer: FrameBuffer) -> Self {
        Self { epoch, buffer }
    }

    pub const fn epoch(&self) -> u32 {
        self.epoch
    }

    pub const fn buffer(&self) -> FrameBuffer {
        self.buffer
    }
}

struct Counters {
    epoch: Cell<u32>,
    published: Cell<u32>,
}

/// Single-slot, overwrite-on-publish frame handoff.
///
/// A published reference is stamped with the epoch current when
/// [`FrameBridge::publish`] runs, not the epoch of the capture that filled
/// the buffer. The bridge cannot tell a late notification from an earlier
/// capture apart from a fresh one, so stale-frame safety relies on the
/// driver contract of [`crate::camera::CameraDevice`]: no sink call after
/// `stop` returns.
pub struct FrameBridge {
    counters: Mutex<CriticalSectionRawMutex, Counters>,
    pending: Signal<CriticalSectionRawMutex, FrameRef>,
}

impl Default for FrameBridge {
    fn default() -> Self {
        Self::new()
    }
}

impl FrameBridge {
    pub const fn new() -> Self {
        Self {
            counters: Mutex::new(Counters {
                epoch: Cell::new(0),
                published: Cell::new(0),
            }),
            pending: Signal::new(),
        }
    }

    /// Record `buffer` as the newest frame. Called from the notification
    /// context; overwrites any reference not yet consumed.
    pub fn publish(&self, buffer: FrameBuffer) {
        self.counters.lock(|c| {
            c.published.set(c.published.get().wrapping_add(1));
            self.pending.signal(FrameRef::new(c.epoch.get(), buffer));
        });
    }

    /// Take the pending reference, if a frame arrived since the last call.
    pub fn consume(&self) -> Option<FrameRef> {
        self.pending.try_take()
    }

    /// Start a new capture epoch and drop any pending reference.
    pub fn rearm(&self) -> u32 {
        self.counters.lock(|c| {
            let epoch = c.epoch.get().wrapping_add(1);
            c.epoch.set(epoch);
            self.pending.reset();
            epoch
        })
    }

    pub fn epoch(&self) -> u32 {
        self.counters.lock(|c| c.epoch.get())
    }

    /// Total number of publishes since boot.
    pub fn published(&self) -> u32 {
        self.counters.lock(|c| c.published.get())
    }
}

/// Producer handle given to the camera driver as its frame callback.
#[derive(Clone)]
pub struct FrameSink {
    bridge: Arc<FrameBridge>,
}

impl FrameSink {
    pub fn new(bridge: Arc<FrameBridge>) -> Self {
        Self { bridge }
    }

    /// Frame-ready notification. Never blocks.
    pub fn frame_ready(&self, buffer: FrameBuffer) {
        self.bridge.publish(buffer);
    }
}
