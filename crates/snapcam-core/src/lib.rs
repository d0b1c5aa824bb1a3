//! Hardware-independent core library for snapcam
//!
//! This crate contains the platform-agnostic application layer of the
//! camera device: the preview/photo/standby state machine, the single-slot
//! photo store living on a scarce auxiliary heap, the frame handoff between
//! the camera's notification context and the poll loop, the hexadecimal
//! photo exporter and the operator shell.
//!
//! It is `#![no_std]` with `extern crate alloc` so it compiles on both
//! embedded targets and desktop hosts (for the simulator and tests).

#![no_std]

extern crate alloc;

pub mod app;
pub mod camera;
pub mod config;
pub mod display;
pub mod error;
pub mod export;
pub mod frame;
pub mod heap;
pub mod input;
pub mod photo;
pub mod shell;

#[cfg(test)]
pub(crate) mod testing;

pub use app::{AppController, AppState, AppStatus, PhotoSource};
pub use config::AppConfig;
pub use error::{AppError, ExportError, HeapError, PhotoError, SessionError};

/// Monotonic time source for the poll loop.
///
/// The delay half comes from `embedded-hal`; the tick counter stamps photos
/// and paces the FPS label. Ticks are milliseconds since boot.
pub trait Clock: embedded_hal::delay::DelayNs {
    fn now_ms(&self) -> u64;
}
