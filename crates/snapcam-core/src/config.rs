//! Application configuration
//!
//! Defaults match the reference board: BF30A2 sensor at 240x320 RGB565,
//! KEY1 on PA34, KEY2 on PA11 and a 512 KiB auxiliary heap. The struct can be
//! persisted as a `postcard` blob so a board can override it from flash.

extern crate alloc;

use alloc::vec::Vec;
use serde::{Deserialize, Serialize};

/// Bytes per pixel of the fixed RGB565 pixel format.
pub const BYTES_PER_PIXEL: u32 = 2;

/// Default size of the auxiliary photo heap (512 KiB).
pub const DEFAULT_HEAP_SIZE: u32 = 512 * 1024;

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct AppConfig {
    /// GPIO pin of the start/photo key
    pub key1_pin: i32,
    /// GPIO pin of the back key
    pub key2_pin: i32,
    pub frame_width: u32,
    pub frame_height: u32,
    /// Capacity of the auxiliary heap in bytes
    pub heap_size: u32,
    /// Upper bound on the wait for the first frame after a start
    pub first_frame_timeout_ms: u32,
    /// Step of the first-frame wait and of the simulator poll loop
    pub poll_step_ms: u32,
    /// Refresh period of the FPS label while previewing
    pub fps_refresh_ms: u32,
    /// Number of exported photo bytes between two pacing delays
    pub pace_every_bytes: u32,
    pub pace_delay_ms: u32,
    /// Tag written on the `SOURCE:` line of the transcript
    pub export_source: heapless::String<16>,
}

impl Default for AppConfig {
    fn default() -> Self {
        let mut export_source = heapless::String::new();
        // "PSRAM" always fits in 16 bytes
        let _ = export_source.push_str("PSRAM");

        Self {
            key1_pin: 34,
            key2_pin: 11,
            frame_width: 240,
            frame_height: 320,
            heap_size: DEFAULT_HEAP_SIZE,
            first_frame_timeout_ms: 1000,
            poll_step_ms: 10,
            fps_refresh_ms: 500,
            pace_every_bytes: 1024,
            pace_delay_ms: 5,
            export_source,
        }
    }
}

impl AppConfig {
    /// Size in bytes of one full RGB565 frame.
    pub const fn frame_size(&self) -> u32 {
        self.frame_width
            .saturating_mul(self.frame_height)
            .saturating_mul(BYTES_PER_PIXEL)
    }

    /// Serialize to a compact blob suitable for a flash partition.
    pub fn to_bytes(&self) -> Result<Vec<u8>, postcard::Error> {
        postcard::to_allocvec(self)
    }

    /// Load from a blob written by [`AppConfig::to_bytes`].
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, postcard::Error> {
        postcard::from_bytes(bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_frame_size() {
        let config = AppConfig::default();
        assert_eq!(config.frame_size(), 153_600);
        assert!(config.frame_size() <= config.heap_size);
    }

    #[test]
    fn test_oversized_geometry_saturates_frame_size() {
        let config = AppConfig {
            frame_width: u32::MAX,
            frame_height: 2,
            ..AppConfig::default()
        };
        assert_eq!(config.frame_size(), u32::MAX);
    }

    #[test]
    fn test_blob_restores_overrides() {
        let mut config = AppConfig::default();
        config.key1_pin = 5;
        config.first_frame_timeout_ms = 250;

        let blob = config.to_bytes().unwrap();
        let restored = AppConfig::from_bytes(&blob).unwrap();

        assert_eq!(restored, config);
        assert_eq!(restored.export_source.as_str(), "PSRAM");
    }

    #[test]
    fn test_truncated_blob_is_rejected() {
        let blob = AppConfig::default().to_bytes().unwrap();
        assert!(AppConfig::from_bytes(&blob[..blob.len() / 2]).is_err());
    }
}
