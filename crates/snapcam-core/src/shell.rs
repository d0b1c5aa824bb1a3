//! Operator shell commands.
//!
//! Every command goes through the [`AppController`]; key commands inject
//! clicks through the [`ButtonInbox`] like the button driver would, so they
//! are handled on the next poll.

use core::fmt::Write;

use log::warn;

use crate::Clock;
use crate::app::AppController;
use crate::camera::CameraDevice;
use crate::display::DisplaySurface;
use crate::input::{ButtonInbox, KeyId};

/// Commands with their help text.
pub const COMMANDS: &[(&str, &str)] = &[
    ("export-photo", "Export the stored photo as a hex transcript"),
    ("photo-info", "Show stored photo information"),
    ("photo-clear", "Clear the stored photo"),
    ("heap-status", "Show photo heap status"),
    ("app-status", "Show application status"),
    ("cam-status", "Show camera information"),
    ("key1", "Click KEY1"),
    ("key2", "Click KEY2"),
    ("help", "List commands"),
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShellCommand<'a> {
    ExportPhoto,
    PhotoInfo,
    PhotoClear,
    HeapStatus,
    AppStatus,
    CamStatus,
    Key1,
    Key2,
    Help,
    Unknown(&'a str),
}

impl<'a> ShellCommand<'a> {
    /// Parse one input line. Blank lines yield `None`; arguments are ignored.
    pub fn parse(line: &'a str) -> Option<Self> {
        let name = line.split_whitespace().next()?;
        Some(match name {
            "export-photo" => Self::ExportPhoto,
            "photo-info" => Self::PhotoInfo,
            "photo-clear" => Self::PhotoClear,
            "heap-status" => Self::HeapStatus,
            "app-status" => Self::AppStatus,
            "cam-status" => Self::CamStatus,
            "key1" => Self::Key1,
            "key2" => Self::Key2,
            "help" => Self::Help,
            other => Self::Unknown(other),
        })
    }
}

fn yes_no(flag: bool) -> &'static str {
    if flag { "Yes" } else { "No" }
}

pub fn execute<C, S, K, W>(
    command: ShellCommand<'_>,
    app: &mut AppController<'_, C, S, K>,
    inbox: &ButtonInbox,
    out: &mut W,
) -> core::fmt::Result
where
    C: CameraDevice,
    S: DisplaySurface,
    K: Clock,
    W: Write,
{
    match command {
        ShellCommand::ExportPhoto => {
            if let Err(e) = app.export_photo(out) {
                warn!("Photo export failed: {}", e);
                writeln!(out, "Export failed: {}", e)?;
            }
        }
        ShellCommand::PhotoInfo => match app.photo_info() {
            Some(info) => {
                writeln!(out, "=== Photo Info ===")?;
                writeln!(out, "  Valid: Yes")?;
                writeln!(out, "  Size: {}x{}", info.width, info.height)?;
                writeln!(out, "  Data size: {} bytes", info.size)?;
                writeln!(out, "  Address: +0x{:06X}", info.offset)?;
                writeln!(out, "  Timestamp: {} ms", info.timestamp)?;
                writeln!(out, "==================")?;
            }
            None => writeln!(out, "No photo stored")?,
        },
        ShellCommand::PhotoClear => {
            app.clear_photo();
            writeln!(out, "Photo cleared")?;
        }
        ShellCommand::HeapStatus => {
            let heap = app.heap_status();
            writeln!(out, "=== Photo Heap Status ===")?;
            writeln!(out, "  Initialized: {}", yes_no(heap.initialized))?;
            writeln!(out, "  Total: {} bytes ({} KB)", heap.capacity, heap.capacity / 1024)?;
            writeln!(out, "  Used: {} bytes ({} KB)", heap.used, heap.used / 1024)?;
            writeln!(out, "  Free: {} bytes ({} KB)", heap.free, heap.free / 1024)?;
            writeln!(out, "  Peak: {} bytes", heap.peak)?;
            writeln!(out, "  Failed allocations: {}", heap.failures)?;
            writeln!(out, "  Photo valid: {}", yes_no(app.photo_info().is_some()))?;
            writeln!(out, "=========================")?;
        }
        ShellCommand::AppStatus => {
            let status = app.status();
            writeln!(out, "=== Application Status ===")?;
            writeln!(out, "App state: {}", status.state.label())?;
            writeln!(
                out,
                "Camera device: {}",
                if status.session_open { "Opened" } else { "Not opened" }
            )?;
            match status.frame {
                Some(frame) => {
                    let buffer = frame.buffer();
                    writeln!(
                        out,
                        "Frame buffer: slot {} at 0x{:08X}, epoch {}",
                        buffer.slot,
                        buffer.addr,
                        frame.epoch()
                    )?;
                }
                None => writeln!(out, "Frame buffer: none")?,
            }
            writeln!(out, "Photo valid: {}", yes_no(status.photo_valid))?;
            writeln!(out, "Photo view: {}", status.photo_source.label())?;
            if let Some(camera) = status.camera {
                writeln!(
                    out,
                    "Camera state: {}",
                    if camera.running { "Running" } else { "Idle" }
                )?;
                writeln!(out, "FPS: {:.1}", camera.fps)?;
                writeln!(out, "Frames: {}", camera.frame_count)?;
                writeln!(out, "Errors: {}", camera.error_count)?;
            }
            writeln!(out, "==========================")?;
        }
        ShellCommand::CamStatus => match (app.camera_info(), app.status().camera) {
            (Some(info), Some(camera)) => {
                writeln!(out, "=== Camera Info ===")?;
                writeln!(out, "Chip ID: 0x{:04X}", info.chip_id)?;
                writeln!(out, "Resolution: {}x{}", info.width, info.height)?;
                writeln!(out, "Frame size: {} bytes", info.frame_size)?;
                writeln!(out, "State: {}", if camera.running { "Running" } else { "Idle" })?;
                writeln!(out, "FPS: {:.1}", camera.fps)?;
                writeln!(out, "Frames: {}", camera.frame_count)?;
                writeln!(out, "Errors: {}", camera.error_count)?;
                writeln!(out, "===================")?;
            }
            _ => writeln!(out, "Camera not initialized")?,
        },
        ShellCommand::Key1 => click(inbox, KeyId::Key1, out)?,
        ShellCommand::Key2 => click(inbox, KeyId::Key2, out)?,
        ShellCommand::Help => {
            for (name, help) in COMMANDS {
                writeln!(out, "  {:<14} - {}", name, help)?;
            }
        }
        ShellCommand::Unknown(name) => writeln!(out, "Unknown command: {}", name)?,
    }
    Ok(())
}

fn click<W: Write>(inbox: &ButtonInbox, key: KeyId, out: &mut W) -> core::fmt::Result {
    if inbox.post_key(key) {
        Ok(())
    } else {
        writeln!(out, "Button queue full")
    }
}
