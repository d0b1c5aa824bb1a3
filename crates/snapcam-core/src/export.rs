//! Hexadecimal photo transcript over a serial-style text channel.
//!
//! The transcript is the contract with the host-side decoding tools and is
//! reproduced byte for byte:
//!
//! ```text
//!
//! ===PHOTO_START===
//! WIDTH:240
//! HEIGHT:320
//! FORMAT:RGB565
//! SIZE:153600
//! SOURCE:PSRAM
//! ===DATA_BEGIN===
//! 0A1B2C...            (64 upper-case hex characters per line)
//!
//! ===DATA_END===
//! ===PHOTO_END===
//!
//! ```
//!
//! Every full line of 32 bytes ends with a newline and the `DATA_END` marker
//! is preceded by one more, so a body that is a whole number of lines is
//! followed by an empty line. Output is streamed one line at a time.

use core::fmt::Write;

use embedded_hal::delay::DelayNs;
use log::info;

use crate::config::AppConfig;
use crate::display::PixelFormat;
use crate::error::ExportError;
use crate::photo::PhotoStore;

pub const PHOTO_START: &str = "===PHOTO_START===";
pub const DATA_BEGIN: &str = "===DATA_BEGIN===";
pub const DATA_END: &str = "===DATA_END===";
pub const PHOTO_END: &str = "===PHOTO_END===";

/// Photo bytes per transcript line
pub const BYTES_PER_LINE: usize = 32;

const HEX_DIGITS: &[u8; 16] = b"0123456789ABCDEF";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExportSummary {
    pub bytes: u32,
    pub lines: u32,
}

/// Write the stored photo as a transcript to `out`.
///
/// Sleeps `pace_delay_ms` on `delay` after every `pace_every_bytes` bytes so
/// a slow console can drain. Nothing is written when there is no photo.
pub fn export_photo<W, D>(
    store: &PhotoStore<'_>,
    out: &mut W,
    delay: &mut D,
    config: &AppConfig,
) -> Result<ExportSummary, ExportError>
where
    W: Write,
    D: DelayNs,
{
    let photo = store.get().map_err(|_| ExportError::NoPhoto)?;

    info!("Exporting photo: {}x{}, {} bytes", photo.width, photo.height, photo.size);

    writeln!(out, "\n{}", PHOTO_START)?;
    writeln!(out, "WIDTH:{}", photo.width)?;
    writeln!(out, "HEIGHT:{}", photo.height)?;
    writeln!(out, "FORMAT:{}", PixelFormat::Rgb565.label())?;
    writeln!(out, "SIZE:{}", photo.size)?;
    writeln!(out, "SOURCE:{}", config.export_source)?;
    writeln!(out, "{}", DATA_BEGIN)?;

    let pace_every = config.pace_every_bytes as usize;
    let mut line: heapless::String<{ BYTES_PER_LINE * 2 + 1 }> = heapless::String::new();
    let mut written = 0usize;
    let mut lines = 0u32;

    for chunk in photo.data.chunks(BYTES_PER_LINE) {
        line.clear();
        for &byte in chunk {
            // Capacity covers a full line plus its newline
            let _ = line.push(HEX_DIGITS[(byte >> 4) as usize] as char);
            let _ = line.push(HEX_DIGITS[(byte & 0x0F) as usize] as char);
        }
        if chunk.len() == BYTES_PER_LINE {
            let _ = line.push('\n');
        }
        out.write_str(&line)?;

        written += chunk.len();
        lines += 1;
        if chunk.len() == BYTES_PER_LINE && pace_every > 0 && written % pace_every == 0 {
            delay.delay_ms(config.pace_delay_ms);
        }
    }

    writeln!(out, "\n{}", DATA_END)?;
    writeln!(out, "{}\n", PHOTO_END)?;

    info!("Photo export completed");
    Ok(ExportSummary {
        bytes: photo.size,
        lines,
    })
}
