//! Desktop simulator for the snapcam camera device.
//!
//! Runs the snapcam-core controller against a simulated sensor and renders
//! its screens into an off-screen `embedded-graphics-simulator` display.
//! Input is line based on stdin: every shell command of the device is
//! available, plus a few simulator commands.
//!
//! # Commands
//!
//! | Command                | Action                                  |
//! |------------------------|-----------------------------------------|
//! | `key1`, `key2`         | Click KEY1 / KEY2                       |
//! | `export-photo` etc.    | Device shell commands (`help` lists)    |
//! | `screenshot [path]`    | Save the current screen as a PNG        |
//! | `config-save [path]`   | Write the active config as a blob       |
//! | `quit`                 | Exit                                    |
//!
//! Set `SNAPCAM_CONFIG` to a blob written by `config-save` to override the
//! defaults, and `RUST_LOG` to control log output.

mod sim_camera;

use std::io::{BufRead, Write as _};
use std::sync::Arc;
use std::sync::mpsc::{self, Receiver, TryRecvError};
use std::time::{Duration, Instant};

use embedded_graphics::pixelcolor::Rgb565;
use embedded_graphics_simulator::{OutputSettingsBuilder, SimulatorDisplay};
use embedded_hal::delay::DelayNs;
use log::{error, info, warn};

use snapcam_core::camera::CameraSession;
use snapcam_core::display::ScreenRenderer;
use snapcam_core::frame::FrameBridge;
use snapcam_core::heap::ScarceHeap;
use snapcam_core::input::ButtonInbox;
use snapcam_core::photo::PhotoStore;
use snapcam_core::shell::{self, ShellCommand};
use snapcam_core::{AppConfig, AppController, Clock};

use crate::sim_camera::SimCamera;

// ---------------------------------------------------------------------------
// Constants
// ---------------------------------------------------------------------------

/// Frame rate of the simulated sensor.
const SIM_CAMERA_FPS: u32 = 15;

/// Pixel scale factor for screenshots.
const SCREENSHOT_SCALE: u32 = 2;

const DEFAULT_SCREENSHOT_PATH: &str = "snapcam-screen.png";
const DEFAULT_CONFIG_PATH: &str = "snapcam.cfg";

/// Environment variable naming a config blob to load at startup.
const CONFIG_ENV: &str = "SNAPCAM_CONFIG";

// ---------------------------------------------------------------------------
// Host services
// ---------------------------------------------------------------------------

/// Wall clock; delays really sleep.
struct StdClock {
    boot: Instant,
}

impl StdClock {
    fn new() -> Self {
        Self {
            boot: Instant::now(),
        }
    }
}

impl DelayNs for StdClock {
    fn delay_ns(&mut self, ns: u32) {
        std::thread::sleep(Duration::from_nanos(u64::from(ns)));
    }
}

impl Clock for StdClock {
    fn now_ms(&self) -> u64 {
        self.boot.elapsed().as_millis() as u64
    }
}

/// `core::fmt::Write` over stdout, so the transcript streams line by line.
struct Console<'a> {
    out: std::io::StdoutLock<'a>,
}

impl core::fmt::Write for Console<'_> {
    fn write_str(&mut self, s: &str) -> core::fmt::Result {
        self.out.write_all(s.as_bytes()).map_err(|_| core::fmt::Error)
    }
}

/// Forward stdin lines to the poll loop. The channel closes at EOF.
fn spawn_stdin_reader() -> Receiver<String> {
    let (tx, rx) = mpsc::channel();
    std::thread::spawn(move || {
        for line in std::io::stdin().lock().lines() {
            let Ok(line) = line else { break };
            if tx.send(line).is_err() {
                break;
            }
        }
    });
    rx
}

fn load_config() -> AppConfig {
    let Ok(path) = std::env::var(CONFIG_ENV) else {
        return AppConfig::default();
    };

    match std::fs::read(&path) {
        Ok(blob) => match AppConfig::from_bytes(&blob) {
            Ok(config) => {
                info!("Loaded config from {}", path);
                config
            }
            Err(e) => {
                warn!("Config blob {} is invalid ({}), using defaults", path, e);
                AppConfig::default()
            }
        },
        Err(e) => {
            warn!("Cannot read config {} ({}), using defaults", path, e);
            AppConfig::default()
        }
    }
}

fn save_config(config: &AppConfig, path: &str) {
    let result = config
        .to_bytes()
        .map_err(|e| e.to_string())
        .and_then(|blob| std::fs::write(path, blob).map_err(|e| e.to_string()));
    match result {
        Ok(()) => info!("Config written to {}", path),
        Err(e) => error!("Cannot write config to {}: {}", path, e),
    }
}

fn save_screenshot(display: &SimulatorDisplay<Rgb565>, path: &str) {
    let settings = OutputSettingsBuilder::new().scale(SCREENSHOT_SCALE).build();
    match display.to_rgb_output_image(&settings).save_png(path) {
        Ok(()) => info!("Screenshot saved to {}", path),
        Err(e) => error!("Cannot save screenshot to {}: {}", path, e),
    }
}

// ---------------------------------------------------------------------------
// Entry point
// ---------------------------------------------------------------------------

fn main() {
    env_logger::init();
    info!("Starting snapcam simulator");

    let config = load_config();
    info!(
        "Sensor: {}x{} RGB565 at {} FPS, photo heap {} KB",
        config.frame_width,
        config.frame_height,
        SIM_CAMERA_FPS,
        config.heap_size / 1024
    );
    info!("Type `help` for commands, `key1`/`key2` to press the keys, `quit` to exit");

    // Stands in for the PSRAM region of the board
    let mut region = vec![0u8; config.heap_size as usize];

    let bridge = Arc::new(FrameBridge::new());
    let camera = SimCamera::new(config.frame_width, config.frame_height, SIM_CAMERA_FPS);
    let renderer = ScreenRenderer::new(config.frame_width, config.frame_height);
    let mut display = SimulatorDisplay::<Rgb565>::new(renderer.panel_size());
    let inbox = ButtonInbox::from_config(&config);

    let mut app = AppController::new(
        config.clone(),
        CameraSession::new(camera, bridge),
        PhotoStore::new(ScarceHeap::new(&mut region)),
        renderer,
        StdClock::new(),
    );
    app.boot();

    let lines = spawn_stdin_reader();
    let poll_step = Duration::from_millis(u64::from(config.poll_step_ms.max(1)));

    'running: loop {
        loop {
            let line = match lines.try_recv() {
                Ok(line) => line,
                Err(TryRecvError::Empty) => break,
                Err(TryRecvError::Disconnected) => break 'running,
            };

            let mut words = line.split_whitespace();
            match words.next() {
                Some("quit" | "exit") => break 'running,
                Some("screenshot") => {
                    save_screenshot(&display, words.next().unwrap_or(DEFAULT_SCREENSHOT_PATH))
                }
                Some("config-save") => {
                    save_config(app.config(), words.next().unwrap_or(DEFAULT_CONFIG_PATH))
                }
                _ => {
                    let Some(command) = ShellCommand::parse(&line) else {
                        continue;
                    };
                    let stdout = std::io::stdout();
                    let mut console = Console { out: stdout.lock() };
                    if shell::execute(command, &mut app, &inbox, &mut console).is_err() {
                        error!("Console write failed");
                    }
                    let _ = console.out.flush();
                }
            }
        }

        app.poll(&inbox);
        let _ = app.render(&mut display);

        std::thread::sleep(poll_step);
    }

    app.shutdown();
    info!("Simulator exiting");
}
