//! Application controller: the standby / preview / photo state machine.
//!
//! The controller is the context object of the device. It owns the camera
//! session, the photo store (and through it the scarce heap), the display
//! surface and the clock, and is driven from a single cooperative poll loop:
//!
//! ```text
//!            KEY1                 KEY1
//!  DEFAULT ────────► CAPTURE ──────────────► PHOTO
//!     ▲                │  ▲                   │
//!     └──── KEY2 ──────┘  └────── KEY2 ───────┘
//! ```
//!
//! Button clicks and frame notifications arrive from other contexts through
//! the [`ButtonInbox`] and the [`FrameBridge`](crate::frame::FrameBridge);
//! nothing here runs inside those contexts.

use core::fmt::Write;

use embedded_graphics::pixelcolor::Rgb565;
use embedded_graphics::prelude::DrawTarget;
use log::{debug, error, info, warn};

use crate::Clock;
use crate::camera::{CameraDevice, CameraInfo, CameraSession, CameraStatus};
use crate::config::AppConfig;
use crate::display::{
    DisplaySurface, ImageBinding, ImageResolver, ImageSource, PixelFormat, ScreenId,
    ScreenRenderer, SurfaceId,
};
use crate::error::{AppError, ExportError, PhotoError, SessionError};
use crate::export::{self, ExportSummary};
use crate::frame::FrameRef;
use crate::heap::HeapStatus;
use crate::input::{ButtonEvent, ButtonInbox, KeyId};
use crate::photo::{PhotoInfo, PhotoStore};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppState {
    /// Standby, camera stopped
    Default,
    /// Live preview
    Capture,
    /// Reviewing the captured photo
    Photo,
}

impl AppState {
    pub const fn label(self) -> &'static str {
        match self {
            Self::Default => "DEFAULT",
            Self::Capture => "CAPTURE",
            Self::Photo => "PHOTO",
        }
    }
}

/// What a button click does in a given state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    StartPreview,
    TakePhoto,
    ReturnToStandby,
    ResumePreview,
    Ignore,
}

impl Transition {
    /// The full transition table. Every (state, key) pair is listed.
    pub const fn select(state: AppState, key: KeyId) -> Self {
        match (state, key) {
            (AppState::Default, KeyId::Key1) => Self::StartPreview,
            (AppState::Default, KeyId::Key2) => Self::Ignore,
            (AppState::Capture, KeyId::Key1) => Self::TakePhoto,
            (AppState::Capture, KeyId::Key2) => Self::ReturnToStandby,
            (AppState::Photo, KeyId::Key1) => Self::Ignore,
            (AppState::Photo, KeyId::Key2) => Self::ResumePreview,
            (_, KeyId::Other(_)) => Self::Ignore,
        }
    }
}

/// What the photo surface is showing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PhotoSource {
    None,
    Stored,
    /// Saving failed; the last live frame is shown instead
    LiveFallback,
}

impl PhotoSource {
    pub const fn label(self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Stored => "stored",
            Self::LiveFallback => "live fallback",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AppStatus {
    pub state: AppState,
    pub session_open: bool,
    /// Most recently consumed frame
    pub frame: Option<FrameRef>,
    pub photo_valid: bool,
    pub photo_source: PhotoSource,
    /// Driver counters, only while the session is open
    pub camera: Option<CameraStatus>,
}

pub struct AppController<'p, C, S, K> {
    config: AppConfig,
    state: AppState,
    session: CameraSession<C>,
    photos: PhotoStore<'p>,
    display: S,
    clock: K,
    /// Most recently consumed frame of the current epoch
    live_frame: Option<FrameRef>,
    /// Frame currently bound to the preview surface
    preview: Option<FrameRef>,
    photo_source: PhotoSource,
    last_fps_update: u64,
}

impl<'p, C, S, K> AppController<'p, C, S, K>
where
    C: CameraDevice,
    S: DisplaySurface,
    K: Clock,
{
    pub fn new(
        config: AppConfig,
        session: CameraSession<C>,
        photos: PhotoStore<'p>,
        display: S,
        clock: K,
    ) -> Self {
        Self {
            config,
            state: AppState::Default,
            session,
            photos,
            display,
            clock,
            live_frame: None,
            preview: None,
            photo_source: PhotoSource::None,
            last_fps_update: 0,
        }
    }

    /// Claim the photo heap and show the standby screen.
    ///
    /// A heap that cannot be claimed only disables photos; the preview still
    /// works.
    pub fn boot(&mut self) {
        if let Err(e) = self.photos.init_heap() {
            warn!("Photo heap unavailable, photos disabled: {}", e);
        }
        self.enter_default();
        info!("Camera application started, press KEY1 to start preview");
    }

    /// One iteration of the poll loop.
    ///
    /// Pending clicks are handled first, each transition completing before
    /// the next; only then is the frame handoff checked.
    pub fn poll(&mut self, inbox: &ButtonInbox) {
        while let Some(event) = inbox.take() {
            // Failures are logged where they happen; the state stays safe
            if let Err(e) = self.handle_event(event) {
                debug!("{:?} in {} not applied: {}", event.key, self.state.label(), e);
            }
        }

        if self.state == AppState::Capture {
            self.refresh_preview();
            self.refresh_fps();
        }
    }

    pub fn handle_event(&mut self, event: ButtonEvent) -> Result<(), AppError> {
        let transition = Transition::select(self.state, event.key);
        debug!("{} + {:?} => {:?}", self.state.label(), event.key, transition);

        match transition {
            Transition::StartPreview | Transition::ResumePreview => self.enter_capture(),
            Transition::TakePhoto => {
                self.take_photo();
                Ok(())
            }
            Transition::ReturnToStandby => {
                self.enter_default();
                Ok(())
            }
            Transition::Ignore => Ok(()),
        }
    }

    /// Stop the camera and show the standby screen.
    pub fn enter_default(&mut self) {
        info!("Entering DEFAULT state");
        self.session.stop();
        self.live_frame = None;
        self.preview = None;
        self.photo_source = PhotoSource::None;
        self.display.unbind(SurfaceId::Preview);
        self.display.load_screen(ScreenId::Standby);
        self.state = AppState::Default;
    }

    /// Start the preview.
    ///
    /// The state only changes once a frame of the new capture is bound to
    /// the preview surface. On failure the camera is stopped again and the
    /// previous state kept.
    pub fn enter_capture(&mut self) -> Result<(), AppError> {
        info!("Entering CAPTURE state");

        let frame = match self.start_first_frame() {
            Ok(frame) => frame,
            Err(e) => {
                self.session.stop();
                error!("Cannot enter CAPTURE: {}", e);
                return Err(e.into());
            }
        };

        self.bind_preview(frame);
        self.live_frame = Some(frame);
        self.photo_source = PhotoSource::None;
        self.display.load_screen(ScreenId::Viewfinder);
        self.display.set_fps(self.session.fps());
        self.last_fps_update = self.clock.now_ms();
        self.state = AppState::Capture;
        Ok(())
    }

    /// Stop capture, save the last consumed frame and show it.
    pub fn take_photo(&mut self) {
        info!("Taking photo");
        self.session.stop();

        let now = self.clock.now_ms();
        let (width, height) = (self.config.frame_width, self.config.frame_height);
        let frame_size = self.config.frame_size();
        let saved: Result<(), AppError> = match self.live_frame {
            Some(frame) => {
                let photos = &mut self.photos;
                self.session
                    .read_frame(&frame, |bytes| {
                        // Driver buffers may be padded past the configured frame
                        let data = bytes.get(..frame_size as usize).ok_or(
                            PhotoError::SizeMismatch {
                                expected: frame_size,
                                actual: bytes.len() as u32,
                            },
                        )?;
                        photos.save(data, width, height, now)
                    })
                    .ok_or(AppError::from(SessionError::NoFrameAvailable))
                    .and_then(|saved| saved.map_err(AppError::from))
            }
            None => Err(SessionError::NoFrameAvailable.into()),
        };

        match saved {
            Ok(()) => info!("Photo saved"),
            Err(e) => error!("Failed to save photo: {}", e),
        }

        self.enter_photo();
    }

    /// Show the stored photo, or the last live frame if there is none.
    pub fn enter_photo(&mut self) {
        info!("Entering PHOTO state");

        let stored = self.photos.info();
        let binding = match (stored, self.live_frame) {
            (Some(info), _) => {
                self.photo_source = PhotoSource::Stored;
                Some(ImageBinding {
                    source: ImageSource::StoredPhoto,
                    width: info.width,
                    height: info.height,
                    format: PixelFormat::Rgb565,
                })
            }
            (None, Some(frame)) => {
                warn!("No stored photo, showing the last live frame instead");
                self.photo_source = PhotoSource::LiveFallback;
                Some(self.live_binding(frame))
            }
            (None, None) => {
                warn!("No stored photo and no live frame to show");
                self.photo_source = PhotoSource::None;
                None
            }
        };

        match binding {
            Some(binding) => self.display.bind_image(SurfaceId::Photo, binding),
            None => self.display.unbind(SurfaceId::Photo),
        }
        self.display.load_screen(ScreenId::Review);
        self.state = AppState::Photo;
    }

    pub fn status(&self) -> AppStatus {
        AppStatus {
            state: self.state,
            session_open: self.session.is_open(),
            frame: self.live_frame,
            photo_valid: self.photos.is_valid(),
            photo_source: self.photo_source,
            camera: self.session.status(),
        }
    }

    /// Stream the stored photo as a hex transcript, paced by the clock.
    pub fn export_photo<W: Write>(&mut self, out: &mut W) -> Result<ExportSummary, ExportError> {
        export::export_photo(&self.photos, out, &mut self.clock, &self.config)
    }

    /// Drop the stored photo. A photo view showing it falls back to nothing.
    pub fn clear_photo(&mut self) {
        self.photos.clear();
        if self.state == AppState::Photo && self.photo_source == PhotoSource::Stored {
            self.photo_source = PhotoSource::None;
            self.display.unbind(SurfaceId::Photo);
        }
    }

    pub fn photo_info(&self) -> Option<PhotoInfo> {
        self.photos.info()
    }

    pub fn heap_status(&self) -> HeapStatus {
        self.photos.heap_status()
    }

    pub fn camera_info(&self) -> Option<CameraInfo> {
        self.session.info()
    }

    /// Stop and release the camera.
    pub fn shutdown(&mut self) {
        self.session.shutdown();
    }

    pub fn state(&self) -> AppState {
        self.state
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub fn session(&self) -> &CameraSession<C> {
        &self.session
    }

    pub fn display(&self) -> &S {
        &self.display
    }

    pub fn clock_mut(&mut self) -> &mut K {
        &mut self.clock
    }

    /// Open and start the camera, then wait for a frame of the new capture.
    fn start_first_frame(&mut self) -> Result<FrameRef, SessionError> {
        self.session.ensure_open()?;
        self.session.start()?;

        let timeout = self.config.first_frame_timeout_ms;
        let step = self.config.poll_step_ms.max(1);
        let mut waited = 0;
        loop {
            if let Some(frame) = self.session.consume_frame() {
                debug!("First frame after {} ms", waited);
                return Ok(frame);
            }
            // A stop issued during the wait must end it
            if !self.session.is_running() {
                warn!("Camera stopped while waiting for the first frame");
                break;
            }
            if waited >= timeout {
                warn!("No frame notification within {} ms", timeout);
                break;
            }
            self.clock.delay_ms(step);
            waited = waited.saturating_add(step);
        }

        self.session.fallback_frame().ok_or(SessionError::NoFrameAvailable)
    }

    fn refresh_preview(&mut self) {
        let Some(frame) = self.session.consume_frame() else {
            return;
        };
        if self.preview != Some(frame) {
            self.bind_preview(frame);
        }
        self.live_frame = Some(frame);
        self.display.invalidate(SurfaceId::Preview);
    }

    fn refresh_fps(&mut self) {
        let now = self.clock.now_ms();
        if now.saturating_sub(self.last_fps_update) >= u64::from(self.config.fps_refresh_ms) {
            self.display.set_fps(self.session.fps());
            self.last_fps_update = now;
        }
    }

    fn bind_preview(&mut self, frame: FrameRef) {
        let binding = self.live_binding(frame);
        self.display.bind_image(SurfaceId::Preview, binding);
        self.preview = Some(frame);
    }

    fn live_binding(&self, frame: FrameRef) -> ImageBinding {
        ImageBinding {
            source: ImageSource::LiveFrame(frame),
            width: self.config.frame_width,
            height: self.config.frame_height,
            format: PixelFormat::Rgb565,
        }
    }
}

impl<C, K> AppController<'_, C, ScreenRenderer, K>
where
    C: CameraDevice,
    K: Clock,
{
    /// Draw the active screen if it changed. Returns whether it was drawn.
    pub fn render<D>(&mut self, target: &mut D) -> Result<bool, D::Error>
    where
        D: DrawTarget<Color = Rgb565>,
    {
        let resolver = SourceResolver {
            session: &self.session,
            photos: &self.photos,
        };
        self.display.draw(target, &resolver)
    }
}

/// Resolves image tokens against the live session and the photo store.
struct SourceResolver<'a, 'p, C> {
    session: &'a CameraSession<C>,
    photos: &'a PhotoStore<'p>,
}

impl<C: CameraDevice> ImageResolver for SourceResolver<'_, '_, C> {
    fn with_image<R>(&self, source: &ImageSource, f: impl FnOnce(&[u8]) -> R) -> Option<R> {
        match source {
            ImageSource::LiveFrame(frame) => self.session.read_frame(frame, f),
            ImageSource::StoredPhoto => self.photos.get().ok().map(|photo| f(photo.data)),
        }
    }
}
