//! Display surface abstraction and the screen renderer.
//!
//! The controller talks to the display only through [`DisplaySurface`]:
//! load one of the three screens, bind an image source to a surface,
//! invalidate a surface. Image sources are tokens ([`ImageSource`]), never
//! pointers; the renderer resolves them at draw time through an
//! [`ImageResolver`], which refuses frames from a stopped-and-restarted
//! session and photos that were cleared.

use core::fmt::Write;

use embedded_graphics::image::{Image, ImageRawLE};
use embedded_graphics::mono_font::MonoTextStyle;
use embedded_graphics::mono_font::ascii::{FONT_6X10, FONT_9X15_BOLD};
use embedded_graphics::pixelcolor::Rgb565;
use embedded_graphics::prelude::*;
use embedded_graphics::text::{Alignment, Text};
use log::debug;

use crate::frame::FrameRef;

/// Height of the title bar above and the hint bar below the image.
pub const BAR_HEIGHT_PX: u32 = 20;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScreenId {
    /// Title and "press KEY1" hint
    Standby,
    /// Live preview with FPS label
    Viewfinder,
    /// Captured photo
    Review,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SurfaceId {
    Preview,
    Photo,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PixelFormat {
    Rgb565,
}

impl PixelFormat {
    pub const fn label(self) -> &'static str {
        match self {
            Self::Rgb565 => "RGB565",
        }
    }
}

/// Where the pixels of a bound image come from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageSource {
    /// A camera driver buffer of a given capture epoch
    LiveFrame(FrameRef),
    /// Whatever the photo store currently holds
    StoredPhoto,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ImageBinding {
    pub source: ImageSource,
    pub width: u32,
    pub height: u32,
    pub format: PixelFormat,
}

/// Display collaborator as seen by the controller.
pub trait DisplaySurface {
    fn load_screen(&mut self, screen: ScreenId);

    fn bind_image(&mut self, surface: SurfaceId, binding: ImageBinding);

    fn unbind(&mut self, surface: SurfaceId);

    /// Request a redraw of the surface.
    fn invalidate(&mut self, surface: SurfaceId);

    fn set_fps(&mut self, fps: f32);
}

/// Resolves image sources to bytes for the duration of a closure.
pub trait ImageResolver {
    fn with_image<R>(&self, source: &ImageSource, f: impl FnOnce(&[u8]) -> R) -> Option<R>;
}

/// [`DisplaySurface`] that draws the three screens with `embedded-graphics`.
///
/// Layout: a title bar, the image, a hint bar. The panel is as wide as the
/// frame and two bars taller.
pub struct ScreenRenderer {
    screen: ScreenId,
    preview: Option<ImageBinding>,
    photo: Option<ImageBinding>,
    fps_text: heapless::String<16>,
    panel: Size,
    dirty: bool,
}

impl ScreenRenderer {
    pub fn new(frame_width: u32, frame_height: u32) -> Self {
        let mut fps_text = heapless::String::new();
        let _ = fps_text.push_str("FPS: --");

        Self {
            screen: ScreenId::Standby,
            preview: None,
            photo: None,
            fps_text,
            panel: Size::new(frame_width, frame_height.saturating_add(2 * BAR_HEIGHT_PX)),
            dirty: true,
        }
    }

    /// Size of the panel the renderer draws on.
    pub fn panel_size(&self) -> Size {
        self.panel
    }

    pub fn screen(&self) -> ScreenId {
        self.screen
    }

    pub fn binding(&self, surface: SurfaceId) -> Option<ImageBinding> {
        match surface {
            SurfaceId::Preview => self.preview,
            SurfaceId::Photo => self.photo,
        }
    }

    pub fn fps_text(&self) -> &str {
        &self.fps_text
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    /// Redraw the active screen if anything changed since the last draw.
    ///
    /// Returns whether a redraw happened.
    pub fn draw<D, R>(&mut self, target: &mut D, resolver: &R) -> Result<bool, D::Error>
    where
        D: DrawTarget<Color = Rgb565>,
        R: ImageResolver,
    {
        if !self.dirty {
            return Ok(false);
        }
        debug!("Rendering {:?} screen", self.screen);

        target.clear(Rgb565::BLACK)?;

        let center_x = self.panel.width as i32 / 2;
        let title_y = BAR_HEIGHT_PX as i32 - 5;
        let hint_y = self.panel.height as i32 - 6;
        let small = MonoTextStyle::new(&FONT_6X10, Rgb565::YELLOW);

        match self.screen {
            ScreenId::Standby => {
                let middle = self.panel.height as i32 / 2;
                Text::with_alignment(
                    "Camera",
                    Point::new(center_x, middle - 20),
                    MonoTextStyle::new(&FONT_9X15_BOLD, Rgb565::WHITE),
                    Alignment::Center,
                )
                .draw(target)?;
                Text::with_alignment(
                    "BF30A2 RGB565",
                    Point::new(center_x, middle + 5),
                    MonoTextStyle::new(&FONT_6X10, Rgb565::GREEN),
                    Alignment::Center,
                )
                .draw(target)?;
                Text::with_alignment(
                    "Press KEY1 to start",
                    Point::new(center_x, hint_y),
                    MonoTextStyle::new(&FONT_6X10, Rgb565::CSS_GRAY),
                    Alignment::Center,
                )
                .draw(target)?;
            }
            ScreenId::Viewfinder => {
                self.draw_image(target, self.preview, resolver)?;
                Text::with_alignment(
                    &self.fps_text,
                    Point::new(center_x, title_y),
                    MonoTextStyle::new(&FONT_6X10, Rgb565::GREEN),
                    Alignment::Center,
                )
                .draw(target)?;
                Text::with_alignment(
                    "K1:Photo K2:Back",
                    Point::new(center_x, hint_y),
                    small,
                    Alignment::Center,
                )
                .draw(target)?;
            }
            ScreenId::Review => {
                Text::with_alignment(
                    "Recorded",
                    Point::new(center_x, title_y),
                    MonoTextStyle::new(&FONT_6X10, Rgb565::RED),
                    Alignment::Center,
                )
                .draw(target)?;
                self.draw_image(target, self.photo, resolver)?;
                Text::with_alignment(
                    "K2:Back to viewfinder",
                    Point::new(center_x, hint_y),
                    small,
                    Alignment::Center,
                )
                .draw(target)?;
            }
        }

        self.dirty = false;
        Ok(true)
    }

    fn draw_image<D, R>(
        &self,
        target: &mut D,
        binding: Option<ImageBinding>,
        resolver: &R,
    ) -> Result<(), D::Error>
    where
        D: DrawTarget<Color = Rgb565>,
        R: ImageResolver,
    {
        let origin = Point::new(0, BAR_HEIGHT_PX as i32);
        let drawn = binding.and_then(|binding| {
            resolver.with_image(&binding.source, |bytes| {
                let raw = ImageRawLE::<Rgb565>::new(bytes, binding.width);
                Image::new(&raw, origin).draw(target)
            })
        });

        match drawn {
            Some(result) => result,
            None => Text::with_alignment(
                "No image",
                Point::new(self.panel.width as i32 / 2, self.panel.height as i32 / 2),
                MonoTextStyle::new(&FONT_6X10, Rgb565::CSS_GRAY),
                Alignment::Center,
            )
            .draw(target)
            .map(|_| ()),
        }
    }
}

impl DisplaySurface for ScreenRenderer {
    fn load_screen(&mut self, screen: ScreenId) {
        self.screen = screen;
        self.dirty = true;
    }

    fn bind_image(&mut self, surface: SurfaceId, binding: ImageBinding) {
        match surface {
            SurfaceId::Preview => self.preview = Some(binding),
            SurfaceId::Photo => self.photo = Some(binding),
        }
        self.dirty = true;
    }

    fn unbind(&mut self, surface: SurfaceId) {
        match surface {
            SurfaceId::Preview => self.preview = None,
            SurfaceId::Photo => self.photo = None,
        }
        self.dirty = true;
    }

    fn invalidate(&mut self, surface: SurfaceId) {
        let visible = matches!(
            (self.screen, surface),
            (ScreenId::Viewfinder, SurfaceId::Preview) | (ScreenId::Review, SurfaceId::Photo)
        );
        if visible {
            self.dirty = true;
        }
    }

    fn set_fps(&mut self, fps: f32) {
        self.fps_text.clear();
        // "FPS: " plus a float with one decimal fits unless the driver is broken
        if write!(self.fps_text, "FPS: {:.1}", fps).is_err() {
            self.fps_text.clear();
            let _ = self.fps_text.push_str("FPS: ?");
        }
        if self.screen == ScreenId::Viewfinder {
            self.dirty = true;
        }
    }
}
