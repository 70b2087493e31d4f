//! One graphics device plus the fonts drawn on it.
//!
//! Fonts own canvases on the device, so they live next to it in a handle
//! table of their own and are freed before the device closes.

use log::{info, warn};
use vellum_render::{
    Backend, CanvasHandle, DeviceState, GraphicsDevice, GraphicsError, Handle, HandleTable,
    PixelFormat, RecoveryError, SoftwareBackend,
};
use vellum_text::{Font, FontStyle, GlyphRasterizer};

use crate::config::RuntimeConfig;

pub type FontHandle = Handle<Font>;

pub struct Session {
    device: GraphicsDevice,
    fonts: HandleTable<Font>,
    config: RuntimeConfig,
}

impl Session {
    pub fn open(backend: Box<dyn Backend>, config: RuntimeConfig) -> Result<Self, GraphicsError> {
        let device = GraphicsDevice::open(backend, config.graphics.clone())?;
        Ok(Self {
            device,
            fonts: HandleTable::new(),
            config,
        })
    }

    /// Session on the software backend with a 32-bit primary surface.
    pub fn software(config: RuntimeConfig) -> Result<Self, GraphicsError> {
        Self::open(Box::new(SoftwareBackend::new(PixelFormat::XRGB8888)), config)
    }

    pub fn config(&self) -> &RuntimeConfig {
        &self.config
    }

    pub fn device(&self) -> &GraphicsDevice {
        &self.device
    }

    pub fn device_mut(&mut self) -> &mut GraphicsDevice {
        &mut self.device
    }

    // ── Fonts ───────────────────────────────────────────────────────

    pub fn font_count(&self) -> usize {
        self.fonts.len()
    }

    /// Load a font by file or family name. Failures are logged.
    pub fn load_font(&mut self, name: &str, height: u32, style: FontStyle) -> Option<FontHandle> {
        match Font::load(&mut self.device, name, height, style, self.config.atlas.clone()) {
            Ok(font) => {
                info!("Font '{name}' loaded at {height}px");
                Some(self.fonts.insert(font))
            }
            Err(e) => {
                warn!("Failed to load font '{name}': {e}");
                None
            }
        }
    }

    /// Register a font backed by a custom rasterizer.
    pub fn add_font(&mut self, rasterizer: Box<dyn GlyphRasterizer>, style: FontStyle) -> FontHandle {
        let font = Font::new(&mut self.device, rasterizer, style, self.config.atlas.clone());
        self.fonts.insert(font)
    }

    pub fn verify_font(&self, handle: FontHandle) -> Option<FontHandle> {
        self.fonts.contains(handle).then_some(handle)
    }

    pub fn font(&self, handle: FontHandle) -> Option<&Font> {
        self.fonts.get(handle)
    }

    pub fn free_font(&mut self, handle: FontHandle) {
        if let Some(font) = self.fonts.remove(handle) {
            font.free(&mut self.device);
        }
    }

    // ── Text ────────────────────────────────────────────────────────

    /// Draw UTF-8 `text` with `font` onto `dest`. Returns the drawn width.
    pub fn text(
        &mut self,
        font: FontHandle,
        dest: CanvasHandle,
        color: u32,
        x: i32,
        y: i32,
        text: &[u8],
    ) -> i32 {
        match self.fonts.get_mut(font) {
            Some(font) => font.render(&mut self.device, dest, color, x, y, text),
            None => 0,
        }
    }

    pub fn string_width(&mut self, font: FontHandle, text: &[u8]) -> i32 {
        match self.fonts.get_mut(font) {
            Some(font) => font.string_width(&mut self.device, text),
            None => 0,
        }
    }

    pub fn font_height(&self, font: FontHandle) -> u32 {
        self.fonts.get(font).map_or(0, Font::height)
    }

    // ── Frame loop ──────────────────────────────────────────────────

    pub fn flip(&mut self) -> Result<DeviceState, RecoveryError> {
        self.device.flip()
    }

    /// Free every font, then close the device.
    pub fn close(mut self) {
        let handles = self.fonts.handles();
        for handle in handles {
            self.free_font(handle);
        }
        self.device.close();
    }
}

// ===================================================================
// Tests
// ===================================================================

#[cfg(test)]
mod tests {
    use vellum_render::CanvasUsage;

    use super::*;

    fn session() -> Session {
        let mut config = RuntimeConfig::default();
        config.graphics.width = 32;
        config.graphics.height = 16;
        Session::software(config).unwrap()
    }

    #[test]
    fn test_open_software() {
        let session = session();
        assert_eq!(session.device().canvas_count(), 2);
        assert_eq!(session.font_count(), 0);
        assert_eq!(session.device().backend().name(), "software");
    }

    #[test]
    fn test_missing_font_file() {
        let mut session = session();
        assert!(session
            .load_font("/nonexistent/font.ttf", 12, FontStyle::REGULAR)
            .is_none());
        assert_eq!(session.font_count(), 0);
    }

    #[test]
    fn test_stale_font_draws_nothing() {
        let mut session = session();
        let dest = session
            .device_mut()
            .create_canvas(8, 8, CanvasUsage::Surface)
            .unwrap();
        let stale = FontHandle::from_bits((3 << 32) | 7).unwrap();
        assert!(session.verify_font(stale).is_none());
        assert_eq!(session.text(stale, dest, 0xFFFF_FFFF, 0, 0, b"A"), 0);
        assert_eq!(session.string_width(stale, b"A"), 0);
        assert_eq!(session.font_height(stale), 0);
    }
}
