//! Text compositor: draws a UTF-8 string through a font's atlas pages.
//!
//! Glyphs are first assembled on the font's scratch canvas (keyed with the
//! transparent sentinel), then the scratch is blitted once onto the
//! destination, tinted with the text colour.

use vellum_render::canvas::RGB_MASK;
use vellum_render::{BlitMode, CanvasHandle, CanvasUsage, GraphicsDevice, Rect};

use crate::atlas::TRANSPARENT_PIXEL;
use crate::font::Font;
use crate::utf8;

/// Scratch line height, in tenths of the font height.
const LINE_HEIGHT_TENTHS: u32 = 16;

/// Pen baseline below the top of the scratch line, in tenths of the font height.
const BASELINE_TENTHS: i32 = 4;

impl Font {
    /// Height of the scratch line, with room above and below the baseline.
    pub fn line_height(&self) -> u32 {
        self.height() * LINE_HEIGHT_TENTHS / 10
    }

    /// Draw `text` at `(x, y)` on `dest` in `color` (`0xAARRGGBB`).
    ///
    /// Returns the drawn width, `0` when nothing was drawn.
    pub fn render(
        &mut self,
        device: &mut GraphicsDevice,
        dest: CanvasHandle,
        color: u32,
        x: i32,
        y: i32,
        text: &[u8],
    ) -> i32 {
        if device.verify_canvas(dest).is_none() {
            return 0;
        }
        let width = self.string_width(device, text);
        if width <= 0 {
            return 0;
        }
        let line_height = self.line_height() as i32;
        let Some(scratch) = self.ensure_scratch(device, width as u32) else {
            return 0;
        };

        // The tint must never collide with the colour key.
        let color = if color & RGB_MASK == TRANSPARENT_PIXEL {
            color.wrapping_add(1)
        } else {
            color
        };
        let clear = 0xFF00_0000 | TRANSPARENT_PIXEL;
        if let Some(canvas) = device.canvas_mut(scratch) {
            canvas.fill_rect(Rect::new(0, 0, width, line_height), clear);
        }

        let baseline = self.height() as i32 * BASELINE_TENTHS / 10;
        let mut cursor = 0;
        for (codepoint, _) in utf8::decode(text) {
            let Some(glyph) = self.glyph(device, codepoint) else {
                continue;
            };
            if let Some(page) = glyph.atlas {
                let gx = cursor - glyph.draw_offset.0;
                let gy = baseline - glyph.draw_offset.1;
                if let Some(canvas) = device.canvas_mut(scratch) {
                    canvas.fill_rect(Rect::new(gx, gy, glyph.src.width, glyph.src.height), clear);
                }
                if let Some(&atlas) = self.atlases().get(page as usize) {
                    device.blit(scratch, gx, gy, atlas, glyph.src, BlitMode::Masked);
                }
            }
            cursor += glyph.advance;
        }

        device.blit(
            dest,
            x,
            y,
            scratch,
            Rect::new(0, 0, width, line_height),
            BlitMode::Tinted(color),
        );
        width
    }

    /// Scratch canvas at least `width` wide; it only ever grows.
    fn ensure_scratch(&mut self, device: &mut GraphicsDevice, width: u32) -> Option<CanvasHandle> {
        if let Some(scratch) = self.scratch.and_then(|h| device.verify_canvas(h)) {
            if device.canvas(scratch).is_some_and(|c| c.width() >= width) {
                return Some(scratch);
            }
            device.free_canvas(scratch);
        }
        self.scratch = None;
        let scratch = device.create_canvas(width, self.line_height(), CanvasUsage::Surface)?;
        if let Some(canvas) = device.canvas_mut(scratch) {
            canvas.set_mask(Some(TRANSPARENT_PIXEL));
        }
        self.scratch = Some(scratch);
        Some(scratch)
    }
}

// ===================================================================
// Tests
// ===================================================================

#[cfg(test)]
mod tests {
    use vellum_render::{GraphicsConfig, PixelFormat, SoftwareBackend};

    use crate::font::AtlasConfig;
    use crate::raster::testing::ScriptedRasterizer;
    use crate::raster::FontStyle;

    use super::*;

    fn device() -> GraphicsDevice {
        let config = GraphicsConfig {
            width: 64,
            height: 32,
            ..GraphicsConfig::default()
        };
        GraphicsDevice::open(Box::new(SoftwareBackend::new(PixelFormat::XRGB8888)), config).unwrap()
    }

    fn font(device: &mut GraphicsDevice) -> Font {
        let face = ScriptedRasterizer::new(10)
            .with_glyph('A', (3, 4), (0, 4), 4)
            .with_glyph('B', (2, 2), (1, 5), 3);
        let config = AtlasConfig {
            page_size: 64,
            window: 256,
            max_pages: 4,
            prewarm: false,
        };
        Font::new(device, Box::new(face), FontStyle::REGULAR, config)
    }

    fn lit(device: &GraphicsDevice, canvas: CanvasHandle) -> Vec<(i32, i32, u32)> {
        let c = device.canvas(canvas).unwrap();
        let mut out = Vec::new();
        for y in 0..c.height() as i32 {
            for x in 0..c.width() as i32 {
                if c.pixel(x, y) != 0 {
                    out.push((x, y, c.pixel(x, y)));
                }
            }
        }
        out
    }

    #[test]
    fn test_render_draws_glyph_box_in_color() {
        let mut device = device();
        let mut font = font(&mut device);
        let dest = device.create_canvas(32, 32, CanvasUsage::Surface).unwrap();

        assert_eq!(font.line_height(), 16);
        let width = font.render(&mut device, dest, 0xFF00_FF00, 0, 0, b"A");
        assert_eq!(width, 4);

        // baseline 10*4/10 = 4, offset y = 4 - 10*10/14 = -3, so the top is at 7.
        let pixels = lit(&device, dest);
        assert_eq!(pixels.len(), 12);
        assert!(pixels.iter().all(|&(_, _, p)| p == 0xFF00_FF00));
        assert!(pixels.contains(&(0, 7, 0xFF00_FF00)));
        assert!(pixels.contains(&(2, 10, 0xFF00_FF00)));
    }

    #[test]
    fn test_render_is_translation_invariant() {
        let mut device = device();
        let mut font = font(&mut device);
        let a = device.create_canvas(40, 30, CanvasUsage::Surface).unwrap();
        let b = device.create_canvas(40, 30, CanvasUsage::Surface).unwrap();

        font.render(&mut device, a, 0xFFFF_FFFF, 2, 3, b"AB A");
        font.render(&mut device, b, 0xFFFF_FFFF, 9, 11, b"AB A");

        let shifted: Vec<_> = lit(&device, a)
            .into_iter()
            .map(|(x, y, p)| (x + 7, y + 8, p))
            .collect();
        assert!(!shifted.is_empty());
        assert_eq!(shifted, lit(&device, b));
    }

    #[test]
    fn test_empty_and_zero_width_draw_nothing() {
        let mut device = device();
        let mut font = font(&mut device);
        let dest = device.create_canvas(16, 16, CanvasUsage::Surface).unwrap();
        let canvases = device.canvas_count();

        assert_eq!(font.render(&mut device, dest, 0xFFFF_FFFF, 0, 0, b""), 0);
        assert!(lit(&device, dest).is_empty());
        assert_eq!(device.canvas_count(), canvases);
    }

    #[test]
    fn test_tint_equal_to_key_is_bumped() {
        let mut device = device();
        let mut font = font(&mut device);
        let dest = device.create_canvas(16, 16, CanvasUsage::Surface).unwrap();
        font.render(&mut device, dest, 0xFF77_7777, 0, 0, b"A");
        assert!(lit(&device, dest).iter().all(|&(_, _, p)| p == 0xFF77_7778));
    }

    #[test]
    fn test_scratch_grows_only() {
        let mut device = device();
        let mut font = font(&mut device);
        let dest = device.create_canvas(32, 16, CanvasUsage::Surface).unwrap();

        font.render(&mut device, dest, 0xFFFF_FFFF, 0, 0, b"AAAA");
        let wide = font.scratch.unwrap();
        assert_eq!(device.canvas(wide).unwrap().width(), 16);

        font.render(&mut device, dest, 0xFFFF_FFFF, 0, 0, b"A");
        assert_eq!(font.scratch, Some(wide));

        font.render(&mut device, dest, 0xFFFF_FFFF, 0, 0, b"AAAAAA");
        let wider = font.scratch.unwrap();
        assert_ne!(wider, wide);
        assert!(device.verify_canvas(wide).is_none());
    }

    #[test]
    fn test_stale_destination_is_noop() {
        let mut device = device();
        let mut font = font(&mut device);
        let dest = device.create_canvas(8, 8, CanvasUsage::Surface).unwrap();
        device.free_canvas(dest);
        assert_eq!(font.render(&mut device, dest, 0xFFFF_FFFF, 0, 0, b"A"), 0);
    }

    #[test]
    fn test_first_render_fills_cache_second_reuses_it() {
        let mut device = device();
        let face = ScriptedRasterizer::new(14).with_glyph('A', (5, 7), (0, 7), 6);
        let calls = face.calls();
        let config = AtlasConfig {
            prewarm: false,
            ..AtlasConfig::default()
        };
        let mut font = Font::new(&mut device, Box::new(face), FontStyle::REGULAR, config);
        let dest = device.back_canvas();
        assert_eq!(calls.get(), 0);
        assert!(font.cached(0x41).is_none());

        assert_eq!(font.render(&mut device, dest, 0xFFFF_FFFF, 0, 0, "A".as_bytes()), 6);
        let after_first = calls.get();
        assert!(after_first > 0);
        let record = *font.cached(0x41).unwrap();
        assert!(record.is_visible());
        assert_eq!(record.atlas, Some(0));

        font.render(&mut device, dest, 0xFFFF_FFFF, 0, 0, "A".as_bytes());
        assert_eq!(calls.get(), after_first);
        assert_eq!(font.cached(0x41), Some(&record));
    }
}
