//! cosmic-text backed rasterizer.
//!
//! Each [`CosmicFace`] owns a private `FontSystem` holding only the faces
//! of one font file, so lookups never fall back to unrelated system fonts:
//! a codepoint the file lacks reports glyph index 0, like any other
//! missing glyph. Rasterization goes through swash and the coverage mask
//! is thresholded to one bit per pixel.

use std::path::Path;

use cosmic_text::fontdb::{self, Database};
use cosmic_text::{CacheKey, CacheKeyFlags, FontSystem, SwashCache, SwashContent};
use log::info;

use crate::font::FontError;
use crate::raster::{FontStyle, GlyphBitmap, GlyphRasterizer, RasterizedGlyph};

/// Coverage at or above this value sets a pixel.
const COVERAGE_THRESHOLD: u8 = 128;

pub struct CosmicFace {
    font_system: FontSystem,
    swash_cache: SwashCache,
    face_id: fontdb::ID,
    height: u32,
    fake_bold: bool,
    fake_italic: bool,
}

impl CosmicFace {
    /// Load `path` at `height` pixels per em.
    ///
    /// For collections, the face closest to the requested weight and slant
    /// is chosen. Bold and italic are synthesized when the picked face
    /// lacks them.
    pub fn load(path: &Path, height: u32, style: FontStyle) -> Result<Self, FontError> {
        if height == 0 {
            return Err(FontError::InvalidHeight(height));
        }
        let data = std::fs::read(path)?;
        let mut db = Database::new();
        db.load_font_data(data);

        let want_weight = if style.is_bold() { 700 } else { 400 };
        let face = db
            .faces()
            .min_by_key(|face| {
                let italic = face.style != fontdb::Style::Normal;
                let slant_miss = u32::from(italic != style.is_italic()) * 1000;
                slant_miss + u32::from(face.weight.0.abs_diff(want_weight))
            })
            .ok_or_else(|| FontError::NoFace(path.display().to_string()))?;

        let face_id = face.id;
        let fake_bold = style.is_bold() && face.weight.0 < 600;
        let fake_italic = style.is_italic() && face.style == fontdb::Style::Normal;
        info!(
            "Loaded face {:?} from {} at {height}px",
            face.families.first().map(|(name, _)| name.as_str()).unwrap_or("?"),
            path.display()
        );

        Ok(Self {
            font_system: FontSystem::new_with_locale_and_db("en-US".into(), db),
            swash_cache: SwashCache::new(),
            face_id,
            height,
            fake_bold,
            fake_italic,
        })
    }

    /// Glyph index and 26.6 advance for `codepoint`.
    fn lookup(&mut self, codepoint: u32) -> Option<(u16, i64)> {
        let font = self.font_system.get_font(self.face_id)?;
        let face = font.rustybuzz();
        let glyph = char::from_u32(codepoint)
            .and_then(|c| face.glyph_index(c))
            .map_or(0, |id| id.0);
        let units = face
            .glyph_hor_advance(cosmic_text::rustybuzz::ttf_parser::GlyphId(glyph))
            .unwrap_or(0);
        let upem = face.units_per_em().max(1) as f32;
        let advance = (f32::from(units) * self.height as f32 / upem * 64.0).round() as i64;
        Some((glyph, advance))
    }
}

impl GlyphRasterizer for CosmicFace {
    fn pixel_height(&self) -> u32 {
        self.height
    }

    fn rasterize(&mut self, codepoint: u32) -> RasterizedGlyph {
        let Some((glyph, advance)) = self.lookup(codepoint) else {
            return RasterizedGlyph::missing(0);
        };
        if glyph == 0 {
            return RasterizedGlyph::missing(advance);
        }

        let flags = if self.fake_italic {
            CacheKeyFlags::FAKE_ITALIC
        } else {
            CacheKeyFlags::empty()
        };
        let (key, _, _) = CacheKey::new(self.face_id, glyph, self.height as f32, (0.0, 0.0), flags);

        let mut result = RasterizedGlyph {
            glyph_index: u32::from(glyph),
            bitmap: GlyphBitmap::empty(),
            bitmap_left: 0,
            bitmap_top: 0,
            advance_26_6: advance,
        };
        let Some(image) = self
            .swash_cache
            .get_image_uncached(&mut self.font_system, key)
        else {
            return result;
        };

        let (w, h) = (image.placement.width, image.placement.height);
        let coverage: Vec<u8> = match image.content {
            SwashContent::Mask => image.data,
            // Colour glyphs: use the alpha channel.
            SwashContent::Color => image.data.chunks_exact(4).map(|px| px[3]).collect(),
            SwashContent::SubpixelMask => image
                .data
                .chunks_exact(4)
                .map(|px| px[0].max(px[1]).max(px[2]))
                .collect(),
        };
        let mut bitmap = GlyphBitmap::from_coverage(w, h, &coverage, COVERAGE_THRESHOLD);
        if self.fake_bold {
            bitmap = bitmap.embolden();
        }
        result.bitmap = bitmap;
        result.bitmap_left = image.placement.left;
        result.bitmap_top = image.placement.top;
        result
    }
}

// ===================================================================
// Tests
// ===================================================================
