//! Glyph rasterizer seam.
//!
//! A [`GlyphRasterizer`] turns one codepoint into a 1-bit coverage bitmap
//! plus FreeType-style metrics (bitmap bearings in pixels, advance in
//! 26.6 fixed point). The font cache only ever talks to this trait; the
//! cosmic-text implementation lives in [`crate::cosmic`].

use std::fmt;

use bitflags::bitflags;
use serde::{Deserialize, Serialize};

bitflags! {
    /// Style flags as passed by scripts.
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
    #[serde(transparent)]
    pub struct FontStyle: u32 {
        const BOLD = 1;
        const ITALIC = 1 << 1;
        /// Accepted but not drawn.
        const UNDERLINE = 1 << 2;
    }
}

impl FontStyle {
    pub const REGULAR: Self = Self::empty();

    pub fn is_bold(self) -> bool {
        self.contains(Self::BOLD)
    }

    pub fn is_italic(self) -> bool {
        self.contains(Self::ITALIC)
    }
}

/// 1 bit per pixel, rows padded to whole bytes, most significant bit first.
#[derive(Clone, PartialEq, Eq)]
pub struct GlyphBitmap {
    width: u32,
    height: u32,
    pitch: usize,
    data: Vec<u8>,
}

impl GlyphBitmap {
    /// All-clear bitmap.
    pub fn new(width: u32, height: u32) -> Self {
        let pitch = (width as usize).div_ceil(8);
        Self {
            width,
            height,
            pitch,
            data: vec![0; pitch * height as usize],
        }
    }

    pub fn empty() -> Self {
        Self::new(0, 0)
    }

    /// Threshold an 8-bit coverage buffer (`width * height` bytes, row-major).
    pub fn from_coverage(width: u32, height: u32, coverage: &[u8], threshold: u8) -> Self {
        let mut bitmap = Self::new(width, height);
        for y in 0..height {
            for x in 0..width {
                let i = y as usize * width as usize + x as usize;
                if coverage.get(i).is_some_and(|&c| c >= threshold) {
                    bitmap.set(x, y, true);
                }
            }
        }
        bitmap
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn pitch(&self) -> usize {
        self.pitch
    }

    /// Zero-area bitmaps carry no visual.
    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }

    pub fn get(&self, x: u32, y: u32) -> bool {
        if x >= self.width || y >= self.height {
            return false;
        }
        let byte = self.data[y as usize * self.pitch + (x / 8) as usize];
        byte & (0x80 >> (x % 8)) != 0
    }

    pub fn set(&mut self, x: u32, y: u32, on: bool) {
        if x >= self.width || y >= self.height {
            return;
        }
        let byte = &mut self.data[y as usize * self.pitch + (x / 8) as usize];
        let bit = 0x80 >> (x % 8);
        if on {
            *byte |= bit;
        } else {
            *byte &= !bit;
        }
    }

    /// Smear every set pixel one to the right, widening the bitmap by one.
    pub fn embolden(&self) -> Self {
        if self.is_empty() {
            return self.clone();
        }
        let mut out = Self::new(self.width + 1, self.height);
        for y in 0..self.height {
            for x in 0..self.width {
                if self.get(x, y) {
                    out.set(x, y, true);
                    out.set(x + 1, y, true);
                }
            }
        }
        out
    }
}

impl fmt::Debug for GlyphBitmap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "GlyphBitmap({}x{})", self.width, self.height)
    }
}

/// Output of one rasterization.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RasterizedGlyph {
    /// Index of the glyph in the face; `0` means the face lacks the codepoint.
    pub glyph_index: u32,
    pub bitmap: GlyphBitmap,
    /// Pixels from the pen position to the bitmap's left edge.
    pub bitmap_left: i32,
    /// Pixels from the baseline up to the bitmap's top edge.
    pub bitmap_top: i32,
    /// Horizontal advance in 26.6 fixed point.
    pub advance_26_6: i64,
}

impl RasterizedGlyph {
    /// A codepoint the face does not contain.
    pub fn missing(advance_26_6: i64) -> Self {
        Self {
            glyph_index: 0,
            bitmap: GlyphBitmap::empty(),
            bitmap_left: 0,
            bitmap_top: 0,
            advance_26_6,
        }
    }

    /// Advance in whole pixels, truncated toward zero.
    pub fn advance(&self) -> i32 {
        (self.advance_26_6 / 64) as i32
    }
}

/// One vector face at a fixed pixel height.
pub trait GlyphRasterizer {
    fn pixel_height(&self) -> u32;

    fn rasterize(&mut self, codepoint: u32) -> RasterizedGlyph;
}

// ===================================================================
// Test support
// ===================================================================


// ===================================================================
// Tests
// ===================================================================
