//! Atlas page — CPU-side shelf packer for 1-bit glyph bitmaps.
//!
//! Glyphs are placed left to right on shelves (rows) whose height is the
//! tallest glyph placed on them. A 1px border surrounds the page and 1px
//! of padding separates neighbours.
//!
//! ```text
//!  (0,0) ┌──────────────────────────── size ┐
//!        │ ┌──┐ ┌────┐ ┌─┐                  │  ← shelf 0, y = 1
//!        │ └──┘ └────┘ └─┘                  │
//!        │ ┌───────┐ ┌──┐                   │  ← shelf 1, y = 1 + h0 + 1
//!        │ └───────┘ └──┘                   │
//!        └──────────────────────────────────┘
//! ```
//!
//! A finished page becomes an ordinary canvas: set pixels are
//! [`OPAQUE_PIXEL`], everything else [`TRANSPARENT_PIXEL`], which is also
//! the colour key.

use vellum_render::Rect;

use crate::raster::GlyphBitmap;

/// Colour of uncovered atlas pixels; doubles as the colour key.
pub const TRANSPARENT_PIXEL: u32 = 0x77_7777;

/// Colour of covered atlas pixels.
pub const OPAQUE_PIXEL: u32 = 0xFF_FFFF;

/// One square page being filled.
pub struct AtlasPage {
    size: u32,
    coverage: Vec<bool>,
    x: u32,
    y: u32,
    row_height: u32,
    placed: Vec<Rect>,
}

impl AtlasPage {
    pub fn new(size: u32) -> Self {
        Self {
            size,
            coverage: vec![false; size as usize * size as usize],
            x: 1,
            y: 1,
            row_height: 0,
            placed: Vec::new(),
        }
    }

    /// Whether a `width × height` glyph fits on an empty page of `size`.
    pub fn can_ever_fit(size: u32, width: u32, height: u32) -> bool {
        width + 3 <= size && height + 3 <= size
    }

    pub fn size(&self) -> u32 {
        self.size
    }

    pub fn is_empty(&self) -> bool {
        self.placed.is_empty()
    }

    /// Rectangles placed so far, in placement order.
    pub fn placed(&self) -> &[Rect] {
        &self.placed
    }

    /// Rows still free below the current shelf's top edge.
    pub fn remaining_height(&self) -> u32 {
        self.size.saturating_sub(self.y + 2)
    }

    /// Reserve a `width × height` rectangle.
    ///
    /// Returns `None` when the page is full; the caller then finishes this
    /// page and places the glyph on a fresh one.
    pub fn allocate(&mut self, width: u32, height: u32) -> Option<Rect> {
        if self.x + width + 1 > self.size - 1 {
            self.x = 1;
            self.y += self.row_height + 1;
            self.row_height = 0;
        }
        if self.y + height + 1 > self.size - 1 {
            return None;
        }
        let rect = Rect::new(self.x as i32, self.y as i32, width as i32, height as i32);
        self.row_height = self.row_height.max(height);
        self.x += width + 1;
        self.placed.push(rect);
        Some(rect)
    }

    /// Copy a glyph bitmap into a rectangle returned by [`AtlasPage::allocate`].
    pub fn blit(&mut self, rect: Rect, bitmap: &GlyphBitmap) {
        let stride = self.size as usize;
        for row in 0..bitmap.height().min(rect.height as u32) {
            for col in 0..bitmap.width().min(rect.width as u32) {
                let i = (rect.y as usize + row as usize) * stride + rect.x as usize + col as usize;
                self.coverage[i] = bitmap.get(col, row);
            }
        }
    }

    /// Composite coverage into opaque `0xAARRGGBB` canvas pixels.
    pub fn to_pixels(&self) -> Vec<u32> {
        self.coverage
            .iter()
            .map(|&on| 0xFF00_0000 | if on { OPAQUE_PIXEL } else { TRANSPARENT_PIXEL })
            .collect()
    }
}

// ===================================================================
// Tests
// ===================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_glyph_at_border() {
        let mut page = AtlasPage::new(64);
        assert_eq!(page.allocate(10, 20), Some(Rect::new(1, 1, 10, 20)));
        assert_eq!(page.allocate(5, 5), Some(Rect::new(12, 1, 5, 5)));
    }

    #[test]
    fn test_wrap_to_new_shelf() {
        let mut page = AtlasPage::new(64);
        page.allocate(10, 20).unwrap();
        // 12 + 60 + 1 > 63 → new shelf at y = 1 + 20 + 1.
        assert_eq!(page.allocate(60, 10), Some(Rect::new(1, 22, 60, 10)));
    }

    #[test]
    fn test_exact_remaining_height_fits() {
        let mut page = AtlasPage::new(64);
        page.allocate(10, 20).unwrap();
        let mut taller = AtlasPage::new(64);
        taller.allocate(10, 20).unwrap();

        // Force the wrap, then check the boundary on both sides.
        assert_eq!(page.allocate(60, 40), Some(Rect::new(1, 22, 60, 40)));
        assert_eq!(taller.allocate(60, 41), None);
    }

    #[test]
    fn test_remaining_height() {
        let mut page = AtlasPage::new(64);
        assert_eq!(page.remaining_height(), 61);
        page.allocate(10, 20).unwrap();
        page.allocate(60, 1).unwrap();
        assert_eq!(page.remaining_height(), 40);
    }

    #[test]
    fn test_placements_never_overlap() {
        let mut page = AtlasPage::new(128);
        let mut i = 0u32;
        while page.allocate(3 + i % 17, 2 + (i * 7) % 23).is_some() {
            i += 1;
        }
        let placed = page.placed();
        assert!(placed.len() > 10);
        for (a, ra) in placed.iter().enumerate() {
            assert!(ra.x >= 1 && ra.y >= 1);
            assert!(ra.right() <= 127 && ra.bottom() <= 127);
            for rb in &placed[a + 1..] {
                assert!(!ra.intersects(rb), "{ra:?} overlaps {rb:?}");
            }
        }
    }

    #[test]
    fn test_can_ever_fit() {
        assert!(AtlasPage::can_ever_fit(64, 61, 61));
        assert!(!AtlasPage::can_ever_fit(64, 62, 1));
        assert!(!AtlasPage::can_ever_fit(64, 1, 62));
    }

    #[test]
    fn test_blit_and_pixels() {
        let mut page = AtlasPage::new(8);
        let rect = page.allocate(2, 1).unwrap();
        let bitmap = GlyphBitmap::from_coverage(2, 1, &[255, 0], 128);
        page.blit(rect, &bitmap);
        let pixels = page.to_pixels();
        assert_eq!(pixels[8 + 1], 0xFF00_0000 | OPAQUE_PIXEL);
        assert_eq!(pixels[8 + 2], 0xFF00_0000 | TRANSPARENT_PIXEL);
        assert_eq!(pixels[0], 0xFF00_0000 | TRANSPARENT_PIXEL);
    }
}
