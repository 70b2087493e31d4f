//! Fonts: a rasterizer plus the glyph cache built on atlas pages.
//!
//! Glyphs are cached in windows: a miss on codepoint `c` rasterizes every
//! uncached codepoint in `[max(c - window/2, 0), +window)` and packs the
//! visible ones into fresh atlas pages.
//!
//! ```text
//! miss(c) ─► for cp in window:
//!              rasterize(cp) ──► glyph index 0 / empty ─► record(no visual)
//!                          └───► page.allocate(w, h)
//!                                   ├─ Some(rect) ─► blit, pending record
//!                                   └─ None ──────► finish page, retry on a new one
//!            finish last page ─► canvas + colour key + backup ─► insert pending records
//! ```
//!
//! Records are only inserted once their page exists as a canvas, so a
//! failed page allocation leaves no record pointing at a missing atlas.

use std::collections::HashMap;
use std::path::Path;

use log::{debug, warn};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use vellum_render::{CanvasHandle, CanvasUsage, GraphicsDevice, Rect};

use crate::atlas::{AtlasPage, TRANSPARENT_PIXEL};
use crate::cosmic::CosmicFace;
use crate::fonts;
use crate::raster::{FontStyle, GlyphRasterizer};
use crate::utf8;

/// Baseline of a rasterized glyph as a fraction of the pixel height.
/// Integer arithmetic, kept exactly.
const ATLAS_BASELINE: (i32, i32) = (10, 14);

#[derive(Error, Debug)]
pub enum FontError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("No usable face in {0}")]
    NoFace(String),
    #[error("Font not found: {0}")]
    NotFound(String),
    #[error("Invalid font height {0}")]
    InvalidHeight(u32),
}

/// Atlas packing parameters.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AtlasConfig {
    /// Side of each square atlas page in pixels.
    pub page_size: u32,
    /// Codepoints rasterized per cache miss.
    pub window: u32,
    /// Upper bound on atlas pages per font.
    pub max_pages: u32,
    /// Rasterize the window around codepoint 0 when the font is created.
    pub prewarm: bool,
}

impl Default for AtlasConfig {
    fn default() -> Self {
        Self {
            page_size: 1024,
            window: 2048,
            max_pages: 64,
            prewarm: true,
        }
    }
}

/// Cached placement and metrics of one codepoint.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct GlyphRecord {
    /// Atlas page index; `None` when the codepoint has no visual glyph.
    pub atlas: Option<u32>,
    /// Subtracted from the pen position when drawing.
    pub draw_offset: (i32, i32),
    /// Horizontal advance in pixels.
    pub advance: i32,
    /// Rectangle on the atlas page.
    pub src: Rect,
}

impl GlyphRecord {
    fn invisible(advance: i32) -> Self {
        Self {
            atlas: None,
            draw_offset: (0, 0),
            advance,
            src: Rect::default(),
        }
    }

    pub fn is_visible(&self) -> bool {
        self.atlas.is_some()
    }
}

pub struct Font {
    rasterizer: Box<dyn GlyphRasterizer>,
    height: u32,
    style: FontStyle,
    config: AtlasConfig,
    atlases: Vec<CanvasHandle>,
    glyphs: HashMap<u32, GlyphRecord>,
    max_width: i32,
    pub(crate) scratch: Option<CanvasHandle>,
}

impl Font {
    /// Wrap a rasterizer. With `prewarm`, the first window is cached now.
    pub fn new(
        device: &mut GraphicsDevice,
        rasterizer: Box<dyn GlyphRasterizer>,
        style: FontStyle,
        config: AtlasConfig,
    ) -> Self {
        let mut font = Self {
            height: rasterizer.pixel_height(),
            rasterizer,
            style,
            config,
            atlases: Vec::new(),
            glyphs: HashMap::new(),
            max_width: 0,
            scratch: None,
        };
        if font.config.prewarm {
            font.populate(device, 0);
        }
        font
    }

    /// Load a font by file name or family name.
    pub fn load(
        device: &mut GraphicsDevice,
        name: &str,
        height: u32,
        style: FontStyle,
        config: AtlasConfig,
    ) -> Result<Self, FontError> {
        let path = fonts::resolve(name, style).ok_or_else(|| FontError::NotFound(name.to_string()))?;
        let face = CosmicFace::load(Path::new(&path), height, style)?;
        Ok(Self::new(device, Box::new(face), style, config))
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn style(&self) -> FontStyle {
        self.style
    }

    /// Width of the widest glyph placed so far.
    pub fn width(&self) -> i32 {
        self.max_width
    }

    /// Atlas pages, in creation order.
    pub fn atlases(&self) -> &[CanvasHandle] {
        &self.atlases
    }

    pub fn glyph_count(&self) -> usize {
        self.glyphs.len()
    }

    /// Cached record, without populating on a miss.
    pub fn cached(&self, codepoint: u32) -> Option<&GlyphRecord> {
        self.glyphs.get(&codepoint)
    }

    /// Whether `codepoint` is already cached.
    pub fn is_printable(&self, codepoint: u32) -> bool {
        self.glyphs.contains_key(&codepoint)
    }

    /// Record for `codepoint`, populating its window on a miss.
    pub fn glyph(&mut self, device: &mut GraphicsDevice, codepoint: u32) -> Option<GlyphRecord> {
        if let Some(record) = self.glyphs.get(&codepoint) {
            return Some(*record);
        }
        self.populate(device, codepoint);
        self.glyphs.get(&codepoint).copied()
    }

    /// Placed width of a glyph; `0` for glyphs without a visual.
    pub fn char_width(&mut self, device: &mut GraphicsDevice, codepoint: u32) -> i32 {
        self.glyph(device, codepoint).map_or(0, |g| g.src.width)
    }

    pub fn char_advance(&mut self, device: &mut GraphicsDevice, codepoint: u32) -> i32 {
        self.glyph(device, codepoint).map_or(0, |g| g.advance)
    }

    /// Sum of advances over UTF-8 `text`.
    pub fn string_width(&mut self, device: &mut GraphicsDevice, text: &[u8]) -> i32 {
        utf8::decode(text)
            .map(|(codepoint, _)| self.char_advance(device, codepoint))
            .sum()
    }

    /// Free every canvas the font owns.
    pub fn free(self, device: &mut GraphicsDevice) {
        for atlas in self.atlases {
            device.free_canvas(atlas);
        }
        if let Some(scratch) = self.scratch {
            device.free_canvas(scratch);
        }
    }

    // ── Population ──────────────────────────────────────────────────

    fn populate(&mut self, device: &mut GraphicsDevice, codepoint: u32) {
        let size = self.config.page_size;
        let start = codepoint.saturating_sub(self.config.window / 2);
        let end = start.saturating_add(self.config.window);
        let baseline = (self.height as i32 * ATLAS_BASELINE.0) / ATLAS_BASELINE.1;

        let mut page: Option<AtlasPage> = None;
        let mut pending: Vec<(u32, GlyphRecord)> = Vec::new();

        'window: for c in start..end {
            if self.glyphs.contains_key(&c) {
                continue;
            }
            let glyph = self.rasterizer.rasterize(c);
            let advance = glyph.advance();
            if glyph.glyph_index == 0 || glyph.bitmap.is_empty() {
                self.glyphs.insert(c, GlyphRecord::invisible(advance));
                continue;
            }

            let (w, h) = (glyph.bitmap.width(), glyph.bitmap.height());
            if !AtlasPage::can_ever_fit(size, w, h) {
                warn!("Glyph U+{c:04X} ({w}x{h}) does not fit a {size}px atlas page");
                self.glyphs.insert(c, GlyphRecord::invisible(advance));
                continue;
            }

            // Explicit overflow loop: at most one retry on a fresh page.
            let rect = loop {
                if page.is_none() {
                    if self.atlases.len() as u32 >= self.config.max_pages {
                        warn!("Atlas page limit ({}) reached", self.config.max_pages);
                        break 'window;
                    }
                    page = Some(AtlasPage::new(size));
                }
                let Some(current) = page.as_mut() else {
                    break 'window;
                };
                if let Some(rect) = current.allocate(w, h) {
                    current.blit(rect, &glyph.bitmap);
                    break rect;
                }
                if let Some(full) = page.take() {
                    if !self.finish_page(device, &full, &mut pending) {
                        break 'window;
                    }
                }
            };

            pending.push((
                c,
                GlyphRecord {
                    atlas: None,
                    draw_offset: (-glyph.bitmap_left, glyph.bitmap_top - baseline),
                    advance,
                    src: rect,
                },
            ));
        }

        if let Some(last) = page.take() {
            if !last.is_empty() {
                self.finish_page(device, &last, &mut pending);
            }
        }
    }

    /// Turn a page into a canvas and commit its pending records.
    fn finish_page(
        &mut self,
        device: &mut GraphicsDevice,
        page: &AtlasPage,
        pending: &mut Vec<(u32, GlyphRecord)>,
    ) -> bool {
        let size = page.size();
        let Some(handle) = device.create_canvas(size, size, CanvasUsage::Surface) else {
            warn!("Failed to allocate atlas page; dropping {} glyphs", pending.len());
            pending.clear();
            return false;
        };
        if let Some(canvas) = device.canvas_mut(handle) {
            canvas.write_pixels(&page.to_pixels());
            canvas.set_mask(Some(TRANSPARENT_PIXEL));
            canvas.backup();
        }

        let index = self.atlases.len() as u32;
        self.atlases.push(handle);
        for (codepoint, mut record) in pending.drain(..) {
            record.atlas = Some(index);
            self.max_width = self.max_width.max(record.src.width);
            self.glyphs.insert(codepoint, record);
        }
        debug!("Atlas page {index} finished with {} glyphs", page.placed().len());
        true
    }
}

// ===================================================================
// Tests
// ===================================================================
