//! # vellum-text
//!
//! Bitmap font cache and text compositor.
//!
//! ## Architecture
//!
//! ```text
//!  font file / family name
//!       │  fonts::resolve (font-kit)
//!       ▼
//!  CosmicFace (cosmic-text + swash)  ◀─── GlyphRasterizer seam
//!       │  1-bit bitmaps + metrics
//!       ▼
//!  Font: AtlasPage shelf packer → atlas canvases + GlyphRecord map
//!       │
//!       ▼
//!  Font::render → scratch canvas → tinted blit onto the destination
//! ```
//!
//! ## Crate modules
//!
//! - [`utf8`] — lenient UTF-8 decoding
//! - [`raster`] — rasterizer trait, 1-bit bitmaps, style flags
//! - [`cosmic`] — cosmic-text rasterizer
//! - [`fonts`] — system font lookup
//! - [`atlas`] — atlas page packer
//! - [`font`] — glyph cache and font queries
//! - [`compositor`] — string rendering

pub mod atlas;
pub mod compositor;
pub mod cosmic;
pub mod font;
pub mod fonts;
pub mod raster;
pub mod utf8;

// Re-exports for convenience
pub use atlas::{AtlasPage, OPAQUE_PIXEL, TRANSPARENT_PIXEL};
pub use cosmic::CosmicFace;
pub use font::{AtlasConfig, Font, FontError, GlyphRecord};
pub use raster::{FontStyle, GlyphBitmap, GlyphRasterizer, RasterizedGlyph};
