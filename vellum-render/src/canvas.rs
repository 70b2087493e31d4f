//! Canvases — CPU-side pixel surfaces mirrored into backend allocations.
//!
//! A canvas keeps its pixels as packed `0xAARRGGBB` words. Drawing happens
//! on the CPU copy and marks the canvas dirty; [`Canvas::upload`] pushes
//! the words and the colour key to the backend allocation.
//!
//! ```text
//!   draw ops ──► pixels (Vec<u32>) ──upload──► backend surface
//!                   │                              ▲
//!                backup() ──► snapshot ──restore()─┘  (after device loss)
//! ```

use std::path::Path;

use log::debug;
use serde::{Deserialize, Serialize};

use crate::backend::{Allocation, Backend, BackendError, ResourceId};
use crate::format::{PixelFormat, TextureUsage, Tier};

/// Mask out the alpha byte; colour keys compare RGB only.
pub const RGB_MASK: u32 = 0x00FF_FFFF;

/// Largest width or height a canvas may have.
pub const MAX_CANVAS_SIDE: u32 = 16384;

/// What a canvas is allocated for, which decides its pixel format.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum CanvasUsage {
    /// Offscreen surface in the framebuffer format.
    Surface,
    /// Texture in the negotiated format for `usage` at `tier`.
    Texture { usage: TextureUsage, tier: Tier },
}

/// Integer rectangle in canvas space.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct Rect {
    pub x: i32,
    pub y: i32,
    pub width: i32,
    pub height: i32,
}

impl Rect {
    pub const fn new(x: i32, y: i32, width: i32, height: i32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    pub fn right(&self) -> i32 {
        self.x + self.width
    }

    pub fn bottom(&self) -> i32 {
        self.y + self.height
    }

    pub fn is_empty(&self) -> bool {
        self.width <= 0 || self.height <= 0
    }

    pub fn intersects(&self, other: &Rect) -> bool {
        !self.is_empty()
            && !other.is_empty()
            && self.x < other.right()
            && other.x < self.right()
            && self.y < other.bottom()
            && other.y < self.bottom()
    }
}

/// How source pixels combine with the destination.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BlitMode {
    /// Copy every pixel.
    Solid,
    /// Skip pixels matching the source colour key.
    Masked,
    /// Skip keyed pixels and modulate the rest by a colour.
    Tinted(u32),
}

/// Z-buffer attached to a canvas by the scene.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ZBuffer {
    pub bits: u32,
    resource: ResourceId,
}

/// A drawable surface.
#[derive(Debug)]
pub struct Canvas {
    width: u32,
    height: u32,
    format: PixelFormat,
    usage: CanvasUsage,
    primary: bool,
    pixels: Vec<u32>,
    mask: Option<u32>,
    color: u32,
    clear_color: u32,
    backup: Option<Vec<u32>>,
    surface: ResourceId,
    zbuffer: Option<ZBuffer>,
    texture_bound: bool,
    dirty: bool,
}

impl Canvas {
    /// Allocate the backend surface and an all-black pixel buffer.
    pub(crate) fn allocate(
        backend: &mut dyn Backend,
        width: u32,
        height: u32,
        format: PixelFormat,
        usage: CanvasUsage,
        primary: bool,
    ) -> Result<Self, BackendError> {
        let request = Allocation::Surface {
            width,
            height,
            format,
            primary,
        };
        let requested = request.byte_size().unwrap_or(usize::MAX);
        if width > MAX_CANVAS_SIDE || height > MAX_CANVAS_SIDE {
            return Err(BackendError::OutOfMemory { requested });
        }
        let len = width as usize * height as usize;
        let mut pixels = Vec::new();
        pixels
            .try_reserve_exact(len)
            .map_err(|_| BackendError::OutOfMemory { requested })?;
        pixels.resize(len, 0);

        let surface = backend.allocate(&request)?;
        Ok(Self {
            width,
            height,
            format,
            usage,
            primary,
            pixels,
            mask: None,
            color: 0xFFFF_FFFF,
            clear_color: 0,
            backup: None,
            surface,
            zbuffer: None,
            texture_bound: false,
            dirty: true,
        })
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn format(&self) -> PixelFormat {
        self.format
    }

    pub fn usage(&self) -> CanvasUsage {
        self.usage
    }

    pub fn surface(&self) -> ResourceId {
        self.surface
    }

    pub fn bounds(&self) -> Rect {
        Rect::new(0, 0, self.width as i32, self.height as i32)
    }

    pub fn pixels(&self) -> &[u32] {
        &self.pixels
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    // ── Colours and keys ────────────────────────────────────────────

    /// Colour-key mask (RGB), if any.
    pub fn mask(&self) -> Option<u32> {
        self.mask
    }

    /// Set or clear the colour key. Pixels whose RGB equals the key are
    /// skipped by masked blits.
    pub fn set_mask(&mut self, rgb: Option<u32>) {
        self.mask = rgb.map(|key| key & RGB_MASK);
        self.dirty = true;
    }

    pub fn color(&self) -> u32 {
        self.color
    }

    /// Colour used by `plot` and `rect`.
    pub fn set_color(&mut self, argb: u32) {
        self.color = argb;
    }

    pub fn set_clear_color(&mut self, argb: u32) {
        self.clear_color = argb;
    }

    // ── Drawing ─────────────────────────────────────────────────────

    /// Fill the whole canvas with the clear colour.
    pub fn cls(&mut self) {
        let clear = self.clear_color;
        self.pixels.fill(clear);
        self.dirty = true;
    }

    /// Pixel at `(x, y)`; `0` outside the canvas.
    pub fn pixel(&self, x: i32, y: i32) -> u32 {
        self.index(x, y).map_or(0, |i| self.pixels[i])
    }

    pub fn set_pixel(&mut self, x: i32, y: i32, argb: u32) {
        if let Some(i) = self.index(x, y) {
            self.pixels[i] = argb;
            self.dirty = true;
        }
    }

    /// Set one pixel to the draw colour.
    pub fn plot(&mut self, x: i32, y: i32) {
        self.set_pixel(x, y, self.color);
    }

    /// Draw a rectangle in the draw colour, filled or as a 1px outline.
    pub fn rect(&mut self, rect: Rect, solid: bool) {
        let color = self.color;
        if solid || rect.width <= 2 || rect.height <= 2 {
            self.fill_rect(rect, color);
            return;
        }
        self.fill_rect(Rect::new(rect.x, rect.y, rect.width, 1), color);
        self.fill_rect(Rect::new(rect.x, rect.bottom() - 1, rect.width, 1), color);
        self.fill_rect(Rect::new(rect.x, rect.y + 1, 1, rect.height - 2), color);
        self.fill_rect(
            Rect::new(rect.right() - 1, rect.y + 1, 1, rect.height - 2),
            color,
        );
    }

    /// Fill `rect` (clipped) with `argb`.
    pub fn fill_rect(&mut self, rect: Rect, argb: u32) {
        let x0 = rect.x.max(0);
        let y0 = rect.y.max(0);
        let x1 = rect.right().min(self.width as i32);
        let y1 = rect.bottom().min(self.height as i32);
        if x0 >= x1 || y0 >= y1 {
            return;
        }
        let stride = self.width as usize;
        for y in y0 as usize..y1 as usize {
            self.pixels[y * stride + x0 as usize..y * stride + x1 as usize].fill(argb);
        }
        self.dirty = true;
    }

    /// Replace every pixel. Returns `false` if `pixels` has the wrong length.
    pub fn write_pixels(&mut self, pixels: &[u32]) -> bool {
        if pixels.len() != self.pixels.len() {
            return false;
        }
        self.pixels.copy_from_slice(pixels);
        self.dirty = true;
        true
    }

    /// Copy `src_rect` of `src` to `(dx, dy)`, clipped against both canvases.
    pub fn blit(&mut self, dx: i32, dy: i32, src: &Canvas, src_rect: Rect, mode: BlitMode) {
        let view = SourceView {
            pixels: &src.pixels,
            width: src.width,
            height: src.height,
            mask: src.mask,
        };
        self.blit_view(dx, dy, &view, src_rect, mode);
    }

    /// Blit from a region of this same canvas.
    pub fn blit_within(&mut self, dx: i32, dy: i32, src_rect: Rect, mode: BlitMode) {
        let snapshot = self.pixels.clone();
        let view = SourceView {
            pixels: &snapshot,
            width: self.width,
            height: self.height,
            mask: self.mask,
        };
        self.blit_view(dx, dy, &view, src_rect, mode);
    }

    fn blit_view(&mut self, dx: i32, dy: i32, src: &SourceView<'_>, src_rect: Rect, mode: BlitMode) {
        let Some(clip) = clip_blit(
            (self.width as i32, self.height as i32),
            (src.width as i32, src.height as i32),
            (dx, dy),
            src_rect,
        ) else {
            return;
        };
        let key = match mode {
            BlitMode::Solid => None,
            BlitMode::Masked | BlitMode::Tinted(_) => src.mask,
        };
        let dst_stride = self.width as usize;
        let src_stride = src.width as usize;
        for row in 0..clip.height as usize {
            let s = (clip.src_y as usize + row) * src_stride + clip.src_x as usize;
            let d = (clip.dst_y as usize + row) * dst_stride + clip.dst_x as usize;
            let src_row = &src.pixels[s..s + clip.width as usize];
            let dst_row = &mut self.pixels[d..d + clip.width as usize];
            for (out, &pixel) in dst_row.iter_mut().zip(src_row) {
                if key.is_some_and(|k| pixel & RGB_MASK == k) {
                    continue;
                }
                *out = match mode {
                    BlitMode::Tinted(tint) => modulate(pixel, tint),
                    _ => pixel,
                };
            }
        }
        self.dirty = true;
    }

    // ── Device loss ─────────────────────────────────────────────────

    /// Snapshot the current pixels so `restore` can bring them back.
    pub fn backup(&mut self) {
        self.backup = Some(self.pixels.clone());
    }

    pub fn has_backup(&self) -> bool {
        self.backup.is_some()
    }

    /// Push pixels and colour key to the backend allocation.
    pub fn upload(&mut self, backend: &mut dyn Backend) {
        backend.set_color_key(self.surface, self.mask);
        backend.upload(self.surface, bytemuck::cast_slice(&self.pixels));
        self.dirty = false;
    }

    /// Bring the canvas back after device loss.
    ///
    /// Re-allocates the surface if it is still lost, copies back the backup
    /// (or clears), re-applies the colour key and re-uploads.
    pub fn restore(&mut self, backend: &mut dyn Backend) -> Result<(), BackendError> {
        if backend.is_lost(self.surface) {
            let surface = backend.allocate(&Allocation::Surface {
                width: self.width,
                height: self.height,
                format: self.format,
                primary: self.primary,
            })?;
            backend.release(self.surface);
            self.surface = surface;
        }
        if let Some(zbuffer) = self.zbuffer {
            if backend.is_lost(zbuffer.resource) {
                let resource = backend.allocate(&Allocation::DepthBuffer {
                    width: self.width,
                    height: self.height,
                    bits: zbuffer.bits,
                })?;
                backend.release(zbuffer.resource);
                self.zbuffer = Some(ZBuffer {
                    bits: zbuffer.bits,
                    resource,
                });
            }
        }
        match &self.backup {
            Some(snapshot) => self.pixels.copy_from_slice(snapshot),
            None => self.pixels.fill(self.clear_color),
        }
        self.texture_bound = false;
        self.upload(backend);
        debug!(
            "restored {}x{} canvas ({})",
            self.width, self.height, self.format
        );
        Ok(())
    }

    // ── Texture binding ─────────────────────────────────────────────

    pub fn is_texture_bound(&self) -> bool {
        self.texture_bound
    }

    /// Mark the canvas as bound to a texture stage.
    pub fn bind_texture(&mut self) {
        self.texture_bound = true;
    }

    pub(crate) fn evict_texture(&mut self) {
        self.texture_bound = false;
    }

    // ── Z-buffer ────────────────────────────────────────────────────

    pub fn zbuffer(&self) -> Option<ZBuffer> {
        self.zbuffer
    }

    pub(crate) fn attach_zbuffer(
        &mut self,
        backend: &mut dyn Backend,
        bits: u32,
    ) -> Result<(), BackendError> {
        let resource = backend.allocate(&Allocation::DepthBuffer {
            width: self.width,
            height: self.height,
            bits,
        })?;
        if let Some(old) = self.zbuffer.replace(ZBuffer { bits, resource }) {
            backend.release(old.resource);
        }
        Ok(())
    }

    pub(crate) fn detach_zbuffer(&mut self, backend: &mut dyn Backend) {
        if let Some(zbuffer) = self.zbuffer.take() {
            backend.release(zbuffer.resource);
        }
    }

    /// Release every backend allocation owned by the canvas.
    pub(crate) fn release(mut self, backend: &mut dyn Backend) {
        self.detach_zbuffer(backend);
        backend.release(self.surface);
    }

    fn index(&self, x: i32, y: i32) -> Option<usize> {
        if x < 0 || y < 0 || x as u32 >= self.width || y as u32 >= self.height {
            return None;
        }
        Some(y as usize * self.width as usize + x as usize)
    }
}

struct SourceView<'a> {
    pixels: &'a [u32],
    width: u32,
    height: u32,
    mask: Option<u32>,
}

#[derive(Debug, PartialEq, Eq)]
struct Clip {
    dst_x: i32,
    dst_y: i32,
    src_x: i32,
    src_y: i32,
    width: i32,
    height: i32,
}

/// Clip a blit against both the source and destination bounds.
fn clip_blit(dst: (i32, i32), src: (i32, i32), at: (i32, i32), rect: Rect) -> Option<Clip> {
    let (mut dx, mut dy) = at;
    let Rect {
        x: mut sx,
        y: mut sy,
        width: mut w,
        height: mut h,
    } = rect;
    if sx < 0 {
        dx -= sx;
        w += sx;
        sx = 0;
    }
    if sy < 0 {
        dy -= sy;
        h += sy;
        sy = 0;
    }
    if dx < 0 {
        sx -= dx;
        w += dx;
        dx = 0;
    }
    if dy < 0 {
        sy -= dy;
        h += dy;
        dy = 0;
    }
    w = w.min(src.0 - sx).min(dst.0 - dx);
    h = h.min(src.1 - sy).min(dst.1 - dy);
    if w <= 0 || h <= 0 {
        return None;
    }
    Some(Clip {
        dst_x: dx,
        dst_y: dy,
        src_x: sx,
        src_y: sy,
        width: w,
        height: h,
    })
}

/// Multiply each colour channel of `pixel` by `tint` (both `0xAARRGGBB`).
pub fn modulate(pixel: u32, tint: u32) -> u32 {
    let channel = |shift: u32| {
        let a = (pixel >> shift) & 0xFF;
        let b = (tint >> shift) & 0xFF;
        ((a * b + 127) / 255) << shift
    };
    0xFF00_0000 | channel(16) | channel(8) | channel(0)
}

/// Decode an image file into `(width, height, 0xAARRGGBB pixels)`.
pub fn decode_image(path: &Path) -> Result<(u32, u32, Vec<u32>), image::ImageError> {
    let rgba = image::open(path)?.to_rgba8();
    let (width, height) = rgba.dimensions();
    let pixels = rgba
        .pixels()
        .map(|p| {
            let [r, g, b, a] = p.0;
            (u32::from(a) << 24) | (u32::from(r) << 16) | (u32::from(g) << 8) | u32::from(b)
        })
        .collect();
    Ok((width, height, pixels))
}

// ===================================================================
// Tests
// ===================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::SoftwareBackend;

    fn canvas(backend: &mut SoftwareBackend, w: u32, h: u32) -> Canvas {
        Canvas::allocate(backend, w, h, PixelFormat::XRGB8888, CanvasUsage::Surface, false)
            .unwrap()
    }

    #[test]
    fn test_plot_and_pixel() {
        let mut backend = SoftwareBackend::new(PixelFormat::XRGB8888);
        let mut c = canvas(&mut backend, 4, 4);
        c.set_color(0xFF12_3456);
        c.plot(1, 2);
        assert_eq!(c.pixel(1, 2), 0xFF12_3456);
        assert_eq!(c.pixel(-1, 0), 0);
        assert_eq!(c.pixel(4, 0), 0);
        c.plot(10, 10);
    }

    #[test]
    fn test_cls_uses_clear_color() {
        let mut backend = SoftwareBackend::new(PixelFormat::XRGB8888);
        let mut c = canvas(&mut backend, 3, 3);
        c.set_clear_color(0xFF00_00FF);
        c.cls();
        assert!(c.pixels().iter().all(|&p| p == 0xFF00_00FF));
    }

    #[test]
    fn test_rect_outline_leaves_interior() {
        let mut backend = SoftwareBackend::new(PixelFormat::XRGB8888);
        let mut c = canvas(&mut backend, 5, 5);
        c.set_color(0xFFFF_FFFF);
        c.rect(Rect::new(0, 0, 5, 5), false);
        assert_eq!(c.pixel(0, 0), 0xFFFF_FFFF);
        assert_eq!(c.pixel(4, 4), 0xFFFF_FFFF);
        assert_eq!(c.pixel(2, 2), 0);
        c.rect(Rect::new(1, 1, 3, 3), true);
        assert_eq!(c.pixel(2, 2), 0xFFFF_FFFF);
    }

    #[test]
    fn test_masked_blit_skips_key() {
        let mut backend = SoftwareBackend::new(PixelFormat::XRGB8888);
        let mut src = canvas(&mut backend, 2, 1);
        src.write_pixels(&[0xFF77_7777, 0xFFFF_FFFF]);
        src.set_mask(Some(0x777777));
        let mut dst = canvas(&mut backend, 2, 1);
        dst.write_pixels(&[0xFF00_0001, 0xFF00_0002]);

        dst.blit(0, 0, &src, src.bounds(), BlitMode::Masked);
        assert_eq!(dst.pixels(), &[0xFF00_0001, 0xFFFF_FFFF]);

        dst.blit(0, 0, &src, src.bounds(), BlitMode::Solid);
        assert_eq!(dst.pixels(), &[0xFF77_7777, 0xFFFF_FFFF]);
    }

    #[test]
    fn test_tinted_blit_modulates() {
        let mut backend = SoftwareBackend::new(PixelFormat::XRGB8888);
        let mut src = canvas(&mut backend, 1, 1);
        src.write_pixels(&[0xFFFF_FFFF]);
        let mut dst = canvas(&mut backend, 1, 1);
        dst.blit(0, 0, &src, src.bounds(), BlitMode::Tinted(0xFF80_4020));
        assert_eq!(dst.pixel(0, 0), 0xFF80_4020);
    }

    #[test]
    fn test_blit_clips_negative_and_overhanging() {
        let mut backend = SoftwareBackend::new(PixelFormat::XRGB8888);
        let mut src = canvas(&mut backend, 2, 2);
        src.write_pixels(&[1, 2, 3, 4]);
        let mut dst = canvas(&mut backend, 2, 2);
        dst.blit(-1, -1, &src, src.bounds(), BlitMode::Solid);
        assert_eq!(dst.pixels(), &[4, 0, 0, 0]);
        dst.blit(1, 1, &src, src.bounds(), BlitMode::Solid);
        assert_eq!(dst.pixels(), &[4, 0, 0, 1]);
        dst.blit(5, 5, &src, src.bounds(), BlitMode::Solid);
        assert_eq!(dst.pixels(), &[4, 0, 0, 1]);
    }

    #[test]
    fn test_blit_within_overlapping() {
        let mut backend = SoftwareBackend::new(PixelFormat::XRGB8888);
        let mut c = canvas(&mut backend, 3, 1);
        c.write_pixels(&[1, 2, 3]);
        c.blit_within(1, 0, Rect::new(0, 0, 2, 1), BlitMode::Solid);
        assert_eq!(c.pixels(), &[1, 1, 2]);
    }

    #[test]
    fn test_modulate_identity() {
        assert_eq!(modulate(0xFFAB_CDEF, 0xFFFF_FFFF), 0xFFAB_CDEF);
        assert_eq!(modulate(0xFFAB_CDEF, 0xFF00_0000), 0xFF00_0000);
    }

    #[test]
    fn test_write_pixels_rejects_wrong_len() {
        let mut backend = SoftwareBackend::new(PixelFormat::XRGB8888);
        let mut c = canvas(&mut backend, 2, 2);
        assert!(!c.write_pixels(&[0; 3]));
        assert!(c.write_pixels(&[7; 4]));
    }

    #[test]
    fn test_restore_after_loss_uses_backup() {
        let mut backend = SoftwareBackend::new(PixelFormat::XRGB8888);
        let mut c = canvas(&mut backend, 2, 1);
        c.write_pixels(&[5, 6]);
        c.set_mask(Some(0x777777));
        c.backup();
        c.write_pixels(&[0, 0]);
        c.bind_texture();

        backend.lose_device();
        backend.set_cooperative_level(crate::backend::CooperativeLevel::Ok);
        let old_surface = c.surface();
        c.restore(&mut backend).unwrap();

        assert_ne!(c.surface(), old_surface);
        assert_eq!(c.pixels(), &[5, 6]);
        assert!(!c.is_texture_bound());
        assert_eq!(backend.color_key(c.surface()), Some(0x777777));
        assert_eq!(backend.live_resources(), 1);
    }

    #[test]
    fn test_restore_without_backup_clears() {
        let mut backend = SoftwareBackend::new(PixelFormat::XRGB8888);
        let mut c = canvas(&mut backend, 2, 1);
        c.write_pixels(&[5, 6]);
        c.restore(&mut backend).unwrap();
        assert_eq!(c.pixels(), &[0, 0]);
    }

    #[test]
    fn test_decode_image_png() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("dot.png");
        let mut img = image::RgbaImage::new(2, 1);
        img.put_pixel(0, 0, image::Rgba([255, 0, 0, 255]));
        img.put_pixel(1, 0, image::Rgba([0, 0, 255, 128]));
        img.save(&path).unwrap();

        let (w, h, pixels) = decode_image(&path).unwrap();
        assert_eq!((w, h), (2, 1));
        assert_eq!(pixels, vec![0xFFFF_0000, 0x8000_00FF]);
    }

    #[test]
    fn test_rect_intersects() {
        let a = Rect::new(0, 0, 4, 4);
        assert!(a.intersects(&Rect::new(3, 3, 2, 2)));
        assert!(!a.intersects(&Rect::new(4, 0, 2, 2)));
        assert!(!a.intersects(&Rect::new(1, 1, 0, 5)));
    }
}
