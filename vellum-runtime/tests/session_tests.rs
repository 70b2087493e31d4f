//! End-to-end checks through the session and the C ABI.

use std::ffi::CString;
use std::ptr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use vellum_render::{
    CanvasUsage, CooperativeLevel, DeviceState, RecoveryConfig, SoftwareBackend, StreamInfo,
};
use vellum_runtime::ffi;
use vellum_runtime::{RuntimeConfig, Session};
use vellum_text::{AtlasConfig, FontStyle, GlyphBitmap, GlyphRasterizer, RasterizedGlyph};

/// Uppercase ASCII as solid blocks; everything else is missing.
struct BlockFace {
    height: u32,
    calls: Arc<AtomicUsize>,
}

impl GlyphRasterizer for BlockFace {
    fn pixel_height(&self) -> u32 {
        self.height
    }

    fn rasterize(&mut self, codepoint: u32) -> RasterizedGlyph {
        self.calls.fetch_add(1, Ordering::Relaxed);
        if !(u32::from('A')..=u32::from('Z')).contains(&codepoint) {
            return RasterizedGlyph::missing(3 * 64);
        }
        let (w, h) = (4, 6);
        let mut bitmap = GlyphBitmap::new(w, h);
        for y in 0..h {
            for x in 0..w {
                bitmap.set(x, y, true);
            }
        }
        RasterizedGlyph {
            glyph_index: codepoint,
            bitmap,
            bitmap_left: 0,
            bitmap_top: 6,
            advance_26_6: 5 * 64,
        }
    }
}

fn config() -> RuntimeConfig {
    let mut config = RuntimeConfig::default();
    config.graphics.width = 64;
    config.graphics.height = 32;
    config.graphics.recovery = RecoveryConfig {
        poll_interval_ms: 0,
        max_polls_per_frame: 2,
    };
    config.atlas = AtlasConfig {
        page_size: 64,
        window: 128,
        max_pages: 8,
        prewarm: true,
    };
    config
}

fn lit_pixels(session: &Session, canvas: vellum_render::CanvasHandle) -> usize {
    let canvas = session.device().canvas(canvas).unwrap();
    canvas.pixels().iter().filter(|&&p| p != 0).count()
}

#[test]
fn test_text_draws_blocks() {
    let mut session = Session::software(config()).unwrap();
    let calls = Arc::new(AtomicUsize::new(0));
    let font = session.add_font(
        Box::new(BlockFace {
            height: 10,
            calls: calls.clone(),
        }),
        FontStyle::REGULAR,
    );
    // Prewarm cached the whole first window.
    assert_eq!(calls.load(Ordering::Relaxed), 128);
    assert_eq!(session.font(font).unwrap().glyph_count(), 128);

    let dest = session
        .device_mut()
        .create_canvas(32, 32, CanvasUsage::Surface)
        .unwrap();
    assert_eq!(session.string_width(font, b"AB C"), 5 + 5 + 3 + 5);
    assert_eq!(session.text(font, dest, 0xFF12_3456, 1, 1, b"AB C"), 18);
    assert_eq!(lit_pixels(&session, dest), 3 * 4 * 6);
    assert_eq!(calls.load(Ordering::Relaxed), 128);
}

#[test]
fn test_device_loss_and_recovery() {
    let mut session = Session::software(config()).unwrap();
    let calls = Arc::new(AtomicUsize::new(0));
    let font = session.add_font(
        Box::new(BlockFace {
            height: 10,
            calls: calls.clone(),
        }),
        FontStyle::BOLD,
    );
    let back = session.device().back_canvas();
    assert_eq!(session.flip().unwrap(), DeviceState::Active);

    let backend = session
        .device_mut()
        .backend_as_mut::<SoftwareBackend>()
        .unwrap();
    backend.lose_device();
    assert_eq!(session.flip().unwrap(), DeviceState::Lost);
    assert_eq!(session.flip().unwrap(), DeviceState::Lost);

    session
        .device_mut()
        .backend_as_mut::<SoftwareBackend>()
        .unwrap()
        .set_cooperative_level(CooperativeLevel::Ok);
    assert_eq!(session.flip().unwrap(), DeviceState::Active);
    assert_eq!(session.device().recoveries(), 1);

    // Atlas pages came back with their contents; no glyph is re-rasterized.
    let atlases = session.font(font).unwrap().atlases().to_vec();
    assert!(!atlases.is_empty());
    for atlas in atlases {
        let surface = session.device().canvas(atlas).unwrap().surface();
        assert!(!session.device().backend().is_lost(surface));
    }
    let before = calls.load(Ordering::Relaxed);
    assert_eq!(session.text(font, back, 0xFFFF_FFFF, 0, 0, b"Z"), 5);
    assert_eq!(lit_pixels(&session, back), 4 * 6);
    assert_eq!(calls.load(Ordering::Relaxed), before);
}

#[test]
fn test_verify_after_free_for_every_kind() {
    let backend = SoftwareBackend::new(vellum_render::PixelFormat::RGB565).with_stream(
        "intro.avi",
        StreamInfo {
            width: 320,
            height: 200,
            frames: 90,
        },
    );
    let mut session = Session::open(Box::new(backend), config()).unwrap();

    let font = session.add_font(
        Box::new(BlockFace {
            height: 8,
            calls: Arc::default(),
        }),
        FontStyle::REGULAR,
    );
    let device = session.device_mut();
    let canvas = device.create_canvas(16, 16, CanvasUsage::Surface).unwrap();
    let scene = device.create_scene().unwrap();
    let mesh = device.create_mesh(3, 1).unwrap();
    let movie = device.open_movie(std::path::Path::new("intro.avi")).unwrap();
    assert_eq!(device.movie(movie).unwrap().frames(), 90);

    device.free_canvas(canvas);
    device.free_mesh(mesh);
    device.free_scene(scene);
    device.close_movie(movie);
    assert!(device.verify_canvas(canvas).is_none());
    assert!(device.verify_mesh(mesh).is_none());
    assert!(device.verify_scene(scene).is_none());
    assert!(device.verify_movie(movie).is_none());

    session.free_font(font);
    assert!(session.verify_font(font).is_none());
    // Only the front/back pair is left.
    assert_eq!(session.device().canvas_count(), 2);
    assert_eq!(
        session
            .device()
            .backend_as::<SoftwareBackend>()
            .unwrap()
            .live_resources(),
        2
    );
    session.close();
}

#[test]
fn test_config_file_drives_session() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("vellum.json");
    std::fs::write(
        &path,
        r#"{ "graphics": { "width": 48, "height": 24 }, "atlas": { "prewarm": false } }"#,
    )
    .unwrap();

    let config = RuntimeConfig::from_path(&path).unwrap();
    let mut session = Session::software(config).unwrap();
    let back = session.device().back_canvas();
    assert_eq!(session.device().canvas(back).unwrap().width(), 48);

    let calls = Arc::new(AtomicUsize::new(0));
    session.add_font(
        Box::new(BlockFace {
            height: 12,
            calls: calls.clone(),
        }),
        FontStyle::REGULAR,
    );
    assert_eq!(calls.load(Ordering::Relaxed), 0);
}

#[test]
fn test_ffi_session_roundtrip() {
    let config = CString::new(r#"{ "graphics": { "width": 32, "height": 32 } }"#).unwrap();
    let session = ffi::vellum_session_new_software(config.as_ptr(), ptr::null_mut());
    assert!(!session.is_null());

    let back = ffi::vellum_back_canvas(session);
    assert_eq!(ffi::vellum_canvas_verify(session, back), back);
    let canvas = ffi::vellum_canvas_create(session, 10, 10);
    let text = CString::new("HI").unwrap();
    assert_eq!(ffi::vellum_text(session, 0, canvas, 0xFFFF_FFFF, 0, 0, text.as_ptr()), 0);
    assert_eq!(ffi::vellum_text_width(session, 0, text.as_ptr()), 0);

    ffi::vellum_canvas_free(session, canvas);
    assert_eq!(ffi::vellum_canvas_verify(session, canvas), 0);
    assert_eq!(ffi::vellum_flip(session), 1);
    ffi::vellum_session_free(session);
}
