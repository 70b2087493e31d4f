//! C ABI for script hosts.
//!
//! A session is an opaque pointer; every resource is a `u64` handle where
//! `0` means "no resource". Every entry point tolerates a null session and
//! stale handles.

use std::ffi::{c_char, CStr, CString};
use std::path::Path;

use vellum_render::{
    CanvasHandle, CanvasUsage, DeviceState, Handle, MeshHandle, MovieHandle, SceneHandle,
};
use vellum_text::FontStyle;

use crate::config::RuntimeConfig;
use crate::session::{FontHandle, Session};

/// Opaque handle type for C FFI
#[repr(C)]
pub struct VellumSession {
    _private: [u8; 0],
}

/// SAFETY: Caller must ensure ptr is null or came from `vellum_session_new_*`
/// and has not been freed.
unsafe fn session_from_ffi<'a>(ptr: *mut VellumSession) -> Option<&'a mut Session> {
    if ptr.is_null() {
        return None;
    }
    Some(&mut *(ptr as *mut Session))
}

/// SAFETY: Caller must ensure ptr is null or a NUL-terminated string.
unsafe fn str_from_ffi<'a>(ptr: *const c_char) -> Option<&'a str> {
    if ptr.is_null() {
        return None;
    }
    CStr::from_ptr(ptr).to_str().ok()
}

fn write_error(error_out: *mut *mut c_char, message: &str) {
    if !error_out.is_null() {
        let message = CString::new(message).unwrap_or_default();
        unsafe { *error_out = message.into_raw() };
    }
}

fn bits<T>(handle: Option<Handle<T>>) -> u64 {
    handle.map_or(0, Handle::to_bits)
}

// ── Session ─────────────────────────────────────────────────────────

/// Open a software session. `config_json` may be null for defaults.
///
/// Returns null on failure and, when `error_out` is non-null, stores an
/// error string there that must be released with `vellum_string_free`.
#[no_mangle]
pub extern "C" fn vellum_session_new_software(
    config_json: *const c_char,
    error_out: *mut *mut c_char,
) -> *mut VellumSession {
    let config = if config_json.is_null() {
        RuntimeConfig::default()
    } else {
        let Some(json) = (unsafe { str_from_ffi(config_json) }) else {
            write_error(error_out, "Config is not valid UTF-8");
            return std::ptr::null_mut();
        };
        match RuntimeConfig::from_json_str(json) {
            Ok(config) => config,
            Err(e) => {
                write_error(error_out, &e.to_string());
                return std::ptr::null_mut();
            }
        }
    };
    match Session::software(config) {
        Ok(session) => Box::into_raw(Box::new(session)) as *mut VellumSession,
        Err(e) => {
            write_error(error_out, &e.to_string());
            std::ptr::null_mut()
        }
    }
}

#[no_mangle]
pub extern "C" fn vellum_session_free(ptr: *mut VellumSession) {
    if !ptr.is_null() {
        let session = unsafe { Box::from_raw(ptr as *mut Session) };
        session.close();
    }
}

#[no_mangle]
pub extern "C" fn vellum_string_free(ptr: *mut c_char) {
    if !ptr.is_null() {
        unsafe {
            let _ = CString::from_raw(ptr);
        }
    }
}

/// End the frame. Returns 1 when active, 0 while the device is lost and
/// -1 on an unrecoverable error.
#[no_mangle]
pub extern "C" fn vellum_flip(ptr: *mut VellumSession) -> i32 {
    let Some(session) = (unsafe { session_from_ffi(ptr) }) else {
        return -1;
    };
    match session.flip() {
        Ok(DeviceState::Active) => 1,
        Ok(DeviceState::Lost) => 0,
        Err(e) => {
            log::error!("Frame failed: {e}");
            -1
        }
    }
}

// ── Canvases ────────────────────────────────────────────────────────

#[no_mangle]
pub extern "C" fn vellum_back_canvas(ptr: *mut VellumSession) -> u64 {
    let Some(session) = (unsafe { session_from_ffi(ptr) }) else {
        return 0;
    };
    session.device().back_canvas().to_bits()
}

#[no_mangle]
pub extern "C" fn vellum_canvas_create(ptr: *mut VellumSession, width: u32, height: u32) -> u64 {
    let Some(session) = (unsafe { session_from_ffi(ptr) }) else {
        return 0;
    };
    bits(session.device_mut().create_canvas(width, height, CanvasUsage::Surface))
}

#[no_mangle]
pub extern "C" fn vellum_canvas_load(ptr: *mut VellumSession, path: *const c_char) -> u64 {
    let (Some(session), Some(path)) = (unsafe { session_from_ffi(ptr) }, unsafe { str_from_ffi(path) })
    else {
        return 0;
    };
    bits(session.device_mut().load_canvas(Path::new(path), CanvasUsage::Surface))
}

#[no_mangle]
pub extern "C" fn vellum_canvas_verify(ptr: *mut VellumSession, handle: u64) -> u64 {
    let Some(session) = (unsafe { session_from_ffi(ptr) }) else {
        return 0;
    };
    bits(CanvasHandle::from_bits(handle).and_then(|h| session.device().verify_canvas(h)))
}

#[no_mangle]
pub extern "C" fn vellum_canvas_free(ptr: *mut VellumSession, handle: u64) {
    let Some(session) = (unsafe { session_from_ffi(ptr) }) else {
        return;
    };
    if let Some(handle) = CanvasHandle::from_bits(handle) {
        session.device_mut().free_canvas(handle);
    }
}

// ── Fonts ───────────────────────────────────────────────────────────

/// Load a font by file or family name. `style` is a bit set:
/// 1 bold, 2 italic, 4 underline.
#[no_mangle]
pub extern "C" fn vellum_font_load(
    ptr: *mut VellumSession,
    name: *const c_char,
    height: u32,
    style: u32,
) -> u64 {
    let (Some(session), Some(name)) = (unsafe { session_from_ffi(ptr) }, unsafe { str_from_ffi(name) })
    else {
        return 0;
    };
    bits(session.load_font(name, height, FontStyle::from_bits_truncate(style)))
}

#[no_mangle]
pub extern "C" fn vellum_font_verify(ptr: *mut VellumSession, handle: u64) -> u64 {
    let Some(session) = (unsafe { session_from_ffi(ptr) }) else {
        return 0;
    };
    bits(FontHandle::from_bits(handle).and_then(|h| session.verify_font(h)))
}

#[no_mangle]
pub extern "C" fn vellum_font_free(ptr: *mut VellumSession, handle: u64) {
    let Some(session) = (unsafe { session_from_ffi(ptr) }) else {
        return;
    };
    if let Some(handle) = FontHandle::from_bits(handle) {
        session.free_font(handle);
    }
}

/// Draw NUL-terminated UTF-8 `text`. Returns the drawn width.
#[no_mangle]
pub extern "C" fn vellum_text(
    ptr: *mut VellumSession,
    font: u64,
    dest: u64,
    color: u32,
    x: i32,
    y: i32,
    text: *const c_char,
) -> i32 {
    let Some(session) = (unsafe { session_from_ffi(ptr) }) else {
        return 0;
    };
    if text.is_null() {
        return 0;
    }
    let text = unsafe { CStr::from_ptr(text) }.to_bytes();
    match (FontHandle::from_bits(font), CanvasHandle::from_bits(dest)) {
        (Some(font), Some(dest)) => session.text(font, dest, color, x, y, text),
        _ => 0,
    }
}

#[no_mangle]
pub extern "C" fn vellum_text_width(ptr: *mut VellumSession, font: u64, text: *const c_char) -> i32 {
    let Some(session) = (unsafe { session_from_ffi(ptr) }) else {
        return 0;
    };
    if text.is_null() {
        return 0;
    }
    let text = unsafe { CStr::from_ptr(text) }.to_bytes();
    FontHandle::from_bits(font).map_or(0, |font| session.string_width(font, text))
}

// ── Scenes and meshes ───────────────────────────────────────────────

#[no_mangle]
pub extern "C" fn vellum_scene_create(ptr: *mut VellumSession) -> u64 {
    let Some(session) = (unsafe { session_from_ffi(ptr) }) else {
        return 0;
    };
    bits(session.device_mut().create_scene())
}

#[no_mangle]
pub extern "C" fn vellum_scene_verify(ptr: *mut VellumSession, handle: u64) -> u64 {
    let Some(session) = (unsafe { session_from_ffi(ptr) }) else {
        return 0;
    };
    bits(SceneHandle::from_bits(handle).and_then(|h| session.device().verify_scene(h)))
}

#[no_mangle]
pub extern "C" fn vellum_scene_free(ptr: *mut VellumSession, handle: u64) {
    let Some(session) = (unsafe { session_from_ffi(ptr) }) else {
        return;
    };
    if let Some(handle) = SceneHandle::from_bits(handle) {
        session.device_mut().free_scene(handle);
    }
}

#[no_mangle]
pub extern "C" fn vellum_mesh_create(
    ptr: *mut VellumSession,
    max_vertices: u32,
    max_triangles: u32,
) -> u64 {
    let Some(session) = (unsafe { session_from_ffi(ptr) }) else {
        return 0;
    };
    bits(session.device_mut().create_mesh(max_vertices, max_triangles))
}

#[no_mangle]
pub extern "C" fn vellum_mesh_verify(ptr: *mut VellumSession, handle: u64) -> u64 {
    let Some(session) = (unsafe { session_from_ffi(ptr) }) else {
        return 0;
    };
    bits(MeshHandle::from_bits(handle).and_then(|h| session.device().verify_mesh(h)))
}

#[no_mangle]
pub extern "C" fn vellum_mesh_free(ptr: *mut VellumSession, handle: u64) {
    let Some(session) = (unsafe { session_from_ffi(ptr) }) else {
        return;
    };
    if let Some(handle) = MeshHandle::from_bits(handle) {
        session.device_mut().free_mesh(handle);
    }
}

// ── Movies ──────────────────────────────────────────────────────────

#[no_mangle]
pub extern "C" fn vellum_movie_open(ptr: *mut VellumSession, path: *const c_char) -> u64 {
    let (Some(session), Some(path)) = (unsafe { session_from_ffi(ptr) }, unsafe { str_from_ffi(path) })
    else {
        return 0;
    };
    bits(session.device_mut().open_movie(Path::new(path)))
}

#[no_mangle]
pub extern "C" fn vellum_movie_verify(ptr: *mut VellumSession, handle: u64) -> u64 {
    let Some(session) = (unsafe { session_from_ffi(ptr) }) else {
        return 0;
    };
    bits(MovieHandle::from_bits(handle).and_then(|h| session.device().verify_movie(h)))
}

#[no_mangle]
pub extern "C" fn vellum_movie_close(ptr: *mut VellumSession, handle: u64) {
    let Some(session) = (unsafe { session_from_ffi(ptr) }) else {
        return;
    };
    if let Some(handle) = MovieHandle::from_bits(handle) {
        session.device_mut().close_movie(handle);
    }
}

// ===================================================================
// Tests
// ===================================================================
