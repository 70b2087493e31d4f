//! # vellum-runtime
//!
//! Script-facing layer: a [`Session`] ties a graphics device to the fonts
//! drawn on it, [`RuntimeConfig`] loads both crates' settings from JSON,
//! and [`ffi`] exposes the session over a C ABI with `u64` handles.
//!
//! ```text
//!  script host ──ffi──▶ Session ──▶ GraphicsDevice (vellum-render)
//!                          │
//!                          └──────▶ Font table     (vellum-text)
//! ```

pub mod config;
pub mod ffi;
pub mod session;

pub use config::{ConfigError, RuntimeConfig};
pub use session::{FontHandle, Session};
