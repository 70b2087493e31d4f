//! # vellum-render
//!
//! Graphics resource layer: format negotiation, a generational resource
//! registry, and device-loss recovery on top of a pluggable backend.
//!
//! ## Architecture
//!
//! ```text
//!  Backend (software | wgpu)
//!       │  capabilities
//!       ▼
//!  FormatTable::negotiate()        ◀─── on open, scene creation, restore
//!       │
//!       ▼
//!  GraphicsDevice                  ◀─── HandleTable per resource kind
//!       │  flip() → poll()
//!       ▼
//!  RecoveryController              ◀─── Active ⇄ Lost, restore cycle
//! ```
//!
//! ## Crate modules
//!
//! - [`format`] — pixel formats and texture/depth negotiation
//! - [`handle`] — generational handles and tables
//! - [`backend`] — backend trait and the in-memory software backend
//! - [`context`] — wgpu backend
//! - [`canvas`] — CPU pixel surfaces, blits, backup/restore
//! - [`mesh`] — fixed-capacity vertex/index buffers
//! - [`scene`], [`movie`] — 3D context and movie streams
//! - [`recovery`] — device-loss state machine
//! - [`device`] — the graphics device that owns everything above

pub mod backend;
pub mod canvas;
pub mod config;
pub mod context;
pub mod device;
pub mod format;
pub mod handle;
pub mod mesh;
pub mod movie;
pub mod recovery;
pub mod scene;

// Re-exports for convenience
pub use backend::{
    Allocation, Backend, BackendError, CooperativeLevel, DeviceKind, ResourceId, SoftwareBackend,
    StreamInfo,
};
pub use canvas::{BlitMode, Canvas, CanvasUsage, Rect};
pub use config::GraphicsConfig;
pub use context::{GpuContext, GpuError, WgpuBackend};
pub use device::{
    CanvasHandle, GraphicsDevice, GraphicsError, MeshHandle, MovieHandle, SceneHandle,
};
pub use format::{FormatTable, PixelFormat, TextureUsage, Tier};
pub use handle::{Handle, HandleTable};
pub use mesh::{Mesh, Vertex};
pub use movie::Movie;
pub use recovery::{DeviceState, RecoveryConfig, RecoveryError};
pub use scene::Scene;
