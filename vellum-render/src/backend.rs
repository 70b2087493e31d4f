//! Backend seam: the platform graphics API as seen by the device.
//!
//! A [`Backend`] reports capabilities (formats, depth buffers, device
//! kinds), owns the raw allocations behind canvases and meshes, and
//! reports device loss through its [`CooperativeLevel`].
//!
//! [`SoftwareBackend`] keeps everything in memory. It is deterministic
//! and lets callers script device loss, display-mode changes and memory
//! exhaustion, which is what the recovery and registry tests run on.
//! The wgpu-backed implementation lives in [`crate::context`].

use std::any::Any;
use std::collections::HashMap;
use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::format::PixelFormat;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BackendError {
    #[error("Out of video memory ({requested} bytes requested)")]
    OutOfMemory { requested: usize },
    #[error("Device is lost")]
    DeviceLost,
    #[error("Unsupported request: {0}")]
    Unsupported(String),
    #[error("Cannot open stream {0}")]
    Stream(String),
    #[error("GPU error: {0}")]
    Gpu(String),
}

/// Opaque id of a backend allocation.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ResourceId(pub u64);

/// What the device asks the backend to allocate.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Allocation {
    /// A pixel surface. `primary` marks the front/back chain.
    Surface {
        width: u32,
        height: u32,
        format: PixelFormat,
        primary: bool,
    },
    DepthBuffer { width: u32, height: u32, bits: u32 },
    VertexBuffer { bytes: usize },
    RenderContext,
}

impl Allocation {
    /// Video memory consumed by the allocation; `None` when it overflows.
    pub fn byte_size(&self) -> Option<usize> {
        let area = |width: u32, height: u32, bits: u32| {
            (width as usize)
                .checked_mul(height as usize)?
                .checked_mul((bits as usize).div_ceil(8))
        };
        match *self {
            Allocation::Surface {
                width,
                height,
                format,
                ..
            } => area(width, height, format.bits),
            Allocation::DepthBuffer {
                width,
                height,
                bits,
            } => area(width, height, bits),
            Allocation::VertexBuffer { bytes } => Some(bytes),
            Allocation::RenderContext => Some(0),
        }
    }
}

/// Readiness of the device, polled once per frame.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CooperativeLevel {
    Ok,
    /// Resources are gone; the device may come back.
    Lost,
    /// The display mode changed underneath us. Not recoverable.
    WrongMode,
}

/// Kinds of rendering device a backend can offer, worst to best.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum DeviceKind {
    Software,
    Hardware,
    /// Hardware with transform and lighting.
    HardwareTnl,
}

/// Metadata of an opened movie stream.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct StreamInfo {
    pub width: u32,
    pub height: u32,
    pub frames: u32,
}

/// Platform graphics API.
pub trait Backend {
    /// Human-readable backend name (for logs).
    fn name(&self) -> &str;

    fn primary_format(&self) -> PixelFormat;

    /// Texture formats the current device instance can sample.
    fn texture_formats(&self) -> Vec<PixelFormat>;

    /// Z-buffer depths in bits.
    fn depth_formats(&self) -> Vec<u32>;

    fn device_kinds(&self) -> Vec<DeviceKind>;

    fn cooperative_level(&self) -> CooperativeLevel;

    fn allocate(&mut self, request: &Allocation) -> Result<ResourceId, BackendError>;

    /// Release an allocation. Unknown ids are ignored.
    fn release(&mut self, id: ResourceId);

    /// Replace the contents of an allocation.
    fn upload(&mut self, id: ResourceId, bytes: &[u8]);

    fn set_color_key(&mut self, id: ResourceId, key: Option<u32>);

    /// Whether the allocation's memory was lost (or never existed).
    fn is_lost(&self, id: ResourceId) -> bool;

    /// Platform-level restore of the primary surface chain.
    fn restore_all_surfaces(&mut self);

    /// Drop cached texture bindings so they are rebuilt on next use.
    fn evict_managed_textures(&mut self);

    fn open_stream(&mut self, path: &Path) -> Result<StreamInfo, BackendError>;

    fn as_any(&self) -> &dyn Any;

    fn as_any_mut(&mut self) -> &mut dyn Any;
}

// ───────────────────────────────────────────────────────────────────
// Software backend
// ───────────────────────────────────────────────────────────────────

struct SoftResource {
    epoch: u64,
    bytes: usize,
    primary: bool,
    color_key: Option<u32>,
    contents: Vec<u8>,
}

/// In-memory backend with scriptable device loss.
pub struct SoftwareBackend {
    primary: PixelFormat,
    texture_formats: Vec<PixelFormat>,
    depth_formats: Vec<u32>,
    device_kinds: Vec<DeviceKind>,
    level: CooperativeLevel,
    epoch: u64,
    next_id: u64,
    resources: HashMap<ResourceId, SoftResource>,
    memory_limit: Option<usize>,
    memory_used: usize,
    failing_allocations: u32,
    evictions: u32,
    streams: HashMap<PathBuf, StreamInfo>,
}

impl SoftwareBackend {
    /// Backend with a typical fixed-function capability list.
    pub fn new(primary: PixelFormat) -> Self {
        Self {
            primary,
            texture_formats: vec![
                PixelFormat::RGB565,
                PixelFormat::XRGB1555,
                PixelFormat::ARGB1555,
                PixelFormat::ARGB4444,
                PixelFormat::XRGB8888,
                PixelFormat::ARGB8888,
            ],
            depth_formats: vec![16, 24, 32],
            device_kinds: vec![
                DeviceKind::Software,
                DeviceKind::Hardware,
                DeviceKind::HardwareTnl,
            ],
            level: CooperativeLevel::Ok,
            epoch: 0,
            next_id: 1,
            resources: HashMap::new(),
            memory_limit: None,
            memory_used: 0,
            failing_allocations: 0,
            evictions: 0,
            streams: HashMap::new(),
        }
    }

    pub fn with_texture_formats(mut self, formats: Vec<PixelFormat>) -> Self {
        self.texture_formats = formats;
        self
    }

    pub fn with_depth_formats(mut self, depths: Vec<u32>) -> Self {
        self.depth_formats = depths;
        self
    }

    pub fn with_device_kinds(mut self, kinds: Vec<DeviceKind>) -> Self {
        self.device_kinds = kinds;
        self
    }

    /// Cap total video memory in bytes.
    pub fn with_memory_limit(mut self, bytes: usize) -> Self {
        self.memory_limit = Some(bytes);
        self
    }

    /// Make `path` openable as a movie stream.
    pub fn with_stream(mut self, path: impl Into<PathBuf>, info: StreamInfo) -> Self {
        self.streams.insert(path.into(), info);
        self
    }

    /// Invalidate every allocation and report the device as lost.
    pub fn lose_device(&mut self) {
        self.epoch += 1;
        self.level = CooperativeLevel::Lost;
    }

    /// Make the next `count` allocations fail with `OutOfMemory`.
    pub fn fail_allocations(&mut self, count: u32) {
        self.failing_allocations = count;
    }

    pub fn set_cooperative_level(&mut self, level: CooperativeLevel) {
        self.level = level;
    }

    /// Replace the capability list, as a new device instance would.
    pub fn set_texture_formats(&mut self, formats: Vec<PixelFormat>) {
        self.texture_formats = formats;
    }

    pub fn live_resources(&self) -> usize {
        self.resources.len()
    }

    pub fn memory_used(&self) -> usize {
        self.memory_used
    }

    pub fn evictions(&self) -> u32 {
        self.evictions
    }

    pub fn color_key(&self, id: ResourceId) -> Option<u32> {
        self.resources.get(&id).and_then(|r| r.color_key)
    }

    /// Last bytes uploaded to `id`.
    pub fn contents(&self, id: ResourceId) -> Option<&[u8]> {
        self.resources.get(&id).map(|r| r.contents.as_slice())
    }
}

impl Backend for SoftwareBackend {
    fn name(&self) -> &str {
        "software"
    }

    fn primary_format(&self) -> PixelFormat {
        self.primary
    }

    fn texture_formats(&self) -> Vec<PixelFormat> {
        self.texture_formats.clone()
    }

    fn depth_formats(&self) -> Vec<u32> {
        self.depth_formats.clone()
    }

    fn device_kinds(&self) -> Vec<DeviceKind> {
        self.device_kinds.clone()
    }

    fn cooperative_level(&self) -> CooperativeLevel {
        self.level
    }

    fn allocate(&mut self, request: &Allocation) -> Result<ResourceId, BackendError> {
        if self.level != CooperativeLevel::Ok {
            return Err(BackendError::DeviceLost);
        }
        let bytes = request
            .byte_size()
            .ok_or(BackendError::OutOfMemory { requested: usize::MAX })?;
        if self.failing_allocations > 0 {
            self.failing_allocations -= 1;
            return Err(BackendError::OutOfMemory { requested: bytes });
        }
        let used = self
            .memory_used
            .checked_add(bytes)
            .filter(|&used| self.memory_limit.map_or(true, |limit| used <= limit))
            .ok_or(BackendError::OutOfMemory { requested: bytes })?;
        let id = ResourceId(self.next_id);
        self.next_id += 1;
        self.memory_used = used;
        self.resources.insert(
            id,
            SoftResource {
                epoch: self.epoch,
                bytes,
                primary: matches!(request, Allocation::Surface { primary: true, .. }),
                color_key: None,
                contents: Vec::new(),
            },
        );
        Ok(id)
    }

    fn release(&mut self, id: ResourceId) {
        if let Some(resource) = self.resources.remove(&id) {
            self.memory_used -= resource.bytes;
        }
    }

    fn upload(&mut self, id: ResourceId, bytes: &[u8]) {
        let epoch = self.epoch;
        if let Some(resource) = self.resources.get_mut(&id) {
            if resource.epoch == epoch {
                resource.contents.clear();
                resource.contents.extend_from_slice(bytes);
            }
        }
    }

    fn set_color_key(&mut self, id: ResourceId, key: Option<u32>) {
        if let Some(resource) = self.resources.get_mut(&id) {
            resource.color_key = key;
        }
    }

    fn is_lost(&self, id: ResourceId) -> bool {
        self.resources
            .get(&id)
            .map_or(true, |resource| resource.epoch != self.epoch)
    }

    fn restore_all_surfaces(&mut self) {
        let epoch = self.epoch;
        for resource in self.resources.values_mut().filter(|r| r.primary) {
            resource.epoch = epoch;
            resource.contents.clear();
        }
    }

    fn evict_managed_textures(&mut self) {
        self.evictions += 1;
    }

    fn open_stream(&mut self, path: &Path) -> Result<StreamInfo, BackendError> {
        self.streams
            .get(path)
            .copied()
            .ok_or_else(|| BackendError::Stream(path.display().to_string()))
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

// ===================================================================
// Tests
// ===================================================================
