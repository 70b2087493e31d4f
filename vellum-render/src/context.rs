//! wgpu backend — owns `wgpu::Device` and `Queue` and maps backend
//! allocations onto GPU textures and buffers.
//!
//! Canvases keep `0xAARRGGBB` words, which on little-endian hosts are the
//! byte order of `Bgra8Unorm`, so every surface is stored in that format.
//! The texture format list reported to negotiation comes from what the
//! adapter can sample and copy into.
//!
//! Device loss is reported by wgpu through the device-lost callback. The
//! callback only raises a flag; the next `restore_all_surfaces` requests
//! a fresh device from the same adapter and re-creates the primary chain.

use std::any::Any;
use std::collections::HashMap;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use log::{info, warn};
use thiserror::Error;
use wgpu::{
    Adapter, Buffer, BufferDescriptor, BufferUsages, Device, DeviceDescriptor, DeviceType,
    Extent3d, Instance, InstanceDescriptor, Queue, RequestAdapterOptions, Texture,
    TextureDescriptor, TextureDimension, TextureFormat, TextureUsages,
};

use crate::backend::{
    Allocation, Backend, BackendError, CooperativeLevel, DeviceKind, ResourceId, StreamInfo,
};
use crate::format::PixelFormat;

#[derive(Error, Debug)]
pub enum GpuError {
    #[error("No suitable GPU adapter found")]
    NoAdapter,
    #[error("Failed to request device: {0}")]
    RequestDevice(#[from] wgpu::RequestDeviceError),
}

impl From<GpuError> for BackendError {
    fn from(e: GpuError) -> Self {
        BackendError::Gpu(e.to_string())
    }
}

/// Device and queue plus the flag raised when wgpu reports loss.
pub struct GpuContext {
    pub device: Device,
    pub queue: Queue,
    lost: Arc<AtomicBool>,
}

impl GpuContext {
    /// Request a device from `adapter` and hook its lost callback.
    pub async fn request(adapter: &Adapter) -> Result<Self, GpuError> {
        let (device, queue) = adapter
            .request_device(
                &DeviceDescriptor {
                    label: Some("vellum-device"),
                    ..Default::default()
                },
                None,
            )
            .await?;

        let lost = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&lost);
        device.set_device_lost_callback(move |reason, message| {
            warn!("wgpu device lost ({reason:?}): {message}");
            flag.store(true, Ordering::SeqCst);
        });

        Ok(Self { device, queue, lost })
    }

    pub fn is_lost(&self) -> bool {
        self.lost.load(Ordering::SeqCst)
    }
}

/// Headless adapter (no window, no surface).
pub async fn request_adapter() -> Result<Adapter, GpuError> {
    let instance = Instance::new(&InstanceDescriptor::default());
    instance
        .request_adapter(&RequestAdapterOptions {
            power_preference: wgpu::PowerPreference::HighPerformance,
            compatible_surface: None,
            force_fallback_adapter: false,
        })
        .await
        .ok_or(GpuError::NoAdapter)
}

/// Texture formats we can offer, with the pixel layout they stand for.
const CANDIDATE_FORMATS: [(TextureFormat, PixelFormat); 4] = [
    (TextureFormat::Bgra8Unorm, PixelFormat::XRGB8888),
    (TextureFormat::Bgra8Unorm, PixelFormat::ARGB8888),
    (TextureFormat::Rgb10a2Unorm, PixelFormat::ARGB2101010),
    (TextureFormat::R8Unorm, PixelFormat::L8),
];

const DEPTH_FORMATS: [(u32, TextureFormat); 3] = [
    (16, TextureFormat::Depth16Unorm),
    (24, TextureFormat::Depth24Plus),
    (32, TextureFormat::Depth32Float),
];

enum GpuResource {
    Surface {
        texture: Texture,
        width: u32,
        height: u32,
        format: PixelFormat,
        primary: bool,
    },
    Depth(Texture),
    Buffer(Buffer),
    Context,
}

struct Entry {
    epoch: u64,
    resource: GpuResource,
    color_key: Option<u32>,
}

pub struct WgpuBackend {
    adapter: Adapter,
    gpu: GpuContext,
    epoch: u64,
    next_id: u64,
    entries: HashMap<ResourceId, Entry>,
    texture_formats: Vec<PixelFormat>,
    depth_formats: Vec<u32>,
    device_kind: DeviceKind,
}

impl WgpuBackend {
    /// Open the default headless adapter.
    pub async fn new_headless() -> Result<Self, GpuError> {
        let adapter = request_adapter().await?;
        let gpu = GpuContext::request(&adapter).await?;

        let required = TextureUsages::TEXTURE_BINDING | TextureUsages::COPY_DST;
        let texture_formats = CANDIDATE_FORMATS
            .iter()
            .filter(|(format, _)| {
                adapter
                    .get_texture_format_features(*format)
                    .allowed_usages
                    .contains(required)
            })
            .map(|&(_, pixel)| pixel)
            .collect();
        let depth_formats = DEPTH_FORMATS
            .iter()
            .filter(|(_, format)| {
                adapter
                    .get_texture_format_features(*format)
                    .allowed_usages
                    .contains(TextureUsages::RENDER_ATTACHMENT)
            })
            .map(|&(bits, _)| bits)
            .collect();

        let info = adapter.get_info();
        let device_kind = match info.device_type {
            DeviceType::Cpu => DeviceKind::Software,
            DeviceType::DiscreteGpu | DeviceType::IntegratedGpu => DeviceKind::HardwareTnl,
            DeviceType::VirtualGpu | DeviceType::Other => DeviceKind::Hardware,
        };
        info!("wgpu adapter: {} ({:?}, {:?})", info.name, info.backend, device_kind);

        Ok(Self {
            adapter,
            gpu,
            epoch: 0,
            next_id: 1,
            entries: HashMap::new(),
            texture_formats,
            depth_formats,
            device_kind,
        })
    }

    pub fn context(&self) -> &GpuContext {
        &self.gpu
    }

    fn create_surface(&self, width: u32, height: u32, primary: bool) -> Texture {
        let mut usage = TextureUsages::TEXTURE_BINDING | TextureUsages::COPY_DST;
        if primary {
            usage |= TextureUsages::RENDER_ATTACHMENT | TextureUsages::COPY_SRC;
        }
        self.gpu.device.create_texture(&TextureDescriptor {
            label: Some(if primary { "vellum-primary" } else { "vellum-canvas" }),
            size: Extent3d {
                width,
                height,
                depth_or_array_layers: 1,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: TextureDimension::D2,
            format: TextureFormat::Bgra8Unorm,
            usage,
            view_formats: &[],
        })
    }

    fn insert(&mut self, resource: GpuResource) -> ResourceId {
        let id = ResourceId(self.next_id);
        self.next_id += 1;
        self.entries.insert(
            id,
            Entry {
                epoch: self.epoch,
                resource,
                color_key: None,
            },
        );
        id
    }
}

impl Backend for WgpuBackend {
    fn name(&self) -> &str {
        "wgpu"
    }

    fn primary_format(&self) -> PixelFormat {
        PixelFormat::XRGB8888
    }

    fn texture_formats(&self) -> Vec<PixelFormat> {
        self.texture_formats.clone()
    }

    fn depth_formats(&self) -> Vec<u32> {
        self.depth_formats.clone()
    }

    fn device_kinds(&self) -> Vec<DeviceKind> {
        let mut kinds = vec![DeviceKind::Software];
        if self.device_kind > DeviceKind::Software {
            kinds.push(self.device_kind);
        }
        kinds
    }

    fn cooperative_level(&self) -> CooperativeLevel {
        // The adapter outlives its devices, so a lost device can always
        // be re-requested.
        CooperativeLevel::Ok
    }

    fn allocate(&mut self, request: &Allocation) -> Result<ResourceId, BackendError> {
        if self.gpu.is_lost() {
            return Err(BackendError::DeviceLost);
        }
        let resource = match *request {
            Allocation::Surface {
                width,
                height,
                format,
                primary,
            } => GpuResource::Surface {
                texture: self.create_surface(width, height, primary),
                width,
                height,
                format,
                primary,
            },
            Allocation::DepthBuffer {
                width,
                height,
                bits,
            } => {
                let format = DEPTH_FORMATS
                    .iter()
                    .find(|(b, _)| *b == bits)
                    .map(|&(_, format)| format)
                    .ok_or_else(|| BackendError::Unsupported(format!("{bits}-bit depth")))?;
                GpuResource::Depth(self.gpu.device.create_texture(&TextureDescriptor {
                    label: Some("vellum-zbuffer"),
                    size: Extent3d {
                        width,
                        height,
                        depth_or_array_layers: 1,
                    },
                    mip_level_count: 1,
                    sample_count: 1,
                    dimension: TextureDimension::D2,
                    format,
                    usage: TextureUsages::RENDER_ATTACHMENT,
                    view_formats: &[],
                }))
            }
            Allocation::VertexBuffer { bytes } => {
                let size = (bytes as u64).next_multiple_of(wgpu::COPY_BUFFER_ALIGNMENT);
                GpuResource::Buffer(self.gpu.device.create_buffer(&BufferDescriptor {
                    label: Some("vellum-mesh"),
                    size,
                    usage: BufferUsages::VERTEX | BufferUsages::INDEX | BufferUsages::COPY_DST,
                    mapped_at_creation: false,
                }))
            }
            Allocation::RenderContext => GpuResource::Context,
        };
        Ok(self.insert(resource))
    }

    fn release(&mut self, id: ResourceId) {
        match self.entries.remove(&id).map(|entry| entry.resource) {
            Some(GpuResource::Surface { texture, .. }) | Some(GpuResource::Depth(texture)) => {
                texture.destroy()
            }
            Some(GpuResource::Buffer(buffer)) => buffer.destroy(),
            Some(GpuResource::Context) | None => {}
        }
    }

    fn upload(&mut self, id: ResourceId, bytes: &[u8]) {
        if self.is_lost(id) {
            return;
        }
        let Some(entry) = self.entries.get(&id) else {
            return;
        };
        match &entry.resource {
            GpuResource::Surface {
                texture,
                width,
                height,
                ..
            } => {
                let expected = *width as usize * *height as usize * 4;
                if bytes.len() != expected {
                    warn!("Ignoring upload of {} bytes to {expected}-byte surface", bytes.len());
                    return;
                }
                self.gpu.queue.write_texture(
                    wgpu::TexelCopyTextureInfo {
                        texture,
                        mip_level: 0,
                        origin: wgpu::Origin3d::ZERO,
                        aspect: wgpu::TextureAspect::All,
                    },
                    bytes,
                    wgpu::TexelCopyBufferLayout {
                        offset: 0,
                        bytes_per_row: Some(4 * width),
                        rows_per_image: Some(*height),
                    },
                    Extent3d {
                        width: *width,
                        height: *height,
                        depth_or_array_layers: 1,
                    },
                );
            }
            GpuResource::Buffer(buffer) => {
                let mut padded = bytes.to_vec();
                padded.resize(
                    (bytes.len() as u64).next_multiple_of(wgpu::COPY_BUFFER_ALIGNMENT) as usize,
                    0,
                );
                if padded.len() as u64 <= buffer.size() {
                    self.gpu.queue.write_buffer(buffer, 0, &padded);
                }
            }
            GpuResource::Depth(_) | GpuResource::Context => {}
        }
    }

    fn set_color_key(&mut self, id: ResourceId, key: Option<u32>) {
        if let Some(entry) = self.entries.get_mut(&id) {
            entry.color_key = key;
        }
    }

    fn is_lost(&self, id: ResourceId) -> bool {
        self.gpu.is_lost()
            || self
                .entries
                .get(&id)
                .map_or(true, |entry| entry.epoch != self.epoch)
    }

    fn restore_all_surfaces(&mut self) {
        if !self.gpu.is_lost() {
            return;
        }
        match pollster::block_on(GpuContext::request(&self.adapter)) {
            Ok(gpu) => self.gpu = gpu,
            Err(e) => {
                warn!("Failed to re-acquire wgpu device: {e}");
                return;
            }
        }
        self.epoch += 1;
        let epoch = self.epoch;
        let primaries: Vec<(ResourceId, u32, u32)> = self
            .entries
            .iter()
            .filter_map(|(id, entry)| match entry.resource {
                GpuResource::Surface {
                    width,
                    height,
                    primary: true,
                    ..
                } => Some((*id, width, height)),
                _ => None,
            })
            .collect();
        for (id, width, height) in primaries {
            let texture = self.create_surface(width, height, true);
            if let Some(entry) = self.entries.get_mut(&id) {
                entry.epoch = epoch;
                if let GpuResource::Surface { texture: old, .. } = &mut entry.resource {
                    *old = texture;
                }
            }
        }
        info!("wgpu device re-acquired");
    }

    fn evict_managed_textures(&mut self) {
        // Every texture is re-uploaded by its canvas; nothing is cached here.
    }

    fn open_stream(&mut self, path: &Path) -> Result<StreamInfo, BackendError> {
        Err(BackendError::Unsupported(format!(
            "movie playback ({})",
            path.display()
        )))
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

impl WgpuBackend {
    /// Pixel format a surface was allocated with.
    pub fn surface_format(&self, id: ResourceId) -> Option<PixelFormat> {
        match self.entries.get(&id)?.resource {
            GpuResource::Surface { format, .. } => Some(format),
            _ => None,
        }
    }

    pub fn color_key(&self, id: ResourceId) -> Option<u32> {
        self.entries.get(&id).and_then(|entry| entry.color_key)
    }
}

// ===================================================================
// Tests
// ===================================================================
