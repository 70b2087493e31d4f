//! The graphics device: backend, negotiated formats and resource tables.
//!
//! Every resource kind lives in its own [`HandleTable`]. Creation returns
//! `None` on failure and never leaves a partial registration behind;
//! operations on stale handles are no-ops.
//!
//! ```text
//! GraphicsDevice
//!  ├── backend: Box<dyn Backend>
//!  ├── formats: FormatTable          (re-negotiated on open, scene, restore)
//!  ├── canvases ─ front/back (pinned) + offscreen + atlas pages
//!  ├── meshes   ─ only while a scene exists
//!  ├── scenes   ─ at most one
//!  ├── movies
//!  └── recovery: Active ⇄ Lost
//! ```

use std::path::Path;

use log::{info, warn};
use thiserror::Error;

use crate::backend::{Allocation, Backend, BackendError, CooperativeLevel};
use crate::canvas::{decode_image, BlitMode, Canvas, CanvasUsage, Rect};
use crate::config::GraphicsConfig;
use crate::format::FormatTable;
use crate::handle::{Handle, HandleTable};
use crate::mesh::Mesh;
use crate::movie::Movie;
use crate::recovery::{
    restore_resources, DeviceState, Readiness, RecoveryController, RecoveryError,
};
use crate::scene::{pick_device_kind, Scene};

pub type CanvasHandle = Handle<Canvas>;
pub type MeshHandle = Handle<Mesh>;
pub type SceneHandle = Handle<Scene>;
pub type MovieHandle = Handle<Movie>;

#[derive(Error, Debug)]
pub enum GraphicsError {
    #[error("Invalid framebuffer size {width}x{height}")]
    InvalidSize { width: u32, height: u32 },
    #[error("Backend error: {0}")]
    Backend(#[from] BackendError),
}

pub struct GraphicsDevice {
    backend: Box<dyn Backend>,
    config: GraphicsConfig,
    formats: FormatTable,
    recovery: RecoveryController,
    canvases: HandleTable<Canvas>,
    meshes: HandleTable<Mesh>,
    scenes: HandleTable<Scene>,
    movies: HandleTable<Movie>,
    front: CanvasHandle,
    back: CanvasHandle,
    frames: u64,
}

impl GraphicsDevice {
    /// Negotiate formats and allocate the front/back canvas pair.
    pub fn open(mut backend: Box<dyn Backend>, config: GraphicsConfig) -> Result<Self, GraphicsError> {
        let (width, height) = (config.width, config.height);
        if width == 0 || height == 0 {
            return Err(GraphicsError::InvalidSize { width, height });
        }
        let formats = negotiate(backend.as_ref());
        let primary = formats.primary();

        let front = Canvas::allocate(backend.as_mut(), width, height, primary, CanvasUsage::Surface, true)?;
        let back = match Canvas::allocate(backend.as_mut(), width, height, primary, CanvasUsage::Surface, true) {
            Ok(back) => back,
            Err(e) => {
                front.release(backend.as_mut());
                return Err(e.into());
            }
        };

        let mut canvases = HandleTable::new();
        let front = canvases.insert(front);
        let back = canvases.insert(back);

        info!("Graphics device open: {width}x{height} on {} backend", backend.name());
        info!("Negotiated formats:\n{formats}");

        Ok(Self {
            recovery: RecoveryController::new(config.recovery.clone()),
            backend,
            config,
            formats,
            canvases,
            meshes: HandleTable::new(),
            scenes: HandleTable::new(),
            movies: HandleTable::new(),
            front,
            back,
            frames: 0,
        })
    }

    pub fn config(&self) -> &GraphicsConfig {
        &self.config
    }

    pub fn formats(&self) -> &FormatTable {
        &self.formats
    }

    pub fn state(&self) -> DeviceState {
        self.recovery.state()
    }

    /// Completed device-loss recoveries.
    pub fn recoveries(&self) -> u64 {
        self.recovery.recoveries()
    }

    pub fn frames(&self) -> u64 {
        self.frames
    }

    pub fn backend(&self) -> &dyn Backend {
        self.backend.as_ref()
    }

    pub fn backend_mut(&mut self) -> &mut dyn Backend {
        self.backend.as_mut()
    }

    /// Downcast the backend to its concrete type.
    pub fn backend_as<B: Backend + 'static>(&self) -> Option<&B> {
        self.backend.as_any().downcast_ref()
    }

    pub fn backend_as_mut<B: Backend + 'static>(&mut self) -> Option<&mut B> {
        self.backend.as_any_mut().downcast_mut()
    }

    fn renegotiate(&mut self) {
        self.formats = negotiate(self.backend.as_ref());
    }

    // ── Frame loop ──────────────────────────────────────────────────

    /// Observe the device once; restore everything if it came back.
    pub fn poll(&mut self) -> Result<DeviceState, RecoveryError> {
        let back_surface = self.canvases.get(self.back).map(Canvas::surface);
        let back_lost = |backend: &dyn Backend| back_surface.map_or(true, |s| backend.is_lost(s));

        if self.recovery.state() == DeviceState::Active {
            if self.backend.cooperative_level() == CooperativeLevel::Ok
                && !back_lost(self.backend.as_ref())
            {
                return Ok(DeviceState::Active);
            }
            warn!("Graphics device lost");
            self.recovery.mark_lost();
        }

        if self.recovery.wait_for_device(self.backend.as_ref())? == Readiness::Waiting {
            return Ok(DeviceState::Lost);
        }

        if self.recovery.restore_pending() || back_lost(self.backend.as_ref()) {
            self.recovery.begin_restore();
            restore_resources(self.backend.as_mut(), &mut self.canvases, &mut self.meshes)?;
            for (_, scene) in self.scenes.iter_mut() {
                if self.backend.is_lost(scene.context) {
                    let context = self.backend.allocate(&Allocation::RenderContext)?;
                    self.backend.release(std::mem::replace(&mut scene.context, context));
                }
            }
            self.renegotiate();
        }
        self.recovery.mark_active();
        info!("Graphics device recovered");
        Ok(DeviceState::Active)
    }

    /// End the frame: poll for loss, then push dirty canvases and meshes.
    pub fn flip(&mut self) -> Result<DeviceState, RecoveryError> {
        let state = self.poll()?;
        if state == DeviceState::Lost {
            return Ok(state);
        }
        let backend = self.backend.as_mut();
        for (_, canvas) in self.canvases.iter_mut().filter(|(_, c)| c.is_dirty()) {
            canvas.upload(backend);
        }
        for (_, mesh) in self.meshes.iter_mut().filter(|(_, m)| m.is_dirty()) {
            mesh.upload(backend);
        }
        self.frames += 1;
        Ok(state)
    }

    // ── Canvases ────────────────────────────────────────────────────

    pub fn front_canvas(&self) -> CanvasHandle {
        self.front
    }

    pub fn back_canvas(&self) -> CanvasHandle {
        self.back
    }

    pub fn canvas_count(&self) -> usize {
        self.canvases.len()
    }

    /// Allocate a cleared canvas in the format chosen for `usage`.
    pub fn create_canvas(&mut self, width: u32, height: u32, usage: CanvasUsage) -> Option<CanvasHandle> {
        if width == 0 || height == 0 {
            return None;
        }
        let format = match usage {
            CanvasUsage::Surface => self.formats.primary(),
            CanvasUsage::Texture { usage, tier } => self.formats.texture(usage, tier),
        };
        match Canvas::allocate(self.backend.as_mut(), width, height, format, usage, false) {
            Ok(mut canvas) => {
                canvas.cls();
                Some(self.canvases.insert(canvas))
            }
            Err(e) => {
                warn!("Failed to create {width}x{height} canvas: {e}");
                None
            }
        }
    }

    /// Decode an image file into a new canvas.
    pub fn load_canvas(&mut self, path: &Path, usage: CanvasUsage) -> Option<CanvasHandle> {
        let (width, height, pixels) = match decode_image(path) {
            Ok(decoded) => decoded,
            Err(e) => {
                warn!("Failed to load image {}: {e}", path.display());
                return None;
            }
        };
        let handle = self.create_canvas(width, height, usage)?;
        if let Some(canvas) = self.canvases.get_mut(handle) {
            canvas.write_pixels(&pixels);
        }
        Some(handle)
    }

    pub fn verify_canvas(&self, handle: CanvasHandle) -> Option<CanvasHandle> {
        self.canvases.contains(handle).then_some(handle)
    }

    pub fn canvas(&self, handle: CanvasHandle) -> Option<&Canvas> {
        self.canvases.get(handle)
    }

    pub fn canvas_mut(&mut self, handle: CanvasHandle) -> Option<&mut Canvas> {
        self.canvases.get_mut(handle)
    }

    /// Free a canvas. The front/back pair is pinned and ignored here.
    pub fn free_canvas(&mut self, handle: CanvasHandle) {
        if handle == self.front || handle == self.back {
            return;
        }
        if let Some(canvas) = self.canvases.remove(handle) {
            canvas.release(self.backend.as_mut());
        }
    }

    /// Blit between two live canvases (or within one).
    ///
    /// Returns `false` if either handle is stale.
    pub fn blit(
        &mut self,
        dest: CanvasHandle,
        x: i32,
        y: i32,
        src: CanvasHandle,
        src_rect: Rect,
        mode: BlitMode,
    ) -> bool {
        if dest == src {
            return match self.canvases.get_mut(dest) {
                Some(canvas) => {
                    canvas.blit_within(x, y, src_rect, mode);
                    true
                }
                None => false,
            };
        }
        match self.canvases.pair_mut(dest, src) {
            Some((dest, src)) => {
                dest.blit(x, y, src, src_rect, mode);
                true
            }
            None => false,
        }
    }

    // ── Scenes ──────────────────────────────────────────────────────

    pub fn scene_count(&self) -> usize {
        self.scenes.len()
    }

    /// Create the 3D scene: needs a hardware device and a usable Z-buffer.
    pub fn create_scene(&mut self) -> Option<SceneHandle> {
        if !self.scenes.is_empty() {
            warn!("A scene already exists");
            return None;
        }
        let Some(kind) = pick_device_kind(&self.backend.device_kinds()) else {
            warn!("No hardware device available for a scene");
            return None;
        };
        self.renegotiate();
        let Some(depth_bits) = self.formats.depth_bits() else {
            warn!("No usable Z-buffer format");
            return None;
        };

        let back = self.canvases.get_mut(self.back)?;
        if let Err(e) = back.attach_zbuffer(self.backend.as_mut(), depth_bits) {
            warn!("Failed to attach {depth_bits}-bit Z-buffer: {e}");
            return None;
        }
        let context = match self.backend.allocate(&Allocation::RenderContext) {
            Ok(context) => context,
            Err(e) => {
                warn!("Failed to create render context: {e}");
                back.detach_zbuffer(self.backend.as_mut());
                return None;
            }
        };

        info!("Scene created on {kind:?} device with {depth_bits}-bit Z-buffer");
        Some(self.scenes.insert(Scene::new(kind, depth_bits, context)))
    }

    pub fn verify_scene(&self, handle: SceneHandle) -> Option<SceneHandle> {
        self.scenes.contains(handle).then_some(handle)
    }

    pub fn scene(&self, handle: SceneHandle) -> Option<&Scene> {
        self.scenes.get(handle)
    }

    /// Free the scene and, with it, every mesh.
    pub fn free_scene(&mut self, handle: SceneHandle) {
        let Some(scene) = self.scenes.remove(handle) else {
            return;
        };
        for mesh_handle in self.meshes.handles() {
            if let Some(mesh) = self.meshes.remove(mesh_handle) {
                mesh.release(self.backend.as_mut());
            }
        }
        if let Some(back) = self.canvases.get_mut(self.back) {
            back.detach_zbuffer(self.backend.as_mut());
        }
        self.backend.release(scene.context);
    }

    // ── Meshes ──────────────────────────────────────────────────────

    pub fn mesh_count(&self) -> usize {
        self.meshes.len()
    }

    /// Allocate a mesh. Requires a live scene.
    pub fn create_mesh(&mut self, max_vertices: u32, max_triangles: u32) -> Option<MeshHandle> {
        if self.scenes.is_empty() {
            warn!("Cannot create a mesh without a scene");
            return None;
        }
        match Mesh::allocate(self.backend.as_mut(), max_vertices, max_triangles) {
            Ok(mesh) => Some(self.meshes.insert(mesh)),
            Err(e) => {
                warn!("Failed to create mesh: {e}");
                None
            }
        }
    }

    pub fn verify_mesh(&self, handle: MeshHandle) -> Option<MeshHandle> {
        self.meshes.contains(handle).then_some(handle)
    }

    pub fn mesh(&self, handle: MeshHandle) -> Option<&Mesh> {
        self.meshes.get(handle)
    }

    pub fn mesh_mut(&mut self, handle: MeshHandle) -> Option<&mut Mesh> {
        self.meshes.get_mut(handle)
    }

    pub fn free_mesh(&mut self, handle: MeshHandle) {
        if let Some(mesh) = self.meshes.remove(handle) {
            mesh.release(self.backend.as_mut());
        }
    }

    // ── Movies ──────────────────────────────────────────────────────

    pub fn movie_count(&self) -> usize {
        self.movies.len()
    }

    pub fn open_movie(&mut self, path: &Path) -> Option<MovieHandle> {
        match self.backend.open_stream(path) {
            Ok(info) => Some(self.movies.insert(Movie::new(path.to_path_buf(), info))),
            Err(e) => {
                warn!("Failed to open movie: {e}");
                None
            }
        }
    }

    pub fn verify_movie(&self, handle: MovieHandle) -> Option<MovieHandle> {
        self.movies.contains(handle).then_some(handle)
    }

    pub fn movie(&self, handle: MovieHandle) -> Option<&Movie> {
        self.movies.get(handle)
    }

    pub fn movie_mut(&mut self, handle: MovieHandle) -> Option<&mut Movie> {
        self.movies.get_mut(handle)
    }

    pub fn close_movie(&mut self, handle: MovieHandle) {
        self.movies.remove(handle);
    }

    // ── Shutdown ────────────────────────────────────────────────────

    /// Release every resource, including the front/back pair.
    pub fn close(mut self) {
        for scene in self.scenes.handles() {
            self.free_scene(scene);
        }
        self.movies = HandleTable::new();
        for handle in self.canvases.handles() {
            if let Some(canvas) = self.canvases.remove(handle) {
                canvas.release(self.backend.as_mut());
            }
        }
        info!("Graphics device closed after {} frames", self.frames);
    }
}

fn negotiate(backend: &dyn Backend) -> FormatTable {
    FormatTable::negotiate(
        backend.primary_format(),
        &backend.texture_formats(),
        &backend.depth_formats(),
    )
}

// ===================================================================
// Tests
// ===================================================================
