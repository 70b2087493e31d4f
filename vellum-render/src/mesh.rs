//! Fixed-capacity meshes.
//!
//! A mesh owns `max_vertices` vertices and `max_triangles` index triples,
//! mirrored into one backend vertex buffer. Meshes only exist while a
//! scene is alive.

use bytemuck::{Pod, Zeroable};
use log::debug;

use crate::backend::{Allocation, Backend, BackendError, ResourceId};

/// Largest vertex count addressable by 16-bit indices.
pub const MAX_MESH_VERTICES: u32 = 1 << 16;

/// Upper bound on index triples per mesh.
pub const MAX_MESH_TRIANGLES: u32 = 1 << 20;

/// Vertex layout uploaded to the backend.
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Pod, Zeroable)]
pub struct Vertex {
    pub position: [f32; 3],
    pub normal: [f32; 3],
    /// Diffuse colour, `0xAARRGGBB`.
    pub color: u32,
    /// Two texture coordinate sets.
    pub uv: [[f32; 2]; 2],
}

pub type Triangle = [u16; 3];

#[derive(Debug)]
pub struct Mesh {
    vertices: Vec<Vertex>,
    triangles: Vec<Triangle>,
    buffer: ResourceId,
    dirty: bool,
}

impl Mesh {
    pub(crate) fn allocate(
        backend: &mut dyn Backend,
        max_vertices: u32,
        max_triangles: u32,
    ) -> Result<Self, BackendError> {
        if max_vertices == 0
            || max_vertices > MAX_MESH_VERTICES
            || max_triangles == 0
            || max_triangles > MAX_MESH_TRIANGLES
        {
            return Err(BackendError::Unsupported(format!(
                "mesh of {max_vertices} vertices / {max_triangles} triangles"
            )));
        }
        let vertices = vec![Vertex::default(); max_vertices as usize];
        let triangles = vec![[0; 3]; max_triangles as usize];
        let buffer = backend.allocate(&Allocation::VertexBuffer {
            bytes: Self::byte_len(&vertices, &triangles),
        })?;
        Ok(Self {
            vertices,
            triangles,
            buffer,
            dirty: true,
        })
    }

    fn byte_len(vertices: &[Vertex], triangles: &[Triangle]) -> usize {
        std::mem::size_of_val(vertices) + std::mem::size_of_val(triangles)
    }

    pub fn max_vertices(&self) -> u32 {
        self.vertices.len() as u32
    }

    pub fn max_triangles(&self) -> u32 {
        self.triangles.len() as u32
    }

    pub fn vertex(&self, index: u32) -> Option<&Vertex> {
        self.vertices.get(index as usize)
    }

    /// Returns `false` if `index` is out of range.
    pub fn set_vertex(&mut self, index: u32, vertex: Vertex) -> bool {
        match self.vertices.get_mut(index as usize) {
            Some(slot) => {
                *slot = vertex;
                self.dirty = true;
                true
            }
            None => false,
        }
    }

    pub fn triangle(&self, index: u32) -> Option<Triangle> {
        self.triangles.get(index as usize).copied()
    }

    /// Returns `false` if `index` or any corner is out of range.
    pub fn set_triangle(&mut self, index: u32, corners: Triangle) -> bool {
        let max = self.vertices.len();
        if corners.iter().any(|&c| c as usize >= max) {
            return false;
        }
        match self.triangles.get_mut(index as usize) {
            Some(slot) => {
                *slot = corners;
                self.dirty = true;
                true
            }
            None => false,
        }
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    pub fn buffer(&self) -> ResourceId {
        self.buffer
    }

    /// Push vertices followed by indices to the backend buffer.
    pub fn upload(&mut self, backend: &mut dyn Backend) {
        let mut bytes = Vec::with_capacity(Self::byte_len(&self.vertices, &self.triangles));
        bytes.extend_from_slice(bytemuck::cast_slice(&self.vertices));
        bytes.extend_from_slice(bytemuck::cast_slice(&self.triangles));
        backend.upload(self.buffer, &bytes);
        self.dirty = false;
    }

    /// Re-create the vertex buffer after device loss and re-upload.
    pub fn restore(&mut self, backend: &mut dyn Backend) -> Result<(), BackendError> {
        if backend.is_lost(self.buffer) {
            let buffer = backend.allocate(&Allocation::VertexBuffer {
                bytes: Self::byte_len(&self.vertices, &self.triangles),
            })?;
            backend.release(self.buffer);
            self.buffer = buffer;
        }
        self.upload(backend);
        debug!(
            "restored mesh ({} vertices, {} triangles)",
            self.vertices.len(),
            self.triangles.len()
        );
        Ok(())
    }

    pub(crate) fn release(self, backend: &mut dyn Backend) {
        backend.release(self.buffer);
    }
}

// ===================================================================
// Tests
// ===================================================================
