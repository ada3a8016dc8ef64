//! CPU-side vertex accumulation for batched draws.

use bytemuck::{Pod, Zeroable};
use vellum_device::{
    IndexBufferHandle, PrimitiveStyle, RenderDevice, VertexBufferHandle,
};

use crate::error::{RenderError, Result};

/// Vertex capacity used when none is requested.
pub const DEFAULT_VERTEX_CAPACITY: usize = 4000;

/// Largest capacity addressable with 16-bit indices.
pub const MAX_VERTEX_CAPACITY: usize = u16::MAX as usize + 1;

/// Batched vertex: position, packed ARGB diffuse color, texture coordinate.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct Vertex {
    pub position: [f32; 3],
    pub color: u32,
    pub uv: [f32; 2],
}

impl Vertex {
    pub const ATTRIBUTES: [wgpu::VertexAttribute; 3] = wgpu::vertex_attr_array![
        // location 0: position (vec3)
        0 => Float32x3,
        // location 1: color (packed argb)
        1 => Uint32,
        // location 2: uv (vec2)
        2 => Float32x2,
    ];

    /// Size of a vertex in bytes.
    pub const STRIDE: u64 = std::mem::size_of::<Self>() as u64;

    pub const fn new(position: [f32; 3], color: u32, uv: [f32; 2]) -> Self {
        Self {
            position,
            color,
            uv,
        }
    }
}

/// Two triangles per quad: `[4i+2, 4i+1, 4i, 4i, 4i+3, 4i+2]`.
pub fn quad_indices(vertex_capacity: usize) -> Vec<u16> {
    let quads = vertex_capacity / 4;
    let mut indices = Vec::with_capacity(quads * 6);
    for quad in 0..quads {
        let base = (quad * 4) as u16;
        indices.extend_from_slice(&[base + 2, base + 1, base, base, base + 3, base + 2]);
    }
    indices
}

/// Fixed-capacity vertex store plus the precomputed quad index pattern.
///
/// The batch tracks a write offset and the number of vertices written
/// since the last flush. It never flushes by itself: callers check
/// [`GeometryBatch::would_overflow`] and flush first.
///
/// The store rewinds rather than rings: every flush resets both the offset
/// and the written count, so each draw starts at vertex 0 of the buffer.
#[derive(Debug)]
pub struct GeometryBatch {
    vertices: Vec<Vertex>,
    indices: Vec<u16>,
    offset: usize,
    written: usize,
    style: PrimitiveStyle,
    uses_indices: bool,
    vertex_buffer: Option<VertexBufferHandle>,
    index_buffer: Option<IndexBufferHandle>,
}

impl GeometryBatch {
    pub fn new(vertex_capacity: usize) -> Result<Self> {
        let mut batch = Self {
            vertices: Vec::new(),
            indices: Vec::new(),
            offset: 0,
            written: 0,
            style: PrimitiveStyle::TriangleList,
            uses_indices: true,
            vertex_buffer: None,
            index_buffer: None,
        };
        batch.reserve(vertex_capacity)?;
        Ok(batch)
    }

    /// Reallocate storage for `vertex_capacity` vertices and rebuild the index pattern.
    ///
    /// Unflushed vertices are discarded. Device buffers must be released
    /// beforehand; they are recreated at the new size on the next upload.
    pub fn reserve(&mut self, vertex_capacity: usize) -> Result<()> {
        Self::check_capacity(vertex_capacity)?;

        self.vertices = vec![Vertex::zeroed(); vertex_capacity];
        self.indices = quad_indices(vertex_capacity);
        self.reset();
        Ok(())
    }

    /// Capacity must be a non-zero multiple of 4 addressable by 16-bit indices.
    pub fn check_capacity(vertex_capacity: usize) -> Result<()> {
        if vertex_capacity == 0
            || vertex_capacity % 4 != 0
            || vertex_capacity > MAX_VERTEX_CAPACITY
        {
            return Err(RenderError::InvalidBatchCapacity {
                requested: vertex_capacity,
            });
        }
        Ok(())
    }

    #[inline]
    pub fn capacity(&self) -> usize {
        self.vertices.len()
    }

    /// Start of the pending vertices. Always 0 after a reset.
    #[inline]
    pub fn offset(&self) -> usize {
        self.offset
    }

    #[inline]
    pub fn written(&self) -> usize {
        self.written
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.written == 0
    }

    /// Index count for the written vertices, assuming quads.
    #[inline]
    pub fn indices_written(&self) -> usize {
        self.written * 6 / 4
    }

    #[inline]
    pub fn indices(&self) -> &[u16] {
        &self.indices
    }

    #[inline]
    pub fn primitive_style(&self) -> PrimitiveStyle {
        self.style
    }

    #[inline]
    pub fn uses_indices(&self) -> bool {
        self.uses_indices
    }

    pub fn set_primitive(&mut self, style: PrimitiveStyle, uses_indices: bool) {
        self.style = style;
        self.uses_indices = uses_indices;
    }

    /// Whether `count` more vertices would run past the end of the store.
    #[inline]
    pub fn would_overflow(&self, count: usize) -> bool {
        self.offset + self.written + count > self.capacity()
    }

    /// Append vertices at `offset + written`.
    pub fn write(&mut self, vertices: &[Vertex]) -> Result<()> {
        if self.would_overflow(vertices.len()) {
            return Err(RenderError::BatchOverflow {
                requested: vertices.len(),
                capacity: self.capacity() - self.offset - self.written,
            });
        }
        let start = self.offset + self.written;
        self.vertices[start..start + vertices.len()].copy_from_slice(vertices);
        self.written += vertices.len();
        Ok(())
    }

    /// Vertices written since the last reset.
    pub fn pending(&self) -> &[Vertex] {
        &self.vertices[self.offset..self.offset + self.written]
    }

    /// Rewind the write cursor. Called after every flush and on device loss.
    pub fn reset(&mut self) {
        self.offset = 0;
        self.written = 0;
    }

    #[inline]
    pub fn has_device_buffers(&self) -> bool {
        self.vertex_buffer.is_some() || self.index_buffer.is_some()
    }

    /// Create the device buffers if they do not exist yet.
    pub fn ensure_buffers(
        &mut self,
        device: &dyn RenderDevice,
    ) -> Result<(VertexBufferHandle, IndexBufferHandle)> {
        let vertex_buffer = match self.vertex_buffer {
            Some(buffer) => buffer,
            None => {
                let size = self.capacity() as u64 * Vertex::STRIDE;
                let buffer = device
                    .create_vertex_buffer(size)
                    .map_err(|source| RenderError::ResourceCreation { source })?;
                self.vertex_buffer = Some(buffer);
                buffer
            }
        };
        let index_buffer = match self.index_buffer {
            Some(buffer) => buffer,
            None => {
                let buffer = device
                    .create_index_buffer(&self.indices)
                    .map_err(|source| RenderError::ResourceCreation { source })?;
                self.index_buffer = Some(buffer);
                buffer
            }
        };
        Ok((vertex_buffer, index_buffer))
    }

    /// Copy the pending vertices into `buffer` at the current offset.
    pub fn upload(&self, device: &dyn RenderDevice, buffer: VertexBufferHandle) {
        let offset = self.offset as u64 * Vertex::STRIDE;
        device.write_vertex_buffer(buffer, offset, bytemuck::cast_slice(self.pending()));
    }

    /// Give the device buffers back. The CPU store is kept.
    pub fn release(&mut self, device: &dyn RenderDevice) {
        if let Some(buffer) = self.vertex_buffer.take() {
            device.release_vertex_buffer(buffer);
        }
        if let Some(buffer) = self.index_buffer.take() {
            device.release_index_buffer(buffer);
        }
    }
}
