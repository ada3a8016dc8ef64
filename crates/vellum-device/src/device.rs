//! Trait abstracting the GPU device consumed by the renderer.

use glam::Mat4;
use vellum_core::geometry::Rect;

use crate::types::*;

/// Immediate-mode device interface.
///
/// # Borrow Checking Pattern
///
/// Methods take `&self` so one device can be shared through an
/// `Arc<dyn RenderDevice>` by the lifecycle manager, the renderer and every
/// resource owner. Backends keep their own mutable state behind interior
/// mutability.
///
/// # Failure model
///
/// State setters and draw calls are fire-and-forget. Only operations that
/// bind or allocate resources, and `present`, can fail. Callers are expected
/// to check usability before touching the device at all.
pub trait RenderDevice: Send + Sync {
    // Capabilities and status

    fn caps(&self) -> DeviceCaps;

    /// Poll whether the device can currently be used.
    fn check_cooperative_level(&self) -> CooperativeLevel;

    // Pipeline state

    fn set_render_state(&self, state: RenderState);

    fn set_sampler_state(&self, stage: u32, state: SamplerState);

    fn set_texture(&self, stage: u32, texture: Option<TextureHandle>);

    fn set_vertex_declaration(&self, declaration: Option<VertexDeclarationHandle>);

    // Geometry

    fn create_vertex_declaration(
        &self,
        stride: u64,
        attributes: &[wgpu::VertexAttribute],
    ) -> Result<VertexDeclarationHandle, DeviceError>;

    fn create_vertex_buffer(&self, size: u64) -> Result<VertexBufferHandle, DeviceError>;

    fn write_vertex_buffer(&self, buffer: VertexBufferHandle, offset: u64, data: &[u8]);

    fn release_vertex_buffer(&self, buffer: VertexBufferHandle);

    fn create_index_buffer(&self, indices: &[u16]) -> Result<IndexBufferHandle, DeviceError>;

    fn release_index_buffer(&self, buffer: IndexBufferHandle);

    fn set_stream_source(
        &self,
        buffer: Option<VertexBufferHandle>,
        stride: u32,
    ) -> Result<(), DeviceError>;

    fn set_indices(&self, buffer: Option<IndexBufferHandle>) -> Result<(), DeviceError>;

    fn draw_primitives(&self, style: PrimitiveStyle, start_vertex: u32, primitive_count: u32);

    fn draw_indexed_primitives(
        &self,
        style: PrimitiveStyle,
        base_vertex: i32,
        min_index: u32,
        num_vertices: u32,
        start_index: u32,
        primitive_count: u32,
    );

    // Targets and frame

    fn create_surface(
        &self,
        width: u32,
        height: u32,
        kind: SurfaceKind,
    ) -> Result<SurfaceHandle, DeviceError>;

    fn release_surface(&self, surface: SurfaceHandle);

    fn set_render_target(&self, color: Option<SurfaceHandle>, depth_stencil: Option<SurfaceHandle>);

    fn set_viewport(&self, rect: Rect<i32>, min_z: f32, max_z: f32);

    fn set_transform_projection(&self, matrix: Mat4);

    fn clear(&self, targets: ClearTargets, color: wgpu::Color, depth: f32, stencil: u32);

    fn begin_scene(&self);

    fn end_scene(&self);

    fn present(&self) -> Result<(), DeviceError>;
}
