//! Mock implementation of RenderDevice for testing.
//!
//! Records every call without touching a GPU and lets tests steer the
//! device status, capabilities and failure paths.

use glam::Mat4;
use parking_lot::Mutex;
use vellum_core::geometry::Rect;

use crate::{device::RenderDevice, types::*};

/// Records a device call for verification in tests.
#[derive(Debug, Clone, PartialEq)]
pub enum DeviceCall {
    SetRenderState(RenderState),
    SetSamplerState {
        stage: u32,
        state: SamplerState,
    },
    SetTexture {
        stage: u32,
        texture: Option<TextureHandle>,
    },
    SetVertexDeclaration(Option<VertexDeclarationHandle>),
    CreateVertexDeclaration {
        stride: u64,
        attribute_count: usize,
    },
    CreateVertexBuffer {
        size: u64,
    },
    WriteVertexBuffer {
        buffer: VertexBufferHandle,
        offset: u64,
        size: usize,
    },
    ReleaseVertexBuffer(VertexBufferHandle),
    CreateIndexBuffer {
        count: usize,
    },
    ReleaseIndexBuffer(IndexBufferHandle),
    SetStreamSource {
        buffer: Option<VertexBufferHandle>,
        stride: u32,
    },
    SetIndices(Option<IndexBufferHandle>),
    DrawPrimitives {
        style: PrimitiveStyle,
        start_vertex: u32,
        primitive_count: u32,
    },
    DrawIndexedPrimitives {
        style: PrimitiveStyle,
        base_vertex: i32,
        min_index: u32,
        num_vertices: u32,
        start_index: u32,
        primitive_count: u32,
    },
    CreateSurface {
        width: u32,
        height: u32,
        kind: SurfaceKind,
    },
    ReleaseSurface(SurfaceHandle),
    SetRenderTarget {
        color: Option<SurfaceHandle>,
        depth_stencil: Option<SurfaceHandle>,
    },
    SetViewport {
        rect: Rect<i32>,
        min_z: f32,
        max_z: f32,
    },
    SetTransformProjection(Mat4),
    Clear {
        targets: ClearTargets,
        color: wgpu::Color,
        depth: f32,
        stencil: u32,
    },
    BeginScene,
    EndScene,
    Present,
}

impl DeviceCall {
    pub fn is_draw(&self) -> bool {
        matches!(
            self,
            DeviceCall::DrawPrimitives { .. } | DeviceCall::DrawIndexedPrimitives { .. }
        )
    }
}

/// Mock implementation of [`RenderDevice`] for testing.
///
/// # Borrow Checking Pattern: Interior Mutability
///
/// Trait methods take `&self` but must record calls and hand out ids, so all
/// state sits behind `parking_lot::Mutex` (which is `Send + Sync`, unlike
/// `RefCell`).
///
/// # Example
///
/// ```rust
/// use vellum_device::{CooperativeLevel, MockRenderDevice, RenderDevice};
///
/// let mock = MockRenderDevice::new();
/// mock.set_cooperative_level(CooperativeLevel::Lost);
///
/// assert!(mock.present().is_err());
/// assert_eq!(mock.count_presents(), 1);
/// ```
pub struct MockRenderDevice {
    /// Recorded calls for verification
    calls: Mutex<Vec<DeviceCall>>,
    caps: Mutex<DeviceCaps>,
    cooperative_level: Mutex<CooperativeLevel>,
    /// When set, `set_stream_source` and `set_indices` reject binds
    fail_stream_binds: Mutex<bool>,
    next_id: Mutex<u32>,
}

impl MockRenderDevice {
    /// Create a mock device with default capabilities.
    pub fn new() -> Self {
        Self::with_caps(DeviceCaps::default())
    }

    pub fn with_caps(caps: DeviceCaps) -> Self {
        Self {
            calls: Mutex::new(Vec::new()),
            caps: Mutex::new(caps),
            cooperative_level: Mutex::new(CooperativeLevel::Ok),
            fail_stream_binds: Mutex::new(false),
            next_id: Mutex::new(1),
        }
    }

    /// Simulate the device status reported by `check_cooperative_level`.
    pub fn set_cooperative_level(&self, level: CooperativeLevel) {
        *self.cooperative_level.lock() = level;
    }

    pub fn set_caps(&self, caps: DeviceCaps) {
        *self.caps.lock() = caps;
    }

    /// Make subsequent stream and index binds fail.
    pub fn fail_stream_binds(&self, fail: bool) {
        *self.fail_stream_binds.lock() = fail;
    }

    fn next_id(&self) -> u32 {
        let mut id = self.next_id.lock();
        let current = *id;
        *id += 1;
        current
    }

    fn record(&self, call: DeviceCall) {
        self.calls.lock().push(call);
    }

    /// Get a copy of all recorded calls (for test assertions).
    pub fn calls(&self) -> Vec<DeviceCall> {
        self.calls.lock().clone()
    }

    /// Render states in the order they were forwarded.
    pub fn render_states(&self) -> Vec<RenderState> {
        self.calls
            .lock()
            .iter()
            .filter_map(|call| match call {
                DeviceCall::SetRenderState(state) => Some(*state),
                _ => None,
            })
            .collect()
    }

    /// Sampler states forwarded for `stage`, in order.
    pub fn sampler_states(&self, stage: u32) -> Vec<SamplerState> {
        self.calls
            .lock()
            .iter()
            .filter_map(|call| match call {
                DeviceCall::SetSamplerState { stage: s, state } if *s == stage => Some(*state),
                _ => None,
            })
            .collect()
    }

    /// Draw calls in the order they were issued.
    pub fn draws(&self) -> Vec<DeviceCall> {
        self.calls
            .lock()
            .iter()
            .filter(|call| call.is_draw())
            .cloned()
            .collect()
    }

    pub fn count_render_state_sets(&self) -> usize {
        self.calls
            .lock()
            .iter()
            .filter(|call| matches!(call, DeviceCall::SetRenderState(_)))
            .count()
    }

    pub fn count_sampler_state_sets(&self) -> usize {
        self.calls
            .lock()
            .iter()
            .filter(|call| matches!(call, DeviceCall::SetSamplerState { .. }))
            .count()
    }

    pub fn count_draw_calls(&self) -> usize {
        self.calls.lock().iter().filter(|call| call.is_draw()).count()
    }

    pub fn count_viewport_sets(&self) -> usize {
        self.calls
            .lock()
            .iter()
            .filter(|call| matches!(call, DeviceCall::SetViewport { .. }))
            .count()
    }

    pub fn count_presents(&self) -> usize {
        self.calls
            .lock()
            .iter()
            .filter(|call| matches!(call, DeviceCall::Present))
            .count()
    }

    pub fn count_clears(&self) -> usize {
        self.calls
            .lock()
            .iter()
            .filter(|call| matches!(call, DeviceCall::Clear { .. }))
            .count()
    }

    /// Clear recorded calls (useful between test steps).
    pub fn clear_calls(&self) {
        self.calls.lock().clear();
    }

    /// Get total number of recorded calls.
    pub fn call_count(&self) -> usize {
        self.calls.lock().len()
    }

    fn bind_result(&self, operation: &'static str) -> Result<(), DeviceError> {
        if *self.fail_stream_binds.lock() {
            return Err(DeviceError::Rejected {
                operation,
                reason: "injected failure".to_string(),
            });
        }
        Ok(())
    }
}

impl Default for MockRenderDevice {
    fn default() -> Self {
        Self::new()
    }
}

impl RenderDevice for MockRenderDevice {
    fn caps(&self) -> DeviceCaps {
        *self.caps.lock()
    }

    fn check_cooperative_level(&self) -> CooperativeLevel {
        *self.cooperative_level.lock()
    }

    fn set_render_state(&self, state: RenderState) {
        self.record(DeviceCall::SetRenderState(state));
    }

    fn set_sampler_state(&self, stage: u32, state: SamplerState) {
        self.record(DeviceCall::SetSamplerState { stage, state });
    }

    fn set_texture(&self, stage: u32, texture: Option<TextureHandle>) {
        self.record(DeviceCall::SetTexture { stage, texture });
    }

    fn set_vertex_declaration(&self, declaration: Option<VertexDeclarationHandle>) {
        self.record(DeviceCall::SetVertexDeclaration(declaration));
    }

    fn create_vertex_declaration(
        &self,
        stride: u64,
        attributes: &[wgpu::VertexAttribute],
    ) -> Result<VertexDeclarationHandle, DeviceError> {
        self.record(DeviceCall::CreateVertexDeclaration {
            stride,
            attribute_count: attributes.len(),
        });
        Ok(VertexDeclarationHandle(self.next_id()))
    }

    fn create_vertex_buffer(&self, size: u64) -> Result<VertexBufferHandle, DeviceError> {
        self.record(DeviceCall::CreateVertexBuffer { size });
        Ok(VertexBufferHandle(self.next_id()))
    }

    fn write_vertex_buffer(&self, buffer: VertexBufferHandle, offset: u64, data: &[u8]) {
        self.record(DeviceCall::WriteVertexBuffer {
            buffer,
            offset,
            size: data.len(),
        });
    }

    fn release_vertex_buffer(&self, buffer: VertexBufferHandle) {
        self.record(DeviceCall::ReleaseVertexBuffer(buffer));
    }

    fn create_index_buffer(&self, indices: &[u16]) -> Result<IndexBufferHandle, DeviceError> {
        self.record(DeviceCall::CreateIndexBuffer {
            count: indices.len(),
        });
        Ok(IndexBufferHandle(self.next_id()))
    }

    fn release_index_buffer(&self, buffer: IndexBufferHandle) {
        self.record(DeviceCall::ReleaseIndexBuffer(buffer));
    }

    fn set_stream_source(
        &self,
        buffer: Option<VertexBufferHandle>,
        stride: u32,
    ) -> Result<(), DeviceError> {
        self.record(DeviceCall::SetStreamSource { buffer, stride });
        self.bind_result("set_stream_source")
    }

    fn set_indices(&self, buffer: Option<IndexBufferHandle>) -> Result<(), DeviceError> {
        self.record(DeviceCall::SetIndices(buffer));
        self.bind_result("set_indices")
    }

    fn draw_primitives(&self, style: PrimitiveStyle, start_vertex: u32, primitive_count: u32) {
        self.record(DeviceCall::DrawPrimitives {
            style,
            start_vertex,
            primitive_count,
        });
    }

    fn draw_indexed_primitives(
        &self,
        style: PrimitiveStyle,
        base_vertex: i32,
        min_index: u32,
        num_vertices: u32,
        start_index: u32,
        primitive_count: u32,
    ) {
        self.record(DeviceCall::DrawIndexedPrimitives {
            style,
            base_vertex,
            min_index,
            num_vertices,
            start_index,
            primitive_count,
        });
    }

    fn create_surface(
        &self,
        width: u32,
        height: u32,
        kind: SurfaceKind,
    ) -> Result<SurfaceHandle, DeviceError> {
        self.record(DeviceCall::CreateSurface {
            width,
            height,
            kind,
        });
        Ok(SurfaceHandle(self.next_id()))
    }

    fn release_surface(&self, surface: SurfaceHandle) {
        self.record(DeviceCall::ReleaseSurface(surface));
    }

    fn set_render_target(&self, color: Option<SurfaceHandle>, depth_stencil: Option<SurfaceHandle>) {
        self.record(DeviceCall::SetRenderTarget {
            color,
            depth_stencil,
        });
    }

    fn set_viewport(&self, rect: Rect<i32>, min_z: f32, max_z: f32) {
        self.record(DeviceCall::SetViewport { rect, min_z, max_z });
    }

    fn set_transform_projection(&self, matrix: Mat4) {
        self.record(DeviceCall::SetTransformProjection(matrix));
    }

    fn clear(&self, targets: ClearTargets, color: wgpu::Color, depth: f32, stencil: u32) {
        self.record(DeviceCall::Clear {
            targets,
            color,
            depth,
            stencil,
        });
    }

    fn begin_scene(&self) {
        self.record(DeviceCall::BeginScene);
    }

    fn end_scene(&self) {
        self.record(DeviceCall::EndScene);
    }

    fn present(&self) -> Result<(), DeviceError> {
        self.record(DeviceCall::Present);
        match *self.cooperative_level.lock() {
            CooperativeLevel::Ok => Ok(()),
            CooperativeLevel::Lost => Err(DeviceError::Lost),
            CooperativeLevel::NeedsReset => Err(DeviceError::NotReset),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mock_records_render_states() {
        let mock = MockRenderDevice::new();

        mock.set_render_state(RenderState::CullMode(CullMode::None));
        mock.set_render_state(RenderState::Dither(true));

        assert_eq!(mock.count_render_state_sets(), 2);
        assert_eq!(
            mock.render_states(),
            vec![
                RenderState::CullMode(CullMode::None),
                RenderState::Dither(true)
            ]
        );
    }

    #[test]
    fn test_mock_sampler_states_by_stage() {
        let mock = MockRenderDevice::new();

        mock.set_sampler_state(0, SamplerState::MagFilter(FilterMode::Linear));
        mock.set_sampler_state(1, SamplerState::MagFilter(FilterMode::Nearest));

        assert_eq!(
            mock.sampler_states(1),
            vec![SamplerState::MagFilter(FilterMode::Nearest)]
        );
        assert_eq!(mock.count_sampler_state_sets(), 2);
    }

    #[test]
    fn test_mock_handles_are_unique() {
        let mock = MockRenderDevice::new();

        let a = mock.create_vertex_buffer(64).unwrap();
        let b = mock.create_vertex_buffer(64).unwrap();
        let c = mock.create_index_buffer(&[0, 1, 2]).unwrap();

        assert_ne!(a, b);
        assert_ne!(a.id(), c.id());
    }

    #[test]
    fn test_mock_injected_bind_failure() {
        let mock = MockRenderDevice::new();
        mock.fail_stream_binds(true);

        let err = mock.set_stream_source(None, 24).unwrap_err();
        assert!(matches!(err, DeviceError::Rejected { operation: "set_stream_source", .. }));
        assert!(mock.set_indices(None).is_err());
    }

    #[test]
    fn test_mock_present_reports_status() {
        let mock = MockRenderDevice::new();
        assert!(mock.present().is_ok());

        mock.set_cooperative_level(CooperativeLevel::NeedsReset);
        assert_eq!(mock.present(), Err(DeviceError::NotReset));
        assert_eq!(mock.count_presents(), 2);
    }

    #[test]
    fn test_clear_calls() {
        let mock = MockRenderDevice::new();
        mock.begin_scene();
        mock.end_scene();
        assert_eq!(mock.call_count(), 2);

        mock.clear_calls();
        assert_eq!(mock.call_count(), 0);
    }
}
