//! Value types shared between the renderer and a device backend.

use std::fmt;

use vellum_core::geometry::Rect;
pub use wgpu::{AddressMode, BlendFactor, CompareFunction, FilterMode, PolygonMode, StencilOperation};

macro_rules! handle {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        pub struct $name(pub u32);

        impl $name {
            #[inline]
            pub fn id(self) -> u32 {
                self.0
            }
        }
    };
}

handle!(
    /// A vertex buffer allocated by the device.
    VertexBufferHandle
);
handle!(
    /// A 16-bit index buffer allocated by the device.
    IndexBufferHandle
);
handle!(
    /// A texture the device can sample from.
    TextureHandle
);
handle!(
    /// A vertex layout description registered with the device.
    VertexDeclarationHandle
);
handle!(
    /// A color or depth/stencil surface that can be rendered into.
    SurfaceHandle
);

/// Face culling mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CullMode {
    None,
    Clockwise,
    CounterClockwise,
}

/// Vertex color interpolation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ShadeMode {
    Flat,
    Gouraud,
}

/// Fixed-function texture stage combine operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TextureOp {
    Disable,
    SelectArg1,
    Modulate,
    Add,
}

/// Operand selector for a texture stage combine operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TextureArg {
    /// Interpolated vertex color.
    Diffuse,
    /// Sampled texel.
    Texture,
    /// Result of the previous stage.
    Current,
}

/// How a run of vertices is assembled into primitives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PrimitiveStyle {
    PointList,
    LineList,
    LineStrip,
    TriangleList,
    TriangleStrip,
    TriangleFan,
}

impl PrimitiveStyle {
    /// Number of primitives described by `count` vertices (or indices).
    pub fn primitive_count(self, count: u32) -> u32 {
        match self {
            PrimitiveStyle::PointList => count,
            PrimitiveStyle::LineList => count / 2,
            PrimitiveStyle::LineStrip => count.saturating_sub(1),
            PrimitiveStyle::TriangleList => count / 3,
            PrimitiveStyle::TriangleStrip | PrimitiveStyle::TriangleFan => count.saturating_sub(2),
        }
    }

    /// Connected styles cannot be concatenated with another drawable's vertices.
    pub fn is_connected(self) -> bool {
        matches!(
            self,
            PrimitiveStyle::LineStrip | PrimitiveStyle::TriangleStrip | PrimitiveStyle::TriangleFan
        )
    }

    /// Translate to the closest wgpu topology.
    pub fn topology(self) -> PrimitiveTopologyTranslation {
        let (topology, needs_triangle_fan_emulation) = match self {
            PrimitiveStyle::PointList => (wgpu::PrimitiveTopology::PointList, false),
            PrimitiveStyle::LineList => (wgpu::PrimitiveTopology::LineList, false),
            PrimitiveStyle::LineStrip => (wgpu::PrimitiveTopology::LineStrip, false),
            PrimitiveStyle::TriangleList => (wgpu::PrimitiveTopology::TriangleList, false),
            PrimitiveStyle::TriangleStrip => (wgpu::PrimitiveTopology::TriangleStrip, false),
            // WebGPU has no fans.
            PrimitiveStyle::TriangleFan => (wgpu::PrimitiveTopology::TriangleList, true),
        };
        PrimitiveTopologyTranslation {
            topology,
            needs_triangle_fan_emulation,
        }
    }
}

impl fmt::Display for PrimitiveStyle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            PrimitiveStyle::PointList => "point_list",
            PrimitiveStyle::LineList => "line_list",
            PrimitiveStyle::LineStrip => "line_strip",
            PrimitiveStyle::TriangleList => "triangle_list",
            PrimitiveStyle::TriangleStrip => "triangle_strip",
            PrimitiveStyle::TriangleFan => "triangle_fan",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PrimitiveTopologyTranslation {
    pub topology: wgpu::PrimitiveTopology,
    /// Fans must be expanded into triangle lists on the CPU.
    pub needs_triangle_fan_emulation: bool,
}

/// A single pipeline toggle forwarded to the device.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum RenderState {
    CullMode(CullMode),
    PointSize(f32),
    NormalizeNormals(bool),
    DepthEnable(bool),
    DepthWrite(bool),
    DepthBias(i32),
    DepthCompare(CompareFunction),
    Lighting(bool),
    SpecularEnable(bool),
    ShadeMode(ShadeMode),
    FillMode(PolygonMode),
    AlphaBlendEnable(bool),
    SourceBlend(BlendFactor),
    DestinationBlend(BlendFactor),
    AlphaTestEnable(bool),
    AlphaFunction(CompareFunction),
    AlphaReference(u32),
    LastPixel(bool),
    ScissorTestEnable(bool),
    ScissorRect(Rect<i32>),
    StencilCompare(CompareFunction),
    StencilEnable(bool),
    StencilFail(StencilOperation),
    StencilMask(u32),
    StencilPass(StencilOperation),
    StencilZFail(StencilOperation),
    StencilReference(u32),
    Dither(bool),
}

/// A single texture stage setting forwarded to the device.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SamplerState {
    AddressU(AddressMode),
    AddressV(AddressMode),
    MagFilter(FilterMode),
    MinFilter(FilterMode),
    ColorOp(TextureOp),
    ColorArg1(TextureArg),
    ColorArg2(TextureArg),
    AlphaOp(TextureOp),
    AlphaArg1(TextureArg),
    AlphaArg2(TextureArg),
}

/// What the device can do. Queried once when the device is attached.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DeviceCaps {
    pub supports_scissor_test: bool,
    pub max_point_size: f32,
    pub max_texture_stages: u32,
}

impl Default for DeviceCaps {
    fn default() -> Self {
        Self {
            supports_scissor_test: true,
            max_point_size: 64.0,
            max_texture_stages: 8,
        }
    }
}

/// Result of polling the device for usability.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CooperativeLevel {
    Ok,
    /// The device is lost and cannot be reset yet.
    Lost,
    /// The device is lost but can be reset now.
    NeedsReset,
}

/// Surface role requested from [`crate::RenderDevice::create_surface`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SurfaceKind {
    Color,
    DepthStencil { stencil: bool },
}

bitflags::bitflags! {
    /// Buffers affected by a clear.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct ClearTargets: u8 {
        const BACK_BUFFER = 1 << 0;
        const DEPTH = 1 << 1;
        const STENCIL = 1 << 2;
    }
}

/// Errors reported by a device backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeviceError {
    /// The device is lost and cannot be used until it is reset.
    Lost,
    /// The device was lost and is waiting for a reset.
    NotReset,
    /// The device refused an operation.
    Rejected {
        operation: &'static str,
        reason: String,
    },
}

impl DeviceError {
    /// Whether this error means the device needs the lost/reset protocol.
    pub fn is_device_lost(&self) -> bool {
        matches!(self, DeviceError::Lost | DeviceError::NotReset)
    }
}

impl fmt::Display for DeviceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeviceError::Lost => write!(f, "Device lost"),
            DeviceError::NotReset => write!(f, "Device lost and not yet reset"),
            DeviceError::Rejected { operation, reason } => {
                write!(f, "Device rejected {}: {}", operation, reason)
            }
        }
    }
}

impl std::error::Error for DeviceError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn primitive_counts_follow_topology() {
        assert_eq!(PrimitiveStyle::PointList.primitive_count(10), 10);
        assert_eq!(PrimitiveStyle::LineList.primitive_count(10), 5);
        assert_eq!(PrimitiveStyle::LineStrip.primitive_count(10), 9);
        assert_eq!(PrimitiveStyle::TriangleList.primitive_count(12), 4);
        assert_eq!(PrimitiveStyle::TriangleStrip.primitive_count(6), 4);
        assert_eq!(PrimitiveStyle::TriangleFan.primitive_count(6), 4);
    }

    #[test]
    fn degenerate_counts_do_not_underflow() {
        assert_eq!(PrimitiveStyle::LineStrip.primitive_count(0), 0);
        assert_eq!(PrimitiveStyle::TriangleFan.primitive_count(1), 0);
    }

    #[test]
    fn fans_need_emulation() {
        let fan = PrimitiveStyle::TriangleFan.topology();
        assert_eq!(fan.topology, wgpu::PrimitiveTopology::TriangleList);
        assert!(fan.needs_triangle_fan_emulation);
        assert!(!PrimitiveStyle::TriangleStrip.topology().needs_triangle_fan_emulation);
    }

    #[test]
    fn display_uses_snake_case() {
        assert_eq!(PrimitiveStyle::TriangleStrip.to_string(), "triangle_strip");
    }

    #[test]
    fn lost_errors_are_classified() {
        assert!(DeviceError::Lost.is_device_lost());
        assert!(!DeviceError::Rejected {
            operation: "set_stream_source",
            reason: "bad stride".into()
        }
        .is_device_lost());
    }
}
