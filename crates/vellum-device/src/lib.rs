//! GPU device boundary for the Vellum renderer.
//!
//! The renderer never talks to a driver directly. Everything it needs from
//! the hardware goes through the [`RenderDevice`] trait, which speaks a small
//! fixed-function vocabulary: individual render states, per-stage sampler
//! states, stream/index bindings and immediate draw calls.
//!
//! # Overview
//!
//! - [`RenderDevice`] - Object-safe trait implemented by a device backend
//! - [`RenderState`] / [`SamplerState`] - Hardware state values forwarded one at a time
//! - Opaque handles ([`VertexBufferHandle`], [`TextureHandle`], ...) owned by the backend
//! - `MockRenderDevice` - Call-recording implementation for tests (requires `mock` feature)
//!
//! # Example
//!
//! ```rust
//! # #[cfg(feature = "mock")]
//! # {
//! use vellum_device::{MockRenderDevice, RenderDevice, RenderState};
//!
//! let mock = MockRenderDevice::new();
//! mock.set_render_state(RenderState::DepthEnable(false));
//!
//! assert_eq!(mock.count_render_state_sets(), 1);
//! assert_eq!(mock.render_states(), vec![RenderState::DepthEnable(false)]);
//! # }
//! ```
//!
//! Hardware enums that wgpu already names (compare functions, stencil
//! operations, blend factors, address and filter modes, polygon modes) are
//! reused from wgpu rather than redeclared.

pub mod device;
#[cfg(feature = "mock")]
pub mod mock_device;
pub mod types;

pub use device::*;
#[cfg(feature = "mock")]
pub use mock_device::*;
pub use types::*;
