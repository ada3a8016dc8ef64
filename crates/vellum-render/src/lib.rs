//! Vellum Render - stateful batched 2D rendering.
//!
//! # Overview
//!
//! - [`RenderStateCache`] / [`SamplerStateCache`] - Shadow copies of device state; only changes reach the device
//! - [`VisualStateTraits`] - Per-drawable attributes inheriting live from a [`DefaultsContext`]
//! - [`GeometryBatch`] - Vertex accumulation with a precomputed quad index pattern
//! - [`BatchedRenderer`] - Decides when to flush, applies drawable state, issues draws
//! - [`DeviceLifecycleManager`] - Lost/reset protocol and resource owner registry
//! - [`RenderTarget`] - Destination surface with its default view and projection
//!
//! # Example
//!
//! ```rust
//! # #[cfg(feature = "mock")]
//! # {
//! use std::sync::Arc;
//! use glam::Vec2;
//! use vellum_device::MockRenderDevice;
//! use vellum_render::*;
//!
//! let lifecycle = DeviceLifecycleManager::new();
//! let defaults = DefaultsContext::new();
//! let mut renderer =
//!     BatchedRenderer::new(lifecycle.clone(), defaults.clone(), RendererDescriptor::default())?;
//! renderer.attach_device(Arc::new(MockRenderDevice::new()));
//!
//! let target = RenderTarget::new(lifecycle, defaults.clone(), RenderTargetDescriptor::default())?;
//!
//! renderer.begin_rendering()?;
//! target.update(&mut renderer)?;
//! Renderable::sprite(&defaults, Sprite::new(Vec2::ZERO, Vec2::splat(32.0))).draw(&mut renderer, false)?;
//! renderer.end_rendering()?;
//! renderer.flip()?;
//!
//! assert_eq!(renderer.stats().draw_calls, 1);
//! # }
//! # Ok::<(), vellum_render::RenderError>(())
//! ```

pub mod batch;
pub mod blend;
pub mod color;
pub mod drawable;
pub mod error;
pub mod lifecycle;
pub mod render_states;
pub mod renderer;
pub mod sampler_states;
pub mod shader;
pub mod target;
pub mod viewport;
pub mod visual_state;

pub use batch::{DEFAULT_VERTEX_CAPACITY, GeometryBatch, MAX_VERTEX_CAPACITY, Vertex, quad_indices};
pub use blend::{Blending, BlendingMode};
pub use color::Color;
pub use drawable::{DrawPayload, Drawable, Glyph, PrimitiveBatch, Renderable, Sprite, TextRun};
pub use error::{RenderError, Result};
pub use lifecycle::{DeviceLifecycleManager, DeviceResource, DeviceStatus, RegistrationId};
pub use render_states::{RenderStateCache, RenderStateValues};
pub use renderer::{BatchedRenderer, RenderStats, RendererDescriptor};
pub use sampler_states::{SamplerStageState, SamplerStateCache};
pub use shader::{ShaderBinding, ShaderEffect, ShaderId};
pub use target::{RenderTarget, RenderTargetDescriptor};
pub use viewport::{Viewport, ortho_projection};
pub use visual_state::{DefaultsContext, InheritFlags, Smoothing, VisualAttributes, VisualStateTraits};
