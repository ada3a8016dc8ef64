//! Shared fixtures for renderer integration tests.

#![allow(dead_code)]

use std::sync::Arc;

use glam::Vec2;
use vellum_device::{DeviceCaps, MockRenderDevice, PrimitiveStyle};
use vellum_render::*;

pub struct Harness {
    pub lifecycle: Arc<DeviceLifecycleManager>,
    pub defaults: DefaultsContext,
    pub renderer: BatchedRenderer,
    pub mock: Arc<MockRenderDevice>,
    pub target: Arc<RenderTarget>,
}

impl Harness {
    pub fn new() -> Self {
        Self::build(DeviceCaps::default(), DEFAULT_VERTEX_CAPACITY)
    }

    pub fn with_caps(caps: DeviceCaps) -> Self {
        Self::build(caps, DEFAULT_VERTEX_CAPACITY)
    }

    pub fn with_capacity(vertex_capacity: usize) -> Self {
        Self::build(DeviceCaps::default(), vertex_capacity)
    }

    /// Renderer with an attached mock device and an active 800x600 target.
    fn build(caps: DeviceCaps, vertex_capacity: usize) -> Self {
        let lifecycle = DeviceLifecycleManager::new();
        let defaults = DefaultsContext::new();
        let mut renderer = BatchedRenderer::new(
            lifecycle.clone(),
            defaults.clone(),
            RendererDescriptor {
                vertex_capacity,
                label: Some("test"),
            },
        )
        .unwrap();

        let mock = Arc::new(MockRenderDevice::with_caps(caps));
        renderer.attach_device(mock.clone());

        let target = RenderTarget::new(
            lifecycle.clone(),
            defaults.clone(),
            RenderTargetDescriptor {
                label: Some("backbuffer"),
                ..Default::default()
            },
        )
        .unwrap();
        target.set_active(&mut renderer).unwrap();
        mock.clear_calls();

        Self {
            lifecycle,
            defaults,
            renderer,
            mock,
            target,
        }
    }

    pub fn sprite(&self) -> Renderable {
        Renderable::sprite(&self.defaults, Sprite::new(Vec2::ZERO, Vec2::splat(16.0)))
    }

    pub fn sprite_at(&self, x: f32, y: f32) -> Renderable {
        Renderable::sprite(&self.defaults, Sprite::new(Vec2::new(x, y), Vec2::splat(16.0)))
    }

    pub fn primitive(&self, style: PrimitiveStyle, count: usize) -> Renderable {
        Renderable::primitive(&self.defaults, style, vertices(count))
    }
}

pub fn vertices(count: usize) -> Vec<Vertex> {
    (0..count)
        .map(|i| Vertex::new([i as f32, 0.0, 0.0], Color::WHITE.to_packed_argb(), [0.0, 0.0]))
        .collect()
}

pub fn no_scissor() -> DeviceCaps {
    DeviceCaps {
        supports_scissor_test: false,
        ..Default::default()
    }
}
