//! Shadow cache for global pipeline toggles.
//!
//! Every setter compares against the mirrored value first. On a change the
//! value is forwarded to the device when it is usable, and the mirror is
//! updated either way, so [`RenderStateCache::apply_all`] can replay the
//! exact state after a reset.

use std::sync::Arc;

use vellum_core::geometry::Rect;
use vellum_core::profiling::profile_function;
use vellum_device::{
    BlendFactor, CompareFunction, CullMode, PolygonMode, RenderState, ShadeMode, StencilOperation,
};

use crate::lifecycle::DeviceLifecycleManager;

/// Mirrored value of every render state the cache manages.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RenderStateValues {
    pub cull_mode: CullMode,
    pub point_size: f32,
    pub normalize_normals: bool,
    pub depth_enable: bool,
    pub depth_write: bool,
    pub depth_bias: i32,
    pub depth_compare: CompareFunction,
    pub lighting: bool,
    pub specular: bool,
    pub shade_mode: ShadeMode,
    pub fill_mode: PolygonMode,
    pub alpha_blend_enable: bool,
    pub source_blend: BlendFactor,
    pub destination_blend: BlendFactor,
    pub alpha_test_enable: bool,
    pub alpha_function: CompareFunction,
    pub alpha_reference: u32,
    pub last_pixel: bool,
    pub scissor_enable: bool,
    pub scissor_rect: Rect<i32>,
    pub stencil_compare: CompareFunction,
    pub stencil_enable: bool,
    pub stencil_fail: StencilOperation,
    pub stencil_mask: u32,
    pub stencil_pass: StencilOperation,
    pub stencil_zfail: StencilOperation,
    pub stencil_reference: u32,
    pub dither: bool,
}

impl Default for RenderStateValues {
    /// Device power-on state.
    fn default() -> Self {
        Self {
            cull_mode: CullMode::Clockwise,
            point_size: 1.0,
            normalize_normals: false,
            depth_enable: true,
            depth_write: true,
            depth_bias: 0,
            depth_compare: CompareFunction::LessEqual,
            lighting: true,
            specular: false,
            shade_mode: ShadeMode::Gouraud,
            fill_mode: PolygonMode::Fill,
            alpha_blend_enable: false,
            source_blend: BlendFactor::One,
            destination_blend: BlendFactor::Zero,
            alpha_test_enable: false,
            alpha_function: CompareFunction::Always,
            alpha_reference: 0,
            last_pixel: true,
            scissor_enable: false,
            scissor_rect: Rect::EMPTY,
            stencil_compare: CompareFunction::Always,
            stencil_enable: false,
            stencil_fail: StencilOperation::Replace,
            stencil_mask: u32::MAX,
            stencil_pass: StencilOperation::Keep,
            stencil_zfail: StencilOperation::Replace,
            stencil_reference: 0,
            dither: false,
        }
    }
}

impl RenderStateValues {
    /// Every value as a device state, in replay order.
    ///
    /// Enables come before the values they gate so the device never drops a
    /// dependent setting.
    pub fn replay_order(&self) -> [RenderState; 28] {
        [
            RenderState::CullMode(self.cull_mode),
            RenderState::PointSize(self.point_size),
            RenderState::NormalizeNormals(self.normalize_normals),
            RenderState::DepthEnable(self.depth_enable),
            RenderState::DepthWrite(self.depth_write),
            RenderState::DepthBias(self.depth_bias),
            RenderState::DepthCompare(self.depth_compare),
            RenderState::Lighting(self.lighting),
            RenderState::SpecularEnable(self.specular),
            RenderState::ShadeMode(self.shade_mode),
            RenderState::FillMode(self.fill_mode),
            RenderState::AlphaBlendEnable(self.alpha_blend_enable),
            RenderState::SourceBlend(self.source_blend),
            RenderState::DestinationBlend(self.destination_blend),
            RenderState::AlphaTestEnable(self.alpha_test_enable),
            RenderState::AlphaFunction(self.alpha_function),
            RenderState::AlphaReference(self.alpha_reference),
            RenderState::LastPixel(self.last_pixel),
            RenderState::ScissorTestEnable(self.scissor_enable),
            RenderState::ScissorRect(self.scissor_rect),
            RenderState::StencilCompare(self.stencil_compare),
            RenderState::StencilEnable(self.stencil_enable),
            RenderState::StencilFail(self.stencil_fail),
            RenderState::StencilMask(self.stencil_mask),
            RenderState::StencilPass(self.stencil_pass),
            RenderState::StencilZFail(self.stencil_zfail),
            RenderState::StencilReference(self.stencil_reference),
            RenderState::Dither(self.dither),
        ]
    }
}

macro_rules! mirrored_state {
    ($(#[$meta:meta])* $get:ident, $set:ident, $field:ident: $ty:ty => $variant:ident) => {
        $(#[$meta])*
        #[inline]
        pub fn $get(&self) -> $ty {
            self.values.$field
        }

        pub fn $set(&mut self, value: $ty) {
            if self.values.$field == value {
                return;
            }
            self.forward(RenderState::$variant(value));
            self.values.$field = value;
        }
    };
}

pub struct RenderStateCache {
    lifecycle: Arc<DeviceLifecycleManager>,
    values: RenderStateValues,
}

impl RenderStateCache {
    pub fn new(lifecycle: Arc<DeviceLifecycleManager>) -> Self {
        Self {
            lifecycle,
            values: RenderStateValues::default(),
        }
    }

    /// All mirrored values.
    #[inline]
    pub fn values(&self) -> &RenderStateValues {
        &self.values
    }

    fn forward(&self, state: RenderState) {
        if let Some(device) = self.lifecycle.usable_device() {
            device.set_render_state(state);
        }
    }

    /// Forward every mirrored value, changed or not, in a fixed order.
    pub fn apply_all(&self) {
        profile_function!();
        let Some(device) = self.lifecycle.usable_device() else {
            return;
        };
        for state in self.values.replay_order() {
            device.set_render_state(state);
        }
    }

    mirrored_state!(cull_mode, set_cull_mode, cull_mode: CullMode => CullMode);
    mirrored_state!(normalize_normals, set_normalize_normals, normalize_normals: bool => NormalizeNormals);
    mirrored_state!(depth_enabled, set_depth_enabled, depth_enable: bool => DepthEnable);
    mirrored_state!(depth_write_enabled, set_depth_write_enabled, depth_write: bool => DepthWrite);
    mirrored_state!(depth_bias, set_depth_bias, depth_bias: i32 => DepthBias);
    mirrored_state!(depth_compare, set_depth_compare, depth_compare: CompareFunction => DepthCompare);
    mirrored_state!(lighting_enabled, set_lighting_enabled, lighting: bool => Lighting);
    mirrored_state!(specular_enabled, set_specular_enabled, specular: bool => SpecularEnable);
    mirrored_state!(shade_mode, set_shade_mode, shade_mode: ShadeMode => ShadeMode);
    mirrored_state!(fill_mode, set_fill_mode, fill_mode: PolygonMode => FillMode);
    mirrored_state!(alpha_blend_enabled, set_alpha_blend_enabled, alpha_blend_enable: bool => AlphaBlendEnable);
    mirrored_state!(source_blend, set_source_blend, source_blend: BlendFactor => SourceBlend);
    mirrored_state!(destination_blend, set_destination_blend, destination_blend: BlendFactor => DestinationBlend);
    mirrored_state!(alpha_test_enabled, set_alpha_test_enabled, alpha_test_enable: bool => AlphaTestEnable);
    mirrored_state!(alpha_test_function, set_alpha_test_function, alpha_function: CompareFunction => AlphaFunction);
    mirrored_state!(draw_last_pixel, set_draw_last_pixel, last_pixel: bool => LastPixel);
    mirrored_state!(stencil_compare, set_stencil_compare, stencil_compare: CompareFunction => StencilCompare);
    mirrored_state!(stencil_enabled, set_stencil_enabled, stencil_enable: bool => StencilEnable);
    mirrored_state!(stencil_fail_operation, set_stencil_fail_operation, stencil_fail: StencilOperation => StencilFail);
    mirrored_state!(stencil_mask, set_stencil_mask, stencil_mask: u32 => StencilMask);
    mirrored_state!(stencil_pass_operation, set_stencil_pass_operation, stencil_pass: StencilOperation => StencilPass);
    mirrored_state!(stencil_zfail_operation, set_stencil_zfail_operation, stencil_zfail: StencilOperation => StencilZFail);
    mirrored_state!(stencil_reference, set_stencil_reference, stencil_reference: u32 => StencilReference);
    mirrored_state!(dither_enabled, set_dither_enabled, dither: bool => Dither);

    #[inline]
    pub fn point_size(&self) -> f32 {
        self.values.point_size
    }

    /// Clamped to `[1.0, max_point_size]`.
    pub fn set_point_size(&mut self, size: f32) {
        let max = self.lifecycle.caps().max_point_size.max(1.0);
        let size = size.clamp(1.0, max);
        if self.values.point_size == size {
            return;
        }
        self.forward(RenderState::PointSize(size));
        self.values.point_size = size;
    }

    #[inline]
    pub fn alpha_test_value(&self) -> u32 {
        self.values.alpha_reference
    }

    /// Only the low 8 bits are kept.
    pub fn set_alpha_test_value(&mut self, value: u32) {
        let value = value & 0xFF;
        if self.values.alpha_reference == value {
            return;
        }
        self.forward(RenderState::AlphaReference(value));
        self.values.alpha_reference = value;
    }

    #[inline]
    pub fn scissor_test_enabled(&self) -> bool {
        self.values.scissor_enable
    }

    /// Turning scissor testing off also empties the scissor rectangle.
    /// Without driver support it stays off.
    pub fn set_scissor_test_enabled(&mut self, enabled: bool) {
        let enabled = enabled && self.supports_scissor();
        if self.values.scissor_enable != enabled {
            self.forward(RenderState::ScissorTestEnable(enabled));
            self.values.scissor_enable = enabled;
        }
        if !enabled {
            self.set_scissor_rect(Rect::EMPTY);
        }
    }

    #[inline]
    pub fn scissor_rect(&self) -> Rect<i32> {
        self.values.scissor_rect
    }

    /// Forced empty when the driver has no scissor support.
    pub fn set_scissor_rect(&mut self, rect: Rect<i32>) {
        let rect = if self.supports_scissor() {
            rect
        } else {
            Rect::EMPTY
        };
        if self.values.scissor_rect == rect {
            return;
        }
        self.forward(RenderState::ScissorRect(rect));
        self.values.scissor_rect = rect;
    }

    #[inline]
    pub fn supports_scissor(&self) -> bool {
        self.lifecycle.caps().supports_scissor_test
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use vellum_device::{DeviceCaps, MockRenderDevice};

    fn cache_with(caps: DeviceCaps) -> (RenderStateCache, Arc<MockRenderDevice>, Arc<DeviceLifecycleManager>) {
        let lifecycle = DeviceLifecycleManager::new();
        let mock = Arc::new(MockRenderDevice::with_caps(caps));
        lifecycle.attach_device(mock.clone());
        (RenderStateCache::new(lifecycle.clone()), mock, lifecycle)
    }

    #[test]
    fn redundant_sets_are_skipped() {
        let (mut cache, mock, _) = cache_with(DeviceCaps::default());

        cache.set_cull_mode(CullMode::None);
        cache.set_cull_mode(CullMode::None);
        cache.set_depth_enabled(true); // already the default

        assert_eq!(mock.render_states(), vec![RenderState::CullMode(CullMode::None)]);
        assert_eq!(cache.cull_mode(), CullMode::None);
    }

    #[test]
    fn mirror_updates_without_usable_device() {
        let (mut cache, mock, lifecycle) = cache_with(DeviceCaps::default());
        lifecycle.mark_lost();

        cache.set_stencil_reference(7);
        cache.set_dither_enabled(true);

        assert_eq!(cache.stencil_reference(), 7);
        assert!(cache.dither_enabled());
        assert_eq!(mock.count_render_state_sets(), 0);
    }

    #[test]
    fn alpha_reference_is_masked() {
        let (mut cache, mock, _) = cache_with(DeviceCaps::default());

        cache.set_alpha_test_value(0x1FF);
        assert_eq!(cache.alpha_test_value(), 0xFF);
        assert_eq!(mock.render_states(), vec![RenderState::AlphaReference(0xFF)]);

        // 0x2FF masks to the same value.
        cache.set_alpha_test_value(0x2FF);
        assert_eq!(mock.count_render_state_sets(), 1);
    }

    #[test]
    fn point_size_is_clamped() {
        let caps = DeviceCaps {
            max_point_size: 16.0,
            ..DeviceCaps::default()
        };
        let (mut cache, mock, _) = cache_with(caps);

        cache.set_point_size(100.0);
        assert_eq!(cache.point_size(), 16.0);
        cache.set_point_size(0.25);
        assert_eq!(cache.point_size(), 1.0);

        assert_eq!(
            mock.render_states(),
            vec![RenderState::PointSize(16.0), RenderState::PointSize(1.0)]
        );
    }

    #[test]
    fn disabling_scissor_empties_rect() {
        let (mut cache, mock, _) = cache_with(DeviceCaps::default());

        cache.set_scissor_test_enabled(true);
        cache.set_scissor_rect(Rect::new(10, 10, 50, 50));
        mock.clear_calls();

        cache.set_scissor_test_enabled(false);
        assert_eq!(cache.scissor_rect(), Rect::EMPTY);
        assert_eq!(
            mock.render_states(),
            vec![
                RenderState::ScissorTestEnable(false),
                RenderState::ScissorRect(Rect::EMPTY)
            ]
        );
    }

    #[test]
    fn scissor_refused_without_support() {
        let caps = DeviceCaps {
            supports_scissor_test: false,
            ..DeviceCaps::default()
        };
        let (mut cache, mock, _) = cache_with(caps);

        cache.set_scissor_test_enabled(true);
        cache.set_scissor_rect(Rect::new(0, 0, 32, 32));

        assert!(!cache.scissor_test_enabled());
        assert_eq!(cache.scissor_rect(), Rect::EMPTY);
        assert_eq!(mock.count_render_state_sets(), 0);
    }

    #[test]
    fn apply_all_replays_in_fixed_order() {
        let (mut cache, mock, _) = cache_with(DeviceCaps::default());
        cache.set_depth_write_enabled(false);
        cache.set_stencil_mask(0xF0);
        mock.clear_calls();

        cache.apply_all();

        let states = mock.render_states();
        assert_eq!(states.len(), 28);
        assert_eq!(states, cache.values().replay_order().to_vec());
        assert_eq!(states[0], RenderState::CullMode(CullMode::Clockwise));
        assert_eq!(states[4], RenderState::DepthWrite(false));
        assert_eq!(states[27], RenderState::Dither(false));

        let enable = states.iter().position(|s| *s == RenderState::DepthEnable(true));
        let write = states.iter().position(|s| *s == RenderState::DepthWrite(false));
        assert!(enable < write);
    }

    #[test]
    fn apply_all_skipped_when_unusable() {
        let (cache, mock, lifecycle) = cache_with(DeviceCaps::default());
        lifecycle.mark_lost();
        cache.apply_all();
        assert_eq!(mock.count_render_state_sets(), 0);
    }
}
