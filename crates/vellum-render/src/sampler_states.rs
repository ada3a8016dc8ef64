//! Per-stage shadow cache for texture sampling and combine state.

use std::sync::Arc;

use vellum_core::profiling::profile_function;
use vellum_device::{AddressMode, FilterMode, SamplerState, TextureArg, TextureOp};

use crate::lifecycle::DeviceLifecycleManager;

/// Mirrored state of one texture stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SamplerStageState {
    pub address_u: AddressMode,
    pub address_v: AddressMode,
    pub mag_filter: FilterMode,
    pub min_filter: FilterMode,
    pub color_op: TextureOp,
    pub color_arg1: TextureArg,
    pub color_arg2: TextureArg,
    pub alpha_op: TextureOp,
    pub alpha_arg1: TextureArg,
    pub alpha_arg2: TextureArg,
}

impl SamplerStageState {
    /// Device power-on state for `stage`. Only stage 0 combines by default.
    pub fn power_on(stage: u32) -> Self {
        let (color_op, alpha_op) = if stage == 0 {
            (TextureOp::Modulate, TextureOp::SelectArg1)
        } else {
            (TextureOp::Disable, TextureOp::Disable)
        };
        Self {
            address_u: AddressMode::Repeat,
            address_v: AddressMode::Repeat,
            mag_filter: FilterMode::Nearest,
            min_filter: FilterMode::Nearest,
            color_op,
            color_arg1: TextureArg::Texture,
            color_arg2: TextureArg::Current,
            alpha_op,
            alpha_arg1: TextureArg::Texture,
            alpha_arg2: TextureArg::Current,
        }
    }

    /// Every value as a device state, in replay order.
    pub fn replay_order(&self) -> [SamplerState; 10] {
        [
            SamplerState::AddressU(self.address_u),
            SamplerState::AddressV(self.address_v),
            SamplerState::MagFilter(self.mag_filter),
            SamplerState::MinFilter(self.min_filter),
            SamplerState::ColorOp(self.color_op),
            SamplerState::ColorArg1(self.color_arg1),
            SamplerState::ColorArg2(self.color_arg2),
            SamplerState::AlphaOp(self.alpha_op),
            SamplerState::AlphaArg1(self.alpha_arg1),
            SamplerState::AlphaArg2(self.alpha_arg2),
        ]
    }
}

macro_rules! stage_state {
    ($get:ident, $set:ident, $field:ident: $ty:ty => $variant:ident) => {
        pub fn $get(&self, stage: u32) -> Option<$ty> {
            self.stages.get(stage as usize).map(|s| s.$field)
        }

        pub fn $set(&mut self, stage: u32, value: $ty) {
            let Some(state) = self.stages.get_mut(stage as usize) else {
                tracing::warn!(stage, "Sampler stage out of range");
                return;
            };
            if state.$field == value {
                return;
            }
            state.$field = value;
            if let Some(device) = self.lifecycle.usable_device() {
                device.set_sampler_state(stage, SamplerState::$variant(value));
            }
        }
    };
}

/// One mirror per hardware texture stage.
pub struct SamplerStateCache {
    lifecycle: Arc<DeviceLifecycleManager>,
    stages: Vec<SamplerStageState>,
}

impl SamplerStateCache {
    pub fn new(lifecycle: Arc<DeviceLifecycleManager>, stage_count: u32) -> Self {
        let stages = (0..stage_count.max(1)).map(SamplerStageState::power_on).collect();
        Self { lifecycle, stages }
    }

    #[inline]
    pub fn stage_count(&self) -> u32 {
        self.stages.len() as u32
    }

    pub fn stage(&self, stage: u32) -> Option<&SamplerStageState> {
        self.stages.get(stage as usize)
    }

    /// Grow or shrink to `stage_count` stages, keeping existing mirrors.
    pub fn resize(&mut self, stage_count: u32) {
        let count = stage_count.max(1);
        let start = self.stage_count();
        if count <= start {
            self.stages.truncate(count as usize);
        } else {
            self.stages.extend((start..count).map(SamplerStageState::power_on));
        }
    }

    /// Forward every stage's mirrored values, changed or not.
    pub fn apply_all(&self) {
        profile_function!();
        let Some(device) = self.lifecycle.usable_device() else {
            return;
        };
        for (stage, state) in self.stages.iter().enumerate() {
            for value in state.replay_order() {
                device.set_sampler_state(stage as u32, value);
            }
        }
    }

    stage_state!(address_u, set_address_u, address_u: AddressMode => AddressU);
    stage_state!(address_v, set_address_v, address_v: AddressMode => AddressV);
    stage_state!(mag_filter, set_mag_filter, mag_filter: FilterMode => MagFilter);
    stage_state!(min_filter, set_min_filter, min_filter: FilterMode => MinFilter);
    stage_state!(color_op, set_color_op, color_op: TextureOp => ColorOp);
    stage_state!(color_arg1, set_color_arg1, color_arg1: TextureArg => ColorArg1);
    stage_state!(color_arg2, set_color_arg2, color_arg2: TextureArg => ColorArg2);
    stage_state!(alpha_op, set_alpha_op, alpha_op: TextureOp => AlphaOp);
    stage_state!(alpha_arg1, set_alpha_arg1, alpha_arg1: TextureArg => AlphaArg1);
    stage_state!(alpha_arg2, set_alpha_arg2, alpha_arg2: TextureArg => AlphaArg2);
}

#[cfg(test)]
mod tests {
    use super::*;
    use vellum_device::MockRenderDevice;

    fn cache(stages: u32) -> (SamplerStateCache, Arc<MockRenderDevice>, Arc<DeviceLifecycleManager>) {
        let lifecycle = DeviceLifecycleManager::new();
        let mock = Arc::new(MockRenderDevice::new());
        lifecycle.attach_device(mock.clone());
        (SamplerStateCache::new(lifecycle.clone(), stages), mock, lifecycle)
    }

    #[test]
    fn stages_are_independent() {
        let (mut cache, mock, _) = cache(2);

        cache.set_mag_filter(1, FilterMode::Linear);
        cache.set_mag_filter(1, FilterMode::Linear);

        assert_eq!(cache.mag_filter(0), Some(FilterMode::Nearest));
        assert_eq!(cache.mag_filter(1), Some(FilterMode::Linear));
        assert_eq!(mock.sampler_states(1), vec![SamplerState::MagFilter(FilterMode::Linear)]);
        assert!(mock.sampler_states(0).is_empty());
    }

    #[test]
    fn out_of_range_stage_is_ignored() {
        let (mut cache, mock, _) = cache(1);
        cache.set_address_u(4, AddressMode::ClampToEdge);
        assert_eq!(cache.address_u(4), None);
        assert_eq!(mock.call_count(), 0);
    }

    #[test]
    fn lost_device_still_updates_mirror() {
        let (mut cache, mock, lifecycle) = cache(1);
        lifecycle.mark_lost();

        cache.set_alpha_op(0, TextureOp::Modulate);

        assert_eq!(cache.alpha_op(0), Some(TextureOp::Modulate));
        assert_eq!(mock.count_sampler_state_sets(), 0);
    }

    #[test]
    fn apply_all_replays_every_stage() {
        let (mut cache, mock, _) = cache(2);
        cache.set_address_v(0, AddressMode::ClampToEdge);
        mock.clear_calls();

        cache.apply_all();

        assert_eq!(mock.count_sampler_state_sets(), 20);
        assert_eq!(mock.sampler_states(0)[1], SamplerState::AddressV(AddressMode::ClampToEdge));
    }

    #[test]
    fn resize_keeps_existing_mirrors() {
        let (mut cache, _, _) = cache(1);
        cache.set_min_filter(0, FilterMode::Linear);

        cache.resize(3);
        assert_eq!(cache.stage_count(), 3);
        assert_eq!(cache.min_filter(0), Some(FilterMode::Linear));
        assert_eq!(cache.color_op(2), Some(TextureOp::Disable));

        cache.resize(0);
        assert_eq!(cache.stage_count(), 1);
    }
}
