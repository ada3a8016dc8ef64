//! Shadow caches, attribute inheritance and state resolution.

mod common;

use common::Harness;
use vellum_device::{
    AddressMode, BlendFactor, CompareFunction, CullMode, DeviceCall, FilterMode, RenderState,
    StencilOperation, TextureArg, TextureOp,
};
use vellum_render::*;

#[test]
fn test_mirror_skips_redundant_writes() {
    let mut h = Harness::new();
    let rs = h.renderer.render_states_mut();

    for mode in [CullMode::None, CullMode::None, CullMode::CounterClockwise, CullMode::CounterClockwise] {
        rs.set_cull_mode(mode);
        assert_eq!(rs.cull_mode(), mode);
    }
    for value in [5, 5, 0x1FF, 0xFF] {
        rs.set_stencil_reference(value);
        assert_eq!(rs.stencil_reference(), value);
    }

    assert_eq!(
        h.mock.render_states(),
        vec![
            RenderState::CullMode(CullMode::None),
            RenderState::CullMode(CullMode::CounterClockwise),
            RenderState::StencilReference(5),
            RenderState::StencilReference(0x1FF),
            RenderState::StencilReference(0xFF),
        ]
    );
}

#[test]
fn test_sampler_mirror_skips_redundant_writes() {
    let mut h = Harness::new();
    let ss = h.renderer.sampler_states_mut();

    ss.set_mag_filter(1, FilterMode::Linear);
    ss.set_mag_filter(1, FilterMode::Linear);
    ss.set_address_u(0, AddressMode::ClampToEdge);

    assert_eq!(ss.mag_filter(1), Some(FilterMode::Linear));
    assert_eq!(h.mock.count_sampler_state_sets(), 1);
}

#[test]
fn test_explicit_set_clears_inherit() {
    let defaults = DefaultsContext::new();
    let mut traits = VisualStateTraits::new(&defaults);

    traits.set_stencil_mask(0x0F);
    assert!(!traits.inherits(InheritFlags::STENCIL_MASK));

    traits.set_wrap_mode(AddressMode::Repeat);
    assert!(!traits.inherits(InheritFlags::WRAP_H | InheritFlags::WRAP_V));
    assert_eq!(traits.wrap_mode(), Some(AddressMode::Repeat));

    traits.set_blending(Blending::ADDITIVE);
    assert!(!traits.inherits(InheritFlags::SOURCE_BLEND));
    assert!(!traits.inherits(InheritFlags::DESTINATION_BLEND));
    assert_eq!(traits.source_blend(), BlendFactor::SrcAlpha);
    assert_eq!(traits.destination_blend(), BlendFactor::One);
}

#[test]
fn test_inherit_tracks_defaults_live() {
    let defaults = DefaultsContext::new();
    let mut traits = VisualStateTraits::new(&defaults);

    traits.set_alpha_mask_value(40);
    defaults.set_alpha_mask_value(90);
    assert_eq!(traits.alpha_mask_value(), 40);

    traits.set_inherit(InheritFlags::ALPHA_MASK_VALUE, true);
    assert_eq!(traits.alpha_mask_value(), 90);

    defaults.set_alpha_mask_value(12);
    assert_eq!(traits.alpha_mask_value(), 12);
    assert_eq!(traits.resolve().alpha_mask_value, 12);

    traits.set_inherit(InheritFlags::ALPHA_MASK_VALUE, false);
    assert_eq!(traits.alpha_mask_value(), 40);
}

#[test]
fn test_state_changed_is_idempotent_and_settled_by_set_states() {
    let mut h = Harness::new();

    let mut sprite = h.sprite();
    let visual = sprite.visual_mut();
    visual.set_smoothing(Smoothing::MinificationSmooth);
    visual.set_alpha_mask_value(300);
    visual.set_stencil_enabled(true);
    visual.set_stencil_compare(CompareFunction::Equal);
    visual.set_stencil_pass_operation(StencilOperation::IncrementClamp);
    visual.set_blending(Blending::PREMULTIPLIED);

    let first = h.renderer.state_changed(&sprite);
    assert_eq!(first, h.renderer.state_changed(&sprite));
    assert!(first);

    h.renderer.set_states(&sprite);
    assert!(!h.renderer.state_changed(&sprite));
    assert!(!h.renderer.state_changed(&sprite));

    let rs = h.renderer.render_states();
    assert_eq!(rs.alpha_test_value(), 300 & 0xFF);
    assert!(rs.stencil_enabled());
    assert_eq!(rs.stencil_compare(), CompareFunction::Equal);
    assert_eq!(rs.source_blend(), BlendFactor::One);
    assert_eq!(rs.destination_blend(), BlendFactor::OneMinusSrcAlpha);
    assert_eq!(h.renderer.sampler_states().min_filter(0), Some(FilterMode::Linear));
    assert_eq!(h.renderer.sampler_states().mag_filter(0), Some(FilterMode::Nearest));
}

#[test]
fn test_modulated_blending_derivation() {
    let mut h = Harness::new();

    let mut sprite = h.sprite();
    sprite.visual_mut().set_blending(Blending::new(BlendingMode::Modulated));
    assert_eq!(sprite.visual().source_blend(), BlendFactor::SrcAlpha);
    assert_eq!(sprite.visual().destination_blend(), BlendFactor::OneMinusSrcAlpha);

    h.renderer.set_states(&sprite);

    let rs = h.renderer.render_states();
    assert!(rs.alpha_blend_enabled());
    assert_eq!(rs.source_blend(), BlendFactor::SrcAlpha);
    assert_eq!(rs.destination_blend(), BlendFactor::OneMinusSrcAlpha);

    let ss = h.renderer.sampler_states();
    assert_eq!(ss.alpha_op(0), Some(TextureOp::Modulate));
    assert_eq!(ss.color_op(0), Some(TextureOp::Modulate));
}

#[test]
fn test_no_blending_derivation() {
    let mut h = Harness::new();

    let mut sprite = h.sprite();
    let visual = sprite.visual_mut();
    visual.set_blending(Blending::NONE.with_color_additive(true));
    visual.set_alpha_mask_function(CompareFunction::Always);

    h.renderer.set_states(&sprite);

    let rs = h.renderer.render_states();
    assert!(!rs.alpha_blend_enabled());
    assert!(!rs.alpha_test_enabled());

    let ss = h.renderer.sampler_states();
    assert_eq!(ss.alpha_op(0), Some(TextureOp::Disable));
    assert_eq!(ss.alpha_arg2(0), Some(TextureArg::Current));
    assert_eq!(ss.color_op(0), Some(TextureOp::Add));
}

#[test]
fn test_dither_follows_defaults() {
    let mut h = Harness::new();
    let sprite = h.sprite();
    h.renderer.set_states(&sprite);
    assert!(!h.renderer.state_changed(&sprite));

    h.defaults.set_dither(true);
    assert!(h.renderer.state_changed(&sprite));

    h.mock.clear_calls();
    h.renderer.set_states(&sprite);
    assert!(h.renderer.render_states().dither_enabled());
    assert!(h.mock.calls().contains(&DeviceCall::SetRenderState(RenderState::Dither(true))));
}

#[test]
fn test_default_change_is_seen_by_inheriting_drawables() {
    let mut h = Harness::new();
    let sprite = h.sprite();
    h.renderer.set_states(&sprite);

    h.defaults.set_wrap_mode(AddressMode::Repeat);
    assert!(h.renderer.state_changed(&sprite));

    h.renderer.set_states(&sprite);
    assert_eq!(h.renderer.sampler_states().address_v(0), Some(AddressMode::Repeat));
}

#[test]
fn test_point_size_is_clamped_to_caps() {
    let mut h = Harness::new();
    let rs = h.renderer.render_states_mut();

    rs.set_point_size(1000.0);
    assert_eq!(rs.point_size(), 64.0);
    rs.set_point_size(0.0);
    assert_eq!(rs.point_size(), 1.0);
}
