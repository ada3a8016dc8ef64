//! Per-drawable visual attributes with live inheritance from shared defaults.
//!
//! Every drawable composes a [`VisualStateTraits`]. Each attribute either
//! holds a local value or inherits, per attribute, from a [`DefaultsContext`]
//! shared by all drawables created against it. Inheritance is live: changing
//! a default is immediately visible through every drawable that inherits it.

use std::sync::Arc;

use parking_lot::RwLock;
use vellum_device::{
    AddressMode, BlendFactor, ClearTargets, CompareFunction, FilterMode, StencilOperation,
};

use crate::blend::Blending;
use crate::shader::ShaderBinding;

/// Texture filtering preset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Smoothing {
    /// Point sampling both ways.
    #[default]
    None,
    /// Bilinear both ways.
    Smooth,
    /// Bilinear when magnifying only.
    MagnificationSmooth,
    /// Bilinear when minifying only.
    MinificationSmooth,
}

impl Smoothing {
    /// `(magnification, minification)` filters.
    pub fn filters(self) -> (FilterMode, FilterMode) {
        match self {
            Smoothing::None => (FilterMode::Nearest, FilterMode::Nearest),
            Smoothing::Smooth => (FilterMode::Linear, FilterMode::Linear),
            Smoothing::MagnificationSmooth => (FilterMode::Linear, FilterMode::Nearest),
            Smoothing::MinificationSmooth => (FilterMode::Nearest, FilterMode::Linear),
        }
    }
}

/// The full set of resolvable visual attributes.
#[derive(Debug, Clone, PartialEq)]
pub struct VisualAttributes {
    pub wrap_h: AddressMode,
    pub wrap_v: AddressMode,
    pub smoothing: Smoothing,
    pub alpha_mask_function: CompareFunction,
    pub alpha_mask_value: u32,
    pub blending: Blending,
    pub source_blend: BlendFactor,
    pub destination_blend: BlendFactor,
    pub stencil_enabled: bool,
    pub stencil_reference: u32,
    pub stencil_mask: u32,
    pub stencil_pass_operation: StencilOperation,
    pub stencil_fail_operation: StencilOperation,
    pub stencil_zfail_operation: StencilOperation,
    pub stencil_compare: CompareFunction,
    pub shader: Option<ShaderBinding>,
}

impl Default for VisualAttributes {
    fn default() -> Self {
        let blending = Blending::MODULATED;
        let (source_blend, destination_blend) = blending.factors();
        Self {
            wrap_h: AddressMode::ClampToEdge,
            wrap_v: AddressMode::ClampToEdge,
            smoothing: Smoothing::None,
            alpha_mask_function: CompareFunction::Greater,
            alpha_mask_value: 1,
            blending,
            source_blend,
            destination_blend,
            stencil_enabled: false,
            stencil_reference: 0,
            stencil_mask: u32::MAX,
            stencil_pass_operation: StencilOperation::Keep,
            stencil_fail_operation: StencilOperation::Keep,
            stencil_zfail_operation: StencilOperation::Keep,
            stencil_compare: CompareFunction::Always,
            shader: None,
        }
    }
}

bitflags::bitflags! {
    /// Which attributes resolve from the shared defaults.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct InheritFlags: u32 {
        const WRAP_H = 1 << 0;
        const WRAP_V = 1 << 1;
        const SMOOTHING = 1 << 2;
        const ALPHA_MASK_FUNCTION = 1 << 3;
        const ALPHA_MASK_VALUE = 1 << 4;
        const BLENDING = 1 << 5;
        const SOURCE_BLEND = 1 << 6;
        const DESTINATION_BLEND = 1 << 7;
        const STENCIL_ENABLED = 1 << 8;
        const STENCIL_REFERENCE = 1 << 9;
        const STENCIL_MASK = 1 << 10;
        const STENCIL_PASS = 1 << 11;
        const STENCIL_FAIL = 1 << 12;
        const STENCIL_ZFAIL = 1 << 13;
        const STENCIL_COMPARE = 1 << 14;
        const SHADER = 1 << 15;
    }
}

#[derive(Debug)]
struct DefaultsState {
    attributes: VisualAttributes,
    dither: bool,
    clear_targets: ClearTargets,
}

impl Default for DefaultsState {
    fn default() -> Self {
        Self {
            attributes: VisualAttributes::default(),
            dither: false,
            clear_targets: ClearTargets::all(),
        }
    }
}

macro_rules! default_attr {
    ($get:ident, $set:ident: $ty:ty) => {
        pub fn $get(&self) -> $ty {
            self.inner.read().attributes.$get.clone()
        }

        pub fn $set(&self, value: $ty) {
            self.inner.write().attributes.$get = value;
        }
    };
}

/// Shared, live defaults that drawables inherit from.
///
/// Cloning is cheap and every clone observes the same values.
#[derive(Debug, Clone, Default)]
pub struct DefaultsContext {
    inner: Arc<RwLock<DefaultsState>>,
}

impl DefaultsContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// A copy of every default attribute.
    pub fn attributes(&self) -> VisualAttributes {
        self.inner.read().attributes.clone()
    }

    default_attr!(wrap_h, set_wrap_h: AddressMode);
    default_attr!(wrap_v, set_wrap_v: AddressMode);
    default_attr!(smoothing, set_smoothing: Smoothing);
    default_attr!(alpha_mask_function, set_alpha_mask_function: CompareFunction);
    default_attr!(alpha_mask_value, set_alpha_mask_value: u32);
    default_attr!(source_blend, set_source_blend: BlendFactor);
    default_attr!(destination_blend, set_destination_blend: BlendFactor);
    default_attr!(stencil_enabled, set_stencil_enabled: bool);
    default_attr!(stencil_reference, set_stencil_reference: u32);
    default_attr!(stencil_mask, set_stencil_mask: u32);
    default_attr!(stencil_pass_operation, set_stencil_pass_operation: StencilOperation);
    default_attr!(stencil_fail_operation, set_stencil_fail_operation: StencilOperation);
    default_attr!(stencil_zfail_operation, set_stencil_zfail_operation: StencilOperation);
    default_attr!(stencil_compare, set_stencil_compare: CompareFunction);
    default_attr!(shader, set_shader: Option<ShaderBinding>);

    pub fn blending(&self) -> Blending {
        self.inner.read().attributes.blending
    }

    /// Also replaces the default source/destination factors.
    pub fn set_blending(&self, blending: Blending) {
        let (src, dst) = blending.factors();
        let mut inner = self.inner.write();
        inner.attributes.blending = blending;
        inner.attributes.source_blend = src;
        inner.attributes.destination_blend = dst;
    }

    pub fn set_wrap_mode(&self, mode: AddressMode) {
        let mut inner = self.inner.write();
        inner.attributes.wrap_h = mode;
        inner.attributes.wrap_v = mode;
    }

    pub fn dither(&self) -> bool {
        self.inner.read().dither
    }

    pub fn set_dither(&self, dither: bool) {
        self.inner.write().dither = dither;
    }

    /// Buffers a render target clears each frame unless it overrides them.
    pub fn clear_targets(&self) -> ClearTargets {
        self.inner.read().clear_targets
    }

    pub fn set_clear_targets(&self, targets: ClearTargets) {
        self.inner.write().clear_targets = targets;
    }
}

macro_rules! inheritable {
    ($get:ident, $set:ident, $flag:ident: $ty:ty) => {
        pub fn $get(&self) -> $ty {
            if self.inherit.contains(InheritFlags::$flag) {
                self.defaults.$get()
            } else {
                self.local.$get.clone()
            }
        }

        pub fn $set(&mut self, value: $ty) {
            self.local.$get = value;
            self.inherit.remove(InheritFlags::$flag);
        }
    };
}

/// Visual attributes of one drawable.
///
/// Assigning an attribute stores it locally and stops inheriting it.
/// [`VisualStateTraits::set_inherit`] switches an attribute back to the
/// shared default.
#[derive(Debug, Clone)]
pub struct VisualStateTraits {
    defaults: DefaultsContext,
    inherit: InheritFlags,
    local: VisualAttributes,
}

impl VisualStateTraits {
    /// Inherits every attribute from `defaults`.
    pub fn new(defaults: &DefaultsContext) -> Self {
        Self {
            defaults: defaults.clone(),
            inherit: InheritFlags::all(),
            local: VisualAttributes::default(),
        }
    }

    #[inline]
    pub fn defaults(&self) -> &DefaultsContext {
        &self.defaults
    }

    #[inline]
    pub fn inherit_flags(&self) -> InheritFlags {
        self.inherit
    }

    pub fn inherits(&self, flags: InheritFlags) -> bool {
        self.inherit.contains(flags)
    }

    /// Switch `flags` between inheriting and local values. Local values are kept.
    pub fn set_inherit(&mut self, flags: InheritFlags, inherit: bool) {
        self.inherit.set(flags, inherit);
    }

    inheritable!(wrap_h, set_wrap_h, WRAP_H: AddressMode);
    inheritable!(wrap_v, set_wrap_v, WRAP_V: AddressMode);
    inheritable!(smoothing, set_smoothing, SMOOTHING: Smoothing);
    inheritable!(alpha_mask_function, set_alpha_mask_function, ALPHA_MASK_FUNCTION: CompareFunction);
    inheritable!(alpha_mask_value, set_alpha_mask_value, ALPHA_MASK_VALUE: u32);
    inheritable!(source_blend, set_source_blend, SOURCE_BLEND: BlendFactor);
    inheritable!(destination_blend, set_destination_blend, DESTINATION_BLEND: BlendFactor);
    inheritable!(stencil_enabled, set_stencil_enabled, STENCIL_ENABLED: bool);
    inheritable!(stencil_reference, set_stencil_reference, STENCIL_REFERENCE: u32);
    inheritable!(stencil_mask, set_stencil_mask, STENCIL_MASK: u32);
    inheritable!(stencil_pass_operation, set_stencil_pass_operation, STENCIL_PASS: StencilOperation);
    inheritable!(stencil_fail_operation, set_stencil_fail_operation, STENCIL_FAIL: StencilOperation);
    inheritable!(stencil_zfail_operation, set_stencil_zfail_operation, STENCIL_ZFAIL: StencilOperation);
    inheritable!(stencil_compare, set_stencil_compare, STENCIL_COMPARE: CompareFunction);
    inheritable!(shader, set_shader, SHADER: Option<ShaderBinding>);

    pub fn blending(&self) -> Blending {
        if self.inherit.contains(InheritFlags::BLENDING) {
            self.defaults.blending()
        } else {
            self.local.blending
        }
    }

    /// Also derives the source/destination factors, which stop inheriting too.
    pub fn set_blending(&mut self, blending: Blending) {
        let (src, dst) = blending.factors();
        self.local.blending = blending;
        self.local.source_blend = src;
        self.local.destination_blend = dst;
        self.inherit.remove(
            InheritFlags::BLENDING | InheritFlags::SOURCE_BLEND | InheritFlags::DESTINATION_BLEND,
        );
    }

    /// The shared wrap mode, or `None` when horizontal and vertical differ.
    pub fn wrap_mode(&self) -> Option<AddressMode> {
        let (h, v) = (self.wrap_h(), self.wrap_v());
        (h == v).then_some(h)
    }

    pub fn set_wrap_mode(&mut self, mode: AddressMode) {
        self.local.wrap_h = mode;
        self.local.wrap_v = mode;
        self.inherit.remove(InheritFlags::WRAP_H | InheritFlags::WRAP_V);
    }

    /// Every attribute resolved against the defaults as they are right now.
    pub fn resolve(&self) -> VisualAttributes {
        if self.inherit.is_empty() {
            return self.local.clone();
        }

        let defaults = self.defaults.attributes();
        let pick = |flag: InheritFlags| self.inherit.contains(flag);
        let local = &self.local;
        VisualAttributes {
            wrap_h: if pick(InheritFlags::WRAP_H) { defaults.wrap_h } else { local.wrap_h },
            wrap_v: if pick(InheritFlags::WRAP_V) { defaults.wrap_v } else { local.wrap_v },
            smoothing: if pick(InheritFlags::SMOOTHING) {
                defaults.smoothing
            } else {
                local.smoothing
            },
            alpha_mask_function: if pick(InheritFlags::ALPHA_MASK_FUNCTION) {
                defaults.alpha_mask_function
            } else {
                local.alpha_mask_function
            },
            alpha_mask_value: if pick(InheritFlags::ALPHA_MASK_VALUE) {
                defaults.alpha_mask_value
            } else {
                local.alpha_mask_value
            },
            blending: if pick(InheritFlags::BLENDING) {
                defaults.blending
            } else {
                local.blending
            },
            source_blend: if pick(InheritFlags::SOURCE_BLEND) {
                defaults.source_blend
            } else {
                local.source_blend
            },
            destination_blend: if pick(InheritFlags::DESTINATION_BLEND) {
                defaults.destination_blend
            } else {
                local.destination_blend
            },
            stencil_enabled: if pick(InheritFlags::STENCIL_ENABLED) {
                defaults.stencil_enabled
            } else {
                local.stencil_enabled
            },
            stencil_reference: if pick(InheritFlags::STENCIL_REFERENCE) {
                defaults.stencil_reference
            } else {
                local.stencil_reference
            },
            stencil_mask: if pick(InheritFlags::STENCIL_MASK) {
                defaults.stencil_mask
            } else {
                local.stencil_mask
            },
            stencil_pass_operation: if pick(InheritFlags::STENCIL_PASS) {
                defaults.stencil_pass_operation
            } else {
                local.stencil_pass_operation
            },
            stencil_fail_operation: if pick(InheritFlags::STENCIL_FAIL) {
                defaults.stencil_fail_operation
            } else {
                local.stencil_fail_operation
            },
            stencil_zfail_operation: if pick(InheritFlags::STENCIL_ZFAIL) {
                defaults.stencil_zfail_operation
            } else {
                local.stencil_zfail_operation
            },
            stencil_compare: if pick(InheritFlags::STENCIL_COMPARE) {
                defaults.stencil_compare
            } else {
                local.stencil_compare
            },
            shader: if pick(InheritFlags::SHADER) {
                defaults.shader
            } else {
                local.shader.clone()
            },
        }
    }
}
