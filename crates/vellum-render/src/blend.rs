//! Blending presets and the fixed-function factors they select.

use vellum_device::BlendFactor;

/// Predefined blend equations for 2D drawing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum BlendingMode {
    /// No blending - source completely replaces destination.
    None,

    /// `src.rgb * src.a + dst.rgb`
    ///
    /// Use for: Glow effects, particles, light sources.
    Additive,

    /// `src.rgb * src.rgb + dst.rgb * dst.rgb`
    Color,

    /// `src.rgb * (1 - src.a) + dst.rgb * src.a`
    ModulatedInverse,

    /// Standard alpha blending for transparent content.
    ///
    /// `src.rgb * src.a + dst.rgb * (1 - src.a)`
    #[default]
    Modulated,

    /// `src.rgb + dst.rgb * (1 - src.a)`
    PreMultiplied,

    /// `src.rgb * (1 - dst.rgb) + dst.rgb * (1 - src.rgb)`
    Inverted,
}

impl BlendingMode {
    /// Source and destination factors for this preset.
    pub fn factors(self) -> (BlendFactor, BlendFactor) {
        match self {
            BlendingMode::Additive => (BlendFactor::SrcAlpha, BlendFactor::One),
            BlendingMode::Color => (BlendFactor::Src, BlendFactor::Dst),
            BlendingMode::ModulatedInverse => (BlendFactor::OneMinusSrcAlpha, BlendFactor::SrcAlpha),
            BlendingMode::None => (BlendFactor::One, BlendFactor::Zero),
            BlendingMode::Modulated => (BlendFactor::SrcAlpha, BlendFactor::OneMinusSrcAlpha),
            BlendingMode::PreMultiplied => (BlendFactor::One, BlendFactor::OneMinusSrcAlpha),
            BlendingMode::Inverted => (BlendFactor::OneMinusDst, BlendFactor::OneMinusSrc),
        }
    }
}

/// A blending preset plus the color-additive texture combine flag.
///
/// `color_additive` switches stage 0's color combine from modulate to add
/// and can be layered on top of any preset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Blending {
    pub mode: BlendingMode,
    pub color_additive: bool,
}

impl Blending {
    pub const NONE: Blending = Blending::new(BlendingMode::None);
    pub const MODULATED: Blending = Blending::new(BlendingMode::Modulated);
    pub const ADDITIVE: Blending = Blending::new(BlendingMode::Additive);
    pub const PREMULTIPLIED: Blending = Blending::new(BlendingMode::PreMultiplied);

    pub const fn new(mode: BlendingMode) -> Self {
        Self {
            mode,
            color_additive: false,
        }
    }

    pub const fn with_color_additive(mut self, color_additive: bool) -> Self {
        self.color_additive = color_additive;
        self
    }

    #[inline]
    pub fn factors(self) -> (BlendFactor, BlendFactor) {
        self.mode.factors()
    }
}

impl From<BlendingMode> for Blending {
    fn from(mode: BlendingMode) -> Self {
        Blending::new(mode)
    }
}
