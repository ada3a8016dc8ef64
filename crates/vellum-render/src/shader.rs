//! Interface to externally compiled shader effects.

use std::fmt;
use std::sync::Arc;

use vellum_device::RenderDevice;

/// Stable identity of a shader effect.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ShaderId(pub u64);

/// A compiled effect with one active technique made of one or more passes.
///
/// Compilation and parameter storage live outside the renderer. The batch
/// flush drives an effect like this:
///
/// ```text
/// commit_parameters
/// begin -> pass count
///   begin_pass(0) draw end_pass
///   begin_pass(1) draw end_pass
/// end
/// ```
pub trait ShaderEffect: Send + Sync {
    fn id(&self) -> ShaderId;

    /// Index of the technique draws will use.
    fn active_technique(&self) -> u32;

    /// Push effect and technique parameters to the device. Called once per flush.
    fn commit_parameters(&self, device: &dyn RenderDevice);

    /// Start the active technique and return its pass count.
    fn begin(&self, device: &dyn RenderDevice) -> u32;

    fn begin_pass(&self, device: &dyn RenderDevice, pass: u32);

    fn end_pass(&self, device: &dyn RenderDevice);

    fn end(&self, device: &dyn RenderDevice);
}

/// A shader reference as compared by the state resolver: same effect and same technique.
#[derive(Clone)]
pub struct ShaderBinding(pub Arc<dyn ShaderEffect>);

impl ShaderBinding {
    pub fn new(effect: Arc<dyn ShaderEffect>) -> Self {
        Self(effect)
    }

    #[inline]
    pub fn effect(&self) -> &dyn ShaderEffect {
        self.0.as_ref()
    }

    /// `(effect, technique)` pair used for change detection.
    #[inline]
    pub fn key(&self) -> (ShaderId, u32) {
        (self.0.id(), self.0.active_technique())
    }
}

impl PartialEq for ShaderBinding {
    fn eq(&self, other: &Self) -> bool {
        self.key() == other.key()
    }
}

impl fmt::Debug for ShaderBinding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let (id, technique) = self.key();
        f.debug_struct("ShaderBinding")
            .field("id", &id)
            .field("technique", &technique)
            .finish()
    }
}
