//! Destination surfaces owned by the application.
//!
//! A [`RenderTarget`] owns a color surface, an optional depth/stencil
//! surface, a default full-surface [`Viewport`] and a lazily computed
//! orthographic projection. It registers with the [`DeviceLifecycleManager`]
//! so its surfaces are released on device loss and rebuilt after a reset.

use std::sync::{Arc, Weak};
use std::time::Duration;

use glam::Mat4;
use parking_lot::Mutex;
use vellum_core::geometry::Size;
use vellum_core::time::FrameTimer;
use vellum_device::{ClearTargets, DeviceError, RenderDevice, SurfaceHandle, SurfaceKind};

use crate::color::Color;
use crate::error::{RenderError, Result};
use crate::lifecycle::{DeviceLifecycleManager, DeviceResource, RegistrationId};
use crate::renderer::BatchedRenderer;
use crate::viewport::{Viewport, ortho_projection};
use crate::visual_state::DefaultsContext;

/// Settings for [`RenderTarget::new`].
#[derive(Debug, Clone)]
pub struct RenderTargetDescriptor {
    pub label: Option<&'static str>,
    pub width: u32,
    pub height: u32,
    pub use_depth_buffer: bool,
    pub use_stencil_buffer: bool,
    /// Color the target is cleared to by [`RenderTarget::update`].
    pub background: Color,
}

impl Default for RenderTargetDescriptor {
    fn default() -> Self {
        Self {
            label: None,
            width: 800,
            height: 600,
            use_depth_buffer: false,
            use_stencil_buffer: false,
            background: Color::BLACK,
        }
    }
}

/// Renderer state replaced by [`RenderTarget::set_active`].
struct SavedActive {
    target: Option<Arc<RenderTarget>>,
    clip: Option<Viewport>,
}

struct TargetState {
    width: u32,
    height: u32,
    use_depth_buffer: bool,
    use_stencil_buffer: bool,
    surface: Option<SurfaceHandle>,
    depth_stencil: Option<SurfaceHandle>,
    background: Color,
    /// `None` inherits from the defaults.
    clear_targets: Option<ClearTargets>,
    default_view: Viewport,
    projection: Option<Mat4>,
    needs_reset: bool,
    /// Surfaces were recreated and the device still points at the old ones.
    rebind_pending: bool,
    timer: FrameTimer,
    saved: Option<SavedActive>,
}

impl TargetState {
    fn size(&self) -> Size<i32> {
        Size::new(self.width as i32, self.height as i32)
    }

    fn create_surfaces(&mut self, device: &dyn RenderDevice) -> std::result::Result<(), DeviceError> {
        self.surface = Some(device.create_surface(self.width, self.height, SurfaceKind::Color)?);
        if self.use_depth_buffer || self.use_stencil_buffer {
            let kind = SurfaceKind::DepthStencil {
                stencil: self.use_stencil_buffer,
            };
            self.depth_stencil = Some(device.create_surface(self.width, self.height, kind)?);
        }
        Ok(())
    }

    fn release_surfaces(&mut self, device: &dyn RenderDevice) {
        if let Some(surface) = self.surface.take() {
            device.release_surface(surface);
        }
        if let Some(surface) = self.depth_stencil.take() {
            device.release_surface(surface);
        }
    }
}

pub struct RenderTarget {
    label: Option<&'static str>,
    lifecycle: Arc<DeviceLifecycleManager>,
    defaults: DefaultsContext,
    registration: RegistrationId,
    state: Mutex<TargetState>,
}

impl RenderTarget {
    /// Create a target and its surfaces.
    ///
    /// With the device attached but lost, the target is created without
    /// surfaces and flagged as needing a reset; they are built on the next
    /// device reset.
    pub fn new(
        lifecycle: Arc<DeviceLifecycleManager>,
        defaults: DefaultsContext,
        descriptor: RenderTargetDescriptor,
    ) -> Result<Arc<Self>> {
        if lifecycle.device().is_none() {
            return Err(RenderError::NoDevice);
        }

        let size = Size::new(descriptor.width as i32, descriptor.height as i32);
        let mut state = TargetState {
            width: descriptor.width,
            height: descriptor.height,
            use_depth_buffer: descriptor.use_depth_buffer,
            use_stencil_buffer: descriptor.use_stencil_buffer,
            surface: None,
            depth_stencil: None,
            background: descriptor.background,
            clear_targets: None,
            default_view: Viewport::full(size),
            projection: None,
            needs_reset: false,
            rebind_pending: false,
            timer: FrameTimer::new(),
            saved: None,
        };

        match lifecycle.usable_device() {
            Some(device) => {
                if let Err(source) = state.create_surfaces(device.as_ref()) {
                    state.release_surfaces(device.as_ref());
                    return Err(RenderError::ResourceCreation { source });
                }
            }
            None => state.needs_reset = true,
        }

        let target = Arc::new_cyclic(|weak: &Weak<RenderTarget>| {
            let resource: Weak<dyn DeviceResource> = weak.clone();
            Self {
                label: descriptor.label,
                registration: lifecycle.register(resource),
                lifecycle,
                defaults,
                state: Mutex::new(state),
            }
        });
        tracing::debug!(
            label = ?target.label,
            width = descriptor.width,
            height = descriptor.height,
            "Render target created"
        );
        Ok(target)
    }

    #[inline]
    pub fn label(&self) -> Option<&'static str> {
        self.label
    }

    pub fn width(&self) -> u32 {
        self.state.lock().width
    }

    pub fn height(&self) -> u32 {
        self.state.lock().height
    }

    /// `(color, depth_stencil)` surfaces. Both are `None` while the device is lost.
    pub fn surfaces(&self) -> (Option<SurfaceHandle>, Option<SurfaceHandle>) {
        let state = self.state.lock();
        (state.surface, state.depth_stencil)
    }

    pub fn has_depth_buffer(&self) -> bool {
        self.state.lock().use_depth_buffer
    }

    pub fn has_stencil_buffer(&self) -> bool {
        self.state.lock().use_stencil_buffer
    }

    /// Orthographic projection over the whole surface, recomputed after invalidation.
    pub fn projection(&self) -> Mat4 {
        let mut state = self.state.lock();
        let (width, height) = (state.width as f32, state.height as f32);
        *state
            .projection
            .get_or_insert_with(|| ortho_projection(0.0, 0.0, width, height))
    }

    pub fn invalidate_projection(&self) {
        self.state.lock().projection = None;
    }

    /// The full-surface view.
    pub fn default_view(&self) -> Viewport {
        self.state.lock().default_view
    }

    pub fn needs_reset(&self) -> bool {
        self.state.lock().needs_reset
    }

    pub fn mark_needs_reset(&self) {
        self.state.lock().needs_reset = true;
    }

    /// Whether the surfaces changed since they were last bound.
    pub fn rebind_pending(&self) -> bool {
        self.state.lock().rebind_pending
    }

    /// Surfaces to bind, clearing the pending flag.
    pub(crate) fn take_surfaces_for_bind(&self) -> (Option<SurfaceHandle>, Option<SurfaceHandle>) {
        let mut state = self.state.lock();
        state.rebind_pending = false;
        (state.surface, state.depth_stencil)
    }

    pub fn background(&self) -> Color {
        self.state.lock().background
    }

    pub fn set_background(&self, color: Color) {
        self.state.lock().background = color;
    }

    /// Buffers cleared by [`RenderTarget::update`].
    pub fn clear_targets(&self) -> ClearTargets {
        match self.state.lock().clear_targets {
            Some(targets) => targets,
            None => self.defaults.clear_targets(),
        }
    }

    pub fn set_clear_targets(&self, targets: ClearTargets) {
        self.state.lock().clear_targets = Some(targets);
    }

    pub fn inherits_clear_targets(&self) -> bool {
        self.state.lock().clear_targets.is_none()
    }

    /// Follow the defaults' clear targets again.
    pub fn inherit_clear_targets(&self) {
        self.state.lock().clear_targets = None;
    }

    /// Rebuild the default view to cover the whole surface.
    pub fn refresh(&self) {
        let mut state = self.state.lock();
        state.default_view = Viewport::full(state.size());
        state.projection = None;
    }

    /// Change the surface size, recreating surfaces when the device is usable.
    ///
    /// A renderer holding this target binds the new surfaces before its next
    /// draw or clear.
    pub fn resize(&self, width: u32, height: u32) -> Result<()> {
        {
            let mut state = self.state.lock();
            if state.width == width && state.height == height {
                return Ok(());
            }
            state.width = width;
            state.height = height;

            if let Some(device) = self.lifecycle.usable_device() {
                state.release_surfaces(device.as_ref());
                state.rebind_pending = true;
                state
                    .create_surfaces(device.as_ref())
                    .map_err(|source| RenderError::ResourceCreation { source })?;
            }
        }
        self.refresh();
        Ok(())
    }

    /// Frame timing for this target.
    pub fn timer(&self) -> FrameTimer {
        self.state.lock().timer.clone()
    }

    /// Make this the renderer's target with its full-surface view and no clip.
    ///
    /// The renderer's previous target and clip are kept until
    /// [`RenderTarget::restore_active`].
    pub fn set_active(self: &Arc<Self>, renderer: &mut BatchedRenderer) -> Result<()> {
        let saved = SavedActive {
            target: renderer.current_target().cloned(),
            clip: renderer.clipping_view().copied(),
        };

        renderer.set_render_target(Some(self.clone()))?;
        let (projection, view) = (self.projection(), self.default_view());
        renderer.set_active_view(projection, &view);
        {
            let mut state = self.state.lock();
            state.default_view = state.default_view.applied();
            if state.saved.is_none() {
                state.saved = Some(saved);
            }
        }
        renderer.set_clipping_view(None);
        Ok(())
    }

    /// Put back the target and clip that were active before [`RenderTarget::set_active`].
    pub fn restore_active(&self, renderer: &mut BatchedRenderer) -> Result<()> {
        let Some(saved) = self.state.lock().saved.take() else {
            return Ok(());
        };

        renderer.set_render_target(saved.target.clone())?;
        if let Some(target) = &saved.target {
            renderer.set_active_view(target.projection(), &target.default_view());
        }
        renderer.set_clipping_view(saved.clip);
        Ok(())
    }

    /// Per-frame hook: activate, clear to the background and advance the timer.
    ///
    /// Returns the frame delta. Nothing is cleared while the device is lost.
    pub fn update(self: &Arc<Self>, renderer: &mut BatchedRenderer) -> Result<Duration> {
        self.set_active(renderer)?;

        let targets = self.clear_targets();
        if !targets.is_empty() {
            renderer.clear(self.background(), 1.0, 0, targets)?;
        }
        Ok(self.state.lock().timer.tick())
    }
}

impl DeviceResource for RenderTarget {
    fn device_lost(&self, device: &dyn RenderDevice) {
        let mut state = self.state.lock();
        state.release_surfaces(device);
        state.needs_reset = true;
        state.timer.stop();
    }

    fn device_reset(&self, device: &dyn RenderDevice) {
        let mut state = self.state.lock();
        if let Err(err) = state.create_surfaces(device) {
            tracing::warn!(label = ?self.label, %err, "Failed to rebuild render target surfaces");
            state.release_surfaces(device);
            return;
        }
        state.needs_reset = false;
        state.rebind_pending = true;
        state.projection = None;
        state.default_view.mark_updated();
    }
}

impl Drop for RenderTarget {
    fn drop(&mut self) {
        self.lifecycle.unregister(self.registration);
        if let Some(device) = self.lifecycle.device() {
            self.state.get_mut().release_surfaces(device.as_ref());
        }
    }
}

impl std::fmt::Debug for RenderTarget {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.lock();
        f.debug_struct("RenderTarget")
            .field("label", &self.label)
            .field("width", &state.width)
            .field("height", &state.height)
            .field("surface", &state.surface)
            .field("depth_stencil", &state.depth_stencil)
            .field("needs_reset", &state.needs_reset)
            .finish()
    }
}
