//! The batched 2D renderer.
//!
//! [`BatchedRenderer`] owns the state caches, the geometry batch and the
//! active target/view. Drawables go through [`BatchedRenderer::submit`]:
//! when a drawable's resolved state differs from the mirrored state, its
//! texture differs, or its vertices would not fit, the pending batch is
//! flushed and the new state applied before its vertices are written.

use std::sync::Arc;

use glam::Mat4;
use vellum_core::profiling::{new_frame, profile_function, profile_scope};
use vellum_device::{
    AddressMode, BlendFactor, ClearTargets, CompareFunction, CooperativeLevel, FilterMode,
    IndexBufferHandle, RenderDevice, TextureArg, TextureHandle, TextureOp, VertexBufferHandle,
    VertexDeclarationHandle,
};

use crate::batch::{DEFAULT_VERTEX_CAPACITY, GeometryBatch, Vertex};
use crate::blend::BlendingMode;
use crate::color::Color;
use crate::drawable::Drawable;
use crate::error::{RenderError, Result};
use crate::lifecycle::{DeviceLifecycleManager, DeviceStatus};
use crate::render_states::RenderStateCache;
use crate::sampler_states::SamplerStateCache;
use crate::shader::{ShaderBinding, ShaderId};
use crate::target::RenderTarget;
use crate::viewport::Viewport;
use crate::visual_state::{DefaultsContext, VisualAttributes};

/// Settings for [`BatchedRenderer::new`].
#[derive(Debug, Clone)]
pub struct RendererDescriptor {
    /// Vertices the batch holds before it must flush. Multiple of 4, at most 65536.
    pub vertex_capacity: usize,
    pub label: Option<&'static str>,
}

impl Default for RendererDescriptor {
    fn default() -> Self {
        Self {
            vertex_capacity: DEFAULT_VERTEX_CAPACITY,
            label: None,
        }
    }
}

/// Counters since the last [`BatchedRenderer::reset_stats`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RenderStats {
    /// Batches issued to the device.
    pub flushes: u32,
    /// Device draw calls, one per shader pass.
    pub draw_calls: u32,
    pub vertices: u64,
    pub primitives: u64,
    /// Submissions that required new state.
    pub state_changes: u32,
    /// Batches dropped because there was no target or usable device.
    pub discarded_batches: u32,
}

/// Stage 0 and pipeline toggles implied by a drawable's attributes.
#[derive(Debug, Clone, Copy, PartialEq)]
struct DerivedStates {
    alpha_test: bool,
    alpha_blend: bool,
    color_op: TextureOp,
    alpha_op: TextureOp,
    alpha_arg2: TextureArg,
    mag_filter: FilterMode,
    min_filter: FilterMode,
}

impl DerivedStates {
    fn from_attributes(attrs: &VisualAttributes) -> Self {
        let alpha_test = attrs.alpha_mask_function != CompareFunction::Always;
        let alpha_blend = !(attrs.source_blend == BlendFactor::One
            && attrs.destination_blend == BlendFactor::Zero);
        let color_op = if attrs.blending.color_additive {
            TextureOp::Add
        } else {
            TextureOp::Modulate
        };
        let (alpha_op, alpha_arg2) =
            if attrs.blending.mode == BlendingMode::None && !alpha_test {
                (TextureOp::Disable, TextureArg::Current)
            } else {
                (TextureOp::Modulate, TextureArg::Texture)
            };
        let (mag_filter, min_filter) = attrs.smoothing.filters();
        Self {
            alpha_test,
            alpha_blend,
            color_op,
            alpha_op,
            alpha_arg2,
            mag_filter,
            min_filter,
        }
    }
}

pub struct BatchedRenderer {
    label: Option<&'static str>,
    lifecycle: Arc<DeviceLifecycleManager>,
    defaults: DefaultsContext,
    render_states: RenderStateCache,
    sampler_states: SamplerStateCache,
    batch: GeometryBatch,
    /// Reused vertex scratch for submissions.
    scratch: Vec<Vertex>,

    current_target: Option<Arc<RenderTarget>>,
    active_view: Option<Viewport>,
    clipping_view: Option<Viewport>,
    projection: Mat4,
    shader: Option<ShaderBinding>,
    shader_key: Option<(ShaderId, u32)>,

    textures: Vec<Option<TextureHandle>>,
    vertex_declaration: Option<VertexDeclarationHandle>,
    quad_declaration: Option<VertexDeclarationHandle>,
    stream: Option<VertexBufferHandle>,
    index_stream: Option<IndexBufferHandle>,

    in_scene: bool,
    stats: RenderStats,
}

impl BatchedRenderer {
    pub fn new(
        lifecycle: Arc<DeviceLifecycleManager>,
        defaults: DefaultsContext,
        descriptor: RendererDescriptor,
    ) -> Result<Self> {
        let batch = GeometryBatch::new(descriptor.vertex_capacity)?;
        let stages = lifecycle.caps().max_texture_stages;

        let mut renderer = Self {
            label: descriptor.label,
            render_states: RenderStateCache::new(lifecycle.clone()),
            sampler_states: SamplerStateCache::new(lifecycle.clone(), stages),
            lifecycle,
            defaults,
            batch,
            scratch: Vec::new(),
            current_target: None,
            active_view: None,
            clipping_view: None,
            projection: Mat4::IDENTITY,
            shader: None,
            shader_key: None,
            textures: vec![None; stages.max(1) as usize],
            vertex_declaration: None,
            quad_declaration: None,
            stream: None,
            index_stream: None,
            in_scene: false,
            stats: RenderStats::default(),
        };
        renderer.seed_pipeline_state();

        if renderer.lifecycle.device().is_some() {
            renderer.sync_device();
        }
        Ok(renderer)
    }

    /// Mirror values for a 2D sprite pipeline. Forwarded once a device exists.
    fn seed_pipeline_state(&mut self) {
        let rs = &mut self.render_states;
        rs.set_alpha_blend_enabled(true);
        rs.set_source_blend(BlendFactor::SrcAlpha);
        rs.set_destination_blend(BlendFactor::OneMinusSrcAlpha);
        rs.set_depth_enabled(false);
        rs.set_lighting_enabled(false);
        rs.set_alpha_test_enabled(true);
        rs.set_alpha_test_function(CompareFunction::Greater);
        rs.set_alpha_test_value(1);
        rs.set_draw_last_pixel(true);

        let ss = &mut self.sampler_states;
        ss.set_color_op(0, TextureOp::Modulate);
        ss.set_color_arg1(0, TextureArg::Diffuse);
        ss.set_color_arg2(0, TextureArg::Texture);
        ss.set_alpha_op(0, TextureOp::Modulate);
        ss.set_alpha_arg1(0, TextureArg::Diffuse);
        ss.set_alpha_arg2(0, TextureArg::Texture);
        ss.set_address_u(0, AddressMode::ClampToEdge);
        ss.set_address_v(0, AddressMode::ClampToEdge);
    }

    /// Size per-stage shadows to the device and push every mirror.
    fn sync_device(&mut self) {
        let caps = self.lifecycle.caps();
        self.sampler_states.resize(caps.max_texture_stages);
        self.textures.resize(self.sampler_states.stage_count() as usize, None);
        if !caps.supports_scissor_test {
            self.render_states.set_scissor_test_enabled(false);
        }
        self.render_states.apply_all();
        self.sampler_states.apply_all();
    }

    /// `NoDevice -> Ready`: install `device` and push all mirrored state to it.
    pub fn attach_device(&mut self, device: Arc<dyn RenderDevice>) {
        self.lifecycle.attach_device(device);
        self.sync_device();
    }

    #[inline]
    pub fn label(&self) -> Option<&'static str> {
        self.label
    }

    #[inline]
    pub fn lifecycle(&self) -> &Arc<DeviceLifecycleManager> {
        &self.lifecycle
    }

    #[inline]
    pub fn defaults(&self) -> &DefaultsContext {
        &self.defaults
    }

    #[inline]
    pub fn render_states(&self) -> &RenderStateCache {
        &self.render_states
    }

    #[inline]
    pub fn render_states_mut(&mut self) -> &mut RenderStateCache {
        &mut self.render_states
    }

    #[inline]
    pub fn sampler_states(&self) -> &SamplerStateCache {
        &self.sampler_states
    }

    #[inline]
    pub fn sampler_states_mut(&mut self) -> &mut SamplerStateCache {
        &mut self.sampler_states
    }

    #[inline]
    pub fn batch(&self) -> &GeometryBatch {
        &self.batch
    }

    #[inline]
    pub fn stats(&self) -> RenderStats {
        self.stats
    }

    pub fn reset_stats(&mut self) {
        self.stats = RenderStats::default();
    }

    #[inline]
    pub fn current_target(&self) -> Option<&Arc<RenderTarget>> {
        self.current_target.as_ref()
    }

    #[inline]
    pub fn active_view(&self) -> Option<&Viewport> {
        self.active_view.as_ref()
    }

    #[inline]
    pub fn clipping_view(&self) -> Option<&Viewport> {
        self.clipping_view.as_ref()
    }

    #[inline]
    pub fn projection(&self) -> Mat4 {
        self.projection
    }

    #[inline]
    pub fn shader(&self) -> Option<&ShaderBinding> {
        self.shader.as_ref()
    }

    pub fn texture(&self, stage: u32) -> Option<TextureHandle> {
        self.textures.get(stage as usize).copied().flatten()
    }

    #[inline]
    pub fn vertex_declaration(&self) -> Option<VertexDeclarationHandle> {
        self.vertex_declaration
    }

    /// Flush pending geometry, then discard it and reallocate the batch.
    ///
    /// An invalid capacity is rejected before anything is flushed or released.
    pub fn set_batch_capacity(&mut self, vertex_capacity: usize) -> Result<()> {
        GeometryBatch::check_capacity(vertex_capacity)?;
        self.flush()?;
        if let Some(device) = self.lifecycle.device() {
            self.batch.release(device.as_ref());
        }
        self.stream = None;
        self.index_stream = None;
        self.batch.reserve(vertex_capacity)
    }

    // Targets and views

    /// Switch the destination surface. Pending geometry is flushed to the old target first.
    pub fn set_render_target(&mut self, target: Option<Arc<RenderTarget>>) -> Result<()> {
        let same = match (&self.current_target, &target) {
            (Some(a), Some(b)) => Arc::ptr_eq(a, b),
            (None, None) => true,
            _ => false,
        };
        if same {
            self.bind_rebuilt_surfaces();
            return Ok(());
        }

        self.flush()?;

        if let Some(target) = &target {
            if let Some(device) = self.lifecycle.usable_device() {
                let (color, depth_stencil) = target.take_surfaces_for_bind();
                device.set_render_target(color, depth_stencil);
            }
            target.invalidate_projection();
            tracing::debug!(label = ?target.label(), "Render target switched");
        }

        self.active_view = None;
        self.current_target = target;
        Ok(())
    }

    /// Bind the current target's surfaces again if they were recreated since the last bind.
    fn bind_rebuilt_surfaces(&mut self) {
        let Some(target) = &self.current_target else {
            return;
        };
        if !target.rebind_pending() {
            return;
        }
        let Some(device) = self.lifecycle.usable_device() else {
            return;
        };
        let (color, depth_stencil) = target.take_surfaces_for_bind();
        device.set_render_target(color, depth_stencil);
        tracing::debug!(label = ?target.label(), "Rebound recreated target surfaces");
    }

    /// Make `view` the device viewport with `projection`.
    ///
    /// Skipped when no target is active, or when `view` is already active
    /// and not marked updated. Viewport and scissor clipping are exclusive,
    /// so scissor testing is switched off.
    pub fn set_active_view(&mut self, projection: Mat4, view: &Viewport) {
        let changed = self.active_view.as_ref() != Some(view) || view.is_updated();
        if !changed || self.current_target.is_none() {
            return;
        }

        self.render_states.set_scissor_test_enabled(false);
        if let Some(device) = self.lifecycle.usable_device() {
            device.set_viewport(view.clipped_dimensions(), 0.0, 1.0);
            device.set_transform_projection(projection);
        }
        self.projection = projection;
        self.active_view = Some(view.applied());
    }

    /// Clip subsequent drawing to `clip`, or stop clipping.
    ///
    /// Uses the scissor test when the driver has one. Otherwise the clip is
    /// applied by making it the active view with its own projection, and
    /// clearing it restores the target's full-surface view.
    pub fn set_clipping_view(&mut self, clip: Option<Viewport>) {
        let supports_scissor = self.render_states.supports_scissor();

        if self.clipping_view != clip {
            if supports_scissor {
                match &clip {
                    Some(view) => {
                        self.render_states.set_scissor_test_enabled(true);
                        self.render_states.set_scissor_rect(view.clipped_dimensions());
                    }
                    None => self.render_states.set_scissor_test_enabled(false),
                }
            } else if let Some(view) = &clip {
                tracing::debug!(?view, "Clipping through viewport substitution");
                self.set_active_view(view.projection(), view);
            }
        }

        if clip.is_none() && !supports_scissor {
            self.restore_default_view();
        }

        self.clipping_view = clip;
    }

    /// Reapply the active target's default view if another view is active.
    fn restore_default_view(&mut self) {
        let Some(target) = self.current_target.clone() else {
            return;
        };
        let default_view = target.default_view();
        if self.active_view.as_ref() != Some(&default_view) {
            self.set_active_view(target.projection(), &default_view);
        }
    }

    // State resolution

    /// Whether drawing `drawable` needs state the caches do not currently hold.
    pub fn state_changed<D: Drawable + ?Sized>(&self, drawable: &D) -> bool {
        let attrs = drawable.visual_state().resolve();
        self.state_differs(drawable, &attrs)
    }

    fn state_differs<D: Drawable + ?Sized>(&self, drawable: &D, attrs: &VisualAttributes) -> bool {
        let derived = DerivedStates::from_attributes(attrs);
        let rs = self.render_states.values();
        let Some(stage) = self.sampler_states.stage(0) else {
            return true;
        };

        stage.address_u != attrs.wrap_h
            || stage.address_v != attrs.wrap_v
            || stage.mag_filter != derived.mag_filter
            || stage.min_filter != derived.min_filter
            || stage.color_op != derived.color_op
            || stage.color_arg1 != TextureArg::Diffuse
            || stage.color_arg2 != TextureArg::Texture
            || stage.alpha_op != derived.alpha_op
            || stage.alpha_arg1 != TextureArg::Diffuse
            || stage.alpha_arg2 != derived.alpha_arg2
            || rs.alpha_test_enable != derived.alpha_test
            || rs.alpha_function != attrs.alpha_mask_function
            || rs.alpha_reference != (attrs.alpha_mask_value & 0xFF)
            || rs.alpha_blend_enable != derived.alpha_blend
            || rs.source_blend != attrs.source_blend
            || rs.destination_blend != attrs.destination_blend
            || rs.stencil_enable != attrs.stencil_enabled
            || rs.stencil_reference != attrs.stencil_reference
            || rs.stencil_mask != attrs.stencil_mask
            || rs.stencil_pass != attrs.stencil_pass_operation
            || rs.stencil_fail != attrs.stencil_fail_operation
            || rs.stencil_zfail != attrs.stencil_zfail_operation
            || rs.stencil_compare != attrs.stencil_compare
            || rs.dither != self.defaults.dither()
            || self.shader_key != attrs.shader.as_ref().map(ShaderBinding::key)
            || self.batch.primitive_style() != drawable.primitive_style()
            || self.batch.uses_indices() != drawable.uses_indices()
            || self.clipping_view.as_ref() != drawable.clip_view()
    }

    /// Write `drawable`'s resolved state into the caches and the batch.
    pub fn set_states<D: Drawable + ?Sized>(&mut self, drawable: &D) {
        let attrs = drawable.visual_state().resolve();
        self.apply_states(drawable, attrs);
    }

    fn apply_states<D: Drawable + ?Sized>(&mut self, drawable: &D, attrs: VisualAttributes) {
        profile_function!();
        let derived = DerivedStates::from_attributes(&attrs);

        let ss = &mut self.sampler_states;
        ss.set_address_u(0, attrs.wrap_h);
        ss.set_address_v(0, attrs.wrap_v);
        ss.set_mag_filter(0, derived.mag_filter);
        ss.set_min_filter(0, derived.min_filter);
        ss.set_color_op(0, derived.color_op);
        ss.set_color_arg1(0, TextureArg::Diffuse);
        ss.set_color_arg2(0, TextureArg::Texture);
        ss.set_alpha_op(0, derived.alpha_op);
        ss.set_alpha_arg1(0, TextureArg::Diffuse);
        ss.set_alpha_arg2(0, derived.alpha_arg2);

        let rs = &mut self.render_states;
        rs.set_alpha_test_enabled(derived.alpha_test);
        rs.set_alpha_test_function(attrs.alpha_mask_function);
        rs.set_alpha_test_value(attrs.alpha_mask_value);
        rs.set_alpha_blend_enabled(derived.alpha_blend);
        rs.set_source_blend(attrs.source_blend);
        rs.set_destination_blend(attrs.destination_blend);
        rs.set_stencil_enabled(attrs.stencil_enabled);
        rs.set_stencil_reference(attrs.stencil_reference);
        rs.set_stencil_mask(attrs.stencil_mask);
        rs.set_stencil_pass_operation(attrs.stencil_pass_operation);
        rs.set_stencil_fail_operation(attrs.stencil_fail_operation);
        rs.set_stencil_zfail_operation(attrs.stencil_zfail_operation);
        rs.set_stencil_compare(attrs.stencil_compare);
        rs.set_dither_enabled(self.defaults.dither());

        self.set_clipping_view(drawable.clip_view().copied());

        self.shader_key = attrs.shader.as_ref().map(ShaderBinding::key);
        self.shader = attrs.shader;

        self.batch
            .set_primitive(drawable.primitive_style(), drawable.uses_indices());
    }

    // Submission

    /// Queue a drawable's geometry, flushing first if it cannot share the pending batch.
    ///
    /// Strip and fan styles cannot be concatenated, so they are flushed right
    /// after being written, as is any drawable submitted with `flush` set.
    pub fn submit<D: Drawable + ?Sized>(&mut self, drawable: &D, flush: bool) -> Result<()> {
        profile_function!();
        let mut vertices = std::mem::take(&mut self.scratch);
        vertices.clear();
        drawable.write_vertices(&mut vertices);
        let result = self.submit_vertices(drawable, &vertices, flush);
        self.scratch = vertices;
        result
    }

    fn submit_vertices<D: Drawable + ?Sized>(
        &mut self,
        drawable: &D,
        vertices: &[Vertex],
        flush: bool,
    ) -> Result<()> {
        let count = vertices.len();
        if count > self.batch.capacity() {
            return Err(RenderError::BatchOverflow {
                requested: count,
                capacity: self.batch.capacity(),
            });
        }
        if drawable.uses_indices() && count % 4 != 0 {
            return Err(RenderError::MisalignedQuadVertices { count });
        }

        if count > 0 {
            let attrs = drawable.visual_state().resolve();
            let texture = drawable.texture();
            let changed = self.state_differs(drawable, &attrs);

            if changed || texture != self.texture(0) || self.batch.would_overflow(count) {
                self.flush()?;
                if changed {
                    self.stats.state_changes += 1;
                    self.apply_states(drawable, attrs);
                }
            }

            self.set_texture(0, texture);
            self.batch.write(vertices)?;
        }

        if flush || drawable.primitive_style().is_connected() {
            self.flush()?;
        }
        Ok(())
    }

    /// Issue the pending batch as one draw (one per shader pass) and rewind it.
    ///
    /// Without an active target or a usable device the batch is discarded.
    pub fn flush(&mut self) -> Result<()> {
        profile_function!();
        self.release_if_lost();
        if self.batch.is_empty() {
            return Ok(());
        }

        if self.current_target.is_none() {
            tracing::warn!(
                vertices = self.batch.written(),
                "No active render target, discarding batch"
            );
            self.discard_batch();
            return Ok(());
        }
        let Some(device) = self.lifecycle.usable_device() else {
            self.discard_batch();
            return Ok(());
        };

        self.bind_rebuilt_surfaces();
        let result = self.issue_batch(device.as_ref());
        self.batch.reset();
        result
    }

    fn discard_batch(&mut self) {
        self.stats.discarded_batches += 1;
        self.batch.reset();
    }

    fn issue_batch(&mut self, device: &dyn RenderDevice) -> Result<()> {
        let (vertex_buffer, index_buffer) = self.batch.ensure_buffers(device)?;
        self.batch.upload(device, vertex_buffer);

        self.set_stream_source(Some(vertex_buffer))?;
        let uses_indices = self.batch.uses_indices();
        if uses_indices {
            self.set_indices(Some(index_buffer))?;
        }
        let declaration = self.quad_declaration(device)?;
        self.set_vertex_declaration(Some(declaration));

        let style = self.batch.primitive_style();
        let written = self.batch.written();
        let offset = self.batch.offset();
        let element_count = if uses_indices {
            self.batch.indices_written()
        } else {
            written
        };
        let primitive_count = style.primitive_count(element_count as u32);

        let draw = |device: &dyn RenderDevice| {
            if uses_indices {
                device.draw_indexed_primitives(
                    style,
                    offset as i32,
                    0,
                    written as u32,
                    0,
                    primitive_count,
                );
            } else {
                device.draw_primitives(style, offset as u32, primitive_count);
            }
        };

        let draw_calls = match &self.shader {
            Some(binding) => {
                profile_scope!("shader_passes");
                let effect = binding.effect();
                effect.commit_parameters(device);
                let passes = effect.begin(device);
                for pass in 0..passes {
                    effect.begin_pass(device, pass);
                    draw(device);
                    effect.end_pass(device);
                }
                effect.end(device);
                passes
            }
            None => {
                draw(device);
                1
            }
        };

        self.stats.flushes += 1;
        self.stats.draw_calls += draw_calls;
        self.stats.vertices += written as u64;
        self.stats.primitives += primitive_count as u64;
        tracing::trace!(
            %style,
            vertices = written,
            primitives = primitive_count,
            "Batch flushed"
        );
        Ok(())
    }

    fn quad_declaration(&mut self, device: &dyn RenderDevice) -> Result<VertexDeclarationHandle> {
        if let Some(declaration) = self.quad_declaration {
            return Ok(declaration);
        }
        let declaration = device
            .create_vertex_declaration(Vertex::STRIDE, &Vertex::ATTRIBUTES)
            .map_err(|source| RenderError::ResourceCreation { source })?;
        self.quad_declaration = Some(declaration);
        Ok(declaration)
    }

    // Bindings

    /// Bind `texture` to `stage` if it is not bound already.
    pub fn set_texture(&mut self, stage: u32, texture: Option<TextureHandle>) {
        let Some(slot) = self.textures.get_mut(stage as usize) else {
            tracing::warn!(stage, "Texture stage out of range");
            return;
        };
        if *slot == texture {
            return;
        }
        *slot = texture;
        if let Some(device) = self.lifecycle.usable_device() {
            device.set_texture(stage, texture);
        }
    }

    pub fn set_vertex_declaration(&mut self, declaration: Option<VertexDeclarationHandle>) {
        if self.vertex_declaration == declaration {
            return;
        }
        self.vertex_declaration = declaration;
        if let Some(device) = self.lifecycle.usable_device() {
            device.set_vertex_declaration(declaration);
        }
    }

    /// Bind the vertex stream. A device rejection is fatal to the frame.
    pub fn set_stream_source(&mut self, buffer: Option<VertexBufferHandle>) -> Result<()> {
        if self.stream == buffer {
            return Ok(());
        }
        let Some(device) = self.lifecycle.usable_device() else {
            return Ok(());
        };
        let stride = if buffer.is_some() { Vertex::STRIDE as u32 } else { 0 };
        if let Err(source) = device.set_stream_source(buffer, stride) {
            tracing::warn!(%source, "Vertex stream bind rejected");
            self.stream = None;
            return Err(RenderError::CannotBindStream { source });
        }
        self.stream = buffer;
        Ok(())
    }

    pub fn set_indices(&mut self, buffer: Option<IndexBufferHandle>) -> Result<()> {
        if self.index_stream == buffer {
            return Ok(());
        }
        let Some(device) = self.lifecycle.usable_device() else {
            return Ok(());
        };
        if let Err(source) = device.set_indices(buffer) {
            tracing::warn!(%source, "Index buffer bind rejected");
            self.index_stream = None;
            return Err(RenderError::CannotBindStream { source });
        }
        self.index_stream = buffer;
        Ok(())
    }

    // Frame

    /// Start a frame. Polls the device, driving the lost and reset transitions.
    ///
    /// Returns `false` when the device is not usable this frame.
    pub fn begin_rendering(&mut self) -> Result<bool> {
        let device = self.lifecycle.device().ok_or(RenderError::NoDevice)?;

        match (self.lifecycle.status(), device.check_cooperative_level()) {
            (DeviceStatus::Ready, CooperativeLevel::Ok) => {}
            (DeviceStatus::Ready, _) => self.device_lost(),
            (DeviceStatus::Lost, CooperativeLevel::NeedsReset | CooperativeLevel::Ok) => {
                self.reset_device()?;
            }
            _ => {}
        }

        if !self.lifecycle.is_usable() {
            return Ok(false);
        }
        device.begin_scene();
        self.in_scene = true;
        Ok(true)
    }

    /// Flush and close the frame's scene.
    pub fn end_rendering(&mut self) -> Result<()> {
        self.flush()?;
        if self.in_scene {
            if let Some(device) = self.lifecycle.usable_device() {
                device.end_scene();
            }
            self.in_scene = false;
        }
        Ok(())
    }

    /// Present the back buffer.
    ///
    /// A lost device is not an error here: the renderer moves to `Lost` and
    /// the active target is flagged as needing a reset.
    pub fn flip(&mut self) -> Result<()> {
        let device = self.lifecycle.device().ok_or(RenderError::NoDevice)?;
        new_frame();

        if !self.lifecycle.is_usable() {
            self.flag_target_reset();
            return Ok(());
        }

        if let Err(err) = device.present() {
            if err.is_device_lost() {
                self.device_lost();
                self.flag_target_reset();
            } else {
                tracing::warn!(%err, "Present failed");
            }
        }
        Ok(())
    }

    fn flag_target_reset(&self) {
        if let Some(target) = &self.current_target {
            target.mark_needs_reset();
        }
    }

    /// Clear the active target. Depth and stencil are only cleared when the target has them.
    pub fn clear(&mut self, color: Color, depth: f32, stencil: u32, targets: ClearTargets) -> Result<()> {
        if self.lifecycle.device().is_none() {
            return Err(RenderError::NoDevice);
        }
        let Some(target) = self.current_target.clone() else {
            return Ok(());
        };
        if !self.lifecycle.is_usable() {
            return Ok(());
        }

        let mut targets = targets;
        if !target.has_depth_buffer() {
            targets.remove(ClearTargets::DEPTH);
        }
        if !target.has_stencil_buffer() {
            targets.remove(ClearTargets::STENCIL);
        }
        if targets.is_empty() {
            return Ok(());
        }

        self.flush()?;
        self.bind_rebuilt_surfaces();
        if let Some(device) = self.lifecycle.usable_device() {
            device.clear(targets, color.to_wgpu(), depth, stencil);
        }
        Ok(())
    }

    // Device lifecycle

    /// `Ready -> Lost`: rewind and release the batch, then notify every registered resource.
    pub fn device_lost(&mut self) {
        if self.lifecycle.status() != DeviceStatus::Ready {
            return;
        }
        self.batch.reset();
        if let Some(device) = self.lifecycle.device() {
            self.batch.release(device.as_ref());
        }
        self.forget_bindings();
        self.in_scene = false;
        self.lifecycle.mark_lost();
    }

    /// Catch up with a loss reported to the lifecycle manager by someone else.
    fn release_if_lost(&mut self) {
        if self.lifecycle.is_usable() || !self.batch.has_device_buffers() {
            return;
        }
        self.batch.reset();
        if let Some(device) = self.lifecycle.device() {
            self.batch.release(device.as_ref());
        }
        self.forget_bindings();
    }

    fn forget_bindings(&mut self) {
        self.quad_declaration = None;
        self.stream = None;
        self.index_stream = None;
        self.active_view = None;
    }

    /// `Lost -> Resetting -> Ready`.
    ///
    /// Registered resources rebuild first, then every mirrored state is
    /// replayed and the stream, declaration and texture bindings are reset to
    /// null so the next assignment is always forwarded.
    pub fn reset_device(&mut self) -> Result<bool> {
        self.release_if_lost();
        if !self.lifecycle.begin_reset() {
            return Ok(false);
        }
        if !self.lifecycle.complete_reset() {
            return Ok(false);
        }

        self.sync_device();
        self.rebind_null()?;
        self.active_view = None;
        Ok(true)
    }

    fn rebind_null(&mut self) -> Result<()> {
        let Some(device) = self.lifecycle.usable_device() else {
            return Ok(());
        };
        if let Some(target) = &self.current_target {
            let (color, depth_stencil) = target.take_surfaces_for_bind();
            device.set_render_target(color, depth_stencil);
        }
        device.set_vertex_declaration(None);
        self.vertex_declaration = None;

        device
            .set_stream_source(None, 0)
            .map_err(|source| RenderError::CannotBindStream { source })?;
        self.stream = None;
        device
            .set_indices(None)
            .map_err(|source| RenderError::CannotBindStream { source })?;
        self.index_stream = None;

        for (stage, slot) in self.textures.iter_mut().enumerate() {
            device.set_texture(stage as u32, None);
            *slot = None;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::blend::Blending;
    use crate::drawable::{Renderable, Sprite};
    use glam::Vec2;
    use vellum_device::{DeviceCall, MockRenderDevice};

    fn renderer() -> (BatchedRenderer, Arc<MockRenderDevice>) {
        let lifecycle = DeviceLifecycleManager::new();
        let mut renderer =
            BatchedRenderer::new(lifecycle, DefaultsContext::new(), RendererDescriptor::default())
                .unwrap();
        let mock = Arc::new(MockRenderDevice::new());
        renderer.attach_device(mock.clone());
        (renderer, mock)
    }

    fn sprite(renderer: &BatchedRenderer) -> Renderable {
        Renderable::sprite(renderer.defaults(), Sprite::new(Vec2::ZERO, Vec2::splat(16.0)))
    }

    #[test]
    fn construction_pushes_seeded_state() {
        let (renderer, mock) = renderer();
        assert_eq!(mock.count_render_state_sets(), 28);
        assert!(!renderer.render_states().depth_enabled());
        assert!(renderer.render_states().alpha_blend_enabled());
        assert_eq!(
            renderer.sampler_states().address_u(0),
            Some(AddressMode::ClampToEdge)
        );
    }

    #[test]
    fn derived_states_for_modulated_blending() {
        let defaults = DefaultsContext::new();
        let mut traits = crate::visual_state::VisualStateTraits::new(&defaults);
        traits.set_blending(Blending::MODULATED);
        traits.set_alpha_mask_function(CompareFunction::Always);

        let derived = DerivedStates::from_attributes(&traits.resolve());
        assert!(derived.alpha_blend);
        assert!(!derived.alpha_test);
        assert_eq!(derived.color_op, TextureOp::Modulate);
        assert_eq!(derived.alpha_op, TextureOp::Modulate);
    }

    #[test]
    fn no_blending_and_no_alpha_test_disables_alpha_stage() {
        let defaults = DefaultsContext::new();
        let mut traits = crate::visual_state::VisualStateTraits::new(&defaults);
        traits.set_blending(Blending::NONE.with_color_additive(true));
        traits.set_alpha_mask_function(CompareFunction::Always);

        let derived = DerivedStates::from_attributes(&traits.resolve());
        assert!(!derived.alpha_blend);
        assert_eq!(derived.alpha_op, TextureOp::Disable);
        assert_eq!(derived.alpha_arg2, TextureArg::Current);
        assert_eq!(derived.color_op, TextureOp::Add);
    }

    #[test]
    fn set_states_settles_state_changed() {
        let (mut renderer, _mock) = renderer();
        let mut drawable = sprite(&renderer);
        drawable.visual_mut().set_alpha_mask_value(0x1_05);

        assert!(renderer.state_changed(&drawable));
        assert_eq!(renderer.state_changed(&drawable), renderer.state_changed(&drawable));

        renderer.set_states(&drawable);
        assert!(!renderer.state_changed(&drawable));
    }

    #[test]
    fn flush_without_target_discards() {
        let (mut renderer, mock) = renderer();
        let drawable = sprite(&renderer);
        renderer.submit(&drawable, false).unwrap();
        mock.clear_calls();

        renderer.flush().unwrap();

        assert_eq!(mock.count_draw_calls(), 0);
        assert!(renderer.batch().is_empty());
        assert_eq!(renderer.stats().discarded_batches, 1);
    }

    #[test]
    fn texture_binding_is_shadowed() {
        let (mut renderer, mock) = renderer();
        mock.clear_calls();

        renderer.set_texture(0, Some(TextureHandle(7)));
        renderer.set_texture(0, Some(TextureHandle(7)));
        renderer.set_texture(99, Some(TextureHandle(7)));

        assert_eq!(
            mock.calls(),
            vec![DeviceCall::SetTexture {
                stage: 0,
                texture: Some(TextureHandle(7))
            }]
        );
        assert_eq!(renderer.texture(0), Some(TextureHandle(7)));
    }

    #[test]
    fn oversized_drawable_is_rejected() {
        let lifecycle = DeviceLifecycleManager::new();
        let mut renderer = BatchedRenderer::new(
            lifecycle,
            DefaultsContext::new(),
            RendererDescriptor {
                vertex_capacity: 4,
                label: Some("tiny"),
            },
        )
        .unwrap();

        let text = Renderable::text(
            renderer.defaults(),
            crate::drawable::TextRun {
                origin: Vec2::ZERO,
                color: Color::WHITE,
                glyphs: vec![
                    crate::drawable::Glyph {
                        offset: Vec2::ZERO,
                        size: Vec2::ONE,
                        uv_min: Vec2::ZERO,
                        uv_max: Vec2::ONE,
                    };
                    2
                ],
            },
        );
        assert_eq!(
            renderer.submit(&text, false),
            Err(RenderError::BatchOverflow {
                requested: 8,
                capacity: 4
            })
        );
    }

    #[test]
    fn frame_calls_require_a_device() {
        let lifecycle = DeviceLifecycleManager::new();
        let mut renderer =
            BatchedRenderer::new(lifecycle, DefaultsContext::new(), RendererDescriptor::default())
                .unwrap();

        assert_eq!(renderer.begin_rendering(), Err(RenderError::NoDevice));
        assert_eq!(renderer.flip(), Err(RenderError::NoDevice));
        assert_eq!(
            renderer.clear(Color::BLACK, 1.0, 0, ClearTargets::BACK_BUFFER),
            Err(RenderError::NoDevice)
        );
    }
}
