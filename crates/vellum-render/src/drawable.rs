//! Drawable objects fed to the batched renderer.

use glam::Vec2;
use vellum_device::{PrimitiveStyle, TextureHandle};

use crate::batch::Vertex;
use crate::color::Color;
use crate::error::Result;
use crate::renderer::BatchedRenderer;
use crate::viewport::Viewport;
use crate::visual_state::{DefaultsContext, VisualStateTraits};

/// What the renderer needs from anything it draws.
pub trait Drawable {
    fn visual_state(&self) -> &VisualStateTraits;

    fn primitive_style(&self) -> PrimitiveStyle;

    /// Indexed drawables emit whole quads and use the shared quad index pattern.
    fn uses_indices(&self) -> bool;

    /// Region this drawable is clipped to, if any.
    fn clip_view(&self) -> Option<&Viewport>;

    /// Texture bound to stage 0 while drawing.
    fn texture(&self) -> Option<TextureHandle>;

    /// Append this drawable's vertices to `out`.
    fn write_vertices(&self, out: &mut Vec<Vertex>);
}

/// A textured, tinted quad.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Sprite {
    pub position: Vec2,
    pub size: Vec2,
    pub uv_min: Vec2,
    pub uv_max: Vec2,
    pub color: Color,
    pub depth: f32,
}

impl Sprite {
    pub fn new(position: Vec2, size: Vec2) -> Self {
        Self {
            position,
            size,
            uv_min: Vec2::ZERO,
            uv_max: Vec2::ONE,
            color: Color::WHITE,
            depth: 0.0,
        }
    }
}

/// Free-form vertices drawn without indices.
#[derive(Debug, Clone, PartialEq)]
pub struct PrimitiveBatch {
    pub style: PrimitiveStyle,
    pub vertices: Vec<Vertex>,
}

/// One laid-out glyph quad, relative to its run's origin.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Glyph {
    pub offset: Vec2,
    pub size: Vec2,
    pub uv_min: Vec2,
    pub uv_max: Vec2,
}

/// Pre-shaped text sampled from a glyph atlas.
#[derive(Debug, Clone, PartialEq)]
pub struct TextRun {
    pub origin: Vec2,
    pub color: Color,
    pub glyphs: Vec<Glyph>,
}

/// Geometry carried by a [`Renderable`].
#[derive(Debug, Clone, PartialEq)]
pub enum DrawPayload {
    Sprite(Sprite),
    Primitive(PrimitiveBatch),
    Text(TextRun),
}

/// Corners in top-left, top-right, bottom-right, bottom-left order to match the quad index pattern.
fn push_quad(out: &mut Vec<Vertex>, min: Vec2, max: Vec2, uv_min: Vec2, uv_max: Vec2, color: u32, depth: f32) {
    out.extend_from_slice(&[
        Vertex::new([min.x, min.y, depth], color, [uv_min.x, uv_min.y]),
        Vertex::new([max.x, min.y, depth], color, [uv_max.x, uv_min.y]),
        Vertex::new([max.x, max.y, depth], color, [uv_max.x, uv_max.y]),
        Vertex::new([min.x, max.y, depth], color, [uv_min.x, uv_max.y]),
    ]);
}

/// A drawable: visual attributes plus a payload.
#[derive(Debug, Clone)]
pub struct Renderable {
    visual: VisualStateTraits,
    payload: DrawPayload,
    texture: Option<TextureHandle>,
    clip: Option<Viewport>,
}

impl Renderable {
    pub fn new(defaults: &DefaultsContext, payload: DrawPayload) -> Self {
        Self {
            visual: VisualStateTraits::new(defaults),
            payload,
            texture: None,
            clip: None,
        }
    }

    pub fn sprite(defaults: &DefaultsContext, sprite: Sprite) -> Self {
        Self::new(defaults, DrawPayload::Sprite(sprite))
    }

    pub fn primitive(defaults: &DefaultsContext, style: PrimitiveStyle, vertices: Vec<Vertex>) -> Self {
        Self::new(defaults, DrawPayload::Primitive(PrimitiveBatch { style, vertices }))
    }

    pub fn text(defaults: &DefaultsContext, run: TextRun) -> Self {
        Self::new(defaults, DrawPayload::Text(run))
    }

    pub fn with_texture(mut self, texture: TextureHandle) -> Self {
        self.texture = Some(texture);
        self
    }

    pub fn with_clip(mut self, clip: Viewport) -> Self {
        self.clip = Some(clip);
        self
    }

    #[inline]
    pub fn visual(&self) -> &VisualStateTraits {
        &self.visual
    }

    #[inline]
    pub fn visual_mut(&mut self) -> &mut VisualStateTraits {
        &mut self.visual
    }

    #[inline]
    pub fn payload(&self) -> &DrawPayload {
        &self.payload
    }

    #[inline]
    pub fn payload_mut(&mut self) -> &mut DrawPayload {
        &mut self.payload
    }

    pub fn set_texture(&mut self, texture: Option<TextureHandle>) {
        self.texture = texture;
    }

    pub fn set_clip(&mut self, clip: Option<Viewport>) {
        self.clip = clip;
    }

    /// Queue this drawable, flushing immediately when `flush` is set.
    pub fn draw(&self, renderer: &mut BatchedRenderer, flush: bool) -> Result<()> {
        renderer.submit(self, flush)
    }
}

impl Drawable for Renderable {
    fn visual_state(&self) -> &VisualStateTraits {
        &self.visual
    }

    fn primitive_style(&self) -> PrimitiveStyle {
        match &self.payload {
            DrawPayload::Sprite(_) | DrawPayload::Text(_) => PrimitiveStyle::TriangleList,
            DrawPayload::Primitive(batch) => batch.style,
        }
    }

    fn uses_indices(&self) -> bool {
        match &self.payload {
            DrawPayload::Sprite(_) | DrawPayload::Text(_) => true,
            DrawPayload::Primitive(_) => false,
        }
    }

    fn clip_view(&self) -> Option<&Viewport> {
        self.clip.as_ref()
    }

    fn texture(&self) -> Option<TextureHandle> {
        self.texture
    }

    fn write_vertices(&self, out: &mut Vec<Vertex>) {
        match &self.payload {
            DrawPayload::Sprite(sprite) => push_quad(
                out,
                sprite.position,
                sprite.position + sprite.size,
                sprite.uv_min,
                sprite.uv_max,
                sprite.color.to_packed_argb(),
                sprite.depth,
            ),
            DrawPayload::Primitive(batch) => out.extend_from_slice(&batch.vertices),
            DrawPayload::Text(run) => {
                let color = run.color.to_packed_argb();
                for glyph in &run.glyphs {
                    let min = run.origin + glyph.offset;
                    push_quad(out, min, min + glyph.size, glyph.uv_min, glyph.uv_max, color, 0.0);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sprite_emits_one_quad() {
        let defaults = DefaultsContext::new();
        let sprite = Renderable::sprite(&defaults, Sprite::new(Vec2::new(10.0, 20.0), Vec2::new(4.0, 2.0)));

        let mut out = Vec::new();
        sprite.write_vertices(&mut out);

        assert_eq!(out.len(), 4);
        assert_eq!(out[0].position, [10.0, 20.0, 0.0]);
        assert_eq!(out[2].position, [14.0, 22.0, 0.0]);
        assert_eq!(out[3].uv, [0.0, 1.0]);
        assert!(sprite.uses_indices());
        assert_eq!(sprite.primitive_style(), PrimitiveStyle::TriangleList);
    }

    #[test]
    fn text_emits_a_quad_per_glyph() {
        let defaults = DefaultsContext::new();
        let glyph = Glyph {
            offset: Vec2::ZERO,
            size: Vec2::splat(8.0),
            uv_min: Vec2::ZERO,
            uv_max: Vec2::splat(0.5),
        };
        let text = Renderable::text(
            &defaults,
            TextRun {
                origin: Vec2::new(1.0, 1.0),
                color: Color::BLACK,
                glyphs: vec![glyph, Glyph { offset: Vec2::new(8.0, 0.0), ..glyph }],
            },
        );

        let mut out = Vec::new();
        text.write_vertices(&mut out);
        assert_eq!(out.len(), 8);
        assert_eq!(out[4].position, [9.0, 1.0, 0.0]);
        assert_eq!(out[0].color, 0xFF00_0000);
    }

    #[test]
    fn primitives_are_not_indexed() {
        let defaults = DefaultsContext::new();
        let line = Renderable::primitive(
            &defaults,
            PrimitiveStyle::LineList,
            vec![Vertex::new([0.0; 3], 0, [0.0; 2]); 2],
        );
        assert!(!line.uses_indices());
        assert_eq!(line.primitive_style(), PrimitiveStyle::LineList);
    }
}
