use glam::Mat4;
use vellum_core::geometry::{Rect, Size};

/// Orthographic projection for a top-left-origin pixel space, depth in `0..=1`.
pub fn ortho_projection(left: f32, top: f32, width: f32, height: f32) -> Mat4 {
    Mat4::orthographic_lh(left, left + width, top + height, top, 0.0, 1.0)
}

/// A rectangular region of a render target, used both as the active view and as a clip.
///
/// The `updated` flag records that the region changed since it was last
/// pushed to the device. It does not take part in equality.
#[derive(Debug, Clone, Copy)]
pub struct Viewport {
    rect: Rect<i32>,
    /// Surface the viewport is clipped against.
    bounds: Option<Size<i32>>,
    updated: bool,
}

impl Viewport {
    pub fn new(rect: Rect<i32>) -> Self {
        Self {
            rect,
            bounds: None,
            updated: true,
        }
    }

    /// A viewport covering a whole surface of the given size.
    pub fn full(size: Size<i32>) -> Self {
        Self::new(Rect::from_size(size)).with_bounds(size)
    }

    pub fn with_bounds(mut self, bounds: Size<i32>) -> Self {
        self.bounds = Some(bounds);
        self.updated = true;
        self
    }

    #[inline]
    pub fn rect(&self) -> Rect<i32> {
        self.rect
    }

    pub fn set_rect(&mut self, rect: Rect<i32>) {
        if self.rect != rect {
            self.rect = rect;
            self.updated = true;
        }
    }

    pub fn set_bounds(&mut self, bounds: Option<Size<i32>>) {
        if self.bounds != bounds {
            self.bounds = bounds;
            self.updated = true;
        }
    }

    #[inline]
    pub fn is_updated(&self) -> bool {
        self.updated
    }

    pub fn mark_updated(&mut self) {
        self.updated = true;
    }

    /// This viewport with the updated flag cleared.
    pub fn applied(mut self) -> Self {
        self.updated = false;
        self
    }

    /// The region that actually lands on the surface.
    pub fn clipped_dimensions(&self) -> Rect<i32> {
        match self.bounds {
            Some(bounds) => self.rect.intersection(&Rect::from_size(bounds)),
            None => self.rect,
        }
    }

    /// Projection mapping the clipped region onto the whole viewport.
    pub fn projection(&self) -> Mat4 {
        let clip = self.clipped_dimensions();
        ortho_projection(
            clip.x as f32,
            clip.y as f32,
            clip.width.max(1) as f32,
            clip.height.max(1) as f32,
        )
    }
}

impl PartialEq for Viewport {
    fn eq(&self, other: &Self) -> bool {
        self.rect == other.rect && self.bounds == other.bounds
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::Vec3;

    #[test]
    fn ortho_maps_corners() {
        let m = ortho_projection(0.0, 0.0, 800.0, 600.0);
        let top_left = m.project_point3(Vec3::new(0.0, 0.0, 0.0));
        let bottom_right = m.project_point3(Vec3::new(800.0, 600.0, 1.0));

        assert!((top_left.x + 1.0).abs() < 1e-5);
        assert!((top_left.y - 1.0).abs() < 1e-5);
        assert!((bottom_right.x - 1.0).abs() < 1e-5);
        assert!((bottom_right.y + 1.0).abs() < 1e-5);
        assert!((bottom_right.z - 1.0).abs() < 1e-5);
    }

    #[test]
    fn equality_ignores_updated_flag() {
        let a = Viewport::new(Rect::new(0, 0, 10, 10));
        let b = a.applied();
        assert_eq!(a, b);
        assert!(a.is_updated());
        assert!(!b.is_updated());
    }

    #[test]
    fn clipped_dimensions_respect_bounds() {
        let view = Viewport::new(Rect::new(-10, 20, 100, 100)).with_bounds(Size::new(64, 64));
        assert_eq!(view.clipped_dimensions(), Rect::new(0, 20, 64, 44));
    }

    #[test]
    fn set_rect_marks_updated_only_on_change() {
        let mut view = Viewport::new(Rect::new(0, 0, 4, 4)).applied();
        view.set_rect(Rect::new(0, 0, 4, 4));
        assert!(!view.is_updated());
        view.set_rect(Rect::new(1, 0, 4, 4));
        assert!(view.is_updated());
    }
}
