use std::ops::Mul;

/// Axis-aligned rectangle with a top-left origin.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct Rect<T> {
    pub x: T,
    pub y: T,
    pub width: T,
    pub height: T,
}

impl<T> Rect<T> {
    pub const fn new(x: T, y: T, width: T, height: T) -> Self {
        Rect {
            x,
            y,
            width,
            height,
        }
    }
}

impl<T: Copy> Rect<T> {
    pub fn position(&self) -> Pos<T> {
        Pos {
            x: self.x,
            y: self.y,
        }
    }

    pub fn size(&self) -> Size<T> {
        Size {
            width: self.width,
            height: self.height,
        }
    }
}

impl Rect<i32> {
    pub const EMPTY: Rect<i32> = Rect::new(0, 0, 0, 0);

    pub fn from_size(size: Size<i32>) -> Self {
        Rect::new(0, 0, size.width, size.height)
    }

    #[inline]
    pub fn right(&self) -> i32 {
        self.x + self.width
    }

    #[inline]
    pub fn bottom(&self) -> i32 {
        self.y + self.height
    }

    pub fn is_empty(&self) -> bool {
        self.width <= 0 || self.height <= 0
    }

    /// Overlapping region of both rectangles, or [`Rect::EMPTY`] when disjoint.
    pub fn intersection(&self, other: &Rect<i32>) -> Rect<i32> {
        let left = self.x.max(other.x);
        let top = self.y.max(other.y);
        let right = self.right().min(other.right());
        let bottom = self.bottom().min(other.bottom());

        if right <= left || bottom <= top {
            return Rect::EMPTY;
        }
        Rect::new(left, top, right - left, bottom - top)
    }

    pub fn contains(&self, pos: Pos<i32>) -> bool {
        pos.x >= self.x && pos.y >= self.y && pos.x < self.right() && pos.y < self.bottom()
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct Size<T> {
    pub width: T,
    pub height: T,
}

impl<T> Size<T> {
    pub fn new(width: T, height: T) -> Self {
        Size { width, height }
    }

    pub fn cast<U: From<T>>(self) -> Size<U> {
        Size {
            width: U::from(self.width),
            height: U::from(self.height),
        }
    }
}

impl<T: Mul + Copy> Mul<T> for Size<T> {
    type Output = Size<<T as Mul>::Output>;

    fn mul(self, rhs: T) -> Self::Output {
        Size {
            width: self.width * rhs,
            height: self.height * rhs,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct Pos<T> {
    pub x: T,
    pub y: T,
}

impl<T> Pos<T> {
    pub fn new(x: T, y: T) -> Self {
        Pos { x, y }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn intersection_of_overlapping_rects() {
        let a = Rect::new(0, 0, 100, 100);
        let b = Rect::new(50, 25, 100, 100);
        assert_eq!(a.intersection(&b), Rect::new(50, 25, 50, 75));
    }

    #[test]
    fn disjoint_rects_intersect_to_empty() {
        let a = Rect::new(0, 0, 10, 10);
        let b = Rect::new(20, 20, 10, 10);
        assert_eq!(a.intersection(&b), Rect::EMPTY);
        assert!(a.intersection(&b).is_empty());
    }

    #[test]
    fn contains_excludes_far_edges() {
        let r = Rect::new(10, 10, 5, 5);
        assert!(r.contains(Pos::new(10, 10)));
        assert!(!r.contains(Pos::new(15, 10)));
    }

    #[test]
    fn size_scales_uniformly() {
        assert_eq!(Size::new(3, 4) * 2, Size::new(6, 8));
    }
}
