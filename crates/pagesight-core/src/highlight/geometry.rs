//! Axis-aligned pixel rectangles.

use serde::{Deserialize, Serialize};

/// Pixel rectangle with its origin at the top-left corner.
///
/// `right()` and `bottom()` are exclusive edges.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Rect {
    /// Left edge
    pub x: u32,
    /// Top edge
    pub y: u32,
    /// Width in pixels
    pub width: u32,
    /// Height in pixels
    pub height: u32,
}

impl Rect {
    /// Creates a rectangle.
    pub const fn new(x: u32, y: u32, width: u32, height: u32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// Exclusive right edge.
    pub fn right(&self) -> u32 {
        self.x.saturating_add(self.width)
    }

    /// Exclusive bottom edge.
    pub fn bottom(&self) -> u32 {
        self.y.saturating_add(self.height)
    }

    /// Area in pixels.
    pub fn area(&self) -> u64 {
        self.width as u64 * self.height as u64
    }

    /// Returns true if the rectangle covers no pixels.
    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }

    /// Overlapping part of two rectangles, if they overlap.
    pub fn intersection(&self, other: &Rect) -> Option<Rect> {
        let x0 = self.x.max(other.x);
        let y0 = self.y.max(other.y);
        let x1 = self.right().min(other.right());
        let y1 = self.bottom().min(other.bottom());
        if x0 < x1 && y0 < y1 {
            Some(Rect::new(x0, y0, x1 - x0, y1 - y0))
        } else {
            None
        }
    }

    /// Smallest rectangle containing both.
    pub fn union(&self, other: &Rect) -> Rect {
        let x0 = self.x.min(other.x);
        let y0 = self.y.min(other.y);
        let x1 = self.right().max(other.right());
        let y1 = self.bottom().max(other.bottom());
        Rect::new(x0, y0, x1 - x0, y1 - y0)
    }

    /// Fraction of `self`'s area that lies inside `other` (0.0 for an empty
    /// rectangle).
    pub fn overlap_fraction(&self, other: &Rect) -> f32 {
        let area = self.area();
        if area == 0 {
            return 0.0;
        }
        let shared = self.intersection(other).map(|r| r.area()).unwrap_or(0);
        (shared as f64 / area as f64) as f32
    }

    /// Clips the rectangle to an image of the given size.
    pub fn clamp_to(&self, width: u32, height: u32) -> Option<Rect> {
        self.intersection(&Rect::new(0, 0, width, height))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_intersection() {
        let a = Rect::new(0, 0, 10, 10);
        let b = Rect::new(5, 5, 10, 10);
        assert_eq!(a.intersection(&b), Some(Rect::new(5, 5, 5, 5)));
        // Touching edges do not overlap
        assert_eq!(a.intersection(&Rect::new(10, 0, 5, 5)), None);
    }

    #[test]
    fn test_union() {
        let a = Rect::new(2, 3, 4, 4);
        let b = Rect::new(10, 1, 2, 2);
        assert_eq!(a.union(&b), Rect::new(2, 1, 10, 6));
    }

    #[test]
    fn test_overlap_fraction_uses_own_area() {
        let word = Rect::new(8, 0, 4, 2);
        let patch = Rect::new(0, 0, 10, 10);
        // Half of the word lies inside the patch
        assert!((word.overlap_fraction(&patch) - 0.5).abs() < 1e-6);
        assert_eq!(Rect::new(0, 0, 0, 5).overlap_fraction(&patch), 0.0);
    }

    #[test]
    fn test_clamp_to() {
        let r = Rect::new(90, 90, 20, 20);
        assert_eq!(r.clamp_to(100, 100), Some(Rect::new(90, 90, 10, 10)));
        assert_eq!(Rect::new(120, 0, 5, 5).clamp_to(100, 100), None);
    }
}
