//! Planar geometry in device coordinates.
//!
//! One unit along X is one site column pitch; Y is measured in site rows.

use serde::{Deserialize, Serialize};

/// A point in continuous device coordinates.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Point {
    /// Horizontal coordinate.
    pub x: f64,
    /// Vertical coordinate.
    pub y: f64,
}

impl Point {
    /// Creates a point.
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    /// Weighted Manhattan distance, `|dx| + y2x * |dy|`.
    pub fn displacement(self, other: Point, y2x: f64) -> f64 {
        (self.x - other.x).abs() + y2x * (self.y - other.y).abs()
    }

    /// Returns `true` if both coordinates are finite.
    pub fn is_finite(self) -> bool {
        self.x.is_finite() && self.y.is_finite()
    }
}

/// An axis-aligned rectangle, `left <= right` and `bottom <= top`.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Rect {
    /// Minimum X.
    pub left: f64,
    /// Maximum X.
    pub right: f64,
    /// Minimum Y.
    pub bottom: f64,
    /// Maximum Y.
    pub top: f64,
}

impl Rect {
    /// Creates a rectangle from its four bounds.
    pub fn new(left: f64, right: f64, bottom: f64, top: f64) -> Self {
        Self {
            left,
            right,
            bottom,
            top,
        }
    }

    /// An inverted rectangle that grows to the first point it includes.
    pub fn empty() -> Self {
        Self::new(f64::MAX, f64::MIN, f64::MAX, f64::MIN)
    }

    /// Horizontal extent.
    pub fn width(&self) -> f64 {
        self.right - self.left
    }

    /// Vertical extent.
    pub fn height(&self) -> f64 {
        self.top - self.bottom
    }

    /// Area, zero for degenerate rectangles.
    pub fn area(&self) -> f64 {
        self.width().max(0.0) * self.height().max(0.0)
    }

    /// Center point.
    pub fn center(&self) -> Point {
        Point::new(
            (self.left + self.right) / 2.0,
            (self.bottom + self.top) / 2.0,
        )
    }

    /// Closed containment test.
    pub fn contains(&self, p: Point) -> bool {
        p.x >= self.left && p.x <= self.right && p.y >= self.bottom && p.y <= self.top
    }

    /// Grows the rectangle to include `p`.
    pub fn include(&mut self, p: Point) {
        self.left = self.left.min(p.x);
        self.right = self.right.max(p.x);
        self.bottom = self.bottom.min(p.y);
        self.top = self.top.max(p.y);
    }

    /// Half-perimeter with the vertical span weighted by `y2x`.
    pub fn half_perimeter(&self, y2x: f64) -> f64 {
        self.width().max(0.0) + y2x * self.height().max(0.0)
    }

    /// Weighted Manhattan distance from `p` to the rectangle, zero inside.
    pub fn distance_to(&self, p: Point, y2x: f64) -> f64 {
        let dx = if p.x < self.left {
            self.left - p.x
        } else if p.x > self.right {
            p.x - self.right
        } else {
            0.0
        };
        let dy = if p.y < self.bottom {
            self.bottom - p.y
        } else if p.y > self.top {
            p.y - self.top
        } else {
            0.0
        };
        dx + y2x * dy
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn displacement_weights_vertical_axis() {
        let a = Point::new(1.0, 1.0);
        let b = Point::new(4.0, 3.0);
        assert_eq!(a.displacement(b, 1.0), 5.0);
        assert_eq!(a.displacement(b, 0.5), 4.0);
    }

    #[test]
    fn empty_rect_grows_to_points() {
        let mut r = Rect::empty();
        r.include(Point::new(2.0, 5.0));
        r.include(Point::new(-1.0, 7.0));
        assert_eq!(r, Rect::new(-1.0, 2.0, 5.0, 7.0));
        assert_eq!(r.half_perimeter(1.0), 5.0);
        assert_eq!(r.half_perimeter(2.0), 7.0);
    }

    #[test]
    fn distance_is_zero_inside() {
        let r = Rect::new(0.0, 10.0, 0.0, 10.0);
        assert_eq!(r.distance_to(Point::new(5.0, 5.0), 1.0), 0.0);
        assert_eq!(r.distance_to(Point::new(12.0, -3.0), 1.0), 5.0);
        assert!(r.contains(Point::new(10.0, 0.0)));
        assert_eq!(r.center(), Point::new(5.0, 5.0));
        assert_eq!(r.area(), 100.0);
    }
}
