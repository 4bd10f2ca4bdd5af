//! Image-space boxes and positions

use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::{Add, Div, Sub};

/// Sub-pixel position in image space
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Point {
    pub x: f32,
    pub y: f32,
}

impl Point {
    pub fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }

    /// Euclidean distance to another point
    pub fn distance(&self, other: &Point) -> f32 {
        (self.x - other.x).hypot(self.y - other.y)
    }

    pub fn is_finite(&self) -> bool {
        self.x.is_finite() && self.y.is_finite()
    }
}

impl Add for Point {
    type Output = Point;

    fn add(self, rhs: Point) -> Point {
        Point::new(self.x + rhs.x, self.y + rhs.y)
    }
}

impl Sub for Point {
    type Output = Point;

    fn sub(self, rhs: Point) -> Point {
        Point::new(self.x - rhs.x, self.y - rhs.y)
    }
}

impl Div<f32> for Point {
    type Output = Point;

    fn div(self, rhs: f32) -> Point {
        Point::new(self.x / rhs, self.y / rhs)
    }
}

impl fmt::Display for Point {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({:.1}, {:.1})", self.x, self.y)
    }
}

/// Axis-aligned box in integer pixel coordinates, `max` exclusive
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Bbox {
    pub xmin: i32,
    pub ymin: i32,
    pub xmax: i32,
    pub ymax: i32,
}

impl Bbox {
    pub fn new(xmin: i32, ymin: i32, xmax: i32, ymax: i32) -> Self {
        Self {
            xmin,
            ymin,
            xmax,
            ymax,
        }
    }

    /// Box of the given size whose centre is `(cx, cy)`
    pub fn centered(cx: i32, cy: i32, width: i32, height: i32) -> Self {
        Self::new(
            cx - width / 2,
            cy - height / 2,
            cx - width / 2 + width,
            cy - height / 2 + height,
        )
    }

    pub fn width(&self) -> i32 {
        self.xmax - self.xmin
    }

    pub fn height(&self) -> i32 {
        self.ymax - self.ymin
    }

    pub fn area(&self) -> i64 {
        if self.is_empty() {
            0
        } else {
            self.width() as i64 * self.height() as i64
        }
    }

    pub fn is_empty(&self) -> bool {
        self.xmin >= self.xmax || self.ymin >= self.ymax
    }

    pub fn center(&self) -> Point {
        Point::new(
            (self.xmin + self.xmax) as f32 / 2.0,
            (self.ymin + self.ymax) as f32 / 2.0,
        )
    }

    /// Whether `p` lies inside the box (`min <= p < max`)
    pub fn contains(&self, p: &Point) -> bool {
        p.x >= self.xmin as f32
            && p.x < self.xmax as f32
            && p.y >= self.ymin as f32
            && p.y < self.ymax as f32
    }

    /// Overlapping region of two boxes, `None` when they do not overlap
    pub fn intersect(&self, other: &Bbox) -> Option<Bbox> {
        let clipped = Bbox::new(
            self.xmin.max(other.xmin),
            self.ymin.max(other.ymin),
            self.xmax.min(other.xmax),
            self.ymax.min(other.ymax),
        );
        if clipped.is_empty() {
            None
        } else {
            Some(clipped)
        }
    }
}

impl fmt::Display for Bbox {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{}, {}, {}, {}]",
            self.xmin, self.ymin, self.xmax, self.ymax
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn test_center_and_distance() {
        let b = Bbox::new(80, 60, 130, 136);
        let c = b.center();
        assert_abs_diff_eq!(c.x, 105.0);
        assert_abs_diff_eq!(c.y, 98.0);
        assert_abs_diff_eq!(c.distance(&Point::new(100.0, 100.0)), 29f32.sqrt(), epsilon = 1e-5);
    }

    #[test]
    fn test_centered_keeps_size() {
        let b = Bbox::centered(100, 100, 41, 80);
        assert_eq!(b.width(), 41);
        assert_eq!(b.height(), 80);
    }

    #[test]
    fn test_contains_is_max_exclusive() {
        let frame = Bbox::new(0, 0, 640, 480);
        assert!(frame.contains(&Point::new(0.0, 0.0)));
        assert!(frame.contains(&Point::new(639.5, 479.0)));
        assert!(!frame.contains(&Point::new(640.0, 10.0)));
        assert!(!frame.contains(&Point::new(10.0, -0.5)));
    }

    #[test]
    fn test_intersect() {
        let frame = Bbox::new(0, 0, 640, 480);
        let partial = Bbox::new(-20, 400, 50, 520);
        assert_eq!(frame.intersect(&partial), Some(Bbox::new(0, 400, 50, 480)));
        assert_eq!(frame.intersect(&Bbox::new(700, 0, 800, 10)), None);
        assert_eq!(Bbox::new(5, 5, 5, 10).area(), 0);
    }
}
