//! Coordinate handling shared by the capture surface and the compositor.

use serde::{Deserialize, Serialize};

/// A position in surface-local space.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Point {
    pub x: f32,
    pub y: f32,
}

impl Point {
    pub const fn new(x: f32, y: f32) -> Self {
        Point { x, y }
    }
}

/// Uniform factor between the backing pixel buffer and its displayed box.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ScaleCorrection {
    factor: f32,
}

impl Default for ScaleCorrection {
    fn default() -> Self {
        ScaleCorrection::IDENTITY
    }
}

impl ScaleCorrection {
    pub const IDENTITY: ScaleCorrection = ScaleCorrection { factor: 1.0 };

    /// Builds a correction from an explicit factor. Returns `None` unless `factor > 0`.
    pub fn from_factor(factor: f32) -> Option<Self> {
        (factor.is_finite() && factor > 0.0).then_some(ScaleCorrection { factor })
    }

    /// Measures the correction for a `backing` buffer shown at `displayed` size.
    ///
    /// The smaller of the two axis ratios is used. A degenerate display box
    /// (zero or negative size, not yet laid out) gives the identity.
    pub fn measure(backing: (u32, u32), displayed: (f32, f32)) -> Self {
        let rx = backing.0 as f32 / displayed.0;
        let ry = backing.1 as f32 / displayed.1;
        ScaleCorrection::from_factor(rx.min(ry)).unwrap_or(ScaleCorrection::IDENTITY)
    }

    pub fn factor(&self) -> f32 {
        self.factor
    }

    /// Maps a raw event coordinate, relative to the bounding box, to surface space.
    pub fn to_surface(&self, raw: Point) -> Point {
        Point::new(raw.x / self.factor, raw.y / self.factor)
    }
}

/// Where an image lands on a page, in PDF user-space units.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Placement {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

impl Placement {
    /// Scales an image of `image_px` pixels by `scale`, flush with the right
    /// edge of the page and `bottom_offset` units above its bottom edge.
    ///
    /// Nothing checks that the result fits on the page.
    pub fn bottom_right(page_width: f32, image_px: (u32, u32), scale: f32, bottom_offset: f32) -> Self {
        let width = image_px.0 as f32 * scale;
        let height = image_px.1 as f32 * scale;
        Placement {
            x: page_width - width,
            y: bottom_offset,
            width,
            height,
        }
    }

    /// Operands of the `cm` operator that maps the unit square onto this placement.
    pub fn to_matrix(&self) -> [f32; 6] {
        [self.width, 0.0, 0.0, self.height, self.x, self.y]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn measure_uses_smaller_ratio() {
        let s = ScaleCorrection::measure((660, 400), (330.0, 100.0));
        assert_eq!(s.factor(), 2.0);
        let s = ScaleCorrection::measure((330, 200), (330.0, 200.0));
        assert_eq!(s.factor(), 1.0);
    }

    #[test]
    fn measure_degenerate_box_is_identity() {
        assert_eq!(ScaleCorrection::measure((330, 200), (0.0, 0.0)), ScaleCorrection::IDENTITY);
        assert_eq!(ScaleCorrection::measure((330, 200), (-5.0, 10.0)), ScaleCorrection::IDENTITY);
        assert!(ScaleCorrection::from_factor(0.0).is_none());
        assert!(ScaleCorrection::from_factor(f32::NAN).is_none());
    }

    #[test]
    fn raw_coordinates_are_divided_by_factor() {
        for factor in [0.5, 1.0, 2.0, 3.0] {
            let s = ScaleCorrection::from_factor(factor).unwrap();
            let p = s.to_surface(Point::new(120.0, 60.0));
            assert_eq!(p, Point::new(120.0 / factor, 60.0 / factor));
        }
    }

    #[test]
    fn placement_is_half_size_bottom_right() {
        let p = Placement::bottom_right(612.0, (330, 200), 0.5, 25.0);
        assert_eq!(p.width, 165.0);
        assert_eq!(p.height, 100.0);
        assert_eq!(p.x, 612.0 - 165.0);
        assert_eq!(p.y, 25.0);
        assert_eq!(p.to_matrix(), [165.0, 0.0, 0.0, 100.0, 447.0, 25.0]);
    }

    #[test]
    fn placement_may_leave_small_pages() {
        let p = Placement::bottom_right(100.0, (330, 200), 0.5, 25.0);
        assert!(p.x < 0.0);
    }
}
