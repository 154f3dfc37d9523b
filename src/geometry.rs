//! Grid geometry. Persisted geometry is whole grid cells; only transient drag
//! previews carry fractional values.

use serde::{Deserialize, Serialize};

/// Pixel height of one grid row, shared by every container.
pub const UNIT_HEIGHT: f64 = 8.0;

/// Rectangle in grid cells.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Rect {
    pub x: u32,
    pub y: u32,
    pub w: u32,
    pub h: u32,
}

impl Rect {
    pub const fn new(x: u32, y: u32, w: u32, h: u32) -> Self {
        Self { x, y, w, h }
    }

    pub fn bottom(&self) -> u32 {
        self.y.saturating_add(self.h)
    }

    pub fn right(&self) -> u32 {
        self.x.saturating_add(self.w)
    }

    pub fn is_empty(&self) -> bool {
        self.w == 0 || self.h == 0
    }

    /// Column spans share at least one cell.
    pub fn overlaps_columns(&self, other: &Rect) -> bool {
        self.x < other.right() && other.x < self.right()
    }

    /// True when the two rectangles share at least one cell ("crossing").
    pub fn intersects(&self, other: &Rect) -> bool {
        if self.is_empty() || other.is_empty() {
            return false;
        }
        self.overlaps_columns(other) && self.y < other.bottom() && other.y < self.bottom()
    }

    /// Smallest rectangle covering both.
    pub fn union(&self, other: &Rect) -> Rect {
        let x = self.x.min(other.x);
        let y = self.y.min(other.y);
        Rect::new(
            x,
            y,
            self.right().max(other.right()) - x,
            self.bottom().max(other.bottom()) - y,
        )
    }

    pub fn with_y(self, y: u32) -> Rect {
        Rect { y, ..self }
    }

    pub fn with_h(self, h: u32) -> Rect {
        Rect { h, ..self }
    }

    /// Convert to pixel space with a container-specific column width.
    pub fn to_pixels(&self, unit_w: f64) -> PixelRect {
        PixelRect {
            left: f64::from(self.x) * unit_w,
            top: f64::from(self.y) * UNIT_HEIGHT,
            width: f64::from(self.w) * unit_w,
            height: f64::from(self.h) * UNIT_HEIGHT,
        }
    }
}

/// Evaluator-side geometry. May be fractional while a drag or resize preview
/// is in flight; snapped back to whole cells on commit.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct LayoutInfo {
    pub x: f64,
    pub y: f64,
    pub w: f64,
    pub h: f64,
}

impl LayoutInfo {
    pub const fn new(x: f64, y: f64, w: f64, h: f64) -> Self {
        Self { x, y, w, h }
    }

    /// Round to the nearest whole cell, clamping negatives to zero.
    pub fn snap(&self) -> Rect {
        fn cell(v: f64) -> u32 {
            if v.is_finite() && v > 0.0 {
                v.round().min(f64::from(u32::MAX)) as u32
            } else {
                0
            }
        }
        Rect::new(cell(self.x), cell(self.y), cell(self.w), cell(self.h))
    }

    pub fn to_pixels(&self, unit_w: f64) -> PixelRect {
        PixelRect {
            left: self.x * unit_w,
            top: self.y * UNIT_HEIGHT,
            width: self.w * unit_w,
            height: self.h * UNIT_HEIGHT,
        }
    }
}

impl From<Rect> for LayoutInfo {
    fn from(rect: Rect) -> Self {
        Self::new(
            f64::from(rect.x),
            f64::from(rect.y),
            f64::from(rect.w),
            f64::from(rect.h),
        )
    }
}

/// Rectangle in CSS pixels, used for hit-testing and rendering.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
pub struct PixelRect {
    pub left: f64,
    pub top: f64,
    pub width: f64,
    pub height: f64,
}

/// Column width in pixels for a container of `width_px` split into `columns`.
pub fn unit_width(width_px: f64, columns: u32) -> f64 {
    if columns == 0 {
        return 0.0;
    }
    width_px / f64::from(columns)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn touching_edges_do_not_intersect() {
        let a = Rect::new(0, 0, 4, 4);
        let b = Rect::new(0, 4, 4, 4);
        let c = Rect::new(4, 0, 4, 4);
        assert!(!a.intersects(&b));
        assert!(!a.intersects(&c));
        assert!(a.intersects(&Rect::new(3, 3, 2, 2)));
    }

    #[test]
    fn zero_sized_never_intersects() {
        let a = Rect::new(0, 0, 4, 4);
        assert!(!a.intersects(&Rect::new(1, 1, 0, 2)));
    }

    #[test]
    fn union_covers_both() {
        let merged = Rect::new(2, 1, 2, 2).union(&Rect::new(0, 4, 3, 1));
        assert_eq!(merged, Rect::new(0, 1, 4, 4));
    }

    #[test]
    fn preview_snaps_to_cells() {
        let info = LayoutInfo::new(1.4, 2.6, -3.0, 4.5);
        assert_eq!(info.snap(), Rect::new(1, 3, 0, 5));
    }

    #[test]
    fn pixel_conversion_uses_fixed_row_height() {
        let px = Rect::new(2, 3, 4, 5).to_pixels(10.0);
        assert_eq!(px.left, 20.0);
        assert_eq!(px.top, 24.0);
        assert_eq!(px.width, 40.0);
        assert_eq!(px.height, 40.0);
        assert_eq!(unit_width(640.0, 64), 10.0);
        assert_eq!(unit_width(640.0, 0), 0.0);
    }
}
