//! Fixed-point geometry: points, Manhattan orientations and rectangles.
//!
//! Coordinates are integer grid units. Every constructor that accepts
//! external coordinates checks them against [`MAX_COORD`] so that bounds
//! arithmetic cannot overflow.

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// The largest absolute coordinate accepted by element factories.
pub const MAX_COORD: i64 = 1 << 52;

/// Checks that a coordinate lies within the fixed-point range.
pub fn check_coord(v: i64) -> Result<i64> {
    if v.unsigned_abs() > MAX_COORD as u64 {
        Err(Error::CoordinateOutOfRange(v))
    } else {
        Ok(v)
    }
}

/// A point in grid units.
#[derive(Copy, Clone, Debug, Default, Hash, Eq, PartialEq, Ord, PartialOrd, Serialize, Deserialize)]
pub struct Point {
    /// The x-coordinate.
    pub x: i64,
    /// The y-coordinate.
    pub y: i64,
}

impl Point {
    /// Creates a point.
    #[inline]
    pub const fn new(x: i64, y: i64) -> Self {
        Self { x, y }
    }

    /// The origin.
    #[inline]
    pub const fn zero() -> Self {
        Self { x: 0, y: 0 }
    }

    pub(crate) fn checked(self) -> Result<Self> {
        check_coord(self.x)?;
        check_coord(self.y)?;
        Ok(self)
    }
}

/// A node size, as a delta from the prototype's default size.
#[derive(Copy, Clone, Debug, Default, Hash, Eq, PartialEq, Serialize, Deserialize)]
pub struct Size {
    /// Width.
    pub w: i64,
    /// Height.
    pub h: i64,
}

impl Size {
    /// Creates a size.
    #[inline]
    pub const fn new(w: i64, h: i64) -> Self {
        Self { w, h }
    }

    pub(crate) fn checked(self) -> Result<Self> {
        check_coord(self.w)?;
        check_coord(self.h)?;
        Ok(self)
    }
}

/// A Manhattan rotation: 0, 90, 180, or 270 degrees counterclockwise.
#[derive(Debug, Clone, Copy, Default, Hash, Eq, Ord, PartialOrd, PartialEq, Serialize, Deserialize)]
pub enum Rotation {
    /// 0 degrees; no rotation.
    #[default]
    R0,
    /// 90 degrees counterclockwise.
    R90,
    /// 180 degrees counterclockwise.
    R180,
    /// 270 degrees counterclockwise.
    R270,
}

/// A reflection followed by a Manhattan rotation.
#[derive(Debug, Clone, Copy, Default, Hash, Eq, PartialEq, Serialize, Deserialize)]
pub struct Orientation {
    /// Reflect across the y-axis (negate x) before rotating.
    pub mirror_x: bool,
    /// Counterclockwise rotation applied after the reflection.
    pub rotation: Rotation,
}

impl Orientation {
    /// The identity orientation.
    pub const IDENTITY: Orientation = Orientation {
        mirror_x: false,
        rotation: Rotation::R0,
    };

    /// Creates an orientation.
    #[inline]
    pub const fn new(mirror_x: bool, rotation: Rotation) -> Self {
        Self { mirror_x, rotation }
    }

    /// Applies this orientation to a point, about the origin.
    pub fn apply(&self, p: Point) -> Point {
        let x = if self.mirror_x { -p.x } else { p.x };
        let y = p.y;
        match self.rotation {
            Rotation::R0 => Point::new(x, y),
            Rotation::R90 => Point::new(-y, x),
            Rotation::R180 => Point::new(-x, -y),
            Rotation::R270 => Point::new(y, -x),
        }
    }

    /// Returns `true` if this orientation swaps the x and y extents.
    #[inline]
    pub fn swaps_axes(&self) -> bool {
        matches!(self.rotation, Rotation::R90 | Rotation::R270)
    }

    pub(crate) fn code(&self) -> u8 {
        let r = match self.rotation {
            Rotation::R0 => 0,
            Rotation::R90 => 1,
            Rotation::R180 => 2,
            Rotation::R270 => 3,
        };
        r | if self.mirror_x { 4 } else { 0 }
    }

    pub(crate) fn from_code(code: u8) -> Option<Self> {
        if code > 7 {
            return None;
        }
        let rotation = match code & 3 {
            0 => Rotation::R0,
            1 => Rotation::R90,
            2 => Rotation::R180,
            _ => Rotation::R270,
        };
        Some(Self::new(code & 4 != 0, rotation))
    }
}

/// An axis-aligned rectangle, specified by lower-left and upper-right corners.
#[derive(Debug, Default, Copy, Clone, Hash, Serialize, Deserialize, PartialEq, Eq)]
pub struct Rect {
    lo: Point,
    hi: Point,
}

impl Rect {
    /// Creates a rectangle spanning two corner points in any order.
    pub fn new(a: Point, b: Point) -> Self {
        Self {
            lo: Point::new(a.x.min(b.x), a.y.min(b.y)),
            hi: Point::new(a.x.max(b.x), a.y.max(b.y)),
        }
    }

    /// Creates a rectangle from its sides.
    #[inline]
    pub fn from_sides(left: i64, bot: i64, right: i64, top: i64) -> Self {
        Self::new(Point::new(left, bot), Point::new(right, top))
    }

    /// Creates a rectangle of the given size centered at the origin.
    pub fn centered(w: i64, h: i64) -> Self {
        Self::from_sides(-w / 2, -h / 2, w - w / 2, h - h / 2)
    }

    /// The lower-left corner.
    #[inline]
    pub fn lo(&self) -> Point {
        self.lo
    }

    /// The upper-right corner.
    #[inline]
    pub fn hi(&self) -> Point {
        self.hi
    }

    /// The width.
    #[inline]
    pub fn width(&self) -> i64 {
        self.hi.x - self.lo.x
    }

    /// The height.
    #[inline]
    pub fn height(&self) -> i64 {
        self.hi.y - self.lo.y
    }

    /// The smallest rectangle containing both rectangles.
    pub fn union(&self, other: &Rect) -> Rect {
        Rect {
            lo: Point::new(self.lo.x.min(other.lo.x), self.lo.y.min(other.lo.y)),
            hi: Point::new(self.hi.x.max(other.hi.x), self.hi.y.max(other.hi.y)),
        }
    }

    /// Grows the rectangle by `d` on every side.
    pub fn expand(&self, d: i64) -> Rect {
        Rect {
            lo: Point::new(self.lo.x - d, self.lo.y - d),
            hi: Point::new(self.hi.x + d, self.hi.y + d),
        }
    }

    /// Orients the rectangle about the origin, then translates it by `offset`.
    pub fn transform(&self, orient: Orientation, offset: Point) -> Rect {
        let a = orient.apply(self.lo);
        let b = orient.apply(self.hi);
        let r = Rect::new(a, b);
        Rect {
            lo: Point::new(r.lo.x + offset.x, r.lo.y + offset.y),
            hi: Point::new(r.hi.x + offset.x, r.hi.y + offset.y),
        }
    }
}

/// Accumulates the bounding box of a set of rectangles.
#[derive(Debug, Default, Copy, Clone)]
pub struct BoundsBuilder {
    rect: Option<Rect>,
}

impl BoundsBuilder {
    /// Creates an empty accumulator.
    #[inline]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a rectangle.
    #[inline]
    pub fn add(&mut self, r: Rect) {
        self.rect = Some(match self.rect {
            Some(acc) => acc.union(&r),
            None => r,
        });
    }

    /// Adds an optional rectangle.
    #[inline]
    pub fn add_opt(&mut self, r: Option<Rect>) {
        if let Some(r) = r {
            self.add(r);
        }
    }

    /// The accumulated bounds, if anything was added.
    #[inline]
    pub fn build(self) -> Option<Rect> {
        self.rect
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_log::test;

    #[test]
    fn orientation_codes_round_trip() {
        for code in 0..8 {
            assert_eq!(Orientation::from_code(code).unwrap().code(), code);
        }
        assert!(Orientation::from_code(8).is_none());
    }

    #[test]
    fn transform_rect() {
        let r = Rect::from_sides(0, 0, 20, 10);
        let rot = r.transform(Orientation::new(false, Rotation::R90), Point::new(100, 0));
        assert_eq!(rot, Rect::from_sides(90, 0, 100, 20));
        let mir = r.transform(Orientation::new(true, Rotation::R0), Point::zero());
        assert_eq!(mir, Rect::from_sides(-20, 0, 0, 10));
    }

    #[test]
    fn coordinate_range() {
        assert!(check_coord(MAX_COORD).is_ok());
        assert!(check_coord(-MAX_COORD - 1).is_err());
    }
}
