//! Hex coordinate library.
//!
//! Pointy-top hexes addressed by axial coordinates `(q, r)` with the
//! implicit cube component `s = -q - r`. Rectangular maps are stored in
//! the odd-row offset scheme `(col, row)`.
//!
//! All functions are pure. Results may lie outside any particular grid;
//! callers bounds-check with [`GridBounds::contains`].

use serde::{Deserialize, Serialize};

use crate::math::{Fixed, Vec2Fixed, SQRT_3, THREE_HALVES};

/// Axial hex coordinate.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize,
)]
pub struct Hex {
    /// Column axis.
    pub q: i32,
    /// Row axis.
    pub r: i32,
}

/// Odd-row offset coordinate.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize,
)]
pub struct Offset {
    /// Column within the row.
    pub col: i32,
    /// Row index (equal to axial `r`).
    pub row: i32,
}

/// Neighbor directions in fixed clockwise order, starting east.
pub const DIRECTIONS: [Hex; 6] = [
    Hex::new(1, 0),
    Hex::new(1, -1),
    Hex::new(0, -1),
    Hex::new(-1, 0),
    Hex::new(-1, 1),
    Hex::new(0, 1),
];

impl Hex {
    /// Create a new axial coordinate.
    #[must_use]
    pub const fn new(q: i32, r: i32) -> Self {
        Self { q, r }
    }

    /// Implicit third cube component.
    #[must_use]
    pub const fn s(self) -> i32 {
        -self.q - self.r
    }

    /// Hex distance to another cell.
    #[must_use]
    pub fn distance(self, other: Self) -> u32 {
        heuristic(self, other)
    }

    /// Offset coordinate of this cell.
    #[must_use]
    pub fn to_offset(self) -> Offset {
        axial_to_offset(self)
    }

    /// The six adjacent cells.
    #[must_use]
    pub fn neighbors(self) -> [Hex; 6] {
        neighbors(self)
    }
}

impl Offset {
    /// Create a new offset coordinate.
    #[must_use]
    pub const fn new(col: i32, row: i32) -> Self {
        Self { col, row }
    }

    /// Axial coordinate of this cell.
    #[must_use]
    pub fn to_axial(self) -> Hex {
        offset_to_axial(self)
    }
}

impl std::fmt::Display for Hex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{},{}", self.q, self.r)
    }
}

impl std::ops::Add for Hex {
    type Output = Self;

    fn add(self, rhs: Self) -> Self::Output {
        Self::new(self.q + rhs.q, self.r + rhs.r)
    }
}

/// Rectangular extents of a map in offset space.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct GridBounds {
    /// Number of columns.
    pub cols: i32,
    /// Number of rows.
    pub rows: i32,
}

impl GridBounds {
    /// Create new bounds.
    #[must_use]
    pub const fn new(cols: i32, rows: i32) -> Self {
        Self { cols, rows }
    }

    /// Check whether an axial cell lies inside the rectangle.
    #[must_use]
    pub fn contains(&self, hex: Hex) -> bool {
        let Offset { col, row } = axial_to_offset(hex);
        row >= 0 && row < self.rows && col >= 0 && col < self.cols
    }

    /// Number of cells covered.
    #[must_use]
    pub fn area(&self) -> usize {
        (self.cols.max(0) as usize) * (self.rows.max(0) as usize)
    }

    /// Iterate over every cell in row-major offset order.
    pub fn cells(&self) -> impl Iterator<Item = Hex> + '_ {
        (0..self.rows).flat_map(move |row| {
            (0..self.cols).map(move |col| offset_to_axial(Offset::new(col, row)))
        })
    }
}

/// Project an axial cell to the pixel position of its center.
#[must_use]
pub fn axial_to_pixel(hex: Hex, tile_size: Fixed, origin: Vec2Fixed) -> Vec2Fixed {
    let q = Fixed::from_num(hex.q);
    let r = Fixed::from_num(hex.r);
    let x = tile_size * SQRT_3 * (q + r / Fixed::from_num(2)) + origin.x;
    let y = tile_size * THREE_HALVES * r + origin.y;
    Vec2Fixed::new(x, y)
}

/// Find the axial cell containing a pixel position.
///
/// Converts to fractional cube coordinates and rounds with
/// [`cube_round`].
#[must_use]
pub fn pixel_to_axial(point: Vec2Fixed, tile_size: Fixed, origin: Vec2Fixed) -> Hex {
    let px = point.x - origin.x;
    let py = point.y - origin.y;
    let three = Fixed::from_num(3);
    let q = (SQRT_3 / three * px - py / three) / tile_size;
    let r = (Fixed::from_num(2) / three * py) / tile_size;
    cube_round(q, r)
}

/// Round fractional axial coordinates to the nearest cell.
///
/// Each cube component is rounded independently; the component with the
/// largest rounding error is then recomputed from the other two so the
/// result keeps `x + y + z = 0`.
#[must_use]
pub fn cube_round(q: Fixed, r: Fixed) -> Hex {
    let x = q;
    let z = r;
    let y = -x - z;

    let mut rx = x.round();
    let mut ry = y.round();
    let mut rz = z.round();

    let x_diff = (rx - x).abs();
    let y_diff = (ry - y).abs();
    let z_diff = (rz - z).abs();

    if x_diff > y_diff && x_diff > z_diff {
        rx = -ry - rz;
    } else if y_diff > z_diff {
        ry = -rx - rz;
    } else {
        rz = -rx - ry;
    }
    debug_assert_eq!(rx + ry + rz, Fixed::ZERO);

    Hex::new(rx.to_num::<i32>(), rz.to_num::<i32>())
}

/// Convert axial to odd-row offset coordinates.
#[must_use]
pub fn axial_to_offset(hex: Hex) -> Offset {
    let row = hex.r;
    let col = hex.q + (row - (row & 1)) / 2;
    Offset { col, row }
}

/// Convert odd-row offset to axial coordinates.
#[must_use]
pub fn offset_to_axial(offset: Offset) -> Hex {
    let r = offset.row;
    let q = offset.col - (r - (r & 1)) / 2;
    Hex { q, r }
}

/// The six adjacent cells in [`DIRECTIONS`] order.
#[must_use]
pub fn neighbors(hex: Hex) -> [Hex; 6] {
    DIRECTIONS.map(|d| hex + d)
}

/// Hex distance: `max(|dq|, |dr|, |dq + dr|)`.
#[must_use]
pub fn heuristic(a: Hex, b: Hex) -> u32 {
    let dq = a.q - b.q;
    let dr = a.r - b.r;
    dq.unsigned_abs()
        .max(dr.unsigned_abs())
        .max((dq + dr).unsigned_abs())
}
