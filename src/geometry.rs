//! 3D geometry of an N×N×N cube.
//!
//! Facelets are located with doubled, centred integer coordinates so odd and
//! even sizes share one formula without fractions: cubie centres sit on
//! `-(n-1), -(n-3), ..., n-1` along each axis and the sticker surface is at `±n`.
//!
//! Axes: `x` points at R, `y` at U, `z` at F.

use std::fmt;

use serde::Deserialize;

/// A doubled-coordinate point or direction.
pub type Coord = (i32, i32, i32);

/// The six faces, in the solver's internal order.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Deserialize)]
pub enum Face {
    U,
    L,
    F,
    R,
    B,
    D,
}

impl Face {
    /// Internal storage order: U L F R B D.
    pub const ALL: [Face; 6] = [Face::U, Face::L, Face::F, Face::R, Face::B, Face::D];

    /// Face order of the external state string.
    pub const KOCIEMBA_ORDER: [Face; 6] = [Face::U, Face::R, Face::F, Face::D, Face::L, Face::B];

    #[inline]
    pub const fn index(self) -> usize {
        self as usize
    }

    /// The ASCII label stored in facelet buffers for this face.
    #[inline]
    pub const fn label(self) -> u8 {
        match self {
            Face::U => b'U',
            Face::L => b'L',
            Face::F => b'F',
            Face::R => b'R',
            Face::B => b'B',
            Face::D => b'D',
        }
    }

    pub const fn from_label(label: u8) -> Option<Face> {
        match label {
            b'U' => Some(Face::U),
            b'L' => Some(Face::L),
            b'F' => Some(Face::F),
            b'R' => Some(Face::R),
            b'B' => Some(Face::B),
            b'D' => Some(Face::D),
            _ => None,
        }
    }

    /// Outward unit normal.
    pub const fn normal(self) -> Coord {
        match self {
            Face::U => (0, 1, 0),
            Face::L => (-1, 0, 0),
            Face::F => (0, 0, 1),
            Face::R => (1, 0, 0),
            Face::B => (0, 0, -1),
            Face::D => (0, -1, 0),
        }
    }

    pub fn from_normal(normal: Coord) -> Option<Face> {
        Face::ALL.into_iter().find(|face| face.normal() == normal)
    }

    pub const fn opposite(self) -> Face {
        match self {
            Face::U => Face::D,
            Face::L => Face::R,
            Face::F => Face::B,
            Face::R => Face::L,
            Face::B => Face::F,
            Face::D => Face::U,
        }
    }

    /// 0 for the L/R axis, 1 for U/D, 2 for F/B.
    pub const fn axis(self) -> usize {
        match self {
            Face::L | Face::R => 0,
            Face::U | Face::D => 1,
            Face::F | Face::B => 2,
        }
    }
}

impl fmt::Display for Face {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", char::from(self.label()))
    }
}

#[inline]
pub const fn dot(a: Coord, b: Coord) -> i32 {
    a.0 * b.0 + a.1 * b.1 + a.2 * b.2
}

#[inline]
pub const fn cross(a: Coord, b: Coord) -> Coord {
    (
        a.1 * b.2 - a.2 * b.1,
        a.2 * b.0 - a.0 * b.2,
        a.0 * b.1 - a.1 * b.0,
    )
}

/// Rotates `v` a quarter turn clockwise as seen looking at the face whose
/// outward normal is `axis`.
#[inline]
pub const fn quarter_turn(axis: Coord, v: Coord) -> Coord {
    let c = cross(axis, v);
    let d = dot(axis, v);
    (-c.0 + axis.0 * d, -c.1 + axis.1 * d, -c.2 + axis.2 * d)
}

/// Sticker position of `(face, row, col)` on a cube of `size`.
///
/// Row 0 is the top row of the face on the unfolded net: U has B above it,
/// D has F above it, and the four side faces have U above them.
pub const fn facelet_position(size: usize, face: Face, row: usize, col: usize) -> Coord {
    let n = size as i32;
    let a = 2 * col as i32 - (n - 1);
    let b = (n - 1) - 2 * row as i32;
    match face {
        Face::U => (a, n, -b),
        Face::D => (a, -n, b),
        Face::F => (a, b, n),
        Face::B => (-a, b, -n),
        Face::R => (n, b, -a),
        Face::L => (-n, b, a),
    }
}

/// Inverse of [`facelet_position`].
pub fn facelet_at(size: usize, pos: Coord) -> Option<(Face, usize, usize)> {
    let n = size as i32;
    let (x, y, z) = pos;
    let (face, a, b) = if y == n {
        (Face::U, x, -z)
    } else if y == -n {
        (Face::D, x, z)
    } else if z == n {
        (Face::F, x, y)
    } else if z == -n {
        (Face::B, -x, y)
    } else if x == n {
        (Face::R, -z, y)
    } else if x == -n {
        (Face::L, z, y)
    } else {
        return None;
    };
    let col = (a + n - 1) / 2;
    let row = (n - 1 - b) / 2;
    if !(0..n).contains(&col) || !(0..n).contains(&row) {
        return None;
    }
    Some((face, row as usize, col as usize))
}

/// Centre of the cubie carrying the sticker at `pos`.
#[inline]
pub fn cubie_center(size: usize, pos: Coord) -> Coord {
    let limit = size as i32 - 1;
    (
        pos.0.clamp(-limit, limit),
        pos.1.clamp(-limit, limit),
        pos.2.clamp(-limit, limit),
    )
}

/// The 24 whole-cube orientations, spelled as rotation moves.
///
/// Organized as 6 choices of which face ends up on top, times 4 spins
/// around the vertical axis.
pub const ORIENTATIONS: [&str; 24] = [
    // U stays on top
    "", "y", "y2", "y'",
    // F on top
    "x", "x y", "x y2", "x y'",
    // D on top
    "x2", "x2 y", "x2 y2", "x2 y'",
    // B on top
    "x'", "x' y", "x' y2", "x' y'",
    // R on top
    "z'", "z' y", "z' y2", "z' y'",
    // L on top
    "z", "z y", "z y2", "z y'",
];
