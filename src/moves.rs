//! Move notation.
//!
//! Grammar: `[k]F[w][' | 2]` for face turns and `x | y | z` with the same
//! suffixes for whole-cube rotations. `k` counts outer layers; a bare `w`
//! means two. Lookup-table files store moves in exactly this spelling, so
//! [`Move`]'s `Display` is the canonical form: `R`, `Rw`, `3Rw`, `x'`.
//!
//! Phase markers (`COMMENT_...`) travel through solutions as [`Step::Marker`].

use std::fmt;
use std::str::FromStr;

use itertools::Itertools;

use crate::error::{Error, Result};
use crate::geometry::{quarter_turn, Face};

/// Prefix that identifies a phase marker token.
pub const MARKER_PREFIX: &str = "COMMENT_";

/// Turn amount, measured clockwise looking at the turned face.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Turn {
    Quarter,
    Half,
    Counter,
}

impl Turn {
    pub const ALL: [Turn; 3] = [Turn::Quarter, Turn::Half, Turn::Counter];

    #[inline]
    pub const fn quarters(self) -> u8 {
        match self {
            Turn::Quarter => 1,
            Turn::Half => 2,
            Turn::Counter => 3,
        }
    }

    /// `None` for a net zero turn.
    pub const fn from_quarters(quarters: u8) -> Option<Turn> {
        match quarters % 4 {
            1 => Some(Turn::Quarter),
            2 => Some(Turn::Half),
            3 => Some(Turn::Counter),
            _ => None,
        }
    }

    pub const fn inverse(self) -> Turn {
        match self {
            Turn::Quarter => Turn::Counter,
            Turn::Half => Turn::Half,
            Turn::Counter => Turn::Quarter,
        }
    }

    fn suffix(self) -> &'static str {
        match self {
            Turn::Quarter => "",
            Turn::Half => "2",
            Turn::Counter => "'",
        }
    }
}

/// How much of the cube a move turns.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Width {
    /// The `k` outermost layers on the named face.
    Outer(u8),
    /// The whole cube (`x`, `y`, `z`).
    Whole,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Move {
    pub face: Face,
    pub width: Width,
    pub turn: Turn,
}

impl Move {
    pub const fn new(face: Face, layers: u8, turn: Turn) -> Self {
        Move {
            face,
            width: Width::Outer(layers),
            turn,
        }
    }

    /// Whole-cube rotation around `face`, normalized to the x/y/z axes.
    pub const fn rotation(face: Face, turn: Turn) -> Self {
        let (face, turn) = match face {
            Face::L => (Face::R, turn.inverse()),
            Face::D => (Face::U, turn.inverse()),
            Face::B => (Face::F, turn.inverse()),
            other => (other, turn),
        };
        Move {
            face,
            width: Width::Whole,
            turn,
        }
    }

    #[inline]
    pub const fn is_rotation(&self) -> bool {
        matches!(self.width, Width::Whole)
    }

    /// Number of outer layers turned, treating a rotation as all of them.
    pub fn layers(&self, size: usize) -> usize {
        match self.width {
            Width::Outer(layers) => layers as usize,
            Width::Whole => size,
        }
    }

    pub const fn inverse(&self) -> Move {
        Move {
            face: self.face,
            width: self.width,
            turn: self.turn.inverse(),
        }
    }

    /// Same face and same slab, so the two turns merge into one.
    #[inline]
    pub fn same_slab(&self, other: &Move) -> bool {
        self.face == other.face && self.width == other.width
    }

    /// Move-adjacency pruning for search.
    ///
    /// A move on the slab just turned is never useful, and of two commuting
    /// turns on opposite faces only the order with the lower face first is
    /// explored.
    pub fn redundant_after(&self, previous: &Move, size: usize) -> bool {
        if self.same_slab(previous) {
            return true;
        }
        if self.is_rotation() || previous.is_rotation() {
            return false;
        }
        self.face == previous.face.opposite()
            && previous.face.index() > self.face.index()
            && self.layers(size) + previous.layers(size) <= size
    }
}

impl fmt::Display for Move {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.width {
            Width::Whole => {
                let axis = match self.face {
                    Face::R | Face::L => 'x',
                    Face::U | Face::D => 'y',
                    Face::F | Face::B => 'z',
                };
                write!(f, "{axis}")?;
            }
            Width::Outer(1) => write!(f, "{}", self.face)?,
            Width::Outer(2) => write!(f, "{}w", self.face)?,
            Width::Outer(layers) => write!(f, "{layers}{}w", self.face)?,
        }
        write!(f, "{}", self.turn.suffix())
    }
}

fn parse_suffix(name: &str, suffix: &str) -> Result<Turn> {
    match suffix {
        "" => Ok(Turn::Quarter),
        "'" => Ok(Turn::Counter),
        "2" | "2'" | "'2" => Ok(Turn::Half),
        _ => Err(Error::unknown_move(name, format!("bad suffix {suffix:?}"))),
    }
}

impl FromStr for Move {
    type Err = Error;

    fn from_str(name: &str) -> Result<Self> {
        let bytes = name.as_bytes();
        let Some(&first) = bytes.first() else {
            return Err(Error::unknown_move(name, "empty move"));
        };

        let axis = match first {
            b'x' => Some(Face::R),
            b'y' => Some(Face::U),
            b'z' => Some(Face::F),
            _ => None,
        };
        if let Some(face) = axis {
            let turn = parse_suffix(name, &name[1..])?;
            return Ok(Move::rotation(face, turn));
        }

        let digits = bytes.iter().take_while(|b| b.is_ascii_digit()).count();
        let Some(face) = bytes.get(digits).copied().and_then(Face::from_label) else {
            return Err(Error::unknown_move(name, "missing face letter"));
        };
        let mut rest = &name[digits + 1..];
        let wide = rest.starts_with('w');
        if wide {
            rest = &rest[1..];
        }

        let layers = if digits > 0 {
            name[..digits]
                .parse::<u8>()
                .map_err(|_| Error::unknown_move(name, "layer count out of range"))?
        } else if wide {
            2
        } else {
            1
        };
        if layers == 0 {
            return Err(Error::unknown_move(name, "zero layers"));
        }

        let turn = parse_suffix(name, rest)?;
        Ok(Move::new(face, layers, turn))
    }
}

/// One token of a solution: a move or an opaque phase marker.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum Step {
    Move(Move),
    Marker(String),
}

impl Step {
    pub fn marker(phase: &str) -> Step {
        Step::Marker(format!("{MARKER_PREFIX}{phase}"))
    }

    pub fn as_move(&self) -> Option<&Move> {
        match self {
            Step::Move(mv) => Some(mv),
            Step::Marker(_) => None,
        }
    }
}

impl fmt::Display for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Step::Move(mv) => write!(f, "{mv}"),
            Step::Marker(text) => write!(f, "{text}"),
        }
    }
}

impl FromStr for Step {
    type Err = Error;

    fn from_str(token: &str) -> Result<Self> {
        if token.starts_with(MARKER_PREFIX) {
            Ok(Step::Marker(token.to_string()))
        } else {
            token.parse().map(Step::Move)
        }
    }
}

impl From<Move> for Step {
    fn from(mv: Move) -> Self {
        Step::Move(mv)
    }
}

/// Parses whitespace separated moves; markers are rejected.
pub fn parse_moves(text: &str) -> Result<Vec<Move>> {
    text.split_whitespace().map(str::parse).collect()
}

/// Parses whitespace separated moves and markers.
pub fn parse_steps(text: &str) -> Result<Vec<Step>> {
    text.split_whitespace().map(str::parse).collect()
}

pub fn format_moves(moves: &[Move]) -> String {
    moves.iter().join(" ")
}

pub fn format_steps(steps: &[Step]) -> String {
    steps.iter().join(" ")
}

/// The sequence that undoes `moves`.
pub fn inverse(moves: &[Move]) -> Vec<Move> {
    moves.iter().rev().map(Move::inverse).collect()
}

/// Merges adjacent turns of the same slab.
///
/// Runs are summed modulo four; a run that nets to zero disappears and lets
/// its neighbours merge in turn. Markers are never merged across.
pub fn compress(steps: &[Step]) -> Vec<Step> {
    let mut out: Vec<Step> = Vec::with_capacity(steps.len());
    for step in steps {
        let Step::Move(mv) = step else {
            out.push(step.clone());
            continue;
        };
        match out.last() {
            Some(Step::Move(top)) if top.same_slab(mv) => {
                let quarters = top.turn.quarters() + mv.turn.quarters();
                let top = *top;
                out.pop();
                if let Some(turn) = Turn::from_quarters(quarters) {
                    out.push(Step::Move(Move { turn, ..top }));
                }
            }
            _ => out.push(step.clone()),
        }
    }
    out
}

/// [`compress`] for plain move lists.
pub fn compress_moves(moves: &[Move]) -> Vec<Move> {
    let steps: Vec<Step> = moves.iter().copied().map(Step::Move).collect();
    compress(&steps)
        .into_iter()
        .filter_map(|step| step.as_move().copied())
        .collect()
}

fn rotate_face(face: Face, rotation: Face, quarters: u8) -> Face {
    let mut normal = face.normal();
    for _ in 0..quarters {
        normal = quarter_turn(rotation.normal(), normal);
    }
    // quarter turns of a unit axis vector always land on another face normal
    Face::from_normal(normal).unwrap_or(face)
}

/// Removes whole-cube rotations by renaming the faces of every later move.
///
/// The result leaves the cube in the same state up to a whole-cube rotation,
/// so it is only meaningful for sequences that end on a solved cube.
pub fn strip_rotations(steps: &[Step]) -> Vec<Step> {
    // frame[p] = the original face now sitting at position p
    let mut frame = Face::ALL;
    let mut out = Vec::with_capacity(steps.len());

    for step in steps {
        match step {
            Step::Move(mv) if mv.is_rotation() => {
                let undo = 4 - mv.turn.quarters();
                let previous = frame;
                for face in Face::ALL {
                    frame[face.index()] = previous[rotate_face(face, mv.face, undo).index()];
                }
            }
            Step::Move(mv) => out.push(Step::Move(Move {
                face: frame[mv.face.index()],
                ..*mv
            })),
            Step::Marker(_) => out.push(step.clone()),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn steps(text: &str) -> Vec<Step> {
        parse_steps(text).unwrap()
    }

    #[test]
    fn test_parse_layer_counts() {
        let cases = [
            ("R", Face::R, 1),
            ("Rw", Face::R, 2),
            ("2R", Face::R, 2),
            ("2Rw", Face::R, 2),
            ("3Uw", Face::U, 3),
            ("3U", Face::U, 3),
            ("12Bw'", Face::B, 12),
        ];
        for (name, face, layers) in cases {
            let mv: Move = name.parse().unwrap();
            assert_eq!(mv.face, face, "face of {name}");
            assert_eq!(mv.width, Width::Outer(layers), "layers of {name}");
        }
    }

    #[test]
    fn test_canonical_spelling() {
        for (input, expected) in [
            ("R", "R"),
            ("R'", "R'"),
            ("R2", "R2"),
            ("2R", "Rw"),
            ("Uw2", "Uw2"),
            ("3Fw'", "3Fw'"),
            ("x", "x"),
            ("y'", "y'"),
            ("z2", "z2"),
            ("U2'", "U2"),
        ] {
            let mv: Move = input.parse().unwrap();
            assert_eq!(mv.to_string(), expected, "spelling of {input}");
        }
    }

    #[test]
    fn test_rejects_unknown_moves() {
        for bad in ["", "Q", "R3", "0R", "Rx", "w", "x3", "999R"] {
            assert!(
                matches!(bad.parse::<Move>(), Err(Error::UnknownMove { .. })),
                "{bad:?} should not parse"
            );
        }
    }

    #[test]
    fn test_rotation_normalizes_axis() {
        assert_eq!(Move::rotation(Face::L, Turn::Quarter).to_string(), "x'");
        assert_eq!(Move::rotation(Face::D, Turn::Half).to_string(), "y2");
        assert_eq!(Move::rotation(Face::B, Turn::Counter).to_string(), "z");
    }

    #[test]
    fn test_markers_pass_through() {
        let parsed = steps("R COMMENT_centers_solved U");
        assert_eq!(parsed[1], Step::Marker("COMMENT_centers_solved".into()));
        assert_eq!(format_steps(&parsed), "R COMMENT_centers_solved U");
    }

    #[test]
    fn test_compress_rules() {
        let cases = [
            ("R R R", "R'"),
            ("R R'", ""),
            ("R R", "R2"),
            ("R2 R2", ""),
            ("R R R R", ""),
            ("R U U' R'", ""),
            ("Rw R", "Rw R"),
            ("R COMMENT_x R", "R COMMENT_x R"),
            ("U' U' F", "U2 F"),
            ("x x'", ""),
        ];
        for (input, expected) in cases {
            assert_eq!(
                format_steps(&compress(&steps(input))),
                expected,
                "compress({input})"
            );
        }
    }

    #[test]
    fn test_compress_is_idempotent() {
        let seq = steps("R R U U U F2 F2 B L L' D Rw Rw 3Uw' 3Uw' U");
        let once = compress(&seq);
        assert_eq!(compress(&once), once);
    }

    #[test]
    fn test_inverse_sequence() {
        let seq = parse_moves("R U2 F'").unwrap();
        assert_eq!(format_moves(&inverse(&seq)), "F U2 R'");
    }

    #[test]
    fn test_redundant_after() {
        let u: Move = "U".parse().unwrap();
        let d: Move = "D".parse().unwrap();
        assert!(u.redundant_after(&"U2".parse().unwrap(), 3));
        assert!(u.redundant_after(&d, 3), "U after D commutes and is skipped");
        assert!(!d.redundant_after(&u, 3), "D after U is the canonical order");
        assert!(!u.redundant_after(&"Uw".parse().unwrap(), 4));
        // 3Uw and Dw overlap on a 4x4x4 so they do not commute
        let wide: Move = "3Uw".parse().unwrap();
        assert!(!wide.redundant_after(&"Dw".parse().unwrap(), 4));
    }

    #[test]
    fn test_strip_rotations_renames_faces() {
        // after x the physical top is the old front
        assert_eq!(format_steps(&strip_rotations(&steps("x U R"))), "F R");
        assert_eq!(format_steps(&strip_rotations(&steps("y F"))), "R");
        assert_eq!(format_steps(&strip_rotations(&steps("x x' U"))), "U");
        assert_eq!(format_steps(&strip_rotations(&steps("x y U"))), "F");
    }
}
