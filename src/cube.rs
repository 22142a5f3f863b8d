//! Facelet state and move tables for an N×N×N cube.
//!
//! A state is a flat buffer of `6 * size^2` labels stored face by face in
//! U L F R B D order, each face row-major as drawn on the unfolded net.
//! Moves are permutations: applying one computes `new[i] = old[perm[i]]`.
//!
//! Move tables are built once per size from the cube's geometry and shared
//! through an [`Arc`], so cloning a [`Cube`] only copies its facelets.

use std::fmt;
use std::sync::Arc;

use rustc_hash::FxHashMap;

use crate::error::{Error, Result};
use crate::geometry::{
    cubie_center, dot, facelet_at, facelet_position, quarter_turn, Face, ORIENTATIONS,
};
use crate::moves::{parse_moves, Move, Step, Turn, Width};

/// A facelet permutation.
pub type Perm = Box<[u16]>;

/// Label used for facelets a projection does not care about.
pub const MASKED: u8 = b'x';

/// Converts `(face, row, col)` to a facelet index.
#[inline(always)]
pub const fn facelet_index(size: usize, face: Face, row: usize, col: usize) -> usize {
    face.index() * size * size + row * size + col
}

/// Converts a facelet index back to `(face, row, col)`.
#[inline(always)]
pub const fn facelet_coords(size: usize, index: usize) -> (Face, usize, usize) {
    let face = Face::ALL[index / (size * size)];
    let within = index % (size * size);
    (face, within / size, within % size)
}

/// `c[i] = a[b[i]]`: the permutation of applying `a` and then `b`.
fn compose(a: &[u16], b: &[u16]) -> Perm {
    b.iter().map(|&i| a[i as usize]).collect()
}

/// Immutable permutations for every move legal on one cube size.
pub struct MoveTable {
    size: usize,
    perms: FxHashMap<Move, Perm>,
    face_moves: Vec<Move>,
    orientations: Vec<(Vec<Move>, Perm)>,
    orbits: Vec<Vec<u16>>,
}

impl MoveTable {
    /// Builds the tables for `size` (2 or more).
    pub fn new(size: usize) -> Result<Arc<Self>> {
        if !(2..=64).contains(&size) {
            return Err(Error::InvalidState(format!("unsupported cube size {size}")));
        }

        let count = 6 * size * size;
        let mut perms = FxHashMap::default();
        let mut face_moves = Vec::new();

        for face in Face::ALL {
            for layers in 1..size {
                let quarter = quarter_perm(size, face, layers);
                insert_turns(&mut perms, face, Width::Outer(layers as u8), quarter);
                for turn in Turn::ALL {
                    face_moves.push(Move::new(face, layers as u8, turn));
                }
            }
        }
        for axis in [Face::R, Face::U, Face::F] {
            insert_turns(&mut perms, axis, Width::Whole, quarter_perm(size, axis, size));
        }

        let identity: Perm = (0..count as u16).collect();
        let mut orientations = Vec::with_capacity(ORIENTATIONS.len());
        for spelled in ORIENTATIONS {
            let moves = parse_moves(spelled)?;
            let mut perm = identity.clone();
            for mv in &moves {
                let step = perms
                    .get(mv)
                    .ok_or_else(|| Error::unknown_move(mv.to_string(), "missing rotation"))?;
                perm = compose(&perm, step);
            }
            orientations.push((moves, perm));
        }

        Ok(Arc::new(MoveTable {
            size,
            perms,
            face_moves,
            orientations,
            orbits: build_orbits(size),
        }))
    }

    #[inline]
    pub fn size(&self) -> usize {
        self.size
    }

    #[inline]
    pub fn facelet_count(&self) -> usize {
        6 * self.size * self.size
    }

    /// The permutation for `mv`, or `UnknownMove` if it does not exist on this size.
    pub fn perm(&self, mv: &Move) -> Result<&[u16]> {
        self.perms.get(mv).map(|perm| &perm[..]).ok_or_else(|| {
            Error::unknown_move(
                mv.to_string(),
                format!("not a legal move on a {0}x{0}x{0}", self.size),
            )
        })
    }

    /// Every face turn (no whole-cube rotations), in a stable order.
    pub fn face_moves(&self) -> &[Move] {
        &self.face_moves
    }

    /// The 24 whole-cube orientations with their spelled rotations.
    pub fn orientations(&self) -> &[(Vec<Move>, Perm)] {
        &self.orientations
    }

    /// Position classes whose label counts every legal move preserves.
    pub fn orbits(&self) -> &[Vec<u16>] {
        &self.orbits
    }
}

impl fmt::Debug for MoveTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MoveTable")
            .field("size", &self.size)
            .field("moves", &self.perms.len())
            .finish()
    }
}

/// Registers the quarter, half and counter turns generated by `quarter`.
fn insert_turns(perms: &mut FxHashMap<Move, Perm>, face: Face, width: Width, quarter: Perm) {
    let half = compose(&quarter, &quarter);
    let counter = compose(&half, &quarter);
    for (turn, perm) in [(Turn::Quarter, quarter), (Turn::Half, half), (Turn::Counter, counter)] {
        let mv = match width {
            Width::Whole => Move::rotation(face, turn),
            Width::Outer(layers) => Move::new(face, layers, turn),
        };
        perms.insert(mv, perm);
    }
}

/// Quarter turn of the `layers` outermost layers on `face`.
fn quarter_perm(size: usize, face: Face, layers: usize) -> Perm {
    let count = 6 * size * size;
    let normal = face.normal();
    let threshold = size as i32 + 1 - 2 * layers as i32;
    let mut perm: Vec<u16> = (0..count as u16).collect();

    for src in 0..count {
        let (src_face, row, col) = facelet_coords(size, src);
        let pos = facelet_position(size, src_face, row, col);
        if dot(cubie_center(size, pos), normal) < threshold {
            continue;
        }
        let moved = quarter_turn(normal, pos);
        // rotating a surface point keeps it on the surface
        if let Some((face, row, col)) = facelet_at(size, moved) {
            perm[facelet_index(size, face, row, col)] = src as u16;
        }
    }
    perm.into_boxed_slice()
}

/// Groups facelet positions into orbits: corners, one class per wing/midge
/// distance from the corner, and one class per centre position up to the
/// face's four rotations.
fn build_orbits(size: usize) -> Vec<Vec<u16>> {
    let last = size - 1;
    let mut classes: FxHashMap<(u8, usize, usize), Vec<u16>> = FxHashMap::default();

    for index in 0..6 * size * size {
        let (_, row, col) = facelet_coords(size, index);
        let on_row_edge = row == 0 || row == last;
        let on_col_edge = col == 0 || col == last;
        let key = if on_row_edge && on_col_edge {
            (0, 0, 0)
        } else if on_row_edge || on_col_edge {
            let along = if on_row_edge { col } else { row };
            (1, along.min(last - along), 0)
        } else {
            let spins = [
                (row, col),
                (col, last - row),
                (last - row, last - col),
                (last - col, row),
            ];
            let (r, c) = spins.into_iter().min().unwrap_or((row, col));
            (2, r, c)
        };
        classes.entry(key).or_default().push(index as u16);
    }

    let mut orbits: Vec<(_, Vec<u16>)> = classes.into_iter().collect();
    orbits.sort_by_key(|(key, _)| *key);
    orbits.into_iter().map(|(_, members)| members).collect()
}

/// A cube state bound to the move tables of its size.
#[derive(Clone)]
pub struct Cube {
    table: Arc<MoveTable>,
    facelets: Vec<u8>,
    scratch: Vec<u8>,
}

impl Cube {
    /// A solved cube.
    pub fn solved(table: Arc<MoveTable>) -> Self {
        let size = table.size();
        let facelets = Face::ALL
            .iter()
            .flat_map(|face| std::iter::repeat(face.label()).take(size * size))
            .collect::<Vec<_>>();
        let scratch = facelets.clone();
        Cube {
            table,
            facelets,
            scratch,
        }
    }

    /// Parses a state string in U R F D L B face order.
    pub fn from_state(table: Arc<MoveTable>, state: &str) -> Result<Self> {
        Self::from_state_with_colors(table, state, None)
    }

    /// Like [`Cube::from_state`], translating colours through `remap` first.
    pub fn from_state_with_colors(
        table: Arc<MoveTable>,
        state: &str,
        remap: Option<&FxHashMap<char, Face>>,
    ) -> Result<Self> {
        let size = table.size();
        let per_face = size * size;
        let chars: Vec<char> = state.chars().filter(|c| !c.is_whitespace()).collect();
        if chars.len() != 6 * per_face {
            return Err(Error::InvalidState(format!(
                "expected {} facelets for a {size}x{size}x{size}, got {}",
                6 * per_face,
                chars.len()
            )));
        }

        let mut cube = Cube::solved(table);
        for (slot, face) in Face::KOCIEMBA_ORDER.iter().enumerate() {
            for offset in 0..per_face {
                let raw = chars[slot * per_face + offset];
                let label = match remap {
                    Some(map) => map.get(&raw).map(|face| face.label()),
                    None => u8::try_from(raw).ok().filter(|b| Face::from_label(*b).is_some()),
                };
                let label = label
                    .ok_or_else(|| Error::InvalidState(format!("unexpected facelet {raw:?}")))?;
                cube.facelets[face.index() * per_face + offset] = label;
            }
        }
        Ok(cube)
    }

    /// The state string in U R F D L B face order.
    pub fn state_string(&self) -> String {
        let per_face = self.size() * self.size();
        Face::KOCIEMBA_ORDER
            .iter()
            .flat_map(|face| {
                let start = face.index() * per_face;
                self.facelets[start..start + per_face].iter().map(|&b| char::from(b))
            })
            .collect()
    }

    #[inline]
    pub fn size(&self) -> usize {
        self.table.size()
    }

    #[inline]
    pub fn table(&self) -> &Arc<MoveTable> {
        &self.table
    }

    #[inline]
    pub fn facelets(&self) -> &[u8] {
        &self.facelets
    }

    #[inline]
    pub fn label(&self, face: Face, row: usize, col: usize) -> u8 {
        self.facelets[facelet_index(self.size(), face, row, col)]
    }

    /// Overwrites the state in place, keeping the buffers.
    pub fn set_facelets(&mut self, facelets: &[u8]) -> Result<()> {
        if facelets.len() != self.facelets.len() {
            return Err(Error::InvalidState(format!(
                "expected {} facelets, got {}",
                self.facelets.len(),
                facelets.len()
            )));
        }
        self.facelets.copy_from_slice(facelets);
        Ok(())
    }

    #[cfg(test)]
    pub(crate) fn set_label(&mut self, index: usize, label: u8) {
        self.facelets[index] = label;
    }

    /// Returns the cube to the solved state without reallocating.
    pub fn reset(&mut self) {
        let per_face = self.size() * self.size();
        for (index, slot) in self.facelets.iter_mut().enumerate() {
            *slot = Face::ALL[index / per_face].label();
        }
    }

    #[inline]
    pub(crate) fn apply_perm(&mut self, perm: &[u16]) {
        for (dest, &src) in self.scratch.iter_mut().zip(perm) {
            *dest = self.facelets[src as usize];
        }
        std::mem::swap(&mut self.facelets, &mut self.scratch);
    }

    pub fn apply(&mut self, mv: &Move) -> Result<()> {
        let table = Arc::clone(&self.table);
        self.apply_perm(table.perm(mv)?);
        Ok(())
    }

    pub fn apply_moves(&mut self, moves: &[Move]) -> Result<()> {
        moves.iter().try_for_each(|mv| self.apply(mv))
    }

    /// Applies the moves of a solution, skipping markers.
    pub fn apply_steps(&mut self, steps: &[Step]) -> Result<()> {
        steps
            .iter()
            .filter_map(Step::as_move)
            .try_for_each(|mv| self.apply(mv))
    }

    /// Parses and applies a whitespace separated move string.
    pub fn apply_str(&mut self, moves: &str) -> Result<()> {
        self.apply_moves(&parse_moves(moves)?)
    }

    /// Every face shows a single label.
    pub fn is_solved(&self) -> bool {
        let per_face = self.size() * self.size();
        self.facelets
            .chunks(per_face)
            .all(|face| face.iter().all(|&label| label == face[0]))
    }

    fn anchored(&self) -> bool {
        let size = self.size();
        let n = size as i32;
        if size % 2 == 1 {
            let mid = size / 2;
            self.label(Face::U, mid, mid) == b'U' && self.label(Face::F, mid, mid) == b'F'
        } else {
            // the D-L-B corner sits home with its D sticker down
            let c = -(n - 1);
            [((c, -n, c), b'D'), ((-n, c, c), b'L'), ((c, c, -n), b'B')]
                .into_iter()
                .all(|(pos, label)| {
                    facelet_at(size, pos)
                        .is_some_and(|(face, row, col)| self.label(face, row, col) == label)
                })
        }
    }

    /// Applies the whole-cube rotation that puts the reference pieces home.
    ///
    /// Odd sizes align the U and F centres; even sizes align the D-L-B corner.
    /// Returns the rotation moves that were applied.
    pub fn reorient(&mut self) -> Result<Vec<Move>> {
        let table = Arc::clone(&self.table);
        let original = self.facelets.clone();
        for (moves, perm) in table.orientations() {
            self.apply_perm(perm);
            if self.anchored() {
                return Ok(moves.clone());
            }
            self.facelets.copy_from_slice(&original);
        }
        Err(Error::InvalidState(
            "no whole-cube rotation puts the reference pieces home".to_string(),
        ))
    }

    /// Checks that every orbit carries each label the right number of times.
    pub fn sanity_check(&self) -> Result<()> {
        for orbit in self.table.orbits() {
            let expected = orbit.len() / 6;
            let mut counts = [0usize; 6];
            for &index in orbit {
                let label = self.facelets[index as usize];
                let face = Face::from_label(label).ok_or_else(|| {
                    Error::InvalidState(format!("facelet {index} holds {:?}", char::from(label)))
                })?;
                counts[face.index()] += 1;
            }
            if let Some(face) = Face::ALL.into_iter().find(|f| counts[f.index()] != expected) {
                let (_, row, col) = facelet_coords(self.size(), orbit[0] as usize);
                return Err(Error::InvalidState(format!(
                    "orbit of ({row},{col}) has {} {face} facelets, expected {expected}",
                    counts[face.index()]
                )));
            }
        }
        Ok(())
    }

    /// Renders the unfolded net: U on top, L F R B across, D below.
    pub fn format_net(&self) -> String {
        let size = self.size();
        let row_of = |face: Face, row: usize| -> String {
            (0..size)
                .map(|col| char::from(self.label(face, row, col)))
                .collect()
        };
        let indent = " ".repeat(size + 1);

        let mut output = String::new();
        for row in 0..size {
            output.push_str(&format!("{indent}{}\n", row_of(Face::U, row)));
        }
        for row in 0..size {
            let band: Vec<String> = [Face::L, Face::F, Face::R, Face::B]
                .into_iter()
                .map(|face| row_of(face, row))
                .collect();
            output.push_str(&band.join(" "));
            output.push('\n');
        }
        for row in 0..size {
            output.push_str(&format!("{indent}{}\n", row_of(Face::D, row)));
        }
        output
    }
}

impl PartialEq for Cube {
    fn eq(&self, other: &Self) -> bool {
        self.facelets == other.facelets
    }
}

impl Eq for Cube {}

impl fmt::Debug for Cube {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Cube({})", self.state_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SOLVED_222: &str = "UUUURRRRFFFFDDDDLLLLBBBB";

    fn cube(size: usize) -> Cube {
        Cube::solved(MoveTable::new(size).unwrap())
    }

    #[test]
    fn test_moves_are_permutations() {
        for size in 2..=5 {
            let table = MoveTable::new(size).unwrap();
            for perm in table.perms.values() {
                let mut seen = vec![false; table.facelet_count()];
                for &src in perm.iter() {
                    assert!(!seen[src as usize], "size {size}: {src} used twice");
                    seen[src as usize] = true;
                }
            }
        }
    }

    #[test]
    fn test_move_inverse_law() {
        for size in 2..=5 {
            let mut scrambled = cube(size);
            scrambled.apply_str("R U2 F' D B2").unwrap();
            let table = Arc::clone(scrambled.table());
            for &mv in table.face_moves() {
                let mut moved = scrambled.clone();
                moved.apply(&mv).unwrap();
                moved.apply(&mv.inverse()).unwrap();
                assert_eq!(moved, scrambled, "size {size}: {mv} then its inverse");
            }
        }
    }

    #[test]
    fn test_sexy_move_has_order_six() {
        let mut c = cube(3);
        for _ in 0..6 {
            c.apply_str("R U R' U'").unwrap();
        }
        assert!(c.is_solved());
        c.apply_str("R U R' U'").unwrap();
        assert!(!c.is_solved());
    }

    #[test]
    fn test_u_turn_cycles_side_rows() {
        let mut c = cube(3);
        c.apply_str("U").unwrap();
        // the front's top row goes to the left face
        assert_eq!(c.label(Face::L, 0, 0), b'F');
        assert_eq!(c.label(Face::F, 0, 2), b'R');
        assert_eq!(c.label(Face::L, 1, 0), b'L');
    }

    #[test]
    fn test_r_turn_moves_front_up() {
        let mut c = cube(3);
        c.apply_str("R").unwrap();
        assert_eq!(c.label(Face::U, 0, 2), b'F');
        assert_eq!(c.label(Face::B, 0, 0), b'U');
        assert_eq!(c.label(Face::U, 0, 0), b'U');
    }

    #[test]
    fn test_wide_and_rotation_moves() {
        let mut wide = cube(4);
        wide.apply_str("Rw").unwrap();
        let mut slices = cube(4);
        slices.apply_str("R").unwrap();
        assert_ne!(wide, slices);

        // x equals turning every layer, which leaves a solved cube solved
        let mut rotated = cube(4);
        rotated.apply_str("x y' z2").unwrap();
        assert!(rotated.is_solved());
        assert!(
            rotated.apply_str("4Rw").is_err(),
            "a full-width face turn is spelled x"
        );
    }

    #[test]
    fn test_state_string_roundtrip() {
        let table = MoveTable::new(2).unwrap();
        let solved = Cube::from_state(Arc::clone(&table), SOLVED_222).unwrap();
        assert!(solved.is_solved());
        assert_eq!(solved.state_string(), SOLVED_222);

        let mut scrambled = solved.clone();
        scrambled.apply_str("R U R' U'").unwrap();
        let reparsed = Cube::from_state(table, &scrambled.state_string()).unwrap();
        assert_eq!(reparsed, scrambled);
    }

    #[test]
    fn test_color_remap() {
        let table = MoveTable::new(2).unwrap();
        let remap: FxHashMap<char, Face> = [
            ('W', Face::U),
            ('R', Face::R),
            ('G', Face::F),
            ('Y', Face::D),
            ('O', Face::L),
            ('B', Face::B),
        ]
        .into_iter()
        .collect();
        let c = Cube::from_state_with_colors(table, "WWWWRRRRGGGGYYYYOOOOBBBB", Some(&remap))
            .unwrap();
        assert_eq!(c.state_string(), SOLVED_222);
    }

    #[test]
    fn test_rejects_bad_states() {
        let table = MoveTable::new(2).unwrap();
        assert!(Cube::from_state(Arc::clone(&table), "UUU").is_err());
        assert!(Cube::from_state(table, "QUUURRRRFFFFDDDDLLLLBBBB").is_err());
    }

    #[test]
    fn test_orbit_cardinalities() {
        // corners, wings, midges, x-centres, t-centres and the fixed centre on a 5x5x5
        let table = MoveTable::new(5).unwrap();
        let sizes: Vec<usize> = table.orbits().iter().map(Vec::len).collect();
        assert_eq!(sizes.iter().sum::<usize>(), 150);
        assert_eq!(sizes[0], 24, "corner orbit");

        let mut c = Cube::solved(table);
        c.apply_str("Rw U 3Fw' D2 Lw B").unwrap();
        c.sanity_check().unwrap();
    }

    #[test]
    fn test_sanity_check_catches_swapped_stickers() {
        let mut c = cube(3);
        // swap a corner sticker with an edge sticker
        let a = facelet_index(3, Face::U, 0, 0);
        let b = facelet_index(3, Face::F, 0, 1);
        c.set_label(a, b'F');
        c.set_label(b, b'U');
        assert!(c.sanity_check().is_err());
    }

    #[test]
    fn test_reorient_odd_and_even() {
        let mut odd = cube(3);
        odd.apply_str("x y R").unwrap();
        let rotation = odd.reorient().unwrap();
        assert!(!rotation.is_empty());
        assert_eq!(odd.label(Face::U, 1, 1), b'U');
        assert_eq!(odd.label(Face::F, 1, 1), b'F');

        let mut even = cube(2);
        even.apply_str("z' y2").unwrap();
        even.reorient().unwrap();
        assert!(even.is_solved());
        assert_eq!(even.label(Face::D, 1, 0), b'D');
        assert_eq!(even.state_string(), SOLVED_222);
    }

    #[test]
    fn test_reset_restores_solved() {
        let mut c = cube(4);
        c.apply_str("R U Fw").unwrap();
        c.reset();
        assert!(c.is_solved());
        assert_eq!(c, cube(4));
    }

    #[test]
    fn test_format_net_solved_222() {
        insta::assert_snapshot!(cube(2).format_net(), @r"
           UU
           UU
        LL FF RR BB
        LL FF RR BB
           DD
           DD
        ");
    }
}
