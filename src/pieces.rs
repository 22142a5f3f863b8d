//! Piece identification on top of the facelet model.
//!
//! Corners and edges are located by their cubie positions, so the same slot
//! tables serve a real 3x3x3, a 2x2x2, or the outer shell of any bigger cube.
//! Slot order follows the usual URF, UFL, ULB, UBR, DFR, DLF, DBL, DRB corner
//! and UR, UF, UL, UB, DR, DF, DL, DB, FR, FL, BL, BR edge convention.

use thiserror::Error;

use crate::cube::{facelet_coords, facelet_index, Cube, MoveTable};
use crate::geometry::{cross, dot, facelet_at, Coord, Face};

/// Sign triples `(x, y, z)` of the eight corner cubies.
const CORNER_SIGNS: [Coord; 8] = [
    (1, 1, 1),
    (-1, 1, 1),
    (-1, 1, -1),
    (1, 1, -1),
    (1, -1, 1),
    (-1, -1, 1),
    (-1, -1, -1),
    (1, -1, -1),
];

/// The two faces of each edge slot; the first holds the primary facelet.
pub const EDGE_FACES: [(Face, Face); 12] = [
    (Face::U, Face::R),
    (Face::U, Face::F),
    (Face::U, Face::L),
    (Face::U, Face::B),
    (Face::D, Face::R),
    (Face::D, Face::F),
    (Face::D, Face::L),
    (Face::D, Face::B),
    (Face::F, Face::R),
    (Face::F, Face::L),
    (Face::B, Face::L),
    (Face::B, Face::R),
];

fn scale((x, y, z): Coord, k: i32) -> Coord {
    (x * k, y * k, z * k)
}

fn add(a: Coord, b: Coord) -> Coord {
    (a.0 + b.0, a.1 + b.1, a.2 + b.2)
}

fn sticker_index(size: usize, cubie: Coord, normal: Coord) -> usize {
    // push the cubie centre out through `normal` onto the surface
    let pos = add(cubie, normal);
    match facelet_at(size, pos) {
        Some((face, row, col)) => facelet_index(size, face, row, col),
        None => unreachable!("sticker {pos:?} is off the cube"),
    }
}

/// Facelet indices of each corner slot: the U/D facelet first, then the
/// other two so every corner reads in the same rotational sense.
pub fn corner_slots(size: usize) -> [[usize; 3]; 8] {
    let reach = size as i32 - 1;
    CORNER_SIGNS.map(|(sx, sy, sz)| {
        let cubie = scale((sx, sy, sz), reach);
        let first = (0, sy, 0);
        let (mut second, mut third) = ((sx, 0, 0), (0, 0, sz));
        if dot(first, cross(second, third)) > 0 {
            std::mem::swap(&mut second, &mut third);
        }
        [first, second, third].map(|normal| sticker_index(size, cubie, normal))
    })
}

/// Facelet indices `[primary, partner]` of each edge slot at wing offset
/// `offset` (1 ..= size-2, measured from the corner at the negative end).
///
/// The primary facelet is the U/D one for U and D layer slots and the F/B
/// one for the middle layer.
pub fn edge_slots(size: usize, offset: usize) -> [[usize; 2]; 12] {
    let reach = size as i32 - 1;
    let along = 2 * offset as i32 - reach;
    EDGE_FACES.map(|(primary, partner)| {
        let (a, b) = (primary.normal(), partner.normal());
        let axis = (
            1 - a.0.abs() - b.0.abs(),
            1 - a.1.abs() - b.1.abs(),
            1 - a.2.abs() - b.2.abs(),
        );
        let cubie = add(add(scale(a, reach), scale(b, reach)), scale(axis, along));
        [sticker_index(size, cubie, a), sticker_index(size, cubie, b)]
    })
}

fn sorted<const N: usize>(mut labels: [u8; N]) -> [u8; N] {
    labels.sort_unstable();
    labels
}

/// Which corner (by home slot) carries `labels`.
pub fn corner_id(size: usize, labels: [u8; 3]) -> Option<usize> {
    let wanted = sorted(labels);
    corner_slots(size).iter().position(|slot| {
        sorted(slot.map(|index| facelet_coords(size, index).0.label())) == wanted
    })
}

/// Which edge (by home slot) carries `labels`.
pub fn edge_id(labels: [u8; 2]) -> Option<usize> {
    let wanted = sorted(labels);
    EDGE_FACES
        .iter()
        .position(|(a, b)| sorted([a.label(), b.label()]) == wanted)
}

/// Corner permutation and twists read off `facelets`.
///
/// The twist of a slot is where its U/D label sits (0, 1 or 2).
pub fn corner_state(size: usize, facelets: &[u8]) -> Option<(Vec<usize>, Vec<u8>)> {
    let mut perm = Vec::with_capacity(8);
    let mut twist = Vec::with_capacity(8);
    for slot in corner_slots(size) {
        let labels = slot.map(|index| facelets[index]);
        perm.push(corner_id(size, labels)?);
        twist.push(labels.iter().position(|&l| l == b'U' || l == b'D')? as u8);
    }
    Some((perm, twist))
}

/// Edge permutation and flips read off `facelets` at wing `offset`.
///
/// An edge is unflipped when its primary facelet shows U/D, or its partner
/// facelet shows L/R.
pub fn edge_state(size: usize, offset: usize, facelets: &[u8]) -> Option<(Vec<usize>, Vec<u8>)> {
    let mut perm = Vec::with_capacity(12);
    let mut flip = Vec::with_capacity(12);
    for [primary, partner] in edge_slots(size, offset) {
        let (p, q) = (facelets[primary], facelets[partner]);
        perm.push(edge_id([p, q])?);
        let good = matches!(p, b'U' | b'D') || matches!(q, b'L' | b'R');
        flip.push(u8::from(!good));
    }
    Some((perm, flip))
}

/// True when `perm` is odd.
pub fn is_odd(perm: &[usize]) -> bool {
    let mut seen = vec![false; perm.len()];
    let mut transpositions = 0;
    for start in 0..perm.len() {
        let mut len = 0;
        let mut at = start;
        while !seen[at] {
            seen[at] = true;
            at = perm[at];
            len += 1;
        }
        if len > 0 {
            transpositions += len - 1;
        }
    }
    transpositions % 2 == 1
}

/// Why a 2x2x2 or 3x3x3 state cannot be reached from solved.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum Unsolvable {
    #[error("solvability check needs a 2x2x2 or 3x3x3, got {0}")]
    Size(usize),
    #[error("no whole-cube rotation puts the reference pieces home")]
    Orientation,
    #[error("unrecognisable corner piece")]
    UnknownCorner,
    #[error("duplicated corner piece")]
    DuplicateCorner,
    #[error("corner twist parity")]
    CornerTwist,
    #[error("unrecognisable edge piece")]
    UnknownEdge,
    #[error("duplicated edge piece")]
    DuplicateEdge,
    #[error("edge flip parity")]
    EdgeFlip,
    #[error("permutation parity (a single swapped edge pair)")]
    Permutation,
}

/// Checks that a 2x2x2 or 3x3x3 state is reachable from solved.
///
/// Pieces are compared with their home slots after a whole-cube rotation
/// puts the reference pieces home, so any orientation of a valid cube
/// passes. Returns the first violated invariant.
pub fn check_solvable(cube: &Cube) -> Result<(), Unsolvable> {
    let size = cube.size();
    if !(2..=3).contains(&size) {
        return Err(Unsolvable::Size(size));
    }
    let mut oriented = cube.clone();
    oriented.reorient().map_err(|_| Unsolvable::Orientation)?;
    let facelets = oriented.facelets();

    let (corner_perm, twist) = corner_state(size, facelets).ok_or(Unsolvable::UnknownCorner)?;
    if !is_permutation(&corner_perm) {
        return Err(Unsolvable::DuplicateCorner);
    }
    if twist.iter().map(|&t| t as u32).sum::<u32>() % 3 != 0 {
        return Err(Unsolvable::CornerTwist);
    }
    if size == 2 {
        return Ok(());
    }

    let (edge_perm, flip) = edge_state(size, 1, facelets).ok_or(Unsolvable::UnknownEdge)?;
    if !is_permutation(&edge_perm) {
        return Err(Unsolvable::DuplicateEdge);
    }
    if flip.iter().map(|&f| f as u32).sum::<u32>() % 2 != 0 {
        return Err(Unsolvable::EdgeFlip);
    }
    if is_odd(&corner_perm) != is_odd(&edge_perm) {
        return Err(Unsolvable::Permutation);
    }
    Ok(())
}

/// Centre facelets of the listed faces: every facelet off the border.
pub fn centre_facelets(size: usize, faces: &[Face]) -> Vec<usize> {
    faces
        .iter()
        .flat_map(|&face| {
            (1..size - 1).flat_map(move |row| {
                (1..size - 1).map(move |col| facelet_index(size, face, row, col))
            })
        })
        .collect()
}

/// The 24 wings of one edge orbit and how they read in every position.
///
/// Position `2 * slot + k` is the wing at `offset` (k = 0) or at
/// `size - 1 - offset` (k = 1) of an edge slot. Wing `w` starts at position
/// `w`. Two wings share the labels of their edge, so a wing is told apart
/// from its twin by which facelet of the position its primary label sits on.
#[derive(Debug)]
pub struct WingOrbit {
    positions: Vec<[usize; 2]>,
    /// `shows[p][w]`: wing `w` at position `p` has its primary label on the
    /// primary facelet.
    shows: Vec<Vec<Option<bool>>>,
}

impl WingOrbit {
    pub fn new(table: &MoveTable, offset: usize) -> crate::error::Result<Self> {
        let size = table.size();
        if offset == 0 || 2 * offset + 1 >= size {
            return Err(crate::error::Error::InvalidState(format!(
                "no wing orbit at offset {offset} of a {size}x{size}x{size}"
            )));
        }
        let near = edge_slots(size, offset);
        let far = edge_slots(size, size - 1 - offset);
        let positions: Vec<[usize; 2]> = (0..12).flat_map(|slot| [near[slot], far[slot]]).collect();

        let mut located = rustc_hash::FxHashMap::default();
        for (position, [primary, partner]) in positions.iter().enumerate() {
            located.insert(*primary, (position, true));
            located.insert(*partner, (position, false));
        }

        let count = positions.len();
        let mut shows = vec![vec![None; count]; count];
        let mut pending: Vec<(usize, usize, bool)> = (0..count).map(|w| (w, w, true)).collect();
        for &(position, wing, bit) in &pending {
            shows[position][wing] = Some(bit);
        }
        let inverses: Vec<Vec<usize>> = table
            .face_moves()
            .iter()
            .map(|mv| {
                let perm = table.perm(mv)?;
                let mut inverse = vec![0; perm.len()];
                for (to, &from) in perm.iter().enumerate() {
                    inverse[from as usize] = to;
                }
                Ok(inverse)
            })
            .collect::<crate::error::Result<_>>()?;

        while let Some((position, wing, bit)) = pending.pop() {
            let [primary, partner] = positions[position];
            let reference = if bit { primary } else { partner };
            for inverse in &inverses {
                let Some(&(next, on_primary)) = located.get(&inverse[reference]) else {
                    return Err(crate::error::Error::InvalidState(format!(
                        "a face turn moves wing facelet {reference} out of its orbit"
                    )));
                };
                match shows[next][wing] {
                    None => {
                        shows[next][wing] = Some(on_primary);
                        pending.push((next, wing, on_primary));
                    }
                    Some(seen) if seen != on_primary => {
                        return Err(crate::error::Error::InvalidState(format!(
                            "wing {wing} reads both ways at position {next}"
                        )));
                    }
                    Some(_) => {}
                }
            }
        }
        Ok(WingOrbit { positions, shows })
    }

    /// Which wing sits in each position, or `None` for an impossible state.
    pub fn permutation(&self, facelets: &[u8]) -> Option<Vec<usize>> {
        let perm = self
            .positions
            .iter()
            .enumerate()
            .map(|(position, &[primary, partner])| {
                let (a, b) = (facelets[primary], facelets[partner]);
                let edge = edge_id([a, b])?;
                let on_primary = a == EDGE_FACES[edge].0.label();
                [2 * edge, 2 * edge + 1]
                    .into_iter()
                    .find(|&wing| self.shows[position][wing] == Some(on_primary))
            })
            .collect::<Option<Vec<usize>>>()?;
        is_permutation(&perm).then_some(perm)
    }

    /// Parity of the wing permutation.
    pub fn is_odd(&self, facelets: &[u8]) -> Option<bool> {
        self.permutation(facelets).map(|perm| is_odd(&perm))
    }
}

fn is_permutation(perm: &[usize]) -> bool {
    let mut seen = vec![false; perm.len()];
    perm.iter().all(|&p| p < perm.len() && !std::mem::replace(&mut seen[p], true))
}
