//! Built-in tables for the 2x2x2, the 3x3x3 and the 4x4x4.
//!
//! 2x2x2: the D-L-B corner never moves under `<U, R, F>`, so two perfect-hash
//! tables over the other seven corners (permutation, 5040 entries, and
//! orientation, 729 entries) cover the whole puzzle.
//!
//! 3x3x3: two-phase. `g1` brings the cube into `<U, D, L2, R2, F2, B2>`
//! (corners and edges oriented, E-slice edges in the E slice) and
//! `solve-333` finishes inside that group.
//!
//! 4x4x4: centres in three steps. U and D centres are staged onto the U and
//! D faces with every move, L and R centres onto L and R with moves that keep
//! U/D staged, then all centres are solved with outer turns and wide half
//! turns. Edge pairing and parity need no tables.

use crate::cube::{Cube, MoveTable};
use crate::error::Result;
use crate::geometry::Face;
use crate::indexer::Indexer;
use crate::moves::{Move, Turn};
use crate::pieces::{centre_facelets, corner_slots, edge_slots};
use crate::projection::{LabelRule, Projection};
use crate::table::{TableDescriptor, TableMode};

pub const CORNER_PERM_222: &str = "222-corner-perm";
pub const CORNER_ORIENT_222: &str = "222-corner-orient";
pub const CO_SLICE_333: &str = "333-g1-co-slice";
pub const EO_SLICE_333: &str = "333-g1-eo-slice";
pub const CORNERS_G1_333: &str = "333-g1-corners";
pub const EDGES_G1_333: &str = "333-g1-ud-edges";
pub const UD_CENTRES_STAGE_444: &str = "444-ud-centres-stage";
pub const LR_CENTRES_STAGE_444: &str = "444-lr-centres-stage";
pub const CENTRES_SOLVE_444: &str = "444-centres-solve";

/// Corner slot that stays home under `<U, R, F>`.
const FIXED_CORNER: usize = 6;

/// Every quarter, half and counter turn of the listed faces.
pub fn face_turns(faces: &[Face]) -> Vec<Move> {
    faces
        .iter()
        .flat_map(|&face| Turn::ALL.map(|turn| Move::new(face, 1, turn)))
        .collect()
}

pub fn moves_222() -> Vec<Move> {
    face_turns(&[Face::U, Face::R, Face::F])
}

pub fn moves_333() -> Vec<Move> {
    face_turns(&Face::ALL)
}

/// `<U, D, L2, R2, F2, B2>`.
pub fn moves_g1() -> Vec<Move> {
    let mut moves = face_turns(&[Face::U, Face::D]);
    moves.extend(
        [Face::L, Face::F, Face::R, Face::B].map(|face| Move::new(face, 1, Turn::Half)),
    );
    moves
}

/// Every outer and two-layer turn.
pub fn moves_444() -> Vec<Move> {
    Face::ALL
        .iter()
        .flat_map(|&face| {
            [1, 2]
                .into_iter()
                .flat_map(move |layers| Turn::ALL.map(|turn| Move::new(face, layers, turn)))
        })
        .collect()
}

/// Moves that keep U and D centres on U and D: outer turns, `Uw` and `Dw`
/// turns and the other wide half turns.
pub fn moves_444_ud_staged() -> Vec<Move> {
    let mut moves = face_turns(&Face::ALL);
    moves.extend(
        [Face::U, Face::D]
            .into_iter()
            .flat_map(|face| Turn::ALL.map(|turn| Move::new(face, 2, turn))),
    );
    moves.extend([Face::L, Face::F, Face::R, Face::B].map(|face| Move::new(face, 2, Turn::Half)));
    moves
}

/// Moves that keep every centre on its axis: outer turns and wide half turns.
pub fn moves_444_staged() -> Vec<Move> {
    let mut moves = face_turns(&Face::ALL);
    moves.extend(Face::ALL.map(|face| Move::new(face, 2, Turn::Half)));
    moves
}

/// `[[0, 1, 2], [3, 4, 5], ...]`: consecutive pieces of a reduced state.
fn layout(pieces: usize, facelets: usize) -> Vec<Vec<usize>> {
    (0..pieces)
        .map(|piece| (piece * facelets..(piece + 1) * facelets).collect())
        .collect()
}

/// Sorted home labels of every piece, read off a solved projection.
fn identities(projection: &Projection, solved: &Cube, pieces: &[Vec<usize>]) -> Vec<Vec<u8>> {
    let reduced = projection.project(solved.facelets());
    pieces
        .iter()
        .map(|piece| {
            let mut labels: Vec<u8> = piece.iter().map(|&offset| reduced[offset]).collect();
            labels.sort_unstable();
            labels
        })
        .collect()
}

fn corner_facelets(size: usize, skip: Option<usize>) -> Vec<usize> {
    corner_slots(size)
        .iter()
        .enumerate()
        .filter(|(slot, _)| Some(*slot) != skip)
        .flat_map(|(_, facelets)| facelets.iter().copied())
        .collect()
}

fn edge_pairs(slots: impl IntoIterator<Item = usize>) -> (Vec<usize>, Vec<usize>) {
    let all = edge_slots(3, 1);
    slots
        .into_iter()
        .map(|slot| (all[slot][0], all[slot][1]))
        .unzip()
}

fn ud_marker() -> LabelRule {
    LabelRule::Binary(vec!['U', 'D'])
}

fn corner_orientation(pieces: usize) -> Indexer {
    Indexer::Orientation {
        pieces: layout(pieces, 3),
        markers: vec![b'1'],
        modulus: 3,
    }
}

fn piece_permutation(projection: &Projection, solved: &Cube, pieces: usize, width: usize) -> Indexer {
    let pieces = layout(pieces, width);
    let identities = identities(projection, solved, &pieces);
    Indexer::Permutation { pieces, identities }
}

/// The two 2x2x2 tables.
pub fn tables_222() -> Result<Vec<TableDescriptor>> {
    let solved = Cube::solved(MoveTable::new(2)?);
    let corners = corner_facelets(2, Some(FIXED_CORNER));

    let perm = Projection::builder()
        .part(corners.clone(), LabelRule::Keep)
        .build()?;
    let perm_indexer = piece_permutation(&perm, &solved, 7, 3);

    let orient = Projection::builder().part(corners, ud_marker()).build()?;

    Ok(vec![
        TableDescriptor::new(
            CORNER_PERM_222,
            2,
            "lookup-table-222-corner-perm-perfect-hash",
            perm,
            TableMode::PerfectHash(perm_indexer),
            moves_222(),
        ),
        TableDescriptor::new(
            CORNER_ORIENT_222,
            2,
            "lookup-table-222-corner-orient-perfect-hash",
            orient,
            TableMode::PerfectHash(corner_orientation(7)),
            moves_222(),
        ),
    ])
}

/// Corner twist as hex keys in a sorted text table, for cross-checking the
/// perfect-hash corner orientation table.
pub fn corner_orient_222_text() -> Result<TableDescriptor> {
    let orient = Projection::builder()
        .part(corner_facelets(2, Some(FIXED_CORNER)), ud_marker())
        .hex(true)
        .build()?;
    let mut descriptor = TableDescriptor::new(
        CORNER_ORIENT_222,
        2,
        "lookup-table-222-corner-orient.txt",
        orient,
        TableMode::BinarySearch,
        moves_222(),
    );
    descriptor.cost_only = true;
    Ok(descriptor)
}

/// Corner twists, edge flips and E-slice membership: equal for every cube
/// in `<U, D, L2, R2, F2, B2>`.
pub fn g1_projection() -> Result<Projection> {
    let (primaries, partners) = edge_pairs(0..12);
    Projection::builder()
        .part(corner_facelets(3, None), ud_marker())
        .paired(
            primaries.clone(),
            partners.clone(),
            LabelRule::EdgeFlip {
                own: vec!['U', 'D'],
                partner: vec!['L', 'R'],
            },
        )
        .paired(primaries, partners, LabelRule::Member { absent: vec!['U', 'D'] })
        .build()
}

/// The four 3x3x3 tables: two for `g1`, two for `solve-333`.
pub fn tables_333() -> Result<Vec<TableDescriptor>> {
    let solved = Cube::solved(MoveTable::new(3)?);
    let (primaries, partners) = edge_pairs(0..12);
    let slice = || LabelRule::Member { absent: vec!['U', 'D'] };

    let co_slice = Projection::builder()
        .part(corner_facelets(3, None), ud_marker())
        .paired(primaries.clone(), partners.clone(), slice())
        .build()?;
    let co_slice_indexer = Indexer::product(vec![
        (24, corner_orientation(8)),
        (12, Indexer::Combination { width: 12, chosen: 4 }),
    ]);

    let eo_slice = Projection::builder()
        .paired(
            primaries.clone(),
            partners.clone(),
            LabelRule::EdgeFlip {
                own: vec!['U', 'D'],
                partner: vec!['L', 'R'],
            },
        )
        .paired(primaries, partners, slice())
        .build()?;
    let eo_slice_indexer = Indexer::product(vec![
        (12, Indexer::BitPack { alphabet: b"01".to_vec(), width: 12 }),
        (12, Indexer::Combination { width: 12, chosen: 4 }),
    ]);

    let corners = Projection::builder()
        .part(corner_facelets(3, None), LabelRule::Keep)
        .build()?;
    let corners_indexer = piece_permutation(&corners, &solved, 8, 3);

    // the eight U and D layer edges
    let (ud_primaries, ud_partners) = edge_pairs(0..8);
    let ud_edges: Vec<usize> = ud_primaries
        .iter()
        .zip(&ud_partners)
        .flat_map(|(&primary, &partner)| [primary, partner])
        .collect();
    let edges = Projection::builder().part(ud_edges, LabelRule::Keep).build()?;
    let edges_indexer = piece_permutation(&edges, &solved, 8, 2);

    Ok(vec![
        TableDescriptor::new(
            CO_SLICE_333,
            3,
            "lookup-table-333-g1-co-slice-perfect-hash",
            co_slice,
            TableMode::PerfectHash(co_slice_indexer),
            moves_333(),
        ),
        TableDescriptor::new(
            EO_SLICE_333,
            3,
            "lookup-table-333-g1-eo-slice-perfect-hash",
            eo_slice,
            TableMode::PerfectHash(eo_slice_indexer),
            moves_333(),
        ),
        TableDescriptor::new(
            CORNERS_G1_333,
            3,
            "lookup-table-333-g1-corners-perfect-hash",
            corners,
            TableMode::PerfectHash(corners_indexer),
            moves_g1(),
        ),
        TableDescriptor::new(
            EDGES_G1_333,
            3,
            "lookup-table-333-g1-ud-edges-perfect-hash",
            edges,
            TableMode::PerfectHash(edges_indexer),
            moves_g1(),
        ),
    ])
}

/// The three 4x4x4 centre tables.
pub fn tables_444() -> Result<Vec<TableDescriptor>> {
    let ud_stage = Projection::builder()
        .part(centre_facelets(4, &Face::ALL), LabelRule::Binary(vec!['U', 'D']))
        .build()?;
    let lr_stage = Projection::builder()
        .part(
            centre_facelets(4, &[Face::L, Face::F, Face::R, Face::B]),
            LabelRule::Binary(vec!['L', 'R']),
        )
        .build()?;
    // one marker per axis: which half of the staged centres shows U, L or F
    let solve = Projection::builder()
        .part(centre_facelets(4, &[Face::U, Face::D]), LabelRule::Binary(vec!['U']))
        .part(centre_facelets(4, &[Face::L, Face::R]), LabelRule::Binary(vec!['L']))
        .part(centre_facelets(4, &[Face::F, Face::B]), LabelRule::Binary(vec!['F']))
        .build()?;
    let half = || Indexer::Combination { width: 8, chosen: 4 };

    Ok(vec![
        TableDescriptor::new(
            UD_CENTRES_STAGE_444,
            4,
            "lookup-table-444-ud-centres-stage-perfect-hash",
            ud_stage,
            TableMode::PerfectHash(Indexer::Combination { width: 24, chosen: 8 }),
            moves_444(),
        ),
        TableDescriptor::new(
            LR_CENTRES_STAGE_444,
            4,
            "lookup-table-444-lr-centres-stage-perfect-hash",
            lr_stage,
            TableMode::PerfectHash(Indexer::Combination { width: 16, chosen: 8 }),
            moves_444_ud_staged(),
        ),
        TableDescriptor::new(
            CENTRES_SOLVE_444,
            4,
            "lookup-table-444-centres-solve-perfect-hash",
            solve,
            TableMode::PerfectHash(Indexer::product(vec![(8, half()), (8, half()), (8, half())])),
            moves_444_staged(),
        ),
    ])
}

/// Built-in tables for a cube size; sizes above 4 reduce to a 4x4x4.
pub fn builtin_tables(size: usize) -> Result<Vec<TableDescriptor>> {
    match size {
        2 => tables_222(),
        3 => tables_333(),
        4 => tables_444(),
        _ => Ok(Vec::new()),
    }
}

/// The solved cube of a size, shared by goal definitions.
pub fn solved(size: usize) -> Result<Cube> {
    Ok(Cube::solved(MoveTable::new(size)?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pieces::check_solvable;

    #[test]
    fn test_indexers_cover_solved_states() {
        let all = [tables_222(), tables_333(), tables_444()];
        for descriptor in all.into_iter().flat_map(Result::unwrap) {
            let solved = solved(descriptor.size).unwrap();
            let reduced = descriptor.projection.project(solved.facelets());
            let TableMode::PerfectHash(indexer) = &descriptor.mode else {
                panic!("{} should be a perfect-hash table", descriptor.name);
            };
            assert!(
                indexer.rank(&reduced).is_some(),
                "{}: the solved state must be in the domain",
                descriptor.name
            );
        }
    }

    #[test]
    fn test_domain_sizes() {
        let sizes: Vec<u64> = tables_222()
            .unwrap()
            .into_iter()
            .chain(tables_333().unwrap())
            .chain(tables_444().unwrap())
            .map(|descriptor| match descriptor.mode {
                TableMode::PerfectHash(indexer) => indexer.domain_size(),
                TableMode::BinarySearch => 0,
            })
            .collect();
        assert_eq!(
            sizes,
            vec![5040, 729, 2187 * 495, 4096 * 495, 40320, 40320, 735471, 12870, 70 * 70 * 70]
        );
    }

    #[test]
    fn test_scrambles_stay_in_domain() {
        let mut cube = solved(3).unwrap();
        cube.apply_str("R U F' L2 D B' R2 U'").unwrap();
        assert_eq!(check_solvable(&cube), Ok(()));
        for descriptor in tables_333().unwrap().iter().take(2) {
            let TableMode::PerfectHash(indexer) = &descriptor.mode else {
                unreachable!()
            };
            let reduced = descriptor.projection.project(cube.facelets());
            assert!(indexer.rank(&reduced).is_some(), "{}", descriptor.name);
        }
    }

    #[test]
    fn test_g1_goal_holds_inside_g1() {
        let projection = g1_projection().unwrap();
        let target = projection.project(solved(3).unwrap().facelets());
        let mut cube = solved(3).unwrap();
        cube.apply_str("U R2 D' F2 L2 B2 U2").unwrap();
        assert_eq!(projection.project(cube.facelets()), target);
        cube.apply_str("R").unwrap();
        assert_ne!(projection.project(cube.facelets()), target);
    }

    #[test]
    fn test_staged_move_sets_keep_their_stage() {
        assert_eq!(moves_444().len(), 36);
        assert_eq!(moves_444_ud_staged().len(), 28);
        assert_eq!(moves_444_staged().len(), 24);

        let tables = tables_444().unwrap();
        let solved = solved(4).unwrap();
        // a move set keeps a stage when no single move leaves the staged state
        let stages = [
            (&tables[0], moves_444_ud_staged()),
            (&tables[1], moves_444_staged()),
        ];
        for (stage, moves) in stages {
            let target = stage.projection.project(solved.facelets());
            for mv in moves {
                let mut cube = solved.clone();
                cube.apply(&mv).unwrap();
                let reduced = stage.projection.project(cube.facelets());
                assert_eq!(reduced, target, "{}: {mv}", stage.name);
            }
        }

        let ud = &tables[0].projection;
        let mut cube = solved.clone();
        cube.apply_str("Rw").unwrap();
        assert_ne!(ud.project(cube.facelets()), ud.project(solved.facelets()));
    }
}
