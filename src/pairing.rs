//! Edge pairing and parity on a 4x4x4 with solved centres.
//!
//! Pairing is greedy. Each step tries every setup of up to three outer turns
//! followed by one pairing sequence, in every orientation and mirror image,
//! and keeps the candidate that pairs the most edges, the shortest on a tie.
//! Setups are tried depth by depth and the first depth that makes progress
//! wins. Outer turns and the pairing sequences never disturb solved centres.
//!
//! Every pairing sequence turns inner slices an even number of quarter turns,
//! so the wing parity fixed while staging centres survives pairing and the
//! paired cube has no flipped-edge parity. What can remain is a permutation
//! parity between corners and edges, fixed by swapping two edges.

use std::sync::Arc;

use log::{debug, info};
use rustc_hash::FxHashSet;

use crate::catalog;
use crate::cube::{Cube, MoveTable};
use crate::error::{Error, Result};
use crate::geometry::Face;
use crate::moves::{compress_moves, format_moves, inverse, parse_moves, strip_rotations, Move, Step};
use crate::pieces::{centre_facelets, check_solvable, edge_slots, Unsolvable};
use crate::pipeline::LayerMap;

/// Pairing sequences before orientation and mirroring.
const SEQUENCES: [&str; 8] = [
    "Uw R U R' Uw'",
    "Uw R U' R' Uw'",
    "Uw R U2 R' Uw'",
    "Uw L' U' L Uw'",
    "Uw L' U L Uw'",
    "Uw L' U2 L Uw'",
    "Dw R F' U R' F Dw'",
    "Uw R U R' F R' F' R Uw'",
];

/// `r2 U2 r2 Uw2 r2 Uw2`: swaps two paired edges and leaves centres solved.
const SWAP_EDGES: &str = "Rw2 R2 U2 Rw2 R2 Uw2 Rw2 R2 Uw2";

const SETUP_DEPTH: usize = 3;

/// Steps allowed to leave the paired count unchanged.
const NEUTRAL_STEPS: usize = 4;

/// A pairing sequence and its net facelet permutation.
struct Sequence {
    moves: Vec<Move>,
    perm: Vec<u16>,
}

/// A step under consideration.
#[derive(Clone, Copy)]
struct Candidate {
    depth: usize,
    setup: usize,
    sequence: usize,
    len: usize,
}

/// Pairs the edges of a 4x4x4 and settles its last parity.
pub struct EdgePairer {
    table: Arc<MoveTable>,
    sequences: Vec<Sequence>,
    /// Setups by depth.
    setups: Vec<Vec<Vec<Move>>>,
    centres: Vec<(usize, u8)>,
    /// The two wings of each edge slot, as `[primary, partner]` facelets.
    slots: Vec<[[usize; 2]; 2]>,
    reduce: LayerMap,
    fake: Cube,
}

impl EdgePairer {
    pub fn new(table: Arc<MoveTable>) -> Result<Self> {
        let size = table.size();
        if size != 4 {
            return Err(Error::Config(format!(
                "edge pairing runs on a 4x4x4, not a {size}x{size}x{size}"
            )));
        }

        let sequences = expand_sequences(&table)?
            .into_iter()
            .map(|moves| {
                let perm = net_permutation(&table, &moves)?;
                Ok(Sequence { moves, perm })
            })
            .collect::<Result<Vec<_>>>()?;
        debug!("{} pairing sequences", sequences.len());

        let outer = catalog::face_turns(&Face::ALL);
        let mut setups = vec![vec![Vec::new()]];
        for depth in 1..=SETUP_DEPTH {
            let longer = setups[depth - 1]
                .iter()
                .flat_map(|setup: &Vec<Move>| {
                    let last = setup.last().copied();
                    outer
                        .iter()
                        .filter(move |mv| {
                            !last.is_some_and(|previous| mv.redundant_after(&previous, size))
                        })
                        .map(move |mv| {
                            let mut longer = setup.clone();
                            longer.push(*mv);
                            longer
                        })
                })
                .collect();
            setups.push(longer);
        }

        let centres = Face::ALL
            .iter()
            .flat_map(|&face| {
                centre_facelets(size, &[face])
                    .into_iter()
                    .map(move |index| (index, face.label()))
            })
            .collect();
        let (near, far) = (edge_slots(size, 1), edge_slots(size, 2));
        let slots = near.into_iter().zip(far).map(|(a, b)| [a, b]).collect();

        Ok(EdgePairer {
            sequences,
            setups,
            centres,
            slots,
            reduce: LayerMap::outer(3, size)?,
            fake: catalog::solved(3)?,
            table,
        })
    }

    pub fn sequence_count(&self) -> usize {
        self.sequences.len()
    }

    pub fn centres_solved(&self, facelets: &[u8]) -> bool {
        self.centres.iter().all(|&(index, label)| facelets[index] == label)
    }

    fn count_paired(&self, read: impl Fn(usize) -> u8) -> usize {
        self.slots
            .iter()
            .filter(|[[p1, q1], [p2, q2]]| read(*p1) == read(*p2) && read(*q1) == read(*q2))
            .count()
    }

    /// Edge slots whose two wings are paired.
    pub fn paired(&self, facelets: &[u8]) -> usize {
        self.count_paired(|index| facelets[index])
    }

    fn check_centres(&self, phase: &str, cube: &Cube) -> Result<()> {
        if self.centres_solved(cube.facelets()) {
            Ok(())
        } else {
            Err(Error::Solve {
                phase: phase.to_string(),
                reason: "centres are not solved".to_string(),
            })
        }
    }

    /// Pairs every edge of `cube`, returning the moves applied.
    pub fn pair(&self, phase: &str, cube: &mut Cube) -> Result<Vec<Move>> {
        self.check_centres(phase, cube)?;
        let mut moves = Vec::new();
        let mut seen = FxHashSet::default();
        let mut neutral = 0;
        let mut paired = self.paired(cube.facelets());
        let start = paired;

        while paired < self.slots.len() {
            seen.insert(cube.facelets().to_vec());
            let (candidate, gain) = match self.best_step(cube, paired, &seen)? {
                Some(step) => step,
                None => {
                    return Err(Error::Solve {
                        phase: phase.to_string(),
                        reason: format!("no pairing step found with {paired} of 12 edges paired"),
                    })
                }
            };
            if gain == 0 {
                neutral += 1;
                if neutral > NEUTRAL_STEPS {
                    return Err(Error::Solve {
                        phase: phase.to_string(),
                        reason: format!("stuck at {paired} of 12 edges paired"),
                    });
                }
            }

            let setup = &self.setups[candidate.depth][candidate.setup];
            let sequence = &self.sequences[candidate.sequence];
            cube.apply_moves(setup)?;
            cube.apply_moves(&sequence.moves)?;
            self.check_centres(phase, cube)?;
            moves.extend_from_slice(setup);
            moves.extend_from_slice(&sequence.moves);

            paired = self.paired(cube.facelets());
            debug!(
                "{phase}: {} {} pairs {paired} edges",
                format_moves(setup),
                format_moves(&sequence.moves)
            );
        }

        let moves = compress_moves(&moves);
        info!("{phase}: paired {} edges in {} moves", paired - start, moves.len());
        Ok(moves)
    }

    /// The best step from `cube` with its gain; steps that gain nothing
    /// are only taken towards states not seen before.
    fn best_step(
        &self,
        cube: &Cube,
        paired: usize,
        seen: &FxHashSet<Vec<u8>>,
    ) -> Result<Option<(Candidate, usize)>> {
        let mut best: Option<(Candidate, usize)> = None;
        let mut neutral: Option<Candidate> = None;
        let mut work = cube.clone();

        for (depth, layer) in self.setups.iter().enumerate() {
            for (index, setup) in layer.iter().enumerate() {
                work.set_facelets(cube.facelets())?;
                work.apply_moves(setup)?;
                let base = work.facelets();

                for (sequence_index, sequence) in self.sequences.iter().enumerate() {
                    let candidate = Candidate {
                        depth,
                        setup: index,
                        sequence: sequence_index,
                        len: setup.len() + sequence.moves.len(),
                    };
                    let now = self.count_paired(|i| base[sequence.perm[i] as usize]);
                    if now > paired {
                        let gain = now - paired;
                        let better = best.map_or(true, |(held, held_gain)| {
                            gain > held_gain || (gain == held_gain && candidate.len < held.len)
                        });
                        if better {
                            best = Some((candidate, gain));
                        }
                    } else if now == paired && neutral.map_or(true, |held| candidate.len < held.len) {
                        let after: Vec<u8> =
                            sequence.perm.iter().map(|&i| base[i as usize]).collect();
                        if !seen.contains(&after) {
                            neutral = Some(candidate);
                        }
                    }
                }
            }
            if best.is_some() {
                return Ok(best);
            }
        }
        Ok(neutral.map(|candidate| (candidate, 0)))
    }

    /// Swaps two edges when the reduced cube has permutation parity.
    ///
    /// Expects solved centres and paired edges. A flipped-edge parity means
    /// the wings were left odd and is reported, not fixed.
    pub fn fix_parity(&mut self, phase: &str, cube: &mut Cube) -> Result<Vec<Move>> {
        self.check_centres(phase, cube)?;
        if self.paired(cube.facelets()) != self.slots.len() {
            return Err(Error::Solve {
                phase: phase.to_string(),
                reason: "edges are not paired".to_string(),
            });
        }

        let moves = match self.reduced_parity(cube)? {
            None => Vec::new(),
            Some(Unsolvable::Permutation) => {
                info!("{phase}: permutation parity, swapping two edges");
                let swap = parse_moves(SWAP_EDGES)?;
                cube.apply_moves(&swap)?;
                if let Some(left) = self.reduced_parity(cube)? {
                    return Err(Error::Solve {
                        phase: phase.to_string(),
                        reason: format!("edge swap left {left}"),
                    });
                }
                swap
            }
            Some(Unsolvable::EdgeFlip) => {
                return Err(Error::Solve {
                    phase: phase.to_string(),
                    reason: "flipped-edge parity: the wing permutation is odd".to_string(),
                })
            }
            Some(other) => {
                return Err(Error::Solve {
                    phase: phase.to_string(),
                    reason: format!("reduced cube has {other}"),
                })
            }
        };
        self.check_centres(phase, cube)?;
        Ok(moves)
    }

    fn reduced_parity(&mut self, cube: &Cube) -> Result<Option<Unsolvable>> {
        self.reduce.project(cube, &mut self.fake)?;
        Ok(check_solvable(&self.fake).err())
    }

    pub fn table(&self) -> &Arc<MoveTable> {
        &self.table
    }
}

/// Every pairing sequence with its inverse and mirror image, in all 24
/// orientations, without duplicates.
fn expand_sequences(table: &MoveTable) -> Result<Vec<Vec<Move>>> {
    let mut base = Vec::new();
    for text in SEQUENCES {
        let moves = parse_moves(text)?;
        let mirrored = mirror(&moves);
        base.push(inverse(&moves));
        base.push(inverse(&mirrored));
        base.push(moves);
        base.push(mirrored);
    }

    let mut out = Vec::with_capacity(base.len() * table.orientations().len());
    for (rotation, _) in table.orientations() {
        for moves in &base {
            let steps: Vec<Step> = rotation
                .iter()
                .chain(moves)
                .chain(&inverse(rotation))
                .copied()
                .map(Step::Move)
                .collect();
            out.push(
                strip_rotations(&steps)
                    .iter()
                    .filter_map(Step::as_move)
                    .copied()
                    .collect(),
            );
        }
    }
    out.sort_unstable();
    out.dedup();
    Ok(out)
}

/// Reflection through the plane between L and R.
fn mirror(moves: &[Move]) -> Vec<Move> {
    moves
        .iter()
        .map(|mv| {
            let face = match mv.face {
                Face::L => Face::R,
                Face::R => Face::L,
                other => other,
            };
            Move {
                face,
                width: mv.width,
                turn: mv.turn.inverse(),
            }
        })
        .collect()
}

/// `new[i] = old[perm[i]]` for the whole sequence.
fn net_permutation(table: &MoveTable, moves: &[Move]) -> Result<Vec<u16>> {
    let mut net: Vec<u16> = (0..table.facelet_count() as u16).collect();
    for mv in moves {
        let perm = table.perm(mv)?;
        net = perm.iter().map(|&from| net[from as usize]).collect();
    }
    Ok(net)
}
