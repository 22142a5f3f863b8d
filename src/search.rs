//! Iterative-deepening A* over the cube engine.
//!
//! The bound is the maximum of the assigned tables' costs, so it stays
//! admissible as long as every table is (a multiplier above 1 trades that
//! for speed). Each threshold pass is a depth-first search that applies a
//! move, recurses and undoes it on a single cube. The children of a node
//! are scored together with one batched lookup per table.

use std::sync::Arc;

use log::{debug, info};

use crate::cube::Cube;
use crate::error::{Error, Result};
use crate::moves::Move;
use crate::native::NativeSolver;
use crate::pieces::WingOrbit;
use crate::projection::Projection;
use crate::table::LookupTable;

/// What a search is trying to reach.
#[derive(Clone, Debug)]
pub enum Goal {
    /// Every face shows one label.
    Solved,
    /// The projection of the cube is one of `targets`.
    Projected {
        projection: Projection,
        targets: Vec<Vec<u8>>,
    },
    /// `inner` holds and the wings of the orbit are an even permutation.
    EvenWings {
        inner: Box<Goal>,
        wings: Arc<WingOrbit>,
    },
}

impl Goal {
    /// A projected goal whose target is the projection of `solved`.
    pub fn projected(projection: Projection, solved: &Cube) -> Self {
        let targets = vec![projection.project(solved.facelets())];
        Goal::Projected {
            projection,
            targets,
        }
    }

    pub fn reached(&self, cube: &Cube) -> bool {
        match self {
            Goal::Solved => cube.is_solved(),
            Goal::Projected {
                projection,
                targets,
            } => {
                let reduced = projection.project(cube.facelets());
                targets.contains(&reduced)
            }
            Goal::EvenWings { inner, wings } => {
                inner.reached(cube) && wings.is_odd(cube.facelets()) == Some(false)
            }
        }
    }
}

/// Where threshold passes run.
pub enum Backend {
    InProcess,
    Native(NativeSolver),
}

/// One configured IDA* search.
pub struct IdaSearch<'a> {
    tables: Vec<&'a LookupTable>,
    main_table: Option<&'a LookupTable>,
    legal_moves: Vec<Move>,
    goal: Goal,
    min_threshold: u8,
    max_threshold: u8,
    multiplier: Option<f32>,
}

impl<'a> IdaSearch<'a> {
    pub fn new(tables: Vec<&'a LookupTable>, legal_moves: Vec<Move>, goal: Goal) -> Self {
        IdaSearch {
            tables,
            main_table: None,
            legal_moves,
            goal,
            min_threshold: 0,
            max_threshold: 20,
            multiplier: None,
        }
    }

    /// A table with full move sequences; reaching one of its states within
    /// the threshold ends the search.
    pub fn main_table(mut self, table: &'a LookupTable) -> Self {
        self.main_table = Some(table);
        self
    }

    pub fn min_threshold(mut self, threshold: u8) -> Self {
        self.min_threshold = threshold;
        self
    }

    pub fn max_threshold(mut self, threshold: u8) -> Self {
        self.max_threshold = threshold;
        self
    }

    /// Scales every table cost, rounding to the nearest move.
    pub fn multiplier(mut self, multiplier: Option<f32>) -> Self {
        self.multiplier = multiplier;
        self
    }

    pub fn tables(&self) -> &[&'a LookupTable] {
        &self.tables
    }

    pub fn legal_moves(&self) -> &[Move] {
        &self.legal_moves
    }

    pub fn goal(&self) -> &Goal {
        &self.goal
    }

    pub fn threshold_cap(&self) -> u8 {
        self.max_threshold
    }

    pub fn cost_multiplier(&self) -> Option<f32> {
        self.multiplier
    }

    #[inline]
    fn scaled(&self, cost: u8) -> u8 {
        match self.multiplier {
            Some(multiplier) => (cost as f32 * multiplier).round().clamp(0.0, 255.0) as u8,
            None => cost,
        }
    }

    /// The combined lower bound for one cube.
    pub fn heuristic(&self, cube: &Cube) -> Result<u8> {
        let mut bound = 0;
        for table in &self.tables {
            let entry = table.lookup(cube.facelets())?;
            bound = bound.max(self.scaled(table.cost(entry.as_ref())));
        }
        Ok(bound)
    }

    fn check_sizes(&self, cube: &Cube) -> Result<()> {
        let tables = self.tables.iter().chain(self.main_table.as_ref());
        for table in tables {
            if table.size() != cube.size() {
                return Err(Error::Config(format!(
                    "table {} is for size {}, the cube is {}",
                    table.name(),
                    table.size(),
                    cube.size()
                )));
            }
        }
        Ok(())
    }

    /// Moves from `cube` to the goal, searched in process.
    pub fn solve(&self, cube: &Cube) -> Result<Vec<Move>> {
        self.check_sizes(cube)?;
        let start_h = self.heuristic(cube)?;
        let mut threshold = start_h.max(self.min_threshold);
        let floor = threshold;

        loop {
            if threshold > self.max_threshold {
                return Err(Error::NoIdaSolution {
                    min_threshold: floor,
                    max_threshold: self.max_threshold,
                });
            }
            info!(
                "IDA threshold {threshold} (start cost {start_h}, {} tables)",
                self.tables.len()
            );

            let mut pass = Pass {
                search: self,
                cube: cube.clone(),
                path: Vec::new(),
                tail: Vec::new(),
                threshold,
                next: u8::MAX,
                nodes: 0,
            };
            if pass.descend(0, start_h)? {
                info!(
                    "found {} moves at threshold {threshold} after {} nodes",
                    pass.path.len() + pass.tail.len(),
                    pass.nodes
                );
                let mut moves = pass.path;
                moves.extend(pass.tail);
                return Ok(moves);
            }
            debug!("threshold {threshold} exhausted after {} nodes", pass.nodes);

            if pass.next == u8::MAX {
                return Err(Error::NoIdaSolution {
                    min_threshold: floor,
                    max_threshold: self.max_threshold,
                });
            }
            threshold = pass.next;
        }
    }

    /// Like [`IdaSearch::solve`], on the chosen backend.
    pub fn solve_with(&self, cube: &Cube, backend: &Backend) -> Result<Vec<Move>> {
        match backend {
            Backend::InProcess => self.solve(cube),
            Backend::Native(native) => {
                self.check_sizes(cube)?;
                native.solve(self, cube)
            }
        }
    }
}

/// State of one threshold pass.
struct Pass<'s, 'a> {
    search: &'s IdaSearch<'a>,
    cube: Cube,
    path: Vec<Move>,
    /// Steps taken from the main table.
    tail: Vec<Move>,
    threshold: u8,
    /// Smallest f above the threshold seen so far.
    next: u8,
    nodes: u64,
}

impl Pass<'_, '_> {
    fn descend(&mut self, g: u8, h: u8) -> Result<bool> {
        self.nodes += 1;
        if h == 0 && self.search.goal.reached(&self.cube) {
            return Ok(true);
        }
        if let Some(main) = self.search.main_table {
            if let Some(steps) = main.lookup(self.cube.facelets())?.and_then(|entry| entry.steps) {
                if g as usize + steps.len() <= self.threshold as usize {
                    self.tail = steps;
                    return Ok(true);
                }
            }
        }

        let children = self.expand()?;
        for (mv, child_h) in children {
            let f = g.saturating_add(1).saturating_add(child_h);
            if f > self.threshold {
                self.next = self.next.min(f);
                continue;
            }
            self.cube.apply(&mv)?;
            self.path.push(mv);
            if self.descend(g + 1, child_h)? {
                return Ok(true);
            }
            self.path.pop();
            self.cube.apply(&mv.inverse())?;
        }
        Ok(false)
    }

    /// Legal children with their bounds, cheapest first.
    fn expand(&mut self) -> Result<Vec<(Move, u8)>> {
        let search = self.search;
        let size = self.cube.size();
        let last = self.path.last().copied();
        let moves: Vec<Move> = search
            .legal_moves
            .iter()
            .filter(|mv| !last.is_some_and(|previous| mv.redundant_after(&previous, size)))
            .copied()
            .collect();

        let mut reduced: Vec<Vec<Vec<u8>>> = vec![Vec::with_capacity(moves.len()); search.tables.len()];
        for mv in &moves {
            self.cube.apply(mv)?;
            for (table, states) in search.tables.iter().zip(reduced.iter_mut()) {
                states.push(table.projection().project(self.cube.facelets()));
            }
            self.cube.apply(&mv.inverse())?;
        }

        let mut bounds = vec![0u8; moves.len()];
        for (table, states) in search.tables.iter().zip(&reduced) {
            let entries = table.lookup_many(states)?;
            for (bound, entry) in bounds.iter_mut().zip(&entries) {
                *bound = (*bound).max(search.scaled(table.cost(entry.as_ref())));
            }
        }

        let mut children: Vec<(Move, u8)> = moves.into_iter().zip(bounds).collect();
        children.sort_by_key(|&(_, bound)| bound);
        Ok(children)
    }
}
