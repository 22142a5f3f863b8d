//! The reduction pipeline.
//!
//! A [`Solver`] runs a size's [`PhaseTable`] in order. A phase either
//! reorients the cube, runs an IDA* search, replays a table's stored steps,
//! pairs 4x4x4 edges, fixes 4x4x4 parity, or reduces: it projects some
//! layers into a smaller fake cube, has the solver for that size solve it,
//! and replays the fake solution on the real cube with every wide turn
//! rewritten through a [`LayerMap`].
//!
//! Built-in phases: the 2x2x2 and 3x3x3 solve directly. The 4x4x4 stages
//! and solves its centres, pairs its edges, fixes parity and reduces to a
//! 3x3x3. Bigger cubes reduce one 4x4x4 per orbit, innermost first, then
//! reduce to a 3x3x3.
//!
//! Only [`Error::NoIdaSolution`] is retried, once, with
//! `retry_max_ida_threshold`. Any other failure ends the solve with the
//! phase name attached.

use std::sync::Arc;

use log::{debug, info, warn};
use rustc_hash::FxHashMap;

use crate::catalog;
use crate::config::{Config, PhaseConfig};
use crate::cube::{facelet_coords, facelet_index, Cube, MoveTable};
use crate::error::{Error, Result};
use crate::moves::{compress, parse_moves, strip_rotations, Move, Step, Width};
use crate::pairing::EdgePairer;
use crate::pieces::{check_solvable, WingOrbit};
use crate::projection::Projection;
use crate::search::{Backend, Goal, IdaSearch};
use crate::table::{LookupTable, TableDescriptor};

/// Which real layer each layer of a fake cube reads.
///
/// Layer `i` counts from any face inwards. A fake facelet `(face, row, col)`
/// reads the real facelet `(face, layers[row], layers[col])`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LayerMap {
    fake: usize,
    real: usize,
    layers: Vec<usize>,
}

impl LayerMap {
    pub fn new(fake: usize, real: usize, layers: Vec<usize>) -> Result<Self> {
        let valid = fake >= 2
            && fake <= real
            && layers.len() == fake
            && layers.windows(2).all(|pair| pair[0] < pair[1])
            && layers.last().is_some_and(|&last| last < real);
        if !valid {
            return Err(Error::Config(format!(
                "layers {layers:?} do not map a {fake}-cube into a {real}-cube"
            )));
        }
        Ok(LayerMap { fake, real, layers })
    }

    /// Outer layers map to outer layers; the middle layer of an odd fake
    /// cube reads the real middle, or layer 1 when the real size is even.
    pub fn outer(fake: usize, real: usize) -> Result<Self> {
        let layers = (0..fake)
            .map(|i| {
                if fake % 2 == 1 && i == fake / 2 {
                    if real % 2 == 1 {
                        real / 2
                    } else {
                        fake / 2
                    }
                } else if i < fake / 2 {
                    i
                } else {
                    (real + i).saturating_sub(fake)
                }
            })
            .collect();
        Self::new(fake, real, layers)
    }

    pub fn fake_size(&self) -> usize {
        self.fake
    }

    pub fn real_size(&self) -> usize {
        self.real
    }

    pub fn layers(&self) -> &[usize] {
        &self.layers
    }

    /// The real facelet a fake facelet reads.
    pub fn real_index(&self, fake_index: usize) -> usize {
        let (face, row, col) = facelet_coords(self.fake, fake_index);
        facelet_index(self.real, face, self.layers[row], self.layers[col])
    }

    /// Copies the mapped real facelets into `fake`.
    pub fn project(&self, real: &Cube, fake: &mut Cube) -> Result<()> {
        if real.size() != self.real || fake.size() != self.fake {
            return Err(Error::InvalidState(format!(
                "layer map is for {} into {}, got {} into {}",
                self.fake,
                self.real,
                fake.size(),
                real.size()
            )));
        }
        let facelets: Vec<u8> = (0..6 * self.fake * self.fake)
            .map(|index| real.facelets()[self.real_index(index)])
            .collect();
        fake.set_facelets(&facelets)
    }

    /// Fake layer `depth` sits at the same real depth seen from either side.
    fn is_symmetric(&self, depth: usize) -> bool {
        self.layers[depth] + self.layers[self.fake - 1 - depth] == self.real - 1
    }

    /// The real move that turns the same fake layers.
    ///
    /// A fake turn of `j` layers becomes a real turn of `layers[j-1] + 1`
    /// layers. Turns whose layers only map consistently from one side (the
    /// middle of an odd fake cube on an even real cube) are rejected.
    pub fn rewrite(&self, mv: &Move) -> Result<Move> {
        let Width::Outer(turned) = mv.width else {
            return Ok(*mv);
        };
        let turned = turned as usize;
        if turned == 0 || turned >= self.fake {
            return Err(Error::unknown_move(
                mv.to_string(),
                format!("not a face turn of a {0}x{0}x{0}", self.fake),
            ));
        }
        if !(0..turned).all(|depth| self.is_symmetric(depth)) {
            return Err(Error::unknown_move(
                mv.to_string(),
                format!(
                    "layers {:?} give it no single counterpart on a {1}x{1}x{1}",
                    self.layers, self.real
                ),
            ));
        }
        let layers = self.layers[turned - 1] + 1;
        Ok(Move::new(mv.face, layers as u8, mv.turn))
    }
}

/// A configured IDA* phase.
#[derive(Clone, Debug)]
pub struct SearchPhase {
    pub tables: Vec<String>,
    pub main_table: Option<String>,
    pub legal_moves: Vec<Move>,
    pub goal: Goal,
    pub max_ida_threshold: Option<u8>,
    pub multiplier: Option<f32>,
    /// Run threshold passes on the native binary when one is configured.
    pub native: bool,
}

#[derive(Clone, Debug)]
pub enum PhaseKind {
    Reorient,
    Search(SearchPhase),
    /// Replay the steps a table stores for the current state.
    Lookup { table: String },
    Reduce(LayerMap),
    /// Pair the edges of a 4x4x4 whose centres are solved.
    PairEdges,
    /// Swap two edges of a reduced 4x4x4 when its 3x3x3 has permutation parity.
    EdgeParity,
}

impl PhaseKind {
    fn needs_pairer(&self) -> bool {
        matches!(self, PhaseKind::PairEdges | PhaseKind::EdgeParity)
    }
}

#[derive(Clone, Debug)]
pub struct Phase {
    pub name: String,
    pub kind: PhaseKind,
}

impl Phase {
    pub fn new(name: impl Into<String>, kind: PhaseKind) -> Self {
        Phase {
            name: name.into(),
            kind,
        }
    }

    fn table_names(&self) -> Vec<&str> {
        match &self.kind {
            PhaseKind::Search(search) => search
                .tables
                .iter()
                .chain(&search.main_table)
                .map(String::as_str)
                .collect(),
            PhaseKind::Lookup { table } => vec![table.as_str()],
            PhaseKind::Reorient
            | PhaseKind::Reduce(_)
            | PhaseKind::PairEdges
            | PhaseKind::EdgeParity => Vec::new(),
        }
    }
}

/// The ordered phases for one cube size, with the tables they use.
#[derive(Clone, Debug)]
pub struct PhaseTable {
    size: usize,
    phases: Vec<Phase>,
    descriptors: Vec<TableDescriptor>,
}

impl PhaseTable {
    /// Phases from configuration if any are given for `size`, else the
    /// built-in ones. Sizes above 3 always finish with `reduce-333`.
    ///
    /// Sizes above 4 reduce their corners, one diagonal centre orbit and
    /// one wing orbit at a time through a 4x4x4. Centres off the diagonals
    /// and the midges of odd sizes are left to configured phases.
    pub fn for_size(size: usize, config: &Config) -> Result<Self> {
        let mut available = catalog::builtin_tables(size)?;
        for table in config.tables.iter().filter(|table| table.size == size) {
            available.push(table.descriptor()?);
        }

        let configured = config.phases(size);
        let mut phases = if !configured.is_empty() {
            configured
                .iter()
                .map(|phase| configured_phase(size, phase))
                .collect::<Result<Vec<_>>>()?
        } else {
            match size {
                2 => builtin_222()?,
                3 => builtin_333()?,
                4 => builtin_444()?,
                _ if size > 4 => builtin_large(size)?,
                _ => Vec::new(),
            }
        };
        let ends_in_333 = phases
            .last()
            .is_some_and(|phase| matches!(&phase.kind, PhaseKind::Reduce(map) if map.fake_size() == 3));
        if size > 3 && !ends_in_333 {
            phases.push(Phase::new("reduce-333", PhaseKind::Reduce(LayerMap::outer(3, size)?)));
        }
        Self::new(size, phases, available)
    }

    /// Checks the phases against the available tables and keeps only the
    /// tables some phase uses.
    pub fn new(size: usize, phases: Vec<Phase>, available: Vec<TableDescriptor>) -> Result<Self> {
        let mut used = Vec::new();
        for phase in &phases {
            for name in phase.table_names() {
                if used.iter().any(|d: &TableDescriptor| d.name == name) {
                    continue;
                }
                let descriptor = available
                    .iter()
                    .find(|d| d.name == name && d.size == size)
                    .ok_or_else(|| {
                        Error::Config(format!("phase {:?} uses unknown table {name:?}", phase.name))
                    })?;
                used.push(descriptor.clone());
            }
            if let PhaseKind::Reduce(map) = &phase.kind {
                if map.real_size() != size || map.fake_size() >= size {
                    return Err(Error::Config(format!(
                        "phase {:?} cannot reduce a {size}-cube to a {}-cube",
                        phase.name,
                        map.fake_size()
                    )));
                }
            }
            if phase.kind.needs_pairer() && size != 4 {
                return Err(Error::Config(format!(
                    "phase {:?} pairs 4x4x4 edges, not {size}x{size}x{size} ones",
                    phase.name
                )));
            }
        }
        Ok(PhaseTable {
            size,
            phases,
            descriptors: used,
        })
    }

    pub fn size(&self) -> usize {
        self.size
    }

    pub fn phases(&self) -> &[Phase] {
        &self.phases
    }

    /// Tables the phases use.
    pub fn descriptors(&self) -> &[TableDescriptor] {
        &self.descriptors
    }

    /// Sizes of the fake cubes this table reduces to.
    pub fn reduced_sizes(&self) -> Vec<usize> {
        self.phases
            .iter()
            .filter_map(|phase| match &phase.kind {
                PhaseKind::Reduce(map) => Some(map.fake_size()),
                _ => None,
            })
            .collect()
    }
}

fn search_phase(tables: &[&str], legal_moves: Vec<Move>, goal: Goal) -> PhaseKind {
    PhaseKind::Search(SearchPhase {
        tables: tables.iter().map(|name| name.to_string()).collect(),
        main_table: None,
        legal_moves,
        goal,
        max_ida_threshold: None,
        multiplier: None,
        native: false,
    })
}

fn builtin_222() -> Result<Vec<Phase>> {
    Ok(vec![
        Phase::new("reorient", PhaseKind::Reorient),
        Phase::new(
            "solve-222",
            search_phase(
                &[catalog::CORNER_PERM_222, catalog::CORNER_ORIENT_222],
                catalog::moves_222(),
                Goal::Solved,
            ),
        ),
    ])
}

fn builtin_333() -> Result<Vec<Phase>> {
    let g1 = Goal::projected(catalog::g1_projection()?, &catalog::solved(3)?);
    Ok(vec![
        Phase::new("reorient", PhaseKind::Reorient),
        Phase::new(
            "g1",
            search_phase(
                &[catalog::CO_SLICE_333, catalog::EO_SLICE_333],
                catalog::moves_333(),
                g1,
            ),
        ),
        Phase::new(
            "solve-333",
            search_phase(
                &[catalog::CORNERS_G1_333, catalog::EDGES_G1_333],
                catalog::moves_g1(),
                Goal::Solved,
            ),
        ),
    ])
}

fn builtin_444() -> Result<Vec<Phase>> {
    let table = MoveTable::new(4)?;
    let solved = Cube::solved(Arc::clone(&table));
    let tables = catalog::tables_444()?;
    let reach = |index: usize| Goal::projected(tables[index].projection.clone(), &solved);
    // odd wings would leave a flipped edge after pairing
    let even_wings = Goal::EvenWings {
        inner: Box::new(reach(1)),
        wings: Arc::new(WingOrbit::new(&table, 1)?),
    };
    Ok(vec![
        Phase::new("reorient", PhaseKind::Reorient),
        Phase::new(
            "stage-ud-centres",
            search_phase(&[catalog::UD_CENTRES_STAGE_444], catalog::moves_444(), reach(0)),
        ),
        Phase::new(
            "stage-lr-centres",
            search_phase(
                &[catalog::LR_CENTRES_STAGE_444],
                catalog::moves_444_ud_staged(),
                even_wings,
            ),
        ),
        Phase::new(
            "solve-centres",
            search_phase(&[catalog::CENTRES_SOLVE_444], catalog::moves_444_staged(), reach(2)),
        ),
        Phase::new("pair-edges", PhaseKind::PairEdges),
        Phase::new("edge-parity", PhaseKind::EdgeParity),
    ])
}

/// One 4x4x4 reduction per orbit, innermost first.
fn builtin_large(size: usize) -> Result<Vec<Phase>> {
    let mut phases = vec![Phase::new("reorient", PhaseKind::Reorient)];
    for orbit in (1..=(size - 2) / 2).rev() {
        let map = LayerMap::new(4, size, vec![0, orbit, size - 1 - orbit, size - 1])?;
        phases.push(Phase::new(format!("reduce-444-{orbit}"), PhaseKind::Reduce(map)));
    }
    Ok(phases)
}

fn configured_phase(size: usize, phase: &PhaseConfig) -> Result<Phase> {
    Ok(match phase {
        PhaseConfig::Reorient { name } => Phase::new(name, PhaseKind::Reorient),
        PhaseConfig::Search {
            name,
            tables,
            main_table,
            legal_moves,
            goal,
            max_ida_threshold,
            multiplier,
            native,
            even_wings,
        } => {
            let mut goal = if goal.is_empty() {
                Goal::Solved
            } else {
                let projection = Projection::from_specs(size, goal, false)?;
                Goal::projected(projection, &catalog::solved(size)?)
            };
            if *even_wings {
                goal = Goal::EvenWings {
                    inner: Box::new(goal),
                    wings: Arc::new(WingOrbit::new(&*MoveTable::new(size)?, 1)?),
                };
            }
            let kind = PhaseKind::Search(SearchPhase {
                tables: tables.clone(),
                main_table: main_table.clone(),
                legal_moves: parse_moves(legal_moves)?,
                goal,
                max_ida_threshold: *max_ida_threshold,
                multiplier: *multiplier,
                native: *native,
            });
            Phase::new(name, kind)
        }
        PhaseConfig::Lookup { name, table } => Phase::new(
            name,
            PhaseKind::Lookup {
                table: table.clone(),
            },
        ),
        PhaseConfig::Reduce { name, size: fake, layers } => {
            let map = match layers {
                Some(layers) => LayerMap::new(*fake, size, layers.clone())?,
                None => LayerMap::outer(*fake, size)?,
            };
            Phase::new(name, PhaseKind::Reduce(map))
        }
        PhaseConfig::PairEdges { name } => Phase::new(name, PhaseKind::PairEdges),
        PhaseConfig::EdgeParity { name } => Phase::new(name, PhaseKind::EdgeParity),
    })
}

/// Reusable fake cubes and their solvers, keyed by size.
///
/// Entries are taken out while in use and put back afterwards, so a solve
/// never allocates a second solver or buffer for the same size.
#[derive(Default)]
pub struct SubPuzzlePool {
    solvers: FxHashMap<usize, Solver>,
    cubes: FxHashMap<usize, Cube>,
}

impl SubPuzzlePool {
    fn take_solver(&mut self, size: usize, config: &Arc<Config>) -> Result<Solver> {
        match self.solvers.remove(&size) {
            Some(solver) => Ok(solver),
            None => {
                debug!("creating {size}x{size}x{size} sub-solver");
                Solver::new(size, Arc::clone(config))
            }
        }
    }

    fn take_cube(&mut self, table: &Arc<MoveTable>) -> Cube {
        match self.cubes.remove(&table.size()) {
            Some(mut cube) => {
                cube.reset();
                cube
            }
            None => Cube::solved(Arc::clone(table)),
        }
    }

    fn put_back(&mut self, solver: Solver, cube: Cube) {
        self.cubes.insert(cube.size(), cube);
        self.solvers.insert(solver.size(), solver);
    }

    pub fn len(&self) -> usize {
        self.solvers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.solvers.is_empty()
    }
}

/// Checks that a projected fake cube is a legal cube of its size.
fn check_sub_puzzle(phase: &str, fake: &Cube) -> Result<()> {
    let size = fake.size();
    fake.sanity_check().map_err(|e| Error::Solve {
        phase: phase.to_string(),
        reason: format!("projected {size}x{size}x{size} is not a valid cube: {e}"),
    })?;
    if size <= 3 {
        check_solvable(fake).map_err(|reason| Error::Solve {
            phase: phase.to_string(),
            reason: format!("projected {size}x{size}x{size} has {reason}"),
        })?;
    }
    Ok(())
}

fn no_pairer(phase: &str) -> Error {
    Error::Config(format!("phase {phase:?} needs a 4x4x4 edge pairer"))
}

/// Solves cubes of one size.
pub struct Solver {
    table: Arc<MoveTable>,
    phases: PhaseTable,
    tables: FxHashMap<String, LookupTable>,
    config: Arc<Config>,
    native: Option<Backend>,
    pairer: Option<EdgePairer>,
    pool: SubPuzzlePool,
}

impl Solver {
    /// Builds the phase table for `size` and loads every table it uses.
    pub fn new(size: usize, config: Arc<Config>) -> Result<Self> {
        let phases = PhaseTable::for_size(size, &config)?;
        Self::with_phases(phases, config)
    }

    pub fn with_phases(phases: PhaseTable, config: Arc<Config>) -> Result<Self> {
        let table = MoveTable::new(phases.size())?;
        let mut tables = FxHashMap::default();
        for descriptor in phases.descriptors() {
            let loaded = LookupTable::load(descriptor.clone(), &config.tables_dir)?;
            tables.insert(descriptor.name.clone(), loaded);
        }
        let pairer = if phases.phases().iter().any(|phase| phase.kind.needs_pairer()) {
            Some(EdgePairer::new(Arc::clone(&table))?)
        } else {
            None
        };
        info!(
            "{0}x{0}x{0} solver ready: {1} phases, {2} tables",
            phases.size(),
            phases.phases().len(),
            tables.len()
        );
        Ok(Solver {
            table,
            phases,
            tables,
            native: config.native_solver().map(Backend::Native),
            pairer,
            config,
            pool: SubPuzzlePool::default(),
        })
    }

    pub fn size(&self) -> usize {
        self.table.size()
    }

    pub fn table(&self) -> &Arc<MoveTable> {
        &self.table
    }

    pub fn phases(&self) -> &PhaseTable {
        &self.phases
    }

    pub fn lookup_table(&self, name: &str) -> Result<&LookupTable> {
        self.tables
            .get(name)
            .ok_or_else(|| Error::Config(format!("table {name:?} is not loaded")))
    }

    /// Parses a state string, applying the configured colour remap.
    pub fn parse(&self, state: &str) -> Result<Cube> {
        Cube::from_state_with_colors(Arc::clone(&self.table), state, self.config.color_map())
    }

    /// Moves that solve `state`, rotations stripped and turns merged.
    pub fn solve(&mut self, state: &str) -> Result<Vec<Step>> {
        let mut cube = self.parse(state)?;
        let steps = self.solve_cube(&mut cube)?;
        let last = self
            .phases
            .phases()
            .last()
            .map_or_else(String::new, |phase| phase.name.clone());
        if !cube.is_solved() {
            return Err(Error::Solve {
                phase: last,
                reason: "cube is not solved after the last phase".to_string(),
            });
        }
        Ok(compress(&strip_rotations(&steps)))
    }

    /// Runs the phases up to and including `phase`.
    pub fn solve_phase(&mut self, phase: &str, state: &str) -> Result<Vec<Step>> {
        if !self.phases.phases().iter().any(|p| p.name == phase) {
            return Err(Error::Config(format!("no phase named {phase:?}")));
        }
        let mut cube = self.parse(state)?;
        self.run_phases(&mut cube, Some(phase))
    }

    /// Applies `moves` to `state`.
    pub fn rotate(&self, state: &str, moves: &str) -> Result<String> {
        let mut cube = self.parse(state)?;
        cube.apply_str(moves)?;
        Ok(cube.state_string())
    }

    pub fn solved(&self, state: &str) -> Result<bool> {
        Ok(self.parse(state)?.is_solved())
    }

    /// Runs every phase on `cube`, leaving it solved.
    pub fn solve_cube(&mut self, cube: &mut Cube) -> Result<Vec<Step>> {
        self.run_phases(cube, None)
    }

    fn run_phases(&mut self, cube: &mut Cube, last: Option<&str>) -> Result<Vec<Step>> {
        cube.sanity_check()?;
        if cube.size() <= 3 {
            check_solvable(cube).map_err(|e| Error::InvalidState(e.to_string()))?;
        }

        let size = cube.size();
        let mut steps = Vec::new();
        for index in 0..self.phases.phases().len() {
            let name = self.phases.phases()[index].name.clone();
            info!("{size}x{size}x{size} phase {name}");
            let phase_steps = match self.run_phase(index, cube, false) {
                Err(e) if e.is_no_solution() && self.config.retry_max_ida_threshold.is_some() => {
                    warn!("phase {name}: {e}, retrying with a higher threshold");
                    self.run_phase(index, cube, true)
                }
                other => other,
            }
            .map_err(|e| e.in_phase(&name))?;

            cube.sanity_check().map_err(|e| Error::Solve {
                phase: name.clone(),
                reason: e.to_string(),
            })?;
            debug!("phase {name}: {} steps", phase_steps.len());
            steps.extend(phase_steps);
            steps.push(Step::marker(&name));
            if last == Some(name.as_str()) {
                break;
            }
        }
        Ok(steps)
    }

    /// Runs one phase; `cube` is only changed when the phase succeeds.
    fn run_phase(&mut self, index: usize, cube: &mut Cube, retry: bool) -> Result<Vec<Step>> {
        let phase = &self.phases.phases()[index];
        match &phase.kind {
            PhaseKind::Reorient => Ok(cube.reorient()?.into_iter().map(Step::Move).collect()),
            PhaseKind::Search(search) => {
                let moves = self.search(search, cube, retry)?;
                cube.apply_moves(&moves)?;
                Ok(moves.into_iter().map(Step::Move).collect())
            }
            PhaseKind::Lookup { table } => {
                let table = self.lookup_table(table)?;
                let entry = table.lookup(cube.facelets())?.ok_or_else(|| Error::Solve {
                    phase: phase.name.clone(),
                    reason: format!("state is not in table {}", table.name()),
                })?;
                let moves = entry.steps.ok_or_else(|| Error::Solve {
                    phase: phase.name.clone(),
                    reason: format!("table {} stores costs only", table.name()),
                })?;
                cube.apply_moves(&moves)?;
                Ok(moves.into_iter().map(Step::Move).collect())
            }
            PhaseKind::Reduce(map) => {
                let map = map.clone();
                let name = phase.name.clone();
                self.reduce(&name, &map, cube)
            }
            PhaseKind::PairEdges => {
                let pairer = self.pairer.as_ref().ok_or_else(|| no_pairer(&phase.name))?;
                let mut work = cube.clone();
                let moves = pairer.pair(&phase.name, &mut work)?;
                cube.set_facelets(work.facelets())?;
                Ok(moves.into_iter().map(Step::Move).collect())
            }
            PhaseKind::EdgeParity => {
                let pairer = self.pairer.as_mut().ok_or_else(|| no_pairer(&phase.name))?;
                let mut work = cube.clone();
                let moves = pairer.fix_parity(&phase.name, &mut work)?;
                cube.set_facelets(work.facelets())?;
                Ok(moves.into_iter().map(Step::Move).collect())
            }
        }
    }

    fn search(&self, phase: &SearchPhase, cube: &Cube, retry: bool) -> Result<Vec<Move>> {
        let tables = phase
            .tables
            .iter()
            .map(|name| self.lookup_table(name))
            .collect::<Result<Vec<_>>>()?;
        let cap = match (retry, self.config.retry_max_ida_threshold) {
            (true, Some(retry_cap)) => retry_cap,
            _ => phase.max_ida_threshold.unwrap_or(self.config.max_ida_threshold),
        };

        let mut search = IdaSearch::new(tables, phase.legal_moves.clone(), phase.goal.clone())
            .max_threshold(cap)
            .multiplier(phase.multiplier);
        if let Some(main) = &phase.main_table {
            search = search.main_table(self.lookup_table(main)?);
        }

        let in_process = Backend::InProcess;
        let backend = match &self.native {
            Some(native) if phase.native => native,
            _ => &in_process,
        };
        search.solve_with(cube, backend)
    }

    fn reduce(&mut self, phase: &str, map: &LayerMap, cube: &mut Cube) -> Result<Vec<Step>> {
        let mut solver = self.pool.take_solver(map.fake_size(), &self.config)?;
        let mut fake = self.pool.take_cube(solver.table());
        let result = Self::solve_reduced(phase, map, cube, &mut solver, &mut fake);
        self.pool.put_back(solver, fake);
        result
    }

    fn solve_reduced(
        phase: &str,
        map: &LayerMap,
        cube: &mut Cube,
        solver: &mut Solver,
        fake: &mut Cube,
    ) -> Result<Vec<Step>> {
        map.project(cube, fake)?;
        check_sub_puzzle(phase, fake)?;
        let fake_steps = solver.solve_cube(fake)?;
        if !fake.is_solved() {
            return Err(Error::Solve {
                phase: phase.to_string(),
                reason: "sub-puzzle is not solved after its last phase".to_string(),
            });
        }

        let mut replay = cube.clone();
        let mut steps = Vec::with_capacity(fake_steps.len());
        for step in fake_steps {
            match step {
                Step::Move(mv) => {
                    let real = map.rewrite(&mv)?;
                    replay.apply(&real)?;
                    steps.push(Step::Move(real));
                }
                marker @ Step::Marker(_) => steps.push(marker),
            }
        }

        let mut check = fake.clone();
        map.project(&replay, &mut check)?;
        if check != *fake {
            return Err(Error::Solve {
                phase: phase.to_string(),
                reason: "replayed moves do not reproduce the sub-puzzle solution".to_string(),
            });
        }
        cube.set_facelets(replay.facelets())?;
        Ok(steps)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::build_tables;
    use crate::config::SizeConfig;
    use crate::pieces::{corner_state, edge_slots};

    fn config_with_222_tables(dir: &std::path::Path) -> Config {
        build_tables(&catalog::tables_222().unwrap(), dir).unwrap();
        Config {
            tables_dir: dir.to_path_buf(),
            ..Config::default()
        }
    }

    fn scrambled(size: usize, moves: &str) -> Cube {
        let mut cube = catalog::solved(size).unwrap();
        cube.apply_str(moves).unwrap();
        cube
    }

    #[test]
    fn test_outer_layer_maps() {
        let layers = |fake, real| LayerMap::outer(fake, real).unwrap().layers().to_vec();
        assert_eq!(layers(3, 4), vec![0, 1, 3]);
        assert_eq!(layers(3, 5), vec![0, 2, 4]);
        assert_eq!(layers(3, 6), vec![0, 1, 5]);
        assert_eq!(layers(4, 5), vec![0, 1, 3, 4]);
        assert_eq!(layers(2, 4), vec![0, 3]);
        assert!(LayerMap::new(3, 4, vec![0, 3, 1]).is_err(), "layers must increase");
        assert!(LayerMap::outer(5, 4).is_err(), "fake cube larger than real");
    }

    #[test]
    fn test_rewrite_wide_turns() {
        let rewrite = |fake, real, mv: &str| {
            LayerMap::outer(fake, real)
                .unwrap()
                .rewrite(&mv.parse().unwrap())
                .map(|mv| mv.to_string())
        };
        assert_eq!(rewrite(3, 4, "R'").unwrap(), "R'");
        assert_eq!(rewrite(3, 4, "x2").unwrap(), "x2");
        assert_eq!(rewrite(3, 7, "U2").unwrap(), "U2");
        assert_eq!(rewrite(4, 5, "Rw").unwrap(), "Rw");
        assert_eq!(rewrite(4, 5, "3Rw").unwrap(), "4Rw");
        assert_eq!(rewrite(5, 7, "3Fw'").unwrap(), "4Fw'");
        assert_eq!(rewrite(5, 6, "Rw").unwrap(), "Rw");

        assert!(
            matches!(rewrite(3, 4, "Rw"), Err(Error::UnknownMove { .. })),
            "the middle of a fake 3x3x3 has no single layer on a 4x4x4"
        );
        assert!(rewrite(5, 6, "3Rw").is_err());
        assert!(rewrite(3, 4, "3Rw").is_err(), "not a face turn of the fake cube");
    }

    #[test]
    fn test_project_reduced_cube() {
        let map = LayerMap::outer(3, 4).unwrap();
        let mut fake = catalog::solved(3).unwrap();

        // outer turns keep a 4x4x4 reduced
        let real = scrambled(4, "R U F' D2 L B'");
        map.project(&real, &mut fake).unwrap();
        assert_eq!(fake, scrambled(3, "R U F' D2 L B'"));

        let wrong_size = catalog::solved(5).unwrap();
        assert!(map.project(&wrong_size, &mut fake).is_err());
    }

    #[test]
    fn test_sub_puzzle_parity_is_a_solve_error() {
        let mut fake = catalog::solved(3).unwrap();
        let slots = edge_slots(3, 1);
        for i in 0..2 {
            let (a, b) = (slots[0][i], slots[1][i]);
            let (la, lb) = (fake.facelets()[a], fake.facelets()[b]);
            fake.set_label(a, lb);
            fake.set_label(b, la);
        }
        match check_sub_puzzle("reduce-333", &fake) {
            Err(Error::Solve { phase, reason }) => {
                assert_eq!(phase, "reduce-333");
                assert!(reason.contains("parity"), "{reason}");
            }
            other => panic!("expected a solve error, got {other:?}"),
        }
        assert!(check_sub_puzzle("reduce-333", &catalog::solved(3).unwrap()).is_ok());
    }

    #[test]
    fn test_phase_tables() {
        let config = Config::default();
        let names = |size| -> Vec<String> {
            PhaseTable::for_size(size, &config)
                .unwrap()
                .phases()
                .iter()
                .map(|phase| phase.name.clone())
                .collect()
        };
        assert_eq!(names(2), vec!["reorient", "solve-222"]);
        assert_eq!(names(3), vec!["reorient", "g1", "solve-333"]);
        assert_eq!(
            names(4),
            vec![
                "reorient",
                "stage-ud-centres",
                "stage-lr-centres",
                "solve-centres",
                "pair-edges",
                "edge-parity",
                "reduce-333",
            ]
        );
        assert_eq!(names(5), vec!["reorient", "reduce-444-1", "reduce-333"]);
        assert_eq!(names(6), vec!["reorient", "reduce-444-2", "reduce-444-1", "reduce-333"]);
        assert_eq!(PhaseTable::for_size(2, &config).unwrap().descriptors().len(), 2);
        assert_eq!(PhaseTable::for_size(4, &config).unwrap().descriptors().len(), 3);
        assert_eq!(PhaseTable::for_size(7, &config).unwrap().reduced_sizes(), vec![4, 4, 3]);

        let six = PhaseTable::for_size(6, &config).unwrap();
        let layers: Vec<Vec<usize>> = six
            .phases()
            .iter()
            .filter_map(|phase| match &phase.kind {
                PhaseKind::Reduce(map) => Some(map.layers().to_vec()),
                _ => None,
            })
            .collect();
        assert_eq!(layers, vec![vec![0, 2, 3, 5], vec![0, 1, 4, 5], vec![0, 1, 5]]);

        let config = Config {
            sizes: vec![SizeConfig {
                size: 4,
                phases: vec![PhaseConfig::Lookup {
                    name: "edges".to_string(),
                    table: "missing".to_string(),
                }],
            }],
            ..Config::default()
        };
        assert!(matches!(PhaseTable::for_size(4, &config), Err(Error::Config(_))));
    }

    #[test]
    fn test_pairing_phases_need_a_444() {
        let config = Config {
            sizes: vec![SizeConfig {
                size: 5,
                phases: vec![PhaseConfig::PairEdges {
                    name: "pair".to_string(),
                }],
            }],
            ..Config::default()
        };
        assert!(matches!(PhaseTable::for_size(5, &config), Err(Error::Config(_))));
    }

    #[test]
    fn test_configured_even_wings_goal() {
        let config = Config {
            sizes: vec![SizeConfig {
                size: 4,
                phases: vec![PhaseConfig::Search {
                    name: "stage".to_string(),
                    tables: vec![],
                    main_table: None,
                    legal_moves: "Uw R".to_string(),
                    goal: vec![],
                    max_ida_threshold: None,
                    multiplier: None,
                    native: false,
                    even_wings: true,
                }],
            }],
            ..Config::default()
        };
        let phases = PhaseTable::for_size(4, &config).unwrap();
        let PhaseKind::Search(search) = &phases.phases()[0].kind else {
            panic!("expected a search phase");
        };
        assert!(matches!(search.goal, Goal::EvenWings { .. }));
        assert!(search.goal.reached(&catalog::solved(4).unwrap()));
        assert!(!search.goal.reached(&scrambled(4, "Uw")));
    }

    /// The 4x4x4 tables cut off after three moves.
    fn config_with_shallow_444_tables(dir: &std::path::Path) -> Config {
        let tables: Vec<TableDescriptor> = catalog::tables_444()
            .unwrap()
            .into_iter()
            .map(|mut descriptor| {
                descriptor.depth_limit = Some(3);
                descriptor
            })
            .collect();
        build_tables(&tables, dir).unwrap();
        Config {
            tables_dir: dir.to_path_buf(),
            ..Config::default()
        }
    }

    #[test_log::test]
    fn test_wide_turn_scramble_reduces_to_333() {
        let dir = tempfile::tempdir().unwrap();
        let mut solver = Solver::new(4, Arc::new(config_with_shallow_444_tables(dir.path()))).unwrap();
        let table = Arc::clone(solver.table());
        let wings = WingOrbit::new(&table, 1).unwrap();
        let pairer = EdgePairer::new(Arc::clone(&table)).unwrap();

        for scramble in ["Rw U", "Uw' F Rw2"] {
            let mut cube = scrambled(4, scramble);
            let steps = solver.solve_phase("edge-parity", &cube.state_string()).unwrap();
            cube.apply_steps(&steps).unwrap();

            assert!(pairer.centres_solved(cube.facelets()), "{scramble}: centres by {steps:?}");
            assert_eq!(pairer.paired(cube.facelets()), 12, "{scramble}: edges");
            assert_eq!(wings.is_odd(cube.facelets()), Some(false), "{scramble}: wings");

            let mut fake = catalog::solved(3).unwrap();
            LayerMap::outer(3, 4).unwrap().project(&cube, &mut fake).unwrap();
            assert_eq!(check_solvable(&fake), Ok(()), "{scramble}: reduced 3x3x3");
            for name in ["stage-ud-centres", "pair-edges", "edge-parity"] {
                assert!(steps.contains(&Step::marker(name)), "{scramble}: {name} marker");
            }
        }
    }

    #[test_log::test]
    fn test_solve_222() {
        let dir = tempfile::tempdir().unwrap();
        let mut solver = Solver::new(2, Arc::new(config_with_222_tables(dir.path()))).unwrap();

        for scramble in ["R U R' U'", "F2 U' R F R2 U F'", "L D' B2 z y'"] {
            let mut cube = scrambled(2, scramble);
            let solution = solver.solve(&cube.state_string()).unwrap();
            assert!(
                solution.iter().filter_map(Step::as_move).all(|mv| !mv.is_rotation()),
                "rotations are stripped: {solution:?}"
            );
            cube.apply_steps(&solution).unwrap();
            assert!(cube.is_solved(), "{scramble} not solved by {solution:?}");
        }
    }

    #[test_log::test]
    fn test_solve_phase_and_helpers() {
        let dir = tempfile::tempdir().unwrap();
        let mut solver = Solver::new(2, Arc::new(config_with_222_tables(dir.path()))).unwrap();
        let state = scrambled(2, "y R U").state_string();

        let steps = solver.solve_phase("reorient", &state).unwrap();
        assert_eq!(steps.last(), Some(&Step::marker("reorient")));
        assert!(steps.iter().filter_map(Step::as_move).all(Move::is_rotation));
        assert!(solver.solve_phase("missing", &state).is_err());

        let solved = "UUUURRRRFFFFDDDDLLLLBBBB";
        assert!(solver.solved(solved).unwrap());
        let turned = solver.rotate(solved, "R").unwrap();
        assert!(!solver.solved(&turned).unwrap());
        assert_eq!(solver.rotate(&turned, "R'").unwrap(), solved);
    }

    #[test_log::test]
    fn test_retry_with_higher_threshold() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = config_with_222_tables(dir.path());
        config.max_ida_threshold = 1;
        let state = scrambled(2, "R U2 F'").state_string();

        let mut strict = Solver::new(2, Arc::new(config.clone())).unwrap();
        let err = strict.solve(&state).unwrap_err();
        assert!(err.is_no_solution(), "{err}");
        assert!(matches!(err, Error::Phase { ref phase, .. } if phase == "solve-222"));

        config.retry_max_ida_threshold = Some(14);
        let mut relaxed = Solver::new(2, Arc::new(config)).unwrap();
        assert!(relaxed.solve(&state).is_ok());
    }

    #[test_log::test]
    fn test_reduce_corners_through_fake_222() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = config_with_222_tables(dir.path());
        for size in [3, 4] {
            config.sizes.push(SizeConfig {
                size,
                phases: vec![PhaseConfig::Reduce {
                    name: "corners".to_string(),
                    size: 2,
                    layers: None,
                }],
            });
        }
        let config = Arc::new(config);

        for (size, scramble) in [(3, "R U R' U' F2 D"), (4, "R U F' L2 B")] {
            let mut solver = Solver::new(size, Arc::clone(&config)).unwrap();
            let mut cube = scrambled(size, scramble);
            let steps = solver.solve_phase("corners", &cube.state_string()).unwrap();
            cube.apply_steps(&steps).unwrap();

            let (perm, twist) = corner_state(size, cube.facelets()).unwrap();
            assert_eq!(perm, (0..8).collect::<Vec<_>>(), "{size}: corners home");
            assert!(twist.iter().all(|&t| t == 0), "{size}: corners twisted");
            assert_eq!(solver.pool.len(), 1, "one pooled 2x2x2 solver");
        }
    }
}
