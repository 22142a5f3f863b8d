//! End-to-end behaviour of the solver on small cubes.

use std::path::Path;
use std::sync::Arc;

use nnn_solver::builder::{build_table, build_tables};
use nnn_solver::catalog::{self, CORNER_ORIENT_222, CORNER_PERM_222};
use nnn_solver::pipeline::LayerMap;
use nnn_solver::search::{Goal, IdaSearch};
use nnn_solver::table::LookupTable;
use nnn_solver::{Config, Cube, Error, Move, MoveTable, Solver, Step};

const SOLVED_222: &str = "UUUURRRRFFFFDDDDLLLLBBBB";

fn config_in(dir: &Path) -> Config {
    Config {
        tables_dir: dir.to_path_buf(),
        ..Config::default()
    }
}

fn solver_222(dir: &Path) -> Solver {
    build_tables(&catalog::tables_222().unwrap(), dir).unwrap();
    Solver::new(2, Arc::new(config_in(dir))).unwrap()
}

/// Facelet permutation of a move sequence, in `new[i] = old[perm[i]]` form.
fn net_permutation(table: &MoveTable, moves: &[Move]) -> Vec<usize> {
    let mut net: Vec<usize> = (0..table.facelet_count()).collect();
    for mv in moves {
        let perm = table.perm(mv).unwrap();
        net = perm.iter().map(|&from| net[from as usize]).collect();
    }
    net
}

#[test_log::test]
fn test_scramble_and_solve_compose_to_identity() {
    let dir = tempfile::tempdir().unwrap();
    let mut solver = solver_222(dir.path());

    let scrambled = solver.rotate(SOLVED_222, "R U R' U'").unwrap();
    let solution = solver.solve(&scrambled).unwrap();

    let mut moves: Vec<Move> = "R U R' U'"
        .split_whitespace()
        .map(|token| token.parse().unwrap())
        .collect();
    moves.extend(solution.iter().filter_map(Step::as_move));
    let net = net_permutation(solver.table(), &moves);
    assert!(
        net.iter().enumerate().all(|(i, &from)| i == from),
        "scramble plus {solution:?} is not the identity"
    );

    let mut cube = solver.parse(&scrambled).unwrap();
    cube.apply_steps(&solution).unwrap();
    assert_eq!(cube.state_string(), SOLVED_222);
}

#[test_log::test]
fn test_solved_state_has_distance_zero() {
    let dir = tempfile::tempdir().unwrap();
    let solver = solver_222(dir.path());
    let solved = solver.parse(SOLVED_222).unwrap();

    for name in [CORNER_PERM_222, CORNER_ORIENT_222] {
        let table = solver.lookup_table(name).unwrap();
        let entry = table.lookup(solved.facelets()).unwrap();
        assert_eq!(entry.map(|entry| entry.distance), Some(0), "{name}");
    }
}

#[test_log::test]
fn test_lookup_many_mixes_hits_and_misses() {
    let dir = tempfile::tempdir().unwrap();
    let solver = solver_222(dir.path());
    let cube = solver.parse(&solver.rotate(SOLVED_222, "R U2 F'").unwrap()).unwrap();

    for name in [CORNER_PERM_222, CORNER_ORIENT_222] {
        let table = solver.lookup_table(name).unwrap();
        let inside = table.projection().project(cube.facelets());
        // no facelet carries a label
        let outside = vec![b'?'; inside.len()];
        let short = inside[..inside.len() - 1].to_vec();

        let entries = table.lookup_many(&[inside, outside, short]).unwrap();
        assert!(entries[0].is_some(), "{name}: a real state is in the table");
        assert_eq!(entries[1], None, "{name}: impossible state");
        assert_eq!(entries[2], None, "{name}: wrong width");
    }
}

#[test_log::test]
fn test_truncated_tables_exhaust_the_threshold() {
    let dir = tempfile::tempdir().unwrap();
    let tables: Vec<LookupTable> = catalog::tables_222()
        .unwrap()
        .into_iter()
        .map(|mut descriptor| {
            descriptor.depth_limit = Some(1);
            build_table(&descriptor, dir.path()).unwrap();
            LookupTable::load(descriptor, dir.path()).unwrap()
        })
        .collect();
    assert!(tables.iter().all(|table| table.max_depth() == 1));

    let mut cube = catalog::solved(2).unwrap();
    cube.apply_str("R U F").unwrap();
    let search = IdaSearch::new(tables.iter().collect(), catalog::moves_222(), Goal::Solved)
        .max_threshold(2);

    match search.solve(&cube) {
        Err(Error::NoIdaSolution {
            min_threshold,
            max_threshold,
        }) => {
            assert_eq!(min_threshold, 2, "a miss costs max_depth + 1");
            assert_eq!(max_threshold, 2);
        }
        other => panic!("expected NoIdaSolution, got {other:?}"),
    }

    // the same tables still guide a search that is allowed to go deep enough
    let moves = search_with_cap(&tables, &cube, 3);
    assert_eq!(moves.len(), 3);
}

fn search_with_cap(tables: &[LookupTable], cube: &Cube, cap: u8) -> Vec<Move> {
    let search = IdaSearch::new(tables.iter().collect(), catalog::moves_222(), Goal::Solved)
        .max_threshold(cap);
    let moves = search.solve(cube).unwrap();
    let mut check = cube.clone();
    check.apply_moves(&moves).unwrap();
    assert!(check.is_solved(), "{moves:?} does not solve the cube");
    moves
}

#[test]
fn test_wide_turn_rewrite_traces_the_same_orbits() {
    let map = LayerMap::outer(4, 5).unwrap();
    let fake = MoveTable::new(4).unwrap();
    let real = MoveTable::new(5).unwrap();

    for name in ["3Rw", "3Rw'", "3Uw2", "Rw", "R'"] {
        let fake_move: Move = name.parse().unwrap();
        let real_move = map.rewrite(&fake_move).unwrap();
        if name.starts_with('3') {
            assert_eq!(real_move.layers(5), 4, "{name} becomes a 4-layer turn");
        }

        let fake_perm = fake.perm(&fake_move).unwrap();
        let real_perm = real.perm(&real_move).unwrap();
        for (i, &from) in fake_perm.iter().enumerate() {
            assert_eq!(
                real_perm[map.real_index(i)] as usize,
                map.real_index(from as usize),
                "{name} -> {real_move}: facelet {i} is traced to a different orbit position"
            );
        }
    }

    // the same holds on a state: project then turn equals turn then project
    let mut real_cube = Cube::solved(Arc::clone(&real));
    real_cube.apply_str("R U' 2Fw D2 3Lw B").unwrap();
    let mut before = Cube::solved(Arc::clone(&fake));
    map.project(&real_cube, &mut before).unwrap();

    let fake_move: Move = "3Rw".parse().unwrap();
    before.apply(&fake_move).unwrap();
    real_cube.apply(&map.rewrite(&fake_move).unwrap()).unwrap();
    let mut after = Cube::solved(fake);
    map.project(&real_cube, &mut after).unwrap();
    assert_eq!(before, after);
}

#[test_log::test]
fn test_binary_search_matches_perfect_hash() {
    let dir = tempfile::tempdir().unwrap();
    let hashed = catalog::tables_222().unwrap().remove(1);
    let text = catalog::corner_orient_222_text().unwrap();
    build_tables(&[hashed.clone(), text.clone()], dir.path()).unwrap();
    let hashed = LookupTable::load(hashed, dir.path()).unwrap();
    let text = LookupTable::load(text, dir.path()).unwrap();

    let table = MoveTable::new(2).unwrap();
    let mut cube = Cube::solved(table);
    for mv in "R U F' R2 U' F U2 R' F2".split_whitespace() {
        cube.apply_str(mv).unwrap();
        let reduced = vec![hashed.projection().project(cube.facelets())];
        let a = hashed.lookup_many(&reduced).unwrap();
        let b = text.lookup_many(&reduced).unwrap();
        assert_eq!(
            a[0].as_ref().map(|entry| entry.distance),
            b[0].as_ref().map(|entry| entry.distance),
            "after {mv}"
        );
    }
}

/// Builds the 3x3x3 and 4x4x4 tables and solves `scramble` on a `size` cube.
fn solve_scramble(dir: &Path, size: usize, scramble: &str) -> Vec<Step> {
    let config = Arc::new(config_in(dir));
    let mut solver = Solver::new(size, config).unwrap();
    let mut cube = catalog::solved(size).unwrap();
    cube.apply_str(scramble).unwrap();
    let solution = solver.solve(&cube.state_string()).unwrap();
    cube.apply_steps(&solution).unwrap();
    assert!(cube.is_solved(), "{size}: {scramble} not solved by {solution:?}");
    solution
}

fn build_333_and_444(dir: &Path) {
    let mut tables = catalog::tables_333().unwrap();
    tables.extend(catalog::tables_444().unwrap());
    build_tables(&tables, dir).unwrap();
}

#[test_log::test]
#[ignore = "builds the 3x3x3 and 4x4x4 tables"]
fn test_solve_333_444_and_555() {
    let dir = tempfile::tempdir().unwrap();
    build_333_and_444(dir.path());

    solve_scramble(dir.path(), 3, "R U2 F' L D B2 R' U F2 D'");
    // whole-cube rotations in the scramble are not parity
    solve_scramble(dir.path(), 3, "y R U");
    solve_scramble(dir.path(), 4, "x R U");

    // outer turns only: the 4x4x4 is already reduced
    solve_scramble(dir.path(), 4, "R U F' D2 L' B");
    let solution = solve_scramble(dir.path(), 4, "Rw U2 Fw' R Dw B' Lw2 U Bw");
    assert!(
        solution.contains(&Step::marker("pair-edges")),
        "the 4x4x4 runs its own phases"
    );

    // the 5x5x5 reduces its corner centres and wings through a 4x4x4
    let solution = solve_scramble(dir.path(), 5, "R U F' D2 L' B");
    assert!(solution.contains(&Step::marker("reduce-444-1")));
}
