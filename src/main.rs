//! N×N×N Cube Solver
//!
//! Command-line front end: solves, turns and prints cube states given as
//! U R F D L B facelet strings, and builds the lookup tables the solver needs.

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use log::{error, info};
use rustc_hash::FxHashSet;

use nnn_solver::builder::build_tables;
use nnn_solver::moves::format_moves;
use nnn_solver::pipeline::PhaseTable;
use nnn_solver::{Config, Cube, Error, Move, MoveTable, Result, Solver, Step};

/// Solves N×N×N cubes with reduction and IDA* over pattern databases.
#[derive(Parser)]
#[command(name = "nnn-solver")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// TOML configuration file.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Directory holding the lookup tables (overrides the config file).
    #[arg(long, global = true)]
    tables_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Print a solution for a state.
    Solve { state: String },
    /// Apply moves to a state and print the result.
    Rotate { state: String, moves: String },
    /// Print a state as an unfolded net.
    Print { state: String },
    /// Build every table a cube size needs.
    Build {
        #[arg(long)]
        size: usize,
    },
}

fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let cli = Cli::parse();

    let result = load_config(&cli).and_then(|config| match &cli.command {
        Command::Solve { state } => run_solve(config, state),
        Command::Rotate { state, moves } => run_rotate(&config, state, moves),
        Command::Print { state } => run_print(&config, state),
        Command::Build { size } => run_build(&config, *size),
    });

    match result {
        Ok(output) => {
            println!("{output}");
            ExitCode::SUCCESS
        }
        Err(e) => {
            if let Some(path) = e.phase_path() {
                error!("failed in {path}");
            }
            eprintln!("error: {e}");
            ExitCode::FAILURE
        }
    }
}

fn load_config(cli: &Cli) -> Result<Config> {
    let mut config = match &cli.config {
        Some(path) => Config::load(path)?,
        None => Config::default(),
    };
    if let Some(dir) = &cli.tables_dir {
        config.tables_dir = dir.clone();
    }
    Ok(config)
}

/// Cube size implied by the number of facelets in `state`.
fn size_of(state: &str) -> Result<usize> {
    let facelets = state.chars().filter(|c| !c.is_whitespace()).count();
    let per_face = facelets / 6;
    (1..=per_face)
        .find(|size| size * size == per_face && 6 * per_face == facelets)
        .ok_or_else(|| Error::InvalidState(format!("{facelets} facelets is not a cube")))
}

fn parse(config: &Config, state: &str) -> Result<Cube> {
    let table = MoveTable::new(size_of(state)?)?;
    Cube::from_state_with_colors(table, state, config.color_map())
}

fn run_solve(config: Config, state: &str) -> Result<String> {
    let mut solver = Solver::new(size_of(state)?, Arc::new(config))?;
    let steps = solver.solve(state)?;
    let moves: Vec<Move> = steps.iter().filter_map(Step::as_move).copied().collect();
    Ok(format_moves(&moves))
}

fn run_rotate(config: &Config, state: &str, moves: &str) -> Result<String> {
    let mut cube = parse(config, state)?;
    cube.apply_str(moves)?;
    Ok(cube.state_string())
}

fn run_print(config: &Config, state: &str) -> Result<String> {
    Ok(parse(config, state)?.format_net())
}

/// Builds the tables for `size` and for every size it reduces to.
fn run_build(config: &Config, size: usize) -> Result<String> {
    let mut pending = vec![size];
    let mut seen_sizes = FxHashSet::default();
    let mut seen_tables = FxHashSet::default();
    let mut descriptors = Vec::new();
    while let Some(size) = pending.pop() {
        if !seen_sizes.insert(size) {
            continue;
        }
        let phases = PhaseTable::for_size(size, config)?;
        pending.extend(phases.reduced_sizes());
        descriptors.extend(
            phases
                .descriptors()
                .iter()
                .filter(|descriptor| seen_tables.insert(descriptor.name.clone()))
                .cloned(),
        );
    }

    info!("building {} tables in {}", descriptors.len(), config.tables_dir.display());
    let headers = build_tables(&descriptors, &config.tables_dir)?;
    let lines: Vec<String> = descriptors
        .iter()
        .zip(&headers)
        .map(|(descriptor, header)| {
            format!(
                "{}: {} entries, max depth {}",
                descriptor.filename, header.linecount, header.max_depth
            )
        })
        .collect();
    Ok(lines.join("\n"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_size_of_state() {
        assert_eq!(size_of(&"U".repeat(24)).unwrap(), 2);
        assert_eq!(size_of(&"U".repeat(54)).unwrap(), 3);
        assert_eq!(size_of(&"U".repeat(150)).unwrap(), 5);
        assert!(size_of(&"U".repeat(25)).is_err(), "25 facelets is not a cube");
        assert!(size_of("").is_err());
    }

    #[test]
    fn test_print_snapshot() {
        let config = Config::default();
        let state = run_rotate(&config, "UUUURRRRFFFFDDDDLLLLBBBB", "R").unwrap();
        insta::assert_snapshot!(run_print(&config, &state).unwrap(), @r"
           UF
           UF
        LL FD RR UB
        LL FD RR UB
           DB
           DB
        ");
    }

    #[test]
    fn test_rotate_roundtrip() {
        let config = Config::default();
        let solved = "UUUUUUUUURRRRRRRRRFFFFFFFFFDDDDDDDDDLLLLLLLLLBBBBBBBBB";
        let turned = run_rotate(&config, solved, "R U R' U'").unwrap();
        assert_ne!(turned, solved);
        assert_eq!(run_rotate(&config, &turned, "U R U' R'").unwrap(), solved);
    }

    #[test_log::test]
    fn test_build_then_solve_222() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config {
            tables_dir: dir.path().to_path_buf(),
            ..Config::default()
        };
        let report = run_build(&config, 2).unwrap();
        assert_eq!(report.lines().count(), 2, "two 2x2x2 tables: {report}");

        let state = run_rotate(&config, "UUUURRRRFFFFDDDDLLLLBBBB", "R U R' U'").unwrap();
        let solution = run_solve(config.clone(), &state).unwrap();
        let solved = run_rotate(&config, &state, &solution).unwrap();
        assert!(
            parse(&config, &solved).unwrap().is_solved(),
            "{solution} leaves {solved}"
        );
    }
}
