//! Delegating threshold passes to an external search binary.
//!
//! The binary gets the state, the legal moves, the threshold range and one
//! `--prune-table-<i>-filename` / `--prune-table-<i>-state` pair per table,
//! and prints every solution it finds as a `SOLUTION: <moves>` line. A
//! candidate only counts if it replays to the goal on our own engine; the
//! shortest one wins.

use std::io::Read;
use std::path::PathBuf;
use std::process::{Command, Stdio};
use std::time::{Duration, Instant};

use itertools::Itertools;
use log::{debug, info, warn};

use crate::cube::Cube;
use crate::error::{Error, Result};
use crate::moves::{parse_moves, Move};
use crate::search::IdaSearch;

const SOLUTION_PREFIX: &str = "SOLUTION:";

const POLL_INTERVAL: Duration = Duration::from_millis(10);

pub struct NativeSolver {
    binary: PathBuf,
    timeout: Duration,
}

impl NativeSolver {
    pub fn new(binary: impl Into<PathBuf>, timeout: Duration) -> Self {
        NativeSolver {
            binary: binary.into(),
            timeout,
        }
    }

    fn arguments(&self, search: &IdaSearch<'_>, cube: &Cube) -> Result<Vec<String>> {
        let start_h = search.heuristic(cube)?;
        let mut args = vec![
            "--kociemba".to_string(),
            cube.state_string(),
            "--legal-moves".to_string(),
            search.legal_moves().iter().join(","),
            "--min-ida-threshold".to_string(),
            start_h.to_string(),
            "--max-ida-threshold".to_string(),
            search.threshold_cap().to_string(),
        ];
        if let Some(multiplier) = search.cost_multiplier() {
            args.push("--multiplier".to_string());
            args.push(multiplier.to_string());
        }
        for (i, table) in search.tables().iter().enumerate() {
            args.push(format!("--prune-table-{i}-filename"));
            args.push(table.path().display().to_string());
            args.push(format!("--prune-table-{i}-state"));
            args.push(table.projection().key(cube.facelets()));
        }
        Ok(args)
    }

    /// Runs the binary and returns the shortest verified solution.
    pub fn solve(&self, search: &IdaSearch<'_>, cube: &Cube) -> Result<Vec<Move>> {
        let no_solution = || Error::NoIdaSolution {
            min_threshold: 0,
            max_threshold: search.threshold_cap(),
        };

        let args = self.arguments(search, cube)?;
        debug!("{} {}", self.binary.display(), args.join(" "));
        let mut child = Command::new(&self.binary)
            .args(&args)
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .spawn()
            .map_err(|e| Error::io(&self.binary, e))?;

        // drain stdout on a thread so a chatty child never blocks on a full pipe
        let mut stdout = child.stdout.take().ok_or_else(no_solution)?;
        let reader = std::thread::spawn(move || {
            let mut output = String::new();
            stdout.read_to_string(&mut output).map(|_| output)
        });

        let started = Instant::now();
        let status = loop {
            match child.try_wait().map_err(|e| Error::io(&self.binary, e))? {
                Some(status) => break status,
                None if started.elapsed() >= self.timeout => {
                    warn!("native search timed out after {:?}", self.timeout);
                    // the child may exit on its own between the poll and the kill
                    let _ = child.kill();
                    let _ = child.wait();
                    return Err(no_solution());
                }
                None => std::thread::sleep(POLL_INTERVAL),
            }
        };

        let output = match reader.join() {
            Ok(Ok(output)) => output,
            Ok(Err(e)) => return Err(Error::io(&self.binary, e)),
            Err(_) => return Err(no_solution()),
        };
        if !status.success() {
            warn!("native search exited with {status}");
            return Err(no_solution());
        }

        let best = output
            .lines()
            .filter_map(|line| line.trim().strip_prefix(SOLUTION_PREFIX))
            .filter_map(|moves| parse_moves(moves).ok())
            .filter(|moves| {
                let mut replay = cube.clone();
                replay.apply_moves(moves).is_ok() && search.goal().reached(&replay)
            })
            .min_by_key(Vec::len)
            .ok_or_else(no_solution)?;
        info!("native search found {} moves", best.len());
        Ok(best)
    }
}
