//! Offline table construction.
//!
//! Tables are built by breadth-first search outward from the goal states.
//! The search runs on full cubes but deduplicates on the projected key, so
//! the projection must be an abstraction: the key of a moved cube may only
//! depend on the key before the move. One representative cube is kept per
//! key.
//!
//! Output formats:
//! - binary search: `key:steps` lines (or `key:cost` when cost-only), sorted
//!   by key and padded with spaces to a common width.
//! - perfect hash: one hex cost character per index, `.` where unknown.
//!
//! Both get a `<file>.header.toml` with the line count, depth and size.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;
use std::sync::Arc;

use log::{debug, info};
use rustc_hash::FxHashMap;

use crate::cube::{Cube, MoveTable};
use crate::error::{Error, Result};
use crate::moves::{format_moves, inverse, Move};
use crate::table::{TableDescriptor, TableHeader, TableMode, UNKNOWN};

/// Distance and solving moves of one reduced state.
struct Record {
    depth: u8,
    /// Moves from the goal to the representative, in order.
    path: Vec<Move>,
}

/// Breadth-first search from the descriptor's goals.
///
/// Returns every reached reduced state with its record.
fn explore(descriptor: &TableDescriptor) -> Result<FxHashMap<Vec<u8>, Record>> {
    let table = MoveTable::new(descriptor.size)?;
    for mv in &descriptor.legal_moves {
        table.perm(mv)?;
    }

    let goals = if descriptor.goals.is_empty() {
        vec![Cube::solved(Arc::clone(&table))]
    } else {
        descriptor
            .goals
            .iter()
            .map(|goal| Cube::from_state(Arc::clone(&table), goal))
            .collect::<Result<_>>()?
    };

    // perfect-hash and cost-only tables never write the moves out
    let keep_paths = matches!(descriptor.mode, TableMode::BinarySearch) && !descriptor.cost_only;
    let projection = &descriptor.projection;
    let mut records: FxHashMap<Vec<u8>, Record> = FxHashMap::default();
    let mut frontier: Vec<(Cube, Vec<Move>)> = Vec::new();
    for goal in goals {
        let reduced = projection.project(goal.facelets());
        if !records.contains_key(&reduced) {
            records.insert(
                reduced,
                Record {
                    depth: 0,
                    path: Vec::new(),
                },
            );
            frontier.push((goal, Vec::new()));
        }
    }

    let mut depth = 0u8;
    let mut reduced = Vec::with_capacity(projection.width());
    while !frontier.is_empty() && descriptor.depth_limit.map_or(true, |limit| depth < limit) {
        depth += 1;
        let mut next = Vec::new();
        for (cube, path) in &frontier {
            for mv in &descriptor.legal_moves {
                let mut child = cube.clone();
                child.apply(mv)?;
                projection.project_into(child.facelets(), &mut reduced);
                if records.contains_key(&reduced) {
                    continue;
                }
                let mut child_path = Vec::new();
                if keep_paths {
                    child_path.reserve(path.len() + 1);
                    child_path.extend_from_slice(path);
                    child_path.push(*mv);
                }
                records.insert(
                    reduced.clone(),
                    Record {
                        depth,
                        path: child_path.clone(),
                    },
                );
                next.push((child, child_path));
            }
        }
        debug!("{}: depth {depth} adds {} states", descriptor.name, next.len());
        frontier = next;
    }
    Ok(records)
}

/// Reduced states the descriptor's search reaches, in no particular order.
pub fn reachable_states(descriptor: &TableDescriptor) -> Result<Vec<Vec<u8>>> {
    Ok(explore(descriptor)?.into_keys().collect())
}

/// Builds the table a descriptor names and writes it under `dir`.
pub fn build_table(descriptor: &TableDescriptor, dir: &Path) -> Result<TableHeader> {
    let records = explore(descriptor)?;
    let max_depth = records.values().map(|record| record.depth).max().unwrap_or(0);
    let path = dir.join(&descriptor.filename);

    let header = match &descriptor.mode {
        TableMode::BinarySearch => write_sorted(descriptor, &records, &path, max_depth)?,
        TableMode::PerfectHash(indexer) => {
            if max_depth > 15 {
                return Err(Error::Config(format!(
                    "{}: depth {max_depth} does not fit a hex cost",
                    descriptor.name
                )));
            }
            let mut costs = vec![UNKNOWN; indexer.domain_size() as usize];
            for (reduced, record) in &records {
                let index = indexer.rank(reduced).ok_or_else(|| {
                    Error::Config(format!(
                        "{}: reached state {:?} is outside the indexer domain",
                        descriptor.name,
                        String::from_utf8_lossy(reduced)
                    ))
                })?;
                let slot = &mut costs[index as usize];
                let digit = b"0123456789abcdef"[record.depth as usize];
                // symmetric indexers fold several states onto one slot
                if *slot == UNKNOWN || *slot > digit {
                    *slot = digit;
                }
            }
            std::fs::write(&path, &costs).map_err(|e| Error::io(&path, e))?;
            TableHeader {
                linecount: costs.len() as u64,
                max_depth,
                filesize: costs.len() as u64,
            }
        }
    };

    header.write(&TableHeader::path_for(&path))?;
    info!(
        "built {} ({} entries, max depth {max_depth}) at {}",
        descriptor.name,
        records.len(),
        path.display()
    );
    Ok(header)
}

/// Builds every table in `descriptors` under `dir`.
pub fn build_tables(descriptors: &[TableDescriptor], dir: &Path) -> Result<Vec<TableHeader>> {
    std::fs::create_dir_all(dir).map_err(|e| Error::io(dir, e))?;
    descriptors
        .iter()
        .map(|descriptor| build_table(descriptor, dir))
        .collect()
}

fn write_sorted(
    descriptor: &TableDescriptor,
    records: &FxHashMap<Vec<u8>, Record>,
    path: &Path,
    max_depth: u8,
) -> Result<TableHeader> {
    let projection = &descriptor.projection;
    let mut lines: Vec<(String, String)> = records
        .iter()
        .map(|(reduced, record)| {
            let value = if descriptor.cost_only {
                record.depth.to_string()
            } else {
                format_moves(&inverse(&record.path))
            };
            (projection.encode(reduced), value)
        })
        .collect();
    lines.sort_unstable();

    let width = lines
        .iter()
        .map(|(key, value)| key.len() + 1 + value.len())
        .max()
        .unwrap_or(0);

    let file = File::create(path).map_err(|e| Error::io(path, e))?;
    let mut out = BufWriter::new(file);
    for (key, value) in &lines {
        let line = format!("{key}:{value}");
        writeln!(out, "{line:<width$}").map_err(|e| Error::io(path, e))?;
    }
    out.flush().map_err(|e| Error::io(path, e))?;

    let linecount = lines.len() as u64;
    Ok(TableHeader {
        linecount,
        max_depth,
        filesize: linecount * (width as u64 + 1),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::indexer::Indexer;
    use crate::projection::{LabelRule, Projection};
    use crate::table::LookupTable;
    use crate::moves::parse_moves;

    /// U-layer corner stickers of a 2x2x2 under U turns only: four states.
    fn u_layer_table(mode: TableMode) -> TableDescriptor {
        let projection = Projection::builder()
            .part((0..24).collect(), LabelRule::Keep)
            .build()
            .unwrap();
        TableDescriptor::new(
            "u-layer",
            2,
            "u-layer.txt",
            projection,
            mode,
            parse_moves("U U' U2").unwrap(),
        )
    }

    #[test]
    fn test_sorted_table_layout() {
        let dir = tempfile::tempdir().unwrap();
        let header = build_table(&u_layer_table(TableMode::BinarySearch), dir.path()).unwrap();
        assert_eq!(header.linecount, 4);
        assert_eq!(header.max_depth, 1);

        let text = std::fs::read_to_string(dir.path().join("u-layer.txt")).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 4);
        assert!(lines.windows(2).all(|w| w[0] < w[1]), "lines must be sorted");
        let width = lines[0].len();
        assert!(lines.iter().all(|line| line.len() == width), "lines must be padded");
        assert_eq!(header.filesize, text.len() as u64);

        let written = TableHeader::read(&TableHeader::path_for(&dir.path().join("u-layer.txt")))
            .unwrap()
            .unwrap();
        assert_eq!(written, header);
    }

    #[test]
    fn test_steps_solve_their_state() {
        let dir = tempfile::tempdir().unwrap();
        let descriptor = u_layer_table(TableMode::BinarySearch);
        build_table(&descriptor, dir.path()).unwrap();
        let table = LookupTable::load(descriptor, dir.path()).unwrap();

        let mut cube = Cube::solved(MoveTable::new(2).unwrap());
        cube.apply_str("U'").unwrap();
        let entry = table.lookup(cube.facelets()).unwrap().unwrap();
        assert_eq!(entry.distance, 1);
        cube.apply_moves(entry.steps.as_deref().unwrap()).unwrap();
        assert!(cube.is_solved(), "stored steps must solve the state");
    }

    #[test]
    fn test_perfect_hash_marks_unreached_indices() {
        let dir = tempfile::tempdir().unwrap();
        // one U/D-sticker bit per U and D facelet, ranked as 8 bits
        let projection = Projection::builder()
            .part((0..24).collect(), LabelRule::Binary(vec!['U']))
            .build()
            .unwrap();
        let descriptor = TableDescriptor::new(
            "u-stickers",
            2,
            "u-stickers.hash",
            projection,
            TableMode::PerfectHash(Indexer::Combination { width: 24, chosen: 4 }),
            parse_moves("R R' R2").unwrap(),
        );
        let header = build_table(&descriptor, dir.path()).unwrap();
        assert_eq!(header.linecount, 10626);

        let raw = std::fs::read(dir.path().join("u-stickers.hash")).unwrap();
        let known = raw.iter().filter(|&&b| b != UNKNOWN).count();
        assert_eq!(known, 4, "R turns reach four placements of the U stickers");
    }

    #[test]
    fn test_depth_limit_truncates() {
        let dir = tempfile::tempdir().unwrap();
        let mut descriptor = u_layer_table(TableMode::BinarySearch);
        descriptor.legal_moves = parse_moves("U U' U2 R R' R2").unwrap();
        descriptor.depth_limit = Some(1);
        let header = build_table(&descriptor, dir.path()).unwrap();
        assert_eq!(header.max_depth, 1);
        assert_eq!(header.linecount, 7, "solved plus six single turns");
    }
}
