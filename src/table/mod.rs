//! Pattern databases.
//!
//! A [`LookupTable`] pairs a [`Projection`] with one of two backing stores,
//! chosen per table when it is loaded:
//!
//! - [`BinarySearchTable`]: sorted fixed-width text, searched on disk.
//! - [`PerfectHashTable`]: a flat cost array addressed by an [`Indexer`].
//!
//! A missing entry is not an error: it means the state is further from the
//! goal than the table's `max_depth`. Only a malformed file is
//! [`Error::CorruptTable`].

mod binary_search;
mod perfect_hash;

use std::path::{Path, PathBuf};

use log::debug;
use serde::{Deserialize, Serialize};

pub use binary_search::BinarySearchTable;
pub use perfect_hash::{PerfectHashTable, UNKNOWN};

use crate::error::{Error, Result};
use crate::indexer::Indexer;
use crate::moves::Move;
use crate::projection::Projection;

/// A table hit.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Entry {
    /// Moves from the reduced state to the nearest goal.
    pub distance: u8,
    /// The moves themselves, for tables that store them.
    pub steps: Option<Vec<Move>>,
}

/// Table metadata, kept next to the table file as `<file>.header.toml`.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableHeader {
    pub linecount: u64,
    pub max_depth: u8,
    pub filesize: u64,
}

impl TableHeader {
    pub fn path_for(table: &Path) -> PathBuf {
        let mut name = table.as_os_str().to_owned();
        name.push(".header.toml");
        PathBuf::from(name)
    }

    /// Reads the header if one exists.
    pub fn read(path: &Path) -> Result<Option<Self>> {
        match std::fs::read_to_string(path) {
            Ok(text) => toml::from_str(&text)
                .map(Some)
                .map_err(|e| Error::corrupt(path, e.to_string())),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(Error::io(path, e)),
        }
    }

    pub fn write(&self, path: &Path) -> Result<()> {
        let text = toml::to_string(self).map_err(|e| Error::Config(e.to_string()))?;
        std::fs::write(path, text).map_err(|e| Error::io(path, e))
    }
}

/// How a table is stored on disk.
#[derive(Clone, Debug)]
pub enum TableMode {
    BinarySearch,
    PerfectHash(Indexer),
}

/// Everything needed to build or load one table.
#[derive(Clone, Debug)]
pub struct TableDescriptor {
    pub name: String,
    /// Cube size the projection reads.
    pub size: usize,
    /// File name relative to the tables directory.
    pub filename: String,
    pub projection: Projection,
    pub mode: TableMode,
    /// Moves the table's distances are measured in.
    pub legal_moves: Vec<Move>,
    /// Goal states (U R F D L B strings); empty means the solved cube.
    pub goals: Vec<String>,
    /// Store only costs, not move sequences (binary-search tables).
    pub cost_only: bool,
    /// Stop building at this depth.
    pub depth_limit: Option<u8>,
    /// Declared metadata; each field is checked against the file when set.
    pub linecount: Option<u64>,
    pub max_depth: Option<u8>,
    pub filesize: Option<u64>,
}

impl TableDescriptor {
    pub fn new(
        name: impl Into<String>,
        size: usize,
        filename: impl Into<String>,
        projection: Projection,
        mode: TableMode,
        legal_moves: Vec<Move>,
    ) -> Self {
        TableDescriptor {
            name: name.into(),
            size,
            filename: filename.into(),
            projection,
            mode,
            legal_moves,
            goals: Vec::new(),
            cost_only: false,
            depth_limit: None,
            linecount: None,
            max_depth: None,
            filesize: None,
        }
    }
}

enum Store {
    BinarySearch(BinarySearchTable),
    PerfectHash(PerfectHashTable),
}

/// A loaded, read-only pattern database.
pub struct LookupTable {
    name: String,
    path: PathBuf,
    size: usize,
    projection: Projection,
    legal_moves: Vec<Move>,
    header: TableHeader,
    store: Store,
}

fn check_declared<T: PartialEq + std::fmt::Display>(
    path: &Path,
    what: &str,
    declared: Option<T>,
    actual: T,
) -> Result<()> {
    match declared {
        Some(declared) if declared != actual => Err(Error::corrupt(
            path,
            format!("{what} is {actual}, expected {declared}"),
        )),
        _ => Ok(()),
    }
}

impl LookupTable {
    /// Opens the table file under `dir` and validates it against the
    /// descriptor and the header file.
    pub fn load(descriptor: TableDescriptor, dir: &Path) -> Result<Self> {
        let path = dir.join(&descriptor.filename);
        let header = TableHeader::read(&TableHeader::path_for(&path))?;

        let (store, linecount, filesize, stored_max) = match descriptor.mode {
            TableMode::BinarySearch => {
                let table = BinarySearchTable::open(&path, descriptor.projection.key_width())?;
                let (linecount, filesize) = (table.linecount(), table.filesize());
                (Store::BinarySearch(table), linecount, filesize, None)
            }
            TableMode::PerfectHash(indexer) => {
                let table = PerfectHashTable::open(&path, indexer)?;
                let len = table.len() as u64;
                let max = table.max_cost();
                (Store::PerfectHash(table), len, len, Some(max))
            }
        };

        check_declared(&path, "linecount", descriptor.linecount, linecount)?;
        check_declared(&path, "filesize", descriptor.filesize, filesize)?;
        if let Some(header) = &header {
            check_declared(&path, "linecount", Some(header.linecount), linecount)?;
            check_declared(&path, "filesize", Some(header.filesize), filesize)?;
            check_declared(&path, "max_depth", descriptor.max_depth, header.max_depth)?;
        }

        let max_depth = descriptor
            .max_depth
            .or(header.as_ref().map(|h| h.max_depth))
            .or(stored_max)
            .ok_or_else(|| Error::corrupt(&path, "max_depth is neither declared nor in a header"))?;

        debug!("table {} ready, max depth {max_depth}", descriptor.name);
        Ok(LookupTable {
            name: descriptor.name,
            path,
            size: descriptor.size,
            projection: descriptor.projection,
            legal_moves: descriptor.legal_moves,
            header: TableHeader {
                linecount,
                max_depth,
                filesize,
            },
            store,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn size(&self) -> usize {
        self.size
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn projection(&self) -> &Projection {
        &self.projection
    }

    pub fn legal_moves(&self) -> &[Move] {
        &self.legal_moves
    }

    pub fn header(&self) -> &TableHeader {
        &self.header
    }

    #[inline]
    pub fn max_depth(&self) -> u8 {
        self.header.max_depth
    }

    pub fn is_perfect_hash(&self) -> bool {
        matches!(self.store, Store::PerfectHash(_))
    }

    /// The on-disk key for a reduced state.
    pub fn key(&self, reduced: &[u8]) -> String {
        self.projection.encode(reduced)
    }

    pub fn lookup_reduced(&self, reduced: &[u8]) -> Result<Option<Entry>> {
        match &self.store {
            Store::BinarySearch(table) => table.lookup_one(&self.key(reduced)),
            Store::PerfectHash(table) => Ok(table.lookup_one(reduced).map(|distance| Entry {
                distance,
                steps: None,
            })),
        }
    }

    /// Projects a full state and looks it up.
    pub fn lookup(&self, facelets: &[u8]) -> Result<Option<Entry>> {
        self.lookup_reduced(&self.projection.project(facelets))
    }

    /// Looks up a batch of reduced states; results line up with the input.
    pub fn lookup_many(&self, reduced: &[Vec<u8>]) -> Result<Vec<Option<Entry>>> {
        match &self.store {
            Store::BinarySearch(table) => {
                let keys: Vec<String> = reduced.iter().map(|state| self.key(state)).collect();
                let found = table.lookup_many(&keys)?;
                Ok(keys.iter().map(|key| found.get(key).cloned()).collect())
            }
            Store::PerfectHash(table) => Ok(reduced
                .iter()
                .map(|state| {
                    table.lookup_one(state).map(|distance| Entry {
                        distance,
                        steps: None,
                    })
                })
                .collect()),
        }
    }

    /// Admissible cost for a lookup result: a miss means beyond `max_depth`.
    #[inline]
    pub fn cost(&self, entry: Option<&Entry>) -> u8 {
        entry.map_or(self.max_depth().saturating_add(1), |entry| entry.distance)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::builder::build_table;
    use crate::catalog;
    use crate::cube::{Cube, MoveTable};

    fn scrambles() -> Vec<Cube> {
        let table = MoveTable::new(2).unwrap();
        ["", "R", "R U", "F2 U' R", "R U R' U' F2", "U F R2 F' U2 R'"]
            .into_iter()
            .map(|moves| {
                let mut cube = Cube::solved(Arc::clone(&table));
                cube.apply_str(moves).unwrap();
                cube
            })
            .collect()
    }

    fn orient_table(dir: &Path) -> TableDescriptor {
        let descriptor = catalog::tables_222().unwrap().remove(1);
        build_table(&descriptor, dir).unwrap();
        descriptor
    }

    #[test]
    fn test_binary_search_and_perfect_hash_agree() {
        let dir = tempfile::tempdir().unwrap();
        let hashed = LookupTable::load(orient_table(dir.path()), dir.path()).unwrap();
        let text = catalog::corner_orient_222_text().unwrap();
        build_table(&text, dir.path()).unwrap();
        let text = LookupTable::load(text, dir.path()).unwrap();

        assert!(hashed.is_perfect_hash());
        assert!(!text.is_perfect_hash());
        assert_eq!(hashed.max_depth(), text.max_depth());
        for cube in scrambles() {
            let a = hashed.lookup(cube.facelets()).unwrap().map(|entry| entry.distance);
            let b = text.lookup(cube.facelets()).unwrap().map(|entry| entry.distance);
            assert!(a.is_some(), "every twist is reachable");
            assert_eq!(a, b, "tables disagree on\n{}", cube.format_net());
        }
    }

    #[test]
    fn test_lookup_many_lines_up_with_input() {
        let dir = tempfile::tempdir().unwrap();
        let text = catalog::corner_orient_222_text().unwrap();
        build_table(&text, dir.path()).unwrap();
        let table = LookupTable::load(text, dir.path()).unwrap();

        let cubes = scrambles();
        let mut reduced: Vec<Vec<u8>> = cubes
            .iter()
            .map(|cube| table.projection().project(cube.facelets()))
            .collect();
        // duplicates and a key the table cannot hold
        reduced.push(reduced[1].clone());
        reduced.push(vec![b'1'; reduced[0].len()]);

        let entries = table.lookup_many(&reduced).unwrap();
        assert_eq!(entries.len(), reduced.len());
        assert_eq!(entries[0].as_ref().map(|entry| entry.distance), Some(0));
        assert_eq!(entries[1], entries[cubes.len()], "duplicate keys get the same answer");
        assert_eq!(entries.last(), Some(&None));
        for (cube, entry) in cubes.iter().zip(&entries) {
            assert_eq!(entry, &table.lookup(cube.facelets()).unwrap());
        }
    }

    #[test]
    fn test_miss_costs_one_more_than_max_depth() {
        let dir = tempfile::tempdir().unwrap();
        let mut descriptor = catalog::tables_222().unwrap().remove(1);
        descriptor.depth_limit = Some(1);
        build_table(&descriptor, dir.path()).unwrap();
        let table = LookupTable::load(descriptor, dir.path()).unwrap();

        assert_eq!(table.max_depth(), 1);
        let solved = &scrambles()[0];
        assert_eq!(table.cost(table.lookup(solved.facelets()).unwrap().as_ref()), 0);
        assert_eq!(table.cost(None), 2);
    }

    #[test]
    fn test_load_rejects_mismatched_metadata() {
        let dir = tempfile::tempdir().unwrap();
        let mut descriptor = orient_table(dir.path());
        assert!(LookupTable::load(descriptor.clone(), dir.path()).is_ok());

        descriptor.linecount = Some(728);
        assert!(matches!(
            LookupTable::load(descriptor.clone(), dir.path()),
            Err(Error::CorruptTable { .. })
        ));

        descriptor.linecount = Some(729);
        descriptor.max_depth = Some(99);
        assert!(
            matches!(LookupTable::load(descriptor, dir.path()), Err(Error::CorruptTable { .. })),
            "declared max_depth must match the header"
        );
    }

    #[test]
    fn test_headerless_text_table_needs_declared_depth() {
        let dir = tempfile::tempdir().unwrap();
        let mut descriptor = catalog::corner_orient_222_text().unwrap();
        let header = build_table(&descriptor, dir.path()).unwrap();
        let path = dir.path().join(&descriptor.filename);
        std::fs::remove_file(TableHeader::path_for(&path)).unwrap();

        assert!(matches!(
            LookupTable::load(descriptor.clone(), dir.path()),
            Err(Error::CorruptTable { .. })
        ));
        descriptor.max_depth = Some(header.max_depth);
        let table = LookupTable::load(descriptor, dir.path()).unwrap();
        assert_eq!(table.header(), &header);
    }

    #[test]
    fn test_truncated_perfect_hash_is_corrupt() {
        let dir = tempfile::tempdir().unwrap();
        let descriptor = orient_table(dir.path());
        let path = dir.path().join(&descriptor.filename);
        let bytes = std::fs::read(&path).unwrap();
        std::fs::write(&path, &bytes[..bytes.len() - 1]).unwrap();
        assert!(matches!(
            LookupTable::load(descriptor, dir.path()),
            Err(Error::CorruptTable { .. })
        ));
    }
}
