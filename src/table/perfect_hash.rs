//! Flat cost arrays addressed by a state index.
//!
//! The file holds one ASCII character per index: a hex digit `0`..`f` for a
//! known cost, or `.` for an index the table does not cover. The whole file
//! is read once at load time and shared read-only afterwards.

use std::path::{Path, PathBuf};

use log::debug;

use crate::error::{Error, Result};
use crate::indexer::Indexer;

/// Byte written for indices without a known cost.
pub const UNKNOWN: u8 = b'.';

const NO_COST: u8 = u8::MAX;

pub struct PerfectHashTable {
    path: PathBuf,
    costs: Vec<u8>,
    indexer: Indexer,
}

impl PerfectHashTable {
    /// Loads the array and verifies it covers exactly the indexer's domain.
    pub fn open(path: &Path, indexer: Indexer) -> Result<Self> {
        let raw = std::fs::read(path).map_err(|e| Error::io(path, e))?;
        let expected = indexer.domain_size();
        if raw.len() as u64 != expected {
            return Err(Error::corrupt(
                path,
                format!("{} entries on disk, the indexer declares {expected}", raw.len()),
            ));
        }

        let costs = raw
            .iter()
            .enumerate()
            .map(|(index, &byte)| match byte {
                UNKNOWN => Ok(NO_COST),
                _ => char::from(byte)
                    .to_digit(16)
                    .map(|cost| cost as u8)
                    .ok_or_else(|| Error::corrupt(path, format!("bad cost byte at index {index}"))),
            })
            .collect::<Result<Vec<u8>>>()?;

        debug!("loaded {} ({expected} entries)", path.display());
        Ok(PerfectHashTable {
            path: path.to_path_buf(),
            costs,
            indexer,
        })
    }

    #[inline]
    pub fn indexer(&self) -> &Indexer {
        &self.indexer
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.costs.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.costs.is_empty()
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Cost stored at `index`, if known.
    #[inline]
    pub fn cost_at(&self, index: u64) -> Option<u8> {
        self.costs
            .get(index as usize)
            .copied()
            .filter(|&cost| cost != NO_COST)
    }

    /// Cost of a reduced state; `None` outside the indexer's domain.
    #[inline]
    pub fn lookup_one(&self, reduced: &[u8]) -> Option<u8> {
        self.cost_at(self.indexer.rank(reduced)?)
    }

    /// The largest known cost.
    pub fn max_cost(&self) -> u8 {
        self.costs
            .iter()
            .copied()
            .filter(|&cost| cost != NO_COST)
            .max()
            .unwrap_or(0)
    }
}
