//! Dense ranking of reduced states.
//!
//! A perfect-hash table is a flat array addressed by [`Indexer::rank`], so
//! every indexer must be a bijection between its domain and
//! `0..domain_size()`. Reduced states that are not in the domain rank to
//! `None`, which callers treat like a missing table entry.

use std::ops::Range;

use serde::Deserialize;

use crate::builder::reachable_states;
use crate::cube::MoveTable;
use crate::error::{Error, Result};
use crate::projection::SymmetryFold;
use crate::table::{TableDescriptor, TableMode};

/// Binomial coefficient, 0 when `k > n`.
pub fn choose(n: u64, k: u64) -> u64 {
    if k > n {
        return 0;
    }
    let k = k.min(n - k);
    (0..k).fold(1u64, |acc, i| acc * (n - i) / (i + 1))
}

fn factorial(n: u64) -> u64 {
    (1..=n).product()
}

/// A character that marks a filled position in a combination state.
#[inline]
fn is_filled(c: u8) -> bool {
    !matches!(c, b'0' | b'x' | b'-' | b'.')
}

#[derive(Clone, Debug)]
pub enum Indexer {
    /// The reduced state read as a base-k numeral over `alphabet`, first
    /// character most significant.
    BitPack { alphabet: Vec<u8>, width: usize },
    /// Which `chosen` of `width` positions are filled, ranked with the
    /// combinatorial number system.
    Combination { width: usize, chosen: usize },
    /// One orientation digit per piece: the position of the marked facelet
    /// within the piece. The last piece's digit follows from the others.
    Orientation {
        pieces: Vec<Vec<usize>>,
        markers: Vec<u8>,
        modulus: u64,
    },
    /// Lehmer code of which piece sits in which slot. Pieces are known by
    /// their sorted label sets.
    Permutation {
        pieces: Vec<Vec<usize>>,
        identities: Vec<Vec<u8>>,
    },
    /// Mixed-radix product of indexers over consecutive slices of the
    /// reduced state; the first part is most significant.
    Product(Vec<(Range<usize>, Indexer)>),
    /// Rank among the sorted canonical forms of a symmetry-folded domain.
    Symmetric {
        fold: SymmetryFold,
        keys: Vec<Vec<u8>>,
    },
}

impl Indexer {
    /// Folds every state of `domain` and ranks the distinct canonical forms.
    pub fn symmetric(fold: SymmetryFold, domain: impl IntoIterator<Item = Vec<u8>>) -> Self {
        let mut keys: Vec<Vec<u8>> = domain.into_iter().map(|s| fold.canonical(&s)).collect();
        keys.sort_unstable();
        keys.dedup();
        Indexer::Symmetric { fold, keys }
    }

    /// A product over consecutive slices starting at offset 0.
    pub fn product(parts: Vec<(usize, Indexer)>) -> Self {
        let mut start = 0;
        let parts = parts
            .into_iter()
            .map(|(width, indexer)| {
                let range = start..start + width;
                start += width;
                (range, indexer)
            })
            .collect();
        Indexer::Product(parts)
    }

    /// Number of distinct indices.
    pub fn domain_size(&self) -> u64 {
        match self {
            Indexer::BitPack { alphabet, width } => (alphabet.len() as u64).pow(*width as u32),
            Indexer::Combination { width, chosen } => choose(*width as u64, *chosen as u64),
            Indexer::Orientation {
                pieces, modulus, ..
            } => modulus.pow(pieces.len().saturating_sub(1) as u32),
            Indexer::Permutation { pieces, .. } => factorial(pieces.len() as u64),
            Indexer::Product(parts) => parts.iter().map(|(_, p)| p.domain_size()).product(),
            Indexer::Symmetric { keys, .. } => keys.len() as u64,
        }
    }

    /// Dense index of `reduced`, or `None` outside the domain.
    pub fn rank(&self, reduced: &[u8]) -> Option<u64> {
        match self {
            Indexer::BitPack { alphabet, width } => {
                if reduced.len() != *width {
                    return None;
                }
                let base = alphabet.len() as u64;
                reduced.iter().try_fold(0u64, |acc, c| {
                    let digit = alphabet.iter().position(|a| a == c)? as u64;
                    Some(acc * base + digit)
                })
            }
            Indexer::Combination { width, chosen } => {
                if reduced.len() != *width {
                    return None;
                }
                let filled: Vec<u64> = (0..reduced.len())
                    .rev()
                    .filter(|&i| is_filled(reduced[i]))
                    .map(|i| i as u64)
                    .collect();
                if filled.len() != *chosen {
                    return None;
                }
                let mut k = filled.len() as u64;
                Some(filled.iter().fold(0u64, |total, &position| {
                    let term = choose(position, k);
                    k -= 1;
                    total + term
                }))
            }
            Indexer::Orientation {
                pieces,
                markers,
                modulus,
            } => {
                if reduced.len() != facelet_count(pieces) {
                    return None;
                }
                let mut total = 0u64;
                let mut sum = 0u64;
                for (i, piece) in pieces.iter().enumerate() {
                    let digit = piece
                        .iter()
                        .position(|&offset| reduced.get(offset).is_some_and(|c| markers.contains(c)))?
                        as u64;
                    sum += digit;
                    if i + 1 < pieces.len() {
                        total = total * modulus + digit;
                    }
                }
                (sum % modulus == 0).then_some(total)
            }
            Indexer::Permutation { pieces, identities } => {
                if reduced.len() != facelet_count(pieces) {
                    return None;
                }
                let ids = piece_ids(pieces, identities, reduced)?;
                let n = ids.len();
                let mut seen = vec![false; n];
                let mut total = 0u64;
                for (i, &id) in ids.iter().enumerate() {
                    if id >= n || std::mem::replace(&mut seen[id], true) {
                        return None;
                    }
                    let smaller_later = ids[i + 1..].iter().filter(|&&later| later < id).count();
                    total += smaller_later as u64 * factorial((n - 1 - i) as u64);
                }
                Some(total)
            }
            Indexer::Product(parts) => parts.iter().try_fold(0u64, |acc, (range, part)| {
                let slice = reduced.get(range.clone())?;
                Some(acc * part.domain_size() + part.rank(slice)?)
            }),
            Indexer::Symmetric { fold, keys } => {
                let canonical = fold.canonical(reduced);
                keys.binary_search(&canonical).ok().map(|i| i as u64)
            }
        }
    }

    /// The reduced state an index stands for, in canonical form.
    pub fn unrank(&self, index: u64) -> Option<Vec<u8>> {
        if index >= self.domain_size() {
            return None;
        }
        match self {
            Indexer::BitPack { alphabet, width } => {
                let base = alphabet.len() as u64;
                let mut out = vec![0u8; *width];
                let mut rest = index;
                for slot in out.iter_mut().rev() {
                    *slot = alphabet[(rest % base) as usize];
                    rest /= base;
                }
                Some(out)
            }
            Indexer::Combination { width, chosen } => {
                let mut out = vec![b'0'; *width];
                let mut rest = index;
                let mut k = *chosen as u64;
                for position in (0..*width as u64).rev() {
                    if k == 0 {
                        break;
                    }
                    let c = choose(position, k);
                    if c <= rest {
                        rest -= c;
                        k -= 1;
                        out[position as usize] = b'1';
                    }
                }
                Some(out)
            }
            Indexer::Orientation {
                pieces,
                markers,
                modulus,
            } => {
                let width = pieces.iter().flatten().max().map_or(0, |m| m + 1);
                let mut out = vec![b'0'; width];
                let mut digits = vec![0u64; pieces.len()];
                let mut rest = index;
                for digit in digits.iter_mut().take(pieces.len().saturating_sub(1)).rev() {
                    *digit = rest % modulus;
                    rest /= modulus;
                }
                let sum: u64 = digits.iter().sum();
                if let Some(last) = digits.last_mut() {
                    *last = (modulus - sum % modulus) % modulus;
                }
                let marker = *markers.first()?;
                for (piece, &digit) in pieces.iter().zip(&digits) {
                    out[*piece.get(digit as usize)?] = marker;
                }
                Some(out)
            }
            Indexer::Permutation { pieces, identities } => {
                let n = pieces.len();
                let mut remaining: Vec<usize> = (0..n).collect();
                let mut rest = index;
                let width = pieces.iter().flatten().max().map_or(0, |m| m + 1);
                let mut out = vec![b'x'; width];
                for (i, piece) in pieces.iter().enumerate() {
                    let weight = factorial((n - 1 - i) as u64);
                    let id = remaining.remove((rest / weight) as usize);
                    rest %= weight;
                    for (&offset, &label) in piece.iter().zip(&identities[id]) {
                        out[offset] = label;
                    }
                }
                Some(out)
            }
            Indexer::Product(parts) => {
                let mut out = Vec::new();
                let mut rest = index;
                let mut pieces = Vec::with_capacity(parts.len());
                for (_, part) in parts.iter().rev() {
                    let size = part.domain_size();
                    pieces.push(part.unrank(rest % size)?);
                    rest /= size;
                }
                for piece in pieces.into_iter().rev() {
                    out.extend(piece);
                }
                Some(out)
            }
            Indexer::Symmetric { keys, .. } => keys.get(index as usize).cloned(),
        }
    }

    /// The representative [`Indexer::unrank`] returns for `reduced`.
    pub fn canonical(&self, reduced: &[u8]) -> Vec<u8> {
        match self {
            Indexer::BitPack { .. } => reduced.to_vec(),
            Indexer::Combination { .. } => reduced
                .iter()
                .map(|&c| if is_filled(c) { b'1' } else { b'0' })
                .collect(),
            Indexer::Orientation { pieces, markers, .. } => {
                let mut out = reduced.to_vec();
                let marker = markers.first().copied().unwrap_or(b'1');
                for &offset in pieces.iter().flatten() {
                    if let Some(slot) = out.get_mut(offset) {
                        *slot = if markers.contains(slot) { marker } else { b'0' };
                    }
                }
                out
            }
            Indexer::Permutation { pieces, identities } => {
                let mut out = reduced.to_vec();
                if let Some(ids) = piece_ids(pieces, identities, reduced) {
                    for (piece, id) in pieces.iter().zip(ids) {
                        for (&offset, &label) in piece.iter().zip(&identities[id]) {
                            out[offset] = label;
                        }
                    }
                }
                out
            }
            Indexer::Product(parts) => parts
                .iter()
                .flat_map(|(range, part)| part.canonical(reduced.get(range.clone()).unwrap_or(&[])))
                .collect(),
            Indexer::Symmetric { fold, .. } => fold.canonical(reduced),
        }
    }

    /// Checks that ranking every index's state gives the index back.
    ///
    /// Enumerates the whole domain, so only call this for small tables.
    pub fn verify_exhaustive(&self) -> Result<()> {
        for index in 0..self.domain_size() {
            let state = self
                .unrank(index)
                .ok_or_else(|| Error::Config(format!("index {index} does not unrank")))?;
            if self.rank(&state) != Some(index) {
                return Err(Error::Config(format!(
                    "index {index} unranks to {:?} which ranks elsewhere",
                    String::from_utf8_lossy(&state)
                )));
            }
        }
        Ok(())
    }
}

fn facelet_count(pieces: &[Vec<usize>]) -> usize {
    pieces.iter().map(Vec::len).sum()
}

fn piece_ids(pieces: &[Vec<usize>], identities: &[Vec<u8>], reduced: &[u8]) -> Option<Vec<usize>> {
    pieces
        .iter()
        .map(|piece| {
            let mut labels: Vec<u8> = piece
                .iter()
                .map(|&offset| reduced.get(offset).copied())
                .collect::<Option<_>>()?;
            labels.sort_unstable();
            identities.iter().position(|identity| *identity == labels)
        })
        .collect()
}

/// An indexer as written in configuration, completed from the table it
/// indexes.
#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum IndexerSpec {
    BitPack { alphabet: String },
    Combination { chosen: usize },
    /// Every state within `depth` moves of the table's goals, folded under
    /// whole-cube rotations. Needs a label-keeping projection.
    Symmetric { depth: u8 },
}

impl IndexerSpec {
    pub fn resolve(&self, descriptor: &TableDescriptor) -> Result<Indexer> {
        let width = descriptor.projection.width();
        Ok(match self {
            IndexerSpec::BitPack { alphabet } => Indexer::BitPack {
                alphabet: alphabet.bytes().collect(),
                width,
            },
            IndexerSpec::Combination { chosen } => Indexer::Combination {
                width,
                chosen: *chosen,
            },
            IndexerSpec::Symmetric { depth } => {
                let table = MoveTable::new(descriptor.size)?;
                let fold = SymmetryFold::new(&descriptor.projection, &table)?;
                let mut domain = descriptor.clone();
                domain.mode = TableMode::BinarySearch;
                domain.cost_only = true;
                domain.depth_limit = Some(*depth);
                Indexer::symmetric(fold, reachable_states(&domain)?)
            }
        })
    }
}
