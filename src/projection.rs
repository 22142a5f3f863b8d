//! State projection: the reduced view of a cube a lookup table is keyed on.
//!
//! A [`Projection`] concatenates parts; each part reads a list of facelets
//! (optionally paired with a partner facelet) and rewrites every label through
//! a [`LabelRule`]. The output is a byte string; [`Projection::key`] turns it
//! into the on-disk key, hex encoded for binary projections.

use std::sync::Arc;

use serde::Deserialize;

use crate::cube::{facelet_coords, MoveTable, MASKED};
use crate::error::{Error, Result};
use crate::geometry::Face;
use crate::pieces::edge_slots;

/// How the labels of a projection part are rewritten.
#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum LabelRule {
    /// Keep labels as they are.
    Keep,
    /// Replace the listed labels, keep the rest.
    Collapse(Vec<(char, char)>),
    /// `1` when the label is in the set, else `0`.
    Binary(Vec<char>),
    /// Edge orientation: `1` when the facelet shows one of `own` or its
    /// partner shows one of `partner`.
    EdgeFlip { own: Vec<char>, partner: Vec<char> },
    /// Edge membership: `1` when neither the facelet nor its partner shows
    /// any label in `absent`.
    Member { absent: Vec<char> },
}

impl LabelRule {
    fn needs_partner(&self) -> bool {
        matches!(self, LabelRule::EdgeFlip { .. } | LabelRule::Member { .. })
    }

    fn is_binary(&self) -> bool {
        !matches!(self, LabelRule::Keep | LabelRule::Collapse(_))
    }
}

/// Which facelets a configured projection part reads.
#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Select {
    All,
    Corners,
    Edges,
    Centers,
    /// The primary facelets of the twelve edges at one wing offset, with
    /// their partners.
    EdgePrimaries(usize),
    Indices(Vec<usize>),
}

/// A projection part as written in configuration.
#[derive(Clone, Debug, PartialEq, Deserialize)]
pub struct PartSpec {
    pub select: Select,
    /// Restrict the selection to these faces.
    #[serde(default)]
    pub faces: Vec<Face>,
    pub rule: LabelRule,
}

#[derive(Clone, Debug)]
enum Compiled {
    Map(Box<[u8; 256]>),
    EdgeFlip(Box<[bool; 256]>, Box<[bool; 256]>),
    Member(Box<[bool; 256]>),
}

fn label_set(labels: &[char]) -> Box<[bool; 256]> {
    let mut set = Box::new([false; 256]);
    for &label in labels {
        set[label as usize & 0xff] = true;
    }
    set
}

impl Compiled {
    fn new(rule: &LabelRule) -> Self {
        match rule {
            LabelRule::Keep | LabelRule::Collapse(_) => {
                let mut map = Box::new([0u8; 256]);
                for (i, slot) in map.iter_mut().enumerate() {
                    *slot = i as u8;
                }
                if let LabelRule::Collapse(pairs) = rule {
                    for &(from, to) in pairs {
                        map[from as usize & 0xff] = to as u8;
                    }
                }
                Compiled::Map(map)
            }
            LabelRule::Binary(set) => {
                let set = label_set(set);
                let mut map = Box::new([b'0'; 256]);
                for (i, slot) in map.iter_mut().enumerate() {
                    if set[i] {
                        *slot = b'1';
                    }
                }
                Compiled::Map(map)
            }
            LabelRule::EdgeFlip { own, partner } => {
                Compiled::EdgeFlip(label_set(own), label_set(partner))
            }
            LabelRule::Member { absent } => Compiled::Member(label_set(absent)),
        }
    }

    #[inline]
    fn apply(&self, own: u8, partner: u8) -> u8 {
        match self {
            Compiled::Map(map) => map[own as usize],
            Compiled::EdgeFlip(own_set, partner_set) => {
                if own_set[own as usize] || partner_set[partner as usize] {
                    b'1'
                } else {
                    b'0'
                }
            }
            Compiled::Member(absent) => {
                if absent[own as usize] || absent[partner as usize] {
                    b'0'
                } else {
                    b'1'
                }
            }
        }
    }
}

#[derive(Clone, Debug)]
struct Part {
    indices: Vec<usize>,
    partners: Option<Vec<usize>>,
    rule: LabelRule,
    compiled: Compiled,
}

/// A pure function from facelets to a reduced state.
#[derive(Clone, Debug)]
pub struct Projection {
    parts: Vec<Part>,
    width: usize,
    hex: bool,
}

impl Projection {
    pub fn builder() -> ProjectionBuilder {
        ProjectionBuilder::default()
    }

    /// Resolves configured parts against a cube size.
    pub fn from_specs(size: usize, specs: &[PartSpec], hex: bool) -> Result<Self> {
        let mut builder = Projection::builder().hex(hex);
        for spec in specs {
            let (indices, partners) = resolve(size, &spec.select, &spec.faces)?;
            builder = match partners {
                Some(partners) => builder.paired(indices, partners, spec.rule.clone()),
                None => builder.part(indices, spec.rule.clone()),
            };
        }
        builder.build()
    }

    /// Number of bytes in a reduced state.
    #[inline]
    pub fn width(&self) -> usize {
        self.width
    }

    /// Keys are hex encoded bit strings.
    #[inline]
    pub fn is_hex(&self) -> bool {
        self.hex
    }

    /// Width of the on-disk key.
    pub fn key_width(&self) -> usize {
        if self.hex {
            self.width.div_ceil(4)
        } else {
            self.width
        }
    }

    /// All facelet indices read, in output order.
    pub fn indices(&self) -> impl Iterator<Item = usize> + '_ {
        self.parts.iter().flat_map(|part| part.indices.iter().copied())
    }

    pub fn project(&self, facelets: &[u8]) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.width);
        self.project_into(facelets, &mut out);
        out
    }

    /// Writes the reduced state into `out`, replacing its contents.
    pub fn project_into(&self, facelets: &[u8], out: &mut Vec<u8>) {
        out.clear();
        for part in &self.parts {
            match &part.partners {
                Some(partners) => {
                    for (&own, &partner) in part.indices.iter().zip(partners) {
                        out.push(part.compiled.apply(facelets[own], facelets[partner]));
                    }
                }
                None => {
                    for &own in &part.indices {
                        out.push(part.compiled.apply(facelets[own], MASKED));
                    }
                }
            }
        }
    }

    /// The table key for a reduced state.
    pub fn encode(&self, reduced: &[u8]) -> String {
        if self.hex {
            to_hex(reduced)
        } else {
            String::from_utf8_lossy(reduced).into_owned()
        }
    }

    /// The table key for a full state.
    pub fn key(&self, facelets: &[u8]) -> String {
        self.encode(&self.project(facelets))
    }
}

/// Builds a [`Projection`] part by part.
#[derive(Default)]
pub struct ProjectionBuilder {
    parts: Vec<(Vec<usize>, Option<Vec<usize>>, LabelRule)>,
    hex: bool,
}

impl ProjectionBuilder {
    pub fn part(mut self, indices: Vec<usize>, rule: LabelRule) -> Self {
        self.parts.push((indices, None, rule));
        self
    }

    pub fn paired(mut self, indices: Vec<usize>, partners: Vec<usize>, rule: LabelRule) -> Self {
        self.parts.push((indices, Some(partners), rule));
        self
    }

    pub fn hex(mut self, hex: bool) -> Self {
        self.hex = hex;
        self
    }

    pub fn build(self) -> Result<Projection> {
        let mut parts = Vec::with_capacity(self.parts.len());
        for (indices, partners, rule) in self.parts {
            if rule.needs_partner() != partners.is_some() {
                return Err(Error::Config(format!(
                    "label rule {rule:?} {} a partner map",
                    if partners.is_some() { "does not take" } else { "needs" }
                )));
            }
            if partners.as_ref().is_some_and(|p| p.len() != indices.len()) {
                return Err(Error::Config("partner map length mismatch".to_string()));
            }
            if self.hex && !rule.is_binary() {
                return Err(Error::Config(format!(
                    "hex keys need a binary label rule, got {rule:?}"
                )));
            }
            let compiled = Compiled::new(&rule);
            parts.push(Part {
                indices,
                partners,
                rule,
                compiled,
            });
        }
        let width = parts.iter().map(|part| part.indices.len()).sum();
        Ok(Projection {
            parts,
            width,
            hex: self.hex,
        })
    }
}

/// Facelet indices (and partners) a configured selection resolves to.
fn resolve(size: usize, select: &Select, faces: &[Face]) -> Result<(Vec<usize>, Option<Vec<usize>>)> {
    let count = 6 * size * size;
    let last = size - 1;
    let on_face = |index: usize| faces.is_empty() || faces.contains(&facelet_coords(size, index).0);
    let border = |n: usize| n == 0 || n == last;
    let kind = |index: usize| {
        let (_, row, col) = facelet_coords(size, index);
        match (border(row), border(col)) {
            (true, true) => Select::Corners,
            (false, false) => Select::Centers,
            _ => Select::Edges,
        }
    };

    let indices: Vec<usize> = match select {
        Select::EdgePrimaries(offset) => {
            if *offset == 0 || *offset >= last {
                return Err(Error::Config(format!(
                    "wing offset {offset} out of range for size {size}"
                )));
            }
            let (primaries, partners): (Vec<usize>, Vec<usize>) = edge_slots(size, *offset)
                .into_iter()
                .filter(|[primary, _]| on_face(*primary))
                .map(|[primary, partner]| (primary, partner))
                .unzip();
            return Ok((primaries, Some(partners)));
        }
        Select::Indices(list) => {
            if let Some(bad) = list.iter().find(|&&i| i >= count) {
                return Err(Error::Config(format!("facelet index {bad} out of range")));
            }
            list.iter().copied().filter(|&i| on_face(i)).collect()
        }
        Select::All => (0..count).filter(|&i| on_face(i)).collect(),
        wanted => (0..count)
            .filter(|&i| on_face(i) && &kind(i) == wanted)
            .collect(),
    };
    Ok((indices, None))
}

/// Reads a `0`/`1` string (anything other than `0`, `x`, `-`, `.` counts as
/// a one) as a binary number and prints it as zero-filled lowercase hex.
pub fn to_hex(bits: &[u8]) -> String {
    let width = bits.len().div_ceil(4);
    let pad = width * 4 - bits.len();
    let bit = |i: usize| -> u8 {
        if i < pad {
            0
        } else {
            u8::from(!matches!(bits[i - pad], b'0' | MASKED | b'-' | b'.'))
        }
    };
    (0..width)
        .map(|digit| {
            let nibble = (0..4).fold(0u8, |acc, k| (acc << 1) | bit(digit * 4 + k));
            char::from_digit(nibble as u32, 16).unwrap_or('0')
        })
        .collect()
}

/// Canonical forms under the 24 whole-cube rotations.
///
/// Works on reduced states of a [`LabelRule::Keep`] projection whose facelet
/// set every rotation maps onto itself; labels are renamed along with the
/// rotation so a rotated solved cube still reads as solved.
#[derive(Clone, Debug)]
pub struct SymmetryFold {
    perms: Vec<Vec<usize>>,
    relabels: Vec<[u8; 256]>,
}

impl SymmetryFold {
    pub fn new(projection: &Projection, table: &Arc<MoveTable>) -> Result<Self> {
        if projection.parts.iter().any(|part| part.rule != LabelRule::Keep || part.partners.is_some()) {
            return Err(Error::Config(
                "symmetry folding needs a plain label-keeping projection".to_string(),
            ));
        }
        let size = table.size();
        let positions: Vec<usize> = projection.indices().collect();
        let mut slot_of = vec![usize::MAX; table.facelet_count()];
        for (slot, &index) in positions.iter().enumerate() {
            slot_of[index] = slot;
        }

        let mut perms = Vec::with_capacity(24);
        let mut relabels = Vec::with_capacity(24);
        for (_, perm) in table.orientations() {
            let mut reduced_perm = Vec::with_capacity(positions.len());
            for &index in &positions {
                let slot = slot_of[perm[index] as usize];
                if slot == usize::MAX {
                    return Err(Error::Config(
                        "projection is not closed under whole-cube rotations".to_string(),
                    ));
                }
                reduced_perm.push(slot);
            }

            let mut relabel = [0u8; 256];
            for (i, slot) in relabel.iter_mut().enumerate() {
                *slot = i as u8;
            }
            for index in 0..table.facelet_count() {
                let from = facelet_coords(size, perm[index] as usize).0;
                let to = facelet_coords(size, index).0;
                relabel[from.label() as usize] = to.label();
            }
            perms.push(reduced_perm);
            relabels.push(relabel);
        }
        Ok(SymmetryFold { perms, relabels })
    }

    /// The smallest rotated-and-renamed image of `reduced`.
    pub fn canonical(&self, reduced: &[u8]) -> Vec<u8> {
        let mut smallest = reduced.to_vec();
        let mut rotated = vec![0u8; reduced.len()];
        for (perm, relabel) in self.perms.iter().zip(&self.relabels) {
            for (dest, &src) in rotated.iter_mut().zip(perm) {
                *dest = relabel[reduced[src] as usize];
            }
            if rotated < smallest {
                smallest.copy_from_slice(&rotated);
            }
        }
        smallest
    }
}
