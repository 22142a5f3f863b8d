//! Solver configuration, read from TOML.
//!
//! Every field has a default, so an empty file is a valid configuration.
//! Phases declared for a size replace its built-in ones; sizes above 3
//! still finish with the reduction to a 3x3x3.
//!
//! ```toml
//! tables_dir = "tables"
//! max_ida_threshold = 20
//!
//! [[tables]]
//! name = "555-ud-t-centres"
//! size = 5
//! filename = "lookup-table-555-ud-t-centres.txt"
//! legal_moves = "U U' U2 Uw Uw' Uw2 ..."
//! hex = true
//! parts = [{ select = "centers", rule = { binary = ["U", "D"] } }]
//!
//! [[sizes]]
//! size = 5
//! phases = [
//!     { kind = "reorient", name = "reorient" },
//!     { kind = "reduce", name = "reduce-444-1", size = 4, layers = [0, 1, 3, 4] },
//!     { kind = "search", name = "stage-ud-t-centres", tables = ["555-ud-t-centres"], legal_moves = "..." },
//! ]
//! ```

use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use rustc_hash::FxHashMap;
use serde::Deserialize;

use crate::error::{Error, Result};
use crate::geometry::Face;
use crate::indexer::IndexerSpec;
use crate::moves::parse_moves;
use crate::native::NativeSolver;
use crate::projection::{PartSpec, Projection};
use crate::table::{TableDescriptor, TableMode};

#[derive(Clone, Debug, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    /// Directory holding the table files.
    pub tables_dir: PathBuf,
    pub max_ida_threshold: u8,
    /// Threshold for the single retry of a phase whose search came up empty.
    pub retry_max_ida_threshold: Option<u8>,
    pub native: NativeConfig,
    /// Colour letters used in input states, mapped to faces.
    pub colors: FxHashMap<char, Face>,
    pub tables: Vec<TableConfig>,
    pub sizes: Vec<SizeConfig>,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            tables_dir: PathBuf::from("tables"),
            max_ida_threshold: 20,
            retry_max_ida_threshold: None,
            native: NativeConfig::default(),
            colors: FxHashMap::default(),
            tables: Vec::new(),
            sizes: Vec::new(),
        }
    }
}

impl FromStr for Config {
    type Err = Error;

    fn from_str(text: &str) -> Result<Self> {
        toml::from_str(text).map_err(|e| Error::Config(e.to_string()))
    }
}

impl Config {
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path).map_err(|e| Error::io(path, e))?;
        text.parse()
    }

    /// Front phases configured for `size`.
    pub fn phases(&self, size: usize) -> &[PhaseConfig] {
        self.sizes
            .iter()
            .find(|entry| entry.size == size)
            .map_or(&[], |entry| &entry.phases)
    }

    /// The native solver, when a binary is configured.
    pub fn native_solver(&self) -> Option<NativeSolver> {
        self.native
            .binary
            .as_ref()
            .map(|binary| NativeSolver::new(binary, Duration::from_secs(self.native.timeout_secs)))
    }

    /// Colour remap for parsing states; `None` when states use face letters.
    pub fn color_map(&self) -> Option<&FxHashMap<char, Face>> {
        (!self.colors.is_empty()).then_some(&self.colors)
    }
}

#[derive(Clone, Debug, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct NativeConfig {
    pub binary: Option<PathBuf>,
    pub timeout_secs: u64,
}

impl Default for NativeConfig {
    fn default() -> Self {
        NativeConfig {
            binary: None,
            timeout_secs: 60,
        }
    }
}

/// A table declared in configuration.
#[derive(Clone, Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TableConfig {
    pub name: String,
    pub size: usize,
    pub filename: String,
    pub parts: Vec<PartSpec>,
    /// Hex encode binary keys.
    #[serde(default)]
    pub hex: bool,
    /// Perfect-hash mode when set.
    #[serde(default)]
    pub indexer: Option<IndexerSpec>,
    pub legal_moves: String,
    #[serde(default)]
    pub goals: Vec<String>,
    #[serde(default)]
    pub cost_only: bool,
    #[serde(default)]
    pub depth_limit: Option<u8>,
    #[serde(default)]
    pub linecount: Option<u64>,
    #[serde(default)]
    pub max_depth: Option<u8>,
    #[serde(default)]
    pub filesize: Option<u64>,
}

impl TableConfig {
    pub fn descriptor(&self) -> Result<TableDescriptor> {
        let projection = Projection::from_specs(self.size, &self.parts, self.hex)?;
        let mut descriptor = TableDescriptor::new(
            &self.name,
            self.size,
            &self.filename,
            projection,
            TableMode::BinarySearch,
            parse_moves(&self.legal_moves)?,
        );
        descriptor.goals = self.goals.clone();
        descriptor.cost_only = self.cost_only;
        descriptor.depth_limit = self.depth_limit;
        descriptor.linecount = self.linecount;
        descriptor.max_depth = self.max_depth;
        descriptor.filesize = self.filesize;
        if let Some(spec) = &self.indexer {
            // a symmetric domain ends where the build has to stop
            if let IndexerSpec::Symmetric { depth } = spec {
                descriptor.depth_limit = Some(self.depth_limit.map_or(*depth, |d| d.min(*depth)));
            }
            descriptor.mode = TableMode::PerfectHash(spec.resolve(&descriptor)?);
        }
        Ok(descriptor)
    }
}

#[derive(Clone, Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SizeConfig {
    pub size: usize,
    pub phases: Vec<PhaseConfig>,
}

/// One configured phase.
#[derive(Clone, Debug, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum PhaseConfig {
    Reorient {
        name: String,
    },
    Search {
        name: String,
        tables: Vec<String>,
        #[serde(default)]
        main_table: Option<String>,
        legal_moves: String,
        /// Projection parts of the goal; empty means the solved cube.
        #[serde(default)]
        goal: Vec<PartSpec>,
        #[serde(default)]
        max_ida_threshold: Option<u8>,
        #[serde(default)]
        multiplier: Option<f32>,
        #[serde(default)]
        native: bool,
        /// Also require an even permutation of the first wing orbit.
        #[serde(default)]
        even_wings: bool,
    },
    Lookup {
        name: String,
        table: String,
    },
    Reduce {
        name: String,
        size: usize,
        #[serde(default)]
        layers: Option<Vec<usize>>,
    },
    PairEdges {
        name: String,
    },
    EdgeParity {
        name: String,
    },
}
