//! Error taxonomy shared by every layer of the solver.
//!
//! Only [`Error::NoIdaSolution`] is ever retried (by the reduction pipeline);
//! everything else propagates to the caller, wrapped in [`Error::Phase`] once
//! it crosses a phase boundary.

use std::path::PathBuf;

use thiserror::Error;

/// Crate-wide result alias.
pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, Error)]
pub enum Error {
    #[error("unknown move {name:?}: {reason}")]
    UnknownMove { name: String, reason: String },

    #[error("corrupt lookup table {path}: {reason}")]
    CorruptTable { path: PathBuf, reason: String },

    #[error("IDA search failed with range {min_threshold}->{max_threshold}")]
    NoIdaSolution { min_threshold: u8, max_threshold: u8 },

    #[error("phase {phase:?} failed: {reason}")]
    Solve { phase: String, reason: String },

    #[error("in phase {phase:?}: {source}")]
    Phase {
        phase: String,
        #[source]
        source: Box<Error>,
    },

    #[error("invalid cube state: {0}")]
    InvalidState(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl Error {
    pub(crate) fn unknown_move(name: impl Into<String>, reason: impl Into<String>) -> Self {
        Error::UnknownMove {
            name: name.into(),
            reason: reason.into(),
        }
    }

    pub(crate) fn corrupt(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        Error::CorruptTable {
            path: path.into(),
            reason: reason.into(),
        }
    }

    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Error::Io {
            path: path.into(),
            source,
        }
    }

    /// Attaches a phase name. An error already attributed to `phase` is
    /// left alone; one from a nested solver keeps its own phase underneath.
    pub(crate) fn in_phase(self, phase: &str) -> Self {
        match self {
            Error::Solve { phase: ref inner, .. } | Error::Phase { phase: ref inner, .. }
                if inner == phase =>
            {
                self
            }
            other => Error::Phase {
                phase: phase.to_string(),
                source: Box::new(other),
            },
        }
    }

    /// Phase names from the outermost wrapper inwards, joined with `/`.
    pub fn phase_path(&self) -> Option<String> {
        match self {
            Error::Phase { phase, source } => Some(match source.phase_path() {
                Some(inner) => format!("{phase}/{inner}"),
                None => phase.clone(),
            }),
            Error::Solve { phase, .. } => Some(phase.clone()),
            _ => None,
        }
    }

    /// True for the one failure the pipeline may retry.
    pub fn is_no_solution(&self) -> bool {
        match self {
            Error::NoIdaSolution { .. } => true,
            Error::Phase { source, .. } => source.is_no_solution(),
            _ => false,
        }
    }
}
