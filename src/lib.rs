//! N×N×N Cube Solver Library
//!
//! Solves any cube from 2x2x2 upwards by reducing it to smaller cubes and
//! finishing with IDA* searches guided by pattern databases.
//!
//! Layers, bottom up:
//! - [`cube`] applies moves as facelet permutations.
//! - [`projection`] and [`indexer`] turn a cube into table keys.
//! - [`table`] reads pattern databases, [`builder`] writes them.
//! - [`search`] runs IDA* over the tables, optionally through [`native`].
//! - [`pairing`] pairs 4x4x4 edges and fixes their parity.
//! - [`pipeline`] runs the phases of a size, reducing big cubes to small ones.

pub mod builder;
pub mod catalog;
pub mod config;
pub mod cube;
pub mod error;
pub mod geometry;
pub mod indexer;
pub mod moves;
pub mod native;
pub mod pairing;
pub mod pieces;
pub mod pipeline;
pub mod projection;
pub mod search;
pub mod table;

pub use config::Config;
pub use cube::{Cube, MoveTable};
pub use error::{Error, Result};
pub use moves::{Move, Step};
pub use pipeline::Solver;
