//! # Reef Arena Development Tools
//!
//! Command-line tools for map authoring:
//! - Seeded map generator, one map set per biome
//! - Map validator with spawn reachability checks

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all, clippy::pedantic)]

pub mod generate;
pub mod validate;
