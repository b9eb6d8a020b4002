//! Error types for the room simulation.

use thiserror::Error;

use crate::hex::Hex;

/// Result type alias using [`GameError`].
pub type Result<T> = std::result::Result<T, GameError>;

/// Top-level error type for all simulation and matchmaking errors.
#[derive(Debug, Error)]
pub enum GameError {
    /// Failed to read or parse a map definition.
    #[error("Failed to load map '{path}': {message}")]
    MapLoad {
        /// Path of the map that failed to load.
        path: String,
        /// Error message.
        message: String,
    },

    /// A map definition was parsed but is structurally invalid.
    #[error("Invalid map definition: {0}")]
    InvalidMap(String),

    /// No path exists between two cells.
    #[error("No path from ({}, {}) to ({}, {})", from.q, from.r, to.q, to.r)]
    NoPath {
        /// Start cell.
        from: Hex,
        /// Goal cell.
        to: Hex,
    },

    /// Room creation failed during matchmaking.
    #[error("Room creation failed: {0}")]
    RoomCreation(String),

    /// Replay or snapshot (de)serialization failed.
    #[error("Serialization failed: {0}")]
    Serialization(String),

    /// Invalid room state.
    #[error("Invalid room state: {0}")]
    InvalidState(String),

    /// Desync detected while verifying a replay.
    #[error("Desync detected at tick {tick}: expected hash {expected}, got {actual}")]
    DesyncDetected {
        /// Tick where desync occurred.
        tick: u64,
        /// Recorded hash.
        expected: u64,
        /// Recomputed hash.
        actual: u64,
    },
}
