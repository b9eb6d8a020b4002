//! Server error types.

use reef_core::error::GameError;
use thiserror::Error;

/// Result type alias using [`ServerError`].
pub type ServerResult<T> = std::result::Result<T, ServerError>;

/// Errors raised by the server layer.
#[derive(Debug, Error)]
pub enum ServerError {
    /// Socket or file I/O failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The server configuration could not be read or parsed.
    #[error("Invalid config '{path}': {message}")]
    Config {
        /// Source of the config.
        path: String,
        /// What went wrong.
        message: String,
    },

    /// No room with this id is registered.
    #[error("Room not found: {0}")]
    RoomNotFound(String),

    /// The room task has shut down.
    #[error("Room closed: {0}")]
    RoomClosed(String),

    /// Error from the room simulation.
    #[error(transparent)]
    Game(#[from] GameError),
}
