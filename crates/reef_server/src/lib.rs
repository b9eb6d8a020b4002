//! # Reef Arena Server
//!
//! Headless room server.
//!
//! Owns no game rules itself: every room is a [`reef_core::simulation::Room`]
//! driven by its own tokio task. This crate only routes messages between
//! TCP clients, the matchmaking queue and those tasks.

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all, clippy::pedantic)]

pub mod directory;
pub mod error;
pub mod factory;
pub mod maps;
pub mod matchmaking;
pub mod network;
pub mod protocol;
pub mod room_task;

use std::net::SocketAddr;
use std::path::{Path, PathBuf};

use reef_core::config::RoomConfig;
use serde::{Deserialize, Serialize};

use crate::error::{ServerError, ServerResult};

/// Server configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Address to bind.
    pub bind_address: String,
    /// Port to listen on.
    pub port: u16,
    /// Directory scanned for map files.
    pub maps_dir: PathBuf,
    /// Tickets per created room.
    pub batch_size: usize,
    /// Ticket table size before finished tickets are evicted.
    pub max_tickets: usize,
    /// Close a room once its last client leaves, or once it has sat
    /// without clients for `empty_room_timeout_ms`.
    pub dispose_when_empty: bool,
    /// How long a room may run with no clients before it is closed.
    pub empty_room_timeout_ms: u64,
    /// Tile size applied to every map, overriding the map's own.
    pub spawn_tile_size: Option<i32>,
    /// Room simulation parameters.
    pub room: RoomConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0".to_string(),
            port: 2567,
            maps_dir: PathBuf::from("maps/generated"),
            batch_size: 8,
            max_tickets: 10_000,
            dispose_when_empty: true,
            empty_room_timeout_ms: 60_000,
            spawn_tile_size: None,
            room: RoomConfig::default(),
        }
    }
}

impl ServerConfig {
    /// Grace period after which an empty room is closed, if empty rooms
    /// are closed at all.
    #[must_use]
    pub fn empty_room_grace(&self) -> Option<std::time::Duration> {
        self.dispose_when_empty
            .then(|| std::time::Duration::from_millis(self.empty_room_timeout_ms))
    }

    /// Load a config from a RON file.
    ///
    /// Missing fields take their defaults.
    pub fn load(path: &Path) -> ServerResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| ServerError::Config {
            path: path.display().to_string(),
            message: e.to_string(),
        })?;
        Self::from_ron(&content).map_err(|e| match e {
            ServerError::Config { message, .. } => ServerError::Config {
                path: path.display().to_string(),
                message,
            },
            other => other,
        })
    }

    /// Parse a config from RON text.
    pub fn from_ron(content: &str) -> ServerResult<Self> {
        let config: Self = ron::from_str(content).map_err(|e| ServerError::Config {
            path: "<inline>".to_string(),
            message: e.to_string(),
        })?;
        config.room.validate()?;
        Ok(config)
    }

    /// Apply `PORT`, `REEF_MAPS_DIR` and `GAME_SPAWN_TILE_SIZE` from the
    /// process environment.
    #[must_use]
    pub fn with_env_overrides(self) -> Self {
        self.with_overrides(|key| std::env::var(key).ok())
    }

    /// Apply overrides from any key lookup. Unparseable values are logged
    /// and ignored.
    #[must_use]
    pub fn with_overrides<F>(mut self, lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(port) = lookup("PORT") {
            match port.trim().parse() {
                Ok(port) => self.port = port,
                Err(e) => tracing::warn!(%port, "Ignoring invalid PORT: {e}"),
            }
        }
        if let Some(dir) = lookup("REEF_MAPS_DIR") {
            self.maps_dir = PathBuf::from(dir);
        }
        if let Some(size) = lookup("GAME_SPAWN_TILE_SIZE") {
            match size.trim().parse::<i32>() {
                Ok(size) if size > 0 => self.spawn_tile_size = Some(size),
                _ => tracing::warn!(%size, "Ignoring invalid GAME_SPAWN_TILE_SIZE"),
            }
        }
        self
    }

    /// Socket address to listen on.
    pub fn socket_addr(&self) -> ServerResult<SocketAddr> {
        let addr = format!("{}:{}", self.bind_address, self.port);
        addr.parse().map_err(|e| ServerError::Config {
            path: "bind_address".to_string(),
            message: format!("invalid address '{addr}': {e}"),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_partial_ron_uses_defaults() {
        let config = ServerConfig::from_ron("(port: 9000, room: (agent_count: 4))").unwrap();
        assert_eq!(config.port, 9000);
        assert_eq!(config.batch_size, 8);
        assert_eq!(config.room.agent_count, 4);
        assert_eq!(config.room.tick_interval_ms, 200);
        assert_eq!(
            config.empty_room_grace(),
            Some(std::time::Duration::from_secs(60))
        );
    }

    #[test]
    fn test_invalid_room_config_rejected() {
        let result = ServerConfig::from_ron("(room: (min_work_ms: 10, max_work_ms: 5))");
        assert!(matches!(result, Err(ServerError::Game(_))));
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("server.ron");
        std::fs::write(&path, "(batch_size: 2, dispose_when_empty: false)").unwrap();

        let config = ServerConfig::load(&path).unwrap();
        assert_eq!(config.batch_size, 2);
        assert!(!config.dispose_when_empty);
        assert_eq!(config.empty_room_grace(), None);

        let missing = ServerConfig::load(&dir.path().join("nope.ron"));
        assert!(matches!(missing, Err(ServerError::Config { .. })));
    }

    #[test]
    fn test_env_overrides() {
        let env: HashMap<&str, &str> = [
            ("PORT", "4000"),
            ("REEF_MAPS_DIR", "/srv/maps"),
            ("GAME_SPAWN_TILE_SIZE", "48"),
        ]
        .into_iter()
        .collect();
        let config = ServerConfig::default()
            .with_overrides(|key| env.get(key).map(|v| (*v).to_string()));

        assert_eq!(config.port, 4000);
        assert_eq!(config.maps_dir, PathBuf::from("/srv/maps"));
        assert_eq!(config.spawn_tile_size, Some(48));
    }

    #[test]
    fn test_bad_overrides_ignored() {
        let config = ServerConfig::default().with_overrides(|key| match key {
            "PORT" => Some("not-a-port".to_string()),
            "GAME_SPAWN_TILE_SIZE" => Some("-3".to_string()),
            _ => None,
        });
        assert_eq!(config.port, 2567);
        assert_eq!(config.spawn_tile_size, None);
        assert_eq!(config.socket_addr().unwrap().port(), 2567);
    }
}
