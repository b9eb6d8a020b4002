//! Room creation for matched batches.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use reef_core::error::{GameError, Result};
use reef_core::map::HexGridConfig;
use reef_core::simulation::Room;
use tokio::runtime::Handle;

use crate::directory::RoomDirectory;
use crate::maps::MapCatalog;
use crate::matchmaking::RoomFactory;
use crate::room_task::spawn_room;
use crate::ServerConfig;

/// Builds rooms from map files and starts their tasks.
///
/// Safe to call from blocking threads: map loading is synchronous and
/// tasks are spawned through a stored runtime handle.
#[derive(Debug)]
pub struct ServerRoomFactory {
    config: Arc<ServerConfig>,
    catalog: MapCatalog,
    directory: Arc<RoomDirectory>,
    runtime: Handle,
    rng: Mutex<StdRng>,
    next_id: AtomicU64,
}

impl ServerRoomFactory {
    /// Create a factory. `seed` drives every room seed it hands out.
    #[must_use]
    pub fn new(
        config: Arc<ServerConfig>,
        catalog: MapCatalog,
        directory: Arc<RoomDirectory>,
        runtime: Handle,
        seed: u64,
    ) -> Self {
        Self {
            config,
            catalog,
            directory,
            runtime,
            rng: Mutex::new(StdRng::seed_from_u64(seed)),
            next_id: AtomicU64::new(1),
        }
    }

    /// Build a started room without spawning it.
    ///
    /// A map that fails to load falls back to the default open grid.
    ///
    /// # Errors
    ///
    /// Returns [`GameError::RoomCreation`] if the room config is invalid.
    pub fn build_room(&self, map_path: Option<&str>, seed: u64) -> Result<Room> {
        let room_config = self.config.room.clone();
        room_config
            .validate()
            .map_err(|e| GameError::RoomCreation(e.to_string()))?;

        let mut map_rng = StdRng::seed_from_u64(seed);
        let mut grid = match map_path {
            Some(path) => {
                let file = self.catalog.resolve(path);
                let (grid, error) = HexGridConfig::load_or_fallback(
                    &file,
                    room_config.fallback_mineral_ratio,
                    &mut map_rng,
                );
                if let Some(e) = error {
                    tracing::warn!(map = path, "Room falls back to the default grid: {e}");
                }
                grid
            }
            None => HexGridConfig::fallback(),
        };
        if let Some(tile_size) = self.config.spawn_tile_size {
            grid = grid.with_tile_size(tile_size);
        }

        let mut room = Room::new(grid, room_config, seed, map_path.unwrap_or_default());
        room.start();
        Ok(room)
    }
}

impl RoomFactory for ServerRoomFactory {
    fn create_room(&self, map_path: Option<&str>) -> Result<String> {
        let seed: u64 = self.rng.lock().unwrap_or_else(PoisonError::into_inner).gen();
        let room = self.build_room(map_path, seed)?;
        let id = format!("room-{}", self.next_id.fetch_add(1, Ordering::Relaxed));
        spawn_room(
            id.clone(),
            room,
            self.config.empty_room_grace(),
            &self.directory,
            &self.runtime,
        );
        tracing::info!(room_id = %id, seed, map = ?map_path, "Room created");
        Ok(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reef_core::simulation::Phase;
    use reef_test_utils::fixtures::map_definition;
    use reef_core::hex::Offset;

    fn factory(config: ServerConfig, catalog: MapCatalog) -> ServerRoomFactory {
        ServerRoomFactory::new(
            Arc::new(config),
            catalog,
            Arc::new(RoomDirectory::new()),
            Handle::current(),
            9,
        )
    }

    #[tokio::test]
    async fn test_build_room_from_map_file() {
        let dir = tempfile::tempdir().unwrap();
        let map = map_definition(12, 8, &[Offset::new(3, 3)], &[Offset::new(5, 5)]);
        std::fs::write(dir.path().join("map1.json"), map.to_json().unwrap()).unwrap();
        let catalog = MapCatalog::scan(dir.path());

        let config = ServerConfig {
            spawn_tile_size: Some(48),
            ..ServerConfig::default()
        };
        let room = factory(config, catalog).build_room(Some("/maps/map1.json"), 5).unwrap();

        assert_eq!(room.phase(), Phase::Active);
        assert_eq!(room.grid().bounds.cols, 12);
        assert_eq!(room.grid().tile_size, reef_core::math::Fixed::from_num(48));
        assert_eq!(room.minerals().len(), 1);
        assert_eq!(room.metadata().map_path, "/maps/map1.json");
        assert_eq!(room.agents().len(), 8);
    }

    #[tokio::test]
    async fn test_missing_map_falls_back() {
        let room = factory(ServerConfig::default(), MapCatalog::default())
            .build_room(Some("/maps/gone.json"), 1)
            .unwrap();
        assert_eq!(room.grid().bounds.cols, 30);
        assert_eq!(room.grid().bounds.rows, 20);
    }

    #[tokio::test]
    async fn test_invalid_config_fails_creation() {
        let mut config = ServerConfig::default();
        config.room.min_work_ms = 10;
        config.room.max_work_ms = 1;
        let result = factory(config, MapCatalog::default()).create_room(None);
        assert!(matches!(result, Err(GameError::RoomCreation(_))));
    }

    #[tokio::test]
    async fn test_create_room_registers_in_directory() {
        let factory = factory(ServerConfig::default(), MapCatalog::default());
        let first = factory.create_room(None).unwrap();
        let second = factory.create_room(None).unwrap();
        assert_ne!(first, second);
        assert!(factory.directory.get(&first).is_some());
        assert_eq!(factory.directory.len(), 2);
    }
}
