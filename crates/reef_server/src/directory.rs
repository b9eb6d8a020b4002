//! Directory of running rooms.

use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

use reef_core::simulation::RoomMetadata;
use serde::{Deserialize, Serialize};

use crate::room_task::RoomHandle;

/// Room type name reported in listings.
pub const ROOM_NAME: &str = "reef";

/// Public description of one room.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoomListing {
    /// Room id.
    pub room_id: String,
    /// Room type name.
    pub name: String,
    /// Connected clients.
    pub clients: usize,
    /// Client limit.
    pub max_clients: usize,
    /// Title, mode, team counts and map.
    pub metadata: RoomMetadata,
}

/// Handles to every running room, keyed by id.
#[derive(Debug, Default)]
pub struct RoomDirectory {
    rooms: Mutex<BTreeMap<String, RoomHandle>>,
}

impl RoomDirectory {
    /// Create an empty directory.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a room.
    pub fn insert(&self, handle: RoomHandle) {
        self.lock().insert(handle.id().to_string(), handle);
    }

    /// Unregister a room.
    pub fn remove(&self, room_id: &str) -> Option<RoomHandle> {
        self.lock().remove(room_id)
    }

    /// Look up a room.
    #[must_use]
    pub fn get(&self, room_id: &str) -> Option<RoomHandle> {
        self.lock().get(room_id).cloned()
    }

    /// Number of running rooms.
    #[must_use]
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    /// Returns true if no rooms are running.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Latest listing of every room, by id.
    #[must_use]
    pub fn list(&self) -> Vec<RoomListing> {
        self.lock().values().map(RoomHandle::listing).collect()
    }

    fn lock(&self) -> MutexGuard<'_, BTreeMap<String, RoomHandle>> {
        self.rooms.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
