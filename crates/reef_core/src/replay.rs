//! Replay system for recording and re-running rooms.
//!
//! A replay stores everything needed to rebuild a room (grid, config,
//! seed) plus the stream of lifecycle actions and commands in tick order.
//! Re-running it must reproduce the recorded final state hash.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::agents::{Archetype, EntityId};
use crate::config::RoomConfig;
use crate::error::{GameError, Result};
use crate::hex::Hex;
use crate::map::HexGridConfig;
use crate::simulation::{Command, Room};

/// Something that changed room state from outside the tick loop.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReplayAction {
    /// The room left the lobby.
    Start,
    /// An extra participant was placed.
    Spawn {
        /// Archetype of the new agent.
        archetype: Archetype,
        /// Cell it was placed on.
        hex: Hex,
    },
    /// A client joined.
    Join(String),
    /// A client left.
    Leave(String),
    /// A command was issued for an agent.
    Command {
        /// Target agent.
        entity: EntityId,
        /// The command.
        command: Command,
    },
}

/// A single recorded action.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReplayEntry {
    /// Tick counter when the action happened.
    pub tick: u64,
    /// What happened.
    pub action: ReplayAction,
}

/// Replay file format version for compatibility.
pub const REPLAY_VERSION: u32 = 1;

/// Complete replay data structure.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Replay {
    /// Replay format version.
    pub version: u32,
    /// Map path reported in room metadata.
    pub map_path: String,
    /// Random seed of the room.
    pub seed: u64,
    /// Grid the room was built from.
    pub grid: HexGridConfig,
    /// Room configuration.
    pub config: RoomConfig,
    /// Actions in tick order.
    pub entries: Vec<ReplayEntry>,
    /// Tick counter when recording stopped.
    pub final_tick: u64,
    /// State hash when recording stopped.
    pub final_hash: u64,
}

impl Replay {
    /// Create an empty replay for a room about to be recorded.
    #[must_use]
    pub fn new(
        map_path: impl Into<String>,
        seed: u64,
        grid: HexGridConfig,
        config: RoomConfig,
    ) -> Self {
        Self {
            version: REPLAY_VERSION,
            map_path: map_path.into(),
            seed,
            grid,
            config,
            entries: Vec::new(),
            final_tick: 0,
            final_hash: 0,
        }
    }

    /// Record an action.
    pub fn record(&mut self, tick: u64, action: ReplayAction) {
        self.entries.push(ReplayEntry { tick, action });
    }

    /// Finalize the replay with end state.
    pub fn finalize(&mut self, final_tick: u64, final_hash: u64) {
        self.final_tick = final_tick;
        self.final_hash = final_hash;
    }

    /// Number of recorded commands.
    #[must_use]
    pub fn command_count(&self) -> usize {
        self.entries
            .iter()
            .filter(|e| matches!(e.action, ReplayAction::Command { .. }))
            .count()
    }

    /// Save the replay to a file.
    ///
    /// # Errors
    /// Returns an error if serialization or file writing fails.
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let bytes = bincode::serialize(self)
            .map_err(|e| GameError::Serialization(format!("Failed to serialize replay: {e}")))?;
        std::fs::write(path.as_ref(), bytes)
            .map_err(|e| GameError::Serialization(format!("Failed to write replay file: {e}")))?;
        Ok(())
    }

    /// Load a replay from a file.
    ///
    /// # Errors
    /// Returns an error if file reading, deserialization or the version
    /// check fails.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let bytes = std::fs::read(path.as_ref())
            .map_err(|e| GameError::Serialization(format!("Failed to read replay file: {e}")))?;
        let replay: Self = bincode::deserialize(&bytes)
            .map_err(|e| GameError::Serialization(format!("Failed to deserialize replay: {e}")))?;

        if replay.version != REPLAY_VERSION {
            return Err(GameError::Serialization(format!(
                "Replay version mismatch: expected {}, got {}",
                REPLAY_VERSION, replay.version
            )));
        }

        Ok(replay)
    }

    /// Rebuild the room and run it to `final_tick`.
    #[must_use]
    pub fn run(&self) -> Room {
        let mut room = Room::new(
            self.grid.clone(),
            self.config.clone(),
            self.seed,
            self.map_path.clone(),
        );
        let mut cursor = 0;

        loop {
            while let Some(entry) = self.entries.get(cursor) {
                if entry.tick > room.get_tick() {
                    break;
                }
                apply(&mut room, &entry.action);
                cursor += 1;
            }
            if room.get_tick() >= self.final_tick {
                break;
            }
            room.tick();
        }

        room
    }

    /// Re-run the replay and compare the final state hash.
    ///
    /// # Errors
    /// Returns [`GameError::DesyncDetected`] if the hashes differ.
    pub fn verify(&self) -> Result<()> {
        let room = self.run();
        let actual = room.state_hash();
        if actual != self.final_hash {
            return Err(GameError::DesyncDetected {
                tick: self.final_tick,
                expected: self.final_hash,
                actual,
            });
        }
        Ok(())
    }
}

fn apply(room: &mut Room, action: &ReplayAction) {
    match action {
        ReplayAction::Start => {
            room.start();
        }
        ReplayAction::Spawn { archetype, hex } => {
            if let Err(e) = room.spawn_agent(*archetype, *hex) {
                tracing::debug!("Replayed spawn rejected: {e}");
            }
        }
        ReplayAction::Join(session) => {
            if let Err(e) = room.join(session) {
                tracing::debug!("Replayed join rejected: {e}");
            }
        }
        ReplayAction::Leave(session) => {
            room.leave(session);
        }
        ReplayAction::Command { entity, command } => {
            room.apply_command(*entity, *command);
        }
    }
}
