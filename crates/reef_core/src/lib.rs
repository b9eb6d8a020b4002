//! # Reef Core
//!
//! Authoritative room simulation for Reef Arena.
//!
//! This crate contains **only** deterministic logic:
//! - No networking
//! - No IO beyond loading map and replay files
//! - No system randomness (each room owns a seeded RNG)
//! - No floating-point pixel math (uses fixed-point)
//!
//! This separation enables:
//! - A thin async server that only routes messages
//! - Replay verification
//! - Determinism testing
//!
//! ## Crate Structure
//!
//! - [`hex`] - Axial/offset/pixel coordinate math
//! - [`pathfinding`] - A* over the hex grid
//! - [`map`] - Map definitions and per-room grids
//! - [`minerals`] - Claimable, respawning resource nodes
//! - [`agents`] - Agents and their state machine
//! - [`simulation`] - The room tick engine
//! - [`snapshot`] - Broadcast views and deltas
//! - [`replay`] - Recording and verification

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all, clippy::pedantic)]

pub mod agents;
pub mod config;
pub mod error;
pub mod hex;
pub mod map;
pub mod math;
pub mod minerals;
pub mod pathfinding;
pub mod replay;
pub mod simulation;
pub mod snapshot;

/// Re-export commonly used types
pub mod prelude {
    pub use crate::agents::{
        Ability, Agent, AgentRegistry, AgentState, Archetype, EntityId, Role, Team,
    };
    pub use crate::config::{AbandonPolicy, RoomConfig};
    pub use crate::error::{GameError, Result};
    pub use crate::hex::{GridBounds, Hex, Offset};
    pub use crate::map::{HexGridConfig, MapDefinition, RegionDef};
    pub use crate::math::{Fixed, Vec2Fixed};
    pub use crate::minerals::{Mineral, MineralId, MineralKind};
    pub use crate::pathfinding::find_path;
    pub use crate::replay::Replay;
    pub use crate::simulation::{
        Command, CommandOutcome, GameOver, IgnoreReason, MoveTarget, Phase, Room, RoomMetadata,
        TickEvents, WinReason,
    };
    pub use crate::snapshot::{RegionListing, RoomSnapshot, SnapshotDelta};
}
