//! Agents and their per-entity state machine.
//!
//! ```text
//! Idle ──move──▶ Moving ──arrive on free mineral──▶ Gathering
//!  ▲               │                                    │
//!  └──arrive/stop──┘◀──────────complete/invalid─────────┘
//!
//! any ──eliminated──▶ Eliminated (terminal)
//! ```
//!
//! The room decides *when* transitions happen; this module holds the data
//! and the mechanics of each transition.

use std::collections::{BTreeMap, HashMap, VecDeque};

use serde::{Deserialize, Serialize};

use crate::hex::{axial_to_pixel, Hex, Offset};
use crate::math::{Fixed, Vec2Fixed};
use crate::minerals::MineralId;

/// Unique identifier for agents.
pub type EntityId = u64;

/// Pixel coordinate observers are parked at.
pub const OBSERVER_PARK: i32 = -1000;

/// Team tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Team {
    /// Gatherers.
    Blue,
    /// Hunters.
    Red,
    /// Observers.
    Spectator,
}

impl Team {
    /// The team that wins when this one is wiped out.
    #[must_use]
    pub const fn opponent(self) -> Option<Self> {
        match self {
            Self::Blue => Some(Self::Red),
            Self::Red => Some(Self::Blue),
            Self::Spectator => None,
        }
    }
}

/// Whether the agent plays or only watches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    /// Takes part in the match.
    Participant,
    /// Receives state only.
    Observer,
}

/// What the agent is able to do.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Archetype {
    /// Gathers minerals; can be eliminated.
    Gatherer,
    /// Eliminates gatherers.
    Hunter,
}

impl Archetype {
    /// Team an agent of this archetype plays for.
    #[must_use]
    pub const fn team(self) -> Team {
        match self {
            Self::Gatherer => Team::Blue,
            Self::Hunter => Team::Red,
        }
    }
}

/// Behavior state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentState {
    /// Waiting for a command.
    #[default]
    Idle,
    /// Walking a path.
    Moving,
    /// Working a claimed mineral.
    Gathering,
    /// Out of the match.
    Eliminated,
}

/// Abilities gated by a cooldown.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Ability {
    /// Eliminate an adjacent gatherer.
    Eliminate,
}

/// Remaining cooldown per ability, in milliseconds.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Cooldowns(BTreeMap<Ability, u32>);

impl Cooldowns {
    /// Remaining cooldown; zero if never triggered.
    #[must_use]
    pub fn remaining(&self, ability: Ability) -> u32 {
        self.0.get(&ability).copied().unwrap_or(0)
    }

    /// Returns true if the ability can be used now.
    #[must_use]
    pub fn is_ready(&self, ability: Ability) -> bool {
        self.remaining(ability) == 0
    }

    /// Put an ability on cooldown.
    pub fn trigger(&mut self, ability: Ability, duration_ms: u32) {
        self.0.insert(ability, duration_ms);
    }

    /// Count every cooldown down by `elapsed_ms`, flooring at zero.
    pub fn tick(&mut self, elapsed_ms: u32) {
        for remaining in self.0.values_mut() {
            *remaining = remaining.saturating_sub(elapsed_ms);
        }
    }
}

/// Result of one movement integration step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MovementStep {
    /// Still between cells.
    InProgress,
    /// Entered a cell and turned toward the next waypoint.
    Advanced,
    /// Entered the final cell; the agent is now idle.
    Arrived,
}

/// An agent in a room.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Agent {
    /// Identifier.
    pub id: EntityId,
    /// Team tag.
    pub team: Team,
    /// Participant or observer.
    pub role: Role,
    /// Gatherer or hunter.
    pub archetype: Archetype,
    /// Current cell.
    pub hex: Hex,
    /// Current cell in offset coordinates.
    pub offset: Offset,
    /// Pixel position.
    pub pixel: Vec2Fixed,
    /// Behavior state.
    pub state: AgentState,
    /// Cell currently being walked into.
    pub step_target: Hex,
    /// Cells still to walk after `step_target`.
    pub waypoints: VecDeque<Hex>,
    /// Ability cooldowns.
    pub cooldowns: Cooldowns,
    /// False once eliminated, and always for observers.
    pub alive: bool,
    /// Mineral currently claimed.
    pub claim: Option<MineralId>,
    /// Session of the client controlling this agent.
    pub controller: Option<String>,
}

impl Agent {
    /// A participant standing on `hex`.
    #[must_use]
    pub fn participant(id: EntityId, archetype: Archetype, hex: Hex, tile_size: Fixed) -> Self {
        Self {
            id,
            team: archetype.team(),
            role: Role::Participant,
            archetype,
            hex,
            offset: hex.to_offset(),
            pixel: axial_to_pixel(hex, tile_size, Vec2Fixed::ZERO),
            state: AgentState::Idle,
            step_target: hex,
            waypoints: VecDeque::new(),
            cooldowns: Cooldowns::default(),
            alive: true,
            claim: None,
            controller: None,
        }
    }

    /// An observer parked off-screen.
    #[must_use]
    pub fn observer(id: EntityId, session: impl Into<String>) -> Self {
        let park = Vec2Fixed::from_ints(OBSERVER_PARK, OBSERVER_PARK);
        Self {
            id,
            team: Team::Spectator,
            role: Role::Observer,
            archetype: Archetype::Gatherer,
            hex: Hex::default(),
            offset: Offset::default(),
            pixel: park,
            state: AgentState::Idle,
            step_target: Hex::default(),
            waypoints: VecDeque::new(),
            cooldowns: Cooldowns::default(),
            alive: false,
            claim: None,
            controller: Some(session.into()),
        }
    }

    /// Returns true for alive participants.
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.alive && self.role == Role::Participant
    }

    /// Place the agent exactly on a cell.
    pub fn set_cell(&mut self, hex: Hex, tile_size: Fixed) {
        self.hex = hex;
        self.offset = hex.to_offset();
        self.pixel = axial_to_pixel(hex, tile_size, Vec2Fixed::ZERO);
    }

    /// Start walking `path` (start cell excluded). An empty path is ignored.
    pub fn begin_path(&mut self, path: Vec<Hex>) {
        let mut waypoints: VecDeque<Hex> = path.into();
        let Some(first) = waypoints.pop_front() else {
            return;
        };
        self.step_target = first;
        self.waypoints = waypoints;
        self.state = AgentState::Moving;
    }

    /// Drop the current path and snap back onto the current cell.
    pub fn halt(&mut self, tile_size: Fixed) {
        self.waypoints.clear();
        self.step_target = self.hex;
        self.set_cell(self.hex, tile_size);
        if self.state != AgentState::Eliminated {
            self.state = AgentState::Idle;
        }
    }

    /// Integrate movement toward the step target.
    ///
    /// `speed` is in pixels per millisecond. Within one step of the
    /// target the agent snaps onto the cell exactly.
    pub fn advance_movement(&mut self, elapsed_ms: u32, speed: Fixed, tile_size: Fixed) -> MovementStep {
        let max_step = speed * Fixed::from_num(elapsed_ms);
        let target = axial_to_pixel(self.step_target, tile_size, Vec2Fixed::ZERO);
        let (pixel, reached) = self.pixel.step_towards(target, max_step);

        if !reached {
            self.pixel = pixel;
            return MovementStep::InProgress;
        }

        self.set_cell(self.step_target, tile_size);
        if let Some(next) = self.waypoints.pop_front() {
            self.step_target = next;
            MovementStep::Advanced
        } else {
            self.state = AgentState::Idle;
            MovementStep::Arrived
        }
    }

    /// Mark the agent eliminated. Returns the claim it was holding.
    pub fn eliminate(&mut self) -> Option<MineralId> {
        self.alive = false;
        self.state = AgentState::Eliminated;
        self.waypoints.clear();
        self.step_target = self.hex;
        self.claim.take()
    }
}

/// Storage for all agents in a room.
///
/// Uses a `HashMap` for lookup by ID, with deterministic iteration via
/// [`sorted_ids`](Self::sorted_ids).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AgentRegistry {
    agents: HashMap<EntityId, Agent>,
    next_id: EntityId,
}

impl AgentRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self {
            agents: HashMap::new(),
            next_id: 1,
        }
    }

    /// Reserve the next ID.
    pub fn allocate_id(&mut self) -> EntityId {
        let id = self.next_id.max(1);
        self.next_id = id + 1;
        id
    }

    /// Insert an agent built with an ID from [`allocate_id`](Self::allocate_id).
    pub fn insert(&mut self, agent: Agent) -> EntityId {
        let id = agent.id;
        self.agents.insert(id, agent);
        id
    }

    /// Remove an agent.
    pub fn remove(&mut self, id: EntityId) -> Option<Agent> {
        self.agents.remove(&id)
    }

    /// Get an agent.
    #[must_use]
    pub fn get(&self, id: EntityId) -> Option<&Agent> {
        self.agents.get(&id)
    }

    /// Get an agent mutably.
    pub fn get_mut(&mut self, id: EntityId) -> Option<&mut Agent> {
        self.agents.get_mut(&id)
    }

    /// Number of agents, observers included.
    #[must_use]
    pub fn len(&self) -> usize {
        self.agents.len()
    }

    /// Returns true if there are no agents.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.agents.is_empty()
    }

    /// Get sorted agent IDs for deterministic iteration.
    #[must_use]
    pub fn sorted_ids(&self) -> Vec<EntityId> {
        let mut ids: Vec<_> = self.agents.keys().copied().collect();
        ids.sort_unstable();
        ids
    }

    /// Agents in ascending ID order.
    pub fn iter_sorted(&self) -> impl Iterator<Item = &Agent> + '_ {
        self.sorted_ids()
            .into_iter()
            .filter_map(move |id| self.agents.get(&id))
    }

    /// Number of participants on a team, eliminated or not.
    #[must_use]
    pub fn count_team(&self, team: Team) -> usize {
        self.agents
            .values()
            .filter(|a| a.role == Role::Participant && a.team == team)
            .count()
    }
}
