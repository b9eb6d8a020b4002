//! Authoritative room simulation.
//!
//! A [`Room`] owns one grid, its agents and its minerals. It advances in
//! fixed ticks and accepts commands between ticks; the caller guarantees
//! that the two never interleave.
//!
//! # Determinism
//!
//! - Pixel math is fixed-point (see [`crate::math`])
//! - All randomness comes from a `StdRng` seeded at construction
//! - Agents are processed in ascending ID order
//!
//! # Example
//!
//! ```
//! use reef_core::config::RoomConfig;
//! use reef_core::hex::Hex;
//! use reef_core::map::HexGridConfig;
//! use reef_core::simulation::{Command, MoveTarget, Phase, Room};
//!
//! let grid = HexGridConfig::open(10, 10, 30, "Desert");
//! let mut room = Room::new(grid, RoomConfig::default(), 7, "");
//! room.start();
//! assert_eq!(room.phase(), Phase::Active);
//!
//! let agent = room.join("client-1").unwrap();
//! room.apply_command(agent, Command::Move(MoveTarget::Axial(Hex::new(2, 3))));
//! room.tick();
//! assert_eq!(room.get_tick(), 1);
//! ```

use std::collections::hash_map::DefaultHasher;
use std::collections::BTreeMap;
use std::hash::{Hash, Hasher};

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};

use crate::agents::{
    Ability, Agent, AgentRegistry, AgentState, Archetype, EntityId, MovementStep, Role, Team,
};
use crate::config::RoomConfig;
use crate::error::{GameError, Result};
use crate::hex::{Hex, Offset};
use crate::map::HexGridConfig;
use crate::minerals::{Mineral, MineralField, MineralId, WorkOutcome};
use crate::pathfinding::find_path;
use crate::replay::{Replay, ReplayAction};
use crate::snapshot::{RegionListing, RoomSnapshot};

/// Coarse match phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    /// Created, not yet started.
    Lobby,
    /// Ticking.
    Active,
    /// A winner has been decided. Terminal.
    Ended,
}

/// Why a match ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WinReason {
    /// Gatherers completed enough minerals.
    MineralsCollected,
    /// Every participant of one team was eliminated.
    TeamEliminated,
}

/// Final match result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct GameOver {
    /// Winning team.
    pub winner: Team,
    /// Why it won.
    pub reason: WinReason,
}

/// Destination of a move command.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MoveTarget {
    /// Axial cell.
    Axial(Hex),
    /// Offset cell.
    Offset(Offset),
}

impl MoveTarget {
    /// Axial cell of the destination.
    #[must_use]
    pub fn to_hex(self) -> Hex {
        match self {
            Self::Axial(hex) => hex,
            Self::Offset(offset) => offset.to_axial(),
        }
    }
}

/// Commands that can be issued for an agent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Command {
    /// Walk to a cell.
    Move(MoveTarget),
    /// Drop the current path or claim.
    Stop,
    /// Eliminate a nearby gatherer.
    Eliminate {
        /// Agent to eliminate.
        target: EntityId,
    },
}

/// Why a command had no effect.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum IgnoreReason {
    /// The room is not active.
    NotActive,
    /// No such agent or session.
    UnknownAgent,
    /// The agent is an observer.
    Observer,
    /// The agent has been eliminated.
    NotAlive,
    /// Only hunters can eliminate.
    NotHunter,
    /// The ability is still cooling down.
    OnCooldown,
    /// The target is missing, not alive, not a gatherer or the actor itself.
    InvalidTarget,
    /// The target is too far away.
    OutOfRange,
    /// No path to the destination.
    Unreachable,
    /// Already standing on the destination.
    AlreadyThere,
}

/// Result of [`Room::apply_command`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CommandOutcome {
    /// The command changed room state.
    Applied,
    /// The command was a no-op.
    Ignored(IgnoreReason),
}

impl CommandOutcome {
    /// Returns true if the command took effect.
    #[must_use]
    pub const fn is_applied(self) -> bool {
        matches!(self, Self::Applied)
    }
}

/// A mineral completed during a tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MineralCompleted {
    /// The mineral.
    pub mineral: MineralId,
    /// Agent that completed it.
    pub agent: EntityId,
}

/// Events generated during a tick.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TickEvents {
    /// Tick counter after this tick.
    pub tick: u64,
    /// Claims made on arrival.
    pub claimed: Vec<(EntityId, MineralId)>,
    /// Minerals completed.
    pub completed: Vec<MineralCompleted>,
    /// Minerals returned to the pool.
    pub respawned: Vec<MineralId>,
    /// Set on the one tick the match ends.
    pub game_over: Option<GameOver>,
}

/// Directory metadata of a room.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoomMetadata {
    /// Display title.
    pub title: String,
    /// Mode tag.
    pub mode: String,
    /// Blue participants.
    pub blue: usize,
    /// Red participants.
    pub red: usize,
    /// Map the room was created with.
    pub map_path: String,
}

/// One match on one map.
///
/// # Tick Order
///
/// While active, each tick:
/// 1. Advances the room clock and respawns due minerals
/// 2. For every alive agent in ID order, counts cooldowns down and runs
///    its state behavior (movement or gathering)
/// 3. Repairs mineral invariants
/// 4. Evaluates win conditions
#[derive(Debug, Clone)]
pub struct Room {
    grid: HexGridConfig,
    config: RoomConfig,
    agents: AgentRegistry,
    minerals: MineralField,
    sessions: BTreeMap<String, EntityId>,
    tick: u64,
    clock_ms: u64,
    phase: Phase,
    outcome: Option<GameOver>,
    minerals_collected: u32,
    seed: u64,
    rng: StdRng,
    metadata: RoomMetadata,
    recording: Option<Replay>,
}

impl Room {
    /// Create a room in the lobby phase.
    ///
    /// Minerals are placed immediately; agents are spawned by
    /// [`start`](Self::start).
    #[must_use]
    pub fn new(
        grid: HexGridConfig,
        config: RoomConfig,
        seed: u64,
        map_path: impl Into<String>,
    ) -> Self {
        let mut rng = StdRng::seed_from_u64(seed);
        let minerals = MineralField::new(&grid, &config, &mut rng);
        let metadata = RoomMetadata {
            title: config.title.clone(),
            mode: config.mode.clone(),
            blue: 0,
            red: 0,
            map_path: map_path.into(),
        };

        tracing::info!(
            seed,
            cols = grid.bounds.cols,
            rows = grid.bounds.rows,
            minerals = minerals.len(),
            map = %metadata.map_path,
            "Room created"
        );

        Self {
            grid,
            config,
            agents: AgentRegistry::new(),
            minerals,
            sessions: BTreeMap::new(),
            tick: 0,
            clock_ms: 0,
            phase: Phase::Lobby,
            outcome: None,
            minerals_collected: 0,
            seed,
            rng,
            metadata,
            recording: None,
        }
    }

    /// Get the current tick number.
    #[must_use]
    pub const fn get_tick(&self) -> u64 {
        self.tick
    }

    /// Room clock in milliseconds.
    #[must_use]
    pub const fn clock_ms(&self) -> u64 {
        self.clock_ms
    }

    /// Current phase.
    #[must_use]
    pub const fn phase(&self) -> Phase {
        self.phase
    }

    /// Result once the match has ended.
    #[must_use]
    pub const fn outcome(&self) -> Option<GameOver> {
        self.outcome
    }

    /// Minerals completed so far.
    #[must_use]
    pub const fn minerals_collected(&self) -> u32 {
        self.minerals_collected
    }

    /// Seed the room was created with.
    #[must_use]
    pub const fn seed(&self) -> u64 {
        self.seed
    }

    /// The grid.
    #[must_use]
    pub fn grid(&self) -> &HexGridConfig {
        &self.grid
    }

    /// The configuration.
    #[must_use]
    pub fn config(&self) -> &RoomConfig {
        &self.config
    }

    /// All agents.
    #[must_use]
    pub fn agents(&self) -> &AgentRegistry {
        &self.agents
    }

    /// Look up an agent.
    #[must_use]
    pub fn agent(&self, id: EntityId) -> Option<&Agent> {
        self.agents.get(id)
    }

    /// All minerals.
    #[must_use]
    pub fn minerals(&self) -> &[Mineral] {
        self.minerals.as_slice()
    }

    /// Look up a mineral.
    #[must_use]
    pub fn mineral(&self, id: MineralId) -> Option<&Mineral> {
        self.minerals.get(id)
    }

    /// Directory metadata.
    #[must_use]
    pub fn metadata(&self) -> &RoomMetadata {
        &self.metadata
    }

    /// Number of joined clients.
    #[must_use]
    pub fn client_count(&self) -> usize {
        self.sessions.len()
    }

    /// Agent controlled by a session.
    #[must_use]
    pub fn session_agent(&self, session: &str) -> Option<EntityId> {
        self.sessions.get(session).copied()
    }

    /// Leave the lobby: spawn agents and begin ticking.
    ///
    /// Returns false if the room was already started.
    pub fn start(&mut self) -> bool {
        if self.phase != Phase::Lobby {
            return false;
        }
        self.record(ReplayAction::Start);
        self.spawn_agents();
        self.phase = Phase::Active;
        self.refresh_metadata();
        tracing::info!(
            agents = self.agents.len(),
            blue = self.metadata.blue,
            red = self.metadata.red,
            "Room started"
        );
        true
    }

    fn spawn_agents(&mut self) {
        let hunters = self.config.hunter_count;
        let pool_size = self.config.role_pool_size.max(hunters).max(1);
        let mut pool: Vec<Archetype> = (0..pool_size)
            .map(|i| {
                if i < hunters {
                    Archetype::Hunter
                } else {
                    Archetype::Gatherer
                }
            })
            .collect();
        pool.shuffle(&mut self.rng);

        for i in 0..self.config.agent_count {
            let archetype = pool[i % pool.len()];
            self.place_agent(archetype, Offset::new(i as i32, 0).to_axial());
        }
    }

    /// Place an extra participant on a walkable cell.
    ///
    /// Hunters start with the initial elimination cooldown, like spawned
    /// ones.
    ///
    /// # Errors
    ///
    /// Returns [`GameError::InvalidState`] if the cell is blocked or
    /// outside the grid.
    pub fn spawn_agent(&mut self, archetype: Archetype, hex: Hex) -> Result<EntityId> {
        if !self.grid.is_walkable(hex) {
            return Err(GameError::InvalidState(format!(
                "cannot spawn on cell {hex}"
            )));
        }
        self.record(ReplayAction::Spawn { archetype, hex });
        let id = self.place_agent(archetype, hex);
        self.refresh_metadata();
        Ok(id)
    }

    fn place_agent(&mut self, archetype: Archetype, hex: Hex) -> EntityId {
        let id = self.agents.allocate_id();
        let mut agent = Agent::participant(id, archetype, hex, self.grid.tile_size);
        if archetype == Archetype::Hunter {
            agent
                .cooldowns
                .trigger(Ability::Eliminate, self.config.initial_elimination_cooldown_ms);
        }
        tracing::debug!(id, ?archetype, %hex, "Spawned agent");
        self.agents.insert(agent)
    }

    /// Attach a client.
    ///
    /// The client takes over the first participant nobody controls yet;
    /// if there is none it joins as an observer. Joining twice returns the
    /// same agent.
    ///
    /// # Errors
    ///
    /// Returns [`GameError::InvalidState`] if the room is full.
    pub fn join(&mut self, session: &str) -> Result<EntityId> {
        if let Some(&id) = self.sessions.get(session) {
            return Ok(id);
        }
        if self.sessions.len() >= self.config.max_clients {
            return Err(GameError::InvalidState(format!(
                "room is full ({} clients)",
                self.config.max_clients
            )));
        }
        self.record(ReplayAction::Join(session.to_string()));

        let free = self
            .agents
            .iter_sorted()
            .find(|a| a.role == Role::Participant && a.controller.is_none())
            .map(|a| a.id);

        let id = if let Some(id) = free.and_then(|id| self.agents.get_mut(id)).map(|agent| {
            agent.controller = Some(session.to_string());
            agent.id
        }) {
            id
        } else {
            let id = self.agents.allocate_id();
            self.agents.insert(Agent::observer(id, session));
            id
        };

        self.sessions.insert(session.to_string(), id);
        self.refresh_metadata();
        tracing::info!(session, agent = id, clients = self.sessions.len(), "Client joined");
        Ok(id)
    }

    /// Detach a client.
    ///
    /// Observers are removed. A controlled participant is stopped (its
    /// claim released) and becomes available to the next client.
    pub fn leave(&mut self, session: &str) -> Option<EntityId> {
        if !self.sessions.contains_key(session) {
            return None;
        }
        self.record(ReplayAction::Leave(session.to_string()));
        let id = self.sessions.remove(session)?;

        match self.agents.get(id).map(|a| a.role) {
            Some(Role::Observer) => {
                self.agents.remove(id);
            }
            Some(Role::Participant) => {
                self.release_claim(id);
                let tile = self.grid.tile_size;
                if let Some(agent) = self.agents.get_mut(id) {
                    if agent.alive {
                        agent.halt(tile);
                    }
                    agent.controller = None;
                }
            }
            None => {}
        }

        self.refresh_metadata();
        tracing::info!(session, agent = id, clients = self.sessions.len(), "Client left");
        Some(id)
    }

    fn refresh_metadata(&mut self) {
        self.metadata.blue = self.agents.count_team(Team::Blue);
        self.metadata.red = self.agents.count_team(Team::Red);
    }

    /// Apply a command for the agent a session controls.
    pub fn apply_session_command(&mut self, session: &str, command: Command) -> CommandOutcome {
        match self.sessions.get(session).copied() {
            Some(id) => self.apply_command(id, command),
            None => {
                tracing::debug!(session, ?command, "Command from unknown session");
                CommandOutcome::Ignored(IgnoreReason::UnknownAgent)
            }
        }
    }

    /// Apply a command immediately.
    ///
    /// Invalid commands never fail; they are reported as
    /// [`CommandOutcome::Ignored`] and logged at debug level.
    pub fn apply_command(&mut self, entity: EntityId, command: Command) -> CommandOutcome {
        self.record(ReplayAction::Command { entity, command });

        let outcome = if self.phase == Phase::Active {
            match command {
                Command::Move(target) => self.execute_move(entity, target.to_hex()),
                Command::Stop => self.execute_stop(entity),
                Command::Eliminate { target } => self.execute_eliminate(entity, target),
            }
        } else {
            CommandOutcome::Ignored(IgnoreReason::NotActive)
        };

        if let CommandOutcome::Ignored(reason) = outcome {
            tracing::debug!(entity, ?command, ?reason, "Command ignored");
        }
        outcome
    }

    fn check_actor(&self, entity: EntityId) -> std::result::Result<&Agent, IgnoreReason> {
        let agent = self.agents.get(entity).ok_or(IgnoreReason::UnknownAgent)?;
        if agent.role == Role::Observer {
            return Err(IgnoreReason::Observer);
        }
        if !agent.alive {
            return Err(IgnoreReason::NotAlive);
        }
        Ok(agent)
    }

    /// Cancel the agent's claim, if any, and drop out of gathering.
    fn release_claim(&mut self, entity: EntityId) {
        let Some(agent) = self.agents.get_mut(entity) else {
            return;
        };
        if let Some(mineral) = agent.claim.take() {
            self.minerals.cancel_claim(mineral, entity);
        }
        if agent.state == AgentState::Gathering {
            agent.state = AgentState::Idle;
        }
    }

    fn execute_move(&mut self, entity: EntityId, goal: Hex) -> CommandOutcome {
        let start = match self.check_actor(entity) {
            Ok(agent) => agent.hex,
            Err(reason) => return CommandOutcome::Ignored(reason),
        };

        let path = match find_path(start, goal, &self.grid, self.grid.bounds) {
            Ok(path) => path,
            Err(e) => {
                tracing::debug!(entity, "Move rejected: {e}");
                return CommandOutcome::Ignored(IgnoreReason::Unreachable);
            }
        };
        if path.is_empty() {
            return CommandOutcome::Ignored(IgnoreReason::AlreadyThere);
        }
        // Only a move that will be applied gives up the current claim.
        self.release_claim(entity);

        match self.agents.get_mut(entity) {
            Some(agent) => {
                agent.begin_path(path);
                CommandOutcome::Applied
            }
            None => CommandOutcome::Ignored(IgnoreReason::UnknownAgent),
        }
    }

    fn execute_stop(&mut self, entity: EntityId) -> CommandOutcome {
        if let Err(reason) = self.check_actor(entity) {
            return CommandOutcome::Ignored(reason);
        }
        self.release_claim(entity);
        let tile = self.grid.tile_size;
        match self.agents.get_mut(entity) {
            Some(agent) => {
                agent.halt(tile);
                CommandOutcome::Applied
            }
            None => CommandOutcome::Ignored(IgnoreReason::UnknownAgent),
        }
    }

    fn execute_eliminate(&mut self, actor_id: EntityId, target_id: EntityId) -> CommandOutcome {
        let actor_hex = match self.check_actor(actor_id) {
            Ok(actor) if actor.archetype != Archetype::Hunter => {
                return CommandOutcome::Ignored(IgnoreReason::NotHunter)
            }
            Ok(actor) if !actor.cooldowns.is_ready(Ability::Eliminate) => {
                return CommandOutcome::Ignored(IgnoreReason::OnCooldown)
            }
            Ok(actor) => actor.hex,
            Err(reason) => return CommandOutcome::Ignored(reason),
        };

        let target_hex = match self.agents.get(target_id) {
            Some(target)
                if target_id != actor_id
                    && target.is_active()
                    && target.archetype == Archetype::Gatherer =>
            {
                target.hex
            }
            _ => return CommandOutcome::Ignored(IgnoreReason::InvalidTarget),
        };
        if actor_hex.distance(target_hex) > self.config.elimination_range {
            return CommandOutcome::Ignored(IgnoreReason::OutOfRange);
        }

        if let Some(mineral) = self.agents.get_mut(target_id).and_then(Agent::eliminate) {
            self.minerals.cancel_claim(mineral, target_id);
        }
        if let Some(actor) = self.agents.get_mut(actor_id) {
            actor
                .cooldowns
                .trigger(Ability::Eliminate, self.config.elimination_cooldown_ms);
        }

        tracing::info!(hunter = actor_id, target = target_id, "Agent eliminated");
        CommandOutcome::Applied
    }

    /// Advance the room by one tick.
    ///
    /// The tick counter always increments; everything else only happens
    /// while the room is active.
    pub fn tick(&mut self) -> TickEvents {
        self.tick += 1;
        let mut events = TickEvents {
            tick: self.tick,
            ..TickEvents::default()
        };
        if self.phase != Phase::Active {
            return events;
        }

        let elapsed = self.config.tick_interval_ms;
        self.clock_ms += u64::from(elapsed);
        events.respawned = self.minerals.respawn_sweep(self.clock_ms, &mut self.rng);

        for id in self.agents.sorted_ids() {
            let state = match self.agents.get_mut(id) {
                Some(agent) if agent.alive => {
                    agent.cooldowns.tick(elapsed);
                    agent.state
                }
                _ => continue,
            };

            match state {
                AgentState::Moving => self.run_movement(id, elapsed, &mut events),
                AgentState::Gathering => self.run_gathering(id, elapsed, &mut events),
                AgentState::Idle | AgentState::Eliminated => {}
            }
        }

        self.minerals.enforce_invariants();

        #[cfg(feature = "debug-validation")]
        self.assert_agents_on_cells();

        if let Some(over) = self.check_win() {
            self.phase = Phase::Ended;
            self.outcome = Some(over);
            events.game_over = Some(over);
            tracing::info!(
                tick = self.tick,
                winner = ?over.winner,
                reason = ?over.reason,
                minerals = self.minerals_collected,
                "Game over"
            );
        }

        events
    }

    fn run_movement(&mut self, id: EntityId, elapsed: u32, events: &mut TickEvents) {
        let speed = self.config.move_speed();
        let tile = self.grid.tile_size;
        let Some(agent) = self.agents.get_mut(id) else {
            return;
        };
        if agent.advance_movement(elapsed, speed, tile) != MovementStep::Arrived {
            return;
        }

        if let Some(mineral) = self.minerals.try_claim(agent.hex, id, &mut self.rng) {
            agent.claim = Some(mineral);
            agent.state = AgentState::Gathering;
            events.claimed.push((id, mineral));
            tracing::debug!(agent = id, %mineral, "Claimed mineral");
        }
    }

    fn run_gathering(&mut self, id: EntityId, elapsed: u32, events: &mut TickEvents) {
        let now = self.clock_ms;
        let Some(agent) = self.agents.get_mut(id) else {
            return;
        };
        let Some(mineral_id) = agent.claim else {
            agent.state = AgentState::Idle;
            return;
        };

        let valid = self
            .minerals
            .get(mineral_id)
            .is_some_and(|m| !m.done && m.locked_by == Some(id) && m.hex == agent.hex);
        if !valid {
            self.minerals.cancel_claim(mineral_id, id);
            agent.claim = None;
            agent.state = AgentState::Idle;
            tracing::debug!(agent = id, mineral = %mineral_id, "Claim invalidated");
            return;
        }

        match self.minerals.add_work(mineral_id, id, elapsed, now) {
            WorkOutcome::Progress => {}
            WorkOutcome::Completed => {
                self.minerals_collected += 1;
                agent.claim = None;
                agent.state = AgentState::Idle;
                events.completed.push(MineralCompleted {
                    mineral: mineral_id,
                    agent: id,
                });
                tracing::debug!(
                    agent = id,
                    mineral = %mineral_id,
                    collected = self.minerals_collected,
                    "Mineral completed"
                );
            }
            WorkOutcome::Rejected => {
                agent.claim = None;
                agent.state = AgentState::Idle;
            }
        }
    }

    #[cfg(feature = "debug-validation")]
    fn assert_agents_on_cells(&self) {
        use crate::hex::axial_to_pixel;
        use crate::math::Vec2Fixed;

        for agent in self.agents.iter_sorted() {
            if agent.is_active() && agent.state != AgentState::Moving {
                debug_assert_eq!(
                    agent.pixel,
                    axial_to_pixel(agent.hex, self.grid.tile_size, Vec2Fixed::ZERO),
                    "agent {} is off its cell while {:?}",
                    agent.id,
                    agent.state
                );
            }
        }
    }

    fn check_win(&self) -> Option<GameOver> {
        if self.minerals_collected >= self.config.minerals_to_win {
            return Some(GameOver {
                winner: Team::Blue,
                reason: WinReason::MineralsCollected,
            });
        }

        for team in [Team::Blue, Team::Red] {
            let mut members = self
                .agents
                .iter_sorted()
                .filter(|a| a.role == Role::Participant && a.team == team)
                .peekable();
            if members.peek().is_none() {
                continue;
            }
            if members.all(|a| !a.alive) {
                return team.opponent().map(|winner| GameOver {
                    winner,
                    reason: WinReason::TeamEliminated,
                });
            }
        }

        None
    }

    /// Full read-only view of the room.
    #[must_use]
    pub fn snapshot(&self) -> RoomSnapshot {
        RoomSnapshot {
            tick: self.tick,
            clock_ms: self.clock_ms,
            phase: self.phase,
            winner: self.outcome.map(|o| o.winner),
            reason: self.outcome.map(|o| o.reason),
            minerals_collected: self.minerals_collected,
            agents: self.agents.iter_sorted().cloned().collect(),
            minerals: self.minerals.as_slice().to_vec(),
        }
    }

    /// Region definitions and cell assignments.
    #[must_use]
    pub fn region_listing(&self) -> RegionListing {
        RegionListing::from_grid(&self.grid)
    }

    /// Calculate a hash of the current room state.
    ///
    /// Two rooms with identical state produce identical hashes. Session
    /// bookkeeping is excluded.
    #[must_use]
    pub fn state_hash(&self) -> u64 {
        let mut hasher = DefaultHasher::new();

        self.tick.hash(&mut hasher);
        self.clock_ms.hash(&mut hasher);
        self.phase.hash(&mut hasher);
        self.outcome.hash(&mut hasher);
        self.minerals_collected.hash(&mut hasher);

        let ids = self.agents.sorted_ids();
        ids.len().hash(&mut hasher);
        for agent in self.agents.iter_sorted() {
            agent.id.hash(&mut hasher);
            agent.team.hash(&mut hasher);
            agent.archetype.hash(&mut hasher);
            agent.hex.hash(&mut hasher);
            agent.pixel.x.to_bits().hash(&mut hasher);
            agent.pixel.y.to_bits().hash(&mut hasher);
            agent.state.hash(&mut hasher);
            agent.step_target.hash(&mut hasher);
            agent.waypoints.hash(&mut hasher);
            agent.cooldowns.hash(&mut hasher);
            agent.alive.hash(&mut hasher);
            agent.claim.hash(&mut hasher);
        }

        for mineral in self.minerals.as_slice() {
            mineral.hash(&mut hasher);
        }

        hasher.finish()
    }

    /// Start recording a replay of this room.
    ///
    /// Must be called before [`start`](Self::start) for the replay to
    /// reproduce the room; later calls are ignored.
    pub fn start_recording(&mut self) {
        if self.phase != Phase::Lobby || self.tick != 0 || self.recording.is_some() {
            tracing::warn!("Recording can only begin in a fresh lobby");
            return;
        }
        self.recording = Some(Replay::new(
            self.metadata.map_path.clone(),
            self.seed,
            self.grid.clone(),
            self.config.clone(),
        ));
    }

    /// Stop recording and return the finalized replay.
    pub fn take_replay(&mut self) -> Option<Replay> {
        let mut replay = self.recording.take()?;
        replay.finalize(self.tick, self.state_hash());
        Some(replay)
    }

    fn record(&mut self, action: ReplayAction) {
        if let Some(replay) = self.recording.as_mut() {
            replay.record(self.tick, action);
        }
    }
}
