//! Read-only views of room state for broadcast.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::agents::{Agent, EntityId, Team};
use crate::map::{HexGridConfig, RegionDef};
use crate::minerals::Mineral;
use crate::simulation::{Phase, WinReason};

/// Full room state at one tick.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoomSnapshot {
    /// Tick counter.
    pub tick: u64,
    /// Room clock.
    pub clock_ms: u64,
    /// Match phase.
    pub phase: Phase,
    /// Winning team once ended.
    pub winner: Option<Team>,
    /// Why the match ended.
    pub reason: Option<WinReason>,
    /// Minerals completed so far.
    pub minerals_collected: u32,
    /// Agents in ascending ID order.
    pub agents: Vec<Agent>,
    /// Minerals in ID order.
    pub minerals: Vec<Mineral>,
}

/// Changes between two snapshots.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SnapshotDelta {
    /// Tick of the newer snapshot.
    pub tick: u64,
    /// Room clock of the newer snapshot.
    pub clock_ms: u64,
    /// Match phase.
    pub phase: Phase,
    /// Winning team once ended.
    pub winner: Option<Team>,
    /// Why the match ended.
    pub reason: Option<WinReason>,
    /// Minerals completed so far.
    pub minerals_collected: u32,
    /// Agents that are new or differ from the older snapshot.
    pub changed_agents: Vec<Agent>,
    /// Agents present before but gone now.
    pub removed_agents: Vec<EntityId>,
    /// Minerals that differ from the older snapshot.
    pub changed_minerals: Vec<Mineral>,
}

impl RoomSnapshot {
    /// Look up an agent.
    #[must_use]
    pub fn agent(&self, id: EntityId) -> Option<&Agent> {
        self.agents
            .binary_search_by_key(&id, |a| a.id)
            .ok()
            .map(|i| &self.agents[i])
    }

    /// Compute what changed since `previous`.
    #[must_use]
    pub fn delta_since(&self, previous: &Self) -> SnapshotDelta {
        let before: BTreeMap<EntityId, &Agent> =
            previous.agents.iter().map(|a| (a.id, a)).collect();
        let current: BTreeSet<EntityId> = self.agents.iter().map(|a| a.id).collect();

        let changed_agents = self
            .agents
            .iter()
            .filter(|a| before.get(&a.id).map_or(true, |old| *old != *a))
            .cloned()
            .collect();
        let removed_agents = before
            .keys()
            .copied()
            .filter(|id| !current.contains(id))
            .collect();

        let old_minerals: BTreeMap<_, _> = previous.minerals.iter().map(|m| (m.id, m)).collect();
        let changed_minerals = self
            .minerals
            .iter()
            .filter(|m| old_minerals.get(&m.id).map_or(true, |old| *old != *m))
            .cloned()
            .collect();

        SnapshotDelta {
            tick: self.tick,
            clock_ms: self.clock_ms,
            phase: self.phase,
            winner: self.winner,
            reason: self.reason,
            minerals_collected: self.minerals_collected,
            changed_agents,
            removed_agents,
            changed_minerals,
        }
    }
}

impl SnapshotDelta {
    /// Returns true if no agent or mineral changed.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.changed_agents.is_empty()
            && self.removed_agents.is_empty()
            && self.changed_minerals.is_empty()
    }

    /// Bring an older snapshot up to date.
    pub fn apply_to(&self, snapshot: &mut RoomSnapshot) {
        snapshot.tick = self.tick;
        snapshot.clock_ms = self.clock_ms;
        snapshot.phase = self.phase;
        snapshot.winner = self.winner;
        snapshot.reason = self.reason;
        snapshot.minerals_collected = self.minerals_collected;

        snapshot
            .agents
            .retain(|a| !self.removed_agents.contains(&a.id));
        for agent in &self.changed_agents {
            match snapshot.agents.binary_search_by_key(&agent.id, |a| a.id) {
                Ok(i) => snapshot.agents[i] = agent.clone(),
                Err(i) => snapshot.agents.insert(i, agent.clone()),
            }
        }

        for mineral in &self.changed_minerals {
            match snapshot.minerals.binary_search_by_key(&mineral.id, |m| m.id) {
                Ok(i) => snapshot.minerals[i] = mineral.clone(),
                Err(i) => snapshot.minerals.insert(i, mineral.clone()),
            }
        }
    }
}

/// Region definitions plus the cell → region mapping keyed `"q,r"`.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct RegionListing {
    /// Region definitions.
    pub defs: Vec<RegionDef>,
    /// Region id per cell.
    pub map: BTreeMap<String, u32>,
}

impl RegionListing {
    /// Build the listing for a grid.
    #[must_use]
    pub fn from_grid(grid: &HexGridConfig) -> Self {
        Self {
            defs: grid.region_defs.clone(),
            map: grid
                .regions
                .iter()
                .map(|(hex, id)| (hex.to_string(), *id))
                .collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agents::Archetype;
    use crate::hex::Hex;
    use crate::math::Fixed;

    fn agent(id: EntityId, q: i32) -> Agent {
        Agent::participant(id, Archetype::Gatherer, Hex::new(q, 0), Fixed::from_num(30))
    }

    fn snapshot(agents: Vec<Agent>) -> RoomSnapshot {
        RoomSnapshot {
            tick: 0,
            clock_ms: 0,
            phase: Phase::Active,
            winner: None,
            reason: None,
            minerals_collected: 0,
            agents,
            minerals: Vec::new(),
        }
    }

    #[test]
    fn test_identical_snapshots_have_empty_delta() {
        let a = snapshot(vec![agent(1, 0), agent(2, 1)]);
        assert!(a.delta_since(&a).is_empty());
    }

    #[test]
    fn test_delta_reports_changes_and_removals() {
        let old = snapshot(vec![agent(1, 0), agent(2, 1), agent(3, 2)]);
        let mut new = snapshot(vec![agent(1, 0), agent(3, 5), agent(4, 6)]);
        new.tick = 1;

        let delta = new.delta_since(&old);
        let changed: Vec<_> = delta.changed_agents.iter().map(|a| a.id).collect();
        assert_eq!(changed, vec![3, 4]);
        assert_eq!(delta.removed_agents, vec![2]);

        let mut patched = old.clone();
        delta.apply_to(&mut patched);
        assert_eq!(patched, new);
    }

    #[test]
    fn test_region_listing_keys() {
        let mut grid = HexGridConfig::open(4, 4, 30, "Red");
        grid.regions.insert(Hex::new(-1, 2), 3);
        let listing = RegionListing::from_grid(&grid);
        assert_eq!(listing.map.get("-1,2"), Some(&3));
    }
}
