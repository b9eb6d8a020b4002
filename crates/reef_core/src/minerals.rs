//! Mineral lifecycle: exclusive claims, work progress and timed respawn.
//!
//! A mineral is either available, claimed by exactly one agent, or done
//! and waiting for its respawn time. All mutation happens through
//! [`MineralField`], which the owning room drives once per tick.

use std::fmt;

use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::agents::EntityId;
use crate::config::{AbandonPolicy, RoomConfig};
use crate::hex::{axial_to_pixel, Hex};
use crate::map::HexGridConfig;
use crate::math::Vec2Fixed;

/// Mineral identifier, rendered as `M<n>`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub struct MineralId(pub u32);

impl fmt::Display for MineralId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "M{}", self.0)
    }
}

impl From<MineralId> for String {
    fn from(id: MineralId) -> Self {
        id.to_string()
    }
}

impl TryFrom<String> for MineralId {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value
            .strip_prefix('M')
            .and_then(|n| n.parse().ok())
            .map(MineralId)
            .ok_or_else(|| format!("invalid mineral id '{value}'"))
    }
}

/// Cosmetic mineral kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MineralKind {
    /// Iron.
    Iron,
    /// Gold.
    Gold,
    /// Diamond.
    Diamond,
    /// Coal.
    Coal,
    /// Emerald.
    Emerald,
}

impl MineralKind {
    /// Kinds in round-robin assignment order.
    pub const ALL: [Self; 5] = [
        Self::Iron,
        Self::Gold,
        Self::Diamond,
        Self::Coal,
        Self::Emerald,
    ];

    /// Kind assigned to the `index`-th spawn cell.
    #[must_use]
    pub const fn for_index(index: usize) -> Self {
        Self::ALL[index % Self::ALL.len()]
    }
}

/// A depletable resource node.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Mineral {
    /// Identifier.
    pub id: MineralId,
    /// Cosmetic kind.
    pub kind: MineralKind,
    /// Cosmetic difficulty, 1..=3.
    pub difficulty: u8,
    /// Cell.
    pub hex: Hex,
    /// Pixel position of the cell center.
    pub pixel: Vec2Fixed,
    /// Completed and waiting to respawn.
    pub done: bool,
    /// Agent that completed it.
    pub done_by: Option<EntityId>,
    /// Accumulated work.
    pub work: u32,
    /// Work needed to complete.
    pub required_work: u32,
    /// Current claim holder.
    pub locked_by: Option<EntityId>,
    /// Room-clock time at which it becomes available again.
    pub respawn_at: Option<u64>,
}

impl Mineral {
    /// Returns true if a new claim would be accepted.
    #[must_use]
    pub const fn is_claimable(&self) -> bool {
        !self.done && self.locked_by.is_none()
    }
}

/// Result of adding work to a claimed mineral.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkOutcome {
    /// Work added; not yet complete.
    Progress,
    /// Work reached the requirement. The claim is released.
    Completed,
    /// The caller does not hold a valid claim; nothing changed.
    Rejected,
}

/// All minerals of one room.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MineralField {
    minerals: Vec<Mineral>,
    min_work_ms: u32,
    max_work_ms: u32,
    respawn_delay_ms: u64,
    policy: AbandonPolicy,
}

impl MineralField {
    /// Place one mineral on each spawn cell of the grid.
    pub fn new<R: Rng + ?Sized>(grid: &HexGridConfig, config: &RoomConfig, rng: &mut R) -> Self {
        let mut field = Self {
            minerals: Vec::with_capacity(grid.mineral_spawns.len()),
            min_work_ms: config.min_work_ms,
            max_work_ms: config.max_work_ms.max(config.min_work_ms),
            respawn_delay_ms: config.respawn_delay_ms,
            policy: config.abandon_policy,
        };

        for (i, &hex) in grid.mineral_spawns.iter().enumerate() {
            let required_work = field.random_work(rng);
            field.minerals.push(Mineral {
                id: MineralId(i as u32 + 1),
                kind: MineralKind::for_index(i),
                difficulty: 1 + (i % 3) as u8,
                hex,
                pixel: axial_to_pixel(hex, grid.tile_size, Vec2Fixed::ZERO),
                done: false,
                done_by: None,
                work: 0,
                required_work,
                locked_by: None,
                respawn_at: None,
            });
        }

        field
    }

    fn random_work<R: Rng + ?Sized>(&self, rng: &mut R) -> u32 {
        rng.gen_range(self.min_work_ms..=self.max_work_ms)
    }

    /// Number of minerals.
    #[must_use]
    pub fn len(&self) -> usize {
        self.minerals.len()
    }

    /// Returns true if the room has no minerals.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.minerals.is_empty()
    }

    /// All minerals in id order.
    #[must_use]
    pub fn as_slice(&self) -> &[Mineral] {
        &self.minerals
    }

    /// Look up a mineral by id.
    #[must_use]
    pub fn get(&self, id: MineralId) -> Option<&Mineral> {
        let index = (id.0 as usize).checked_sub(1)?;
        self.minerals.get(index).filter(|m| m.id == id)
    }

    fn get_mut(&mut self, id: MineralId) -> Option<&mut Mineral> {
        let index = (id.0 as usize).checked_sub(1)?;
        self.minerals.get_mut(index).filter(|m| m.id == id)
    }

    /// The mineral on a cell, if any.
    #[must_use]
    pub fn find_at(&self, hex: Hex) -> Option<&Mineral> {
        self.minerals.iter().find(|m| m.hex == hex)
    }

    /// Claim the mineral on `hex` for `agent`.
    ///
    /// Succeeds only if the node is neither done nor locked. A successful
    /// claim resets work and draws a fresh requirement.
    pub fn try_claim<R: Rng + ?Sized>(
        &mut self,
        hex: Hex,
        agent: EntityId,
        rng: &mut R,
    ) -> Option<MineralId> {
        let index = self.minerals.iter().position(|m| m.hex == hex)?;
        if !self.minerals[index].is_claimable() {
            return None;
        }
        let required_work = self.random_work(rng);
        let mineral = &mut self.minerals[index];
        mineral.locked_by = Some(agent);
        mineral.work = 0;
        mineral.required_work = required_work;
        Some(mineral.id)
    }

    /// Add `elapsed_ms` of work from the claim holder.
    ///
    /// On completion the node is marked done, the claim is released and
    /// the respawn is scheduled `respawn_delay_ms` after `now_ms`.
    pub fn add_work(
        &mut self,
        id: MineralId,
        agent: EntityId,
        elapsed_ms: u32,
        now_ms: u64,
    ) -> WorkOutcome {
        let respawn_delay = self.respawn_delay_ms;
        let Some(mineral) = self.get_mut(id) else {
            return WorkOutcome::Rejected;
        };
        if mineral.done || mineral.locked_by != Some(agent) {
            return WorkOutcome::Rejected;
        }

        mineral.work = mineral
            .work
            .saturating_add(elapsed_ms)
            .min(mineral.required_work);

        if mineral.work >= mineral.required_work {
            mineral.done = true;
            mineral.done_by = Some(agent);
            mineral.locked_by = None;
            mineral.respawn_at = Some(now_ms + respawn_delay);
            WorkOutcome::Completed
        } else {
            WorkOutcome::Progress
        }
    }

    /// Release `agent`'s claim on a mineral without completing it.
    ///
    /// Work is reset or kept according to the abandonment policy. Returns
    /// true if a claim was actually released.
    pub fn cancel_claim(&mut self, id: MineralId, agent: EntityId) -> bool {
        let policy = self.policy;
        let Some(mineral) = self.get_mut(id) else {
            return false;
        };
        if mineral.done || mineral.locked_by != Some(agent) {
            return false;
        }
        mineral.locked_by = None;
        if policy == AbandonPolicy::Forfeit {
            mineral.work = 0;
        }
        true
    }

    /// Return every done mineral whose respawn time has passed to the
    /// claimable pool.
    pub fn respawn_sweep<R: Rng + ?Sized>(&mut self, now_ms: u64, rng: &mut R) -> Vec<MineralId> {
        let mut respawned = Vec::new();
        for index in 0..self.minerals.len() {
            let due = {
                let m = &self.minerals[index];
                m.done && m.respawn_at.is_some_and(|at| now_ms >= at)
            };
            if !due {
                continue;
            }
            let required_work = self.random_work(rng);
            let mineral = &mut self.minerals[index];
            mineral.done = false;
            mineral.done_by = None;
            mineral.work = 0;
            mineral.required_work = required_work;
            mineral.locked_by = None;
            mineral.respawn_at = None;
            respawned.push(mineral.id);
        }
        respawned
    }

    /// Repair any node that violates the work or lock invariants.
    ///
    /// Returns the number of nodes that needed repair.
    pub fn enforce_invariants(&mut self) -> usize {
        let mut repaired = 0;
        for mineral in &mut self.minerals {
            let mut broken = false;
            if mineral.work > mineral.required_work {
                tracing::warn!(
                    mineral = %mineral.id,
                    work = mineral.work,
                    required = mineral.required_work,
                    "Mineral work out of range; clamping"
                );
                mineral.work = mineral.required_work;
                broken = true;
            }
            if mineral.done && mineral.locked_by.is_some() {
                tracing::warn!(mineral = %mineral.id, "Done mineral still locked; releasing");
                mineral.locked_by = None;
                broken = true;
            }
            if broken {
                repaired += 1;
            }
        }
        repaired
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn field_with(spawns: Vec<Hex>, config: &RoomConfig) -> (MineralField, StdRng) {
        let mut grid = HexGridConfig::open(10, 10, 30, "Desert");
        grid.mineral_spawns = spawns;
        let mut rng = StdRng::seed_from_u64(3);
        (MineralField::new(&grid, config, &mut rng), rng)
    }

    fn single() -> (MineralField, StdRng) {
        field_with(vec![Hex::new(2, 2)], &RoomConfig::default())
    }

    #[test]
    fn test_ids_kinds_and_difficulty() {
        let spawns = (0..7).map(|i| Hex::new(i, 1)).collect();
        let (field, _) = field_with(spawns, &RoomConfig::default());
        let m = field.as_slice();
        assert_eq!(m[0].id.to_string(), "M1");
        assert_eq!(m[0].kind, MineralKind::Iron);
        assert_eq!(m[5].kind, MineralKind::Iron);
        assert_eq!(m[4].kind, MineralKind::Emerald);
        assert_eq!(m[0].difficulty, 1);
        assert_eq!(m[2].difficulty, 3);
        assert_eq!(m[3].difficulty, 1);
        assert!(m.iter().all(|m| (2000..=6000).contains(&m.required_work)));
    }

    #[test]
    fn test_mineral_id_serde() {
        let json = serde_json::to_string(&MineralId(12)).unwrap();
        assert_eq!(json, "\"M12\"");
        let id: MineralId = serde_json::from_str("\"M7\"").unwrap();
        assert_eq!(id, MineralId(7));
        assert!(serde_json::from_str::<MineralId>("\"X7\"").is_err());
    }

    #[test]
    fn test_claim_is_exclusive() {
        let (mut field, mut rng) = single();
        let hex = Hex::new(2, 2);

        let id = field.try_claim(hex, 1, &mut rng).unwrap();
        assert_eq!(field.get(id).unwrap().locked_by, Some(1));
        assert!(field.try_claim(hex, 2, &mut rng).is_none());
        assert_eq!(field.get(id).unwrap().locked_by, Some(1));
        assert!(field.try_claim(Hex::new(0, 0), 2, &mut rng).is_none());
    }

    #[test]
    fn test_work_completion_and_respawn() {
        let (mut field, mut rng) = single();
        let id = field.try_claim(Hex::new(2, 2), 1, &mut rng).unwrap();
        field.minerals[0].required_work = 3000;

        let mut now = 0;
        for _ in 0..14 {
            now += 200;
            assert_eq!(field.add_work(id, 1, 200, now), WorkOutcome::Progress);
        }
        now += 200;
        assert_eq!(field.add_work(id, 1, 200, now), WorkOutcome::Completed);

        let m = field.get(id).unwrap();
        assert!(m.done);
        assert_eq!(m.work, 3000);
        assert_eq!(m.done_by, Some(1));
        assert_eq!(m.locked_by, None);
        assert_eq!(m.respawn_at, Some(3000 + 30_000));

        assert!(field.respawn_sweep(32_999, &mut rng).is_empty());
        assert_eq!(field.respawn_sweep(33_000, &mut rng), vec![id]);
        let m = field.get(id).unwrap();
        assert!(!m.done);
        assert_eq!(m.work, 0);
        assert_eq!(m.respawn_at, None);
        assert!(m.is_claimable());
    }

    #[test]
    fn test_add_work_requires_holder() {
        let (mut field, mut rng) = single();
        let id = field.try_claim(Hex::new(2, 2), 1, &mut rng).unwrap();
        assert_eq!(field.add_work(id, 2, 200, 200), WorkOutcome::Rejected);
        assert_eq!(field.get(id).unwrap().work, 0);
        assert_eq!(field.add_work(MineralId(99), 1, 200, 200), WorkOutcome::Rejected);
    }

    #[test]
    fn test_cancel_claim_forfeits_progress() {
        let (mut field, mut rng) = single();
        let id = field.try_claim(Hex::new(2, 2), 1, &mut rng).unwrap();
        field.add_work(id, 1, 1000, 1000);

        assert!(!field.cancel_claim(id, 2));
        assert!(field.cancel_claim(id, 1));
        let m = field.get(id).unwrap();
        assert_eq!(m.locked_by, None);
        assert_eq!(m.work, 0);
        assert!(!m.done);
    }

    #[test]
    fn test_cancel_claim_keeps_progress() {
        let config = RoomConfig {
            abandon_policy: AbandonPolicy::KeepProgress,
            ..RoomConfig::default()
        };
        let (mut field, mut rng) = field_with(vec![Hex::new(2, 2)], &config);
        let id = field.try_claim(Hex::new(2, 2), 1, &mut rng).unwrap();
        field.add_work(id, 1, 1000, 1000);

        assert!(field.cancel_claim(id, 1));
        assert_eq!(field.get(id).unwrap().work, 1000);
    }

    #[test]
    fn test_enforce_invariants_clamps() {
        let (mut field, _) = single();
        field.minerals[0].work = field.minerals[0].required_work + 500;
        field.minerals[0].done = true;
        field.minerals[0].locked_by = Some(4);

        assert_eq!(field.enforce_invariants(), 1);
        let m = &field.minerals[0];
        assert_eq!(m.work, m.required_work);
        assert_eq!(m.locked_by, None);
        assert_eq!(field.enforce_invariants(), 0);
    }
}
