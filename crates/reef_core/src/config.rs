//! Per-room tuning.
//!
//! All durations are in milliseconds of room clock. Every field has a
//! default, so partial RON/JSON configs are accepted.

use serde::{Deserialize, Serialize};

use crate::error::{GameError, Result};
use crate::math::Fixed;

/// What happens to a mineral's progress when its holder abandons it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum AbandonPolicy {
    /// Accumulated work is lost.
    #[default]
    Forfeit,
    /// Accumulated work stays on the node for the next holder.
    KeepProgress,
}

/// Room simulation parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RoomConfig {
    /// Fixed tick interval.
    pub tick_interval_ms: u32,
    /// Movement speed in pixels per second of room clock.
    pub move_speed_px_per_sec: u32,
    /// Lower bound of a mineral's randomized required work.
    pub min_work_ms: u32,
    /// Upper bound (inclusive) of a mineral's randomized required work.
    pub max_work_ms: u32,
    /// Delay between a mineral completing and becoming claimable again.
    pub respawn_delay_ms: u64,
    /// Cooldown applied after a successful elimination.
    pub elimination_cooldown_ms: u32,
    /// Cooldown hunters start the match with.
    pub initial_elimination_cooldown_ms: u32,
    /// Maximum hex distance between hunter and target.
    pub elimination_range: u32,
    /// Completed minerals needed for the gatherers to win.
    pub minerals_to_win: u32,
    /// Share of ground cells turned into minerals on maps without any.
    pub fallback_mineral_ratio: f64,
    /// Agents spawned when the room starts.
    pub agent_count: usize,
    /// Hunters in the shuffled role pool.
    pub hunter_count: usize,
    /// Total size of the shuffled role pool (hunters plus gatherers).
    pub role_pool_size: usize,
    /// Claim abandonment behavior.
    pub abandon_policy: AbandonPolicy,
    /// Maximum connected clients.
    pub max_clients: usize,
    /// Directory title.
    pub title: String,
    /// Directory mode tag.
    pub mode: String,
}

impl Default for RoomConfig {
    fn default() -> Self {
        Self {
            tick_interval_ms: 200,
            move_speed_px_per_sec: 100,
            min_work_ms: 2000,
            max_work_ms: 6000,
            respawn_delay_ms: 30_000,
            elimination_cooldown_ms: 25_000,
            initial_elimination_cooldown_ms: 10_000,
            elimination_range: 1,
            minerals_to_win: 21,
            fallback_mineral_ratio: 0.06,
            agent_count: 8,
            hunter_count: 2,
            role_pool_size: 10,
            abandon_policy: AbandonPolicy::Forfeit,
            max_clients: 256,
            title: "Reef Arena".to_string(),
            mode: "standard".to_string(),
        }
    }
}

impl RoomConfig {
    /// Movement speed in pixels per millisecond.
    #[must_use]
    pub fn move_speed(&self) -> Fixed {
        Fixed::from_num(self.move_speed_px_per_sec) / Fixed::from_num(1000)
    }

    /// Check the config for contradictory values.
    ///
    /// # Errors
    ///
    /// Returns [`GameError::InvalidState`] naming the offending field.
    pub fn validate(&self) -> Result<()> {
        if self.tick_interval_ms == 0 {
            return Err(GameError::InvalidState(
                "tick_interval_ms must be positive".into(),
            ));
        }
        if self.min_work_ms > self.max_work_ms {
            return Err(GameError::InvalidState(format!(
                "min_work_ms ({}) exceeds max_work_ms ({})",
                self.min_work_ms, self.max_work_ms
            )));
        }
        if self.hunter_count > self.role_pool_size {
            return Err(GameError::InvalidState(format!(
                "hunter_count ({}) exceeds role_pool_size ({})",
                self.hunter_count, self.role_pool_size
            )));
        }
        if !(0.0..=1.0).contains(&self.fallback_mineral_ratio) {
            return Err(GameError::InvalidState(format!(
                "fallback_mineral_ratio must be within 0..=1, got {}",
                self.fallback_mineral_ratio
            )));
        }
        Ok(())
    }
}
