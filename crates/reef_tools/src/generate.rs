//! Seeded random map generation.
//!
//! Maps are written in the same JSON format the server loads, one
//! directory per biome:
//!
//! ```text
//! <out>/Desert/map1.json
//! <out>/Desert/map2.json
//! <out>/Green/map1.json
//! ...
//! ```

use std::path::{Path, PathBuf};

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use reef_core::error::{GameError, Result};
use reef_core::map::MapDefinition;

/// Biomes a map set is generated for.
pub const BIOMES: [&str; 8] = [
    "Desert", "Green", "Ice", "Lost", "Lunar", "Red", "Swamp", "Volcanic",
];

/// Terrain code written for ground.
pub const CODE_GROUND: u32 = 1;
/// Terrain code written for obstacles.
pub const CODE_OBSTACLE: u32 = 2;
/// Terrain code written for mineral spawns.
pub const CODE_MINERAL: u32 = 3;
/// Terrain code written for traps.
pub const CODE_TRAP: u32 = 4;

/// Generator parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct GeneratorConfig {
    /// Number of columns.
    pub cols: i32,
    /// Number of rows.
    pub rows: i32,
    /// Hex size in pixels.
    pub tile_size: i32,
    /// Share of cells turned into obstacles.
    pub obstacle_ratio: f64,
    /// Share of cells turned into traps.
    pub trap_ratio: f64,
    /// Share of cells turned into mineral spawns.
    pub mineral_ratio: f64,
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        Self {
            cols: 100,
            rows: 100,
            tile_size: 32,
            obstacle_ratio: 0.18,
            trap_ratio: 0.04,
            mineral_ratio: 0.03,
        }
    }
}

impl GeneratorConfig {
    /// Check extents and ratios.
    ///
    /// # Errors
    ///
    /// Returns [`GameError::InvalidMap`] for non-positive extents, ratios
    /// outside `0..=1`, or ratios summing past 1.
    pub fn validate(&self) -> Result<()> {
        if self.cols <= 0 || self.rows <= 0 || self.tile_size <= 0 {
            return Err(GameError::InvalidMap(format!(
                "extents must be positive, got {}x{} tile {}",
                self.cols, self.rows, self.tile_size
            )));
        }
        let ratios = [self.obstacle_ratio, self.trap_ratio, self.mineral_ratio];
        if ratios.iter().any(|r| !(0.0..=1.0).contains(r)) || ratios.iter().sum::<f64>() > 1.0 {
            return Err(GameError::InvalidMap(format!(
                "ratios must be within 0..=1 and sum to at most 1, got {ratios:?}"
            )));
        }
        Ok(())
    }
}

/// Generate one map.
///
/// Row 0 is where rooms spawn their agents, so it never receives
/// obstacles, traps or minerals. The remaining cells are shuffled and the
/// first `ratio × area` of them become obstacles, then traps, then
/// minerals; everything left is ground.
pub fn generate_map<R: Rng + ?Sized>(config: &GeneratorConfig, biome: &str, rng: &mut R) -> MapDefinition {
    let cols = config.cols.max(1) as usize;
    let rows = config.rows.max(1) as usize;
    let area = cols * rows;
    let mut cells = vec![vec![CODE_GROUND; cols]; rows];

    let mut candidates: Vec<(usize, usize)> = (1..rows)
        .flat_map(|row| (0..cols).map(move |col| (row, col)))
        .collect();
    candidates.shuffle(rng);

    let quota = |ratio: f64| (area as f64 * ratio).floor() as usize;
    let mut remaining = candidates.into_iter();
    for (code, count) in [
        (CODE_OBSTACLE, quota(config.obstacle_ratio)),
        (CODE_TRAP, quota(config.trap_ratio)),
        (CODE_MINERAL, quota(config.mineral_ratio)),
    ] {
        for (row, col) in remaining.by_ref().take(count) {
            cells[row][col] = code;
        }
    }

    MapDefinition {
        cols: cols as i32,
        rows: rows as i32,
        tile_size: config.tile_size,
        biome: biome.to_string(),
        cells,
        region_cells: None,
        regions: Vec::new(),
    }
}

/// Write `per_biome` maps for every biome under `out_dir`.
///
/// Each biome gets its own RNG stream derived from `seed`, so adding
/// biomes does not change existing maps.
///
/// # Errors
///
/// Returns an error if the config is invalid or a file cannot be written.
pub fn write_map_set(
    out_dir: &Path,
    config: &GeneratorConfig,
    biomes: &[&str],
    per_biome: usize,
    seed: u64,
) -> Result<Vec<PathBuf>> {
    config.validate()?;
    let mut written = Vec::with_capacity(biomes.len() * per_biome);

    for (index, biome) in biomes.iter().enumerate() {
        let dir = out_dir.join(biome);
        std::fs::create_dir_all(&dir).map_err(|e| GameError::Serialization(format!(
            "Failed to create {}: {e}",
            dir.display()
        )))?;

        let mut rng = StdRng::seed_from_u64(seed.wrapping_add(index as u64));
        for i in 1..=per_biome {
            let map = generate_map(config, biome, &mut rng);
            let path = dir.join(format!("map{i}.json"));
            std::fs::write(&path, map.to_json()?).map_err(|e| {
                GameError::Serialization(format!("Failed to write {}: {e}", path.display()))
            })?;
            tracing::info!(path = %path.display(), "Generated map");
            written.push(path);
        }
    }

    Ok(written)
}
