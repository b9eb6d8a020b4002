//! Map definitions and the per-room hex grid configuration.
//!
//! Maps are authored externally and stored as JSON:
//!
//! ```json
//! {
//!   "cols": 30, "rows": 20, "tileSize": 30, "biome": "Desert",
//!   "cells": [[1, 1, 2, ...], ...],
//!   "regionCells": [[0, 1, 1, ...], ...],
//!   "regions": [{ "id": 1, "name": "Dunes", "color": "#d9b26f" }]
//! }
//! ```
//!
//! `cells` is indexed `[row][col]` in odd-row offset space.

use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

use rand::seq::SliceRandom;
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::error::{GameError, Result};
use crate::hex::{GridBounds, Hex, Offset};
use crate::math::{fixed_serde, Fixed};
use crate::pathfinding::BlockedCells;

/// Grid extents used when a map cannot be loaded.
pub const FALLBACK_COLS: i32 = 30;
/// Grid extents used when a map cannot be loaded.
pub const FALLBACK_ROWS: i32 = 20;
/// Tile size used when a map cannot be loaded.
pub const FALLBACK_TILE_SIZE: i32 = 30;
/// Biome tag used when a map cannot be loaded.
pub const FALLBACK_BIOME: &str = "Desert";

/// Terrain classification of a raw cell code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Terrain {
    /// Walkable ground (codes 1 and 5..=10).
    Ground,
    /// Impassable obstacle (codes 2 and 11..=20).
    Obstacle,
    /// Mineral spawn on walkable ground (codes 3 and 21..=40).
    Mineral,
    /// Trap (code 4). Walkable at normal cost.
    Trap,
    /// Anything else, including 0. Treated as walkable but never used
    /// for fallback mineral placement.
    Unknown,
}

impl Terrain {
    /// Classify a raw cell code.
    #[must_use]
    pub const fn from_code(code: u32) -> Self {
        match code {
            2 | 11..=20 => Self::Obstacle,
            3 | 21..=40 => Self::Mineral,
            4 => Self::Trap,
            1 | 5..=10 => Self::Ground,
            _ => Self::Unknown,
        }
    }

    /// Returns true if agents can stand on this terrain.
    #[must_use]
    pub const fn is_walkable(self) -> bool {
        !matches!(self, Self::Obstacle)
    }
}

/// A named region of the map.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegionDef {
    /// Region identifier referenced from `regionCells`.
    pub id: u32,
    /// Display name.
    #[serde(default)]
    pub name: String,
    /// Display color (CSS-style string).
    #[serde(default)]
    pub color: String,
}

/// Raw map file contents.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MapDefinition {
    /// Number of columns.
    pub cols: i32,
    /// Number of rows.
    pub rows: i32,
    /// Hex size in pixels.
    pub tile_size: i32,
    /// Biome tag.
    #[serde(default)]
    pub biome: String,
    /// Terrain codes indexed `[row][col]`.
    pub cells: Vec<Vec<u32>>,
    /// Optional region ids indexed `[row][col]` (0 = none).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub region_cells: Option<Vec<Vec<u32>>>,
    /// Optional region definitions.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub regions: Vec<RegionDef>,
}

impl MapDefinition {
    /// Parse a map definition from JSON text.
    ///
    /// # Errors
    ///
    /// Returns [`GameError::InvalidMap`] if the JSON is malformed or the
    /// grid fails [`validate`](Self::validate).
    pub fn from_json(json: &str) -> Result<Self> {
        let map: Self =
            serde_json::from_str(json).map_err(|e| GameError::InvalidMap(e.to_string()))?;
        map.validate()?;
        Ok(map)
    }

    /// Load a map definition from disk.
    ///
    /// # Errors
    ///
    /// Returns [`GameError::MapLoad`] if the file cannot be read or parsed.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|e| GameError::MapLoad {
            path: path.display().to_string(),
            message: e.to_string(),
        })?;
        Self::from_json(&text).map_err(|e| GameError::MapLoad {
            path: path.display().to_string(),
            message: e.to_string(),
        })
    }

    /// Serialize to JSON text.
    ///
    /// # Errors
    ///
    /// Returns [`GameError::Serialization`] if encoding fails.
    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string(self).map_err(|e| GameError::Serialization(e.to_string()))
    }

    /// Check that the declared extents match the cell arrays.
    ///
    /// # Errors
    ///
    /// Returns [`GameError::InvalidMap`] describing the first problem found.
    pub fn validate(&self) -> Result<()> {
        if self.cols <= 0 || self.rows <= 0 {
            return Err(GameError::InvalidMap(format!(
                "extents must be positive, got {}x{}",
                self.cols, self.rows
            )));
        }
        if self.tile_size <= 0 {
            return Err(GameError::InvalidMap(format!(
                "tileSize must be positive, got {}",
                self.tile_size
            )));
        }
        if self.cells.len() != self.rows as usize {
            return Err(GameError::InvalidMap(format!(
                "expected {} rows of cells, found {}",
                self.rows,
                self.cells.len()
            )));
        }
        if let Some((row, cells)) = self
            .cells
            .iter()
            .enumerate()
            .find(|(_, cells)| cells.len() != self.cols as usize)
        {
            return Err(GameError::InvalidMap(format!(
                "row {row} has {} cells, expected {}",
                cells.len(),
                self.cols
            )));
        }
        Ok(())
    }

    /// Terrain code at an offset cell, if inside the map.
    #[must_use]
    pub fn code_at(&self, offset: Offset) -> Option<u32> {
        let row = usize::try_from(offset.row).ok()?;
        let col = usize::try_from(offset.col).ok()?;
        self.cells.get(row)?.get(col).copied()
    }

    fn region_at(&self, row: usize, col: usize) -> Option<u32> {
        self.region_cells
            .as_ref()?
            .get(row)?
            .get(col)
            .copied()
            .filter(|&id| id > 0)
    }
}

/// Immutable per-room grid configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HexGridConfig {
    /// Rectangular extents.
    pub bounds: GridBounds,
    /// Hex size in pixels.
    #[serde(with = "fixed_serde")]
    pub tile_size: Fixed,
    /// Biome tag.
    pub biome: String,
    /// Impassable cells.
    pub blocked: BTreeSet<Hex>,
    /// Mineral spawn cells, in map order.
    pub mineral_spawns: Vec<Hex>,
    /// Region id per cell.
    pub regions: BTreeMap<Hex, u32>,
    /// Region definitions.
    pub region_defs: Vec<RegionDef>,
}

impl HexGridConfig {
    /// A fully open grid with no minerals or regions.
    #[must_use]
    pub fn open(cols: i32, rows: i32, tile_size: i32, biome: impl Into<String>) -> Self {
        Self {
            bounds: GridBounds::new(cols, rows),
            tile_size: Fixed::from_num(tile_size.max(1)),
            biome: biome.into(),
            blocked: BTreeSet::new(),
            mineral_spawns: Vec::new(),
            regions: BTreeMap::new(),
            region_defs: Vec::new(),
        }
    }

    /// The grid used when no map could be loaded.
    #[must_use]
    pub fn fallback() -> Self {
        Self::open(
            FALLBACK_COLS,
            FALLBACK_ROWS,
            FALLBACK_TILE_SIZE,
            FALLBACK_BIOME,
        )
    }

    /// Build the grid from a map definition.
    ///
    /// When the map declares no mineral cells, `fallback_mineral_ratio` of
    /// the ground cells are chosen with `rng` instead.
    pub fn from_map<R: Rng + ?Sized>(
        map: &MapDefinition,
        fallback_mineral_ratio: f64,
        rng: &mut R,
    ) -> Self {
        let mut grid = Self::open(map.cols, map.rows, map.tile_size, map.biome.clone());
        grid.region_defs = map.regions.clone();
        let mut ground = Vec::new();

        for (row, codes) in map.cells.iter().enumerate() {
            for (col, &code) in codes.iter().enumerate() {
                let hex = Offset::new(col as i32, row as i32).to_axial();
                match Terrain::from_code(code) {
                    Terrain::Obstacle => {
                        grid.blocked.insert(hex);
                    }
                    Terrain::Mineral => grid.mineral_spawns.push(hex),
                    Terrain::Ground => ground.push(hex),
                    Terrain::Trap | Terrain::Unknown => {}
                }
                if let Some(region) = map.region_at(row, col) {
                    grid.regions.insert(hex, region);
                }
            }
        }

        if grid.mineral_spawns.is_empty() && !ground.is_empty() {
            ground.shuffle(rng);
            let count = (ground.len() as f64 * fallback_mineral_ratio).floor() as usize;
            ground.truncate(count);
            grid.mineral_spawns = ground;
            tracing::debug!(
                count = grid.mineral_spawns.len(),
                "Map has no mineral cells; placed minerals on random ground"
            );
        }

        grid
    }

    /// Load a map file, falling back to [`fallback`](Self::fallback) on
    /// any error.
    ///
    /// Returns the grid and the load error, if one occurred.
    pub fn load_or_fallback<P: AsRef<Path>, R: Rng + ?Sized>(
        path: P,
        fallback_mineral_ratio: f64,
        rng: &mut R,
    ) -> (Self, Option<GameError>) {
        match MapDefinition::load(path.as_ref()) {
            Ok(map) => {
                tracing::info!(
                    path = %path.as_ref().display(),
                    cols = map.cols,
                    rows = map.rows,
                    tile_size = map.tile_size,
                    "Loaded map"
                );
                (Self::from_map(&map, fallback_mineral_ratio, rng), None)
            }
            Err(e) => {
                tracing::error!("Map load failed, using empty map: {e}");
                (Self::fallback(), Some(e))
            }
        }
    }

    /// Override the tile size (used for deployment-wide scaling).
    #[must_use]
    pub fn with_tile_size(mut self, tile_size: i32) -> Self {
        self.tile_size = Fixed::from_num(tile_size.max(1));
        self
    }

    /// Returns true if an agent may stand on the cell.
    #[must_use]
    pub fn is_walkable(&self, hex: Hex) -> bool {
        self.bounds.contains(hex) && !self.blocked.contains(&hex)
    }

    /// Region id of a cell, if any.
    #[must_use]
    pub fn region_of(&self, hex: Hex) -> Option<u32> {
        self.regions.get(&hex).copied()
    }
}

impl BlockedCells for HexGridConfig {
    fn is_blocked(&self, hex: Hex) -> bool {
        self.blocked.contains(&hex)
    }
}
