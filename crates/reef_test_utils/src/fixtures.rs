//! Test fixtures and helpers.
//!
//! Pre-built grids, configs and rooms for consistent testing.

use reef_core::config::RoomConfig;
use reef_core::hex::{Hex, Offset};
use reef_core::map::{HexGridConfig, MapDefinition};
use reef_core::simulation::Room;

/// Tile size used by every fixture grid.
pub const TILE_SIZE: i32 = 30;

/// Room config with no auto-spawned agents and hunters ready at once.
#[must_use]
pub fn scenario_config() -> RoomConfig {
    RoomConfig {
        agent_count: 0,
        initial_elimination_cooldown_ms: 0,
        ..RoomConfig::default()
    }
}

/// A fully open grid.
#[must_use]
pub fn open_grid(cols: i32, rows: i32) -> HexGridConfig {
    HexGridConfig::open(cols, rows, TILE_SIZE, "Desert")
}

/// An open grid with minerals on the given cells.
#[must_use]
pub fn grid_with_minerals(cols: i32, rows: i32, minerals: &[Hex]) -> HexGridConfig {
    let mut grid = open_grid(cols, rows);
    grid.mineral_spawns = minerals.to_vec();
    grid
}

/// A started room.
#[must_use]
pub fn active_room(grid: HexGridConfig, config: RoomConfig, seed: u64) -> Room {
    let mut room = Room::new(grid, config, seed, "/maps/fixture.json");
    room.start();
    room
}

/// A map definition of ground cells with obstacles and minerals placed
/// at the given offset cells.
#[must_use]
pub fn map_definition(
    cols: i32,
    rows: i32,
    obstacles: &[Offset],
    minerals: &[Offset],
) -> MapDefinition {
    let mut cells = vec![vec![1u32; cols.max(0) as usize]; rows.max(0) as usize];
    for at in obstacles {
        paint(&mut cells, *at, 2);
    }
    for at in minerals {
        paint(&mut cells, *at, 3);
    }

    MapDefinition {
        cols,
        rows,
        tile_size: TILE_SIZE,
        biome: "Desert".to_string(),
        cells,
        region_cells: None,
        regions: Vec::new(),
    }
}

fn paint(cells: &mut [Vec<u32>], at: Offset, code: u32) {
    let (Ok(row), Ok(col)) = (usize::try_from(at.row), usize::try_from(at.col)) else {
        return;
    };
    if let Some(cell) = cells.get_mut(row).and_then(|r| r.get_mut(col)) {
        *cell = code;
    }
}
