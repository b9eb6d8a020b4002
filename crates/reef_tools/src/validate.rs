//! Map file validation.
//!
//! A map passes when it parses, its extents match its cell arrays, and
//! the spawn cell is walkable. The report also counts how much of the
//! walkable area is reachable from spawn, since rooms place every agent
//! there and anything cut off can never be mined.

use std::collections::{BTreeSet, VecDeque};
use std::path::{Path, PathBuf};

use rand::rngs::StdRng;
use rand::SeedableRng;
use reef_core::error::{GameError, Result};
use reef_core::hex::{Hex, Offset};
use reef_core::map::{HexGridConfig, MapDefinition};
use serde::Serialize;

/// Summary of one validated map.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MapReport {
    /// File that was checked.
    pub path: PathBuf,
    /// Biome tag.
    pub biome: String,
    /// Number of columns.
    pub cols: i32,
    /// Number of rows.
    pub rows: i32,
    /// Obstacle cells.
    pub obstacles: usize,
    /// Mineral spawn cells declared by the map.
    pub minerals: usize,
    /// Walkable cells.
    pub walkable: usize,
    /// Walkable cells reachable from spawn.
    pub reachable: usize,
    /// Mineral cells reachable from spawn.
    pub reachable_minerals: usize,
}

impl MapReport {
    /// Walkable cells that cannot be reached from spawn.
    #[must_use]
    pub fn isolated(&self) -> usize {
        self.walkable - self.reachable
    }
}

/// Validate one map file.
///
/// # Errors
///
/// Returns [`GameError::MapLoad`] if the file cannot be parsed and
/// [`GameError::InvalidMap`] if the spawn cell is blocked.
pub fn validate_map_file(path: &Path) -> Result<MapReport> {
    let map = MapDefinition::load(path)?;
    // Declared minerals only: no fallback placement while validating.
    let grid = HexGridConfig::from_map(&map, 0.0, &mut StdRng::seed_from_u64(0));

    let spawn = Offset::new(0, 0).to_axial();
    if !grid.is_walkable(spawn) {
        return Err(GameError::InvalidMap(format!(
            "{}: spawn cell (0, 0) is blocked",
            path.display()
        )));
    }

    let reached = flood_fill(&grid, spawn);
    let walkable = (0..map.rows)
        .flat_map(|row| (0..map.cols).map(move |col| Offset::new(col, row).to_axial()))
        .filter(|&hex| grid.is_walkable(hex))
        .count();

    Ok(MapReport {
        path: path.to_path_buf(),
        biome: map.biome,
        cols: map.cols,
        rows: map.rows,
        obstacles: grid.blocked.len(),
        minerals: grid.mineral_spawns.len(),
        walkable,
        reachable: reached.len(),
        reachable_minerals: grid
            .mineral_spawns
            .iter()
            .filter(|hex| reached.contains(hex))
            .count(),
    })
}

/// Validate every `.json` file under `dir`, recursively, in path order.
///
/// All files are checked before returning so the log lists every failure.
///
/// # Errors
///
/// Returns an error if the directory cannot be read or any map fails.
pub fn validate_map_directory(dir: &Path) -> Result<Vec<MapReport>> {
    let mut files = Vec::new();
    collect_json(dir, &mut files)?;
    files.sort();

    let mut reports = Vec::with_capacity(files.len());
    let mut failures = 0usize;
    for file in &files {
        match validate_map_file(file) {
            Ok(report) => {
                if report.isolated() > 0 {
                    tracing::warn!(
                        path = %file.display(),
                        isolated = report.isolated(),
                        "Cells unreachable from spawn"
                    );
                }
                reports.push(report);
            }
            Err(e) => {
                tracing::error!("{e}");
                failures += 1;
            }
        }
    }

    if failures > 0 {
        return Err(GameError::InvalidMap(format!(
            "{failures} of {} maps failed validation",
            files.len()
        )));
    }
    Ok(reports)
}

fn collect_json(dir: &Path, out: &mut Vec<PathBuf>) -> Result<()> {
    let entries = std::fs::read_dir(dir).map_err(|e| GameError::MapLoad {
        path: dir.display().to_string(),
        message: e.to_string(),
    })?;
    for entry in entries.flatten() {
        let path = entry.path();
        if path.is_dir() {
            collect_json(&path, out)?;
        } else if path.extension().is_some_and(|ext| ext == "json") {
            out.push(path);
        }
    }
    Ok(())
}

fn flood_fill(grid: &HexGridConfig, start: Hex) -> BTreeSet<Hex> {
    let mut seen = BTreeSet::from([start]);
    let mut frontier = VecDeque::from([start]);
    while let Some(hex) = frontier.pop_front() {
        for next in hex.neighbors() {
            if grid.is_walkable(next) && seen.insert(next) {
                frontier.push_back(next);
            }
        }
    }
    seen
}

#[cfg(test)]
mod tests {
    use super::*;
    use reef_test_utils::fixtures::map_definition;

    fn write(dir: &Path, name: &str, map: &MapDefinition) -> PathBuf {
        let path = dir.join(name);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).unwrap();
        }
        std::fs::write(&path, map.to_json().unwrap()).unwrap();
        path
    }

    #[test]
    fn test_open_map_fully_reachable() {
        let dir = tempfile::tempdir().unwrap();
        let map = map_definition(6, 4, &[], &[Offset::new(5, 3)]);
        let report = validate_map_file(&write(dir.path(), "map1.json", &map)).unwrap();

        assert_eq!(report.walkable, 24);
        assert_eq!(report.reachable, 24);
        assert_eq!(report.minerals, 1);
        assert_eq!(report.reachable_minerals, 1);
        assert_eq!(report.isolated(), 0);
    }

    #[test]
    fn test_wall_isolates_far_side() {
        let dir = tempfile::tempdir().unwrap();
        // A full column wall at col 2 splits a 5x3 map.
        let wall: Vec<Offset> = (0..3).map(|row| Offset::new(2, row)).collect();
        let map = map_definition(5, 3, &wall, &[Offset::new(4, 1)]);
        let report = validate_map_file(&write(dir.path(), "map1.json", &map)).unwrap();

        assert_eq!(report.obstacles, 3);
        assert_eq!(report.walkable, 12);
        assert_eq!(report.reachable, 6);
        assert_eq!(report.reachable_minerals, 0);
        assert_eq!(report.isolated(), 6);
    }

    #[test]
    fn test_blocked_spawn_fails() {
        let dir = tempfile::tempdir().unwrap();
        let map = map_definition(3, 3, &[Offset::new(0, 0)], &[]);
        let err = validate_map_file(&write(dir.path(), "map1.json", &map)).unwrap_err();
        assert!(matches!(err, GameError::InvalidMap(_)));
    }

    #[test]
    fn test_directory_reports_and_failures() {
        let dir = tempfile::tempdir().unwrap();
        let good = map_definition(4, 4, &[], &[]);
        write(dir.path(), "Ice/map1.json", &good);
        write(dir.path(), "Red/map1.json", &good);
        std::fs::write(dir.path().join("notes.txt"), "ignored").unwrap();

        let reports = validate_map_directory(dir.path()).unwrap();
        assert_eq!(reports.len(), 2);
        assert!(reports[0].path.ends_with("Ice/map1.json"));

        std::fs::write(dir.path().join("Red/map2.json"), "{\"cols\": 3}").unwrap();
        assert!(validate_map_directory(dir.path()).is_err());
    }

    #[test]
    fn test_missing_directory_fails() {
        let dir = tempfile::tempdir().unwrap();
        assert!(validate_map_directory(&dir.path().join("absent")).is_err());
    }
}
