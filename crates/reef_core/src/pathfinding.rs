//! Hex-grid pathfinding using the A* algorithm.
//!
//! Movement cost is uniform (one per hex step). Ties between open nodes
//! with equal `f` are broken by insertion order, so the same query always
//! yields the same path.

use std::cmp::Ordering;
use std::collections::{BinaryHeap, HashMap, HashSet};

use crate::error::{GameError, Result};
use crate::hex::{heuristic, neighbors, GridBounds, Hex};

/// Upper bound on node expansions for any single search.
pub const MAX_EXPANSIONS: usize = 100_000;

/// Anything that can answer "is this cell impassable?".
pub trait BlockedCells {
    /// Returns true if the cell cannot be entered.
    fn is_blocked(&self, hex: Hex) -> bool;
}

impl BlockedCells for HashSet<Hex> {
    fn is_blocked(&self, hex: Hex) -> bool {
        self.contains(&hex)
    }
}

impl BlockedCells for std::collections::BTreeSet<Hex> {
    fn is_blocked(&self, hex: Hex) -> bool {
        self.contains(&hex)
    }
}

/// A node in the A* open set priority queue.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
struct AStarNode {
    hex: Hex,
    g_score: u32,
    /// f_score = g_score + heuristic
    f_score: u32,
    /// Insertion sequence; earlier entries win ties.
    seq: u64,
}

impl Ord for AStarNode {
    fn cmp(&self, other: &Self) -> Ordering {
        // BinaryHeap is a max-heap, so reverse both keys for min-heap behavior.
        match other.f_score.cmp(&self.f_score) {
            Ordering::Equal => other.seq.cmp(&self.seq),
            ord => ord,
        }
    }
}

impl PartialOrd for AStarNode {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Default expansion budget for a grid of the given size.
#[must_use]
pub fn default_budget(bounds: GridBounds) -> usize {
    bounds.area().clamp(1, MAX_EXPANSIONS)
}

/// Find a path from `start` to `goal`.
///
/// Returns the cells to walk through, excluding `start` and ending at
/// `goal`. An empty vector means `start == goal`.
///
/// # Errors
///
/// Returns [`GameError::NoPath`] if the goal is blocked, outside
/// `bounds`, unreachable, or the search exceeds its expansion budget.
pub fn find_path<B: BlockedCells + ?Sized>(
    start: Hex,
    goal: Hex,
    blocked: &B,
    bounds: GridBounds,
) -> Result<Vec<Hex>> {
    find_path_with_budget(start, goal, blocked, bounds, default_budget(bounds))
}

/// [`find_path`] with an explicit node-expansion ceiling.
///
/// # Errors
///
/// Same as [`find_path`].
pub fn find_path_with_budget<B: BlockedCells + ?Sized>(
    start: Hex,
    goal: Hex,
    blocked: &B,
    bounds: GridBounds,
    max_expansions: usize,
) -> Result<Vec<Hex>> {
    let no_path = || GameError::NoPath {
        from: start,
        to: goal,
    };

    if blocked.is_blocked(goal) || !bounds.contains(goal) {
        return Err(no_path());
    }

    if start == goal {
        return Ok(Vec::new());
    }

    let mut open_set: BinaryHeap<AStarNode> = BinaryHeap::new();
    let mut came_from: HashMap<Hex, Hex> = HashMap::new();
    let mut g_score: HashMap<Hex, u32> = HashMap::new();
    let mut closed: HashSet<Hex> = HashSet::new();
    let mut seq: u64 = 0;
    let mut expansions = 0usize;

    g_score.insert(start, 0);
    open_set.push(AStarNode {
        hex: start,
        g_score: 0,
        f_score: heuristic(start, goal),
        seq,
    });

    while let Some(current) = open_set.pop() {
        // Stale heap entry superseded by a cheaper one
        if closed.contains(&current.hex) {
            continue;
        }

        if current.hex == goal {
            return Ok(reconstruct_path(&came_from, start, goal));
        }

        closed.insert(current.hex);
        expansions += 1;
        if expansions > max_expansions {
            tracing::debug!(
                %start, %goal, max_expansions,
                "Path search exceeded expansion budget"
            );
            return Err(no_path());
        }

        for neighbor in neighbors(current.hex) {
            if closed.contains(&neighbor)
                || blocked.is_blocked(neighbor)
                || !bounds.contains(neighbor)
            {
                continue;
            }

            let tentative_g = current.g_score + 1;
            let neighbor_g = g_score.get(&neighbor).copied().unwrap_or(u32::MAX);

            if tentative_g < neighbor_g {
                came_from.insert(neighbor, current.hex);
                g_score.insert(neighbor, tentative_g);

                seq += 1;
                open_set.push(AStarNode {
                    hex: neighbor,
                    g_score: tentative_g,
                    f_score: tentative_g + heuristic(neighbor, goal),
                    seq,
                });
            }
        }
    }

    Err(no_path())
}

/// Reconstruct path from came_from map, excluding the start cell.
fn reconstruct_path(came_from: &HashMap<Hex, Hex>, start: Hex, goal: Hex) -> Vec<Hex> {
    let mut path = vec![goal];
    let mut current = goal;

    while let Some(&prev) = came_from.get(&current) {
        if prev == start {
            break;
        }
        path.push(prev);
        current = prev;
    }

    path.reverse();
    path
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hex::DIRECTIONS;

    fn open() -> HashSet<Hex> {
        HashSet::new()
    }

    fn assert_valid_path(start: Hex, path: &[Hex], blocked: &HashSet<Hex>, bounds: GridBounds) {
        let mut prev = start;
        for &cell in path {
            assert_eq!(prev.distance(cell), 1, "non-adjacent step {prev} -> {cell}");
            assert!(!blocked.contains(&cell), "path goes through blocked cell {cell}");
            assert!(bounds.contains(cell), "path leaves bounds at {cell}");
            prev = cell;
        }
    }

    #[test]
    fn test_straight_path_on_open_grid() {
        let bounds = GridBounds::new(10, 10);
        let start = Hex::new(0, 0);
        let goal = Hex::new(3, 0);

        let path = find_path(start, goal, &open(), bounds).unwrap();

        assert_eq!(path.len(), 3);
        assert_eq!(*path.last().unwrap(), goal);
        let mut prev = start;
        for cell in &path {
            let step = Hex::new(cell.q - prev.q, cell.r - prev.r);
            assert!(DIRECTIONS.contains(&step));
            prev = *cell;
        }
    }

    #[test]
    fn test_same_cell_is_empty_path() {
        let path = find_path(Hex::new(2, 2), Hex::new(2, 2), &open(), GridBounds::new(5, 5)).unwrap();
        assert!(path.is_empty());
    }

    #[test]
    fn test_adjacent_goal_is_single_step() {
        let start = Hex::new(2, 2);
        for goal in start.neighbors() {
            let bounds = GridBounds::new(10, 10);
            if !bounds.contains(goal) {
                continue;
            }
            let path = find_path(start, goal, &open(), bounds).unwrap();
            assert_eq!(path, vec![goal]);
        }
    }

    #[test]
    fn test_blocked_goal() {
        let mut blocked = open();
        blocked.insert(Hex::new(3, 0));
        let result = find_path(Hex::new(0, 0), Hex::new(3, 0), &blocked, GridBounds::new(10, 10));
        assert!(matches!(result, Err(GameError::NoPath { .. })));
    }

    #[test]
    fn test_out_of_bounds_goal() {
        let result = find_path(Hex::new(0, 0), Hex::new(-1, 0), &open(), GridBounds::new(10, 10));
        assert!(result.is_err());
    }

    #[test]
    fn test_path_around_wall() {
        let bounds = GridBounds::new(12, 12);
        let mut blocked = open();
        // Vertical wall at column 5, rows 0..=9
        for row in 0..10 {
            blocked.insert(crate::hex::Offset::new(5, row).to_axial());
        }

        let start = crate::hex::Offset::new(2, 4).to_axial();
        let goal = crate::hex::Offset::new(8, 4).to_axial();
        let path = find_path(start, goal, &blocked, bounds).unwrap();

        assert_eq!(*path.last().unwrap(), goal);
        assert_valid_path(start, &path, &blocked, bounds);
    }

    #[test]
    fn test_no_path_exists() {
        let bounds = GridBounds::new(10, 10);
        let mut blocked = open();
        for row in 0..10 {
            blocked.insert(crate::hex::Offset::new(5, row).to_axial());
        }

        let start = crate::hex::Offset::new(2, 5).to_axial();
        let goal = crate::hex::Offset::new(8, 5).to_axial();
        assert!(find_path(start, goal, &blocked, bounds).is_err());
    }

    #[test]
    fn test_budget_exhaustion() {
        let bounds = GridBounds::new(50, 50);
        let start = Hex::new(0, 0);
        let goal = crate::hex::Offset::new(49, 49).to_axial();

        assert!(find_path_with_budget(start, goal, &open(), bounds, 3).is_err());
        assert!(find_path(start, goal, &open(), bounds).is_ok());
    }

    #[test]
    fn test_determinism() {
        let bounds = GridBounds::new(20, 20);
        let mut blocked = open();
        for row in 5..15 {
            blocked.insert(crate::hex::Offset::new(10, row).to_axial());
        }

        let start = crate::hex::Offset::new(5, 10).to_axial();
        let goal = crate::hex::Offset::new(15, 10).to_axial();

        let path1 = find_path(start, goal, &blocked, bounds).unwrap();
        let path2 = find_path(start, goal, &blocked, bounds).unwrap();
        let path3 = find_path(start, goal, &blocked, bounds).unwrap();

        assert_eq!(path1, path2);
        assert_eq!(path2, path3);
    }

    #[test]
    fn test_path_is_shortest() {
        let bounds = GridBounds::new(20, 20);
        let start = Hex::new(1, 3);
        let goal = Hex::new(6, 8);
        let path = find_path(start, goal, &open(), bounds).unwrap();
        assert_eq!(path.len() as u32, start.distance(goal));
    }
}
