//! Determinism harness for rooms.
//!
//! Replays and desync checks assume a room reproduces the same state hash
//! from the same seed and command script. The usual ways that breaks:
//!
//! - pixel math drifting, which is why positions are [`reef_core::math::Fixed`]
//! - iterating a `HashMap`; rooms walk agents and minerals in id order
//! - drawing from anything other than the room's seeded `StdRng`
//!
//! Scripts are lists of [`ScriptedCommand`]s applied before the tick they
//! name. [`strategies`] generates them for property tests.

use std::thread;

use reef_core::agents::EntityId;
use reef_core::simulation::{Command, Room};

/// Result of a determinism test.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeterminismResult {
    /// Whether all runs produced identical results.
    pub is_deterministic: bool,
    /// Hashes from each run.
    pub hashes: Vec<u64>,
    /// Number of ticks simulated.
    pub ticks: u64,
}

impl DeterminismResult {
    /// Get all unique hashes (should be 1 for a deterministic room).
    #[must_use]
    pub fn unique_hashes(&self) -> Vec<u64> {
        let mut unique: Vec<u64> = self.hashes.clone();
        unique.sort_unstable();
        unique.dedup();
        unique
    }

    /// Assert that the runs were deterministic, with a detailed error message.
    ///
    /// # Panics
    ///
    /// Panics if the runs produced different hashes.
    pub fn assert_deterministic(&self) {
        if !self.is_deterministic {
            let unique = self.unique_hashes();
            panic!(
                "Room is non-deterministic!\n\
                 Runs: {}\n\
                 Ticks: {}\n\
                 Unique hashes: {} (expected 1)\n\
                 All hashes: {:?}",
                self.hashes.len(),
                self.ticks,
                unique.len(),
                self.hashes
            );
        }
    }
}

/// A command to issue at a given tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScriptedCommand {
    /// Tick counter value at which to issue the command.
    pub tick: u64,
    /// Agent receiving the command.
    pub entity: EntityId,
    /// The command.
    pub command: Command,
}

/// Issue every scripted command due at the room's current tick.
pub fn apply_due_commands(room: &mut Room, script: &[ScriptedCommand]) {
    let now = room.get_tick();
    for scripted in script.iter().filter(|c| c.tick == now) {
        room.apply_command(scripted.entity, scripted.command);
    }
}

/// Run a state machine multiple times and verify determinism.
///
/// # Arguments
///
/// * `runs` - Number of times to run
/// * `ticks` - Number of ticks to simulate per run
/// * `setup` - Function to create initial state
/// * `step` - Function to advance state by one tick
/// * `hash` - Function to compute state hash
///
/// # Example
///
/// ```
/// use reef_test_utils::determinism::verify_determinism;
///
/// let result = verify_determinism(3, 10, || 0u64, |n| *n += 1, |n| *n);
/// result.assert_deterministic();
/// ```
pub fn verify_determinism<S, Setup, Step, HashFn>(
    runs: usize,
    ticks: u64,
    setup: Setup,
    step: Step,
    hash: HashFn,
) -> DeterminismResult
where
    Setup: Fn() -> S,
    Step: Fn(&mut S),
    HashFn: Fn(&S) -> u64,
{
    let mut hashes = Vec::with_capacity(runs);

    for _ in 0..runs {
        let mut state = setup();

        for _ in 0..ticks {
            step(&mut state);
        }

        hashes.push(hash(&state));
    }

    let is_deterministic = hashes.windows(2).all(|w| w[0] == w[1]);

    DeterminismResult {
        is_deterministic,
        hashes,
        ticks,
    }
}

/// Run a room twice with the same script and compare final hashes.
pub fn verify_room_determinism<F>(setup_fn: F, script: &[ScriptedCommand], num_ticks: u64) -> bool
where
    F: Fn() -> Room,
{
    let result = verify_determinism(
        2,
        num_ticks,
        &setup_fn,
        |room| {
            apply_due_commands(room, script);
            room.tick();
        },
        Room::state_hash,
    );
    result.is_deterministic
}

/// Run N rooms on scoped threads and collect final hashes.
///
/// Catches non-determinism that only shows up under thread scheduling
/// or memory layout differences.
pub fn run_parallel_rooms<F>(
    setup_fn: F,
    script: &[ScriptedCommand],
    num_rooms: usize,
    num_ticks: u64,
) -> DeterminismResult
where
    F: Fn() -> Room + Sync,
{
    let hashes: Vec<u64> = thread::scope(|s| {
        let handles: Vec<_> = (0..num_rooms)
            .map(|_| {
                s.spawn(|| {
                    let mut room = setup_fn();
                    for _ in 0..num_ticks {
                        apply_due_commands(&mut room, script);
                        room.tick();
                    }
                    room.state_hash()
                })
            })
            .collect();

        handles
            .into_iter()
            .map(|h| h.join().expect("room thread panicked"))
            .collect()
    });

    DeterminismResult {
        is_deterministic: hashes.windows(2).all(|w| w[0] == w[1]),
        hashes,
        ticks: num_ticks,
    }
}

/// Compare two room runs tick-by-tick, finding the first divergence.
///
/// # Returns
///
/// `None` if the rooms stay identical, `Some(tick)` if they diverge at
/// that tick.
pub fn find_first_divergence<F>(
    setup_fn: F,
    script: &[ScriptedCommand],
    num_ticks: u64,
) -> Option<u64>
where
    F: Fn() -> Room,
{
    let mut room1 = setup_fn();
    let mut room2 = setup_fn();

    if room1.state_hash() != room2.state_hash() {
        return Some(0);
    }

    for tick in 1..=num_ticks {
        apply_due_commands(&mut room1, script);
        apply_due_commands(&mut room2, script);
        room1.tick();
        room2.tick();

        if room1.state_hash() != room2.state_hash() {
            return Some(tick);
        }
    }

    None
}

/// Record a room run and check that its replay reproduces the final hash.
///
/// `setup_fn` must return a room still in the lobby; it is started after
/// recording begins.
pub fn verify_replay_determinism<F>(setup_fn: F, script: &[ScriptedCommand], num_ticks: u64) -> bool
where
    F: Fn() -> Room,
{
    let mut room = setup_fn();
    room.start_recording();
    room.start();

    for _ in 0..num_ticks {
        apply_due_commands(&mut room, script);
        room.tick();
    }

    room.take_replay()
        .is_some_and(|replay| replay.verify().is_ok())
}

/// Proptest strategies for command scripts.
pub mod strategies {
    use proptest::prelude::*;
    use reef_core::agents::EntityId;
    use reef_core::hex::{Hex, Offset};
    use reef_core::simulation::{Command, MoveTarget};

    use super::ScriptedCommand;

    /// Generate an axial cell inside a `cols` x `rows` grid.
    pub fn arb_cell(cols: i32, rows: i32) -> impl Strategy<Value = Hex> {
        (0..cols, 0..rows).prop_map(|(col, row)| Offset::new(col, row).to_axial())
    }

    /// Generate a move target in either coordinate system.
    pub fn arb_move_target(cols: i32, rows: i32) -> impl Strategy<Value = MoveTarget> {
        prop_oneof![
            arb_cell(cols, rows).prop_map(MoveTarget::Axial),
            (0..cols, 0..rows).prop_map(|(c, r)| MoveTarget::Offset(Offset::new(c, r))),
        ]
    }

    /// Generate any command addressed at agents `1..=max_entity`.
    pub fn arb_command(cols: i32, rows: i32, max_entity: EntityId) -> impl Strategy<Value = Command> {
        prop_oneof![
            4 => arb_move_target(cols, rows).prop_map(Command::Move),
            1 => Just(Command::Stop),
            1 => (1..=max_entity).prop_map(|target| Command::Eliminate { target }),
        ]
    }

    /// Generate a command script spanning `max_tick` ticks.
    pub fn arb_script(
        cols: i32,
        rows: i32,
        max_entity: EntityId,
        max_tick: u64,
        max_len: usize,
    ) -> impl Strategy<Value = Vec<ScriptedCommand>> {
        proptest::collection::vec(
            (0..max_tick, 1..=max_entity, arb_command(cols, rows, max_entity)).prop_map(
                |(tick, entity, command)| ScriptedCommand {
                    tick,
                    entity,
                    command,
                },
            ),
            0..max_len,
        )
    }

    /// Generate a room seed.
    pub fn arb_seed() -> impl Strategy<Value = u64> {
        any::<u64>()
    }
}

#[cfg(test)]
mod tests {
    use super::strategies::*;
    use super::*;
    use crate::fixtures::{active_room, grid_with_minerals, open_grid};
    use proptest::prelude::*;
    use reef_core::config::RoomConfig;
    use reef_core::hex::Hex;
    use reef_core::simulation::MoveTarget;

    fn minerals() -> Vec<Hex> {
        vec![Hex::new(2, 3), Hex::new(5, 1), Hex::new(0, 6)]
    }

    fn lobby(seed: u64) -> Room {
        Room::new(
            grid_with_minerals(12, 10, &minerals()),
            RoomConfig::default(),
            seed,
            "",
        )
    }

    fn busy_script() -> Vec<ScriptedCommand> {
        (1..=8)
            .map(|entity| ScriptedCommand {
                tick: entity,
                entity,
                command: Command::Move(MoveTarget::Axial(minerals()[entity as usize % 3])),
            })
            .collect()
    }

    #[test]
    fn test_verify_determinism_simple() {
        let result = verify_determinism(3, 100, || 0u64, |n| *n += 1, |n| *n);

        assert!(result.is_deterministic);
        assert_eq!(result.hashes, vec![100, 100, 100]);
    }

    #[test]
    fn test_detects_nondeterminism() {
        let counter = std::cell::Cell::new(0u64);
        let result = verify_determinism(
            2,
            1,
            || {
                counter.set(counter.get() + 1);
                counter.get()
            },
            |_| {},
            |n| *n,
        );
        assert!(!result.is_deterministic);
        assert_eq!(result.unique_hashes().len(), 2);
    }

    #[test]
    fn test_empty_room_determinism() {
        assert!(verify_room_determinism(
            || active_room(open_grid(10, 10), RoomConfig::default(), 1),
            &[],
            100,
        ));
    }

    #[test]
    fn test_busy_room_determinism() {
        let setup = || {
            let mut room = lobby(77);
            room.start();
            room
        };
        assert!(verify_room_determinism(setup, &busy_script(), 300));
        assert_eq!(find_first_divergence(setup, &busy_script(), 300), None);
    }

    #[test]
    fn test_divergence_is_located() {
        let seed = std::cell::Cell::new(0u64);
        let setup = || {
            seed.set(seed.get() + 1);
            let mut room = lobby(seed.get());
            room.start();
            room
        };
        // Different seeds draw different mining durations at creation.
        assert_eq!(find_first_divergence(setup, &[], 10), Some(0));
    }

    #[test]
    fn test_parallel_rooms_match() {
        let setup = || {
            let mut room = lobby(5);
            room.start();
            room
        };
        run_parallel_rooms(setup, &busy_script(), 4, 200).assert_deterministic();
    }

    #[test]
    fn test_replay_determinism() {
        assert!(verify_replay_determinism(|| lobby(9), &busy_script(), 250));
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(24))]

        #[test]
        fn prop_scripted_rooms_are_deterministic(
            seed in arb_seed(),
            script in arb_script(12, 10, 8, 60, 30),
        ) {
            let setup = || {
                let mut room = lobby(seed);
                room.start();
                room
            };
            prop_assert_eq!(find_first_divergence(setup, &script, 80), None);
        }

        #[test]
        fn prop_replays_verify(seed in arb_seed(), script in arb_script(12, 10, 8, 60, 20)) {
            prop_assert!(verify_replay_determinism(|| lobby(seed), &script, 80));
        }
    }
}
