//! End-to-end room scenarios.
//!
//! These drive whole rooms through the public API only: pathing,
//! mining and respawn, contested claims, eliminations and determinism.

use std::collections::HashSet;

use proptest::prelude::*;
use rand::rngs::StdRng;
use rand::SeedableRng;
use reef_core::prelude::*;
use reef_core::agents::Ability;
use reef_core::pathfinding::find_path;
use reef_test_utils::determinism::strategies::{arb_script, arb_seed};
use reef_test_utils::determinism::{apply_due_commands, verify_room_determinism, ScriptedCommand};
use reef_test_utils::fixtures::{
    active_room, grid_with_minerals, map_definition, open_grid, scenario_config,
};

fn move_to(room: &mut Room, id: EntityId, hex: Hex) -> CommandOutcome {
    room.apply_command(id, Command::Move(MoveTarget::Axial(hex)))
}

// =============================================================================
// Pathing
// =============================================================================

#[test]
fn path_on_open_grid_is_three_neighbor_steps() {
    let start = Hex::new(0, 0);
    let goal = Hex::new(3, 0);
    let path = find_path(start, goal, &HashSet::new(), GridBounds::new(10, 10)).unwrap();

    assert_eq!(path.len(), 3);
    assert_eq!(path.last(), Some(&goal));

    let mut previous = start;
    for step in path {
        assert!(previous.neighbors().contains(&step), "{previous} -> {step}");
        previous = step;
    }
}

#[test]
fn agents_route_around_obstacles_from_map_files() {
    let wall: Vec<Offset> = (0..9).map(|row| Offset::new(4, row)).collect();
    let map = map_definition(10, 10, &wall, &[Offset::new(8, 2)]);
    let grid = HexGridConfig::from_map(&map, 0.0, &mut StdRng::seed_from_u64(1));
    assert_eq!(grid.mineral_spawns, vec![Offset::new(8, 2).to_axial()]);

    let mut room = active_room(grid, scenario_config(), 3);
    let id = room.spawn_agent(Archetype::Gatherer, Hex::new(0, 0)).unwrap();
    let goal = Offset::new(8, 2).to_axial();
    assert!(move_to(&mut room, id, goal).is_applied());

    for _ in 0..400 {
        room.tick();
        let agent = room.agent(id).unwrap();
        assert!(room.grid().is_walkable(agent.hex));
        if agent.state == AgentState::Gathering {
            break;
        }
    }
    let agent = room.agent(id).unwrap();
    assert_eq!(agent.hex, goal);
    assert_eq!(agent.state, AgentState::Gathering);
}

// =============================================================================
// Mining
// =============================================================================

#[test]
fn mining_completes_after_required_work_then_respawns() {
    let node = Hex::new(1, 0);
    let config = RoomConfig {
        min_work_ms: 3000,
        max_work_ms: 3000,
        ..scenario_config()
    };
    let mut room = active_room(grid_with_minerals(10, 10, &[node]), config, 8);
    let id = room.spawn_agent(Archetype::Gatherer, Hex::new(0, 0)).unwrap();
    move_to(&mut room, id, node);

    let mut claimed_at = None;
    let mut completed_at = None;
    for _ in 0..100 {
        let events = room.tick();
        if !events.claimed.is_empty() {
            claimed_at = Some(room.clock_ms());
        }
        if !events.completed.is_empty() {
            completed_at = Some(room.clock_ms());
            break;
        }
    }
    let (claimed_at, completed_at) = (claimed_at.unwrap(), completed_at.unwrap());
    assert_eq!(completed_at - claimed_at, 3000);

    let mineral = room.minerals()[0].clone();
    assert!(mineral.done);
    assert_eq!(mineral.locked_by, None);
    assert_eq!(mineral.done_by, Some(id));
    assert_eq!(mineral.respawn_at, Some(completed_at + 30_000));
    assert_eq!(room.minerals_collected(), 1);
    assert_eq!(room.agent(id).unwrap().state, AgentState::Idle);

    let mut respawned_at = None;
    for _ in 0..200 {
        if !room.tick().respawned.is_empty() {
            respawned_at = Some(room.clock_ms());
            break;
        }
    }
    assert_eq!(respawned_at, Some(completed_at + 30_000));

    let mineral = &room.minerals()[0];
    assert!(!mineral.done);
    assert_eq!(mineral.work, 0);
    assert!(mineral.is_claimable());
}

#[test]
fn contested_claim_keeps_first_holder() {
    let node = Hex::new(2, 0);
    let mut room = active_room(grid_with_minerals(10, 10, &[node]), scenario_config(), 2);
    let a = room.spawn_agent(Archetype::Gatherer, Hex::new(1, 0)).unwrap();
    let b = room.spawn_agent(Archetype::Gatherer, Hex::new(4, 0)).unwrap();
    move_to(&mut room, a, node);
    move_to(&mut room, b, node);

    for _ in 0..10 {
        room.tick();
    }

    let holder = room.agent(a).unwrap();
    let loser = room.agent(b).unwrap();
    assert_eq!(holder.state, AgentState::Gathering);
    assert_eq!(loser.hex, node);
    assert_eq!(loser.state, AgentState::Idle);
    assert_eq!(loser.claim, None);
    assert_eq!(room.minerals()[0].locked_by, Some(a));
}

#[test]
fn moving_away_cancels_mining() {
    let node = Hex::new(1, 0);
    let mut room = active_room(grid_with_minerals(10, 10, &[node]), scenario_config(), 4);
    let id = room.spawn_agent(Archetype::Gatherer, node).unwrap();
    // Spawning on a mineral does not claim it; walk off and back.
    move_to(&mut room, id, Hex::new(0, 0));
    for _ in 0..5 {
        room.tick();
    }
    move_to(&mut room, id, node);
    for _ in 0..8 {
        room.tick();
    }
    assert_eq!(room.agent(id).unwrap().state, AgentState::Gathering);
    assert!(room.minerals()[0].work > 0);

    move_to(&mut room, id, Hex::new(5, 0));
    let mineral = &room.minerals()[0];
    assert_eq!(mineral.locked_by, None);
    assert_eq!(mineral.work, 0);
    assert_eq!(room.agent(id).unwrap().claim, None);
}

#[test]
fn rejected_moves_keep_the_claim() {
    let node = Hex::new(1, 0);
    let wall = Hex::new(5, 5);
    let mut grid = grid_with_minerals(10, 10, &[node]);
    grid.blocked.insert(wall);
    let mut room = active_room(grid, scenario_config(), 4);
    let id = room.spawn_agent(Archetype::Gatherer, Hex::new(0, 0)).unwrap();
    move_to(&mut room, id, node);
    for _ in 0..8 {
        room.tick();
    }
    assert_eq!(room.agent(id).unwrap().state, AgentState::Gathering);
    let before = room.minerals()[0].clone();
    assert_eq!(before.locked_by, Some(id));
    assert!(before.work > 0);

    assert_eq!(
        move_to(&mut room, id, wall),
        CommandOutcome::Ignored(IgnoreReason::Unreachable)
    );
    assert_eq!(
        move_to(&mut room, id, node),
        CommandOutcome::Ignored(IgnoreReason::AlreadyThere)
    );

    let after = &room.minerals()[0];
    assert_eq!(after.locked_by, Some(id));
    assert_eq!(after.work, before.work);
    let agent = room.agent(id).unwrap();
    assert_eq!(agent.state, AgentState::Gathering);
    assert_eq!(agent.claim, Some(before.id));
}

// =============================================================================
// Elimination
// =============================================================================

#[test]
fn elimination_triggers_cooldown() {
    let mut room = active_room(open_grid(10, 10), scenario_config(), 6);
    let hunter = room.spawn_agent(Archetype::Hunter, Hex::new(2, 2)).unwrap();
    let first = room.spawn_agent(Archetype::Gatherer, Hex::new(3, 2)).unwrap();
    let second = room.spawn_agent(Archetype::Gatherer, Hex::new(2, 3)).unwrap();

    assert!(room
        .apply_command(hunter, Command::Eliminate { target: first })
        .is_applied());
    let cooldowns = &room.agent(hunter).unwrap().cooldowns;
    assert_eq!(cooldowns.remaining(Ability::Eliminate), 25_000);

    let again = room.apply_command(hunter, Command::Eliminate { target: second });
    assert_eq!(again, CommandOutcome::Ignored(IgnoreReason::OnCooldown));
    assert!(room.agent(second).unwrap().alive);

    // 25 s at 200 ms per tick.
    for _ in 0..125 {
        assert!(room.tick().game_over.is_none());
    }
    assert!(room
        .apply_command(hunter, Command::Eliminate { target: second })
        .is_applied());

    let events = room.tick();
    assert_eq!(
        events.game_over,
        Some(GameOver {
            winner: Team::Red,
            reason: WinReason::TeamEliminated,
        })
    );
}

#[test]
fn eliminating_a_miner_frees_its_mineral() {
    let node = Hex::new(3, 2);
    let mut room = active_room(grid_with_minerals(10, 10, &[node]), scenario_config(), 7);
    let hunter = room.spawn_agent(Archetype::Hunter, Hex::new(2, 2)).unwrap();
    let miner = room.spawn_agent(Archetype::Gatherer, Hex::new(4, 2)).unwrap();
    room.spawn_agent(Archetype::Gatherer, Hex::new(8, 8)).unwrap();
    move_to(&mut room, miner, node);
    for _ in 0..6 {
        room.tick();
    }
    assert_eq!(room.minerals()[0].locked_by, Some(miner));

    assert!(room
        .apply_command(hunter, Command::Eliminate { target: miner })
        .is_applied());
    assert_eq!(room.minerals()[0].locked_by, None);
    assert_eq!(room.agent(miner).unwrap().claim, None);
}

// =============================================================================
// Invariants and determinism
// =============================================================================

fn busy_room(seed: u64) -> Room {
    let minerals: Vec<Hex> = [(2, 1), (5, 3), (7, 7), (1, 6), (9, 2)]
        .into_iter()
        .map(|(col, row)| Offset::new(col, row).to_axial())
        .collect();
    let config = RoomConfig {
        min_work_ms: 400,
        max_work_ms: 1200,
        respawn_delay_ms: 2000,
        initial_elimination_cooldown_ms: 0,
        elimination_cooldown_ms: 1000,
        ..RoomConfig::default()
    };
    active_room(grid_with_minerals(12, 10, &minerals), config, seed)
}

fn check_mineral_invariants(room: &Room) -> std::result::Result<(), TestCaseError> {
    for mineral in room.minerals() {
        prop_assert!(mineral.work <= mineral.required_work);
        if mineral.done {
            prop_assert_eq!(mineral.locked_by, None);
            prop_assert!(mineral.respawn_at.is_some());
        }
        if let Some(holder) = mineral.locked_by {
            let agent = room.agent(holder);
            prop_assert!(agent.is_some_and(|a| a.claim == Some(mineral.id) && a.alive));
        }
        let claimants = room
            .agents()
            .iter_sorted()
            .filter(|a| a.claim == Some(mineral.id))
            .count();
        prop_assert!(claimants <= 1, "{} claimed {} times", mineral.id, claimants);
    }
    Ok(())
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    #[test]
    fn mineral_invariants_hold_every_tick(
        seed in arb_seed(),
        script in arb_script(12, 10, 8, 150, 60),
    ) {
        let mut room = busy_room(seed);
        for _ in 0..200 {
            apply_due_commands(&mut room, &script);
            room.tick();
            check_mineral_invariants(&room)?;
        }
    }
}

#[test]
fn scripted_room_is_deterministic() {
    let script: Vec<ScriptedCommand> = (1..=8u64)
        .map(|entity| ScriptedCommand {
            tick: entity * 3,
            entity,
            command: Command::Move(MoveTarget::Offset(Offset::new(entity as i32, 5))),
        })
        .collect();
    assert!(verify_room_determinism(|| busy_room(2024), &script, 400));
}
