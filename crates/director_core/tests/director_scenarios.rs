//! Whole-director scenarios against the scripted arena.

use std::collections::BTreeSet;

use director_core::cadence::CadencePhase;
use director_core::capabilities::BuffCapabilities;
use director_core::commander::CommanderResponse;
use director_core::config::{DirectorConfig, SpawnTuning};
use director_core::director::Director;
use director_core::hooks::{Hook, StageInfo};
use director_core::host::{player_centroid, PlayerId, World};
use director_core::math::Vec2;
use director_core::operation::DoctrineProfile;
use director_core::roles::Role;
use director_core::spawn::{BatchKind, SpawnAnchor, SpawnLayer, SpawnRequest};
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use director_test_utils::determinism::{
    find_first_divergence, run_scenario, verify_scenario_determinism, ScenarioScript,
};
use director_test_utils::fixtures::{FixedPool, ScriptedArena};

fn arena() -> ScriptedArena {
    ScriptedArena::new().with_players(3).with_objective(Vec2::ZERO, 12.0)
}

fn started(seed: u64, arena: &mut ScriptedArena) -> Director<FixedPool> {
    let mut director = Director::new(DirectorConfig::default(), FixedPool::standard()).unwrap();
    director.handle_hook(arena, Hook::RunStart { seed });
    director
}

fn tick_for(director: &mut Director<FixedPool>, arena: &mut ScriptedArena, ticks: u32) -> usize {
    let mut defeats = 0;
    for _ in 0..ticks {
        defeats += director.tick(arena).commander_defeats.len();
        arena.step(0.05);
    }
    defeats
}

#[test]
fn test_scripted_run_is_deterministic() {
    let config = DirectorConfig::default();
    let script = ScenarioScript::default();
    verify_scenario_determinism(&config, &script, 3).unwrap().assert_deterministic();
    assert_eq!(find_first_divergence(&config, &script).unwrap(), None);
}

#[test]
fn test_different_seeds_diverge() {
    let config = DirectorConfig::default();
    let a = run_scenario(&config, &ScenarioScript::default()).unwrap();
    let b = run_scenario(
        &config,
        &ScenarioScript {
            seed: 8,
            ..ScenarioScript::default()
        },
    )
    .unwrap();
    assert_ne!(a.final_hash(), b.final_hash());
}

#[test]
fn test_scripted_run_snapshots_are_well_formed() {
    let trace = run_scenario(&DirectorConfig::default(), &ScenarioScript::default()).unwrap();
    assert!(trace.spawned > 0);
    assert!(trace.defeats >= 1);
    assert!(!trace.snapshots.is_empty());
    for snapshot in &trace.snapshots {
        let state = snapshot.state().unwrap();
        assert!(state.active);
        assert_ne!(state.warnings[0], state.warnings[1]);
        assert!((0.0..=100.0).contains(&state.intensity));
        assert!(state.siege_tier <= 3);
    }
}

#[test]
fn test_first_stage_balanced_then_learned() {
    let mut arena = arena();
    let mut director = started(5, &mut arena);
    for stage in 0..4 {
        let events = director.handle_hook(&mut arena, Hook::StageStart(StageInfo::new(stage, 1.0)));
        let roll = events.operation_changed.unwrap();
        if stage == 0 {
            assert_eq!(roll.doctrine(), DoctrineProfile::Balanced);
        }
        assert_ne!(roll.warning_a(), roll.warning_b());
        tick_for(&mut director, &mut arena, 40);
    }
    assert_eq!(director.run_state().stages_committed(), 3);
}

#[test]
fn test_each_commander_defeat_rolls_exactly_one_response() {
    let mut arena = arena();
    let mut director = started(21, &mut arena);
    let info = StageInfo::new(0, 1.0).with_command_zones([Vec2::new(40.0, 0.0), Vec2::new(-40.0, 0.0)]);
    director.handle_hook(&mut arena, Hook::StageStart(info));
    let elites = arena.elites();
    assert!(!elites.is_empty());

    for unit in &elites {
        arena.kill(*unit);
    }
    let events = director.tick(&mut arena);
    assert_eq!(events.commander_defeats.len(), elites.len());
    for report in &events.commander_defeats {
        assert!(CommanderResponse::ALL.contains(&report.response));
        assert_eq!(report.pivoted_to.is_some(), report.response == CommanderResponse::DoctrinePivot);
    }
    assert!(arena.currency(PlayerId(1)) > 0);
    assert!(arena.containers() >= elites.len());

    assert_eq!(tick_for(&mut director, &mut arena, 100), 0);
}

#[test]
fn test_mercy_window_respects_cooldown() {
    let mut arena = arena();
    let mut director = started(3, &mut arena);
    director.handle_hook(&mut arena, Hook::StageStart(StageInfo::new(0, 1.0)));
    tick_for(&mut director, &mut arena, 10);

    let first = director.handle_hook(&mut arena, Hook::PlayerDeath { player: PlayerId(2) });
    assert!(first.mercy_opened);
    assert!(director.snapshot_state().mercy);

    let second = director.handle_hook(&mut arena, Hook::PlayerDeath { player: PlayerId(3) });
    assert!(!second.mercy_opened);

    // Longest window is 10s.
    tick_for(&mut director, &mut arena, 220);
    assert!(!director.snapshot_state().mercy);

    // Longest window plus cooldown is 18s.
    tick_for(&mut director, &mut arena, 200);
    let third = director.handle_hook(&mut arena, Hook::PlayerDeath { player: PlayerId(1) });
    assert!(third.mercy_opened);
}

#[test]
fn test_observers_see_snapshots_until_they_leave() {
    let mut arena = arena();
    let mut director = started(9, &mut arena);
    let rx = director.subscribe();
    director.handle_hook(&mut arena, Hook::StageStart(StageInfo::new(0, 1.0)));
    tick_for(&mut director, &mut arena, 60);

    let received: Vec<_> = rx.try_iter().collect();
    assert!(!received.is_empty());
    assert!(received.iter().all(|s| s.is_active()));

    drop(rx);
    tick_for(&mut director, &mut arena, 60);
    assert_eq!(director.observer_count(), 0);
}

#[test]
fn test_snapshot_accessor_matches_state() {
    let mut arena = arena();
    let mut director = started(4, &mut arena);
    assert!(!director.snapshot().is_active());
    director.handle_hook(&mut arena, Hook::StageStart(StageInfo::new(0, 1.0)));
    tick_for(&mut director, &mut arena, 5);
    let state = director.snapshot().state().unwrap();
    assert_eq!(state.doctrine, DoctrineProfile::Balanced);
    assert_eq!(state.phase, director.snapshot_state().phase);
}

#[test]
fn test_only_a_pivot_changes_the_doctrine() {
    let mut seen = BTreeSet::new();
    for seed in 0..300 {
        let mut arena = arena();
        let mut director = started(seed, &mut arena);
        let info = StageInfo::new(0, 1.0).with_command_zones([Vec2::new(40.0, 0.0), Vec2::new(-40.0, 0.0)]);
        director.handle_hook(&mut arena, Hook::StageStart(info));

        // One defeat per tick, so each report is judged on its own.
        for unit in arena.elites() {
            let before = director.session().unwrap().roll().doctrine();
            arena.kill(unit);
            let events = director.tick(&mut arena);
            assert_eq!(events.commander_defeats.len(), 1);
            let report = events.commander_defeats[0];
            let after = director.session().unwrap().roll().doctrine();
            seen.insert(report.response.name());
            if report.response == CommanderResponse::DoctrinePivot {
                assert_eq!(report.pivoted_to, Some(after));
            } else {
                assert_eq!(before, after, "{} changed the doctrine", report.response.name());
                assert!(events.operation_changed.is_none());
            }
        }
        if seen.len() == CommanderResponse::ALL.len() {
            return;
        }
    }
    panic!("only saw responses {seen:?}");
}

#[test]
fn test_refused_spawns_keep_their_credit() {
    let mut arena = arena();
    arena.set_refuse_spawns(true);
    let players = arena.players();
    let mut layer = SpawnLayer::new(SpawnTuning::default());
    let before = layer.credit().banked();
    let mut rng = ChaCha8Rng::seed_from_u64(1);
    let request = SpawnRequest::new(BatchKind::AssaultPulse, SpawnAnchor::Objective, Role::Contester, 4);

    let spawned = layer.execute(
        &request,
        &FixedPool::standard(),
        &mut arena,
        &players,
        0,
        &[],
        &BuffCapabilities::all(),
        &mut rng,
    );
    assert!(spawned.is_empty());
    assert_eq!(layer.credit().banked(), before);

    arena.set_refuse_spawns(false);
    let spawned = layer.execute(
        &request,
        &FixedPool::standard(),
        &mut arena,
        &players,
        0,
        &[],
        &BuffCapabilities::all(),
        &mut rng,
    );
    assert_eq!(spawned.len(), 4);
    assert!((layer.credit().banked() - (before - 4.0)).abs() < 1e-4);
}

#[test]
fn test_invalid_zone_falls_back_to_player_centroid() {
    let objective = Vec2::new(100.0, 0.0);
    let mut arena = ScriptedArena::new().with_players(3).with_objective(objective, 12.0);
    let mut director = started(17, &mut arena);
    director.handle_hook(&mut arena, Hook::StageStart(StageInfo::new(0, 1.0)));
    director.handle_hook(&mut arena, Hook::ChargeBegin);

    let mut ticks = 0;
    while director.session().unwrap().phase() != CadencePhase::Assault {
        director.tick(&mut arena);
        ticks += 1;
        assert!(ticks < 2000, "never reached an assault");
    }

    arena.set_zone_valid(false);
    arena.kill_all_enemies();
    let centroid = player_centroid(&arena.players()).unwrap();
    let reach = SpawnTuning::default().spawn_ring.max + 4.0 + 1e-3;
    let mut spawned = Vec::new();
    for _ in 0..600 {
        let events = director.tick(&mut arena);
        assert!(!events.session_reset);
        spawned.extend(events.spawned);
    }

    assert!(!spawned.is_empty());
    for unit in &spawned {
        assert!(
            unit.position.distance(centroid) <= reach,
            "unit at {:?} is not anchored on the players",
            unit.position
        );
        assert!(unit.position.distance(objective) > 50.0);
    }
    assert!(director.session().unwrap().check_invariants().is_ok());
}
