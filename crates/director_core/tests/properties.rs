//! Property tests over the director's pure building blocks.

use director_core::adaptation::{blend_signal, RunAdaptationState, StageLedger, StageTelemetry};
use director_core::capabilities::BuffCapabilities;
use director_core::commander::{CommanderKind, CommanderNode};
use director_core::config::{AdaptationTuning, CommanderTuning, SelectorTuning, SiegeTuning};
use director_core::fairness::raw_lone_wolf_pressure;
use director_core::host::World;
use director_core::selector::{DoctrineHistory, OperationSelector};
use director_core::snapshot::{DirectorSnapshot, SnapshotState, SNAPSHOT_WIRE_SIZE};
use director_test_utils::determinism::strategies::*;
use director_test_utils::fixtures::{FixedPool, ScriptedArena};
use director_test_utils::proptest::prelude::*;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;

proptest! {
    #[test]
    fn test_rolled_warnings_are_distinct(
        seed in any::<u64>(),
        stage in 0u32..20,
        telemetry in arb_stage_telemetry(),
    ) {
        let selector = OperationSelector::new(SelectorTuning::default());
        let tuning = AdaptationTuning::default();
        let mut run = RunAdaptationState::new();
        run.blend(&telemetry.normalize(&tuning, 1.0), &tuning);
        let mut rng = ChaCha8Rng::seed_from_u64(seed);
        let roll = selector.roll(stage, &run, &DoctrineHistory::default(), &mut rng);
        prop_assert_ne!(roll.warning_a(), roll.warning_b());
        if stage == 0 {
            prop_assert_eq!(roll.doctrine().name(), "balanced");
        }
    }

    #[test]
    fn test_weights_stay_in_bounds(raw in arb_any_weight()) {
        let tuning = SelectorTuning::default();
        let selector = OperationSelector::new(tuning.clone());
        let w = selector.clamp_weight(raw);
        prop_assert!(w >= tuning.weight_min && w <= tuning.weight_max);
    }

    #[test]
    fn test_signals_stay_in_unit_range(
        stages in proptest::collection::vec(arb_stage_telemetry(), 1..12),
        difficulty in 0.0f32..5.0,
    ) {
        let tuning = AdaptationTuning::default();
        let mut run = RunAdaptationState::new();
        for telemetry in &stages {
            let mut ledger = StageLedger::new();
            if let Some(t) = ledger.telemetry_mut() {
                *t = telemetry.clone();
            }
            prop_assert!(ledger.commit(&mut run, &tuning, difficulty));
            prop_assert!(!ledger.commit(&mut run, &tuning, difficulty));
            for s in run.signals() {
                prop_assert!((0.0..=1.0).contains(&s));
            }
        }
        prop_assert_eq!(run.stages_committed(), stages.len() as u32);
    }

    #[test]
    fn test_quiet_stage_never_raises_a_signal(
        old in 0.0f32..=1.0,
        tuning in arb_signal_tuning(),
    ) {
        let next = blend_signal(old, 0.0, tuning);
        prop_assert!(next <= old);
        if old > 0.0 {
            prop_assert!(next < old);
        }
    }

    #[test]
    fn test_lone_wolf_pressure_in_unit_range(
        players in arb_players(),
        objective in arb_objective(),
    ) {
        let p = raw_lone_wolf_pressure(&players, Some(&objective), 1.5);
        prop_assert!((0.0..=1.0).contains(&p));
        if !objective.zone_valid || players.iter().all(|p| !p.alive) {
            prop_assert_eq!(p, 0.0);
        }
    }

    #[test]
    fn test_commander_defeat_reported_once(
        kind_index in 0usize..4,
        anchor in arb_position(),
        death_tick in 0u32..50,
        extra_ticks in 1u32..50,
    ) {
        let tuning = CommanderTuning::default();
        let caps = BuffCapabilities::all();
        let pool = FixedPool::standard();
        let mut arena = ScriptedArena::new().with_players(2);
        let template = director_core::host::SpawnPoolProvider::pool(
            &pool,
            director_core::host::PoolCategory::Commander,
        )[0]
        .clone();
        let unit = arena
            .spawn(
                &template,
                anchor,
                0.0,
                director_core::host::Team::Enemy,
                director_core::host::SpawnOptions { elite: true, ..Default::default() },
            )
            .unwrap();
        let mut node = CommanderNode::new(unit, CommanderKind::ALL[kind_index], anchor, &tuning);
        let players = arena.players();
        let mut defeats = 0;
        for t in 0..death_tick + extra_ticks {
            if t == death_tick {
                arena.kill(unit);
            }
            if node.tick(0.05, &mut arena, &players, &tuning, &caps).is_some() {
                defeats += 1;
            }
        }
        prop_assert_eq!(defeats, 1);
        prop_assert!(node.is_consumed());
    }

    #[test]
    fn test_snapshot_quantize_keeps_ids_and_clamps(
        intensity in arb_any_weight(),
        charge in 0.0f32..=1.0,
        doctrine in arb_doctrine(),
    ) {
        let state = SnapshotState {
            active: true,
            doctrine,
            intensity,
            charge_fraction: charge,
            ..SnapshotState::default()
        };
        let snapshot = DirectorSnapshot::quantize(&state);
        prop_assert!((0.0..=100.0).contains(&snapshot.intensity()));
        let decoded = snapshot.state().unwrap();
        prop_assert_eq!(decoded.doctrine, doctrine);
        prop_assert!((decoded.charge_fraction - charge).abs() < 1e-3);
        prop_assert_eq!(snapshot.encode().unwrap().len(), SNAPSHOT_WIRE_SIZE);
    }
}

#[test]
fn test_full_escalation_uses_tier_three_table() {
    let siege = SiegeTuning::default();
    assert!((siege.breather_multiplier(3) - siege.breather_scale[3]).abs() < 1e-6);
    assert!((siege.assault_multiplier(3) - siege.assault_scale[3]).abs() < 1e-6);
    assert!((siege.pulse_multiplier(3) - siege.pulse_interval_scale[3]).abs() < 1e-6);
    assert!((siege.heavy_chance(3) - siege.heavy_chance[3]).abs() < 1e-6);
    assert_eq!(siege.count_bonus(3), 2);
}

#[test]
fn test_half_escalation_is_halfway_to_tier_three() {
    let siege = SiegeTuning {
        escalation: 0.5,
        ..SiegeTuning::default()
    };
    let expected = 1.0 + (siege.breather_scale[3] - 1.0) * 0.5;
    assert!((siege.breather_multiplier(3) - expected).abs() < 1e-6);
    assert!((siege.breather_multiplier(0) - 1.0).abs() < 1e-6);
}

#[test]
fn test_tiers_follow_charge_quarters() {
    assert_eq!(SiegeTuning::tier_for(0.0), 0);
    assert_eq!(SiegeTuning::tier_for(0.24), 0);
    assert_eq!(SiegeTuning::tier_for(0.25), 1);
    assert_eq!(SiegeTuning::tier_for(0.6), 2);
    assert_eq!(SiegeTuning::tier_for(0.99), 3);
    assert_eq!(SiegeTuning::tier_for(1.0), 3);
}

#[test]
fn test_zero_telemetry_sample_is_zero() {
    let sample = StageTelemetry::default().normalize(&AdaptationTuning::default(), 1.0);
    assert!(sample.signals.iter().all(|s| *s == 0.0));
    assert!(sample.roles.iter().all(|s| *s == 0.0));
}
