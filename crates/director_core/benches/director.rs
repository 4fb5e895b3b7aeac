//! Director benchmarks.
//!
//! Run with: `cargo bench -p director_core`

// Benchmark binaries don't need docs on macro-generated functions
#![allow(missing_docs)]

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;

use director_core::adaptation::RunAdaptationState;
use director_core::config::{DirectorConfig, SelectorTuning};
use director_core::director::Director;
use director_core::hooks::{Hook, StageInfo};
use director_core::math::Vec2;
use director_core::selector::{DoctrineHistory, OperationSelector};
use director_test_utils::fixtures::{FixedPool, ScriptedArena};

/// A director mid-charge with a populated arena.
fn loaded_director() -> (Director<FixedPool>, ScriptedArena) {
    let mut arena = ScriptedArena::new()
        .with_players(4)
        .with_objective(Vec2::ZERO, 12.0);
    let mut director = Director::new(DirectorConfig::default(), FixedPool::standard())
        .expect("default config is valid");
    director.handle_hook(&mut arena, Hook::RunStart { seed: 42 });
    let info = StageInfo::new(3, 1.75).with_command_zones([Vec2::new(40.0, 0.0), Vec2::new(-40.0, 0.0)]);
    director.handle_hook(&mut arena, Hook::StageStart(info));
    director.handle_hook(&mut arena, Hook::ChargeBegin);
    arena.set_charge(0.6);
    for _ in 0..1200 {
        director.tick(&mut arena);
        arena.step(0.05);
    }
    (director, arena)
}

pub fn tick_benchmark(c: &mut Criterion) {
    let (mut director, mut arena) = loaded_director();
    c.bench_function("director_tick_under_load", |b| {
        b.iter(|| {
            let events = director.tick(black_box(&mut arena));
            arena.step(0.05);
            black_box(events)
        })
    });

    c.bench_function("director_state_hash", |b| b.iter(|| black_box(director.state_hash())));
}

pub fn selection_benchmark(c: &mut Criterion) {
    let selector = OperationSelector::new(SelectorTuning::default());
    let run = RunAdaptationState::new();
    let history = DoctrineHistory::default();
    let mut rng = ChaCha8Rng::seed_from_u64(7);
    c.bench_function("operation_roll", |b| {
        b.iter(|| black_box(selector.roll(black_box(3), &run, &history, &mut rng)))
    });
}

pub fn snapshot_benchmark(c: &mut Criterion) {
    let (director, _arena) = loaded_director();
    let snapshot = director.snapshot();
    c.bench_function("snapshot_encode", |b| b.iter(|| black_box(snapshot.encode())));
}

criterion_group!(benches, tick_benchmark, selection_benchmark, snapshot_benchmark);
criterion_main!(benches);
