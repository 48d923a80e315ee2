//! Benchmarks for symbios-tpg.

use std::hint::black_box;

use criterion::{criterion_group, criterion_main, Criterion};
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use symbios_tpg::{Evolver, GraphStore, Policy, Program, TpgConfig};

fn bench_program_evaluate(c: &mut Criterion) {
    let config = TpgConfig::default();
    let mut rng = ChaCha8Rng::seed_from_u64(42);
    let program = Program::random(&config.program, 2, config.hidden_count, &mut rng);
    let inputs = [0.5, -0.5, 1.0, 0.0];
    let hidden = [1.0, 0.0, 0.0, 1.0];

    c.bench_function("program_evaluate", |b| {
        b.iter(|| {
            black_box(program.evaluate(black_box(&inputs), &hidden, &mut rng));
        });
    });
}

fn bench_policy_update(c: &mut Criterion) {
    let mut config = TpgConfig::default();
    config.program.mutate_action_prob = 0.5;
    let mut rng = ChaCha8Rng::seed_from_u64(42);
    let (mut store, root) = GraphStore::seed(&config, 2, &mut rng).expect("valid config");

    // Grow some linked structure
    for _ in 0..50 {
        if let Some(node) = store.random_node(&mut rng) {
            store.clone_and_mutate_node(node, &config, &mut rng);
        }
    }

    let mut policy = Policy::bind(4, 2, config.hidden_count, root);
    policy.set_input(0, 0.5);
    policy.set_input(3, -1.0);

    c.bench_function("policy_update", |b| {
        b.iter(|| {
            black_box(policy.update(&mut store, &mut rng));
        });
    });
}

fn bench_generation(c: &mut Criterion) {
    let config = TpgConfig::default();
    let mut rng = ChaCha8Rng::seed_from_u64(42);
    let mut evolver = Evolver::new(config).expect("valid config");
    let (mut store, mut population) = evolver
        .initial_population(2, 1, &mut rng)
        .expect("seeded");

    c.bench_function("generation_cycle", |b| {
        b.iter(|| {
            for (i, organism) in population.iter_mut().enumerate() {
                organism.policy.set_input(0, i as f64);
                organism.policy.update(&mut store, &mut rng);
                organism.data.append("score", organism.policy.read_output(0));
            }
            let report = evolver
                .cleanup(&mut store, &mut population, &mut rng)
                .expect("cleanup");
            black_box(report);
        });
    });
}

criterion_group!(
    benches,
    bench_program_evaluate,
    bench_policy_update,
    bench_generation,
);
criterion_main!(benches);
