//! Sign-detection example for symbios-tpg.
//!
//! Each agent sees a stream of numbers and must raise its single output bit
//! whenever the current number is positive. Fitness is the fraction of steps
//! answered correctly.
//!
//! Run with: `RUST_LOG=info cargo run --example sign_task`

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use symbios_tpg::{Evolver, GraphStore, Organism, TpgConfig};
use tracing_subscriber::EnvFilter;

const STEPS: usize = 16;

/// Run every organism on the same random stream and log one reward per step.
fn evaluate(store: &mut GraphStore, population: &mut [Organism], rng: &mut ChaCha8Rng) {
    let stream: Vec<f64> = (0..STEPS).map(|_| rng.random_range(-1.0..1.0)).collect();

    for organism in population.iter_mut() {
        organism.policy.reset();
        for &x in &stream {
            organism.policy.set_input(0, x);
            organism.policy.update(store, rng);
            let wanted = if x > 0.0 { 1.0 } else { 0.0 };
            let reward = if organism.policy.read_output(0) == wanted {
                1.0
            } else {
                0.0
            };
            organism.data.append("score", reward);
        }
    }
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    println!("TPG Sign Task Example");
    println!("=====================\n");

    let mut config = TpgConfig::default();
    config.initial_nodes = 60;
    config.evolver.new_nodes_target = 60;
    config.evolver.max_nodes_allowed = 400;
    config.evolver.save_best_on = 0;
    config.evolver.save_best3_on = 0;
    config.evolver.save_full_graph_on = 0;

    let generations = 50;
    let seed = 42;

    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    let mut evolver = match Evolver::new(config) {
        Ok(evolver) => evolver,
        Err(e) => {
            eprintln!("bad configuration: {e}");
            return;
        }
    };
    let (mut store, mut population) = match evolver.initial_population(1, 1, &mut rng) {
        Ok(seeded) => seeded,
        Err(e) => {
            eprintln!("could not seed population: {e}");
            return;
        }
    };

    println!("Population: {}", population.len());
    println!("Generations: {}", generations);
    println!();

    let mut best_fitness = f64::NEG_INFINITY;
    let mut champion = None;

    for gen in 0..generations {
        evaluate(&mut store, &mut population, &mut rng);
        if let Err(e) = evolver.score(&mut population) {
            eprintln!("scoring failed: {e}");
            return;
        }

        if evolver.max_score() > best_fitness {
            best_fitness = evolver.max_score();
            let best = evolver
                .scores()
                .iter()
                .copied()
                .fold(None::<(usize, f64)>, |acc, (i, s)| match acc {
                    Some((_, top)) if top >= s => acc,
                    _ => Some((i, s)),
                });
            champion = best.and_then(|(i, _)| population[i].policy.serialize(&store));
        }

        let report = match evolver.cleanup(&mut store, &mut population, &mut rng) {
            Ok(report) => report,
            Err(e) => {
                eprintln!("cleanup failed: {e}");
                return;
            }
        };

        if gen % 10 == 0 || gen == generations - 1 {
            println!(
                "Gen {:3}: best={:.4}, avg={:.4}, nodes={}, roots={}, programs={}",
                gen,
                report.max_fitness,
                report.mean_fitness,
                report.node_count,
                report.root_count,
                report.program_count
            );
        }
    }

    println!();
    println!("Evolution Complete!");
    println!("==================");
    println!("Best fitness: {:.4}", best_fitness);
    if let Some(record) = champion {
        println!("Champion root: N{}", record.root_node);
        println!("Champion nodes: {}", record.nodes);
    }
}
