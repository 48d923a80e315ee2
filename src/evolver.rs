//! Generational evolution of a population of policies.
//!
//! The simulation owns a `Vec<Organism>` and one [`GraphStore`]. Each
//! generation it runs every organism, calls [`Evolver::score`], then
//! [`Evolver::cleanup`], which rebuilds the population in place:
//!
//! 1. rank organisms by fitness
//! 2. evict every root node (last generation's policies)
//! 3. spawn pairs of new roots, an exact clone and a mutated clone of a
//!    rank-biased parent, until the spawn target or the pool cap is reached
//! 4. drop unreferenced programs
//! 5. bind one fresh organism to each remaining root

use rand::Rng;
use tracing::{debug, error, info};

use crate::config::TpgConfig;
use crate::dot;
use crate::error::{TpgError, TpgResult};
use crate::fitness::{DataMap, FitnessExpr};
use crate::node::rank_descending;
use crate::policy::Policy;
use crate::program::Action;
use crate::store::{GraphStore, NodeId, ProgramId};

/// Data-map key the evaluated fitness is written back under.
pub const OPTIMIZE_VALUE_KEY: &str = "optimizeValue";

/// Exponent of the rank-biased parent draw. Above 1 favours the top ranks.
pub const SELECTION_BIAS: f64 = 1.5;

/// An agent: one policy plus the behaviour recorded while it ran.
#[derive(Debug, Clone)]
pub struct Organism {
    /// Decision policy.
    pub policy: Policy,
    /// Behaviour log the fitness expression reads.
    pub data: DataMap,
}

impl Organism {
    /// Wrap a policy with an empty behaviour log.
    #[must_use]
    pub fn new(policy: Policy) -> Self {
        Self {
            policy,
            data: DataMap::new(),
        }
    }
}

/// Summary of one [`Evolver::cleanup`] pass.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GenerationReport {
    /// Generation number, starting at 1.
    pub generation: u64,
    /// Best fitness of the scored population.
    pub max_fitness: f64,
    /// Mean fitness of the scored population.
    pub mean_fitness: f64,
    /// Nodes in the pool after cleanup.
    pub node_count: usize,
    /// Roots after cleanup, equal to the new population size.
    pub root_count: usize,
    /// Programs in the pool after cleanup.
    pub program_count: usize,
    /// Programs garbage-collected this pass.
    pub programs_removed: usize,
    /// Root nodes evicted from the previous generation.
    pub roots_evicted: usize,
    /// New roots spawned.
    pub roots_spawned: usize,
    /// DOT graph of the best organism, when its interval fired.
    pub best_graph: Option<String>,
    /// DOT graph of the best three organisms, when its interval fired.
    pub best3_graph: Option<String>,
    /// DOT graph of the whole pool, when its interval fired.
    pub full_graph: Option<String>,
}

/// Scores a population and rebuilds it from the graph store.
#[derive(Debug, Clone)]
pub struct Evolver {
    config: TpgConfig,
    fitness: FitnessExpr,
    scores: Vec<(usize, f64)>,
    max_score: f64,
    mean_score: f64,
    generation: u64,
}

impl Evolver {
    /// Create an evolver.
    ///
    /// # Errors
    ///
    /// Returns [`TpgError::InvalidConfig`] if `config` fails validation, or
    /// [`TpgError::FitnessExpr`] if `config.evolver.optimize_value` does not
    /// parse.
    pub fn new(config: TpgConfig) -> TpgResult<Self> {
        config.validate()?;
        let fitness = FitnessExpr::parse(&config.evolver.optimize_value)?;
        Ok(Self {
            config,
            fitness,
            scores: Vec::new(),
            max_score: 0.0,
            mean_score: 0.0,
            generation: 0,
        })
    }

    /// The configuration in use.
    #[must_use]
    pub fn config(&self) -> &TpgConfig {
        &self.config
    }

    /// The parsed fitness expression.
    #[must_use]
    pub fn fitness(&self) -> &FitnessExpr {
        &self.fitness
    }

    /// Completed cleanup passes.
    #[must_use]
    pub const fn generation(&self) -> u64 {
        self.generation
    }

    /// Best fitness from the last [`score`](Self::score).
    #[must_use]
    pub const fn max_score(&self) -> f64 {
        self.max_score
    }

    /// Mean fitness from the last [`score`](Self::score).
    #[must_use]
    pub const fn mean_score(&self) -> f64 {
        self.mean_score
    }

    /// `(organism index, fitness)` pairs from the last [`score`](Self::score).
    #[must_use]
    pub fn scores(&self) -> &[(usize, f64)] {
        &self.scores
    }

    /// Seed a fresh graph store and build the first population:
    /// `initial_nodes` organisms, each on its own new root holding two
    /// random pool programs.
    ///
    /// # Errors
    ///
    /// Returns [`TpgError::InvalidConfig`] if `output_count` is too wide to
    /// encode.
    pub fn initial_population<R: Rng>(
        &self,
        input_count: usize,
        output_count: usize,
        rng: &mut R,
    ) -> TpgResult<(GraphStore, Vec<Organism>)> {
        let (mut store, progenitor) =
            Policy::new(input_count, output_count, &self.config, rng)?;
        let mut population = Vec::with_capacity(self.config.initial_nodes);
        population.push(Organism::new(progenitor));
        while population.len() < self.config.initial_nodes {
            let policy = Policy::sprout(
                &mut store,
                input_count,
                output_count,
                self.config.hidden_count,
                rng,
            )
            .ok_or(TpgError::EmptyPopulation)?;
            population.push(Organism::new(policy));
        }
        Ok((store, population))
    }

    /// Evaluate the fitness expression for every organism.
    ///
    /// Each fitness is also written back into the organism's log under
    /// [`OPTIMIZE_VALUE_KEY`].
    ///
    /// # Errors
    ///
    /// Returns [`TpgError::EmptyPopulation`] if `population` is empty.
    pub fn score(&mut self, population: &mut [Organism]) -> TpgResult<()> {
        if population.is_empty() {
            return Err(TpgError::EmptyPopulation);
        }
        self.scores.clear();
        let mut max = f64::NEG_INFINITY;
        let mut total = 0.0;
        for (i, organism) in population.iter_mut().enumerate() {
            let value = self.fitness.evaluate(&organism.data);
            organism.data.set(OPTIMIZE_VALUE_KEY, value);
            self.scores.push((i, value));
            total += value;
            max = max.max(value);
        }
        self.max_score = max;
        self.mean_score = total / population.len() as f64;
        Ok(())
    }

    /// Restructure the store and replace `population` with one organism per
    /// newly spawned root.
    ///
    /// A population that was not scored since the last cleanup is scored
    /// first.
    ///
    /// # Errors
    ///
    /// Returns [`TpgError::EmptyPopulation`] if `population` is empty, and
    /// [`TpgError::MissingRoot`] if an organism's root is not in `store`.
    /// Both indicate a setup defect and are detected before the store or the
    /// population is modified.
    pub fn cleanup<R: Rng>(
        &mut self,
        store: &mut GraphStore,
        population: &mut Vec<Organism>,
        rng: &mut R,
    ) -> TpgResult<GenerationReport> {
        let Some(example) = population.first() else {
            error!("cleanup called with an empty population");
            return Err(TpgError::EmptyPopulation);
        };
        let (input_count, output_count, hidden_count) = (
            example.policy.input_count(),
            example.policy.output_count(),
            example.policy.hidden_count(),
        );

        // Every organism can be drawn as a parent, so resolve all of their
        // program lists before the store changes.
        let mut templates: Vec<Vec<ProgramId>> = Vec::with_capacity(population.len());
        for (index, organism) in population.iter().enumerate() {
            let root = organism.policy.root();
            match store.node(root) {
                Some(node) => templates.push(node.programs().to_vec()),
                None => {
                    error!(index, ?root, "organism has no root node in the graph store");
                    return Err(TpgError::MissingRoot);
                }
            }
        }

        if self.scores.len() != population.len() {
            self.score(population)?;
        }

        self.generation += 1;
        let generation = self.generation;
        let evolver = &self.config.evolver;

        let rank_order = rank_scores(&self.scores);
        let ranked_roots: Vec<NodeId> = rank_order
            .iter()
            .map(|&i| population[i].policy.root())
            .collect();

        let mut report = GenerationReport {
            generation,
            max_fitness: self.max_score,
            mean_fitness: self.mean_score,
            ..GenerationReport::default()
        };
        if fires(evolver.save_best_on, generation) {
            report.best_graph = Some(dot::graph_from_roots(store, &ranked_roots[..1]));
        }
        if fires(evolver.save_best3_on, generation) {
            let n = ranked_roots.len().min(3);
            report.best3_graph = Some(dot::graph_from_roots(store, &ranked_roots[..n]));
        }
        if fires(evolver.save_full_graph_on, generation) {
            report.full_graph = Some(dot::graph_all(store));
        }

        report.roots_evicted = store.evict_roots().len();

        let mut spawned = 0;
        while spawned < evolver.new_nodes_target && store.node_count() < evolver.max_nodes_allowed {
            let draw = rng.random::<f64>().powf(SELECTION_BIAS);
            let pick = ((draw * rank_order.len() as f64) as usize).min(rank_order.len() - 1);
            let template = &templates[rank_order[pick]];
            store.spawn_clone(template);
            store.spawn_mutant(template, &self.config, rng);
            spawned += 2;
        }
        report.roots_spawned = spawned;

        report.programs_removed = store.collect_garbage();

        let roots = store.root_ids();
        population.clear();
        population.extend(
            roots
                .iter()
                .map(|&root| Organism::new(Policy::bind(input_count, output_count, hidden_count, root))),
        );
        self.scores.clear();

        debug_assert!(store.audit().is_ok(), "graph store invariants broken by cleanup");

        report.node_count = store.node_count();
        report.root_count = roots.len();
        report.program_count = store.program_count();

        if fires(evolver.save_report_on, generation) {
            log_pool(store);
        }
        info!(
            generation,
            max_fitness = report.max_fitness,
            mean_fitness = report.mean_fitness,
            nodes = report.node_count,
            roots = report.root_count,
            programs = report.program_count,
            programs_removed = report.programs_removed,
            "generation complete"
        );

        Ok(report)
    }
}

/// Order organism indices by descending fitness, extracting the maximum
/// repeatedly and swap-removing it. Ties favour the earliest remaining pair.
#[must_use]
pub fn rank_scores(scores: &[(usize, f64)]) -> Vec<usize> {
    let values: Vec<f64> = scores.iter().map(|&(_, v)| v).collect();
    rank_descending(&values)
        .into_iter()
        .map(|i| scores[i].0)
        .collect()
}

#[inline]
const fn fires(interval: u64, generation: u64) -> bool {
    interval != 0 && generation % interval == 0
}

fn log_pool(store: &GraphStore) {
    for (_, node) in store.nodes() {
        let programs: Vec<u64> = node
            .programs()
            .iter()
            .filter_map(|&p| store.program(p).map(|program| program.id))
            .collect();
        debug!(
            node = node.id,
            programs = ?programs,
            parents = node.parent_count(),
            "node"
        );
    }
    for (_, program) in store.programs() {
        match program.action() {
            Action::Atomic { outputs, hidden } => debug!(
                program = program.id,
                parents = program.parent_count(),
                outputs,
                hidden,
                "atomic program"
            ),
            Action::Node(target) => debug!(
                program = program.id,
                parents = program.parent_count(),
                target_node = store.node(target).map(|n| n.id),
                "linking program"
            ),
        }
    }
}
