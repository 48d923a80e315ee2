//! # Symbios TPG
//!
//! A Tangled Program Graph (TPG) engine: decision policies built from small
//! bidding programs, linked into a shared graph and evolved by population
//! search.
//!
//! ## Features
//!
//! - **Shared Graph Store**: every policy in a population draws on one pool of
//!   nodes and programs; structure is shared, never copied
//! - **Arena-Graph Model**: `SlotMap` storage with stable handles and manual
//!   parent counts maintained by every edge-changing operator
//! - **Bounded Decisions**: cyclic graphs are walked with per-node visit
//!   counters, so every decision terminates
//! - **Generational Cleanup**: root eviction, rank-biased respawn and program
//!   garbage collection in one pass
//!
//! ## Quick Start
//!
//! ```rust
//! use symbios_tpg::{Evolver, TpgConfig};
//! use rand::SeedableRng;
//! use rand_chacha::ChaCha8Rng;
//!
//! let mut rng = ChaCha8Rng::seed_from_u64(42);
//! let mut evolver = Evolver::new(TpgConfig::minimal()).unwrap();
//! let (mut store, mut population) = evolver.initial_population(2, 1, &mut rng).unwrap();
//!
//! for _ in 0..3 {
//!     for organism in &mut population {
//!         organism.policy.set_input(0, 0.5);
//!         organism.policy.set_input(1, -0.5);
//!         organism.policy.update(&mut store, &mut rng);
//!         let fitness = organism.policy.read_output(0);
//!         organism.data.append("score", fitness);
//!     }
//!     evolver.score(&mut population).unwrap();
//!     let report = evolver.cleanup(&mut store, &mut population, &mut rng).unwrap();
//!     assert_eq!(report.root_count, population.len());
//! }
//! store.audit().unwrap();
//! ```
//!
//! ## Architecture
//!
//! ### Programs and Nodes
//!
//! A [`Program`] runs a few register-machine instructions over
//! `presets ++ inputs ++ hidden` and returns a bid. A [`Node`] ranks its
//! programs by bid and follows the winner's [`Action`]: either an atomic
//! output (bit-encoded outputs and next hidden state) or a link to another
//! node.
//!
//! ### Reference Counts
//!
//! - `node.parent_count` = programs whose action links to the node
//! - `program.parent_count` = node slots holding the program
//!
//! A node with no parents is a root: the entry point of exactly one
//! [`Policy`]. [`GraphStore::audit`] recomputes both counts from scratch.
//!
//! ### Generations
//!
//! [`Evolver::cleanup`] evicts every root, spawns pairs of new roots from
//! rank-biased parents, drops unreferenced programs and binds one fresh
//! [`Organism`] to each surviving root.

pub mod config;
pub mod dot;
pub mod error;
pub mod evolver;
pub mod fitness;
pub mod node;
pub mod opcode;
pub mod policy;
pub mod program;
pub mod serialize;
pub mod store;

// Re-exports for convenience
pub use config::{EvolverConfig, NodeConfig, ProgramConfig, TpgConfig};
pub use error::{TpgError, TpgResult};
pub use evolver::{Evolver, GenerationReport, Organism};
pub use fitness::{DataMap, FitnessExpr};
pub use node::Node;
pub use opcode::Opcode;
pub use policy::{Decision, Policy};
pub use program::{Action, Program};
pub use serialize::SerializedPolicy;
pub use store::{GraphStore, NodeId, ProgramId};
