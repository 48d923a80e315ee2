//! Configuration for program, node and population evolution.

use serde::{Deserialize, Serialize};

use crate::error::{TpgError, TpgResult};

/// Largest output or hidden count whose atomic targets fit in a `u64`.
pub const MAX_ACTION_BITS: usize = 63;

/// Settings that shape every [`Program`](crate::program::Program).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProgramConfig {
    /// Fixed number of instructions (4 codes each: op, operand, operand, output).
    pub num_instructions: usize,
    /// Number of writable preset registers.
    pub registers_size: usize,
    /// Enables the uniform-random opcode (8 ops instead of 7).
    pub allow_random_op: bool,
    /// Chance one instruction byte is rewritten per mutation trial.
    pub mutate_instruction_prob: f64,
    /// Chance one register preset is rewritten per mutation trial.
    pub mutate_register_prob: f64,
    /// Chance the action is re-rolled per mutation trial.
    pub mutate_action_prob: f64,
}

impl Default for ProgramConfig {
    fn default() -> Self {
        Self {
            num_instructions: 5,
            registers_size: 8,
            allow_random_op: false,
            mutate_instruction_prob: 0.2,
            mutate_register_prob: 0.2,
            mutate_action_prob: 0.2,
        }
    }
}

/// Settings for [`Node`](crate::node::Node) mutation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeConfig {
    /// Chance a random pool program is added.
    pub add_program_prob: f64,
    /// Chance one reference is traded for a random pool program.
    pub trade_program_prob: f64,
    /// Chance one reference is replaced by a mutated copy of itself.
    pub mutate_program_prob: f64,
    /// Chance one reference is replaced by a mutated copy of a random pool program.
    pub trade_and_mutate_program_prob: f64,
    /// Chance one reference is deleted.
    pub delete_program_prob: f64,
    /// Upper bound on programs referenced by a node.
    pub max_programs: usize,
    /// Lower bound on programs referenced by a node.
    pub min_programs: usize,
}

impl NodeConfig {
    /// Whether at least one mutation operator can apply to a node holding
    /// `len` programs.
    #[must_use]
    pub fn can_mutate(&self, len: usize) -> bool {
        let add = self.add_program_prob > 0.0 && len < self.max_programs;
        let rewrite = len > 0
            && self.trade_program_prob + self.mutate_program_prob + self.trade_and_mutate_program_prob
                > 0.0;
        let delete = self.delete_program_prob > 0.0 && len > self.min_programs;
        add || rewrite || delete
    }
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            add_program_prob: 0.3,
            trade_program_prob: 0.3,
            mutate_program_prob: 0.1,
            trade_and_mutate_program_prob: 0.1,
            delete_program_prob: 0.2,
            max_programs: 6,
            min_programs: 2,
        }
    }
}

/// Settings for the generational [`Evolver`](crate::evolver::Evolver).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvolverConfig {
    /// Fitness expression evaluated against each organism's data map.
    pub optimize_value: String,
    /// New roots spawned per generation (two per sampled parent).
    pub new_nodes_target: usize,
    /// Hard cap on the node pool size while spawning.
    pub max_nodes_allowed: usize,
    /// Per-entity debug report every this many generations (0 disables).
    pub save_report_on: u64,
    /// Full-pool DOT graph every this many generations (0 disables).
    pub save_full_graph_on: u64,
    /// Best-root DOT graph every this many generations (0 disables).
    pub save_best_on: u64,
    /// Best-three-roots DOT graph every this many generations (0 disables).
    pub save_best3_on: u64,
}

impl Default for EvolverConfig {
    fn default() -> Self {
        Self {
            optimize_value: "DM_AVE[score]".to_string(),
            new_nodes_target: 100,
            max_nodes_allowed: 500,
            save_report_on: 1000,
            save_full_graph_on: 1000,
            save_best_on: 1000,
            save_best3_on: 1000,
        }
    }
}

/// Top-level TPG configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TpgConfig {
    /// Size of each policy's hidden-state buffer.
    pub hidden_count: usize,
    /// Programs created when a fresh pool is seeded.
    pub initial_programs: usize,
    /// Organisms (and therefore roots) in the initial population.
    pub initial_nodes: usize,
    /// Program settings.
    #[serde(default)]
    pub program: ProgramConfig,
    /// Node settings.
    #[serde(default)]
    pub node: NodeConfig,
    /// Evolver settings.
    #[serde(default)]
    pub evolver: EvolverConfig,
}

impl Default for TpgConfig {
    fn default() -> Self {
        Self {
            hidden_count: 4,
            initial_programs: 100,
            initial_nodes: 100,
            program: ProgramConfig::default(),
            node: NodeConfig::default(),
            evolver: EvolverConfig::default(),
        }
    }
}

impl TpgConfig {
    /// A small configuration for tests and quick experiments.
    #[must_use]
    pub fn minimal() -> Self {
        Self {
            hidden_count: 2,
            initial_programs: 10,
            initial_nodes: 10,
            evolver: EvolverConfig {
                new_nodes_target: 10,
                max_nodes_allowed: 100,
                ..EvolverConfig::default()
            },
            ..Self::default()
        }
    }

    /// Check every value for consistency.
    ///
    /// Mutation loops repeat until something changes, so a configuration that
    /// can never mutate would hang; those are rejected here.
    ///
    /// # Errors
    ///
    /// Returns [`TpgError::InvalidConfig`] describing the first problem found.
    pub fn validate(&self) -> TpgResult<()> {
        let p = &self.program;
        let n = &self.node;

        let probs = [
            ("program.mutate_instruction_prob", p.mutate_instruction_prob),
            ("program.mutate_register_prob", p.mutate_register_prob),
            ("program.mutate_action_prob", p.mutate_action_prob),
            ("node.add_program_prob", n.add_program_prob),
            ("node.trade_program_prob", n.trade_program_prob),
            ("node.mutate_program_prob", n.mutate_program_prob),
            (
                "node.trade_and_mutate_program_prob",
                n.trade_and_mutate_program_prob,
            ),
            ("node.delete_program_prob", n.delete_program_prob),
        ];
        for (name, value) in probs {
            if !(0.0..=1.0).contains(&value) {
                return Err(invalid(format!("{name} must be in [0, 1], got {value}")));
            }
        }

        if p.num_instructions == 0 {
            return Err(invalid("program.num_instructions must be at least 1"));
        }
        if p.registers_size == 0 {
            return Err(invalid("program.registers_size must be at least 1"));
        }
        if p.mutate_instruction_prob + p.mutate_register_prob + p.mutate_action_prob <= 0.0 {
            return Err(invalid("at least one program mutation probability must be positive"));
        }

        if n.min_programs == 0 {
            return Err(invalid("node.min_programs must be at least 1"));
        }
        if n.min_programs > n.max_programs {
            return Err(invalid(format!(
                "node.min_programs ({}) exceeds node.max_programs ({})",
                n.min_programs, n.max_programs
            )));
        }
        let always_applicable =
            n.trade_program_prob + n.mutate_program_prob + n.trade_and_mutate_program_prob > 0.0;
        let add_or_delete = n.min_programs < n.max_programs
            && n.add_program_prob > 0.0
            && n.delete_program_prob > 0.0;
        if !always_applicable && !add_or_delete {
            return Err(invalid("node mutation probabilities cannot guarantee progress"));
        }

        if self.initial_programs == 0 {
            return Err(invalid("initial_programs must be at least 1"));
        }
        if self.hidden_count > MAX_ACTION_BITS {
            return Err(invalid(format!(
                "hidden_count ({}) exceeds {MAX_ACTION_BITS}",
                self.hidden_count
            )));
        }

        Ok(())
    }
}

fn invalid(reason: impl Into<String>) -> TpgError {
    TpgError::InvalidConfig {
        reason: reason.into(),
    }
}
