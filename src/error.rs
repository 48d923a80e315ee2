//! Error types for the TPG engine.
//!
//! Numeric edge cases inside programs never surface here: the protected
//! divide opcode returns 0 instead of failing. Everything in this enum is
//! either a configuration/setup defect or an invariant violation reported by
//! [`GraphStore::audit`](crate::store::GraphStore::audit).

use thiserror::Error;

/// Errors produced by the TPG engine.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TpgError {
    /// A configuration value is out of its valid range.
    #[error("invalid configuration: {reason}")]
    InvalidConfig {
        /// Human-readable explanation.
        reason: String,
    },

    /// An organism's root node is absent from the graph store.
    ///
    /// This is a setup defect, not a recoverable runtime condition.
    #[error("a policy's root node is missing from the graph store; population setup is broken")]
    MissingRoot,

    /// Cleanup was requested for an empty population.
    #[error("cannot run cleanup on an empty population")]
    EmptyPopulation,

    /// The configured fitness expression could not be parsed.
    #[error("unrecognised fitness expression: {expr}")]
    FitnessExpr {
        /// The offending expression.
        expr: String,
    },

    /// A stored parent count disagrees with the number of in-edges.
    #[error("{entity} {id} records {stored} parents but {actual} edges reference it")]
    RefCount {
        /// `"node"` or `"program"`.
        entity: &'static str,
        /// Numeric id of the entity.
        id: u64,
        /// The stored `parent_count`.
        stored: u32,
        /// The recomputed in-edge count.
        actual: u32,
    },

    /// A node references a program that is not in the pool.
    #[error("node {node} references a program that is not in the pool")]
    DanglingProgram {
        /// Numeric id of the referencing node.
        node: u64,
    },

    /// A program targets a node that is not in the pool.
    #[error("program {program} targets a node that is not in the pool")]
    DanglingNode {
        /// Numeric id of the referencing program.
        program: u64,
    },
}

/// Convenience alias used across the crate.
pub type TpgResult<T> = Result<T, TpgError>;
