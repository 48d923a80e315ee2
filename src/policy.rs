//! Per-agent decision policies.
//!
//! A [`Policy`] binds one root node of the shared [`GraphStore`] to private
//! input, output and hidden-state buffers. The simulation writes inputs,
//! calls [`Policy::update`] once per timestep, and reads the outputs back.
//!
//! ## Decision execution
//!
//! Starting at the root, each node ranks its programs by bid on first visit
//! and follows the best one. An atomic winner ends the decision. A node-link
//! winner advances the node's visit counter before moving on, so arriving at
//! the same node again (through a cycle) follows its next-best program
//! instead. A node that runs out of programs ends the decision with all
//! outputs cleared. Each link taken consumes one program slot of some visited
//! node, which bounds the walk by the total program count of the nodes it
//! touches.

use rand::Rng;

use crate::config::{TpgConfig, MAX_ACTION_BITS};
use crate::error::{TpgError, TpgResult};
use crate::node::rank_descending;
use crate::program::Action;
use crate::store::{GraphStore, NodeId, ProgramId};

/// Outcome of one [`Policy::update`] call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Decision {
    /// The atomic program whose action was applied, or `None` if every
    /// reachable option was exhausted.
    pub winner: Option<ProgramId>,
    /// Node links followed before the decision ended.
    pub hops: usize,
}

/// A decision policy bound to one root node.
#[derive(Debug, Clone)]
pub struct Policy {
    root: NodeId,
    inputs: Vec<f64>,
    outputs: Vec<f64>,
    hidden: Vec<f64>,
}

impl Policy {
    /// Seed a fresh graph store and return it with a policy bound to its
    /// progenitor root.
    ///
    /// # Errors
    ///
    /// Returns [`TpgError::InvalidConfig`] if `config` is invalid or
    /// `output_count` is too wide to encode.
    pub fn new<R: Rng>(
        input_count: usize,
        output_count: usize,
        config: &TpgConfig,
        rng: &mut R,
    ) -> TpgResult<(GraphStore, Self)> {
        check_output_width(output_count)?;
        let (store, root) = GraphStore::seed(config, output_count, rng)?;
        let policy = Self::bind(input_count, output_count, config.hidden_count, root);
        Ok((store, policy))
    }

    /// Bind a policy to an existing root node.
    #[must_use]
    pub fn bind(input_count: usize, output_count: usize, hidden_count: usize, root: NodeId) -> Self {
        Self {
            root,
            inputs: vec![0.0; input_count],
            outputs: vec![0.0; output_count],
            hidden: vec![0.0; hidden_count],
        }
    }

    /// Add a brand-new root to `store` (two uniformly random pool programs)
    /// and bind a policy to it. Used to build the first population.
    ///
    /// Returns `None` if the store has no programs.
    pub fn sprout<R: Rng>(
        store: &mut GraphStore,
        input_count: usize,
        output_count: usize,
        hidden_count: usize,
        rng: &mut R,
    ) -> Option<Self> {
        let root = store.sprout_root(rng)?;
        Some(Self::bind(input_count, output_count, hidden_count, root))
    }

    /// The root node this policy starts every decision from.
    #[inline]
    #[must_use]
    pub const fn root(&self) -> NodeId {
        self.root
    }

    /// Number of input slots.
    #[inline]
    #[must_use]
    pub fn input_count(&self) -> usize {
        self.inputs.len()
    }

    /// Number of output slots.
    #[inline]
    #[must_use]
    pub fn output_count(&self) -> usize {
        self.outputs.len()
    }

    /// Number of hidden-state slots.
    #[inline]
    #[must_use]
    pub fn hidden_count(&self) -> usize {
        self.hidden.len()
    }

    /// Write one input value.
    ///
    /// # Panics
    ///
    /// Panics if `index` is out of range.
    #[inline]
    pub fn set_input(&mut self, index: usize, value: f64) {
        self.inputs[index] = value;
    }

    /// Read one output bit (0.0 or 1.0).
    ///
    /// # Panics
    ///
    /// Panics if `index` is out of range.
    #[inline]
    #[must_use]
    pub fn read_output(&self, index: usize) -> f64 {
        self.outputs[index]
    }

    /// All input values.
    #[inline]
    #[must_use]
    pub fn inputs(&self) -> &[f64] {
        &self.inputs
    }

    /// All output values.
    #[inline]
    #[must_use]
    pub fn outputs(&self) -> &[f64] {
        &self.outputs
    }

    /// Current hidden state.
    #[inline]
    #[must_use]
    pub fn hidden(&self) -> &[f64] {
        &self.hidden
    }

    /// Clear inputs, outputs and hidden state. The graph is untouched.
    pub fn reset(&mut self) {
        self.inputs.fill(0.0);
        self.outputs.fill(0.0);
        self.hidden.fill(0.0);
    }

    /// Run one decision against the current inputs and hidden state.
    ///
    /// On an atomic winner the outputs and hidden state are replaced by its
    /// decoded bits; otherwise the outputs are cleared and the hidden state
    /// kept. Node scratch is reset on every visited node before returning.
    pub fn update<R: Rng>(&mut self, store: &mut GraphStore, rng: &mut R) -> Decision {
        let (nodes, programs) = store.split_mut();
        let mut visited: Vec<NodeId> = Vec::new();
        let mut current = self.root;
        let mut hops = 0;

        let winner = loop {
            let Some(node) = nodes.get_mut(current) else {
                break None;
            };

            if node.visit_counter == 0 {
                visited.push(current);
                let bids: Vec<f64> = node
                    .programs
                    .iter()
                    .map(|&p| {
                        programs
                            .get(p)
                            .map_or(f64::NAN, |program| {
                                program.evaluate(&self.inputs, &self.hidden, rng)
                            })
                    })
                    .collect();
                node.program_order = rank_descending(&bids);
            }

            if node.visit_counter >= node.programs.len() {
                break None;
            }

            let pid = node.programs[node.program_order[node.visit_counter]];
            match programs.get(pid).map(|p| p.action()) {
                Some(Action::Atomic { outputs, hidden }) => break Some((pid, outputs, hidden)),
                Some(Action::Node(next)) => {
                    node.visit_counter += 1;
                    hops += 1;
                    current = next;
                }
                None => break None,
            }
        };

        for id in visited {
            if let Some(node) = nodes.get_mut(id) {
                node.reset_scratch();
            }
        }

        match winner {
            Some((pid, outputs, hidden)) => {
                decode_bits(outputs, &mut self.outputs);
                decode_bits(hidden, &mut self.hidden);
                Decision {
                    winner: Some(pid),
                    hops,
                }
            }
            None => {
                self.outputs.fill(0.0);
                Decision { winner: None, hops }
            }
        }
    }
}

fn check_output_width(output_count: usize) -> TpgResult<()> {
    if output_count > MAX_ACTION_BITS {
        return Err(TpgError::InvalidConfig {
            reason: format!("output count ({output_count}) exceeds {MAX_ACTION_BITS}"),
        });
    }
    Ok(())
}

/// Zero `buf`, then write the bits of `value` into it least significant bit
/// first. Bits beyond the buffer are dropped.
pub fn decode_bits(value: u64, buf: &mut [f64]) {
    buf.fill(0.0);
    let width = (u64::BITS - value.leading_zeros()) as usize;
    for (i, slot) in buf.iter_mut().enumerate().take(width) {
        *slot = if (value >> i) & 1 == 1 { 1.0 } else { 0.0 };
    }
}
