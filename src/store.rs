//! Arena storage for the shared program and node pools.
//!
//! Every policy in a population draws on the same [`GraphStore`]. Nodes and
//! programs reference each other through stable [`SlotMap`] handles, and each
//! entity keeps a manual parent count:
//!
//! - `node.parent_count` = number of programs whose action targets the node
//! - `program.parent_count` = number of node slots holding the program
//!
//! All operators that add or drop an edge live here and adjust both ends of
//! that edge in the same call, so the counts hold before and after every
//! public method. [`GraphStore::audit`] recomputes them from scratch.

use std::collections::HashMap;

use rand::Rng;
use slotmap::{new_key_type, SlotMap};
use tracing::debug;

use crate::config::{ProgramConfig, TpgConfig};
use crate::error::{TpgError, TpgResult};
use crate::node::Node;
use crate::program::{Action, Program};

new_key_type! {
    /// Handle to a program in the store.
    pub struct ProgramId;

    /// Handle to a node in the store.
    pub struct NodeId;
}

/// Programs given to a freshly sprouted root node.
pub const INITIAL_ROOT_PROGRAMS: usize = 2;

#[inline]
fn chance<R: Rng>(rng: &mut R, p: f64) -> bool {
    rng.random::<f64>() < p
}

/// The shared program and node pools.
#[derive(Debug, Clone, Default)]
pub struct GraphStore {
    programs: SlotMap<ProgramId, Program>,
    nodes: SlotMap<NodeId, Node>,
    next_program_id: u64,
    next_node_id: u64,
}

impl GraphStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a progenitor store: `initial_programs` random atomic programs and
    /// one root node referencing two of them.
    ///
    /// # Errors
    ///
    /// Returns [`TpgError::InvalidConfig`] if `config` fails validation.
    pub fn seed<R: Rng>(
        config: &TpgConfig,
        output_count: usize,
        rng: &mut R,
    ) -> TpgResult<(Self, NodeId)> {
        config.validate()?;
        let mut store = Self::new();
        for _ in 0..config.initial_programs {
            let program = Program::random(&config.program, output_count, config.hidden_count, rng);
            store.insert_program(program);
        }
        let root = store
            .sprout_root(rng)
            .ok_or_else(|| TpgError::InvalidConfig {
                reason: "initial_programs must be at least 1".to_string(),
            })?;
        debug!(
            nodes = store.node_count(),
            programs = store.program_count(),
            "seeded progenitor graph store"
        );
        Ok((store, root))
    }

    /// Number of programs in the pool.
    #[inline]
    #[must_use]
    pub fn program_count(&self) -> usize {
        self.programs.len()
    }

    /// Number of nodes in the pool.
    #[inline]
    #[must_use]
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// Look up a program.
    #[inline]
    #[must_use]
    pub fn program(&self, id: ProgramId) -> Option<&Program> {
        self.programs.get(id)
    }

    /// Look up a node.
    #[inline]
    #[must_use]
    pub fn node(&self, id: NodeId) -> Option<&Node> {
        self.nodes.get(id)
    }

    /// Iterate over every program.
    pub fn programs(&self) -> impl Iterator<Item = (ProgramId, &Program)> {
        self.programs.iter()
    }

    /// Iterate over every node.
    pub fn nodes(&self) -> impl Iterator<Item = (NodeId, &Node)> {
        self.nodes.iter()
    }

    /// Handles of all nodes with no incoming program links.
    #[must_use]
    pub fn root_ids(&self) -> Vec<NodeId> {
        self.nodes
            .iter()
            .filter(|(_, n)| n.is_root())
            .map(|(id, _)| id)
            .collect()
    }

    /// A uniformly random program handle.
    pub fn random_program<R: Rng>(&self, rng: &mut R) -> Option<ProgramId> {
        if self.programs.is_empty() {
            return None;
        }
        self.programs
            .keys()
            .nth(rng.random_range(0..self.programs.len()))
    }

    /// A uniformly random node handle.
    pub fn random_node<R: Rng>(&self, rng: &mut R) -> Option<NodeId> {
        if self.nodes.is_empty() {
            return None;
        }
        self.nodes.keys().nth(rng.random_range(0..self.nodes.len()))
    }

    // ------------------------------------------------------------------
    // Edge bookkeeping
    // ------------------------------------------------------------------

    fn incref_program(&mut self, id: ProgramId) {
        if let Some(program) = self.programs.get_mut(id) {
            program.parent_count += 1;
        }
    }

    fn decref_program(&mut self, id: ProgramId) {
        if let Some(program) = self.programs.get_mut(id) {
            debug_assert!(program.parent_count > 0, "program {} underflow", program.id);
            program.parent_count = program.parent_count.saturating_sub(1);
        }
    }

    fn incref_node(&mut self, id: NodeId) {
        if let Some(node) = self.nodes.get_mut(id) {
            node.parent_count += 1;
        }
    }

    fn decref_node(&mut self, id: NodeId) {
        if let Some(node) = self.nodes.get_mut(id) {
            debug_assert!(node.parent_count > 0, "node {} underflow", node.id);
            node.parent_count = node.parent_count.saturating_sub(1);
        }
    }

    /// Point slot `i` of `programs` at `new`, moving the reference count.
    fn replace_slot(&mut self, programs: &mut [ProgramId], i: usize, new: ProgramId) {
        self.decref_program(programs[i]);
        self.incref_program(new);
        programs[i] = new;
    }

    /// Replace a program's action, moving the node reference count.
    fn set_action(&mut self, id: ProgramId, action: Action) {
        let Some(old) = self.programs.get(id).map(Program::action) else {
            return;
        };
        if let Some(target) = old.target() {
            self.decref_node(target);
        }
        if let Some(target) = action.target() {
            self.incref_node(target);
        }
        self.programs[id].action = action;
    }

    // ------------------------------------------------------------------
    // Insertion
    // ------------------------------------------------------------------

    /// Add a program to the pool and return its handle.
    ///
    /// The program gets a fresh id and starts unreferenced; if its action
    /// targets a node, that node gains a parent.
    pub fn insert_program(&mut self, mut program: Program) -> ProgramId {
        program.id = self.next_program_id;
        self.next_program_id += 1;
        program.parent_count = 0;
        if let Some(target) = program.action.target() {
            self.incref_node(target);
        }
        self.programs.insert(program)
    }

    /// Add a node referencing `programs`; each referenced program gains a parent.
    pub fn insert_node(&mut self, programs: Vec<ProgramId>) -> NodeId {
        for &p in &programs {
            self.incref_program(p);
        }
        self.push_node(programs)
    }

    /// Append a program reference to an existing node.
    ///
    /// Returns `false` if either handle is not in the pool.
    pub fn attach_program(&mut self, node: NodeId, program: ProgramId) -> bool {
        if !self.programs.contains_key(program) {
            return false;
        }
        let Some(n) = self.nodes.get_mut(node) else {
            return false;
        };
        n.programs.push(program);
        self.incref_program(program);
        true
    }

    /// Insert a node whose program references are already counted.
    fn push_node(&mut self, programs: Vec<ProgramId>) -> NodeId {
        let node = Node {
            id: self.next_node_id,
            programs,
            ..Node::default()
        };
        self.next_node_id += 1;
        self.nodes.insert(node)
    }

    /// Add a new root referencing [`INITIAL_ROOT_PROGRAMS`] uniformly random
    /// pool programs. Returns `None` if the program pool is empty.
    pub fn sprout_root<R: Rng>(&mut self, rng: &mut R) -> Option<NodeId> {
        let mut programs = Vec::with_capacity(INITIAL_ROOT_PROGRAMS);
        for _ in 0..INITIAL_ROOT_PROGRAMS {
            programs.push(self.random_program(rng)?);
        }
        Some(self.insert_node(programs))
    }

    // ------------------------------------------------------------------
    // Program operators
    // ------------------------------------------------------------------

    /// Copy a program into the pool. A node-linking copy is a new in-edge of
    /// the shared target.
    pub fn clone_program(&mut self, id: ProgramId) -> Option<ProgramId> {
        let copy = self.programs.get(id)?.duplicate();
        Some(self.insert_program(copy))
    }

    /// Mutate a program in place until at least one change lands.
    ///
    /// Each round independently may rewrite one instruction byte, rewrite one
    /// register preset, and re-roll the action. A re-rolled action is atomic
    /// or node-linking with equal chance; a node link targets a uniformly
    /// random pool node. Returns `false` only if nothing could ever change.
    pub fn mutate_program<R: Rng>(
        &mut self,
        id: ProgramId,
        config: &ProgramConfig,
        rng: &mut R,
    ) -> bool {
        let Some(program) = self.programs.get(id) else {
            return false;
        };
        let can_mutate = (config.mutate_instruction_prob > 0.0 && !program.instructions.is_empty())
            || (config.mutate_register_prob > 0.0 && !program.registers.is_empty())
            || config.mutate_action_prob > 0.0;
        if !can_mutate {
            return false;
        }

        let mut mutated = false;
        while !mutated {
            if chance(rng, config.mutate_instruction_prob) {
                mutated |= self.programs[id].mutate_instruction(rng);
            }
            if chance(rng, config.mutate_register_prob) {
                mutated |= self.programs[id].mutate_register(rng);
            }
            if chance(rng, config.mutate_action_prob) {
                self.reroll_action(id, rng);
                mutated = true;
            }
        }
        true
    }

    fn reroll_action<R: Rng>(&mut self, id: ProgramId, rng: &mut R) {
        let (output_count, hidden_count) = {
            let p = &self.programs[id];
            (p.output_count, p.hidden_count)
        };
        let link = rng.random_range(0..2) == 1;
        let action = match (link, self.random_node(rng)) {
            (true, Some(target)) => Action::Node(target),
            _ => Action::random_atomic(output_count, hidden_count, rng),
        };
        self.set_action(id, action);
    }

    /// Clone a program into the pool and mutate the copy.
    pub fn clone_and_mutate_program<R: Rng>(
        &mut self,
        id: ProgramId,
        config: &ProgramConfig,
        rng: &mut R,
    ) -> Option<ProgramId> {
        let copy = self.clone_program(id)?;
        self.mutate_program(copy, config, rng);
        Some(copy)
    }

    // ------------------------------------------------------------------
    // Node operators
    // ------------------------------------------------------------------

    /// Insert a new node sharing the program list of `id`.
    pub fn clone_node(&mut self, id: NodeId) -> Option<NodeId> {
        let template = self.nodes.get(id)?.programs.clone();
        Some(self.spawn_clone(&template))
    }

    /// Insert a mutated clone of node `id`.
    ///
    /// The clone is mutated before it joins the pool, so its own programs can
    /// never be re-rolled to link back to it.
    pub fn clone_and_mutate_node<R: Rng>(
        &mut self,
        id: NodeId,
        config: &TpgConfig,
        rng: &mut R,
    ) -> Option<NodeId> {
        let template = self.nodes.get(id)?.programs.clone();
        Some(self.spawn_mutant(&template, config, rng))
    }

    /// Mutate the program list of a node already in the pool.
    ///
    /// Returns `false`, leaving the node unchanged, if the node is missing or
    /// no operator can apply to its current program count.
    pub fn mutate_node<R: Rng>(&mut self, id: NodeId, config: &TpgConfig, rng: &mut R) -> bool {
        let Some(node) = self.nodes.get_mut(id) else {
            return false;
        };
        let mut programs = std::mem::take(&mut node.programs);
        let mutated = self.mutate_program_list(&mut programs, config, rng);
        if let Some(node) = self.nodes.get_mut(id) {
            node.programs = programs;
        }
        mutated
    }

    /// Insert a node with the same program references as `template`.
    pub(crate) fn spawn_clone(&mut self, template: &[ProgramId]) -> NodeId {
        let programs = self.count_references(template);
        self.push_node(programs)
    }

    /// Insert a node built from `template` and mutated before insertion.
    pub(crate) fn spawn_mutant<R: Rng>(
        &mut self,
        template: &[ProgramId],
        config: &TpgConfig,
        rng: &mut R,
    ) -> NodeId {
        let mut programs = self.count_references(template);
        self.mutate_program_list(&mut programs, config, rng);
        self.push_node(programs)
    }

    fn count_references(&mut self, template: &[ProgramId]) -> Vec<ProgramId> {
        for &p in template {
            self.incref_program(p);
        }
        template.to_vec()
    }

    /// Apply node mutation operators to a counted program list until at
    /// least one applies. Returns `false` without looping if none can.
    fn mutate_program_list<R: Rng>(
        &mut self,
        programs: &mut Vec<ProgramId>,
        config: &TpgConfig,
        rng: &mut R,
    ) -> bool {
        let n = &config.node;
        if self.programs.is_empty() || !n.can_mutate(programs.len()) {
            return false;
        }

        let mut mutated = false;
        while !mutated {
            if chance(rng, n.add_program_prob) && programs.len() < n.max_programs {
                if let Some(p) = self.random_program(rng) {
                    self.incref_program(p);
                    programs.push(p);
                    mutated = true;
                }
            }
            if chance(rng, n.trade_program_prob) && !programs.is_empty() {
                let i = rng.random_range(0..programs.len());
                if let Some(p) = self.random_program(rng) {
                    self.replace_slot(programs, i, p);
                    mutated = true;
                }
            }
            if chance(rng, n.mutate_program_prob) && !programs.is_empty() {
                let i = rng.random_range(0..programs.len());
                if let Some(p) = self.clone_and_mutate_program(programs[i], &config.program, rng) {
                    self.replace_slot(programs, i, p);
                    mutated = true;
                }
            }
            if chance(rng, n.trade_and_mutate_program_prob) && !programs.is_empty() {
                let i = rng.random_range(0..programs.len());
                let source = self.random_program(rng);
                if let Some(p) =
                    source.and_then(|s| self.clone_and_mutate_program(s, &config.program, rng))
                {
                    self.replace_slot(programs, i, p);
                    mutated = true;
                }
            }
            if chance(rng, n.delete_program_prob) && programs.len() > n.min_programs {
                let i = rng.random_range(0..programs.len());
                self.decref_program(programs.swap_remove(i));
                mutated = true;
            }
        }
        true
    }

    // ------------------------------------------------------------------
    // Generational cleanup
    // ------------------------------------------------------------------

    /// Remove every root node, releasing its program references.
    ///
    /// The removed nodes are returned so their program lists can still serve
    /// as templates for the next generation.
    pub fn evict_roots(&mut self) -> Vec<(NodeId, Node)> {
        let roots = self.root_ids();
        let mut evicted = Vec::with_capacity(roots.len());
        for id in roots {
            if let Some(node) = self.nodes.remove(id) {
                for &p in &node.programs {
                    self.decref_program(p);
                }
                evicted.push((id, node));
            }
        }
        evicted
    }

    /// Remove every unreferenced program and return how many were removed.
    ///
    /// A removed program's node link is released first. Node parent counts
    /// can reach zero here; those nodes become roots.
    pub fn collect_garbage(&mut self) -> usize {
        let orphans: Vec<ProgramId> = self
            .programs
            .iter()
            .filter(|(_, p)| p.parent_count == 0)
            .map(|(id, _)| id)
            .collect();
        for &id in &orphans {
            if let Some(target) = self.programs[id].action.target() {
                self.decref_node(target);
            }
            self.programs.remove(id);
        }
        orphans.len()
    }

    /// Recompute every parent count and check for dangling references.
    ///
    /// # Errors
    ///
    /// Returns the first violation found: [`TpgError::DanglingProgram`],
    /// [`TpgError::DanglingNode`], or [`TpgError::RefCount`].
    pub fn audit(&self) -> TpgResult<()> {
        let mut program_refs: HashMap<ProgramId, u32> = HashMap::with_capacity(self.programs.len());
        let mut node_refs: HashMap<NodeId, u32> = HashMap::with_capacity(self.nodes.len());

        for (_, node) in &self.nodes {
            for &p in &node.programs {
                if !self.programs.contains_key(p) {
                    return Err(TpgError::DanglingProgram { node: node.id });
                }
                *program_refs.entry(p).or_insert(0) += 1;
            }
        }
        for (_, program) in &self.programs {
            if let Some(target) = program.action.target() {
                if !self.nodes.contains_key(target) {
                    return Err(TpgError::DanglingNode {
                        program: program.id,
                    });
                }
                *node_refs.entry(target).or_insert(0) += 1;
            }
        }

        for (id, node) in &self.nodes {
            let actual = node_refs.get(&id).copied().unwrap_or(0);
            if node.parent_count != actual {
                return Err(TpgError::RefCount {
                    entity: "node",
                    id: node.id,
                    stored: node.parent_count,
                    actual,
                });
            }
        }
        for (id, program) in &self.programs {
            let actual = program_refs.get(&id).copied().unwrap_or(0);
            if program.parent_count != actual {
                return Err(TpgError::RefCount {
                    entity: "program",
                    id: program.id,
                    stored: program.parent_count,
                    actual,
                });
            }
        }
        Ok(())
    }

    /// Split borrow used by decision execution: node scratch is written while
    /// programs are evaluated.
    pub(crate) fn split_mut(
        &mut self,
    ) -> (&mut SlotMap<NodeId, Node>, &SlotMap<ProgramId, Program>) {
        (&mut self.nodes, &self.programs)
    }
}
