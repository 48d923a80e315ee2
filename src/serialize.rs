//! Text export of one policy's reachable graph.
//!
//! Produces the `#`-delimited `nodes` and `programs` records used for
//! diagnostics and checkpoints. Only the sub-graph reachable from the root is
//! written, and each entity appears once even if many slots share it.
//! There is no loader.
//!
//! ```text
//! nodes    = count#(id#programCount#programId#...)*
//! programs = count#(id#type#[outputs#hidden# | targetNodeId#]register#...#code#...)*
//! ```

use std::collections::BTreeMap;
use std::fmt::Write as _;

use crate::policy::Policy;
use crate::program::Action;
use crate::store::{GraphStore, NodeId, ProgramId};

/// The serialized records of one policy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SerializedPolicy {
    /// Numeric id of the root node.
    pub root_node: u64,
    /// The `nodes` record.
    pub nodes: String,
    /// The `programs` record.
    pub programs: String,
}

impl SerializedPolicy {
    /// Serialize everything reachable from `root`, or `None` if `root` is not
    /// in the store.
    #[must_use]
    pub fn capture(store: &GraphStore, root: NodeId) -> Option<Self> {
        let root_node = store.node(root)?.id;
        let (nodes, programs) = reachable(store, &[root]);

        let mut node_record = format!("{}#", nodes.len());
        for &handle in nodes.values() {
            let Some(node) = store.node(handle) else {
                continue;
            };
            let _ = write!(node_record, "{}#{}#", node.id, node.programs().len());
            for &p in node.programs() {
                if let Some(program) = store.program(p) {
                    let _ = write!(node_record, "{}#", program.id);
                }
            }
        }

        let mut program_record = format!("{}#", programs.len());
        for &handle in programs.values() {
            let Some(program) = store.program(handle) else {
                continue;
            };
            let action = program.action();
            let _ = write!(program_record, "{}#{}#", program.id, action.type_code());
            match action {
                Action::Atomic { outputs, hidden } => {
                    let _ = write!(program_record, "{outputs}#{hidden}#");
                }
                Action::Node(target) => {
                    let target_id = store.node(target).map_or(0, |n| n.id);
                    let _ = write!(program_record, "{target_id}#");
                }
            }
            for value in &program.registers {
                let _ = write!(program_record, "{value}#");
            }
            for code in &program.instructions {
                let _ = write!(program_record, "{code}#");
            }
        }

        Some(Self {
            root_node,
            nodes: node_record,
            programs: program_record,
        })
    }
}

impl Policy {
    /// Serialize the graph reachable from this policy's root.
    #[must_use]
    pub fn serialize(&self, store: &GraphStore) -> Option<SerializedPolicy> {
        SerializedPolicy::capture(store, self.root())
    }
}

/// Nodes and programs reachable from `roots`, keyed by numeric id.
pub(crate) fn reachable(
    store: &GraphStore,
    roots: &[NodeId],
) -> (BTreeMap<u64, NodeId>, BTreeMap<u64, ProgramId>) {
    let mut nodes = BTreeMap::new();
    let mut programs = BTreeMap::new();
    let mut stack: Vec<NodeId> = roots.to_vec();

    while let Some(handle) = stack.pop() {
        let Some(node) = store.node(handle) else {
            continue;
        };
        if nodes.insert(node.id, handle).is_some() {
            continue;
        }
        for &p in node.programs() {
            let Some(program) = store.program(p) else {
                continue;
            };
            if programs.insert(program.id, p).is_none() {
                if let Action::Node(target) = program.action() {
                    stack.push(target);
                }
            }
        }
    }

    (nodes, programs)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::program::Program;

    #[test]
    fn test_serialize_reachable_only() {
        let mut store = GraphStore::new();
        let leaf = store.insert_program(Program::from_parts(
            vec![0, 1, 2, 3],
            vec![0.5],
            Action::Atomic {
                outputs: 3,
                hidden: 1,
            },
        ));
        let inner = store.insert_node(vec![leaf]);
        let link = store.insert_program(Program::from_parts(
            vec![4, 5, 6, 7],
            vec![0.25, 1.0],
            Action::Node(inner),
        ));
        let root = store.insert_node(vec![link, leaf]);
        // Unrelated root: must not appear.
        let stray = store.insert_program(Program::from_parts(
            vec![0, 0, 0, 0],
            vec![9.0],
            Action::Atomic {
                outputs: 0,
                hidden: 0,
            },
        ));
        store.insert_node(vec![stray]);

        let record = SerializedPolicy::capture(&store, root).expect("root exists");
        assert_eq!(record.root_node, 1);
        assert_eq!(record.nodes, "2#0#1#0#1#2#1#0#");
        assert_eq!(record.programs, "2#0#0#3#1#0.5#0#1#2#3#1#1#0#0.25#1#4#5#6#7#");
    }

    #[test]
    fn test_shared_program_written_once() {
        let mut store = GraphStore::new();
        let shared = store.insert_program(Program::from_parts(
            vec![0, 0, 0, 0],
            vec![1.0],
            Action::Atomic {
                outputs: 1,
                hidden: 0,
            },
        ));
        let inner = store.insert_node(vec![shared]);
        let link = store.insert_program(Program::from_parts(
            vec![0, 0, 0, 0],
            vec![1.0],
            Action::Node(inner),
        ));
        let root = store.insert_node(vec![shared, link, shared]);

        let (nodes, programs) = reachable(&store, &[root]);
        assert_eq!(nodes.len(), 2);
        assert_eq!(programs.len(), 2);

        let record = SerializedPolicy::capture(&store, root).expect("root exists");
        assert!(record.programs.starts_with("2#"));
        assert!(record.nodes.contains("1#3#0#1#0#"));
    }

    #[test]
    fn test_cycle_terminates() {
        let mut store = GraphStore::new();
        let root = store.insert_node(Vec::new());
        let back = store.insert_program(Program::from_parts(
            vec![0, 0, 0, 0],
            vec![1.0],
            Action::Node(root),
        ));
        store.attach_program(root, back);

        let record = SerializedPolicy::capture(&store, root).expect("root exists");
        assert_eq!(record.nodes, "1#0#1#0#");
        assert_eq!(record.programs, "1#0#1#0#1#0#0#0#0#");
    }

    #[test]
    fn test_missing_root() {
        let mut store = GraphStore::new();
        let root = store.insert_node(Vec::new());
        let other = GraphStore::new();
        assert!(SerializedPolicy::capture(&other, root).is_none());
        assert!(SerializedPolicy::capture(&store, root).is_some());
    }
}
