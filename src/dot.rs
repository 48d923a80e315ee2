//! Graphviz export.
//!
//! Vertices are named by role: `N{id}` for nodes, `P{id}` for programs and
//! `A{outputs}h{hidden}` for atomic actions. Edges are emitted first, vertex
//! styling last, both inside one `digraph`.

use std::collections::HashSet;
use std::fmt::Write as _;

use crate::program::Action;
use crate::store::{GraphStore, NodeId};

const HEADER: &str = "digraph graphname {\n";
const FOOTER: &str = "}\n";
const NODE_STYLE: &str = "[color=yellow,shape=ellipse,style=filled]";
const PROGRAM_STYLE: &str = "[color=springGreen,shape=ellipse,style=filled]";
const ATOMIC_STYLE: &str = "[color=lightgrey,shape=component,style=filled]";

fn atomic_name(outputs: u64, hidden: u64) -> String {
    format!("A{outputs}h{hidden}")
}

#[derive(Default)]
struct Walk {
    edges: String,
    props: String,
    nodes: HashSet<u64>,
    programs: HashSet<u64>,
    atomics: HashSet<(u64, u64)>,
}

impl Walk {
    fn visit(&mut self, store: &GraphStore, handle: NodeId) {
        let Some(node) = store.node(handle) else {
            return;
        };
        self.nodes.insert(node.id);
        let _ = writeln!(self.props, "N{} {NODE_STYLE}", node.id);

        for &p in node.programs() {
            let Some(program) = store.program(p) else {
                continue;
            };
            let _ = writeln!(self.edges, "  N{} -> P{}", node.id, program.id);
            if !self.programs.insert(program.id) {
                continue;
            }
            let _ = writeln!(self.props, "P{} {PROGRAM_STYLE}", program.id);

            match program.action() {
                Action::Atomic { outputs, hidden } => {
                    let name = atomic_name(outputs, hidden);
                    let _ = writeln!(self.edges, "  P{} -> {name}", program.id);
                    if self.atomics.insert((outputs, hidden)) {
                        let _ = writeln!(self.props, "{name} {ATOMIC_STYLE}");
                    }
                }
                Action::Node(target) => {
                    let Some(target_id) = store.node(target).map(|n| n.id) else {
                        continue;
                    };
                    let _ = writeln!(self.edges, "  P{} -> N{target_id}", program.id);
                    if !self.nodes.contains(&target_id) {
                        self.visit(store, target);
                    }
                }
            }
        }
    }

    fn finish(self) -> String {
        let mut out = String::with_capacity(HEADER.len() + self.edges.len() + self.props.len() + 2);
        out.push_str(HEADER);
        out.push_str(&self.edges);
        out.push_str(&self.props);
        out.push_str(FOOTER);
        out
    }
}

/// DOT text for everything reachable from `roots`, visited depth first in
/// program order.
#[must_use]
pub fn graph_from_roots(store: &GraphStore, roots: &[NodeId]) -> String {
    let mut walk = Walk::default();
    for &root in roots {
        walk.visit(store, root);
    }
    walk.finish()
}

/// DOT text for every node and program in the store, reachable or not.
#[must_use]
pub fn graph_all(store: &GraphStore) -> String {
    let mut edges = String::new();
    let mut props = String::new();

    for (_, node) in store.nodes() {
        let _ = writeln!(props, "N{} {NODE_STYLE}", node.id);
        for &p in node.programs() {
            if let Some(program) = store.program(p) {
                let _ = writeln!(edges, "  N{} -> P{}", node.id, program.id);
            }
        }
    }
    for (_, program) in store.programs() {
        let _ = writeln!(props, "P{} {PROGRAM_STYLE}", program.id);
        match program.action() {
            Action::Atomic { outputs, hidden } => {
                let name = atomic_name(outputs, hidden);
                let _ = writeln!(props, "{name} {ATOMIC_STYLE}");
                let _ = writeln!(edges, "  P{} -> {name}", program.id);
            }
            Action::Node(target) => {
                if let Some(node) = store.node(target) {
                    let _ = writeln!(edges, "  P{} -> N{}", program.id, node.id);
                }
            }
        }
    }

    let walk = Walk {
        edges,
        props,
        ..Walk::default()
    };
    walk.finish()
}
