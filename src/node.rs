//! Decision nodes.
//!
//! A [`Node`] holds an ordered list of program references. During a decision
//! it ranks those programs by bid and follows the winner; the ranking and a
//! visit counter are kept on the node as per-decision scratch so that a cycle
//! back into the same node falls through to its next-best program.

use crate::store::ProgramId;

/// A decision point in the graph.
#[derive(Debug, Clone, Default)]
pub struct Node {
    /// Monotonic identity assigned by the store on insertion.
    pub id: u64,
    pub(crate) programs: Vec<ProgramId>,
    pub(crate) program_order: Vec<usize>,
    pub(crate) visit_counter: usize,
    pub(crate) parent_count: u32,
}

impl Node {
    /// Programs referenced by this node, in slot order.
    #[inline]
    #[must_use]
    pub fn programs(&self) -> &[ProgramId] {
        &self.programs
    }

    /// Number of programs whose action targets this node.
    #[inline]
    #[must_use]
    pub const fn parent_count(&self) -> u32 {
        self.parent_count
    }

    /// A node nobody links to is the entry point of exactly one policy.
    #[inline]
    #[must_use]
    pub const fn is_root(&self) -> bool {
        self.parent_count == 0
    }

    /// How often this node has been left through a node link during the
    /// current decision.
    #[inline]
    #[must_use]
    pub const fn visit_counter(&self) -> usize {
        self.visit_counter
    }

    /// Slot indices ordered by descending bid, or empty outside a decision.
    #[inline]
    #[must_use]
    pub fn program_order(&self) -> &[usize] {
        &self.program_order
    }

    pub(crate) fn reset_scratch(&mut self) {
        self.visit_counter = 0;
        self.program_order.clear();
    }
}

/// Order indices `0..scores.len()` by descending score.
///
/// Works by repeated maximum extraction: each round scans the remaining
/// candidates, keeps the first strictly greater score, and swap-removes the
/// winner. Ties therefore go to whichever candidate the scan meets first,
/// and a NaN never displaces an incumbent.
#[must_use]
pub fn rank_descending(scores: &[f64]) -> Vec<usize> {
    let mut remaining: Vec<(usize, f64)> = scores.iter().copied().enumerate().collect();
    let mut order = Vec::with_capacity(remaining.len());

    while !remaining.is_empty() {
        let mut best = 0;
        for j in 1..remaining.len() {
            if remaining[j].1 > remaining[best].1 {
                best = j;
            }
        }
        order.push(remaining.swap_remove(best).0);
    }

    order
}
