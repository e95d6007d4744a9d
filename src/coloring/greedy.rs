//! Greedy coloring in a fixed, reproducible node order.

use std::collections::{BTreeMap, BTreeSet};

use crate::Handle;

use super::{assign_in_order, Colorer, Priority};

/// Colors nodes in the order supplied by the caller (ascending handle when
/// built from a conflict graph). Identical inputs always produce identical
/// assignments.
#[derive(Debug, Clone, Copy, Default)]
pub struct GreedyColorer;

impl GreedyColorer {
    pub fn new() -> Self {
        Self
    }
}

impl Colorer for GreedyColorer {
    fn assign(
        &mut self,
        palette: &[Priority],
        nodes: &[Handle],
        adjacency: &BTreeMap<Handle, BTreeSet<Handle>>,
    ) -> BTreeMap<Handle, Priority> {
        assign_in_order(palette, nodes, adjacency)
    }

    fn name(&self) -> &str {
        "greedy"
    }
}
