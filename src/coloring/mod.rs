//! Priority assignment via approximate graph coloring.
//!
//! Mutually conflicting agents must not share a priority tier, but exact
//! minimum coloring is unnecessary: a small ordered palette and a greedy
//! assignment break the symmetry well enough for traffic resolution. When
//! the palette cannot properly color a region (odd cycles, large cliques)
//! the assignment degrades gracefully instead of failing.

pub mod greedy;
pub mod shuffling;

pub use greedy::GreedyColorer;
pub use shuffling::ShufflingColorer;

use std::collections::{BTreeMap, BTreeSet};

use crate::Handle;

/// Priority level drawn from the palette. The palette is ordered: earlier
/// values are tried first, and larger values outrank smaller ones during
/// action resolution.
pub type Priority = u32;

/// Assigns palette levels to conflict-graph nodes.
///
/// Implementations must be deterministic: identical node order and
/// adjacency yield identical assignments, with no hidden randomness beyond
/// an explicitly supplied seed.
pub trait Colorer {
    /// Colors `nodes` against `adjacency`, returning one level per node.
    fn assign(
        &mut self,
        palette: &[Priority],
        nodes: &[Handle],
        adjacency: &BTreeMap<Handle, BTreeSet<Handle>>,
    ) -> BTreeMap<Handle, Priority>;

    /// Human-readable strategy name.
    fn name(&self) -> &str;
}

/// The per-node assignment rule shared by all colorer variants: the first
/// palette value unused by already-colored neighbors, or the lowest
/// palette value when every one is excluded (best effort).
pub(crate) fn assign_in_order(
    palette: &[Priority],
    order: &[Handle],
    adjacency: &BTreeMap<Handle, BTreeSet<Handle>>,
) -> BTreeMap<Handle, Priority> {
    let mut levels: BTreeMap<Handle, Priority> = BTreeMap::new();
    for &node in order {
        let used: BTreeSet<Priority> = adjacency
            .get(&node)
            .into_iter()
            .flatten()
            .filter_map(|neighbor| levels.get(neighbor).copied())
            .collect();
        let level = match palette.iter().find(|p| !used.contains(p)) {
            Some(&free) => free,
            None => {
                let fallback = palette.iter().copied().min().unwrap_or(0);
                tracing::debug!(node, fallback, "palette exhausted; best-effort level");
                fallback
            }
        };
        levels.insert(node, level);
    }
    levels
}
