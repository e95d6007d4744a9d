//! Greedy coloring with seeded visitation-order shuffling.

use std::collections::{BTreeMap, BTreeSet};

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;

use crate::Handle;

use super::{assign_in_order, Colorer, Priority};

/// Like [`GreedyColorer`](super::GreedyColorer) but shuffles the node
/// visitation order on every call, so low handles are not structurally
/// favored episode after episode.
///
/// The shuffle sequence is a pure function of the construction seed:
/// two colorers built with the same seed produce identical assignment
/// sequences across identical call sequences.
#[derive(Debug)]
pub struct ShufflingColorer {
    rng: StdRng,
    seed: u64,
}

impl ShufflingColorer {
    pub fn new(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
            seed,
        }
    }

    /// The seed this colorer was built with.
    pub fn seed(&self) -> u64 {
        self.seed
    }
}

impl Colorer for ShufflingColorer {
    fn assign(
        &mut self,
        palette: &[Priority],
        nodes: &[Handle],
        adjacency: &BTreeMap<Handle, BTreeSet<Handle>>,
    ) -> BTreeMap<Handle, Priority> {
        let mut order = nodes.to_vec();
        order.shuffle(&mut self.rng);
        assign_in_order(palette, &order, adjacency)
    }

    fn name(&self) -> &str {
        "shuffling"
    }
}
