//! Path observation enriched with conflict-coloring priorities.

use std::collections::BTreeMap;

use crate::agent::AgentStatus;
use crate::coloring::{Colorer, GreedyColorer, Priority};
use crate::conflict::{ConflictDetector, ConflictGraphBuilder};
use crate::grid::GridOracle;
use crate::prediction::PredictionSnapshot;
use crate::{Features, Handle};

use super::{legal_moves, max_finite_distance, MoveOption, ObservationBuilder};

/// Features per branch: one-hot exit heading (4), normalized distance,
/// conflict flag, priority slot.
const BRANCH_SIZE: usize = 7;
/// Branch slots per observation (shortest-path move + one alternative).
const BRANCHES: usize = 2;

/// Per-branch features plus the agent's priority levels from coloring the
/// primary (shortest-path) and secondary (alternative-path) conflict
/// graphs. The final element flags whether the agent has departed.
///
/// The priority slot of the first branch carries the primary-graph level,
/// that of the second branch the secondary-graph level; the order of the
/// palette matters, higher levels outrank lower ones.
#[derive(Debug, Clone)]
pub struct ConflictPriorityObservation {
    horizon: u32,
    palette: Vec<Priority>,
    colorer: GreedyColorer,
}

impl ConflictPriorityObservation {
    pub fn new(horizon: u32) -> Self {
        Self::with_palette(horizon, vec![1, 0])
    }

    /// Uses a custom priority palette (ordered, earlier values preferred).
    pub fn with_palette(horizon: u32, palette: Vec<Priority>) -> Self {
        Self {
            horizon,
            palette,
            colorer: GreedyColorer::new(),
        }
    }
}

impl ObservationBuilder for ConflictPriorityObservation {
    fn observe(
        &mut self,
        oracle: &dyn GridOracle,
        handles: &[Handle],
    ) -> BTreeMap<Handle, Features> {
        let agents = oracle.agents();
        let all_handles: Vec<Handle> = agents.iter().map(|a| a.handle).collect();
        let snapshot = PredictionSnapshot::capture(oracle, &all_handles, self.horizon);
        let graphs = ConflictGraphBuilder::build(oracle, &agents, &snapshot, self.horizon);
        let detector = ConflictDetector::new(oracle, &agents, &snapshot);

        let primary_levels = self.colorer.assign(
            &self.palette,
            &graphs.primary.handles(),
            &graphs.primary.adjacency(),
        );
        let secondary_levels = self.colorer.assign(
            &self.palette,
            &graphs.secondary.handles(),
            &graphs.secondary.adjacency(),
        );

        let moves_by_handle: BTreeMap<Handle, Vec<MoveOption>> = handles
            .iter()
            .filter_map(|&h| agents.get(h).map(|a| (h, legal_moves(oracle, a))))
            .collect();
        let max_distance = max_finite_distance(moves_by_handle.values().flatten());

        let mut result = BTreeMap::new();
        for (&handle, moves) in &moves_by_handle {
            let agent = &agents[handle];
            if agent.status == AgentStatus::NotStarted {
                continue;
            }
            let mut features = vec![0.0; BRANCH_SIZE * BRANCHES + 1];
            for (slot, option) in moves.iter().take(BRANCHES).enumerate() {
                let distance = if option.distance.is_finite() {
                    option.distance
                } else {
                    max_distance
                };
                let conflict = detector.detect(handle, option.next, option.exit, self.horizon);
                let base = slot * BRANCH_SIZE;
                features[base + option.exit.index()] = 1.0;
                features[base + 4] = distance / max_distance;
                features[base + 5] = if conflict.is_some() { 1.0 } else { 0.0 };
                let levels = if slot == 0 { &primary_levels } else { &secondary_levels };
                features[base + 6] = levels.get(&handle).copied().unwrap_or(0) as f64;
            }
            features[BRANCH_SIZE * BRANCHES] =
                if agent.status == AgentStatus::ReadyToDepart { 0.0 } else { 1.0 };
            result.insert(handle, features);
        }
        result
    }

    fn dim(&self) -> usize {
        BRANCH_SIZE * BRANCHES + 1
    }

    fn name(&self) -> &str {
        "conflict_priority"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grid::{Cell, Heading, RailAction, RailWorld, RailWorldBuilder};

    fn head_on_world() -> RailWorld {
        RailWorldBuilder::new()
            .straight(Cell::new(0, 0), Cell::new(0, 3))
            .agent(Cell::new(0, 0), Heading::East, Cell::new(0, 3), 1.0)
            .agent(Cell::new(0, 3), Heading::West, Cell::new(0, 0), 1.0)
            .build(23)
            .expect("valid world")
    }

    fn depart(world: &mut RailWorld) {
        world.reset(None).unwrap();
        let actions: BTreeMap<_, _> = (0..world.num_agents())
            .map(|h| (h, RailAction::MoveForward))
            .collect();
        world.step(&actions).unwrap();
    }

    #[test]
    fn conflicting_pair_gets_distinct_priorities() {
        let mut world = head_on_world();
        depart(&mut world);

        let mut builder = ConflictPriorityObservation::new(5);
        let obs = builder.observe(&world, &[0, 1]);
        let priority_0 = obs[&0][6];
        let priority_1 = obs[&1][6];
        assert_ne!(priority_0, priority_1);
    }

    #[test]
    fn departed_flag_distinguishes_status() {
        let mut world = head_on_world();
        world.reset(None).unwrap();

        let mut builder = ConflictPriorityObservation::new(5);
        let flag_index = builder.dim() - 1;
        let obs = builder.observe(&world, &[0, 1]);
        assert_eq!(obs[&0][flag_index], 0.0); // still ready to depart

        depart(&mut world);
        let obs = builder.observe(&world, &[0, 1]);
        assert_eq!(obs[&0][flag_index], 1.0);
    }

    #[test]
    fn observation_is_deterministic() {
        let mut world = head_on_world();
        depart(&mut world);

        let mut builder = ConflictPriorityObservation::new(5);
        let first = builder.observe(&world, &[0, 1]);
        let second = builder.observe(&world, &[0, 1]);
        assert_eq!(first, second);
    }
}
