//! Per-branch path observation.

use std::collections::BTreeMap;

use crate::agent::AgentStatus;
use crate::conflict::ConflictDetector;
use crate::grid::GridOracle;
use crate::prediction::PredictionSnapshot;
use crate::{Features, Handle};

use super::{legal_moves, max_finite_distance, MoveOption, ObservationBuilder};

/// Features per branch: normalized distance, malfunction signal of the
/// conflicting agent, conflict flag.
const BRANCH_SIZE: usize = 3;
/// Branch slots per observation (straight + one alternative).
const BRANCHES: usize = 2;

/// Compact per-branch encoding: for each of the agent's legal next moves
/// (best first), the normalized distance to target, the remaining
/// malfunction of the conflicting agent (if any), and a conflict flag.
/// Unused branch slots are zero-padded.
#[derive(Debug, Clone)]
pub struct PathObservation {
    horizon: u32,
}

impl PathObservation {
    pub fn new(horizon: u32) -> Self {
        Self { horizon }
    }
}

impl ObservationBuilder for PathObservation {
    fn observe(
        &mut self,
        oracle: &dyn GridOracle,
        handles: &[Handle],
    ) -> BTreeMap<Handle, Features> {
        let agents = oracle.agents();
        let all_handles: Vec<Handle> = agents.iter().map(|a| a.handle).collect();
        let snapshot = PredictionSnapshot::capture(oracle, &all_handles, self.horizon);
        let detector = ConflictDetector::new(oracle, &agents, &snapshot);

        // First pass: collect everyone's moves so the normalization
        // substitutes the maximum finite distance observed this step.
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
            let mut features = vec![0.0; BRANCH_SIZE * BRANCHES];
            for (slot, option) in moves.iter().take(BRANCHES).enumerate() {
                let distance = if option.distance.is_finite() {
                    option.distance
                } else {
                    max_distance
                };
                let conflict = detector.detect(handle, option.next, option.exit, self.horizon);
                let malfunction = conflict
                    .and_then(|c| agents.get(c.other))
                    .map(|other| {
                        (other.malfunction as f64 / self.horizon.max(1) as f64).min(1.0)
                    })
                    .unwrap_or(0.0);
                let base = slot * BRANCH_SIZE;
                features[base] = distance / max_distance;
                features[base + 1] = malfunction;
                features[base + 2] = if conflict.is_some() { 1.0 } else { 0.0 };
            }
            result.insert(handle, features);
        }
        result
    }

    fn dim(&self) -> usize {
        BRANCH_SIZE * BRANCHES
    }

    fn name(&self) -> &str {
        "path"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grid::{Cell, Heading, RailAction, RailWorldBuilder};

    #[test]
    fn observation_has_fixed_dim() {
        let mut world = RailWorldBuilder::new()
            .straight(Cell::new(0, 0), Cell::new(0, 3))
            .agent(Cell::new(0, 0), Heading::East, Cell::new(0, 3), 1.0)
            .build(1)
            .expect("valid world");
        world.reset(None).unwrap();
        let mut actions = BTreeMap::new();
        actions.insert(0, RailAction::MoveForward);
        world.step(&actions).unwrap();

        let mut builder = PathObservation::new(5);
        let obs = builder.observe(&world, &[0]);
        assert_eq!(obs[&0].len(), builder.dim());
    }

    #[test]
    fn conflict_flag_set_for_head_on_pair() {
        let mut world = RailWorldBuilder::new()
            .straight(Cell::new(0, 0), Cell::new(0, 3))
            .agent(Cell::new(0, 0), Heading::East, Cell::new(0, 3), 1.0)
            .agent(Cell::new(0, 3), Heading::West, Cell::new(0, 0), 1.0)
            .build(1)
            .expect("valid world");
        world.reset(None).unwrap();
        let mut actions = BTreeMap::new();
        actions.insert(0, RailAction::MoveForward);
        actions.insert(1, RailAction::MoveForward);
        world.step(&actions).unwrap();

        let mut builder = PathObservation::new(5);
        let obs = builder.observe(&world, &[0, 1]);
        // Best branch of each agent runs into the other.
        assert_eq!(obs[&0][2], 1.0);
        assert_eq!(obs[&1][2], 1.0);
    }

    #[test]
    fn distances_are_normalized() {
        let mut world = RailWorldBuilder::new()
            .straight(Cell::new(0, 0), Cell::new(0, 4))
            .agent(Cell::new(0, 0), Heading::East, Cell::new(0, 4), 1.0)
            .build(1)
            .expect("valid world");
        world.reset(None).unwrap();
        let mut actions = BTreeMap::new();
        actions.insert(0, RailAction::MoveForward);
        world.step(&actions).unwrap();

        let mut builder = PathObservation::new(5);
        let obs = builder.observe(&world, &[0]);
        assert!(obs[&0][0] > 0.0 && obs[&0][0] <= 1.0);
    }
}
