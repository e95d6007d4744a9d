//! Trajectory predictions and the per-macro-step occupancy snapshot.
//!
//! The grid oracle predicts where each agent will be over a bounded
//! horizon; [`PredictionSnapshot`] reorganizes those trajectories into
//! per-tick occupancy maps that the conflict detector queries. A snapshot
//! is captured once at the start of a macro-step and discarded at its end.

use std::collections::BTreeMap;

use crate::grid::{Cell, GridOracle, Heading};
use crate::Handle;

/// Predicted (position, heading) sequence for one agent.
///
/// Index 0 is the agent's current state; the sequence has `horizon + 1`
/// entries.
#[derive(Debug, Clone, PartialEq)]
pub struct Trajectory {
    pub states: Vec<(Cell, Heading)>,
}

impl Trajectory {
    /// Creates a trajectory from a state sequence.
    pub fn new(states: Vec<(Cell, Heading)>) -> Self {
        Self { states }
    }

    /// Predicted state at a future tick, if within the horizon.
    pub fn at(&self, tick: u32) -> Option<(Cell, Heading)> {
        self.states.get(tick as usize).copied()
    }

    /// Number of predicted ticks beyond the current state.
    pub fn horizon(&self) -> u32 {
        self.states.len().saturating_sub(1) as u32
    }
}

/// Per-tick occupancy view over all agents' predicted trajectories.
///
/// Read-only for the duration of one macro-step. Maps are keyed by handle
/// in `BTreeMap`s so every iteration order is deterministic.
#[derive(Debug, Clone, Default)]
pub struct PredictionSnapshot {
    /// For each tick `t <= max_depth`, the predicted cell of each agent.
    positions: Vec<BTreeMap<Handle, Cell>>,
    /// For each tick, the predicted heading of each agent.
    headings: Vec<BTreeMap<Handle, Heading>>,
}

impl PredictionSnapshot {
    /// Captures a snapshot from the oracle for the given agents.
    ///
    /// Agents without a prediction (done, not yet departed) are simply
    /// absent from every tick map; that absence is a precondition to skip,
    /// not a fault.
    pub fn capture<O: GridOracle + ?Sized>(oracle: &O, handles: &[Handle], horizon: u32) -> Self {
        let depth = horizon as usize + 1;
        let mut positions = vec![BTreeMap::new(); depth];
        let mut headings = vec![BTreeMap::new(); depth];

        for &handle in handles {
            let Some(trajectory) = oracle.predict(handle, horizon) else {
                continue;
            };
            for t in 0..depth {
                // A short trajectory pins the agent at its last state.
                let idx = t.min(trajectory.states.len().saturating_sub(1));
                if let Some(&(cell, heading)) = trajectory.states.get(idx) {
                    positions[t].insert(handle, cell);
                    headings[t].insert(handle, heading);
                }
            }
        }

        Self { positions, headings }
    }

    /// Number of predicted ticks (including tick 0).
    pub fn max_depth(&self) -> u32 {
        self.positions.len() as u32
    }

    /// Agents (other than `exclude`) predicted at `cell` on `tick`, with
    /// their predicted headings, in ascending handle order.
    pub fn occupants_at(
        &self,
        tick: u32,
        cell: Cell,
        exclude: Handle,
    ) -> impl Iterator<Item = (Handle, Heading)> + '_ {
        let t = tick as usize;
        self.positions
            .get(t)
            .into_iter()
            .flatten()
            .filter(move |(&h, &c)| h != exclude && c == cell)
            .map(move |(&h, _)| (h, self.headings[t][&h]))
    }

    /// True if the agent has any prediction in this snapshot.
    pub fn has_prediction(&self, handle: Handle) -> bool {
        self.positions
            .first()
            .map(|m| m.contains_key(&handle))
            .unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FixedOracle {
        trajectories: BTreeMap<Handle, Trajectory>,
    }

    impl crate::grid::GridOracle for FixedOracle {
        fn num_agents(&self) -> usize {
            self.trajectories.len()
        }
        fn max_episode_steps(&self) -> u32 {
            100
        }
        fn agents(&self) -> Vec<crate::agent::AgentSnapshot> {
            Vec::new()
        }
        fn transitions(&self, _: Cell, _: Heading) -> crate::grid::TransitionSet {
            crate::grid::TransitionSet::none()
        }
        fn distance_to_target(&self, _: Handle, _: Cell, _: Heading) -> f64 {
            f64::INFINITY
        }
        fn predict(&self, handle: Handle, _: u32) -> Option<Trajectory> {
            self.trajectories.get(&handle).cloned()
        }
        fn reset(&mut self, _: Option<u64>) -> Result<crate::grid::TickOutcome, crate::CoreError> {
            unimplemented!("fixture")
        }
        fn step(
            &mut self,
            _: &BTreeMap<Handle, crate::grid::RailAction>,
        ) -> Result<crate::grid::TickOutcome, crate::CoreError> {
            unimplemented!("fixture")
        }
    }

    fn straight_east(start: Cell, len: usize) -> Trajectory {
        let mut states = Vec::new();
        let mut cell = start;
        for _ in 0..len {
            states.push((cell, Heading::East));
            cell = cell.neighbor(Heading::East);
        }
        Trajectory::new(states)
    }

    #[test]
    fn capture_skips_missing_predictions() {
        let mut trajectories = BTreeMap::new();
        trajectories.insert(0, straight_east(Cell::new(0, 0), 4));
        let oracle = FixedOracle { trajectories };

        let snapshot = PredictionSnapshot::capture(&oracle, &[0, 1], 3);
        assert!(snapshot.has_prediction(0));
        assert!(!snapshot.has_prediction(1));
    }

    #[test]
    fn occupants_exclude_self() {
        let mut trajectories = BTreeMap::new();
        trajectories.insert(0, straight_east(Cell::new(0, 0), 4));
        trajectories.insert(1, straight_east(Cell::new(0, 0), 4));
        let oracle = FixedOracle { trajectories };

        let snapshot = PredictionSnapshot::capture(&oracle, &[0, 1], 3);
        let others: Vec<_> = snapshot.occupants_at(2, Cell::new(0, 2), 0).collect();
        assert_eq!(others, vec![(1, Heading::East)]);
    }

    #[test]
    fn short_trajectory_pins_last_state() {
        let mut trajectories = BTreeMap::new();
        trajectories.insert(7, straight_east(Cell::new(1, 0), 2));
        let oracle = FixedOracle { trajectories };

        let snapshot = PredictionSnapshot::capture(&oracle, &[7], 5);
        let occupants: Vec<_> = snapshot.occupants_at(5, Cell::new(1, 1), usize::MAX).collect();
        assert_eq!(occupants, vec![(7, Heading::East)]);
    }
}
