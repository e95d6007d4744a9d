//! Pairwise trajectory conflict detection.

use crate::agent::{AgentSnapshot, AgentStatus};
use crate::grid::{Cell, GridOracle, Heading};
use crate::prediction::PredictionSnapshot;
use crate::Handle;

use super::record::ConflictReason;

/// Outcome of evaluating one candidate move against all other trajectories.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Conflict {
    /// The agent predicted to collide with the candidate.
    pub other: Handle,
    /// Predicted tick of the encounter, relative to "now".
    pub tick: u32,
    pub reason: ConflictReason,
}

/// Detects trajectory conflicts for candidate moves.
///
/// Pure over a per-macro-step state snapshot: the oracle is only queried
/// for transitions and distances, and the prediction snapshot is never
/// mutated. Agents without predictions simply cannot conflict; their
/// absence is a precondition to skip, not a fault.
pub struct ConflictDetector<'a, O: GridOracle + ?Sized> {
    oracle: &'a O,
    agents: &'a [AgentSnapshot],
    snapshot: &'a PredictionSnapshot,
}

impl<'a, O: GridOracle + ?Sized> ConflictDetector<'a, O> {
    pub fn new(oracle: &'a O, agents: &'a [AgentSnapshot], snapshot: &'a PredictionSnapshot) -> Self {
        Self {
            oracle,
            agents,
            snapshot,
        }
    }

    /// Evaluates the candidate next state `(position, heading)` for
    /// `handle` against every other agent's predicted occupancy, walking
    /// the candidate's shortest path up to `horizon` ticks ahead.
    ///
    /// A conflict is raised when another agent is predicted in the same
    /// cell at a compatible tick (the exact tick, or ±1 to absorb
    /// speed-fraction rounding) with an incompatible heading that the
    /// cell's transitions permit as a reverse approach, when two same-
    /// heading trajectories overlap at the exact tick, or when a done
    /// agent permanently occupies the cell. Earliest tick wins; within a
    /// tick, the lowest conflicting handle.
    pub fn detect(
        &self,
        handle: Handle,
        candidate_position: Cell,
        candidate_heading: Heading,
        horizon: u32,
    ) -> Option<Conflict> {
        let agent = self.agents.get(handle)?;
        let ticks_per_cell = agent.ticks_per_cell();
        let depth = self.snapshot.max_depth().min(horizon + 1);

        let mut position = candidate_position;
        let mut heading = candidate_heading;
        let mut cells_ahead = 1u32;

        loop {
            let predicted_tick = (cells_ahead as f64 * ticks_per_cell) as u32;
            if predicted_tick >= depth {
                return None;
            }

            if let Some(conflict) = self.check_cell(handle, position, heading, predicted_tick, depth) {
                return Some(conflict);
            }

            cells_ahead += 1;
            match self.shortest_path_successor(handle, position, heading) {
                Some((next, exit)) => {
                    position = next;
                    heading = exit;
                }
                None => return None,
            }
        }
    }

    /// Checks one walked cell against predicted occupancy at the exact
    /// tick and its ±1 neighbors, then against done agents parked on it.
    fn check_cell(
        &self,
        handle: Handle,
        position: Cell,
        heading: Heading,
        predicted_tick: u32,
        depth: u32,
    ) -> Option<Conflict> {
        let pre = predicted_tick.saturating_sub(1);
        let post = (predicted_tick + 1).min(depth - 1);

        // The first tick with any occupancy decides, mirroring the
        // exact-then-adjacent search order.
        for tick in [predicted_tick, pre, post] {
            let occupants: Vec<(Handle, Heading)> =
                self.snapshot.occupants_at(tick, position, handle).collect();
            if occupants.is_empty() {
                continue;
            }
            let transitions = self.oracle.transitions(position, heading);
            for (other, other_heading) in occupants {
                if self.agents[other].status == AgentStatus::Done {
                    return Some(Conflict {
                        other,
                        tick: predicted_tick,
                        reason: ConflictReason::TargetOccupied,
                    });
                }
                if other_heading != heading && transitions.allows(other_heading.reverse()) {
                    return Some(Conflict {
                        other,
                        tick: predicted_tick,
                        reason: ConflictReason::HeadOn,
                    });
                }
                if tick == predicted_tick && other_heading == heading {
                    return Some(Conflict {
                        other,
                        tick: predicted_tick,
                        reason: ConflictReason::SameCell,
                    });
                }
            }
            break;
        }

        // Done agents have no trajectory; their target occupancy is
        // checked directly from the agent snapshots.
        self.agents
            .iter()
            .filter(|a| a.handle != handle && a.status == AgentStatus::Done && a.target == position)
            .map(|a| Conflict {
                other: a.handle,
                tick: predicted_tick,
                reason: ConflictReason::TargetOccupied,
            })
            .next()
    }

    /// The distance-minimizing legal successor of `(cell, heading)` for
    /// the given agent, used to extrapolate the candidate's path.
    pub fn shortest_path_successor(
        &self,
        handle: Handle,
        cell: Cell,
        heading: Heading,
    ) -> Option<(Cell, Heading)> {
        let transitions = self.oracle.transitions(cell, heading);
        let mut best: Option<(f64, Cell, Heading)> = None;
        for exit in transitions.iter() {
            let next = cell.neighbor(exit);
            let distance = self.oracle.distance_to_target(handle, next, exit);
            // `<=` keeps later ties, matching the reference walk order.
            match best {
                Some((best_distance, _, _)) if distance > best_distance => {}
                _ => best = Some((distance, next, exit)),
            }
        }
        best.map(|(_, next, exit)| (next, exit))
    }
}
