//! The grid-oracle capability boundary.

use std::collections::BTreeMap;

use crate::agent::AgentSnapshot;
use crate::error::CoreError;
use crate::prediction::Trajectory;
use crate::{Features, Handle};

use super::cell::{Cell, Heading};
use super::transitions::TransitionSet;

/// Action an agent can submit for one tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum RailAction {
    /// Keep the current movement state (moving agents keep moving).
    #[default]
    DoNothing,
    /// Take the left branch at the next cell.
    MoveLeft,
    /// Continue straight (or take the only available branch).
    MoveForward,
    /// Take the right branch at the next cell.
    MoveRight,
    /// Halt in the current cell.
    StopMoving,
}

impl RailAction {
    /// True for actions that request forward motion.
    pub fn is_move(&self) -> bool {
        matches!(
            self,
            RailAction::MoveLeft | RailAction::MoveForward | RailAction::MoveRight
        )
    }
}

/// Result of one physical simulation tick.
///
/// An agent's observation is `None` while it cannot act on fresh data:
/// mid-cell, malfunctioning, or finished. The episode driver keeps ticking
/// until at least one observation is present.
#[derive(Debug, Clone, Default)]
pub struct TickOutcome {
    pub observations: BTreeMap<Handle, Option<Features>>,
    pub rewards: BTreeMap<Handle, f64>,
    pub dones: BTreeMap<Handle, bool>,
    /// True iff every agent is finished.
    pub all_done: bool,
}

/// The physical rail simulation, seen from the coordination core.
///
/// Implementations own the agents and the track topology; the core only
/// queries legal moves, distances and trajectory predictions, and submits
/// per-agent actions through [`step`](GridOracle::step).
pub trait GridOracle {
    /// Number of agents in the episode.
    fn num_agents(&self) -> usize;

    /// Hard bound on episode length in ticks.
    fn max_episode_steps(&self) -> u32;

    /// Snapshot of every agent, in ascending handle order.
    fn agents(&self) -> Vec<AgentSnapshot>;

    /// Exit headings permitted when occupying `cell` with `heading`.
    fn transitions(&self, cell: Cell, heading: Heading) -> TransitionSet;

    /// Shortest-path distance from `(cell, heading)` to the agent's
    /// target, in cells. `f64::INFINITY` if the target is unreachable.
    fn distance_to_target(&self, handle: Handle, cell: Cell, heading: Heading) -> f64;

    /// Predicted trajectory over `horizon` future ticks, or `None` for
    /// agents without a meaningful prediction (not started, done).
    fn predict(&self, handle: Handle, horizon: u32) -> Option<Trajectory>;

    /// Starts a new episode. Fails only on invalid topology.
    fn reset(&mut self, seed: Option<u64>) -> Result<TickOutcome, CoreError>;

    /// Advances the simulation by one tick. Agents absent from `actions`
    /// default to [`RailAction::DoNothing`].
    fn step(&mut self, actions: &BTreeMap<Handle, RailAction>) -> Result<TickOutcome, CoreError>;
}
