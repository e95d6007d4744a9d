//! Agent status and state snapshots.
//!
//! Agents are owned by the grid oracle; the coordination core only reads
//! per-macro-step snapshots of them.

use crate::grid::{Cell, Heading};
use crate::Handle;

/// Lifecycle status of an agent within an episode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum AgentStatus {
    /// Not yet eligible to enter the grid.
    NotStarted,
    /// Eligible to enter at its initial position but not yet on the grid.
    ReadyToDepart,
    /// On the grid, moving toward its target.
    Active,
    /// Reached its target. Done agents keep occupying their target cell.
    Done,
}

/// Read-only snapshot of one agent, as reported by the grid oracle.
#[derive(Debug, Clone, PartialEq)]
pub struct AgentSnapshot {
    /// Stable identifier for this episode.
    pub handle: Handle,
    /// Lifecycle status.
    pub status: AgentStatus,
    /// On-grid position; `None` unless the agent is `Active` or `Done`.
    pub position: Option<Cell>,
    /// Where the agent enters the grid.
    pub initial_position: Cell,
    /// Target cell.
    pub target: Cell,
    /// Current orientation.
    pub heading: Heading,
    /// Fraction of a cell traversed per tick, in `(0, 1]`.
    pub speed: f64,
    /// Ticks of malfunction remaining; 0 means healthy.
    pub malfunction: u32,
}

impl AgentSnapshot {
    /// The position this agent is evaluated at, depending on status:
    /// ready-to-depart agents at their initial position, active agents at
    /// their on-grid position, done agents at their target. `None` for
    /// agents that have not started.
    pub fn virtual_position(&self) -> Option<Cell> {
        match self.status {
            AgentStatus::NotStarted => None,
            AgentStatus::ReadyToDepart => Some(self.initial_position),
            AgentStatus::Active => self.position,
            AgentStatus::Done => Some(self.target),
        }
    }

    /// Ticks needed to traverse one cell at this agent's speed.
    pub fn ticks_per_cell(&self) -> f64 {
        1.0 / self.speed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn snapshot(status: AgentStatus) -> AgentSnapshot {
        AgentSnapshot {
            handle: 0,
            status,
            position: Some(Cell::new(2, 2)),
            initial_position: Cell::new(0, 0),
            target: Cell::new(5, 5),
            heading: Heading::East,
            speed: 0.5,
            malfunction: 0,
        }
    }

    #[test]
    fn virtual_position_by_status() {
        assert_eq!(snapshot(AgentStatus::NotStarted).virtual_position(), None);
        assert_eq!(
            snapshot(AgentStatus::ReadyToDepart).virtual_position(),
            Some(Cell::new(0, 0))
        );
        assert_eq!(
            snapshot(AgentStatus::Active).virtual_position(),
            Some(Cell::new(2, 2))
        );
        assert_eq!(
            snapshot(AgentStatus::Done).virtual_position(),
            Some(Cell::new(5, 5))
        );
    }

    #[test]
    fn ticks_per_cell_is_reciprocal_speed() {
        assert!((snapshot(AgentStatus::Active).ticks_per_cell() - 2.0).abs() < 1e-12);
    }
}
