//! Conflict records.

use std::fmt;

use crate::Handle;

/// Why two trajectories were judged to collide.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum ConflictReason {
    /// Opposite headings meeting in a cell whose transitions permit the
    /// reverse approach.
    HeadOn,
    /// Two agents predicted in the same cell at the same tick.
    SameCell,
    /// The occupying agent is done and will never vacate its target cell.
    TargetOccupied,
}

impl fmt::Display for ConflictReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConflictReason::HeadOn => write!(f, "head-on"),
            ConflictReason::SameCell => write!(f, "same-cell"),
            ConflictReason::TargetOccupied => write!(f, "target-occupied"),
        }
    }
}

/// One detected conflict, stored from the perspective of the agent being
/// evaluated (`agent`); symmetric once inserted into the conflict graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ConflictRecord {
    /// The agent whose candidate move was evaluated.
    pub agent: Handle,
    /// The agent predicted to collide with it.
    pub other: Handle,
    /// Predicted tick of the encounter, relative to "now".
    pub tick: u32,
    pub reason: ConflictReason,
}

impl fmt::Display for ConflictRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} between agents {} and {} at tick {}",
            self.reason, self.agent, self.other, self.tick
        )
    }
}
