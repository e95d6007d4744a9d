//! Observation builders.
//!
//! The system supports a small closed set of interchangeable observation
//! encodings behind one capability trait; the variant is chosen once at
//! startup via [`ObservationKind`], not by open-ended registration.

pub mod conflict_priority;
pub mod path;

pub use conflict_priority::ConflictPriorityObservation;
pub use path::PathObservation;

use std::collections::BTreeMap;

use crate::agent::AgentSnapshot;
use crate::grid::{Cell, GridOracle, Heading};
use crate::{Features, Handle};

/// Default prediction depth used when a builder is resolved without an
/// explicit horizon.
pub const DEFAULT_PREDICTION_HORIZON: u32 = 20;

/// Builds per-agent feature vectors.
pub trait ObservationBuilder {
    /// Builds features for the given agents. Agents without a usable
    /// state (not yet started) are absent from the result.
    fn observe(
        &mut self,
        oracle: &dyn GridOracle,
        handles: &[Handle],
    ) -> BTreeMap<Handle, Features>;

    /// Length of every returned feature vector.
    fn dim(&self) -> usize;

    /// Human-readable name of this encoding.
    fn name(&self) -> &str;
}

/// The closed set of observation encodings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum ObservationKind {
    /// Per-branch distance, malfunction and conflict features.
    #[default]
    Path,
    /// Path features plus conflict-graph coloring priorities.
    ConflictPriority,
}

impl ObservationKind {
    /// Resolves this kind into a builder with the default horizon.
    pub fn resolve(&self) -> Box<dyn ObservationBuilder> {
        self.resolve_with(DEFAULT_PREDICTION_HORIZON)
    }

    /// Resolves this kind into a builder with an explicit horizon.
    pub fn resolve_with(&self, horizon: u32) -> Box<dyn ObservationBuilder> {
        match self {
            ObservationKind::Path => Box::new(PathObservation::new(horizon)),
            ObservationKind::ConflictPriority => Box::new(ConflictPriorityObservation::new(horizon)),
        }
    }
}

/// One legal next move of an agent, with its shortest-path distance.
#[derive(Debug, Clone, Copy)]
pub(crate) struct MoveOption {
    pub exit: Heading,
    pub next: Cell,
    /// Raw distance; may be infinite for unreachable branches.
    pub distance: f64,
}

/// Legal moves of an agent from its virtual position, in preference order
/// (ascending distance, ties by heading index).
pub(crate) fn legal_moves(oracle: &dyn GridOracle, agent: &AgentSnapshot) -> Vec<MoveOption> {
    let Some(position) = agent.virtual_position() else {
        return Vec::new();
    };
    let mut moves: Vec<MoveOption> = oracle
        .transitions(position, agent.heading)
        .iter()
        .map(|exit| {
            let next = position.neighbor(exit);
            MoveOption {
                exit,
                next,
                distance: oracle.distance_to_target(agent.handle, next, exit),
            }
        })
        .collect();
    moves.sort_by(|a, b| {
        a.distance
            .total_cmp(&b.distance)
            .then(a.exit.index().cmp(&b.exit.index()))
    });
    moves
}

/// Maximum finite distance among the given moves, used to normalize and to
/// substitute for unreachable (infinite) branches. Falls back to 1.0 when
/// every distance is infinite so normalization never divides by zero.
pub(crate) fn max_finite_distance<'a>(moves: impl Iterator<Item = &'a MoveOption>) -> f64 {
    let max = moves
        .map(|m| m.distance)
        .filter(|d| d.is_finite())
        .fold(0.0_f64, f64::max);
    if max > 0.0 {
        max
    } else {
        1.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_kind_is_path() {
        assert_eq!(ObservationKind::default(), ObservationKind::Path);
    }

    #[test]
    fn resolve_matches_kind() {
        assert_eq!(ObservationKind::Path.resolve().name(), "path");
        assert_eq!(
            ObservationKind::ConflictPriority.resolve().name(),
            "conflict_priority"
        );
    }

    #[test]
    fn max_finite_distance_ignores_infinity() {
        let moves = vec![
            MoveOption {
                exit: Heading::East,
                next: Cell::new(0, 1),
                distance: 4.0,
            },
            MoveOption {
                exit: Heading::West,
                next: Cell::new(0, -1),
                distance: f64::INFINITY,
            },
        ];
        assert_eq!(max_finite_distance(moves.iter()), 4.0);
    }

    #[test]
    fn max_finite_distance_all_infinite_is_one() {
        let moves = vec![MoveOption {
            exit: Heading::East,
            next: Cell::new(0, 1),
            distance: f64::INFINITY,
        }];
        assert_eq!(max_finite_distance(moves.iter()), 1.0);
    }
}
