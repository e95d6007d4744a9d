//! Configuration for the coordination core.

use crate::coloring::{Colorer, GreedyColorer, Priority, ShufflingColorer};
use crate::observation::{ObservationBuilder, ObservationKind};
use crate::resolver::ActionResolver;

/// Tunables for one environment instance, resolved once at startup.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct CoreConfig {
    /// Number of future ticks trajectories are predicted for.
    pub prediction_horizon: u32,
    /// Ordered priority palette. Earlier values are assigned first; larger
    /// values outrank smaller ones at resolution time. Two levels suffice
    /// for symmetry breaking in the common case.
    pub palette: Vec<Priority>,
    /// When set, the colorer shuffles node visitation order with this
    /// seed; when `None`, the deterministic ascending-handle order is used.
    pub shuffle_seed: Option<u64>,
    /// Force-admit agents after this many consecutive substituted waits;
    /// `None` disables the bound.
    pub starvation_limit: Option<u32>,
    /// Observation encoding variant.
    pub observation: ObservationKind,
}

impl CoreConfig {
    /// The colorer variant selected by this configuration.
    pub fn colorer(&self) -> Box<dyn Colorer> {
        match self.shuffle_seed {
            Some(seed) => Box::new(ShufflingColorer::new(seed)),
            None => Box::new(GreedyColorer::new()),
        }
    }

    /// The observation builder selected by this configuration.
    pub fn observation_builder(&self) -> Box<dyn ObservationBuilder> {
        self.observation.resolve_with(self.prediction_horizon)
    }

    /// A fresh action resolver honoring the starvation bound.
    pub fn resolver(&self) -> ActionResolver {
        ActionResolver::new(self.starvation_limit)
    }
}

impl Default for CoreConfig {
    fn default() -> Self {
        Self {
            prediction_horizon: 20,
            palette: vec![1, 0],
            shuffle_seed: None,
            starvation_limit: Some(8),
            observation: ObservationKind::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        let config = CoreConfig::default();
        assert!(config.prediction_horizon > 0);
        assert!(!config.palette.is_empty());
        assert_eq!(config.colorer().name(), "greedy");
    }

    #[test]
    fn shuffle_seed_selects_shuffling_colorer() {
        let config = CoreConfig {
            shuffle_seed: Some(42),
            ..CoreConfig::default()
        };
        assert_eq!(config.colorer().name(), "shuffling");
    }

    #[test]
    fn observation_builder_matches_kind() {
        let config = CoreConfig {
            observation: ObservationKind::ConflictPriority,
            ..CoreConfig::default()
        };
        assert_eq!(config.observation_builder().name(), "conflict_priority");
    }

    #[cfg(feature = "serde")]
    #[test]
    fn config_round_trips_through_json() {
        let config = CoreConfig::default();
        let json = serde_json::to_string(&config).unwrap();
        let back: CoreConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(config, back);
    }
}
