//! railgrid - conflict-aware coordination for multi-agent rail networks
//!
//! A coordination core for many agents moving on a shared grid-based rail
//! network toward individual targets: trajectory prediction snapshots,
//! pairwise conflict detection, priority assignment via graph coloring,
//! priority-ordered action resolution with deadlock breaking, and a
//! multi-tick episode driver.

pub mod agent;
pub mod coloring;
pub mod config;
pub mod conflict;
pub mod driver;
pub mod error;
pub mod grid;
pub mod observation;
pub mod prediction;
pub mod resolver;

pub use agent::{AgentSnapshot, AgentStatus};
pub use coloring::{Colorer, GreedyColorer, Priority, ShufflingColorer};
pub use config::CoreConfig;
pub use conflict::{
    Conflict, ConflictDetector, ConflictGraph, ConflictGraphBuilder, ConflictGraphs,
    ConflictReason, ConflictRecord,
};
pub use driver::{AgentInfo, Coordinator, EpisodeDriver, StepOutput};
pub use error::CoreError;
pub use grid::{Cell, GridOracle, Heading, RailAction, RailWorld, TransitionSet};
pub use observation::{ObservationBuilder, ObservationKind};
pub use prediction::{PredictionSnapshot, Trajectory};
pub use resolver::{ActionResolver, Proposal, Resolution};

/// Stable integer identifier for an agent within an episode.
pub type Handle = usize;

/// Feature vector produced by observation builders.
pub type Features = Vec<f64>;
