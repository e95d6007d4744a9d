//! Conflict detection and the per-macro-step conflict graph.
//!
//! The detector predicts whether a candidate next move collides with
//! another agent's predicted trajectory; the graph builder aggregates
//! per-agent results into symmetric undirected graphs used for priority
//! coloring and diagnostics.

pub mod detector;
pub mod graph;
pub mod record;

pub use detector::{Conflict, ConflictDetector};
pub use graph::{ConflictGraph, ConflictGraphBuilder, ConflictGraphs};
pub use record::{ConflictReason, ConflictRecord};
