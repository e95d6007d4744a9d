//! Grid geometry and the grid-oracle boundary.
//!
//! The coordination core never owns the physical simulation; it talks to it
//! through the [`GridOracle`] trait. [`RailWorld`] is a small deterministic
//! rail simulator implementing that trait, used by tests and demos.

pub mod cell;
pub mod oracle;
pub mod transitions;
pub mod world;

pub use cell::{Cell, Heading};
pub use oracle::{GridOracle, RailAction, TickOutcome};
pub use transitions::TransitionSet;
pub use world::{RailWorld, RailWorldBuilder};
