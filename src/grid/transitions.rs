//! Per-cell transition sets.

use super::cell::Heading;

/// The set of exit headings a cell permits for a given entry heading.
///
/// Returned by [`GridOracle::transitions`](super::GridOracle::transitions).
/// An empty set means the cell is off-grid or has no rail for that entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct TransitionSet([bool; 4]);

impl TransitionSet {
    /// The empty transition set.
    pub fn none() -> Self {
        Self([false; 4])
    }

    /// Builds a set from the given exit headings.
    pub fn from_headings(headings: &[Heading]) -> Self {
        let mut allowed = [false; 4];
        for h in headings {
            allowed[h.index()] = true;
        }
        Self(allowed)
    }

    /// Returns true if the given exit heading is permitted.
    pub fn allows(&self, heading: Heading) -> bool {
        self.0[heading.index()]
    }

    /// Number of permitted exit headings.
    pub fn count(&self) -> usize {
        self.0.iter().filter(|&&a| a).count()
    }

    /// True if no exit heading is permitted.
    pub fn is_empty(&self) -> bool {
        self.count() == 0
    }

    /// Iterates permitted exit headings in index order.
    pub fn iter(&self) -> impl Iterator<Item = Heading> + '_ {
        Heading::ALL.into_iter().filter(|h| self.allows(*h))
    }

    /// Set union: permits every heading allowed by either set.
    pub fn union(&self, other: TransitionSet) -> TransitionSet {
        let mut allowed = self.0;
        for (i, &a) in other.0.iter().enumerate() {
            allowed[i] |= a;
        }
        TransitionSet(allowed)
    }
}
