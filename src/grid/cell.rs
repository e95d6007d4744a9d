//! Cells and headings on the rail grid.

use std::fmt;

/// A grid cell addressed by row and column.
///
/// Rows grow southward, columns grow eastward. Signed coordinates let
/// callers form candidate neighbors of border cells without wrapping; the
/// oracle rejects off-grid cells by returning empty transitions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Cell {
    pub row: i32,
    pub col: i32,
}

impl Cell {
    /// Creates a new cell.
    pub fn new(row: i32, col: i32) -> Self {
        Self { row, col }
    }

    /// Returns the neighboring cell in the given heading.
    pub fn neighbor(&self, heading: Heading) -> Cell {
        let (dr, dc) = heading.delta();
        Cell::new(self.row + dr, self.col + dc)
    }
}

impl fmt::Display for Cell {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.row, self.col)
    }
}

/// One of the four grid headings.
///
/// Doubles as an agent orientation and as a movement direction: moving with
/// heading `h` takes an agent from a cell to `cell.neighbor(h)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Heading {
    North,
    East,
    South,
    West,
}

impl Heading {
    /// All headings in index order.
    pub const ALL: [Heading; 4] = [Heading::North, Heading::East, Heading::South, Heading::West];

    /// Returns the index of this heading (0=North, 1=East, 2=South, 3=West).
    pub fn index(&self) -> usize {
        match self {
            Heading::North => 0,
            Heading::East => 1,
            Heading::South => 2,
            Heading::West => 3,
        }
    }

    /// Returns the heading with the given index modulo 4.
    pub fn from_index(index: usize) -> Heading {
        Heading::ALL[index % 4]
    }

    /// The opposite heading.
    pub fn reverse(&self) -> Heading {
        Heading::from_index(self.index() + 2)
    }

    /// The heading after a 90° left turn.
    pub fn left(&self) -> Heading {
        Heading::from_index(self.index() + 3)
    }

    /// The heading after a 90° right turn.
    pub fn right(&self) -> Heading {
        Heading::from_index(self.index() + 1)
    }

    /// Row/column displacement of one move in this heading.
    pub fn delta(&self) -> (i32, i32) {
        match self {
            Heading::North => (-1, 0),
            Heading::East => (0, 1),
            Heading::South => (1, 0),
            Heading::West => (0, -1),
        }
    }
}

impl fmt::Display for Heading {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Heading::North => write!(f, "north"),
            Heading::East => write!(f, "east"),
            Heading::South => write!(f, "south"),
            Heading::West => write!(f, "west"),
        }
    }
}
