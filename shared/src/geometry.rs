//! Grid geometry: coordinates, bounds checks and adjacency on the square board.

use crate::BOARD_DIMENSION;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Returns true if `(x, y)` addresses a cell of the board
pub fn is_in_bounds(x: i32, y: i32) -> bool {
    x >= 0 && y >= 0 && x < BOARD_DIMENSION as i32 && y < BOARD_DIMENSION as i32
}

/// A cell address on the board, 0-indexed from the top-left corner
///
/// Coordinates built through [`Coordinate::new`] are always in bounds. The
/// fields stay public so that protocol payloads can carry raw values; anything
/// read off the wire should be checked with [`Coordinate::is_valid`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Coordinate {
    pub x: u8,
    pub y: u8,
}

impl Coordinate {
    pub fn new(x: i32, y: i32) -> Option<Self> {
        if is_in_bounds(x, y) {
            Some(Self {
                x: x as u8,
                y: y as u8,
            })
        } else {
            None
        }
    }

    pub fn is_valid(&self) -> bool {
        is_in_bounds(self.x as i32, self.y as i32)
    }

    /// Packed row-major key, unique per cell
    pub fn index(&self) -> usize {
        self.y as usize * BOARD_DIMENSION + self.x as usize
    }

    /// Inverse of [`Coordinate::index`]
    pub fn from_index(index: usize) -> Option<Self> {
        if index >= BOARD_DIMENSION * BOARD_DIMENSION {
            return None;
        }
        Some(Self {
            x: (index % BOARD_DIMENSION) as u8,
            y: (index / BOARD_DIMENSION) as u8,
        })
    }

    /// Every cell of the board in row-major order
    pub fn all() -> impl Iterator<Item = Coordinate> {
        (0..BOARD_DIMENSION * BOARD_DIMENSION).filter_map(Coordinate::from_index)
    }

    /// The up to eight in-bounds cells touching this one, diagonals included
    pub fn neighbors(&self) -> impl Iterator<Item = Coordinate> + '_ {
        (-1..=1)
            .flat_map(|dy| (-1..=1).map(move |dx| (dx, dy)))
            .filter(|&(dx, dy)| dx != 0 || dy != 0)
            .filter_map(move |(dx, dy)| Coordinate::new(self.x as i32 + dx, self.y as i32 + dy))
    }

    pub fn is_adjacent(&self, other: &Coordinate) -> bool {
        self != other && self.x.abs_diff(other.x) <= 1 && self.y.abs_diff(other.y) <= 1
    }
}

impl fmt::Display for Coordinate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.x, self.y)
    }
}
