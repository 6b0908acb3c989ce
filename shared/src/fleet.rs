//! Ship placement intents and the geometric fleet validator.
//!
//! Validation here never looks at a board: it only checks that a ship has a
//! legal length and fits inside the grid. Collisions between ships are a
//! property of a concrete board and are detected when the fleet is placed.

use crate::geometry::Coordinate;
use crate::{BOARD_DIMENSION, MAX_FLEET_SIZE, MAX_SHIP_SIZE};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Ship orientation. Travels over the wire as the `direction` flag, `true`
/// meaning the ship extends downwards.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "bool", into = "bool")]
pub enum Orientation {
    Horizontal,
    Vertical,
}

impl From<bool> for Orientation {
    fn from(vertical: bool) -> Self {
        if vertical {
            Orientation::Vertical
        } else {
            Orientation::Horizontal
        }
    }
}

impl From<Orientation> for bool {
    fn from(orientation: Orientation) -> Self {
        orientation == Orientation::Vertical
    }
}

/// Class tag carried with each ship; informational only
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ShipClass {
    Small,
    Medium,
    Large,
    Huge,
}

/// A ship as submitted by a player before battle
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ship {
    /// Anchor cell: leftmost for horizontal ships, topmost for vertical ones
    pub position: Coordinate,
    #[serde(rename = "direction")]
    pub orientation: Orientation,
    pub length: u8,
    #[serde(rename = "type")]
    pub class: ShipClass,
}

impl Ship {
    pub fn new(x: u8, y: u8, orientation: Orientation, length: u8, class: ShipClass) -> Self {
        Self {
            position: Coordinate { x, y },
            orientation,
            length,
            class,
        }
    }

    /// Last cell covered by the ship, or None if it would leave the grid
    pub fn terminal(&self) -> Option<Coordinate> {
        let span = self.length as i32 - 1;
        let (x, y) = (self.position.x as i32, self.position.y as i32);
        match self.orientation {
            Orientation::Horizontal => Coordinate::new(x + span, y),
            Orientation::Vertical => Coordinate::new(x, y + span),
        }
    }

    /// Cells covered by the ship, anchor first. Only meaningful for a ship
    /// that passed [`validate_placement`].
    pub fn cells(&self) -> Vec<Coordinate> {
        let (x, y) = (self.position.x as i32, self.position.y as i32);
        (0..self.length as i32)
            .filter_map(|offset| match self.orientation {
                Orientation::Horizontal => Coordinate::new(x + offset, y),
                Orientation::Vertical => Coordinate::new(x, y + offset),
            })
            .collect()
    }

    /// Ring of cells around the ship: its bounding box grown by one in every
    /// direction, clipped to the grid, minus the ship itself. Row-major order.
    pub fn border_cells(&self) -> Vec<Coordinate> {
        let Some(end) = self.terminal() else {
            return Vec::new();
        };
        let (x0, y0) = (self.position.x as i32, self.position.y as i32);
        let (x1, y1) = (end.x as i32, end.y as i32);

        let mut border = Vec::new();
        for y in (y0 - 1)..=(y1 + 1) {
            for x in (x0 - 1)..=(x1 + 1) {
                let inside = x >= x0 && x <= x1 && y >= y0 && y <= y1;
                if inside {
                    continue;
                }
                if let Some(coord) = Coordinate::new(x, y) {
                    border.push(coord);
                }
            }
        }
        border
    }
}

/// Anchor of a submitted ship as it arrives on the wire
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawPosition {
    pub x: i32,
    pub y: i32,
}

/// A ship exactly as a client submitted it. Position and length are signed
/// and unbounded; impossible ships decode and fail in [`Ship::try_from`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShipSubmission {
    pub position: RawPosition,
    #[serde(rename = "direction")]
    pub orientation: Orientation,
    pub length: i32,
    #[serde(rename = "type")]
    pub class: ShipClass,
}

impl From<&Ship> for ShipSubmission {
    fn from(ship: &Ship) -> Self {
        Self {
            position: RawPosition {
                x: ship.position.x as i32,
                y: ship.position.y as i32,
            },
            orientation: ship.orientation,
            length: i32::from(ship.length),
            class: ship.class,
        }
    }
}

impl TryFrom<ShipSubmission> for Ship {
    type Error = PlacementError;

    /// Checks the length and the anchor; the terminal cell is left to
    /// [`validate_placement`]
    fn try_from(submitted: ShipSubmission) -> Result<Self, Self::Error> {
        if submitted.length < 1 || submitted.length > MAX_SHIP_SIZE as i32 {
            return Err(PlacementError::InvalidLength(submitted.length));
        }
        let RawPosition { x, y } = submitted.position;
        let position = Coordinate::new(x, y).ok_or(PlacementError::OutOfBounds(x, y))?;
        Ok(Ship {
            position,
            orientation: submitted.orientation,
            length: submitted.length as u8,
            class: submitted.class,
        })
    }
}

/// Reasons a fleet or one of its ships cannot be placed
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PlacementError {
    #[error("ship length {0} is outside 1..={max}", max = MAX_SHIP_SIZE)]
    InvalidLength(i32),
    #[error("ship anchored at ({0}, {1}) leaves the {dim}x{dim} grid", dim = BOARD_DIMENSION)]
    OutOfBounds(i32, i32),
    #[error("fleet must not be empty")]
    EmptyFleet,
    #[error("fleet of {0} ships exceeds the limit of {max}", max = MAX_FLEET_SIZE)]
    TooManyShips(usize),
    #[error("ship anchored at {0} overlaps or touches another ship")]
    Collision(Coordinate),
}

/// Checks a single ship against size and boundary rules
pub fn validate_placement(ship: &Ship) -> Result<(), PlacementError> {
    if ship.length == 0 || ship.length as usize > MAX_SHIP_SIZE {
        return Err(PlacementError::InvalidLength(i32::from(ship.length)));
    }
    if !ship.position.is_valid() || ship.terminal().is_none() {
        let Coordinate { x, y } = ship.position;
        return Err(PlacementError::OutOfBounds(i32::from(x), i32::from(y)));
    }
    Ok(())
}

pub fn is_valid_placement(ship: &Ship) -> bool {
    validate_placement(ship).is_ok()
}

/// Checks the fleet size, then every ship in submission order
pub fn validate_fleet(ships: &[Ship]) -> Result<(), PlacementError> {
    if ships.is_empty() {
        return Err(PlacementError::EmptyFleet);
    }
    if ships.len() > MAX_FLEET_SIZE {
        return Err(PlacementError::TooManyShips(ships.len()));
    }
    ships.iter().try_for_each(validate_placement)
}
