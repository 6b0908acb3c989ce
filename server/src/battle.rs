//! Battle engine: one player's board, the ships placed on it, and attack
//! resolution.
//!
//! Every operation here is synchronous and works on explicit state. Expected
//! game conditions (shooting a resolved cell, an empty target set) come back
//! as `None` rather than as errors.

use crate::error::GameError;
use log::debug;
use rand::Rng;
use shared::{
    validate_placement, AttackStatus, Coordinate, PlacementError, Ship, BOARD_DIMENSION,
};
use std::collections::HashSet;

const CELL_COUNT: usize = BOARD_DIMENSION * BOARD_DIMENSION;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CellState {
    Untouched,
    Hit,
    Sunk,
    Miss,
}

#[derive(Debug, Clone, Copy)]
pub struct Cell {
    pub coordinate: Coordinate,
    pub state: CellState,
    /// Index into the board's ship arena
    ship: Option<usize>,
}

impl Cell {
    pub fn has_ship(&self) -> bool {
        self.ship.is_some()
    }
}

/// A validated ship on a board, with its damage and surroundings
#[derive(Debug, Clone)]
pub struct PlacedShip {
    ship: Ship,
    hit_points: u8,
    cells: Vec<Coordinate>,
    borders: Vec<Coordinate>,
}

impl PlacedShip {
    fn new(ship: Ship, cells: Vec<Coordinate>, borders: Vec<Coordinate>) -> Self {
        Self {
            hit_points: ship.length,
            ship,
            cells,
            borders,
        }
    }

    pub fn ship(&self) -> &Ship {
        &self.ship
    }

    pub fn hit_points(&self) -> u8 {
        self.hit_points
    }

    pub fn cells(&self) -> &[Coordinate] {
        &self.cells
    }

    pub fn borders(&self) -> &[Coordinate] {
        &self.borders
    }

    pub fn is_sunk(&self) -> bool {
        self.hit_points == 0
    }
}

/// Result of an attack that actually changed the board
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttackOutcome {
    Miss,
    Shot,
    Killed {
        ship_cells: Vec<Coordinate>,
        border_cells: Vec<Coordinate>,
    },
}

impl AttackOutcome {
    pub fn status(&self) -> AttackStatus {
        match self {
            AttackOutcome::Miss => AttackStatus::Miss,
            AttackOutcome::Shot => AttackStatus::Shot,
            AttackOutcome::Killed { .. } => AttackStatus::Killed,
        }
    }

    /// A hit of any kind grants the attacker another shot
    pub fn keeps_turn(&self) -> bool {
        !matches!(self, AttackOutcome::Miss)
    }
}

/// Coordinates that have not been attacked yet.
///
/// Backed by a dense vector plus a per-cell slot table so that removal and
/// uniform sampling are both O(1).
#[derive(Debug, Clone)]
pub struct TargetSet {
    items: Vec<Coordinate>,
    slots: Vec<Option<usize>>,
}

impl TargetSet {
    pub fn full() -> Self {
        let items: Vec<Coordinate> = Coordinate::all().collect();
        let slots = (0..items.len()).map(Some).collect();
        Self { items, slots }
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn contains(&self, coord: &Coordinate) -> bool {
        coord.is_valid() && self.slots[coord.index()].is_some()
    }

    /// Returns false if the coordinate was not in the set
    pub fn remove(&mut self, coord: &Coordinate) -> bool {
        if !coord.is_valid() {
            return false;
        }
        let Some(pos) = self.slots[coord.index()].take() else {
            return false;
        };
        self.items.swap_remove(pos);
        if let Some(moved) = self.items.get(pos) {
            self.slots[moved.index()] = Some(pos);
        }
        true
    }

    pub fn pick<R: Rng + ?Sized>(&self, rng: &mut R) -> Option<Coordinate> {
        if self.items.is_empty() {
            return None;
        }
        Some(self.items[rng.gen_range(0..self.items.len())])
    }

    pub fn iter(&self) -> impl Iterator<Item = &Coordinate> {
        self.items.iter()
    }
}

/// One player's grid within a match
#[derive(Debug, Clone)]
pub struct Board {
    cells: Vec<Cell>,
    ships: Vec<PlacedShip>,
    targets: TargetSet,
}

impl Default for Board {
    fn default() -> Self {
        Self::new()
    }
}

impl Board {
    /// All cells untouched, every coordinate still a target
    pub fn new() -> Self {
        let cells = Coordinate::all()
            .map(|coordinate| Cell {
                coordinate,
                state: CellState::Untouched,
                ship: None,
            })
            .collect();

        Self {
            cells,
            ships: Vec::new(),
            targets: TargetSet::full(),
        }
    }

    pub fn cell_at(&self, x: i32, y: i32) -> Result<&Cell, GameError> {
        Coordinate::new(x, y)
            .map(|coord| &self.cells[coord.index()])
            .ok_or(GameError::OutOfRange(x, y))
    }

    pub fn cells(&self) -> &[Cell] {
        &self.cells
    }

    pub fn ships(&self) -> &[PlacedShip] {
        &self.ships
    }

    pub fn targets(&self) -> &TargetSet {
        &self.targets
    }

    pub fn ship_at(&self, coord: Coordinate) -> Option<&PlacedShip> {
        if !coord.is_valid() {
            return None;
        }
        self.cells[coord.index()].ship.map(|idx| &self.ships[idx])
    }

    /// Places a whole fleet or nothing.
    ///
    /// Each ship is validated, then checked against ships already on the
    /// board and those staged earlier in the same call. Ships may neither
    /// overlap nor touch, diagonals included. The board is only written once
    /// every ship has passed.
    pub fn place_fleet(&mut self, ships: &[Ship]) -> Result<(), PlacementError> {
        let mut occupied: HashSet<Coordinate> = self
            .cells
            .iter()
            .filter(|cell| cell.has_ship())
            .map(|cell| cell.coordinate)
            .collect();
        let mut staged = Vec::with_capacity(ships.len());

        for ship in ships {
            validate_placement(ship)?;

            let cells = ship.cells();
            let blocked = cells
                .iter()
                .any(|c| occupied.contains(c) || c.neighbors().any(|n| occupied.contains(&n)));
            if blocked {
                return Err(PlacementError::Collision(ship.position));
            }

            occupied.extend(cells.iter().copied());
            staged.push(PlacedShip::new(ship.clone(), cells, ship.border_cells()));
        }

        for placed in staged {
            let idx = self.ships.len();
            for coord in &placed.cells {
                self.cells[coord.index()].ship = Some(idx);
            }
            self.ships.push(placed);
        }

        debug!("Placed {} ships, {} on board", ships.len(), self.ships.len());
        Ok(())
    }

    /// Fires at a cell. Returns None for off-grid or already resolved cells.
    pub fn resolve_attack(&mut self, target: Coordinate) -> Option<AttackOutcome> {
        if !target.is_valid() {
            return None;
        }
        let cell = self.cells[target.index()];
        if cell.state != CellState::Untouched {
            return None;
        }

        self.targets.remove(&target);

        let Some(ship_idx) = cell.ship else {
            self.cells[target.index()].state = CellState::Miss;
            return Some(AttackOutcome::Miss);
        };

        let ship = &mut self.ships[ship_idx];
        ship.hit_points = ship.hit_points.saturating_sub(1);

        if ship.hit_points > 0 {
            self.cells[target.index()].state = CellState::Hit;
            return Some(AttackOutcome::Shot);
        }

        let ship_cells = ship.cells.clone();
        let border_cells = ship.borders.clone();
        for coord in &ship_cells {
            self.cells[coord.index()].state = CellState::Sunk;
        }

        Some(AttackOutcome::Killed {
            ship_cells,
            border_cells,
        })
    }

    /// Reveals the water around a sunk ship: every untouched border cell
    /// becomes a miss and leaves the target set. Returns the revealed cells.
    pub fn apply_kill_side_effects(&mut self, border_cells: &[Coordinate]) -> Vec<Coordinate> {
        let mut revealed = Vec::new();
        for coord in border_cells.iter().filter(|c| c.is_valid()) {
            let cell = &mut self.cells[coord.index()];
            if cell.state != CellState::Untouched || cell.ship.is_some() {
                continue;
            }
            cell.state = CellState::Miss;
            self.targets.remove(coord);
            revealed.push(*coord);
        }
        revealed
    }

    pub fn pick_random_target<R: Rng + ?Sized>(&self, rng: &mut R) -> Option<Coordinate> {
        self.targets.pick(rng)
    }

    /// Ships that still have hit points
    pub fn live_ships(&self) -> usize {
        self.ships.iter().filter(|ship| !ship.is_sunk()).count()
    }

    pub fn remaining_hit_points(&self) -> u32 {
        self.ships.iter().map(|ship| ship.hit_points as u32).sum()
    }

    pub fn is_defeated(&self) -> bool {
        self.live_ships() == 0
    }
}
