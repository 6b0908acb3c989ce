//! Types and rules shared between the battleship server and its clients:
//! board geometry, the ship model with its validator, and the JSON protocol.

pub mod fleet;
pub mod geometry;
pub mod ids;
pub mod protocol;

pub use fleet::{
    is_valid_placement, validate_fleet, validate_placement, Orientation, PlacementError, RawPosition,
    Ship, ShipClass, ShipSubmission,
};
pub use geometry::{is_in_bounds, Coordinate};
pub use ids::{ConnectionId, LobbyId, MatchId};
pub use protocol::{AttackStatus, ClientMessage, Envelope, ProtocolError, ServerMessage};

/// Side length of the square board
pub const BOARD_DIMENSION: usize = 10;
/// Longest ship a fleet may contain
pub const MAX_SHIP_SIZE: usize = 4;
/// Most ships one player may place
pub const MAX_FLEET_SIZE: usize = 10;
/// Players per lobby and per match
pub const MAX_LOBBY_PARTICIPANTS: usize = 2;
