//! Rejected actions: well-formed requests that break a game rule.
//!
//! None of these are fatal. The router logs them and answers the requester
//! with an `error` message; game state is left untouched.

use shared::{ConnectionId, Coordinate, LobbyId, MatchId, PlacementError, MAX_LOBBY_PARTICIPANTS};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GameError {
    #[error("Invalid data provided")]
    InvalidCredentials,
    #[error("Incorrect password")]
    WrongPassword,
    #[error("User {0} is already online")]
    AlreadyOnline(String),
    #[error("Connection is already logged in as {0}")]
    AlreadyLoggedIn(String),
    #[error("Connection {0} is not registered")]
    NotRegistered(ConnectionId),

    #[error("Lobby {0} not found")]
    LobbyNotFound(LobbyId),
    #[error("Lobby {0} is full")]
    LobbyFull(LobbyId),
    #[error("Cannot join your own lobby")]
    OwnLobby,
    #[error("Already waiting in lobby {0}")]
    AlreadyInLobby(LobbyId),
    #[error("Already playing in match {0}")]
    AlreadyInMatch(MatchId),
    #[error("Lobby {0} needs {max} players to start", max = MAX_LOBBY_PARTICIPANTS)]
    LobbyNotReady(LobbyId),

    #[error("Match {0} not found")]
    MatchNotFound(MatchId),
    #[error("Opponent left, match {0} was abandoned")]
    OpponentLeft(MatchId),
    #[error("Player {0} is not part of this match")]
    NotParticipant(ConnectionId),
    #[error("Player index {claimed} does not belong to this connection")]
    IdentityMismatch { claimed: ConnectionId },
    #[error("Fleet already placed")]
    FleetAlreadyPlaced,
    #[error("Invalid vessel configuration: {0}")]
    InvalidFleet(#[from] PlacementError),
    #[error("Match is not active yet")]
    MatchNotActive,
    #[error("Match is already finished")]
    MatchFinished,
    #[error("Not your turn")]
    NotYourTurn,
    #[error("Target ({0}, {1}) is outside the grid")]
    OutOfRange(i32, i32),
    #[error("Cell {0} was already attacked")]
    AlreadyResolved(Coordinate),
    #[error("No targets left")]
    NoTargetsLeft,
}
