//! Lobby coordinator: pairs two waiting players into a match.

use crate::error::GameError;
use crate::registry::{Membership, Registry};
use log::info;
use shared::{ConnectionId, LobbyId, MatchId, MAX_LOBBY_PARTICIPANTS};

/// A waiting room with one or two occupants, kept in join order
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Lobby {
    pub id: LobbyId,
    occupants: Vec<(ConnectionId, String)>,
}

impl Lobby {
    pub fn new(id: LobbyId, creator: ConnectionId, name: String) -> Self {
        Self {
            id,
            occupants: vec![(creator, name)],
        }
    }

    pub fn occupants(&self) -> &[(ConnectionId, String)] {
        &self.occupants
    }

    pub fn creator(&self) -> ConnectionId {
        self.occupants[0].0
    }

    pub fn contains(&self, id: ConnectionId) -> bool {
        self.occupants.iter().any(|(occupant, _)| *occupant == id)
    }

    pub fn is_full(&self) -> bool {
        self.occupants.len() >= MAX_LOBBY_PARTICIPANTS
    }

    pub(crate) fn push(&mut self, id: ConnectionId, name: String) {
        self.occupants.push((id, name));
    }
}

/// Lobby operations over the registry
pub struct LobbyCoordinator<'a> {
    registry: &'a mut Registry,
}

impl<'a> LobbyCoordinator<'a> {
    pub fn new(registry: &'a mut Registry) -> Self {
        Self { registry }
    }

    fn username(&self, participant: ConnectionId) -> Result<String, GameError> {
        self.registry
            .username(participant)
            .map(str::to_string)
            .ok_or(GameError::NotRegistered(participant))
    }

    pub fn create_lobby(&mut self, participant: ConnectionId) -> Result<LobbyId, GameError> {
        let name = self.username(participant)?;
        match self.registry.membership(participant) {
            Some(Membership::Lobby(id)) => return Err(GameError::AlreadyInLobby(id)),
            Some(Membership::Match(id)) => return Err(GameError::AlreadyInMatch(id)),
            None => {}
        }

        let id = self.registry.create_lobby(participant, name.clone());
        info!("Lobby {} created by {} ({})", id, name, participant);
        Ok(id)
    }

    /// Adds a second player. A joiner waiting in a lobby of their own leaves it.
    pub fn join_lobby(
        &mut self,
        lobby_id: LobbyId,
        participant: ConnectionId,
    ) -> Result<(), GameError> {
        let name = self.username(participant)?;
        let lobby = self
            .registry
            .lobby(lobby_id)
            .ok_or(GameError::LobbyNotFound(lobby_id))?;
        if lobby.creator() == participant {
            return Err(GameError::OwnLobby);
        }
        if lobby.is_full() {
            return Err(GameError::LobbyFull(lobby_id));
        }

        match self.registry.membership(participant) {
            Some(Membership::Match(id)) => return Err(GameError::AlreadyInMatch(id)),
            Some(Membership::Lobby(own)) => {
                info!("{} leaves lobby {} to join {}", name, own, lobby_id);
                self.registry.remove_lobby(own);
            }
            None => {}
        }

        self.registry.add_to_lobby(lobby_id, participant, name.clone());
        info!("{} ({}) joined lobby {}", name, participant, lobby_id);
        Ok(())
    }

    /// Turns a full lobby into a match. The lobby is gone afterwards.
    pub fn start_match(&mut self, lobby_id: LobbyId) -> Result<MatchId, GameError> {
        let lobby = self
            .registry
            .lobby(lobby_id)
            .ok_or(GameError::LobbyNotFound(lobby_id))?;
        if lobby.occupants().len() != MAX_LOBBY_PARTICIPANTS {
            return Err(GameError::LobbyNotReady(lobby_id));
        }

        let Some(lobby) = self.registry.remove_lobby(lobby_id) else {
            return Err(GameError::LobbyNotFound(lobby_id));
        };
        let mut occupants = lobby.occupants.into_iter();
        let (Some(first), Some(second)) = (occupants.next(), occupants.next()) else {
            return Err(GameError::LobbyNotReady(lobby_id));
        };

        let match_id = self.registry.insert_match(first, second);
        info!("Lobby {} became match {}", lobby_id, match_id);
        Ok(match_id)
    }

    /// Dissolves the lobby a leaving player waits in, if any
    pub fn abandon(&mut self, participant: ConnectionId) -> Option<LobbyId> {
        match self.registry.membership(participant) {
            Some(Membership::Lobby(id)) => {
                self.registry.remove_lobby(id);
                info!("Lobby {} abandoned by {}", id, participant);
                Some(id)
            }
            _ => None,
        }
    }
}
