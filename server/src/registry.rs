//! In-memory store for everything the server knows: users, lobbies, matches,
//! who is where, and the leaderboard.
//!
//! There is exactly one registry per process, owned by the router inside the
//! main loop. Other components borrow it; nothing here is global. Nothing is
//! persisted.

use crate::error::GameError;
use crate::game::Match;
use crate::lobby::Lobby;
use log::{debug, info};
use shared::protocol::{LobbyInfo, LobbyMember, Winner};
use shared::{ConnectionId, LobbyId, MatchId};
use std::collections::{BTreeMap, HashMap};

#[derive(Debug, Clone)]
pub struct User {
    pub name: String,
    password: String,
    /// Socket the user is logged in on, if online
    pub connection: Option<ConnectionId>,
    pub wins: u32,
}

/// Where a connection currently is. At most one at a time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Membership {
    Lobby(LobbyId),
    Match(MatchId),
}

#[derive(Debug, Default)]
pub struct Registry {
    users: HashMap<String, User>,
    /// Logged-in connection -> username
    sessions: HashMap<ConnectionId, String>,
    lobbies: BTreeMap<LobbyId, Lobby>,
    matches: HashMap<MatchId, Match>,
    memberships: HashMap<ConnectionId, Membership>,
    next_lobby_id: u32,
    next_match_id: u32,
}

impl Registry {
    pub fn new() -> Self {
        Self {
            next_lobby_id: 1,
            next_match_id: 1,
            ..Default::default()
        }
    }

    // -- users --------------------------------------------------------------

    /// Creates the user on first sight, otherwise logs them in.
    ///
    /// A username can only be online on one connection, and a connection can
    /// only carry one username.
    pub fn register(
        &mut self,
        connection: ConnectionId,
        name: &str,
        password: &str,
    ) -> Result<&User, GameError> {
        let name = name.trim();
        if name.is_empty() || password.is_empty() {
            return Err(GameError::InvalidCredentials);
        }
        if let Some(current) = self.sessions.get(&connection) {
            if current != name {
                return Err(GameError::AlreadyLoggedIn(current.clone()));
            }
        }

        match self.users.get(name) {
            Some(user) if user.password != password => return Err(GameError::WrongPassword),
            Some(user) if user.connection.is_some_and(|c| c != connection) => {
                return Err(GameError::AlreadyOnline(name.to_string()))
            }
            Some(_) => info!("User {} logged in on connection {}", name, connection),
            None => {
                self.users.insert(
                    name.to_string(),
                    User {
                        name: name.to_string(),
                        password: password.to_string(),
                        connection: None,
                        wins: 0,
                    },
                );
                info!("New user registered: {}", name);
            }
        }

        self.sessions.insert(connection, name.to_string());
        let user = self
            .users
            .get_mut(name)
            .ok_or(GameError::NotRegistered(connection))?;
        user.connection = Some(connection);
        Ok(user)
    }

    pub fn user_by_connection(&self, connection: ConnectionId) -> Option<&User> {
        self.sessions
            .get(&connection)
            .and_then(|name| self.users.get(name))
    }

    pub fn username(&self, connection: ConnectionId) -> Option<&str> {
        self.sessions.get(&connection).map(String::as_str)
    }

    /// Marks the user behind a closed socket offline. Lobby and match
    /// membership is left for the caller to resolve.
    pub fn detach_connection(&mut self, connection: ConnectionId) -> Option<String> {
        let name = self.sessions.remove(&connection)?;
        if let Some(user) = self.users.get_mut(&name) {
            user.connection = None;
        }
        debug!("User {} went offline", name);
        Some(name)
    }

    /// Connections with a logged-in user, in id order
    pub fn online_connections(&self) -> Vec<ConnectionId> {
        let mut ids: Vec<ConnectionId> = self.sessions.keys().copied().collect();
        ids.sort();
        ids
    }

    pub fn membership(&self, connection: ConnectionId) -> Option<Membership> {
        self.memberships.get(&connection).copied()
    }

    // -- lobbies ------------------------------------------------------------

    pub fn create_lobby(&mut self, creator: ConnectionId, name: String) -> LobbyId {
        let id = LobbyId(self.next_lobby_id);
        self.next_lobby_id += 1;

        self.lobbies.insert(id, Lobby::new(id, creator, name));
        self.memberships.insert(creator, Membership::Lobby(id));
        id
    }

    pub fn lobby(&self, id: LobbyId) -> Option<&Lobby> {
        self.lobbies.get(&id)
    }

    pub(crate) fn add_to_lobby(&mut self, id: LobbyId, connection: ConnectionId, name: String) {
        if let Some(lobby) = self.lobbies.get_mut(&id) {
            lobby.push(connection, name);
            self.memberships.insert(connection, Membership::Lobby(id));
        }
    }

    /// Removes a lobby and releases its occupants
    pub fn remove_lobby(&mut self, id: LobbyId) -> Option<Lobby> {
        let lobby = self.lobbies.remove(&id)?;
        for (occupant, _) in lobby.occupants() {
            if self.memberships.get(occupant) == Some(&Membership::Lobby(id)) {
                self.memberships.remove(occupant);
            }
        }
        debug!("Lobby {} removed", id);
        Some(lobby)
    }

    pub fn all_lobbies(&self) -> impl Iterator<Item = &Lobby> {
        self.lobbies.values()
    }

    /// Lobbies still waiting for a second player, as sent to clients
    pub fn open_lobbies(&self) -> Vec<LobbyInfo> {
        self.all_lobbies()
            .filter(|lobby| !lobby.is_full())
            .map(|lobby| LobbyInfo {
                room_id: lobby.id,
                room_users: lobby
                    .occupants()
                    .iter()
                    .map(|(index, name)| LobbyMember {
                        name: name.clone(),
                        index: *index,
                    })
                    .collect(),
            })
            .collect()
    }

    // -- matches ------------------------------------------------------------

    pub fn insert_match(
        &mut self,
        first: (ConnectionId, String),
        second: (ConnectionId, String),
    ) -> MatchId {
        let id = MatchId(self.next_match_id);
        self.next_match_id += 1;

        self.memberships.insert(first.0, Membership::Match(id));
        self.memberships.insert(second.0, Membership::Match(id));
        self.matches.insert(id, Match::new(id, first, second));
        id
    }

    pub fn match_ref(&self, id: MatchId) -> Option<&Match> {
        self.matches.get(&id)
    }

    pub fn match_mut(&mut self, id: MatchId) -> Option<&mut Match> {
        self.matches.get_mut(&id)
    }

    /// Drops a finished or abandoned match and frees both players
    pub fn close_match(&mut self, id: MatchId) -> Option<Match> {
        let game = self.matches.remove(&id)?;
        for player in game.participant_ids() {
            if self.memberships.get(&player) == Some(&Membership::Match(id)) {
                self.memberships.remove(&player);
            }
        }
        debug!("Match {} closed", id);
        Some(game)
    }

    pub fn match_count(&self) -> usize {
        self.matches.len()
    }

    // -- leaderboard --------------------------------------------------------

    /// Returns the user's new win count
    pub fn record_win(&mut self, name: &str) -> Option<u32> {
        let user = self.users.get_mut(name)?;
        user.wins += 1;
        info!("{} now has {} wins", name, user.wins);
        Some(user.wins)
    }

    /// Users with at least one win, most wins first
    pub fn leaderboard(&self) -> Vec<Winner> {
        let mut winners: Vec<Winner> = self
            .users
            .values()
            .filter(|user| user.wins > 0)
            .map(|user| Winner {
                name: user.name.clone(),
                wins: user.wins,
            })
            .collect();
        winners.sort_by(|a, b| b.wins.cmp(&a.wins).then_with(|| a.name.cmp(&b.name)));
        winners
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio_test::{assert_err, assert_ok};

    const C1: ConnectionId = ConnectionId(1);
    const C2: ConnectionId = ConnectionId(2);

    #[test]
    fn test_register_new_user() {
        let mut registry = Registry::new();
        let user = assert_ok!(registry.register(C1, "alice", "secret"));
        assert_eq!(user.name, "alice");
        assert_eq!(user.connection, Some(C1));
        assert_eq!(registry.username(C1), Some("alice"));
        assert_eq!(registry.online_connections(), vec![C1]);
    }

    #[test]
    fn test_register_rejections() {
        let mut registry = Registry::new();
        assert_eq!(
            registry.register(C1, "  ", "secret").unwrap_err(),
            GameError::InvalidCredentials
        );
        assert_eq!(
            registry.register(C1, "alice", "").unwrap_err(),
            GameError::InvalidCredentials
        );

        registry.register(C1, "alice", "secret").unwrap();
        assert_eq!(
            registry.register(C2, "alice", "wrong").unwrap_err(),
            GameError::WrongPassword
        );
        assert_eq!(
            registry.register(C2, "alice", "secret").unwrap_err(),
            GameError::AlreadyOnline("alice".to_string())
        );
        assert_eq!(
            registry.register(C1, "bob", "secret").unwrap_err(),
            GameError::AlreadyLoggedIn("alice".to_string())
        );
    }

    #[test]
    fn test_login_after_disconnect() {
        let mut registry = Registry::new();
        registry.register(C1, "alice", "secret").unwrap();
        assert_eq!(registry.detach_connection(C1), Some("alice".to_string()));
        assert!(registry.user_by_connection(C1).is_none());
        assert!(registry.online_connections().is_empty());

        let user = assert_ok!(registry.register(C2, "alice", "secret"));
        assert_eq!(user.connection, Some(C2));
        assert_err!(registry.register(C1, "alice", "nope"));
    }

    #[test]
    fn test_lobby_membership_cleared_on_remove() {
        let mut registry = Registry::new();
        registry.register(C1, "alice", "secret").unwrap();
        let id = registry.create_lobby(C1, "alice".to_string());

        assert_eq!(registry.membership(C1), Some(Membership::Lobby(id)));
        assert_eq!(registry.open_lobbies().len(), 1);
        assert_eq!(registry.open_lobbies()[0].room_users[0].name, "alice");

        assert!(registry.remove_lobby(id).is_some());
        assert_eq!(registry.membership(C1), None);
        assert!(registry.remove_lobby(id).is_none());
    }

    #[test]
    fn test_ids_are_unique() {
        let mut registry = Registry::new();
        let l1 = registry.create_lobby(C1, "a".into());
        let l2 = registry.create_lobby(C2, "b".into());
        assert_ne!(l1, l2);

        let m1 = registry.insert_match((C1, "a".into()), (C2, "b".into()));
        let m2 = registry.insert_match((ConnectionId(3), "c".into()), (ConnectionId(4), "d".into()));
        assert_ne!(m1, m2);
        assert_eq!(registry.match_count(), 2);
    }

    #[test]
    fn test_close_match_frees_players() {
        let mut registry = Registry::new();
        let id = registry.insert_match((C1, "a".into()), (C2, "b".into()));
        assert_eq!(registry.membership(C2), Some(Membership::Match(id)));

        assert!(registry.close_match(id).is_some());
        assert_eq!(registry.membership(C1), None);
        assert_eq!(registry.membership(C2), None);
        assert!(registry.match_ref(id).is_none());
    }

    #[test]
    fn test_leaderboard_order() {
        let mut registry = Registry::new();
        registry.register(C1, "bob", "pw").unwrap();
        registry.register(C2, "alice", "pw").unwrap();
        registry.register(ConnectionId(3), "carol", "pw").unwrap();

        assert!(registry.leaderboard().is_empty());
        registry.record_win("bob");
        registry.record_win("alice");
        assert_eq!(registry.record_win("alice"), Some(2));
        registry.record_win("carol");
        assert_eq!(registry.record_win("nobody"), None);

        let names: Vec<_> = registry
            .leaderboard()
            .into_iter()
            .map(|w| (w.name, w.wins))
            .collect();
        assert_eq!(
            names,
            vec![
                ("alice".to_string(), 2),
                ("bob".to_string(), 1),
                ("carol".to_string(), 1)
            ]
        );
    }
}
