//! Message router: turns one inbound frame into state changes and an ordered
//! list of outbound notifications.
//!
//! The router owns the registry and the random source. It never touches a
//! socket; the network layer delivers whatever it returns, in order.

use crate::battle::AttackOutcome;
use crate::error::GameError;
use crate::game::FleetPlacement;
use crate::lobby::LobbyCoordinator;
use crate::registry::{Membership, Registry};
use log::{debug, info, warn};
use rand::rngs::StdRng;
use rand::SeedableRng;
use shared::protocol::{
    AttackFeedback, AttackRequest, ErrorInfo, FinishInfo, GameCreated, GameStarted,
    PlaceFleetRequest, RandomAttackRequest, RegisterRequest, RegistrationReply, TurnInfo,
};
use shared::{
    AttackStatus, ClientMessage, ConnectionId, Coordinate, LobbyId, MatchId, ServerMessage, Ship,
};

/// A message bound for one connection
#[derive(Debug, Clone, PartialEq)]
pub struct Outbound {
    pub recipient: ConnectionId,
    pub message: ServerMessage,
}

impl Outbound {
    pub fn new(recipient: ConnectionId, message: ServerMessage) -> Self {
        Self { recipient, message }
    }
}

enum Shot {
    At(i32, i32),
    Random,
}

pub struct Router {
    registry: Registry,
    rng: StdRng,
}

impl Router {
    /// A fixed seed makes random attacks reproducible
    pub fn new(seed: Option<u64>) -> Self {
        let rng = match seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        Self {
            registry: Registry::new(),
            rng,
        }
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn handle_message(&mut self, connection: ConnectionId, text: &str) -> Vec<Outbound> {
        let message = match ClientMessage::decode(text) {
            Ok(message) => message,
            Err(e) => {
                warn!("Dropping frame from {}: {}", connection, e);
                return Vec::new();
            }
        };
        debug!("<- {}: {}", connection, message.kind());

        let mut out = Vec::new();
        let kind = message.kind();
        let result = match message {
            ClientMessage::Register(request) => {
                self.handle_register(connection, request, &mut out);
                Ok(())
            }
            ClientMessage::CreateLobby => self.handle_create_lobby(connection, &mut out),
            ClientMessage::JoinLobby(request) => {
                self.handle_join_lobby(connection, request.index_room, &mut out)
            }
            ClientMessage::PlaceFleet(request) => {
                self.handle_place_fleet(connection, request, &mut out)
            }
            ClientMessage::Attack(AttackRequest {
                game_id,
                x,
                y,
                index_player,
            }) => check_identity(connection, index_player)
                .and_then(|_| self.handle_attack(connection, game_id, Shot::At(x, y), &mut out)),
            ClientMessage::RandomAttack(RandomAttackRequest {
                game_id,
                index_player,
            }) => check_identity(connection, index_player)
                .and_then(|_| self.handle_attack(connection, game_id, Shot::Random, &mut out)),
        };

        if let Err(e) = result {
            warn!("Rejected {} from {}: {}", kind, connection, e);
            out.push(Outbound::new(
                connection,
                ServerMessage::Rejected(ErrorInfo {
                    error_text: e.to_string(),
                }),
            ));
        }
        out
    }

    /// Cleans up after a closed socket: waiting lobbies are dissolved, an
    /// active match goes to the opponent, a forming match is abandoned and
    /// the remaining player is told so.
    pub fn handle_disconnect(&mut self, connection: ConnectionId) -> Vec<Outbound> {
        let mut out = Vec::new();
        let membership = self.registry.membership(connection);
        self.registry.detach_connection(connection);

        match membership {
            Some(Membership::Lobby(_)) => {
                LobbyCoordinator::new(&mut self.registry).abandon(connection);
                self.broadcast_lobbies(&mut out);
            }
            Some(Membership::Match(match_id)) => {
                let Some(game) = self.registry.match_mut(match_id) else {
                    return out;
                };
                match game.forfeit(connection) {
                    Some(winner) => {
                        let winner_name = game.participant(winner).map(|p| p.username.clone());
                        out.push(Outbound::new(
                            winner,
                            ServerMessage::MatchFinished(FinishInfo { win_player: winner }),
                        ));
                        self.finish_match(match_id, winner_name, &mut out);
                    }
                    None => {
                        info!("Match {} abandoned by {}", match_id, connection);
                        let remaining = game.opponent_of(connection);
                        self.registry.close_match(match_id);
                        if let Some(remaining) = remaining {
                            out.push(Outbound::new(
                                remaining,
                                ServerMessage::Rejected(ErrorInfo {
                                    error_text: GameError::OpponentLeft(match_id).to_string(),
                                }),
                            ));
                        }
                        self.broadcast_lobbies(&mut out);
                    }
                }
            }
            None => {}
        }
        out
    }

    fn handle_register(
        &mut self,
        connection: ConnectionId,
        request: RegisterRequest,
        out: &mut Vec<Outbound>,
    ) {
        let reply = match self
            .registry
            .register(connection, &request.name, &request.password)
        {
            Ok(user) => RegistrationReply {
                name: user.name.clone(),
                index: connection,
                error: false,
                error_text: String::new(),
            },
            Err(e) => {
                warn!("Registration of {} failed: {}", request.name, e);
                RegistrationReply {
                    name: request.name,
                    index: connection,
                    error: true,
                    error_text: e.to_string(),
                }
            }
        };
        let accepted = !reply.error;
        out.push(Outbound::new(connection, ServerMessage::Registered(reply)));

        if accepted {
            self.broadcast_lobbies(out);
            self.broadcast_leaderboard(out);
        }
    }

    fn handle_create_lobby(
        &mut self,
        connection: ConnectionId,
        out: &mut Vec<Outbound>,
    ) -> Result<(), GameError> {
        LobbyCoordinator::new(&mut self.registry).create_lobby(connection)?;
        self.broadcast_lobbies(out);
        Ok(())
    }

    fn handle_join_lobby(
        &mut self,
        connection: ConnectionId,
        lobby_id: LobbyId,
        out: &mut Vec<Outbound>,
    ) -> Result<(), GameError> {
        let mut lobbies = LobbyCoordinator::new(&mut self.registry);
        lobbies.join_lobby(lobby_id, connection)?;
        let match_id = lobbies.start_match(lobby_id)?;

        let game = self
            .registry
            .match_ref(match_id)
            .ok_or(GameError::MatchNotFound(match_id))?;
        for player in game.participant_ids() {
            out.push(Outbound::new(
                player,
                ServerMessage::MatchStarted(GameCreated {
                    id_game: match_id,
                    id_player: player,
                }),
            ));
        }
        self.broadcast_lobbies(out);
        Ok(())
    }

    fn handle_place_fleet(
        &mut self,
        connection: ConnectionId,
        request: PlaceFleetRequest,
        out: &mut Vec<Outbound>,
    ) -> Result<(), GameError> {
        check_identity(connection, request.index_player)?;
        let game = self
            .registry
            .match_mut(request.game_id)
            .ok_or(GameError::MatchNotFound(request.game_id))?;
        let ships = request
            .ships
            .into_iter()
            .map(Ship::try_from)
            .collect::<Result<Vec<_>, _>>()?;

        let FleetPlacement::Started { first_turn } = game.place_fleet(connection, ships)?
        else {
            return Ok(());
        };

        for participant in game.participants() {
            out.push(Outbound::new(
                participant.id,
                ServerMessage::FleetAccepted(GameStarted {
                    ships: participant.fleet().map(|f| f.to_vec()).unwrap_or_default(),
                    current_player_index: first_turn,
                }),
            ));
        }
        for player in game.participant_ids() {
            out.push(Outbound::new(
                player,
                ServerMessage::TurnChanged(TurnInfo {
                    current_player: first_turn,
                }),
            ));
        }
        Ok(())
    }

    fn handle_attack(
        &mut self,
        connection: ConnectionId,
        match_id: MatchId,
        shot: Shot,
        out: &mut Vec<Outbound>,
    ) -> Result<(), GameError> {
        let game = self
            .registry
            .match_mut(match_id)
            .ok_or(GameError::MatchNotFound(match_id))?;
        let report = match shot {
            Shot::At(x, y) => game.attack(connection, x, y)?,
            Shot::Random => game.random_attack(connection, &mut self.rng)?,
        };
        let players = game.participant_ids();
        let winner_name = report
            .winner
            .and_then(|winner| game.participant(winner))
            .map(|p| p.username.clone());

        let feedback = |position: Coordinate, status: AttackStatus| {
            ServerMessage::AttackResult(AttackFeedback {
                position,
                current_player: report.attacker,
                status,
            })
        };
        let mut notices = vec![feedback(report.target, report.outcome.status())];
        if let AttackOutcome::Killed {
            ship_cells,
            border_cells,
        } = &report.outcome
        {
            notices.extend(
                ship_cells
                    .iter()
                    .filter(|c| **c != report.target)
                    .map(|c| feedback(*c, AttackStatus::Killed)),
            );
            notices.extend(border_cells.iter().map(|c| feedback(*c, AttackStatus::Miss)));
        }
        notices.push(match report.winner {
            Some(winner) => ServerMessage::MatchFinished(FinishInfo { win_player: winner }),
            None => ServerMessage::TurnChanged(TurnInfo {
                current_player: report.next_turn,
            }),
        });

        for notice in notices {
            for player in players {
                out.push(Outbound::new(player, notice.clone()));
            }
        }

        if report.winner.is_some() {
            self.finish_match(match_id, winner_name, out);
        }
        Ok(())
    }

    /// Records the win, drops the match and tells everyone online
    fn finish_match(&mut self, match_id: MatchId, winner: Option<String>, out: &mut Vec<Outbound>) {
        if let Some(name) = winner {
            self.registry.record_win(&name);
        }
        self.registry.close_match(match_id);
        self.broadcast_lobbies(out);
        self.broadcast_leaderboard(out);
    }

    fn broadcast_lobbies(&self, out: &mut Vec<Outbound>) {
        self.broadcast(ServerMessage::LobbyList(self.registry.open_lobbies()), out);
    }

    fn broadcast_leaderboard(&self, out: &mut Vec<Outbound>) {
        self.broadcast(ServerMessage::Leaderboard(self.registry.leaderboard()), out);
    }

    fn broadcast(&self, message: ServerMessage, out: &mut Vec<Outbound>) {
        for connection in self.registry.online_connections() {
            out.push(Outbound::new(connection, message.clone()));
        }
    }
}

/// A client-supplied player index must name the sending connection
fn check_identity(connection: ConnectionId, claimed: Option<ConnectionId>) -> Result<(), GameError> {
    match claimed {
        Some(claimed) if claimed != connection => Err(GameError::IdentityMismatch { claimed }),
        _ => Ok(()),
    }
}
