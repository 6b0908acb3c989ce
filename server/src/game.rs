//! Match state machine: fleet submission, turn arbitration and win detection
//! for one two-player game.
//!
//! ```text
//! Forming --second fleet--> Active --defender has no live ships--> Complete
//! ```
//!
//! The match owns both participants and both boards. A participant only knows
//! its opponent by id.

use crate::battle::{AttackOutcome, Board};
use crate::error::GameError;
use log::info;
use rand::Rng;
use shared::{validate_fleet, ConnectionId, Coordinate, MatchId, Ship};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchPhase {
    /// Zero or one fleets submitted
    Forming,
    /// Both fleets placed, attacks allowed
    Active,
    Complete {
        winner: ConnectionId,
    },
}

#[derive(Debug, Clone)]
pub struct Participant {
    pub id: ConnectionId,
    pub username: String,
    pub opponent: ConnectionId,
    fleet: Option<Vec<Ship>>,
    board: Board,
}

impl Participant {
    fn new(id: ConnectionId, username: String, opponent: ConnectionId) -> Self {
        Self {
            id,
            username,
            opponent,
            fleet: None,
            board: Board::new(),
        }
    }

    /// The fleet as submitted, once accepted
    pub fn fleet(&self) -> Option<&[Ship]> {
        self.fleet.as_deref()
    }

    pub fn board(&self) -> &Board {
        &self.board
    }

    pub fn is_ready(&self) -> bool {
        self.fleet.is_some()
    }
}

/// What a successful fleet submission did to the match
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FleetPlacement {
    /// Stored; the opponent has not placed yet
    Waiting,
    /// Both fleets are in and the match is now active
    Started { first_turn: ConnectionId },
}

/// Everything the outside world needs to know about one resolved attack
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttackReport {
    pub attacker: ConnectionId,
    pub defender: ConnectionId,
    pub target: Coordinate,
    pub outcome: AttackOutcome,
    /// Border cells turned into misses by a kill
    pub revealed: Vec<Coordinate>,
    pub next_turn: ConnectionId,
    pub winner: Option<ConnectionId>,
}

#[derive(Debug, Clone)]
pub struct Match {
    pub id: MatchId,
    participants: [Participant; 2],
    phase: MatchPhase,
    current_turn: ConnectionId,
}

impl Match {
    /// `first` is the lobby creator and takes the first turn
    pub fn new(id: MatchId, first: (ConnectionId, String), second: (ConnectionId, String)) -> Self {
        let (first_id, first_name) = first;
        let (second_id, second_name) = second;
        Self {
            id,
            participants: [
                Participant::new(first_id, first_name, second_id),
                Participant::new(second_id, second_name, first_id),
            ],
            phase: MatchPhase::Forming,
            current_turn: first_id,
        }
    }

    pub fn phase(&self) -> MatchPhase {
        self.phase
    }

    pub fn current_turn(&self) -> ConnectionId {
        self.current_turn
    }

    pub fn winner(&self) -> Option<ConnectionId> {
        match self.phase {
            MatchPhase::Complete { winner } => Some(winner),
            _ => None,
        }
    }

    pub fn is_complete(&self) -> bool {
        matches!(self.phase, MatchPhase::Complete { .. })
    }

    pub fn participants(&self) -> &[Participant; 2] {
        &self.participants
    }

    pub fn participant_ids(&self) -> [ConnectionId; 2] {
        [self.participants[0].id, self.participants[1].id]
    }

    pub fn participant(&self, id: ConnectionId) -> Option<&Participant> {
        self.participants.iter().find(|p| p.id == id)
    }

    pub fn is_participant(&self, id: ConnectionId) -> bool {
        self.participant(id).is_some()
    }

    pub fn opponent_of(&self, id: ConnectionId) -> Option<ConnectionId> {
        self.participant(id).map(|p| p.opponent)
    }

    fn index_of(&self, id: ConnectionId) -> Option<usize> {
        self.participants.iter().position(|p| p.id == id)
    }

    /// Stores a player's fleet. The second accepted fleet starts the match.
    pub fn place_fleet(
        &mut self,
        player: ConnectionId,
        ships: Vec<Ship>,
    ) -> Result<FleetPlacement, GameError> {
        match self.phase {
            MatchPhase::Forming => {}
            MatchPhase::Active => return Err(GameError::FleetAlreadyPlaced),
            MatchPhase::Complete { .. } => return Err(GameError::MatchFinished),
        }
        let idx = self
            .index_of(player)
            .ok_or(GameError::NotParticipant(player))?;
        if self.participants[idx].is_ready() {
            return Err(GameError::FleetAlreadyPlaced);
        }

        validate_fleet(&ships)?;
        let mut board = Board::new();
        board.place_fleet(&ships)?;

        let participant = &mut self.participants[idx];
        participant.board = board;
        participant.fleet = Some(ships);
        info!(
            "Match {}: player {} placed {} ships",
            self.id,
            player,
            participant.fleet().map_or(0, |f| f.len())
        );

        if self.participants.iter().all(Participant::is_ready) {
            self.phase = MatchPhase::Active;
            self.current_turn = self.participants[0].id;
            info!(
                "Match {} is active, player {} fires first",
                self.id, self.current_turn
            );
            return Ok(FleetPlacement::Started {
                first_turn: self.current_turn,
            });
        }

        Ok(FleetPlacement::Waiting)
    }

    /// Checks everything an attack needs except the target itself.
    /// Returns (attacker index, defender index).
    fn authorize_attack(&self, attacker: ConnectionId) -> Result<(usize, usize), GameError> {
        match self.phase {
            MatchPhase::Forming => return Err(GameError::MatchNotActive),
            MatchPhase::Complete { .. } => return Err(GameError::MatchFinished),
            MatchPhase::Active => {}
        }
        let attacker_idx = self
            .index_of(attacker)
            .ok_or(GameError::NotParticipant(attacker))?;
        if self.current_turn != attacker {
            return Err(GameError::NotYourTurn);
        }
        Ok((attacker_idx, 1 - attacker_idx))
    }

    pub fn attack(
        &mut self,
        attacker: ConnectionId,
        x: i32,
        y: i32,
    ) -> Result<AttackReport, GameError> {
        let (_, defender_idx) = self.authorize_attack(attacker)?;
        let target = Coordinate::new(x, y).ok_or(GameError::OutOfRange(x, y))?;
        self.fire(attacker, defender_idx, target)
    }

    /// Attacks a uniformly chosen untouched cell of the opponent's board
    pub fn random_attack<R: Rng + ?Sized>(
        &mut self,
        attacker: ConnectionId,
        rng: &mut R,
    ) -> Result<AttackReport, GameError> {
        let (_, defender_idx) = self.authorize_attack(attacker)?;
        let target = self.participants[defender_idx]
            .board
            .pick_random_target(rng)
            .ok_or(GameError::NoTargetsLeft)?;
        self.fire(attacker, defender_idx, target)
    }

    fn fire(
        &mut self,
        attacker: ConnectionId,
        defender_idx: usize,
        target: Coordinate,
    ) -> Result<AttackReport, GameError> {
        let defender = &mut self.participants[defender_idx];
        let outcome = defender
            .board
            .resolve_attack(target)
            .ok_or(GameError::AlreadyResolved(target))?;

        let revealed = match &outcome {
            AttackOutcome::Killed { border_cells, .. } => {
                defender.board.apply_kill_side_effects(border_cells)
            }
            _ => Vec::new(),
        };
        let defender_id = defender.id;
        let defeated = defender.board.is_defeated();

        if !outcome.keeps_turn() {
            self.current_turn = defender_id;
        }

        let winner = if defeated {
            self.phase = MatchPhase::Complete { winner: attacker };
            info!("Match {} finished, winner {}", self.id, attacker);
            Some(attacker)
        } else {
            None
        };

        info!(
            "Match {}: {} fired at {} -> {:?}",
            self.id,
            attacker,
            target,
            outcome.status()
        );

        Ok(AttackReport {
            attacker,
            defender: defender_id,
            target,
            outcome,
            revealed,
            next_turn: self.current_turn,
            winner,
        })
    }

    /// A participant left. An active match goes to the opponent; a match that
    /// never started is abandoned and `None` is returned.
    pub fn forfeit(&mut self, leaver: ConnectionId) -> Option<ConnectionId> {
        let opponent = self.opponent_of(leaver)?;
        match self.phase {
            MatchPhase::Active => {
                self.phase = MatchPhase::Complete { winner: opponent };
                info!(
                    "Match {}: player {} left, {} wins by forfeit",
                    self.id, leaver, opponent
                );
                Some(opponent)
            }
            MatchPhase::Forming | MatchPhase::Complete { .. } => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::battle::CellState;
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use shared::{Orientation, PlacementError, ShipClass};
    use tokio_test::{assert_err, assert_ok};

    const A: ConnectionId = ConnectionId(1);
    const B: ConnectionId = ConnectionId(2);

    fn new_match() -> Match {
        Match::new(MatchId(1), (A, "alice".into()), (B, "bob".into()))
    }

    fn two_ships() -> Vec<Ship> {
        vec![
            Ship::new(0, 0, Orientation::Horizontal, 2, ShipClass::Medium),
            Ship::new(5, 5, Orientation::Vertical, 1, ShipClass::Small),
        ]
    }

    fn active_match() -> Match {
        let mut game = new_match();
        assert_eq!(
            game.place_fleet(A, two_ships()).unwrap(),
            FleetPlacement::Waiting
        );
        assert_eq!(
            game.place_fleet(B, two_ships()).unwrap(),
            FleetPlacement::Started { first_turn: A }
        );
        game
    }

    #[test]
    fn test_new_match() {
        let game = new_match();
        assert_eq!(game.phase(), MatchPhase::Forming);
        assert_eq!(game.current_turn(), A);
        assert_eq!(game.opponent_of(A), Some(B));
        assert_eq!(game.opponent_of(B), Some(A));
        assert_eq!(game.opponent_of(ConnectionId(3)), None);
        assert_eq!(game.participant_ids(), [A, B]);
    }

    #[test]
    fn test_first_fleet_keeps_forming() {
        let mut game = new_match();
        assert_eq!(assert_ok!(game.place_fleet(B, two_ships())), FleetPlacement::Waiting);
        assert_eq!(game.phase(), MatchPhase::Forming);
        assert!(game.participant(B).unwrap().is_ready());
        assert!(!game.participant(A).unwrap().is_ready());
    }

    #[test]
    fn test_second_fleet_activates_with_creator_turn() {
        let mut game = new_match();
        game.place_fleet(B, two_ships()).unwrap();
        let placement = game.place_fleet(A, two_ships()).unwrap();
        assert_eq!(placement, FleetPlacement::Started { first_turn: A });
        assert_eq!(game.phase(), MatchPhase::Active);
        assert_eq!(game.current_turn(), A);
    }

    #[test]
    fn test_fleet_rejections() {
        let mut game = new_match();

        let too_long = vec![Ship::new(0, 0, Orientation::Horizontal, 5, ShipClass::Huge)];
        assert_eq!(
            game.place_fleet(A, too_long),
            Err(GameError::InvalidFleet(PlacementError::InvalidLength(5)))
        );
        assert!(!game.participant(A).unwrap().is_ready());
        assert!(game
            .participant(A)
            .unwrap()
            .board()
            .cells()
            .iter()
            .all(|c| c.state == CellState::Untouched && !c.has_ship()));

        assert_eq!(
            game.place_fleet(A, Vec::new()),
            Err(GameError::InvalidFleet(PlacementError::EmptyFleet))
        );
        assert_eq!(
            game.place_fleet(ConnectionId(9), two_ships()),
            Err(GameError::NotParticipant(ConnectionId(9)))
        );

        game.place_fleet(A, two_ships()).unwrap();
        assert_eq!(
            game.place_fleet(A, two_ships()),
            Err(GameError::FleetAlreadyPlaced)
        );
    }

    #[test]
    fn test_attack_rejections() {
        let mut game = new_match();
        assert_eq!(game.attack(A, 0, 0), Err(GameError::MatchNotActive));

        let mut game = active_match();
        assert_eq!(game.attack(B, 0, 0), Err(GameError::NotYourTurn));
        assert_eq!(
            game.attack(ConnectionId(7), 0, 0),
            Err(GameError::NotParticipant(ConnectionId(7)))
        );
        assert_eq!(game.attack(A, 10, 0), Err(GameError::OutOfRange(10, 0)));
        assert_eq!(game.attack(A, 0, -1), Err(GameError::OutOfRange(0, -1)));
        assert_eq!(game.current_turn(), A);
    }

    #[test]
    fn test_miss_passes_turn() {
        let mut game = active_match();
        let report = game.attack(A, 9, 9).unwrap();
        assert_eq!(report.outcome, AttackOutcome::Miss);
        assert_eq!(report.defender, B);
        assert_eq!(report.next_turn, B);
        assert_eq!(game.current_turn(), B);
    }

    #[test]
    fn test_hit_and_kill_keep_turn() {
        let mut game = active_match();

        let report = game.attack(A, 0, 0).unwrap();
        assert_eq!(report.outcome, AttackOutcome::Shot);
        assert_eq!(game.current_turn(), A);

        let report = game.attack(A, 1, 0).unwrap();
        assert!(matches!(report.outcome, AttackOutcome::Killed { .. }));
        assert_eq!(report.next_turn, A);
        assert!(report.winner.is_none());

        // border of a 2-cell ship in the corner: (2,0) and (0..=2,1)
        assert_eq!(report.revealed.len(), 4);
        let defender_board = game.participant(B).unwrap().board();
        for c in &report.revealed {
            assert_eq!(defender_board.cells()[c.index()].state, CellState::Miss);
        }
        // attacker's own board is unaffected
        let attacker_board = game.participant(A).unwrap().board();
        assert_eq!(attacker_board.cell_at(2, 0).unwrap().state, CellState::Untouched);
    }

    #[test]
    fn test_resolved_cell_rejected() {
        let mut game = active_match();
        game.attack(A, 0, 0).unwrap();
        assert_err!(game.attack(A, 0, 0));
        assert_eq!(
            game.attack(A, 0, 0),
            Err(GameError::AlreadyResolved(Coordinate { x: 0, y: 0 }))
        );
        assert_eq!(game.current_turn(), A);
    }

    #[test]
    fn test_decisive_shot_wins() {
        let mut game = active_match();
        game.attack(A, 0, 0).unwrap();
        game.attack(A, 1, 0).unwrap();
        let report = game.attack(A, 5, 5).unwrap();

        assert_eq!(report.winner, Some(A));
        assert_eq!(game.phase(), MatchPhase::Complete { winner: A });
        assert_eq!(game.winner(), Some(A));
        assert_eq!(game.attack(A, 9, 9), Err(GameError::MatchFinished));
        assert_eq!(game.attack(B, 9, 9), Err(GameError::MatchFinished));
    }

    #[test]
    fn test_defender_can_win_after_turn_passes() {
        let mut game = active_match();
        game.attack(A, 9, 9).unwrap();
        game.attack(B, 0, 0).unwrap();
        game.attack(B, 1, 0).unwrap();
        let report = game.attack(B, 5, 5).unwrap();
        assert_eq!(report.winner, Some(B));
        assert!(game.is_complete());
    }

    #[test]
    fn test_random_attack_until_done() {
        let mut game = active_match();
        let mut rng = StdRng::seed_from_u64(42);

        let mut shots = 0;
        while !game.is_complete() {
            let shooter = game.current_turn();
            let report = game.random_attack(shooter, &mut rng).unwrap();
            assert_eq!(report.attacker, shooter);
            if report.outcome == AttackOutcome::Miss {
                assert_eq!(game.current_turn(), report.defender);
            } else {
                assert_eq!(game.current_turn(), shooter);
            }
            shots += 1;
            assert!(shots <= 200);
        }
        let winner = game.winner().unwrap();
        let loser = game.opponent_of(winner).unwrap();
        assert!(game.participant(loser).unwrap().board().is_defeated());
        assert!(!game.participant(winner).unwrap().board().is_defeated());
    }

    #[test]
    fn test_random_attack_out_of_turn() {
        let mut game = active_match();
        let mut rng = StdRng::seed_from_u64(1);
        assert_eq!(game.random_attack(B, &mut rng), Err(GameError::NotYourTurn));
    }

    #[test]
    fn test_forfeit() {
        let mut game = new_match();
        assert_eq!(game.forfeit(A), None);

        let mut game = active_match();
        assert_eq!(game.forfeit(A), Some(B));
        assert_eq!(game.winner(), Some(B));
        assert_eq!(game.forfeit(B), None);
    }
}
