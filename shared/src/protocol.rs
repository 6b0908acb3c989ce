//! JSON wire protocol shared by the server and test clients.
//!
//! Every frame is an envelope `{"type": ..., "data": ..., "id": 0}`. Clients
//! may send `data` either inline or as a string holding JSON; the server always
//! answers with `data` as a JSON string.

use crate::fleet::{Ship, ShipSubmission};
use crate::geometry::Coordinate;
use crate::ids::{ConnectionId, LobbyId, MatchId};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Envelope {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub data: Value,
    #[serde(default)]
    pub id: u32,
}

impl Envelope {
    /// Wraps a payload the way the server sends it: `data` as a JSON string
    pub fn wrap<T: Serialize>(kind: &str, payload: &T) -> Result<Self, serde_json::Error> {
        Ok(Self {
            kind: kind.to_string(),
            data: Value::String(serde_json::to_string(payload)?),
            id: 0,
        })
    }

    /// Decodes `data` into a payload, unwrapping one level of string encoding
    pub fn payload<T: DeserializeOwned>(&self) -> Result<T, ProtocolError> {
        let value = match &self.data {
            Value::String(text) if text.is_empty() => Value::Null,
            Value::String(text) => serde_json::from_str(text)?,
            other => other.clone(),
        };
        if value.is_null() {
            return Err(ProtocolError::MissingData(self.kind.clone()));
        }
        Ok(serde_json::from_value(value)?)
    }
}

/// Structurally invalid frames; these are dropped, never answered
#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("malformed json: {0}")]
    Json(#[from] serde_json::Error),
    #[error("unknown message type `{0}`")]
    UnknownType(String),
    #[error("message `{0}` carries no data")]
    MissingData(String),
}

// ---------------------------------------------------------------------------
// Inbound
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegisterRequest {
    pub name: String,
    pub password: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JoinLobbyRequest {
    pub index_room: LobbyId,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlaceFleetRequest {
    pub game_id: MatchId,
    pub ships: Vec<ShipSubmission>,
    #[serde(default)]
    pub index_player: Option<ConnectionId>,
}

/// Target coordinates are signed so that off-grid shots decode and can be
/// rejected as a game rule violation rather than dropped as garbage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AttackRequest {
    pub game_id: MatchId,
    pub x: i32,
    pub y: i32,
    #[serde(default)]
    pub index_player: Option<ConnectionId>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RandomAttackRequest {
    pub game_id: MatchId,
    #[serde(default)]
    pub index_player: Option<ConnectionId>,
}

/// Everything a client may ask of the server
#[derive(Debug, Clone, PartialEq)]
pub enum ClientMessage {
    Register(RegisterRequest),
    CreateLobby,
    JoinLobby(JoinLobbyRequest),
    PlaceFleet(PlaceFleetRequest),
    Attack(AttackRequest),
    RandomAttack(RandomAttackRequest),
}

impl ClientMessage {
    pub fn decode(text: &str) -> Result<Self, ProtocolError> {
        let envelope: Envelope = serde_json::from_str(text)?;
        Self::from_envelope(&envelope)
    }

    pub fn from_envelope(envelope: &Envelope) -> Result<Self, ProtocolError> {
        match envelope.kind.as_str() {
            "reg" | "register" => Ok(ClientMessage::Register(envelope.payload()?)),
            "create_room" | "create_lobby" => Ok(ClientMessage::CreateLobby),
            "add_user_to_room" | "join_lobby" => Ok(ClientMessage::JoinLobby(envelope.payload()?)),
            "add_ships" | "place_fleet" => Ok(ClientMessage::PlaceFleet(envelope.payload()?)),
            "attack" => Ok(ClientMessage::Attack(envelope.payload()?)),
            "randomAttack" | "random_attack" => {
                Ok(ClientMessage::RandomAttack(envelope.payload()?))
            }
            other => Err(ProtocolError::UnknownType(other.to_string())),
        }
    }

    /// Canonical wire type tag
    pub fn kind(&self) -> &'static str {
        match self {
            ClientMessage::Register(_) => "reg",
            ClientMessage::CreateLobby => "create_room",
            ClientMessage::JoinLobby(_) => "add_user_to_room",
            ClientMessage::PlaceFleet(_) => "add_ships",
            ClientMessage::Attack(_) => "attack",
            ClientMessage::RandomAttack(_) => "randomAttack",
        }
    }

    pub fn encode(&self) -> Result<String, serde_json::Error> {
        let envelope = match self {
            ClientMessage::Register(req) => Envelope::wrap(self.kind(), req)?,
            ClientMessage::CreateLobby => Envelope {
                kind: self.kind().to_string(),
                data: Value::String(String::new()),
                id: 0,
            },
            ClientMessage::JoinLobby(req) => Envelope::wrap(self.kind(), req)?,
            ClientMessage::PlaceFleet(req) => Envelope::wrap(self.kind(), req)?,
            ClientMessage::Attack(req) => Envelope::wrap(self.kind(), req)?,
            ClientMessage::RandomAttack(req) => Envelope::wrap(self.kind(), req)?,
        };
        serde_json::to_string(&envelope)
    }
}

// ---------------------------------------------------------------------------
// Outbound
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegistrationReply {
    pub name: String,
    pub index: ConnectionId,
    pub error: bool,
    pub error_text: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LobbyMember {
    pub name: String,
    pub index: ConnectionId,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LobbyInfo {
    pub room_id: LobbyId,
    pub room_users: Vec<LobbyMember>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Winner {
    pub name: String,
    pub wins: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GameCreated {
    pub id_game: MatchId,
    pub id_player: ConnectionId,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GameStarted {
    pub ships: Vec<Ship>,
    pub current_player_index: ConnectionId,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AttackStatus {
    Miss,
    Shot,
    Killed,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AttackFeedback {
    pub position: Coordinate,
    pub current_player: ConnectionId,
    pub status: AttackStatus,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TurnInfo {
    pub current_player: ConnectionId,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FinishInfo {
    pub win_player: ConnectionId,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorInfo {
    pub error_text: String,
}

/// Everything the server may push to a client
#[derive(Debug, Clone, PartialEq)]
pub enum ServerMessage {
    Registered(RegistrationReply),
    LobbyList(Vec<LobbyInfo>),
    Leaderboard(Vec<Winner>),
    MatchStarted(GameCreated),
    FleetAccepted(GameStarted),
    AttackResult(AttackFeedback),
    TurnChanged(TurnInfo),
    MatchFinished(FinishInfo),
    Rejected(ErrorInfo),
}

impl ServerMessage {
    pub fn kind(&self) -> &'static str {
        match self {
            ServerMessage::Registered(_) => "reg",
            ServerMessage::LobbyList(_) => "update_room",
            ServerMessage::Leaderboard(_) => "update_winners",
            ServerMessage::MatchStarted(_) => "create_game",
            ServerMessage::FleetAccepted(_) => "start_game",
            ServerMessage::AttackResult(_) => "attack",
            ServerMessage::TurnChanged(_) => "turn",
            ServerMessage::MatchFinished(_) => "finish",
            ServerMessage::Rejected(_) => "error",
        }
    }

    pub fn to_envelope(&self) -> Result<Envelope, serde_json::Error> {
        let kind = self.kind();
        match self {
            ServerMessage::Registered(p) => Envelope::wrap(kind, p),
            ServerMessage::LobbyList(p) => Envelope::wrap(kind, p),
            ServerMessage::Leaderboard(p) => Envelope::wrap(kind, p),
            ServerMessage::MatchStarted(p) => Envelope::wrap(kind, p),
            ServerMessage::FleetAccepted(p) => Envelope::wrap(kind, p),
            ServerMessage::AttackResult(p) => Envelope::wrap(kind, p),
            ServerMessage::TurnChanged(p) => Envelope::wrap(kind, p),
            ServerMessage::MatchFinished(p) => Envelope::wrap(kind, p),
            ServerMessage::Rejected(p) => Envelope::wrap(kind, p),
        }
    }

    pub fn encode(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(&self.to_envelope()?)
    }

    pub fn decode(text: &str) -> Result<Self, ProtocolError> {
        let envelope: Envelope = serde_json::from_str(text)?;
        match envelope.kind.as_str() {
            "reg" => Ok(ServerMessage::Registered(envelope.payload()?)),
            "update_room" => Ok(ServerMessage::LobbyList(envelope.payload()?)),
            "update_winners" => Ok(ServerMessage::Leaderboard(envelope.payload()?)),
            "create_game" => Ok(ServerMessage::MatchStarted(envelope.payload()?)),
            "start_game" => Ok(ServerMessage::FleetAccepted(envelope.payload()?)),
            "attack" => Ok(ServerMessage::AttackResult(envelope.payload()?)),
            "turn" => Ok(ServerMessage::TurnChanged(envelope.payload()?)),
            "finish" => Ok(ServerMessage::MatchFinished(envelope.payload()?)),
            "error" => Ok(ServerMessage::Rejected(envelope.payload()?)),
            other => Err(ProtocolError::UnknownType(other.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fleet::{Orientation, ShipClass};

    #[test]
    fn test_decode_string_encoded_data() {
        let text = r#"{"type":"reg","data":"{\"name\":\"alice\",\"password\":\"secret\"}","id":0}"#;
        let message = ClientMessage::decode(text).unwrap();
        assert_eq!(
            message,
            ClientMessage::Register(RegisterRequest {
                name: "alice".to_string(),
                password: "secret".to_string(),
            })
        );
    }

    #[test]
    fn test_decode_inline_data() {
        let text = r#"{"type":"attack","data":{"gameId":4,"x":3,"y":-1,"indexPlayer":2},"id":0}"#;
        match ClientMessage::decode(text).unwrap() {
            ClientMessage::Attack(req) => {
                assert_eq!(req.game_id, MatchId(4));
                assert_eq!((req.x, req.y), (3, -1));
                assert_eq!(req.index_player, Some(ConnectionId(2)));
            }
            other => panic!("Unexpected message: {:?}", other),
        }
    }

    #[test]
    fn test_create_room_needs_no_data() {
        let text = r#"{"type":"create_room","data":"","id":0}"#;
        assert_eq!(ClientMessage::decode(text).unwrap(), ClientMessage::CreateLobby);

        let text = r#"{"type":"create_lobby"}"#;
        assert_eq!(ClientMessage::decode(text).unwrap(), ClientMessage::CreateLobby);
    }

    #[test]
    fn test_aliases() {
        let text = r#"{"type":"random_attack","data":{"gameId":1}}"#;
        assert!(matches!(
            ClientMessage::decode(text).unwrap(),
            ClientMessage::RandomAttack(RandomAttackRequest { index_player: None, .. })
        ));

        let text = r#"{"type":"join_lobby","data":{"indexRoom":7}}"#;
        assert_eq!(
            ClientMessage::decode(text).unwrap(),
            ClientMessage::JoinLobby(JoinLobbyRequest {
                index_room: LobbyId(7)
            })
        );
    }

    #[test]
    fn test_malformed_frames() {
        assert!(matches!(
            ClientMessage::decode("not json"),
            Err(ProtocolError::Json(_))
        ));
        assert!(matches!(
            ClientMessage::decode(r#"{"type":"dance","data":""}"#),
            Err(ProtocolError::UnknownType(t)) if t == "dance"
        ));
        assert!(matches!(
            ClientMessage::decode(r#"{"type":"reg","data":""}"#),
            Err(ProtocolError::MissingData(_))
        ));
        assert!(matches!(
            ClientMessage::decode(r#"{"type":"attack","data":{"gameId":1}}"#),
            Err(ProtocolError::Json(_))
        ));
    }

    #[test]
    fn test_place_fleet_payload() {
        let text = r#"{"type":"add_ships","data":"{\"gameId\":3,\"indexPlayer\":1,\"ships\":[{\"position\":{\"x\":0,\"y\":0},\"direction\":false,\"length\":4,\"type\":\"huge\"}]}","id":0}"#;
        match ClientMessage::decode(text).unwrap() {
            ClientMessage::PlaceFleet(req) => {
                assert_eq!(req.game_id, MatchId(3));
                assert_eq!(req.ships.len(), 1);
                assert_eq!(req.ships[0].orientation, Orientation::Horizontal);
                assert_eq!(req.ships[0].class, ShipClass::Huge);
                assert_eq!(req.ships[0].length, 4);
            }
            other => panic!("Unexpected message: {:?}", other),
        }
    }

    #[test]
    fn test_place_fleet_keeps_off_grid_ships() {
        let text = r#"{"type":"add_ships","data":{"gameId":1,"ships":[{"position":{"x":-3,"y":0},"direction":false,"length":300,"type":"small"}]}}"#;
        match ClientMessage::decode(text).unwrap() {
            ClientMessage::PlaceFleet(req) => {
                assert_eq!(req.ships[0].position.x, -3);
                assert_eq!(req.ships[0].length, 300);
            }
            other => panic!("Unexpected message: {:?}", other),
        }
    }

    #[test]
    fn test_server_data_is_string_encoded() {
        let message = ServerMessage::AttackResult(AttackFeedback {
            position: Coordinate { x: 1, y: 2 },
            current_player: ConnectionId(5),
            status: AttackStatus::Killed,
        });
        let envelope = message.to_envelope().unwrap();
        assert_eq!(envelope.kind, "attack");
        let data = envelope.data.as_str().unwrap();
        assert_eq!(
            data,
            r#"{"position":{"x":1,"y":2},"currentPlayer":5,"status":"killed"}"#
        );

        let decoded = ServerMessage::decode(&message.encode().unwrap()).unwrap();
        assert_eq!(decoded, message);
    }

    #[test]
    fn test_client_encode_is_decodable() {
        let message = ClientMessage::Attack(AttackRequest {
            game_id: MatchId(9),
            x: 4,
            y: 5,
            index_player: Some(ConnectionId(1)),
        });
        let text = message.encode().unwrap();
        assert_eq!(ClientMessage::decode(&text).unwrap(), message);
    }
}
