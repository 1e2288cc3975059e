//! Wire protocol: one [`Packet`] per binary WebSocket frame, encoded with bincode.

use crate::math::Vector2;
use crate::state::{GameMetadata, GameState};
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CodecError {
    #[error("failed to encode packet: {0}")]
    Encode(#[source] bincode::Error),
    #[error("failed to decode packet: {0}")]
    Decode(#[source] bincode::Error),
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct LoginPayload {
    pub register: bool,
    pub username: String,
    pub key: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct LoginAckPayload {
    pub success: bool,
    pub error_message: Option<String>,
    pub username: Option<String>,
    pub key: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ListGamesPayload;

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ListGamesAckPayload {
    pub success: bool,
    pub error_message: Option<String>,
    pub metadatas: Vec<GameMetadata>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct JoinGamePayload {
    pub create_game: bool,
    pub invite_code: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct JoinGameAckPayload {
    pub success: bool,
    pub error_message: Option<String>,
    pub invite_code: Option<String>,
    pub game_state: Option<GameState>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct SetAtomsPayload {
    pub invite_code: String,
    pub atom_locations: Vec<Vector2>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct SubmitSolutionPayload {
    pub invite_code: String,
    pub atom_locations: Vec<Vector2>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct SubmitMovePayload {
    pub invite_code: String,
    #[serde(rename = "move")]
    pub entry: Vector2,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct UpdateGamePayload {
    pub game_state: GameState,
}

/// Message envelope. The variant is the payload type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Packet {
    // Client to server
    Login(LoginPayload),
    ListGames(ListGamesPayload),
    JoinGame(JoinGamePayload),
    SetAtoms(SetAtomsPayload),
    SubmitSolution(SubmitSolutionPayload),
    SubmitMove(SubmitMovePayload),

    // Server to client
    LoginAck(LoginAckPayload),
    ListGamesAck(ListGamesAckPayload),
    JoinGameAck(JoinGameAckPayload),
    UpdateGame(UpdateGamePayload),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PayloadType {
    Login,
    ListGames,
    JoinGame,
    SetAtoms,
    SubmitSolution,
    SubmitMove,
    LoginAck,
    ListGamesAck,
    JoinGameAck,
    UpdateGame,
}

impl fmt::Display for PayloadType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}Payload", self)
    }
}

impl Packet {
    pub fn payload_type(&self) -> PayloadType {
        match self {
            Packet::Login(_) => PayloadType::Login,
            Packet::ListGames(_) => PayloadType::ListGames,
            Packet::JoinGame(_) => PayloadType::JoinGame,
            Packet::SetAtoms(_) => PayloadType::SetAtoms,
            Packet::SubmitSolution(_) => PayloadType::SubmitSolution,
            Packet::SubmitMove(_) => PayloadType::SubmitMove,
            Packet::LoginAck(_) => PayloadType::LoginAck,
            Packet::ListGamesAck(_) => PayloadType::ListGamesAck,
            Packet::JoinGameAck(_) => PayloadType::JoinGameAck,
            Packet::UpdateGame(_) => PayloadType::UpdateGame,
        }
    }

    pub fn encode(&self) -> Result<Vec<u8>, CodecError> {
        bincode::serialize(self).map_err(CodecError::Encode)
    }

    pub fn decode(data: &[u8]) -> Result<Packet, CodecError> {
        bincode::deserialize(data).map_err(CodecError::Decode)
    }

    pub fn login_failure(reason: impl Into<String>) -> Packet {
        Packet::LoginAck(LoginAckPayload {
            success: false,
            error_message: Some(reason.into()),
            ..LoginAckPayload::default()
        })
    }

    pub fn list_games_failure(reason: impl Into<String>) -> Packet {
        Packet::ListGamesAck(ListGamesAckPayload {
            success: false,
            error_message: Some(reason.into()),
            metadatas: Vec::new(),
        })
    }

    pub fn join_game_failure(reason: impl Into<String>) -> Packet {
        Packet::JoinGameAck(JoinGameAckPayload {
            success: false,
            error_message: Some(reason.into()),
            ..JoinGameAckPayload::default()
        })
    }
}
