//! Game session state shared by the server and its clients.
//!
//! [`GameState`] is what travels over the wire (after per-viewer projection).
//! [`NormalizedGameState`] is the storage form: it keeps roster keys and drops
//! everything that is derived at load time (usernames, online flags, seat).

use crate::math::Vector2;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum GameStatus {
    #[default]
    SelectingAtoms,
    PlayerATurn,
    PlayerBTurn,
    PlayerAWin,
    PlayerBWin,
}

impl GameStatus {
    pub fn is_won(self) -> bool {
        matches!(self, GameStatus::PlayerAWin | GameStatus::PlayerBWin)
    }

    /// Seat whose turn it is, if the game is in a turn state.
    pub fn turn_seat(self) -> Option<u32> {
        match self {
            GameStatus::PlayerATurn => Some(0),
            GameStatus::PlayerBTurn => Some(1),
            _ => None,
        }
    }

    /// Turn state for the other player. Non-turn states are returned unchanged.
    pub fn next_turn(self) -> GameStatus {
        match self {
            GameStatus::PlayerATurn => GameStatus::PlayerBTurn,
            GameStatus::PlayerBTurn => GameStatus::PlayerATurn,
            other => other,
        }
    }

    pub fn win_for(seat: u32) -> GameStatus {
        if seat == 0 {
            GameStatus::PlayerAWin
        } else {
            GameStatus::PlayerBWin
        }
    }
}

/// One ray fired at a board. `exit` is `None` when the ray was absorbed.
///
/// On the wire an absorbed ray carries the sentinel exit `(-1, -1)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BoardMove {
    pub entry: Vector2,
    #[serde(with = "exit_sentinel")]
    pub exit: Option<Vector2>,
}

mod exit_sentinel {
    use crate::math::Vector2;
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    const ABSORBED: Vector2 = Vector2::new(-1, -1);

    pub fn serialize<S: Serializer>(exit: &Option<Vector2>, serializer: S) -> Result<S::Ok, S::Error> {
        exit.unwrap_or(ABSORBED).serialize(serializer)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<Vector2>, D::Error> {
        let exit = Vector2::deserialize(deserializer)?;
        Ok((exit != ABSORBED).then_some(exit))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct GameBoard {
    /// Whether the receiving viewer may see this board's atoms.
    pub visible: bool,
    pub atoms_submitted: bool,
    /// Atom positions in interior coordinates; `None` when hidden or not yet placed.
    pub atom_locations: Option<Vec<Vector2>>,
    /// Rays fired at this board, oldest first.
    pub moves: Vec<BoardMove>,
}

impl GameBoard {
    fn hide(&mut self) {
        self.visible = false;
        self.atom_locations = None;
    }

    /// Returns true if a recorded ray already entered or left through `cell`.
    pub fn covers(&self, cell: Vector2) -> bool {
        self.moves
            .iter()
            .any(|m| m.entry == cell || m.exit == Some(cell))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct RosterEntry {
    /// Player secret key. Server side only, never serialized to the wire.
    #[serde(skip)]
    pub key: Option<String>,
    pub username: String,
    pub online: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct GameMetadata {
    pub invite_code: String,
    /// Seat of the viewer this copy was projected for.
    pub seat_number: Option<u32>,
    /// Players and spectators in seat order.
    pub roster: Vec<RosterEntry>,
    pub status: GameStatus,
}

impl GameMetadata {
    pub fn new(invite_code: impl Into<String>) -> Self {
        Self {
            invite_code: invite_code.into(),
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct GameState {
    pub metadata: GameMetadata,
    /// Board owned by seat 0.
    pub board_a: GameBoard,
    /// Board owned by seat 1.
    pub board_b: GameBoard,
}

impl GameState {
    pub fn new(invite_code: impl Into<String>) -> Self {
        Self {
            metadata: GameMetadata::new(invite_code),
            board_a: GameBoard::default(),
            board_b: GameBoard::default(),
        }
    }

    /// Board owned by a player seat.
    pub fn board_mut(&mut self, seat: u32) -> Option<&mut GameBoard> {
        match seat {
            0 => Some(&mut self.board_a),
            1 => Some(&mut self.board_b),
            _ => None,
        }
    }

    /// Board the given player seat is trying to solve.
    pub fn opponent_board_mut(&mut self, seat: u32) -> Option<&mut GameBoard> {
        match seat {
            0 => Some(&mut self.board_b),
            1 => Some(&mut self.board_a),
            _ => None,
        }
    }

    /// Copy of the state as seen from `seat`.
    ///
    /// Until the game is won a player only sees their own atoms and spectators
    /// see none. Once it is won every board is revealed to everyone.
    pub fn projected_for(&self, seat: u32) -> GameState {
        let mut view = self.clone();
        view.metadata.seat_number = Some(seat);
        for entry in &mut view.metadata.roster {
            entry.key = None;
        }

        if self.metadata.status.is_won() {
            view.board_a.visible = true;
            view.board_b.visible = true;
            return view;
        }

        match seat {
            0 => {
                view.board_a.visible = true;
                view.board_b.hide();
            }
            1 => {
                view.board_a.hide();
                view.board_b.visible = true;
            }
            _ => {
                view.board_a.hide();
                view.board_b.hide();
            }
        }
        view
    }

    pub fn to_normalized(&self) -> NormalizedGameState {
        NormalizedGameState {
            metadata: NormalizedMetadata {
                invite_code: self.metadata.invite_code.clone(),
                roster: self
                    .metadata
                    .roster
                    .iter()
                    .filter_map(|entry| entry.key.clone())
                    .collect(),
                status: self.metadata.status,
            },
            board_a: NormalizedBoard::from(&self.board_a),
            board_b: NormalizedBoard::from(&self.board_b),
        }
    }

    pub fn from_normalized(normalized: NormalizedGameState) -> Self {
        let roster = normalized
            .metadata
            .roster
            .into_iter()
            .map(|key| RosterEntry {
                key: Some(key),
                ..RosterEntry::default()
            })
            .collect();

        Self {
            metadata: GameMetadata {
                invite_code: normalized.metadata.invite_code,
                seat_number: None,
                roster,
                status: normalized.metadata.status,
            },
            board_a: normalized.board_a.into(),
            board_b: normalized.board_b.into(),
        }
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(&self.to_normalized())
    }

    pub fn from_json(json: &str) -> serde_json::Result<Self> {
        serde_json::from_str::<NormalizedGameState>(json).map(GameState::from_normalized)
    }
}

/// Storage form of [`GameState`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NormalizedGameState {
    pub metadata: NormalizedMetadata,
    pub board_a: NormalizedBoard,
    pub board_b: NormalizedBoard,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NormalizedMetadata {
    pub invite_code: String,
    /// Player keys in seat order.
    pub roster: Vec<String>,
    pub status: GameStatus,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NormalizedBoard {
    pub atom_locations: Option<Vec<Vector2>>,
    pub atoms_submitted: bool,
    pub moves: Vec<NormalizedMove>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct NormalizedMove {
    #[serde(rename = "in")]
    pub entry: Vector2,
    #[serde(rename = "out")]
    pub exit: Option<Vector2>,
}

impl From<&GameBoard> for NormalizedBoard {
    fn from(board: &GameBoard) -> Self {
        Self {
            atom_locations: board.atom_locations.clone(),
            atoms_submitted: board.atoms_submitted,
            moves: board
                .moves
                .iter()
                .map(|m| NormalizedMove {
                    entry: m.entry,
                    exit: m.exit,
                })
                .collect(),
        }
    }
}

impl From<NormalizedBoard> for GameBoard {
    fn from(board: NormalizedBoard) -> Self {
        Self {
            visible: false,
            atoms_submitted: board.atoms_submitted,
            atom_locations: board.atom_locations,
            moves: board
                .moves
                .into_iter()
                .map(|m| BoardMove {
                    entry: m.entry,
                    exit: m.exit,
                })
                .collect(),
        }
    }
}
