use crate::persistence::PersistenceError;
use shared::Vector2;
use thiserror::Error;

/// Reasons a game action is refused or fails.
///
/// Everything except `Persistence` and `CorruptState` is a refusal: a rule
/// violation by the acting player, or a game that is not resident. Refusals
/// are logged and the action is dropped.
#[derive(Debug, Error)]
pub enum GameError {
    #[error("player is not in the roster")]
    NotInRoster,
    #[error("player is not in a player seat (seat: {0})")]
    NotAPlayerSeat(u32),
    #[error("it is not the player's turn (seat: {seat}, status: {status:?})")]
    NotPlayersTurn {
        seat: u32,
        status: shared::GameStatus,
    },
    #[error("atoms are already submitted")]
    AtomsAlreadySubmitted,
    #[error("exactly {expected} atoms are required, got {actual}")]
    WrongAtomCount { expected: usize, actual: usize },
    #[error("duplicate atom: {0}")]
    DuplicateAtom(Vector2),
    #[error("atom outside the board: {0}")]
    AtomOutOfRange(Vector2),
    #[error("invalid move coordinates: {0}")]
    InvalidMove(Vector2),
    #[error("another move already covers {0}")]
    MoveOccupied(Vector2),
    #[error("the opponent's atoms are not set")]
    OpponentAtomsMissing,
    #[error("ray cast from {0} failed")]
    RayCastFailed(Vector2),
    #[error("no game session has invite code {0}")]
    UnknownGame(String),
    #[error("game is no longer resident")]
    Evicted,
    #[error("stored game state is corrupt: {0}")]
    CorruptState(String),
    #[error(transparent)]
    Persistence(#[from] PersistenceError),
}

impl GameError {
    /// True for server-side failures, as opposed to a refused action.
    pub fn is_internal(&self) -> bool {
        matches!(self, GameError::Persistence(_) | GameError::CorruptState(_))
    }
}

#[derive(Debug, Error)]
pub enum ServerError {
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
    #[error("websocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),
    #[error(transparent)]
    Persistence(#[from] PersistenceError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_message_formatting() {
        let err = GameError::DuplicateAtom(Vector2::new(1, 2));
        assert_eq!(err.to_string(), "duplicate atom: (1, 2)");

        let err = GameError::WrongAtomCount {
            expected: 4,
            actual: 3,
        };
        assert_eq!(err.to_string(), "exactly 4 atoms are required, got 3");
    }

    #[test]
    fn test_internal_classification() {
        assert!(!GameError::NotInRoster.is_internal());
        assert!(!GameError::Evicted.is_internal());
        assert!(!GameError::UnknownGame("g1".to_string()).is_internal());
        assert!(GameError::CorruptState("bad json".to_string()).is_internal());
        assert!(GameError::from(PersistenceError::NotFound("session 7".to_string())).is_internal());
    }
}
