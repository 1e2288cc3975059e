//! Durable storage for players, game sessions and seat assignments.
//!
//! The server only talks to storage through [`Repository`]. Records are plain
//! rows with explicit foreign keys; nothing navigates an object graph.
//!
//! [`SqliteRepository`] is the production store. [`MemoryRepository`] keeps
//! the same contract in process memory for `--memory` runs and tests.

mod memory;
mod sqlite;
#[cfg(test)]
pub mod testing;

pub use memory::MemoryRepository;
pub use sqlite::SqliteRepository;

use async_trait::async_trait;
use thiserror::Error;

pub type PlayerId = u64;
pub type SessionId = u64;

#[derive(Debug, Error)]
pub enum PersistenceError {
    #[error("storage i/o error: {0}")]
    Io(#[from] std::io::Error),
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("storage serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("unique constraint violated: {0}")]
    Conflict(String),
    #[error("record not found: {0}")]
    NotFound(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlayerRecord {
    pub id: PlayerId,
    pub display_name: String,
    /// Sole credential of the player; unique.
    pub secret_key: String,
    /// Unix milliseconds.
    pub time_created: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GameSessionRecord {
    pub id: SessionId,
    pub invite_code: String,
    pub time_created: u64,
    /// Normalized game state as JSON.
    pub game_state: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SeatRecord {
    pub game_session_id: SessionId,
    pub player_id: PlayerId,
    pub seat_number: u32,
}

/// Storage contract. A failed write leaves no partial change behind.
#[async_trait]
pub trait Repository: Send + Sync {
    async fn find_player_by_key(&self, key: &str) -> Result<Option<PlayerRecord>, PersistenceError>;

    async fn find_player_by_id(&self, id: PlayerId) -> Result<Option<PlayerRecord>, PersistenceError>;

    async fn count_players_by_key(&self, key: &str) -> Result<usize, PersistenceError>;

    /// Fails with `Conflict` if the key is taken.
    async fn create_player(
        &self,
        display_name: &str,
        secret_key: &str,
    ) -> Result<PlayerRecord, PersistenceError>;

    async fn find_session_by_invite(
        &self,
        invite_code: &str,
    ) -> Result<Option<GameSessionRecord>, PersistenceError>;

    async fn count_sessions_by_invite(&self, invite_code: &str) -> Result<usize, PersistenceError>;

    /// Fails with `Conflict` if the invite code is taken.
    async fn create_session(
        &self,
        invite_code: &str,
        game_state: &str,
    ) -> Result<GameSessionRecord, PersistenceError>;

    async fn update_session_state(
        &self,
        id: SessionId,
        game_state: &str,
    ) -> Result<(), PersistenceError>;

    /// Inserts or replaces the seat of `player_id` in a session.
    async fn upsert_seat(
        &self,
        session_id: SessionId,
        player_id: PlayerId,
        seat_number: u32,
    ) -> Result<SeatRecord, PersistenceError>;

    /// Seats of a session ordered by seat number.
    async fn seats_for_session(&self, session_id: SessionId)
        -> Result<Vec<SeatRecord>, PersistenceError>;

    /// Sessions the player holds a seat in, oldest first.
    async fn sessions_for_player(
        &self,
        player_id: PlayerId,
    ) -> Result<Vec<GameSessionRecord>, PersistenceError>;
}

/// Behaviour every [`Repository`] must show, run against each implementation.
#[cfg(test)]
mod tests {
    use super::*;
    use tokio_test::{assert_err, assert_ok};

    async fn stores() -> Vec<(&'static str, Box<dyn Repository>)> {
        vec![
            ("memory", Box::new(MemoryRepository::new())),
            ("sqlite", Box::new(SqliteRepository::in_memory().await.unwrap())),
        ]
    }

    #[tokio::test]
    async fn test_create_and_find_player() {
        for (name, repo) in stores().await {
            let created = assert_ok!(repo.create_player("Alice", "pKey1").await);

            let found = repo.find_player_by_key("pKey1").await.unwrap();
            assert_eq!(found.as_ref(), Some(&created), "{name}");
            assert_eq!(repo.find_player_by_id(created.id).await.unwrap(), Some(created), "{name}");
            assert_eq!(repo.count_players_by_key("pKey1").await.unwrap(), 1, "{name}");
            assert_eq!(repo.count_players_by_key("pOther").await.unwrap(), 0, "{name}");
            assert!(repo.find_player_by_key("pOther").await.unwrap().is_none(), "{name}");
        }
    }

    #[tokio::test]
    async fn test_player_key_conflict_leaves_one_row() {
        for (name, repo) in stores().await {
            let alice = assert_ok!(repo.create_player("Alice", "pKey1").await);
            let err = assert_err!(repo.create_player("Mallory", "pKey1").await);
            assert!(matches!(err, PersistenceError::Conflict(_)), "{name}: {err}");

            assert_eq!(repo.count_players_by_key("pKey1").await.unwrap(), 1, "{name}");
            let found = repo.find_player_by_key("pKey1").await.unwrap().unwrap();
            assert_eq!(found.display_name, "Alice", "{name}");

            // The refused insert did not use up an id.
            let bob = repo.create_player("Bob", "pKey2").await.unwrap();
            assert_eq!(bob.id, alice.id + 1, "{name}");
        }
    }

    #[tokio::test]
    async fn test_session_lifecycle() {
        for (name, repo) in stores().await {
            let session = assert_ok!(repo.create_session("g123", "{}").await);
            let err = assert_err!(repo.create_session("g123", "{\"v\":9}").await);
            assert!(matches!(err, PersistenceError::Conflict(_)), "{name}: {err}");
            assert_eq!(repo.count_sessions_by_invite("g123").await.unwrap(), 1, "{name}");

            assert_ok!(repo.update_session_state(session.id, "{\"v\":2}").await);
            let found = repo.find_session_by_invite("g123").await.unwrap().unwrap();
            assert_eq!(found.game_state, "{\"v\":2}", "{name}");
            assert_eq!(found.time_created, session.time_created, "{name}");

            let err = assert_err!(repo.update_session_state(999, "{}").await);
            assert!(matches!(err, PersistenceError::NotFound(_)), "{name}: {err}");
        }
    }

    #[tokio::test]
    async fn test_seats_are_ordered_and_upserted() {
        for (name, repo) in stores().await {
            let session = repo.create_session("g1", "{}").await.unwrap();
            let alice = repo.create_player("Alice", "pA").await.unwrap();
            let bob = repo.create_player("Bob", "pB").await.unwrap();

            repo.upsert_seat(session.id, bob.id, 1).await.unwrap();
            repo.upsert_seat(session.id, alice.id, 0).await.unwrap();
            repo.upsert_seat(session.id, alice.id, 0).await.unwrap();

            let seats = repo.seats_for_session(session.id).await.unwrap();
            assert_eq!(seats.len(), 2, "{name}");
            assert_eq!(seats[0].player_id, alice.id, "{name}");
            assert_eq!(seats[1].player_id, bob.id, "{name}");

            // Re-seating replaces the number instead of adding a row.
            repo.upsert_seat(session.id, bob.id, 4).await.unwrap();
            let seats = repo.seats_for_session(session.id).await.unwrap();
            assert_eq!(seats.len(), 2, "{name}");
            assert_eq!(seats[1].seat_number, 4, "{name}");
        }
    }

    #[tokio::test]
    async fn test_sessions_for_player() {
        for (name, repo) in stores().await {
            let alice = repo.create_player("Alice", "pA").await.unwrap();
            let first = repo.create_session("g1", "{}").await.unwrap();
            let _other = repo.create_session("g2", "{}").await.unwrap();
            let third = repo.create_session("g3", "{}").await.unwrap();
            repo.upsert_seat(third.id, alice.id, 1).await.unwrap();
            repo.upsert_seat(first.id, alice.id, 0).await.unwrap();

            let codes: Vec<String> = repo
                .sessions_for_player(alice.id)
                .await
                .unwrap()
                .into_iter()
                .map(|s| s.invite_code)
                .collect();
            assert_eq!(codes, vec!["g1", "g3"], "{name}");
        }
    }
}
