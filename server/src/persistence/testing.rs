//! Repository that can be told to fail or stall its writes.

use super::{
    GameSessionRecord, MemoryRepository, PersistenceError, PlayerId, PlayerRecord, Repository,
    SeatRecord, SessionId,
};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;
use std::time::Duration;

#[derive(Debug, Default)]
pub struct FaultyRepository {
    inner: MemoryRepository,
    failing: AtomicBool,
    slow_saves: Mutex<HashMap<SessionId, Duration>>,
}

impl FaultyRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// While set, every write fails with an i/o error and changes nothing.
    pub fn fail_writes(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// Delays every state update of `session` by `delay`.
    pub fn slow_down_saves(&self, session: SessionId, delay: Duration) {
        if let Ok(mut slow) = self.slow_saves.lock() {
            slow.insert(session, delay);
        }
    }

    fn check_write(&self, what: &str) -> Result<(), PersistenceError> {
        if self.failing.load(Ordering::SeqCst) {
            Err(std::io::Error::other(format!("{what}: disk unavailable")).into())
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl Repository for FaultyRepository {
    async fn find_player_by_key(&self, key: &str) -> Result<Option<PlayerRecord>, PersistenceError> {
        self.inner.find_player_by_key(key).await
    }

    async fn find_player_by_id(&self, id: PlayerId) -> Result<Option<PlayerRecord>, PersistenceError> {
        self.inner.find_player_by_id(id).await
    }

    async fn count_players_by_key(&self, key: &str) -> Result<usize, PersistenceError> {
        self.inner.count_players_by_key(key).await
    }

    async fn create_player(
        &self,
        display_name: &str,
        secret_key: &str,
    ) -> Result<PlayerRecord, PersistenceError> {
        self.check_write("create player")?;
        self.inner.create_player(display_name, secret_key).await
    }

    async fn find_session_by_invite(
        &self,
        invite_code: &str,
    ) -> Result<Option<GameSessionRecord>, PersistenceError> {
        self.inner.find_session_by_invite(invite_code).await
    }

    async fn count_sessions_by_invite(&self, invite_code: &str) -> Result<usize, PersistenceError> {
        self.inner.count_sessions_by_invite(invite_code).await
    }

    async fn create_session(
        &self,
        invite_code: &str,
        game_state: &str,
    ) -> Result<GameSessionRecord, PersistenceError> {
        self.check_write("create session")?;
        self.inner.create_session(invite_code, game_state).await
    }

    async fn update_session_state(
        &self,
        id: SessionId,
        game_state: &str,
    ) -> Result<(), PersistenceError> {
        let delay = self
            .slow_saves
            .lock()
            .ok()
            .and_then(|slow| slow.get(&id).copied());
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        self.check_write("update session")?;
        self.inner.update_session_state(id, game_state).await
    }

    async fn upsert_seat(
        &self,
        session_id: SessionId,
        player_id: PlayerId,
        seat_number: u32,
    ) -> Result<SeatRecord, PersistenceError> {
        self.check_write("upsert seat")?;
        self.inner.upsert_seat(session_id, player_id, seat_number).await
    }

    async fn seats_for_session(
        &self,
        session_id: SessionId,
    ) -> Result<Vec<SeatRecord>, PersistenceError> {
        self.inner.seats_for_session(session_id).await
    }

    async fn sessions_for_player(
        &self,
        player_id: PlayerId,
    ) -> Result<Vec<GameSessionRecord>, PersistenceError> {
        self.inner.sessions_for_player(player_id).await
    }
}
