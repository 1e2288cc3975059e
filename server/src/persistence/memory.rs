use super::{
    GameSessionRecord, PersistenceError, PlayerId, PlayerRecord, Repository, SeatRecord, SessionId,
};
use crate::utils::get_timestamp;
use async_trait::async_trait;
use log::debug;
use std::collections::HashMap;
use tokio::sync::Mutex;

#[derive(Debug, Default)]
struct Tables {
    players: Vec<PlayerRecord>,
    sessions: Vec<GameSessionRecord>,
    seats: Vec<SeatRecord>,
    player_keys: HashMap<String, usize>,
    invite_codes: HashMap<String, usize>,
}

impl Tables {
    fn player(&self, id: PlayerId) -> Option<&PlayerRecord> {
        // Ids are 1-based row positions.
        self.players.get((id as usize).checked_sub(1)?)
    }
}

/// Volatile repository; contents are lost when the process exits.
///
/// Every write checks its constraints before touching a table, so a refused
/// write changes nothing.
#[derive(Debug, Default)]
pub struct MemoryRepository {
    tables: Mutex<Tables>,
}

impl MemoryRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Repository for MemoryRepository {
    async fn find_player_by_key(&self, key: &str) -> Result<Option<PlayerRecord>, PersistenceError> {
        let tables = self.tables.lock().await;
        Ok(tables.player_keys.get(key).map(|&row| tables.players[row].clone()))
    }

    async fn find_player_by_id(&self, id: PlayerId) -> Result<Option<PlayerRecord>, PersistenceError> {
        let tables = self.tables.lock().await;
        Ok(tables.player(id).cloned())
    }

    async fn count_players_by_key(&self, key: &str) -> Result<usize, PersistenceError> {
        let tables = self.tables.lock().await;
        Ok(usize::from(tables.player_keys.contains_key(key)))
    }

    async fn create_player(
        &self,
        display_name: &str,
        secret_key: &str,
    ) -> Result<PlayerRecord, PersistenceError> {
        let mut tables = self.tables.lock().await;
        if tables.player_keys.contains_key(secret_key) {
            return Err(PersistenceError::Conflict(format!("player key {secret_key}")));
        }

        let row = tables.players.len();
        let player = PlayerRecord {
            id: row as PlayerId + 1,
            display_name: display_name.to_string(),
            secret_key: secret_key.to_string(),
            time_created: get_timestamp(),
        };
        tables.players.push(player.clone());
        tables.player_keys.insert(secret_key.to_string(), row);
        debug!("Created player {}", player.id);
        Ok(player)
    }

    async fn find_session_by_invite(
        &self,
        invite_code: &str,
    ) -> Result<Option<GameSessionRecord>, PersistenceError> {
        let tables = self.tables.lock().await;
        Ok(tables
            .invite_codes
            .get(invite_code)
            .map(|&row| tables.sessions[row].clone()))
    }

    async fn count_sessions_by_invite(&self, invite_code: &str) -> Result<usize, PersistenceError> {
        let tables = self.tables.lock().await;
        Ok(usize::from(tables.invite_codes.contains_key(invite_code)))
    }

    async fn create_session(
        &self,
        invite_code: &str,
        game_state: &str,
    ) -> Result<GameSessionRecord, PersistenceError> {
        let mut tables = self.tables.lock().await;
        if tables.invite_codes.contains_key(invite_code) {
            return Err(PersistenceError::Conflict(format!("invite code {invite_code}")));
        }

        let row = tables.sessions.len();
        let session = GameSessionRecord {
            id: row as SessionId + 1,
            invite_code: invite_code.to_string(),
            time_created: get_timestamp(),
            game_state: game_state.to_string(),
        };
        tables.sessions.push(session.clone());
        tables.invite_codes.insert(invite_code.to_string(), row);
        debug!("Created game session {}", session.id);
        Ok(session)
    }

    async fn update_session_state(
        &self,
        id: SessionId,
        game_state: &str,
    ) -> Result<(), PersistenceError> {
        let mut tables = self.tables.lock().await;
        let session = (id as usize)
            .checked_sub(1)
            .and_then(|row| tables.sessions.get_mut(row))
            .ok_or_else(|| PersistenceError::NotFound(format!("game session {id}")))?;
        session.game_state = game_state.to_string();
        Ok(())
    }

    async fn upsert_seat(
        &self,
        session_id: SessionId,
        player_id: PlayerId,
        seat_number: u32,
    ) -> Result<SeatRecord, PersistenceError> {
        let mut tables = self.tables.lock().await;
        if tables.player(player_id).is_none() {
            return Err(PersistenceError::NotFound(format!("player {player_id}")));
        }
        if session_id == 0 || session_id as usize > tables.sessions.len() {
            return Err(PersistenceError::NotFound(format!("game session {session_id}")));
        }

        let seat = SeatRecord {
            game_session_id: session_id,
            player_id,
            seat_number,
        };
        let existing = tables
            .seats
            .iter()
            .position(|s| s.game_session_id == session_id && s.player_id == player_id);
        match existing {
            Some(index) => tables.seats[index] = seat.clone(),
            None => tables.seats.push(seat.clone()),
        }
        Ok(seat)
    }

    async fn seats_for_session(
        &self,
        session_id: SessionId,
    ) -> Result<Vec<SeatRecord>, PersistenceError> {
        let tables = self.tables.lock().await;
        let mut seats: Vec<SeatRecord> = tables
            .seats
            .iter()
            .filter(|s| s.game_session_id == session_id)
            .cloned()
            .collect();
        seats.sort_by_key(|s| s.seat_number);
        Ok(seats)
    }

    async fn sessions_for_player(
        &self,
        player_id: PlayerId,
    ) -> Result<Vec<GameSessionRecord>, PersistenceError> {
        let tables = self.tables.lock().await;
        let mut ids: Vec<SessionId> = tables
            .seats
            .iter()
            .filter(|s| s.player_id == player_id)
            .map(|s| s.game_session_id)
            .collect();
        ids.sort_unstable();
        Ok(ids
            .into_iter()
            .filter_map(|id| tables.sessions.get((id as usize).checked_sub(1)?).cloned())
            .collect())
    }
}
