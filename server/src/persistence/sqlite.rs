use super::{
    GameSessionRecord, PersistenceError, PlayerId, PlayerRecord, Repository, SeatRecord, SessionId,
};
use crate::utils::get_timestamp;
use async_trait::async_trait;
use log::{debug, info};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions};
use std::path::Path;
use std::time::Duration;

/// Applied on every start; each statement is idempotent.
const SCHEMA: &[&str] = &[
    "CREATE TABLE IF NOT EXISTS players (
        id INTEGER PRIMARY KEY,
        display_name TEXT NOT NULL,
        secret_key TEXT NOT NULL UNIQUE,
        time_created INTEGER NOT NULL
    )",
    "CREATE TABLE IF NOT EXISTS game_sessions (
        id INTEGER PRIMARY KEY,
        invite_code TEXT NOT NULL UNIQUE,
        time_created INTEGER NOT NULL,
        game_state TEXT NOT NULL
    )",
    "CREATE TABLE IF NOT EXISTS game_session_seats (
        game_session_id INTEGER NOT NULL REFERENCES game_sessions (id),
        player_id INTEGER NOT NULL REFERENCES players (id),
        seat_number INTEGER NOT NULL,
        PRIMARY KEY (game_session_id, player_id)
    )",
    "CREATE INDEX IF NOT EXISTS game_session_seats_player ON game_session_seats (player_id)",
];

const MAX_CONNECTIONS: u32 = 4;
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

type PlayerRow = (i64, String, String, i64);
type SessionRow = (i64, String, i64, String);
type SeatRow = (i64, i64, i64);

fn player_from_row((id, display_name, secret_key, time_created): PlayerRow) -> PlayerRecord {
    PlayerRecord {
        id: id as PlayerId,
        display_name,
        secret_key,
        time_created: time_created as u64,
    }
}

fn session_from_row((id, invite_code, time_created, game_state): SessionRow) -> GameSessionRecord {
    GameSessionRecord {
        id: id as SessionId,
        invite_code,
        time_created: time_created as u64,
        game_state,
    }
}

fn seat_from_row((game_session_id, player_id, seat_number): SeatRow) -> SeatRecord {
    SeatRecord {
        game_session_id: game_session_id as SessionId,
        player_id: player_id as PlayerId,
        seat_number: seat_number as u32,
    }
}

/// Maps a unique-index violation to `Conflict`.
fn unique_violation(e: sqlx::Error, what: String) -> PersistenceError {
    match &e {
        sqlx::Error::Database(db) if db.is_unique_violation() => PersistenceError::Conflict(what),
        _ => PersistenceError::Database(e),
    }
}

/// Repository backed by a SQLite database file.
///
/// Every write is a single statement, so SQLite applies it entirely or not
/// at all.
#[derive(Debug, Clone)]
pub struct SqliteRepository {
    pool: SqlitePool,
}

impl SqliteRepository {
    /// Opens (or creates) the database at `path`, creating its directory if needed.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self, PersistenceError> {
        let path = path.as_ref();
        info!("Opening game database at {}", path.display());

        if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
            if !tokio::fs::try_exists(dir).await? {
                info!("Database directory {} doesn't exist; creating it", dir.display());
                tokio::fs::create_dir_all(dir).await?;
            }
        }

        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true)
            .foreign_keys(true)
            .journal_mode(SqliteJournalMode::Wal)
            .busy_timeout(BUSY_TIMEOUT);
        let pool = SqlitePoolOptions::new()
            .max_connections(MAX_CONNECTIONS)
            .connect_with(options)
            .await?;
        Self::with_pool(pool).await
    }

    /// Private in-memory database that lives as long as the repository.
    #[cfg(test)]
    pub async fn in_memory() -> Result<Self, PersistenceError> {
        use std::str::FromStr;

        let options = SqliteConnectOptions::from_str("sqlite::memory:")?.foreign_keys(true);
        // Every connection would get its own database, so keep exactly one.
        let pool = SqlitePoolOptions::new()
            .min_connections(1)
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await?;
        Self::with_pool(pool).await
    }

    async fn with_pool(pool: SqlitePool) -> Result<Self, PersistenceError> {
        for statement in SCHEMA {
            sqlx::query(statement).execute(&pool).await?;
        }

        let players: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM players")
            .fetch_one(&pool)
            .await?;
        let sessions: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM game_sessions")
            .fetch_one(&pool)
            .await?;
        info!("Database holds {} player(s), {} game session(s)", players, sessions);

        Ok(Self { pool })
    }
}

#[async_trait]
impl Repository for SqliteRepository {
    async fn find_player_by_key(&self, key: &str) -> Result<Option<PlayerRecord>, PersistenceError> {
        let row: Option<PlayerRow> = sqlx::query_as(
            "SELECT id, display_name, secret_key, time_created FROM players WHERE secret_key = ?",
        )
        .bind(key)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(player_from_row))
    }

    async fn find_player_by_id(&self, id: PlayerId) -> Result<Option<PlayerRecord>, PersistenceError> {
        let row: Option<PlayerRow> = sqlx::query_as(
            "SELECT id, display_name, secret_key, time_created FROM players WHERE id = ?",
        )
        .bind(id as i64)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(player_from_row))
    }

    async fn count_players_by_key(&self, key: &str) -> Result<usize, PersistenceError> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM players WHERE secret_key = ?")
            .bind(key)
            .fetch_one(&self.pool)
            .await?;
        Ok(count as usize)
    }

    async fn create_player(
        &self,
        display_name: &str,
        secret_key: &str,
    ) -> Result<PlayerRecord, PersistenceError> {
        let time_created = get_timestamp();
        let result = sqlx::query(
            "INSERT INTO players (display_name, secret_key, time_created) VALUES (?, ?, ?)",
        )
        .bind(display_name)
        .bind(secret_key)
        .bind(time_created as i64)
        .execute(&self.pool)
        .await
        .map_err(|e| unique_violation(e, format!("player key {secret_key}")))?;

        let player = PlayerRecord {
            id: result.last_insert_rowid() as PlayerId,
            display_name: display_name.to_string(),
            secret_key: secret_key.to_string(),
            time_created,
        };
        debug!("Created player {}", player.id);
        Ok(player)
    }

    async fn find_session_by_invite(
        &self,
        invite_code: &str,
    ) -> Result<Option<GameSessionRecord>, PersistenceError> {
        let row: Option<SessionRow> = sqlx::query_as(
            "SELECT id, invite_code, time_created, game_state FROM game_sessions WHERE invite_code = ?",
        )
        .bind(invite_code)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(session_from_row))
    }

    async fn count_sessions_by_invite(&self, invite_code: &str) -> Result<usize, PersistenceError> {
        let count: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM game_sessions WHERE invite_code = ?")
                .bind(invite_code)
                .fetch_one(&self.pool)
                .await?;
        Ok(count as usize)
    }

    async fn create_session(
        &self,
        invite_code: &str,
        game_state: &str,
    ) -> Result<GameSessionRecord, PersistenceError> {
        let time_created = get_timestamp();
        let result = sqlx::query(
            "INSERT INTO game_sessions (invite_code, time_created, game_state) VALUES (?, ?, ?)",
        )
        .bind(invite_code)
        .bind(time_created as i64)
        .bind(game_state)
        .execute(&self.pool)
        .await
        .map_err(|e| unique_violation(e, format!("invite code {invite_code}")))?;

        let session = GameSessionRecord {
            id: result.last_insert_rowid() as SessionId,
            invite_code: invite_code.to_string(),
            time_created,
            game_state: game_state.to_string(),
        };
        debug!("Created game session {}", session.id);
        Ok(session)
    }

    async fn update_session_state(
        &self,
        id: SessionId,
        game_state: &str,
    ) -> Result<(), PersistenceError> {
        let result = sqlx::query("UPDATE game_sessions SET game_state = ? WHERE id = ?")
            .bind(game_state)
            .bind(id as i64)
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(PersistenceError::NotFound(format!("game session {id}")));
        }
        Ok(())
    }

    async fn upsert_seat(
        &self,
        session_id: SessionId,
        player_id: PlayerId,
        seat_number: u32,
    ) -> Result<SeatRecord, PersistenceError> {
        sqlx::query(
            "INSERT INTO game_session_seats (game_session_id, player_id, seat_number)
             VALUES (?, ?, ?)
             ON CONFLICT (game_session_id, player_id) DO UPDATE SET seat_number = excluded.seat_number",
        )
        .bind(session_id as i64)
        .bind(player_id as i64)
        .bind(i64::from(seat_number))
        .execute(&self.pool)
        .await?;

        Ok(SeatRecord {
            game_session_id: session_id,
            player_id,
            seat_number,
        })
    }

    async fn seats_for_session(
        &self,
        session_id: SessionId,
    ) -> Result<Vec<SeatRecord>, PersistenceError> {
        let rows: Vec<SeatRow> = sqlx::query_as(
            "SELECT game_session_id, player_id, seat_number FROM game_session_seats
             WHERE game_session_id = ? ORDER BY seat_number",
        )
        .bind(session_id as i64)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(seat_from_row).collect())
    }

    async fn sessions_for_player(
        &self,
        player_id: PlayerId,
    ) -> Result<Vec<GameSessionRecord>, PersistenceError> {
        let rows: Vec<SessionRow> = sqlx::query_as(
            "SELECT s.id, s.invite_code, s.time_created, s.game_state
             FROM game_sessions s
             JOIN game_session_seats seat ON seat.game_session_id = s.id
             WHERE seat.player_id = ?
             ORDER BY s.id",
        )
        .bind(player_id as i64)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(session_from_row).collect())
    }
}
