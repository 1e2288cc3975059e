//! Per-socket session: identity, lobby commands and game action forwarding.

use crate::client_manager::ConnectionId;
use crate::dispatcher::MessageHandler;
use crate::game::{load_roster, GameAction};
use crate::network::ServerContext;
use crate::persistence::{PersistenceError, PlayerRecord};
use crate::utils::{generate_key, random_name, sanitize_username, INVITE_CODE_PREFIX, PLAYER_KEY_PREFIX};
use async_trait::async_trait;
use log::{debug, error, info, warn};
use shared::protocol::{
    JoinGameAckPayload, JoinGamePayload, ListGamesAckPayload, ListGamesPayload, LoginAckPayload,
    LoginPayload, SetAtomsPayload, SubmitMovePayload, SubmitSolutionPayload,
};
use shared::{GameMetadata, GameState, Packet};
use std::sync::Arc;
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, Notify};

const INTERNAL_ERROR: &str = "Internal server error";

/// Sending half of a connection's bounded outbound queue.
///
/// Cloned into every game the connection subscribes to. When the queue is
/// full the connection is kicked instead of blocking the sender.
#[derive(Debug, Clone)]
pub struct Outbox {
    id: ConnectionId,
    tx: mpsc::Sender<Vec<u8>>,
    kick: Arc<Notify>,
}

impl Outbox {
    pub fn new(id: ConnectionId, capacity: usize) -> (Self, mpsc::Receiver<Vec<u8>>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        let outbox = Self {
            id,
            tx,
            kick: Arc::new(Notify::new()),
        };
        (outbox, rx)
    }

    pub fn id(&self) -> ConnectionId {
        self.id
    }

    /// Queues a packet. Returns false if it was dropped.
    pub fn send(&self, packet: &Packet) -> bool {
        let frame = match packet.encode() {
            Ok(frame) => frame,
            Err(e) => {
                error!("[id={}] {}", self.id, e);
                return false;
            }
        };

        match self.tx.try_send(frame) {
            Ok(()) => true,
            Err(TrySendError::Full(_)) => {
                warn!("[id={}] Outbound queue full; disconnecting", self.id);
                self.kick.notify_one();
                false
            }
            Err(TrySendError::Closed(_)) => {
                debug!("[id={}] Dropping {}: socket closed", self.id, packet.payload_type());
                false
            }
        }
    }

    /// Resolves once the connection has been told to close.
    pub async fn kicked(&self) {
        self.kick.notified().await
    }
}

/// A connection subscribed to a game, with the player it acts as.
#[derive(Debug, Clone)]
pub struct Subscriber {
    pub outbox: Outbox,
    pub player: PlayerRecord,
}

pub struct Connection {
    outbox: Outbox,
    ctx: Arc<ServerContext>,
    player: Option<PlayerRecord>,
    /// Invite codes of the games this connection is subscribed to.
    subscriptions: Vec<String>,
}

impl Connection {
    pub fn new(outbox: Outbox, ctx: Arc<ServerContext>) -> Self {
        Self {
            outbox,
            ctx,
            player: None,
            subscriptions: Vec::new(),
        }
    }

    pub fn id(&self) -> ConnectionId {
        self.outbox.id()
    }

    pub fn is_logged_in(&self) -> bool {
        self.player.is_some()
    }

    fn send(&self, packet: Packet) {
        self.outbox.send(&packet);
    }

    pub async fn login(&mut self, payload: LoginPayload) {
        if self.is_logged_in() {
            self.logout().await;
        }

        if payload.register {
            let username = sanitize_username(&payload.username).unwrap_or_else(random_name);
            info!("[id={}] Received registration for \"{}\"", self.id(), username);

            match self.register(&username).await {
                Ok(player) => self.login_successful(player).await,
                Err(e) => {
                    error!("[id={}] Registration failed: {}", self.id(), e);
                    self.send(Packet::login_failure(INTERNAL_ERROR));
                }
            }
            return;
        }

        let player = match &payload.key {
            Some(key) => self.ctx.repo.find_player_by_key(key).await,
            None => Ok(None),
        };
        match player {
            Ok(Some(player)) => self.login_successful(player).await,
            Ok(None) => {
                info!(
                    "[id={}] Login for nonexistent key {:?} (username: \"{}\")",
                    self.id(),
                    payload.key,
                    payload.username
                );
                self.send(Packet::login_failure("Unknown player key"));
            }
            Err(e) => {
                error!("[id={}] Player lookup failed: {}", self.id(), e);
                self.send(Packet::login_failure(INTERNAL_ERROR));
            }
        }
    }

    /// Creates a player under a fresh key, retrying on collisions.
    async fn register(&self, username: &str) -> Result<PlayerRecord, PersistenceError> {
        loop {
            let key = generate_key(PLAYER_KEY_PREFIX);
            if self.ctx.repo.count_players_by_key(&key).await? > 0 {
                continue;
            }
            match self.ctx.repo.create_player(username, &key).await {
                Ok(player) => {
                    info!("[id={}] Registered as \"{}\"", self.id(), player.secret_key);
                    return Ok(player);
                }
                Err(PersistenceError::Conflict(_)) => continue,
                Err(e) => return Err(e),
            }
        }
    }

    async fn login_successful(&mut self, player: PlayerRecord) {
        self.ctx
            .clients
            .write()
            .await
            .set_online(&player.secret_key, self.id());

        info!(
            "[id={}] Login successful for \"{}\" (username: \"{}\")",
            self.id(),
            player.secret_key,
            player.display_name
        );
        self.send(Packet::LoginAck(LoginAckPayload {
            success: true,
            error_message: None,
            username: Some(player.display_name.clone()),
            key: Some(player.secret_key.clone()),
        }));
        self.player = Some(player);
    }

    /// Leaves every subscribed game and drops out of the online index.
    pub async fn logout(&mut self) {
        let Some(player) = self.player.take() else {
            return;
        };

        for invite_code in self.subscriptions.drain(..) {
            self.ctx.games.unsubscribe(&invite_code, self.outbox.id()).await;
        }
        self.ctx
            .clients
            .write()
            .await
            .set_offline(&player.secret_key, self.outbox.id());
        info!("[id={}] Logged out \"{}\"", self.outbox.id(), player.display_name);
    }

    pub async fn list_games(&mut self) {
        let Some(player) = self.player.clone() else {
            warn!("[id={}] Requested to list games, but the connection is not logged in", self.id());
            self.send(Packet::list_games_failure("Not logged in"));
            return;
        };

        match self.collect_metadata(&player).await {
            Ok(metadatas) => {
                info!("[id={}] Listing {} game(s)", self.id(), metadatas.len());
                self.send(Packet::ListGamesAck(ListGamesAckPayload {
                    success: true,
                    error_message: None,
                    metadatas,
                }));
            }
            Err(e) => {
                error!("[id={}] Failed to list games: {}", self.id(), e);
                self.send(Packet::list_games_failure(INTERNAL_ERROR));
            }
        }
    }

    async fn collect_metadata(&self, player: &PlayerRecord) -> Result<Vec<GameMetadata>, PersistenceError> {
        let mut metadatas = Vec::new();
        for session in self.ctx.repo.sessions_for_player(player.id).await? {
            let mut metadata = match GameState::from_json(&session.game_state) {
                Ok(state) => state.metadata,
                Err(e) => {
                    warn!("Skipping game \"{}\" with corrupt state: {}", session.invite_code, e);
                    continue;
                }
            };

            let roster = load_roster(self.ctx.repo.as_ref(), &self.ctx.clients, session.id).await?;
            metadata.seat_number = roster
                .iter()
                .position(|entry| entry.key.as_deref() == Some(player.secret_key.as_str()))
                .map(|seat| seat as u32);
            metadata.roster = roster
                .into_iter()
                .map(|mut entry| {
                    entry.key = None;
                    entry
                })
                .collect();
            metadatas.push(metadata);
        }
        Ok(metadatas)
    }

    pub async fn join_game(&mut self, payload: JoinGamePayload) {
        let Some(player) = self.player.clone() else {
            warn!("[id={}] Requested to join game, but the connection is not logged in", self.id());
            self.send(Packet::join_game_failure("Not logged in"));
            return;
        };

        let invite_code = if payload.create_game {
            match self.create_game().await {
                Ok(code) => code,
                Err(e) => {
                    error!("[id={}] Failed to create game: {}", self.id(), e);
                    self.send(Packet::join_game_failure(INTERNAL_ERROR));
                    return;
                }
            }
        } else {
            match payload.invite_code {
                Some(code) => code,
                None => {
                    warn!("[id={}] Requested to join game without an invite code", self.id());
                    return;
                }
            }
        };

        let subscriber = Subscriber {
            outbox: self.outbox.clone(),
            player,
        };
        match self.ctx.games.subscribe(&invite_code, subscriber).await {
            Ok(Some(game_state)) => {
                self.track_subscription(&invite_code);
                info!("[id={}] Joined game \"{}\"", self.id(), invite_code);
                self.send(Packet::JoinGameAck(JoinGameAckPayload {
                    success: true,
                    error_message: None,
                    invite_code: Some(invite_code),
                    game_state: Some(game_state),
                }));
            }
            Ok(None) => {
                warn!("[id={}] Requested to join nonexistent game \"{}\"", self.id(), invite_code);
                self.send(Packet::join_game_failure("Game session not found"));
            }
            Err(e) => {
                // The game may hold the subscription even though the save failed.
                self.track_subscription(&invite_code);
                error!("[id={}] Failed to join game \"{}\": {}", self.id(), invite_code, e);
                self.send(Packet::join_game_failure(INTERNAL_ERROR));
            }
        }
    }

    fn track_subscription(&mut self, invite_code: &str) {
        if !self.subscriptions.iter().any(|code| code == invite_code) {
            self.subscriptions.push(invite_code.to_string());
        }
    }

    /// Persists a fresh game under a new invite code and returns the code.
    async fn create_game(&self) -> Result<String, PersistenceError> {
        loop {
            let invite_code = generate_key(INVITE_CODE_PREFIX);
            if self.ctx.repo.count_sessions_by_invite(&invite_code).await? > 0 {
                continue;
            }
            let state = GameState::new(invite_code.as_str()).to_json()?;
            match self.ctx.repo.create_session(&invite_code, &state).await {
                Ok(_) => {
                    info!("[id={}] Created game \"{}\"", self.id(), invite_code);
                    return Ok(invite_code);
                }
                Err(PersistenceError::Conflict(_)) => continue,
                Err(e) => return Err(e),
            }
        }
    }

    /// Forwards an action to a resident game. Refusals are logged, never acked.
    async fn game_action(&self, invite_code: &str, action: GameAction) {
        let name = action.name();
        let Some(player) = &self.player else {
            warn!(
                "[id={}] Received \"{}\" for game \"{}\", but the connection is not logged in",
                self.id(),
                name,
                invite_code
            );
            return;
        };

        match self.ctx.games.apply(invite_code, player, action).await {
            None => warn!(
                "[id={}] Received \"{}\" for nonexistent invite code: {}",
                self.id(),
                name,
                invite_code
            ),
            Some(Ok(())) => debug!("[id={}] {} in \"{}\" accepted", self.id(), name, invite_code),
            Some(Err(e)) if e.is_internal() => error!(
                "[id={}] Failed to {} in game \"{}\": {}",
                self.id(),
                name,
                invite_code,
                e
            ),
            Some(Err(e)) => warn!(
                "[id={}] Player \"{}\" attempted to {} in game \"{}\": {}",
                self.id(),
                player.secret_key,
                name,
                invite_code,
                e
            ),
        }
    }
}

#[async_trait]
impl MessageHandler for Connection {
    async fn on_login(&mut self, payload: LoginPayload) {
        self.login(payload).await;
    }

    async fn on_list_games(&mut self, _payload: ListGamesPayload) {
        self.list_games().await;
    }

    async fn on_join_game(&mut self, payload: JoinGamePayload) {
        self.join_game(payload).await;
    }

    async fn on_set_atoms(&mut self, payload: SetAtomsPayload) {
        self.game_action(&payload.invite_code, GameAction::SetAtoms(payload.atom_locations))
            .await;
    }

    async fn on_submit_solution(&mut self, payload: SubmitSolutionPayload) {
        self.game_action(
            &payload.invite_code,
            GameAction::SubmitSolution(payload.atom_locations),
        )
        .await;
    }

    async fn on_submit_move(&mut self, payload: SubmitMovePayload) {
        self.game_action(&payload.invite_code, GameAction::SubmitMove(payload.entry))
            .await;
    }
}
