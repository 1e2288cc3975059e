//! Authoritative game sessions.
//!
//! A [`Game`] owns the live state of one invite code. Every action runs under
//! the game's mutex, so validation, mutation, persistence and fan-out happen as
//! one step per game. [`GameRegistry`] keeps at most one resident `Game` per
//! invite code and evicts games nobody watches once their state is saved.
//!
//! The registry map lock only guards lookups and edits of the map; it is never
//! held while a game works or storage is awaited. A game may read the client
//! manager while holding its own lock, never the other way round.

use crate::client_manager::{ClientManager, ConnectionId};
use crate::connection::Subscriber;
use crate::error::GameError;
use crate::persistence::{GameSessionRecord, PersistenceError, PlayerRecord, Repository, SessionId};
use log::{debug, error, info, warn};
use shared::board::{is_valid_atom, is_valid_origin};
use shared::protocol::UpdateGamePayload;
use shared::{
    ray_exit, BoardMove, GameState, GameStatus, Packet, RosterEntry, Vector2, VirtualBoard,
    ATOM_COUNT,
};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::{Mutex, MutexGuard, OnceCell, RwLock};

/// A player command addressed to a resident game.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GameAction {
    SetAtoms(Vec<Vector2>),
    SubmitSolution(Vec<Vector2>),
    SubmitMove(Vector2),
}

impl GameAction {
    pub fn name(&self) -> &'static str {
        match self {
            GameAction::SetAtoms(_) => "set atoms",
            GameAction::SubmitSolution(_) => "submit solution",
            GameAction::SubmitMove(_) => "submit move",
        }
    }
}

struct GameInner {
    state: GameState,
    subscribers: HashMap<ConnectionId, Subscriber>,
    dirty: bool,
    /// Set when the registry drops this instance; it accepts nothing after.
    evicted: bool,
}

pub struct Game {
    invite_code: String,
    session_id: SessionId,
    repo: Arc<dyn Repository>,
    clients: Arc<RwLock<ClientManager>>,
    inner: Mutex<GameInner>,
}

impl Game {
    /// Rehydrates a game from its stored session and rebuilds the roster.
    pub async fn load(
        record: GameSessionRecord,
        repo: Arc<dyn Repository>,
        clients: Arc<RwLock<ClientManager>>,
    ) -> Result<Self, GameError> {
        let state = GameState::from_json(&record.game_state)
            .map_err(|e| GameError::CorruptState(format!("{}: {}", record.invite_code, e)))?;

        let game = Self {
            invite_code: record.invite_code,
            session_id: record.id,
            repo,
            clients,
            inner: Mutex::new(GameInner {
                state,
                subscribers: HashMap::new(),
                dirty: false,
                evicted: false,
            }),
        };

        {
            let mut inner = game.inner.lock().await;
            game.refresh_roster(&mut inner).await?;
        }
        debug!("Loaded game \"{}\" (session {})", game.invite_code, game.session_id);
        Ok(game)
    }

    /// Adds a connection to the fan-out list and seats its player if new.
    ///
    /// Returns the state as seen by the subscriber. Subscribing the same
    /// connection twice only returns the view again.
    pub async fn subscribe(&self, subscriber: Subscriber) -> Result<GameState, GameError> {
        let mut inner = self.lock().await?;
        let key = subscriber.player.secret_key.clone();

        if inner.subscribers.contains_key(&subscriber.outbox.id()) {
            return view_for(&inner.state, &key).ok_or(GameError::NotInRoster);
        }

        if seat_of(&inner.state, &key).is_none() {
            let seat = inner.state.metadata.roster.len() as u32;
            self.repo
                .upsert_seat(self.session_id, subscriber.player.id, seat)
                .await?;
            inner.dirty = true;
            info!(
                "Player \"{}\" took seat {} in game \"{}\"",
                subscriber.player.display_name, seat, self.invite_code
            );
        }
        inner.subscribers.insert(subscriber.outbox.id(), subscriber);

        self.refresh_roster(&mut inner).await?;
        let saved = self.save(&mut inner).await;
        self.publish(&inner);
        saved?;

        view_for(&inner.state, &key).ok_or(GameError::NotInRoster)
    }

    /// Drops a connection from the fan-out list and retries a pending save.
    ///
    /// Returns true if the game retired because nobody is left watching and
    /// nothing is left unsaved. A retired game refuses all further calls.
    pub async fn unsubscribe(&self, connection_id: ConnectionId) -> bool {
        let mut inner = self.inner.lock().await;
        if inner.evicted {
            return false;
        }
        inner.subscribers.remove(&connection_id);

        if self.save(&mut inner).await.is_err() {
            return false;
        }
        if inner.subscribers.is_empty() {
            inner.evicted = true;
            return true;
        }
        false
    }

    pub async fn apply(&self, player: &PlayerRecord, action: GameAction) -> Result<(), GameError> {
        match action {
            GameAction::SetAtoms(atoms) => self.set_atoms(player, &atoms).await,
            GameAction::SubmitSolution(atoms) => self.submit_solution(player, &atoms).await,
            GameAction::SubmitMove(entry) => self.submit_move(player, entry).await,
        }
    }

    pub async fn set_atoms(&self, player: &PlayerRecord, atoms: &[Vector2]) -> Result<(), GameError> {
        let mut inner = self.lock().await?;
        let seat = player_seat(&inner.state, player)?;

        let state = &mut inner.state;
        let status = state.metadata.status;
        let board = state.board_mut(seat).ok_or(GameError::NotAPlayerSeat(seat))?;
        if board.atoms_submitted {
            return Err(GameError::AtomsAlreadySubmitted);
        }
        if status != GameStatus::SelectingAtoms {
            // Recoverable: accept the atoms anyway.
            warn!(
                "Game \"{}\" has status {:?} while seat {} is still selecting atoms",
                self.invite_code, status, seat
            );
        }
        check_atoms(atoms)?;

        board.atom_locations = Some(atoms.to_vec());
        board.atoms_submitted = true;
        if state.board_a.atoms_submitted && state.board_b.atoms_submitted {
            state.metadata.status = GameStatus::PlayerATurn;
            info!("All atoms set in game \"{}\"; seat 0 moves first", self.invite_code);
        }

        self.commit(&mut inner).await
    }

    pub async fn submit_solution(
        &self,
        player: &PlayerRecord,
        atoms: &[Vector2],
    ) -> Result<(), GameError> {
        let mut inner = self.lock().await?;
        let seat = player_seat(&inner.state, player)?;
        check_turn(&inner.state, seat)?;
        check_atoms(atoms)?;

        let state = &mut inner.state;
        let opponent = state
            .opponent_board_mut(seat)
            .ok_or(GameError::NotAPlayerSeat(seat))?;
        let hidden: HashSet<Vector2> = opponent
            .atom_locations
            .as_ref()
            .ok_or(GameError::OpponentAtomsMissing)?
            .iter()
            .copied()
            .collect();
        let guess: HashSet<Vector2> = atoms.iter().copied().collect();

        if hidden == guess {
            info!("Player \"{}\" won game \"{}\"", player.display_name, self.invite_code);
            state.metadata.status = GameStatus::win_for(seat);
        } else {
            info!(
                "Player \"{}\" submitted an incorrect solution in game \"{}\"",
                player.display_name, self.invite_code
            );
            state.metadata.status = state.metadata.status.next_turn();
        }

        self.commit(&mut inner).await
    }

    pub async fn submit_move(&self, player: &PlayerRecord, entry: Vector2) -> Result<(), GameError> {
        let mut inner = self.lock().await?;
        let seat = player_seat(&inner.state, player)?;
        if !is_valid_origin(entry) {
            return Err(GameError::InvalidMove(entry));
        }
        check_turn(&inner.state, seat)?;

        let state = &mut inner.state;
        let opponent = state
            .opponent_board_mut(seat)
            .ok_or(GameError::NotAPlayerSeat(seat))?;
        if opponent.covers(entry) {
            return Err(GameError::MoveOccupied(entry));
        }
        let atoms = opponent
            .atom_locations
            .as_deref()
            .ok_or(GameError::OpponentAtomsMissing)?;

        let path = VirtualBoard::new(atoms)
            .cast_ray(entry)
            .ok_or(GameError::RayCastFailed(entry))?;
        let exit = ray_exit(&path);
        debug!("Ray from {} in game \"{}\" exits at {:?}", entry, self.invite_code, exit);
        opponent.moves.push(BoardMove {
            entry: path[0],
            exit,
        });
        state.metadata.status = state.metadata.status.next_turn();

        self.commit(&mut inner).await
    }

    /// Locks the state unless the game has been retired.
    async fn lock(&self) -> Result<MutexGuard<'_, GameInner>, GameError> {
        let inner = self.inner.lock().await;
        if inner.evicted {
            return Err(GameError::Evicted);
        }
        Ok(inner)
    }

    async fn commit(&self, inner: &mut GameInner) -> Result<(), GameError> {
        inner.dirty = true;
        let saved = self.save(inner).await;
        self.publish(inner);
        saved
    }

    async fn refresh_roster(&self, inner: &mut GameInner) -> Result<(), GameError> {
        inner.state.metadata.roster =
            load_roster(self.repo.as_ref(), &self.clients, self.session_id).await?;
        Ok(())
    }

    /// Writes the full state to storage if anything changed since the last write.
    async fn save(&self, inner: &mut GameInner) -> Result<(), GameError> {
        if !inner.dirty {
            return Ok(());
        }

        let json = inner
            .state
            .to_json()
            .map_err(|e| GameError::Persistence(PersistenceError::Serialization(e)))?;
        if let Err(e) = self.repo.update_session_state(self.session_id, &json).await {
            error!("Failed to save game \"{}\": {}", self.invite_code, e);
            return Err(e.into());
        }
        inner.dirty = false;
        Ok(())
    }

    /// Sends every subscriber its own view of the current state.
    fn publish(&self, inner: &GameInner) {
        for subscriber in inner.subscribers.values() {
            let Some(game_state) = view_for(&inner.state, &subscriber.player.secret_key) else {
                debug!(
                    "[id={}] Skipping update for \"{}\": not in roster",
                    subscriber.outbox.id(),
                    self.invite_code
                );
                continue;
            };
            subscriber
                .outbox
                .send(&Packet::UpdateGame(UpdateGamePayload { game_state }));
        }
    }
}

#[cfg(test)]
impl Game {
    /// State as seen by the player holding `key`, or `None` if they have no seat.
    pub async fn state_for(&self, key: &str) -> Option<GameState> {
        let inner = self.inner.lock().await;
        view_for(&inner.state, key)
    }

    pub async fn status(&self) -> GameStatus {
        self.inner.lock().await.state.metadata.status
    }

    pub async fn subscriber_count(&self) -> usize {
        self.inner.lock().await.subscribers.len()
    }

    pub async fn is_dirty(&self) -> bool {
        self.inner.lock().await.dirty
    }
}

/// Builds the roster of a session in seat order, with usernames and online flags.
pub async fn load_roster(
    repo: &dyn Repository,
    clients: &RwLock<ClientManager>,
    session_id: SessionId,
) -> Result<Vec<RosterEntry>, PersistenceError> {
    let mut players = Vec::new();
    for seat in repo.seats_for_session(session_id).await? {
        match repo.find_player_by_id(seat.player_id).await? {
            Some(player) => players.push(player),
            None => warn!(
                "Seat {} of session {} points at missing player {}",
                seat.seat_number, session_id, seat.player_id
            ),
        }
    }

    let clients = clients.read().await;
    Ok(players
        .into_iter()
        .map(|player| RosterEntry {
            online: clients.is_online(&player.secret_key),
            key: Some(player.secret_key),
            username: player.display_name,
        })
        .collect())
}

pub fn seat_of(state: &GameState, key: &str) -> Option<u32> {
    state
        .metadata
        .roster
        .iter()
        .position(|entry| entry.key.as_deref() == Some(key))
        .map(|seat| seat as u32)
}

fn view_for(state: &GameState, key: &str) -> Option<GameState> {
    seat_of(state, key).map(|seat| state.projected_for(seat))
}

fn player_seat(state: &GameState, player: &PlayerRecord) -> Result<u32, GameError> {
    let seat = seat_of(state, &player.secret_key).ok_or(GameError::NotInRoster)?;
    if seat > 1 {
        return Err(GameError::NotAPlayerSeat(seat));
    }
    Ok(seat)
}

fn check_turn(state: &GameState, seat: u32) -> Result<(), GameError> {
    let status = state.metadata.status;
    if status.turn_seat() == Some(seat) {
        Ok(())
    } else {
        Err(GameError::NotPlayersTurn { seat, status })
    }
}

fn check_atoms(atoms: &[Vector2]) -> Result<(), GameError> {
    if atoms.len() != ATOM_COUNT {
        return Err(GameError::WrongAtomCount {
            expected: ATOM_COUNT,
            actual: atoms.len(),
        });
    }
    let mut seen = HashSet::with_capacity(atoms.len());
    for atom in atoms {
        if !is_valid_atom(*atom) {
            return Err(GameError::AtomOutOfRange(*atom));
        }
        if !seen.insert(*atom) {
            return Err(GameError::DuplicateAtom(*atom));
        }
    }
    Ok(())
}

/// Per-code cell, filled once the game has been loaded from storage.
type Slot = Arc<OnceCell<Arc<Game>>>;

/// Process-wide cache of resident games, keyed by invite code.
pub struct GameRegistry {
    games: RwLock<HashMap<String, Slot>>,
    repo: Arc<dyn Repository>,
    clients: Arc<RwLock<ClientManager>>,
}

impl GameRegistry {
    pub fn new(repo: Arc<dyn Repository>, clients: Arc<RwLock<ClientManager>>) -> Self {
        Self {
            games: RwLock::new(HashMap::new()),
            repo,
            clients,
        }
    }

    /// The resident game for `invite_code`, if it is loaded.
    pub async fn get(&self, invite_code: &str) -> Option<Arc<Game>> {
        self.games
            .read()
            .await
            .get(invite_code)
            .and_then(|slot| slot.get().cloned())
    }

    /// Subscribes to a game, loading it from storage if it is not resident.
    ///
    /// Returns `Ok(None)` if no session has this invite code.
    pub async fn subscribe(
        &self,
        invite_code: &str,
        subscriber: Subscriber,
    ) -> Result<Option<GameState>, GameError> {
        loop {
            let slot = self.slot(invite_code).await;
            let game = match self.load(invite_code, &slot).await {
                Ok(game) => game,
                Err(e) => {
                    self.forget(invite_code, &slot).await;
                    return match e {
                        GameError::UnknownGame(_) => Ok(None),
                        e => Err(e),
                    };
                }
            };

            match game.subscribe(subscriber.clone()).await {
                Err(GameError::Evicted) => {
                    debug!("Game \"{}\" retired during join; loading it again", invite_code);
                    self.forget(invite_code, &slot).await;
                }
                result => return result.map(Some),
            }
        }
    }

    /// Runs an action against a resident game. Returns `None` if the game is
    /// not resident.
    pub async fn apply(
        &self,
        invite_code: &str,
        player: &PlayerRecord,
        action: GameAction,
    ) -> Option<Result<(), GameError>> {
        let game = self.get(invite_code).await?;
        match game.apply(player, action).await {
            Err(GameError::Evicted) => None,
            result => Some(result),
        }
    }

    /// Drops a connection from a game and evicts the game if it became idle.
    /// Returns true if the game was evicted.
    pub async fn unsubscribe(&self, invite_code: &str, connection_id: ConnectionId) -> bool {
        let Some(slot) = self.games.read().await.get(invite_code).cloned() else {
            return false;
        };
        let Some(game) = slot.get().cloned() else {
            return false;
        };

        if !game.unsubscribe(connection_id).await {
            return false;
        }
        self.forget(invite_code, &slot).await;
        info!("Evicted idle game \"{}\" ({} resident)", invite_code, self.len().await);
        true
    }

    pub async fn len(&self) -> usize {
        self.games
            .read()
            .await
            .values()
            .filter(|slot| slot.initialized())
            .count()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    async fn slot(&self, invite_code: &str) -> Slot {
        if let Some(slot) = self.games.read().await.get(invite_code) {
            return Arc::clone(slot);
        }
        Arc::clone(
            self.games
                .write()
                .await
                .entry(invite_code.to_string())
                .or_default(),
        )
    }

    /// Loads the game into `slot` once; concurrent callers wait for the same load.
    async fn load(&self, invite_code: &str, slot: &Slot) -> Result<Arc<Game>, GameError> {
        slot.get_or_try_init(|| async {
            let record = self
                .repo
                .find_session_by_invite(invite_code)
                .await?
                .ok_or_else(|| GameError::UnknownGame(invite_code.to_string()))?;
            let game = Game::load(record, Arc::clone(&self.repo), Arc::clone(&self.clients)).await?;
            info!("Game \"{}\" is now resident", invite_code);
            Ok::<_, GameError>(Arc::new(game))
        })
        .await
        .cloned()
    }

    /// Removes `slot` from the map unless it was already replaced.
    async fn forget(&self, invite_code: &str, slot: &Slot) {
        let mut games = self.games.write().await;
        if games
            .get(invite_code)
            .is_some_and(|current| Arc::ptr_eq(current, slot))
        {
            games.remove(invite_code);
        }
    }
}
