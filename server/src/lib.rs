//! # Black Box Game Server Library
//!
//! This library provides the authoritative server for the two-player Black Box
//! deduction game. It owns every game session, validates each player action
//! against the rules, resolves rays fired at hidden atoms, and pushes a
//! per-viewer projection of the game to everyone watching.
//!
//! ## Core Responsibilities
//!
//! ### Authoritative Game State
//! Clients never decide anything. Atom placement, turn order, ray outcomes and
//! wins are computed here, and clients receive the resulting state.
//!
//! ### Hidden Information
//! A player sees their own atoms but never the opponent's until the game is
//! won. Spectators see neither. Every update is projected for its recipient
//! before it is encoded.
//!
//! ### Identity and Lobby
//! Players register once and keep a secret key as their only credential.
//! With it they can list their games, create new ones, and join by invite code.
//!
//! ## Architecture Design
//!
//! ### One Task per Socket
//! Each WebSocket connection runs its own reader task and writer task. The
//! reader decodes frames and dispatches them to the connection's handlers;
//! the writer drains a bounded outbound queue so a slow client never stalls
//! a game.
//!
//! ### One Lock per Game
//! Each resident game serializes its actions behind a mutex covering state,
//! storage writes and fan-out, so concurrent sockets cannot interleave two
//! moves in the same game.
//!
//! ### Binary Protocol
//! One bincode-encoded `shared::Packet` per binary frame. Malformed frames and
//! refused game actions are logged and dropped; lobby failures are answered
//! with an acknowledgment carrying a reason.
//!
//! ## Module Organization
//!
//! ### Client Manager Module (`client_manager`)
//! Connection ids, the connection limit and the key-to-connection index used
//! for "online" flags.
//!
//! ### Connection Module (`connection`)
//! The per-socket session: login and registration, listing and joining games,
//! and forwarding game actions. Also the bounded `Outbox` used to reach it.
//!
//! ### Dispatcher Module (`dispatcher`)
//! Decodes frames and routes each payload kind to its typed handler.
//!
//! ### Game Module (`game`)
//! The game state machine, roster, visibility rules and persistence
//! dirty-tracking, plus the registry that keeps one live instance per invite
//! code and evicts games nobody is watching.
//!
//! ### Persistence Module (`persistence`)
//! The storage contract for players, sessions and seats, a SQLite store on
//! sqlx, and a volatile in-memory store.
//!
//! ### Network Module (`network`)
//! TCP listener, WebSocket handshake and the per-socket read/write loop.
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use server::config::ServerConfig;
//! use server::network::Server;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     // Listen on 127.0.0.1:8888 and store games in data/blackbox.db
//!     let server = Server::bind(ServerConfig::default()).await?;
//!
//!     // Accept clients until the process is stopped
//!     server.run().await?;
//!
//!     Ok(())
//! }
//! ```

pub mod client_manager;
pub mod config;
pub mod connection;
pub mod dispatcher;
pub mod error;
pub mod game;
pub mod network;
pub mod persistence;
pub mod utils;
