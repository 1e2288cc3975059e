//! Connection bookkeeping shared by every socket task.
//!
//! This module tracks:
//! - Connection ids and the server's connection capacity
//! - Which player key each connection is logged in as
//! - The key -> connection index used for roster "online" flags
//!
//! It is shared behind a `tokio::sync::RwLock`. Games read it while holding
//! their own lock; it never calls back into a game.

use log::info;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::time::Instant;

pub type ConnectionId = u64;

/// A live socket and the player it is logged in as
#[derive(Debug)]
pub struct Client {
    /// Unique connection identifier assigned by the server
    pub id: ConnectionId,
    /// Peer address, for logging
    pub addr: SocketAddr,
    pub connected_at: Instant,
    /// Secret key of the logged-in player
    pub player_key: Option<String>,
}

impl Client {
    pub fn new(id: ConnectionId, addr: SocketAddr) -> Self {
        Self {
            id,
            addr,
            connected_at: Instant::now(),
            player_key: None,
        }
    }
}

/// Manages all connected sockets and the online index
pub struct ClientManager {
    clients: HashMap<ConnectionId, Client>,
    /// Player key to the connection that most recently logged in with it
    online: HashMap<String, ConnectionId>,
    next_client_id: ConnectionId,
    max_clients: usize,
}

impl ClientManager {
    /// Creates a manager accepting up to `max_clients` concurrent connections.
    /// Connection ids start from 1.
    pub fn new(max_clients: usize) -> Self {
        Self {
            clients: HashMap::new(),
            online: HashMap::new(),
            next_client_id: 1,
            max_clients,
        }
    }

    /// Registers a new socket. Returns `None` if the server is at capacity.
    pub fn add_client(&mut self, addr: SocketAddr) -> Option<ConnectionId> {
        if self.clients.len() >= self.max_clients {
            return None;
        }

        let client_id = self.next_client_id;
        self.next_client_id += 1;

        info!("Client {} connected from {}", client_id, addr);
        self.clients.insert(client_id, Client::new(client_id, addr));
        Some(client_id)
    }

    /// Forgets a socket and any online entry it still owns.
    pub fn remove_client(&mut self, client_id: &ConnectionId) -> Option<Client> {
        let client = self.clients.remove(client_id)?;
        if let Some(key) = &client.player_key {
            self.release_key(key, client.id);
        }
        info!(
            "Client {} ({}) disconnected after {:?}",
            client.id,
            client.addr,
            client.connected_at.elapsed()
        );
        Some(client)
    }

    /// Marks `key` online through `client_id`, replacing any older connection.
    pub fn set_online(&mut self, key: &str, client_id: ConnectionId) {
        if let Some(client) = self.clients.get_mut(&client_id) {
            client.player_key = Some(key.to_string());
        }
        self.online.insert(key.to_string(), client_id);
    }

    /// Clears the online entry for `key` if it still belongs to `client_id`.
    pub fn set_offline(&mut self, key: &str, client_id: ConnectionId) -> bool {
        if let Some(client) = self.clients.get_mut(&client_id) {
            if client.player_key.as_deref() == Some(key) {
                client.player_key = None;
            }
        }
        self.release_key(key, client_id)
    }

    fn release_key(&mut self, key: &str, client_id: ConnectionId) -> bool {
        if self.online.get(key) == Some(&client_id) {
            self.online.remove(key);
            true
        } else {
            false
        }
    }

    pub fn is_online(&self, key: &str) -> bool {
        self.online.contains_key(key)
    }

    /// Returns the number of currently connected sockets
    pub fn len(&self) -> usize {
        self.clients.len()
    }

    pub fn is_empty(&self) -> bool {
        self.clients.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_addr() -> SocketAddr {
        "127.0.0.1:8080".parse().unwrap()
    }

    fn test_addr2() -> SocketAddr {
        "127.0.0.1:8081".parse().unwrap()
    }

    #[test]
    fn test_full_server_refuses_until_a_slot_frees() {
        let mut manager = ClientManager::new(1);
        let first = manager.add_client(test_addr()).unwrap();
        manager.set_online("pAlice", first);
        assert!(manager.add_client(test_addr2()).is_none());

        let removed = manager.remove_client(&first).unwrap();
        assert_eq!(removed.player_key.as_deref(), Some("pAlice"));
        assert!(!manager.is_online("pAlice"));

        // Ids are never reused.
        assert_eq!(manager.add_client(test_addr2()), Some(first + 1));
    }

    #[test]
    fn test_logout_clears_online_flag() {
        let mut manager = ClientManager::new(2);
        let id = manager.add_client(test_addr()).unwrap();

        assert!(!manager.is_online("pAlice"));
        manager.set_online("pAlice", id);
        assert!(manager.is_online("pAlice"));

        assert!(manager.set_offline("pAlice", id));
        assert!(!manager.is_online("pAlice"));
        // Logging out twice is harmless.
        assert!(!manager.set_offline("pAlice", id));

        // The socket itself stays connected, now anonymous.
        let removed = manager.remove_client(&id).unwrap();
        assert!(removed.player_key.is_none());
        assert!(manager.remove_client(&id).is_none());
    }

    #[test]
    fn test_second_login_keeps_key_online() {
        let mut manager = ClientManager::new(2);
        let first = manager.add_client(test_addr()).unwrap();
        let second = manager.add_client(test_addr2()).unwrap();

        manager.set_online("pAlice", first);
        manager.set_online("pAlice", second);

        // The older connection logging out must not take the newer one offline.
        assert!(!manager.set_offline("pAlice", first));
        assert!(manager.is_online("pAlice"));

        // Nor may the older socket closing.
        assert!(manager.remove_client(&first).is_some());
        assert!(manager.is_online("pAlice"));

        manager.remove_client(&second);
        assert!(!manager.is_online("pAlice"));
        assert!(manager.is_empty());
    }

    #[test]
    fn test_switching_keys_on_one_connection() {
        let mut manager = ClientManager::new(1);
        let id = manager.add_client(test_addr()).unwrap();

        manager.set_online("pAlice", id);
        assert!(manager.set_offline("pAlice", id));
        manager.set_online("pBob", id);

        assert!(!manager.is_online("pAlice"));
        assert!(manager.is_online("pBob"));
        assert_eq!(manager.len(), 1);
    }
}
