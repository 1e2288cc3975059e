use std::path::PathBuf;
use std::time::Duration;

/// Runtime settings for [`crate::network::Server`].
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Address to listen on, e.g. `127.0.0.1:8888`.
    pub address: String,
    /// SQLite database file; `None` keeps everything in memory.
    pub data_path: Option<PathBuf>,
    pub max_connections: usize,
    /// Frames that may wait for a slow client before it is disconnected.
    pub outbound_queue: usize,
    /// Close connections that send nothing for this long.
    pub idle_timeout: Option<Duration>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            address: "127.0.0.1:8888".to_string(),
            data_path: Some(PathBuf::from("data").join("blackbox.db")),
            max_connections: 1024,
            outbound_queue: 64,
            idle_timeout: None,
        }
    }
}

impl ServerConfig {
    /// In-memory configuration bound to an ephemeral local port.
    pub fn ephemeral() -> Self {
        Self {
            address: "127.0.0.1:0".to_string(),
            data_path: None,
            ..Self::default()
        }
    }
}
