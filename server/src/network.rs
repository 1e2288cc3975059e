//! Server network layer: TCP accept loop and per-socket WebSocket sessions.

use crate::client_manager::{ClientManager, ConnectionId};
use crate::config::ServerConfig;
use crate::connection::{Connection, Outbox};
use crate::dispatcher::dispatch;
use crate::error::ServerError;
use crate::game::GameRegistry;
use crate::persistence::{MemoryRepository, Repository, SqliteRepository};
use futures_util::{SinkExt, StreamExt};
use log::{debug, error, info, warn};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::RwLock;
use tokio_tungstenite::accept_async;
use tokio_tungstenite::tungstenite::Message;

/// Process-wide state shared by every connection.
pub struct ServerContext {
    pub repo: Arc<dyn Repository>,
    pub clients: Arc<RwLock<ClientManager>>,
    pub games: GameRegistry,
    pub config: ServerConfig,
}

impl ServerContext {
    pub fn new(repo: Arc<dyn Repository>, config: ServerConfig) -> Self {
        let clients = Arc::new(RwLock::new(ClientManager::new(config.max_connections)));
        let games = GameRegistry::new(Arc::clone(&repo), Arc::clone(&clients));
        Self {
            repo,
            clients,
            games,
            config,
        }
    }
}

/// Main server accepting WebSocket clients
pub struct Server {
    listener: TcpListener,
    ctx: Arc<ServerContext>,
}

impl Server {
    /// Opens the configured storage and binds the listener.
    pub async fn bind(config: ServerConfig) -> Result<Self, ServerError> {
        let repo: Arc<dyn Repository> = match &config.data_path {
            Some(path) => Arc::new(SqliteRepository::open(path).await?),
            None => {
                info!("Running without a database file; games are lost on exit");
                Arc::new(MemoryRepository::new())
            }
        };
        Self::with_repository(config, repo).await
    }

    pub async fn with_repository(
        config: ServerConfig,
        repo: Arc<dyn Repository>,
    ) -> Result<Self, ServerError> {
        let listener = TcpListener::bind(&config.address).await?;
        info!("Server listening on {}", listener.local_addr()?);

        Ok(Server {
            listener,
            ctx: Arc::new(ServerContext::new(repo, config)),
        })
    }

    pub fn local_addr(&self) -> Result<SocketAddr, ServerError> {
        Ok(self.listener.local_addr()?)
    }

    pub fn context(&self) -> Arc<ServerContext> {
        Arc::clone(&self.ctx)
    }

    /// Accepts sockets until the task is dropped.
    pub async fn run(self) -> Result<(), ServerError> {
        loop {
            let (stream, addr) = match self.listener.accept().await {
                Ok(accepted) => accepted,
                Err(e) => {
                    error!("Error accepting connection: {}", e);
                    tokio::time::sleep(Duration::from_millis(10)).await;
                    continue;
                }
            };

            let ctx = Arc::clone(&self.ctx);
            tokio::spawn(async move {
                if let Err(e) = handle_socket(ctx, stream, addr).await {
                    warn!("Connection from {} ended with error: {}", addr, e);
                }
            });
        }
    }
}

/// Runs one client from handshake to close.
async fn handle_socket(
    ctx: Arc<ServerContext>,
    stream: TcpStream,
    addr: SocketAddr,
) -> Result<(), ServerError> {
    let mut ws = accept_async(stream).await?;

    let Some(id) = ctx.clients.write().await.add_client(addr) else {
        warn!("Rejecting {}: server is full", addr);
        ws.close(None).await?;
        return Ok(());
    };
    info!("[id={}] New socket connection from {}", id, addr);

    let (mut sink, mut frames) = ws.split();
    let (outbox, mut rx) = Outbox::new(id, ctx.config.outbound_queue);

    // Spawn writer draining the outbound queue
    let writer = tokio::spawn(async move {
        while let Some(frame) = rx.recv().await {
            if let Err(e) = sink.send(Message::binary(frame)).await {
                debug!("[id={}] Send failed: {}", id, e);
                break;
            }
        }
        let _ = sink.close().await;
    });

    let mut connection = Connection::new(outbox.clone(), Arc::clone(&ctx));
    let idle_timeout = ctx.config.idle_timeout;

    let result = loop {
        let message = tokio::select! {
            message = frames.next() => message,
            _ = outbox.kicked() => {
                info!("[id={}] Closing: outbound queue overflowed", id);
                break Ok(());
            }
            _ = idle(idle_timeout) => {
                info!("[id={}] Closing: idle for {:?}", id, idle_timeout);
                break Ok(());
            }
        };

        match message {
            Some(Ok(Message::Binary(data))) => {
                dispatch(&mut connection, &data).await;
            }
            Some(Ok(Message::Text(_))) => {
                warn!("[id={}] Ignoring text frame", id);
            }
            Some(Ok(Message::Close(frame))) => {
                info!("[id={}] Socket closed: {:?}", id, frame);
                break Ok(());
            }
            Some(Ok(_)) => {}
            Some(Err(e)) => break Err(ServerError::from(e)),
            None => break Ok(()),
        }
    };

    close_connection(&ctx, &mut connection, id).await;
    writer.abort();
    result
}

async fn close_connection(ctx: &ServerContext, connection: &mut Connection, id: ConnectionId) {
    connection.logout().await;
    ctx.clients.write().await.remove_client(&id);
}

async fn idle(timeout: Option<Duration>) {
    match timeout {
        Some(duration) => tokio::time::sleep(duration).await,
        None => std::future::pending().await,
    }
}
