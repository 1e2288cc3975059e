use clap::Parser;
use log::{error, info};
use server::config::ServerConfig;
use server::network::Server;
use std::path::PathBuf;
use std::time::Duration;

/// Black Box game server.
#[derive(Parser, Debug)]
#[clap(author, version, about)]
struct Args {
    /// Server IP address to bind to
    #[clap(short = 'H', long, default_value = "127.0.0.1")]
    host: String,
    /// Server port to listen on
    #[clap(short, long, default_value = "8888")]
    port: u16,
    /// SQLite database file
    #[clap(short, long, default_value = "data/blackbox.db")]
    data: PathBuf,
    /// Keep everything in memory; nothing survives a restart
    #[clap(long)]
    memory: bool,
    /// Maximum number of simultaneous connections
    #[clap(long, default_value = "1024")]
    max_connections: usize,
    /// Outbound frames buffered per connection before it is dropped
    #[clap(long, default_value = "64")]
    outbound_queue: usize,
    /// Close connections silent for this many seconds (0 disables)
    #[clap(long, default_value = "0")]
    idle_timeout_secs: u64,
}

impl From<Args> for ServerConfig {
    fn from(args: Args) -> Self {
        ServerConfig {
            address: format!("{}:{}", args.host, args.port),
            data_path: (!args.memory).then_some(args.data),
            max_connections: args.max_connections,
            outbound_queue: args.outbound_queue,
            idle_timeout: (args.idle_timeout_secs > 0)
                .then(|| Duration::from_secs(args.idle_timeout_secs)),
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();
    let config = ServerConfig::from(args);

    let server = Server::bind(config).await?;
    info!("Starting websocket server on {}", server.local_addr()?);

    // Handle shutdown gracefully
    tokio::select! {
        result = server.run() => {
            if let Err(e) = result {
                error!("Server stopped: {}", e);
                return Err(e.into());
            }
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Received Ctrl+C, shutting down");
        }
    }

    Ok(())
}
