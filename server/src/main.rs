use clap::Parser;
use env_logger::Env;
use log::{error, info};
use server::config::{
    ServerConfig, DEFAULT_HOST, DEFAULT_MAX_CLIENTS, DEFAULT_PORT, DEFAULT_RX_CAPACITY,
    DEFAULT_TICK_RATE,
};
use server::network::Server;
use server::signal::{ShutdownFlag, SignalHandler};
use server::transport::UdpTransport;
use std::time::Duration;

/// Command line arguments
#[derive(Parser, Debug)]
#[clap(author, version, about = "Authoritative UDP game server")]
struct Args {
    /// Server IP address to bind to
    #[clap(short = 'H', long, default_value = DEFAULT_HOST)]
    host: String,
    /// Server port to listen on
    #[clap(short, long, default_value_t = DEFAULT_PORT)]
    port: u16,
    /// Tick rate (updates per second)
    #[clap(short, long, default_value_t = DEFAULT_TICK_RATE)]
    tick_rate: u32,
    /// Maximum number of connected clients
    #[clap(long, default_value_t = DEFAULT_MAX_CLIENTS)]
    max_clients: usize,
    /// Datagrams buffered between two ticks
    #[clap(long, default_value_t = DEFAULT_RX_CAPACITY)]
    rx_capacity: usize,
    /// Seconds of silence before a client is dropped
    #[clap(long, default_value_t = 5)]
    client_timeout_secs: u64,
    /// Seed for the simulation RNG, random when omitted
    #[clap(long)]
    seed: Option<u64>,
}

impl From<Args> for ServerConfig {
    fn from(args: Args) -> Self {
        ServerConfig {
            host: args.host,
            port: args.port,
            tick_rate: args.tick_rate,
            max_clients: args.max_clients,
            rx_capacity: args.rx_capacity,
            client_timeout: Duration::from_secs(args.client_timeout_secs),
            seed: args.seed,
        }
    }
}

/// Parses the command line, installs the signal handlers and runs the server
/// until a shutdown signal arrives.
#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::Builder::from_env(Env::default().default_filter_or("info")).init();

    let config = ServerConfig::from(Args::parse());
    info!(
        "Starting server on {}:{} at {} Hz",
        config.host, config.port, config.tick_rate
    );

    let shutdown = ShutdownFlag::new();
    let mut signals = SignalHandler::install_shutdown(&shutdown)?;

    let mut server = match Server::new(UdpTransport::new(), config) {
        Ok(server) => server,
        Err(e) => {
            error!("Invalid configuration: {}", e);
            std::process::exit(1);
        }
    };
    if let Err(e) = server.start() {
        error!("Failed to start server: {}", e);
        std::process::exit(1);
    }

    server.run(&shutdown).await?;
    signals.stop();

    info!("Server stopped");
    Ok(())
}
