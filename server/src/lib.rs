//! # Game Server Library
//!
//! This library provides the authoritative server for a multiplayer
//! side-scrolling shooter. It owns the canonical game state, applies client
//! inputs, runs the simulation at a fixed tick rate and broadcasts compact
//! binary snapshots to every connected client.
//!
//! ## Core Responsibilities
//!
//! ### Authoritative Simulation
//! The game state lives in an Entity-Component-System registry. Systems walk
//! it in ascending entity order every tick, so a seeded server fed the same
//! inputs always produces the same world.
//!
//! ### Client Management
//! Handles the lifecycle of client sessions:
//! - Connection establishment and player entity assignment
//! - Ownership checks on every input
//! - Disconnection, timeout detection and cleanup
//!
//! ### State Broadcasting
//! After every tick the server sends the gameplay events produced during the
//! tick (entities created or destroyed, damage, game over) followed by a
//! snapshot of every visible entity. Snapshots larger than one datagram are
//! split so each packet stays under the protocol's datagram limit.
//!
//! ## Architecture Design
//!
//! ### Single-Threaded Control Loop
//! One task owns the socket, the receive buffer, the client roster and the
//! registry. There is no locking because nothing else mutates them. The only
//! cross-context communication is the atomic shutdown flag raised from the
//! signal listener.
//!
//! ### Non-Blocking UDP
//! The socket is polled without ever blocking. Datagrams land in a bounded
//! ring buffer; when it is full the datagram is dropped with a warning, and
//! malformed packets are rejected by the codec and counted. Neither ever
//! interrupts the loop.
//!
//! ## Module Organization
//!
//! - [`ecs`]: entities, sparse component storage, the registry and its views
//! - [`buffer`]: fixed-capacity ring buffer between socket and simulation
//! - [`transport`]: the [`transport::Transport`] capability and its UDP backend
//! - [`client_manager`]: known peers, their entities and timeouts
//! - [`game`]: the simulation systems and gameplay events
//! - [`network`]: the [`network::Server`] control loop
//! - [`signal`]: OS signal callbacks and the shutdown flag
//! - [`config`]: validated server settings
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use server::config::ServerConfig;
//! use server::network::Server;
//! use server::signal::{ShutdownFlag, SignalHandler};
//! use server::transport::UdpTransport;
//!
//! #[tokio::main(flavor = "current_thread")]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let shutdown = ShutdownFlag::new();
//!     let _signals = SignalHandler::install_shutdown(&shutdown)?;
//!
//!     let mut server = Server::new(UdpTransport::new(), ServerConfig::default())?;
//!     server.start()?;
//!
//!     // Ticks at the configured rate until SIGINT/SIGTERM/SIGHUP
//!     server.run(&shutdown).await?;
//!     Ok(())
//! }
//! ```

pub mod buffer;
pub mod client_manager;
pub mod config;
pub mod ecs;
pub mod game;
pub mod network;
pub mod signal;
pub mod transport;

pub use transport::ServerError;
