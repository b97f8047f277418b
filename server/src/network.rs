//! Server control loop tying transport, receive buffer, clients and simulation together

use crate::buffer::RingBuffer;
use crate::client_manager::ClientManager;
use crate::config::ServerConfig;
use crate::game::GameState;
use crate::signal::ShutdownFlag;
use crate::transport::{Datagram, ServerError, Transport};
use log::{debug, error, info, warn};
use shared::{snapshot_packets, InputCommand, Packet};
use std::net::SocketAddr;
use std::time::Duration;
use tokio::time::{interval, MissedTickBehavior};

/// How often the socket is polled between simulation ticks
const POLL_INTERVAL: Duration = Duration::from_millis(1);
/// Ticks between two statistics lines in the log
const STATS_INTERVAL_TICKS: u32 = 300;

/// Datagram counters since the server was created
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ServerStats {
    pub received: u64,
    /// Dropped because the receive buffer was full
    pub dropped: u64,
    /// Dropped because they failed to decode
    pub malformed: u64,
    pub sent: u64,
    pub send_failures: u64,
}

/// Authoritative game server
///
/// Single-threaded: the server owns the transport, the receive buffer, the
/// client roster and the game state, and nothing else ever touches them.
pub struct Server<T: Transport> {
    transport: T,
    inbox: RingBuffer<Datagram>,
    clients: ClientManager,
    game: GameState,
    config: ServerConfig,
    stats: ServerStats,
}

impl<T: Transport> Server<T> {
    /// Builds a server around `transport` after validating `config`.
    pub fn new(transport: T, config: ServerConfig) -> Result<Self, ServerError> {
        config.validate()?;

        let seed = config.seed.unwrap_or_else(rand::random);
        info!("Simulation seed: {}", seed);

        Ok(Self {
            transport,
            inbox: RingBuffer::new(config.rx_capacity),
            clients: ClientManager::new(config.max_clients),
            game: GameState::new(seed),
            config,
            stats: ServerStats::default(),
        })
    }

    /// Configures and starts the transport on the configured address.
    pub fn start(&mut self) -> Result<(), ServerError> {
        self.transport
            .configure(&self.config.host, u32::from(self.config.port))?;
        self.transport.start()
    }

    /// Stops the transport and discards anything still buffered. Idempotent.
    pub fn stop(&mut self) {
        self.transport.stop();
        self.inbox.clear();
    }

    pub fn is_running(&self) -> bool {
        self.transport.is_running()
    }

    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.transport.local_addr()
    }

    pub fn stats(&self) -> ServerStats {
        self.stats
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    pub fn clients(&self) -> &ClientManager {
        &self.clients
    }

    pub fn game(&self) -> &GameState {
        &self.game
    }

    pub fn game_mut(&mut self) -> &mut GameState {
        &mut self.game
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }

    /// Datagrams waiting to be decoded
    pub fn pending(&self) -> usize {
        self.inbox.len()
    }

    /// Performs one non-blocking receive into the buffer.
    ///
    /// Returns whether a datagram was read. A full buffer drops the datagram
    /// with a warning.
    pub fn read_packets(&mut self) -> bool {
        match self.transport.recv() {
            Ok(Some(datagram)) => {
                self.stats.received += 1;
                if let Err(datagram) = self.inbox.push(datagram) {
                    self.stats.dropped += 1;
                    warn!(
                        "Receive buffer full, dropping {} bytes from {}",
                        datagram.len(),
                        datagram.addr
                    );
                }
                true
            }
            Ok(None) => false,
            Err(e) => {
                warn!("Receive failed: {}", e);
                false
            }
        }
    }

    /// Reads until the socket has nothing pending, at most one buffer's worth.
    pub fn drain_socket(&mut self) -> usize {
        let mut read = 0;
        while read < self.inbox.capacity() && self.read_packets() {
            read += 1;
        }
        read
    }

    /// Decodes and applies every buffered datagram in arrival order.
    pub fn process_inbox(&mut self) {
        while let Some(datagram) = self.inbox.pop() {
            match Packet::decode(&datagram.payload) {
                Ok(packet) => self.handle_packet(packet, datagram.addr),
                Err(e) => {
                    self.stats.malformed += 1;
                    warn!("Dropping malformed datagram from {}: {}", datagram.addr, e);
                }
            }
        }
    }

    /// Runs one full server tick with a fixed step of `dt` seconds.
    pub fn tick(&mut self, dt: f32) {
        self.drain_socket();
        self.process_inbox();

        for client in self.clients.check_timeouts(self.config.client_timeout) {
            self.game.remove_player(client.entity);
        }

        self.game.step(dt, !self.clients.is_empty());
        self.broadcast_events();
        self.broadcast_snapshot();

        if self.game.tick % STATS_INTERVAL_TICKS == 0 {
            debug!(
                "Tick {}: {} clients, {:?}",
                self.game.tick,
                self.clients.len(),
                self.stats
            );
        }
    }

    /// Runs the control loop until `shutdown` is raised, then stops the transport.
    pub async fn run(&mut self, shutdown: &ShutdownFlag) -> Result<(), ServerError> {
        if !self.transport.is_running() {
            self.start()?;
        }

        let tick_duration = self.config.tick_duration();
        let dt = tick_duration.as_secs_f32();

        let mut ticker = interval(tick_duration);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut poller = interval(POLL_INTERVAL);
        poller.set_missed_tick_behavior(MissedTickBehavior::Skip);

        info!("Server running at {} Hz", self.config.tick_rate);

        while !shutdown.should_stop() {
            tokio::select! {
                _ = ticker.tick() => self.tick(dt),
                _ = poller.tick() => {
                    self.drain_socket();
                }
            }
        }

        info!("Server shutting down after {} ticks", self.game.tick);
        debug!("Final stats: {:?}", self.stats);
        self.stop();
        Ok(())
    }

    /// Applies one decoded packet received from `addr`.
    pub fn handle_packet(&mut self, packet: Packet, addr: SocketAddr) {
        let client_id = self.clients.find_client_by_addr(addr);
        if let Some(client_id) = client_id {
            self.clients.touch(client_id);
        }

        match packet {
            Packet::Connect { client_id: tag } => self.handle_connect(addr, tag),
            Packet::Disconnect => match client_id {
                Some(client_id) => self.drop_client(client_id),
                None => debug!("Disconnect from unknown peer {}", addr),
            },
            Packet::Ping => {
                self.send(&Packet::Pong, addr);
            }
            Packet::Input(command) => self.handle_input(client_id, &command, addr),
            other => {
                warn!("Ignoring {:?} from {}: not a client packet", other.kind(), addr);
            }
        }
    }

    fn handle_connect(&mut self, addr: SocketAddr, tag: u32) {
        info!("Client connecting from {} (tag {})", addr, tag);

        if let Some(existing) = self.clients.find_client_by_addr(addr) {
            info!("Replacing existing session {} from {}", existing, addr);
            self.drop_client(existing);
        }

        if !self.clients.has_capacity() {
            info!("Rejecting {}: server full", addr);
            self.send(&Packet::Reject, addr);
            return;
        }

        // Entities queued for announcement are already in the listing below
        self.broadcast_events();

        let entity = self.game.spawn_player(tag);
        let admitted = entity
            .wire_id()
            .and_then(|wire_id| Some((self.clients.add_client(addr, entity, tag)?, wire_id)));
        let Some((client_id, wire_id)) = admitted else {
            error!("Could not admit {} with entity {}", addr, entity);
            self.game.remove_player(entity);
            self.send(&Packet::Reject, addr);
            return;
        };

        debug!("Client {} controls entity {}", client_id, entity);
        self.send(&Packet::Accept { entity: wire_id }, addr);

        // The new player's own entity reaches everyone through the event broadcast
        match self.game.snapshot() {
            Ok(existing) => {
                for record in existing.iter().filter(|record| record.id != wire_id) {
                    let packet = Packet::EntityCreate {
                        id: record.id,
                        x: record.x,
                        y: record.y,
                        sprite: record.sprite,
                    };
                    self.send(&packet, addr);
                }
            }
            Err(e) => error!("Cannot list entities for {}: {}", addr, e),
        }
    }

    fn handle_input(&mut self, client_id: Option<u32>, command: &InputCommand, addr: SocketAddr) {
        let Some(client) = client_id.and_then(|id| self.clients.get(id)) else {
            debug!("Input from unknown peer {}", addr);
            return;
        };
        if client.entity.wire_id() != Some(command.entity) {
            debug!(
                "Client {} sent input for entity {} it does not control",
                client.id, command.entity
            );
            return;
        }

        let entity = client.entity;
        if !self.game.apply_input(entity, command) {
            debug!("Input for entity {} had no effect", entity);
        }
    }

    fn drop_client(&mut self, client_id: u32) {
        if let Some(client) = self.clients.remove_client(client_id) {
            self.game.remove_player(client.entity);
        }
    }

    fn broadcast_events(&mut self) {
        for event in self.game.take_events() {
            match event.to_packet() {
                Some(packet) => self.broadcast(&packet),
                None => warn!("Event {:?} cannot be expressed on the wire", event),
            }
        }
    }

    fn broadcast_snapshot(&mut self) {
        if self.clients.is_empty() {
            return;
        }
        match self.game.snapshot() {
            Ok(entities) => {
                for packet in snapshot_packets(self.game.tick, &entities) {
                    self.broadcast(&packet);
                }
            }
            Err(e) => error!("Failed to build snapshot: {}", e),
        }
    }

    fn broadcast(&mut self, packet: &Packet) {
        if self.clients.is_empty() {
            return;
        }
        let bytes = match packet.encode() {
            Ok(bytes) => bytes,
            Err(e) => {
                error!("Failed to encode {:?}: {}", packet.kind(), e);
                return;
            }
        };
        for (_, addr) in self.clients.get_client_addrs() {
            self.send_bytes(&bytes, addr);
        }
    }

    fn send(&mut self, packet: &Packet, addr: SocketAddr) -> bool {
        match packet.encode() {
            Ok(bytes) => self.send_bytes(&bytes, addr),
            Err(e) => {
                error!("Failed to encode {:?}: {}", packet.kind(), e);
                false
            }
        }
    }

    fn send_bytes(&mut self, bytes: &[u8], addr: SocketAddr) -> bool {
        let sent = self.transport.send_to(bytes, addr);
        if sent {
            self.stats.sent += 1;
        } else {
            self.stats.send_failures += 1;
        }
        sent
    }
}
