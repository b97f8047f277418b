//! Client session management for the authoritative server
//!
//! This module handles the server-side bookkeeping of connected clients, including:
//! - Session lifecycle (connect, disconnect, timeout)
//! - Mapping from network address to client id and controlled entity
//! - Connection health monitoring and automatic cleanup
//! - Client capacity management and address tracking
//!
//! The client manager never touches the simulation itself; the server loop
//! uses what it reports to spawn and destroy player entities.

use crate::ecs::Entity;
use log::info;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::time::{Duration, Instant};

/// Represents a connected client and the entity it controls
///
/// Each client maintains:
/// - Connection metadata (ID, address, last activity)
/// - The player entity spawned for it
/// - The tag it announced in its Connect packet
#[derive(Debug, Clone)]
pub struct Client {
    /// Unique client identifier assigned by the server
    pub id: u32,
    /// Network address for sending responses
    pub addr: SocketAddr,
    /// Player entity driven by this client's input
    pub entity: Entity,
    /// Identifier chosen by the client when connecting
    pub tag: u32,
    /// Last time we received any packet from this client
    pub last_seen: Instant,
}

impl Client {
    /// Creates a new client with the given ID, address and entity
    ///
    /// The client is marked as recently active.
    pub fn new(id: u32, addr: SocketAddr, entity: Entity, tag: u32) -> Self {
        Self {
            id,
            addr,
            entity,
            tag,
            last_seen: Instant::now(),
        }
    }

    /// Records activity from this client
    pub fn touch(&mut self) {
        self.last_seen = Instant::now();
    }

    /// Checks if the client has exceeded the connection timeout
    ///
    /// Returns true if no packets have been received from this client
    /// within the specified timeout duration, indicating a likely disconnect.
    pub fn is_timed_out(&self, timeout: Duration) -> bool {
        self.last_seen.elapsed() > timeout
    }
}

/// Manages all connected clients
///
/// The ClientManager provides centralized control over client connections
/// and enforces server capacity limits. Lookups by address are linear, which
/// is fine for the handful of players a session holds.
pub struct ClientManager {
    /// Connected clients indexed by their unique ID
    clients: HashMap<u32, Client>,
    /// Next available client ID for new connections
    next_client_id: u32,
    /// Maximum number of concurrent clients allowed
    max_clients: usize,
}

impl ClientManager {
    /// Creates a new client manager with the specified capacity limit
    ///
    /// Client IDs start from 1 and increment for each new connection.
    pub fn new(max_clients: usize) -> Self {
        Self {
            clients: HashMap::new(),
            next_client_id: 1,
            max_clients,
        }
    }

    /// Whether another client can be admitted
    pub fn has_capacity(&self) -> bool {
        self.clients.len() < self.max_clients
    }

    /// Attempts to add a new client connection
    ///
    /// Returns Some(client_id) if successful, None if server is at capacity.
    /// Each client gets a unique ID and is associated with their network address
    /// for response routing.
    pub fn add_client(&mut self, addr: SocketAddr, entity: Entity, tag: u32) -> Option<u32> {
        // Enforce server capacity limits
        if !self.has_capacity() {
            return None;
        }

        let client_id = self.next_client_id;
        self.next_client_id += 1;

        info!(
            "Client {} connected from {} (tag {}, entity {})",
            client_id, addr, tag, entity
        );
        self.clients
            .insert(client_id, Client::new(client_id, addr, entity, tag));

        Some(client_id)
    }

    /// Removes a client from the server
    ///
    /// Returns the removed client so its entity can be cleaned up, or None
    /// if it was already gone. This handles both explicit disconnections
    /// and timeout cleanup.
    pub fn remove_client(&mut self, client_id: u32) -> Option<Client> {
        let client = self.clients.remove(&client_id)?;
        info!("Client {} disconnected", client.id);
        Some(client)
    }

    /// Finds a client ID by their network address
    ///
    /// Used to associate incoming packets with existing client connections.
    /// Returns None if no client is connected from the given address.
    pub fn find_client_by_addr(&self, addr: SocketAddr) -> Option<u32> {
        self.clients
            .iter()
            .find(|(_, client)| client.addr == addr)
            .map(|(id, _)| *id)
    }

    pub fn get(&self, client_id: u32) -> Option<&Client> {
        self.clients.get(&client_id)
    }

    /// Refreshes the activity timestamp of a client
    ///
    /// Returns false if the client ID is unknown.
    pub fn touch(&mut self, client_id: u32) -> bool {
        match self.clients.get_mut(&client_id) {
            Some(client) => {
                client.touch();
                true
            }
            None => false,
        }
    }

    /// Checks for and removes timed-out clients
    ///
    /// Disconnects clients that haven't sent packets within the timeout
    /// threshold and returns them so their entities can be destroyed.
    pub fn check_timeouts(&mut self, timeout: Duration) -> Vec<Client> {
        let mut timed_out: Vec<u32> = self
            .clients
            .iter()
            .filter(|(_, client)| client.is_timed_out(timeout))
            .map(|(id, _)| *id)
            .collect();
        timed_out.sort_unstable();

        timed_out
            .into_iter()
            .filter_map(|client_id| {
                info!("Client {} timed out", client_id);
                self.remove_client(client_id)
            })
            .collect()
    }

    /// Gets all client IDs and their network addresses
    ///
    /// Used for broadcasting packets to all connected clients. Sorted by
    /// client ID so sends happen in a stable order.
    pub fn get_client_addrs(&self) -> Vec<(u32, SocketAddr)> {
        let mut addrs: Vec<(u32, SocketAddr)> = self
            .clients
            .iter()
            .map(|(id, client)| (*id, client.addr))
            .collect();
        addrs.sort_unstable_by_key(|(id, _)| *id);
        addrs
    }

    /// Returns the number of currently connected clients
    pub fn len(&self) -> usize {
        self.clients.len()
    }

    /// Returns true if no clients are currently connected
    pub fn is_empty(&self) -> bool {
        self.clients.is_empty()
    }
}
