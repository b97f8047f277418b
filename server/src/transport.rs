//! Datagram transport abstraction and its UDP backend
//!
//! The control loop only talks to the [`Transport`] trait: configure an
//! address, start, poll for datagrams without blocking, send, stop. The one
//! concrete backend, [`UdpTransport`], owns a non-blocking IPv4 UDP socket
//! created with `SO_REUSEADDR` so a restarted server can rebind immediately.

use log::{debug, error, info, warn};
use shared::MAX_DATAGRAM_SIZE;
use socket2::{Domain, Protocol, SockAddr, Socket, Type};
use std::io;
use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4, UdpSocket};
use thiserror::Error;

/// Errors raised while setting up or starting the server
#[derive(Debug, Error)]
pub enum ServerError {
    #[error("Invalid IP address '{0}'")]
    InvalidAddress(String),
    #[error("Invalid port {0}")]
    InvalidPort(u32),
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
    #[error("Transport is already running")]
    AlreadyRunning,
    #[error("Transport has no address configured")]
    NotConfigured,
    #[error("Socket {stage} failed: {source}")]
    Socket {
        stage: &'static str,
        #[source]
        source: io::Error,
    },
}

impl ServerError {
    fn socket(stage: &'static str) -> impl FnOnce(io::Error) -> ServerError {
        move |source| ServerError::Socket { stage, source }
    }
}

/// Lifecycle of a transport
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportState {
    Unconfigured,
    Configured,
    Running,
    Stopped,
}

/// A received datagram tagged with its sender
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Datagram {
    pub payload: Vec<u8>,
    pub addr: SocketAddr,
}

impl Datagram {
    pub fn new(payload: Vec<u8>, addr: SocketAddr) -> Self {
        Self { payload, addr }
    }

    pub fn len(&self) -> usize {
        self.payload.len()
    }

    pub fn is_empty(&self) -> bool {
        self.payload.is_empty()
    }
}

/// Capability set the control loop needs from a datagram backend
///
/// None of the I/O methods may block: `recv` reports "nothing pending" as
/// `Ok(None)` and `send_to` reports failure through its return value.
pub trait Transport {
    /// Validates and stores the address to bind on the next `start`.
    fn configure(&mut self, ip: &str, port: u32) -> Result<(), ServerError>;

    /// Creates and binds the socket.
    fn start(&mut self) -> Result<(), ServerError>;

    /// Closes the socket. Calling it again is harmless.
    fn stop(&mut self);

    fn state(&self) -> TransportState;

    fn is_running(&self) -> bool {
        self.state() == TransportState::Running
    }

    /// Polls for one datagram.
    fn recv(&mut self) -> io::Result<Option<Datagram>>;

    /// Sends `payload` to `addr` in one datagram, returning whether it went out whole.
    fn send_to(&self, payload: &[u8], addr: SocketAddr) -> bool;

    /// Address actually bound, once running
    fn local_addr(&self) -> Option<SocketAddr>;
}

/// Non-blocking IPv4 UDP backend
pub struct UdpTransport {
    state: TransportState,
    addr: Option<SocketAddrV4>,
    socket: Option<UdpSocket>,
    recv_buf: Box<[u8]>,
}

impl UdpTransport {
    pub fn new() -> Self {
        Self {
            state: TransportState::Unconfigured,
            addr: None,
            socket: None,
            recv_buf: vec![0u8; MAX_DATAGRAM_SIZE].into_boxed_slice(),
        }
    }

    fn open_socket(addr: SocketAddrV4) -> Result<UdpSocket, ServerError> {
        // Any early return drops `socket`, closing the descriptor
        let socket = Socket::new(Domain::IPV4, Type::DGRAM, Some(Protocol::UDP))
            .map_err(ServerError::socket("create"))?;
        socket
            .set_reuse_address(true)
            .map_err(ServerError::socket("set SO_REUSEADDR"))?;
        socket
            .bind(&SockAddr::from(addr))
            .map_err(ServerError::socket("bind"))?;
        socket
            .set_nonblocking(true)
            .map_err(ServerError::socket("set non-blocking"))?;
        Ok(socket.into())
    }
}

impl Default for UdpTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl Transport for UdpTransport {
    fn configure(&mut self, ip: &str, port: u32) -> Result<(), ServerError> {
        if self.state == TransportState::Running {
            return Err(ServerError::AlreadyRunning);
        }
        if ip.is_empty() {
            return Err(ServerError::InvalidAddress(ip.to_string()));
        }
        let ip: Ipv4Addr = ip
            .parse()
            .map_err(|_| ServerError::InvalidAddress(ip.to_string()))?;
        let port = match u16::try_from(port) {
            Ok(port) if port != 0 => port,
            _ => return Err(ServerError::InvalidPort(port)),
        };

        self.addr = Some(SocketAddrV4::new(ip, port));
        self.state = TransportState::Configured;
        debug!("Transport configured for {}:{}", ip, port);
        Ok(())
    }

    fn start(&mut self) -> Result<(), ServerError> {
        if self.state == TransportState::Running || self.socket.is_some() {
            return Err(ServerError::AlreadyRunning);
        }
        let addr = self.addr.ok_or(ServerError::NotConfigured)?;

        let socket = Self::open_socket(addr)?;
        info!("Listening on udp://{}", addr);
        self.socket = Some(socket);
        self.state = TransportState::Running;
        Ok(())
    }

    fn stop(&mut self) {
        if let Some(socket) = self.socket.take() {
            drop(socket);
            info!("Transport stopped");
        }
        if self.state != TransportState::Unconfigured {
            self.state = TransportState::Stopped;
        }
    }

    fn state(&self) -> TransportState {
        self.state
    }

    fn recv(&mut self) -> io::Result<Option<Datagram>> {
        let Some(socket) = self.socket.as_ref() else {
            return Ok(None);
        };

        match socket.recv_from(&mut self.recv_buf) {
            Ok((len, addr)) => Ok(Some(Datagram::new(self.recv_buf[..len].to_vec(), addr))),
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => Ok(None),
            Err(e) if e.kind() == io::ErrorKind::Interrupted => Ok(None),
            Err(e) => Err(e),
        }
    }

    fn send_to(&self, payload: &[u8], addr: SocketAddr) -> bool {
        let Some(socket) = self.socket.as_ref() else {
            warn!("Dropping {} byte datagram to {}: transport not running", payload.len(), addr);
            return false;
        };

        match socket.send_to(payload, addr) {
            Ok(sent) if sent == payload.len() => true,
            Ok(sent) => {
                error!("Short send to {}: {} of {} bytes", addr, sent, payload.len());
                false
            }
            Err(e) => {
                error!("Failed to send to {}: {}", addr, e);
                false
            }
        }
    }

    fn local_addr(&self) -> Option<SocketAddr> {
        self.socket.as_ref().and_then(|socket| socket.local_addr().ok())
    }
}

impl Drop for UdpTransport {
    fn drop(&mut self) {
        self.stop();
    }
}
