//! Integration tests for the networked server
//!
//! These tests drive a real `Server<UdpTransport>` over loopback UDP and talk
//! to it with plain sockets, exactly like a game client would.

use server::config::ServerConfig;
use server::network::Server;
use server::signal::ShutdownFlag;
use server::transport::UdpTransport;
use shared::{InputCommand, Packet, MAX_DATAGRAM_SIZE, MAX_SNAPSHOT_ENTITIES};
use std::net::{SocketAddr, UdpSocket};
use std::thread;
use std::time::Duration;

const DT: f32 = 1.0 / 60.0;

fn free_port() -> u16 {
    let probe = UdpSocket::bind("127.0.0.1:0").expect("Failed to bind probe socket");
    probe.local_addr().unwrap().port()
}

fn start_server(config: ServerConfig) -> Server<UdpTransport> {
    let config = ServerConfig {
        port: free_port(),
        seed: Some(1234),
        ..config
    };
    let mut server = Server::new(UdpTransport::new(), config).expect("valid config");
    server.start().expect("server failed to start");
    server
}

fn client() -> UdpSocket {
    let socket = UdpSocket::bind("127.0.0.1:0").expect("Failed to bind client socket");
    socket.set_nonblocking(true).unwrap();
    socket
}

fn send(socket: &UdpSocket, packet: &Packet, to: SocketAddr) {
    socket.send_to(&packet.encode().unwrap(), to).unwrap();
}

/// Ticks the server until `done` holds for what the client received.
fn exchange(
    server: &mut Server<UdpTransport>,
    client: &UdpSocket,
    mut done: impl FnMut(&[(usize, Packet)]) -> bool,
) -> Vec<(usize, Packet)> {
    let mut received = Vec::new();
    let mut buf = [0u8; MAX_DATAGRAM_SIZE];

    for _ in 0..500 {
        server.tick(DT);
        while let Ok((len, _)) = client.recv_from(&mut buf) {
            let packet = Packet::decode(&buf[..len]).expect("server sent an undecodable packet");
            received.push((len, packet));
        }
        if done(&received) {
            return received;
        }
        thread::sleep(Duration::from_millis(2));
    }
    panic!("condition never met, received {:?}", received);
}

fn accepted_entity(received: &[(usize, Packet)]) -> Option<u32> {
    received.iter().find_map(|(_, packet)| match packet {
        Packet::Accept { entity } => Some(*entity),
        _ => None,
    })
}

/// SESSION TESTS
mod session_tests {
    use super::*;

    /// Connect, get accepted, then receive snapshots naming our entity
    #[test]
    fn connect_accept_and_snapshot() {
        let mut server = start_server(ServerConfig::default());
        let server_addr = server.local_addr().unwrap();
        let client = client();

        send(&client, &Packet::Connect { client_id: 1 }, server_addr);
        let received = exchange(&mut server, &client, |received| {
            received
                .iter()
                .any(|(_, packet)| matches!(packet, Packet::Snapshot { .. }))
        });

        let entity = accepted_entity(&received).expect("no Accept received");
        assert!(matches!(received[0].1, Packet::Accept { .. }));

        let snapshot = received
            .iter()
            .find_map(|(_, packet)| match packet {
                Packet::Snapshot { entities, .. } => Some(entities.clone()),
                _ => None,
            })
            .unwrap();
        assert!(snapshot.iter().any(|record| record.id == entity));
        assert_eq!(server.clients().len(), 1);
    }

    /// Input from the owning client moves its entity
    #[test]
    fn input_moves_player() {
        let mut server = start_server(ServerConfig::default());
        let server_addr = server.local_addr().unwrap();
        let client = client();

        send(&client, &Packet::Connect { client_id: 1 }, server_addr);
        let received = exchange(&mut server, &client, |r| accepted_entity(r).is_some());
        let entity = accepted_entity(&received).unwrap();

        let command = InputCommand {
            entity,
            dx: 0.0,
            dy: 1.0,
            shooting: false,
        };
        send(&client, &Packet::Input(command), server_addr);

        exchange(&mut server, &client, |received| {
            received.iter().any(|(_, packet)| match packet {
                Packet::Snapshot { entities, .. } => entities
                    .iter()
                    .any(|record| record.id == entity && record.vy > 0.0),
                _ => false,
            })
        });
    }

    /// Ping is answered even before connecting
    #[test]
    fn ping_pong() {
        let mut server = start_server(ServerConfig::default());
        let server_addr = server.local_addr().unwrap();
        let client = client();

        send(&client, &Packet::Ping, server_addr);
        let received = exchange(&mut server, &client, |received| !received.is_empty());

        assert_eq!(received[0], (4, Packet::Pong));
        assert!(server.clients().is_empty());
    }

    /// A second client on a one-slot server gets rejected
    #[test]
    fn full_server_rejects() {
        let mut server = start_server(ServerConfig {
            max_clients: 1,
            ..Default::default()
        });
        let server_addr = server.local_addr().unwrap();
        let first = client();
        let second = client();

        send(&first, &Packet::Connect { client_id: 1 }, server_addr);
        exchange(&mut server, &first, |r| accepted_entity(r).is_some());

        send(&second, &Packet::Connect { client_id: 2 }, server_addr);
        let received = exchange(&mut server, &second, |r| !r.is_empty());
        assert_eq!(received[0].1, Packet::Reject);
        assert_eq!(server.clients().len(), 1);
    }

    /// Large worlds are split over several datagrams under the size limit
    #[test]
    fn large_snapshot_is_chunked() {
        let mut server = start_server(ServerConfig::default());
        let server_addr = server.local_addr().unwrap();

        let enemies = 200;
        for i in 0..enemies {
            server
                .game_mut()
                .spawn_enemy(1800.0, 30.0 + (i % 100) as f32 * 10.0);
        }
        let total = enemies + 1;

        let client = client();
        send(&client, &Packet::Connect { client_id: 1 }, server_addr);

        let received = exchange(&mut server, &client, |received| {
            received
                .iter()
                .filter(|(_, packet)| matches!(packet, Packet::Snapshot { .. }))
                .count()
                >= 3
        });

        let chunks: Vec<(usize, u32, usize)> = received
            .iter()
            .filter_map(|(len, packet)| match packet {
                Packet::Snapshot { tick, entities } => Some((*len, *tick, entities.len())),
                _ => None,
            })
            .collect();

        let first_tick = chunks[0].1;
        let same_tick: Vec<_> = chunks.iter().filter(|(_, tick, _)| *tick == first_tick).collect();
        assert_eq!(same_tick.iter().map(|(_, _, n)| n).sum::<usize>(), total);
        assert_eq!(same_tick[0].2, MAX_SNAPSHOT_ENTITIES);
        assert!(chunks.iter().all(|(len, _, _)| *len <= MAX_DATAGRAM_SIZE));
    }
}

/// ROBUSTNESS TESTS
mod robustness_tests {
    use super::*;

    /// Garbage datagrams are counted and dropped, the server keeps serving
    #[test]
    fn garbage_flood_does_not_stop_server() {
        let mut server = start_server(ServerConfig::default());
        let server_addr = server.local_addr().unwrap();
        let attacker = client();

        for i in 0..100u8 {
            // Unknown type
            attacker.send_to(&[0xFF, 0x01, 0x00, 0x04, i], server_addr).unwrap();
            // Declared size larger than the datagram
            attacker.send_to(&[0x03, 0x01, 0xFF, 0xFF, i], server_addr).unwrap();
            // Wrong version
            attacker.send_to(&[0x04, 0x09, 0x00, 0x04], server_addr).unwrap();
        }
        thread::sleep(Duration::from_millis(20));

        let client = client();
        send(&client, &Packet::Ping, server_addr);
        let received = exchange(&mut server, &client, |received| {
            received.iter().any(|(_, packet)| *packet == Packet::Pong)
        });

        assert!(!received.is_empty());
        assert!(server.stats().malformed > 0);
        assert!(server.is_running());
        assert!(server.clients().is_empty());
    }

    /// A tiny receive buffer drops the overflow instead of growing
    #[test]
    fn ring_overflow_with_small_capacity() {
        let mut server = start_server(ServerConfig {
            rx_capacity: 4,
            ..Default::default()
        });
        let server_addr = server.local_addr().unwrap();
        let client = client();

        for _ in 0..20 {
            send(&client, &Packet::Ping, server_addr);
        }
        thread::sleep(Duration::from_millis(50));

        while server.read_packets() {}

        let stats = server.stats();
        assert!(stats.received > 4, "only {} datagrams arrived", stats.received);
        assert_eq!(stats.dropped, stats.received - 4);
        assert_eq!(server.pending(), 4);
    }
}

/// LIFECYCLE TESTS
mod lifecycle_tests {
    use super::*;
    use tokio::time::timeout;

    /// The async loop serves a client and exits once the flag is raised
    #[tokio::test]
    async fn run_until_shutdown() {
        let mut server = start_server(ServerConfig::default());
        let server_addr = server.local_addr().unwrap();
        let shutdown = ShutdownFlag::new();

        let client = tokio::net::UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let flag = shutdown.clone();
        let probe = async move {
            let mut buf = [0u8; MAX_DATAGRAM_SIZE];
            client
                .send_to(&Packet::Connect { client_id: 5 }.encode().unwrap(), server_addr)
                .await
                .unwrap();

            let mut accepted = false;
            while !accepted {
                let (len, _) = timeout(Duration::from_secs(2), client.recv_from(&mut buf))
                    .await
                    .expect("server never answered")
                    .unwrap();
                accepted = matches!(Packet::decode(&buf[..len]), Ok(Packet::Accept { .. }));
            }
            flag.request_stop();
            accepted
        };

        let (result, accepted) = tokio::join!(server.run(&shutdown), probe);

        assert!(result.is_ok());
        assert!(accepted);
        assert!(!server.is_running());
        assert!(server.local_addr().is_none());
    }

    /// Stopping is idempotent and a stopped server can rebind its address
    #[test]
    fn stop_and_restart() {
        let mut server = start_server(ServerConfig::default());
        let addr = server.local_addr().unwrap();

        server.stop();
        server.stop();
        assert!(!server.is_running());

        server.start().unwrap();
        assert_eq!(server.local_addr(), Some(addr));
    }
}
