//! Headless probe client: connects, steers its ship for a while and logs
//! every packet the server sends back.

use clap::Parser;
use env_logger::Env;
use log::{info, warn};
use shared::{InputCommand, Packet, MAX_DATAGRAM_SIZE};
use std::net::SocketAddr;
use tokio::net::UdpSocket;
use tokio::time::{interval, sleep, timeout, Duration, Instant};

#[derive(Parser, Debug)]
#[clap(author, version, about = "Headless test client for the game server")]
struct Args {
    /// Server address
    #[clap(short, long, default_value = "127.0.0.1:8080")]
    server: SocketAddr,
    /// Tag announced in the Connect packet
    #[clap(short, long, default_value_t = 1)]
    tag: u32,
    /// Seconds to stay connected
    #[clap(short, long, default_value_t = 5)]
    duration: u64,
}

async fn send(
    socket: &UdpSocket,
    packet: &Packet,
    to: SocketAddr,
) -> Result<(), Box<dyn std::error::Error>> {
    socket.send_to(&packet.encode()?, to).await?;
    Ok(())
}

/// Waits for the Accept or Reject answering our Connect.
async fn handshake(
    socket: &UdpSocket,
    server: SocketAddr,
) -> Result<Option<u32>, Box<dyn std::error::Error>> {
    let mut buf = [0u8; MAX_DATAGRAM_SIZE];
    loop {
        let (len, from) = timeout(Duration::from_secs(2), socket.recv_from(&mut buf)).await??;
        if from != server {
            continue;
        }
        match Packet::decode(&buf[..len]) {
            Ok(Packet::Accept { entity }) => return Ok(Some(entity)),
            Ok(Packet::Reject) => return Ok(None),
            Ok(other) => info!("Before handshake: {:?}", other),
            Err(e) => warn!("Undecodable packet: {}", e),
        }
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::Builder::from_env(Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    let socket = UdpSocket::bind("0.0.0.0:0").await?;
    info!("Client socket bound to {}", socket.local_addr()?);

    send(&socket, &Packet::Connect { client_id: args.tag }, args.server).await?;
    let Some(entity) = handshake(&socket, args.server).await? else {
        warn!("Server is full");
        return Ok(());
    };
    info!("Accepted, controlling entity {}", entity);

    let deadline = Instant::now() + Duration::from_secs(args.duration);
    let mut input_timer = interval(Duration::from_millis(50));
    let mut buf = [0u8; MAX_DATAGRAM_SIZE];
    let mut step: u32 = 0;
    let mut snapshots: u32 = 0;

    send(&socket, &Packet::Ping, args.server).await?;

    loop {
        tokio::select! {
            _ = sleep(deadline.saturating_duration_since(Instant::now())) => break,
            _ = input_timer.tick() => {
                // Weave up and down while firing
                let phase = (step / 20) % 2;
                let command = InputCommand {
                    entity,
                    dx: 0.5,
                    dy: if phase == 0 { 1.0 } else { -1.0 },
                    shooting: step % 4 == 0,
                };
                send(&socket, &Packet::Input(command), args.server).await?;
                step += 1;
            }
            received = socket.recv_from(&mut buf) => {
                let (len, _) = received?;
                match Packet::decode(&buf[..len]) {
                    Ok(Packet::Snapshot { tick, entities }) => {
                        snapshots += 1;
                        if snapshots % 60 == 0 {
                            info!("Snapshot tick {}: {} entities", tick, entities.len());
                        }
                    }
                    Ok(Packet::GameOver) => {
                        info!("Game over");
                        break;
                    }
                    Ok(packet) => info!("{:?}", packet),
                    Err(e) => warn!("Undecodable packet: {}", e),
                }
            }
        }
    }

    send(&socket, &Packet::Disconnect, args.server).await?;
    info!("Disconnected after {} snapshots", snapshots);
    Ok(())
}
