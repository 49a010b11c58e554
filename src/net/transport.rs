//! Outbound transport and the TCP relay listener
//!
//! Sends are synchronous: a frame is pushed into a per-connection channel
//! and a writer task drains it onto the socket. The broadcaster calls
//! `send` while holding a lobby lock.

use parking_lot::Mutex;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::io::AsyncReadExt;
use tokio::net::tcp::OwnedReadHalf;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;

use crate::config::ServerConfig;
use crate::lobby::dispatch::Dispatcher;
use crate::lobby::manager::LobbyManager;
use crate::lobby::player::ClientHandle;
use crate::net::framing::{read_frame, write_frame, FramingError};
use crate::net::packet::SubcmdPacket;
use crate::net::subcmd::ClientVersion;

/// Transport-level send failure
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SendError {
    #[error("Connection closed")]
    Closed,
}

/// Outbound half of a client connection
pub trait Transport: Send + Sync {
    fn send(&self, frame: &[u8]) -> Result<(), SendError>;
}

/// Transport backed by an unbounded channel to a writer task
pub struct ChannelTransport {
    tx: mpsc::UnboundedSender<Vec<u8>>,
}

impl ChannelTransport {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<Vec<u8>>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl Transport for ChannelTransport {
    fn send(&self, frame: &[u8]) -> Result<(), SendError> {
        self.tx.send(frame.to_vec()).map_err(|_| SendError::Closed)
    }
}

/// Length of the connection hello: revision byte + guild card
const HELLO_LEN: usize = 5;

/// TCP listener feeding inbound frames to the dispatcher
pub struct RelayServer {
    config: ServerConfig,
    lobbies: Arc<Mutex<LobbyManager>>,
    dispatcher: Arc<Dispatcher>,
}

impl RelayServer {
    pub fn new(config: ServerConfig, lobbies: Arc<Mutex<LobbyManager>>) -> Self {
        let dispatcher = Arc::new(Dispatcher::new(config.dispatch_options()));
        Self {
            config,
            lobbies,
            dispatcher,
        }
    }

    pub async fn run(&self) -> anyhow::Result<()> {
        let addr = SocketAddr::new(self.config.bind_address, self.config.port);
        let listener = TcpListener::bind(addr).await?;
        tracing::info!("Relay listening on {}", addr);

        loop {
            let (stream, peer) = listener.accept().await?;
            let lobbies = self.lobbies.clone();
            let dispatcher = self.dispatcher.clone();

            tokio::spawn(async move {
                if let Err(e) = handle_connection(stream, peer, lobbies, dispatcher).await {
                    tracing::warn!("Connection {} error: {}", peer, e);
                }
            });
        }
    }
}

async fn handle_connection(
    stream: TcpStream,
    peer: SocketAddr,
    lobbies: Arc<Mutex<LobbyManager>>,
    dispatcher: Arc<Dispatcher>,
) -> anyhow::Result<()> {
    let (mut reader, mut writer) = stream.into_split();

    let mut hello = [0u8; HELLO_LEN];
    reader.read_exact(&mut hello).await?;
    let version = ClientVersion::from_hello(hello[0])
        .ok_or_else(|| anyhow::anyhow!("Unknown client revision {}", hello[0]))?;
    let guildcard = u32::from_le_bytes([hello[1], hello[2], hello[3], hello[4]]);

    let (transport, mut outbound) = ChannelTransport::new();
    let client = Arc::new(ClientHandle::new(guildcard, version, Arc::new(transport)));

    let slot = lobbies.lock().join_default(&client)?;
    tracing::info!(
        "Client {} ({:?}) from {} joined slot {}",
        guildcard,
        version,
        peer,
        slot
    );

    let writer_task = tokio::spawn(async move {
        while let Some(frame) = outbound.recv().await {
            if let Err(e) = write_frame(&mut writer, &frame).await {
                tracing::debug!("Write to {} failed: {}", guildcard, e);
                break;
            }
        }
    });

    let result = read_loop(&mut reader, &client, &dispatcher).await;

    lobbies.lock().leave(&client);
    writer_task.abort();
    tracing::info!("Client {} disconnected", guildcard);

    result
}

async fn read_loop(
    reader: &mut OwnedReadHalf,
    client: &Arc<ClientHandle>,
    dispatcher: &Dispatcher,
) -> anyhow::Result<()> {
    let format = client.version().header_format();

    loop {
        let frame = match read_frame(reader, format).await {
            Ok(frame) => frame,
            Err(FramingError::ConnectionClosed) => return Ok(()),
            Err(e) => return Err(e.into()),
        };

        let packet = match SubcmdPacket::from_frame(format, frame) {
            Ok(packet) => packet,
            Err(e) => {
                tracing::debug!("Ignoring frame from {}: {}", client.guildcard(), e);
                continue;
            }
        };

        if !packet.is_broadcast() {
            tracing::debug!(
                "Ignoring packet type 0x{:02X} from {}",
                packet.pkt_type(),
                client.guildcard()
            );
            continue;
        }

        match dispatcher.handle_inbound(client, &packet) {
            Ok(report) => {
                if let Err(e) = report.result() {
                    tracing::debug!("Partial delivery from {}: {}", client.guildcard(), e);
                }
            }
            Err(e) => tracing::warn!("Dispatch failed for {}: {}", client.guildcard(), e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_channel_transport_delivers() {
        let (transport, mut rx) = ChannelTransport::new();

        transport.send(&[0x60, 0, 6, 0, 0x1F, 1]).unwrap();

        assert_eq!(rx.recv().await, Some(vec![0x60, 0, 6, 0, 0x1F, 1]));
    }

    #[test]
    fn test_channel_transport_closed() {
        let (transport, rx) = ChannelTransport::new();
        drop(rx);

        assert_eq!(transport.send(&[1]), Err(SendError::Closed));
    }
}
