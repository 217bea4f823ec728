//! # UDP Server / UDP Client (§4.5, §4.6)
//!
//! UDP has no accept loop — one bound socket reads from whoever's sending to
//! it. The server variant reads via `recv_from` (peer varies per datagram);
//! the client variant dials (`connect`s) a fixed peer and reads via `recv`.
//! Both publish a [`UdpWriter`] into a [`ReadyCell`] immediately on bind/dial
//! so the forwarding engine can write back through the same socket the read
//! loop is draining (§4.8's fan-out handler needs exactly this).

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::net::UdpSocket;

use crate::error::{FabricError, FabricErrorCode};
use crate::events::{ErrorPayload, FabricEvent, OpenPayload};
use crate::readiness::ReadyCell;
use crate::readloop::{fire_close, run_read_loop, ChunkSource, DeadlinePolicy, ReadChunk};
use crate::trigger::{EventName, EventTrigger};

use super::{wait_for_stop, StopSignal};

/// Shared send handle for a bound UDP socket, used both by the server's
/// per-peer fan-out and the client's single-peer writes.
pub struct UdpWriter {
    socket: Arc<UdpSocket>,
}

impl UdpWriter {
    pub async fn send_to(&self, data: &[u8], addr: SocketAddr) -> std::io::Result<()> {
        self.socket.send_to(data, addr).await.map(|_| ())
    }

    /// Writes to the socket's connected peer (client/dial mode only).
    pub async fn send(&self, data: &[u8]) -> std::io::Result<()> {
        self.socket.send(data).await.map(|_| ())
    }
}

enum UdpMode {
    Server,
    Client(SocketAddr),
}

struct UdpReadSource {
    socket: Arc<UdpSocket>,
    mode: UdpMode,
}

impl ChunkSource for UdpReadSource {
    async fn read_chunk(&mut self, buf: &mut [u8]) -> std::io::Result<ReadChunk> {
        match self.mode {
            UdpMode::Server => {
                let (n, addr) = self.socket.recv_from(buf).await?;
                Ok(ReadChunk { n, addr: Some(addr) })
            }
            UdpMode::Client(peer) => {
                let n = self.socket.recv(buf).await?;
                Ok(ReadChunk { n, addr: Some(peer) })
            }
        }
    }
}

fn any_addr_for(target: &str) -> &'static str {
    match target.parse::<SocketAddr>() {
        Ok(SocketAddr::V6(_)) => "[::]:0",
        _ => "0.0.0.0:0",
    }
}

/// UDP server: binds `addr`, publishes the socket into `local_ready`, fires
/// `Open`, runs the read loop producing `UdpPacket` messages. Blocks on
/// `stop`, then fires `Close` exactly once.
pub async fn udp_server(
    addr: &str,
    trigger: Arc<EventTrigger>,
    stop: StopSignal,
    heartbeat_ms: Option<u64>,
    buffer_size: usize,
    local_ready: Arc<ReadyCell<UdpWriter>>,
) -> Result<(), FabricError> {
    let socket = match UdpSocket::bind(addr).await {
        Ok(s) => s,
        Err(e) => {
            let err = FabricError::from_io(FabricErrorCode::UdpSetupFailure, "UDPServer[ListenUDP]", e);
            trigger.fire_background(
                EventName::Error,
                FabricEvent::Error(ErrorPayload { code: err.code, description: err.description.clone() }),
            );
            fire_close(&trigger, format!("UDPServer[Closed] -> {addr}"), None);
            return Err(err);
        }
    };
    let socket = Arc::new(socket);
    let local = socket.local_addr().ok();
    local_ready.set(UdpWriter { socket: socket.clone() });
    trigger.fire_background(EventName::Open, FabricEvent::Open(OpenPayload { local, peer: None, tag: None }));

    let deadline = match heartbeat_ms {
        Some(ms) => DeadlinePolicy::Bare(Duration::from_millis(ms)),
        None => DeadlinePolicy::None,
    };
    let source = UdpReadSource { socket, mode: UdpMode::Server };
    let read_trigger = trigger.clone();
    let read_task = tokio::spawn(run_read_loop(source, buffer_size, deadline, read_trigger, "udpServerHandler"));

    wait_for_stop(stop).await;
    read_task.abort();
    fire_close(&trigger, format!("UDPServer[Closed] -> {addr}"), local);
    Ok(())
}

/// UDP client: dials (connects) `addr`, publishes the socket into `ready`,
/// fires `Open`, runs the read loop, fires `Close` on exit.
pub async fn udp_client(
    addr: &str,
    trigger: Arc<EventTrigger>,
    heartbeat_ms: Option<u64>,
    buffer_size: usize,
    ready: Arc<ReadyCell<UdpWriter>>,
) {
    let socket = match UdpSocket::bind(any_addr_for(addr)).await {
        Ok(s) => s,
        Err(e) => {
            trigger.fire_background(
                EventName::Error,
                FabricEvent::Error(ErrorPayload {
                    code: FabricErrorCode::UdpSetupFailure,
                    description: format!("UDPClient[Bind] -> {e}"),
                }),
            );
            fire_close(&trigger, format!("UDPClient[Closed] -> {addr}"), None);
            return;
        }
    };
    if let Err(e) = socket.connect(addr).await {
        trigger.fire_background(
            EventName::Error,
            FabricEvent::Error(ErrorPayload {
                code: FabricErrorCode::UdpSetupFailure,
                description: format!("UDPClient[Connect] -> {e}"),
            }),
        );
        fire_close(&trigger, format!("UDPClient[Closed] -> {addr}"), None);
        return;
    }
    let socket = Arc::new(socket);
    let peer = socket.peer_addr().ok();
    let local = socket.local_addr().ok();
    ready.set(UdpWriter { socket: socket.clone() });
    trigger.fire_background(EventName::Open, FabricEvent::Open(OpenPayload { local, peer, tag: None }));

    let deadline = match heartbeat_ms {
        Some(ms) => DeadlinePolicy::Bare(Duration::from_millis(ms)),
        None => DeadlinePolicy::None,
    };
    let mode_peer = peer.or(local).expect("connected UDP socket has a peer or local addr");
    run_read_loop(UdpReadSource { socket, mode: UdpMode::Client(mode_peer) }, buffer_size, deadline, trigger.clone(), "UDPClient")
        .await;
    fire_close(&trigger, format!("UDPClient[Closed] -> {addr}"), peer);
}
