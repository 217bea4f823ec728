//! # TCP Server / TCP Client (§4.4, §4.6)
//!
//! The server's accept loop only fires the generic `Accept` event with peer
//! metadata — the accepted [`tokio::net::TcpStream`] itself is handed to an
//! `on_accept` callback, not boxed into a [`crate::events::FabricEvent`].
//! [`tcp_server`] is the bare primitive: `on_accept` always runs, which is
//! what `forward.rs`'s bridges need since they wire each connection by hand
//! on their own per-pair triggers. [`tcp_server_registry`] is the source's
//! actual `TCPServer` contract on top of it: it only spawns the
//! registry-backed [`default_connection_handler`] when the caller's trigger
//! already has a `Message` handler registered, leaving the connection
//! otherwise unhandled.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::io::AsyncWriteExt;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::Mutex as AsyncMutex;

use crate::error::{FabricError, FabricErrorCode};
use crate::events::{AcceptPayload, ErrorPayload, FabricEvent, OpenPayload};
use crate::readiness::ReadyCell;
use crate::readloop::{fire_close, run_read_loop, ChunkSource, DeadlinePolicy, ReadChunk};
use crate::registry::{ClientRecord, RegistryByAddr};
use crate::trigger::{EventName, EventTrigger};

use super::{wait_for_stop, StopSignal};

/// The write half of an accepted or dialed TCP connection, shareable so the
/// registry and the forwarding engine can both hold a handle to it.
pub struct TcpWriter(AsyncMutex<OwnedWriteHalf>);

impl TcpWriter {
    pub async fn write_all(&self, data: &[u8]) -> std::io::Result<()> {
        let mut guard = self.0.lock().await;
        guard.write_all(data).await
    }
}

struct TcpReadSource(OwnedReadHalf);

impl ChunkSource for TcpReadSource {
    async fn read_chunk(&mut self, buf: &mut [u8]) -> std::io::Result<ReadChunk> {
        use tokio::io::AsyncReadExt;
        let n = self.0.read(buf).await?;
        Ok(ReadChunk { n, addr: None })
    }
}

/// Splits `stream`, registers it under `peer`, and runs the generic read
/// loop, deregistering on exit — the source's `tcpServerHandler`. Returns
/// the writer handle immediately (before the read loop starts) so callers
/// that need it synchronously (tests, forwarding) don't have to wait on the
/// spawned task.
pub fn default_connection_handler(
    registry: Arc<RegistryByAddr<Arc<TcpWriter>>>,
    buffer_size: usize,
    heartbeat_ms: Option<u64>,
) -> impl Fn(TcpStream, SocketAddr, Arc<EventTrigger>) + Send + Sync + 'static {
    move |stream, peer, trigger| {
        let registry = registry.clone();
        let (read_half, write_half) = stream.into_split();
        let writer = Arc::new(TcpWriter(AsyncMutex::new(write_half)));
        registry.set(peer, ClientRecord::generic(writer));
        let deadline = match heartbeat_ms {
            Some(ms) => DeadlinePolicy::Grace(Duration::from_millis(ms)),
            None => DeadlinePolicy::None,
        };
        tokio::spawn(async move {
            run_read_loop(TcpReadSource(read_half), buffer_size, deadline, trigger, "tcpServerHandler").await;
            registry.del(&peer);
        });
    }
}

/// TCP server: binds `addr`, fires `Open`, then for every accepted peer
/// fires `Accept` and calls `on_accept` with the raw stream. Blocks until
/// `stop` signals shutdown, then fires `Close` exactly once.
pub async fn tcp_server<F>(
    addr: &str,
    trigger: Arc<EventTrigger>,
    stop: StopSignal,
    tag: impl Into<String>,
    on_accept: F,
) -> Result<(), FabricError>
where
    F: Fn(TcpStream, SocketAddr, Arc<EventTrigger>) + Send + Sync + 'static,
{
    let tag = tag.into();
    let listener = match TcpListener::bind(addr).await {
        Ok(l) => l,
        Err(e) => {
            let err = FabricError::from_io(FabricErrorCode::TcpSetupFailure, "TCPServer[Listen]", e);
            trigger.fire_background(
                EventName::Error,
                FabricEvent::Error(ErrorPayload { code: err.code, description: err.description.clone() }),
            );
            fire_close(&trigger, format!("TCPServer[Closed] -> {addr}"), None);
            return Err(err);
        }
    };
    let local = listener.local_addr().ok();
    trigger.fire_background(
        EventName::Open,
        FabricEvent::Open(OpenPayload { local, peer: None, tag: Some(tag) }),
    );

    let accept_trigger = trigger.clone();
    let on_accept = Arc::new(on_accept);
    let accept_task = tokio::spawn(async move {
        loop {
            match listener.accept().await {
                Ok((stream, peer)) => {
                    accept_trigger
                        .fire_background(EventName::Accept, FabricEvent::Accept(AcceptPayload { peer: Some(peer) }));
                    on_accept(stream, peer, accept_trigger.clone());
                }
                Err(e) => {
                    // Reached via normal shutdown (listener closed) as much as a
                    // genuine accept failure; the source logs this path rather
                    // than firing it onto the trigger (§4.4).
                    tracing::warn!(target: "fabric_core::tcp_server", "TCPServer[Accept] -> {e}");
                    return;
                }
            }
        }
    });

    wait_for_stop(stop).await;
    accept_task.abort();
    fire_close(&trigger, format!("TCPServer[Closed] -> {addr}"), local);
    Ok(())
}

/// Host-facing `TCPServer` entrypoint (§4.4, §6): binds `addr` and, for every
/// accepted peer, spawns [`default_connection_handler`] registered under
/// `registry` — but only if `trigger` already has a `Message` handler
/// registered at call time. With no `Message` consumer there's nothing to
/// deliver reads to, so the connection is accepted (the `Accept` event still
/// fires) and immediately dropped, matching the source's conditional spawn.
/// `forward.rs`'s bridges don't go through this path — they call [`tcp_server`]
/// directly and run their own per-connection wiring on per-pair triggers.
pub async fn tcp_server_registry(
    addr: &str,
    trigger: Arc<EventTrigger>,
    stop: StopSignal,
    tag: impl Into<String>,
    registry: Arc<RegistryByAddr<Arc<TcpWriter>>>,
    buffer_size: usize,
    heartbeat_ms: Option<u64>,
) -> Result<(), FabricError> {
    let has_message = trigger.has_event(EventName::Message);
    let handler = default_connection_handler(registry, buffer_size, heartbeat_ms);
    tcp_server(addr, trigger, stop, tag, move |stream, peer, t| {
        if has_message {
            handler(stream, peer, t);
        }
    })
    .await
}

/// TCP client: dials `addr`, publishes its writer into `ready`, fires `Open`,
/// runs the read loop, fires `Close` on exit.
pub async fn tcp_client(
    addr: &str,
    trigger: Arc<EventTrigger>,
    heartbeat_ms: Option<u64>,
    buffer_size: usize,
    ready: Arc<ReadyCell<TcpWriter>>,
) {
    let stream = match TcpStream::connect(addr).await {
        Ok(s) => s,
        Err(e) => {
            trigger.fire_background(
                EventName::Error,
                FabricEvent::Error(ErrorPayload {
                    code: FabricErrorCode::TcpSetupFailure,
                    description: format!("TCPClient[Dial] -> {e}"),
                }),
            );
            fire_close(&trigger, format!("SocketClient[Closed] -> {addr}"), None);
            return;
        }
    };
    let peer = stream.peer_addr().ok();
    let local = stream.local_addr().ok();
    let (read_half, write_half) = stream.into_split();
    ready.set(TcpWriter(AsyncMutex::new(write_half)));
    trigger.fire_background(EventName::Open, FabricEvent::Open(OpenPayload { local, peer, tag: None }));

    let deadline = match heartbeat_ms {
        Some(ms) => DeadlinePolicy::Grace(Duration::from_millis(ms)),
        None => DeadlinePolicy::None,
    };
    run_read_loop(TcpReadSource(read_half), buffer_size, deadline, trigger.clone(), "TCPClient").await;
    fire_close(&trigger, format!("SocketClient[Closed] -> {addr}"), peer);
}
