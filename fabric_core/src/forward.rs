//! # Forwarding Engine (§4.8)
//!
//! Five entrypoints pairing a local endpoint (listener) with a remote
//! endpoint (dialer): `TCP→TCP`, `UDP→UDP`, `UDP→TCP`, `TCP→UDP`, `UART→UDP`.
//! Each local `Open`/`Accept` spins up the matching remote endpoint bound
//! into a fresh per-pair [`EventTrigger`]; the remote's `Open` publishes its
//! write handle into a [`ReadyCell`] the local side's `Message` handler reads
//! from. That `ReadyCell` is the fix for the source's documented data race
//! (SPEC_FULL.md design notes): the remote write handle is genuinely
//! unavailable until publish, and messages that arrive first are dropped
//! rather than racing a bare pointer.
//!
//! The UDP-server forwarders (`UDP→UDP`, `TCP→UDP`, `UART→UDP`) share one
//! local UDP socket across every admitted peer, so they don't spin up a
//! per-connection pair the way the TCP-listener variants do — there's only
//! ever one local endpoint and one remote endpoint for the whole forwarder's
//! lifetime, with [`BoundedAddrQueue`] standing in for "which peers currently
//! get the remote's fan-out".

use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::sync::mpsc;
use tokio::sync::Mutex as AsyncMutex;

use crate::config::{EndpointParams, TransportParam};
use crate::error::FabricError;
use crate::events::{ErrorPayload, FabricEvent, MessagePayload};
use crate::readiness::ReadyCell;
use crate::readloop::{run_read_loop, ChunkSource, DeadlinePolicy, ReadChunk};
use crate::registry::{ClientRecord, RegistryByAddr};
use crate::trigger::{EventName, EventTrigger};

use super::transport::tcp::tcp_server;
use super::transport::uart::{uart_client, UartOptions, UartWriter};
use super::transport::udp::{udp_client, udp_server, UdpWriter};
use super::transport::StopSignal;
use crate::queue::BoundedAddrQueue;

/// The ASCII control packet that clears a UDP forwarder's peer pool (§6).
/// Purely a control signal — never forwarded to the remote.
const FLUSH_SENTINEL: &[u8] = b"__FLUSH";

fn bare_or_none(param: &TransportParam) -> Option<u64> {
    (param.interval_ms > 0).then_some(param.interval_ms)
}

/// One entry per accepted peer on a forwarder's local TCP listener. The
/// connection/pump logic doesn't care what's stored here — the registry
/// exists so callers can observe "who's connected right now" (§8's property
/// 1 and scenario S1), not to drive the forward itself.
type ForwardRegistry = RegistryByAddr<()>;

struct TcpReadHalfSource(OwnedReadHalf);

impl ChunkSource for TcpReadHalfSource {
    async fn read_chunk(&mut self, buf: &mut [u8]) -> std::io::Result<ReadChunk> {
        let n = self.0.read(buf).await?;
        Ok(ReadChunk { n, addr: None })
    }
}

/// Spawns one task that drains an mpsc channel and writes to `local_writer`
/// in enqueue order, returning the sender side. A `Message` handler can't
/// `.await`, so it can't serialize writes itself — pushing onto an unbounded
/// channel is the synchronous op that preserves read order (§5), while a bare
/// `tokio::spawn` per message would let consecutive writes race the writer
/// with no ordering guarantee.
fn spawn_ordered_local_writer(local_writer: Arc<AsyncMutex<OwnedWriteHalf>>) -> mpsc::UnboundedSender<Bytes> {
    let (tx, mut rx) = mpsc::unbounded_channel::<Bytes>();
    tokio::spawn(async move {
        while let Some(bytes) = rx.recv().await {
            let _ = local_writer.lock().await.write_all(&bytes).await;
        }
    });
    tx
}

/// Same as [`spawn_ordered_local_writer`], but for the remote side, whose
/// writer only becomes available once the dialed connection's `Open` fires.
/// Bytes that drain before the `ReadyCell` is set are dropped, matching the
/// "no remote yet" semantics `ReadyCell::get` already gives every other caller.
fn spawn_ordered_ready_writer<W: UdpLike + 'static>(ready: Arc<ReadyCell<W>>) -> mpsc::UnboundedSender<Bytes> {
    let (tx, mut rx) = mpsc::unbounded_channel::<Bytes>();
    tokio::spawn(async move {
        while let Some(bytes) = rx.recv().await {
            if let Some(w) = ready.get() {
                let _ = w.forward(&bytes).await;
            }
        }
    });
    tx
}

fn log_pair_lifecycle(trigger: &Arc<EventTrigger>, label: &'static str) {
    trigger.on(EventName::Error, move |ev| {
        if let FabricEvent::Error(ErrorPayload { code, description }) = ev {
            tracing::warn!(code = code.code(), "{label}[Error] -> {description}");
        }
    });
    trigger.on(EventName::Close, move |ev| {
        if let FabricEvent::Close(close) = ev {
            tracing::info!("{label}[Close] -> {}", close.description);
        }
    });
}

/// `TCP→TCP` (§4.8 table row 1): a local TCP listener, a TCP dial per
/// accepted connection, and a bidirectional byte pump between them.
pub async fn tcp_forward(
    local_addr: &str,
    remote_addr: &str,
    stop: StopSignal,
    tag: impl Into<String>,
    params: EndpointParams,
) -> Result<(), FabricError> {
    let tag = tag.into();
    let registry = Arc::new(ForwardRegistry::init(tag.clone()));
    let remote_addr = remote_addr.to_string();
    let tcp_buf = params.tcp.buffer_size;
    let heartbeat = bare_or_none(&params.tcp);

    let server_trigger = EventTrigger::new();
    tcp_server(local_addr, server_trigger, stop, tag, move |stream, peer, _server_trigger| {
        let registry = registry.clone();
        let remote_addr = remote_addr.clone();
        tokio::spawn(async move {
            registry.set(peer, ClientRecord::generic(()));

            let (read_half, write_half) = stream.into_split();
            let local_writer = Arc::new(AsyncMutex::new(write_half));
            let remote_ready: Arc<ReadyCell<super::transport::tcp::TcpWriter>> = ReadyCell::empty();

            let pair_trigger = EventTrigger::new();
            log_pair_lifecycle(&pair_trigger, "TCPForward[Remote]");
            let to_local = spawn_ordered_local_writer(local_writer.clone());
            pair_trigger.on(EventName::Message, move |ev| {
                if let FabricEvent::Message(MessagePayload::Stream(bytes)) = ev {
                    let _ = to_local.send(bytes);
                }
            });
            let remote_task =
                tokio::spawn(super::transport::tcp::tcp_client(&remote_addr, pair_trigger, heartbeat, tcp_buf, remote_ready.clone()));

            let local_trigger = EventTrigger::new();
            let to_remote = spawn_ordered_ready_writer(remote_ready.clone());
            local_trigger.on(EventName::Message, move |ev| {
                if let FabricEvent::Message(MessagePayload::Stream(bytes)) = ev {
                    let _ = to_remote.send(bytes);
                }
            });

            let deadline = heartbeat.map(|ms| DeadlinePolicy::Grace(Duration::from_millis(ms))).unwrap_or(DeadlinePolicy::None);
            run_read_loop(TcpReadHalfSource(read_half), tcp_buf, deadline, local_trigger, "TCPForward[Local]").await;

            registry.del(&peer);
            remote_task.abort();
        });
    })
    .await
}

/// `UDP→TCP` (§4.8 table row 3): a local TCP listener, a UDP dial per
/// accepted connection. Remote UDP datagram bytes land in the local TCP
/// conn; local TCP bytes are sent to the remote UDP peer.
pub async fn udp2tcp_forward(
    local_addr: &str,
    remote_addr: &str,
    stop: StopSignal,
    tag: impl Into<String>,
    params: EndpointParams,
) -> Result<(), FabricError> {
    let tag = tag.into();
    let registry = Arc::new(ForwardRegistry::init(tag.clone()));
    let remote_addr = remote_addr.to_string();
    let tcp_buf = params.tcp.buffer_size;
    let udp_buf = params.udp.buffer_size;
    let tcp_heartbeat = bare_or_none(&params.tcp);
    let udp_heartbeat = bare_or_none(&params.udp);

    let server_trigger = EventTrigger::new();
    tcp_server(local_addr, server_trigger, stop, tag, move |stream, peer, _server_trigger| {
        let registry = registry.clone();
        let remote_addr = remote_addr.clone();
        tokio::spawn(async move {
            registry.set(peer, ClientRecord::generic(()));

            let (read_half, write_half) = stream.into_split();
            let local_writer = Arc::new(AsyncMutex::new(write_half));
            let remote_ready: Arc<ReadyCell<UdpWriter>> = ReadyCell::empty();

            let pair_trigger = EventTrigger::new();
            log_pair_lifecycle(&pair_trigger, "UDP2TCPForward[Remote]");
            let to_local = spawn_ordered_local_writer(local_writer.clone());
            pair_trigger.on(EventName::Message, move |ev| {
                if let FabricEvent::Message(MessagePayload::Udp(pkt)) = ev {
                    let _ = to_local.send(pkt.bytes);
                }
            });
            let remote_task = tokio::spawn(udp_client(&remote_addr, pair_trigger, udp_heartbeat, udp_buf, remote_ready.clone()));

            let local_trigger = EventTrigger::new();
            let to_remote = spawn_ordered_ready_writer(remote_ready.clone());
            local_trigger.on(EventName::Message, move |ev| {
                if let FabricEvent::Message(MessagePayload::Stream(bytes)) = ev {
                    let _ = to_remote.send(bytes);
                }
            });

            let deadline = tcp_heartbeat.map(|ms| DeadlinePolicy::Grace(Duration::from_millis(ms))).unwrap_or(DeadlinePolicy::None);
            run_read_loop(TcpReadHalfSource(read_half), tcp_buf, deadline, local_trigger, "UDP2TCPForward[Local]").await;

            registry.del(&peer);
            remote_task.abort();
        });
    })
    .await
}

/// Shared body for the two UDP-server forwarders (`UDP→UDP`, `TCP→UDP`
/// minus the remote side): wires a local UDP socket's admission/fan-out
/// handlers around a `BoundedAddrQueue`, per §4.8's stateful admission and
/// fan-out handlers.
fn wire_udp_local_admission(
    tag: String,
    queue: Arc<BoundedAddrQueue>,
    remote_ready: Arc<ReadyCell<impl UdpLike + 'static>>,
) -> Arc<EventTrigger> {
    let trigger = EventTrigger::new();
    trigger.on(EventName::Message, move |ev| {
        if let FabricEvent::Message(MessagePayload::Udp(pkt)) = ev {
            let queue = queue.clone();
            let ready = remote_ready.clone();
            let tag = tag.clone();
            tokio::spawn(async move {
                if pkt.bytes.as_ref() == FLUSH_SENTINEL {
                    queue.renew();
                    tracing::info!(tag = %tag, "Exit Customer -> [ALL]");
                    return;
                }
                if !queue.contains(&pkt.addr) {
                    queue.push(pkt.addr);
                    tracing::info!(tag = %tag, "Init Customer -> [{}]", pkt.addr);
                }
                if let Some(w) = ready.get() {
                    let _ = w.forward(&pkt.bytes).await;
                }
            });
        }
    });
    trigger
}

/// Minimal capability the UDP-server local admission handler needs from
/// whatever it's forwarding *to* — a single-peer UDP client or a UART port
/// both just need "send these bytes onward".
trait UdpLike: Send + Sync {
    fn forward(&self, data: &[u8]) -> impl std::future::Future<Output = std::io::Result<()>> + Send;
}

impl UdpLike for UdpWriter {
    async fn forward(&self, data: &[u8]) -> std::io::Result<()> {
        self.send(data).await
    }
}

impl UdpLike for super::transport::tcp::TcpWriter {
    async fn forward(&self, data: &[u8]) -> std::io::Result<()> {
        self.write_all(data).await
    }
}

impl UdpLike for UartWriter {
    async fn forward(&self, data: &[u8]) -> std::io::Result<()> {
        self.write_all(data).await
    }
}

/// `UDP→UDP` (§4.8 table row 2): a local UDP listener, a single UDP dial.
/// Local messages admit/flush the peer pool then forward to the remote;
/// remote messages fan out to every admitted peer.
pub async fn udp_forward(
    local_addr: &str,
    remote_addr: &str,
    stop: StopSignal,
    tag: impl Into<String>,
    params: EndpointParams,
) -> Result<(), FabricError> {
    let tag = tag.into();
    let queue = Arc::new(BoundedAddrQueue::new(params.udp_max_len));
    let local_ready: Arc<ReadyCell<UdpWriter>> = ReadyCell::empty();
    let remote_ready: Arc<ReadyCell<UdpWriter>> = ReadyCell::empty();
    let udp_heartbeat = bare_or_none(&params.udp);

    let local_trigger = wire_udp_local_admission(tag, queue.clone(), remote_ready.clone());

    let remote_trigger = EventTrigger::new();
    log_pair_lifecycle(&remote_trigger, "UDPForward[Remote]");
    let q = queue.clone();
    let ready = local_ready.clone();
    remote_trigger.on(EventName::Message, move |ev| {
        if let FabricEvent::Message(MessagePayload::Udp(pkt)) = ev {
            let q = q.clone();
            let ready = ready.clone();
            tokio::spawn(async move {
                if q.is_empty() {
                    return;
                }
                if let Some(local) = ready.get() {
                    for addr in q.snapshot() {
                        let _ = local.send_to(&pkt.bytes, addr).await;
                    }
                }
            });
        }
    });

    let remote_addr = remote_addr.to_string();
    let remote_task = tokio::spawn(async move {
        udp_client(&remote_addr, remote_trigger, udp_heartbeat, params.udp.buffer_size, remote_ready).await;
    });

    let result = udp_server(local_addr, local_trigger, stop, udp_heartbeat, params.udp.buffer_size, local_ready).await;
    remote_task.abort();
    result
}

/// `TCP→UDP` (§4.8 table row 4): a local UDP listener (same pool/admission
/// shape as `UDP→UDP`), a single TCP dial as the remote.
pub async fn tcp2udp_forward(
    local_addr: &str,
    remote_addr: &str,
    stop: StopSignal,
    tag: impl Into<String>,
    params: EndpointParams,
) -> Result<(), FabricError> {
    let tag = tag.into();
    let queue = Arc::new(BoundedAddrQueue::new(params.udp_max_len));
    let local_ready: Arc<ReadyCell<UdpWriter>> = ReadyCell::empty();
    let remote_ready: Arc<ReadyCell<super::transport::tcp::TcpWriter>> = ReadyCell::empty();
    let udp_heartbeat = bare_or_none(&params.udp);
    let tcp_heartbeat = bare_or_none(&params.tcp);

    let local_trigger = wire_udp_local_admission(tag, queue.clone(), remote_ready.clone());

    let remote_trigger = EventTrigger::new();
    log_pair_lifecycle(&remote_trigger, "TCP2UDPForward[Remote]");
    let q = queue.clone();
    let ready = local_ready.clone();
    remote_trigger.on(EventName::Message, move |ev| {
        if let FabricEvent::Message(MessagePayload::Stream(bytes)) = ev {
            let q = q.clone();
            let ready = ready.clone();
            tokio::spawn(async move {
                if q.is_empty() {
                    return;
                }
                if let Some(local) = ready.get() {
                    for addr in q.snapshot() {
                        let _ = local.send_to(&bytes, addr).await;
                    }
                }
            });
        }
    });

    let remote_addr = remote_addr.to_string();
    let remote_task = tokio::spawn(async move {
        super::transport::tcp::tcp_client(&remote_addr, remote_trigger, tcp_heartbeat, params.tcp.buffer_size, remote_ready).await;
    });

    let result = udp_server(local_addr, local_trigger, stop, udp_heartbeat, params.udp.buffer_size, local_ready).await;
    remote_task.abort();
    result
}

/// `UART→UDP` (§4.8 table row 5): same local UDP pool/admission shape, a
/// serial port as the remote.
pub async fn uart2udp_forward(
    local_addr: &str,
    remote: UartOptions,
    stop: StopSignal,
    tag: impl Into<String>,
    params: EndpointParams,
) -> Result<(), FabricError> {
    let tag = tag.into();
    let queue = Arc::new(BoundedAddrQueue::new(params.udp_max_len));
    let local_ready: Arc<ReadyCell<UdpWriter>> = ReadyCell::empty();
    let remote_ready: Arc<ReadyCell<UartWriter>> = ReadyCell::empty();
    let udp_heartbeat = bare_or_none(&params.udp);
    let uart_heartbeat = bare_or_none(&params.tcp);

    let local_trigger = wire_udp_local_admission(tag, queue.clone(), remote_ready.clone());

    let remote_trigger = EventTrigger::new();
    log_pair_lifecycle(&remote_trigger, "UART2UDPForward[Remote]");
    let q = queue.clone();
    let ready = local_ready.clone();
    remote_trigger.on(EventName::Message, move |ev| {
        if let FabricEvent::Message(MessagePayload::Stream(bytes)) = ev {
            let q = q.clone();
            let ready = ready.clone();
            tokio::spawn(async move {
                if q.is_empty() {
                    return;
                }
                if let Some(local) = ready.get() {
                    for addr in q.snapshot() {
                        let _ = local.send_to(&bytes, addr).await;
                    }
                }
            });
        }
    });

    let remote_task = tokio::spawn(async move {
        uart_client(remote, remote_trigger, uart_heartbeat, params.tcp.buffer_size, remote_ready).await;
    });

    let result = udp_server(local_addr, local_trigger, stop, udp_heartbeat, params.udp.buffer_size, local_ready).await;
    remote_task.abort();
    result
}

/// Exposed for tests that need to assert the FLUSH sentinel's exact bytes
/// without duplicating the literal.
pub fn flush_sentinel() -> &'static [u8] {
    FLUSH_SENTINEL
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flush_sentinel_is_the_documented_literal() {
        assert_eq!(flush_sentinel(), b"__FLUSH");
    }

    #[test]
    fn bare_or_none_treats_zero_interval_as_no_heartbeat() {
        assert_eq!(bare_or_none(&TransportParam::new(1024, 0)), None);
        assert_eq!(bare_or_none(&TransportParam::new(1024, 500)), Some(500));
    }
}
