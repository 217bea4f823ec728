//! # Event Payloads
//!
//! The source passes every event through a single callback typed as
//! `func(tag string, data interface{})`, leaving each handler to type-assert
//! its way to whatever shape it expects. Rust doesn't have `interface{}`, and
//! papering over that with `Box<dyn Any>` would just relocate the type
//! assertions to runtime. Instead the set of shapes is closed: `FabricEvent`
//! is the enum, one variant per event the fabric ever raises.

use std::net::SocketAddr;

use bytes::Bytes;

use crate::error::FabricErrorCode;

/// A UDP datagram tagged with the peer address it arrived from (or is bound for).
#[derive(Debug, Clone)]
pub struct UdpPacket {
    /// Originating (recv) or destination (send) address.
    pub addr: SocketAddr,
    /// Datagram payload.
    pub bytes: Bytes,
}

impl UdpPacket {
    /// Builds a packet from a received slice, copying it into an owned buffer.
    pub fn new(addr: SocketAddr, data: &[u8]) -> Self {
        Self { addr, bytes: Bytes::copy_from_slice(data) }
    }
}

/// Payload carried by a [`FabricEvent::Message`].
///
/// Stream transports (TCP, WS, UART) carry plain bytes; UDP carries bytes
/// paired with the peer address, since a UDP server fans a single socket out
/// across many peers and needs to know who each datagram belongs to.
#[derive(Debug, Clone)]
pub enum MessagePayload {
    /// Bytes read off a stream-oriented transport.
    Stream(Bytes),
    /// A single UDP datagram.
    Udp(UdpPacket),
}

impl MessagePayload {
    /// Borrows the raw bytes regardless of which transport produced them.
    pub fn as_bytes(&self) -> &[u8] {
        match self {
            MessagePayload::Stream(b) => b,
            MessagePayload::Udp(p) => &p.bytes,
        }
    }
}

/// Payload carried by a [`FabricEvent::Error`], pairing a taxonomy code with
/// the human-readable context the source always built as `"<Fn>[<Stage>] -> <cause>"`.
#[derive(Debug, Clone)]
pub struct ErrorPayload {
    /// The taxonomy code this failure maps to.
    pub code: FabricErrorCode,
    /// Context string describing where and why.
    pub description: String,
}

/// Payload carried by a [`FabricEvent::Open`].
///
/// Note this never carries the live socket/writer handle itself — transports
/// differ too much in shape for that (a `TcpStream` write half is not a
/// `UdpSocket` is not a serial `WriteHalf`). The handle, when a caller needs
/// to write back into a connection it didn't open (the forwarding engine's
/// remote side), is published through a [`crate::readiness::ReadyCell`]
/// alongside this event rather than inside it.
#[derive(Debug, Clone, Default)]
pub struct OpenPayload {
    /// The endpoint's own bound/local address, when known.
    pub local: Option<SocketAddr>,
    /// The peer's address, for client-side opens and UART (none).
    pub peer: Option<SocketAddr>,
    /// Registry tag, for server opens (`hub.Tag` in the source).
    pub tag: Option<String>,
}

/// Payload carried by a [`FabricEvent::Accept`] — a server admitted a new peer.
#[derive(Debug, Clone, Default)]
pub struct AcceptPayload {
    /// The accepted peer's remote address.
    pub peer: Option<SocketAddr>,
}

/// Payload carried by a [`FabricEvent::Close`] — always fired exactly once
/// per endpoint instantiation, successful or not.
#[derive(Debug, Clone)]
pub struct ClosePayload {
    /// The taxonomy code, conventionally [`FabricErrorCode::Closed`] (103).
    pub code: i32,
    /// Human-readable closure context, e.g. `"TCPServer[Closed] -> 127.0.0.1:9000"`.
    pub description: String,
    /// The endpoint's address, when the transport is address-addressed.
    pub peer: Option<SocketAddr>,
}

/// One entry per event name the fabric raises. The set is closed: adding a
/// transport never needs a new variant, only a new way of filling these.
#[derive(Debug, Clone)]
pub enum FabricEvent {
    /// A listener or dialer finished standing up and is ready for traffic.
    Open(OpenPayload),
    /// A server accepted a new peer.
    Accept(AcceptPayload),
    /// Data arrived.
    Message(MessagePayload),
    /// The connection or listener shut down.
    Close(ClosePayload),
    /// Something went wrong; the event trigger's "Error" handler gets this
    /// instead of tearing down the whole pipeline.
    Error(ErrorPayload),
}
