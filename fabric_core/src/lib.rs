//! # fabric_core
//!
//! A multi-protocol connection fabric unifying TCP, UDP, WebSocket (WS/WSS),
//! and serial (UART) transports behind one event-driven client/server
//! abstraction, with a cross-transport port-forwarding engine layered on
//! top. See `SPEC_FULL.md` at the repository root for the full component
//! design; this crate root just wires the pieces together.
//!
//! Module map:
//! - [`trigger`] / [`events`] — the named-event dispatcher and its closed
//!   payload enum (§4.1).
//! - [`registry`] / [`queue`] — the connection registry and the bounded UDP
//!   peer pool (§4.2).
//! - [`readloop`] — the generic framed-read scaffold shared by every
//!   stream-oriented endpoint (§4.3).
//! - [`transport`] — the five endpoint families: TCP/UDP server+client, UART
//!   client, WS client/upgrade handler (§4.4-§4.7).
//! - [`forward`] — the five forwarding entrypoints built on top of the
//!   endpoints (§4.8).
//! - [`config`] / [`error`] / [`safe`] / [`readiness`] — the ambient stack:
//!   layered configuration, the error taxonomy, the panic-safety wrapper, and
//!   the remote-readiness cell the forwarding engine publishes through.

pub mod config;
pub mod error;
pub mod events;
pub mod forward;
pub mod queue;
pub mod readiness;
pub mod readloop;
pub mod registry;
pub mod safe;
pub mod transport;
pub mod trigger;

pub use config::{EndpointParams, FabricConfig, HttpServerConfig, TransportParam};
pub use error::{FabricError, FabricErrorCode};
pub use events::{AcceptPayload, ClosePayload, ErrorPayload, FabricEvent, MessagePayload, OpenPayload, UdpPacket};
pub use queue::BoundedAddrQueue;
pub use readiness::ReadyCell;
pub use registry::{ClientRecord, RegistryByAddr};
pub use safe::safe_spawn;
pub use trigger::{EventName, EventTrigger};

pub use forward::{tcp2udp_forward, tcp_forward, uart2udp_forward, udp2tcp_forward, udp_forward};
pub use transport::tcp::{tcp_client, tcp_server, tcp_server_registry, TcpWriter};
pub use transport::uart::{uart_client, UartOptions, UartWriter};
pub use transport::udp::{udp_client, udp_server, UdpWriter};
pub use transport::ws::{ws_broadcast, ws_client, ws_upgrade_handler, WsHub, WsUpgradeWriter, WsWriter};
pub use transport::{stop_channel, StopSignal};
