//! # WS Client / WS Upgrade Handler (§4.6, §4.7)
//!
//! Tungstenite already frames messages at the protocol level, so unlike
//! TCP/UDP/UART this endpoint doesn't run through the generic byte-pump read
//! loop (`crate::readloop`) — one WS message is already one complete
//! "message" for our purposes. It still fires the identical
//! `Open`/`Message`/`Close`/`Error` contract every other endpoint does.
//!
//! Two distinct halves live here because the source's `WSClient` (outbound
//! dial, `tokio-tungstenite`) and its HTTP-bridged upgrade handler (inbound,
//! `axum`'s extractor) sit on two different WS crates with incompatible
//! message types. Both end up producing the same [`crate::events::FabricEvent`]s.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::extract::ws::{Message as AxumMessage, WebSocket};
use bytes::Bytes;
use futures_util::stream::SplitSink;
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::Mutex as AsyncMutex;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::protocol::Message as WsMessage;
use tokio_tungstenite::{Connector, MaybeTlsStream, WebSocketStream};
use url::Url;

use crate::error::FabricErrorCode;
use crate::events::{ErrorPayload, FabricEvent, MessagePayload, OpenPayload};
use crate::readiness::ReadyCell;
use crate::readloop::fire_close;
use crate::registry::{ClientRecord, RegistryByAddr};
use crate::trigger::{EventName, EventTrigger};

type DialStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Send half of an outbound WS dial.
pub struct WsWriter(AsyncMutex<SplitSink<DialStream, WsMessage>>);

impl WsWriter {
    pub async fn send(&self, data: &[u8]) -> Result<(), tokio_tungstenite::tungstenite::Error> {
        self.0.lock().await.send(WsMessage::Binary(data.to_vec().into())).await
    }
}

/// Derives the `Origin` header from the dial URL, the way the source builds
/// its `websocket.Config.Origin` from the same parsed URL it dials.
fn origin_of(url: &Url) -> String {
    let scheme = if url.scheme() == "wss" { "https" } else { "http" };
    match url.host_str() {
        Some(host) => match url.port() {
            Some(port) => format!("{scheme}://{host}:{port}"),
            None => format!("{scheme}://{host}"),
        },
        None => format!("{scheme}://"),
    }
}

/// WS client: dials `url`, accepting any peer certificate on `wss://` (§1 —
/// a documented security posture, not a bug), publishes its writer into
/// `ready`, fires `Open`, runs its own framed read loop, fires `Close` on exit.
pub async fn ws_client(
    url: &str,
    trigger: Arc<EventTrigger>,
    heartbeat_ms: Option<u64>,
    ready: Arc<ReadyCell<WsWriter>>,
) {
    let parsed = match Url::parse(url) {
        Ok(u) => u,
        Err(e) => {
            emit_parse_error(&trigger, url, &e.to_string());
            return;
        }
    };

    let mut request = match url.into_client_request() {
        Ok(r) => r,
        Err(e) => {
            emit_parse_error(&trigger, url, &e.to_string());
            return;
        }
    };
    if let Ok(value) = origin_of(&parsed).parse() {
        request.headers_mut().insert(http::header::ORIGIN, value);
    }

    let connector = native_tls::TlsConnector::builder()
        .danger_accept_invalid_certs(true)
        .build()
        .ok()
        .map(Connector::NativeTls);

    let dial = tokio_tungstenite::connect_async_tls_with_config(request, None, false, connector);
    let dial_result = match heartbeat_ms {
        Some(ms) => match tokio::time::timeout(Duration::from_millis(ms) + Duration::from_millis(3000), dial).await {
            Ok(r) => r,
            Err(_) => {
                emit_error(&trigger, FabricErrorCode::TcpSetupFailure, &format!("WSClient[Dial] -> timed out connecting to {url}"));
                fire_close(&trigger, format!("WSClient[Closed] -> {url}"), None);
                return;
            }
        },
        None => dial.await,
    };

    let (stream, _response) = match dial_result {
        Ok(pair) => pair,
        Err(e) => {
            emit_error(&trigger, FabricErrorCode::TcpSetupFailure, &format!("WSClient[Dial] -> {e}"));
            fire_close(&trigger, format!("WSClient[Closed] -> {url}"), None);
            return;
        }
    };

    let (sink, mut source) = stream.split();
    ready.set(WsWriter(AsyncMutex::new(sink)));
    trigger.fire_background(EventName::Open, FabricEvent::Open(OpenPayload { local: None, peer: None, tag: Some(url.to_string()) }));

    // §4.3's grace window applies to WS the same as TCP server handlers.
    let deadline = heartbeat_ms.map(|ms| Duration::from_millis(ms) + Duration::from_millis(3000));

    loop {
        let next = source.next();
        let item = match deadline {
            Some(d) => match tokio::time::timeout(d, next).await {
                Ok(item) => item,
                Err(_) => {
                    emit_error(&trigger, FabricErrorCode::ReadFailure, &format!("WSClient[Deadline] -> {url} heartbeat expired"));
                    break;
                }
            },
            None => next.await,
        };
        match item {
            Some(Ok(WsMessage::Binary(b))) => {
                trigger.fire_background(EventName::Message, FabricEvent::Message(MessagePayload::Stream(Bytes::from(b.to_vec()))));
            }
            Some(Ok(WsMessage::Text(t))) => {
                trigger.fire_background(EventName::Message, FabricEvent::Message(MessagePayload::Stream(Bytes::from(t.as_bytes().to_vec()))));
            }
            Some(Ok(WsMessage::Ping(_) | WsMessage::Pong(_) | WsMessage::Frame(_))) => continue,
            Some(Ok(WsMessage::Close(_))) | None => {
                emit_error(&trigger, FabricErrorCode::ReadFailure, &format!("WSClient[Read] -> {url} closed"));
                break;
            }
            Some(Err(e)) => {
                emit_error(&trigger, FabricErrorCode::ReadFailure, &format!("WSClient[Read] -> {e}"));
                break;
            }
        }
    }
    fire_close(&trigger, format!("WSClient[Closed] -> {url}"), None);
}

fn emit_parse_error(trigger: &Arc<EventTrigger>, url: &str, cause: &str) {
    emit_error(trigger, FabricErrorCode::UrlParseFailure, &format!("WSClient[ParseURL] -> {url}: {cause}"));
    fire_close(trigger, format!("WSClient[Closed] -> {url}"), None);
}

fn emit_error(trigger: &Arc<EventTrigger>, code: FabricErrorCode, description: &str) {
    trigger.fire_background(EventName::Error, FabricEvent::Error(ErrorPayload { code, description: description.to_string() }));
}

/// Send half of an upgraded, HTTP-bridged WS connection, registered into the
/// broadcast hub so higher layers can fan a message out to every connected
/// client (§2.6's "Broadcast / Registry API").
pub struct WsUpgradeWriter(AsyncMutex<SplitSink<WebSocket, AxumMessage>>);

impl WsUpgradeWriter {
    pub async fn send(&self, data: &[u8]) -> Result<(), axum::Error> {
        self.0.lock().await.send(AxumMessage::Binary(data.to_vec().into())).await
    }
}

/// The registry variant the WS upgrade handler and `ws_broadcast` share.
pub type WsHub = RegistryByAddr<Arc<WsUpgradeWriter>>;

/// Bridged from the host's HTTP layer once it has already upgraded the
/// connection (§4.7): installs a `ClientRecord{tag:"", conn:ws}` keyed by
/// `peer`, runs the read loop, and feeds every message through
/// [`g_message_handler`]. Exits (and deregisters) on close or error.
pub async fn ws_upgrade_handler(
    socket: WebSocket,
    peer: SocketAddr,
    hub: Arc<WsHub>,
    trigger: Arc<EventTrigger>,
    run_env: i32,
) {
    let (sink, mut source) = socket.split();
    let writer = Arc::new(WsUpgradeWriter(AsyncMutex::new(sink)));
    hub.set(peer, ClientRecord::generic(writer));
    trigger.fire_background(EventName::Open, FabricEvent::Open(OpenPayload { local: None, peer: Some(peer), tag: Some(String::new()) }));

    loop {
        match source.next().await {
            Some(Ok(AxumMessage::Binary(b))) => {
                if g_message_handler(peer, &b, run_env) {
                    trigger.fire_background(EventName::Message, FabricEvent::Message(MessagePayload::Stream(Bytes::from(b.to_vec()))));
                }
            }
            Some(Ok(AxumMessage::Text(t))) => {
                if g_message_handler(peer, t.as_bytes(), run_env) {
                    trigger.fire_background(EventName::Message, FabricEvent::Message(MessagePayload::Stream(Bytes::from(t.as_bytes().to_vec()))));
                }
            }
            Some(Ok(AxumMessage::Ping(_) | AxumMessage::Pong(_))) => continue,
            Some(Ok(AxumMessage::Close(_))) | None => break,
            Some(Err(e)) => {
                emit_error(&trigger, FabricErrorCode::ReadFailure, &format!("WSUpgrade[Read] -> {e}"));
                break;
            }
        }
    }
    hub.del(&peer);
    fire_close(&trigger, format!("WSUpgrade[Closed] -> {peer}"), Some(peer));
}

/// The generic per-message callback every upgraded WS connection runs through
/// (§4.7): filters the heartbeat sentinel `"HEART"` silently — it never
/// reaches application payload consumers (S5) — and otherwise, below
/// diagnostic level 2, logs the message hex alongside the remote address.
/// Never parses application semantics — that's the host's job. Returns
/// whether the caller should still forward the message as a `Message` event.
fn g_message_handler(peer: SocketAddr, bytes: &[u8], run_env: i32) -> bool {
    if bytes == b"HEART" {
        return false;
    }
    if run_env < 2 {
        tracing::debug!(peer = %peer, "{}", hex_dump(bytes));
    }
    true
}

fn hex_dump(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}

/// Iterates every registered WS client and hands each to `callback(rank, addr,
/// tag, conn)`, the fan-out half of §2.6's Broadcast API. Mirrors the source's
/// `WSBroadcast(callback, hub)`, which invokes `callback(rank, ip, tag, conn)`
/// per client rather than hard-coding "send these bytes to everyone" — callers
/// that want a literal broadcast spawn their own send from inside `callback`,
/// but callers that need to inspect, skip, or tailor per-client traffic can.
pub fn ws_broadcast<F>(hub: &WsHub, mut callback: F)
where
    F: FnMut(usize, SocketAddr, &str, Arc<WsUpgradeWriter>),
{
    hub.iter(|rank, addr, rec| {
        callback(rank, *addr, &rec.tag, rec.conn.clone());
        true
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn heart_sentinel_is_filtered_from_forwarding() {
        let peer: SocketAddr = "127.0.0.1:9".parse().unwrap();
        assert!(!g_message_handler(peer, b"HEART", 0), "HEART must never reach application consumers");
        assert!(g_message_handler(peer, b"hi", 0));
    }

    #[test]
    fn hex_dump_matches_lowercase_pairs() {
        assert_eq!(hex_dump(&[0x00, 0xab, 0xff]), "00abff");
    }

    #[test]
    fn origin_derives_https_for_wss() {
        let url = Url::parse("wss://example.com:9443/socket").unwrap();
        assert_eq!(origin_of(&url), "https://example.com:9443");
    }

    #[test]
    fn origin_derives_http_for_ws() {
        let url = Url::parse("ws://example.com/socket").unwrap();
        assert_eq!(origin_of(&url), "http://example.com");
    }
}
