//! # Transport Endpoints
//!
//! Five parameterized loops — TCP server, TCP client, UDP server, UDP
//! client, UART client — plus the WS client/upgrade pair, each wiring its
//! transport into the generic read loop (`crate::readloop`) and firing the
//! `Open`/`Accept`/`Message`/`Close`/`Error` contract (§4.4-§4.7).

pub mod tcp;
pub mod udp;
pub mod uart;
pub mod ws;

/// A stop signal servers watch to unwind their accept loop and fire `Close`.
/// The source's `stopC chan bool`; here a watch channel carrying "stop now".
pub type StopSignal = tokio::sync::watch::Receiver<bool>;

/// Pairs with [`StopSignal`] — the handle callers hold to trigger shutdown.
pub fn stop_channel() -> (tokio::sync::watch::Sender<bool>, StopSignal) {
    tokio::sync::watch::channel(false)
}

pub(crate) async fn wait_for_stop(mut stop: StopSignal) {
    loop {
        if *stop.borrow() {
            return;
        }
        if stop.changed().await.is_err() {
            return;
        }
    }
}
