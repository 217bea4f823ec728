//! # Generic Read Loop
//!
//! The shared scaffold behind every byte-stream endpoint (TCP server/client,
//! UART client, UDP server/client). WS is framed by `tungstenite` already and
//! runs its own loop in `transport::ws`, but fires the identical
//! `Open`/`Message`/`Close`/`Error` contract this module defines.
//!
//! Per outer iteration the source spawns a fresh goroutine that sets the
//! socket deadline, reads until a short read completes one "message", and
//! posts the result down one of two channels (`msgChan`/`endChan`) selected
//! by the outer loop. Rust maps that onto `tokio::spawn` + `JoinHandle`
//! directly: the spawned task owns the `source` for the duration of one
//! burst and hands it back in its output, so panics are isolated exactly
//! the way `SafeFunction` isolates them, without needing literal mpsc
//! channels to get the same "select on whichever finishes" shape.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;

use crate::error::FabricErrorCode;
use crate::events::{ClosePayload, ErrorPayload, FabricEvent, MessagePayload, UdpPacket};
use crate::trigger::{EventName, EventTrigger};

/// One read primitive a transport plugs into the generic read loop.
///
/// `read_chunk` performs exactly one underlying read call; the loop handles
/// concatenation, the short-read framing rule, and the deadline.
pub trait ChunkSource: Send + 'static {
    /// Reads into `buf`, returning the number of bytes read and, for
    /// address-oriented transports (UDP), the peer the bytes came from.
    fn read_chunk(
        &mut self,
        buf: &mut [u8],
    ) -> impl std::future::Future<Output = std::io::Result<ReadChunk>> + Send;
}

pub struct ReadChunk {
    pub n: usize,
    pub addr: Option<SocketAddr>,
}

/// Deadline policy for one endpoint's read loop, per §4.3.
#[derive(Debug, Clone, Copy)]
pub enum DeadlinePolicy {
    /// No heartbeat configured — reads block indefinitely.
    None,
    /// UDP server/client and UART: the bare configured interval.
    Bare(Duration),
    /// TCP and WS: interval plus the mandated 3000ms grace window.
    Grace(Duration),
}

impl DeadlinePolicy {
    fn duration(self) -> Option<Duration> {
        match self {
            DeadlinePolicy::None => None,
            DeadlinePolicy::Bare(d) => Some(d),
            DeadlinePolicy::Grace(d) => Some(d + Duration::from_millis(3000)),
        }
    }
}

/// Runs the read loop for `source`, firing `Message` for every completed
/// burst and `Error` (then returning) on the first read failure, deadline
/// expiration, or recovered panic. Does not fire `Open`/`Close` — callers
/// bracket the loop with those, since the payload for `Open` differs by
/// transport and is known before the loop starts.
pub async fn run_read_loop<S>(
    mut source: S,
    buffer_size: usize,
    deadline: DeadlinePolicy,
    trigger: Arc<EventTrigger>,
    label: &'static str,
) where
    S: ChunkSource,
{
    let deadline = deadline.duration();
    loop {
        let task_label = label;
        let handle = tokio::spawn(async move {
            let burst = read_one_burst(&mut source, buffer_size);
            let outcome = match deadline {
                Some(d) => match tokio::time::timeout(d, burst).await {
                    Ok(r) => r,
                    Err(_) => Err(std::io::Error::new(
                        std::io::ErrorKind::TimedOut,
                        format!("{task_label}[Deadline] -> heartbeat expired"),
                    )),
                },
                None => burst.await,
            };
            (source, outcome)
        });

        match handle.await {
            Ok((returned_source, Ok((bytes, addr)))) => {
                source = returned_source;
                let payload = match addr {
                    Some(addr) => MessagePayload::Udp(UdpPacket { addr, bytes: Bytes::from(bytes) }),
                    None => MessagePayload::Stream(Bytes::from(bytes)),
                };
                trigger.fire_background(EventName::Message, FabricEvent::Message(payload));
            }
            Ok((_, Err(err))) => {
                trigger.fire_background(
                    EventName::Error,
                    FabricEvent::Error(ErrorPayload {
                        code: FabricErrorCode::ReadFailure,
                        description: format!("{label}[Read] -> {err}"),
                    }),
                );
                return;
            }
            Err(join_err) => {
                trigger.fire_background(
                    EventName::Error,
                    FabricEvent::Error(ErrorPayload {
                        code: FabricErrorCode::InternalPanic,
                        description: format!("{label}[SafeFunction] -> {join_err}"),
                    }),
                );
                return;
            }
        }
    }
}

async fn read_one_burst<S: ChunkSource>(
    source: &mut S,
    buffer_size: usize,
) -> std::io::Result<(Vec<u8>, Option<SocketAddr>)> {
    let mut growable = Vec::with_capacity(buffer_size);
    let mut addr = None;
    loop {
        let mut chunk = vec![0u8; buffer_size];
        let read = source.read_chunk(&mut chunk).await?;
        if read.n == 0 {
            return Err(std::io::Error::new(std::io::ErrorKind::UnexpectedEof, "read 0 bytes"));
        }
        addr = read.addr.or(addr);
        growable.extend_from_slice(&chunk[..read.n]);
        if read.n < buffer_size {
            break;
        }
    }
    Ok((growable, addr))
}

/// Builds the one mandated `Close` event every endpoint fires exactly once
/// on exit, abnormal or not (§3 invariant, §8 property 3).
pub fn fire_close(trigger: &Arc<EventTrigger>, description: String, peer: Option<SocketAddr>) {
    trigger.fire_background(
        EventName::Close,
        FabricEvent::Close(ClosePayload { code: FabricErrorCode::Closed.code(), description, peer }),
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    struct ScriptedSource {
        chunks: std::collections::VecDeque<Vec<u8>>,
    }

    impl ChunkSource for ScriptedSource {
        async fn read_chunk(&mut self, buf: &mut [u8]) -> std::io::Result<ReadChunk> {
            match self.chunks.pop_front() {
                Some(chunk) => {
                    buf[..chunk.len()].copy_from_slice(&chunk);
                    Ok(ReadChunk { n: chunk.len(), addr: None })
                }
                None => Err(std::io::Error::new(std::io::ErrorKind::UnexpectedEof, "eof")),
            }
        }
    }

    #[tokio::test]
    async fn short_read_completes_the_message() {
        let source = ScriptedSource {
            chunks: vec![vec![1, 2, 3, 4], vec![5, 6]].into(), // buffer_size=4: full then short read
        };
        let trigger = EventTrigger::new();
        let received: Arc<Mutex<Vec<u8>>> = Arc::new(Mutex::new(Vec::new()));
        let r = received.clone();
        trigger.on(EventName::Message, move |ev| {
            if let FabricEvent::Message(MessagePayload::Stream(b)) = ev {
                r.lock().unwrap().extend_from_slice(&b);
            }
        });

        let handle = tokio::spawn(run_read_loop(source, 4, DeadlinePolicy::None, trigger, "test"));
        tokio::time::sleep(Duration::from_millis(50)).await;
        handle.abort();

        assert_eq!(*received.lock().unwrap(), vec![1, 2, 3, 4, 5, 6]);
    }

    #[tokio::test]
    async fn eof_fires_error_and_exits() {
        let source = ScriptedSource { chunks: std::collections::VecDeque::new() };
        let trigger = EventTrigger::new();
        let errored = Arc::new(Mutex::new(false));
        let e = errored.clone();
        trigger.on(EventName::Error, move |_| *e.lock().unwrap() = true);

        run_read_loop(source, 4, DeadlinePolicy::None, trigger, "test").await;
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(*errored.lock().unwrap());
    }
}
