//! # UART Client (§4.6)
//!
//! Serial ports have no address and no accept loop, so this is the simplest
//! transport endpoint: open the port, publish a writer, fire `Open`, run the
//! read loop, fire `Close`. The source's `UARTClient` takes a bare
//! `serial.OpenOptions{PortName, BaudRate, ...}` per call rather than pulling
//! port settings from global config — `UartOptions` mirrors that.

use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncWriteExt, ReadHalf, WriteHalf};
use tokio::sync::Mutex as AsyncMutex;
use tokio_serial::{SerialPortBuilderExt, SerialStream};

use crate::error::{FabricError, FabricErrorCode};
use crate::events::{ErrorPayload, FabricEvent, OpenPayload};
use crate::readiness::ReadyCell;
use crate::readloop::{fire_close, run_read_loop, ChunkSource, DeadlinePolicy, ReadChunk};
use crate::trigger::{EventName, EventTrigger};

/// Port name and baud rate for one serial dial — the fabric's equivalent of
/// the source's `serial.OpenOptions`.
#[derive(Debug, Clone)]
pub struct UartOptions {
    pub port_name: String,
    pub baud_rate: u32,
}

impl UartOptions {
    pub fn new(port_name: impl Into<String>, baud_rate: u32) -> Self {
        Self { port_name: port_name.into(), baud_rate }
    }
}

pub struct UartWriter(AsyncMutex<WriteHalf<SerialStream>>);

impl UartWriter {
    pub async fn write_all(&self, data: &[u8]) -> std::io::Result<()> {
        let mut guard = self.0.lock().await;
        guard.write_all(data).await
    }
}

struct UartReadSource(ReadHalf<SerialStream>);

impl ChunkSource for UartReadSource {
    async fn read_chunk(&mut self, buf: &mut [u8]) -> std::io::Result<ReadChunk> {
        use tokio::io::AsyncReadExt;
        let n = self.0.read(buf).await?;
        Ok(ReadChunk { n, addr: None })
    }
}

/// UART client: opens `option.port_name`, publishes its writer into `ready`,
/// fires `Open`, runs the read loop, fires `Close` on exit.
pub async fn uart_client(
    option: UartOptions,
    trigger: Arc<EventTrigger>,
    heartbeat_ms: Option<u64>,
    buffer_size: usize,
    ready: Arc<ReadyCell<UartWriter>>,
) {
    if option.port_name.trim().is_empty() {
        trigger.fire_background(
            EventName::Error,
            FabricEvent::Error(ErrorPayload {
                code: FabricErrorCode::MissingArgument,
                description: "UARTClient[Option] -> Null".to_string(),
            }),
        );
        return;
    }

    let stream = match tokio_serial::new(&option.port_name, option.baud_rate).open_native_async() {
        Ok(s) => s,
        Err(e) => {
            let err = FabricError::new(
                FabricErrorCode::SerialOpenFailure,
                format!("UARTClient[Open] -> {e}"),
            );
            trigger.fire_background(
                EventName::Error,
                FabricEvent::Error(ErrorPayload { code: err.code, description: err.description.clone() }),
            );
            fire_close(&trigger, format!("UARTClient[Closed] -> {}", option.port_name), None);
            return;
        }
    };

    let (read_half, write_half) = tokio::io::split(stream);
    ready.set(UartWriter(AsyncMutex::new(write_half)));
    trigger.fire_background(
        EventName::Open,
        FabricEvent::Open(OpenPayload { local: None, peer: None, tag: Some(option.port_name.clone()) }),
    );

    let deadline = match heartbeat_ms {
        Some(ms) => DeadlinePolicy::Bare(Duration::from_millis(ms)),
        None => DeadlinePolicy::None,
    };
    run_read_loop(UartReadSource(read_half), buffer_size, deadline, trigger.clone(), "UARTClient").await;
    fire_close(&trigger, format!("UARTClient[Closed] -> {}", option.port_name), None);
}
