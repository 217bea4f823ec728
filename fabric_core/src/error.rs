//! # Error Taxonomy
//!
//! The fabric speaks in integer codes paired with a human description, the same
//! contract the host's `MessageHandler` translates into log lines and HTTP
//! status codes. `FabricErrorCode` gives that contract a real type instead of
//! a bare `i32`; `FabricError` is what actually flows through `Result`.

use thiserror::Error;

/// One entry per wire error code in the fabric's taxonomy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FabricErrorCode {
    /// Informational data carrier, not a failure.
    Info,
    /// Service running / started.
    ServiceStarted,
    /// Service stopped.
    ServiceStopped,
    /// Closure notification.
    Closed,
    /// Service not started.
    ServiceNotStarted,
    /// A worker panic was caught and recovered.
    InternalPanic,
    /// Failed to parse an inbound request.
    RequestParseFailure,
    /// TCP setup or deadline failure.
    TcpSetupFailure,
    /// UDP setup or deadline failure.
    UdpSetupFailure,
    /// Failed to parse a URL.
    UrlParseFailure,
    /// Read error or EOF on the underlying transport.
    ReadFailure,
    /// A required argument was missing or null.
    MissingArgument,
    /// Failed to open a serial port.
    SerialOpenFailure,
}

impl FabricErrorCode {
    /// The wire-level integer code, matching the taxonomy in the fabric's specification.
    pub const fn code(self) -> i32 {
        match self {
            FabricErrorCode::Info => 100,
            FabricErrorCode::ServiceStarted => 101,
            FabricErrorCode::ServiceStopped => 102,
            FabricErrorCode::Closed => 103,
            FabricErrorCode::ServiceNotStarted => 201,
            FabricErrorCode::InternalPanic => 204,
            FabricErrorCode::RequestParseFailure => 207,
            FabricErrorCode::TcpSetupFailure => 210,
            FabricErrorCode::UdpSetupFailure => 211,
            FabricErrorCode::UrlParseFailure => 212,
            FabricErrorCode::ReadFailure => 216,
            FabricErrorCode::MissingArgument => 220,
            FabricErrorCode::SerialOpenFailure => 222,
        }
    }
}

impl From<FabricErrorCode> for i32 {
    fn from(code: FabricErrorCode) -> i32 {
        code.code()
    }
}

/// An error surfaced by the fabric, always paired with a human-readable description
/// the way the source's `MessageHandler(tag, ctx, code, payload)` pairs a code with context.
#[derive(Debug, Error)]
#[error("[{}] {description}", code.code())]
pub struct FabricError {
    /// The taxonomy code this error belongs to.
    pub code: FabricErrorCode,
    /// Context-specific description, usually `"<Fn>[<Stage>] -> <cause>"`.
    pub description: String,
    /// The underlying I/O error, when one caused this.
    #[source]
    pub source: Option<std::io::Error>,
}

impl FabricError {
    /// Builds an error with no underlying source.
    pub fn new(code: FabricErrorCode, description: impl Into<String>) -> Self {
        Self { code, description: description.into(), source: None }
    }

    /// Builds an error wrapping an I/O failure.
    pub fn from_io(code: FabricErrorCode, context: &str, err: std::io::Error) -> Self {
        Self { code, description: format!("{context} -> {err}"), source: Some(err) }
    }
}
