//! The session/connection error taxonomy, kept distinct from
//! `conduit_marsh::MarshError` per spec.md §7: mapper errors are
//! recoverable at the boundary that invoked them, protocol errors close
//! the connection they occurred on.

use conduit_wire::{FrameError, PacketError};

/// The four protocol error codes spec.md §4.6/§4.7/§7 defines. Each one
/// closes the connection it occurred on; it never affects other
/// connections.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    /// Unknown or invalid stream id — referenced a stream that was never
    /// opened, or that already terminated.
    StreamUnk,
    /// `stream` was null where the data phase requires non-null.
    StreamNull,
    /// A `Request`/`Start` tried to open a stream id that is already open.
    StreamUsed,
    /// A packet arrived in the wrong handshake phase.
    HeaderPending,
}

impl ErrorCode {
    pub fn as_str(self) -> &'static str {
        match self {
            ErrorCode::StreamUnk => "stream_unk",
            ErrorCode::StreamNull => "stream_null",
            ErrorCode::StreamUsed => "stream_used",
            ErrorCode::HeaderPending => "header_pending",
        }
    }
}

impl std::fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A protocol violation: `ErrorCode` plus an optional human-readable
/// message. Carries no `path`/`value` the way `MarshError` does — a
/// protocol error is about the shape of the exchange, not a single value.
#[derive(Debug, Clone, thiserror::Error)]
#[error("protocol error ({code}){}", message.as_deref().map(|m| format!(": {m}")).unwrap_or_default())]
pub struct ProtocolError {
    pub code: ErrorCode,
    pub message: Option<String>,
}

impl ProtocolError {
    pub fn new(code: ErrorCode) -> Self {
        ProtocolError { code, message: None }
    }

    pub fn with_message(code: ErrorCode, message: impl Into<String>) -> Self {
        ProtocolError {
            code,
            message: Some(message.into()),
        }
    }
}

/// Errors that can tear down a connection: a lower-layer I/O or framing
/// failure, a decode failure on an inbound packet, a protocol violation,
/// or a server `Denied` response to the handshake. Mirrors the teacher's
/// `SessionError` shape (`thiserror`, `#[from]` conversions, one variant
/// per failure boundary the session loop actually hits).
#[derive(Debug, thiserror::Error)]
pub enum ConnectionError {
    #[error("connection aborted")]
    Aborted,
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Frame(#[from] FrameError),
    #[error(transparent)]
    Packet(#[from] PacketError),
    #[error(transparent)]
    Protocol(#[from] ProtocolError),
    #[error("service denied: {reason}")]
    Denied {
        reason: String,
        value: Option<conduit_marsh::Value>,
    },
    #[error("connection closed before handshake completed")]
    HandshakeIncomplete,
}

impl ConnectionError {
    /// `true` for the terminal, mid-frame-disconnect case spec.md §7
    /// calls `connection_aborted` — every open stream must be closed
    /// with `End{cancelled: true}` when this is observed.
    pub fn is_aborted(&self) -> bool {
        matches!(self, ConnectionError::Frame(FrameError::ConnectionAborted))
            || matches!(self, ConnectionError::Aborted)
    }
}
