use conduit_marsh::MarshError;

/// Errors from decoding a JSON object into a [`crate::packet::Packet`].
/// Distinct from [`FrameError`], which operates one layer down at the
/// byte-framing boundary (spec.md §4.4 vs §4.5).
#[derive(Debug, thiserror::Error)]
pub enum PacketError {
    #[error("packet is not a JSON object")]
    NotObject,
    #[error("unknown top-level key {0:?}")]
    UnknownKey(String),
    #[error("missing \"type\"")]
    MissingType,
    #[error("unknown packet type {0:?}")]
    UnknownType(String),
    #[error("\"stream\" must be a string or null")]
    InvalidStream,
    #[error("missing \"body\"")]
    MissingBody,
    #[error(transparent)]
    Marsh(#[from] MarshError),
    #[error("body did not match its declared shape: {0}")]
    BodyShape(String),
}

/// Errors from the byte-level frame reader, per spec.md §4.4/§7.
/// `NeedMore` is not a hard failure — it signals the reader to buffer
/// more bytes and retry, mirroring `MarshError`'s `buffer_needed` reason
/// one layer up.
#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    #[error("need more bytes")]
    NeedMore,
    #[error("connection aborted mid-frame")]
    ConnectionAborted,
    #[error(transparent)]
    Marsh(#[from] MarshError),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}
