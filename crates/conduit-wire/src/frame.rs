//! Byte-level framing: `VARINT(n) ‖ JSON-BYTES(n)`, per spec.md §4.4.
//! Calls straight into `conduit_marsh::varint` so the frame layer and the
//! engine's own `Varint` descriptor share one implementation rather than
//! two (per the wire-protocol design note in `SPEC_FULL.md`).

use bytes::{Buf, BytesMut};
use conduit_marsh::varint::{varint_decode, varint_encode};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::error::FrameError;

/// Encodes one frame: `varint(payload.len()) ‖ payload`.
pub fn encode_frame(payload: &[u8]) -> Vec<u8> {
    let mut out = varint_encode(payload.len() as u64);
    out.extend_from_slice(payload);
    out
}

/// Attempts to decode one frame from the front of `buf`, returning
/// `(payload, bytes_consumed)`. Returns [`FrameError::NeedMore`] if `buf`
/// doesn't yet hold a complete frame.
fn try_decode(buf: &[u8]) -> Result<(Vec<u8>, usize), FrameError> {
    let (n, prefix_len) = match varint_decode(buf) {
        Ok(v) => v,
        Err(e) if e.is_buffer_needed() => return Err(FrameError::NeedMore),
        Err(e) => return Err(FrameError::Marsh(e)),
    };
    let n = n as usize;
    let total = prefix_len + n;
    if buf.len() < total {
        return Err(FrameError::NeedMore);
    }
    Ok((buf[prefix_len..total].to_vec(), total))
}

/// Owns the receive buffer for one connection's incoming frames. The
/// buffer is never shared across tasks (spec.md §5).
pub struct FrameDecoder {
    buffer: BytesMut,
}

impl Default for FrameDecoder {
    fn default() -> Self {
        Self::new()
    }
}

impl FrameDecoder {
    pub fn new() -> Self {
        FrameDecoder {
            buffer: BytesMut::with_capacity(4096),
        }
    }

    /// Pulls off one complete frame already sitting in the buffer, if any,
    /// without touching the transport.
    pub fn pop(&mut self) -> Result<Option<Vec<u8>>, FrameError> {
        match try_decode(&self.buffer) {
            Ok((payload, consumed)) => {
                self.buffer.advance(consumed);
                Ok(Some(payload))
            }
            Err(FrameError::NeedMore) => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// Reads from `reader` until one frame is available, returning `None`
    /// on a clean EOF at a frame boundary and [`FrameError::ConnectionAborted`]
    /// on EOF mid-frame.
    pub async fn read_frame<R: AsyncRead + Unpin>(
        &mut self,
        reader: &mut R,
    ) -> Result<Option<Vec<u8>>, FrameError> {
        loop {
            if let Some(frame) = self.pop()? {
                return Ok(Some(frame));
            }
            let mut chunk = [0u8; 4096];
            let n = reader.read(&mut chunk).await?;
            if n == 0 {
                return if self.buffer.is_empty() {
                    Ok(None)
                } else {
                    Err(FrameError::ConnectionAborted)
                };
            }
            self.buffer.extend_from_slice(&chunk[..n]);
        }
    }
}

pub async fn write_frame<W: AsyncWrite + Unpin>(
    writer: &mut W,
    payload: &[u8],
) -> std::io::Result<()> {
    writer.write_all(&encode_frame(payload)).await?;
    writer.flush().await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frame_round_trips_across_arbitrary_prefix_splits() {
        let a = encode_frame(b"hello");
        let b = encode_frame(b"world!!");
        let whole: Vec<u8> = a.iter().chain(b.iter()).copied().collect();

        for split in 0..=whole.len() {
            let mut decoder = FrameDecoder::new();
            decoder.buffer.extend_from_slice(&whole[..split]);
            let first = decoder.pop().unwrap();
            match first {
                Some(payload) => {
                    assert_eq!(payload, b"hello");
                }
                None => continue,
            }
            decoder.buffer.extend_from_slice(&whole[split..]);
            let second = decoder.pop().unwrap().unwrap();
            assert_eq!(second, b"world!!");
        }
    }

    #[tokio::test]
    async fn mid_frame_disconnect_is_connection_aborted() {
        let full = encode_frame(&vec![0u8; 100]);
        let partial = &full[..full.len() - 20];
        let (mut client, server) = tokio::io::duplex(1024);
        client.write_all(partial).await.unwrap();
        drop(client);
        let mut reader = server;
        let mut decoder = FrameDecoder::new();
        let err = decoder.read_frame(&mut reader).await.unwrap_err();
        assert!(matches!(err, FrameError::ConnectionAborted));
    }

    #[tokio::test]
    async fn clean_eof_at_frame_boundary_returns_none() {
        let (client, server) = tokio::io::duplex(1024);
        drop(client);
        let mut reader = server;
        let mut decoder = FrameDecoder::new();
        let result = decoder.read_frame(&mut reader).await.unwrap();
        assert!(result.is_none());
    }
}
