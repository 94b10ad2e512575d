//! The per-connection stream multiplexer: a table of logical streams,
//! each with an inbound mailbox and (for streaming calls) flow-control
//! cursors, per spec.md §4.7.
//!
//! Both sides of a connection use the same table shape. Whichever side
//! opens a stream (sends `Request`/`Start`) registers an entry *before*
//! sending the opening packet, so no inbound packet can race ahead of
//! its own mailbox; whichever side answers (receives the opening packet)
//! registers an entry when the connection's receiver task first sees it
//! and hands an [`IncomingStream`] to the application.

use std::collections::HashMap;
use std::sync::Arc;

use conduit_marsh::Value;
use tokio::sync::{mpsc, RwLock};
use tracing::{debug, warn};

use crate::error::{ConnectionError, ErrorCode, ProtocolError};

/// Inbound, already-open-stream events a mailbox owner can observe.
/// Covers every data-phase body except the opening `Request`/`Start`
/// (which instead produces a new [`IncomingStream`]).
#[derive(Debug, Clone, PartialEq)]
pub enum StreamEvent {
    Step { index: u64, body: Value },
    StepAck { index: u64, buffer: Option<u32> },
    Cancel { reason: Option<String> },
    End { cancelled: bool, body: Value },
    Error { kind: String, body: Value },
}

impl StreamEvent {
    pub fn is_terminal(&self) -> bool {
        matches!(self, StreamEvent::End { .. } | StreamEvent::Error { .. })
    }
}

/// How a stream was opened, carried to the application as the first
/// thing it learns about a new [`IncomingStream`].
#[derive(Debug, Clone, PartialEq)]
pub enum OpenKind {
    Request { method: String, body: Value },
    Start { buffer: u32, body: Value },
}

/// The sender-side view of a buffer window: at most
/// `buffer - (last_sent - last_acked)` unacked `Step`s may be in flight
/// (spec.md §4.7).
#[derive(Debug, Clone, Copy)]
pub struct FlowControl {
    buffer: u32,
    sent: u64,
    acked: u64,
    has_sent: bool,
    has_acked: bool,
}

impl FlowControl {
    pub fn new(buffer: u32) -> Self {
        FlowControl {
            buffer,
            sent: 0,
            acked: 0,
            has_sent: false,
            has_acked: false,
        }
    }

    fn in_flight(&self) -> u64 {
        if !self.has_sent {
            0
        } else if !self.has_acked {
            self.sent + 1
        } else {
            self.sent - self.acked
        }
    }

    /// Whether one more `Step` may be sent without exceeding the window.
    pub fn has_room(&self) -> bool {
        self.in_flight() < u64::from(self.buffer)
    }

    pub fn record_sent(&mut self, index: u64) {
        self.sent = index;
        self.has_sent = true;
    }

    pub fn record_ack(&mut self, index: u64, new_buffer: Option<u32>) {
        self.acked = index;
        self.has_acked = true;
        if let Some(b) = new_buffer {
            self.buffer = b;
        }
    }
}

struct StreamEntry {
    inbound: mpsc::Sender<StreamEvent>,
}

/// Per-connection table, owned by the connection's receiver task per
/// spec.md §5 ("the streams table is owned by the receiver"). Entries
/// are dropped the instant a terminal packet is observed or sent.
#[derive(Default)]
pub struct StreamTable {
    entries: RwLock<HashMap<String, StreamEntry>>,
}

impl StreamTable {
    pub fn new() -> Arc<Self> {
        Arc::new(StreamTable::default())
    }

    /// Registers a brand-new entry. Fails with `StreamUsed` if the id is
    /// already open — the only place spec.md's "duplicate opens are a
    /// protocol error" is enforced.
    pub async fn open(&self, id: &str) -> Result<mpsc::Receiver<StreamEvent>, ProtocolError> {
        let mut entries = self.entries.write().await;
        if entries.contains_key(id) {
            warn!(stream = %id, "duplicate stream open");
            return Err(ProtocolError::with_message(
                ErrorCode::StreamUsed,
                format!("stream {id:?} is already open"),
            ));
        }
        let (tx, rx) = mpsc::channel(64);
        entries.insert(id.to_string(), StreamEntry { inbound: tx });
        debug!(stream = %id, "stream opened");
        Ok(rx)
    }

    /// Routes an inbound event to the stream it targets. `Cancel` for an
    /// unknown or already-closed id is silently ignored per spec.md §4.7;
    /// anything else for an unknown id is `StreamUnk`. Per open question
    /// (b), this always `.await`s the mailbox send so backpressure holds
    /// end to end — never `try_send`.
    pub async fn dispatch(&self, id: &str, event: StreamEvent) -> Result<(), ProtocolError> {
        let is_terminal = event.is_terminal();
        let sender = {
            let entries = self.entries.read().await;
            entries.get(id).map(|e| e.inbound.clone())
        };
        match sender {
            Some(tx) => {
                // A full mailbox with a dropped receiver means the
                // handler already walked away; that's not a protocol
                // violation, just a race with local cleanup.
                let _ = tx.send(event).await;
                if is_terminal {
                    self.entries.write().await.remove(id);
                }
                Ok(())
            }
            None => {
                if matches!(event, StreamEvent::Cancel { .. }) {
                    Ok(())
                } else {
                    warn!(stream = %id, "dispatch to unknown stream");
                    Err(ProtocolError::with_message(
                        ErrorCode::StreamUnk,
                        format!("no such stream {id:?}"),
                    ))
                }
            }
        }
    }

    /// Drops a locally-owned entry once this side has sent its own
    /// terminal packet for it.
    pub async fn close(&self, id: &str) {
        self.entries.write().await.remove(id);
        debug!(stream = %id, "stream closed");
    }

    pub async fn is_open(&self, id: &str) -> bool {
        self.entries.read().await.contains_key(id)
    }

    /// Connection teardown path (spec.md §5/§7): every stream still
    /// waiting on this side is handed a synthetic cancelled `End` so its
    /// task can notice and exit, rather than hanging on `recv` forever.
    pub async fn abort_all(&self) {
        let senders: Vec<mpsc::Sender<StreamEvent>> = {
            let mut entries = self.entries.write().await;
            entries.drain().map(|(_, entry)| entry.inbound).collect()
        };
        if !senders.is_empty() {
            debug!(count = senders.len(), "aborting streams on connection teardown");
        }
        for sender in senders {
            let _ = sender
                .send(StreamEvent::End {
                    cancelled: true,
                    body: Value::Null,
                })
                .await;
        }
    }
}

/// A newly opened stream handed to the application. `handle` is the
/// caller's sole means of responding or observing further inbound
/// events on this stream.
pub struct IncomingStream {
    pub id: String,
    pub kind: OpenKind,
    pub handle: StreamHandle,
}

/// The application-facing handle for one open stream — wraps the
/// connection's shared outbound mailbox plus this stream's own inbound
/// mailbox. Dropping it without sending a terminal packet leaves the
/// table entry (and the peer) waiting; `send_end`/`send_error` always
/// close it.
pub struct StreamHandle {
    pub(crate) id: String,
    pub(crate) outbound: mpsc::Sender<conduit_wire::Packet>,
    pub(crate) inbound: mpsc::Receiver<StreamEvent>,
    pub(crate) table: Arc<StreamTable>,
}

impl StreamHandle {
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Waits for the next inbound event (`StepAck`, `Cancel`, or, for a
    /// caller's handle, `Step`/`End`/`Error`). `None` means the
    /// connection's receiver task has shut down.
    pub async fn recv(&mut self) -> Option<StreamEvent> {
        self.inbound.recv().await
    }

    async fn send(&self, body: conduit_wire::Body) -> Result<(), ConnectionError> {
        let packet = conduit_wire::Packet::data(self.id.clone(), body);
        self.outbound
            .send(packet)
            .await
            .map_err(|_| ConnectionError::Aborted)
    }

    pub async fn send_step(&mut self, index: u64, body: Value) -> Result<(), ConnectionError> {
        self.send(conduit_wire::Body::Step(conduit_wire::packet::Step { index, body }))
            .await
    }

    pub async fn send_step_ack(&mut self, index: u64, buffer: Option<u32>) -> Result<(), ConnectionError> {
        self.send(conduit_wire::Body::StepAck(conduit_wire::packet::StepAck {
            index,
            buffer,
            body: Value::Null,
        }))
        .await
    }

    pub async fn send_cancel(&mut self, reason: Option<String>) -> Result<(), ConnectionError> {
        self.send(conduit_wire::Body::Cancel(conduit_wire::packet::Cancel { reason }))
            .await
    }

    /// Sends the stream's terminal `End` and drops this side's table
    /// entry. Consumes `self`: a stream has exactly one terminal packet.
    pub async fn send_end(mut self, cancelled: bool, body: Value) -> Result<(), ConnectionError> {
        self.send(conduit_wire::Body::End(conduit_wire::packet::End { cancelled, body }))
            .await?;
        self.table.close(&self.id).await;
        Ok(())
    }

    /// Sends the stream's terminal `Error` and drops this side's table
    /// entry.
    pub async fn send_error(mut self, kind: impl Into<String>, body: Value) -> Result<(), ConnectionError> {
        self.send(conduit_wire::Body::Error(conduit_wire::packet::ErrorBody {
            kind: kind.into(),
            body,
        }))
        .await?;
        self.table.close(&self.id).await;
        Ok(())
    }
}
