//! Owns one connection's handshake, background tasks, and stream
//! multiplexer, per spec.md §3 ("A connection owns its frame reader,
//! frame writer, pending streams, and the two background tasks") and §5
//! ("one receiver task reads and dispatches; one sender task writes and
//! flushes; per-stream handler tasks run concurrently with the
//! receiver"). Grounded on the teacher's `services/receiver/src/
//! session.rs::run_session_loop` shape: extracted pure dispatch helpers,
//! `tokio::select!`-free here only because the receiver and sender loops
//! don't need to race each other (they own disjoint halves of the
//! split stream).

use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tokio::io::{split, AsyncRead, AsyncWrite, ReadHalf, WriteHalf};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::debug;

use conduit_marsh::Value;
use conduit_wire::packet::{Request, Start};
use conduit_wire::{Body, FrameDecoder, Packet};

use crate::config::SessionConfig;
use crate::error::{ConnectionError, ErrorCode, ProtocolError};
use crate::headers::Headers;
use crate::session::{self, ServiceTable};
use crate::stream::{FlowControl, IncomingStream, OpenKind, StreamEvent, StreamHandle, StreamTable};

/// Receives freshly opened streams and routes them to application code.
/// A bare `async fn(IncomingStream)` closure implements this; the trait
/// only exists to name the boxed-future return type once.
pub trait StreamHandler: Send + Sync + 'static {
    fn handle(&self, incoming: IncomingStream) -> Pin<Box<dyn Future<Output = ()> + Send>>;
}

impl<F, Fut> StreamHandler for F
where
    F: Fn(IncomingStream) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    fn handle(&self, incoming: IncomingStream) -> Pin<Box<dyn Future<Output = ()> + Send>> {
        Box::pin(self(incoming))
    }
}

/// A handler that rejects any peer-initiated stream — the default for
/// `Connection::connect`, since spec.md §4.7's default is client-initiated
/// streams only.
fn reject_incoming() -> impl StreamHandler {
    |incoming: IncomingStream| async move {
        let _ = incoming
            .handle
            .send_error("unsupported", Value::Str("this side does not accept incoming streams".into()))
            .await;
    }
}

/// An open connection: the negotiated service/headers (server side) are
/// returned alongside it from `accept`; `connect` returns just the
/// connection since the client already knows what it asked for.
pub struct Connection {
    outbound_tx: mpsc::Sender<Packet>,
    streams: Arc<StreamTable>,
    next_id: AtomicU64,
    reader_task: JoinHandle<Result<(), ConnectionError>>,
    writer_task: JoinHandle<()>,
}

impl Connection {
    /// Runs the server handshake, then spawns the receiver/sender tasks.
    /// Every subsequently opened stream is handed to `handler`.
    pub async fn accept<S, H>(
        stream: S,
        config: SessionConfig,
        services: &dyn ServiceTable,
        handler: H,
    ) -> Result<(Connection, conduit_wire::packet::Service, Headers), ConnectionError>
    where
        S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
        H: StreamHandler,
    {
        let (mut read_half, mut write_half) = split(stream);
        let mut decoder = FrameDecoder::new();
        let (service, headers) =
            session::server_handshake(&mut decoder, &mut read_half, &mut write_half, &config, services).await?;
        let conn = Self::spawn(decoder, read_half, write_half, config, handler);
        Ok((conn, service, headers))
    }

    /// Runs the client handshake, then spawns the receiver/sender tasks.
    /// `handler` fires for any peer-initiated stream; pass
    /// [`reject_incoming`] (the default via [`Connection::connect`]) when
    /// the caller never expects one.
    pub async fn connect_with_handler<S, H>(
        stream: S,
        config: SessionConfig,
        service: conduit_wire::packet::Service,
        headers: Headers,
        handler: H,
    ) -> Result<Connection, ConnectionError>
    where
        S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
        H: StreamHandler,
    {
        let (mut read_half, mut write_half) = split(stream);
        let mut decoder = FrameDecoder::new();
        session::client_handshake(&mut decoder, &mut read_half, &mut write_half, service, headers).await?;
        Ok(Self::spawn(decoder, read_half, write_half, config, handler))
    }

    pub async fn connect<S>(
        stream: S,
        config: SessionConfig,
        service: conduit_wire::packet::Service,
        headers: Headers,
    ) -> Result<Connection, ConnectionError>
    where
        S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
    {
        Self::connect_with_handler(stream, config, service, headers, reject_incoming()).await
    }

    fn spawn<S, H>(
        decoder: FrameDecoder,
        read_half: ReadHalf<S>,
        mut write_half: WriteHalf<S>,
        _config: SessionConfig,
        handler: H,
    ) -> Connection
    where
        S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
        H: StreamHandler,
    {
        let (outbound_tx, mut outbound_rx) = mpsc::channel::<Packet>(256);
        let streams = StreamTable::new();
        let handler = Arc::new(handler);

        let writer_task = tokio::spawn(async move {
            while let Some(packet) = outbound_rx.recv().await {
                if session::write_packet(&mut write_half, &packet).await.is_err() {
                    break;
                }
            }
        });

        let reader_streams = streams.clone();
        let reader_outbound = outbound_tx.clone();
        let reader_task = tokio::spawn(Self::run_reader(
            decoder,
            read_half,
            reader_streams,
            reader_outbound,
            handler,
        ));

        Connection {
            outbound_tx,
            streams,
            next_id: AtomicU64::new(0),
            reader_task,
            writer_task,
        }
    }

    async fn run_reader<S, H>(
        mut decoder: FrameDecoder,
        mut read_half: ReadHalf<S>,
        streams: Arc<StreamTable>,
        outbound: mpsc::Sender<Packet>,
        handler: Arc<H>,
    ) -> Result<(), ConnectionError>
    where
        S: AsyncRead + Unpin + Send + 'static,
        H: StreamHandler,
    {
        let result = Self::reader_loop(&mut decoder, &mut read_half, &streams, &outbound, &handler).await;
        // spec.md §5/§7: connection teardown surfaces as a synthetic
        // cancelled End to every stream still waiting on this side.
        streams.abort_all().await;
        result
    }

    async fn reader_loop<S, H>(
        decoder: &mut FrameDecoder,
        read_half: &mut ReadHalf<S>,
        streams: &Arc<StreamTable>,
        outbound: &mpsc::Sender<Packet>,
        handler: &Arc<H>,
    ) -> Result<(), ConnectionError>
    where
        S: AsyncRead + Unpin + Send + 'static,
        H: StreamHandler,
    {
        loop {
            let packet = match session::read_packet(decoder, read_half).await {
                Ok(Some(p)) => p,
                Ok(None) => return Ok(()),
                Err(e) => return Err(e),
            };
            let id = packet
                .stream
                .clone()
                .ok_or_else(|| ConnectionError::Protocol(ProtocolError::with_message(
                    ErrorCode::StreamNull,
                    "stream must be non-null in the data phase",
                )))?;

            match packet.body {
                Body::Request(Request { method, body }) => {
                    Self::open_incoming(streams, outbound, handler, id, OpenKind::Request { method, body })
                        .await?;
                }
                Body::Start(Start { buffer, body }) => {
                    Self::open_incoming(streams, outbound, handler, id, OpenKind::Start { buffer, body }).await?;
                }
                Body::Step(s) => {
                    streams
                        .dispatch(&id, StreamEvent::Step { index: s.index, body: s.body })
                        .await?;
                }
                Body::StepAck(s) => {
                    streams
                        .dispatch(&id, StreamEvent::StepAck { index: s.index, buffer: s.buffer })
                        .await?;
                }
                Body::Cancel(c) => {
                    streams.dispatch(&id, StreamEvent::Cancel { reason: c.reason }).await?;
                }
                Body::End(e) => {
                    streams
                        .dispatch(&id, StreamEvent::End { cancelled: e.cancelled, body: e.body })
                        .await?;
                }
                Body::Error(e) => {
                    streams
                        .dispatch(&id, StreamEvent::Error { kind: e.kind, body: e.body })
                        .await?;
                }
                Body::Service(_) | Body::Header(_) | Body::Begin(_) | Body::Accepted(_) | Body::Denied(_) => {
                    return Err(ConnectionError::Protocol(ProtocolError::with_message(
                        ErrorCode::HeaderPending,
                        "handshake packet received during the data phase",
                    )));
                }
            }
        }
    }

    async fn open_incoming<H: StreamHandler>(
        streams: &Arc<StreamTable>,
        outbound: &mpsc::Sender<Packet>,
        handler: &Arc<H>,
        id: String,
        kind: OpenKind,
    ) -> Result<(), ConnectionError> {
        let rx = streams.open(&id).await?;
        let incoming = IncomingStream {
            id: id.clone(),
            kind,
            handle: StreamHandle {
                id,
                outbound: outbound.clone(),
                inbound: rx,
                table: streams.clone(),
            },
        };
        let handler = handler.clone();
        tokio::spawn(async move { handler.handle(incoming).await });
        Ok(())
    }

    fn next_stream_id(&self) -> String {
        self.next_id.fetch_add(1, Ordering::Relaxed).to_string()
    }

    /// Opens a new stream with `id`, registers it in the table, and
    /// returns the handle before anything is written to the wire — so no
    /// inbound reply can race ahead of its own mailbox registration.
    async fn open_outgoing(&self, body: Body) -> Result<(String, StreamHandle), ConnectionError> {
        let id = self.next_stream_id();
        let rx = self.streams.open(&id).await?;
        let handle = StreamHandle {
            id: id.clone(),
            outbound: self.outbound_tx.clone(),
            inbound: rx,
            table: self.streams.clone(),
        };
        self.outbound_tx
            .send(Packet::data(id.clone(), body))
            .await
            .map_err(|_| ConnectionError::Aborted)?;
        Ok((id, handle))
    }

    /// A unary call: opens a stream with `Request`, awaits its terminal
    /// `End`/`Error`.
    pub async fn call_unary(&self, method: impl Into<String>, body: Value) -> Result<Value, CallError> {
        let (_, mut handle) = self
            .open_outgoing(Body::Request(Request { method: method.into(), body }))
            .await?;
        loop {
            match handle.recv().await {
                None => return Err(CallError::Connection(ConnectionError::Aborted)),
                Some(StreamEvent::End { body, .. }) => return Ok(body),
                Some(StreamEvent::Error { kind, body }) => return Err(CallError::Remote { kind, body }),
                Some(_) => continue,
            }
        }
    }

    /// A streaming call: opens a stream with `Start{buffer}`, returning a
    /// [`StreamingCall`] the caller drives with `next`/`ack`/`cancel`.
    pub async fn call_streaming(
        &self,
        method: impl Into<String>,
        body: Value,
        buffer: u32,
    ) -> Result<StreamingCall, ConnectionError> {
        // `method` is carried in `body` by convention at the application
        // layer; the wire `Start` packet itself has no method field
        // (spec.md §3) so callers encode it into `body` themselves.
        let _ = method;
        let (_, handle) = self.open_outgoing(Body::Start(Start { buffer, body })).await?;
        Ok(StreamingCall { handle })
    }

    pub async fn shutdown(self) {
        self.reader_task.abort();
        self.writer_task.abort();
    }

    pub async fn wait(self) -> Result<(), ConnectionError> {
        let result = self.reader_task.await.unwrap_or(Ok(()));
        let _ = self.writer_task.await;
        result
    }
}

/// The outcome of a failed call: either the transport/protocol broke, or
/// the callee answered with an application-level `Error{type, body}`
/// (spec.md §3) — a normal, recoverable outcome, not a connection fault.
#[derive(Debug, thiserror::Error)]
pub enum CallError {
    #[error(transparent)]
    Connection(#[from] ConnectionError),
    #[error("remote error ({kind}): {body}")]
    Remote { kind: String, body: Value },
}

/// One inbound item from a streaming call, handed to the caller by
/// [`StreamingCall::next`].
#[derive(Debug, Clone, PartialEq)]
pub enum StepItem {
    Step { index: u64, body: Value },
    End { cancelled: bool, body: Value },
}

/// The caller's side of a streaming call: consumes `Step`s, sends
/// `StepAck` to advance the buffer window, and can `Cancel`.
pub struct StreamingCall {
    handle: StreamHandle,
}

impl StreamingCall {
    pub fn id(&self) -> &str {
        self.handle.id()
    }

    pub async fn next(&mut self) -> Option<Result<StepItem, CallError>> {
        loop {
            return match self.handle.recv().await {
                None => None,
                Some(StreamEvent::Step { index, body }) => Some(Ok(StepItem::Step { index, body })),
                Some(StreamEvent::End { cancelled, body }) => Some(Ok(StepItem::End { cancelled, body })),
                Some(StreamEvent::Error { kind, body }) => Some(Err(CallError::Remote { kind, body })),
                Some(StreamEvent::StepAck { .. } | StreamEvent::Cancel { .. }) => continue,
            };
        }
    }

    pub async fn ack(&mut self, index: u64, buffer: Option<u32>) -> Result<(), ConnectionError> {
        self.handle.send_step_ack(index, buffer).await
    }

    pub async fn cancel(&mut self, reason: Option<String>) -> Result<(), ConnectionError> {
        self.handle.send_cancel(reason).await
    }
}

/// Drives the server side of a streaming call: emits `Step`s respecting
/// the caller's advertised buffer window, tracking acks via `FlowControl`.
pub struct StreamingResponder {
    handle: StreamHandle,
    flow: FlowControl,
    next_index: u64,
    cancelled: bool,
}

impl StreamingResponder {
    pub fn new(handle: StreamHandle, buffer: u32) -> Self {
        StreamingResponder {
            handle,
            flow: FlowControl::new(buffer),
            next_index: 0,
            cancelled: false,
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled
    }

    /// Blocks until the window has room, then sends the next `Step` —
    /// unless a `Cancel` was observed first (either already, via
    /// [`Self::try_observe`], or while waiting here for room), in which
    /// case it sends nothing and returns `Ok(None)`: spec.md §4.7/§5
    /// requires no further `Step` once cancellation is observed.
    pub async fn send_step(&mut self, body: Value) -> Result<Option<u64>, ConnectionError> {
        if self.cancelled {
            return Ok(None);
        }
        while !self.flow.has_room() {
            match self.handle.recv().await {
                Some(StreamEvent::StepAck { index, buffer }) => self.flow.record_ack(index, buffer),
                Some(StreamEvent::Cancel { .. }) => {
                    debug!(stream = %self.handle.id(), "cancel observed while waiting for buffer room");
                    self.cancelled = true;
                    return Ok(None);
                }
                None => return Err(ConnectionError::Aborted),
                Some(_) => continue,
            }
        }
        let index = self.next_index;
        self.next_index += 1;
        self.handle.send_step(index, body).await?;
        self.flow.record_sent(index);
        Ok(Some(index))
    }

    /// Non-blocking drain of any acks or cancellation already queued,
    /// so a handler can check [`Self::is_cancelled`] between steps
    /// without stalling on `recv`.
    pub fn try_observe(&mut self) -> bool {
        while let Ok(event) = self.handle.inbound.try_recv() {
            match event {
                StreamEvent::StepAck { index, buffer } => self.flow.record_ack(index, buffer),
                StreamEvent::Cancel { .. } => {
                    debug!(stream = %self.handle.id(), "cancel observed");
                    self.cancelled = true;
                }
                _ => {}
            }
        }
        self.cancelled
    }

    pub async fn end(self, cancelled: bool, body: Value) -> Result<(), ConnectionError> {
        self.handle.send_end(cancelled, body).await
    }

    pub async fn error(self, kind: impl Into<String>, body: Value) -> Result<(), ConnectionError> {
        self.handle.send_error(kind, body).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn unary_echo_round_trip() {
        let (client_io, server_io) = tokio::io::duplex(8192);
        let (server_conn, _service, _headers) = Connection::accept(
            server_io,
            SessionConfig::default(),
            &|_: &str| true,
            |incoming: IncomingStream| async move {
                if let OpenKind::Request { body, .. } = incoming.kind {
                    let _ = incoming.handle.send_end(false, body).await;
                }
            },
        )
        .await
        .unwrap();

        let client = Connection::connect(
            client_io,
            SessionConfig::default(),
            conduit_wire::packet::Service::offer("echo"),
            Headers::new(),
        )
        .await
        .unwrap();

        let reply = client
            .call_unary("get", Value::Str("hi".into()))
            .await
            .unwrap();
        assert_eq!(reply, Value::Str("hi".into()));

        client.shutdown().await;
        server_conn.shutdown().await;
    }
}
