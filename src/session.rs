//! The session state machine: `Service + Headers + Begin -> Accepted |
//! Denied`, per spec.md §4.6. Both directions share the same
//! frame+packet read/write helpers; only the state transitions differ.

use tokio::io::{AsyncRead, AsyncWrite};
use tracing::{debug, info, warn};

use conduit_wire::packet::{Accepted, Begin, Denied, Service};
use conduit_wire::{decode_packet, encode_packet, Body, FrameDecoder, Packet};

use crate::config::SessionConfig;
use crate::error::{ConnectionError, ErrorCode, ProtocolError};
use crate::headers::Headers;

/// Reads one packet: frame -> JSON bytes -> `Packet`. The one place
/// spec.md §4.4 (frame) and §4.5 (packet) compose for a reader.
pub(crate) async fn read_packet<R: AsyncRead + Unpin>(
    decoder: &mut FrameDecoder,
    reader: &mut R,
) -> Result<Option<Packet>, ConnectionError> {
    match decoder.read_frame(reader).await? {
        None => Ok(None),
        Some(bytes) => {
            let json: serde_json::Value = serde_json::from_slice(&bytes)
                .map_err(|e| ConnectionError::Packet(conduit_wire::PacketError::BodyShape(e.to_string())))?;
            Ok(Some(decode_packet(json)?))
        }
    }
}

/// Writes one packet: `Packet` -> JSON bytes -> frame -> transport.
pub(crate) async fn write_packet<W: AsyncWrite + Unpin>(
    writer: &mut W,
    packet: &Packet,
) -> Result<(), ConnectionError> {
    let json = encode_packet(packet)?;
    let bytes = serde_json::to_vec(&json)
        .map_err(|e| ConnectionError::Packet(conduit_wire::PacketError::BodyShape(e.to_string())))?;
    conduit_wire::frame::write_frame(writer, &bytes).await?;
    Ok(())
}

/// Consults whether a service name is recognized, the "external service
/// table" spec.md §4.6 hands off to. A bare closure is enough here — the
/// actual registry (method dispatch, versioning) lives with the caller.
pub trait ServiceTable: Send + Sync {
    fn accepts(&self, name: &str) -> bool;
}

impl<F> ServiceTable for F
where
    F: Fn(&str) -> bool + Send + Sync,
{
    fn accepts(&self, name: &str) -> bool {
        self(name)
    }
}

/// Runs the server side of the handshake: `AwaitService -> \
/// AwaitHeadersOrBegin -> ServiceDecision`, per spec.md §4.6. Returns the
/// negotiated `Service` and accumulated `Headers` on `Accepted`; on
/// `Denied` (unknown service or unsupported protocol) it writes the
/// `Denied` frame itself and returns `Err(ConnectionError::Denied)` —
/// the caller is responsible for closing the transport.
pub async fn server_handshake<R, W>(
    decoder: &mut FrameDecoder,
    reader: &mut R,
    writer: &mut W,
    config: &SessionConfig,
    services: &dyn ServiceTable,
) -> Result<(Service, Headers), ConnectionError>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    // AwaitService
    let first = read_packet(decoder, reader)
        .await?
        .ok_or(ConnectionError::HandshakeIncomplete)?;
    if first.stream.is_some() {
        return Err(protocol_err(ErrorCode::StreamNull, "stream must be null before Accepted"));
    }
    let service = match first.body {
        Body::Service(s) => s,
        _ => {
            return Err(protocol_err(
                ErrorCode::HeaderPending,
                "first packet must be Service",
            ))
        }
    };

    // AwaitHeadersOrBegin
    let mut headers = Headers::new();
    loop {
        let packet = read_packet(decoder, reader)
            .await?
            .ok_or(ConnectionError::HandshakeIncomplete)?;
        if packet.stream.is_some() {
            return Err(protocol_err(ErrorCode::StreamNull, "stream must be null in header phase"));
        }
        match packet.body {
            Body::Header(h) => headers.push_wire(h),
            Body::Begin(Begin) => break,
            _ => {
                return Err(protocol_err(
                    ErrorCode::HeaderPending,
                    "expected Header or Begin",
                ))
            }
        }
    }

    // ServiceDecision
    if !config.accepts_protocol(&service.proto) {
        warn!(service = %service.name, proto = %service.proto, "denied: unsupported protocol");
        deny(writer, "proto", None).await?;
        return Err(ConnectionError::Denied {
            reason: "proto".to_string(),
            value: None,
        });
    }
    if !services.accepts(&service.name) {
        let reason = "service unknown".to_string();
        warn!(service = %service.name, "denied: unknown service");
        deny(writer, &reason, None).await?;
        return Err(ConnectionError::Denied { reason, value: None });
    }

    write_packet(writer, &Packet::control(Body::Accepted(Accepted))).await?;
    info!(service = %service.name, "handshake accepted");
    Ok((service, headers))
}

async fn deny<W: AsyncWrite + Unpin>(
    writer: &mut W,
    reason: &str,
    value: Option<conduit_marsh::Value>,
) -> Result<(), ConnectionError> {
    write_packet(
        writer,
        &Packet::control(Body::Denied(Denied {
            reason: reason.to_string(),
            value,
        })),
    )
    .await
}

fn protocol_err(code: ErrorCode, message: &str) -> ConnectionError {
    ConnectionError::Protocol(ProtocolError::with_message(code, message))
}

/// Runs the client side of the handshake: send `Service`, zero or more
/// `Header`s, `Begin`, then await `Accepted`/`Denied`.
pub async fn client_handshake<R, W>(
    decoder: &mut FrameDecoder,
    reader: &mut R,
    writer: &mut W,
    service: Service,
    headers: Headers,
) -> Result<(), ConnectionError>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    write_packet(writer, &Packet::control(Body::Service(service))).await?;
    for h in headers.to_wire() {
        write_packet(writer, &Packet::control(Body::Header(h))).await?;
    }
    write_packet(writer, &Packet::control(Body::Begin(Begin))).await?;

    let reply = read_packet(decoder, reader)
        .await?
        .ok_or(ConnectionError::HandshakeIncomplete)?;
    match reply.body {
        Body::Accepted(Accepted) => {
            debug!("handshake accepted by peer");
            Ok(())
        }
        Body::Denied(d) => {
            warn!(reason = %d.reason, "handshake denied by peer");
            Err(ConnectionError::Denied {
                reason: d.reason,
                value: d.value,
            })
        }
        _ => Err(protocol_err(ErrorCode::HeaderPending, "expected Accepted or Denied")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use conduit_marsh::Value;
    use conduit_wire::packet::Header;

    #[tokio::test]
    async fn accept_then_deny_round_trip_over_a_duplex_pair() {
        let (client, server) = tokio::io::duplex(4096);
        let (mut client_r, mut client_w) = tokio::io::split(client);
        let (mut server_r, mut server_w) = tokio::io::split(server);
        let config = SessionConfig::default();

        let server_task = tokio::spawn(async move {
            let mut decoder = FrameDecoder::new();
            server_handshake(&mut decoder, &mut server_r, &mut server_w, &config, &|name: &str| {
                name == "rate_limiter"
            })
            .await
        });

        let mut decoder = FrameDecoder::new();
        let headers = Headers::new().with("authorization", Value::Str("Bearer 123".into()));
        client_handshake(
            &mut decoder,
            &mut client_r,
            &mut client_w,
            Service::offer("rate_limiter"),
            headers,
        )
        .await
        .unwrap();

        let (service, headers) = server_task.await.unwrap().unwrap();
        assert_eq!(service.name, "rate_limiter");
        assert_eq!(headers.authorization(), Some(&Value::Str("Bearer 123".into())));
    }

    #[tokio::test]
    async fn unknown_service_is_denied() {
        let (client, server) = tokio::io::duplex(4096);
        let (mut client_r, mut client_w) = tokio::io::split(client);
        let (mut server_r, mut server_w) = tokio::io::split(server);
        let config = SessionConfig::default();

        let server_task = tokio::spawn(async move {
            let mut decoder = FrameDecoder::new();
            server_handshake(&mut decoder, &mut server_r, &mut server_w, &config, &|name: &str| {
                name == "rate_limiter"
            })
            .await
        });

        let mut decoder = FrameDecoder::new();
        let client_result = client_handshake(
            &mut decoder,
            &mut client_r,
            &mut client_w,
            Service::offer("unknown"),
            Headers::new(),
        )
        .await;

        assert!(matches!(
            client_result,
            Err(ConnectionError::Denied { reason, .. }) if reason == "service unknown"
        ));
        assert!(matches!(
            server_task.await.unwrap(),
            Err(ConnectionError::Denied { reason, .. }) if reason == "service unknown"
        ));
    }

    #[tokio::test]
    async fn header_before_service_is_a_protocol_error() {
        let (client, server) = tokio::io::duplex(4096);
        let (_client_r, mut client_w) = tokio::io::split(client);
        let (mut server_r, mut server_w) = tokio::io::split(server);
        let config = SessionConfig::default();
        let server_task = tokio::spawn(async move {
            let mut decoder = FrameDecoder::new();
            server_handshake(&mut decoder, &mut server_r, &mut server_w, &config, &|_: &str| true).await
        });

        write_packet(
            &mut client_w,
            &Packet::control(Body::Header(Header {
                name: "x".into(),
                value: Value::Null,
            })),
        )
        .await
        .unwrap();
        drop(client_w);

        let err = server_task.await.unwrap().unwrap_err();
        assert!(matches!(
            err,
            ConnectionError::Protocol(ProtocolError { code: ErrorCode::HeaderPending, .. })
        ));
    }
}
